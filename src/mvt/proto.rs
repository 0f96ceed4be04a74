//! Protobuf messages of the Mapbox Vector Tile format, version 2.1.
//!
//! See <https://github.com/mapbox/vector-tile-spec/tree/master/2.1>.

use prost::{Enumeration, Message};

/// Vector tile data.
#[derive(Clone, PartialEq, Message)]
pub struct Tile {
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<Layer>,
}

/// A named group of features sharing a key/value dictionary.
#[derive(Clone, PartialEq, Message)]
pub struct Layer {
    #[prost(uint32, required, tag = "15", default = "1")]
    pub version: u32,
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub features: Vec<Feature>,
    /// Tag keys used by the layer's features.
    #[prost(string, repeated, tag = "3")]
    pub keys: Vec<String>,
    /// Tag values used by the layer's features.
    #[prost(message, repeated, tag = "4")]
    pub values: Vec<Value>,
    /// Width and height of the layer's coordinate grid.
    #[prost(uint32, optional, tag = "5", default = "4096")]
    pub extent: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(uint64, optional, tag = "1", default = "0")]
    pub id: Option<u64>,
    /// Consecutive pairs of indices into [`Layer::keys`] and [`Layer::values`].
    #[prost(uint32, repeated, packed = "true", tag = "2")]
    pub tags: Vec<u32>,
    #[prost(enumeration = "GeomType", optional, tag = "3", default = "Unknown")]
    pub r#type: Option<i32>,
    /// Stream of command integers and zig-zag encoded parameters.
    #[prost(uint32, repeated, packed = "true", tag = "4")]
    pub geometry: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum GeomType {
    Unknown = 0,
    Point = 1,
    Linestring = 2,
    Polygon = 3,
}

/// Feature tag's value. Exactly one field is set in a valid message.
#[derive(Clone, PartialEq, Message)]
pub struct Value {
    #[prost(string, optional, tag = "1")]
    pub string_value: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub float_value: Option<f32>,
    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,
    #[prost(int64, optional, tag = "4")]
    pub int_value: Option<i64>,
    #[prost(uint64, optional, tag = "5")]
    pub uint_value: Option<u64>,
    #[prost(sint64, optional, tag = "6")]
    pub sint_value: Option<i64>,
    #[prost(bool, optional, tag = "7")]
    pub bool_value: Option<bool>,
}

impl Value {
    /// Converts the single populated field to JSON; `Null` when none is set
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{Number, Value as Json};

        if let Some(s) = &self.string_value {
            return Json::String(s.clone());
        }
        if let Some(f) = self.float_value {
            return Number::from_f64(f64::from(f)).map_or(Json::Null, Json::Number);
        }
        if let Some(d) = self.double_value {
            return Number::from_f64(d).map_or(Json::Null, Json::Number);
        }
        if let Some(i) = self.int_value.or(self.sint_value) {
            return Json::Number(Number::from(i));
        }
        if let Some(u) = self.uint_value {
            return Json::Number(Number::from(u));
        }
        if let Some(b) = self.bool_value {
            return Json::Bool(b);
        }
        Json::Null
    }
}
