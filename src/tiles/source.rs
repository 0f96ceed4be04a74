use crate::core::constants::TILE_SIZE;
use crate::core::tiling::QuadtreeTileID;
use crate::tiles::fetch::Header;
use serde::{Deserialize, Serialize};

/// Trait representing anything that can produce tile URLs for a quadtree tile.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested tile.
    fn url(&self, tile: QuadtreeTileID) -> String;

    /// Extra request headers sent with every tile request.
    fn headers(&self) -> &[Header] {
        &[]
    }
}

/// A URL with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    template: String,
}

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn has_placeholders(&self) -> bool {
        self.template
            .find('{')
            .map_or(false, |open| self.template[open..].contains('}'))
    }

    /// Replace every `{name}` that `lookup` knows about. Unknown placeholders
    /// stay in the output as written.
    pub fn substitute(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        let mut out = String::with_capacity(self.template.len() + 16);
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match lookup(name) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn default_maximum_level() -> u32 {
    20
}

fn default_matrix_set() -> String {
    "EPSG:4326".to_string()
}

fn default_tile_size() -> u32 {
    TILE_SIZE
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_style() -> String {
    "default".to_string()
}

fn default_format() -> String {
    "application/vnd.mapbox-vector-tile".to_string()
}

/// Options for a `{z}/{x}/{y}` style endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XyzSourceOptions {
    #[serde(default)]
    pub credit: Option<String>,
    #[serde(default)]
    pub minimum_level: u32,
    #[serde(default = "default_maximum_level")]
    pub maximum_level: u32,
    /// Tile matrix set name, which also selects the projection
    #[serde(default = "default_matrix_set")]
    pub matrix_set: String,
    #[serde(default = "default_tile_size")]
    pub tile_width: u32,
    #[serde(default = "default_tile_size")]
    pub tile_height: u32,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub headers: Vec<Header>,
}

impl Default for XyzSourceOptions {
    fn default() -> Self {
        Self {
            credit: None,
            minimum_level: 0,
            maximum_level: default_maximum_level(),
            matrix_set: default_matrix_set(),
            tile_width: TILE_SIZE,
            tile_height: TILE_SIZE,
            source_name: String::new(),
            headers: Vec::new(),
        }
    }
}

/// Options for an OGC WMTS endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmtsSourceOptions {
    pub url: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub layer: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_matrix_set")]
    pub tile_matrix_set: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub credit: Option<String>,
    #[serde(default)]
    pub minimum_level: u32,
    #[serde(default = "default_maximum_level")]
    pub maximum_level: u32,
    #[serde(default = "default_tile_size")]
    pub tile_width: u32,
    #[serde(default = "default_tile_size")]
    pub tile_height: u32,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub headers: Vec<Header>,
}

impl WmtsSourceOptions {
    pub fn new(url: impl Into<String>, layer: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            version: default_version(),
            layer: layer.into(),
            style: default_style(),
            tile_matrix_set: default_matrix_set(),
            format: default_format(),
            credit: None,
            minimum_level: 0,
            maximum_level: default_maximum_level(),
            tile_width: TILE_SIZE,
            tile_height: TILE_SIZE,
            source_name: String::new(),
            headers: Vec::new(),
        }
    }
}

/// Slippy-map style source. `{y}` is the quadtree row counted from the
/// south; `{reverseY}` is the north-origin row.
#[derive(Debug, Clone)]
pub struct XyzSource {
    template: UrlTemplate,
    headers: Vec<Header>,
}

impl XyzSource {
    pub fn new(url: impl Into<String>, headers: Vec<Header>) -> Self {
        Self {
            template: UrlTemplate::new(url),
            headers,
        }
    }
}

impl TileSource for XyzSource {
    fn url(&self, tile: QuadtreeTileID) -> String {
        self.template.substitute(|name| match name {
            "z" => Some(tile.level.to_string()),
            "x" => Some(tile.x.to_string()),
            "y" => Some(tile.y.to_string()),
            "reverseY" => Some(tile.reverse_y().to_string()),
            _ => None,
        })
    }

    fn headers(&self) -> &[Header] {
        &self.headers
    }
}

/// WMTS GetTile source, key-value or RESTful.
#[derive(Debug, Clone)]
pub struct WmtsSource {
    template: UrlTemplate,
    restful: bool,
    layer: String,
    style: String,
    tile_matrix_set: String,
    headers: Vec<Header>,
}

impl WmtsSource {
    pub fn new(options: &WmtsSourceOptions) -> Self {
        let base = UrlTemplate::new(options.url.clone());
        let restful = base.has_placeholders();
        let template = if restful {
            base
        } else {
            let separator = if !options.url.contains('?') {
                "?"
            } else if options.url.ends_with('?') || options.url.ends_with('&') {
                ""
            } else {
                "&"
            };
            UrlTemplate::new(format!(
                "{}{}Request=GetTile&Service=WMTS&Version={}&Layer={}&Style={}\
                 &TileMatrix={{TileMatrix}}&TileMatrixSet={}&Format={}\
                 &TileCol={{TileCol}}&TileRow={{TileRow}}",
                options.url,
                separator,
                options.version,
                options.layer,
                options.style,
                options.tile_matrix_set,
                options.format
            ))
        };

        Self {
            template,
            restful,
            layer: options.layer.clone(),
            style: options.style.clone(),
            tile_matrix_set: options.tile_matrix_set.clone(),
            headers: options.headers.clone(),
        }
    }

    pub fn is_restful(&self) -> bool {
        self.restful
    }
}

impl TileSource for WmtsSource {
    fn url(&self, tile: QuadtreeTileID) -> String {
        self.template.substitute(|name| match name {
            "TileMatrix" => Some(format!("{}:{}", self.tile_matrix_set, tile.level)),
            "TileMatrixSet" => Some(self.tile_matrix_set.clone()),
            "TileRow" => Some(tile.reverse_y().to_string()),
            "TileCol" => Some(tile.x.to_string()),
            "Layer" => Some(self.layer.clone()),
            "Style" => Some(self.style.clone()),
            _ => None,
        })
    }

    fn headers(&self) -> &[Header] {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_keeps_unknown_placeholders() {
        let template = UrlTemplate::new("https://tiles/{z}/{x}/{y}.pbf?key={apiKey}");
        let url = template.substitute(|name| match name {
            "z" => Some("3".to_string()),
            "x" => Some("1".to_string()),
            "y" => Some("2".to_string()),
            _ => None,
        });
        assert_eq!(url, "https://tiles/3/1/2.pbf?key={apiKey}");

        let unterminated = UrlTemplate::new("https://tiles/{z");
        assert_eq!(unterminated.substitute(|_| Some("0".to_string())), "https://tiles/{z");
        assert!(!unterminated.has_placeholders());
    }

    #[test]
    fn test_xyz_rows() {
        let source = XyzSource::new("https://tiles/{z}/{x}/{y}/{reverseY}", vec![]);
        assert_eq!(source.url(QuadtreeTileID::new(2, 1, 0)), "https://tiles/2/1/0/3");
        assert_eq!(source.url(QuadtreeTileID::new(0, 0, 0)), "https://tiles/0/0/0/0");
        assert!(source.headers().is_empty());
    }

    #[test]
    fn test_wmts_key_value_request() {
        let options = WmtsSourceOptions::new("https://gwc.example/service/wmts", "topp:roads");
        let source = WmtsSource::new(&options);
        assert!(!source.is_restful());

        let url = source.url(QuadtreeTileID::new(3, 5, 1));
        assert_eq!(
            url,
            "https://gwc.example/service/wmts?Request=GetTile&Service=WMTS&Version=1.0.0\
             &Layer=topp:roads&Style=default&TileMatrix=EPSG:4326:3&TileMatrixSet=EPSG:4326\
             &Format=application/vnd.mapbox-vector-tile&TileCol=5&TileRow=6"
        );

        let mut with_query = options.clone();
        with_query.url = "https://gwc.example/wmts?token=abc".to_string();
        assert!(WmtsSource::new(&with_query)
            .url(QuadtreeTileID::new(0, 0, 0))
            .starts_with("https://gwc.example/wmts?token=abc&Request=GetTile"));
    }

    #[test]
    fn test_wmts_restful_template() {
        let mut options = WmtsSourceOptions::new(
            "https://gwc.example/{Layer}/{Style}/{TileMatrixSet}/{TileMatrix}/{TileRow}/{TileCol}.pbf",
            "roads",
        );
        options.headers.push(("Authorization".to_string(), "Bearer t".to_string()));
        let source = WmtsSource::new(&options);
        assert!(source.is_restful());
        assert_eq!(
            source.url(QuadtreeTileID::new(1, 1, 0)),
            "https://gwc.example/roads/default/EPSG:4326/EPSG:4326:1/1/1.pbf"
        );
        assert_eq!(source.headers().len(), 1);
    }

    #[test]
    fn test_source_options_from_json() {
        let options: WmtsSourceOptions =
            serde_json::from_str(r#"{"url": "https://gwc.example/wmts", "layer": "roads"}"#).unwrap();
        assert_eq!(options.format, "application/vnd.mapbox-vector-tile");
        assert_eq!(options.tile_width, 256);
        assert_eq!(options.maximum_level, 20);

        let xyz: XyzSourceOptions = serde_json::from_str(r#"{"matrix_set": "EPSG:3857"}"#).unwrap();
        assert_eq!(xyz.matrix_set, "EPSG:3857");
        assert_eq!(xyz.tile_height, 256);
    }
}
