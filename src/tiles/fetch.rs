//! HTTP access for tile payloads
//!
//! Providers never talk to the network directly; they go through an
//! [`AssetAccessor`], so hosts can swap in their own transport (or a mock).

use crate::core::rectangle::Rectangle;
use crate::prelude::{Duration, HashMap};
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;

/// A request header as a (name, value) pair
pub type Header = (String, String);

/// Response header carrying the projected bounds of a GeoWebCache tile
pub const TILE_BOUNDS_HEADER: &str = "geowebcache-tile-bounds";

/// Shared async HTTP client. Building it once keeps TLS setup and the
/// connection pool out of the per-tile path.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("vector-overlay/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .unwrap_or_else(|e| {
            log::error!("failed to build tuned HTTP client, using defaults: {}", e);
            reqwest::Client::new()
        })
});

/// A completed HTTP exchange. Header names are stored lower-case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetResponse {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl AssetResponse {
    pub fn new(url: impl Into<String>, status: u16, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HashMap::default(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests on behalf of the providers.
///
/// Implementations are driven from worker futures only.
#[async_trait]
pub trait AssetAccessor: Send + Sync {
    async fn get(&self, url: &str, headers: &[Header]) -> Result<AssetResponse>;
}

/// [`AssetAccessor`] backed by `reqwest`. Needs a tokio runtime, so pair it
/// with [`AsyncSystem::with_tokio`](crate::runtime::AsyncSystem::with_tokio).
#[derive(Debug, Clone)]
pub struct HttpAssetAccessor {
    client: reqwest::Client,
}

impl HttpAssetAccessor {
    pub fn new() -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpAssetAccessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetAccessor for HttpAssetAccessor {
    async fn get(&self, url: &str, headers: &[Header]) -> Result<AssetResponse> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        log::debug!("GET {} -> {} ({} bytes)", final_url, status, body.len());
        Ok(AssetResponse {
            url: final_url,
            status,
            headers: response_headers,
            body,
        })
    }
}

/// Parse a `minx,miny,maxx,maxy` bounds header value
pub fn parse_tile_bounds(value: &str) -> Option<Rectangle> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [min_x, min_y, max_x, max_y] if min_x <= max_x && min_y <= max_y => {
            Some(Rectangle::new(*min_x, *min_y, *max_x, *max_y))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let response = AssetResponse::new("https://example.com/0/0/0.pbf", 200, vec![1, 2, 3])
            .with_header("GeoWebCache-Tile-Bounds", "0,0,1,1");
        assert_eq!(response.header("geowebcache-tile-bounds"), Some("0,0,1,1"));
        assert_eq!(response.header(TILE_BOUNDS_HEADER), Some("0,0,1,1"));
        assert!(response.header("content-type").is_none());
        assert!(response.is_success());
        assert!(!AssetResponse::new("x", 404, vec![]).is_success());
    }

    #[test]
    fn test_parse_tile_bounds() {
        let bounds = parse_tile_bounds("-180.0, -90.0,0,90").unwrap();
        assert_eq!(bounds, Rectangle::new(-180.0, -90.0, 0.0, 90.0));

        assert!(parse_tile_bounds("1,2,3").is_none());
        assert!(parse_tile_bounds("a,b,c,d").is_none());
        assert!(parse_tile_bounds("5,0,1,1").is_none());
    }
}
