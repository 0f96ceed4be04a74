pub mod config;
pub mod constants;
pub mod projection;
pub mod rectangle;
pub mod tiling;
