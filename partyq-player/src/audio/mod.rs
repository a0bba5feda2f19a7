//! Audio asset inspection

pub mod probe;

pub use probe::{probe_asset, AssetInfo};
