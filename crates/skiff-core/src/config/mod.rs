//! Client configuration (`skiff.toml`)
//!
//! Layers, lowest to highest precedence:
//! - built-in defaults
//! - `~/.config/skiff/skiff.toml` (or an explicit `--config` path)
//! - the `SKIFF_HOST` environment variable
//! - command-line flags, applied by the CLI

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_skiff_toml, parse_skiff_toml_str, to_toml};
pub use schema::{DisplayConfig, ServerConfig, SkiffConfig, StorageConfig};
pub use store::ConfigStore;

/// Environment variable overriding `server.host`.
pub const HOST_ENV: &str = "SKIFF_HOST";
