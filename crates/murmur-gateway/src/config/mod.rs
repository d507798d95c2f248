//! Gateway config loader.
//!
//! Parsing is strict (unknown keys anywhere are rejected) and every loaded
//! config is validated before it is returned.

pub mod schema;

use std::fs;
use std::path::Path;

use murmur_core::error::{MurmurError, Result};

pub use schema::{AttestationSection, GatewayConfig, GatewaySection, MessagesSection};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<GatewayConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| {
        MurmurError::Internal(format!("read config {} failed: {e}", path.display()))
    })?;
    load_from_str(&raw)
}

pub fn load_from_str(raw: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(raw)
        .map_err(|e| MurmurError::BadRequest(format!("invalid config yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
