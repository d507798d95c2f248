use serde::Deserialize;

use murmur_core::content::ValidationOptions;
use murmur_core::error::{MurmurError, Result};
use murmur_core::ratelimit::{RateLimitParams, RateLimiter};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub content: ValidationOptions,

    #[serde(default)]
    pub rate_limit: RateLimitParams,

    #[serde(default)]
    pub attestation: AttestationSection,

    #[serde(default)]
    pub messages: MessagesSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MurmurError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.content.validate()?;
        self.attestation.validate()?;
        self.messages.validate()?;
        RateLimiter::new(self.rate_limit)?;

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            content: ValidationOptions::default(),
            rate_limit: RateLimitParams::default(),
            attestation: AttestationSection::default(),
            messages: MessagesSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(MurmurError::BadRequest(format!(
                "gateway.listen must be a valid socket address: {}",
                self.listen
            )));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttestationSection {
    /// When false, sends and reports skip attestation enforcement.
    #[serde(default = "default_enforce")]
    pub enforce: bool,

    #[serde(default = "default_cache_key")]
    pub cache_key: String,

    /// Kept shorter than the provider's own token lifetime.
    #[serde(default = "default_token_ttl_ms")]
    pub token_ttl_ms: u64,

    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// JSON file mirroring the security event log. In-memory only when unset.
    #[serde(default)]
    pub log_path: Option<String>,

    /// Context metadata attached to every security event.
    #[serde(default = "default_client")]
    pub client: String,
    #[serde(default)]
    pub origin: String,
}

impl Default for AttestationSection {
    fn default() -> Self {
        Self {
            enforce: default_enforce(),
            cache_key: default_cache_key(),
            token_ttl_ms: default_token_ttl_ms(),
            log_capacity: default_log_capacity(),
            log_path: None,
            client: default_client(),
            origin: String::new(),
        }
    }
}

impl AttestationSection {
    pub fn validate(&self) -> Result<()> {
        if self.cache_key.trim().is_empty() {
            return Err(MurmurError::BadRequest(
                "attestation.cache_key must not be empty".into(),
            ));
        }
        if !(1_000..=3_600_000).contains(&self.token_ttl_ms) {
            return Err(MurmurError::BadRequest(
                "attestation.token_ttl_ms must be between 1000 and 3600000".into(),
            ));
        }
        if !(1..=10_000).contains(&self.log_capacity) {
            return Err(MurmurError::BadRequest(
                "attestation.log_capacity must be between 1 and 10000".into(),
            ));
        }
        Ok(())
    }
}

fn default_enforce() -> bool {
    true
}
fn default_cache_key() -> String {
    "default".into()
}
fn default_token_ttl_ms() -> u64 {
    5 * 60 * 1000
}
fn default_log_capacity() -> usize {
    100
}
fn default_client() -> String {
    "murmur-gateway".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagesSection {
    /// Lifetime stamped into `expire_at`; the store's TTL sweep does the deleting.
    #[serde(default = "default_message_ttl_ms")]
    pub ttl_ms: u64,

    #[serde(default = "default_report_threshold")]
    pub report_threshold: u64,

    #[serde(default = "default_reply_preview_chars")]
    pub reply_preview_chars: usize,
}

impl Default for MessagesSection {
    fn default() -> Self {
        Self {
            ttl_ms: default_message_ttl_ms(),
            report_threshold: default_report_threshold(),
            reply_preview_chars: default_reply_preview_chars(),
        }
    }
}

impl MessagesSection {
    pub fn validate(&self) -> Result<()> {
        if self.ttl_ms < 60_000 {
            return Err(MurmurError::BadRequest(
                "messages.ttl_ms must be at least 60000".into(),
            ));
        }
        if self.report_threshold == 0 {
            return Err(MurmurError::BadRequest(
                "messages.report_threshold must be at least 1".into(),
            ));
        }
        if self.reply_preview_chars == 0 {
            return Err(MurmurError::BadRequest(
                "messages.reply_preview_chars must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_message_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}
fn default_report_threshold() -> u64 {
    2
}
fn default_reply_preview_chars() -> usize {
    80
}
