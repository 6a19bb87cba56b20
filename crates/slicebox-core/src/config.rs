//! Runtime configuration, following the teacher's pattern of a plain
//! `serde`-deserializable struct loaded from TOML with environment-variable
//! overrides for deployment-specific values (see `default_storage_path` in
//! the teacher's `aura-agent::core::config`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_poll_timeout_ms() -> i64 {
    15_000
}

fn default_supervisor_tick_ms() -> u64 {
    5_000
}

fn default_temp_cleanup_delay_ms() -> u64 {
    2_000
}

/// Conservative built-in whitelist covering the common uncompressed transfer
/// syntaxes for a handful of everyday SOP classes. Operators extend this via
/// `accepted_contexts` in the TOML config; it is not meant to be exhaustive.
fn default_accepted_contexts() -> Vec<(String, String)> {
    const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
    const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
    const SECONDARY_CAPTURE: &str = "1.2.840.10008.5.1.4.1.1.7";
    const CT_IMAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
    const MR_IMAGE: &str = "1.2.840.10008.5.1.4.1.1.4";

    [SECONDARY_CAPTURE, CT_IMAGE, MR_IMAGE]
        .iter()
        .flat_map(|sop| [(sop.to_string(), EXPLICIT_VR_LE.to_string()), (sop.to_string(), IMPLICIT_VR_LE.to_string())])
        .collect()
}

/// Resolve the default object-storage root.
///
/// Priority: `$SLICEBOX_STORAGE_DIR`, else `~/.slicebox/storage`, else
/// `./.slicebox/storage`.
pub fn default_storage_dir() -> PathBuf {
    std::env::var("SLICEBOX_STORAGE_DIR")
        .ok()
        .map(PathBuf::from)
        .or_else(|| dirs_home().map(|home| home.join(".slicebox").join("storage")))
        .unwrap_or_else(|| PathBuf::from(".slicebox/storage"))
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    pub database_url: String,

    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// How long a POLL box may go without polling before it is `online = false`.
    #[serde(default = "default_poll_timeout_ms")]
    pub box_online_timeout_ms: i64,

    /// Supervisor tick interval (spec.md §4.G default 5s).
    #[serde(default = "default_supervisor_tick_ms")]
    pub supervisor_tick_ms: u64,

    /// Delay before a failed pipeline's temp file is removed (spec.md §4.D).
    #[serde(default = "default_temp_cleanup_delay_ms")]
    pub temp_cleanup_delay_ms: u64,

    /// Whitelisted `(SOPClassUID, TransferSyntaxUID)` pairs the validation
    /// stage accepts (spec.md §4.C); anything else is rejected with a 400.
    #[serde(default = "default_accepted_contexts")]
    pub accepted_contexts: Vec<(String, String)>,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load from `$SLICEBOX_CONFIG` if set, falling back to defaults with
    /// `database_url` read from `$DATABASE_URL`.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        if let Ok(path) = std::env::var("SLICEBOX_CONFIG") {
            let contents = std::fs::read_to_string(path)?;
            return Ok(Self::from_toml_str(&contents)?);
        }
        Ok(Self {
            http_addr: default_http_addr(),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/slicebox".to_string()),
            storage_dir: default_storage_dir(),
            box_online_timeout_ms: default_poll_timeout_ms(),
            supervisor_tick_ms: default_supervisor_tick_ms(),
            temp_cleanup_delay_ms: default_temp_cleanup_delay_ms(),
            accepted_contexts: default_accepted_contexts(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml_with_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            database_url = "postgres://localhost/slicebox_test"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.http_addr, "0.0.0.0:8080");
        assert_eq!(cfg.box_online_timeout_ms, 15_000);
        assert_eq!(cfg.supervisor_tick_ms, 5_000);
    }

    #[test]
    fn overrides_apply() {
        let cfg = AppConfig::from_toml_str(
            r#"
            http_addr = "127.0.0.1:9090"
            database_url = "postgres://localhost/x"
            supervisor_tick_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.http_addr, "127.0.0.1:9090");
        assert_eq!(cfg.supervisor_tick_ms, 1000);
    }
}
