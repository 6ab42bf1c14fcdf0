use std::path::PathBuf;

use muster_core::types::{DEFAULT_HIGH_CONFIDENCE, DEFAULT_MIN_CONFIDENCE};
use muster_core::MatchPolicy;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Listen address for the HTTP boundary (default: 127.0.0.1:7700).
    pub listen_addr: String,
    /// Base directory for daemon state.
    pub data_dir: PathBuf,
    /// Path to the SQLite database file (users + attendance).
    pub db_path: PathBuf,
    /// Root directory of the filesystem object store.
    pub blob_dir: PathBuf,
    /// Base URL under which stored blobs are publicly reachable.
    pub public_base_url: String,
    /// Directory for per-call transient image files.
    pub temp_dir: PathBuf,
    /// Minimum confidence for any positive match.
    pub min_confidence: f32,
    /// Confidence for the high-confidence tier.
    pub high_confidence: f32,
    /// Endpoint of the face-analysis sidecar service.
    pub biometric_url: String,
    /// Bearer token for admin routes; admin routes refuse when unset.
    pub admin_token: Option<String>,
}

impl Config {
    /// Load configuration from `MUSTER_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("MUSTER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("muster")
            });

        let db_path = std::env::var("MUSTER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("muster.db"));

        let blob_dir = std::env::var("MUSTER_BLOB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("blobs"));

        let temp_dir = std::env::var("MUSTER_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        Self {
            listen_addr: std::env::var("MUSTER_LISTEN_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:7700".to_string()),
            public_base_url: std::env::var("MUSTER_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:7700/blobs".to_string()),
            min_confidence: env_f32("MUSTER_MIN_CONFIDENCE", DEFAULT_MIN_CONFIDENCE),
            high_confidence: env_f32("MUSTER_HIGH_CONFIDENCE", DEFAULT_HIGH_CONFIDENCE),
            biometric_url: std::env::var("MUSTER_BIOMETRIC_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:7701".to_string()),
            admin_token: std::env::var("MUSTER_ADMIN_TOKEN").ok(),
            data_dir,
            db_path,
            blob_dir,
            temp_dir,
        }
    }

    /// Decision policy for the match engine, from the configured thresholds.
    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            min_confidence: self.min_confidence,
            high_confidence: self.high_confidence,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
