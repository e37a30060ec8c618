//! Pipeline configuration. Loaded from a JSON file; every section has defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Where raw log files are read from
    pub input: InputConfig,
    /// Root directory handed to the output sink
    pub output_dir: PathBuf,
    /// Line parsing
    pub parser: ParserConfig,
    /// Geolocation lookups and cache
    pub geo: GeoConfig,
    /// Sessionization and rolling windows
    pub features: FeaturesConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory scanned recursively for log files
    pub log_dir: PathBuf,
    /// Only files ending with this suffix are listed
    pub suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// IANA zone every timestamp is converted into
    pub timezone: String,
    /// Lower-case substrings that flag a user agent as a bot
    pub bot_tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Sqlite,
    JsonFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Base URL of the lookup API; the ip is appended as a path segment
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Minimum delay between the start of two external calls
    pub pace_ms: u64,
    /// Sleep before retrying a rate-limited ip
    pub rate_limit_backoff_ms: u64,
    /// Attempts per ip, including the first
    pub max_attempts: u32,
    /// Upper bound on concurrently outstanding lookups
    pub max_in_flight: usize,
    /// Failed results older than this are looked up again; unset keeps them forever
    pub failure_ttl_secs: Option<u64>,
    pub cache_path: PathBuf,
    pub cache_backend: CacheBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Gap (exclusive) after which a client's next request opens a new session
    pub session_gap_mins: i64,
    /// Trailing window for the request count
    pub short_window_mins: i64,
    /// Trailing window for the average processing time
    pub long_window_mins: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            output_dir: PathBuf::from("output"),
            parser: ParserConfig::default(),
            geo: GeoConfig::default(),
            features: FeaturesConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            suffix: ".gz".to_string(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            bot_tokens: ["bot", "spider", "crawler", "python-urllib", "googlebot"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://ip-api.com/json".to_string(),
            timeout_secs: 5,
            pace_ms: 700,
            rate_limit_backoff_ms: 1000,
            max_attempts: 2,
            max_in_flight: 4,
            failure_ttl_secs: None,
            cache_path: PathBuf::from("output/ip_geolocation_cache.db"),
            cache_backend: CacheBackend::Sqlite,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            session_gap_mins: 30,
            short_window_mins: 5,
            long_window_mins: 60,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EtlConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                if let Ok(c) = serde_json::from_str::<EtlConfig>(&data) {
                    return c;
                }
            }
        }
        Self::default()
    }
}
