use serde::{Deserialize, Serialize};

/// Top-level gateway configuration, deserialized from system.toml.
///
/// Every section has defaults so the gateway can start without a config
/// file; a file that exists but fails to parse or validate is fatal.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub engine: EngineConfig,
    pub limits: ResultLimits,
}

/// HTTP listener parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8090 }
    }
}

/// Handle registry lifecycle parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Idle TTL for handles, measured from last access.
    pub handle_ttl_seconds: u64,
    /// Hard cap on live handles; least-recently-used beyond this.
    pub max_handles: usize,
    /// Max wall-clock time for a single engine build before waiters are
    /// released with BuildTimeout. Must be shorter than the handle TTL.
    pub build_timeout_seconds: u64,
    /// Interval between background expiry sweeps.
    pub sweep_interval_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            handle_ttl_seconds: 1800,
            max_handles: 512,
            build_timeout_seconds: 120,
            sweep_interval_seconds: 30,
        }
    }
}

/// Remote compute engine connection parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    /// Per-request HTTP timeout toward the engine.
    pub request_timeout_seconds: u64,
    pub breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9100".into(),
            request_timeout_seconds: 90,
            breaker: BreakerConfig::default(),
        }
    }
}

/// Circuit breaker thresholds for the engine dependency.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a half-open probe.
    pub cooldown_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_seconds: 60,
        }
    }
}

/// Response size limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultLimits {
    /// Max items returned from catalog searches.
    pub max_search_results: u32,
}

impl Default for ResultLimits {
    fn default() -> Self {
        Self {
            max_search_results: 25,
        }
    }
}
