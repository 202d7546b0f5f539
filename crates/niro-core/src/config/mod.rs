use crate::error::{NiroError, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NiroConfig {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub astro: AstroConfig,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default = "LlmConfig::fallback_default")]
    pub llm_fallback: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_web_host")]
    pub host: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            host: default_web_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How many user/assistant exchanges to keep per session.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AstroConfig {
    #[serde(default = "default_astro_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub env_var: Option<String>,
    #[serde(default = "default_astro_timeout_secs")]
    pub timeout_secs: u64,
    /// Cached transits are refetched after this many hours.
    #[serde(default = "default_transits_ttl_hours")]
    pub transits_ttl_hours: u64,
    /// Transit window reaches this many months into the past.
    #[serde(default = "default_transit_past_months")]
    pub transit_past_months: u32,
    /// Transit window reaches this many months into the future.
    #[serde(default = "default_transit_future_months")]
    pub transit_future_months: u32,
}

impl Default for AstroConfig {
    fn default() -> Self {
        Self {
            base_url: default_astro_base_url(),
            api_key: None,
            env_var: None,
            timeout_secs: default_astro_timeout_secs(),
            transits_ttl_hours: default_transits_ttl_hours(),
            transit_past_months: default_transit_past_months(),
            transit_future_months: default_transit_future_months(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// When false, only the built-in city table is consulted.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_geo_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_geo_timeout_secs")]
    pub timeout_secs: u64,
    /// UTC offset assumed when a resolved place carries no timezone.
    #[serde(default = "default_tz_offset")]
    pub default_tz_offset: f64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_geo_base_url(),
            username: None,
            timeout_secs: default_geo_timeout_secs(),
            default_tz_offset: default_tz_offset(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub env_var: Option<String>,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            env_var: None,
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Default shape for the `[llm_fallback]` section: a second provider
    /// tried only after the primary fails.
    pub fn fallback_default() -> Self {
        Self {
            provider: default_fallback_provider(),
            model: default_fallback_model(),
            ..Self::default()
        }
    }
}

/// Valid LLM provider names.
pub const VALID_LLM_PROVIDERS: &[&str] = &["ollama", "openai", "gemini"];

// -- Defaults --

fn default_web_port() -> u16 {
    8900
}
fn default_web_host() -> String {
    "127.0.0.1".to_string()
}
fn default_max_history_turns() -> usize {
    12
}
fn default_max_message_chars() -> usize {
    2000
}
fn default_astro_base_url() -> String {
    "https://api.vedicastroapi.com/v3-json".to_string()
}
fn default_astro_timeout_secs() -> u64 {
    20
}
fn default_transits_ttl_hours() -> u64 {
    24
}
fn default_transit_past_months() -> u32 {
    24
}
fn default_transit_future_months() -> u32 {
    12
}
fn default_geo_base_url() -> String {
    "http://api.geonames.org".to_string()
}
fn default_geo_timeout_secs() -> u64 {
    10
}
fn default_tz_offset() -> f64 {
    5.5
}
fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_fallback_provider() -> String {
    "openai".to_string()
}
fn default_fallback_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_max_tokens() -> usize {
    1024
}
fn default_llm_temperature() -> f32 {
    0.7
}
fn default_llm_timeout_secs() -> u64 {
    30
}

impl NiroConfig {
    /// Load configuration with three-layer TOML merge:
    /// 1. ~/.config/niro/config.toml (global)
    /// 2. .niro/config.toml (project)
    /// 3. .niro/config.local.toml (local, gitignored)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        // Layer 1: Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        // Layer 2: Project config
        if let Some(dir) = project_dir {
            let project_config = dir.join(".niro").join("config.toml");
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }

            // Layer 3: Local config (gitignored)
            let local_config = dir.join(".niro").join("config.local.toml");
            if local_config.exists() {
                builder = builder.add_source(File::from(local_config).required(false));
            }
        }

        let config = builder
            .build()
            .map_err(|e| NiroError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| NiroError::Config(e.to_string()))?;

        cfg.validate();
        Ok(cfg)
    }

    /// Load with defaults only (no files).
    pub fn default_config() -> Self {
        Self {
            web: WebConfig::default(),
            session: SessionConfig::default(),
            astro: AstroConfig::default(),
            geo: GeoConfig::default(),
            llm: LlmConfig::default(),
            llm_fallback: LlmConfig::fallback_default(),
        }
    }

    /// Validate config values, clamping out-of-range values and logging warnings.
    /// This is lenient: it fixes values rather than rejecting the config.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (section, llm) in [("llm", &self.llm), ("llm_fallback", &self.llm_fallback)] {
            if llm.enabled && !VALID_LLM_PROVIDERS.contains(&llm.provider.as_str()) {
                warnings.push(format!(
                    "unknown {section} provider '{}', valid: {}",
                    llm.provider,
                    VALID_LLM_PROVIDERS.join(", ")
                ));
            }
        }

        // Temperature must be in [0.0, 2.0]
        let temp_checks: Vec<(&str, &mut f32)> = vec![
            ("llm.temperature", &mut self.llm.temperature),
            ("llm_fallback.temperature", &mut self.llm_fallback.temperature),
        ];
        for (name, val) in temp_checks {
            if *val < 0.0 || *val > 2.0 {
                warnings.push(format!("{name} = {val} out of range [0.0, 2.0], clamping"));
                *val = val.clamp(0.0, 2.0);
            }
        }

        // max_tokens
        if self.llm.max_tokens == 0 {
            warnings.push("llm.max_tokens = 0, setting to 256".to_string());
            self.llm.max_tokens = 256;
        }
        if self.llm_fallback.max_tokens == 0 {
            warnings.push("llm_fallback.max_tokens = 0, setting to 256".to_string());
            self.llm_fallback.max_tokens = 256;
        }

        // Positive integer checks
        if self.astro.transits_ttl_hours == 0 {
            warnings.push("astro.transits_ttl_hours = 0, setting to 1".to_string());
            self.astro.transits_ttl_hours = 1;
        }
        if self.astro.transit_past_months == 0 {
            warnings.push("astro.transit_past_months = 0, setting to 1".to_string());
            self.astro.transit_past_months = 1;
        }
        if self.astro.transit_future_months == 0 {
            warnings.push("astro.transit_future_months = 0, setting to 1".to_string());
            self.astro.transit_future_months = 1;
        }
        if self.session.max_history_turns == 0 {
            warnings.push("session.max_history_turns = 0, setting to 1".to_string());
            self.session.max_history_turns = 1;
        }
        if self.session.max_message_chars == 0 {
            warnings.push("session.max_message_chars = 0, setting to 2000".to_string());
            self.session.max_message_chars = default_max_message_chars();
        }

        // Timezone offsets range from -12.0 to +14.0
        if self.geo.default_tz_offset < -12.0 || self.geo.default_tz_offset > 14.0 {
            warnings.push(format!(
                "geo.default_tz_offset = {} out of range [-12.0, 14.0], resetting to 5.5",
                self.geo.default_tz_offset
            ));
            self.geo.default_tz_offset = default_tz_offset();
        }

        // GeoNames lookups require a registered username
        if self.geo.enabled && self.geo.username.as_deref().unwrap_or("").is_empty() {
            warnings.push(
                "geo.enabled = true but geo.username is unset; only the built-in city table will resolve"
                    .to_string(),
            );
        }

        // Log warnings via tracing (if subscriber is set up)
        for w in &warnings {
            tracing::warn!("config: {}", w);
        }

        warnings
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("niro").join("config.toml"))
}

/// Resolve an API key: check config field first, then environment variable.
pub fn resolve_api_key(
    api_key: Option<&str>,
    env_var_override: Option<&str>,
    default_env_var: &str,
    provider_name: &str,
    service_kind: &str,
) -> Result<String> {
    if let Some(key) = api_key {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    let env_var_name = env_var_override.unwrap_or(default_env_var);

    std::env::var(env_var_name).map_err(|_| {
        NiroError::Config(format!(
            "{provider_name} {service_kind} provider requires an API key \
             (set {service_kind}.api_key or {env_var_name})"
        ))
    })
}
