//! Environment-driven configuration.
//!
//! Everything is read once at startup by [`AppConfig::from_env`]. Values
//! that fail to parse fall back to their defaults with a warning; values
//! that violate a cross-field invariant fail the whole load, because a bad
//! threshold pair silently corrupts the FAQ dedup behavior.

use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use tracing::warn;

use crate::error::ConfigError;

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the webhook server binds to.
    pub port: u16,
    /// Shared secret for the internal companion API. When unset, the
    /// internal endpoints are disabled.
    pub internal_secret: Option<SecretString>,
}

/// Evolution gateway settings. The gateway is optional: without a base URL
/// and key the service runs in dry mode and logs instead of sending.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    /// Default instance name, used when an event does not carry one.
    pub instance: String,
    pub timeout: Duration,
}

/// Companion-app (FAQ backend) settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Base for the document-upload links handed to contacts.
    pub upload_base_url: String,
    pub timeout: Duration,
}

/// Language-model settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Unset key disables the model; the FAQ matcher escalates instead.
    pub api_key: Option<SecretString>,
    pub chat_model: String,
    pub embedding_model: String,
}

/// Funnel behavior knobs.
#[derive(Debug, Clone)]
pub struct FunnelConfig {
    /// Phrase that creates a contact and starts the delayed welcome sequence.
    pub welcome_trigger: String,
    /// Legacy phrase that creates a contact straight at the choice menu.
    pub direct_trigger: String,
    /// Minimum cosine similarity for an answered-entry match (inclusive).
    pub match_threshold: f32,
    /// Minimum cosine similarity to call a new question a duplicate of a
    /// pending one. Must be >= `match_threshold`.
    pub duplicate_threshold: f32,
    /// Delay before nudging a contact who never sent the completion marker.
    pub buffer_reminder: Duration,
    /// Joined questions shorter than this (in chars) get a restate prompt.
    pub min_question_len: usize,
    /// Soft cap on answered questions per contact per process lifetime.
    pub question_limit: u32,
    /// Append the navigation footer to every Nth answered reply.
    pub nav_reminder_every: u32,
    /// Offsets of the welcome-sequence steps, relative to the trigger.
    pub step_offsets: Vec<Duration>,
    /// Delayed-queue poll interval.
    pub poll_interval: Duration,
    /// Maximum rows processed per queue drain.
    pub drain_batch: usize,
    /// How long a handoff stays paused before the queue resumes the bot.
    pub handoff_resume_after: Duration,
    /// Idle sessions are pruned after this long.
    pub session_idle_timeout: Duration,
    /// Operator number for handoff alerts, if configured.
    pub admin_number: Option<String>,
    /// Nominal annual interest rate (percent) for the simulator estimate.
    pub annual_rate: Decimal,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            welcome_trigger:
                "Olá! Quero saber como funciona o crédito habitação em Portugal".to_string(),
            direct_trigger:
                "Olá, gostaria de ajuda para conseguir meu crédito habitação em Portugal"
                    .to_string(),
            match_threshold: 0.78,
            duplicate_threshold: 0.82,
            buffer_reminder: Duration::from_secs(60),
            min_question_len: 3,
            question_limit: 20,
            nav_reminder_every: 3,
            step_offsets: vec![
                Duration::from_secs(15),
                Duration::from_secs(20),
                Duration::from_secs(90),
                Duration::from_secs(110),
            ],
            poll_interval: Duration::from_secs(12),
            drain_batch: 20,
            handoff_resume_after: Duration::from_secs(24 * 3600),
            session_idle_timeout: Duration::from_secs(6 * 3600),
            admin_number: None,
            annual_rate: Decimal::new(30, 1), // 3.0%
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub backend: BackendConfig,
    pub llm: LlmConfig,
    pub funnel: FunnelConfig,
    pub db_path: String,
}

impl AppConfig {
    /// Read the configuration from the environment and validate it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server = ServerConfig {
            port: env_parse("PORT", 3010u16),
            internal_secret: env_secret("EVO_INTERNAL_SECRET"),
        };

        let gateway = GatewayConfig {
            base_url: env_opt("EVOLUTION_API_URL").map(|u| u.trim_end_matches('/').to_string()),
            api_key: env_secret("EVOLUTION_API_KEY"),
            instance: env_or("EVOLUTION_INSTANCE", "main"),
            timeout: Duration::from_secs(15),
        };

        let backend = BackendConfig {
            base_url: env_or("IA_APP_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            upload_base_url: env_or("UPLOAD_BASE_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(10),
        };

        let llm = LlmConfig {
            api_key: env_secret("OPENAI_API_KEY"),
            chat_model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            embedding_model: env_or("OPENAI_EMBEDDING_MODEL", "text-embedding-3-small"),
        };

        let defaults = FunnelConfig::default();
        let funnel = FunnelConfig {
            welcome_trigger: env_or("EVO_WELCOME_PHRASE", &defaults.welcome_trigger),
            direct_trigger: env_or("EVO_TRIGGER_PHRASE", &defaults.direct_trigger),
            match_threshold: env_parse("FAQ_MATCH_THRESHOLD", defaults.match_threshold),
            duplicate_threshold: env_parse(
                "DUVIDA_DUPLICATE_THRESHOLD",
                defaults.duplicate_threshold,
            ),
            buffer_reminder: Duration::from_secs(env_parse(
                "BUFFER_REMINDER_SECS",
                defaults.buffer_reminder.as_secs(),
            )),
            poll_interval: Duration::from_secs(env_parse(
                "QUEUE_POLL_SECS",
                defaults.poll_interval.as_secs(),
            )),
            drain_batch: env_parse("QUEUE_DRAIN_BATCH", defaults.drain_batch),
            handoff_resume_after: Duration::from_secs(
                env_parse("HANDOFF_RESUME_HOURS", 24u64) * 3600,
            ),
            admin_number: env_opt("ADMIN_WHATSAPP"),
            annual_rate: env_parse("SIM_ANNUAL_RATE", defaults.annual_rate),
            ..defaults
        };

        let config = Self {
            server,
            gateway,
            backend,
            llm,
            funnel,
            db_path: env_or("LEAD_ASSIST_DB_PATH", "./data/lead-assist.db"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field invariants that must hold for the funnel to behave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = &self.funnel;

        if !(0.0..=1.0).contains(&f.match_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "FAQ_MATCH_THRESHOLD".into(),
                message: format!("must be within [0, 1], got {}", f.match_threshold),
            });
        }
        if !(0.0..=1.0).contains(&f.duplicate_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "DUVIDA_DUPLICATE_THRESHOLD".into(),
                message: format!("must be within [0, 1], got {}", f.duplicate_threshold),
            });
        }
        if f.duplicate_threshold < f.match_threshold {
            return Err(ConfigError::InvalidValue {
                key: "DUVIDA_DUPLICATE_THRESHOLD".into(),
                message: format!(
                    "must be >= FAQ_MATCH_THRESHOLD ({} < {})",
                    f.duplicate_threshold, f.match_threshold
                ),
            });
        }
        if f.step_offsets.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "step_offsets".into(),
                message: "welcome sequence needs at least one step".into(),
            });
        }
        if f.step_offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::InvalidValue {
                key: "step_offsets".into(),
                message: "offsets must be strictly increasing".into(),
            });
        }
        if f.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "QUEUE_POLL_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }
        if f.drain_batch == 0 {
            return Err(ConfigError::InvalidValue {
                key: "QUEUE_DRAIN_BATCH".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

// ── Env helpers ─────────────────────────────────────────────────────

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_secret(name: &str) -> Option<SecretString> {
    env_opt(name).map(SecretString::from)
}

fn env_parse<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match env_opt(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, fallback = %default, "Unparsable env value, using default");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                port: 3010,
                internal_secret: None,
            },
            gateway: GatewayConfig {
                base_url: None,
                api_key: None,
                instance: "main".into(),
                timeout: Duration::from_secs(15),
            },
            backend: BackendConfig {
                base_url: "http://localhost:3000".into(),
                upload_base_url: "http://localhost:3000".into(),
                timeout: Duration::from_secs(10),
            },
            llm: LlmConfig {
                api_key: None,
                chat_model: "gpt-4o-mini".into(),
                embedding_model: "text-embedding-3-small".into(),
            },
            funnel: FunnelConfig::default(),
            db_path: ":memory:".into(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn duplicate_threshold_must_dominate_match_threshold() {
        let mut config = test_config();
        config.funnel.match_threshold = 0.9;
        config.funnel.duplicate_threshold = 0.82;
        assert!(config.validate().is_err());
    }

    #[test]
    fn equal_thresholds_are_allowed() {
        let mut config = test_config();
        config.funnel.match_threshold = 0.8;
        config.funnel.duplicate_threshold = 0.8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn thresholds_must_be_in_unit_range() {
        let mut config = test_config();
        config.funnel.match_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn step_offsets_must_increase() {
        let mut config = test_config();
        config.funnel.step_offsets = vec![Duration::from_secs(20), Duration::from_secs(15)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_step_offsets() {
        let f = FunnelConfig::default();
        let secs: Vec<u64> = f.step_offsets.iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![15, 20, 90, 110]);
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut config = test_config();
        config.funnel.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
