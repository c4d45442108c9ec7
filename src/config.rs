//! Configuration types.
//!
//! Everything is read from the environment (optionally seeded from a `.env`
//! file). A missing bot token or webhook URL is a startup error.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Staff group that receives new submissions.
pub const DEFAULT_ADMIN_CHAT_ID: &str = "-4926335845";

/// Listen port for webhook mode.
pub const DEFAULT_PORT: u16 = 8080;

/// Idle sessions are evicted after one day unless configured otherwise.
pub const DEFAULT_SESSION_TTL_MINUTES: u64 = 24 * 60;

/// How Telegram updates reach the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelegramMode {
    /// Long-poll `getUpdates`.
    Polling,
    /// Register `<public_url>/telegram/webhook` and listen on `port`.
    Webhook { public_url: String, port: u16 },
}

/// Telegram transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub mode: TelegramMode,
}

/// Which channel carries the conversation.
#[derive(Debug, Clone)]
pub enum Transport {
    Telegram(TelegramConfig),
    /// Local stdin/stdout REPL, no credentials needed.
    Cli,
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub transport: Transport,
    /// Chat that receives the staff summary of each submission.
    pub admin_chat_id: String,
    /// Idle session TTL. `None` disables eviction.
    pub session_ttl: Option<Duration>,
}

impl BotConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let transport = match get("INTAKE_CHANNEL").as_deref().unwrap_or("telegram") {
            "telegram" => Transport::Telegram(telegram_config(&get)?),
            "cli" => Transport::Cli,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "INTAKE_CHANNEL".into(),
                    message: format!("expected `telegram` or `cli`, got `{other}`"),
                });
            }
        };

        let admin_chat_id =
            get("ADMIN_CHAT_ID").unwrap_or_else(|| DEFAULT_ADMIN_CHAT_ID.to_string());

        let ttl_minutes = match get("SESSION_TTL_MINUTES") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "SESSION_TTL_MINUTES".into(),
                message: e.to_string(),
            })?,
            None => DEFAULT_SESSION_TTL_MINUTES,
        };
        let session_ttl = (ttl_minutes > 0).then(|| Duration::from_secs(ttl_minutes * 60));

        Ok(Self {
            transport,
            admin_chat_id,
            session_ttl,
        })
    }
}

fn telegram_config<G>(get: &G) -> Result<TelegramConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let bot_token = get("BOT_TOKEN").ok_or_else(|| ConfigError::MissingEnvVar("BOT_TOKEN".into()))?;
    let webhook_url = get("WEBHOOK_URL");

    let wants_webhook = match get("TELEGRAM_MODE").as_deref() {
        Some("webhook") => true,
        Some("polling") => false,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                key: "TELEGRAM_MODE".into(),
                message: format!("expected `polling` or `webhook`, got `{other}`"),
            });
        }
        None => webhook_url.is_some(),
    };

    let mode = if wants_webhook {
        let public_url = webhook_url.ok_or_else(|| ConfigError::MissingRequired {
            key: "WEBHOOK_URL".into(),
            hint: "Webhook mode needs the public base URL Telegram should call".into(),
        })?;
        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "PORT".into(),
                message: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };
        TelegramMode::Webhook {
            public_url: public_url.trim_end_matches('/').to_string(),
            port,
        }
    } else {
        TelegramMode::Polling
    };

    Ok(TelegramConfig {
        bot_token: SecretString::from(bot_token),
        mode,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "BOT_TOKEN"));
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let err = load(&[("BOT_TOKEN", "   ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn token_alone_selects_polling_with_defaults() {
        let config = load(&[("BOT_TOKEN", "123:ABC")]).unwrap();
        let Transport::Telegram(tg) = config.transport else {
            panic!("expected telegram transport");
        };
        assert_eq!(tg.bot_token.expose_secret(), "123:ABC");
        assert_eq!(tg.mode, TelegramMode::Polling);
        assert_eq!(config.admin_chat_id, DEFAULT_ADMIN_CHAT_ID);
        assert_eq!(
            config.session_ttl,
            Some(Duration::from_secs(DEFAULT_SESSION_TTL_MINUTES * 60))
        );
    }

    #[test]
    fn webhook_url_selects_webhook_mode() {
        let config = load(&[
            ("BOT_TOKEN", "t"),
            ("WEBHOOK_URL", "https://bot.example.com/"),
            ("PORT", "10000"),
        ])
        .unwrap();
        let Transport::Telegram(tg) = config.transport else {
            panic!("expected telegram transport");
        };
        assert_eq!(
            tg.mode,
            TelegramMode::Webhook {
                public_url: "https://bot.example.com".into(),
                port: 10000,
            }
        );
    }

    #[test]
    fn explicit_webhook_mode_without_url_is_fatal() {
        let err = load(&[("BOT_TOKEN", "t"), ("TELEGRAM_MODE", "webhook")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "WEBHOOK_URL"));
    }

    #[test]
    fn explicit_polling_ignores_webhook_url() {
        let config = load(&[
            ("BOT_TOKEN", "t"),
            ("TELEGRAM_MODE", "polling"),
            ("WEBHOOK_URL", "https://bot.example.com"),
        ])
        .unwrap();
        let Transport::Telegram(tg) = config.transport else {
            panic!("expected telegram transport");
        };
        assert_eq!(tg.mode, TelegramMode::Polling);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = load(&[
            ("BOT_TOKEN", "t"),
            ("WEBHOOK_URL", "https://x"),
            ("PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PORT"));
    }

    #[test]
    fn cli_channel_needs_no_token() {
        let config = load(&[("INTAKE_CHANNEL", "cli")]).unwrap();
        assert!(matches!(config.transport, Transport::Cli));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let err = load(&[("INTAKE_CHANNEL", "whatsapp")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn zero_ttl_disables_eviction() {
        let config = load(&[("INTAKE_CHANNEL", "cli"), ("SESSION_TTL_MINUTES", "0")]).unwrap();
        assert_eq!(config.session_ttl, None);
    }

    #[test]
    fn admin_chat_override() {
        let config = load(&[("INTAKE_CHANNEL", "cli"), ("ADMIN_CHAT_ID", "-100")]).unwrap();
        assert_eq!(config.admin_chat_id, "-100");
    }
}
