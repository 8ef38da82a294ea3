//! Configuration validation.

use crate::common::error::ConfigError;
use crate::config::parser::load_config;
use crate::config::types::Config;
use crate::protocol::ProtocolVersion;

/// Load a config file and validate it in one step.
pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config = load_config(path)?;
    validate(&config)?;
    Ok(config)
}

/// Validate a parsed configuration.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.guilds.is_empty() {
        return Err(ConfigError::ValidationError {
            message: "at least one guild link must be configured".to_string(),
        });
    }

    for link in &config.guilds {
        let field = |name: &str| format!("guilds.{}.{}", link.guild_id, name);

        if link.guild_id.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "guild_id must not be empty".to_string(),
            });
        }
        if link.account.username.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: field("account.username"),
                message: "must not be empty".to_string(),
            });
        }
        if link.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: field("server.host"),
                message: "must not be empty".to_string(),
            });
        }
        if link.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: field("server.port"),
                message: "must be a valid TCP port".to_string(),
            });
        }
        if ProtocolVersion::parse(&link.server.protocol).is_none() {
            return Err(ConfigError::InvalidValue {
                field: field("server.protocol"),
                message: format!(
                    "unknown protocol '{}', expected 'legacy' or 'modern'",
                    link.server.protocol
                ),
            });
        }
        if !link.relay.webhook_url.starts_with("http") {
            return Err(ConfigError::InvalidValue {
                field: field("relay.webhook_url"),
                message: "must be an http(s) URL".to_string(),
            });
        }
    }

    if config.chat.padding_tokens.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "chat.padding_tokens".to_string(),
            message: "must contain at least one token".to_string(),
        });
    }
    if let Some(max) = config.chat.max_chat_len {
        if max < 16 {
            return Err(ConfigError::InvalidValue {
                field: "chat.max_chat_len".to_string(),
                message: "unreasonably small, must be at least 16".to_string(),
            });
        }
    }
    if config.reconnect.base_delay_secs == 0
        || config.reconnect.max_delay_secs < config.reconnect.base_delay_secs
    {
        return Err(ConfigError::InvalidValue {
            field: "reconnect".to_string(),
            message: "base delay must be nonzero and no larger than the max delay".to_string(),
        });
    }

    Ok(())
}
