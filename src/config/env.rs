//! Environment variable handling for configuration.

/// Environment variable naming the config file path.
pub const CONFIG_PATH_VAR: &str = "WARDEN_CONFIG";

/// Default config file path when the variable is unset.
pub const DEFAULT_CONFIG_PATH: &str = "warden.conf";

/// Resolve the configuration file path.
pub fn get_config_path() -> String {
    std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}
