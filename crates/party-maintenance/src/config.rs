//! Maintenance settings loaded via OrthoConfig.
//!
//! Settings come from `PARTY_MAINTENANCE_*` environment variables and
//! OrthoConfig's configuration files; command-line flags are layered on top
//! by the CLI.

use std::ffi::OsString;
use std::path::PathBuf;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::dedup::{KeyStrategyKind, MalformedPolicy};

const DEFAULT_STORE_PATH: &str = "data.json";
const PROGRAM_NAME: &str = "party-maintenance";

/// Errors raised while loading or interpreting settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Settings could not be loaded.
    #[error("failed to load settings: {message}")]
    Load {
        /// Loader error message.
        message: String,
    },
    /// The configured key strategy is not known.
    #[error("unknown key strategy '{name}'; expected 'user-party' or 'exact'")]
    UnknownKeyStrategy {
        /// Configured strategy name.
        name: String,
    },
}

/// Configuration values for maintenance runs.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PARTY_MAINTENANCE")]
pub struct MaintenanceSettings {
    /// Path to the JSON store file.
    pub store_path: Option<PathBuf>,
    /// Membership key strategy name (`user-party` or `exact`).
    pub key_strategy: Option<String>,
    /// Exclude malformed memberships from the rewritten store.
    #[ortho_config(default = false)]
    pub drop_malformed: bool,
    /// Reload and check the store after rewriting it.
    #[ortho_config(default = true)]
    pub verify: bool,
    /// Emit logs as JSON lines.
    #[ortho_config(default = false)]
    pub json_logs: bool,
}

impl MaintenanceSettings {
    /// Loads settings from the environment and configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a source cannot be read or holds
    /// invalid values.
    pub fn load_settings() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(PROGRAM_NAME)]).map_err(|err| ConfigError::Load {
            message: err.to_string(),
        })
    }

    /// Returns the configured store path, falling back to `data.json`.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
    }

    /// Returns the configured key strategy, falling back to `user-party`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownKeyStrategy`] for unrecognised names.
    pub fn key_strategy(&self) -> Result<KeyStrategyKind, ConfigError> {
        match self.key_strategy.as_deref() {
            None => Ok(KeyStrategyKind::default()),
            Some(name) => {
                KeyStrategyKind::from_name(name).ok_or_else(|| ConfigError::UnknownKeyStrategy {
                    name: name.to_owned(),
                })
            }
        }
    }

    /// Returns the malformed-record policy implied by `drop_malformed`.
    #[must_use]
    pub const fn malformed_policy(&self) -> MalformedPolicy {
        if self.drop_malformed {
            MalformedPolicy::Drop
        } else {
            MalformedPolicy::Keep
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for settings loading.

    use super::*;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 5] = [
        "PARTY_MAINTENANCE_STORE_PATH",
        "PARTY_MAINTENANCE_KEY_STRATEGY",
        "PARTY_MAINTENANCE_DROP_MALFORMED",
        "PARTY_MAINTENANCE_VERIFY",
        "PARTY_MAINTENANCE_JSON_LOGS",
    ];

    fn settings_with(overrides: &[(&str, &str)]) -> MaintenanceSettings {
        let vars = VARS.map(|name| {
            let value = overrides
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_owned());
            (name, value)
        });
        let _guard = lock_env(vars);
        MaintenanceSettings::load_settings().expect("settings should load")
    }

    #[rstest]
    fn defaults_apply_when_nothing_is_set() {
        let settings = settings_with(&[]);

        assert_eq!(settings.store_path(), PathBuf::from("data.json"));
        assert_eq!(settings.key_strategy(), Ok(KeyStrategyKind::UserParty));
        assert_eq!(settings.malformed_policy(), MalformedPolicy::Keep);
        assert!(settings.verify);
        assert!(!settings.json_logs);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let settings = settings_with(&[
            ("PARTY_MAINTENANCE_STORE_PATH", "/srv/party/data.json"),
            ("PARTY_MAINTENANCE_KEY_STRATEGY", "exact"),
            ("PARTY_MAINTENANCE_DROP_MALFORMED", "true"),
            ("PARTY_MAINTENANCE_VERIFY", "false"),
        ]);

        assert_eq!(settings.store_path(), PathBuf::from("/srv/party/data.json"));
        assert_eq!(settings.key_strategy(), Ok(KeyStrategyKind::Exact));
        assert_eq!(settings.malformed_policy(), MalformedPolicy::Drop);
        assert!(!settings.verify);
    }

    #[rstest]
    fn unknown_key_strategy_is_reported() {
        let settings = settings_with(&[("PARTY_MAINTENANCE_KEY_STRATEGY", "hyphen")]);

        assert_eq!(
            settings.key_strategy(),
            Err(ConfigError::UnknownKeyStrategy {
                name: "hyphen".to_owned()
            })
        );
    }
}
