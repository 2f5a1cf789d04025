//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::model::UserType;
use crate::error::ConfigError;

/// Application paths the gate redirects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePaths {
    /// Sign-in page; receives the originally requested path.
    pub sign_in: String,
    /// Where a signed-in user without a role picks one.
    pub role_selection: String,
    pub mentor_onboarding: String,
    pub mentee_onboarding: String,
    pub mentor_home: String,
    pub mentee_home: String,
}

impl Default for RoutePaths {
    fn default() -> Self {
        Self {
            sign_in: "/auth".to_string(),
            role_selection: "/auth".to_string(),
            mentor_onboarding: "/onboarding".to_string(),
            mentee_onboarding: "/mentee-onboarding".to_string(),
            mentor_home: "/dashboard".to_string(),
            mentee_home: "/mentors".to_string(),
        }
    }
}

impl RoutePaths {
    pub fn onboarding(&self, role: UserType) -> &str {
        match role {
            UserType::Mentor => &self.mentor_onboarding,
            UserType::Mentee => &self.mentee_onboarding,
        }
    }

    pub fn home(&self, role: UserType) -> &str {
        match role {
            UserType::Mentor => &self.mentor_home,
            UserType::Mentee => &self.mentee_home,
        }
    }
}

/// Auth, gating and onboarding configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Prefix for every persisted draft key.
    pub product: String,
    pub paths: RoutePaths,
    /// Upper bound on one session resolution.
    pub session_timeout: Duration,
    /// Upper bound on one profile fetch (canonical + role).
    pub profile_timeout: Duration,
    pub mentor_onboarding_steps: u32,
    pub mentee_onboarding_steps: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            product: "mentorgate".to_string(),
            paths: RoutePaths::default(),
            session_timeout: Duration::from_secs(10),
            profile_timeout: Duration::from_secs(10),
            mentor_onboarding_steps: 4,
            mentee_onboarding_steps: 3,
        }
    }
}

impl GateConfig {
    /// Read `MENTOR_GATE_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            product: lookup("MENTOR_GATE_PRODUCT").unwrap_or(defaults.product),
            paths: defaults.paths,
            session_timeout: Duration::from_millis(parse_or(
                &lookup,
                "MENTOR_GATE_SESSION_TIMEOUT_MS",
                defaults.session_timeout.as_millis() as u64,
            )?),
            profile_timeout: Duration::from_millis(parse_or(
                &lookup,
                "MENTOR_GATE_PROFILE_TIMEOUT_MS",
                defaults.profile_timeout.as_millis() as u64,
            )?),
            mentor_onboarding_steps: parse_or(
                &lookup,
                "MENTOR_GATE_MENTOR_STEPS",
                defaults.mentor_onboarding_steps,
            )?,
            mentee_onboarding_steps: parse_or(
                &lookup,
                "MENTOR_GATE_MENTEE_STEPS",
                defaults.mentee_onboarding_steps,
            )?,
        };

        if config.product.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "MENTOR_GATE_PRODUCT".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        for (key, steps) in [
            ("MENTOR_GATE_MENTOR_STEPS", config.mentor_onboarding_steps),
            ("MENTOR_GATE_MENTEE_STEPS", config.mentee_onboarding_steps),
        ] {
            if steps == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "onboarding needs at least one step".to_string(),
                });
            }
        }
        Ok(config)
    }

    pub fn onboarding_steps(&self, role: UserType) -> u32 {
        match role {
            UserType::Mentor => self.mentor_onboarding_steps,
            UserType::Mentee => self.mentee_onboarding_steps,
        }
    }
}

/// HTTP server configuration for the binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/mentor-gate.db"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            port: parse_or(&lookup, "MENTOR_GATE_PORT", defaults.port)?,
            db_path: lookup("MENTOR_GATE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = GateConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.product, "mentorgate");
        assert_eq!(config.paths.sign_in, "/auth");
        assert_eq!(config.profile_timeout, Duration::from_secs(10));
        assert_eq!(config.onboarding_steps(UserType::Mentor), 4);
        assert_eq!(config.onboarding_steps(UserType::Mentee), 3);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = GateConfig::from_lookup(lookup_from(&[
            ("MENTOR_GATE_PRODUCT", "acme"),
            ("MENTOR_GATE_PROFILE_TIMEOUT_MS", "250"),
            ("MENTOR_GATE_MENTEE_STEPS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.product, "acme");
        assert_eq!(config.profile_timeout, Duration::from_millis(250));
        assert_eq!(config.mentee_onboarding_steps, 5);
    }

    #[test]
    fn invalid_number_is_reported_with_key() {
        let err = GateConfig::from_lookup(lookup_from(&[("MENTOR_GATE_SESSION_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "MENTOR_GATE_SESSION_TIMEOUT_MS"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_steps_rejected() {
        assert!(GateConfig::from_lookup(lookup_from(&[("MENTOR_GATE_MENTOR_STEPS", "0")])).is_err());
    }

    #[test]
    fn role_paths() {
        let paths = RoutePaths::default();
        assert_eq!(paths.onboarding(UserType::Mentor), "/onboarding");
        assert_eq!(paths.onboarding(UserType::Mentee), "/mentee-onboarding");
        assert_eq!(paths.home(UserType::Mentor), "/dashboard");
        assert_eq!(paths.home(UserType::Mentee), "/mentors");
    }

    #[test]
    fn server_config_port() {
        let config = ServerConfig::from_lookup(lookup_from(&[("MENTOR_GATE_PORT", "9000")])).unwrap();
        assert_eq!(config.port, 9000);
        assert!(ServerConfig::from_lookup(lookup_from(&[("MENTOR_GATE_PORT", "99999")])).is_err());
    }
}
