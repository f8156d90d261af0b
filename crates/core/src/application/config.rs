// Coordinator configuration (defaults + environment overrides)

use crate::application::coordinator::constants::{
    DEFAULT_EXIT_GRACE, ENV_EXIT_GRACE_MS, ENV_TIMEOUT_MS,
};
use crate::error::{AppError, Result};
use std::time::Duration;

/// Execution Coordinator settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// How long an exit signal waits for a late result/error
    pub exit_grace: Duration,
    /// Deadline for one invocation; None waits forever
    pub timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            exit_grace: DEFAULT_EXIT_GRACE,
            timeout: None,
        }
    }
}

impl CoordinatorConfig {
    /// Defaults overridden by `OFFLOAD_EXIT_GRACE_MS` / `OFFLOAD_TIMEOUT_MS`
    ///
    /// # Errors
    /// - AppError::Config if a variable is set but is not a whole number of ms
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(ms) = parse_millis(&lookup, ENV_EXIT_GRACE_MS)? {
            config.exit_grace = ms;
        }
        config.timeout = parse_millis(&lookup, ENV_TIMEOUT_MS)?;
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_exit_grace(mut self, exit_grace: Duration) -> Self {
        self.exit_grace = exit_grace;
        self
    }
}

fn parse_millis<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| AppError::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = CoordinatorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.exit_grace, Duration::from_millis(50));
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_env_overrides() {
        let config = CoordinatorConfig::from_lookup(lookup(&[
            (ENV_EXIT_GRACE_MS, "10"),
            (ENV_TIMEOUT_MS, " 2500 "),
        ]))
        .unwrap();
        assert_eq!(config.exit_grace, Duration::from_millis(10));
        assert_eq!(config.timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let err = CoordinatorConfig::from_lookup(lookup(&[(ENV_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains(ENV_TIMEOUT_MS));
    }
}
