//! Run configuration, resolved from the environment and CLI flags.

use std::path::PathBuf;

use crate::error::{Error, Result};

pub const DEFAULT_DB_PATH: &str = "data/docmigrate.db";

pub const ENV_DB: &str = "DOCMIGRATE_DB";
pub const ENV_DRY_RUN: &str = "DOCMIGRATE_DRY_RUN";
pub const ENV_BATCH_LIMIT: &str = "DOCMIGRATE_BATCH_LIMIT";
pub const ENV_PRESET: &str = "DOCMIGRATE_PRESET";

/// Everything a single migration run needs from its environment.
///
/// Passed explicitly into the executor's entry point; nothing below the
/// binary reads process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Path to the SQLite document store.
    pub db_path: PathBuf,
    /// Compute writes without committing them.
    pub dry_run: bool,
    /// Overrides the preset's own batch limit when set.
    pub batch_limit: Option<usize>,
    /// Preset name, file path or inline JSON.
    pub preset: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            dry_run: false,
            batch_limit: None,
            preset: None,
        }
    }
}

impl RunConfig {
    /// Create configuration from process environment and defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            db_path: Self::db_path_from_lookup(&lookup),
            ..Self::default()
        };

        if let Some(flag) = lookup(ENV_DRY_RUN) {
            config.dry_run = parse_flag(&flag);
        }

        if let Some(raw) = lookup(ENV_BATCH_LIMIT) {
            let limit: usize = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a positive integer, got '{}'", ENV_BATCH_LIMIT, raw))
            })?;
            if limit == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", ENV_BATCH_LIMIT)));
            }
            config.batch_limit = Some(limit);
        }

        config.preset = lookup(ENV_PRESET).filter(|p| !p.trim().is_empty());

        Ok(config)
    }

    /// Store path alone, for commands that need nothing else from the
    /// environment.
    pub fn db_path_from_env() -> PathBuf {
        Self::db_path_from_lookup(|key| std::env::var(key).ok())
    }

    pub fn db_path_from_lookup<F>(lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(ENV_DB)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert!(!config.dry_run);
    }

    #[test]
    fn test_env_values() {
        let config = RunConfig::from_lookup(lookup(&[
            (ENV_DB, "/tmp/store.db"),
            (ENV_DRY_RUN, "TRUE"),
            (ENV_BATCH_LIMIT, "250"),
            (ENV_PRESET, "owner-ids"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/store.db"));
        assert!(config.dry_run);
        assert_eq!(config.batch_limit, Some(250));
        assert_eq!(config.preset.as_deref(), Some("owner-ids"));
    }

    #[test]
    fn test_invalid_batch_limit() {
        let result = RunConfig::from_lookup(lookup(&[(ENV_BATCH_LIMIT, "lots")]));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = RunConfig::from_lookup(lookup(&[(ENV_BATCH_LIMIT, "0")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_db_path_ignores_unrelated_bad_values() {
        let env = lookup(&[(ENV_DB, "/tmp/store.db"), (ENV_BATCH_LIMIT, "lots")]);
        assert!(RunConfig::from_lookup(&env).is_err());
        assert_eq!(RunConfig::db_path_from_lookup(&env), PathBuf::from("/tmp/store.db"));
        assert_eq!(
            RunConfig::db_path_from_lookup(lookup(&[(ENV_DB, "  ")])),
            PathBuf::from(DEFAULT_DB_PATH)
        );
    }

    #[test]
    fn test_dry_run_flag_values() {
        for (raw, expected) in [("1", true), ("yes", true), ("0", false), ("", false)] {
            let config = RunConfig::from_lookup(lookup(&[(ENV_DRY_RUN, raw)])).unwrap();
            assert_eq!(config.dry_run, expected, "flag value {:?}", raw);
        }
    }
}
