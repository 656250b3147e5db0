use crate::{app::logger::parse_level, source::statm::DEFAULT_STATM_PATH, Error, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const CONFIG_ENV: &str = "GCPULSE_CONFIG";

/// Values read from the optional config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub interval_ms: u64,
    pub log_level: String,
    pub log_file: Option<String>,
    pub journal_file: Option<String>,
    pub statm_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
            journal_file: None,
            statm_path: DEFAULT_STATM_PATH.to_string(),
        }
    }
}

impl Config {
    /// Parse `key = value` lines; blank lines and `#` comments are skipped.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut cfg = Config::default();
        for (idx, line) in raw.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (key, value) = trimmed.split_once('=').ok_or_else(|| {
                Error::Parse(format!("expected 'key = value' on line {line_no}"))
            })?;
            let key = key.trim();
            let value = value.trim().trim_matches('"').to_string();
            match key {
                "interval_ms" => {
                    cfg.interval_ms = value.parse().map_err(|_| {
                        Error::Parse(format!("invalid interval_ms on line {line_no}"))
                    })?;
                }
                "log_level" => cfg.log_level = value,
                "log_file" => cfg.log_file = Some(value),
                "journal_file" => cfg.journal_file = Some(value),
                "statm_path" => cfg.statm_path = value,
                other => {
                    return Err(Error::Parse(format!(
                        "unknown key '{other}' on line {line_no}"
                    )))
                }
            }
        }
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Load an explicit file, or the default location if it exists.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_interval_ms(self.interval_ms)?;
        parse_level(&self.log_level)?;
        Ok(())
    }
}

pub fn validate_interval_ms(interval_ms: u64) -> Result<()> {
    if interval_ms == 0 {
        return Err(Error::InvalidArgs(
            "interval_ms must be a positive number of milliseconds".to_string(),
        ));
    }
    Ok(())
}

/// `$GCPULSE_CONFIG`, else `$HOME/.config/gcpulse/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config/gcpulse/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn parse_overrides_defaults() {
        let raw = r#"
            # sampler settings
            interval_ms = 250
            log_level = "debug"
            journal_file = /tmp/gcpulse.jsonl
        "#;
        let cfg = Config::parse(raw).unwrap();
        assert_eq!(cfg.interval_ms, 250);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.journal_file.as_deref(), Some("/tmp/gcpulse.jsonl"));
        assert_eq!(cfg.statm_path, DEFAULT_STATM_PATH);
        assert!(cfg.log_file.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn parse_reports_line_numbers() {
        let err = Config::parse("interval_ms = 10\nflavour = mint\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        let err = Config::parse("interval_ms = soon").unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
        let err = Config::parse("just words").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn zero_interval_fails_validation() {
        let cfg = Config::parse("interval_ms = 0").unwrap();
        assert!(matches!(cfg.validate(), Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn unknown_level_fails_validation() {
        let cfg = Config {
            log_level: "verbose".into(),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_path_must_exist() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");
        assert!(matches!(
            Config::load_or_default(Some(&missing)),
            Err(Error::Io(_))
        ));

        let present = tmp.path().join("config.toml");
        fs::write(&present, "interval_ms = 42\n").unwrap();
        assert_eq!(
            Config::load_or_default(Some(&present)).unwrap().interval_ms,
            42
        );
    }
}
