use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    /// Directory with one JSON file per topic.
    quizzes_dir: Option<String>,
    /// Directory for state files (logs). Defaults to current directory.
    data_dir: Option<String>,
    /// Fixed seed for random question order; random if unset.
    shuffle_seed: Option<u64>,
}

pub struct Config {
    pub telegram_bot_token: String,
    pub quizzes_dir: PathBuf,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    pub shuffle_seed: Option<u64>,
}

impl Config {
    /// Load from `path` (if it exists) and the process environment.
    ///
    /// A `.env` file in the working directory is read first.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Like `load`, with environment lookups supplied by the caller.
    pub fn load_with_env<P, F>(path: P, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_path = path.as_ref().to_path_buf();
        let file = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
            serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?
        } else {
            ConfigFile::default()
        };

        let telegram_bot_token = env("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.is_empty())
            .unwrap_or(file.telegram_bot_token);
        let quizzes_dir = env("QUIZZES_DIR")
            .filter(|d| !d.is_empty())
            .or(file.quizzes_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./quizzes"));

        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token is required (config file or TELEGRAM_BOT_TOKEN)".into(),
            ));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token,
            quizzes_dir,
            data_dir,
            shuffle_seed: file.shuffle_seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz",
            "quizzes_dir": "/srv/quizzes",
            "shuffle_seed": 99
        }"#);
        let config = Config::load_with_env(file.path(), no_env).expect("should load valid config");
        assert_eq!(config.quizzes_dir, PathBuf::from("/srv/quizzes"));
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert_eq!(config.shuffle_seed, Some(99));
    }

    #[test]
    fn test_missing_file_uses_env() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TELEGRAM_BOT_TOKEN", "42:secret"),
            ("QUIZZES_DIR", "banks"),
        ]);
        let config = Config::load_with_env("/nonexistent/quizbot.json", |k| env.get(k).map(|v| v.to_string()))
            .expect("env should be enough");
        assert_eq!(config.telegram_bot_token, "42:secret");
        assert_eq!(config.quizzes_dir, PathBuf::from("banks"));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config(r#"{ "telegram_bot_token": "1:from_file" }"#);
        let config = Config::load_with_env(file.path(), |k| {
            (k == "TELEGRAM_BOT_TOKEN").then(|| "2:from_env".to_string())
        })
        .unwrap();
        assert_eq!(config.telegram_bot_token, "2:from_env");
        assert_eq!(config.quizzes_dir, PathBuf::from("./quizzes"));
    }

    #[test]
    fn test_missing_token() {
        let err = assert_err(Config::load_with_env("/nonexistent/quizbot.json", no_env));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("telegram_bot_token"));
    }

    #[test]
    fn test_invalid_token_format_no_colon() {
        let file = write_config(r#"{ "telegram_bot_token": "invalid_token_no_colon" }"#);
        let err = assert_err(Config::load_with_env(file.path(), no_env));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("invalid"));
    }

    #[test]
    fn test_invalid_token_format_non_numeric_id() {
        let file = write_config(r#"{ "telegram_bot_token": "notanumber:ABCdef" }"#);
        let err = assert_err(Config::load_with_env(file.path(), no_env));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_token_format_empty_secret() {
        let file = write_config(r#"{ "telegram_bot_token": "123456789:" }"#);
        let err = assert_err(Config::load_with_env(file.path(), no_env));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load_with_env(file.path(), no_env));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
