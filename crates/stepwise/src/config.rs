use std::env;
use std::path::PathBuf;
use std::time::Duration;

use stepwise_model::ModelMessage;
use stepwise_openai_model::{OpenAIConfig, OpenAIConfigBuilder};
use thiserror::Error;

/// Errors while loading the [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    /// A variable is set to something unusable.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// The variable.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// The history file can't be read or parsed.
    #[error("failed to load history from {}: {reason}", .path.display())]
    History {
        /// The history file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },
}

/// Settings read from the environment.
///
/// | variable | meaning |
/// |---|---|
/// | `OPENAI_API_KEY` | API key, required |
/// | `OPENAI_BASE_URL` | base URL of the API |
/// | `OPENAI_MODEL` | model name |
/// | `STEPWISE_TIMEOUT_SECS` | time limit of each run |
/// | `STEPWISE_SYSTEM_PROMPT` | replaces the built-in system prompt |
/// | `STEPWISE_HISTORY` | JSON file holding an array of messages |
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// The API key.
    pub api_key: String,
    /// The base URL, if not the default one.
    pub base_url: Option<String>,
    /// The model, if not the default one.
    pub model: Option<String>,
    /// The time limit of each run.
    pub timeout: Option<Duration>,
    /// A custom system prompt.
    pub system_prompt: Option<String>,
    /// Where to load the initial history from.
    pub history_path: Option<PathBuf>,
}

impl Config {
    /// Reads the configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key).filter(|value| !value.trim().is_empty())
        };

        let api_key = var("OPENAI_API_KEY")
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        let timeout = match var("STEPWISE_TIMEOUT_SECS") {
            Some(value) => {
                let secs: u64 = value.trim().parse().map_err(|err| {
                    ConfigError::Invalid {
                        name: "STEPWISE_TIMEOUT_SECS",
                        reason: format!("{err}"),
                    }
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        name: "STEPWISE_TIMEOUT_SECS",
                        reason: "must be positive".to_owned(),
                    });
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            api_key,
            base_url: var("OPENAI_BASE_URL"),
            model: var("OPENAI_MODEL"),
            timeout,
            system_prompt: var("STEPWISE_SYSTEM_PROMPT"),
            history_path: var("STEPWISE_HISTORY").map(PathBuf::from),
        })
    }

    /// Returns the configuration of the model provider.
    pub fn openai_config(&self) -> OpenAIConfig {
        let mut builder = OpenAIConfigBuilder::with_api_key(&self.api_key);
        if let Some(base_url) = &self.base_url {
            builder = builder.with_base_url(base_url);
        }
        if let Some(model) = &self.model {
            builder = builder.with_model(model);
        }
        builder.build()
    }

    /// Loads the initial history, which is empty without a history file.
    pub fn load_history(&self) -> Result<Vec<ModelMessage>, ConfigError> {
        let Some(path) = &self.history_path else {
            return Ok(vec![]);
        };
        let history_err = |reason: String| ConfigError::History {
            path: path.clone(),
            reason,
        };
        let content = std::fs::read_to_string(path)
            .map_err(|err| history_err(err.to_string()))?;
        let history: Vec<ModelMessage> = serde_json::from_str(&content)
            .map_err(|err| history_err(err.to_string()))?;
        debug!("loaded {} messages from {}", history.len(), path.display());
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_from_lookup() {
        let config = config_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "local-model"),
            ("OPENAI_BASE_URL", ""),
            ("STEPWISE_TIMEOUT_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model.as_deref(), Some("local-model"));
        assert_eq!(config.base_url, None);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.openai_config().model(), "local-model");
        assert!(config.load_history().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[]),
            Err(ConfigError::Missing("OPENAI_API_KEY"))
        ));
        assert!(matches!(
            config_from(&[
                ("OPENAI_API_KEY", "k"),
                ("STEPWISE_TIMEOUT_SECS", "soon"),
            ]),
            Err(ConfigError::Invalid { name: "STEPWISE_TIMEOUT_SECS", .. })
        ));
        assert!(matches!(
            config_from(&[
                ("OPENAI_API_KEY", "k"),
                ("STEPWISE_TIMEOUT_SECS", "0"),
            ]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_load_history() {
        let path = env::temp_dir()
            .join(format!("stepwise-history-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello!"}
            ]"#,
        )
        .unwrap();

        let config = Config {
            history_path: Some(path.clone()),
            ..Default::default()
        };
        let history = config.load_history();
        std::fs::remove_file(&path).ok();

        assert_eq!(
            history.unwrap(),
            [ModelMessage::user("Hi"), ModelMessage::assistant("Hello!")]
        );

        let config = Config {
            history_path: Some(path),
            ..Default::default()
        };
        assert!(matches!(
            config.load_history(),
            Err(ConfigError::History { .. })
        ));
    }
}
