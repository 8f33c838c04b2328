use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use seedwright_generate::{GenerateOptions, Style};

use crate::CliError;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "seedwright.toml";

/// Placeholder replaced by the model name in `model_command`.
pub const MODEL_PLACEHOLDER: &str = "{model}";

/// Settings from `seedwright.toml`. Command-line flags override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: String,
    pub style: Style,
    pub rows: u64,
    pub batch_size: usize,
    pub reference_limit: usize,
    pub max_attempts: u32,
    /// Seconds allowed for one model call.
    pub timeout_secs: u64,
    /// Program and arguments that read a prompt on stdin and print the reply.
    pub model_command: Vec<String>,
    pub database_url: Option<String>,
    pub run_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let options = GenerateOptions::default();
        Self {
            model: "llama3".to_string(),
            style: options.style,
            rows: options.rows,
            batch_size: options.batch_size,
            reference_limit: options.reference_limit,
            max_attempts: options.max_attempts_table,
            timeout_secs: 300,
            model_command: vec![
                "ollama".to_string(),
                "run".to_string(),
                MODEL_PLACEHOLDER.to_string(),
            ],
            database_url: None,
            run_dir: PathBuf::from("runs"),
        }
    }
}

impl Settings {
    /// Load `path`, or the default file when present, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = std::fs::read_to_string(&path).map_err(|err| {
            CliError::InvalidConfig(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), CliError> {
        if self.model_command.is_empty() {
            return Err(CliError::InvalidConfig(
                "model_command needs at least a program".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(CliError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(CliError::InvalidConfig(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn generate_options(&self, strict: bool) -> GenerateOptions {
        GenerateOptions {
            rows: self.rows,
            batch_size: self.batch_size.max(1),
            reference_limit: self.reference_limit,
            max_attempts_table: self.max_attempts,
            strict,
            style: self.style,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
model = "qwen2.5:7b"
style = "edge-cases"
rows = 25
"#,
        )
        .expect("settings");
        assert_eq!(settings.model, "qwen2.5:7b");
        assert_eq!(settings.style, Style::EdgeCases);
        assert_eq!(settings.rows, 25);
        assert_eq!(settings.batch_size, 500);
        assert_eq!(settings.model_command, vec!["ollama", "run", "{model}"]);
    }

    #[test]
    fn rejects_empty_command_and_bad_toml() {
        assert!(matches!(
            Settings::from_toml("model_command = []"),
            Err(CliError::InvalidConfig(_))
        ));
        assert!(matches!(
            Settings::from_toml("rows = \"many\""),
            Err(CliError::Toml(_))
        ));
    }

    #[test]
    fn builds_generate_options() {
        let settings = Settings {
            batch_size: 0,
            ..Settings::default()
        };
        let options = settings.generate_options(true);
        assert!(options.strict);
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.max_attempts_table, 3);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("seedwright_missing_{}.toml", uuid::Uuid::new_v4()));
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(CliError::InvalidConfig(_))
        ));
    }
}
