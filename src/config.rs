//! Runtime configuration.
//!
//! Read from a TOML file (`$TIRILO_CONFIG`, else `./tirilo.toml`), then
//! overridden by the environment variables the cloud dashboard hands out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StartupError;

const CONFIG_FILE_NAME: &str = "tirilo.toml";
const CONFIG_ENV: &str = "TIRILO_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cloud: CloudConfig,
    pub brain: BrainConfig,
    pub voice: VoiceConfig,
    pub display: DisplayConfig,
    pub games: GamesConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub url: Option<String>,
    pub key: Option<String>,
    /// Run without the fleet service: no status check, commands or telemetry.
    pub offline: bool,
    pub poll_interval_ms: u64,
    /// Overrides the MAC address used to identify this robot in the fleet.
    pub device_id: Option<String>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            offline: false,
            poll_interval_ms: 2000,
            device_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub system_instruction: String,
    pub timeout_secs: u64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            system_instruction: "Você é o Tirilo, um robô amigo e terapêutico.".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Key into `engines` used for speech output.
    pub engine: String,
    /// Engine tried when the preferred one fails.
    pub fallback_engine: Option<String>,
    /// Engine name → argv; the text to speak is appended as the last argument.
    pub engines: HashMap<String, Vec<String>>,
    /// Speech recognizer argv printing one transcript on stdout.
    /// `{timeout}` is replaced with the listen window in seconds.
    pub listen_command: Vec<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        let mut engines = HashMap::new();
        engines.insert(
            "espeak".to_string(),
            vec!["espeak-ng".to_string(), "-v".to_string(), "pt".to_string()],
        );
        Self {
            engine: "espeak".to_string(),
            fallback_engine: None,
            engines,
            listen_command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub frame_rate: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { frame_rate: 30 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GamesConfig {
    /// Directory of `*.toml` game manifests. Unset registers every built-in game.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub log_file: PathBuf,
    pub shutdown_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("tirilo.log"),
            shutdown_timeout_ms: 1000,
        }
    }
}

/// Supabase endpoint and key, both present.
#[derive(Debug, Clone)]
pub struct CloudCredentials {
    pub url: String,
    pub key: String,
}

impl Config {
    /// Load from `$TIRILO_CONFIG` or `./tirilo.toml` and apply env overrides.
    pub fn load() -> Result<Self, StartupError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        let mut config = Self::from_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, StartupError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text).map_err(|source| StartupError::ConfigParse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(StartupError::ConfigIo {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Environment wins over the file; the first variable found per setting is used.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k).filter(|v| !v.is_empty()));

        if let Some(url) = first(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]) {
            self.cloud.url = Some(url);
        }
        if let Some(key) = first(&["SUPABASE_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]) {
            self.cloud.key = Some(key);
        }
        if let Some(key) = first(&["GEMINI_API_KEY", "GOOGLE_GEMINI_API_KEY"]) {
            self.brain.api_key = Some(key);
        }
    }

    pub fn cloud_credentials(&self) -> Result<CloudCredentials, StartupError> {
        let url = self
            .cloud
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(StartupError::MissingCredentials("SUPABASE_URL"))?;
        let key = self
            .cloud
            .key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(StartupError::MissingCredentials("SUPABASE_KEY"))?;
        Ok(CloudCredentials { url, key })
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.display.frame_rate.max(1)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.cloud.poll_interval_ms.max(100))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.display.frame_rate, 30);
        assert_eq!(config.cloud.poll_interval_ms, 2000);
        assert_eq!(config.voice.engine, "espeak");
        assert!(config.games.dir.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [cloud]
            offline = true

            [voice.engines]
            piper = ["piper-say"]
            "#,
        )
        .unwrap();
        assert!(config.cloud.offline);
        assert_eq!(config.cloud.poll_interval_ms, 2000);
        assert_eq!(config.voice.engines["piper"], vec!["piper-say".to_string()]);
        assert_eq!(config.brain.model, "gemini-2.5-flash");
    }

    #[test]
    fn env_overrides_with_fallback_names() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "NEXT_PUBLIC_SUPABASE_URL" => Some("https://fleet.example".into()),
            "SUPABASE_KEY" => Some("secret".into()),
            "NEXT_PUBLIC_SUPABASE_ANON_KEY" => Some("ignored".into()),
            "GOOGLE_GEMINI_API_KEY" => Some("gem".into()),
            _ => None,
        });
        let creds = config.cloud_credentials().unwrap();
        assert_eq!(creds.url, "https://fleet.example");
        assert_eq!(creds.key, "secret");
        assert_eq!(config.brain.api_key.as_deref(), Some("gem"));
    }

    #[test]
    fn missing_credentials_is_a_startup_error() {
        let config = Config::default();
        let err = config.cloud_credentials().unwrap_err();
        assert!(matches!(err, StartupError::MissingCredentials("SUPABASE_URL")));
    }

    #[test]
    fn frame_period_from_rate() {
        let mut config = Config::default();
        config.display.frame_rate = 50;
        assert_eq!(config.frame_period(), Duration::from_millis(20));
        config.display.frame_rate = 0;
        assert_eq!(config.frame_period(), Duration::from_millis(1000));
    }
}
