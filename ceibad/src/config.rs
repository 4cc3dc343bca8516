use crate::params::ProtocolParameters;

use std::{fmt, path::PathBuf};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

fn deserialize_loglevel<'de, D>(deserializer: D) -> Result<log::LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let string = String::deserialize(deserializer)?;
    string
        .parse()
        .map_err(|e| de::Error::custom(format!("Invalid log level '{}': {}", string, e)))
}

fn serialize_loglevel<S: Serializer>(level: &log::LevelFilter, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&level.to_string())
}

fn default_loglevel() -> log::LevelFilter {
    log::LevelFilter::Info
}

/// Static daemon configuration, read from a TOML file at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// An optional custom data directory.
    pub data_dir: Option<PathBuf>,
    /// What messages to log.
    #[serde(
        deserialize_with = "deserialize_loglevel",
        serialize_with = "serialize_loglevel",
        default = "default_loglevel"
    )]
    pub log_level: log::LevelFilter,
    /// The protocol parameters the migration engine works against.
    #[serde(default)]
    pub protocol: ProtocolParameters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    DatadirNotFound,
    FileNotFound,
    ReadingFile(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DatadirNotFound => write!(f, "Could not locate the configuration directory."),
            Self::FileNotFound => write!(f, "Could not locate the configuration file."),
            Self::ReadingFile(e) => write!(f, "Error while reading configuration file: {}", e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound,
            _ => Self::ReadingFile(e.to_string()),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Get the absolute path to the ceiba configuration folder.
///
/// It's a "Ceiba/" directory in the XDG standard configuration directory for
/// all OSes but Linux-based ones, for which it's `~/.ceiba/`.
pub fn config_folder_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    let configs_dir = dirs::home_dir();

    #[cfg(not(target_os = "linux"))]
    let configs_dir = dirs::config_dir();

    if let Some(mut path) = configs_dir {
        #[cfg(target_os = "linux")]
        path.push(".ceiba");

        #[cfg(not(target_os = "linux"))]
        path.push("Ceiba");

        return Some(path);
    }

    None
}

fn config_file_path() -> Option<PathBuf> {
    config_folder_path().map(|mut path| {
        path.push("ceiba.toml");
        path
    })
}

impl Config {
    /// Get our static configuration out of a mandatory configuration file.
    ///
    /// We require all settings to be set in the configuration file, and only
    /// in the configuration file, to avoid a futile duplication with command
    /// line or environment settings.
    pub fn from_file(custom_path: Option<PathBuf>) -> Result<Config, ConfigError> {
        let config_file =
            custom_path.unwrap_or(config_file_path().ok_or(ConfigError::DatadirNotFound)?);

        let config = toml::from_slice::<Config>(&std::fs::read(config_file)?)
            .map_err(|e| ConfigError::ReadingFile(format!("Parsing configuration file: {}", e)))?;

        Ok(config)
    }
}
