use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../default.toml");

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile { err: std::io::Error, path: String },

    #[error("parse: {0}")]
    Parse(#[from] toml::de::Error),
}

/// An emd.toml file.
#[serde_inline_default]
#[derive(Deserialize, Debug)]
pub struct File {
    pub description: Option<String>,
    #[serde_inline_default("evtmgmt".to_string())]
    pub name_prefix: String,
    #[serde(default)]
    pub grant_reader_role: bool,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub images: Images,
    #[serde(default)]
    pub readiness: Readiness,
    #[serde(default)]
    pub templates: Templates,
}

impl Default for File {
    fn default() -> Self {
        // The default config is compiled into the program, so
        // make sure to test default() to catch panics compile-time.
        toml::from_str(DEFAULT_CONFIG).unwrap()
    }
}

impl File {
    /// Parse a user config file. Keys not present fall back to the
    /// compiled-in defaults through serde's field defaults.
    pub fn from_user_config_file(path: &str) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path).map_err(|err| Error::ReadFile {
            err,
            path: path.to_string(),
        })?;
        Ok(toml::from_str(&data)?)
    }
}

#[serde_inline_default]
#[derive(Deserialize, Debug)]
pub struct Database {
    #[serde_inline_default("EventManagement".to_string())]
    pub name: String,
    #[serde_inline_default("Events".to_string())]
    pub container: String,
    #[serde_inline_default("/id".to_string())]
    pub partition_key_path: String,
}

impl Default for Database {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

#[serde_inline_default]
#[derive(Deserialize, Debug)]
pub struct Images {
    #[serde_inline_default("eventmgmt-backend:latest".to_string())]
    pub backend: String,
    #[serde_inline_default("eventmgmt-frontend:latest".to_string())]
    pub frontend: String,
}

impl Default for Images {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

#[serde_inline_default]
#[derive(Deserialize, Debug)]
pub struct Readiness {
    #[serde_inline_default(10)]
    pub poll_interval_seconds: u64,
    #[serde_inline_default(30)]
    pub max_attempts: u32,
}

impl Default for Readiness {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

#[serde_inline_default]
#[derive(Deserialize, Debug)]
pub struct Templates {
    #[serde_inline_default("deploy/backend.yaml".to_string())]
    pub backend: String,
    #[serde_inline_default("deploy/frontend.yaml".to_string())]
    pub frontend: String,
}

impl Default for Templates {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    pub fn load_default_configuration() {
        let cfg = File::default();
        assert_eq!(cfg.description, Some("Default configuration file".into()));
        assert_eq!(cfg.name_prefix, "evtmgmt");
        assert!(!cfg.grant_reader_role);
        assert_eq!(cfg.database.partition_key_path, "/id");
        assert_eq!(cfg.readiness.poll_interval_seconds, 10);
    }

    #[test]
    pub fn partial_user_config_falls_back_to_field_defaults() {
        let cfg: File = toml::from_str("name_prefix = \"demo\"").unwrap();
        assert_eq!(cfg.name_prefix, "demo");
        assert_eq!(cfg.database.name, "EventManagement");
        assert_eq!(cfg.readiness.max_attempts, 30);
    }
}
