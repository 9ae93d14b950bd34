use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    #[serde(default = "default_input_root")]
    pub input_root: String,
    #[serde(default = "default_output_root")]
    pub output_root: String,
    /// Required only when a root is an s3:// URL. Credentials are passed
    /// into the storage layer explicitly; the pipeline never reads them
    /// from ambient process state.
    #[serde(default)]
    pub s3: Option<S3Settings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_allow_http")]
    pub allow_http: bool,
}

fn default_input_root() -> String {
    "./data".to_string()
}

fn default_output_root() -> String {
    "./loaded_tables".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_allow_http() -> bool {
    true
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP"));

        // Build the configuration
        let config = builder.build()?;

        // Try to deserialize the entire configuration
        let settings: Settings = config.try_deserialize()?;

        debug!(
            input_root = %settings.storage.input_root,
            output_root = %settings.storage.output_root,
            "Parsed storage roots"
        );

        Ok(settings)
    }
}
