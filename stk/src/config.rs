//! Framework configuration is based on an [ApplicationConfigProvider], which can later be used to
//! retrieve [ApplicationConfig]. [Application](crate::application::Application) uses this config to
//! configure itself and to seed the service registry with plain parameters.
//!
//! By default, the config is created with opinionated default values, which can then be overwritten
//! by environment variables prefixed with `STK_` or `stk.json` file. Nested keys in environment
//! variables are separated with `__`, e.g. `STK_PARAMETERS__DATABASE_URL`.

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::rc::Rc;
use stk_service::ErrorPtr;

const CONFIG_ENV_PREFIX: &str = "STK";

const CONFIG_ENV_SEPARATOR: &str = "__";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "stk.json";

fn convert_error<E: Error + 'static>(error: E) -> ErrorPtr {
    Rc::new(error) as ErrorPtr
}

/// Framework configuration which can be provided by an [ApplicationConfigProvider].
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub struct ApplicationConfig {
    /// Should a default tracing logger be installed in the scope of the application.
    pub install_tracing_logger: bool,
    /// Should every registered service be checked for missing dependencies before running.
    pub validate_services: bool,
    /// Plain values stored in the registry under their keys. Note that keys are case-insensitive
    /// and end up lowercased.
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
            validate_services: true,
            parameters: BTreeMap::new(),
        }
    }
}

impl From<OptionalApplicationConfig> for ApplicationConfig {
    fn from(value: OptionalApplicationConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
            validate_services: value
                .validate_services
                .unwrap_or(default.validate_services),
            parameters: value.parameters.unwrap_or(default.parameters),
        }
    }
}

impl ApplicationConfig {
    /// Loads the config from the default file and environment.
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        Self::init_from_builder(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(
                    Environment::with_prefix(CONFIG_ENV_PREFIX)
                        .prefix_separator("_")
                        .separator(CONFIG_ENV_SEPARATOR)
                        .try_parsing(true),
                ),
        )
    }

    fn init_from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder
            .build()
            .and_then(|config| config.try_deserialize::<OptionalApplicationConfig>())
            .map(|config| config.into())
    }
}

/// Provider for [ApplicationConfig], used by the
/// [ApplicationBuilder](crate::application::ApplicationBuilder) to configure the application.
#[cfg_attr(test, automock)]
pub trait ApplicationConfigProvider {
    fn config(&self) -> Result<ApplicationConfig, ErrorPtr>;
}

/// Provider loading the config from the environment once, on creation.
#[derive(Clone, Debug)]
pub struct DefaultApplicationConfigProvider {
    // cached init result
    config: Result<ApplicationConfig, ErrorPtr>,
}

impl DefaultApplicationConfigProvider {
    pub fn new() -> Self {
        Self {
            config: ApplicationConfig::init_from_environment().map_err(convert_error),
        }
    }
}

impl Default for DefaultApplicationConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ApplicationConfig> for DefaultApplicationConfigProvider {
    fn from(config: ApplicationConfig) -> Self {
        Self { config: Ok(config) }
    }
}

impl ApplicationConfigProvider for DefaultApplicationConfigProvider {
    fn config(&self) -> Result<ApplicationConfig, ErrorPtr> {
        self.config.clone()
    }
}

#[derive(Deserialize)]
struct OptionalApplicationConfig {
    install_tracing_logger: Option<bool>,
    validate_services: Option<bool>,
    parameters: Option<BTreeMap<String, serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use crate::config::{
        convert_error, ApplicationConfig, ApplicationConfigProvider,
        DefaultApplicationConfigProvider, OptionalApplicationConfig,
    };
    use config::{Config, ConfigError, File, FileFormat};
    use serde_json::json;

    #[test]
    fn should_merge_defaults() {
        let config = ApplicationConfig::from(OptionalApplicationConfig {
            install_tracing_logger: Some(false),
            validate_services: None,
            parameters: None,
        });

        assert!(!config.install_tracing_logger);
        assert!(config.validate_services);
        assert!(config.parameters.is_empty());
    }

    #[test]
    fn should_load_json_source() {
        let config = ApplicationConfig::init_from_builder(Config::builder().add_source(
            File::from_str(
                r#"{
                    "validate_services": false,
                    "parameters": {
                        "config": { "param1": "foo" },
                        "retries": 3
                    }
                }"#,
                FileFormat::Json,
            ),
        ))
        .unwrap();

        assert!(config.install_tracing_logger);
        assert!(!config.validate_services);
        assert_eq!(config.parameters["config"], json!({ "param1": "foo" }));
        assert_eq!(config.parameters["retries"], json!(3));
    }

    #[test]
    fn should_provide_given_config() {
        let mut config = ApplicationConfig::default();
        config.validate_services = false;

        let provider = DefaultApplicationConfigProvider::from(config.clone());
        assert_eq!(provider.config().unwrap(), config);
    }

    #[test]
    fn should_return_cached_error() {
        let provider = DefaultApplicationConfigProvider {
            config: Err(convert_error(ConfigError::Message("broken".to_string()))),
        };

        assert!(provider.config().is_err());
        assert!(provider.config().is_err());
    }
}
