//! Core application framework functionality.
//!
//! ```
//! use stk::application::Application;
//! use stk::config::ApplicationConfig;
//! use stk::runner::{ApplicationRunner, ErrorPtr};
//! use stk_service::descriptor::TypeDescriptor;
//!
//! #[derive(Default)]
//! struct HelloRunner;
//!
//! impl ApplicationRunner for HelloRunner {
//!     fn run(&self) -> Result<(), ErrorPtr> {
//!         println!("Hello world!");
//!         Ok(())
//!     }
//! }
//!
//! let mut config = ApplicationConfig::default();
//! config.install_tracing_logger = false;
//!
//! let mut application = Application::builder()
//!     .with_config(config)
//!     .with_descriptor(
//!         TypeDescriptor::builder::<HelloRunner>()
//!             .default_constructible()
//!             .build()
//!             .unwrap(),
//!     )
//!     .with_service::<HelloRunner>("hello")
//!     .with_runner::<HelloRunner>("hello")
//!     .build()
//!     .unwrap();
//!
//! application.run().unwrap();
//! ```

use crate::config::{
    ApplicationConfig, ApplicationConfigProvider, DefaultApplicationConfigProvider,
};
use crate::runner::{ApplicationRunner, ApplicationRunnerPtr, ErrorPtr};
use derive_more::Constructor;
use itertools::Itertools;
use std::any::{type_name, Any};
use std::cmp::Reverse;
use std::rc::Rc;
use stk_service::descriptor::{TypeCatalog, TypeDescriptor, TypeKey};
use stk_service::injectable::Injectable;
use stk_service::registry::{Container, RegistryPtr, ServiceRegistry};
use stk_service::resolver::Resolver;
use stk_service::service_key::ServiceKey;
use stk_service::value::{InstancePtr, Value};
use stk_service::Error as ServiceError;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info";

/// Function casting a resolved runner instance to [ApplicationRunnerPtr].
pub type RunnerCastFunction = fn(InstancePtr) -> Result<ApplicationRunnerPtr, InstancePtr>;

#[derive(Clone, Error, Debug)]
pub enum ApplicationError {
    #[error("Error loading configuration: {0}")]
    ConfigError(ErrorPtr),
    #[error("Error registering services: {0}")]
    RegistrationError(ServiceError),
    #[error("Invalid service '{key}': {error}")]
    ValidationError { key: ServiceKey, error: ServiceError },
    #[error("Error retrieving runners: {0}")]
    RunnerInjectionError(ServiceError),
    #[error("Runner error: {0}")]
    RunnerError(ErrorPtr),
}

/// Registration of a service type under a registry key.
#[derive(Clone, Debug, Constructor)]
pub struct ServiceDefinition {
    pub key: ServiceKey,
    pub type_key: TypeKey,
    /// Explicit arguments passed on each resolution.
    pub args: Vec<Value>,
    /// Lazy services are registered as [OnDemand](stk_service::on_demand::OnDemand) constructors
    /// instead of instances.
    pub lazy: bool,
}

impl ServiceDefinition {
    pub fn of<T: Any>(key: impl Into<ServiceKey>) -> Self {
        Self::new(key.into(), TypeKey::of::<T>(), Vec::new(), false)
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

#[derive(Clone, Debug)]
struct RunnerDefinition {
    key: ServiceKey,
    type_name: &'static str,
    cast: RunnerCastFunction,
}

fn cast_runner<T: ApplicationRunner + 'static>(
    instance: InstancePtr,
) -> Result<ApplicationRunnerPtr, InstancePtr> {
    instance
        .downcast::<T>()
        .map(|runner| runner as ApplicationRunnerPtr)
}

/// Collects everything needed to create an [Application].
#[derive(Default)]
pub struct ApplicationBuilder {
    catalog: TypeCatalog,
    descriptors: Vec<TypeDescriptor>,
    services: Vec<ServiceDefinition>,
    values: Vec<(ServiceKey, Value)>,
    runners: Vec<RunnerDefinition>,
    config_provider: Option<Box<dyn ApplicationConfigProvider>>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a type descriptor to the catalog.
    pub fn with_descriptor(mut self, descriptor: TypeDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Records that `T` carries the [Injectable] capability. Usually used for `dyn Trait` types
    /// declared as setter parameters.
    pub fn with_capability<T: Injectable + ?Sized>(mut self) -> Self {
        self.catalog.register_capability::<T>();
        self
    }

    /// Registers a service resolved anew on each lookup.
    pub fn with_service<T: Any>(self, key: impl Into<ServiceKey>) -> Self {
        self.with_definition(ServiceDefinition::of::<T>(key))
    }

    /// Registers a deferred constructor, creating the service only when requested.
    pub fn with_lazy_service<T: Any>(self, key: impl Into<ServiceKey>) -> Self {
        self.with_definition(ServiceDefinition::of::<T>(key).lazy())
    }

    pub fn with_definition(mut self, definition: ServiceDefinition) -> Self {
        self.services.push(definition);
        self
    }

    /// Registers a plain value. Values override configured parameters with the same key.
    pub fn with_value(mut self, key: impl Into<ServiceKey>, value: impl Into<Value>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    /// Marks the registry entry under given key as an [ApplicationRunner] of type `T`.
    pub fn with_runner<T: ApplicationRunner + 'static>(mut self, key: impl Into<ServiceKey>) -> Self {
        self.runners.push(RunnerDefinition {
            key: key.into(),
            type_name: type_name::<T>(),
            cast: cast_runner::<T>,
        });
        self
    }

    /// Uses a custom config provider instead of loading config from the environment.
    pub fn with_config_provider<P: ApplicationConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.config_provider = Some(Box::new(provider));
        self
    }

    /// Uses given config instead of loading it from the environment.
    pub fn with_config(self, config: ApplicationConfig) -> Self {
        self.with_config_provider(DefaultApplicationConfigProvider::from(config))
    }

    pub fn build(self) -> Result<Application, ApplicationError> {
        let config = match &self.config_provider {
            Some(provider) => provider.config(),
            None => DefaultApplicationConfigProvider::new().config(),
        }
        .map_err(ApplicationError::ConfigError)?;

        if config.install_tracing_logger {
            install_tracing_logger();
        }

        let mut catalog = self.catalog;
        for descriptor in self.descriptors {
            catalog
                .register(descriptor)
                .map_err(ApplicationError::RegistrationError)?;
        }

        let catalog = Rc::new(catalog);
        let container = Container::new();

        for (key, value) in config.parameters {
            container.set_value(key, Value::from(value));
        }

        for (key, value) in self.values {
            container.set_value(key, value);
        }

        for definition in &self.services {
            debug!(
                key = %definition.key,
                type_name = definition.type_key.name(),
                lazy = definition.lazy,
                "Registering service."
            );

            let type_id = definition.type_key.id();
            if !catalog.is_registered(type_id) {
                return Err(ApplicationError::RegistrationError(ServiceError::Metadata(format!(
                    "No descriptor registered for service '{}' of type {}",
                    definition.key,
                    definition.type_key.name()
                ))));
            }

            let entry = if definition.lazy {
                Resolver::on_demand_entry(catalog.clone(), type_id, definition.args.clone())
            } else {
                Resolver::service_entry(catalog.clone(), type_id, definition.args.clone())
            };

            container.set(definition.key.clone(), entry);
        }

        let resolver = Resolver::new(container.clone() as RegistryPtr, catalog);
        if config.validate_services {
            validate(&resolver, &self.services, &self.runners)?;
        }

        Ok(Application {
            container,
            resolver,
            runners: self.runners,
        })
    }
}

fn validate(
    resolver: &Resolver,
    services: &[ServiceDefinition],
    runners: &[RunnerDefinition],
) -> Result<(), ApplicationError> {
    for definition in services {
        resolver
            .validate(definition.type_key.id(), definition.args.len())
            .map_err(|error| ApplicationError::ValidationError {
                key: definition.key.clone(),
                error,
            })?;
    }

    for runner in runners {
        if !resolver.registry().has(runner.key.as_str()) {
            return Err(ApplicationError::ValidationError {
                key: runner.key.clone(),
                error: ServiceError::NotFound(runner.key.to_string()),
            });
        }
    }

    Ok(())
}

fn install_tracing_logger() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        debug!("Global tracing subscriber already installed.");
    }
}

/// Main entrypoint for the application. Owns the service registry and runs
/// [ApplicationRunners](crate::runner::ApplicationRunner).
pub struct Application {
    container: Rc<Container>,
    resolver: Resolver,
    runners: Vec<RunnerDefinition>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    #[inline]
    pub fn container(&self) -> &Rc<Container> {
        &self.container
    }

    #[inline]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn run(&mut self) -> Result<(), ApplicationError> {
        info!("Searching for application runners...");

        let runners = self
            .runners
            .iter()
            .map(|runner| self.runner_instance(runner))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApplicationError::RunnerInjectionError)?;

        info!(count = runners.len(), "Running application runners...");

        for runner in runners
            .iter()
            .sorted_by_key(|runner| Reverse(runner.priority()))
        {
            runner.run().map_err(ApplicationError::RunnerError)?;
        }

        Ok(())
    }

    fn runner_instance(
        &self,
        runner: &RunnerDefinition,
    ) -> Result<ApplicationRunnerPtr, ServiceError> {
        let instance = match self.container.get(runner.key.as_str())? {
            Value::Deferred(on_demand) => on_demand.get_instance(vec![])?,
            value => value,
        };

        let instance = instance
            .as_instance()
            .cloned()
            .ok_or(ServiceError::IncompatibleInstance(runner.type_name))?;

        (runner.cast)(instance).map_err(|_| ServiceError::IncompatibleInstance(runner.type_name))
    }
}

#[cfg(test)]
mod tests {
    use crate::application::{Application, ApplicationError, ServiceDefinition};
    use crate::config::{ApplicationConfig, MockApplicationConfigProvider};
    use crate::runner::{ErrorPtr, MockApplicationRunner};
    use std::cell::RefCell;
    use std::rc::Rc;
    use stk_service::descriptor::{ParameterDescriptor, TypeDescriptor};
    use stk_service::injectable::Injectable;
    use stk_service::registry::ServiceRegistry;
    use stk_service::value::Value;
    use stk_service::Error;

    fn config() -> ApplicationConfig {
        let mut config = ApplicationConfig::default();
        config.install_tracing_logger = false;
        config
    }

    fn failing_runner() -> MockApplicationRunner {
        let mut runner = MockApplicationRunner::new();
        runner.expect_priority().return_const(0);
        runner
            .expect_run()
            .returning(|| Err(Rc::new(Error::NotFound("broken".to_string())) as ErrorPtr));
        runner
    }

    struct Journal {
        entries: RefCell<Vec<String>>,
    }

    struct JournalRunner {
        journal: Rc<Journal>,
        name: String,
        priority: i8,
    }

    impl Injectable for JournalRunner {}

    impl crate::runner::ApplicationRunner for JournalRunner {
        fn run(&self) -> Result<(), ErrorPtr> {
            self.journal.entries.borrow_mut().push(self.name.clone());
            Ok(())
        }

        fn priority(&self) -> i8 {
            self.priority
        }
    }

    fn journal_runner() -> TypeDescriptor {
        TypeDescriptor::builder::<JournalRunner>()
            .injectable()
            .constructor(
                vec![
                    ParameterDescriptor::untyped("journal"),
                    ParameterDescriptor::untyped("name"),
                    ParameterDescriptor::untyped("priority"),
                ],
                |args| {
                    Ok(JournalRunner {
                        journal: args.instance(0)?,
                        name: args.string(1)?,
                        priority: args.value(2)?.as_int().unwrap_or_default() as i8,
                    })
                },
            )
            .build()
            .unwrap()
    }

    #[test]
    fn should_return_config_error() {
        let mut provider = MockApplicationConfigProvider::new();
        provider
            .expect_config()
            .times(1)
            .returning(|| Err(Rc::new(Error::NotFound("config".to_string())) as ErrorPtr));

        assert!(matches!(
            Application::builder()
                .with_config_provider(provider)
                .build()
                .err(),
            Some(ApplicationError::ConfigError(_))
        ));
    }

    #[test]
    fn should_seed_parameters() {
        let mut config = config();
        config
            .parameters
            .insert("retries".to_string(), serde_json::json!(3));

        let application = Application::builder()
            .with_config(config)
            .with_value("name", "stk")
            .build()
            .unwrap();

        assert_eq!(application.container().get("retries").unwrap(), Value::Int(3));
        assert_eq!(
            application.container().get("name").unwrap(),
            Value::from("stk")
        );
    }

    #[test]
    fn should_fail_validation_on_missing_dependency() {
        let result = Application::builder()
            .with_config(config())
            .with_descriptor(journal_runner())
            .with_service::<JournalRunner>("first")
            .build();

        assert!(matches!(
            result.err(),
            Some(ApplicationError::ValidationError { error: Error::NotFound(key), .. }) if key == "journal"
        ));
    }

    #[test]
    fn should_skip_validation_when_disabled() {
        let mut config = config();
        config.validate_services = false;

        assert!(Application::builder()
            .with_config(config)
            .with_descriptor(journal_runner())
            .with_service::<JournalRunner>("first")
            .build()
            .is_ok());
    }

    #[test]
    fn should_fail_on_undescribed_service() {
        assert!(matches!(
            Application::builder()
                .with_config(config())
                .with_service::<JournalRunner>("first")
                .build()
                .err(),
            Some(ApplicationError::RegistrationError(_))
        ));
    }

    #[test]
    fn should_return_runner_error() {
        let mut application = Application::builder()
            .with_config(config())
            .with_value("runner", Value::instance(failing_runner()))
            .with_runner::<MockApplicationRunner>("runner")
            .build()
            .unwrap();

        assert!(matches!(
            application.run().unwrap_err(),
            ApplicationError::RunnerError(_)
        ));
    }

    #[test]
    fn should_return_runner_injection_error() {
        let mut application = Application::builder()
            .with_config(config())
            .with_value("runner", "not a runner")
            .with_runner::<MockApplicationRunner>("runner")
            .build()
            .unwrap();

        assert!(matches!(
            application.run().unwrap_err(),
            ApplicationError::RunnerInjectionError(Error::IncompatibleInstance(_))
        ));
    }

    #[test]
    fn should_run_runners_by_priority() {
        let journal = Rc::new(Journal {
            entries: RefCell::new(Vec::new()),
        });

        let mut application = Application::builder()
            .with_config(config())
            .with_value("journal", Value::Instance(journal.clone()))
            .with_value("name", "default")
            .with_value("priority", 0)
            .with_descriptor(journal_runner())
            .with_definition(
                ServiceDefinition::of::<JournalRunner>("low")
                    .with_args(vec!["low".into(), Value::from(-10)]),
            )
            .with_definition(
                ServiceDefinition::of::<JournalRunner>("high")
                    .with_args(vec!["high".into(), Value::from(10)])
                    .lazy(),
            )
            .with_service::<JournalRunner>("default")
            .with_runner::<JournalRunner>("low")
            .with_runner::<JournalRunner>("high")
            .with_runner::<JournalRunner>("default")
            .build()
            .unwrap();

        application.run().unwrap();

        assert_eq!(*journal.entries.borrow(), vec!["high", "default", "low"]);
    }
}
