//! Dependency resolution engine. Given a type described in a
//! [TypeCatalog](descriptor::TypeCatalog) and a [ServiceRegistry](registry::ServiceRegistry) of
//! named services, the [Resolver](resolver::Resolver) constructs an instance and wires its
//! dependencies, without the caller enumerating every collaborator by hand.
//!
//! ```
//! use std::rc::Rc;
//! use stk_service::descriptor::{ParameterDescriptor, TypeCatalog, TypeDescriptor};
//! use stk_service::injectable::Injectable;
//! use stk_service::registry::{Container, RegistryPtr};
//! use stk_service::resolver::Resolver;
//! use stk_service::value::Value;
//!
//! struct Greeter {
//!     greeting: Value,
//! }
//!
//! impl Injectable for Greeter {}
//!
//! let catalog = TypeCatalog::new()
//!     .with_descriptor(
//!         TypeDescriptor::builder::<Greeter>()
//!             .injectable()
//!             .constructor(vec![ParameterDescriptor::untyped("greeting")], |args| {
//!                 Ok(Greeter {
//!                     greeting: args.value(0)?.clone(),
//!                 })
//!             })
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let container = Container::new();
//! container.set_value("greeting", "Hello");
//!
//! let resolver = Resolver::new(container.clone() as RegistryPtr, Rc::new(catalog));
//! let greeter = resolver.resolve_typed::<Greeter>(vec![]).unwrap();
//! assert_eq!(greeter.greeting, Value::from("Hello"));
//! ```

pub mod descriptor;
mod error;
pub mod injectable;
pub mod on_demand;
pub mod registry;
pub mod resolver;
pub mod service_key;
pub mod value;

pub use error::{Error, ErrorPtr};
