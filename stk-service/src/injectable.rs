//! The [Injectable] capability marker. Types carrying it opt in to name-based constructor
//! injection, and setter parameters declared with such a type are resolved from the registry.
//!
//! ```
//! use stk_service::descriptor::{ParameterDescriptor, TypeDescriptor};
//! use stk_service::injectable::Injectable;
//!
//! #[derive(Default)]
//! struct Mailer;
//!
//! impl Injectable for Mailer {}
//!
//! let descriptor = TypeDescriptor::builder::<Mailer>()
//!     .injectable()
//!     .default_constructible()
//!     .build()
//!     .unwrap();
//!
//! assert!(descriptor.is_injectable);
//! ```

use std::any::Any;

/// Marker trait for types taking part in dependency injection.
///
/// `dyn Injectable` itself is a valid declared parameter type, matching any injectable service.
pub trait Injectable: Any {}
