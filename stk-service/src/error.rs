use std::error::Error as StdError;
use std::rc::Rc;
use thiserror::Error;

/// Shared pointer to an arbitrary error raised by user-provided constructors or setters.
pub type ErrorPtr = Rc<dyn StdError + 'static>;

/// Errors raised while resolving, constructing and wiring service instances.
#[derive(Error, Clone, Debug)]
pub enum Error {
    #[error("Cannot find service entry: {0}")]
    NotFound(String),
    #[error("Invalid type metadata: {0}")]
    Metadata(String),
    #[error("Constructor of {type_name} declares {declared} parameters, but {supplied} explicit arguments were supplied")]
    OverSupply {
        type_name: &'static str,
        declared: usize,
        supplied: usize,
    },
    #[error("Missing argument '{parameter}' for constructor of {type_name}")]
    MissingArgument {
        type_name: &'static str,
        parameter: String,
    },
    #[error("Argument {index} is missing or not {expected}")]
    Argument { index: usize, expected: &'static str },
    #[error("Tried to downcast instance to incompatible type: {0}")]
    IncompatibleInstance(&'static str),
    #[error("Service registry is no longer available")]
    RegistryDropped,
    #[error("Service construction failed: {0}")]
    Custom(ErrorPtr),
}

impl Error {
    /// Wraps any error coming from user code.
    pub fn custom<E: StdError + 'static>(error: E) -> Self {
        Self::Custom(Rc::new(error))
    }

    /// Checks if this error signals a missing registry entry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
