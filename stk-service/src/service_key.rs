//! Registry keys. Resolution looks services up by parameter and property names, so keys are plain
//! strings underneath, but wrapped in a distinct type to keep them apart from ordinary string
//! values.

use derive_more::{Display, From};
use std::borrow::Borrow;

/// Key of an entry in a [ServiceRegistry](crate::registry::ServiceRegistry).
#[derive(Clone, Debug, Display, From, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct ServiceKey(String);

impl ServiceKey {
    pub fn new<T: Into<String>>(key: T) -> Self {
        Self(key.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceKey {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for ServiceKey {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ServiceKey {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ServiceKey {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
