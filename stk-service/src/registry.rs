//! The service registry is a named-value store consulted by name during resolution. Entries are
//! either plain [Value]s or [DeferredValue]s - thunks evaluated on every lookup, which is how
//! services get constructed only when somebody asks for them.
//!
//! The resolver only consumes the [ServiceRegistry] capability. [Container] is a simple
//! in-memory implementation, good enough for most applications and tests.

use crate::error::Error;
use crate::service_key::ServiceKey;
use crate::value::Value;
use fxhash::FxHashMap;
use itertools::Itertools;
#[cfg(test)]
use mockall::automock;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

pub type RegistryPtr = Rc<dyn ServiceRegistry>;

/// Thunk producing a value on lookup. Receives the registry it has been looked up in.
pub type DeferredValue = Rc<dyn Fn(&RegistryPtr) -> Result<Value, Error>>;

/// Raw registry entry.
#[derive(Clone)]
pub enum RegistryEntry {
    Value(Value),
    Deferred(DeferredValue),
}

impl RegistryEntry {
    pub fn deferred<F>(thunk: F) -> Self
    where
        F: Fn(&RegistryPtr) -> Result<Value, Error> + 'static,
    {
        Self::Deferred(Rc::new(thunk))
    }
}

impl Debug for RegistryEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryEntry::Value(value) => f.debug_tuple("Value").field(value).finish(),
            RegistryEntry::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<Value> for RegistryEntry {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Named-value store of services and configuration.
#[cfg_attr(test, automock)]
pub trait ServiceRegistry {
    /// Checks if there's an entry with given key.
    fn has(&self, key: &str) -> bool;

    /// Returns the value for given key, evaluating deferred entries. Evaluation is not memoized.
    fn get(&self, key: &str) -> Result<Value, Error>;

    /// Adds or replaces an entry.
    fn set(&self, key: ServiceKey, entry: RegistryEntry);

    /// Removes an entry. Removing a missing key is a no-op.
    fn remove(&self, key: &str);
}

/// In-memory [ServiceRegistry]. Always handled through an [Rc], so deferred entries can receive
/// the container they were looked up in.
///
/// Entries holding [Value::Null] are treated as absent.
pub struct Container {
    this: Weak<Container>,
    storage: RefCell<FxHashMap<ServiceKey, RegistryEntry>>,
}

impl Container {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Rc<Self> {
        Self::with_entries(Vec::new())
    }

    /// Creates a container pre-populated with given entries.
    pub fn with_entries<I>(entries: I) -> Rc<Self>
    where
        I: IntoIterator<Item = (ServiceKey, RegistryEntry)>,
    {
        let storage = entries.into_iter().collect();
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            storage: RefCell::new(storage),
        })
    }

    /// Stores a plain value.
    pub fn set_value<K: Into<ServiceKey>, V: Into<Value>>(&self, key: K, value: V) {
        self.set(key.into(), RegistryEntry::Value(value.into()));
    }

    /// Stores a thunk evaluated on every lookup.
    pub fn set_deferred<K, F>(&self, key: K, thunk: F)
    where
        K: Into<ServiceKey>,
        F: Fn(&RegistryPtr) -> Result<Value, Error> + 'static,
    {
        self.set(key.into(), RegistryEntry::deferred(thunk));
    }

    /// Returns all registered keys in sorted order.
    pub fn keys(&self) -> Vec<ServiceKey> {
        self.storage.borrow().keys().cloned().sorted().collect()
    }

    /// Returns a shared handle to this container.
    pub fn handle(&self) -> Result<RegistryPtr, Error> {
        self.this
            .upgrade()
            .map(|this| this as RegistryPtr)
            .ok_or(Error::RegistryDropped)
    }
}

impl ServiceRegistry for Container {
    fn has(&self, key: &str) -> bool {
        matches!(
            self.storage.borrow().get(key),
            Some(entry) if !matches!(entry, RegistryEntry::Value(Value::Null))
        )
    }

    fn get(&self, key: &str) -> Result<Value, Error> {
        trace!(key, "Looking up service entry.");

        // the borrow must end before evaluation, since thunks usually look up other entries
        let entry = self
            .storage
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))?;

        match entry {
            RegistryEntry::Value(Value::Null) => Err(Error::NotFound(key.to_string())),
            RegistryEntry::Value(value) => Ok(value),
            RegistryEntry::Deferred(thunk) => {
                debug!(key, "Evaluating deferred service entry.");
                thunk(&self.handle()?)
            }
        }
    }

    fn set(&self, key: ServiceKey, entry: RegistryEntry) {
        self.storage.borrow_mut().insert(key, entry);
    }

    fn remove(&self, key: &str) {
        self.storage.borrow_mut().remove(key);
    }
}

impl Debug for Container {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::{Container, RegistryPtr, ServiceRegistry};
    use crate::value::Value;
    use crate::Error;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn should_set_and_get() {
        let container = Container::new();
        container.set_value("foo", "bar");

        assert!(container.has("foo"));
        assert_eq!(container.get("foo").unwrap(), Value::from("bar"));
    }

    #[test]
    fn should_not_find_missing_entry() {
        let container = Container::new();

        assert!(!container.has("foo"));
        assert!(matches!(container.get("foo"), Err(Error::NotFound(key)) if key == "foo"));
    }

    #[test]
    fn should_treat_null_as_absent() {
        let container = Container::new();
        container.set_value("foo", Value::Null);

        assert!(!container.has("foo"));
        assert!(container.get("foo").unwrap_err().is_not_found());
    }

    #[test]
    fn should_remove_entries() {
        let container = Container::new();
        container.set_value("foo", "bar");
        container.remove("foo");
        container.remove("missing");

        assert!(!container.has("foo"));
        assert!(container.keys().is_empty());
    }

    #[test]
    fn should_evaluate_deferred_entries_on_every_lookup() {
        let calls = Rc::new(Cell::new(0));
        let container = Container::new();
        container.set_value("name", "value");

        let counter = calls.clone();
        container.set_deferred("lazy", move |registry: &RegistryPtr| {
            counter.set(counter.get() + 1);
            registry.get("name")
        });

        assert_eq!(calls.get(), 0);
        assert_eq!(container.get("lazy").unwrap(), Value::from("value"));
        assert_eq!(container.get("lazy").unwrap(), Value::from("value"));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn should_pass_itself_to_deferred_entries() {
        let container = Container::new();
        container.set_deferred("self", |registry: &RegistryPtr| {
            Ok(Value::Registry(registry.clone()))
        });

        let registry = container.get("self").unwrap();
        let handle = container.handle().unwrap();
        assert_eq!(registry, Value::Registry(handle));
    }

    #[test]
    fn should_list_sorted_keys() {
        let container = Container::new();
        container.set_value("b", 1);
        container.set_value("a", 2);

        let keys: Vec<_> = container
            .keys()
            .into_iter()
            .map(|key| key.to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
