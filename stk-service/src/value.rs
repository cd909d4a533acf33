//! Dynamic values flowing through the registry and into constructor, setter and property slots.
//!
//! Resolution is driven by names rather than static types, so everything the resolver moves
//! around is a [Value]. Plain data (configuration, flags, strings) is stored directly, while
//! constructed services live behind an [InstancePtr] and are recovered with [Value::downcast].

use crate::error::Error;
use crate::on_demand::OnDemand;
use crate::registry::RegistryPtr;
use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Type-erased pointer to a constructed service instance.
pub type InstancePtr = Rc<dyn Any>;

/// Callable registry value, taking call-time arguments.
pub type ClosurePtr = Rc<dyn Fn(Vec<Value>) -> Result<Value, Error>>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A constructed service.
    Instance(InstancePtr),
    /// The registry itself, bound to `container` constructor parameters.
    Registry(RegistryPtr),
    /// A deferred constructor, see [OnDemand].
    Deferred(Rc<OnDemand>),
    Closure(ClosurePtr),
}

impl Value {
    /// Wraps a concrete value as a service instance.
    pub fn instance<T: Any>(value: T) -> Self {
        Self::Instance(Rc::new(value))
    }

    /// Wraps a function as a callable value.
    pub fn closure<F>(function: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, Error> + 'static,
    {
        Self::Closure(Rc::new(function))
    }

    /// Loose truthiness: `Null`, `false`, zero, empty strings, `"0"` and empty collections are
    /// falsy. Service instances, the registry and callables are always truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            Value::Float(value) => *value != 0.0,
            Value::Str(value) => !value.is_empty() && value != "0",
            Value::List(value) => !value.is_empty(),
            Value::Map(value) => !value.is_empty(),
            Value::Instance(_) | Value::Registry(_) | Value::Deferred(_) | Value::Closure(_) => true,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Tries to recover a concrete service type. Deferred constructors can be recovered as
    /// [OnDemand].
    pub fn downcast<T: Any>(&self) -> Result<Rc<T>, Error> {
        let instance = match self {
            Value::Instance(instance) => instance.clone(),
            Value::Deferred(on_demand) => on_demand.clone() as InstancePtr,
            _ => return Err(Error::IncompatibleInstance(type_name::<T>())),
        };

        instance
            .downcast::<T>()
            .map_err(|_| Error::IncompatibleInstance(type_name::<T>()))
    }

    pub fn as_instance(&self) -> Option<&InstancePtr> {
        match self {
            Value::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_registry(&self) -> Option<&RegistryPtr> {
        match self {
            Value::Registry(registry) => Some(registry),
            _ => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&Rc<OnDemand>> {
        match self {
            Value::Deferred(on_demand) => Some(on_demand),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&ClosurePtr> {
        match self {
            Value::Closure(closure) => Some(closure),
            _ => None,
        }
    }

    /// Invokes a callable value with given arguments.
    pub fn call(&self, args: Vec<Value>) -> Result<Value, Error> {
        match self {
            Value::Closure(closure) => closure(args),
            _ => Err(Error::IncompatibleInstance("closure")),
        }
    }
}

fn same_allocation<T: ?Sized, U: ?Sized>(lhs: &Rc<T>, rhs: &Rc<U>) -> bool {
    Rc::as_ptr(lhs) as *const () == Rc::as_ptr(rhs) as *const ()
}

/// Data is compared structurally, services and callables by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(lhs), Value::Bool(rhs)) => lhs == rhs,
            (Value::Int(lhs), Value::Int(rhs)) => lhs == rhs,
            (Value::Float(lhs), Value::Float(rhs)) => lhs == rhs,
            (Value::Str(lhs), Value::Str(rhs)) => lhs == rhs,
            (Value::List(lhs), Value::List(rhs)) => lhs == rhs,
            (Value::Map(lhs), Value::Map(rhs)) => lhs == rhs,
            (Value::Instance(lhs), Value::Instance(rhs)) => same_allocation(lhs, rhs),
            (Value::Registry(lhs), Value::Registry(rhs)) => same_allocation(lhs, rhs),
            (Value::Deferred(lhs), Value::Deferred(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Closure(lhs), Value::Closure(rhs)) => same_allocation(lhs, rhs),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
            Value::Int(value) => f.debug_tuple("Int").field(value).finish(),
            Value::Float(value) => f.debug_tuple("Float").field(value).finish(),
            Value::Str(value) => f.debug_tuple("Str").field(value).finish(),
            Value::List(value) => f.debug_tuple("List").field(value).finish(),
            Value::Map(value) => f.debug_tuple("Map").field(value).finish(),
            Value::Instance(_) => f.write_str("Instance(..)"),
            Value::Registry(_) => f.write_str("Registry(..)"),
            Value::Deferred(value) => f.debug_tuple("Deferred").field(value).finish(),
            Value::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Map(value)
    }
}

impl From<OnDemand> for Value {
    fn from(value: OnDemand) -> Self {
        Value::Deferred(Rc::new(value))
    }
}

impl From<Rc<OnDemand>> for Value {
    fn from(value: Rc<OnDemand>) -> Self {
        Value::Deferred(value)
    }
}

impl From<RegistryPtr> for Value {
    fn from(value: RegistryPtr) -> Self {
        Value::Registry(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(Value::Int)
                .or_else(|| number.as_f64().map(Value::Float))
                .unwrap_or_default(),
            serde_json::Value::String(value) => Value::Str(value),
            serde_json::Value::Array(values) => {
                Value::List(values.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(values) => Value::Map(
                values
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

/// Ordered arguments handed to constructors and setter methods.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments {
    values: Vec<Value>,
}

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> Result<&Value, Error> {
        self.values.get(index).ok_or(Error::Argument {
            index,
            expected: "a value",
        })
    }

    /// Moves the argument out, leaving `Null` in its place.
    pub fn take(&mut self, index: usize) -> Result<Value, Error> {
        self.values
            .get_mut(index)
            .map(std::mem::take)
            .ok_or(Error::Argument {
                index,
                expected: "a value",
            })
    }

    pub fn instance<T: Any>(&self, index: usize) -> Result<Rc<T>, Error> {
        self.value(index)?
            .downcast::<T>()
            .map_err(|_| Error::Argument {
                index,
                expected: type_name::<T>(),
            })
    }

    /// Like [Arguments::instance], but maps `Null` to `None`.
    pub fn optional_instance<T: Any>(&self, index: usize) -> Result<Option<Rc<T>>, Error> {
        match self.value(index)? {
            Value::Null => Ok(None),
            _ => self.instance(index).map(Some),
        }
    }

    pub fn string(&self, index: usize) -> Result<String, Error> {
        self.value(index)?
            .as_str()
            .map(str::to_string)
            .ok_or(Error::Argument {
                index,
                expected: "a string",
            })
    }

    pub fn boolean(&self, index: usize) -> Result<bool, Error> {
        self.value(index)?.as_bool().ok_or(Error::Argument {
            index,
            expected: "a boolean",
        })
    }

    pub fn deferred(&self, index: usize) -> Result<Rc<OnDemand>, Error> {
        self.value(index)?
            .as_deferred()
            .cloned()
            .ok_or(Error::Argument {
                index,
                expected: "a deferred constructor",
            })
    }

    pub fn registry(&self, index: usize) -> Result<RegistryPtr, Error> {
        self.value(index)?
            .as_registry()
            .cloned()
            .ok_or(Error::Argument {
                index,
                expected: "a service registry",
            })
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
