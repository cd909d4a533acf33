//! Deferred construction. An [OnDemand] wraps a construction thunk, so expensive services can be
//! registered without being built until first use.

use crate::error::Error;
use crate::injectable::Injectable;
use crate::value::Value;
use derivative::Derivative;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

pub type ConstructorThunk = Box<dyn Fn(Vec<Value>) -> Result<Value, Error>>;

/// Lazily-invoked, optionally memoizing construction wrapper.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct OnDemand {
    #[derivative(Debug = "ignore")]
    constructor: ConstructorThunk,
    instance: RefCell<Option<Value>>,
}

impl Injectable for OnDemand {}

impl OnDemand {
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, Error> + 'static,
    {
        Self {
            constructor: Box::new(constructor),
            instance: RefCell::new(None),
        }
    }

    /// Returns the cached instance, constructing it with given arguments on first call. Arguments
    /// passed on subsequent calls are ignored. A failed construction leaves nothing cached.
    pub fn get_instance(&self, args: Vec<Value>) -> Result<Value, Error> {
        if let Some(instance) = self.instance.borrow().as_ref() {
            return Ok(instance.clone());
        }

        let instance = (self.constructor)(args)?;

        // a re-entrant call might have won the race
        let mut cache = self.instance.borrow_mut();
        let instance = cache.get_or_insert(instance).clone();
        Ok(instance)
    }

    /// Always constructs a fresh instance, never touching the cache.
    #[inline]
    pub fn new_instance(&self, args: Vec<Value>) -> Result<Value, Error> {
        (self.constructor)(args)
    }

    /// Typesafe version of [OnDemand::get_instance].
    pub fn get_typed<T: Any>(&self, args: Vec<Value>) -> Result<Rc<T>, Error> {
        self.get_instance(args)?.downcast()
    }

    /// Typesafe version of [OnDemand::new_instance].
    pub fn new_typed<T: Any>(&self, args: Vec<Value>) -> Result<Rc<T>, Error> {
        self.new_instance(args)?.downcast()
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.instance.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use crate::on_demand::OnDemand;
    use crate::value::Value;
    use crate::Error;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Pair(Value, Value);

    fn pair_constructor() -> OnDemand {
        OnDemand::new(|args| {
            let mut args = args.into_iter();
            Ok(Value::instance(Pair(
                args.next().unwrap_or_default(),
                args.next().unwrap_or_default(),
            )))
        })
    }

    #[test]
    fn should_memoize_first_instance() {
        let on_demand = pair_constructor();
        assert!(!on_demand.is_initialized());

        let first = on_demand
            .get_typed::<Pair>(vec!["a".into(), "b".into()])
            .unwrap();
        let second = on_demand
            .get_typed::<Pair>(vec!["c".into(), "d".into()])
            .unwrap();

        assert!(on_demand.is_initialized());
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(second.0, Value::from("a"));
        assert_eq!(second.1, Value::from("b"));
    }

    #[test]
    fn should_create_new_instances() {
        let on_demand = pair_constructor();

        let first = on_demand
            .new_typed::<Pair>(vec!["a".into(), "b".into()])
            .unwrap();
        let second = on_demand
            .new_typed::<Pair>(vec!["c".into(), "d".into()])
            .unwrap();

        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(first.0, Value::from("a"));
        assert_eq!(second.1, Value::from("d"));
        assert!(!on_demand.is_initialized());
    }

    #[test]
    fn should_not_cache_failures() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let on_demand = OnDemand::new(move |_| {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                Err(Error::NotFound("serviceA".to_string()))
            } else {
                Ok(Value::Int(1))
            }
        });

        assert!(on_demand.get_instance(vec![]).is_err());
        assert_eq!(on_demand.get_instance(vec![]).unwrap(), Value::Int(1));
        assert_eq!(on_demand.get_instance(vec![]).unwrap(), Value::Int(1));
        assert_eq!(calls.get(), 2);
    }
}
