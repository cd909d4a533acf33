//! Type metadata consumed by the [Resolver](crate::resolver::Resolver). There's no runtime
//! reflection to discover constructors, hidden setters or injection markers, so each
//! constructible type is described once at startup with a [TypeDescriptorBuilder] and stored in a
//! [TypeCatalog].
//!
//! ```
//! use stk_service::descriptor::{Inject, ParameterDescriptor, TypeDescriptor};
//! use stk_service::injectable::Injectable;
//! use stk_service::value::{InstancePtr, Value};
//!
//! struct Mailer {
//!     transport: InstancePtr,
//!     sender: Value,
//!     logger: Option<InstancePtr>,
//! }
//!
//! impl Injectable for Mailer {}
//!
//! let descriptor = TypeDescriptor::builder::<Mailer>()
//!     .injectable()
//!     // transport is injected by name, sender is usually passed explicitly
//!     .constructor(
//!         vec![
//!             ParameterDescriptor::untyped("transport"),
//!             ParameterDescriptor::untyped("sender").with_default("noreply"),
//!         ],
//!         |args| {
//!             Ok(Mailer {
//!                 transport: args.value(0)?.as_instance().cloned().unwrap_or_else(|| {
//!                     std::rc::Rc::new(()) as InstancePtr
//!                 }),
//!                 sender: args.value(1)?.clone(),
//!                 logger: None,
//!             })
//!         },
//!     )
//!     .property("logger", |mailer: &mut Mailer, value| {
//!         mailer.logger = value.as_instance().cloned();
//!         Ok(())
//!     })
//!     .inject_property("logger", Inject::new())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(descriptor.constructor().unwrap().parameters.len(), 2);
//! ```

use crate::error::Error;
use crate::injectable::Injectable;
use crate::on_demand::OnDemand;
use crate::value::{Arguments, Value};
use derivative::Derivative;
use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use std::any::{type_name, Any, TypeId};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

pub type ConstructorFn = Rc<dyn Fn(Arguments) -> Result<Box<dyn Any>, Error>>;

pub type MethodFn = Rc<dyn Fn(&mut dyn Any, Arguments) -> Result<(), Error>>;

pub type PropertyWriter = Rc<dyn Fn(&mut dyn Any, Value) -> Result<(), Error>>;

pub type InstantiateFn = fn() -> Box<dyn Any>;

pub type CatalogPtr = Rc<TypeCatalog>;

/// Runtime identity of a type, together with its name for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Declared type of a parameter or property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeclaredType {
    /// A single named type.
    Named(TypeKey),
    /// The callable capability, matched by [Value::Closure] registry values.
    Closure,
    /// Union of types. Never resolved by setter injection.
    Union(Vec<DeclaredType>),
}

impl DeclaredType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Named(TypeKey::of::<T>())
    }
}

/// Constructor or method parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub declared_type: Option<DeclaredType>,
    pub default: Option<Value>,
}

impl ParameterDescriptor {
    /// Parameter without a declared type.
    pub fn untyped<T: ToString>(name: T) -> Self {
        Self {
            name: name.to_string(),
            declared_type: None,
            default: None,
        }
    }

    /// Parameter declared with a single named type.
    pub fn typed<T: ?Sized + 'static, N: ToString>(name: N) -> Self {
        Self {
            declared_type: Some(DeclaredType::of::<T>()),
            ..Self::untyped(name)
        }
    }

    /// Parameter declared with the callable type.
    pub fn closure<T: ToString>(name: T) -> Self {
        Self {
            declared_type: Some(DeclaredType::Closure),
            ..Self::untyped(name)
        }
    }

    /// Parameter declared with a union of types.
    pub fn union<T: ToString>(name: T, types: Vec<DeclaredType>) -> Self {
        Self {
            declared_type: Some(DeclaredType::Union(types)),
            ..Self::untyped(name)
        }
    }

    /// Sets the default value.
    pub fn with_default<V: Into<Value>>(mut self, default: V) -> Self {
        self.default = Some(default.into());
        self
    }

    #[inline]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Declarative injection marker. On a class, it names a registry `id` to inject into the property
/// `prop` (or the property named like the id). On a property, it names the registry `id` to inject
/// (or the property name itself).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inject {
    pub id: Option<String>,
    pub prop: Option<String>,
}

impl Inject {
    /// Marker without an id. Ignored on classes, injects by property name on properties.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named<T: ToString>(id: T) -> Self {
        Self {
            id: Some(id.to_string()),
            prop: None,
        }
    }

    /// Overrides the target property of a class-level marker.
    pub fn targeting<T: ToString>(mut self, prop: T) -> Self {
        self.prop = Some(prop.to_string());
        self
    }
}

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ConstructorDescriptor {
    pub parameters: Vec<ParameterDescriptor>,
    #[derivative(Debug = "ignore")]
    pub function: ConstructorFn,
}

/// Hidden setter method, considered for setter injection.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct MethodDescriptor {
    pub name: String,
    pub parameters: Vec<ParameterDescriptor>,
    #[derivative(Debug = "ignore")]
    pub invoke: MethodFn,
}

/// Hidden property, writable by declarative injection.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct PropertyDescriptor {
    pub name: String,
    pub declared_type: Option<DeclaredType>,
    pub markers: Vec<Inject>,
    #[derivative(Debug = "ignore")]
    pub write: PropertyWriter,
}

/// How instances of a type come to life.
#[derive(Clone, Debug)]
pub enum Instantiation {
    /// No constructor declared - instances are created without arguments.
    Default(InstantiateFn),
    Constructor(ConstructorDescriptor),
}

/// Metadata view of a constructible type.
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    pub key: TypeKey,
    /// Does the type carry the [Injectable] capability marker.
    pub is_injectable: bool,
    pub instantiation: Instantiation,
    pub methods: Vec<MethodDescriptor>,
    pub properties: Vec<PropertyDescriptor>,
    /// Class-level markers, in declaration order.
    pub markers: Vec<Inject>,
}

impl TypeDescriptor {
    pub fn builder<T: Any>() -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder::new()
    }

    pub fn constructor(&self) -> Option<&ConstructorDescriptor> {
        match &self.instantiation {
            Instantiation::Constructor(constructor) => Some(constructor),
            Instantiation::Default(_) => None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties
            .iter()
            .find(|property| property.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|method| method.name == name)
    }
}

fn instantiate_default<T: Any + Default>() -> Box<dyn Any> {
    Box::<T>::default()
}

/// Typed builder for [TypeDescriptor]s.
pub struct TypeDescriptorBuilder<T> {
    is_injectable: bool,
    instantiation: Option<Instantiation>,
    methods: Vec<MethodDescriptor>,
    properties: Vec<PropertyDescriptor>,
    markers: Vec<Inject>,
    property_markers: Vec<(String, Inject)>,
    _type: PhantomData<fn() -> T>,
}

impl<T: Any> Default for TypeDescriptorBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Any> TypeDescriptorBuilder<T> {
    pub fn new() -> Self {
        Self {
            is_injectable: false,
            instantiation: None,
            methods: Vec::new(),
            properties: Vec::new(),
            markers: Vec::new(),
            property_markers: Vec::new(),
            _type: PhantomData,
        }
    }

    /// Declares a constructor. Arguments arrive in parameter declaration order.
    pub fn constructor<F>(mut self, parameters: Vec<ParameterDescriptor>, function: F) -> Self
    where
        F: Fn(Arguments) -> Result<T, Error> + 'static,
    {
        self.instantiation = Some(Instantiation::Constructor(ConstructorDescriptor {
            parameters,
            function: Rc::new(move |args: Arguments| {
                function(args).map(|instance| Box::new(instance) as Box<dyn Any>)
            }),
        }));
        self
    }

    /// Declares a hidden setter method.
    pub fn method<N, F>(mut self, name: N, parameters: Vec<ParameterDescriptor>, function: F) -> Self
    where
        N: ToString,
        F: Fn(&mut T, Arguments) -> Result<(), Error> + 'static,
    {
        self.methods.push(MethodDescriptor {
            name: name.to_string(),
            parameters,
            invoke: Rc::new(move |instance: &mut dyn Any, args: Arguments| {
                let instance = instance
                    .downcast_mut::<T>()
                    .ok_or(Error::IncompatibleInstance(type_name::<T>()))?;
                function(instance, args)
            }),
        });
        self
    }

    /// Declares a hidden property without a declared type.
    pub fn property<N, F>(self, name: N, write: F) -> Self
    where
        N: ToString,
        F: Fn(&mut T, Value) -> Result<(), Error> + 'static,
    {
        self.push_property(name.to_string(), None, write)
    }

    /// Declares a hidden property of type `P`.
    pub fn typed_property<P, N, F>(self, name: N, write: F) -> Self
    where
        P: ?Sized + 'static,
        N: ToString,
        F: Fn(&mut T, Value) -> Result<(), Error> + 'static,
    {
        self.push_property(name.to_string(), Some(DeclaredType::of::<P>()), write)
    }

    /// Attaches a marker to a property declared with [TypeDescriptorBuilder::property].
    pub fn inject_property<N: ToString>(mut self, name: N, marker: Inject) -> Self {
        self.property_markers.push((name.to_string(), marker));
        self
    }

    /// Adds a class-level marker. Markers are applied in the order they are added.
    pub fn inject_class(mut self, marker: Inject) -> Self {
        self.markers.push(marker);
        self
    }

    fn push_property<F>(mut self, name: String, declared_type: Option<DeclaredType>, write: F) -> Self
    where
        F: Fn(&mut T, Value) -> Result<(), Error> + 'static,
    {
        self.properties.push(PropertyDescriptor {
            name,
            declared_type,
            markers: Vec::new(),
            write: Rc::new(move |instance: &mut dyn Any, value: Value| {
                let instance = instance
                    .downcast_mut::<T>()
                    .ok_or(Error::IncompatibleInstance(type_name::<T>()))?;
                write(instance, value)
            }),
        });
        self
    }

    pub fn build(self) -> Result<TypeDescriptor, Error> {
        let name = type_name::<T>();
        let instantiation = self.instantiation.ok_or_else(|| {
            Error::Metadata(format!(
                "{name} declares neither a constructor nor default instantiation"
            ))
        })?;

        if let Some(duplicate) = self.methods.iter().map(|method| &method.name).duplicates().next() {
            return Err(Error::Metadata(format!(
                "{name} declares method '{duplicate}' more than once"
            )));
        }

        if let Some(duplicate) = self
            .properties
            .iter()
            .map(|property| &property.name)
            .duplicates()
            .next()
        {
            return Err(Error::Metadata(format!(
                "{name} declares property '{duplicate}' more than once"
            )));
        }

        let mut properties = self.properties;
        for (property_name, marker) in self.property_markers {
            let property = properties
                .iter_mut()
                .find(|property| property.name == property_name)
                .ok_or_else(|| {
                    Error::Metadata(format!(
                        "Injection marker targets unknown property '{property_name}' of {name}"
                    ))
                })?;

            property.markers.push(marker);
        }

        for marker in &self.markers {
            if let Some(id) = &marker.id {
                let target = marker.prop.as_ref().unwrap_or(id);
                if !properties.iter().any(|property| &property.name == target) {
                    return Err(Error::Metadata(format!(
                        "Class injection marker '{id}' targets unknown property '{target}' of {name}"
                    )));
                }
            }
        }

        Ok(TypeDescriptor {
            key: TypeKey::of::<T>(),
            is_injectable: self.is_injectable,
            instantiation,
            methods: self.methods,
            properties,
            markers: self.markers,
        })
    }
}

impl<T: Any + Default> TypeDescriptorBuilder<T> {
    /// Declares the type as having no constructor - instances are created with
    /// [Default::default].
    pub fn default_constructible(mut self) -> Self {
        self.instantiation = Some(Instantiation::Default(instantiate_default::<T>));
        self
    }
}

impl<T: Injectable> TypeDescriptorBuilder<T> {
    /// Marks the type as carrying the [Injectable] capability.
    pub fn injectable(mut self) -> Self {
        self.is_injectable = true;
        self
    }
}

/// Explicit registry of type descriptors and of types carrying the [Injectable] capability.
#[derive(Clone, Debug)]
pub struct TypeCatalog {
    descriptors: FxHashMap<TypeId, Rc<TypeDescriptor>>,
    injectables: FxHashSet<TypeId>,
}

impl Default for TypeCatalog {
    fn default() -> Self {
        let mut catalog = Self {
            descriptors: Default::default(),
            injectables: Default::default(),
        };

        catalog.register_capability::<dyn Injectable>();
        catalog.register_capability::<OnDemand>();
        catalog
    }
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new descriptor. Injectable descriptors also register their type capability.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<(), Error> {
        let key = descriptor.key;
        if self.descriptors.contains_key(&key.id()) {
            return Err(Error::Metadata(format!(
                "Attempted to re-register type: {}",
                key.name()
            )));
        }

        if descriptor.is_injectable {
            self.injectables.insert(key.id());
        }

        self.descriptors.insert(key.id(), Rc::new(descriptor));
        Ok(())
    }

    /// Builder-style version of [TypeCatalog::register].
    pub fn with_descriptor(mut self, descriptor: TypeDescriptor) -> Result<Self, Error> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Records that `T` carries the [Injectable] capability, without describing how to build it.
    /// Useful for `dyn Trait` types used as declared parameter types.
    pub fn register_capability<T: Injectable + ?Sized>(&mut self) {
        self.injectables.insert(TypeId::of::<T>());
    }

    pub fn descriptor(&self, type_id: TypeId) -> Result<Rc<TypeDescriptor>, Error> {
        self.descriptors
            .get(&type_id)
            .cloned()
            .ok_or_else(|| Error::Metadata(format!("No descriptor registered for {type_id:?}")))
    }

    /// Typesafe version of [TypeCatalog::descriptor].
    pub fn descriptor_of<T: Any>(&self) -> Result<Rc<TypeDescriptor>, Error> {
        self.descriptors
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| {
                Error::Metadata(format!("No descriptor registered for {}", type_name::<T>()))
            })
    }

    #[inline]
    pub fn is_registered(&self, type_id: TypeId) -> bool {
        self.descriptors.contains_key(&type_id)
    }

    /// Capability query: does the type carry the [Injectable] marker.
    #[inline]
    pub fn implements_injectable(&self, type_id: TypeId) -> bool {
        self.injectables.contains(&type_id)
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{
        DeclaredType, Inject, ParameterDescriptor, TypeCatalog, TypeDescriptor, TypeKey,
    };
    use crate::injectable::Injectable;
    use crate::on_demand::OnDemand;
    use crate::value::{Arguments, Value};
    use crate::Error;
    use std::any::{Any, TypeId};

    #[derive(Default)]
    struct TestService {
        name: Value,
        calls: usize,
    }

    impl Injectable for TestService {}

    #[derive(Default)]
    struct ForeignService;

    #[test]
    fn should_describe_parameters() {
        let parameter = ParameterDescriptor::typed::<TestService, _>("service").with_default(1);

        assert_eq!(parameter.name, "service");
        assert_eq!(
            parameter.declared_type,
            Some(DeclaredType::Named(TypeKey::of::<TestService>()))
        );
        assert!(parameter.has_default());
        assert!(!ParameterDescriptor::closure("factory").has_default());
    }

    #[test]
    fn should_build_descriptor() {
        let descriptor = TypeDescriptor::builder::<TestService>()
            .injectable()
            .constructor(vec![ParameterDescriptor::untyped("name")], |args| {
                Ok(TestService {
                    name: args.value(0)?.clone(),
                    calls: 0,
                })
            })
            .method("touch", vec![], |service: &mut TestService, _| {
                service.calls += 1;
                Ok(())
            })
            .property("name", |service: &mut TestService, value| {
                service.name = value;
                Ok(())
            })
            .inject_property("name", Inject::named("serviceName"))
            .inject_class(Inject::new())
            .build()
            .unwrap();

        assert!(descriptor.is_injectable);
        assert_eq!(descriptor.key, TypeKey::of::<TestService>());
        assert_eq!(
            descriptor.property("name").unwrap().markers,
            vec![Inject::named("serviceName")]
        );

        let constructor = descriptor.constructor().unwrap();
        let mut instance = (constructor.function)(Arguments::new(vec!["foo".into()])).unwrap();

        (descriptor.method("touch").unwrap().invoke)(instance.as_mut(), Arguments::default())
            .unwrap();
        (descriptor.property("name").unwrap().write)(instance.as_mut(), "bar".into()).unwrap();

        let instance = instance.downcast::<TestService>().unwrap();
        assert_eq!(instance.calls, 1);
        assert_eq!(instance.name, Value::from("bar"));
    }

    #[test]
    fn should_reject_incompatible_instances() {
        let descriptor = TypeDescriptor::builder::<TestService>()
            .default_constructible()
            .method("touch", vec![], |_: &mut TestService, _| Ok(()))
            .build()
            .unwrap();

        let mut instance = Box::new(ForeignService) as Box<dyn Any>;
        assert!(matches!(
            (descriptor.methods[0].invoke)(instance.as_mut(), Arguments::default()),
            Err(Error::IncompatibleInstance(_))
        ));
    }

    #[test]
    fn should_require_instantiation() {
        assert!(matches!(
            TypeDescriptor::builder::<ForeignService>().build(),
            Err(Error::Metadata(_))
        ));
    }

    #[test]
    fn should_reject_markers_for_unknown_properties() {
        assert!(matches!(
            TypeDescriptor::builder::<ForeignService>()
                .default_constructible()
                .inject_property("missing", Inject::new())
                .build(),
            Err(Error::Metadata(_))
        ));

        assert!(matches!(
            TypeDescriptor::builder::<ForeignService>()
                .default_constructible()
                .inject_class(Inject::named("serviceB").targeting("missing"))
                .build(),
            Err(Error::Metadata(_))
        ));

        // markers without an id don't target anything
        assert!(TypeDescriptor::builder::<ForeignService>()
            .default_constructible()
            .inject_class(Inject::new())
            .build()
            .is_ok());
    }

    #[test]
    fn should_reject_duplicate_members() {
        assert!(matches!(
            TypeDescriptor::builder::<TestService>()
                .default_constructible()
                .property("name", |_: &mut TestService, _| Ok(()))
                .property("name", |_: &mut TestService, _| Ok(()))
                .build(),
            Err(Error::Metadata(_))
        ));
    }

    #[test]
    fn should_track_injectable_capability() {
        let mut catalog = TypeCatalog::new();
        catalog
            .register(
                TypeDescriptor::builder::<TestService>()
                    .injectable()
                    .default_constructible()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register(
                TypeDescriptor::builder::<ForeignService>()
                    .default_constructible()
                    .build()
                    .unwrap(),
            )
            .unwrap();

        assert!(catalog.implements_injectable(TypeId::of::<TestService>()));
        assert!(catalog.implements_injectable(TypeId::of::<dyn Injectable>()));
        assert!(catalog.implements_injectable(TypeId::of::<OnDemand>()));
        assert!(!catalog.implements_injectable(TypeId::of::<ForeignService>()));
        assert!(catalog.is_registered(TypeId::of::<ForeignService>()));
        assert!(catalog.descriptor_of::<ForeignService>().is_ok());
    }

    #[test]
    fn should_reject_duplicate_descriptors() {
        let catalog = TypeCatalog::new()
            .with_descriptor(
                TypeDescriptor::builder::<ForeignService>()
                    .default_constructible()
                    .build()
                    .unwrap(),
            )
            .unwrap();

        assert!(matches!(
            catalog.with_descriptor(
                TypeDescriptor::builder::<ForeignService>()
                    .default_constructible()
                    .build()
                    .unwrap(),
            ),
            Err(Error::Metadata(_))
        ));
    }

    #[test]
    fn should_fail_on_unknown_descriptor() {
        assert!(matches!(
            TypeCatalog::new().descriptor(TypeId::of::<u8>()),
            Err(Error::Metadata(_))
        ));
    }
}
