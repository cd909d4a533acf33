//! Core functionality for resolving service instances.
//!
//! Full resolution runs three ordered phases:
//!
//! 1. Constructor injection ([Resolver::construct]) - for [Injectable] types, explicit arguments
//!    fill the trailing constructor slots, while the leading ones are looked up in the registry by
//!    parameter name. A parameter named `container` receives the registry itself.
//! 2. Setter injection ([Resolver::inject]) - every hidden method is called if at least one of its
//!    parameters resolves from the registry, either by being declared with an [Injectable] type,
//!    or with the callable type while a registry entry with the parameter name exists.
//! 3. Declarative injection ([Resolver::apply_declared_injections]) - class-level and then
//!    property-level [Inject](crate::descriptor::Inject) markers are written straight into
//!    properties.
//!
//! Resolution never mutates the registry and does not detect dependency cycles.
//!
//! [Injectable]: crate::injectable::Injectable

use crate::descriptor::{
    CatalogPtr, DeclaredType, Instantiation, ParameterDescriptor, TypeDescriptor,
};
use crate::error::Error;
use crate::on_demand::OnDemand;
use crate::registry::{RegistryEntry, RegistryPtr};
use crate::value::{Arguments, InstancePtr, Value};
use std::any::{type_name, Any, TypeId};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Constructor parameter name bound to the registry itself.
pub const CONTAINER_PARAMETER: &str = "container";

/// Resolves and wires service instances using a [ServiceRegistry](crate::registry::ServiceRegistry)
/// and type metadata from a [TypeCatalog](crate::descriptor::TypeCatalog). Stateless apart from
/// those two handles, so it's cheap to clone and create on the fly.
#[derive(Clone)]
pub struct Resolver {
    registry: RegistryPtr,
    catalog: CatalogPtr,
}

impl Resolver {
    pub fn new(registry: RegistryPtr, catalog: CatalogPtr) -> Self {
        Self { registry, catalog }
    }

    #[inline]
    pub fn registry(&self) -> &RegistryPtr {
        &self.registry
    }

    #[inline]
    pub fn catalog(&self) -> &CatalogPtr {
        &self.catalog
    }

    /// Creates a fully wired instance of given type, running all resolution phases.
    pub fn resolve(&self, type_id: TypeId, args: Vec<Value>) -> Result<InstancePtr, Error> {
        let descriptor = self.catalog.descriptor(type_id)?;

        debug!(
            type_name = descriptor.key.name(),
            explicit = args.len(),
            "Resolving instance."
        );

        let mut instance = self.construct(&descriptor, args)?;
        self.inject(instance.as_mut(), Some(&descriptor))?;
        self.apply_declared_injections(instance.as_mut(), &descriptor)?;

        Ok(Rc::from(instance))
    }

    /// Like [Resolver::resolve], but wraps the result as a [Value].
    #[inline]
    pub fn resolve_value(&self, type_id: TypeId, args: Vec<Value>) -> Result<Value, Error> {
        self.resolve(type_id, args).map(Value::Instance)
    }

    /// Typesafe version of [Resolver::resolve].
    pub fn resolve_typed<T: Any>(&self, args: Vec<Value>) -> Result<Rc<T>, Error> {
        self.resolve(TypeId::of::<T>(), args)?
            .downcast::<T>()
            .map_err(|_| Error::IncompatibleInstance(type_name::<T>()))
    }

    /// Constructor phase. Explicit arguments occupy the trailing constructor slots; for injectable
    /// types, the remaining leading slots are resolved by parameter name.
    pub fn construct(
        &self,
        descriptor: &TypeDescriptor,
        args: Vec<Value>,
    ) -> Result<Box<dyn Any>, Error> {
        let type_name = descriptor.key.name();
        let constructor = match &descriptor.instantiation {
            Instantiation::Default(instantiate) => {
                if !args.is_empty() {
                    warn!(
                        type_name,
                        ignored = args.len(),
                        "Ignoring explicit arguments for a type without a constructor."
                    );
                }

                return Ok(instantiate());
            }
            Instantiation::Constructor(constructor) => constructor,
        };

        let declared = constructor.parameters.len();
        let supplied = args.len();
        if supplied > declared {
            return Err(Error::OverSupply {
                type_name,
                declared,
                supplied,
            });
        }

        let values = if descriptor.is_injectable {
            let mut values = Vec::with_capacity(declared);
            for parameter in &constructor.parameters[..declared - supplied] {
                values.push(self.resolve_constructor_parameter(parameter)?);
            }

            values.extend(args);
            values
        } else {
            let mut values = args;
            for parameter in &constructor.parameters[supplied..] {
                let default = parameter
                    .default
                    .clone()
                    .ok_or_else(|| Error::MissingArgument {
                        type_name,
                        parameter: parameter.name.clone(),
                    })?;

                values.push(default);
            }

            values
        };

        (constructor.function)(Arguments::new(values))
    }

    fn resolve_constructor_parameter(&self, parameter: &ParameterDescriptor) -> Result<Value, Error> {
        trace!(parameter = %parameter.name, "Resolving constructor parameter.");

        if parameter.name == CONTAINER_PARAMETER {
            return Ok(Value::Registry(self.registry.clone()));
        }

        match &parameter.default {
            Some(default) if !self.registry.has(&parameter.name) => Ok(default.clone()),
            _ => self.registry.get(&parameter.name),
        }
    }

    /// Setter phase. Calls every hidden method with at least one parameter resolved from the
    /// registry. When no descriptor is given, it's looked up by the runtime type of the instance.
    pub fn inject(
        &self,
        instance: &mut dyn Any,
        descriptor: Option<&TypeDescriptor>,
    ) -> Result<(), Error> {
        let found;
        let descriptor = match descriptor {
            Some(descriptor) => descriptor,
            None => {
                found = self.catalog.descriptor((*instance).type_id())?;
                found.as_ref()
            }
        };

        for method in &descriptor.methods {
            let mut activated = false;
            let mut values = Vec::with_capacity(method.parameters.len());

            for parameter in &method.parameters {
                if self.activates(parameter) {
                    values.push(self.registry.get(&parameter.name)?);
                    activated = true;
                } else {
                    values.push(parameter.default.clone().unwrap_or_default());
                }
            }

            if activated {
                trace!(
                    type_name = descriptor.key.name(),
                    method = %method.name,
                    "Invoking injection setter."
                );

                (method.invoke)(instance, Arguments::new(values))?;
            }
        }

        Ok(())
    }

    fn activates(&self, parameter: &ParameterDescriptor) -> bool {
        match &parameter.declared_type {
            Some(DeclaredType::Named(key)) => self.catalog.implements_injectable(key.id()),
            Some(DeclaredType::Closure) => self.registry.has(&parameter.name),
            Some(DeclaredType::Union(_)) | None => false,
        }
    }

    /// Declarative phase. Applies class-level markers first, then the first marker of each
    /// property, so property-level markers win when both target the same property.
    pub fn apply_declared_injections(
        &self,
        instance: &mut dyn Any,
        descriptor: &TypeDescriptor,
    ) -> Result<(), Error> {
        for marker in &descriptor.markers {
            let id = match &marker.id {
                Some(id) => id,
                None => continue,
            };

            let property_name = marker.prop.as_ref().unwrap_or(id);
            let property = descriptor.property(property_name).ok_or_else(|| {
                Error::Metadata(format!(
                    "Class injection marker '{id}' targets unknown property '{property_name}' of {}",
                    descriptor.key.name()
                ))
            })?;

            let value = self.registry.get(id)?;
            let value = if value.is_truthy() {
                value
            } else {
                Value::Str(property_name.clone())
            };

            trace!(
                type_name = descriptor.key.name(),
                property = %property_name,
                key = %id,
                "Injecting class marker."
            );

            (property.write)(instance, value)?;
        }

        for property in &descriptor.properties {
            if let Some(marker) = property.markers.first() {
                let id = marker.id.as_ref().unwrap_or(&property.name);

                trace!(
                    type_name = descriptor.key.name(),
                    property = %property.name,
                    key = %id,
                    "Injecting property marker."
                );

                (property.write)(instance, self.registry.get(id)?)?;
            }
        }

        Ok(())
    }

    /// Creates a deferred constructor for given type. When invoked, `args` are prepended to the
    /// call-time arguments. The constructor holds a weak handle to the registry.
    pub fn defer(&self, type_id: TypeId, args: Vec<Value>) -> OnDemand {
        let registry = Rc::downgrade(&self.registry);
        let catalog = self.catalog.clone();

        OnDemand::new(move |call_args| {
            let registry = registry.upgrade().ok_or(Error::RegistryDropped)?;
            let arguments = args.iter().cloned().chain(call_args).collect();
            Resolver::new(registry, catalog.clone()).resolve_value(type_id, arguments)
        })
    }

    /// Typesafe version of [Resolver::defer].
    #[inline]
    pub fn defer_typed<T: Any>(&self, args: Vec<Value>) -> OnDemand {
        self.defer(TypeId::of::<T>(), args)
    }

    /// Registry entry resolving a fresh instance on each lookup.
    pub fn service_entry(catalog: CatalogPtr, type_id: TypeId, args: Vec<Value>) -> RegistryEntry {
        RegistryEntry::deferred(move |registry: &RegistryPtr| {
            Resolver::new(registry.clone(), catalog.clone()).resolve_value(type_id, args.clone())
        })
    }

    /// Registry entry producing a deferred constructor on each lookup, so the service itself is
    /// only built when somebody calls [OnDemand::get_instance] or [OnDemand::new_instance].
    pub fn on_demand_entry(
        catalog: CatalogPtr,
        type_id: TypeId,
        args: Vec<Value>,
    ) -> RegistryEntry {
        RegistryEntry::deferred(move |registry: &RegistryPtr| {
            Ok(Value::from(
                Resolver::new(registry.clone(), catalog.clone()).defer(type_id, args.clone()),
            ))
        })
    }

    /// Checks upfront that every registry key the given type would need is present: constructor
    /// parameters resolved by name (assuming `explicit` trailing arguments), setter parameters of
    /// injectable types and declarative marker ids.
    pub fn validate(&self, type_id: TypeId, explicit: usize) -> Result<(), Error> {
        let descriptor = self.catalog.descriptor(type_id)?;

        if let Some(constructor) = descriptor.constructor() {
            let declared = constructor.parameters.len();
            if explicit > declared {
                return Err(Error::OverSupply {
                    type_name: descriptor.key.name(),
                    declared,
                    supplied: explicit,
                });
            }

            if descriptor.is_injectable {
                for parameter in &constructor.parameters[..declared - explicit] {
                    if parameter.name != CONTAINER_PARAMETER && !parameter.has_default() {
                        self.require(&parameter.name)?;
                    }
                }
            }
        }

        for parameter in descriptor
            .methods
            .iter()
            .flat_map(|method| &method.parameters)
        {
            if let Some(DeclaredType::Named(key)) = &parameter.declared_type {
                if self.catalog.implements_injectable(key.id()) {
                    self.require(&parameter.name)?;
                }
            }
        }

        for id in descriptor.markers.iter().filter_map(|marker| marker.id.as_ref()) {
            self.require(id)?;
        }

        for property in &descriptor.properties {
            if let Some(marker) = property.markers.first() {
                self.require(marker.id.as_ref().unwrap_or(&property.name))?;
            }
        }

        Ok(())
    }

    fn require(&self, key: &str) -> Result<(), Error> {
        if self.registry.has(key) {
            Ok(())
        } else {
            Err(Error::NotFound(key.to_string()))
        }
    }
}
