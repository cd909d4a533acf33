use std::any::TypeId;
use std::rc::Rc;
use stk_service::descriptor::{ParameterDescriptor, TypeCatalog, TypeDescriptor};
use stk_service::injectable::Injectable;
use stk_service::registry::{Container, RegistryPtr, ServiceRegistry};
use stk_service::resolver::Resolver;
use stk_service::value::Value;

// this is a dependency which will be looked up in the registry by name
#[derive(Default)]
struct Greeting;

impl Greeting {
    fn text(&self) -> &'static str {
        "Hello"
    }
}

// only types carrying the Injectable marker get their constructor parameters resolved by name
struct Greeter {
    greeting: Rc<Greeting>,
    name: String,
}

impl Injectable for Greeter {}

impl Greeter {
    fn greet(&self) {
        println!("{} {}!", self.greeting.text(), self.name);
    }
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    // there's no reflection, so every constructible type is described upfront
    let mut catalog = TypeCatalog::new();
    catalog
        .register(
            TypeDescriptor::builder::<Greeting>()
                .default_constructible()
                .build()
                .expect("error describing Greeting"),
        )
        .expect("error registering Greeting");
    catalog
        .register(
            TypeDescriptor::builder::<Greeter>()
                .injectable()
                .constructor(
                    vec![
                        ParameterDescriptor::untyped("greeting"),
                        ParameterDescriptor::untyped("name").with_default("world"),
                    ],
                    |args| {
                        Ok(Greeter {
                            greeting: args.instance(0)?,
                            name: args.string(1)?,
                        })
                    },
                )
                .build()
                .expect("error describing Greeter"),
        )
        .expect("error registering Greeter");

    let catalog = Rc::new(catalog);

    // the registry holds services and plain values - services are resolved on each lookup
    let container = Container::new();
    container.set(
        "greeting".into(),
        Resolver::service_entry(catalog.clone(), TypeId::of::<Greeting>(), vec![]),
    );

    let resolver = Resolver::new(container.clone() as RegistryPtr, catalog);

    // prints "Hello world!" - "name" is not registered, so the default is used
    resolver
        .resolve_typed::<Greeter>(vec![])
        .expect("error resolving Greeter")
        .greet();

    // explicit arguments fill the trailing constructor parameters
    // prints "Hello stk!"
    resolver
        .resolve_typed::<Greeter>(vec![Value::from("stk")])
        .expect("error resolving Greeter")
        .greet();

    // deferred constructors create the instance on first use and keep it
    let deferred = resolver.defer_typed::<Greeter>(vec![Value::from("again")]);
    deferred
        .get_typed::<Greeter>(vec![])
        .expect("error resolving Greeter")
        .greet();
}
