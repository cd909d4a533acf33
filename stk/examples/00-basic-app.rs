use stk::application::Application;
use stk::runner::{ApplicationRunner, ErrorPtr};
use stk_service::descriptor::TypeDescriptor;

#[derive(Default)]
struct PrintHelloRunner;

impl ApplicationRunner for PrintHelloRunner {
    fn run(&self) -> Result<(), ErrorPtr> {
        print!("Hello ");
        Ok(())
    }

    // for ordered execution of application runners, priorities can be used
    fn priority(&self) -> i8 {
        2
    }
}

#[derive(Default)]
struct PrintWorldRunner;

impl ApplicationRunner for PrintWorldRunner {
    fn run(&self) -> Result<(), ErrorPtr> {
        println!("world!");
        Ok(())
    }

    fn priority(&self) -> i8 {
        1
    }
}

// note: for the sake of simplicity, errors are unwrapped, rather than gracefully handled
fn main() {
    // config is read from stk.json and STK_ environment variables
    let mut application = Application::builder()
        .with_descriptor(
            TypeDescriptor::builder::<PrintHelloRunner>()
                .default_constructible()
                .build()
                .expect("error describing PrintHelloRunner"),
        )
        .with_descriptor(
            TypeDescriptor::builder::<PrintWorldRunner>()
                .default_constructible()
                .build()
                .expect("error describing PrintWorldRunner"),
        )
        .with_service::<PrintWorldRunner>("world")
        .with_lazy_service::<PrintHelloRunner>("hello")
        .with_runner::<PrintWorldRunner>("world")
        .with_runner::<PrintHelloRunner>("hello")
        .build()
        .expect("unable to create application");

    // prints "Hello world!"
    application.run().expect("error running application");
}
