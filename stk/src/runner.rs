//! Runners executing actual application logic.

#[cfg(test)]
use mockall::automock;
pub use stk_service::ErrorPtr;
use std::rc::Rc;

pub type ApplicationRunnerPtr = Rc<dyn ApplicationRunner>;

/// Runs application logic. Runners are registry entries marked as such when building the
/// [Application](crate::application::Application).
#[cfg_attr(test, automock)]
pub trait ApplicationRunner {
    /// Runs any application code.
    fn run(&self) -> Result<(), ErrorPtr>;

    /// Returns the priority for this runner. Higher priorities get run first. Default 0.
    fn priority(&self) -> i8 {
        0
    }
}
