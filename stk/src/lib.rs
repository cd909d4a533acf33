//! Application bootstrapping based on [stk_service] dependency resolution.
//!
//! [stk_service] resolves services from a registry, but something still has to fill that registry,
//! describe the service types and decide what to actually run. This crate provides such entrypoint
//! in the form of [Application](application::Application): it loads configuration, seeds the
//! registry with configured parameters and registered services, validates that every service can
//! find its dependencies and finally runs [ApplicationRunners](runner::ApplicationRunner). It also
//! configures supporting infrastructure, e.g. logging.

pub mod application;
pub mod config;
pub mod runner;
