#![no_std]
pub mod config_loader;
pub mod dispatcher;
pub mod resolver;

#[cfg(any(test, feature = "test-utils"))]
pub mod time_driver_test_stub;

#[macro_use]
mod macros;

pub use resolver::{
    ConfigError, Policy, Resolved, ResolvedAction, Resolver, TapHoldBinding, TapHoldState,
    Timestamp,
};
