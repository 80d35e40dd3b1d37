//! Built-in PWM drivers.
//!
//! Each driver lives in its own module and is registered under its type name
//! by [`register_builtin_drivers`].

pub mod mock;
pub mod pca9685;
pub mod sunfounder;

use crate::driver_registry::{DriverArgs, DriverFactory, DriverRegistry};
use pihat_common::hal::driver::PwmDriver;
use pihat_common::hal::error::HalResult;
use std::sync::Arc;

pub use mock::{DriverCall, MockDriver, MockDriverLog};
pub use pca9685::Pca9685;
pub use sunfounder::SunfounderPwm;

/// Built-in driver constructors keyed by type name. Names are distinct.
pub fn builtin_drivers() -> Vec<(&'static str, DriverFactory)> {
    vec![
        (
            Pca9685::TYPE_NAME,
            Arc::new(|args: DriverArgs| -> HalResult<Box<dyn PwmDriver>> {
                Ok(Box::new(Pca9685::new(args)?))
            }),
        ),
        (
            SunfounderPwm::TYPE_NAME,
            Arc::new(|args: DriverArgs| -> HalResult<Box<dyn PwmDriver>> {
                Ok(Box::new(SunfounderPwm::new(args)?))
            }),
        ),
    ]
}

/// Register every built-in driver in `registry`.
///
/// # Errors
/// `DriverAlreadyRegistered` if `registry` already holds one of the names
/// and rejects duplicates.
pub fn register_builtin_drivers(registry: &mut DriverRegistry) -> HalResult<()> {
    for (name, factory) in builtin_drivers() {
        registry.register(name, move |args: DriverArgs| factory(args))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_registered() {
        let mut registry = DriverRegistry::new();
        register_builtin_drivers(&mut registry).unwrap();
        assert_eq!(registry.list_drivers(), vec!["PCA9685", "Sunfounder"]);
    }

    #[test]
    fn builtin_names_distinct() {
        let mut names: Vec<_> = builtin_drivers().into_iter().map(|(name, _)| name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn builtin_registry_matches_table() {
        let registry = DriverRegistry::with_builtin_drivers();
        let mut expected: Vec<_> = builtin_drivers()
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect();
        expected.sort();
        assert_eq!(registry.list_drivers(), expected);
    }

    #[test]
    fn builtins_twice_rejected() {
        let mut registry = DriverRegistry::with_builtin_drivers();
        assert!(register_builtin_drivers(&mut registry).is_err());
    }
}
