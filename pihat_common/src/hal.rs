//! Hardware abstraction contracts.
//!
//! Traits and typed configuration that the `pihat_hal` implementations and
//! third-party drivers build against.

pub mod bus;
pub mod config;
pub mod driver;
pub mod error;
pub mod gpio;
