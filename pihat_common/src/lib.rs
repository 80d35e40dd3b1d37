//! pihat Common Library
//!
//! Shared contracts for the pihat hardware abstraction layer. Everything here
//! is hardware-free: the concrete buses, drivers and services live in
//! `pihat_hal`.
//!
//! # Module Structure
//!
//! - [`hal`] - Error taxonomy, driver/bus/GPIO traits and typed device configs
//! - [`config`] - TOML loading and shared application settings
//! - [`consts`] - Defaults and hardware limits
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use pihat_common::prelude::*;
//!
//! let cfg = PwmDriverConfig::default();
//! assert_eq!(cfg.address, DEFAULT_PWM_ADDRESS);
//! assert!(cfg.validate().is_ok());
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
