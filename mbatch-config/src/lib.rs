//! Configuration for the mbatch command line.
//!
//! The configuration is read from a `config.yml` file in a configuration folder and can be
//! overridden through [`OverridableConfig`], which is populated from command line arguments or
//! environment variables.
//!
//! ```yaml
//! logging:
//!   level: debug
//!   format: json
//! formatter:
//!   dimensions: [region, tier]
//!   environment: production
//! context:
//!   application: shop
//! ```

#![warn(missing_docs)]

mod config;

pub use crate::config::*;
