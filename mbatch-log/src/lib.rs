//! Logging facade for mbatch.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with the [`LogConfig`]. The configuration
//! implements `serde` traits, so it can be obtained from configuration files. Both are available
//! with the `init` feature.
//!
//! ```no_run
//! # #[cfg(feature = "init")]
//! fn main() {
//!     use mbatch_log::LogConfig;
//!
//!     let log_config = LogConfig {
//!         enable_backtraces: true,
//!         ..LogConfig::default()
//!     };
//!
//!     mbatch_log::init(&log_config);
//! }
//! # #[cfg(not(feature = "init"))]
//! # fn main() {}
//! ```
//!
//! # Logging
//!
//! The basic use of this crate is through the five logging macros: [`error!`], [`warn!`],
//! [`info!`], [`debug!`] and [`trace!`] where `error!` represents the highest-priority log messages
//! and `trace!` the lowest. The log messages are filtered by configuring the log level to exclude
//! messages with a lower priority. Each of these macros accept format strings similarly to
//! [`println!`], as well as structured fields.
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer short and precise log
//! messages over verbose text. Choose the log level according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable behavior.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] for messages usually relevant to debugging.
//! - [`trace!`] for full auxiliary information, such as every merged metric record.
//!
//! ## Logging Error Types
//!
//! To log errors together with all their causes, use the [`LogError`] wrapper.
//!
//! ```
//! use std::io::{Error, ErrorKind};
//! use mbatch_log::LogError;
//!
//! let custom_error = Error::new(ErrorKind::Other, "oh no!");
//! mbatch_log::error!("operation failed: {}", LogError(&custom_error));
//! ```
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro [`init_test!`] that should be called
//! at the beginning of test method. It enables test mode of the logger and customizes log levels
//! for the current crate. It requires the `test` feature.
//!
//! ```no_run
//! # #[cfg(feature = "test")]
//! fn main() {
//!     mbatch_log::init_test!();
//! }
//! # #[cfg(not(feature = "test"))]
//! # fn main() {}
//! ```

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
mod test;
#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
