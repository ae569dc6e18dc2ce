//! Common functionality shared by the mbatch crates.
#![warn(missing_docs)]

pub mod serde;
pub mod time;
