#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Core install planning for hoist.
//!
//! Builds the ideal `node_modules` tree for a project, compares it with what
//! is installed, and reports the add/update/remove actions between them.

pub mod config;
pub mod paths;
pub mod pkg;
pub mod version;

pub use config::Config;
pub use version::VERSION;
