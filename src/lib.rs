//! Every executable on the search path as a callable, documented object.
//!
//! This crate is built from three layers:
//! - [`Runner`]: runs a shell command line, captures its output and turns it into
//!   a value through an egress transform, with a configurable error policy.
//! - [`Command`]: one executable name bound to a runner, with lazily resolved
//!   documentation taken from its manual page or `--help` output.
//! - [`Registry`]: a read-only map from identifiers to commands, either supplied
//!   explicitly or discovered from `PATH`.
//!
//! Example
//! ```no_run
//! use path_commands::Registry;
//! let commands = Registry::discover();
//! if let Some(ls) = commands.get("ls") {
//!     println!("{}", ls.doc());
//!     let listing = ls.call("-a").unwrap();
//!     println!("{}", String::from_utf8_lossy(&listing));
//! }
//! ```
//!
//! Command lines go through the shell unescaped. Wrap untrusted tokens with
//! [`quote`].

pub mod command;
pub mod docs;
pub mod egress;
pub mod env;
pub mod error;
pub mod ident;
pub mod registry;
pub mod runner;
pub mod search;

pub use command::Command;
pub use env::Environment;
pub use error::{Error, Result};
pub use registry::{Entry, Registry};
pub use runner::{ErrorPolicy, IntoArgs, RunOutput, Runner, Shell, quote};
pub use search::{ExecutableEntry, SearchPath};
