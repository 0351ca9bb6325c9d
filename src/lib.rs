//! Generates test doubles from PHP source trees.
//!
//! Declarations under the configured roots are indexed into an entity graph,
//! rewritten in supertype-first order so that inferred return types can be
//! inherited, and written out with every method body replaced by a call into
//! the recording runtime.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod runtime;

pub use config::{Config, TransformKind};
pub use error::{MockBuilderError, Result};
