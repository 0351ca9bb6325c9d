//! Index of every class, interface and trait under the source roots.
//!
//! Records are addressed by fully-qualified name; supertype edges are plain
//! name lookups, so unknown (vendor or built-in) supertypes simply end a walk.

mod cache;
mod graph;
mod record;

pub use cache::{load_or_build, roots_hash, GraphSnapshot};
pub use graph::EntityGraph;
pub use record::EntityRecord;
