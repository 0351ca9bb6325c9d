mod emitter;
mod engine;
mod entity_graph;
mod parser;
mod pipeline;
mod resolver;
mod syntax;

// Language front end
mod languages;

pub use emitter::Emitter;
pub use engine::{BuildSummary, Engine};
pub use entity_graph::{load_or_build, roots_hash, EntityGraph, EntityRecord, GraphSnapshot};
pub use languages::{parse_use_statement, PhpParser};
pub use parser::CodeParser;
pub use pipeline::{
    AddMockTools, NameFilter, Pipeline, PublicAndConstFilter, RemoveFinal, RewriteContext,
    SetReturnTypes, SetupContext, SkipExcluded, StripBodies, Transform,
};
pub use resolver::{DocBlock, DocTag, PhpVersion, TypeHint, TypeResolver};
pub use syntax::{
    print_declaration, ClassModifier, Constant, Declaration, EntityKind, Import, ImportKind,
    Member, Method, MethodBody, NamespaceBlock, NamespaceScope, Param, ParsedSource, Visibility,
};
