//! Ordered rewrite stages applied to every declaration.

mod transforms;

use tracing::debug;

pub use transforms::{
    AddMockTools, PublicAndConstFilter, RemoveFinal, SetReturnTypes, SkipExcluded, StripBodies,
};

use crate::config::{Config, TransformKind};
use crate::core::emitter::Emitter;
use crate::core::entity_graph::EntityGraph;
use crate::core::resolver::{TypeHint, TypeResolver};
use crate::core::syntax::{Declaration, Method, NamespaceScope};
use crate::error::Result;

/// State shared by the stages while one declaration is rewritten
pub struct RewriteContext<'a> {
    pub graph: &'a mut EntityGraph,
    pub resolver: &'a TypeResolver,
    pub scope: &'a NamespaceScope,
    passthrough: bool,
}

impl<'a> RewriteContext<'a> {
    pub fn new(graph: &'a mut EntityGraph, resolver: &'a TypeResolver, scope: &'a NamespaceScope) -> Self {
        Self {
            graph,
            resolver,
            scope,
            passthrough: false,
        }
    }

    /// Leave the declaration as it is from here on
    pub fn pass_through(&mut self) {
        self.passthrough = true;
    }

    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    pub fn resolve_return_type(&mut self, decl: &Declaration, method: &Method) -> Option<TypeHint> {
        self.resolver.resolve(self.graph, decl, self.scope, method)
    }
}

/// Collaborators available to the one-off setup hook
pub struct SetupContext<'a> {
    pub emitter: &'a Emitter,
}

/// One rewrite stage
pub trait Transform {
    fn name(&self) -> &'static str;

    /// Called once before any declaration is rewritten
    fn before_process(&self, _setup: &SetupContext<'_>) -> Result<()> {
        Ok(())
    }

    fn transform(&self, decl: Declaration, ctx: &mut RewriteContext<'_>) -> Result<Declaration>;
}

/// Stages applied left to right
#[derive(Default)]
pub struct Pipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let mut pipeline = Self::new();
        for kind in &config.transforms {
            let transform: Box<dyn Transform> = match kind {
                TransformKind::SkipExcluded => Box::new(SkipExcluded::new(config.skip_subtypes_of.clone())),
                TransformKind::PublicAndConstFilter => Box::new(PublicAndConstFilter),
                TransformKind::RemoveFinal => Box::new(RemoveFinal),
                TransformKind::StripBodies => Box::new(StripBodies),
                TransformKind::AddMockTools => Box::new(AddMockTools::new(&config.runtime_namespace)),
                TransformKind::SetReturnTypes => Box::new(SetReturnTypes),
            };
            pipeline.push(transform);
        }
        pipeline
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    pub fn before_process(&self, setup: &SetupContext<'_>) -> Result<()> {
        for transform in &self.transforms {
            transform.before_process(setup)?;
        }
        Ok(())
    }

    pub fn apply(&self, mut decl: Declaration, ctx: &mut RewriteContext<'_>) -> Result<Declaration> {
        for transform in &self.transforms {
            if ctx.is_passthrough() {
                debug!("{} passes through unchanged", decl.qualified_name());
                break;
            }
            decl = transform.transform(decl, ctx)?;
        }
        Ok(decl)
    }
}

/// Selects which declarations are written out
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    needles: Vec<String>,
}

impl NameFilter {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            needles: patterns
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive substring match; no patterns match everything
    pub fn matches(&self, qualified_name: &str) -> bool {
        if self.needles.is_empty() {
            return true;
        }
        let name = qualified_name.to_lowercase();
        self.needles.iter().any(|needle| name.contains(needle.as_str()))
    }
}
