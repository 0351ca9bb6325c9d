//! Return-type resolution for methods that do not declare one.

mod docblock;
mod types;

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

pub use docblock::{DocBlock, DocTag};
pub use types::{PhpVersion, TypeHint};

use crate::config::Config;
use crate::core::entity_graph::EntityGraph;
use crate::core::syntax::{Declaration, Method, NamespaceScope};
use crate::error::Result;

/// Works out the return type of a method
///
/// Lookup order: the declared type, the graph cache for this declaration,
/// an explicit override, the supertypes, the `@return` tag and finally the
/// shape of the original body. Whatever is found is cached in the graph so
/// subtypes processed later can inherit it.
#[derive(Debug, Clone)]
pub struct TypeResolver {
    overrides: BTreeMap<String, String>,
    version: PhpVersion,
}

impl TypeResolver {
    pub fn new(overrides: BTreeMap<String, String>, version: PhpVersion) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(key, value)| (key.trim_start_matches('\\').to_string(), value))
            .collect();
        Self { overrides, version }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.result_types.clone(),
            PhpVersion::parse(&config.target_php_version)?,
        ))
    }

    pub fn version(&self) -> PhpVersion {
        self.version
    }

    pub fn resolve(
        &self,
        graph: &mut EntityGraph,
        decl: &Declaration,
        scope: &NamespaceScope,
        method: &Method,
    ) -> Option<TypeHint> {
        if method.forbids_return_type() {
            return None;
        }

        let owner = decl.qualified_name();
        let resolved = match &method.return_type {
            Some(text) => TypeHint::parse(text, scope, self.version),
            None => graph
                .cached_return_type(&owner, &method.name)
                .cloned()
                .or_else(|| self.from_override(&owner, scope, method))
                .or_else(|| self.from_supertypes(graph, &owner, &method.name))
                .or_else(|| self.from_doc_comment(scope, method))
                .or_else(|| from_body(method)),
        }?;

        debug!("{}::{} resolved to {:?}", owner, method.name, resolved);
        graph.record_return_type(&owner, &method.name, resolved.clone());
        Some(resolved)
    }

    fn from_override(&self, owner: &str, scope: &NamespaceScope, method: &Method) -> Option<TypeHint> {
        let key = format!("{}::{}", owner, method.name);
        self.overrides
            .get(&key)
            .or_else(|| {
                self.overrides
                    .iter()
                    .find(|(candidate, _)| candidate.eq_ignore_ascii_case(&key))
                    .map(|(_, value)| value)
            })
            .and_then(|text| TypeHint::parse(text, scope, self.version))
    }

    fn from_supertypes(&self, graph: &EntityGraph, owner: &str, method: &str) -> Option<TypeHint> {
        let mut seen = HashSet::new();
        seen.insert(owner.trim_start_matches('\\').to_ascii_lowercase());
        inherited(graph, owner, method, &mut seen)
    }

    fn from_doc_comment(&self, scope: &NamespaceScope, method: &Method) -> Option<TypeHint> {
        let doc = DocBlock::parse(method.doc_comment.as_deref()?);
        TypeHint::parse(doc.return_type()?, scope, self.version)
    }
}

/// First cached answer among the interfaces, then the parents, walking upwards
fn inherited(graph: &EntityGraph, name: &str, method: &str, seen: &mut HashSet<String>) -> Option<TypeHint> {
    let record = graph.get(name)?;
    for supertype in record.supertypes() {
        if !seen.insert(supertype.trim_start_matches('\\').to_ascii_lowercase()) {
            continue;
        }
        if let Some(hint) = graph.cached_return_type(supertype, method) {
            return Some(hint.clone());
        }
        if let Some(hint) = inherited(graph, supertype, method, seen) {
            return Some(hint);
        }
    }
    None
}

fn from_body(method: &Method) -> Option<TypeHint> {
    method
        .body_returns_value
        .map(|returns| if returns { TypeHint::mixed() } else { TypeHint::NoValue })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity_graph::EntityRecord;
    use crate::core::syntax::{EntityKind, Visibility};

    fn method(name: &str) -> Method {
        Method {
            doc_comment: None,
            attributes: vec![],
            visibility: Some(Visibility::Public),
            is_static: false,
            is_abstract: false,
            is_final: false,
            by_ref: false,
            name: name.to_string(),
            params: vec![],
            return_type: None,
            body: None,
            body_returns_value: None,
        }
    }

    fn declaration(kind: EntityKind, name: &str) -> Declaration {
        Declaration {
            kind,
            name: name.to_string(),
            namespace: Some("App".to_string()),
            doc_comment: None,
            attributes: vec![],
            modifiers: vec![],
            extends: vec![],
            implements: vec![],
            members: vec![],
        }
    }

    fn scope() -> NamespaceScope {
        NamespaceScope {
            namespace: Some("App".to_string()),
            imports: vec![],
        }
    }

    fn graph() -> EntityGraph {
        let mut graph = EntityGraph::new();
        graph.insert(EntityRecord::new(EntityKind::Interface, "App\\Named", "Named.php"));
        let mut base = EntityRecord::new(EntityKind::Class, "App\\Base", "Base.php");
        base.interfaces = vec!["App\\Named".to_string()];
        graph.insert(base);
        let mut child = EntityRecord::new(EntityKind::Class, "App\\Child", "Child.php");
        child.parents = vec!["App\\Base".to_string()];
        graph.insert(child);
        graph
    }

    fn resolver() -> TypeResolver {
        TypeResolver::new(BTreeMap::new(), PhpVersion::new(8, 2, 0))
    }

    #[test]
    fn test_doc_comment_and_cache() {
        let mut graph = graph();
        let mut size = method("size");
        size.doc_comment = Some("/** @return int */".to_string());

        let hint = resolver().resolve(&mut graph, &declaration(EntityKind::Class, "Base"), &scope(), &size);
        assert_eq!(hint, Some(TypeHint::Builtin("int".to_string())));
        assert_eq!(graph.cached_return_type("App\\Base", "size"), hint.as_ref());
    }

    #[test]
    fn test_inherits_from_supertype() {
        let mut graph = graph();
        graph.record_return_type("App\\Named", "getName", TypeHint::Builtin("string".to_string()));

        let hint = resolver().resolve(
            &mut graph,
            &declaration(EntityKind::Class, "Child"),
            &scope(),
            &method("getName"),
        );
        assert_eq!(hint, Some(TypeHint::Builtin("string".to_string())));
        assert!(graph.cached_return_type("App\\Child", "getName").is_some());
    }

    #[test]
    fn test_interfaces_checked_before_parents() {
        let mut graph = EntityGraph::new();
        let mut record = EntityRecord::new(EntityKind::Class, "App\\Impl", "Impl.php");
        record.parents = vec!["App\\Parent".to_string()];
        record.interfaces = vec!["App\\Iface".to_string()];
        graph.insert(record);
        graph.insert(EntityRecord::new(EntityKind::Class, "App\\Parent", "Parent.php"));
        graph.insert(EntityRecord::new(EntityKind::Interface, "App\\Iface", "Iface.php"));
        graph.record_return_type("App\\Parent", "run", TypeHint::Builtin("int".to_string()));
        graph.record_return_type("App\\Iface", "run", TypeHint::Builtin("string".to_string()));

        let hint = resolver().resolve(&mut graph, &declaration(EntityKind::Class, "Impl"), &scope(), &method("run"));
        assert_eq!(hint, Some(TypeHint::Builtin("string".to_string())));
    }

    #[test]
    fn test_override_beats_doc_comment() {
        let mut graph = graph();
        let mut overrides = BTreeMap::new();
        overrides.insert("\\App\\Base::find".to_string(), "?\\App\\User".to_string());
        let resolver = TypeResolver::new(overrides, PhpVersion::new(8, 1, 0));

        let mut find = method("find");
        find.doc_comment = Some("/** @return array */".to_string());
        let hint = resolver.resolve(&mut graph, &declaration(EntityKind::Class, "Base"), &scope(), &find);
        assert_eq!(hint.map(|h| h.render(&scope())).as_deref(), Some("?User"));
    }

    #[test]
    fn test_body_inspection_fallback() {
        let mut graph = graph();
        let decl = declaration(EntityKind::Class, "Base");

        let mut compute = method("compute");
        compute.body_returns_value = Some(true);
        assert_eq!(resolver().resolve(&mut graph, &decl, &scope(), &compute), Some(TypeHint::mixed()));

        let mut run = method("run");
        run.body_returns_value = Some(false);
        assert_eq!(resolver().resolve(&mut graph, &decl, &scope(), &run), Some(TypeHint::NoValue));

        assert_eq!(resolver().resolve(&mut graph, &decl, &scope(), &method("unknown")), None);
    }

    #[test]
    fn test_declared_type_wins_and_constructors_are_skipped() {
        let mut graph = graph();
        let decl = declaration(EntityKind::Class, "Base");

        let mut declared = method("label");
        declared.return_type = Some("string".to_string());
        declared.doc_comment = Some("/** @return int */".to_string());
        assert_eq!(
            resolver().resolve(&mut graph, &decl, &scope(), &declared),
            Some(TypeHint::Builtin("string".to_string()))
        );

        let mut constructor = method("__construct");
        constructor.body_returns_value = Some(false);
        assert_eq!(resolver().resolve(&mut graph, &decl, &scope(), &constructor), None);
    }
}
