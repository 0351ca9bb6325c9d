use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::resolver::TypeHint;
use crate::core::syntax::{Declaration, EntityKind, NamespaceScope};

/// One indexed declaration and its supertype edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub qualified_name: String,
    pub source_path: PathBuf,
    /// Interfaces a class implements
    pub interfaces: Vec<String>,
    /// Extended class, or the interfaces an interface extends
    pub parents: Vec<String>,
    /// Inverse of `parents`, filled after the scan
    pub children: Vec<String>,
    /// Resolved return types keyed by lowercased method name
    #[serde(default)]
    pub method_return_types: BTreeMap<String, TypeHint>,
}

impl EntityRecord {
    pub fn new(kind: EntityKind, qualified_name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            qualified_name: qualified_name.into(),
            source_path: source_path.into(),
            interfaces: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            method_return_types: BTreeMap::new(),
        }
    }

    /// Index a lowered declaration, resolving its supertype names in `scope`
    pub fn from_declaration(decl: &Declaration, scope: &NamespaceScope, source_path: &Path) -> Self {
        let mut record = Self::new(decl.kind, decl.qualified_name(), source_path);
        let resolve = |names: &[String]| -> Vec<String> {
            let mut resolved: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                let qualified = scope.resolve_class_name(name);
                if !resolved.contains(&qualified) {
                    resolved.push(qualified);
                }
            }
            resolved
        };

        match decl.kind {
            EntityKind::Class => {
                record.parents = resolve(&decl.extends);
                record.interfaces = resolve(&decl.implements);
            }
            EntityKind::Interface => record.parents = resolve(&decl.extends),
            EntityKind::Trait => {}
        }
        record
    }

    /// Supertype names, interfaces first
    pub fn supertypes(&self) -> impl Iterator<Item = &String> {
        self.interfaces.iter().chain(self.parents.iter())
    }
}
