use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::record::EntityRecord;
use crate::core::parser::CodeParser;
use crate::core::resolver::TypeHint;
use crate::core::syntax::EntityKind;
use crate::error::{MockBuilderError, Result};

/// All declarations found under the source roots
///
/// Records are keyed by their lowercased qualified name, since PHP class
/// names are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityGraph {
    records: BTreeMap<String, EntityRecord>,
}

fn lookup_key(name: &str) -> String {
    name.trim_start_matches('\\').to_ascii_lowercase()
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: BTreeMap<String, EntityRecord>) -> Self {
        let records = records
            .into_values()
            .map(|record| (lookup_key(&record.qualified_name), record))
            .collect();
        Self { records }
    }

    /// Index every declaration below `roots`
    ///
    /// Files that fail to parse are reported and skipped; unreadable roots
    /// or files abort the scan.
    pub fn scan(roots: &[PathBuf], parser: &mut CodeParser, progress: bool) -> Result<Self> {
        let mut graph = Self::new();

        for root in roots {
            if !root.is_dir() {
                return Err(MockBuilderError::FileSystem(format!(
                    "source root is not a readable directory: {}",
                    root.display()
                )));
            }

            for path in parser.discover(root) {
                if progress {
                    info!("Scanning {}", path.display());
                } else {
                    debug!("Scanning {}", path.display());
                }

                let parsed = match parser.parse_file(&path) {
                    Ok(parsed) => parsed,
                    Err(MockBuilderError::Parser(message)) => {
                        warn!("Skipping {}: {}", path.display(), message);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                for block in &parsed.blocks {
                    for decl in &block.declarations {
                        if decl.name.is_empty() {
                            warn!("Declaration without a name in {}", path.display());
                            continue;
                        }
                        graph.insert(EntityRecord::from_declaration(decl, &block.scope, &path));
                    }
                }
            }
        }

        graph.link_children();
        info!("Indexed {} declarations", graph.len());
        Ok(graph)
    }

    /// Add a record; the first declaration of a name wins
    ///
    /// Returns whether the record was stored.
    pub fn insert(&mut self, record: EntityRecord) -> bool {
        let key = lookup_key(&record.qualified_name);
        if let Some(existing) = self.records.get(&key) {
            if existing.source_path != record.source_path {
                warn!(
                    "{} is declared in both {} and {}; keeping the first",
                    record.qualified_name,
                    existing.source_path.display(),
                    record.source_path.display()
                );
            }
            return false;
        }
        self.records.insert(key, record);
        true
    }

    /// Fill `children` from the `parents` edges of every record
    pub fn link_children(&mut self) {
        let edges: Vec<(String, String)> = self
            .records
            .values()
            .flat_map(|record| {
                record
                    .parents
                    .iter()
                    .map(move |parent| (parent.clone(), record.qualified_name.clone()))
            })
            .collect();

        for record in self.records.values_mut() {
            record.children.clear();
        }
        for (parent, child) in edges {
            if let Some(record) = self.records.get_mut(&lookup_key(&parent)) {
                if !record.children.contains(&child) {
                    record.children.push(child);
                }
            }
        }
    }

    pub fn get(&self, qualified_name: &str) -> Option<&EntityRecord> {
        self.records.get(&lookup_key(qualified_name))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.values()
    }

    pub fn records(&self) -> &BTreeMap<String, EntityRecord> {
        &self.records
    }

    pub fn into_records(self) -> BTreeMap<String, EntityRecord> {
        self.records
    }

    /// Remember the resolved return type of `owner::method`
    pub fn record_return_type(&mut self, owner: &str, method: &str, hint: TypeHint) {
        if let Some(record) = self.records.get_mut(&lookup_key(owner)) {
            record.method_return_types.insert(method.to_ascii_lowercase(), hint);
        }
    }

    pub fn cached_return_type(&self, owner: &str, method: &str) -> Option<&TypeHint> {
        self.get(owner)
            .and_then(|record| record.method_return_types.get(&method.to_ascii_lowercase()))
    }

    /// Whether `name` extends or implements, directly or transitively, any of `candidates`
    pub fn is_instance_of(&self, name: &str, candidates: &[String]) -> bool {
        let candidates: Vec<&str> = candidates.iter().map(|c| c.trim_start_matches('\\')).collect();
        let mut seen = HashSet::new();
        self.is_instance_of_inner(name.trim_start_matches('\\'), &candidates, &mut seen)
    }

    fn is_instance_of_inner<'a>(
        &'a self,
        name: &str,
        candidates: &[&str],
        seen: &mut HashSet<&'a str>,
    ) -> bool {
        let Some(record) = self.get(name) else {
            return false;
        };
        if !seen.insert(record.qualified_name.as_str()) {
            return false;
        }

        let matches = |supertype: &str| {
            let supertype = supertype.trim_start_matches('\\');
            candidates.iter().any(|c| c.eq_ignore_ascii_case(supertype))
        };
        record
            .supertypes()
            .any(|supertype| matches(supertype) || self.is_instance_of_inner(supertype, candidates, seen))
    }

    /// Qualified names ordered so that every supertype precedes its subtypes
    ///
    /// Interfaces are visited first, then traits, then classes. Supertypes
    /// missing from the graph end the walk along that edge.
    pub fn traverse(&self) -> Result<Vec<String>> {
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();
        let mut order = Vec::with_capacity(self.records.len());

        for kind in [EntityKind::Interface, EntityKind::Trait, EntityKind::Class] {
            for record in self.records.values().filter(|record| record.kind == kind) {
                self.visit(record, &mut visited, &mut visiting, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        record: &'a EntityRecord,
        visited: &mut HashSet<&'a str>,
        visiting: &mut HashSet<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        let name = record.qualified_name.as_str();
        if visited.contains(name) {
            return Ok(());
        }
        if !visiting.insert(name) {
            return Err(MockBuilderError::InheritanceCycle {
                name: name.to_string(),
            });
        }

        for supertype in record.supertypes().filter_map(|supertype| self.get(supertype)) {
            self.visit(supertype, visited, visiting, order)?;
        }

        visiting.remove(name);
        visited.insert(name);
        order.push(name.to_string());
        Ok(())
    }
}
