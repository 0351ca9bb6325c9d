// src/core/engine.rs
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::MockBuilderError;
use super::{
    load_or_build, CodeParser, Emitter, EntityGraph, EntityKind, NameFilter, ParsedSource,
    Pipeline, RewriteContext, SetupContext, TypeResolver,
};

const CONFIG_FILE_NAME: &str = "mock-builder.toml";

/// Outcome of one build run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Declarations passed through the pipeline
    pub rewritten: usize,
    /// Files written, in graph order
    pub written: Vec<PathBuf>,
    /// Declarations left out by the name filter
    pub filtered: usize,
    /// Declarations skipped with a warning
    pub skipped: usize,
}

/// Main orchestration engine: scan, order, rewrite, emit
pub struct Engine {
    config: Config,
    parser: CodeParser,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        debug!("Loaded configuration: {:?}", config);

        Ok(Self {
            config,
            parser: CodeParser::new()?,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Write a default configuration file into `path` (or the current directory)
    pub fn init(&self, path: Option<PathBuf>) -> Result<PathBuf> {
        let target_dir = match path {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        std::fs::create_dir_all(&target_dir)?;

        let config_path = target_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            warn!("{} already exists, leaving it untouched", config_path.display());
        } else {
            Config::default().save(&config_path)?;
            info!("📝 Wrote {}", config_path.display());
        }
        Ok(config_path)
    }

    /// Scanned (or cached) graph of the configured roots
    pub fn load_graph(&mut self, force: bool) -> Result<EntityGraph> {
        self.check_roots()?;
        let cache_file = self.config.cache_file();
        let graph = load_or_build(
            &self.config.base_paths,
            cache_file.as_deref(),
            force,
            &mut self.parser,
            self.config.display_progress,
        )?;
        Ok(graph)
    }

    /// Declarations in processing order
    pub fn graph_order(&mut self, force: bool) -> Result<Vec<(EntityKind, String)>> {
        let graph = self.load_graph(force)?;
        let order = graph.traverse()?;
        Ok(order
            .into_iter()
            .filter_map(|name| graph.get(&name).map(|record| (record.kind, name)))
            .collect())
    }

    /// Generate a double for every declaration that passes the name filter
    pub fn build(&mut self, force: bool) -> Result<BuildSummary> {
        info!("🔍 Scanning {} source root(s)", self.config.base_paths.len());
        let target = self.prepare_target()?;
        let mut graph = self.load_graph(force)?;
        let order = graph.traverse()?;

        let resolver = TypeResolver::from_config(&self.config)?;
        let pipeline = Pipeline::from_config(&self.config);
        let emitter = Emitter::new(&target)?;
        pipeline.before_process(&SetupContext { emitter: &emitter })?;

        let filter = NameFilter::new(&self.config.class_name_filter);
        let mut sources: HashMap<PathBuf, Option<ParsedSource>> = HashMap::new();
        let mut summary = BuildSummary::default();

        for name in order {
            let Some(source_path) = graph.get(&name).map(|record| record.source_path.clone()) else {
                continue;
            };

            if self.config.display_progress {
                info!("Processing {} ({})", name, source_path.display());
            } else {
                debug!("Processing {} ({})", name, source_path.display());
            }

            let parsed = match sources.entry(source_path.clone()) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(Self::reparse(&mut self.parser, &source_path)?)
                }
            };
            let Some((scope, decl)) = parsed.as_ref().and_then(|parsed| parsed.find(&name)) else {
                warn!("{} is no longer declared in {}", name, source_path.display());
                summary.skipped += 1;
                continue;
            };

            let mut ctx = RewriteContext::new(&mut graph, &resolver, scope);
            let rewritten = pipeline.apply(decl.clone(), &mut ctx)?;
            summary.rewritten += 1;

            // global declarations still feed the return-type cache above
            if scope.namespace.as_deref().map_or(true, str::is_empty) {
                warn!("Not writing {}: declared in the global namespace ({})", name, source_path.display());
                summary.skipped += 1;
            } else if filter.matches(&name) {
                summary.written.push(emitter.write_double(scope, &rewritten)?);
            } else {
                summary.filtered += 1;
            }
        }

        info!(
            "✅ Generated {} double(s) in {} ({} filtered, {} skipped)",
            summary.written.len(),
            target.display(),
            summary.filtered,
            summary.skipped
        );
        Ok(summary)
    }

    /// Parse a file again for rewriting; `None` when it has gone missing or broken
    fn reparse(parser: &mut CodeParser, path: &Path) -> Result<Option<ParsedSource>> {
        if !path.is_file() {
            warn!("Source file {} no longer exists; refresh the graph cache", path.display());
            return Ok(None);
        }
        match parser.parse_file(path) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(MockBuilderError::Parser(message)) => {
                warn!("Skipping {}: {}", path.display(), message);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn check_roots(&self) -> Result<()> {
        if self.config.base_paths.is_empty() {
            return Err(MockBuilderError::Config("no source roots configured".to_string()).into());
        }
        for root in &self.config.base_paths {
            if !root.is_dir() {
                return Err(MockBuilderError::FileSystem(format!(
                    "source root is not a readable directory: {}",
                    root.display()
                ))
                .into());
            }
        }
        Ok(())
    }

    fn prepare_target(&self) -> Result<PathBuf> {
        let target = self.config.target_path.clone();
        std::fs::create_dir_all(&target).map_err(|source| MockBuilderError::Write {
            path: target.clone(),
            source,
        })?;
        Ok(target)
    }
}
