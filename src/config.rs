use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{MockBuilderError, Result};

/// Names of the built-in rewrite stages, in their default order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    SkipExcluded,
    PublicAndConstFilter,
    RemoveFinal,
    StripBodies,
    AddMockTools,
    SetReturnTypes,
}

impl TransformKind {
    pub fn defaults() -> Vec<TransformKind> {
        vec![
            TransformKind::SkipExcluded,
            TransformKind::PublicAndConstFilter,
            TransformKind::RemoveFinal,
            TransformKind::StripBodies,
            TransformKind::AddMockTools,
            TransformKind::SetReturnTypes,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source roots to scan for declarations
    pub base_paths: Vec<PathBuf>,

    /// Directory the generated doubles are written to
    pub target_path: PathBuf,

    /// Case-insensitive substrings; a declaration is emitted when its
    /// qualified name contains any of them (empty = emit everything)
    pub class_name_filter: Vec<String>,

    /// Log every processed declaration at info level
    pub display_progress: bool,

    /// Explicit return types keyed by `Fully\Qualified\Name::method`
    pub result_types: BTreeMap<String, String>,

    /// Directory holding entity graph snapshots
    pub cache_dir: Option<PathBuf>,

    /// Namespace the runtime support files are generated under
    pub runtime_namespace: String,

    /// PHP version the generated code must run on
    pub target_php_version: String,

    /// Declarations extending any of these are passed through untouched
    pub skip_subtypes_of: Vec<String>,

    /// Rewrite stages, applied left to right
    pub transforms: Vec<TransformKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_paths: vec![PathBuf::from("src")],
            target_path: PathBuf::from("tests/doubles"),
            class_name_filter: Vec::new(),
            display_progress: false,
            result_types: BTreeMap::new(),
            cache_dir: None,
            runtime_namespace: "MockBuilder".to_string(),
            target_php_version: "8.2".to_string(),
            skip_subtypes_of: vec![
                "Throwable".to_string(),
                "Exception".to_string(),
                "Error".to_string(),
            ],
            transforms: TransformKind::defaults(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| MockBuilderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MockBuilderError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Err(MockBuilderError::Config(format!(
                        "config file not found: {}",
                        p.as_ref().display()
                    )))
                }
            }
            None => {
                let candidates = ["mock-builder.toml", ".mock-builder.toml"];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    /// Reject settings that cannot produce a usable run
    pub fn validate(&self) -> Result<()> {
        if self.runtime_namespace.trim_matches('\\').is_empty() {
            return Err(MockBuilderError::Config(
                "runtime_namespace must not be empty".to_string(),
            ));
        }
        crate::core::PhpVersion::parse(&self.target_php_version)?;
        for key in self.result_types.keys() {
            if !key.contains("::") {
                return Err(MockBuilderError::Config(format!(
                    "result_types key '{}' must look like Class::method",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Location of the graph snapshot for the configured roots, if caching is on
    pub fn cache_file(&self) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.graph.json", crate::core::roots_hash(&self.base_paths))))
    }
}
