use std::path::{Path, PathBuf};

use tera::{Context, Tera};
use tracing::debug;

use super::syntax::{print_declaration, Declaration, NamespaceScope};
use crate::error::{MockBuilderError, Result};
use crate::runtime::support::{self, SupportFile};

const DOUBLE_TEMPLATE: &str = "double.php";
const DOUBLE_SOURCE: &str = "<?php\n\nnamespace {{ namespace }};\n\n\
{% for import in imports %}{{ import }}\n{% endfor %}{% if imports %}\n{% endif %}\
{{ declaration }}\n";

/// Writes rewritten declarations below the target root, one file each
pub struct Emitter {
    target_root: PathBuf,
    tera: Tera,
}

impl Emitter {
    pub fn new<P: Into<PathBuf>>(target_root: P) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(DOUBLE_TEMPLATE, DOUBLE_SOURCE)?;
        // PHP source, not HTML
        tera.autoescape_on(vec![]);

        Ok(Self {
            target_root: target_root.into(),
            tera,
        })
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Full file content for one declaration
    pub fn render_double(&self, scope: &NamespaceScope, decl: &Declaration) -> Result<String> {
        let imports: Vec<String> = scope.imports.iter().map(|import| import.render()).collect();

        let mut context = Context::new();
        context.insert("namespace", scope.namespace.as_deref().unwrap_or_default());
        context.insert("imports", &imports);
        context.insert("declaration", &print_declaration(decl));

        Ok(self.tera.render(DOUBLE_TEMPLATE, &context)?)
    }

    /// `<target>/<namespace as path>/<Name>.php`
    pub fn output_path(&self, decl: &Declaration) -> PathBuf {
        let mut path = namespace_dir(&self.target_root, decl.namespace.as_deref().unwrap_or_default());
        path.push(format!("{}.php", decl.name));
        path
    }

    pub fn write_double(&self, scope: &NamespaceScope, decl: &Declaration) -> Result<PathBuf> {
        let content = self.render_double(scope, decl)?;
        let path = self.output_path(decl);
        write_file(&path, &content)?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Copy the recording runtime into `<target>/<namespace as path>/Mocker/`
    pub fn write_runtime_support(&self, runtime_namespace: &str) -> Result<Vec<PathBuf>> {
        let namespace = runtime_namespace.trim_matches('\\');
        let dir = namespace_dir(&self.target_root, namespace).join("Mocker");

        let mut written = Vec::new();
        for file in [SupportFile::MockTools, SupportFile::MockDefinition] {
            let path = dir.join(file.file_name());
            write_file(&path, &support::render(file, namespace))?;
            written.push(path);
        }
        Ok(written)
    }
}

fn namespace_dir(root: &Path, namespace: &str) -> PathBuf {
    namespace
        .split('\\')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |dir, segment| dir.join(segment))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| MockBuilderError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, content).map_err(|source| MockBuilderError::Write {
        path: path.to_path_buf(),
        source,
    })
}
