use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{MockBuilderError, Result};
use super::languages::PhpParser;
use super::syntax::ParsedSource;

const PHP_EXTENSION: &str = "php";

/// Reads PHP files from disk and hands them to the tree-sitter front end
pub struct CodeParser {
    php: PhpParser,
}

impl CodeParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            php: PhpParser::new()?,
        })
    }

    /// All PHP files below a source root, in file-name order
    pub fn discover<P: AsRef<Path>>(&self, root: P) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for entry in WalkDir::new(root.as_ref()).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.as_ref().display(), e);
                    continue;
                }
            };

            if entry.file_type().is_file() && is_php_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files
    }

    /// Parse a single source file
    ///
    /// Read failures surface as `Io` errors; content that is not UTF-8 or
    /// does not parse surfaces as `Parser`.
    pub fn parse_file<P: AsRef<Path>>(&mut self, file_path: P) -> Result<ParsedSource> {
        let path = file_path.as_ref();
        let bytes = std::fs::read(path)?;
        let source_content = String::from_utf8(bytes).map_err(|e| {
            MockBuilderError::Parser(format!("{} is not valid UTF-8: {}", path.display(), e.utf8_error()))
        })?;
        self.parse_source(&source_content, path)
    }

    pub fn parse_source(&mut self, content: &str, path: &Path) -> Result<ParsedSource> {
        self.php.parse(content, path)
    }
}

fn is_php_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case(PHP_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_sorted_php_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/Zed.php"), "<?php").unwrap();
        std::fs::write(dir.path().join("a.PHP"), "<?php").unwrap();
        std::fs::write(dir.path().join("readme.md"), "# no").unwrap();

        let parser = CodeParser::new().unwrap();
        let files = parser.discover(dir.path());
        assert_eq!(files, vec![dir.path().join("a.PHP"), dir.path().join("b/Zed.php")]);
    }

    #[test]
    fn test_non_utf8_file_is_a_parser_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Legacy.php");
        std::fs::write(&path, b"<?php\n// caf\xe9\nnamespace App;\nclass Legacy {}\n").unwrap();

        let mut parser = CodeParser::new().unwrap();
        assert!(matches!(parser.parse_file(&path), Err(MockBuilderError::Parser(_))));
    }
}
