//! PHP sources of the recording runtime copied next to the generated doubles.

const MOCK_TOOLS: &str = include_str!("php/MockTools.php");
const MOCK_DEFINITION: &str = include_str!("php/MockDefinition.php");
const BUNDLED_NAMESPACE_LINE: &str = "namespace MockBuilder\\Mocker;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportFile {
    MockTools,
    MockDefinition,
}

impl SupportFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            SupportFile::MockTools => "MockTools.php",
            SupportFile::MockDefinition => "MockDefinition.php",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            SupportFile::MockTools => MOCK_TOOLS,
            SupportFile::MockDefinition => MOCK_DEFINITION,
        }
    }
}

/// Source of `file` with its namespace moved under `runtime_namespace`
pub fn render(file: SupportFile, runtime_namespace: &str) -> String {
    let namespace = runtime_namespace.trim_matches('\\');
    file.source().replacen(
        BUNDLED_NAMESPACE_LINE,
        &format!("namespace {}\\Mocker;", namespace),
        1,
    )
}
