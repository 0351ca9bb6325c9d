// src/core/languages/php.rs - PHP declarations via tree-sitter
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;
use tree_sitter::{Node, Parser};

use crate::core::syntax::{
    ClassModifier, Constant, Declaration, EntityKind, Import, ImportKind, Member, Method,
    MethodBody, NamespaceBlock, NamespaceScope, Param, ParsedSource, Visibility,
};
use crate::error::{MockBuilderError, Result};

/// Node kinds whose bodies are not part of the enclosing method's control flow
const NESTED_SCOPES: &[&str] = &[
    "anonymous_function",
    "anonymous_function_creation_expression",
    "arrow_function",
    "function_definition",
    "class_declaration",
    "anonymous_class",
    "declaration_list",
];

/// PHP parser lowering tree-sitter trees into the declaration model
pub struct PhpParser {
    parser: Parser,
}

impl PhpParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let php_language = tree_sitter_php::language_php();
        parser.set_language(&php_language)
            .map_err(|e| MockBuilderError::Parser(format!("Failed to set PHP language: {}", e)))?;

        Ok(Self { parser })
    }

    /// Parse PHP source; a tree with syntax errors is rejected as a whole
    pub fn parse(&mut self, content: &str, file_path: &Path) -> Result<ParsedSource> {
        let tree = self.parser.parse(content, None)
            .ok_or_else(|| MockBuilderError::Parser("Failed to parse PHP code".to_string()))?;

        let root_node = tree.root_node();
        if root_node.has_error() {
            let line = first_error_row(root_node).map(|row| row + 1).unwrap_or(0);
            return Err(MockBuilderError::Parser(format!(
                "syntax error in {} near line {}",
                file_path.display(),
                line
            )));
        }

        let mut blocks = Vec::new();
        self.lower_program(root_node, content, file_path, &mut blocks);

        Ok(ParsedSource {
            path: file_path.to_path_buf(),
            blocks,
        })
    }
}

impl PhpParser {
    /// Split the program into namespace blocks
    fn lower_program(&self, root: Node, source: &str, file_path: &Path, blocks: &mut Vec<NamespaceBlock>) {
        let mut current = NamespaceBlock {
            scope: NamespaceScope::default(),
            declarations: Vec::new(),
        };

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if child.kind() != "namespace_definition" {
                self.lower_statement(child, source, file_path, &mut current);
                continue;
            }

            let namespace = child
                .child_by_field_name("name")
                .map(|name| self.node_text(name, source).trim_start_matches('\\').to_string())
                .filter(|name| !name.is_empty());

            match child.child_by_field_name("body") {
                Some(body) => {
                    // braced form: `namespace X { ... }`
                    flush(blocks, &mut current, None);
                    let mut block = NamespaceBlock {
                        scope: NamespaceScope { namespace, imports: Vec::new() },
                        declarations: Vec::new(),
                    };
                    let mut body_cursor = body.walk();
                    for statement in body.named_children(&mut body_cursor) {
                        self.lower_statement(statement, source, file_path, &mut block);
                    }
                    if !block.declarations.is_empty() {
                        blocks.push(block);
                    }
                }
                None => flush(blocks, &mut current, namespace),
            }
        }

        flush(blocks, &mut current, None);
    }

    fn lower_statement(&self, node: Node, source: &str, file_path: &Path, block: &mut NamespaceBlock) {
        let kind = match node.kind() {
            "namespace_use_declaration" => {
                block.scope.imports.extend(parse_use_statement(self.node_text(node, source)));
                return;
            }
            "class_declaration" => EntityKind::Class,
            "interface_declaration" => EntityKind::Interface,
            "trait_declaration" => EntityKind::Trait,
            _ => return,
        };

        match self.lower_declaration(node, kind, source, &block.scope) {
            Some(declaration) => block.declarations.push(declaration),
            None => warn!(
                "Declaration without a name in {} at line {}",
                file_path.display(),
                node.start_position().row + 1
            ),
        }
    }

    fn lower_declaration(
        &self,
        node: Node,
        kind: EntityKind,
        source: &str,
        scope: &NamespaceScope,
    ) -> Option<Declaration> {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.node_text(n, source).to_string())
            .filter(|n| !n.is_empty())?;

        let mut modifiers = Vec::new();
        let mut attributes = Vec::new();
        let mut extends = Vec::new();
        let mut implements = Vec::new();

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "abstract_modifier" => modifiers.push(ClassModifier::Abstract),
                "final_modifier" => modifiers.push(ClassModifier::Final),
                "readonly_modifier" => modifiers.push(ClassModifier::Readonly),
                "attribute_list" => attributes.push(self.node_text(child, source).to_string()),
                "base_clause" => extends = self.clause_names(child, source),
                "class_interface_clause" => implements = self.clause_names(child, source),
                _ => {}
            }
        }

        let members = node
            .child_by_field_name("body")
            .map(|body| self.lower_members(body, source))
            .unwrap_or_default();

        Some(Declaration {
            kind,
            name,
            namespace: scope.namespace.clone(),
            doc_comment: self.doc_comment_before(node, source),
            attributes,
            modifiers,
            extends,
            implements,
            members,
        })
    }

    /// Names listed in an `extends` / `implements` clause
    fn clause_names(&self, clause: Node, source: &str) -> Vec<String> {
        let mut cursor = clause.walk();
        clause
            .named_children(&mut cursor)
            .filter(|n| matches!(n.kind(), "name" | "qualified_name"))
            .map(|n| self.node_text(n, source).to_string())
            .collect()
    }

    fn lower_members(&self, body: Node, source: &str) -> Vec<Member> {
        let mut members = Vec::new();
        let mut pending_doc: Option<String> = None;

        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            match child.kind() {
                "comment" => {
                    let text = self.node_text(child, source);
                    if text.starts_with("/**") {
                        pending_doc = Some(text.to_string());
                    }
                }
                "method_declaration" => {
                    if let Some(method) = self.lower_method(child, source, pending_doc.take()) {
                        members.push(Member::Method(method));
                    }
                }
                "const_declaration" => {
                    members.push(Member::Constant(self.lower_constant(child, source, pending_doc.take())));
                }
                "use_declaration" => {
                    pending_doc = None;
                    let text = self.node_text(child, source).trim();
                    let inner = text
                        .get(3..)
                        .map(|rest| rest.trim().trim_end_matches(';').trim())
                        .unwrap_or_default();
                    if text.contains('{') || inner.is_empty() {
                        members.push(Member::Verbatim(text.to_string()));
                    } else {
                        members.push(Member::TraitUse(inner.to_string()));
                    }
                }
                _ => {
                    let text = self.node_text(child, source).trim();
                    let member = match pending_doc.take() {
                        Some(doc) => format!("{}\n    {}", doc.trim(), text),
                        None => text.to_string(),
                    };
                    members.push(Member::Verbatim(member));
                }
            }
        }

        members
    }

    fn lower_method(&self, node: Node, source: &str, doc_comment: Option<String>) -> Option<Method> {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.node_text(n, source).to_string())?;

        let mut method = Method {
            doc_comment,
            attributes: Vec::new(),
            visibility: None,
            is_static: false,
            is_abstract: false,
            is_final: false,
            by_ref: false,
            name,
            params: Vec::new(),
            return_type: None,
            body: None,
            body_returns_value: None,
        };

        let mut body = None;
        let mut after_colon = false;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "attribute_list" => method.attributes.push(self.node_text(child, source).to_string()),
                "visibility_modifier" => method.visibility = Visibility::parse(self.node_text(child, source)),
                "static_modifier" => method.is_static = true,
                "abstract_modifier" => method.is_abstract = true,
                "final_modifier" => method.is_final = true,
                "reference_modifier" => method.by_ref = true,
                "formal_parameters" => method.params = self.lower_params(child, source),
                "compound_statement" => body = Some(child),
                ":" => after_colon = true,
                _ if after_colon && child.is_named() && method.return_type.is_none() => {
                    method.return_type = Some(self.node_text(child, source).to_string());
                }
                _ => {}
            }
        }

        if let Some(return_type) = node.child_by_field_name("return_type") {
            method.return_type = Some(self.node_text(return_type, source).to_string());
        }
        if let Some(body) = node.child_by_field_name("body").or(body) {
            method.body = Some(MethodBody::Source(self.node_text(body, source).to_string()));
            method.body_returns_value = Some(contains_value_return(body));
        }

        Some(method)
    }

    fn lower_params(&self, params: Node, source: &str) -> Vec<Param> {
        let mut cursor = params.walk();
        params
            .named_children(&mut cursor)
            .filter(|p| {
                matches!(
                    p.kind(),
                    "simple_parameter" | "variadic_parameter" | "property_promotion_parameter"
                )
            })
            .filter_map(|p| {
                let variable = p
                    .child_by_field_name("name")
                    .filter(|n| n.kind() == "variable_name")
                    .or_else(|| find_descendant(p, "variable_name"))?;
                Some(Param {
                    name: self.node_text(variable, source).trim_start_matches('$').to_string(),
                    text: self.node_text(p, source).to_string(),
                    variadic: p.kind() == "variadic_parameter",
                })
            })
            .collect()
    }

    fn lower_constant(&self, node: Node, source: &str, doc_comment: Option<String>) -> Constant {
        let mut constant = Constant {
            doc_comment,
            attributes: Vec::new(),
            visibility: None,
            is_final: false,
            text: String::new(),
        };

        let mut tail_start = node.start_byte();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "attribute_list" => {
                    constant.attributes.push(self.node_text(child, source).to_string());
                }
                "visibility_modifier" => {
                    constant.visibility = Visibility::parse(self.node_text(child, source));
                }
                "final_modifier" => constant.is_final = true,
                _ => continue,
            }
            tail_start = child.end_byte();
        }

        constant.text = source
            .get(tail_start..node.end_byte())
            .unwrap_or_default()
            .trim()
            .to_string();
        constant
    }

    /// `/** ... */` comment directly preceding a node
    fn doc_comment_before(&self, node: Node, source: &str) -> Option<String> {
        let previous = node.prev_named_sibling()?;
        let text = self.node_text(previous, source);
        (previous.kind() == "comment" && text.starts_with("/**")).then(|| text.to_string())
    }

    fn node_text<'a>(&self, node: Node, source: &'a str) -> &'a str {
        source.get(node.byte_range()).unwrap_or_default()
    }
}

/// Push the block being filled (if it holds declarations) and start a new one
fn flush(blocks: &mut Vec<NamespaceBlock>, current: &mut NamespaceBlock, next_namespace: Option<String>) {
    let next = NamespaceBlock {
        scope: NamespaceScope {
            namespace: next_namespace,
            imports: Vec::new(),
        },
        declarations: Vec::new(),
    };
    let finished = std::mem::replace(current, next);
    if !finished.declarations.is_empty() {
        blocks.push(finished);
    }
}

/// Whether a method body returns a value (or yields, which makes it a generator)
fn contains_value_return(node: Node) -> bool {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    children.into_iter().any(|child| match child.kind() {
        "return_statement" => {
            let mut inner = child.walk();
            let has_value = child.named_children(&mut inner).any(|n| n.kind() != "comment");
            has_value
        }
        "yield_expression" => true,
        kind if NESTED_SCOPES.contains(&kind) => false,
        _ => contains_value_return(child),
    })
}

fn find_descendant<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    let children: Vec<Node<'a>> = node.named_children(&mut cursor).collect();
    for child in children {
        if child.kind() == kind {
            return Some(child);
        }
        if let Some(found) = find_descendant(child, kind) {
            return Some(found);
        }
    }
    None
}

fn first_error_row(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().filter(|c| c.has_error()).find_map(first_error_row)
}

/// Expand a `use ...;` statement into its imports, including group imports
pub fn parse_use_statement(text: &str) -> Vec<Import> {
    static CLAUSE: OnceLock<Regex> = OnceLock::new();
    let clause = CLAUSE.get_or_init(|| {
        Regex::new(r"(?i)^(?:(function|const)\s+)?\\?([^\s,{}]+?)(?:\s+as\s+([^\s,{}]+))?$")
            .expect("valid use clause pattern")
    });

    let body = text.trim().trim_end_matches(';').trim();
    let body = match strip_keyword(body, "use") {
        Some(rest) => rest,
        None => return Vec::new(),
    };
    let (default_kind, body) = if let Some(rest) = strip_keyword(body, "function") {
        (ImportKind::Function, rest)
    } else if let Some(rest) = strip_keyword(body, "const") {
        (ImportKind::Const, rest)
    } else {
        (ImportKind::Class, body)
    };

    let (prefix, items) = match body.split_once('{') {
        Some((prefix, group)) => {
            let prefix = prefix.trim().trim_matches('\\');
            (Some(prefix), group.trim_end().trim_end_matches('}'))
        }
        None => (None, body),
    };

    items
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| {
            let captures = clause.captures(item)?;
            let kind = match captures.get(1).map(|m| m.as_str().to_ascii_lowercase()) {
                Some(k) if k == "function" => ImportKind::Function,
                Some(_) => ImportKind::Const,
                None => default_kind,
            };
            let name = captures.get(2)?.as_str().trim_start_matches('\\');
            let name = match prefix {
                Some(prefix) if !prefix.is_empty() => format!("{}\\{}", prefix, name),
                _ => name.to_string(),
            };
            Some(Import {
                kind,
                name,
                alias: captures.get(3).map(|m| m.as_str().to_string()),
            })
        })
        .collect()
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    let rest = text.get(keyword.len()..)?;
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace)).then(|| rest.trim_start())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParsedSource {
        let mut parser = PhpParser::new().unwrap();
        parser.parse(source, Path::new("test.php")).unwrap()
    }

    #[test]
    fn test_parse_use_statement() {
        let imports = parse_use_statement("use Foo\\Bar, \\Baz\\Qux as Q;");
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].name, "Foo\\Bar");
        assert_eq!(imports[0].alias, None);
        assert_eq!(imports[1].name, "Baz\\Qux");
        assert_eq!(imports[1].alias.as_deref(), Some("Q"));

        let imports = parse_use_statement("use function App\\Util\\{first, last as final_item};");
        assert_eq!(imports.len(), 2);
        assert!(imports.iter().all(|i| i.kind == ImportKind::Function));
        assert_eq!(imports[1].name, "App\\Util\\last");
        assert_eq!(imports[1].alias.as_deref(), Some("final_item"));

        let imports = parse_use_statement("use App\\{Model\\User, const LIMIT};");
        assert_eq!(imports[0].kind, ImportKind::Class);
        assert_eq!(imports[0].name, "App\\Model\\User");
        assert_eq!(imports[1].kind, ImportKind::Const);
        assert_eq!(imports[1].name, "App\\LIMIT");
    }

    #[test]
    fn test_lower_class_members() {
        let source = r#"<?php
namespace App\Service;

use Psr\Log\LoggerInterface;

/**
 * Sends mail.
 */
final class Mailer extends BaseMailer implements MailerInterface, \Countable
{
    public const VERSION = 2;
    private const SECRET = 'x';

    private LoggerInterface $logger;

    /**
     * @return int
     */
    public function send(string $to, array $headers = [], ...$rest)
    {
        $fn = function () { return 1; };
        return 5;
    }

    protected function log($message): void
    {
        $this->logger->info($message);
    }

    final public static function create(): static
    {
    }
}
"#;
        let parsed = parse(source);
        assert_eq!(parsed.blocks.len(), 1);
        let block = &parsed.blocks[0];
        assert_eq!(block.scope.namespace.as_deref(), Some("App\\Service"));
        assert_eq!(block.scope.imports[0].name, "Psr\\Log\\LoggerInterface");

        let decl = &block.declarations[0];
        assert_eq!(decl.kind, EntityKind::Class);
        assert_eq!(decl.qualified_name(), "App\\Service\\Mailer");
        assert_eq!(decl.modifiers, vec![ClassModifier::Final]);
        assert_eq!(decl.extends, vec!["BaseMailer".to_string()]);
        assert_eq!(decl.implements, vec!["MailerInterface".to_string(), "\\Countable".to_string()]);
        assert!(decl.doc_comment.as_deref().unwrap().contains("Sends mail."));

        let constants: Vec<&Constant> = decl
            .members
            .iter()
            .filter_map(|m| match m {
                Member::Constant(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(constants.len(), 2);
        assert_eq!(constants[0].visibility, Some(Visibility::Public));
        assert_eq!(constants[0].text, "const VERSION = 2;");
        assert_eq!(constants[1].visibility, Some(Visibility::Private));

        let methods: Vec<&Method> = decl.methods().collect();
        assert_eq!(methods.len(), 3);

        let send = methods[0];
        assert_eq!(send.name, "send");
        assert!(send.doc_comment.as_deref().unwrap().contains("@return int"));
        assert_eq!(send.params.len(), 3);
        assert_eq!(send.params[1].name, "headers");
        assert_eq!(send.params[1].text, "array $headers = []");
        assert!(send.params[2].variadic);
        assert_eq!(send.return_type, None);
        assert_eq!(send.body_returns_value, Some(true));

        let log = methods[1];
        assert_eq!(log.visibility, Some(Visibility::Protected));
        assert_eq!(log.return_type.as_deref(), Some("void"));
        assert_eq!(log.body_returns_value, Some(false));

        let create = methods[2];
        assert!(create.is_final && create.is_static);
        assert_eq!(create.return_type.as_deref(), Some("static"));
    }

    #[test]
    fn test_closure_returns_do_not_count() {
        let source = r#"<?php
namespace App;
class Runner {
    public function run() {
        array_map(function ($x) { return $x * 2; }, []);
        $f = fn($y) => $y;
    }
    public function gen() {
        yield 1;
    }
}
"#;
        let parsed = parse(source);
        let decl = &parsed.blocks[0].declarations[0];
        let methods: Vec<&Method> = decl.methods().collect();
        assert_eq!(methods[0].body_returns_value, Some(false));
        assert_eq!(methods[1].body_returns_value, Some(true));
    }

    #[test]
    fn test_multiple_namespace_blocks() {
        let source = r#"<?php
namespace First {
    use Other\Thing;
    interface A extends Thing {}
}
namespace Second {
    trait T {}
    abstract class B implements \First\A {
        abstract public function go(int $x): string;
    }
}
"#;
        let parsed = parse(source);
        assert_eq!(parsed.blocks.len(), 2);
        assert_eq!(parsed.blocks[0].declarations[0].kind, EntityKind::Interface);
        assert_eq!(parsed.blocks[0].declarations[0].extends, vec!["Thing".to_string()]);
        assert_eq!(parsed.blocks[1].scope.namespace.as_deref(), Some("Second"));
        assert!(parsed.blocks[1].scope.imports.is_empty());

        let (scope, b) = parsed.find("Second\\B").unwrap();
        assert_eq!(scope.namespace.as_deref(), Some("Second"));
        let go = b.methods().next().unwrap();
        assert!(go.is_abstract);
        assert!(go.body.is_none());
        assert_eq!(go.return_type.as_deref(), Some("string"));
    }

    #[test]
    fn test_syntax_error_is_rejected() {
        let mut parser = PhpParser::new().unwrap();
        let result = parser.parse("<?php class { public function", Path::new("broken.php"));
        assert!(matches!(result, Err(MockBuilderError::Parser(_))));
    }
}
