//! Owned declaration model lowered from the PHP syntax tree, and the printer
//! that turns it back into source text.
//!
//! Only the parts the rewrite stages touch are modelled structurally
//! (modifiers, names, parameters, return types, member kinds). Bodies,
//! attributes, parameters and unmodelled members are kept as verbatim text.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const INDENT: &str = "    ";

/// Kind of a top-level declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Class,
    Interface,
    Trait,
}

impl EntityKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::Interface => "interface",
            EntityKind::Trait => "trait",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn parse(text: &str) -> Option<Visibility> {
        match text.to_ascii_lowercase().as_str() {
            "public" => Some(Visibility::Public),
            "protected" => Some(Visibility::Protected),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

/// Modifier written in front of `class`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassModifier {
    Abstract,
    Final,
    Readonly,
}

impl ClassModifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassModifier::Abstract => "abstract",
            ClassModifier::Final => "final",
            ClassModifier::Readonly => "readonly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportKind {
    Class,
    Function,
    Const,
}

/// One `use` import of a namespace block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub kind: ImportKind,
    /// Fully-qualified imported name, without a leading backslash
    pub name: String,
    pub alias: Option<String>,
}

impl Import {
    /// Name the import is visible under in the importing file
    pub fn local_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.name.rsplit('\\').next().unwrap_or(&self.name),
        }
    }

    pub fn render(&self) -> String {
        let prefix = match self.kind {
            ImportKind::Class => "",
            ImportKind::Function => "function ",
            ImportKind::Const => "const ",
        };
        match &self.alias {
            Some(alias) => format!("use {}{} as {};", prefix, self.name, alias),
            None => format!("use {}{};", prefix, self.name),
        }
    }
}

/// A method parameter; `text` is the verbatim source of the parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub text: String,
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodBody {
    /// Original `{ ... }` block
    Source(String),
    /// Replaced by a call into the recording runtime
    Instrumented { returns_value: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub doc_comment: Option<String>,
    pub attributes: Vec<String>,
    pub visibility: Option<Visibility>,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    pub by_ref: bool,
    pub name: String,
    pub params: Vec<Param>,
    /// Return type as it is printed after the parameter list
    pub return_type: Option<String>,
    /// `None` for abstract and interface methods
    pub body: Option<MethodBody>,
    /// Whether the original body contains `return <expr>;`
    pub body_returns_value: Option<bool>,
}

impl Method {
    /// Methods without a modifier are public
    pub fn is_public(&self) -> bool {
        matches!(self.visibility, None | Some(Visibility::Public))
    }

    /// PHP rejects a return type (or a returned value) on these
    pub fn forbids_return_type(&self) -> bool {
        ["__construct", "__destruct", "__clone"]
            .iter()
            .any(|magic| self.name.eq_ignore_ascii_case(magic))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub doc_comment: Option<String>,
    pub attributes: Vec<String>,
    pub visibility: Option<Visibility>,
    pub is_final: bool,
    /// Source from the `const` keyword through the terminating `;`
    pub text: String,
}

impl Constant {
    pub fn is_public(&self) -> bool {
        matches!(self.visibility, None | Some(Visibility::Public))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    Method(Method),
    Constant(Constant),
    /// `use Some\Trait;` inside the body
    TraitUse(String),
    /// Anything else (properties, enum cases) kept as source text
    Verbatim(String),
}

/// A class, interface or trait with its members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: EntityKind,
    pub name: String,
    pub namespace: Option<String>,
    pub doc_comment: Option<String>,
    pub attributes: Vec<String>,
    pub modifiers: Vec<ClassModifier>,
    /// `extends` names as written in source
    pub extends: Vec<String>,
    /// `implements` names as written in source
    pub implements: Vec<String>,
    pub members: Vec<Member>,
}

impl Declaration {
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}\\{}", ns, self.name),
            _ => self.name.clone(),
        }
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.members.iter().filter_map(|member| match member {
            Member::Method(method) => Some(method),
            _ => None,
        })
    }

    pub fn methods_mut(&mut self) -> impl Iterator<Item = &mut Method> {
        self.members.iter_mut().filter_map(|member| match member {
            Member::Method(method) => Some(method),
            _ => None,
        })
    }

    /// Whether the declaration can carry method bodies and trait uses
    pub fn has_bodies(&self) -> bool {
        matches!(self.kind, EntityKind::Class | EntityKind::Trait)
    }
}

/// Namespace and imports in effect for a group of declarations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceScope {
    pub namespace: Option<String>,
    pub imports: Vec<Import>,
}

impl NamespaceScope {
    /// Resolve a class name as written in source to its fully-qualified form
    pub fn resolve_class_name(&self, raw: &str) -> String {
        let raw = raw.trim();
        if let Some(absolute) = raw.strip_prefix('\\') {
            return absolute.to_string();
        }
        if let Some(relative) = raw
            .get(..10)
            .filter(|head| head.eq_ignore_ascii_case("namespace\\"))
            .and_then(|_| raw.get(10..))
        {
            return self.prefixed(relative);
        }

        let (first, rest) = match raw.split_once('\\') {
            Some((first, rest)) => (first, Some(rest)),
            None => (raw, None),
        };
        let imported = self
            .imports
            .iter()
            .filter(|import| import.kind == ImportKind::Class)
            .find(|import| import.local_name().eq_ignore_ascii_case(first));
        match (imported, rest) {
            (Some(import), Some(rest)) => format!("{}\\{}", import.name, rest),
            (Some(import), None) => import.name.clone(),
            (None, _) => self.prefixed(raw),
        }
    }

    /// Render a fully-qualified class name as it should appear in this scope
    pub fn shorten(&self, qualified: &str) -> String {
        let qualified = qualified.trim_start_matches('\\');

        for import in self.imports.iter().filter(|i| i.kind == ImportKind::Class) {
            let alias_matches = import
                .alias
                .as_deref()
                .map_or(false, |alias| alias.eq_ignore_ascii_case(qualified));
            if import.name.eq_ignore_ascii_case(qualified) || alias_matches {
                return import.local_name().to_string();
            }
        }

        if let Some(ns) = self.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            let inside = qualified
                .get(..ns.len())
                .map_or(false, |head| head.eq_ignore_ascii_case(ns))
                && qualified.as_bytes().get(ns.len()) == Some(&b'\\');
            if let Some(relative) = qualified.get(ns.len() + 1..).filter(|r| inside && !r.is_empty()) {
                // an import with the same leading name would capture the relative form
                let head = relative.split('\\').next().unwrap_or(relative);
                if !self.imports_local_name(head) {
                    return relative.to_string();
                }
            }
        } else if !qualified.contains('\\') && !self.imports_local_name(qualified) {
            return qualified.to_string();
        }

        format!("\\{}", qualified)
    }

    fn imports_local_name(&self, name: &str) -> bool {
        self.imports
            .iter()
            .any(|import| import.kind == ImportKind::Class && import.local_name().eq_ignore_ascii_case(name))
    }

    fn prefixed(&self, name: &str) -> String {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}\\{}", ns, name),
            _ => name.to_string(),
        }
    }
}

/// Declarations of one namespace block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceBlock {
    pub scope: NamespaceScope,
    pub declarations: Vec<Declaration>,
}

/// A whole source file after lowering
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub path: PathBuf,
    pub blocks: Vec<NamespaceBlock>,
}

impl ParsedSource {
    /// Find a declaration by its fully-qualified name, with the scope it lives in
    pub fn find(&self, qualified_name: &str) -> Option<(&NamespaceScope, &Declaration)> {
        self.blocks.iter().find_map(|block| {
            block
                .declarations
                .iter()
                .find(|decl| decl.qualified_name() == qualified_name)
                .map(|decl| (&block.scope, decl))
        })
    }
}

/// Print a declaration as PHP source (without a trailing newline)
pub fn print_declaration(decl: &Declaration) -> String {
    let mut out = String::new();

    if let Some(doc) = &decl.doc_comment {
        push_doc_comment(&mut out, doc, "");
    }
    for attribute in &decl.attributes {
        out.push_str(attribute);
        out.push('\n');
    }

    for modifier in &decl.modifiers {
        out.push_str(modifier.as_str());
        out.push(' ');
    }
    out.push_str(decl.kind.keyword());
    out.push(' ');
    out.push_str(&decl.name);
    if !decl.extends.is_empty() {
        let _ = write!(out, " extends {}", decl.extends.join(", "));
    }
    if !decl.implements.is_empty() {
        let _ = write!(out, " implements {}", decl.implements.join(", "));
    }
    out.push_str("\n{\n");

    let mut first = true;
    let mut previous_was_use = false;
    for member in &decl.members {
        let is_use = matches!(member, Member::TraitUse(_));
        // consecutive trait uses stay grouped
        if !first && !(is_use && previous_was_use) {
            out.push('\n');
        }
        first = false;
        previous_was_use = is_use;

        match member {
            Member::Method(method) => print_method(&mut out, method),
            Member::Constant(constant) => print_constant(&mut out, constant),
            Member::TraitUse(name) => {
                let _ = writeln!(out, "{}use {};", INDENT, name);
            }
            Member::Verbatim(text) => {
                let _ = writeln!(out, "{}{}", INDENT, text);
            }
        }
    }

    out.push('}');
    out
}

fn print_constant(out: &mut String, constant: &Constant) {
    if let Some(doc) = &constant.doc_comment {
        push_doc_comment(out, doc, INDENT);
    }
    for attribute in &constant.attributes {
        let _ = writeln!(out, "{}{}", INDENT, attribute);
    }
    out.push_str(INDENT);
    if constant.is_final {
        out.push_str("final ");
    }
    if let Some(visibility) = constant.visibility {
        out.push_str(visibility.as_str());
        out.push(' ');
    }
    out.push_str(&constant.text);
    out.push('\n');
}

fn print_method(out: &mut String, method: &Method) {
    if let Some(doc) = &method.doc_comment {
        push_doc_comment(out, doc, INDENT);
    }
    for attribute in &method.attributes {
        let _ = writeln!(out, "{}{}", INDENT, attribute);
    }

    out.push_str(INDENT);
    if method.is_abstract {
        out.push_str("abstract ");
    }
    if method.is_final {
        out.push_str("final ");
    }
    if let Some(visibility) = method.visibility {
        out.push_str(visibility.as_str());
        out.push(' ');
    }
    if method.is_static {
        out.push_str("static ");
    }
    out.push_str("function ");
    if method.by_ref {
        out.push('&');
    }
    out.push_str(&method.name);
    out.push('(');
    let params: Vec<&str> = method.params.iter().map(|p| p.text.as_str()).collect();
    out.push_str(&params.join(", "));
    out.push(')');
    if let Some(return_type) = &method.return_type {
        let _ = write!(out, ": {}", return_type);
    }

    match &method.body {
        None => out.push_str(";\n"),
        Some(MethodBody::Source(text)) => {
            let _ = writeln!(out, "\n{}{}", INDENT, text.trim());
        }
        Some(MethodBody::Instrumented { returns_value }) => {
            let _ = writeln!(out, "\n{}{{", INDENT);
            let call = instrumentation_call(method);
            match (*returns_value, method.by_ref) {
                // only variables may be returned by reference
                (true, true) => {
                    let _ = writeln!(out, "{}{}$mockedResult = {};", INDENT, INDENT, call);
                    let _ = writeln!(out, "{}{}return $mockedResult;", INDENT, INDENT);
                }
                (true, false) => {
                    let _ = writeln!(out, "{}{}return {};", INDENT, INDENT, call);
                }
                (false, _) => {
                    let _ = writeln!(out, "{}{}{};", INDENT, INDENT, call);
                }
            }
            let _ = writeln!(out, "{}}}", INDENT);
        }
    }
}

/// `self::executeMocked('name', [$a, $b], $this)`
pub fn instrumentation_call(method: &Method) -> String {
    let args: Vec<String> = method.params.iter().map(|p| format!("${}", p.name)).collect();
    let escaped = method.name.replace('\\', "\\\\").replace('\'', "\\'");
    if method.is_static {
        format!("self::executeMocked('{}', [{}])", escaped, args.join(", "))
    } else {
        format!("self::executeMocked('{}', [{}], $this)", escaped, args.join(", "))
    }
}

fn push_doc_comment(out: &mut String, doc: &str, indent: &str) {
    for (index, line) in doc.trim().lines().enumerate() {
        let line = line.trim();
        out.push_str(indent);
        if index > 0 && line.starts_with('*') {
            out.push(' ');
        }
        out.push_str(line);
        out.push('\n');
    }
}
