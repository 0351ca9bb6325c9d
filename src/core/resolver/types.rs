use serde::{Deserialize, Serialize};

use crate::core::syntax::NamespaceScope;
use crate::error::{MockBuilderError, Result};

/// PHP version the generated doubles target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhpVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PhpVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.trim().split('.').map(|part| {
            part.parse::<u32>().map_err(|_| {
                MockBuilderError::Config(format!("invalid PHP version '{}'", text))
            })
        });
        let major = parts.next().ok_or_else(|| {
            MockBuilderError::Config(format!("invalid PHP version '{}'", text))
        })??;
        let minor = parts.next().transpose()?.unwrap_or(0);
        let patch = parts.next().transpose()?.unwrap_or(0);
        Ok(Self::new(major, minor, patch))
    }

    /// `true` and `false` as standalone return types arrived in 8.2
    pub fn supports_literal_bool_returns(&self) -> bool {
        *self >= PhpVersion::new(8, 2, 0)
    }
}

/// A resolved return type
///
/// Class names are stored fully-qualified so a type resolved in one file can
/// be rendered in another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TypeHint {
    /// Native keyword type, lowercase (`int`, `array`, `mixed`, `self`, ...)
    Builtin(String),
    /// Fully-qualified class name without a leading backslash
    Class(String),
    /// Returns the receiver's own concrete type (`static`)
    SameAsReceiver,
    /// Returns nothing (`void`)
    NoValue,
    Optional(Box<TypeHint>),
    Union(Vec<TypeHint>),
    Intersection(Vec<TypeHint>),
}

impl TypeHint {
    pub fn mixed() -> TypeHint {
        TypeHint::Builtin("mixed".to_string())
    }

    fn builtin(name: &str) -> TypeHint {
        TypeHint::Builtin(name.to_string())
    }

    fn is_builtin(&self, name: &str) -> bool {
        matches!(self, TypeHint::Builtin(b) if b == name)
    }

    /// Whether a call returning this type must not produce a value
    pub fn is_no_value(&self) -> bool {
        matches!(self, TypeHint::NoValue) || self.is_builtin("never")
    }

    /// Parse and normalize a type written in source or in a `@return` tag
    pub fn parse(text: &str, scope: &NamespaceScope, version: PhpVersion) -> Option<TypeHint> {
        let text = text.trim();
        let (nullable, body) = match text.strip_prefix('?') {
            Some(rest) => (true, rest.trim()),
            None => (false, text),
        };
        if body.is_empty() {
            return None;
        }

        let mut members = Vec::new();
        for part in split_top_level(body, '|') {
            match normalize_atom(part, scope)? {
                TypeHint::Union(inner) => members.extend(inner),
                other => members.push(other),
            }
        }
        if nullable {
            members.push(TypeHint::builtin("null"));
        }

        if members.len() > 1 {
            if members.iter().any(|m| m.is_builtin("mixed")) {
                return Some(TypeHint::mixed());
            }
            for member in members.iter_mut() {
                if matches!(member, TypeHint::NoValue) {
                    *member = TypeHint::builtin("null");
                }
            }
        }

        let standalone = members.len() == 1;
        if !version.supports_literal_bool_returns() {
            for member in members.iter_mut() {
                if member.is_builtin("true") || (standalone && member.is_builtin("false")) {
                    *member = TypeHint::builtin("bool");
                }
            }
        }

        let has_bool = members.iter().any(|m| m.is_builtin("bool"));
        let mut unique: Vec<TypeHint> = Vec::with_capacity(members.len());
        for member in members {
            // `bool|false` is rejected by PHP
            let redundant = has_bool && (member.is_builtin("true") || member.is_builtin("false"));
            if !redundant && !unique.contains(&member) {
                unique.push(member);
            }
        }

        Some(collapse(unique))
    }

    /// Render the type for use inside `scope`
    pub fn render(&self, scope: &NamespaceScope) -> String {
        match self {
            TypeHint::Builtin(name) => name.clone(),
            TypeHint::Class(name) => scope.shorten(name),
            TypeHint::SameAsReceiver => "static".to_string(),
            TypeHint::NoValue => "void".to_string(),
            TypeHint::Optional(inner) => format!("?{}", inner.render(scope)),
            TypeHint::Union(members) => members
                .iter()
                .map(|member| match member {
                    TypeHint::Intersection(_) => format!("({})", member.render(scope)),
                    _ => member.render(scope),
                })
                .collect::<Vec<_>>()
                .join("|"),
            TypeHint::Intersection(members) => members
                .iter()
                .map(|member| member.render(scope))
                .collect::<Vec<_>>()
                .join("&"),
        }
    }
}

fn collapse(mut members: Vec<TypeHint>) -> TypeHint {
    if members.len() == 1 {
        return match members.remove(0) {
            TypeHint::Builtin(name) if name == "null" => TypeHint::NoValue,
            other => other,
        };
    }

    let has_null = members.iter().any(|m| m.is_builtin("null"));
    let mut others: Vec<TypeHint> = members.iter().filter(|m| !m.is_builtin("null")).cloned().collect();
    match (has_null, others.len()) {
        (_, 0) => TypeHint::NoValue,
        (true, 1) => match others.remove(0) {
            TypeHint::Intersection(parts) => TypeHint::Union(vec![
                TypeHint::Intersection(parts),
                TypeHint::builtin("null"),
            ]),
            inner => TypeHint::Optional(Box::new(inner)),
        },
        _ => TypeHint::Union(members),
    }
}

/// Normalize one union member
fn normalize_atom(part: &str, scope: &NamespaceScope) -> Option<TypeHint> {
    let atom = part.trim();
    if atom.is_empty() {
        return None;
    }

    if let Some(inner) = atom.strip_prefix('(').and_then(|a| a.strip_suffix(')')) {
        return normalize_atom(inner, scope);
    }
    let intersection = split_top_level(atom, '&');
    if intersection.len() > 1 {
        let members = intersection
            .into_iter()
            .map(|member| normalize_atom(member, scope))
            .collect::<Option<Vec<_>>>()?;
        return Some(TypeHint::Intersection(members));
    }

    if atom.ends_with("[]") {
        return Some(TypeHint::builtin("array"));
    }
    if atom == "$this" {
        return Some(TypeHint::SameAsReceiver);
    }
    if atom.starts_with('\'') || atom.starts_with('"') {
        return Some(TypeHint::builtin("string"));
    }
    if atom.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        return if atom.parse::<i64>().is_ok() {
            Some(TypeHint::builtin("int"))
        } else if atom.parse::<f64>().is_ok() {
            Some(TypeHint::builtin("float"))
        } else {
            None
        };
    }

    // generics, shapes and callable signatures keep only their base name
    let base = atom
        .find(|c| matches!(c, '<' | '{' | '('))
        .map_or(atom, |index| &atom[..index])
        .trim();

    let native = match base.to_ascii_lowercase().as_str() {
        "void" => return Some(TypeHint::NoValue),
        "static" => return Some(TypeHint::SameAsReceiver),
        "closure" => return Some(TypeHint::Class("Closure".to_string())),
        "array-key" => {
            return Some(TypeHint::Union(vec![TypeHint::builtin("int"), TypeHint::builtin("string")]))
        }
        "number" => {
            return Some(TypeHint::Union(vec![TypeHint::builtin("int"), TypeHint::builtin("float")]))
        }
        "resource" | "closed-resource" | "open-resource" | "mixed" | "scalar" | "numeric" => "mixed",
        "int" | "integer" | "positive-int" | "negative-int" | "non-negative-int"
        | "non-positive-int" | "non-zero-int" => "int",
        "bool" | "boolean" => "bool",
        "float" | "double" | "real" => "float",
        "string" | "class-string" | "interface-string" | "trait-string" | "non-empty-string"
        | "numeric-string" | "callable-string" | "literal-string" | "lowercase-string"
        | "non-falsy-string" | "truthy-string" => "string",
        "array" | "list" | "non-empty-list" | "non-empty-array" | "associative-array" => "array",
        "iterable" => "iterable",
        "callable" | "callback" | "pure-callable" => "callable",
        "object" => "object",
        "null" => "null",
        "true" => "true",
        "false" => "false",
        "never" | "never-return" | "never-returns" | "no-return" => "never",
        "self" => "self",
        "parent" => "parent",
        _ if is_class_name(base) => return Some(TypeHint::Class(scope.resolve_class_name(base))),
        _ => return None,
    };
    Some(TypeHint::builtin(native))
}

fn is_class_name(text: &str) -> bool {
    let name = text.strip_prefix('\\').unwrap_or(text);
    !name.is_empty()
        && name.split('\\').all(|segment| {
            let mut chars = segment.chars();
            chars
                .next()
                .map_or(false, |c| c == '_' || c.is_alphabetic() || !c.is_ascii())
                && chars.all(|c| c == '_' || c.is_alphanumeric() || !c.is_ascii())
        })
}

/// Split on `separator` where it is not nested inside brackets or quotes
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '<' | '(' | '{' | '[' => depth += 1,
                '>' | ')' | '}' | ']' => depth -= 1,
                _ if c == separator && depth == 0 => {
                    parts.push(&text[start..index]);
                    start = index + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::syntax::{Import, ImportKind};

    const MODERN: PhpVersion = PhpVersion::new(8, 3, 0);
    const OLD: PhpVersion = PhpVersion::new(8, 1, 0);

    fn scope() -> NamespaceScope {
        NamespaceScope {
            namespace: Some("App\\Repo".to_string()),
            imports: vec![Import {
                kind: ImportKind::Class,
                name: "App\\Model\\User".to_string(),
                alias: None,
            }],
        }
    }

    fn render(text: &str, version: PhpVersion) -> Option<String> {
        let scope = scope();
        TypeHint::parse(text, &scope, version).map(|hint| hint.render(&scope))
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(PhpVersion::parse("8.1").unwrap(), PhpVersion::new(8, 1, 0));
        assert_eq!(PhpVersion::parse("7.4.33").unwrap(), PhpVersion::new(7, 4, 33));
        assert!(PhpVersion::parse("eight").is_err());
        assert!(PhpVersion::parse("8.2").unwrap().supports_literal_bool_returns());
        assert!(!OLD.supports_literal_bool_returns());
    }

    #[test]
    fn test_simple_types() {
        assert_eq!(render("int", MODERN).as_deref(), Some("int"));
        assert_eq!(render("Integer", MODERN).as_deref(), Some("int"));
        assert_eq!(render("$this", MODERN).as_deref(), Some("static"));
        assert_eq!(render("void", MODERN).as_deref(), Some("void"));
        assert_eq!(render("null", MODERN).as_deref(), Some("void"));
        assert_eq!(render("resource", MODERN).as_deref(), Some("mixed"));
        assert_eq!(render("string[]", MODERN).as_deref(), Some("array"));
        assert_eq!(render("array<int, string>", MODERN).as_deref(), Some("array"));
        assert_eq!(render("callable(int): bool", MODERN).as_deref(), Some("callable"));
        assert_eq!(render("", MODERN), None);
        assert_eq!(render("???", MODERN), None);
    }

    #[test]
    fn test_unions() {
        assert_eq!(render("int|mixed", MODERN).as_deref(), Some("mixed"));
        assert_eq!(render("int|resource", MODERN).as_deref(), Some("mixed"));
        assert_eq!(render("int[]|string[]", MODERN).as_deref(), Some("array"));
        assert_eq!(render("int|string|int", MODERN).as_deref(), Some("int|string"));
        assert_eq!(render("int|null", MODERN).as_deref(), Some("?int"));
        assert_eq!(render("?int", MODERN).as_deref(), Some("?int"));
        assert_eq!(render("?mixed", MODERN).as_deref(), Some("mixed"));
        assert_eq!(render("?User|string", MODERN).as_deref(), Some("User|string|null"));
        assert_eq!(render("array-key", MODERN).as_deref(), Some("int|string"));
    }

    #[test]
    fn test_literal_true_downgrade() {
        assert_eq!(render("true", OLD).as_deref(), Some("bool"));
        assert_eq!(render("true", MODERN).as_deref(), Some("true"));
        assert_eq!(render("false", OLD).as_deref(), Some("bool"));
        assert_eq!(render("string|false", OLD).as_deref(), Some("string|false"));
        assert_eq!(render("true|false", OLD).as_deref(), Some("bool"));
    }

    #[test]
    fn test_class_names_resolve_through_scope() {
        assert_eq!(render("\\App\\Model\\User", MODERN).as_deref(), Some("User"));
        assert_eq!(render("\\App\\Repo\\Criteria", MODERN).as_deref(), Some("Criteria"));
        assert_eq!(render("\\DateTimeImmutable", MODERN).as_deref(), Some("\\DateTimeImmutable"));
        assert_eq!(render("?\\App\\Model\\User", MODERN).as_deref(), Some("?User"));
        assert_eq!(render("User", MODERN).as_deref(), Some("User"));

        let hint = TypeHint::parse("User", &scope(), MODERN).unwrap();
        assert_eq!(hint, TypeHint::Class("App\\Model\\User".to_string()));
        // the same hint rendered from a file that does not import it
        let elsewhere = NamespaceScope {
            namespace: Some("Other".to_string()),
            imports: vec![],
        };
        assert_eq!(hint.render(&elsewhere), "\\App\\Model\\User");
    }

    #[test]
    fn test_intersections() {
        assert_eq!(
            render("Countable&Traversable|null", MODERN).as_deref(),
            Some("(Countable&Traversable)|null")
        );
        assert_eq!(render("(A&B)|C", MODERN).as_deref(), Some("(A&B)|C"));
    }

    #[test]
    fn test_no_value_detection() {
        assert!(TypeHint::NoValue.is_no_value());
        assert!(TypeHint::Builtin("never".to_string()).is_no_value());
        assert!(!TypeHint::mixed().is_no_value());
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("a|array<b|c>|d", '|'), vec!["a", "array<b|c>", "d"]);
        assert_eq!(split_top_level("'x|y'|z", '|'), vec!["'x|y'", "z"]);
    }
}
