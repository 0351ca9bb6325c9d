use std::sync::OnceLock;

use regex::Regex;

/// A `@tag body` line of a documentation comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocTag {
    pub name: String,
    pub body: String,
}

/// Structured view of a `/** ... */` comment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocBlock {
    pub summary: String,
    pub tags: Vec<DocTag>,
}

impl DocBlock {
    pub fn parse(comment: &str) -> DocBlock {
        static TAG: OnceLock<Regex> = OnceLock::new();
        let tag_pattern = TAG.get_or_init(|| {
            Regex::new(r"^@([A-Za-z][\w\-\\]*)(?:\s+(.*))?$").expect("valid tag pattern")
        });

        let inner = comment
            .trim()
            .trim_start_matches("/**")
            .trim_end_matches("*/");

        let mut block = DocBlock::default();
        let mut summary_lines = Vec::new();

        for raw in inner.lines() {
            let line = raw.trim().trim_start_matches('*').trim();

            if let Some(captures) = tag_pattern.captures(line) {
                block.tags.push(DocTag {
                    name: captures[1].to_string(),
                    body: captures.get(2).map_or("", |m| m.as_str()).trim().to_string(),
                });
            } else if let Some(tag) = block.tags.last_mut() {
                // continuation of a multi-line tag
                if !line.is_empty() {
                    if !tag.body.is_empty() {
                        tag.body.push(' ');
                    }
                    tag.body.push_str(line);
                }
            } else if !line.is_empty() {
                summary_lines.push(line);
            }
        }

        block.summary = summary_lines.join(" ");
        block
    }

    pub fn tag(&self, name: &str) -> Option<&DocTag> {
        self.tags.iter().find(|tag| tag.name.eq_ignore_ascii_case(name))
    }

    /// Type text of the first `@return` tag
    pub fn return_type(&self) -> Option<&str> {
        self.tag("return").and_then(|tag| leading_type(&tag.body))
    }
}

/// First whitespace-delimited token, keeping bracketed parts together
pub fn leading_type(body: &str) -> Option<&str> {
    let body = body.trim_start();
    let mut depth = 0i32;
    let mut end = body.len();

    for (index, c) in body.char_indices() {
        match c {
            '<' | '(' | '{' | '[' => depth += 1,
            '>' | ')' | '}' | ']' => depth -= 1,
            c if c.is_whitespace() && depth <= 0 => {
                // `callable(int): bool` and `int | string` stay whole
                let before = body[..index].trim_end();
                if before.ends_with(':') || before.ends_with('|') {
                    continue;
                }
                let after = body[index..].trim_start();
                if after.starts_with('|') {
                    continue;
                }
                end = index;
                break;
            }
            _ => {}
        }
    }

    let token = body[..end].trim();
    (!token.is_empty()).then_some(token)
}
