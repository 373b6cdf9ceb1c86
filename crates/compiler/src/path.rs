//! Field path grammar shared by the tree builder and the test evaluator.
//!
//! Paths are dot-separated field names. A segment may carry bracket
//! suffixes: numeric content is an array index (`containers[0]`), anything
//! else is a literal map key (`labels[app.oam.dev/name]`). Dots inside
//! brackets do not split. A bracket that is never closed makes the whole
//! segment a literal field name.
//!
//! Numbers above [`MAX_INDEX`] are not indices; they address a map key of
//! the same text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest bracket number read as a list index.
pub const MAX_INDEX: usize = 4096;

/// One addressable step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Segment {
    Field(String),
    Index(usize),
    Key(String),
}

impl Segment {
    pub fn is_index(&self) -> bool {
        matches!(self, Segment::Index(_))
    }

    pub fn as_field(&self) -> Option<&str> {
        match self {
            Segment::Field(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "{}", name),
            Segment::Index(i) => write!(f, "[{}]", i),
            Segment::Key(key) => write!(f, "[{}]", key),
        }
    }
}

/// Split a path on dots that are not inside brackets.
pub fn split_path(path: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in path.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&path[start..]);
    parts.retain(|p| !p.is_empty());
    parts
}

/// Parse a full path into segments.
pub fn parse_path(path: &str) -> Vec<Segment> {
    split_path(path).into_iter().flat_map(parse_part).collect()
}

/// Parse one dot-separated part, expanding bracket suffixes.
fn parse_part(part: &str) -> Vec<Segment> {
    let Some(open) = part.find('[') else {
        return vec![Segment::Field(part.to_string())];
    };
    if !part.ends_with(']') {
        return vec![Segment::Field(part.to_string())];
    }

    let mut segments = Vec::new();
    if open > 0 {
        segments.push(Segment::Field(part[..open].to_string()));
    }

    let mut rest = &part[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return vec![Segment::Field(part.to_string())];
        };
        segments.push(bracket_segment(&stripped[..close]));
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        // Text between bracket groups, e.g. `a[0]b[1]`: keep it literal.
        return vec![Segment::Field(part.to_string())];
    }
    segments
}

fn bracket_segment(content: &str) -> Segment {
    match content.parse::<usize>() {
        Ok(index) if index <= MAX_INDEX => return Segment::Index(index),
        Ok(_) => return Segment::Key(content.to_string()),
        Err(_) => {}
    }
    let unquoted = content
        .strip_prefix('"')
        .and_then(|c| c.strip_suffix('"'))
        .unwrap_or(content);
    Segment::Key(unquoted.to_string())
}

/// Render segments back into path syntax.
pub fn join_path(segments: &[Segment]) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg {
            Segment::Field(name) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
            }
            other => out.push_str(&other.to_string()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(s: &str) -> Segment {
        Segment::Field(s.to_string())
    }

    #[test]
    fn test_plain_path() {
        assert_eq!(
            parse_path("spec.template.metadata"),
            vec![field("spec"), field("template"), field("metadata")]
        );
    }

    #[test]
    fn test_index_and_key() {
        assert_eq!(
            parse_path("spec.containers[0].image"),
            vec![field("spec"), field("containers"), Segment::Index(0), field("image")]
        );
        assert_eq!(
            parse_path("metadata.labels[app.oam.dev/name]"),
            vec![
                field("metadata"),
                field("labels"),
                Segment::Key("app.oam.dev/name".to_string())
            ]
        );
    }

    #[test]
    fn test_nested_indexes() {
        assert_eq!(
            parse_path("matrix[1][2]"),
            vec![field("matrix"), Segment::Index(1), Segment::Index(2)]
        );
    }

    #[test]
    fn test_index_above_cap_is_key() {
        assert_eq!(
            parse_path("a[4096]"),
            vec![field("a"), Segment::Index(MAX_INDEX)]
        );
        assert_eq!(
            parse_path("a[4000000000]"),
            vec![field("a"), Segment::Key("4000000000".to_string())]
        );
        assert_eq!(
            parse_path("a[99999999999999999999999]"),
            vec![field("a"), Segment::Key("99999999999999999999999".to_string())]
        );
    }

    #[test]
    fn test_unterminated_bracket_is_literal() {
        assert_eq!(parse_path("data[key"), vec![field("data[key")]);
        assert_eq!(parse_path("a.b[x.y"), vec![field("a"), field("b[x.y")]);
    }

    #[test]
    fn test_join_path() {
        let segs = parse_path("spec.containers[0].env[FOO]");
        assert_eq!(join_path(&segs), "spec.containers[0].env[FOO]");
    }
}
