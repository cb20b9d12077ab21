//! Route pattern parsing and compilation.
//!
//! A pattern is `/seg(/seg)*` where each segment is a literal, `{name}`,
//! `{name...}` (last segment only) or the exact-match marker `{$}` (last
//! segment only). Each pattern compiles once into an anchored [`Regex`].
//!
//! A pattern ending in `/` matches its whole subtree and scores like a tail
//! wildcard, so a bare `/` is the lowest-priority catch-all. Use `/{$}` to
//! match the root alone.

use std::collections::HashSet;

use regex::Regex;

use crate::error::Error;

const EXACT_BONUS: i32 = 1000;
const LITERAL_WEIGHT: i32 = 100;
const PARAM_PENALTY: i32 = 10;
const WILDCARD_PENALTY: i32 = 50;

/// One classified path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
    /// The trailing `{$}` marker.
    Exact,
    /// The empty segment left by a trailing `/`.
    Slash,
}

/// A parsed and compiled route pattern.
#[derive(Debug, Clone)]
pub(crate) struct Pattern {
    raw: String,
    regex: Regex,
    priority: i32,
}

impl Pattern {
    pub(crate) fn parse(raw: &str) -> Result<Self, Error> {
        let segments = segments(raw)?;

        let mut source = String::from("^");
        let mut priority = 0;
        let mut subtree = false;

        for seg in &segments {
            match seg {
                Segment::Literal(lit) => {
                    source.push('/');
                    source.push_str(&regex::escape(lit));
                    priority += LITERAL_WEIGHT;
                }
                Segment::Param(name) => {
                    source.push_str(&format!("/(?P<{name}>[^/]+)"));
                    priority -= PARAM_PENALTY;
                }
                Segment::Wildcard(name) => {
                    source.push_str(&format!("/(?P<{name}>.*)"));
                    priority -= WILDCARD_PENALTY;
                }
                Segment::Exact => {
                    source.push('/');
                    priority += EXACT_BONUS;
                }
                // A subtree match is an unnamed tail wildcard.
                Segment::Slash => {
                    source.push('/');
                    priority -= WILDCARD_PENALTY;
                    subtree = true;
                }
            }
        }
        if subtree {
            source.push_str(".*");
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|_| malformed(raw, "does not compile"))?;
        Ok(Self { raw: raw.to_owned(), regex, priority })
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.raw
    }

    pub(crate) fn priority(&self) -> i32 {
        self.priority
    }

    /// Matches the full `path`, returning the named captures.
    pub(crate) fn captures(&self, path: &str) -> Option<Vec<(String, String)>> {
        let caps = self.regex.captures(path)?;
        let params = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                let value = caps.name(name)?.as_str();
                let decoded = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_owned());
                Some((name.to_owned(), decoded))
            })
            .collect();
        Some(params)
    }
}

fn malformed(raw: &str, reason: &'static str) -> Error {
    Error::MalformedPattern { pattern: raw.to_owned(), reason }
}

/// Validates the whole pattern and splits it into classified segments.
pub(crate) fn segments(raw: &str) -> Result<Vec<Segment>, Error> {
    if !raw.starts_with('/') {
        return Err(malformed(raw, "must start with `/`"));
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(malformed(raw, "contains whitespace"));
    }
    if raw.contains("//") {
        return Err(malformed(raw, "contains `//`"));
    }
    check_braces(raw)?;

    let parts: Vec<&str> = raw[1..].split('/').collect();
    let last = parts.len() - 1;
    let mut names = HashSet::new();
    let mut out = Vec::with_capacity(parts.len());

    for (i, part) in parts.iter().enumerate() {
        let seg = classify(raw, part)?;
        match &seg {
            Segment::Exact | Segment::Wildcard(_) | Segment::Slash if i != last => {
                return Err(malformed(raw, "`{$}` and `{name...}` must be the last segment"));
            }
            Segment::Param(name) | Segment::Wildcard(name) if !names.insert(name.clone()) => {
                return Err(malformed(raw, "duplicate parameter name"));
            }
            _ => {}
        }
        out.push(seg);
    }
    Ok(out)
}

fn check_braces(raw: &str) -> Result<(), Error> {
    let mut open = false;
    for c in raw.chars() {
        match c {
            '{' if open => return Err(malformed(raw, "unbalanced braces")),
            '{' => open = true,
            '}' if !open => return Err(malformed(raw, "unbalanced braces")),
            '}' => open = false,
            _ => {}
        }
    }
    if open {
        return Err(malformed(raw, "unbalanced braces"));
    }
    Ok(())
}

fn classify(raw: &str, part: &str) -> Result<Segment, Error> {
    if part.is_empty() {
        return Ok(Segment::Slash);
    }
    let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) else {
        if part.contains(['{', '}']) {
            return Err(malformed(raw, "braces inside a literal segment"));
        }
        return Ok(Segment::Literal(part.to_owned()));
    };
    if inner == "$" {
        return Ok(Segment::Exact);
    }
    let (name, wildcard) = match inner.strip_suffix("...") {
        Some(name) => (name, true),
        None => (inner, false),
    };
    if !valid_name(name) {
        return Err(malformed(raw, "invalid parameter name"));
    }
    Ok(if wildcard {
        Segment::Wildcard(name.to_owned())
    } else {
        Segment::Param(name.to_owned())
    })
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(p: &Pattern, path: &str) -> Option<Vec<(String, String)>> {
        p.captures(path)
    }

    #[test]
    fn classifies_segments() {
        assert_eq!(
            segments("/users/{id}/files/{rest...}").unwrap(),
            vec![
                Segment::Literal("users".into()),
                Segment::Param("id".into()),
                Segment::Literal("files".into()),
                Segment::Wildcard("rest".into()),
            ]
        );
        assert_eq!(segments("/a/{$}").unwrap(), vec![Segment::Literal("a".into()), Segment::Exact]);
        assert_eq!(segments("/").unwrap(), vec![Segment::Slash]);
    }

    #[test]
    fn rejects_malformed_patterns() {
        for bad in [
            "users",
            "/users/{id",
            "/users/id}",
            "/users/{{id}}",
            "/users /x",
            "/users//x",
            "/users/{}",
            "/users/{1d}",
            "/files/{p...}/x",
            "/a/{$}/b",
            "/a/x{id}",
            "/a/{id}/{id}",
        ] {
            assert!(
                matches!(Pattern::parse(bad), Err(Error::MalformedPattern { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn computes_priority() {
        assert_eq!(Pattern::parse("/users/me").unwrap().priority(), 200);
        assert_eq!(Pattern::parse("/users/{id}").unwrap().priority(), 90);
        assert_eq!(Pattern::parse("/files/{p...}").unwrap().priority(), 50);
        assert_eq!(Pattern::parse("/users/{$}").unwrap().priority(), 1100);
        assert_eq!(Pattern::parse("/").unwrap().priority(), -50);
        assert_eq!(Pattern::parse("/static/").unwrap().priority(), 50);
    }

    #[test]
    fn param_matches_one_segment() {
        let p = Pattern::parse("/users/{id}").unwrap();
        assert_eq!(params(&p, "/users/123").unwrap(), vec![("id".to_owned(), "123".to_owned())]);
        assert!(params(&p, "/users/123/posts").is_none());
        assert!(params(&p, "/users/").is_none());
    }

    #[test]
    fn wildcard_captures_embedded_slashes() {
        let p = Pattern::parse("/static/{path...}").unwrap();
        assert_eq!(
            params(&p, "/static/css/site.css").unwrap(),
            vec![("path".to_owned(), "css/site.css".to_owned())]
        );
    }

    #[test]
    fn trailing_slash_matches_subtree_unless_exact() {
        let subtree = Pattern::parse("/static/").unwrap();
        assert!(params(&subtree, "/static/a/b").is_some());
        assert!(params(&subtree, "/static/").is_some());

        let exact = Pattern::parse("/static/{$}").unwrap();
        assert!(params(&exact, "/static/").is_some());
        assert!(params(&exact, "/static/a").is_none());
    }

    #[test]
    fn literals_are_escaped_and_params_decoded() {
        let p = Pattern::parse("/v1.0/{name}").unwrap();
        assert!(params(&p, "/v1x0/a").is_none());
        assert_eq!(
            params(&p, "/v1.0/hello%20world").unwrap(),
            vec![("name".to_owned(), "hello world".to_owned())]
        );
    }
}
