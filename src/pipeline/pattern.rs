//! Path patterns used by routes and mounted middleware.

use std::collections::HashMap;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// A compiled path pattern such as `/wallet/:id` or `/static/*`.
///
/// Empty segments are dropped on both sides, so `/foo/` and `/foo` compare
/// equal. An empty pattern matches every path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    any: bool,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(path: &str) -> Result<Self, Error> {
        if path.is_empty() {
            return Ok(Self { any: true, segments: Vec::new() });
        }

        if !path.starts_with('/') {
            return Err(Error::InvalidArgument(format!(
                "path {path:?} must be empty or start with '/'"
            )));
        }

        let raw: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());

        for (i, s) in raw.iter().enumerate() {
            let segment = if *s == "*" {
                if i + 1 != raw.len() {
                    return Err(Error::InvalidArgument(format!(
                        "wildcard must be the last segment in {path:?}"
                    )));
                }
                Segment::Wildcard
            } else if let Some(name) = s.strip_prefix(':') {
                if name.is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "unnamed parameter in {path:?}"
                    )));
                }
                Segment::Param(name.to_owned())
            } else {
                Segment::Literal((*s).to_owned())
            };
            segments.push(segment);
        }

        Ok(Self { any: false, segments })
    }

    pub fn is_any(&self) -> bool {
        self.any
    }

    /// Matches the whole path. Returns the bound parameters on success.
    pub fn matches(&self, path: &[String]) -> Option<HashMap<String, String>> {
        self.bind(path, false)
    }

    /// Matches when the pattern covers a leading run of whole segments.
    pub fn matches_prefix(&self, path: &[String]) -> Option<HashMap<String, String>> {
        self.bind(path, true)
    }

    fn bind(&self, path: &[String], prefix: bool) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        if self.any {
            return Some(params);
        }

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard => {
                    params.insert("*".to_owned(), path.get(i..).unwrap_or_default().join("/"));
                    return Some(params);
                }
                Segment::Literal(lit) => {
                    if path.get(i)? != lit {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), path.get(i)?.clone());
                }
            }
        }

        (prefix || path.len() == self.segments.len()).then_some(params)
    }
}
