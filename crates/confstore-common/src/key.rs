//! Hierarchical keys and glob-style key patterns
//!
//! A [`Key`] is an ordered sequence of segments joined by [`SEPARATOR`]
//! (`a:b:c`). A [`Pattern`] has the same shape, but any segment may be the
//! [`WILDCARD`], which stands for exactly one non-empty key segment.
//! Matching is a pairwise comparison: keys and patterns of different lengths
//! never match, and a trailing wildcard is not a prefix match.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app_errors::AppErrors;

/// Separator between key segments
pub const SEPARATOR: char = ':';

/// Pattern segment matching any single key segment
pub const WILDCARD: &str = "*";

/// Hierarchical document identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Key {
    segments: Vec<String>,
}

impl Key {
    /// The empty key, root for composition
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a key from its string form; `""` is the empty key
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::empty();
        }
        Self {
            segments: raw.split(SEPARATOR).map(str::to_string).collect(),
        }
    }

    /// Build a key from raw segments. Segments holding the separator are split.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        segments
            .into_iter()
            .fold(Self::empty(), |key, segment| key.child(segment.as_ref()))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append `child` under this key
    pub fn compose(&self, child: &Key) -> Key {
        let mut segments = Vec::with_capacity(self.len() + child.len());
        segments.extend(self.segments.iter().cloned());
        segments.extend(child.segments.iter().cloned());
        Key { segments }
    }

    /// Append a raw segment under this key
    pub fn child(&self, segment: &str) -> Key {
        self.compose(&Key::parse(segment))
    }

    /// Remove the first `n` segments
    pub fn drop_prefix(&self, n: usize) -> Key {
        let n = n.min(self.len());
        Key {
            segments: self.segments[n..].to_vec(),
        }
    }

    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Remove `prefix` when this key lives under it
    pub fn strip_prefix(&self, prefix: &Key) -> Option<Key> {
        if self.starts_with(prefix) {
            Some(self.drop_prefix(prefix.len()))
        } else {
            None
        }
    }

    pub fn matches(&self, pattern: &Pattern) -> bool {
        pattern.matches(self)
    }

    /// True when at least one pattern matches. An empty list matches nothing,
    /// and so does the empty pattern.
    pub fn matches_any(&self, patterns: &[Pattern]) -> bool {
        !Pattern::none_matchable(patterns) && patterns.iter().any(|p| p.matches(self))
    }

    /// Check the key can identify a document: non-empty, no empty segment.
    pub fn validate(&self) -> Result<(), AppErrors> {
        let mut errors = AppErrors::new();
        if self.is_empty() {
            errors += AppErrors::error("error.key.empty");
        }
        for (index, segment) in self.segments.iter().enumerate() {
            if segment.is_empty() {
                errors += AppErrors::field_error_with_args(
                    "id",
                    "error.key.segment.empty",
                    vec![index.to_string()],
                );
            }
        }
        errors.into_result()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, "{}", SEPARATOR)?;
            }
            f.write_str(segment)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Key {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Key::parse(s))
    }
}

impl From<&str> for Key {
    fn from(raw: &str) -> Self {
        Key::parse(raw)
    }
}

impl From<String> for Key {
    fn from(raw: String) -> Self {
        Key::parse(&raw)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

/// One segment of a [`Pattern`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternSegment {
    Literal(String),
    Wildcard,
}

impl PatternSegment {
    fn matches(&self, segment: &str) -> bool {
        match self {
            PatternSegment::Literal(literal) => literal == segment,
            PatternSegment::Wildcard => !segment.is_empty(),
        }
    }
}

/// Glob-style key pattern (`a:*:x`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Pattern {
    segments: Vec<PatternSegment>,
}

impl Pattern {
    /// Parse a pattern; `""` is the empty pattern, which matches nothing
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::default();
        }
        let segments = raw
            .split(SEPARATOR)
            .map(|segment| {
                if segment == WILDCARD {
                    PatternSegment::Wildcard
                } else {
                    PatternSegment::Literal(segment.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// Parse a list of raw patterns
    pub fn parse_all<I, S>(raw: I) -> Vec<Pattern>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().map(|p| Pattern::parse(p.as_ref())).collect()
    }

    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn matches(&self, key: &Key) -> bool {
        !self.is_empty()
            && self.len() == key.len()
            && self
                .segments
                .iter()
                .zip(key.segments())
                .all(|(pattern, segment)| pattern.matches(segment))
    }

    /// Leading literal segments, usable by back-ends to narrow a key scan
    pub fn literal_prefix(&self) -> Key {
        let segments = self
            .segments
            .iter()
            .map_while(|segment| match segment {
                PatternSegment::Literal(literal) => Some(literal.clone()),
                PatternSegment::Wildcard => None,
            })
            .collect();
        Key { segments }
    }

    /// True if the list holds no pattern able to match anything
    pub fn none_matchable(patterns: &[Pattern]) -> bool {
        patterns.is_empty() || patterns.iter().any(Pattern::is_empty)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            if index > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            match segment {
                PatternSegment::Literal(literal) => f.write_str(literal)?,
                PatternSegment::Wildcard => f.write_str(WILDCARD)?,
            }
        }
        Ok(())
    }
}

impl From<&str> for Pattern {
    fn from(raw: &str) -> Self {
        Pattern::parse(raw)
    }
}

impl From<String> for Pattern {
    fn from(raw: String) -> Self {
        Pattern::parse(&raw)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.to_string()
    }
}
