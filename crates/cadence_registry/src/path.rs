//! Registry paths and patterns.
//!
//! A path is a `.`-separated list of keys (`network.layers.dense1.weights`).
//! A pattern additionally allows:
//!
//! - `*` to match any key at one level (`network.layers.*.weights`)
//! - a tag filter suffix `<tag>` or `<tag1|tag2>` that only matches nested
//!   registries carrying at least one of the tags
//!   (`network.layers.*<trainable>.weights`)

use core::fmt;

use crate::error::RegistryError;

/// Path separator between registry levels.
pub const SEPARATOR: char = '.';

/// Wildcard segment matching any key.
pub const WILDCARD: &str = "*";

/// How a pattern segment matches keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatch {
    /// Matches exactly this key.
    Exact(String),
    /// Matches any key.
    Any,
}

/// One level of a [`PathPattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Key matcher for this level.
    pub key: KeyMatch,
    /// Tag filter; empty means no filter.
    pub tags: Vec<String>,
}

impl Segment {
    /// Returns `true` if `key` satisfies this segment's key matcher.
    #[must_use]
    pub fn matches_key(&self, key: &str) -> bool {
        match &self.key {
            KeyMatch::Exact(expected) => expected == key,
            KeyMatch::Any => true,
        }
    }

    /// Returns `true` if this segment has a tag filter.
    #[must_use]
    pub fn has_tag_filter(&self) -> bool {
        !self.tags.is_empty()
    }
}

/// A parsed registry path pattern.
///
/// # Example
///
/// ```
/// use cadence_registry::PathPattern;
///
/// let pattern = PathPattern::parse("layers.*<trainable|frozen>.weights").unwrap();
/// assert_eq!(pattern.len(), 3);
/// assert!(!pattern.is_exact());
///
/// let exact = PathPattern::parse("optimiser.learning_rate").unwrap();
/// assert!(exact.is_exact());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parses a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidPath`] for empty patterns, empty
    /// segments, unterminated or empty tag filters.
    pub fn parse(pattern: &str) -> Result<Self, RegistryError> {
        let invalid = |reason| RegistryError::InvalidPath {
            path: pattern.to_string(),
            reason,
        };

        if pattern.is_empty() {
            return Err(invalid("path is empty"));
        }

        let mut segments = Vec::new();
        for raw_segment in pattern.split(SEPARATOR) {
            let (key, tags) = match raw_segment.find('<') {
                Some(open) => {
                    let Some(tag_body) = raw_segment[open + 1..].strip_suffix('>') else {
                        return Err(invalid("unterminated tag filter"));
                    };
                    let tags: Vec<String> = tag_body
                        .split('|')
                        .map(str::trim)
                        .filter(|tag| !tag.is_empty())
                        .map(str::to_string)
                        .collect();
                    if tags.is_empty() {
                        return Err(invalid("empty tag filter"));
                    }
                    (&raw_segment[..open], tags)
                }
                None => (raw_segment, Vec::new()),
            };

            if key.is_empty() {
                return Err(invalid("empty path segment"));
            }

            let key = if key == WILDCARD {
                KeyMatch::Any
            } else {
                KeyMatch::Exact(key.to_string())
            };
            segments.push(Segment { key, tags });
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Returns the pattern as originally written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the number of levels in the pattern.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Patterns always have at least one segment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns `true` if the pattern contains no wildcards and no tag filters.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment.key, KeyMatch::Exact(_)) && !segment.has_tag_filter())
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits a concrete path into its keys, rejecting patterns.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidPath`] for empty paths, empty segments or
/// segments containing wildcard/tag syntax.
pub fn split_path(path: &str) -> Result<Vec<&str>, RegistryError> {
    let invalid = |reason| RegistryError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(invalid("path is empty"));
    }

    let keys: Vec<&str> = path.split(SEPARATOR).collect();
    for key in &keys {
        if key.is_empty() {
            return Err(invalid("empty path segment"));
        }
        if *key == WILDCARD || key.contains('<') || key.contains('>') {
            return Err(invalid("concrete paths cannot contain wildcards or tag filters"));
        }
    }
    Ok(keys)
}

/// Joins a parent path and a key.
#[must_use]
pub fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}{SEPARATOR}{key}")
    }
}
