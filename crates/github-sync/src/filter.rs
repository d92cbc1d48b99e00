//! Regex filter for `--list` patterns.

use regex::Regex;

use crate::error::{Result, SyncError};

/// Compiled set of filter patterns.
///
/// An item passes when its field matches at least one pattern. Matching is an
/// unanchored search, so `area/` matches `area/ci`; use `^...$` to pin a name.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    patterns: Option<Vec<Regex>>,
}

impl PatternFilter {
    /// Compile the given patterns. `None` yields a filter that keeps everything.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidPattern` for the first pattern that fails
    /// to compile.
    pub fn new<I, S>(patterns: Option<I>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(patterns) = patterns else {
            return Ok(Self::default());
        };

        let compiled = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).map_err(|source| SyncError::InvalidPattern {
                    pattern: p.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns: Some(compiled),
        })
    }

    /// True when no patterns were given.
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        self.patterns.is_none()
    }

    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match &self.patterns {
            None => true,
            Some(patterns) => patterns.iter().any(|re| re.is_match(value)),
        }
    }

    /// Keep the items whose `field` matches, preserving order.
    pub fn apply<T, F>(&self, items: Vec<T>, field: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        if self.is_pass_through() {
            return items;
        }
        items
            .into_iter()
            .filter(|item| self.matches(field(item)))
            .collect()
    }
}
