//! Relative-path filtering.
//!
//! A [`PathFilter`] decides which entries of a source tree take part in a
//! replication pass. It wraps a single case-insensitive regular expression
//! and a [`FilterMode`] that says whether a match selects or rejects a path.
//!
//! An absent filter (`Option::<PathFilter>::None`) lets every path through;
//! the constructors return `None` for empty input so callers never have to
//! special-case an empty pattern.
//!
//! # Example
//!
//! ```
//! use instclone::{FilterMode, PathFilter};
//! use std::path::Path;
//!
//! let filter = PathFilter::from_fragments(["saves", "logs"], FilterMode::Exclude)?
//!     .expect("non-empty fragments");
//! assert!(!filter.matches(Path::new("Saves/world1/level.dat")));
//! assert!(filter.matches(Path::new("options.txt")));
//! # Ok::<(), instclone::Error>(())
//! ```

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use std::path::{Component, Path};

/// How a pattern match is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Paths matching the pattern are left out (default).
    ///
    /// This is what copy preferences produce: the pattern lists the parts
    /// of an instance the user chose not to copy. A rejected directory
    /// takes its whole subtree with it.
    #[default]
    Exclude,
    /// Only paths matching the pattern are replicated.
    ///
    /// Directories are kept when they match or contain a matching entry.
    Include,
}

/// Predicate over paths relative to the replication source root.
///
/// Read-only after construction and safe to share between worker threads.
#[derive(Debug, Clone)]
pub struct PathFilter {
    regex: Regex,
    mode: FilterMode,
}

impl PathFilter {
    /// Build a filter from a single pattern.
    ///
    /// Returns `Ok(None)` when the pattern is empty or only whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] if the pattern does not compile.
    pub fn new(pattern: &str, mode: FilterMode) -> Result<Option<Self>> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Ok(None);
        }

        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::InvalidFilter {
                pattern: pattern.to_owned(),
                source,
            })?;

        Ok(Some(Self { regex, mode }))
    }

    /// Combine several pattern fragments into one alternation.
    ///
    /// Empty fragments are ignored; no fragments at all yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] if the combined pattern does not compile.
    pub fn from_fragments<I, S>(fragments: I, mode: FilterMode) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parts: Vec<String> = fragments
            .into_iter()
            .map(|f| f.as_ref().trim().to_owned())
            .filter(|f| !f.is_empty())
            .collect();

        if parts.is_empty() {
            return Ok(None);
        }

        Self::new(&format!("({})", parts.join("|")), mode)
    }

    /// Whether `relative_path` passes the filter and should be replicated.
    #[must_use]
    pub fn matches(&self, relative_path: &Path) -> bool {
        let hit = self.regex.is_match(&normalize(relative_path));
        match self.mode {
            FilterMode::Exclude => !hit,
            FilterMode::Include => hit,
        }
    }

    /// The filter mode.
    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// The compiled pattern, as written.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether a rejected directory removes its whole subtree.
    #[inline]
    pub(crate) fn prunes_directories(&self) -> bool {
        self.mode == FilterMode::Exclude
    }
}

/// Render a relative path with `/` separators on every platform.
pub(crate) fn normalize(relative_path: &Path) -> String {
    relative_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
