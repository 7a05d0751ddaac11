//! Preservation rules for site directory clearing.
//!
//! A rule is compiled once per deployment run from the project's
//! `preserve_regex`. Entries whose *name* matches are left untouched when a
//! site directory is cleared.

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct PreserveRule {
    pattern: Option<Regex>,
}

impl PreserveRule {
    /// A rule that preserves nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Compile an optional pattern. Absent or blank patterns preserve nothing.
    ///
    /// Matching is case-insensitive and anchored at the start of the entry
    /// name, so `web\.config` keeps `Web.config` and `web.config.bak` but not
    /// `old-web.config`. Append `$` for an exact match.
    pub fn compile(pattern: Option<&str>) -> Result<Self> {
        let raw = match pattern.map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => return Ok(Self::none()),
        };

        let regex = RegexBuilder::new(&format!("^(?:{})", raw))
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                Error::config_invalid_pattern(raw, e)
                    .with_hint("preserve_regex must be a valid regular expression")
            })?;

        Ok(Self {
            pattern: Some(regex),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|regex| regex.is_match(name))
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
    }
}
