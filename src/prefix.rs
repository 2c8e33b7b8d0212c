//! Stripping the top-level folder code hosts wrap their snapshots in
//!
//! A snapshot of `owner/repo` at some commit arrives with every path under
//! a folder like `owner-repo-1a2b3c4/`, whose name changes with each commit.
//! [`SyntheticPrefix`] recognizes that folder and removes it.

use regex::Regex;

/// A pattern for the synthetic first segment of archive paths
#[derive(Debug, Clone, Default)]
pub struct SyntheticPrefix {
    pattern: Option<Regex>,
}

impl SyntheticPrefix {
    /// Matches `{owner}-{repo}-{rev}/`, where `rev` is alphanumeric.
    /// Code hosts keep the repository's own capitalization in the folder,
    /// so the names compare case-insensitively.
    ///
    /// The names are escaped, so this only fails if they're so long
    /// the pattern outgrows the regex engine's size limit.
    pub fn for_repository(owner: &str, repo: &str) -> Result<Self, regex::Error> {
        let name = regex::escape(&format!("{owner}-{repo}"));
        let pattern = Regex::new(&format!("^(?i:{name})-[a-zA-Z0-9]+/"))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Matches any first segment ending in a hex revision, like `name-0a1b2c3/`
    pub fn any() -> Self {
        let pattern =
            Regex::new("^[^/]+-[0-9a-fA-F]{7,40}/").expect("constant pattern failed to compile");
        Self {
            pattern: Some(pattern),
        }
    }

    /// Never strips anything.
    pub fn none() -> Self {
        Self { pattern: None }
    }

    /// Removes the synthetic first segment from `raw`, if it's there.
    ///
    /// The synthetic folder itself maps to the empty string,
    /// i.e., the destination root.
    pub fn strip<'a>(&self, raw: &'a str) -> &'a str {
        match self.pattern.as_ref().and_then(|p| p.find(raw)) {
            Some(found) => &raw[found.end()..],
            None => raw,
        }
    }
}
