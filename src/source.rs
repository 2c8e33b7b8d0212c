//! Where a snapshot comes from

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::prefix::SyntheticPrefix;

/// A repository on GitHub at some branch, tag, or commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub owner: String,
    pub repo: String,
    pub reference: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Expected OWNER/REPO, got {0:?}")]
pub struct ParseSourceError(String);

impl Source {
    pub fn new<O, R, F>(owner: O, repo: R, reference: F) -> Self
    where
        O: Into<String>,
        R: Into<String>,
        F: Into<String>,
    {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            reference: reference.into(),
        }
    }

    pub fn with_reference<F: Into<String>>(mut self, reference: F) -> Self {
        self.reference = reference.into();
        self
    }

    /// The URL GitHub serves the snapshot's ZIP archive from
    pub fn zipball_url(&self) -> String {
        format!(
            "https://github.com/{}/{}/zipball/{}/",
            self.owner, self.repo, self.reference
        )
    }

    /// The folder GitHub wraps the snapshot in
    pub fn synthetic_prefix(&self) -> Result<SyntheticPrefix, regex::Error> {
        SyntheticPrefix::for_repository(&self.owner, &self.repo)
    }
}

/// Parses `owner/repo`, at `master`.
impl FromStr for Source {
    type Err = ParseSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Source::new(owner, repo, "master"))
            }
            _ => Err(ParseSourceError(s.to_owned())),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.reference)
    }
}
