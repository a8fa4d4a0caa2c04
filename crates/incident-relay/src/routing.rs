//! Service to repository routing.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ReportError;

/// A validated `owner/repo` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl FromStr for RepoSlug {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (owner, repo) = s
            .split_once('/')
            .ok_or_else(|| format!("invalid repository '{s}' (expected owner/repo)"))?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(format!("invalid repository '{s}' (expected owner/repo)"));
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl From<RepoSlug> for String {
    fn from(slug: RepoSlug) -> Self {
        slug.to_string()
    }
}

/// Static service → repository table with an optional fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoMapping {
    entries: HashMap<String, RepoSlug>,
    fallback: Option<RepoSlug>,
}

impl RepoMapping {
    #[must_use]
    pub fn new(entries: HashMap<String, RepoSlug>, fallback: Option<RepoSlug>) -> Self {
        Self { entries, fallback }
    }

    /// Parse the `{"svc":"owner/repo"}` JSON form plus an optional fallback.
    pub fn from_json(json: &str, fallback: Option<&str>) -> Result<Self, String> {
        let raw: HashMap<String, String> =
            serde_json::from_str(json).map_err(|e| format!("invalid repository map: {e}"))?;
        let entries = raw
            .into_iter()
            .map(|(service, slug)| {
                slug.parse::<RepoSlug>()
                    .map(|slug| (service.trim().to_string(), slug))
                    .map_err(|e| format!("service '{service}': {e}"))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        let fallback = fallback
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<RepoSlug>)
            .transpose()
            .map_err(|e| format!("fallback: {e}"))?;
        Ok(Self { entries, fallback })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn fallback(&self) -> Option<&RepoSlug> {
        self.fallback.as_ref()
    }

    /// Pick the single repository that receives the report.
    ///
    /// The first service in payload order with a mapping wins, so several
    /// mapped services never fan out to several repositories. Without any
    /// match the fallback is used.
    pub fn resolve(&self, services: &[String]) -> Result<RepoSlug, ReportError> {
        services
            .iter()
            .find_map(|service| self.entries.get(service))
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| ReportError::UnresolvedRepository {
                services: services.to_vec(),
            })
    }
}
