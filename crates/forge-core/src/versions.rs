//! Upstream version discovery.
//!
//! A [`VersionSource`] produces [`ResolvedVersion`]s: the raw upstream
//! string (a tag such as `v1.2.3` or `go1.22.0`) plus, when one can be
//! derived, a normalised semantic version used as the package version.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};
use crate::github::GithubClient;

static LOOSE_SEMVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+)(?:-([0-9A-Za-z.-]+))?(?:\+([0-9A-Za-z.-]+))?)?")
        .expect("valid semver regex")
});

/// A version as found upstream plus its semver form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedVersion {
    /// Untouched upstream string.
    pub raw: String,
    /// Normalised semantic version, when the raw string can be coerced.
    pub semver: Option<String>,
}

impl ResolvedVersion {
    /// Wraps a raw string, coercing the semver form when possible.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let semver = coerce_semver(&raw).ok();
        Self { raw, semver }
    }

    /// Wraps both forms as given.
    pub fn exact(raw: impl Into<String>, semver: Option<String>) -> Self {
        Self {
            raw: raw.into(),
            semver,
        }
    }

    /// The string used as the package version: semver when known, raw otherwise.
    pub fn package_version(&self) -> &str {
        self.semver.as_deref().unwrap_or(&self.raw)
    }

    /// Parsed semver, used for ordering.
    pub fn parsed(&self) -> Option<semver::Version> {
        self.semver.as_deref().and_then(|s| semver::Version::parse(s).ok())
    }

    /// True when `requested` names this version by raw or semver form.
    pub fn matches(&self, requested: &str) -> bool {
        self.raw == requested || self.semver.as_deref() == Some(requested)
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.package_version())
    }
}

/// Coerces a loose version string into semver.
///
/// Strict semver (optionally prefixed by `v` or `=`) is returned as is.
/// Otherwise the first `major[.minor[.patch]]` run is extracted and missing
/// parts default to zero, so `go1.21.3` becomes `1.21.3` and `v2` becomes
/// `2.0.0`.
pub fn coerce_semver(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V', '=']);
    if let Ok(v) = semver::Version::parse(trimmed) {
        return Ok(v.to_string());
    }

    let caps = LOOSE_SEMVER
        .captures(raw)
        .ok_or_else(|| ForgeError::VersionCoercion(raw.to_string()))?;
    let part = |i: usize| {
        caps.get(i)
            .map_or(Ok(0), |m| m.as_str().parse::<u64>())
            .map_err(|_| ForgeError::VersionCoercion(raw.to_string()))
    };
    let core = format!("{}.{}.{}", part(1)?, part(2)?, part(3)?);

    let mut full = core.clone();
    if let Some(pre) = caps.get(4) {
        full.push('-');
        full.push_str(pre.as_str());
    }
    if let Some(build) = caps.get(5) {
        full.push('+');
        full.push_str(build.as_str());
    }

    match semver::Version::parse(&full) {
        Ok(v) => Ok(v.to_string()),
        Err(_) => Ok(core),
    }
}

/// Sorts newest first by semver. Versions without semver keep their order at the end.
pub fn sort_newest_first(versions: &mut [ResolvedVersion]) {
    versions.sort_by(|a, b| match (a.parsed(), b.parsed()) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Something that knows the upstream versions of a package.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// The version to build when none is requested.
    async fn latest(&self) -> Result<ResolvedVersion>;

    /// Every known version, newest first. Defaults to just the latest.
    async fn candidates(&self) -> Result<Vec<ResolvedVersion>> {
        Ok(vec![self.latest().await?])
    }
}

/// A pinned version.
#[derive(Debug, Clone)]
pub struct StaticVersion(pub ResolvedVersion);

#[async_trait]
impl VersionSource for StaticVersion {
    async fn latest(&self) -> Result<ResolvedVersion> {
        Ok(self.0.clone())
    }
}

type CandidatesFn = dyn Fn() -> BoxFuture<'static, Result<Vec<ResolvedVersion>>> + Send + Sync;

/// A version source backed by an async closure returning candidates, newest first.
#[derive(Clone)]
pub struct VersionFn(Arc<CandidatesFn>);

impl VersionFn {
    /// Wraps `f`.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<ResolvedVersion>>> + Send + 'static,
    {
        Self(Arc::new(move || f().boxed()))
    }
}

impl fmt::Debug for VersionFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VersionFn")
    }
}

#[async_trait]
impl VersionSource for VersionFn {
    async fn latest(&self) -> Result<ResolvedVersion> {
        self.candidates()
            .await?
            .into_iter()
            .next()
            .ok_or(ForgeError::NoVersions)
    }

    async fn candidates(&self) -> Result<Vec<ResolvedVersion>> {
        (self.0)().await
    }
}

/// Versions taken from a repository's git tags.
#[derive(Debug, Clone)]
pub struct LatestGithubTag {
    github: GithubClient,
    owner: String,
    repo: String,
    filter: Option<Regex>,
}

impl LatestGithubTag {
    /// Tags of `owner/repo`.
    pub fn new(github: GithubClient, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            github,
            owner: owner.into(),
            repo: repo.into(),
            filter: None,
        }
    }

    /// Only consider tags matching `filter`.
    pub fn with_filter(mut self, filter: Regex) -> Self {
        self.filter = Some(filter);
        self
    }

    async fn filtered_tags(&self) -> Result<Vec<String>> {
        let tags = self.github.tags(&self.owner, &self.repo).await?;
        Ok(tags
            .into_iter()
            .filter(|t| self.filter.as_ref().is_none_or(|f| f.is_match(t)))
            .collect())
    }
}

#[async_trait]
impl VersionSource for LatestGithubTag {
    async fn latest(&self) -> Result<ResolvedVersion> {
        let tag = self.filtered_tags().await?.into_iter().next().ok_or_else(|| {
            ForgeError::Github(format!("no tags found for {}/{}", self.owner, self.repo))
        })?;
        tracing::debug!(owner = %self.owner, repo = %self.repo, %tag, "latest tag");
        Ok(ResolvedVersion::new(tag))
    }

    async fn candidates(&self) -> Result<Vec<ResolvedVersion>> {
        let mut versions: Vec<ResolvedVersion> = self
            .filtered_tags()
            .await?
            .into_iter()
            .map(ResolvedVersion::new)
            .filter(|v| v.semver.is_some())
            .collect();
        sort_newest_first(&mut versions);
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_semver() {
        assert_eq!(coerce_semver("1.2.3").unwrap(), "1.2.3");
        assert_eq!(coerce_semver("v2.0.0-rc.1").unwrap(), "2.0.0-rc.1");
        assert_eq!(coerce_semver("go1.21.3").unwrap(), "1.21.3");
        assert_eq!(coerce_semver("go version go1.22.0 linux/amd64").unwrap(), "1.22.0");
        assert_eq!(coerce_semver("v2").unwrap(), "2.0.0");
        assert_eq!(coerce_semver("2.47").unwrap(), "2.47.0");
        assert!(matches!(coerce_semver("latest"), Err(ForgeError::VersionCoercion(_))));
    }

    #[test]
    fn test_coerce_semver_rejects_overflowing_parts() {
        let err = coerce_semver("v99999999999999999999.0").unwrap_err();
        assert!(matches!(err, ForgeError::VersionCoercion(ref raw) if raw == "v99999999999999999999.0"));
        assert!(coerce_semver("1.2.184467440737095516160").is_err());
    }

    #[test]
    fn test_package_version_prefers_semver() {
        let v = ResolvedVersion::new("v1.2.3");
        assert_eq!(v.package_version(), "1.2.3");
        assert!(v.matches("v1.2.3"));
        assert!(v.matches("1.2.3"));

        let raw_only = ResolvedVersion::exact("nightly", None);
        assert_eq!(raw_only.package_version(), "nightly");
    }

    #[test]
    fn test_sort_newest_first() {
        let mut versions = vec![
            ResolvedVersion::new("v1.9.0"),
            ResolvedVersion::exact("nightly", None),
            ResolvedVersion::new("v1.10.0"),
            ResolvedVersion::new("v1.2.0"),
        ];
        sort_newest_first(&mut versions);
        let raws: Vec<_> = versions.iter().map(|v| v.raw.as_str()).collect();
        assert_eq!(raws, vec!["v1.10.0", "v1.9.0", "v1.2.0", "nightly"]);
    }

    #[tokio::test]
    async fn test_version_fn_latest_is_first() {
        let source = VersionFn::new(|| async {
            Ok(vec![ResolvedVersion::new("go1.22.0"), ResolvedVersion::new("go1.21.9")])
        });
        assert_eq!(source.latest().await.unwrap().raw, "go1.22.0");
        assert_eq!(source.candidates().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_version_fn_latest_without_candidates() {
        let source = VersionFn::new(|| async { Ok(Vec::new()) });
        assert!(matches!(source.latest().await, Err(ForgeError::NoVersions)));
        assert!(source.candidates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_github_tag_with_filter() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/werf/nelm/tags")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"name":"latest"},{"name":"v1.3.0"},{"name":"v1.12.0"},{"name":"v1.4.1"}]"#)
            .create_async()
            .await;
        let gh = GithubClient::new(reqwest::Client::new(), None).with_api_base(server.url());
        let source = LatestGithubTag::new(gh, "werf", "nelm").with_filter(Regex::new(r"^v\d").unwrap());

        assert_eq!(source.latest().await.unwrap().raw, "v1.3.0");
        let candidates = source.candidates().await.unwrap();
        let raws: Vec<_> = candidates.iter().map(|v| v.raw.as_str()).collect();
        assert_eq!(raws, vec!["v1.12.0", "v1.4.1", "v1.3.0"]);
    }
}
