//! GitHub release sources.
//!
//! Two strategies:
//!
//! - [`GithubReleaseAssets`] lists a release and classifies each asset into a
//!   platform by substring matching its file name against OS and arch tokens.
//! - [`GithubReleaseFiles`] builds download URLs from per-platform file name
//!   templates and reads digests from a named checksum file.
//!
//! Digests are deferred. Assets sharing a checksum list fetch it once.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use forge_schema::{Digest, DigestAlgorithm, Platform, PlatformArch, PlatformOs, digest_from_checksum_text};

use super::{DslCtx, LazyDigest, ResolvedSources, Source, SourceResolver, UrlDigest};
use crate::checksum::{digest_from_sidecar_url, download_and_digest, fetch_text};
use crate::error::Result;
use crate::github::{GithubAsset, GithubClient};
use crate::versions::ResolvedVersion;

static DEFAULT_CHECKSUM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*(checksum|sha256).*$").expect("valid checksum pattern"));

const SIDECAR_EXT: &str = ".sha256";

/// Classifies a release asset name into a platform.
///
/// OS and arch tokens are scanned in declaration order and the first whose
/// (remapped) spelling occurs in `name` wins. Names without a known OS or
/// arch yield `None`. Vendor arm spellings are normalised afterwards, so
/// `linux` + `arm64` becomes `linux-aarch64`.
pub fn classify_asset(
    name: &str,
    os_map: &HashMap<PlatformOs, String>,
    arch_map: &HashMap<PlatformArch, String>,
) -> Option<Platform> {
    let os = PlatformOs::ALL
        .into_iter()
        .find(|os| name.contains(os_map.get(os).map_or(os.as_str(), String::as_str)))?;
    if os == PlatformOs::Unknown {
        return None;
    }
    let arch = PlatformArch::ALL
        .into_iter()
        .find(|arch| name.contains(arch_map.get(arch).map_or(arch.as_str(), String::as_str)))?;
    if arch == PlatformArch::Unknown {
        return None;
    }
    Some(Platform::new(os, arch).normalized())
}

/// Sources taken from the assets of the release tagged with the raw version.
#[derive(Debug, Clone)]
pub struct GithubReleaseAssets {
    github: GithubClient,
    owner: String,
    repo: String,
    os_map: HashMap<PlatformOs, String>,
    arch_map: HashMap<PlatformArch, String>,
    checksum_pattern: Regex,
    asset_filter: Option<Regex>,
}

impl GithubReleaseAssets {
    /// Assets of `owner/repo`.
    pub fn new(github: GithubClient, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            github,
            owner: owner.into(),
            repo: repo.into(),
            os_map: HashMap::new(),
            arch_map: HashMap::new(),
            checksum_pattern: DEFAULT_CHECKSUM_PATTERN.clone(),
            asset_filter: None,
        }
    }

    /// Spell `os` as `token` when matching asset names.
    pub fn map_os(mut self, os: PlatformOs, token: impl Into<String>) -> Self {
        self.os_map.insert(os, token.into());
        self
    }

    /// Spell `arch` as `token` when matching asset names.
    pub fn map_arch(mut self, arch: PlatformArch, token: impl Into<String>) -> Self {
        self.arch_map.insert(arch, token.into());
        self
    }

    /// Pattern identifying the checksum list among the assets.
    pub fn checksum_pattern(mut self, pattern: Regex) -> Self {
        self.checksum_pattern = pattern;
        self
    }

    /// Only consider assets whose name matches `filter`.
    pub fn asset_filter(mut self, filter: Regex) -> Self {
        self.asset_filter = Some(filter);
        self
    }

    fn checksum_list_url(&self, assets: &[GithubAsset]) -> Option<String> {
        assets
            .iter()
            .find(|a| self.checksum_pattern.is_match(&a.name))
            .map(|a| a.browser_download_url.clone())
            .filter(|url| !url.ends_with(SIDECAR_EXT))
    }
}

#[async_trait]
impl SourceResolver for GithubReleaseAssets {
    async fn resolve(&self, version: &ResolvedVersion) -> Result<ResolvedSources> {
        let tag = &version.raw;
        info!(owner = %self.owner, repo = %self.repo, %tag, "finding github release assets");
        let release = self.github.release_by_tag(&self.owner, &self.repo, tag).await?;

        let list = self.checksum_list_url(&release.assets).map(SharedList::new);

        let mut map = BTreeMap::new();
        for asset in &release.assets {
            if asset.browser_download_url.ends_with(SIDECAR_EXT) {
                continue;
            }
            if self.asset_filter.as_ref().is_some_and(|f| !f.is_match(&asset.name)) {
                continue;
            }
            let Some(platform) = classify_asset(&asset.name, &self.os_map, &self.arch_map) else {
                debug!(asset = %asset.name, "skipping unclassified asset");
                continue;
            };

            let sidecar_name = format!("{}{SIDECAR_EXT}", asset.name);
            let plan = DigestPlan {
                github: self.github.clone(),
                file_name: asset.name.clone(),
                url: asset.browser_download_url.clone(),
                list: list.clone(),
                sidecar: release
                    .assets
                    .iter()
                    .find(|a| a.name.ends_with(&sidecar_name))
                    .map(|a| a.browser_download_url.clone()),
            };
            let digest = LazyDigest::new(move || plan.clone().resolve());
            // A later asset for the same platform replaces an earlier one.
            map.insert(
                platform,
                vec![Source::url(asset.browser_download_url.clone(), UrlDigest::Deferred(digest))],
            );
        }
        Ok(ResolvedSources::PerPlatform(map))
    }
}

/// A checksum list downloaded at most once per resolution.
#[derive(Debug, Clone)]
struct SharedList {
    url: String,
    text: Arc<OnceCell<String>>,
}

impl SharedList {
    fn new(url: String) -> Self {
        Self {
            url,
            text: Arc::new(OnceCell::new()),
        }
    }

    async fn text(&self, github: &GithubClient) -> Result<&str> {
        let text = self
            .text
            .get_or_try_init(|| async {
                info!(url = %self.url, "downloading checksum file");
                fetch_text(github.get(&self.url)).await
            })
            .await?;
        Ok(text.as_str())
    }
}

/// Where the digest of one asset comes from, in priority order.
#[derive(Debug, Clone)]
struct DigestPlan {
    github: GithubClient,
    file_name: String,
    url: String,
    list: Option<SharedList>,
    sidecar: Option<String>,
}

impl DigestPlan {
    async fn resolve(self) -> Result<Digest> {
        let alg = DigestAlgorithm::Sha256;
        if let Some(list) = &self.list {
            let text = list.text(&self.github).await?;
            return Ok(digest_from_checksum_text(alg, &self.file_name, text)?);
        }
        if let Some(sidecar) = &self.sidecar {
            return digest_from_sidecar_url(self.github.get(sidecar), alg, &self.file_name).await;
        }
        info!(asset = %self.file_name, "downloading asset to compute missing digest");
        download_and_digest(self.github.get(&self.url), alg).await
    }
}

type FileNameFn = dyn Fn(&DslCtx) -> String + Send + Sync;

/// Sources at well-known release URLs, one or more files per platform.
///
/// URLs follow `{base}/{owner}/{repo}/releases/download/{prefix}{version}/{file}`
/// and every digest comes from the same checksum file in that release.
#[derive(Clone)]
pub struct GithubReleaseFiles {
    github: GithubClient,
    owner: String,
    repo: String,
    platforms: Vec<Platform>,
    checksum_file: String,
    files: Vec<Arc<FileNameFn>>,
    v_prefix: String,
    download_base: String,
}

impl GithubReleaseFiles {
    /// Release files of `owner/repo` for `platforms`, checked against `checksum_file`.
    pub fn new(
        github: GithubClient,
        owner: impl Into<String>,
        repo: impl Into<String>,
        platforms: &[Platform],
        checksum_file: impl Into<String>,
    ) -> Self {
        Self {
            github,
            owner: owner.into(),
            repo: repo.into(),
            platforms: platforms.to_vec(),
            checksum_file: checksum_file.into(),
            files: Vec::new(),
            v_prefix: "v".to_string(),
            download_base: "https://github.com".to_string(),
        }
    }

    /// Adds a file name template.
    pub fn file<F>(mut self, f: F) -> Self
    where
        F: Fn(&DslCtx) -> String + Send + Sync + 'static,
    {
        self.files.push(Arc::new(f));
        self
    }

    /// Tag prefix in front of the version. Defaults to `v`.
    pub fn v_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.v_prefix = prefix.into();
        self
    }

    /// Replaces `https://github.com` (used by tests).
    pub fn with_download_base(mut self, base: impl Into<String>) -> Self {
        self.download_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn release_url(&self, tag: &str, file: &str) -> String {
        format!(
            "{}/{}/{}/releases/download/{tag}/{file}",
            self.download_base, self.owner, self.repo
        )
    }
}

impl fmt::Debug for GithubReleaseFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubReleaseFiles")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("platforms", &self.platforms)
            .field("checksum_file", &self.checksum_file)
            .field("files", &self.files.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceResolver for GithubReleaseFiles {
    async fn resolve(&self, version: &ResolvedVersion) -> Result<ResolvedSources> {
        let tag = format!("{}{}", self.v_prefix, version.package_version());
        let list = SharedList::new(self.release_url(&tag, &self.checksum_file));
        ResolvedSources::per_platform(&self.platforms, version, |ctx| {
            Ok(self
                .files
                .iter()
                .map(|file| {
                    let file_name = file(ctx);
                    let url = self.release_url(&tag, &file_name);
                    let plan = DigestPlan {
                        github: self.github.clone(),
                        file_name,
                        url: url.clone(),
                        list: Some(list.clone()),
                        sidecar: None,
                    };
                    Source::url(url, UrlDigest::Deferred(LazyDigest::new(move || plan.clone().resolve())))
                })
                .collect())
        })
    }
}
