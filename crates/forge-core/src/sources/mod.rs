//! Recipe sources and the resolvers that produce them.
//!
//! A [`SourceResolver`] turns a version into [`ResolvedSources`]: either a
//! flat list used for every platform, or a map from platform to that
//! platform's list. Digests may be deferred ([`LazyDigest`]) so that
//! network lookups only happen for the platforms actually rendered.

pub mod github;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;

use forge_schema::{Digest, DigestAlgorithm, Platform, PlatformArch, PlatformOs};

use crate::error::{ForgeError, Result};
use crate::versions::ResolvedVersion;

pub use github::GithubReleaseAssets;

type DigestFetch = dyn Fn() -> BoxFuture<'static, Result<Digest>> + Send + Sync;

/// A digest computed on first use and then remembered.
#[derive(Clone)]
pub struct LazyDigest {
    cell: Arc<OnceCell<Digest>>,
    fetch: Arc<DigestFetch>,
}

impl LazyDigest {
    /// Defers `fetch` until [`LazyDigest::get`] is first awaited.
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Digest>> + Send + 'static,
    {
        Self {
            cell: Arc::new(OnceCell::new()),
            fetch: Arc::new(move || fetch().boxed()),
        }
    }

    /// Resolves the digest, running the fetch at most once.
    pub async fn get(&self) -> Result<Digest> {
        self.cell.get_or_try_init(|| (self.fetch)()).await.cloned()
    }
}

impl fmt::Debug for LazyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(d) => write!(f, "LazyDigest({d})"),
            None => f.write_str("LazyDigest(<pending>)"),
        }
    }
}

/// Integrity check for a URL source. SHA-256 and MD5 are mutually exclusive.
#[derive(Debug, Clone)]
pub enum UrlDigest {
    /// Known SHA-256 or MD5 digest.
    Known(Digest),
    /// Computed on demand.
    Deferred(LazyDigest),
}

/// A downloadable archive or file.
#[derive(Debug, Clone)]
pub struct UrlSource {
    /// Download URL.
    pub url: String,
    /// Integrity check.
    pub digest: UrlDigest,
    /// Rename the downloaded file.
    pub file_name: Option<String>,
    /// Sub-directory of the work dir to place the source in.
    pub target_directory: Option<String>,
    /// Patch files, relative to the recipe directory.
    pub patches: Vec<String>,
}

/// Which revision of a git repository to check out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    /// A commit hash or any rev-parse expression.
    Rev(String),
    /// A tag.
    Tag(String),
    /// A branch.
    Branch(String),
}

/// A git checkout.
#[derive(Debug, Clone)]
pub struct GitSource {
    /// Repository URL.
    pub git: String,
    /// Revision; the default branch when absent.
    pub reference: Option<GitRef>,
    /// Shallow clone depth.
    pub depth: Option<i64>,
    /// Fetch LFS objects.
    pub lfs: bool,
    /// Sub-directory of the work dir to place the source in.
    pub target_directory: Option<String>,
    /// Patch files, relative to the recipe directory.
    pub patches: Vec<String>,
}

/// A path on the build machine.
#[derive(Debug, Clone)]
pub struct LocalSource {
    /// Path, relative to the recipe directory.
    pub path: String,
    /// Honour `.gitignore` when copying. Defaults to true.
    pub use_gitignore: bool,
    /// Sub-directory of the work dir to place the source in.
    pub target_directory: Option<String>,
    /// Patch files, relative to the recipe directory.
    pub patches: Vec<String>,
}

/// Exactly one kind of source.
#[derive(Debug, Clone)]
pub enum Source {
    /// See [`UrlSource`].
    Url(UrlSource),
    /// See [`GitSource`].
    Git(GitSource),
    /// See [`LocalSource`].
    Local(LocalSource),
}

impl Source {
    /// URL source with a known SHA-256 hex digest.
    pub fn url_sha256(url: impl Into<String>, sha256: &str) -> Result<Self> {
        Ok(Self::url(url, UrlDigest::Known(Digest::new(DigestAlgorithm::Sha256, sha256)?)))
    }

    /// URL source with any digest.
    pub fn url(url: impl Into<String>, digest: UrlDigest) -> Self {
        Self::Url(UrlSource {
            url: url.into(),
            digest,
            file_name: None,
            target_directory: None,
            patches: Vec::new(),
        })
    }

    /// Git source at the default branch.
    pub fn git(url: impl Into<String>) -> Self {
        Self::Git(GitSource {
            git: url.into(),
            reference: None,
            depth: None,
            lfs: false,
            target_directory: None,
            patches: Vec::new(),
        })
    }

    /// Local path source.
    pub fn path(path: impl Into<String>) -> Self {
        Self::Local(LocalSource {
            path: path.into(),
            use_gitignore: true,
            target_directory: None,
            patches: Vec::new(),
        })
    }

    /// Places the source in a sub-directory of the work dir.
    pub fn in_directory(mut self, dir: impl Into<String>) -> Self {
        let dir = Some(dir.into());
        match &mut self {
            Self::Url(s) => s.target_directory = dir,
            Self::Git(s) => s.target_directory = dir,
            Self::Local(s) => s.target_directory = dir,
        }
        self
    }

    /// Short label for logs and errors.
    pub fn label(&self) -> &str {
        match self {
            Self::Url(s) => &s.url,
            Self::Git(s) => &s.git,
            Self::Local(s) => &s.path,
        }
    }

    /// Replaces a deferred digest with its resolved value.
    pub async fn settle(&self) -> Result<Self> {
        match self {
            Self::Url(s) => match &s.digest {
                UrlDigest::Deferred(lazy) => {
                    let digest = lazy.get().await?;
                    check_url_digest(&s.url, &digest)?;
                    let mut settled = s.clone();
                    settled.digest = UrlDigest::Known(digest);
                    Ok(Self::Url(settled))
                }
                UrlDigest::Known(_) => Ok(self.clone()),
            },
            other => Ok(other.clone()),
        }
    }

    /// The camelCase model form of this source.
    ///
    /// Fails if a deferred digest has not been settled.
    pub fn to_value(&self) -> Result<Value> {
        let mut map = Map::new();
        let (target_directory, patches) = match self {
            Self::Url(s) => {
                map.insert("url".into(), json!(s.url));
                let UrlDigest::Known(digest) = &s.digest else {
                    return Err(ForgeError::UnresolvedDigest(s.url.clone()));
                };
                let key = check_url_digest(&s.url, digest)?;
                map.insert(key.into(), json!(digest.hex()));
                if let Some(name) = &s.file_name {
                    map.insert("fileName".into(), json!(name));
                }
                (&s.target_directory, &s.patches)
            }
            Self::Git(s) => {
                map.insert("git".into(), json!(s.git));
                match &s.reference {
                    Some(GitRef::Rev(r)) => map.insert("rev".into(), json!(r)),
                    Some(GitRef::Tag(t)) => map.insert("tag".into(), json!(t)),
                    Some(GitRef::Branch(b)) => map.insert("branch".into(), json!(b)),
                    None => None,
                };
                if let Some(depth) = s.depth {
                    map.insert("depth".into(), json!(depth));
                }
                if s.lfs {
                    map.insert("lfs".into(), json!(true));
                }
                (&s.target_directory, &s.patches)
            }
            Self::Local(s) => {
                map.insert("path".into(), json!(s.path));
                if !s.use_gitignore {
                    map.insert("useGitignore".into(), json!(false));
                }
                (&s.target_directory, &s.patches)
            }
        };
        if let Some(dir) = target_directory {
            map.insert("targetDirectory".into(), json!(dir));
        }
        if !patches.is_empty() {
            map.insert("patches".into(), json!(patches));
        }
        Ok(Value::Object(map))
    }
}

/// The rendered key for `digest`, or an error when the engine cannot check it.
fn check_url_digest(url: &str, digest: &Digest) -> Result<&'static str> {
    match digest.algorithm() {
        DigestAlgorithm::Sha256 => Ok("sha256"),
        DigestAlgorithm::Md5 => Ok("md5"),
        algorithm => Err(ForgeError::UnsupportedDigest {
            url: url.to_string(),
            algorithm,
        }),
    }
}

/// Sources for one version: universal, or keyed by platform.
#[derive(Debug, Clone)]
pub enum ResolvedSources {
    /// Used for every platform.
    Flat(Vec<Source>),
    /// Each platform gets its own list. The keys are the supported platforms.
    PerPlatform(BTreeMap<Platform, Vec<Source>>),
}

impl ResolvedSources {
    /// No sources at all; the build step fetches what it needs.
    pub fn none() -> Self {
        Self::Flat(Vec::new())
    }

    /// Builds a per-platform map by calling `f` with a context for each platform.
    pub fn per_platform<F>(platforms: &[Platform], version: &ResolvedVersion, mut f: F) -> Result<Self>
    where
        F: FnMut(&DslCtx) -> Result<Vec<Source>>,
    {
        let mut map = BTreeMap::new();
        for &platform in platforms {
            let ctx = DslCtx::new(version.clone(), platform);
            map.insert(platform, f(&ctx)?);
        }
        Ok(Self::PerPlatform(map))
    }

    /// Platforms implied by the sources. Empty means no restriction.
    pub fn platforms(&self) -> Vec<Platform> {
        match self {
            Self::Flat(_) => Vec::new(),
            Self::PerPlatform(map) => map.keys().copied().collect(),
        }
    }

    /// True when these sources can serve `platform`.
    pub fn supports(&self, platform: Platform) -> bool {
        match self {
            Self::Flat(_) => true,
            Self::PerPlatform(map) => map.contains_key(&platform),
        }
    }

    /// Resolves deferred digests for `target` (or for every platform when `None`).
    ///
    /// Sources of one platform are settled concurrently. Platforms not
    /// selected are dropped from the result.
    pub async fn settle(&self, target: Option<Platform>) -> Result<Self> {
        match self {
            Self::Flat(list) => Ok(Self::Flat(settle_all(list).await?)),
            Self::PerPlatform(map) => {
                let mut settled = BTreeMap::new();
                for (platform, list) in map {
                    if target.is_some_and(|t| t != *platform) {
                        continue;
                    }
                    settled.insert(*platform, settle_all(list).await?);
                }
                Ok(Self::PerPlatform(settled))
            }
        }
    }
}

async fn settle_all(list: &[Source]) -> Result<Vec<Source>> {
    try_join_all(list.iter().map(Source::settle)).await
}

/// Per-platform values handed to source builders.
#[derive(Debug, Clone)]
pub struct DslCtx {
    /// Version being resolved.
    pub version: ResolvedVersion,
    /// Target platform.
    pub platform: Platform,
}

impl DslCtx {
    /// Context for one (version, platform) pair.
    pub fn new(version: ResolvedVersion, platform: Platform) -> Self {
        Self { version, platform }
    }

    /// Package version string (semver when known).
    pub fn v(&self) -> &str {
        self.version.package_version()
    }

    /// Target OS.
    pub fn os(&self) -> PlatformOs {
        self.platform.os()
    }

    /// Target architecture.
    pub fn arch(&self) -> PlatformArch {
        self.platform.arch()
    }

    /// True for Linux and macOS.
    pub fn unix(&self) -> bool {
        self.platform.is_unix()
    }

    /// Appends `.exe` on Windows.
    pub fn exe(&self, name: &str) -> String {
        self.platform.exe(name)
    }
}

/// Produces the sources of a recipe for one version.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Resolves sources for `version`.
    async fn resolve(&self, version: &ResolvedVersion) -> Result<ResolvedSources>;
}

/// Sources that never change.
#[derive(Debug, Clone)]
pub struct StaticSources(pub ResolvedSources);

#[async_trait]
impl SourceResolver for StaticSources {
    async fn resolve(&self, _version: &ResolvedVersion) -> Result<ResolvedSources> {
        Ok(self.0.clone())
    }
}

type ResolveFn = dyn Fn(ResolvedVersion) -> BoxFuture<'static, Result<ResolvedSources>> + Send + Sync;

/// Sources computed by an async closure.
#[derive(Clone)]
pub struct SourcesFn(Arc<ResolveFn>);

impl SourcesFn {
    /// Wraps `f`.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ResolvedVersion) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResolvedSources>> + Send + 'static,
    {
        Self(Arc::new(move |v| f(v).boxed()))
    }
}

impl fmt::Debug for SourcesFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SourcesFn")
    }
}

#[async_trait]
impl SourceResolver for SourcesFn {
    async fn resolve(&self, version: &ResolvedVersion) -> Result<ResolvedSources> {
        (self.0)(version.clone()).await
    }
}
