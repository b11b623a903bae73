//! The recipe aggregate.
//!
//! A [`Recipe`] is built once through [`RecipeBuilder`], which validates all
//! metadata eagerly and fails with every violation at once. After that the
//! only state that changes is the memoized version and sources.

pub mod model;
pub mod validate;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, OnceCell};

use forge_schema::Platform;

use crate::config::ForgeConfig;
use crate::error::{ForgeError, Result, Violation};
use crate::github::GithubClient;
use crate::sources::{ResolvedSources, SourceResolver, StaticSources};
use crate::versions::{ResolvedVersion, VersionSource};

pub use model::{
    About, Build, BuildOptions, BuildStep, Description, DynamicLinking, Noarch, PackageContents, PythonTest,
    Requirements, ScriptEnv, ScriptTest, StepFn, TestElement, TestFiles, TestRequirements, Tests,
};

/// A validated package recipe.
pub struct Recipe {
    name: String,
    about: Option<About>,
    platforms: Option<Vec<Platform>>,
    version_source: Arc<dyn VersionSource>,
    source_resolver: Arc<dyn SourceResolver>,
    build: Build,
    tests: Option<Tests>,
    requirements: Option<Requirements>,
    extra: BTreeMap<String, String>,
    version: OnceCell<ResolvedVersion>,
    sources: Mutex<HashMap<String, ResolvedSources>>,
}

impl std::fmt::Debug for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name)
            .field("platforms", &self.platforms)
            .field("build", &self.build)
            .field("tests", &self.tests)
            .finish_non_exhaustive()
    }
}

impl Recipe {
    /// Starts a recipe named `name`.
    pub fn builder(name: impl Into<String>) -> RecipeBuilder {
        RecipeBuilder::new(name)
    }

    /// Package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptive metadata.
    pub fn about(&self) -> Option<&About> {
        self.about.as_ref()
    }

    /// Build section.
    pub fn build(&self) -> &Build {
        &self.build
    }

    /// Test section.
    pub fn tests(&self) -> Option<&Tests> {
        self.tests.as_ref()
    }

    /// Declared dependencies.
    pub fn requirements(&self) -> Option<&Requirements> {
        self.requirements.as_ref()
    }

    /// Opaque extra metadata.
    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    /// Platforms listed explicitly by the author.
    pub fn explicit_platforms(&self) -> Option<&[Platform]> {
        self.platforms.as_deref()
    }

    /// True when the build or the test runs through the `execute` bridge.
    pub fn has_functional_steps(&self) -> bool {
        self.build.step_fn().is_some() || self.tests.as_ref().is_some_and(|t| t.step_fn().is_some())
    }

    /// The version to build when none is requested. Resolved at most once.
    pub async fn version(&self) -> Result<ResolvedVersion> {
        self.version
            .get_or_try_init(|| self.version_source.latest())
            .await
            .cloned()
    }

    /// Every known version, newest first.
    pub async fn candidate_versions(&self) -> Result<Vec<ResolvedVersion>> {
        self.version_source.candidates().await
    }

    /// Sources of the latest version.
    pub async fn sources(&self) -> Result<ResolvedSources> {
        let version = self.version().await?;
        self.sources_for(&version).await
    }

    /// Sources of `version`. Resolved at most once per raw version.
    pub async fn sources_for(&self, version: &ResolvedVersion) -> Result<ResolvedSources> {
        let mut cache = self.sources.lock().await;
        if let Some(sources) = cache.get(&version.raw) {
            return Ok(sources.clone());
        }
        let sources = self.source_resolver.resolve(version).await?;
        cache.insert(version.raw.clone(), sources.clone());
        Ok(sources)
    }

    /// Supported platforms of the latest version.
    ///
    /// Explicit platforms win. Otherwise they are the keys of
    /// platform-keyed sources. Empty means no restriction.
    pub async fn platforms(&self) -> Result<Vec<Platform>> {
        if let Some(platforms) = &self.platforms {
            return Ok(platforms.clone());
        }
        Ok(self.sources().await?.platforms())
    }

    /// Supported platforms given already resolved sources.
    pub fn platforms_with(&self, sources: &ResolvedSources) -> Vec<Platform> {
        self.platforms.clone().unwrap_or_else(|| sources.platforms())
    }
}

/// Collects recipe fields, then validates them in [`RecipeBuilder::finish`].
pub struct RecipeBuilder {
    name: String,
    about: Option<About>,
    platforms: Option<Vec<String>>,
    version_source: Option<Arc<dyn VersionSource>>,
    source_resolver: Option<Arc<dyn SourceResolver>>,
    build: Build,
    tests: Option<Tests>,
    requirements: Option<Requirements>,
    extra: BTreeMap<String, String>,
}

impl RecipeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: None,
            platforms: None,
            version_source: None,
            source_resolver: None,
            build: Build::default(),
            tests: None,
            requirements: None,
            extra: BTreeMap::new(),
        }
    }

    /// Descriptive metadata.
    pub fn about(mut self, about: About) -> Self {
        self.about = Some(about);
        self
    }

    /// Supported platforms, as `{os}-{arch}` strings. Checked in `finish`.
    pub fn platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = Some(platforms.into_iter().map(Into::into).collect());
        self
    }

    /// Supported platforms, already parsed.
    pub fn platform_list(self, platforms: &[Platform]) -> Self {
        self.platforms(platforms.iter().map(ToString::to_string))
    }

    /// Where versions come from.
    pub fn version(mut self, source: impl VersionSource + 'static) -> Self {
        self.version_source = Some(Arc::new(source));
        self
    }

    /// Where sources come from.
    pub fn sources(mut self, resolver: impl SourceResolver + 'static) -> Self {
        self.source_resolver = Some(Arc::new(resolver));
        self
    }

    /// Build section.
    pub fn build(mut self, build: Build) -> Self {
        self.build = build;
        self
    }

    /// Test section.
    pub fn tests(mut self, tests: Tests) -> Self {
        self.tests = Some(tests);
        self
    }

    /// Declared dependencies.
    pub fn requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = Some(requirements);
        self
    }

    /// Adds one opaque extra entry.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// camelCase form of the data fields, as seen by the validator.
    fn metadata(&self) -> Result<Value> {
        let mut doc = Map::new();
        doc.insert("name".into(), json!(self.name));
        if let Some(platforms) = &self.platforms {
            doc.insert("platforms".into(), json!(platforms));
        }
        if let Some(about) = &self.about {
            doc.insert("about".into(), serde_json::to_value(about)?);
        }
        if let Some(reqs) = &self.requirements {
            doc.insert("requirements".into(), serde_json::to_value(reqs)?);
        }
        if let Some(Tests::Static(elements)) = &self.tests {
            doc.insert("tests".into(), serde_json::to_value(elements)?);
        }
        if !self.extra.is_empty() {
            doc.insert("extra".into(), json!(self.extra));
        }
        Ok(Value::Object(doc))
    }

    /// Validates and builds the recipe.
    ///
    /// A missing version source is a violation. Missing sources mean the
    /// recipe has none (the build step fetches its own inputs).
    pub fn finish(self) -> Result<Recipe> {
        let mut violations = validate::validate_metadata(&self.metadata()?);
        if self.version_source.is_none() {
            violations.push(Violation {
                path: "version".into(),
                expected: "a version source".into(),
                actual: "nothing".into(),
            });
        }
        if let Some(BuildStep::Script(lines)) = &self.build.step {
            if lines.is_empty() {
                violations.push(Violation {
                    path: "build.script".into(),
                    expected: "at least one command".into(),
                    actual: "[]".into(),
                });
            }
        }

        let Some(version_source) = self.version_source.filter(|_| violations.is_empty()) else {
            return Err(ForgeError::RecipeValidation(violations));
        };

        let platforms = self
            .platforms
            .map(|list| list.iter().map(|p| p.parse::<Platform>()).collect::<std::result::Result<Vec<_>, _>>())
            .transpose()?;

        Ok(Recipe {
            name: self.name,
            about: self.about,
            platforms,
            version_source,
            source_resolver: self
                .source_resolver
                .unwrap_or_else(|| Arc::new(StaticSources(ResolvedSources::none()))),
            build: self.build,
            tests: self.tests,
            requirements: self.requirements,
            extra: self.extra,
            version: OnceCell::new(),
            sources: Mutex::new(HashMap::new()),
        })
    }
}

/// What a recipe module gets when it is loaded.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// Shared HTTP client.
    pub http: reqwest::Client,
    /// GitHub client with the configured token.
    pub github: GithubClient,
    /// Process configuration.
    pub config: ForgeConfig,
}

impl LoadContext {
    /// Builds the clients from `config`.
    pub fn new(config: ForgeConfig) -> Result<Self> {
        let http = crate::http_client()?;
        let github = GithubClient::new(http.clone(), config.github_token.clone())
            .with_auth_tokens(config.auth_tokens.clone());
        Ok(Self { http, github, config })
    }
}

/// A recipe registered by name, with the directory holding its extra files.
#[derive(Clone, Copy)]
pub struct RecipeModule {
    /// Package name, also the `execute` lookup key.
    pub name: &'static str,
    /// Recipe directory relative to the forge root.
    pub dir: &'static str,
    /// Builds the recipe. May touch the network.
    pub load: fn(LoadContext) -> BoxFuture<'static, Result<Recipe>>,
}

impl std::fmt::Debug for RecipeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeModule")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

/// Finds a module by package name.
pub fn find_module<'a>(modules: &'a [RecipeModule], name: &str) -> Result<&'a RecipeModule> {
    modules
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| ForgeError::UnknownRecipe(name.to_string()))
}
