//! Bakes recipes into packages.
//!
//! For each selected (version, platform) variant: skip if already published,
//! settle digests, stage the recipe directory, render `recipe.yaml`, run the
//! engine, then copy and/or publish the package. Variants run one after the
//! other. A failing variant is logged and the rest continue, unless debug
//! mode is on, in which case the error aborts the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use forge_schema::Platform;

use crate::bridge::{BUNDLED_NAME, write_sidecar};
use crate::engine::{BuildEngine, EngineRequest};
use crate::error::{ForgeError, Result};
use crate::files::chmod_exec;
use crate::recipe::Recipe;
use crate::registry::{Registry, VariantQuery};
use crate::render::{RenderOptions, Renderer};
use crate::sources::ResolvedSources;
use crate::versions::{ResolvedVersion, sort_newest_first};

/// Versions baked when none are requested.
pub const DEFAULT_VERSION_WINDOW: usize = 2;

/// What to bake and where the results go.
#[derive(Debug, Clone)]
pub struct BakeOptions {
    /// Requested versions, raw or semver. Empty means the newest few.
    pub versions: Vec<String>,
    /// Requested platforms. Empty means every supported one.
    pub platforms: Vec<Platform>,
    /// Platforms never baked.
    pub exclude: Vec<Platform>,
    /// Packages are copied to `<output_dir>/<platform>/` when set.
    pub output_dir: Option<PathBuf>,
    /// Upload packages and skip variants that are already published.
    pub publish: bool,
    /// Keep staging dirs and stop at the first failure.
    pub debug: bool,
    /// How many versions to bake when none are requested.
    pub version_window: usize,
    /// Registry channel.
    pub channel: String,
    /// Forwarded to [`RenderOptions::bridge_requirement`].
    pub bridge_requirement: Option<String>,
    /// Print `::group::` markers around each variant.
    pub github_actions: bool,
}

impl Default for BakeOptions {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            platforms: Vec::new(),
            exclude: Vec::new(),
            output_dir: None,
            publish: false,
            debug: false,
            version_window: DEFAULT_VERSION_WINDOW,
            channel: crate::config::DEFAULT_CHANNEL.to_string(),
            bridge_requirement: None,
            github_actions: false,
        }
    }
}

/// How one variant ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantStatus {
    /// Built; the path is where the package was copied, if anywhere.
    Built {
        /// Copy under the output directory.
        copied_to: Option<PathBuf>,
    },
    /// Built and uploaded.
    Published {
        /// Uploaded file name.
        file_name: String,
    },
    /// Already in the registry.
    AlreadyPublished,
    /// The recipe does not support this platform.
    Unsupported,
    /// Something went wrong; the message is the error.
    Failed(String),
}

/// Outcome of one variant.
#[derive(Debug, Clone)]
pub struct VariantResult {
    /// `name/platform@version`.
    pub id: String,
    /// How it ended.
    pub status: VariantStatus,
    /// Wall time spent on it.
    pub duration: Duration,
}

impl VariantResult {
    /// True when the variant failed.
    pub fn failed(&self) -> bool {
        matches!(self.status, VariantStatus::Failed(_))
    }
}

/// Runs the bake pipeline.
pub struct Bakery {
    opts: BakeOptions,
    renderer: Renderer,
    engine: Arc<dyn BuildEngine>,
    registry: Option<Arc<dyn Registry>>,
    bundle_exe: Option<PathBuf>,
}

impl std::fmt::Debug for Bakery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bakery")
            .field("opts", &self.opts)
            .field("publish", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

impl Bakery {
    /// A bakery using `engine`, with no registry.
    pub fn new(opts: BakeOptions, renderer: Renderer, engine: Arc<dyn BuildEngine>) -> Self {
        Self {
            opts,
            renderer,
            engine,
            registry: None,
            bundle_exe: None,
        }
    }

    /// Registry used for existence checks and uploads.
    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Binary staged for functional steps. Defaults to the running executable.
    pub fn with_bundle_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.bundle_exe = Some(exe.into());
        self
    }

    /// Bakes every selected variant of `recipe`, whose extra files live in `recipe_dir`.
    pub async fn bake_recipe(&self, recipe: &Recipe, recipe_dir: &Path) -> Result<Vec<VariantResult>> {
        info!(recipe = recipe.name(), dir = %recipe_dir.display(), "baking recipe");
        let versions = self.select_versions(recipe).await?;
        info!(
            versions = ?versions.iter().map(ResolvedVersion::package_version).collect::<Vec<_>>(),
            "selected versions"
        );

        let mut results = Vec::new();
        for version in &versions {
            let sources = match recipe.sources_for(version).await {
                Ok(sources) => sources,
                Err(e) if self.opts.debug => return Err(e),
                Err(e) => {
                    error!(recipe = recipe.name(), version = %version, "resolving sources failed: {e}");
                    warn!("continuing with remaining versions");
                    let (targets, _) = select_platforms(
                        &self.opts.platforms,
                        &recipe.platforms_with(&ResolvedSources::none()),
                        &self.opts.exclude,
                        Platform::current(),
                    );
                    results.extend(targets.into_iter().map(|platform| VariantResult {
                        id: variant_id(recipe, platform, version),
                        status: VariantStatus::Failed(e.to_string()),
                        duration: Duration::ZERO,
                    }));
                    continue;
                }
            };
            let supported = recipe.platforms_with(&sources);
            let (bake, unsupported) =
                select_platforms(&self.opts.platforms, &supported, &self.opts.exclude, Platform::current());

            for platform in unsupported {
                info!(%platform, "recipe does not support platform, skipping");
                results.push(VariantResult {
                    id: variant_id(recipe, platform, version),
                    status: VariantStatus::Unsupported,
                    duration: Duration::ZERO,
                });
            }

            for platform in bake {
                let id = variant_id(recipe, platform, version);
                let start = Instant::now();
                let status = match self.bake_variant(recipe, recipe_dir, version, platform, &id).await {
                    Ok(status) => status,
                    Err(e) if self.opts.debug => return Err(e),
                    Err(e) => {
                        error!(variant = %id, "{e}");
                        warn!("continuing with remaining variants");
                        VariantStatus::Failed(e.to_string())
                    }
                };
                results.push(VariantResult {
                    id,
                    status,
                    duration: start.elapsed(),
                });
            }
        }
        Ok(results)
    }

    async fn select_versions(&self, recipe: &Recipe) -> Result<Vec<ResolvedVersion>> {
        if self.opts.versions.is_empty() {
            let mut candidates = recipe.candidate_versions().await?;
            sort_newest_first(&mut candidates);
            candidates.truncate(self.opts.version_window);
            return Ok(candidates);
        }
        let candidates = recipe.candidate_versions().await?;
        Ok(self
            .opts
            .versions
            .iter()
            .map(|requested| {
                candidates
                    .iter()
                    .find(|c| c.matches(requested))
                    .cloned()
                    .unwrap_or_else(|| ResolvedVersion::new(requested.clone()))
            })
            .collect())
    }

    async fn bake_variant(
        &self,
        recipe: &Recipe,
        recipe_dir: &Path,
        version: &ResolvedVersion,
        platform: Platform,
        id: &str,
    ) -> Result<VariantStatus> {
        let _group = GhaGroup::open(self.opts.github_actions, id);

        if self.opts.publish {
            let query = VariantQuery {
                name: recipe.name().to_string(),
                version: version.package_version().to_string(),
                platform,
                build_number: recipe.build().options.number.unwrap_or(0),
                channel: self.opts.channel.clone(),
            };
            if self.registry()?.variant_exists(&query).await? {
                info!(variant = %id, "variant already published");
                return Ok(VariantStatus::AlreadyPublished);
            }
            debug!(variant = %id, "variant not published yet");
        }

        let sources = recipe.sources_for(version).await?;
        if !sources.supports(platform) {
            info!(variant = %id, "no sources for platform, skipping");
            return Ok(VariantStatus::Unsupported);
        }
        info!(variant = %id, "resolving recipe sources");
        let settled = sources.settle(Some(platform)).await?;

        let staging = tempfile::Builder::new()
            .prefix(&format!("forge-{}-", recipe.name()))
            .tempdir()?;
        let (root, _cleanup) = if self.opts.debug {
            (staging.keep(), None)
        } else {
            (staging.path().to_path_buf(), Some(staging))
        };
        info!(dir = %root.display(), "staging recipe");
        let src = root.join("src");
        stage_recipe_dir(recipe_dir, &src).await?;

        let build_platform = Platform::current();
        if recipe.has_functional_steps() {
            self.stage_bundle(&src, build_platform, recipe.name()).await?;
        }

        let opts = RenderOptions {
            target_platform: Some(platform),
            build_platform: Some(build_platform),
            bridge_requirement: self.opts.bridge_requirement.clone(),
        };
        let yaml = self.renderer.render(recipe, version, &settled, &opts)?.to_yaml()?;
        debug!("rendered recipe:\n{yaml}");
        let recipe_yaml = src.join("recipe.yaml");
        tokio::fs::write(&recipe_yaml, yaml).await?;

        let package = self
            .engine
            .build(&EngineRequest::new(recipe_yaml, platform, root.join("output")))
            .await?;
        let file_name = package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ForgeError::ArtifactNotFound(package.display().to_string()))?;

        let copied_to = match &self.opts.output_dir {
            Some(out) => {
                let dst = out.join(platform.to_string()).join(&file_name);
                if let Some(parent) = dst.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(&package, &dst).await?;
                info!(path = %dst.display(), "written");
                Some(dst)
            }
            None => None,
        };

        if self.opts.publish {
            info!(variant = %id, "publishing");
            self.registry()?.upload(&package, &self.opts.channel).await?;
            info!(file = %file_name, "published");
            return Ok(VariantStatus::Published { file_name });
        }
        Ok(VariantStatus::Built { copied_to })
    }

    fn registry(&self) -> Result<&Arc<dyn Registry>> {
        self.registry
            .as_ref()
            .ok_or_else(|| ForgeError::Registry("publishing needs a registry token".to_string()))
    }

    /// Copies the binary the engine calls back into, plus the name file.
    async fn stage_bundle(&self, src: &Path, build_platform: Platform, name: &str) -> Result<()> {
        let exe = match &self.bundle_exe {
            Some(exe) => exe.clone(),
            None => std::env::current_exe()?,
        };
        let dst = src.join(build_platform.exe(BUNDLED_NAME));
        debug!(from = %exe.display(), to = %dst.display(), "bundling recipe binary");
        tokio::fs::copy(&exe, &dst).await?;
        chmod_exec(&dst).await?;
        write_sidecar(src, name)
    }
}

/// Splits the platforms to bake from requested ones the recipe cannot build.
///
/// An empty `supported` list means the recipe builds anywhere: the requested
/// platforms, or the host when none were requested.
pub fn select_platforms(
    requested: &[Platform],
    supported: &[Platform],
    excluded: &[Platform],
    host: Platform,
) -> (Vec<Platform>, Vec<Platform>) {
    let (bake, unsupported): (Vec<Platform>, Vec<Platform>) = if supported.is_empty() {
        let bake = if requested.is_empty() { vec![host] } else { requested.to_vec() };
        (bake, Vec::new())
    } else if requested.is_empty() {
        (supported.to_vec(), Vec::new())
    } else {
        requested.iter().copied().partition(|p| supported.contains(p))
    };
    let bake = bake.into_iter().filter(|p| !excluded.contains(p)).collect();
    (bake, unsupported)
}

fn variant_id(recipe: &Recipe, platform: Platform, version: &ResolvedVersion) -> String {
    format!("{}/{platform}@{}", recipe.name(), version.package_version())
}

async fn stage_recipe_dir(recipe_dir: &Path, src: &Path) -> Result<()> {
    tokio::fs::create_dir_all(src).await?;
    if !recipe_dir.is_dir() {
        return Ok(());
    }
    let (from, to) = (recipe_dir.to_path_buf(), src.to_path_buf());
    tokio::task::spawn_blocking(move || {
        let options = fs_extra::dir::CopyOptions::new().overwrite(true).content_only(true);
        fs_extra::dir::copy(&from, &to, &options).map(|_| ())
    })
    .await
    .map_err(|e| ForgeError::Io(std::io::Error::other(e)))??;
    Ok(())
}

/// Collapsible log section on GitHub Actions.
struct GhaGroup(bool);

impl GhaGroup {
    fn open(enabled: bool, title: &str) -> Self {
        if enabled {
            println!("::group::{title}");
        }
        Self(enabled)
    }
}

impl Drop for GhaGroup {
    fn drop(&mut self) {
        if self.0 {
            println!("::endgroup::");
        }
    }
}
