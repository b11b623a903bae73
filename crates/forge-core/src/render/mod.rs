//! Recipe rendering.
//!
//! [`Renderer::render`] is a pure mapping from a recipe plus its resolved
//! version and settled sources to the engine's document. Two modes:
//!
//! - single target: only that platform's sources, literal platforms in the
//!   bridge command;
//! - multi-platform: every platform's sources behind `if: target_platform ==`
//!   branches, a synthesized `build.skip`, and a bridge command chosen on
//!   the build platform at engine time.

pub mod schema;

use std::sync::Arc;

use serde_json::{Map, Value, json};

use forge_schema::case::to_engine_keys;
use forge_schema::{Platform, PlatformOs};

use crate::bridge::{BUNDLED_NAME, EXECUTE_VERB};
use crate::error::{Result, StepKind};
use crate::recipe::{BuildStep, Recipe, TestRequirements, Tests};
use crate::sources::ResolvedSources;
use crate::versions::ResolvedVersion;

pub use schema::RecipeSchema;

/// Engine-side templates used when platforms are only known at build time.
const BUILD_PLATFORM_VAR: &str = "${{ build_platform }}";
const TARGET_PLATFORM_VAR: &str = "${{ target_platform }}";
const RAW_VERSION_VAR: &str = "${{ rawVersion }}";
const WIN_BUILD_HOST: &str = "build_platform | split('-') | first == \"win\"";

/// What to render for.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Render one platform only. `None` renders every supported platform.
    pub target_platform: Option<Platform>,
    /// Host that will run the engine. Defaults to the target.
    pub build_platform: Option<Platform>,
    /// Added to build (and functional test) requirements when the recipe
    /// has functional steps.
    pub bridge_requirement: Option<String>,
}

impl RenderOptions {
    /// Single-target render built on the same platform.
    pub fn for_target(platform: Platform) -> Self {
        Self {
            target_platform: Some(platform),
            ..Self::default()
        }
    }
}

/// The engine document, already in engine key casing.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    value: Value,
}

impl RenderedDocument {
    /// The document tree.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the document.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// YAML text, as written next to the staged recipe.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.value)?)
    }
}

/// Renders recipes, optionally checking them against the engine schema.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    schema: Option<Arc<RecipeSchema>>,
}

impl Renderer {
    /// A renderer that skips schema validation.
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer that validates every document against `schema`.
    pub fn with_schema(schema: Arc<RecipeSchema>) -> Self {
        Self { schema: Some(schema) }
    }

    /// Renders `recipe` for `version` with `sources` already settled.
    ///
    /// Fails with `UnresolvedDigest` if a source still has a deferred digest,
    /// and with `SchemaValidation` if a schema is set and the output violates it.
    pub fn render(
        &self,
        recipe: &Recipe,
        version: &ResolvedVersion,
        sources: &ResolvedSources,
        opts: &RenderOptions,
    ) -> Result<RenderedDocument> {
        let functional = recipe.has_functional_steps();
        let mut doc = Map::new();
        doc.insert("schemaVersion".into(), json!(1));
        doc.insert("context".into(), json!({ "rawVersion": version.raw }));
        doc.insert(
            "package".into(),
            json!({ "name": recipe.name(), "version": version.package_version() }),
        );

        let source = render_sources(sources, opts.target_platform)?;
        if !source.is_empty() {
            doc.insert("source".into(), Value::Array(source));
        }

        doc.insert("build".into(), render_build(recipe, version, sources, opts)?);

        let mut requirements = recipe.requirements().cloned().unwrap_or_default();
        if functional {
            if let Some(req) = &opts.bridge_requirement {
                requirements.build.push(req.clone());
            }
        }
        if !requirements.is_empty() {
            doc.insert("requirements".into(), serde_json::to_value(&requirements)?);
        }

        if let Some(tests) = render_tests(recipe.tests(), version, opts)? {
            doc.insert("tests".into(), tests);
        }
        if let Some(about) = recipe.about() {
            doc.insert("about".into(), serde_json::to_value(about)?);
        }
        if !recipe.extra().is_empty() {
            doc.insert("extra".into(), json!(recipe.extra()));
        }

        let value = to_engine_keys(Value::Object(doc));
        if let Some(schema) = &self.schema {
            schema.validate(&value)?;
        }
        Ok(RenderedDocument { value })
    }
}

/// Resolves version and sources, settles digests and renders.
pub async fn render_variant(
    renderer: &Renderer,
    recipe: &Recipe,
    version: &ResolvedVersion,
    opts: &RenderOptions,
) -> Result<RenderedDocument> {
    let sources = recipe.sources_for(version).await?;
    let settled = sources.settle(opts.target_platform).await?;
    renderer.render(recipe, version, &settled, opts)
}

fn render_sources(sources: &ResolvedSources, target: Option<Platform>) -> Result<Vec<Value>> {
    match sources {
        ResolvedSources::Flat(list) => list.iter().map(|s| s.to_value()).collect(),
        ResolvedSources::PerPlatform(map) => match target {
            Some(platform) => map
                .get(&platform)
                .map_or_else(|| Ok(Vec::new()), |list| list.iter().map(|s| s.to_value()).collect()),
            None => {
                let mut out = Vec::new();
                for (platform, list) in map {
                    for source in list {
                        out.push(json!({
                            "if": format!("target_platform == \"{platform}\""),
                            "then": source.to_value()?,
                        }));
                    }
                }
                Ok(out)
            }
        },
    }
}

fn render_build(
    recipe: &Recipe,
    version: &ResolvedVersion,
    sources: &ResolvedSources,
    opts: &RenderOptions,
) -> Result<Value> {
    let build = recipe.build();
    let mut out = match serde_json::to_value(&build.options)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    match &build.step {
        Some(BuildStep::Script(lines)) => {
            out.insert("script".into(), json!(lines));
        }
        Some(BuildStep::Func(_)) => {
            out.insert("script".into(), bridge_script(StepKind::Build, version, opts));
        }
        None => {}
    }

    if opts.target_platform.is_none() {
        let platforms = recipe.platforms_with(sources);
        let mut skip = build.options.skip.clone();
        if !platforms.is_empty() {
            skip.push(
                platforms
                    .iter()
                    .map(|p| format!("target_platform != \"{p}\""))
                    .collect::<Vec<_>>()
                    .join(" and "),
            );
        }
        match skip.len() {
            0 => {}
            1 => {
                out.insert("skip".into(), json!(skip[0]));
            }
            _ => {
                out.insert("skip".into(), json!(skip));
            }
        }
    }

    Ok(Value::Object(out))
}

fn render_tests(tests: Option<&Tests>, version: &ResolvedVersion, opts: &RenderOptions) -> Result<Option<Value>> {
    match tests {
        None => Ok(None),
        Some(Tests::Static(elements)) if elements.is_empty() => Ok(None),
        Some(Tests::Static(elements)) => Ok(Some(serde_json::to_value(elements)?)),
        Some(Tests::Func { requirements, .. }) => {
            let mut requirements: TestRequirements = requirements.clone();
            if let Some(req) = &opts.bridge_requirement {
                requirements.build.push(req.clone());
            }
            let mut test = Map::new();
            test.insert("script".into(), bridge_script(StepKind::Test, version, opts));
            if !requirements.is_empty() {
                test.insert("requirements".into(), serde_json::to_value(&requirements)?);
            }
            Ok(Some(Value::Array(vec![Value::Object(test)])))
        }
    }
}

/// The `script` list that re-enters the bundled binary through the bridge.
fn bridge_script(kind: StepKind, version: &ResolvedVersion, opts: &RenderOptions) -> Value {
    match opts.target_platform {
        Some(target) => {
            let build = opts.build_platform.unwrap_or(target);
            let flags = bridge_flags(kind, &build.to_string(), &target.to_string(), &version.raw);
            json!([bridge_command(kind, build.os(), &flags)])
        }
        None => {
            let flags = bridge_flags(kind, BUILD_PLATFORM_VAR, TARGET_PLATFORM_VAR, RAW_VERSION_VAR);
            json!([{
                "if": WIN_BUILD_HOST,
                "then": bridge_command(kind, PlatformOs::Win, &flags),
                "else": bridge_command(kind, PlatformOs::Linux, &flags),
            }])
        }
    }
}

fn bridge_flags(kind: StepKind, build: &str, target: &str, raw: &str) -> String {
    format!("{EXECUTE_VERB} --{kind} --build-platform {build} --target-platform {target} --pkg-version-raw {raw}")
}

/// Build steps run from the recipe dir; tests from the installed package's
/// `info/recipe` copy.
fn bridge_command(kind: StepKind, build_os: PlatformOs, flags: &str) -> String {
    let exe = build_os.exe(BUNDLED_NAME);
    match (kind, build_os) {
        (StepKind::Build, PlatformOs::Win) => format!("%RECIPE_DIR%\\{exe} {flags}"),
        (StepKind::Build, _) => format!("$RECIPE_DIR/{exe} {flags}"),
        (StepKind::Test, PlatformOs::Win) => format!(".\\info\\recipe\\{exe} {flags}"),
        (StepKind::Test, _) => format!("./info/recipe/{exe} {flags}"),
    }
}
