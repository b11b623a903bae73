//! The `execute` bridge.
//!
//! The `forge` binary runs in one of two modes. Normally it renders and
//! bakes recipes. When its first argument is [`EXECUTE_VERB`] it is the
//! bundled copy invoked by the build engine: it rebuilds a [`BuildContext`]
//! from argv and the engine's environment and runs one functional step.
//! Nothing from the rendering process survives into this one.

use std::path::{Path, PathBuf};

use clap::{ArgGroup, Parser};
use tracing::info;

use forge_schema::{Platform, PlatformArch, PlatformOs};

use crate::error::{ForgeError, Result, StepKind};
use crate::recipe::Recipe;

/// First argument that switches the binary into execute mode.
pub const EXECUTE_VERB: &str = "execute";

/// File name (without `.exe`) of the binary staged next to a rendered recipe.
pub const BUNDLED_NAME: &str = "bundled-recipe";

/// Environment variable naming the recipe to run in execute mode.
pub const RECIPE_ENV: &str = "FORGE_RECIPE";

/// File next to the bundled binary holding the recipe name.
pub const SIDECAR_FILE: &str = "bundled-recipe.name";

/// Arguments of `execute`.
#[derive(Debug, Clone, Parser)]
#[command(name = "execute", about = "Run one functional step of a bundled recipe")]
#[command(group(ArgGroup::new("step").required(true).args(["build", "test"])))]
pub struct ExecuteArgs {
    /// Run the build step
    #[arg(long)]
    pub build: bool,

    /// Run the test step
    #[arg(long)]
    pub test: bool,

    /// Platform `{os}-{arch}` running the build
    #[arg(long)]
    pub build_platform: Platform,

    /// Platform `{os}-{arch}` the package is built for
    #[arg(long)]
    pub target_platform: Platform,

    /// Upstream version string before semver coercion
    #[arg(long)]
    pub pkg_version_raw: Option<String>,
}

impl ExecuteArgs {
    /// Which step was requested.
    pub fn step(&self) -> StepKind {
        if self.test { StepKind::Test } else { StepKind::Build }
    }
}

/// How the process was started.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Regular CLI.
    Normal,
    /// Bundled step runner.
    Execute(ExecuteArgs),
}

impl Mode {
    /// Inspects `args` (including the program name at index 0).
    pub fn detect(args: &[String]) -> std::result::Result<Self, clap::Error> {
        match args.get(1) {
            Some(verb) if verb == EXECUTE_VERB => Ok(Self::Execute(ExecuteArgs::try_parse_from(&args[1..])?)),
            _ => Ok(Self::Normal),
        }
    }
}

/// Everything a functional step may know about the build it runs in.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Install prefix (`PREFIX`).
    pub prefix: PathBuf,
    /// Recipe directory (`RECIPE_DIR`).
    pub recipe_dir: PathBuf,
    /// Unpacked sources (`SRC_DIR`).
    pub src_dir: PathBuf,
    /// Package name (`PKG_NAME`).
    pub pkg_name: String,
    /// Package version (`PKG_VERSION`).
    pub pkg_version: String,
    /// Upstream version before coercion.
    pub pkg_version_raw: String,
    /// Build number (`PKG_BUILDNUM`).
    pub pkg_build_number: String,
    /// Package hash without the leading `h` (`PKG_HASH`).
    pub pkg_hash: String,
    /// Full build string (`PKG_BUILD_STRING`).
    pub pkg_build_string: String,
    /// Host running the engine.
    pub build_platform: Platform,
    /// Platform being built for.
    pub target_platform: Platform,
    /// `CPU_COUNT`, 0 when unset.
    pub cpu_count: usize,
    /// `.so`, `.dylib` or `.dll` (`SHLIB_EXT`).
    pub shlib_ext: String,
}

impl BuildContext {
    /// Rebuilds the context from `args` and the process environment.
    pub fn from_env(args: &ExecuteArgs) -> Self {
        Self::from_lookup(args, |key| std::env::var(key).ok())
    }

    /// Rebuilds the context from `args` and an environment lookup.
    pub fn from_lookup(args: &ExecuteArgs, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).unwrap_or_default();
        let pkg_version = var("PKG_VERSION");
        Self {
            prefix: var("PREFIX").into(),
            recipe_dir: var("RECIPE_DIR").into(),
            src_dir: var("SRC_DIR").into(),
            pkg_name: var("PKG_NAME"),
            pkg_version_raw: args.pkg_version_raw.clone().unwrap_or_else(|| pkg_version.clone()),
            pkg_version,
            pkg_build_number: var("PKG_BUILDNUM"),
            pkg_hash: var("PKG_HASH"),
            pkg_build_string: var("PKG_BUILD_STRING"),
            build_platform: args.build_platform,
            target_platform: args.target_platform,
            cpu_count: var("CPU_COUNT").parse().unwrap_or(0),
            shlib_ext: var("SHLIB_EXT"),
        }
    }

    /// Target OS.
    pub fn target_os(&self) -> PlatformOs {
        self.target_platform.os()
    }

    /// Target architecture.
    pub fn target_arch(&self) -> PlatformArch {
        self.target_platform.arch()
    }

    /// Build host OS.
    pub fn build_os(&self) -> PlatformOs {
        self.build_platform.os()
    }

    /// Build host architecture.
    pub fn build_arch(&self) -> PlatformArch {
        self.build_platform.arch()
    }

    /// True when the target is Linux or macOS.
    pub fn unix(&self) -> bool {
        self.target_platform.is_unix()
    }

    /// Appends `.exe` when targeting Windows.
    pub fn exe(&self, name: &str) -> String {
        self.target_platform.exe(name)
    }

    /// `$PREFIX/bin` on unix, `%PREFIX%\Library\bin` on Windows.
    pub fn bin_dir(&self) -> PathBuf {
        if self.unix() {
            self.prefix.join("bin")
        } else {
            self.prefix.join("Library").join("bin")
        }
    }
}

/// Runs the step `args` asks for.
pub async fn execute(recipe: &Recipe, args: &ExecuteArgs) -> Result<()> {
    let ctx = BuildContext::from_env(args);
    execute_with(recipe, args.step(), ctx).await
}

/// Runs `step` with an explicit context.
pub async fn execute_with(recipe: &Recipe, step: StepKind, ctx: BuildContext) -> Result<()> {
    let func = match step {
        StepKind::Build => recipe.build().step_fn(),
        StepKind::Test => recipe.tests().and_then(|t| t.step_fn()),
    }
    .ok_or(ForgeError::MissingStepFunction(step))?;

    info!(
        recipe = recipe.name(),
        %step,
        target = %ctx.target_platform,
        version = %ctx.pkg_version_raw,
        "executing step"
    );
    func.call(ctx).await.map_err(ForgeError::Other)
}

/// Decides which recipe an `execute` process belongs to.
///
/// `FORGE_RECIPE` wins, then the name file staged next to the binary,
/// then the engine's `PKG_NAME`.
pub fn recipe_name(lookup: impl Fn(&str) -> Option<String>, exe: Option<&Path>) -> Option<String> {
    if let Some(name) = lookup(RECIPE_ENV).filter(|n| !n.is_empty()) {
        return Some(name);
    }
    let sidecar = exe
        .and_then(Path::parent)
        .and_then(|dir| std::fs::read_to_string(dir.join(SIDECAR_FILE)).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    sidecar.or_else(|| lookup("PKG_NAME").filter(|n| !n.is_empty()))
}

/// Writes the recipe name file next to a staged binary.
pub fn write_sidecar(dir: &Path, recipe: &str) -> Result<()> {
    std::fs::write(dir.join(SIDECAR_FILE), recipe)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{Build, Tests};
    use crate::versions::{ResolvedVersion, StaticVersion};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_normal_mode() {
        assert!(matches!(Mode::detect(&argv("forge bake")).unwrap(), Mode::Normal));
        assert!(matches!(Mode::detect(&argv("forge")).unwrap(), Mode::Normal));
    }

    #[test]
    fn test_execute_mode() {
        let mode = Mode::detect(&argv(
            "bundled-recipe execute --build --build-platform linux-64 --target-platform linux-aarch64 --pkg-version-raw v1.2.3",
        ))
        .unwrap();
        let Mode::Execute(args) = mode else {
            panic!("expected execute mode");
        };
        assert_eq!(args.step(), StepKind::Build);
        assert_eq!(args.target_platform.to_string(), "linux-aarch64");
        assert_eq!(args.pkg_version_raw.as_deref(), Some("v1.2.3"));
    }

    #[test]
    fn test_execute_flags_are_exclusive_and_required() {
        assert!(Mode::detect(&argv("x execute --build --test --build-platform linux-64 --target-platform linux-64")).is_err());
        assert!(Mode::detect(&argv("x execute --build-platform linux-64 --target-platform linux-64")).is_err());
        assert!(Mode::detect(&argv("x execute --build --target-platform linux-64")).is_err());
        assert!(Mode::detect(&argv("x execute --test --build-platform linux --target-platform linux-64")).is_err());
    }

    fn args(step: &str) -> ExecuteArgs {
        ExecuteArgs::try_parse_from(argv(&format!(
            "execute --{step} --build-platform linux-64 --target-platform win-64"
        )))
        .unwrap()
    }

    #[test]
    fn test_context_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PREFIX", "/opt/p"),
            ("PKG_NAME", "nircmd"),
            ("PKG_VERSION", "2.86.0"),
            ("CPU_COUNT", "8"),
            ("SHLIB_EXT", ".dll"),
        ]);
        let ctx = BuildContext::from_lookup(&args("build"), |k| env.get(k).map(ToString::to_string));
        assert_eq!(ctx.prefix, PathBuf::from("/opt/p"));
        assert_eq!(ctx.pkg_version_raw, "2.86.0");
        assert_eq!(ctx.cpu_count, 8);
        assert!(!ctx.unix());
        assert_eq!(ctx.exe("nircmd"), "nircmd.exe");
        assert_eq!(ctx.build_os(), PlatformOs::Linux);
        assert_eq!(ctx.bin_dir(), PathBuf::from("/opt/p").join("Library").join("bin"));
    }

    #[tokio::test]
    async fn test_dispatch_and_missing_step() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let recipe = Recipe::builder("demo")
            .version(StaticVersion(ResolvedVersion::new("1.0.0")))
            .build(Build::func(move |ctx| {
                let flag = flag.clone();
                async move {
                    anyhow::ensure!(ctx.target_platform.to_string() == "win-64", "wrong target");
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .finish()
            .unwrap();

        let ctx = BuildContext::from_lookup(&args("build"), |_| None);
        execute_with(&recipe, StepKind::Build, ctx.clone()).await.unwrap();
        assert!(ran.load(Ordering::SeqCst));

        let err = execute_with(&recipe, StepKind::Test, ctx).await.unwrap_err();
        assert!(matches!(err, ForgeError::MissingStepFunction(StepKind::Test)));
    }

    #[tokio::test]
    async fn test_step_failure_propagates() {
        let recipe = Recipe::builder("demo")
            .version(StaticVersion(ResolvedVersion::new("1.0.0")))
            .tests(Tests::func(|_ctx| async { Err(anyhow::anyhow!("binary missing")) }))
            .finish()
            .unwrap();
        let ctx = BuildContext::from_lookup(&args("test"), |_| None);
        let err = execute_with(&recipe, StepKind::Test, ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "binary missing");
    }

    #[test]
    fn test_recipe_name_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join(BUNDLED_NAME);

        let env = HashMap::from([(RECIPE_ENV, "oras"), ("PKG_NAME", "pkg")]);
        assert_eq!(recipe_name(|k| env.get(k).map(ToString::to_string), Some(&exe)).as_deref(), Some("oras"));

        let env = HashMap::from([("PKG_NAME", "pkg")]);
        let lookup = |k: &str| env.get(k).map(ToString::to_string);
        assert_eq!(recipe_name(lookup, Some(&exe)).as_deref(), Some("pkg"));

        write_sidecar(dir.path(), "dprint\n").unwrap();
        assert_eq!(recipe_name(lookup, Some(&exe)).as_deref(), Some("dprint"));
        assert_eq!(recipe_name(|_| None, None), None);
    }
}
