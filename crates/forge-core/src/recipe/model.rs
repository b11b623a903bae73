//! Plain value types that make up a recipe.
//!
//! Everything here serializes with camelCase keys; the renderer converts to
//! the engine's casing in one pass (see `forge_schema::case`).

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;

use crate::bridge::BuildContext;

/// Descriptive package metadata.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    /// Project homepage URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// Source repository URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Documentation URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    /// SPDX license expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// License files, relative to the source directory.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub license_file: Vec<String>,
    /// URL of the license text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    /// One-line summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Long description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,
    /// Shown before the package is linked into an environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prelink_message: Option<String>,
}

/// Long description, inline or from a file.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Description {
    /// Inline text.
    Text(String),
    /// Path of a file (usually a README) in the source directory.
    File {
        /// The file path.
        file: String,
    },
}

/// Package dependencies by environment.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    /// Tools that run on the build machine.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub build: Vec<String>,
    /// Libraries the build links against.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,
    /// Installed alongside the package.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub run: Vec<String>,
    /// Optional runtime constraints.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub run_constrained: Vec<String>,
    /// Exports applied to dependent packages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_exports: Option<RunExports>,
    /// Run exports to ignore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_run_exports: Option<IgnoreRunExports>,
}

impl Requirements {
    /// True when nothing would be emitted.
    pub fn is_empty(&self) -> bool {
        self.build.is_empty()
            && self.host.is_empty()
            && self.run.is_empty()
            && self.run_constrained.is_empty()
            && self.run_exports.is_none()
            && self.ignore_run_exports.is_none()
    }
}

/// Run exports this package provides.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunExports {
    /// Only ones considered for noarch packages.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub noarch: Vec<String>,
    /// From build and host into run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub strong: Vec<String>,
    /// Constraints from build and host.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub strong_constraints: Vec<String>,
    /// From host into run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub weak: Vec<String>,
    /// Constraints from host.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub weak_constraints: Vec<String>,
}

/// Run exports to drop.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreRunExports {
    /// Package names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub by_name: Vec<String>,
    /// Packages whose exports are ignored.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub from_package: Vec<String>,
}

/// Kind of architecture-independent package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Noarch {
    /// Plain files.
    Generic,
    /// Pure Python.
    Python,
}

/// Environment handed to the build script.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScriptEnv {
    /// Variables set for the script.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Variables passed through from the calling environment.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub passthrough: Vec<String>,
    /// Variables passed through but masked in logs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
}

/// Post-processing of linked binaries.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicLinking {
    /// Relocate binaries into the prefix. Prebuilt tools usually turn this off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_relocation: Option<bool>,
    /// Extra rpaths (Linux only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rpaths: Vec<String>,
}

/// Build settings passed to the engine as-is.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    /// Build number. Bump to republish the same version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    /// Overrides the build string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    /// Skip predicates. Any true predicate skips the variant.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
    /// Architecture-independent package.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noarch: Option<Noarch>,
    /// Script environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_env: Option<ScriptEnv>,
    /// Binary post-processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_linking: Option<DynamicLinking>,
    /// Script run before linking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_link: Option<String>,
    /// Script run after linking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_link: Option<String>,
    /// Script run before unlinking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_unlink: Option<String>,
    /// Globs selecting the files to package.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Files packaged even if already present in the host environment.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub always_include_files: Vec<String>,
}

type StepFuture = BoxFuture<'static, anyhow::Result<()>>;

/// An imperative build or test step.
///
/// It only ever runs in the `execute` process, with a context rebuilt from
/// argv and environment.
#[derive(Clone)]
pub struct StepFn(Arc<dyn Fn(BuildContext) -> StepFuture + Send + Sync>);

impl StepFn {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(BuildContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |ctx| f(ctx).boxed()))
    }

    /// Runs the step.
    pub async fn call(&self, ctx: BuildContext) -> anyhow::Result<()> {
        (self.0)(ctx).await
    }
}

impl fmt::Debug for StepFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StepFn")
    }
}

/// How the package is built.
#[derive(Debug, Clone)]
pub enum BuildStep {
    /// Shell commands.
    Script(Vec<String>),
    /// A step run through the `execute` bridge.
    Func(StepFn),
}

/// Build section of a recipe.
#[derive(Debug, Clone, Default)]
pub struct Build {
    /// Options passed through to the engine.
    pub options: BuildOptions,
    /// The step; the engine looks for `build.sh` / `build.bat` when absent.
    pub step: Option<BuildStep>,
}

impl Build {
    /// A build made of shell commands.
    pub fn script<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: BuildOptions::default(),
            step: Some(BuildStep::Script(lines.into_iter().map(Into::into).collect())),
        }
    }

    /// A build run through the `execute` bridge.
    pub fn func<F, Fut>(f: F) -> Self
    where
        F: Fn(BuildContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            options: BuildOptions::default(),
            step: Some(BuildStep::Func(StepFn::new(f))),
        }
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// The step function, if the build is functional.
    pub fn step_fn(&self) -> Option<&StepFn> {
        match &self.step {
            Some(BuildStep::Func(f)) => Some(f),
            _ => None,
        }
    }
}

/// Extra dependencies for a test.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestRequirements {
    /// Installed for the build platform (emulators and the like).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub build: Vec<String>,
    /// Installed next to the package under test.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub run: Vec<String>,
}

impl TestRequirements {
    /// True when nothing would be emitted.
    pub fn is_empty(&self) -> bool {
        self.build.is_empty() && self.run.is_empty()
    }
}

/// Extra files copied into the test directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestFiles {
    /// From `$SRC_DIR`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<String>,
    /// From `$RECIPE_DIR`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recipe: Vec<String>,
}

impl TestFiles {
    /// True when nothing would be emitted.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty() && self.recipe.is_empty()
    }
}

/// A shell test.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScriptTest {
    /// Commands to run.
    pub script: Vec<String>,
    /// Extra dependencies.
    #[serde(skip_serializing_if = "TestRequirements::is_empty")]
    pub requirements: TestRequirements,
    /// Extra files.
    #[serde(skip_serializing_if = "TestFiles::is_empty")]
    pub files: TestFiles,
}

/// Python import checks.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonTest {
    /// Modules to import.
    pub imports: Vec<String>,
    /// Run `pip check`. The engine defaults to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pip_check: Option<bool>,
}

/// Paths that must exist in the built package.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageContents {
    /// Files or globs inside the prefix.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Python modules in site-packages.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub site_packages: Vec<String>,
    /// Executables in the bin directory.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bins: Vec<String>,
    /// Shared libraries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub libs: Vec<String>,
    /// Headers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
}

/// One static test understood by the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TestElement {
    /// Shell commands.
    Script(ScriptTest),
    /// Python imports.
    Python {
        /// Import settings.
        python: PythonTest,
    },
    /// Test a dependent package against this one.
    Downstream {
        /// Name of the downstream package.
        downstream: String,
    },
    /// Check the package layout.
    PackageContents {
        /// The expected contents.
        #[serde(rename = "packageContents")]
        package_contents: PackageContents,
    },
}

impl TestElement {
    /// A shell test running `lines`.
    pub fn script<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Script(ScriptTest {
            script: lines.into_iter().map(Into::into).collect(),
            ..ScriptTest::default()
        })
    }
}

/// Test section of a recipe.
#[derive(Debug, Clone)]
pub enum Tests {
    /// A test run through the `execute` bridge.
    Func {
        /// The step.
        step: StepFn,
        /// Extra dependencies for the test environment.
        requirements: TestRequirements,
    },
    /// Tests the engine runs itself.
    Static(Vec<TestElement>),
}

impl Tests {
    /// A functional test without extra requirements.
    pub fn func<F, Fut>(f: F) -> Self
    where
        F: Fn(BuildContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Func {
            step: StepFn::new(f),
            requirements: TestRequirements::default(),
        }
    }

    /// The step function, if the test is functional.
    pub fn step_fn(&self) -> Option<&StepFn> {
        match self {
            Self::Func { step, .. } => Some(step),
            Self::Static(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_about_skips_unset_fields() {
        let about = About {
            homepage: Some("https://dprint.dev/".into()),
            license: Some("MIT".into()),
            license_file: vec!["LICENSE".into()],
            ..About::default()
        };
        assert_eq!(
            serde_json::to_value(&about).unwrap(),
            json!({"homepage": "https://dprint.dev/", "license": "MIT", "licenseFile": ["LICENSE"]})
        );
    }

    #[test]
    fn test_build_options_camel_case() {
        let options = BuildOptions {
            number: Some(1),
            dynamic_linking: Some(DynamicLinking {
                binary_relocation: Some(false),
                ..DynamicLinking::default()
            }),
            pre_link: Some("echo hi".into()),
            ..BuildOptions::default()
        };
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({"number": 1, "dynamicLinking": {"binaryRelocation": false}, "preLink": "echo hi"})
        );
    }

    #[test]
    fn test_test_elements() {
        let elements = vec![
            TestElement::script(["tool --version"]),
            TestElement::Python {
                python: PythonTest {
                    imports: vec!["tool".into()],
                    pip_check: None,
                },
            },
            TestElement::Downstream {
                downstream: "other".into(),
            },
            TestElement::PackageContents {
                package_contents: PackageContents {
                    bins: vec!["tool".into()],
                    ..PackageContents::default()
                },
            },
        ];
        assert_eq!(
            serde_json::to_value(&elements).unwrap(),
            json!([
                {"script": ["tool --version"]},
                {"python": {"imports": ["tool"]}},
                {"downstream": "other"},
                {"packageContents": {"bins": ["tool"]}},
            ])
        );
    }

    #[test]
    fn test_step_fn_detection() {
        assert!(Build::script(["make"]).step_fn().is_none());
        assert!(Build::func(|_ctx| async { Ok(()) }).step_fn().is_some());
        assert!(Tests::Static(vec![]).step_fn().is_none());
    }
}
