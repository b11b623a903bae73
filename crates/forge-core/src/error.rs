//! Error taxonomy for the recipe pipeline.

use std::fmt;

use forge_schema::{DigestAlgorithm, SchemaError};
use serde::Serialize;
use thiserror::Error;

/// One failed check in a recipe definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Dotted field path, e.g. `about.homepage` or `platforms[1]`.
    pub path: String,
    /// Human description of the accepted shape.
    pub expected: String,
    /// The offending value, rendered as JSON.
    pub actual: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, got {}", self.path, self.expected, self.actual)
    }
}

/// One error reported by the engine's JSON Schema, kept as the validator produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    /// JSON pointer into the rendered document.
    pub instance_path: String,
    /// JSON pointer into the schema.
    pub schema_path: String,
    /// Validator message.
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.instance_path, self.schema_path, self.message)
    }
}

/// Which functional step an execution asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// `execute --build`
    Build,
    /// `execute --test`
    Test,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Build => "build",
            Self::Test => "test",
        })
    }
}

/// Errors raised by forge-core.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Platform, digest or checksum-list failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The recipe definition failed validation. Every violation is listed.
    #[error("recipe validation failed:\n{}", join_lines(.0))]
    RecipeValidation(Vec<Violation>),

    /// The rendered document does not satisfy the engine's JSON Schema.
    #[error("rendered recipe does not match the engine schema:\n{}", join_lines(.0))]
    SchemaValidation(Vec<SchemaViolation>),

    /// An `execute` invocation asked for a step the recipe has no function for.
    #[error("recipe has no {0} function")]
    MissingStepFunction(StepKind),

    /// The build engine exited unsuccessfully.
    #[error("build engine failed with exit code {}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    ExternalEngine {
        /// Process exit code, if the process was not killed by a signal.
        code: Option<i32>,
    },

    /// The build engine exited successfully but produced no package.
    #[error("no package found in {0}")]
    ArtifactNotFound(String),

    /// Registry HTTP or GraphQL failure.
    #[error("registry error: {0}")]
    Registry(String),

    /// GitHub API failure.
    #[error("github error: {0}")]
    Github(String),

    /// A version string has no numeric component to coerce.
    #[error("cannot coerce '{0}' into a semantic version")]
    VersionCoercion(String),

    /// A version source listed no candidates.
    #[error("version source returned no versions")]
    NoVersions,

    /// No recipe is registered under this name.
    #[error("unknown recipe '{0}'")]
    UnknownRecipe(String),

    /// A deferred digest reached the renderer without being settled.
    #[error("digest for source '{0}' was never resolved")]
    UnresolvedDigest(String),

    /// A URL source carries a digest the engine cannot check.
    #[error("source '{url}' has a {algorithm} digest; url sources take sha256 or md5")]
    UnsupportedDigest {
        /// Source URL.
        url: String,
        /// The offending algorithm.
        algorithm: DigestAlgorithm,
    },

    /// A required environment variable is not set.
    #[error("{0} not set")]
    MissingEnv(&'static str),

    /// A glob pattern matched nothing.
    #[error("no file matches '{0}'")]
    NoGlobMatch(String),

    /// Invalid glob pattern.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// HTTP transport failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML encoding failure.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Failure inside an author-supplied step or resolver.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result alias for forge-core.
pub type Result<T> = std::result::Result<T, ForgeError>;

fn join_lines<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<fs_extra::error::Error> for ForgeError {
    fn from(e: fs_extra::error::Error) -> Self {
        Self::Io(std::io::Error::other(e.to_string()))
    }
}

impl From<zip::result::ZipError> for ForgeError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Io(std::io::Error::other(e.to_string()))
    }
}
