//! forge - bakes conda packages from Rust recipes
//!
//! The binary has two modes. Normally it parses [`Cli`] and renders, bakes or
//! publishes recipes. When the first argument is `execute` it is a staged copy
//! of itself, started by the build engine to run one functional step; see
//! [`forge_core::bridge`].
//!
//! # Layout
//!
//! ```text
//! forge/
//! └── github.com/oras-project/oras/   # recipe dir: extra files copied into staging
//! ```

pub mod cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use forge_schema::Platform;

/// Command line of the `forge` binary.
#[derive(Debug, Parser)]
#[command(name = "forge")]
#[command(author, version, about = "forge - bakes conda packages from Rust recipes")]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build (and optionally publish) recipes
    Bake(BakeArgs),
    /// Print the rendered recipe.yaml of one recipe
    Render {
        /// Recipe name
        recipe: String,
        /// Version to render (raw or semver). Defaults to the latest
        #[arg(long)]
        version: Option<String>,
        /// Render for one platform only
        #[arg(long)]
        platform: Option<Platform>,
        /// Do not validate against the engine's recipe schema
        #[arg(long)]
        skip_schema: bool,
    },
    /// List the platforms a recipe supports
    Platforms {
        /// Recipe name
        recipe: String,
        /// Version to inspect. Defaults to the latest
        #[arg(long)]
        version: Option<String>,
    },
    /// Remove a package file from the registry
    Delete {
        /// Platform subdirectory the file lives in
        #[arg(long)]
        platform: Platform,
        /// Package file name, e.g. `oras-1.2.0-h0_1.conda`
        filename: String,
        /// Channel. Defaults to `PREFIX_DEV_CHANNEL`
        #[arg(long)]
        channel: Option<String>,
    },
    /// List registered recipes
    List,
}

/// Arguments of `forge bake`.
#[derive(Debug, Clone, clap::Args)]
pub struct BakeArgs {
    /// Root holding the recipe directories
    #[arg(long, default_value = "forge")]
    pub forge_dir: PathBuf,

    /// Only bake these recipes (repeatable). Defaults to all
    #[arg(long = "recipe", short = 'r')]
    pub recipes: Vec<String>,

    /// Versions to bake (repeatable). Defaults to the newest two
    #[arg(long = "version", short = 'v')]
    pub versions: Vec<String>,

    /// Platforms to bake (repeatable). Defaults to every supported one
    #[arg(long = "platform", short = 'p')]
    pub platforms: Vec<Platform>,

    /// Platforms never to bake (repeatable)
    #[arg(long = "exclude-platform")]
    pub exclude: Vec<Platform>,

    /// Copy packages to `<dir>/<platform>/`
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Upload packages, skipping variants already published
    #[arg(long)]
    pub publish: bool,

    /// Keep staging dirs and stop at the first failure (also `BAKERY_DEBUG`)
    #[arg(long)]
    pub debug: bool,

    /// Do not validate rendered recipes against the engine's schema
    #[arg(long)]
    pub skip_schema: bool,
}
