//! Recipe model, renderer, execute bridge and bakery for forge.
//!
//! A recipe describes how to fetch, build and test one upstream project. The
//! [`Renderer`] turns it into the document the external build engine reads,
//! the [`bakery::Bakery`] drives that engine per (version, platform) variant,
//! and the [`bridge`] runs functional build and test steps when the engine
//! calls back into the staged binary.

pub mod activation;
pub mod archive;
pub mod auth;
pub mod bakery;
pub mod bridge;
pub mod checksum;
pub mod config;
pub mod engine;
pub mod error;
pub mod files;
pub mod github;
pub mod recipe;
pub mod registry;
pub mod render;
pub mod sources;
pub mod versions;

pub use activation::Activation;
pub use bakery::{BakeOptions, Bakery, VariantResult, VariantStatus};
pub use bridge::{BuildContext, ExecuteArgs, Mode};
pub use config::ForgeConfig;
pub use engine::{BuildEngine, RattlerBuild};
pub use error::{ForgeError, Result};
pub use recipe::{Build, LoadContext, Recipe, RecipeModule, Tests};
pub use registry::{PrefixClient, Registry};
pub use render::{RenderOptions, RenderedDocument, Renderer};
pub use sources::{ResolvedSources, Source, SourceResolver};
pub use versions::{ResolvedVersion, VersionSource};

/// User Agent string for outbound HTTP requests
pub const USER_AGENT: &str = concat!("forge-core/", env!("CARGO_PKG_VERSION"));

/// Builds the shared HTTP client used by sources, checksums and the registry.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}
