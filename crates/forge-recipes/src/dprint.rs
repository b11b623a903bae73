//! dprint, the pluggable code formatter.

use futures::FutureExt;
use futures::future::BoxFuture;

use forge_core::recipe::{About, Build, TestElement, Tests};
use forge_core::sources::DslCtx;
use forge_core::sources::github::GithubReleaseFiles;
use forge_core::versions::LatestGithubTag;
use forge_core::{LoadContext, Recipe, RecipeModule, Result};
use forge_schema::{COMMON_64_PLATFORMS, Platform, PlatformArch, PlatformOs};

use crate::common::install_binary;

const OWNER: &str = "dprint";
const REPO: &str = "dprint";

pub(crate) const MODULE: RecipeModule = RecipeModule {
    name: "dprint",
    dir: "github.com/dprint/dprint",
    load,
};

fn platforms() -> Vec<Platform> {
    let mut platforms = vec![
        Platform::new(PlatformOs::Osx, PlatformArch::Arm64),
        Platform::new(PlatformOs::Linux, PlatformArch::Aarch64),
    ];
    platforms.extend(COMMON_64_PLATFORMS);
    platforms
}

/// Rust target triple style, e.g. `dprint-aarch64-apple-darwin.zip`.
fn file_name(ctx: &DslCtx) -> String {
    let arch = match ctx.arch() {
        PlatformArch::X64 => "x86_64",
        PlatformArch::Arm64 | PlatformArch::Aarch64 => "aarch64",
        other => other.as_str(),
    };
    let os = match ctx.os() {
        PlatformOs::Osx => "apple-darwin",
        PlatformOs::Win => "pc-windows-msvc",
        PlatformOs::Linux => "unknown-linux-gnu",
        other => other.as_str(),
    };
    format!("dprint-{arch}-{os}.zip")
}

fn load(ctx: LoadContext) -> BoxFuture<'static, Result<Recipe>> {
    async move {
        let platforms = platforms();
        Recipe::builder("dprint")
            .about(About {
                homepage: Some("https://dprint.dev/".into()),
                repository: Some(format!("https://github.com/{OWNER}/{REPO}")),
                summary: Some("Pluggable and configurable code formatting platform written in Rust.".into()),
                license: Some("MIT".into()),
                ..About::default()
            })
            .platform_list(&platforms)
            .version(LatestGithubTag::new(ctx.github.clone(), OWNER, REPO))
            .sources(
                GithubReleaseFiles::new(ctx.github, OWNER, REPO, &platforms, "SHASUMS256.txt")
                    .v_prefix("")
                    .file(file_name),
            )
            .build(Build::func(|ctx| async move {
                install_binary(&ctx, "dprint*", "dprint").await?;
                Ok(())
            }))
            .tests(Tests::Static(vec![TestElement::script(["dprint --version"])]))
            .finish()
    }
    .boxed()
}
