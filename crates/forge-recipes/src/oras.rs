//! oras, the OCI registry client.

use std::sync::LazyLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;

use forge_core::recipe::{About, Build, Tests};
use forge_core::sources::GithubReleaseAssets;
use forge_core::versions::LatestGithubTag;
use forge_core::{LoadContext, Recipe, RecipeModule, Result};
use forge_schema::{PlatformArch, PlatformOs};

use crate::common::{expect_version, install_binary, prebuilt, readme, run};

const OWNER: &str = "oras-project";
const REPO: &str = "oras";

static ARCHIVES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.(tar\.gz|zip)$").expect("valid regex"));

pub(crate) const MODULE: RecipeModule = RecipeModule {
    name: "oras",
    dir: "github.com/oras-project/oras",
    load,
};

fn load(ctx: LoadContext) -> BoxFuture<'static, Result<Recipe>> {
    async move {
        let description = readme(
            &ctx.http,
            "https://raw.githubusercontent.com/oras-project/oras/refs/heads/main/README.md",
        )
        .await;

        Recipe::builder("oras")
            .about(About {
                homepage: Some("https://oras.land".into()),
                repository: Some(format!("https://github.com/{OWNER}/{REPO}")),
                summary: Some("OCI registry client - managing content like artifacts, images, packages".into()),
                description,
                license: Some("Apache-2.0".into()),
                ..About::default()
            })
            .version(LatestGithubTag::new(ctx.github.clone(), OWNER, REPO))
            .sources(release_assets(ctx))
            .build(
                Build::func(|ctx| async move {
                    // archives unpack flat: oras, LICENSE
                    install_binary(&ctx, "oras*", "oras").await?;
                    Ok(())
                })
                .with_options(prebuilt(1)),
            )
            .tests(Tests::func(|ctx| async move {
                expect_version(&run("oras", &["version"]).await?, &ctx.pkg_version)
            }))
            .finish()
    }
    .boxed()
}

fn release_assets(ctx: LoadContext) -> GithubReleaseAssets {
    GithubReleaseAssets::new(ctx.github, OWNER, REPO)
        .map_os(PlatformOs::Osx, "darwin")
        .map_os(PlatformOs::Win, "windows")
        .map_arch(PlatformArch::X64, "amd64")
        .map_arch(PlatformArch::Aarch64, "arm64")
        .asset_filter(ARCHIVES.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_filter() {
        assert!(ARCHIVES.is_match("oras_1.2.0_linux_amd64.tar.gz"));
        assert!(ARCHIVES.is_match("oras_1.2.0_windows_amd64.zip"));
        assert!(!ARCHIVES.is_match("oras_1.2.0_checksums.txt"));
        assert!(!ARCHIVES.is_match("oras_1.2.0_linux_amd64.tar.gz.sig"));
    }
}
