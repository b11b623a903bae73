//! Task, the Make alternative written in Go.

use futures::FutureExt;
use futures::future::BoxFuture;

use forge_core::recipe::{About, Build, PackageContents, TestElement, Tests};
use forge_core::sources::DslCtx;
use forge_core::sources::github::GithubReleaseFiles;
use forge_core::versions::LatestGithubTag;
use forge_core::{LoadContext, Recipe, RecipeModule, Result};
use forge_schema::{COMMON_64_PLATFORMS, COMMON_ARM64_PLATFORMS, Platform, PlatformArch, PlatformOs};

use crate::common::install_binary;

const OWNER: &str = "go-task";
const REPO: &str = "task";

pub(crate) const MODULE: RecipeModule = RecipeModule {
    name: "task",
    dir: "github.com/go-task/task",
    load,
};

fn platforms() -> Vec<Platform> {
    let mut platforms = vec![
        Platform::new(PlatformOs::Win, PlatformArch::X32),
        Platform::new(PlatformOs::Linux, PlatformArch::X32),
    ];
    platforms.extend(COMMON_64_PLATFORMS);
    platforms.extend(&COMMON_ARM64_PLATFORMS[..2]);
    platforms
}

/// Release asset name, e.g. `task_darwin_arm64.tar.gz`.
fn file_name(ctx: &DslCtx) -> String {
    let os = match ctx.os() {
        PlatformOs::Osx => "darwin",
        PlatformOs::Win => "windows",
        other => other.as_str(),
    };
    let arch = match ctx.arch() {
        PlatformArch::X32 => "386",
        PlatformArch::X64 => "amd64",
        PlatformArch::Aarch64 | PlatformArch::Arm64 => "arm64",
        other => other.as_str(),
    };
    let ext = if ctx.unix() { "tar.gz" } else { "zip" };
    format!("task_{os}_{arch}.{ext}")
}

fn load(ctx: LoadContext) -> BoxFuture<'static, Result<Recipe>> {
    async move {
        let platforms = platforms();
        Recipe::builder("task")
            .about(About {
                homepage: Some("https://taskfile.dev/".into()),
                repository: Some(format!("https://github.com/{OWNER}/{REPO}")),
                summary: Some("A task runner / simpler Make alternative written in Go.".into()),
                license: Some("MIT".into()),
                ..About::default()
            })
            .platform_list(&platforms)
            .version(LatestGithubTag::new(ctx.github.clone(), OWNER, REPO))
            .sources(
                GithubReleaseFiles::new(ctx.github, OWNER, REPO, &platforms, "task_checksums.txt").file(file_name),
            )
            .build(Build::func(|ctx| async move {
                install_binary(&ctx, "task*", "task").await?;
                Ok(())
            }))
            .tests(Tests::Static(vec![
                TestElement::script(["task --version"]),
                TestElement::PackageContents {
                    package_contents: PackageContents {
                        bins: vec!["task".into()],
                        ..PackageContents::default()
                    },
                },
            ]))
            .finish()
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::ResolvedVersion;

    fn name_for(platform: &str) -> String {
        file_name(&DslCtx::new(ResolvedVersion::new("v3.38.0"), platform.parse().unwrap()))
    }

    #[test]
    fn test_file_names() {
        assert_eq!(name_for("linux-64"), "task_linux_amd64.tar.gz");
        assert_eq!(name_for("linux-32"), "task_linux_386.tar.gz");
        assert_eq!(name_for("linux-aarch64"), "task_linux_arm64.tar.gz");
        assert_eq!(name_for("osx-arm64"), "task_darwin_arm64.tar.gz");
        assert_eq!(name_for("win-32"), "task_windows_386.zip");
    }

    #[test]
    fn test_platforms() {
        let names: Vec<String> = platforms().iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            ["win-32", "linux-32", "linux-64", "osx-64", "win-64", "linux-aarch64", "osx-arm64"]
        );
    }
}
