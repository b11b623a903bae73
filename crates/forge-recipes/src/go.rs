//! The Go toolchain, from the go.dev download index.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use forge_core::activation::Activation;
use forge_core::files::{chmod_exec, move_glob};
use forge_core::recipe::{About, Build, Tests};
use forge_core::sources::{ResolvedSources, Source, SourcesFn};
use forge_core::versions::{ResolvedVersion, VersionFn};
use forge_core::{LoadContext, Recipe, RecipeModule, Result};
use forge_schema::Platform;

use crate::common::{expect_version, prebuilt, readme, run};

const DOWNLOADS_URL: &str = "https://go.dev/dl/?mode=json";

pub(crate) const MODULE: RecipeModule = RecipeModule {
    name: "go",
    dir: "go.dev/go",
    load,
};

#[derive(Debug, Clone, Deserialize)]
struct GoRelease {
    version: String,
    files: Vec<GoFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct GoFile {
    filename: String,
    os: String,
    arch: String,
    sha256: String,
    kind: String,
}

/// The download index, fetched at most once per process.
#[derive(Debug, Clone)]
struct GoDownloads {
    http: Client,
    url: String,
    releases: Arc<OnceCell<Vec<GoRelease>>>,
}

impl GoDownloads {
    fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            releases: Arc::new(OnceCell::new()),
        }
    }

    async fn releases(&self) -> Result<&[GoRelease]> {
        let releases = self
            .releases
            .get_or_try_init(|| async {
                debug!(url = %self.url, "fetching go downloads");
                let resp = self.http.get(&self.url).send().await?.error_for_status()?;
                resp.json::<Vec<GoRelease>>().await
            })
            .await?;
        Ok(releases)
    }

    /// Newest first, as go.dev lists them.
    async fn versions(&self) -> Result<Vec<ResolvedVersion>> {
        Ok(self
            .releases()
            .await?
            .iter()
            .map(|r| ResolvedVersion::new(&r.version))
            .collect())
    }

    /// One archive per platform for the release tagged `raw`.
    async fn sources(&self, raw: &str) -> Result<ResolvedSources> {
        let mut map = BTreeMap::new();
        let archives = self
            .releases()
            .await?
            .iter()
            .find(|r| r.version == raw)
            .map(|r| r.files.iter().filter(|f| f.kind == "archive"))
            .into_iter()
            .flatten();
        for file in archives {
            let Some(platform) = platform_of(&file.os, &file.arch) else {
                continue;
            };
            let source = Source::url_sha256(format!("https://go.dev/dl/{}", file.filename), &file.sha256)?;
            map.insert(platform, vec![source.in_directory("go")]);
        }
        Ok(ResolvedSources::PerPlatform(map))
    }
}

/// Maps GOOS/GOARCH onto a conda platform. Unknown pairs are skipped.
fn platform_of(goos: &str, goarch: &str) -> Option<Platform> {
    let os = match goos {
        "darwin" => "osx",
        "windows" => "win",
        other => other,
    };
    let arch = match goarch {
        "386" => "32",
        "amd64" => "64",
        "arm64" if goos == "linux" => "aarch64",
        other => other,
    };
    format!("{os}-{arch}").parse().ok()
}

fn load(ctx: LoadContext) -> BoxFuture<'static, Result<Recipe>> {
    async move {
        let downloads = GoDownloads::new(ctx.http.clone(), DOWNLOADS_URL);
        let description = readme(
            &ctx.http,
            "https://raw.githubusercontent.com/golang/go/refs/heads/master/README.md",
        )
        .await;

        let for_versions = downloads.clone();
        Recipe::builder("go")
            .about(About {
                homepage: Some("https://go.dev/".into()),
                repository: Some("https://github.com/golang/go".into()),
                summary: Some("Build simple, secure, scalable systems with Go".into()),
                description,
                license: Some("BSD-3-Clause".into()),
                ..About::default()
            })
            .version(VersionFn::new(move || {
                let downloads = for_versions.clone();
                async move { downloads.versions().await }
            }))
            .sources(SourcesFn::new(move |version| {
                let downloads = downloads.clone();
                async move { downloads.sources(&version.raw).await }
            }))
            .build(Build::func(build).with_options(prebuilt(1)))
            .tests(Tests::func(|ctx| async move {
                expect_version(&run("go", &["version"]).await?, &ctx.pkg_version)
            }))
            .finish()
    }
    .boxed()
}

async fn build(ctx: forge_core::BuildContext) -> anyhow::Result<()> {
    let goroot = ctx.prefix.join("go");
    let pattern = ctx.src_dir.join("go").join("**").join("*");
    let moved = move_glob(&pattern.to_string_lossy(), &format!("{}/", goroot.display())).await?;
    if ctx.unix() {
        let bin = goroot.join("bin");
        for path in moved.iter().filter(|p| p.starts_with(&bin)) {
            chmod_exec(path).await?;
        }
    }

    let activation = Activation::from(&ctx);
    let vars = BTreeMap::from([
        ("GOROOT".to_string(), "$CONDA_PREFIX/go".to_string()),
        ("GOBIN".to_string(), "$CONDA_PREFIX/go/bin".to_string()),
        ("GOMODCACHE".to_string(), "$CONDA_PREFIX/var/cache/go/pkg/mod".to_string()),
    ]);
    activation.add_env_vars(&vars).await?;
    activation.prepend_to_path(&["$CONDA_PREFIX/go/bin"]).await?;
    Ok(())
}
