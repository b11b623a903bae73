//! Integration tests for bake scenarios.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use forge_core::engine::EngineRequest;
use forge_core::github::GithubClient;
use forge_core::sources::github::GithubReleaseFiles;
use forge_core::versions::StaticVersion;
use forge_core::{
    BakeOptions, Bakery, Build, BuildEngine, Recipe, Renderer, ResolvedVersion, Result, VariantStatus,
};
use forge_schema::Platform;

const SHA_LINUX: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const SHA_WIN: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

/// What the engine found in its staging directory.
#[derive(Debug, Default)]
struct Seen {
    yaml: String,
    staged: Vec<String>,
}

/// Records the staged recipe and writes an empty package.
#[derive(Default)]
struct RecordingEngine {
    seen: Mutex<Vec<Seen>>,
}

#[async_trait]
impl BuildEngine for RecordingEngine {
    async fn build(&self, request: &EngineRequest) -> Result<PathBuf> {
        let yaml = tokio::fs::read_to_string(&request.recipe).await?;
        let mut staged: Vec<String> = std::fs::read_dir(request.recipe.parent().unwrap())?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        staged.sort();
        self.seen.lock().unwrap().push(Seen { yaml, staged });

        let dir = request.output_dir.join(request.target_platform.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let pkg = dir.join("demo-1.2.3-h0_0.conda");
        tokio::fs::write(&pkg, b"pkg").await?;
        Ok(pkg)
    }
}

struct Scenario {
    server: mockito::ServerGuard,
    dir: TempDir,
}

impl Scenario {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("forge/demo")).unwrap();
        std::fs::write(dir.path().join("forge/demo/LICENSE"), "MIT").unwrap();
        std::fs::write(dir.path().join("forge-bin"), "#!/bin/sh").unwrap();
        Self {
            server: mockito::Server::new_async().await,
            dir,
        }
    }

    fn recipe(&self) -> Recipe {
        let platforms: [Platform; 2] = ["linux-64".parse().unwrap(), "win-64".parse().unwrap()];
        let github = GithubClient::new(reqwest::Client::new(), None);
        let sources = GithubReleaseFiles::new(github, "acme", "demo", &platforms, "checksums.txt")
            .file(|ctx| format!("demo_{}_{}.tar.gz", ctx.os().as_str(), ctx.arch().as_str()))
            .with_download_base(self.server.url());
        Recipe::builder("demo")
            .version(StaticVersion(ResolvedVersion::new("1.2.3")))
            .sources(sources)
            .build(Build::func(|_ctx| async { Ok(()) }))
            .finish()
            .unwrap()
    }

    fn bakery(&self, engine: Arc<RecordingEngine>, platforms: &[&str]) -> Bakery {
        let opts = BakeOptions {
            platforms: platforms.iter().map(|p| p.parse().unwrap()).collect(),
            output_dir: Some(self.path("out")),
            ..BakeOptions::default()
        };
        Bakery::new(opts, Renderer::new(), engine).with_bundle_exe(self.path("forge-bin"))
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }
}

fn checksums() -> String {
    format!("{SHA_LINUX}  demo_linux_64.tar.gz\n{SHA_WIN}  demo_win_64.tar.gz\n")
}

#[tokio::test]
async fn test_bake_renders_stages_and_copies() {
    let mut scenario = Scenario::new().await;
    let list = scenario
        .server
        .mock("GET", "/acme/demo/releases/download/v1.2.3/checksums.txt")
        .with_body(checksums())
        .expect(1)
        .create_async()
        .await;

    let engine = Arc::new(RecordingEngine::default());
    let bakery = scenario.bakery(engine.clone(), &["linux-64"]);
    let results = bakery
        .bake_recipe(&scenario.recipe(), &scenario.path("forge/demo"))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let expected = scenario.path("out/linux-64/demo-1.2.3-h0_0.conda");
    assert_eq!(results[0].id, "demo/linux-64@1.2.3");
    assert_eq!(
        results[0].status,
        VariantStatus::Built {
            copied_to: Some(expected.clone())
        }
    );
    assert_eq!(std::fs::read(expected).unwrap(), b"pkg");
    list.assert_async().await;

    let seen = engine.seen.lock().unwrap();
    let yaml = &seen[0].yaml;
    assert!(yaml.contains(SHA_LINUX));
    assert!(!yaml.contains(SHA_WIN));
    assert!(yaml.contains(&format!(
        "{}/acme/demo/releases/download/v1.2.3/demo_linux_64.tar.gz",
        scenario.server.url()
    )));
    assert!(yaml.contains("execute --build"));

    let host = Platform::current();
    let mut expected_files = vec![
        "LICENSE".to_string(),
        host.exe("bundled-recipe"),
        "bundled-recipe.name".to_string(),
        "recipe.yaml".to_string(),
    ];
    expected_files.sort();
    assert_eq!(seen[0].staged, expected_files);
}

#[tokio::test]
async fn test_unsupported_platform_is_reported_not_built() {
    let scenario = Scenario::new().await;
    let engine = Arc::new(RecordingEngine::default());
    let bakery = scenario.bakery(engine.clone(), &["osx-arm64"]);
    let results = bakery
        .bake_recipe(&scenario.recipe(), &scenario.path("forge/demo"))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, VariantStatus::Unsupported);
    assert!(engine.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_checksum_fails_only_that_variant() {
    let mut scenario = Scenario::new().await;
    let _list = scenario
        .server
        .mock("GET", "/acme/demo/releases/download/v1.2.3/checksums.txt")
        .with_body(format!("{SHA_WIN}  demo_win_64.tar.gz\n"))
        .create_async()
        .await;

    let engine = Arc::new(RecordingEngine::default());
    let bakery = scenario.bakery(engine.clone(), &["linux-64", "win-64"]);
    let results = bakery
        .bake_recipe(&scenario.recipe(), &scenario.path("forge/demo"))
        .await
        .unwrap();

    let by_id = |id: &str| results.iter().find(|r| r.id == id).unwrap();
    assert!(by_id("demo/linux-64@1.2.3").failed());
    assert!(matches!(by_id("demo/win-64@1.2.3").status, VariantStatus::Built { .. }));
    assert_eq!(engine.seen.lock().unwrap().len(), 1);
}
