//! `forge bake`

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tracing::{error, info};

use forge_core::{
    BakeOptions, Bakery, ForgeConfig, LoadContext, PrefixClient, RattlerBuild, VariantResult, VariantStatus,
};

use crate::BakeArgs;

/// Bakes the selected recipes and prints a summary. Fails if any variant failed.
pub async fn bake(args: BakeArgs, config: &ForgeConfig) -> Result<()> {
    let start_time = Instant::now();
    let ctx = LoadContext::new(config.clone())?;
    let debug = args.debug || config.debug;

    let modules = if args.recipes.is_empty() {
        forge_recipes::all().iter().collect::<Vec<_>>()
    } else {
        args.recipes
            .iter()
            .map(|name| forge_recipes::find(name))
            .collect::<forge_core::Result<Vec<_>>>()?
    };
    println!("  baking {} recipes from {}", modules.len(), args.forge_dir.display());

    let opts = BakeOptions {
        versions: args.versions,
        platforms: args.platforms,
        exclude: args.exclude,
        output_dir: args.output_dir,
        publish: args.publish,
        debug,
        channel: config.registry.channel.clone(),
        bridge_requirement: config.bridge_requirement.clone(),
        github_actions: config.github_actions,
        ..BakeOptions::default()
    };
    let renderer = super::renderer(&ctx, config, args.skip_schema).await?;
    let mut bakery = Bakery::new(opts, renderer, Arc::new(RattlerBuild::new(&config.engine)));
    if args.publish {
        bakery = bakery.with_registry(Arc::new(PrefixClient::new(ctx.http.clone(), &config.registry)?));
    }

    let mut results = Vec::new();
    for module in modules {
        let recipe_dir = args.forge_dir.join(module.dir);
        let started = Instant::now();
        let outcome = match (module.load)(ctx.clone()).await {
            Ok(recipe) => bakery.bake_recipe(&recipe, &recipe_dir).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(variants) => results.extend(variants),
            Err(e) if debug => return Err(e.into()),
            Err(e) => {
                error!(recipe = module.name, "{e}");
                results.push(VariantResult {
                    id: module.name.to_string(),
                    status: VariantStatus::Failed(e.to_string()),
                    duration: started.elapsed(),
                });
            }
        }
    }

    let summary = Summary::of(&results);
    summary.print(&results, start_time.elapsed());
    if summary.failed > 0 {
        bail!("{} variants failed", summary.failed);
    }
    info!("bake finished");
    Ok(())
}

/// Counts per outcome.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    built: usize,
    published: usize,
    skipped: usize,
    failed: usize,
}

impl Summary {
    fn of(results: &[VariantResult]) -> Self {
        let mut s = Self::default();
        for r in results {
            match r.status {
                VariantStatus::Built { .. } => s.built += 1,
                VariantStatus::Published { .. } => s.published += 1,
                VariantStatus::AlreadyPublished | VariantStatus::Unsupported => s.skipped += 1,
                VariantStatus::Failed(_) => s.failed += 1,
            }
        }
        s
    }

    fn print(&self, results: &[VariantResult], total: Duration) {
        println!();
        println!("  summary");
        for r in results {
            let secs = r.duration.as_secs_f64();
            match &r.status {
                VariantStatus::Built { copied_to: Some(path) } => {
                    println!("    built {} -> {} ({secs:.1}s)", r.id, path.display());
                }
                VariantStatus::Built { copied_to: None } => println!("    built {} ({secs:.1}s)", r.id),
                VariantStatus::Published { file_name } => {
                    println!("    published {} as {file_name} ({secs:.1}s)", r.id);
                }
                VariantStatus::AlreadyPublished => println!("    skipped {} (already published)", r.id),
                VariantStatus::Unsupported => println!("    skipped {} (unsupported)", r.id),
                VariantStatus::Failed(e) => println!("    failed {}: {e}", r.id),
            }
        }
        println!();
        println!(
            "  {} built, {} published, {} skipped, {} failed in {:.1}s",
            self.built,
            self.published,
            self.skipped,
            self.failed,
            total.as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: VariantStatus) -> VariantResult {
        VariantResult {
            id: "demo/linux-64@1.0.0".into(),
            status,
            duration: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            result(VariantStatus::Built { copied_to: None }),
            result(VariantStatus::Published {
                file_name: "demo-1.0.0-h0_0.conda".into(),
            }),
            result(VariantStatus::AlreadyPublished),
            result(VariantStatus::Unsupported),
            result(VariantStatus::Failed("boom".into())),
        ];
        assert_eq!(
            Summary::of(&results),
            Summary {
                built: 1,
                published: 1,
                skipped: 2,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_recipe_fails_before_baking() {
        let dir = tempfile::tempdir().unwrap();
        let args = BakeArgs {
            forge_dir: dir.path().to_path_buf(),
            recipes: vec!["does-not-exist".into()],
            versions: Vec::new(),
            platforms: Vec::new(),
            exclude: Vec::new(),
            output_dir: None,
            publish: false,
            debug: false,
            skip_schema: true,
        };
        let err = bake(args, &ForgeConfig::from_lookup(|_| None)).await.unwrap_err();
        assert!(err.to_string().contains("does-not-exist"));
    }
}
