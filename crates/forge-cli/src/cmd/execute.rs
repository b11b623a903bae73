//! The `execute` verb: one functional step, run by the build engine.

use anyhow::{Context, Result};

use forge_core::bridge::{self, ExecuteArgs};
use forge_core::{ForgeConfig, LoadContext};

/// Finds the recipe this binary was staged for and runs the requested step.
pub async fn execute(args: &ExecuteArgs, config: ForgeConfig) -> Result<()> {
    let exe = std::env::current_exe().ok();
    let name = bridge::recipe_name(|key| std::env::var(key).ok(), exe.as_deref())
        .context("cannot tell which recipe to run: set FORGE_RECIPE")?;
    let ctx = LoadContext::new(config)?;
    let recipe = super::load_recipe(&ctx, &name).await?;
    bridge::execute(&recipe, args)
        .await
        .with_context(|| format!("{name}: {} step failed", args.step()))
}
