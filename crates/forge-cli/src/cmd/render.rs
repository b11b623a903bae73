//! `forge render` and `forge platforms`

use anyhow::Result;

use forge_core::render::render_variant;
use forge_core::{ForgeConfig, LoadContext, RenderOptions};
use forge_schema::Platform;

use super::{load_recipe, pick_version, renderer};

/// Renders one recipe and prints the YAML the engine would get.
///
/// Without a platform the multi-platform document is printed.
pub async fn render(
    name: &str,
    version: Option<&str>,
    platform: Option<Platform>,
    skip_schema: bool,
    config: &ForgeConfig,
) -> Result<()> {
    let ctx = LoadContext::new(config.clone())?;
    let recipe = load_recipe(&ctx, name).await?;
    let version = pick_version(&recipe, version).await?;
    let renderer = renderer(&ctx, config, skip_schema).await?;
    let opts = RenderOptions {
        target_platform: platform,
        build_platform: None,
        bridge_requirement: config.bridge_requirement.clone(),
    };
    let doc = render_variant(&renderer, &recipe, &version, &opts).await?;
    print!("{}", doc.to_yaml()?);
    Ok(())
}

/// Prints the platforms `name` can be built for.
pub async fn platforms(name: &str, version: Option<&str>, config: &ForgeConfig) -> Result<()> {
    let ctx = LoadContext::new(config.clone())?;
    let recipe = load_recipe(&ctx, name).await?;
    let version = pick_version(&recipe, version).await?;
    let platforms = recipe.platforms_with(&recipe.sources_for(&version).await?);
    println!("  {} {}", recipe.name(), version);
    if platforms.is_empty() {
        println!("    any (no platform restriction)");
    }
    for platform in platforms {
        println!("    {platform}");
    }
    Ok(())
}
