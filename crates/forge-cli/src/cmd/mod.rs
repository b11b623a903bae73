//! Subcommand implementations.

pub mod bake;
pub mod delete;
pub mod execute;
pub mod render;

use std::sync::Arc;

use anyhow::{Context, Result};

use forge_core::render::schema::RecipeSchema;
use forge_core::{ForgeConfig, LoadContext, Recipe, Renderer, ResolvedVersion};

/// Loads a registered recipe by name.
pub async fn load_recipe(ctx: &LoadContext, name: &str) -> Result<Recipe> {
    let module = forge_recipes::find(name)?;
    (module.load)(ctx.clone())
        .await
        .with_context(|| format!("loading recipe {name}"))
}

/// The requested version if one was given (matched against the known
/// candidates when possible), the latest otherwise.
pub async fn pick_version(recipe: &Recipe, requested: Option<&str>) -> Result<ResolvedVersion> {
    let Some(requested) = requested else {
        return Ok(recipe.version().await?);
    };
    let candidates = recipe.candidate_versions().await?;
    Ok(candidates
        .into_iter()
        .find(|v| v.matches(requested))
        .unwrap_or_else(|| ResolvedVersion::new(requested)))
}

/// A renderer, validating against the engine schema unless `skip_schema`.
pub async fn renderer(ctx: &LoadContext, config: &ForgeConfig, skip_schema: bool) -> Result<Renderer> {
    if skip_schema {
        return Ok(Renderer::new());
    }
    let schema = RecipeSchema::load(&ctx.http, &config.schema_url, &config.schema_cache)
        .await
        .context("loading the recipe schema (use --skip-schema to render offline)")?;
    Ok(Renderer::with_schema(Arc::new(schema)))
}

/// Prints the registered recipes.
pub fn list() {
    for module in forge_recipes::all() {
        println!("  {:<10} {}", module.name, module.dir);
    }
}
