//! The recipes published by forge.
//!
//! Each module registers one [`RecipeModule`]. [`all`] is the registry the
//! CLI and the `execute` bridge look recipes up in.

mod common;
mod dprint;
mod go;
mod nircmd;
mod oras;
mod task;

use forge_core::RecipeModule;

static RECIPES: [RecipeModule; 5] = [go::MODULE, nircmd::MODULE, oras::MODULE, task::MODULE, dprint::MODULE];

/// Every registered recipe.
pub fn all() -> &'static [RecipeModule] {
    &RECIPES
}

/// Looks a recipe up by package name.
pub fn find(name: &str) -> forge_core::Result<&'static RecipeModule> {
    forge_core::recipe::find_module(all(), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::ForgeError;
    use std::collections::HashSet;

    #[test]
    fn test_names_and_dirs_are_unique() {
        let names: HashSet<_> = all().iter().map(|m| m.name).collect();
        let dirs: HashSet<_> = all().iter().map(|m| m.dir).collect();
        assert_eq!(names.len(), all().len());
        assert_eq!(dirs.len(), all().len());
    }

    #[test]
    fn test_dir_ends_with_name() {
        for module in all() {
            assert!(module.dir.ends_with(module.name), "{} lives in {}", module.name, module.dir);
        }
    }

    #[test]
    fn test_find() {
        assert_eq!(find("oras").unwrap().dir, "github.com/oras-project/oras");
        assert!(matches!(find("nope"), Err(ForgeError::UnknownRecipe(_))));
    }

    #[tokio::test]
    async fn test_offline_recipes_load() {
        // these touch no network until versions or sources are asked for
        let ctx = forge_core::LoadContext::new(forge_core::ForgeConfig::from_lookup(|_| None)).unwrap();
        for name in ["task", "dprint", "nircmd"] {
            let recipe = (find(name).unwrap().load)(ctx.clone()).await.unwrap();
            assert_eq!(recipe.name(), name);
            assert!(recipe.has_functional_steps());
        }
    }
}
