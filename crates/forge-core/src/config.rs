//! Process configuration gathered from environment variables.
//!
//! The CLI loads `.env` first, then calls [`ForgeConfig::from_env`] once and
//! hands the result to every component. Library code never reads these
//! variables on its own.

use std::path::PathBuf;

use crate::auth::AuthTokens;

/// Published JSON Schema of the rattler-build recipe format.
pub const DEFAULT_SCHEMA_URL: &str =
    "https://raw.githubusercontent.com/prefix-dev/recipe-format/main/schema.json";

/// File name of the cached schema inside the temp directory.
pub const SCHEMA_CACHE_FILE: &str = "rattler-recipe-json-schema.json";

/// Default REST endpoint of the registry.
pub const DEFAULT_REGISTRY_REST: &str = "https://prefix.dev/api/v1";

/// Default GraphQL endpoint of the registry.
pub const DEFAULT_REGISTRY_GQL: &str = "https://prefix.dev/api/graphql";

/// Channel used when none is configured.
pub const DEFAULT_CHANNEL: &str = "brads-forge";

/// Build engine executable used when none is configured.
pub const DEFAULT_ENGINE: &str = "rattler-build";

/// Registry connection settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Bearer token (`PREFIX_TOKEN`).
    pub token: Option<String>,
    /// Target channel (`PREFIX_DEV_CHANNEL`).
    pub channel: String,
    /// REST base URL (`PREFIX_DEV_REST_ENDPOINT`).
    pub rest_endpoint: String,
    /// GraphQL URL (`PREFIX_DEV_GQL_ENDPOINT`).
    pub gql_endpoint: String,
}

/// Everything forge reads from the environment.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// GitHub token (`GH_TOKEN`, `GITHUB_TOKEN` or `GITHUB_API_TOKEN`).
    pub github_token: Option<String>,
    /// Host-scoped download credentials (`FORGE_AUTH_TOKENS`).
    pub auth_tokens: AuthTokens,
    /// Registry settings.
    pub registry: RegistryConfig,
    /// Build engine executable (`FORGE_BUILD_ENGINE`).
    pub engine: String,
    /// Where the engine's recipe schema is downloaded from (`FORGE_RECIPE_SCHEMA_URL`).
    pub schema_url: String,
    /// Where the downloaded schema is cached.
    pub schema_cache: PathBuf,
    /// Keep staging directories and abort on the first failure (`BAKERY_DEBUG`).
    pub debug: bool,
    /// Whether `::group::` markers are printed (`GITHUB_ACTIONS`).
    pub github_actions: bool,
    /// Requirement injected into `requirements.build` for functional steps (`FORGE_BRIDGE_REQUIREMENT`).
    pub bridge_requirement: Option<String>,
}

impl ForgeConfig {
    /// Reads the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let github_token = get("GH_TOKEN")
            .or_else(|| get("GITHUB_TOKEN"))
            .or_else(|| get("GITHUB_API_TOKEN"));

        Self {
            github_token,
            auth_tokens: get("FORGE_AUTH_TOKENS")
                .map(|raw| AuthTokens::parse(&raw))
                .unwrap_or_default(),
            registry: RegistryConfig {
                token: get("PREFIX_TOKEN"),
                channel: get("PREFIX_DEV_CHANNEL").unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
                rest_endpoint: get("PREFIX_DEV_REST_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_REGISTRY_REST.to_string()),
                gql_endpoint: get("PREFIX_DEV_GQL_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_REGISTRY_GQL.to_string()),
            },
            engine: get("FORGE_BUILD_ENGINE").unwrap_or_else(|| DEFAULT_ENGINE.to_string()),
            schema_url: get("FORGE_RECIPE_SCHEMA_URL").unwrap_or_else(|| DEFAULT_SCHEMA_URL.to_string()),
            schema_cache: std::env::temp_dir().join(SCHEMA_CACHE_FILE),
            debug: get("BAKERY_DEBUG").is_some(),
            github_actions: get("GITHUB_ACTIONS").is_some(),
            bridge_requirement: get("FORGE_BRIDGE_REQUIREMENT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ForgeConfig {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        ForgeConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.registry.channel, DEFAULT_CHANNEL);
        assert_eq!(cfg.registry.rest_endpoint, DEFAULT_REGISTRY_REST);
        assert_eq!(cfg.engine, DEFAULT_ENGINE);
        assert!(cfg.registry.token.is_none());
        assert!(!cfg.debug);
        assert!(cfg.schema_cache.ends_with(SCHEMA_CACHE_FILE));
    }

    #[test]
    fn test_github_token_precedence() {
        let cfg = config(&[("GITHUB_TOKEN", "b"), ("GITHUB_API_TOKEN", "c")]);
        assert_eq!(cfg.github_token.as_deref(), Some("b"));
        let cfg = config(&[("GH_TOKEN", "a"), ("GITHUB_TOKEN", "b")]);
        assert_eq!(cfg.github_token.as_deref(), Some("a"));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let cfg = config(&[("BAKERY_DEBUG", ""), ("PREFIX_DEV_CHANNEL", " ")]);
        assert!(!cfg.debug);
        assert_eq!(cfg.registry.channel, DEFAULT_CHANNEL);
    }
}
