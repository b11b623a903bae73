//! The build engine's published recipe JSON Schema.
//!
//! Fetched once per host and cached in a fixed file under the temp dir.
//! The cache is read, then written, without locking: two concurrent runs
//! may both fetch and both write the same document, which is harmless.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ForgeError, Result, SchemaViolation};

/// A compiled recipe schema.
pub struct RecipeSchema {
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for RecipeSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RecipeSchema")
    }
}

impl RecipeSchema {
    /// Compiles `schema` with format validation enabled.
    pub fn from_value(schema: &Value) -> Result<Self> {
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(schema)
            .map_err(|e| ForgeError::SchemaValidation(vec![violation(&e)]))?;
        Ok(Self { validator })
    }

    /// Loads the schema from `cache`, fetching `url` into it when absent.
    pub async fn load(client: &reqwest::Client, url: &str, cache: &Path) -> Result<Self> {
        let schema = match tokio::fs::read_to_string(cache).await {
            Ok(text) => {
                debug!(path = %cache.display(), "using cached recipe schema");
                serde_json::from_str(&text)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(%url, "fetching recipe schema");
                let schema: Value = client.get(url).send().await?.error_for_status()?.json().await?;
                tokio::fs::write(cache, serde_json::to_vec(&schema)?).await?;
                schema
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_value(&schema)
    }

    /// Checks `doc`, reporting every error the validator finds.
    pub fn validate(&self, doc: &Value) -> Result<()> {
        let errors: Vec<SchemaViolation> = self.validator.iter_errors(doc).map(|e| violation(&e)).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ForgeError::SchemaValidation(errors))
        }
    }
}

fn violation(e: &jsonschema::ValidationError<'_>) -> SchemaViolation {
    SchemaViolation {
        instance_path: e.instance_path.to_string(),
        schema_path: e.schema_path.to_string(),
        message: e.to_string(),
    }
}
