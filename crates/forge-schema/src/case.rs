//! Key-case transform for the build engine boundary.
//!
//! Recipes are modelled with camelCase keys. The engine expects snake_case,
//! except for the link-script keys which stay dash-cased. This module is the
//! one place that mapping happens.

use serde_json::{Map, Value};

/// Keys that are emitted dash-cased instead of snake_cased.
pub const DASH_CASE_EXCEPTIONS: [(&str, &str); 3] = [
    ("preLink", "pre-link"),
    ("postLink", "post-link"),
    ("preUnlink", "pre-unlink"),
];

/// Keys whose values are user-owned maps; their inner keys are left alone.
pub const OPAQUE_KEYS: [&str; 3] = ["context", "extra", "env"];

/// Converts one key from camelCase to snake_case, honouring the exceptions.
pub fn to_engine_key(key: &str) -> String {
    if let Some((_, dashed)) = DASH_CASE_EXCEPTIONS.iter().find(|(camel, _)| *camel == key) {
        return (*dashed).to_string();
    }

    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower_or_digit = false;
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(c);
            prev_lower_or_digit = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Recursively rewrites every object key in `value` for the engine.
///
/// Arrays are walked element by element. The values under
/// [`OPAQUE_KEYS`] keep their inner keys untouched.
pub fn to_engine_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let inner = if OPAQUE_KEYS.contains(&key.as_str()) {
                    inner
                } else {
                    to_engine_keys(inner)
                };
                out.insert(to_engine_key(&key), inner);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(to_engine_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_conversion() {
        assert_eq!(to_engine_key("binaryRelocation"), "binary_relocation");
        assert_eq!(to_engine_key("runConstrained"), "run_constrained");
        assert_eq!(to_engine_key("sha256"), "sha256");
        assert_eq!(to_engine_key("already_snake"), "already_snake");
        assert_eq!(to_engine_key("sha256Hash"), "sha256_hash");
    }

    #[test]
    fn test_dash_exceptions() {
        assert_eq!(to_engine_key("preLink"), "pre-link");
        assert_eq!(to_engine_key("postLink"), "post-link");
        assert_eq!(to_engine_key("preUnlink"), "pre-unlink");
        assert_eq!(to_engine_key("pre-link"), "pre-link");
    }

    #[test]
    fn test_recursive_transform() {
        let input = json!({
            "build": {
                "dynamicLinking": { "binaryRelocation": false },
                "linkOptions": { "postLink": "echo hi" }
            },
            "source": [{ "url": "https://x", "targetDirectory": "go" }],
            "context": { "rawVersion": "v1.2.3" },
            "extra": { "recipeMaintainers": ["me"] }
        });
        let out = to_engine_keys(input);
        assert_eq!(
            out,
            json!({
                "build": {
                    "dynamic_linking": { "binary_relocation": false },
                    "link_options": { "post-link": "echo hi" }
                },
                "source": [{ "url": "https://x", "target_directory": "go" }],
                "context": { "rawVersion": "v1.2.3" },
                "extra": { "recipeMaintainers": ["me"] }
            })
        );
    }
}
