//! Construction-time checks on recipe metadata.
//!
//! Works on the camelCase JSON form of a recipe so that every shape problem
//! can be reported with its field path. All violations are collected.

use serde_json::Value;

use forge_schema::Platform;

use crate::error::Violation;

const URL_FIELDS: [&str; 4] = ["homepage", "repository", "documentation", "licenseUrl"];
const REQUIREMENT_LISTS: [&str; 4] = ["build", "host", "run", "runConstrained"];

/// Collects violations found in `doc`.
///
/// `doc` is the recipe's metadata: `name`, `platforms`, `about`,
/// `requirements`, `tests` and `extra`. An empty list means valid.
pub fn validate_metadata(doc: &Value) -> Vec<Violation> {
    let mut out = Vec::new();

    match doc.get("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        other => out.push(violation("name", "a non-empty string", other)),
    }

    if let Some(platforms) = doc.get("platforms") {
        check_platforms(platforms, &mut out);
    }
    if let Some(about) = doc.get("about") {
        check_about(about, &mut out);
    }
    if let Some(reqs) = doc.get("requirements") {
        check_requirements(reqs, &mut out);
    }
    if let Some(Value::Array(tests)) = doc.get("tests") {
        for (i, test) in tests.iter().enumerate() {
            check_test(&format!("tests[{i}]"), test, &mut out);
        }
    }
    if let Some(extra) = doc.get("extra") {
        match extra {
            Value::Object(map) => {
                for (key, value) in map {
                    if !value.is_string() {
                        out.push(violation(&format!("extra.{key}"), "a string", Some(value)));
                    }
                }
            }
            other => out.push(violation("extra", "a map of strings", Some(other))),
        }
    }

    out
}

fn check_platforms(platforms: &Value, out: &mut Vec<Violation>) {
    let Value::Array(items) = platforms else {
        out.push(violation("platforms", "a list of platforms", Some(platforms)));
        return;
    };
    for (i, item) in items.iter().enumerate() {
        let ok = item.as_str().is_some_and(|s| s.parse::<Platform>().is_ok());
        if !ok {
            out.push(violation(
                &format!("platforms[{i}]"),
                "an `{os}-{arch}` platform",
                Some(item),
            ));
        }
    }
}

fn check_about(about: &Value, out: &mut Vec<Violation>) {
    let Value::Object(map) = about else {
        out.push(violation("about", "an object", Some(about)));
        return;
    };
    for field in URL_FIELDS {
        let Some(value) = map.get(field) else {
            continue;
        };
        let ok = value.as_str().is_some_and(|s| url::Url::parse(s).is_ok());
        if !ok {
            out.push(violation(&format!("about.{field}"), "a well-formed URL", Some(value)));
        }
    }
}

fn check_requirements(reqs: &Value, out: &mut Vec<Violation>) {
    let Value::Object(map) = reqs else {
        out.push(violation("requirements", "an object", Some(reqs)));
        return;
    };
    for list in REQUIREMENT_LISTS {
        if let Some(value) = map.get(list) {
            check_strings(&format!("requirements.{list}"), value, out);
        }
    }
}

fn check_test(path: &str, test: &Value, out: &mut Vec<Violation>) {
    if let Some(script) = test.get("script") {
        match script {
            Value::Array(lines) if !lines.is_empty() => check_strings(&format!("{path}.script"), script, out),
            other => out.push(violation(&format!("{path}.script"), "at least one command", Some(other))),
        }
    }
    if let Some(imports) = test.get("python").and_then(|p| p.get("imports")) {
        match imports {
            Value::Array(items) if !items.is_empty() => {
                check_strings(&format!("{path}.python.imports"), imports, out);
            }
            other => out.push(violation(
                &format!("{path}.python.imports"),
                "at least one module",
                Some(other),
            )),
        }
    }
    if let Some(downstream) = test.get("downstream") {
        if downstream.as_str().is_none_or(|s| s.trim().is_empty()) {
            out.push(violation(&format!("{path}.downstream"), "a package name", Some(downstream)));
        }
    }
}

fn check_strings(path: &str, value: &Value, out: &mut Vec<Violation>) {
    let Value::Array(items) = value else {
        out.push(violation(path, "a list of strings", Some(value)));
        return;
    };
    for (i, item) in items.iter().enumerate() {
        if item.as_str().is_none_or(|s| s.trim().is_empty()) {
            out.push(violation(&format!("{path}[{i}]"), "a non-empty string", Some(item)));
        }
    }
}

fn violation(path: &str, expected: &str, actual: Option<&Value>) -> Violation {
    Violation {
        path: path.to_string(),
        expected: expected.to_string(),
        actual: actual.map_or_else(|| "nothing".to_string(), Value::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(doc: &Value) -> Vec<String> {
        validate_metadata(doc).into_iter().map(|v| v.path).collect()
    }

    #[test]
    fn test_valid_metadata() {
        let doc = json!({
            "name": "oras",
            "platforms": ["linux-64", "osx-arm64"],
            "about": {"homepage": "https://oras.land", "license": "Apache-2.0"},
            "requirements": {"run": ["libgcc"]},
            "tests": [{"script": ["oras version"]}],
            "extra": {"maintainer": "someone"},
        });
        assert!(validate_metadata(&doc).is_empty());
    }

    #[test]
    fn test_non_string_name() {
        let v = validate_metadata(&json!({"name": 42}));
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].path, "name");
        assert_eq!(v[0].actual, "42");
    }

    #[test]
    fn test_bogus_platform() {
        assert_eq!(
            paths(&json!({"name": "x", "platforms": ["linux-64", "bogus-platform"]})),
            vec!["platforms[1]"]
        );
    }

    #[test]
    fn test_malformed_homepage() {
        assert_eq!(
            paths(&json!({"name": "x", "about": {"homepage": "not a url"}})),
            vec!["about.homepage"]
        );
    }

    #[test]
    fn test_collects_every_violation() {
        let doc = json!({
            "name": "",
            "platforms": ["linux"],
            "about": {"repository": "::", "licenseUrl": 7},
            "requirements": {"build": ["ok", ""]},
            "tests": [{"script": []}, {"python": {"imports": []}}, {"downstream": ""}],
            "extra": {"n": 1},
        });
        assert_eq!(
            paths(&doc),
            vec![
                "name",
                "platforms[0]",
                "about.repository",
                "about.licenseUrl",
                "requirements.build[1]",
                "tests[0].script",
                "tests[1].python.imports",
                "tests[2].downstream",
                "extra.n",
            ]
        );
    }
}
