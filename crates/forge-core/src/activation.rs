//! Activation snippets written into the package prefix.
//!
//! conda runs everything under `$PREFIX/etc/conda/activate.d` when an
//! environment is activated and merges every `env_vars.d/*.json`. Each helper
//! writes a file keyed by the package name so packages never share one.
//!
//! `env_vars.d` files are merged last-writer-wins, so PATH must be extended
//! through an activation script ([`Activation::prepend_to_path`]), not
//! through [`Activation::add_env_vars`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use forge_schema::Platform;

use crate::bridge::BuildContext;
use crate::error::{ForgeError, Result};

static UNIX_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\w+)|\$\{(\w+)\}").expect("valid regex"));

/// Writes activation files for one package being built.
#[derive(Debug, Clone)]
pub struct Activation {
    prefix: PathBuf,
    pkg_name: String,
    target_platform: Platform,
}

impl Activation {
    /// Creates the helper for an explicit prefix.
    pub fn new(prefix: impl Into<PathBuf>, pkg_name: impl Into<String>, target_platform: Platform) -> Self {
        Self {
            prefix: prefix.into(),
            pkg_name: pkg_name.into(),
            target_platform,
        }
    }

    /// Reads `PREFIX`, `PKG_NAME` and `target_platform` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Activation::from_env`] with any lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &'static str| lookup(key).filter(|v| !v.is_empty()).ok_or(ForgeError::MissingEnv(key));
        let prefix = get("PREFIX")?;
        let pkg_name = get("PKG_NAME")?;
        let target_platform = get("target_platform")?.parse::<Platform>()?;
        Ok(Self::new(prefix, pkg_name, target_platform))
    }

    fn windows(&self) -> bool {
        !self.target_platform.is_unix()
    }

    /// Variables set on activation, stored in `env_vars.d/<pkg>.json`.
    ///
    /// On Windows targets `$VAR` references and slashes are translated.
    pub async fn add_env_vars(&self, vars: &BTreeMap<String, String>) -> Result<()> {
        let vars: BTreeMap<&str, String> = vars
            .iter()
            .map(|(k, v)| {
                let v = if self.windows() { to_batch(v) } else { v.clone() };
                (k.as_str(), v)
            })
            .collect();
        let path = self.conda_dir("env_vars.d").join(format!("{}.json", self.pkg_name));
        ensure_parent(&path).await?;
        tokio::fs::write(&path, serde_json::to_string_pretty(&vars)?).await?;
        debug!(path = %path.display(), "wrote activation env vars");
        Ok(())
    }

    /// Prepends `segments` to PATH on activation.
    ///
    /// Windows gets matching `.bat` and `.ps1` scripts; everything else a `.sh`.
    pub async fn prepend_to_path(&self, segments: &[&str]) -> Result<()> {
        if self.windows() {
            let bat = segments.iter().map(|s| to_batch(s)).collect::<Vec<_>>().join(";");
            self.add_activate_script("bat", &format!("@SET \"PATH={bat};%PATH%\"")).await?;
            let ps1 = segments.iter().map(|s| to_powershell(s)).collect::<Vec<_>>().join(";");
            return self
                .add_activate_script("ps1", &format!("$env:PATH = \"{ps1};$env:PATH\""))
                .await;
        }
        self.add_activate_script("sh", &format!("export PATH=\"{}:$PATH\"", segments.join(":")))
            .await
    }

    /// Appends `src` to `activate.d/<pkg>.<ext>`.
    pub async fn add_activate_script(&self, ext: &str, src: &str) -> Result<()> {
        self.append_script("activate.d", ext, src).await
    }

    /// Appends `src` to `deactivate.d/<pkg>.<ext>`.
    pub async fn add_deactivate_script(&self, ext: &str, src: &str) -> Result<()> {
        self.append_script("deactivate.d", ext, src).await
    }

    /// Makes `link` point at `existing`.
    ///
    /// Unix gets a real symlink now. Windows symlinks need elevation, so a hard
    /// link is created on activation and removed on deactivation instead.
    pub async fn add_link(&self, existing: &str, link: &str) -> Result<()> {
        if self.windows() {
            self.add_activate_script("bat", &format!("mklink /H \"{}\" \"{}\"", to_batch(link), to_batch(existing)))
                .await?;
            self.add_deactivate_script("bat", &format!("del \"{}\"", to_batch(link))).await?;
            self.add_activate_script(
                "ps1",
                &format!(
                    "New-Item -ItemType HardLink -Path \"{}\" -Target \"{}\"",
                    to_powershell(link),
                    to_powershell(existing)
                ),
            )
            .await?;
            return self
                .add_deactivate_script("ps1", &format!("Remove-Item \"{}\"", to_powershell(link)))
                .await;
        }
        symlink(existing, link).await
    }

    fn conda_dir(&self, kind: &str) -> PathBuf {
        self.prefix.join("etc").join("conda").join(kind)
    }

    async fn append_script(&self, kind: &str, ext: &str, src: &str) -> Result<()> {
        let path = self.conda_dir(kind).join(format!("{}.{ext}", self.pkg_name));
        ensure_parent(&path).await?;
        let eol = if self.windows() { "\r\n" } else { "\n" };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(format!("{eol}{src}").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl From<&BuildContext> for Activation {
    fn from(ctx: &BuildContext) -> Self {
        Self::new(ctx.prefix.clone(), ctx.pkg_name.clone(), ctx.target_platform)
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn symlink(existing: &str, link: &str) -> Result<()> {
    tokio::fs::symlink(existing, link).await?;
    Ok(())
}

#[cfg(windows)]
async fn symlink(existing: &str, link: &str) -> Result<()> {
    tokio::fs::symlink_file(existing, link).await?;
    Ok(())
}

/// `$VAR` and `${VAR}` to `%VAR%`, `/` to `\`.
pub fn to_batch(unix: &str) -> String {
    translate(unix, |name| format!("%{name}%"))
}

/// `$VAR` and `${VAR}` to `$env:VAR`, `/` to `\`.
pub fn to_powershell(unix: &str) -> String {
    translate(unix, |name| format!("$env:{name}"))
}

fn translate(unix: &str, var: impl Fn(&str) -> String) -> String {
    UNIX_VAR
        .replace_all(unix, |caps: &Captures<'_>| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            var(name)
        })
        .replace('/', "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activation(dir: &Path, platform: &str) -> Activation {
        Activation::new(dir, "nircmd", platform.parse().unwrap())
    }

    #[test]
    fn test_windows_translation() {
        assert_eq!(to_batch("$PREFIX/Library/bin"), r"%PREFIX%\Library\bin");
        assert_eq!(to_batch("${PREFIX}/x"), r"%PREFIX%\x");
        assert_eq!(to_powershell("$PREFIX/Library/bin"), r"$env:PREFIX\Library\bin");
        assert_eq!(to_powershell("${HOME}"), "$env:HOME");
    }

    #[test]
    fn test_from_lookup_requires_all_vars() {
        let err = Activation::from_lookup(|k| (k == "PREFIX").then(|| "/p".to_string())).unwrap_err();
        assert!(matches!(err, ForgeError::MissingEnv("PKG_NAME")));

        let a = Activation::from_lookup(|k| match k {
            "PREFIX" => Some("/p".into()),
            "PKG_NAME" => Some("go".into()),
            "target_platform" => Some("linux-64".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(a.pkg_name, "go");
    }

    #[tokio::test]
    async fn test_activate_scripts_append() {
        let dir = tempfile::tempdir().unwrap();
        let a = activation(dir.path(), "linux-64");
        a.prepend_to_path(&["$PREFIX/go/bin", "$PREFIX/tools"]).await.unwrap();
        a.add_activate_script("sh", "export GOROOT=\"$PREFIX/go\"").await.unwrap();

        let text = std::fs::read_to_string(dir.path().join("etc/conda/activate.d/nircmd.sh")).unwrap();
        assert_eq!(
            text,
            "\nexport PATH=\"$PREFIX/go/bin:$PREFIX/tools:$PATH\"\nexport GOROOT=\"$PREFIX/go\""
        );
    }

    #[tokio::test]
    async fn test_windows_path_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let a = activation(dir.path(), "win-64");
        a.prepend_to_path(&["$PREFIX/Library/bin"]).await.unwrap();

        let base = dir.path().join("etc/conda/activate.d");
        let bat = std::fs::read_to_string(base.join("nircmd.bat")).unwrap();
        assert_eq!(bat, "\r\n@SET \"PATH=%PREFIX%\\Library\\bin;%PATH%\"");
        let ps1 = std::fs::read_to_string(base.join("nircmd.ps1")).unwrap();
        assert_eq!(ps1, "\r\n$env:PATH = \"$env:PREFIX\\Library\\bin;$env:PATH\"");
    }

    #[tokio::test]
    async fn test_env_vars_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = activation(dir.path(), "win-64");
        let vars = BTreeMap::from([("GOROOT".to_string(), "$PREFIX/go".to_string())]);
        a.add_env_vars(&vars).await.unwrap();

        let text = std::fs::read_to_string(dir.path().join("etc/conda/env_vars.d/nircmd.json")).unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["GOROOT"], r"%PREFIX%\go");
    }

    #[tokio::test]
    async fn test_windows_link_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let a = activation(dir.path(), "win-64");
        a.add_link("$PREFIX/go/bin/go.exe", "$PREFIX/Library/bin/go.exe").await.unwrap();

        let conda = dir.path().join("etc/conda");
        let bat = std::fs::read_to_string(conda.join("activate.d/nircmd.bat")).unwrap();
        assert!(bat.contains(r#"mklink /H "%PREFIX%\Library\bin\go.exe" "%PREFIX%\go\bin\go.exe""#));
        let undo = std::fs::read_to_string(conda.join("deactivate.d/nircmd.ps1")).unwrap();
        assert_eq!(undo, "\r\nRemove-Item \"$env:PREFIX\\Library\\bin\\go.exe\"");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_link_is_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real");
        std::fs::write(&target, "x").unwrap();
        let link = dir.path().join("alias");
        let a = activation(dir.path(), "linux-64");
        a.add_link(target.to_str().unwrap(), link.to_str().unwrap()).await.unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), target);
    }
}
