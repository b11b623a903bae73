//! NirCmd, scraped from nirsoft.net.
//!
//! nirsoft publishes no digests, so the recipe has no sources and the build
//! step downloads the zip itself.

use std::sync::LazyLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;

use forge_core::archive::extract_zip;
use forge_core::checksum::fetch_text;
use forge_core::files::{download_file, move_glob};
use forge_core::recipe::{About, Build, Description, Tests};
use forge_core::versions::{ResolvedVersion, VersionFn};
use forge_core::{BuildContext, ForgeError, LoadContext, Recipe, RecipeModule, Result};
use forge_schema::PlatformArch;

use crate::common::prebuilt;

const PAGE_URL: &str = "https://www.nirsoft.net/utils/nircmd.html";

static VERSION_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<td[^>]*>\s*(?:[Vv]ersion\s+)?(\d+(?:\.\d+)+)\s*:?\s*<").expect("valid regex")
});

pub(crate) const MODULE: RecipeModule = RecipeModule {
    name: "nircmd",
    dir: "nirsoft.net/nircmd",
    load,
};

/// First version listed in the page's version history table.
fn latest_version(html: &str) -> Option<&str> {
    let history = &html[html.find("name=\"verhistory\"")?..];
    VERSION_CELL
        .captures(history)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn download_url(arch: PlatformArch) -> &'static str {
    match arch {
        PlatformArch::X32 => "https://www.nirsoft.net/utils/nircmd.zip",
        _ => "https://www.nirsoft.net/utils/nircmd-x64.zip",
    }
}

fn load(ctx: LoadContext) -> BoxFuture<'static, Result<Recipe>> {
    async move {
        let http = ctx.http.clone();
        Recipe::builder("nircmd")
            .platforms(["win-32", "win-64"])
            .about(About {
                homepage: Some(PAGE_URL.into()),
                summary: Some(
                    "NirCmd is a small command-line utility that allows you to do some useful tasks \
                     without displaying any user interface."
                        .into(),
                ),
                description: Some(Description::Text(
                    "By running NirCmd with simple command-line option, you can write and delete values and \
                     keys in the Registry, write values into INI file, dial to your internet account or \
                     connect to a VPN network, restart windows or shut down the computer, create shortcut \
                     to a file, change the created/modified date of a file, change your display settings, \
                     turn off your monitor, open the door of your CD-ROM drive, and more..."
                        .into(),
                )),
                license: Some("LicenseRef-Freeware".into()),
                ..About::default()
            })
            .version(VersionFn::new(move || {
                let http = http.clone();
                async move {
                    let html = fetch_text(http.get(PAGE_URL)).await?;
                    let raw = latest_version(&html)
                        .ok_or_else(|| ForgeError::VersionCoercion(format!("no version in {PAGE_URL}")))?;
                    Ok::<_, ForgeError>(vec![ResolvedVersion::new(raw)])
                }
            }))
            .build(Build::func(build).with_options(prebuilt(1)))
            .tests(Tests::func(|ctx| async move {
                let exe = ctx.bin_dir().join("nircmd.exe");
                anyhow::ensure!(exe.is_file(), "failed to locate {} in package", exe.display());
                Ok(())
            }))
            .finish()
    }
    .boxed()
}

async fn build(ctx: BuildContext) -> anyhow::Result<()> {
    let zip = ctx.src_dir.join("nircmd.zip");
    let extracted = ctx.src_dir.join("extracted");
    let http = forge_core::http_client()?;
    download_file(&http, download_url(ctx.target_arch()), &zip).await?;
    extract_zip(&zip, &extracted).await?;
    let dst = ctx.bin_dir().join("nircmd.exe");
    move_glob(&extracted.join("nircmdc.exe").to_string_lossy(), &dst.to_string_lossy()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_version_from_history() {
        let html = r#"
            <table><tr><td>Version 9.99</td></tr></table>
            <a name="verhistory"></a><h4>Versions History</h4>
            <table>
              <tr><th>Date</th><th>Version</th><th>Description</th></tr>
              <tr><td>05/06/2023</td><td>2.87</td><td>Added setvolume</td></tr>
              <tr><td>01/01/2022</td><td>2.86</td><td>Fixed bug</td></tr>
            </table>"#;
        assert_eq!(latest_version(html), Some("2.87"));
        assert_eq!(latest_version("<td>2.87</td>"), None);
    }

    #[test]
    fn test_download_url_by_arch() {
        assert!(download_url(PlatformArch::X32).ends_with("/nircmd.zip"));
        assert!(download_url(PlatformArch::X64).ends_with("/nircmd-x64.zip"));
    }
}
