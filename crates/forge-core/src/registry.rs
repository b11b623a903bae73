//! Package registry client (prefix.dev API).
//!
//! Existence checks go through GraphQL, uploads and deletes through REST.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use forge_schema::{Digest, DigestAlgorithm, Platform};

use crate::config::RegistryConfig;
use crate::error::{ForgeError, Result};

/// Upload and delete requests may take this long.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

const PAGE_SIZE: u32 = 100;

const VARIANTS_QUERY: &str = r"query Variants($channel: String!, $name: String!, $limit: Int!, $page: Int!) {
  package(channelName: $channel, name: $name) {
    variants(limit: $limit, page: $page) {
      current
      pages
      page {
        platform
        version
        buildNumber
      }
    }
  }
}";

/// One published (name, version, platform, build number) combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantQuery {
    /// Package name.
    pub name: String,
    /// Package version as rendered.
    pub version: String,
    /// Target platform.
    pub platform: Platform,
    /// Build number.
    pub build_number: u32,
    /// Channel to search.
    pub channel: String,
}

/// Where built packages are published.
#[async_trait]
pub trait Registry: Send + Sync {
    /// True when the exact variant is already published.
    async fn variant_exists(&self, variant: &VariantQuery) -> Result<bool>;

    /// Publishes a package file to `channel`.
    async fn upload(&self, file: &Path, channel: &str) -> Result<()>;

    /// Removes `filename` from `channel`.
    async fn delete(&self, channel: &str, platform: Platform, filename: &str) -> Result<()>;
}

/// Client for prefix.dev.
#[derive(Debug, Clone)]
pub struct PrefixClient {
    http: Client,
    token: String,
    rest: String,
    gql: String,
    channel: String,
}

impl PrefixClient {
    /// Builds the client. Fails when no token is configured.
    pub fn new(http: Client, config: &RegistryConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ForgeError::Registry("token is empty".to_string()))?;
        Ok(Self {
            http,
            token,
            rest: config.rest_endpoint.trim_end_matches('/').to_string(),
            gql: config.gql_endpoint.clone(),
            channel: config.channel.clone(),
        })
    }

    /// Channel from the configuration.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn variants_page(&self, name: &str, channel: &str, page: u32) -> Result<Option<VariantPage>> {
        let request = GraphQlQuery {
            query: VARIANTS_QUERY,
            variables: VariantsVars {
                channel,
                name,
                limit: PAGE_SIZE,
                page,
            },
        };
        let resp = self
            .http
            .post(&self.gql)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ForgeError::Registry(format!("GraphQL request failed ({status}): {text}")));
        }
        let body: GraphQlResponse = resp.json().await?;
        if let Some(err) = body.errors.as_ref().and_then(|e| e.first()) {
            return Err(ForgeError::Registry(err.message.clone()));
        }
        let data = body
            .data
            .ok_or_else(|| ForgeError::Registry("no data in GraphQL response".to_string()))?;
        Ok(data.package.map(|p| p.variants))
    }
}

#[async_trait]
impl Registry for PrefixClient {
    async fn variant_exists(&self, variant: &VariantQuery) -> Result<bool> {
        let platform = variant.platform.to_string();
        let mut page = 0;
        loop {
            let Some(variants) = self.variants_page(&variant.name, &variant.channel, page).await? else {
                debug!(name = %variant.name, "package not in channel");
                return Ok(false);
            };
            let found = variants.page.iter().any(|v| {
                v.version == variant.version && v.platform == platform && v.build_number == variant.build_number
            });
            if found {
                return Ok(true);
            }
            // last page is `pages - 1`; an empty listing has zero pages
            if variants.current + 1 >= variants.pages {
                return Ok(false);
            }
            page += 1;
        }
    }

    async fn upload(&self, file: &Path, channel: &str) -> Result<()> {
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ForgeError::Registry(format!("not a file: {}", file.display())))?;
        let body = tokio::fs::read(file).await?;
        let sha256 = Digest::from_bytes(DigestAlgorithm::Sha256, &body);
        info!(file = %file_name, %channel, bytes = body.len(), "uploading package");

        let resp = self
            .http
            .post(format!("{}/upload/{channel}", self.rest))
            .bearer_auth(&self.token)
            .header("X-File-Name", &file_name)
            .header("X-File-SHA256", sha256.hex())
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(TRANSFER_TIMEOUT)
            .body(body)
            .send()
            .await?;
        check(resp, "upload").await
    }

    async fn delete(&self, channel: &str, platform: Platform, filename: &str) -> Result<()> {
        info!(%channel, %platform, %filename, "deleting package");
        let resp = self
            .http
            .delete(format!("{}/delete/{channel}/{platform}/{filename}", self.rest))
            .bearer_auth(&self.token)
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await?;
        check(resp, "delete").await
    }
}

async fn check(resp: reqwest::Response, action: &str) -> Result<()> {
    if resp.status().is_success() {
        return Ok(());
    }
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    Err(ForgeError::Registry(format!("{action} failed ({status}): {text}")))
}

#[derive(Serialize)]
struct GraphQlQuery<V> {
    query: &'static str,
    variables: V,
}

#[derive(Serialize)]
struct VariantsVars<'a> {
    channel: &'a str,
    name: &'a str,
    limit: u32,
    page: u32,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<PackageData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct PackageData {
    package: Option<PackageNode>,
}

#[derive(Deserialize)]
struct PackageNode {
    variants: VariantPage,
}

#[derive(Deserialize)]
struct VariantPage {
    current: u32,
    pages: u32,
    page: Vec<VariantNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantNode {
    platform: String,
    version: String,
    build_number: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::Server) -> PrefixClient {
        let config = RegistryConfig {
            token: Some("pfx".into()),
            channel: "brads-forge".into(),
            rest_endpoint: format!("{}/api/v1", server.url()),
            gql_endpoint: format!("{}/api/graphql", server.url()),
        };
        PrefixClient::new(Client::new(), &config).unwrap()
    }

    fn query(name: &str, version: &str) -> VariantQuery {
        VariantQuery {
            name: name.into(),
            version: version.into(),
            platform: "linux-64".parse().unwrap(),
            build_number: 0,
            channel: "brads-forge".into(),
        }
    }

    fn page(current: u32, pages: u32, versions: &[&str]) -> String {
        let items: Vec<_> = versions
            .iter()
            .map(|v| json!({"platform": "linux-64", "version": v, "buildNumber": 0}))
            .collect();
        json!({"data": {"package": {"variants": {"current": current, "pages": pages, "page": items}}}})
            .to_string()
    }

    #[test]
    fn test_empty_token_rejected() {
        let config = RegistryConfig {
            token: Some(" ".into()),
            channel: "c".into(),
            rest_endpoint: "http://x".into(),
            gql_endpoint: "http://x".into(),
        };
        assert!(matches!(PrefixClient::new(Client::new(), &config), Err(ForgeError::Registry(_))));
    }

    #[tokio::test]
    async fn test_variant_exists_pages_until_match() {
        let mut server = mockito::Server::new_async().await;
        let p0 = server
            .mock("POST", "/api/graphql")
            .match_header("authorization", "Bearer pfx")
            .match_body(Matcher::PartialJson(json!({"variables": {"page": 0}})))
            .with_body(page(0, 3, &["1.0.0"]))
            .create_async()
            .await;
        let p1 = server
            .mock("POST", "/api/graphql")
            .match_body(Matcher::PartialJson(json!({"variables": {"page": 1}})))
            .with_body(page(1, 3, &["1.2.3"]))
            .create_async()
            .await;
        let p2 = server
            .mock("POST", "/api/graphql")
            .match_body(Matcher::PartialJson(json!({"variables": {"page": 2}})))
            .expect(0)
            .create_async()
            .await;

        assert!(client(&server).variant_exists(&query("oras", "1.2.3")).await.unwrap());
        p0.assert_async().await;
        p1.assert_async().await;
        p2.assert_async().await;
    }

    #[tokio::test]
    async fn test_variant_missing_after_last_page() {
        let mut server = mockito::Server::new_async().await;
        let _p0 = server
            .mock("POST", "/api/graphql")
            .match_body(Matcher::PartialJson(json!({"variables": {"page": 0}})))
            .with_body(page(0, 2, &["1.0.0"]))
            .create_async()
            .await;
        let _p1 = server
            .mock("POST", "/api/graphql")
            .match_body(Matcher::PartialJson(json!({"variables": {"page": 1}})))
            .with_body(page(1, 2, &["1.1.0"]))
            .create_async()
            .await;

        assert!(!client(&server).variant_exists(&query("oras", "9.9.9")).await.unwrap());
    }

    #[tokio::test]
    async fn test_names_are_sent_as_variables() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/graphql")
            .match_body(Matcher::PartialJson(json!({
                "variables": {"channel": "brads-forge", "name": "we\"ird\\name", "limit": 100, "page": 0}
            })))
            .with_body(page(0, 1, &["1.0.0"]))
            .create_async()
            .await;

        let found = client(&server).variant_exists(&query("we\"ird\\name", "1.0.0")).await.unwrap();
        assert!(found);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_package_is_missing() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/graphql")
            .with_body(json!({"data": {"package": null}}).to_string())
            .create_async()
            .await;
        assert!(!client(&server).variant_exists(&query("nope", "1.0.0")).await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_sends_digest_headers() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("demo-1.0-0.conda");
        std::fs::write(&pkg, "hello").unwrap();

        let m = server
            .mock("POST", "/api/v1/upload/brads-forge")
            .match_header("authorization", "Bearer pfx")
            .match_header("x-file-name", "demo-1.0-0.conda")
            .match_header(
                "x-file-sha256",
                "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            )
            .match_header("content-type", "application/octet-stream")
            .match_body("hello")
            .with_status(200)
            .create_async()
            .await;

        client(&server).upload(&pkg, "brads-forge").await.unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_failure_is_registry_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("DELETE", "/api/v1/delete/brads-forge/linux-64/demo-1.0-0.conda")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;
        let err = client(&server)
            .delete("brads-forge", "linux-64".parse().unwrap(), "demo-1.0-0.conda")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("forbidden"));
    }
}
