//! Minimal GitHub REST client: releases by tag and tag listing.

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::auth::AuthTokens;
use crate::error::{ForgeError, Result};

const DEFAULT_API: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const MAX_TAG_PAGES: usize = 10;

/// A release and its uploaded assets.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    /// Tag the release was cut from.
    pub tag_name: String,
    /// Uploaded files.
    pub assets: Vec<GithubAsset>,
}

/// One uploaded release file.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    /// File name.
    pub name: String,
    /// Public download URL.
    pub browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubTag {
    name: String,
}

/// Thin wrapper around the REST API.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    api_base: String,
    token: Option<String>,
    auth_tokens: AuthTokens,
}

impl GithubClient {
    /// Creates a client against api.github.com.
    pub fn new(client: Client, token: Option<String>) -> Self {
        Self {
            client,
            api_base: DEFAULT_API.to_string(),
            token,
            auth_tokens: AuthTokens::default(),
        }
    }

    /// Host-scoped credentials for downloads outside GitHub.
    pub fn with_auth_tokens(mut self, auth_tokens: AuthTokens) -> Self {
        self.auth_tokens = auth_tokens;
        self
    }

    /// Points the client at another API root (used by tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// A GET request for API and download URLs alike.
    ///
    /// A host-scoped credential matching `url` wins over the GitHub token.
    pub fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        if self.auth_tokens.find(url).is_some() {
            return self.auth_tokens.authorize(request, url);
        }
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetches one release by tag.
    pub async fn release_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<GithubRelease> {
        let url = format!("{}/repos/{owner}/{repo}/releases/tags/{tag}", self.api_base);
        let resp = self
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ForgeError::Github(format!(
                "release {owner}/{repo}@{tag}: HTTP {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Lists tag names, newest first as GitHub returns them.
    pub async fn tags(&self, owner: &str, repo: &str) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        for page in 1..=MAX_TAG_PAGES {
            let url = format!(
                "{}/repos/{owner}/{repo}/tags?per_page={PER_PAGE}&page={page}",
                self.api_base
            );
            let resp = self
                .get(&url)
                .header("Accept", "application/vnd.github+json")
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(ForgeError::Github(format!(
                    "tags {owner}/{repo}: HTTP {}",
                    resp.status()
                )));
            }
            let batch: Vec<GithubTag> = resp.json().await?;
            let done = batch.len() < PER_PAGE;
            tags.extend(batch.into_iter().map(|t| t.name));
            if done {
                break;
            }
        }
        Ok(tags)
    }
}
