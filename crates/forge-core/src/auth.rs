//! Host-scoped download credentials.
//!
//! The format is a `;`-separated list where each entry is either
//! `token@host[:port]` (bearer) or `user:password@host[:port]` (basic).

use reqwest::RequestBuilder;
use url::Url;

/// One credential bound to a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthToken {
    /// `Authorization: Bearer <token>`
    Bearer {
        /// Secret.
        token: String,
        /// Host name, optionally with `:port`.
        host: String,
    },
    /// `Authorization: Basic ...`
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: String,
        /// Host name, optionally with `:port`.
        host: String,
    },
}

impl AuthToken {
    fn host(&self) -> &str {
        match self {
            Self::Bearer { host, .. } | Self::Basic { host, .. } => host,
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Bearer { token, .. } => request.bearer_auth(token),
            Self::Basic { username, password, .. } => request.basic_auth(username, Some(password)),
        }
    }
}

/// A parsed credential list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthTokens {
    tokens: Vec<AuthToken>,
}

impl AuthTokens {
    /// Parses the `;`-separated list. Malformed entries are skipped.
    pub fn parse(raw: &str) -> Self {
        let tokens = raw
            .split(';')
            .map(str::trim)
            .filter_map(|entry| {
                let (secret, host) = entry.rsplit_once('@')?;
                if secret.is_empty() || host.is_empty() {
                    tracing::warn!("ignoring malformed auth token entry");
                    return None;
                }
                let host = host.to_ascii_lowercase();
                Some(match secret.split_once(':') {
                    Some((username, password)) => AuthToken::Basic {
                        username: username.to_string(),
                        password: password.to_string(),
                        host,
                    },
                    None => AuthToken::Bearer {
                        token: secret.to_string(),
                        host,
                    },
                })
            })
            .collect();
        Self { tokens }
    }

    /// True when no credentials are configured.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Finds the credential whose host (and port, when given) matches `url`.
    pub fn find(&self, url: &str) -> Option<&AuthToken> {
        let url = Url::parse(url).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();
        let with_port = url.port().map(|p| format!("{host}:{p}"));
        self.tokens.iter().find(|t| {
            let candidate = t.host();
            match &with_port {
                Some(hp) => candidate == hp,
                None => candidate == host,
            }
        })
    }

    /// Attaches the matching credential, if any, to a request for `url`.
    pub fn authorize(&self, request: RequestBuilder, url: &str) -> RequestBuilder {
        match self.find(url) {
            Some(token) => token.apply(request),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer_and_basic() {
        let tokens = AuthTokens::parse("abc123@example.com;user:pass@Registry.io:8443");
        assert_eq!(
            tokens.find("https://example.com/file.tar.gz"),
            Some(&AuthToken::Bearer {
                token: "abc123".into(),
                host: "example.com".into()
            })
        );
        assert!(matches!(
            tokens.find("https://registry.io:8443/x"),
            Some(AuthToken::Basic { username, .. }) if username == "user"
        ));
    }

    #[test]
    fn test_port_must_match() {
        let tokens = AuthTokens::parse("user:pass@registry.io:8443");
        assert!(tokens.find("https://registry.io/x").is_none());
        assert!(tokens.find("https://registry.io:9000/x").is_none());
    }

    #[test]
    fn test_authorize_sets_header() {
        let tokens = AuthTokens::parse("abc@example.com;user:pass@other.com");
        let client = reqwest::Client::new();

        let url = "https://example.com/a";
        let req = tokens.authorize(client.get(url), url).build().unwrap();
        assert_eq!(req.headers()["authorization"], "Bearer abc");

        let url = "https://other.com/a";
        let req = tokens.authorize(client.get(url), url).build().unwrap();
        assert_eq!(req.headers()["authorization"], "Basic dXNlcjpwYXNz");

        let url = "https://nowhere.com/";
        let req = tokens.authorize(client.get(url), url).build().unwrap();
        assert!(req.headers().get("authorization").is_none());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let tokens = AuthTokens::parse("nohost;@empty.com; ;ok@fine.com");
        assert!(tokens.find("https://fine.com").is_some());
        assert!(tokens.find("https://empty.com").is_none());
    }
}
