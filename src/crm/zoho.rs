//! Zoho OAuth token management.
//!
//! Zoho's MCP endpoint authenticates with an OAuth2 bearer token. Tokens are
//! persisted to a local file so one interactive consent survives across
//! runs; access tokens are refreshed shortly before expiry, and Zoho omits
//! the refresh token from refresh responses, so the stored one is always
//! preserved.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AgentError, Result};

/// Default Zoho accounts host for the OAuth endpoints.
pub const DEFAULT_ACCOUNTS_SERVER: &str = "https://accounts.zoho.com";
/// Default redirect URI registered with the Zoho client.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/oauth/callback";
/// Default OAuth scope.
pub const DEFAULT_SCOPE: &str = "ZohoCRM.modules.ALL";

const TOKEN_FILE: &str = ".tokens.json";
const REFRESH_BUFFER_SECS: u64 = 300;
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth client settings for the Zoho accounts server.
#[derive(Debug, Clone)]
pub struct ZohoOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub accounts_server: String,
}

impl ZohoOAuthConfig {
    /// Read the OAuth settings from the environment. Returns `None` when
    /// the client credentials are not configured, which disables Zoho
    /// authorization entirely.
    pub fn from_env() -> Option<Self> {
        let client_id = non_empty_var("ZOHO_CLIENT_ID")?;
        let client_secret = non_empty_var("ZOHO_CLIENT_SECRET")?;
        Some(Self {
            client_id,
            client_secret,
            redirect_uri: non_empty_var("ZOHO_REDIRECT_URI")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            scope: non_empty_var("ZOHO_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            accounts_server: non_empty_var("ZOHO_ACCOUNTS_SERVER")
                .unwrap_or_else(|| DEFAULT_ACCOUNTS_SERVER.to_string()),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Persisted token material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl TokenSet {
    /// Whether the access token is expired or inside the refresh buffer.
    fn needs_refresh(&self, now: u64) -> bool {
        now + REFRESH_BUFFER_SECS >= self.expires_at
    }
}

/// Wire shape of Zoho's token endpoint responses.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    api_domain: Option<String>,
    token_type: Option<String>,
    error: Option<String>,
}

/// Keeps a Zoho access token valid across runs.
#[derive(Debug)]
pub struct ZohoTokenManager {
    config: ZohoOAuthConfig,
    token_path: PathBuf,
}

impl ZohoTokenManager {
    pub fn new(config: ZohoOAuthConfig) -> Self {
        Self {
            config,
            token_path: PathBuf::from(TOKEN_FILE),
        }
    }

    /// Build a manager from the environment, or `None` when Zoho OAuth is
    /// not configured.
    pub fn from_env() -> Option<Self> {
        ZohoOAuthConfig::from_env().map(Self::new)
    }

    /// Override where tokens are persisted.
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// The consent URL a user must open to authorize this client.
    ///
    /// Requests offline access with a forced consent prompt so Zoho always
    /// issues a refresh token.
    pub fn authorization_url(&self) -> Result<String> {
        let base = format!(
            "{}/oauth/v2/auth",
            self.config.accounts_server.trim_end_matches('/')
        );
        let url = reqwest::Url::parse_with_params(
            &base,
            &[
                ("scope", self.config.scope.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| {
            AgentError::Configuration(format!("invalid Zoho accounts server URL: {}", e))
        })?;
        Ok(url.to_string())
    }

    /// Exchange an authorization code for the initial token set and persist
    /// it.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let response = self
            .post_token(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code", code),
            ])
            .await?;
        let set = self.store(response, None)?;
        info!("Zoho authorization complete; tokens saved to {}", self.token_path.display());
        Ok(set)
    }

    /// Return a non-expired access token, refreshing if necessary.
    pub async fn valid_access_token(&self) -> Result<String> {
        let now = epoch_secs();
        match self.load() {
            Some(set) if !set.needs_refresh(now) => Ok(set.access_token),
            Some(set) => match set.refresh_token.as_deref() {
                Some(refresh_token) => {
                    info!("Zoho access token expiring; refreshing");
                    let refreshed = self.refresh(refresh_token).await?;
                    Ok(refreshed.access_token)
                }
                None => Err(self.unauthenticated_error()),
            },
            None => Err(self.unauthenticated_error()),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let response = self
            .post_token(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
            ])
            .await?;
        // Zoho never echoes the refresh token back on this grant.
        self.store(response, Some(refresh_token.to_string()))
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let url = format!(
            "{}/oauth/v2/token",
            self.config.accounts_server.trim_end_matches('/')
        );
        let client = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Auth(format!("failed to build HTTP client: {}", e)))?;

        let response = client
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(|e| AgentError::Auth(format!("token request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Auth(format!("failed to read token response: {}", e)))?;
        if !status.is_success() {
            return Err(AgentError::Auth(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| AgentError::Auth(format!("malformed token response: {}", e)))
    }

    fn store(&self, response: TokenResponse, fallback_refresh: Option<String>) -> Result<TokenSet> {
        let access_token = response.access_token.ok_or_else(|| {
            AgentError::Auth(format!(
                "token endpoint returned no access token{}",
                response
                    .error
                    .map(|e| format!(" ({})", e))
                    .unwrap_or_default()
            ))
        })?;
        let set = TokenSet {
            access_token,
            refresh_token: response.refresh_token.or(fallback_refresh),
            expires_at: epoch_secs() + response.expires_in.unwrap_or(3600),
            api_domain: response.api_domain,
            token_type: response.token_type,
        };
        self.save(&set)?;
        Ok(set)
    }

    fn load(&self) -> Option<TokenSet> {
        let raw = std::fs::read_to_string(&self.token_path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(set) => Some(set),
            Err(e) => {
                warn!(
                    "ignoring unreadable token file {}: {}",
                    self.token_path.display(),
                    e
                );
                None
            }
        }
    }

    fn save(&self, set: &TokenSet) -> Result<()> {
        let payload = serde_json::to_string_pretty(set)?;
        std::fs::write(&self.token_path, payload).map_err(|e| {
            AgentError::Auth(format!(
                "failed to write token file {}: {}",
                self.token_path.display(),
                e
            ))
        })?;
        // Token files hold credentials; keep them private to the owner.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(
                &self.token_path,
                std::fs::Permissions::from_mode(0o600),
            ) {
                warn!(
                    "could not restrict permissions on {}: {}",
                    self.token_path.display(),
                    e
                );
            }
        }
        Ok(())
    }

    fn unauthenticated_error(&self) -> AgentError {
        let consent = self
            .authorization_url()
            .unwrap_or_else(|_| "<invalid accounts server URL>".to_string());
        AgentError::Auth(format!(
            "no valid Zoho tokens found; to authenticate:\n  \
             1. Open the consent URL: {}\n  \
             2. Approve access and copy the 'code' parameter from the redirect\n  \
             3. Run: crm-agent --zoho-exchange-code <CODE>\n  \
             4. Re-run the agent",
            consent
        ))
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
