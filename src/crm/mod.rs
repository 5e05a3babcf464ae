//! CRM provider profiles and their connection credentials.

use std::fmt;
use std::str::FromStr;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{debug, warn};

use crate::error::AgentError;

pub mod zoho;

pub use zoho::{ZohoOAuthConfig, ZohoTokenManager};

/// Which CRM's tool server the agent talks to.
///
/// Each profile knows the environment variable holding its endpoint URL and
/// the server label used in logs. Selection comes from `ACTIVE_CRM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrmProvider {
    #[default]
    Zoho,
    HubSpot,
    Salesforce,
}

impl CrmProvider {
    /// Environment variable that must hold this provider's endpoint URL.
    pub fn endpoint_var(&self) -> &'static str {
        match self {
            CrmProvider::Zoho => "ZOHO_MCP_URL",
            CrmProvider::HubSpot => "HUBSPOT_MCP_URL",
            CrmProvider::Salesforce => "SALESFORCE_MCP_URL",
        }
    }

    /// Server label used in logs and transcripts.
    pub fn server_name(&self) -> &'static str {
        match self {
            CrmProvider::Zoho => "zoho_crm",
            CrmProvider::HubSpot => "hubspot_crm",
            CrmProvider::Salesforce => "salesforce_crm",
        }
    }

    /// Headers to attach when connecting to this provider's tool server.
    ///
    /// Zoho uses an OAuth bearer token when client credentials are
    /// configured; a missing or broken token degrades to a headerless
    /// connection with a warning rather than aborting the run. The other
    /// providers carry their credentials in the endpoint URL itself.
    pub async fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if *self != CrmProvider::Zoho {
            return headers;
        }

        let Some(manager) = ZohoTokenManager::from_env() else {
            debug!("Zoho OAuth client credentials not configured; connecting without authorization");
            return headers;
        };
        match manager.valid_access_token().await {
            Ok(token) => match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!("Zoho access token is not a valid header value: {}", e),
            },
            Err(e) => warn!("proceeding without Zoho authorization: {}", e),
        }
        headers
    }
}

impl FromStr for CrmProvider {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zoho" => Ok(CrmProvider::Zoho),
            "hubspot" => Ok(CrmProvider::HubSpot),
            "salesforce" => Ok(CrmProvider::Salesforce),
            other => Err(AgentError::Configuration(format!(
                "unknown CRM provider '{}': expected zoho, hubspot, or salesforce",
                other
            ))),
        }
    }
}

impl fmt::Display for CrmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrmProvider::Zoho => "zoho",
            CrmProvider::HubSpot => "hubspot",
            CrmProvider::Salesforce => "salesforce",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("zoho".parse::<CrmProvider>().unwrap(), CrmProvider::Zoho);
        assert_eq!(
            "HubSpot".parse::<CrmProvider>().unwrap(),
            CrmProvider::HubSpot
        );
        assert_eq!(
            " salesforce ".parse::<CrmProvider>().unwrap(),
            CrmProvider::Salesforce
        );
        assert!("pipedrive".parse::<CrmProvider>().is_err());
    }

    #[test]
    fn test_provider_endpoint_variables() {
        assert_eq!(CrmProvider::Zoho.endpoint_var(), "ZOHO_MCP_URL");
        assert_eq!(CrmProvider::HubSpot.endpoint_var(), "HUBSPOT_MCP_URL");
        assert_eq!(CrmProvider::Salesforce.endpoint_var(), "SALESFORCE_MCP_URL");
    }

    #[test]
    fn test_provider_server_names() {
        assert_eq!(CrmProvider::Zoho.server_name(), "zoho_crm");
        assert_eq!(CrmProvider::HubSpot.server_name(), "hubspot_crm");
        assert_eq!(CrmProvider::Salesforce.server_name(), "salesforce_crm");
    }

    #[test]
    fn test_default_provider_is_zoho() {
        assert_eq!(CrmProvider::default(), CrmProvider::Zoho);
        assert_eq!(CrmProvider::default().to_string(), "zoho");
    }
}
