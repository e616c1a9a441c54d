//! Enrichment service client.

use crate::api::{ApiClient, EnrichmentError};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// Answer of `enrichOrganization`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnrichOrganizationResponse {
    /// Whether the service found the domain
    pub success: bool,
    /// Provider the data came from
    pub primary_enrich_source: String,
    /// Firmographics
    pub data: EnrichedOrganization,
}

/// Firmographics of one domain.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct EnrichedOrganization {
    pub name: String,
    pub domain: String,
    pub website: String,
    pub logos: Vec<String>,
    pub icons: Vec<String>,
    pub industry: String,
    pub employees: i64,
    pub founded_year: i64,
    pub short_description: String,
    pub long_description: String,
    pub public: Option<bool>,
    pub location: EnrichedLocation,
    pub socials: Vec<EnrichedSocial>,
}

/// Headquarters address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct EnrichedLocation {
    pub country: String,
    pub country_code_a2: String,
    pub country_code_a3: String,
    pub locality: String,
    pub region: String,
    pub postal_code: String,
    pub address_line1: String,
    pub address_line2: String,
}

impl EnrichedLocation {
    /// No component is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts().next().is_none()
    }

    /// Non-empty components joined with commas, most specific first.
    #[must_use]
    pub fn raw_address(&self) -> String {
        self.parts().collect::<Vec<_>>().join(", ")
    }

    fn parts(&self) -> impl Iterator<Item = &str> {
        [
            self.address_line1.as_str(),
            self.address_line2.as_str(),
            self.locality.as_str(),
            self.region.as_str(),
            self.postal_code.as_str(),
            self.country.as_str(),
        ]
        .into_iter()
        .filter(|part| !part.trim().is_empty())
    }
}

/// Social profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct EnrichedSocial {
    pub url: String,
    pub alias: String,
    pub id: String,
}

/// Looks up firmographics by domain.
#[async_trait]
pub trait EnrichmentApi: Send + Sync {
    /// Enrich `domain` on behalf of `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError`] if the service cannot be reached or
    /// answers with an error status.
    async fn enrich_organization(
        &self,
        tenant: &str,
        domain: &str,
    ) -> Result<EnrichOrganizationResponse, EnrichmentError>;
}

#[derive(Debug, Serialize)]
struct EnrichOrganizationRequest<'a> {
    domain: &'a str,
}

/// [`EnrichmentApi`] over HTTP: `GET {url}/enrichOrganization`.
#[derive(Debug, Clone)]
pub struct HttpEnrichmentApi {
    client: ApiClient,
}

impl HttpEnrichmentApi {
    /// Wrap a configured client.
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnrichmentApi for HttpEnrichmentApi {
    async fn enrich_organization(
        &self,
        tenant: &str,
        domain: &str,
    ) -> Result<EnrichOrganizationResponse, EnrichmentError> {
        self.client
            .call(Method::GET, "/enrichOrganization", tenant, &EnrichOrganizationRequest { domain })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn response_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/enrichOrganization"))
            .and(body_json(json!({"domain": "acme.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "primaryEnrichSource": "brandfetch",
                "data": {
                    "name": "Acme",
                    "logos": ["https://cdn/logo.png"],
                    "foundedYear": 1999,
                    "public": false,
                    "location": {"countryCodeA2": "US", "locality": "Austin", "addressLine1": "1 Main St"},
                    "socials": [{"url": "https://linkedin.com/company/acme", "alias": "acme"}]
                }
            })))
            .mount(&server)
            .await;
        let api = HttpEnrichmentApi::new(ApiClient::new(ApiConfig {
            url: server.uri(),
            api_key: "k".to_string(),
        }));

        let response = api.enrich_organization("acme", "acme.com").await.unwrap();
        assert!(response.success);
        assert_eq!(response.primary_enrich_source, "brandfetch");
        assert_eq!(response.data.founded_year, 1999);
        assert_eq!(response.data.public, Some(false));
        assert_eq!(response.data.location.country_code_a2, "US");
        assert_eq!(response.data.location.raw_address(), "1 Main St, Austin");
        assert_eq!(response.data.socials[0].alias, "acme");
    }

    #[test]
    fn blank_location_is_empty() {
        assert!(EnrichedLocation::default().is_empty());
        let location = EnrichedLocation {
            country: " ".to_string(),
            ..EnrichedLocation::default()
        };
        assert!(location.is_empty());
    }
}
