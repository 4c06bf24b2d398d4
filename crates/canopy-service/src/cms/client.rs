//! Sanity HTTP API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use canopy_core::{ComplianceInputs, LoyaltyConfig, PersonalizationRule, TenantScope};

use super::groq::{GroqQuery, QueryBuilder};
use super::types::{select_config, ComplianceQueryResult, ScopedConfig, ScopedRule};
use super::{ContentError, ContentSource};
use crate::config::SanityConfig;

/// Default timeout for CMS requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fields shared by every tenant-scoped projection.
const SCOPE_FIELDS: &str = "organizationId, brandId, storeId";

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct SanityErrorResponse {
    #[serde(default)]
    error: Option<SanityErrorBody>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SanityErrorBody {
    #[serde(default)]
    description: Option<String>,
}

/// Sanity API client.
#[derive(Debug, Clone)]
pub struct SanityClient {
    client: Client,
    base_url: String,
    dataset: String,
    api_version: String,
    token: Option<String>,
}

impl SanityClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Configuration` if no project id or API URL is
    /// set, or `ContentError::Http` if the HTTP client cannot be built.
    pub fn new(config: &SanityConfig) -> Result<Self, ContentError> {
        let base_url = config.base_url().ok_or_else(|| {
            ContentError::Configuration("Sanity project id or API URL required".into())
        })?;

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url,
            dataset: config.dataset.clone(),
            api_version: config.api_version.trim_start_matches('v').to_string(),
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, kind: &str) -> String {
        format!(
            "{}/v{}/data/{kind}/{}",
            self.base_url, self.api_version, self.dataset
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Run a GROQ query and decode its `result`.
    pub async fn query<T: DeserializeOwned>(&self, query: &GroqQuery) -> Result<T, ContentError> {
        tracing::debug!(query = %query.query(), "Running GROQ query");

        let response = self
            .authorize(self.client.get(self.endpoint("query")))
            .query(&query.to_query_pairs())
            .send()
            .await?;

        self.handle_response::<QueryResponse<T>>(response)
            .await
            .map(|r| r.result)
    }

    /// Apply `createOrReplace` mutations for each document.
    pub async fn mutate(&self, documents: Vec<serde_json::Value>) -> Result<(), ContentError> {
        let mutations: Vec<serde_json::Value> = documents
            .into_iter()
            .map(|doc| serde_json::json!({ "createOrReplace": doc }))
            .collect();
        let count = mutations.len();

        let response = self
            .authorize(self.client.post(self.endpoint("mutate")))
            .json(&serde_json::json!({ "mutations": mutations }))
            .send()
            .await?;

        self.handle_response::<serde_json::Value>(response).await?;
        tracing::debug!(count, "CMS documents written");
        Ok(())
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ContentError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        let message = serde_json::from_str::<SanityErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error.and_then(|b| b.description).or(e.message))
            .unwrap_or_else(|| format!("HTTP {status}"));

        Err(ContentError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn loyalty_config_query(scope: &TenantScope) -> GroqQuery {
    QueryBuilder::documents("loyaltyConfig")
        .scoped(scope)
        .order("_updatedAt desc")
        .project(format!(
            "{SCOPE_FIELDS}, termsVersion, \
             \"tiers\": coalesce(tiers[]{{..., \"id\": coalesce(id, _key)}}, []), \
             \"rules\": coalesce(rules[]{{..., \"id\": coalesce(id, _key)}}, []), \
             \"rewards\": coalesce(rewards[]{{..., \"id\": coalesce(id, _key)}}, [])"
        ))
        .build()
}

fn personalization_rules_query(scope: &TenantScope) -> GroqQuery {
    QueryBuilder::documents("personalizationRule")
        .filter("defined(action)")
        .scoped(scope)
        .order("_createdAt asc")
        .project(format!(
            "{SCOPE_FIELDS}, \"id\": _id, \"name\": coalesce(name, \"\"), \
             \"active\": coalesce(active, true), \"conditions\": coalesce(conditions, []), action"
        ))
        .build()
}

fn compliance_query() -> GroqQuery {
    GroqQuery::object(vec![
        (
            "organizations",
            QueryBuilder::documents("organization")
                .project("\"id\": _id, \"name\": coalesce(name, \"\")")
                .build(),
        ),
        (
            "brands",
            QueryBuilder::documents("brand")
                .project(
                    "\"id\": _id, \"name\": coalesce(name, \"\"), \
                     \"organizationId\": organization._ref",
                )
                .build(),
        ),
        (
            "stores",
            QueryBuilder::documents("store")
                .filter("defined(jurisdiction)")
                .project(
                    "\"id\": _id, \"name\": coalesce(name, \"\"), jurisdiction, \
                     \"organizationId\": organization._ref, \"brandId\": brand._ref",
                )
                .build(),
        ),
        (
            "documents",
            QueryBuilder::documents("legalDocument")
                .filter("defined(docType)")
                .project(
                    "\"id\": _id, docType, jurisdiction, version, effectiveFrom, effectiveTo, \
                     \"organizationId\": organization._ref, \"brandId\": brand._ref, \
                     \"storeId\": store._ref",
                )
                .build(),
        ),
        (
            "requirements",
            QueryBuilder::documents("complianceRequirements")
                .first()
                .project(
                    "\"defaultTypes\": coalesce(defaultTypes, []), \
                     \"byJurisdiction\": coalesce(byJurisdiction, [])",
                )
                .build(),
        ),
    ])
}

#[async_trait]
impl ContentSource for SanityClient {
    async fn loyalty_config(&self, scope: &TenantScope) -> Result<LoyaltyConfig, ContentError> {
        let candidates: Vec<ScopedConfig> = self.query(&loyalty_config_query(scope)).await?;
        Ok(select_config(candidates, scope))
    }

    async fn personalization_rules(
        &self,
        scope: &TenantScope,
    ) -> Result<Vec<PersonalizationRule>, ContentError> {
        let rules: Vec<ScopedRule> = self.query(&personalization_rules_query(scope)).await?;
        Ok(rules.into_iter().map(|r| r.rule).collect())
    }

    async fn compliance_inputs(&self) -> Result<ComplianceInputs, ContentError> {
        let raw: ComplianceQueryResult = self.query(&compliance_query()).await?;
        Ok(ComplianceInputs {
            organizations: raw.organizations,
            brands: raw.brands,
            stores: raw.stores,
            documents: raw.documents,
            requirements: raw.requirements.unwrap_or_default().into(),
        })
    }

    async fn write_documents(&self, documents: Vec<serde_json::Value>) -> Result<(), ContentError> {
        self.mutate(documents).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_project_or_url() {
        let err = SanityClient::new(&SanityConfig::default()).unwrap_err();
        assert!(matches!(err, ContentError::Configuration(_)));
    }

    #[test]
    fn endpoints_use_dated_version() {
        let client = SanityClient::new(&SanityConfig {
            project_id: Some("p1".into()),
            api_version: "v2024-01-01".into(),
            ..SanityConfig::default()
        })
        .unwrap();

        assert_eq!(
            client.endpoint("query"),
            "https://p1.api.sanity.io/v2024-01-01/data/query/production"
        );
    }

    #[test]
    fn compliance_query_has_every_section() {
        let query = compliance_query();
        for section in ["organizations", "brands", "stores", "documents", "requirements"] {
            assert!(query.query().contains(&format!("\"{section}\":")));
        }
    }
}
