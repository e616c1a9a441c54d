//! Email validation requests.
//!
//! `V1_EMAIL_VALIDATE` asks for an address to be checked. The handler calls
//! the validation service and hands the full report back to the email
//! aggregate as a `RecordEmailValidation` command; the graph picks the
//! result up later from the resulting `V2_EMAIL_VALIDATED` event.

use crate::api::{ApiClient, EnrichmentError};
use crate::graph::GraphContext;
use async_trait::async_trait;
use crm_projections_core::command::Command;
use crm_projections_core::events::{EmailValidateEvent, EmailValidatedV2Event, EventPayload};
use crm_projections_core::graph::{NodeLabel, NodeRef};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::model::Email;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Checks email addresses.
#[async_trait]
pub trait EmailValidationApi: Send + Sync {
    /// Validate `email` on behalf of `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError`] if the service cannot be reached or has no
    /// verdict.
    async fn validate(
        &self,
        tenant: &str,
        email: &str,
    ) -> Result<EmailValidatedV2Event, EnrichmentError>;
}

#[derive(Debug, Serialize)]
struct ValidateEmailRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ValidateEmailResponse {
    status: String,
    message: String,
    data: Option<EmailValidatedV2Event>,
}

/// [`EmailValidationApi`] over HTTP: `POST {url}/validateEmail`.
#[derive(Debug, Clone)]
pub struct HttpEmailValidationApi {
    client: ApiClient,
}

impl HttpEmailValidationApi {
    /// Wrap a configured client.
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EmailValidationApi for HttpEmailValidationApi {
    async fn validate(
        &self,
        tenant: &str,
        email: &str,
    ) -> Result<EmailValidatedV2Event, EnrichmentError> {
        let response: ValidateEmailResponse = self
            .client
            .call(Method::POST, "/validateEmail", tenant, &ValidateEmailRequest { email })
            .await?;
        match response.data {
            Some(report) if response.status == "success" => Ok(report),
            _ => {
                tracing::warn!(
                    tenant,
                    status = %response.status,
                    message = %response.message,
                    "Email validation rejected"
                );
                Err(EnrichmentError::Unsuccessful(email.to_string()))
            }
        }
    }
}

/// Handles `V1_EMAIL_VALIDATE`.
#[derive(Clone)]
pub struct EmailValidateHandler {
    ctx: GraphContext,
    api: Arc<dyn EmailValidationApi>,
}

impl EmailValidateHandler {
    /// Create the handler.
    #[must_use]
    pub fn new(ctx: GraphContext, api: Arc<dyn EmailValidationApi>) -> Self {
        Self { ctx, api }
    }

    /// Address from the event, falling back to the projected email node.
    async fn address(
        &self,
        event: &DecodedEvent,
        data: &EmailValidateEvent,
    ) -> Result<String, HandlerError> {
        if !data.raw_email.trim().is_empty() {
            return Ok(data.raw_email.trim().to_string());
        }
        let email = NodeRef::new(NodeLabel::Email, event.object_id.as_str());
        let node = self.ctx.graph.get_node(&event.tenant, &email).await?;
        Ok(node.map(|n| Email::from_node(&n).address().to_string()).unwrap_or_default())
    }

    async fn on_validate(
        &self,
        event: &DecodedEvent,
        data: &EmailValidateEvent,
    ) -> Result<(), HandlerError> {
        let address = self.address(event, data).await?;
        if address.is_empty() {
            tracing::warn!(
                tenant = %event.tenant,
                email_id = %event.object_id,
                "No address to validate"
            );
            return Ok(());
        }

        let mut report = self
            .api
            .validate(&event.tenant, &address)
            .await
            .map_err(|e| HandlerError::Other(format!("email validation of {address}: {e}")))?;
        report.tenant.clone_from(&event.tenant);
        if report.email.is_empty() {
            report.email = address;
        }
        if report.validated_at.is_none() {
            report.validated_at = Some(self.ctx.now());
        }

        self.ctx
            .send(Command::RecordEmailValidation {
                tenant: event.tenant.clone(),
                email_id: event.object_id.clone(),
                report,
                app_source: self.ctx.app_source.clone(),
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for EmailValidateHandler {
    fn name(&self) -> &'static str {
        "EmailValidateHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::EmailValidate(data) => self.on_validate(event, data).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}
