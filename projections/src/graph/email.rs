//! Email projections.
//!
//! A validation report lands on the email node. When the validator suggests an
//! alternate address, every contact and organization owning the validated
//! address also gets the alternate one, as their new primary email.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{EmailValidatedV2Event, EventPayload};
use crm_projections_core::graph::{
    Direction, GraphNode, NodeLabel, NodeRef, Properties, RelationshipType,
};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::notifier::EventCompleted;

/// Projects email events.
#[derive(Debug, Clone)]
pub struct EmailEventHandler {
    ctx: GraphContext,
}

impl EmailEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    async fn on_validated_v2(
        &self,
        event: &DecodedEvent,
        data: &EmailValidatedV2Event,
    ) -> Result<(), HandlerError> {
        let tenant = event.tenant.as_str();
        let email = NodeRef::new(NodeLabel::Email, event.object_id.as_str());

        let props = validated_properties(data, &self.ctx);
        if let Err(e) = self.ctx.graph.update_node(tenant, &email, props).await {
            tracing::error!(
                tenant,
                email_id = %email.id,
                error = %e,
                "Failed to write email validation"
            );
        }

        let contacts = self.owners_of(tenant, &data.email, NodeLabel::Contact).await;
        let organizations = self.owners_of(tenant, &data.email, NodeLabel::Organization).await;

        let alternate = data.alternate_email.trim();
        if !alternate.is_empty() && alternate != data.email {
            for owner in contacts.iter().chain(organizations.iter()) {
                if let Err(e) = self.add_primary_email(tenant, &owner.node_ref(), alternate).await {
                    tracing::error!(
                        tenant,
                        owner = %owner.node_ref(),
                        error = %e,
                        "Failed to add alternate email"
                    );
                }
            }
        }

        for owner in contacts.iter().chain(organizations.iter()) {
            self.ctx.notify(EventCompleted::update(tenant, owner.label, &owner.id)).await;
        }
        Ok(())
    }

    /// Nodes of `label` with a `HAS` edge to an email node holding `address`.
    async fn owners_of(&self, tenant: &str, address: &str, label: NodeLabel) -> Vec<GraphNode> {
        if address.is_empty() {
            return Vec::new();
        }
        let emails = match self
            .ctx
            .graph
            .find_nodes(tenant, NodeLabel::Email, "email", address.into())
            .await
        {
            Ok(emails) => emails,
            Err(e) => {
                tracing::error!(tenant, address, error = %e, "Failed to look up email");
                return Vec::new();
            }
        };

        let mut owners: Vec<GraphNode> = Vec::new();
        for email in emails {
            match self
                .ctx
                .graph
                .related(
                    tenant,
                    &email.node_ref(),
                    RelationshipType::Has,
                    Direction::Incoming,
                    label,
                )
                .await
            {
                Ok(related) => {
                    for rel in related {
                        if !owners.iter().any(|o| o.id == rel.node.id) {
                            owners.push(rel.node);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        tenant,
                        label = %label,
                        error = %e,
                        "Failed to read email owners"
                    )
                }
            }
        }
        owners
    }

    /// Link `address` to `owner` as its primary email, demoting the others.
    async fn add_primary_email(
        &self,
        tenant: &str,
        owner: &NodeRef,
        address: &str,
    ) -> Result<(), HandlerError> {
        let existing = self
            .ctx
            .graph
            .find_nodes(tenant, NodeLabel::Email, "email", address.into())
            .await?;
        let email = match existing.first() {
            Some(node) => node.node_ref(),
            None => {
                let email = NodeRef::new(NodeLabel::Email, uuid::Uuid::new_v4().to_string());
                let now = self.ctx.now();
                self.ctx
                    .graph
                    .merge_node(
                        tenant,
                        &email,
                        Properties::new()
                            .with("email", address)
                            .with("rawEmail", address)
                            .with("source", "openline")
                            .with("sourceOfTruth", "openline")
                            .with("appSource", self.ctx.app_source.as_str())
                            .with("createdAt", now)
                            .with("updatedAt", now),
                        Properties::new(),
                    )
                    .await?;
                email
            }
        };

        let linked = self
            .ctx
            .graph
            .related(tenant, owner, RelationshipType::Has, Direction::Outgoing, NodeLabel::Email)
            .await?;
        for other in linked.iter().filter(|r| r.node.id != email.id) {
            self.ctx
                .graph
                .merge_relationship(
                    tenant,
                    owner,
                    RelationshipType::Has,
                    &other.node.node_ref(),
                    Properties::new().with("primary", false),
                )
                .await?;
        }

        self.ctx
            .link(
                tenant,
                owner,
                RelationshipType::Has,
                &email,
                Properties::new().with("primary", true),
            )
            .await?;
        Ok(())
    }

    async fn on_delete(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        let email = NodeRef::new(NodeLabel::Email, event.object_id.as_str());
        if let Err(e) = self.ctx.graph.delete_node(&event.tenant, &email).await {
            tracing::error!(
                tenant = %event.tenant,
                email_id = %email.id,
                error = %e,
                "Failed to delete email"
            );
        }
        Ok(())
    }
}

fn validated_properties(data: &EmailValidatedV2Event, ctx: &GraphContext) -> Properties {
    let validated_at = at_or_now(data.validated_at, ctx);
    Properties::new()
        .with_if(!data.email.is_empty(), "email", data.email.as_str())
        .with("domain", data.domain.as_str())
        .with("username", data.username.as_str())
        .with("validated", true)
        .with("isValidSyntax", data.is_valid_syntax)
        .with("isRisky", data.is_risky)
        .with("isFirewalled", data.is_firewalled)
        .with("provider", data.provider.as_str())
        .with("firewall", data.firewall.as_str())
        .with("isCatchAll", data.is_catch_all)
        .with("deliverable", data.deliverable.as_str())
        .with("isMailboxFull", data.is_mailbox_full)
        .with("isRoleAccount", data.is_role_account)
        .with("isSystemGenerated", data.is_system_generated)
        .with("isFreeAccount", data.is_free_account)
        .with("smtpSuccess", data.smtp_success)
        .with("responseCode", data.response_code.as_str())
        .with("errorCode", data.error_code.as_str())
        .with("description", data.description.as_str())
        .with("isPrimaryDomain", data.is_primary_domain)
        .with("primaryDomain", data.primary_domain.as_str())
        .with("alternateEmail", data.alternate_email.as_str())
        .with("retryValidation", data.retry_validation)
        .with("techValidatedAt", validated_at)
        .with("updatedAt", validated_at)
}

#[async_trait]
impl Handler for EmailEventHandler {
    fn name(&self) -> &'static str {
        "EmailEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::EmailValidatedV2(data) => self.on_validated_v2(event, data).await,
            EventPayload::EmailDelete(_) => self.on_delete(event).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::test_support::{decoded, harness};
    use crm_projections_core::event_kind::EventKind;
    use crm_projections_core::notifier::CompletionKind;
    use crm_projections_testing::builders;
    use serde_json::json;

    fn seed_contact_with_email(
        h: &crate::graph::test_support::Harness,
        contact: &str,
        email_id: &str,
        address: &str,
    ) {
        let contact = NodeRef::new(NodeLabel::Contact, contact);
        let email = NodeRef::new(NodeLabel::Email, email_id);
        h.graph.seed("acme", &contact, Properties::new());
        h.graph.seed("acme", &email, Properties::new().with("email", address));
        h.graph.seed_edge(
            "acme",
            &contact,
            RelationshipType::Has,
            &email,
            Properties::new().with("primary", true),
        );
    }

    #[tokio::test]
    async fn validation_fields_are_written() {
        let h = harness();
        let handler = EmailEventHandler::new(h.ctx.clone());
        seed_contact_with_email(&h, "c1", "e1", "ada@acme.com");

        let event = builders::event(
            EventKind::EmailValidatedV2,
            "acme",
            "e1",
            json!({"email": "ada@acme.com", "deliverable": "true", "isCatchAll": true, "provider": "google"}),
        );
        handler.handle(&decoded(&event)).await.unwrap();

        let props = h.graph.node("acme", &NodeRef::new(NodeLabel::Email, "e1")).unwrap();
        assert_eq!(props.get_bool("validated"), Some(true));
        assert_eq!(props.string("deliverable"), "true");
        assert_eq!(props.get_bool("isCatchAll"), Some(true));
        assert_eq!(props.string("provider"), "google");

        let notified = h.notifier.notified();
        assert_eq!(notified.len(), 1);
        assert_eq!(notified[0].entity, NodeLabel::Contact);
        assert_eq!(notified[0].kind, CompletionKind::Update);
    }

    #[tokio::test]
    async fn alternate_email_becomes_primary_for_every_owner() {
        let h = harness();
        let handler = EmailEventHandler::new(h.ctx.clone());
        seed_contact_with_email(&h, "c1", "e1", "ada@acme.com");
        let org = NodeRef::new(NodeLabel::Organization, "o1");
        h.graph.seed("acme", &org, Properties::new());
        h.graph.seed_edge(
            "acme",
            &org,
            RelationshipType::Has,
            &NodeRef::new(NodeLabel::Email, "e1"),
            Properties::new().with("primary", true),
        );

        let event = builders::event(
            EventKind::EmailValidatedV2,
            "acme",
            "e1",
            json!({"email": "ada@acme.com", "alternateEmail": "ada.lovelace@acme.com"}),
        );
        handler.handle(&decoded(&event)).await.unwrap();
        handler.handle(&decoded(&event)).await.unwrap();

        assert_eq!(h.graph.count(NodeLabel::Email), 2);
        let contact = NodeRef::new(NodeLabel::Contact, "c1");
        let emails = h
            .ctx
            .graph
            .related("acme", &contact, RelationshipType::Has, Direction::Outgoing, NodeLabel::Email)
            .await
            .unwrap();
        assert_eq!(emails.len(), 2);
        for rel in &emails {
            let primary = rel.edge.get_bool("primary").unwrap();
            assert_eq!(primary, rel.node.properties.string("email") == "ada.lovelace@acme.com");
        }
        let org_emails = h
            .ctx
            .graph
            .related("acme", &org, RelationshipType::Has, Direction::Outgoing, NodeLabel::Email)
            .await
            .unwrap();
        assert_eq!(org_emails.len(), 2);
    }

    #[tokio::test]
    async fn same_alternate_email_is_ignored() {
        let h = harness();
        let handler = EmailEventHandler::new(h.ctx.clone());
        seed_contact_with_email(&h, "c1", "e1", "ada@acme.com");

        let event = builders::event(
            EventKind::EmailValidatedV2,
            "acme",
            "e1",
            json!({"email": "ada@acme.com", "alternateEmail": "ada@acme.com"}),
        );
        handler.handle(&decoded(&event)).await.unwrap();

        assert_eq!(h.graph.count(NodeLabel::Email), 1);
    }

    #[tokio::test]
    async fn write_failure_does_not_fail_the_handler() {
        let h = harness();
        let handler = EmailEventHandler::new(h.ctx.clone());
        h.graph.fail_writes(true);

        let event = builders::event(EventKind::EmailDelete, "acme", "e1", json!({}));
        handler.handle(&decoded(&event)).await.unwrap();
    }
}
