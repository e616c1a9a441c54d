//! Cypher text for the repository operations.
//!
//! Labels and edge types come from closed enums; the tenant is the only
//! caller-supplied text spliced into a label and is stripped of backticks.
//! Every value travels as a query parameter.

use crm_projections_core::graph::{Direction, NodeLabel, NodeRef, RelationshipType};

/// `{Label}_{tenant}` label, quoted.
pub(crate) fn tenant_label(label: NodeLabel, tenant: &str) -> String {
    format!("`{}_{}`", label.as_str(), tenant.replace('`', ""))
}

/// Pattern matching one node, keyed by parameter `${param}`.
pub(crate) fn node_pattern(var: &str, node: &NodeRef, tenant: &str, param: &str) -> String {
    let label = node.label;
    if label.is_tenant_scoped() {
        format!(
            "({var}:{}:{} {{{}: ${param}}})",
            label.as_str(),
            tenant_label(label, tenant),
            label.key_property()
        )
    } else {
        format!("({var}:{} {{{}: ${param}}})", label.as_str(), label.key_property())
    }
}

/// Pattern matching every node of `label` in the tenant.
pub(crate) fn label_pattern(var: &str, label: NodeLabel, tenant: &str) -> String {
    if label.is_tenant_scoped() {
        format!("({var}:{}:{})", label.as_str(), tenant_label(label, tenant))
    } else {
        format!("({var}:{})", label.as_str())
    }
}

pub(crate) fn merge_node(node: &NodeRef, tenant: &str) -> String {
    if node.label.is_tenant_scoped() {
        format!(
            "MERGE (t:Tenant {{name: $tenant}})\n\
             MERGE (t)<-[:{}]-{}\n\
             ON CREATE SET n += $onCreate\n\
             SET n += $props",
            node.label.belongs_to_tenant(),
            node_pattern("n", node, tenant, "id")
        )
    } else {
        format!(
            "MERGE {}\nON CREATE SET n += $onCreate\nSET n += $props",
            node_pattern("n", node, tenant, "id")
        )
    }
}

pub(crate) fn update_node(node: &NodeRef, tenant: &str) -> String {
    format!(
        "MATCH {}\nSET n += $props\nRETURN count(n) AS found",
        node_pattern("n", node, tenant, "id")
    )
}

pub(crate) fn delete_node(node: &NodeRef, tenant: &str) -> String {
    format!("MATCH {}\nDETACH DELETE n", node_pattern("n", node, tenant, "id"))
}

pub(crate) fn get_node(node: &NodeRef, tenant: &str) -> String {
    format!("MATCH {}\nRETURN n LIMIT 1", node_pattern("n", node, tenant, "id"))
}

pub(crate) fn find_nodes(label: NodeLabel, tenant: &str) -> String {
    format!("MATCH {}\nWHERE n[$property] = $value\nRETURN n", label_pattern("n", label, tenant))
}

pub(crate) fn merge_relationship(
    from: &NodeRef,
    rel: RelationshipType,
    to: &NodeRef,
    tenant: &str,
) -> String {
    format!(
        "MATCH {}\nMATCH {}\nMERGE (a)-[r:{}]->(b)\nSET r += $props\nRETURN count(r) AS merged",
        node_pattern("a", from, tenant, "from"),
        node_pattern("b", to, tenant, "to"),
        rel.as_str()
    )
}

pub(crate) fn delete_relationship(
    from: &NodeRef,
    rel: RelationshipType,
    to: &NodeRef,
    tenant: &str,
) -> String {
    format!(
        "MATCH {}-[r:{}]->{}\nDELETE r",
        node_pattern("a", from, tenant, "from"),
        rel.as_str(),
        node_pattern("b", to, tenant, "to")
    )
}

pub(crate) fn related(
    node: &NodeRef,
    rel: RelationshipType,
    direction: Direction,
    target: NodeLabel,
    tenant: &str,
) -> String {
    let start = node_pattern("a", node, tenant, "id");
    let other = label_pattern("b", target, tenant);
    let edge = match direction {
        Direction::Outgoing => format!("-[r:{}]->", rel.as_str()),
        Direction::Incoming => format!("<-[r:{}]-", rel.as_str()),
    };
    format!("MATCH {start}{edge}{other}\nRETURN b, r")
}

/// Schema statements, run once at startup.
pub(crate) fn schema() -> Vec<String> {
    let mut statements = vec![
        "CREATE CONSTRAINT tenant_name IF NOT EXISTS FOR (t:Tenant) REQUIRE t.name IS UNIQUE"
            .to_string(),
        "CREATE CONSTRAINT domain_domain IF NOT EXISTS FOR (d:Domain) REQUIRE d.domain IS UNIQUE"
            .to_string(),
    ];
    for label in [
        NodeLabel::Organization,
        NodeLabel::Contact,
        NodeLabel::Contract,
        NodeLabel::Opportunity,
        NodeLabel::ServiceLineItem,
        NodeLabel::Invoice,
        NodeLabel::LogEntry,
        NodeLabel::User,
        NodeLabel::Email,
        NodeLabel::PhoneNumber,
        NodeLabel::ExternalSystem,
    ] {
        let name = label.as_str();
        statements.push(format!(
            "CREATE INDEX {}_id IF NOT EXISTS FOR (n:{name}) ON (n.id)",
            name.to_lowercase()
        ));
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_scoped_nodes_carry_the_tenant_label() {
        let node = NodeRef::new(NodeLabel::Organization, "o1");
        assert_eq!(
            node_pattern("n", &node, "acme", "id"),
            "(n:Organization:`Organization_acme` {id: $id})"
        );
    }

    #[test]
    fn shared_nodes_match_by_their_key() {
        let domain = NodeRef::new(NodeLabel::Domain, "acme.com");
        assert_eq!(node_pattern("d", &domain, "acme", "id"), "(d:Domain {domain: $id})");
        assert_eq!(
            node_pattern("t", &NodeRef::tenant("acme"), "acme", "id"),
            "(t:Tenant {name: $id})"
        );
    }

    #[test]
    fn backticks_cannot_escape_the_label() {
        assert_eq!(tenant_label(NodeLabel::Contact, "ac`me"), "`Contact_acme`");
    }

    #[test]
    fn merge_links_new_nodes_to_their_tenant() {
        let cypher = merge_node(&NodeRef::new(NodeLabel::Contract, "c1"), "acme");
        assert!(cypher.contains("MERGE (t:Tenant {name: $tenant})"));
        assert!(cypher.contains(
            "MERGE (t)<-[:CONTRACT_BELONGS_TO_TENANT]-(n:Contract:`Contract_acme` {id: $id})"
        ));
        assert!(cypher.contains("ON CREATE SET n += $onCreate"));

        let cypher = merge_node(&NodeRef::new(NodeLabel::Domain, "acme.com"), "acme");
        assert!(!cypher.contains("Tenant"));
    }

    #[test]
    fn related_follows_the_requested_direction() {
        let contract = NodeRef::new(NodeLabel::Contract, "c1");
        let incoming = related(
            &contract,
            RelationshipType::HasContract,
            Direction::Incoming,
            NodeLabel::Organization,
            "acme",
        );
        assert_eq!(
            incoming,
            "MATCH (a:Contract:`Contract_acme` {id: $id})<-[r:HAS_CONTRACT]-(b:Organization:`Organization_acme`)\nRETURN b, r"
        );
    }
}
