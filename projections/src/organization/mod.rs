//! Organization subscriber: enrichment and field normalisation.
//!
//! Three events reach this subscriber:
//! - `V1_ORGANIZATION_REQUEST_ENRICH` fetches firmographics for the
//!   organization's primary domain and fills in whatever is still blank.
//! - `V1_ORGANIZATION_CREATE` normalises the market value of a new
//!   organization once the graph has projected it.
//! - `V1_ORGANIZATION_UPDATE` does the same when its field mask writes the
//!   market.

mod client;
mod handler;

pub use client::{
    EnrichOrganizationResponse, EnrichedLocation, EnrichedOrganization, EnrichedSocial,
    EnrichmentApi, HttpEnrichmentApi,
};
pub use handler::OrganizationEnrichmentHandler;

/// Host part of a website, lowercased, without scheme, `www.`, port or path.
///
/// Returns an empty string when the website has no dotted host.
///
/// ```
/// use crm_projections_subscribers::organization::primary_domain;
///
/// assert_eq!(primary_domain("https://www.Acme.com/about"), "acme.com");
/// assert_eq!(primary_domain("not a website"), "");
/// ```
#[must_use]
pub fn primary_domain(website: &str) -> String {
    let website = website.trim().to_lowercase();
    let without_scheme = website.split_once("://").map_or(website.as_str(), |(_, rest)| rest);
    let host = without_scheme
        .split(['/', '?', '#', ':'])
        .next()
        .unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.contains('.')
        && !host.starts_with('.')
        && !host.ends_with('.')
        && !host.contains(char::is_whitespace)
    {
        host.to_string()
    } else {
        String::new()
    }
}

/// Organization name derived from a domain: `acme-labs.com` becomes `Acme-Labs`.
#[must_use]
pub fn name_from_domain(domain: &str) -> String {
    let prefix = domain.split('.').next().unwrap_or_default();
    let mut name = String::with_capacity(prefix.len());
    let mut capitalize = true;
    for c in prefix.chars() {
        if capitalize {
            name.extend(c.to_uppercase());
        } else {
            name.push(c);
        }
        capitalize = matches!(c, '-' | '_');
    }
    name
}

/// Canonical spelling of a market value; unknown values are kept as given.
#[must_use]
pub fn map_market(market: &str) -> String {
    match market.trim().to_lowercase().as_str() {
        "b2b" => "B2B".to_string(),
        "b2c" => "B2C".to_string(),
        "marketplace" => "Marketplace".to_string(),
        _ => market.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn primary_domain_recovers_the_host(
            label in "[a-z][a-z0-9-]{0,15}",
            tld in "(com|io|co\\.uk|ai)",
            path in "(/[a-z0-9]{0,8}){0,3}",
            www in any::<bool>(),
        ) {
            let host = format!("{label}.{tld}");
            let website = format!("https://{}{host}{path}", if www { "www." } else { "" });
            prop_assert_eq!(primary_domain(&website), host.clone());
            prop_assert_eq!(primary_domain(&website.to_uppercase()), host);
        }

        #[test]
        fn primary_domain_output_is_a_bare_host(website in ".{0,40}") {
            let domain = primary_domain(&website);
            prop_assert!(!domain.contains(['/', '?', '#', ':']));
            prop_assert!(!domain.contains(char::is_whitespace));
            prop_assert_eq!(domain.to_lowercase(), domain.clone());
        }
    }

    #[test]
    fn primary_domain_strips_scheme_www_and_path() {
        assert_eq!(primary_domain("acme.com"), "acme.com");
        assert_eq!(primary_domain("http://acme.com:8080/x?y=1"), "acme.com");
        assert_eq!(primary_domain("  WWW.acme.co.uk/"), "acme.co.uk");
        assert_eq!(primary_domain(""), "");
        assert_eq!(primary_domain("localhost"), "");
    }

    #[test]
    fn name_from_domain_capitalizes_each_part() {
        assert_eq!(name_from_domain("acme.com"), "Acme");
        assert_eq!(name_from_domain("acme-labs.io"), "Acme-Labs");
        assert_eq!(name_from_domain("big_data.ai"), "Big_Data");
    }

    #[test]
    fn market_is_normalised() {
        assert_eq!(map_market("b2b"), "B2B");
        assert_eq!(map_market(" B2c "), "B2C");
        assert_eq!(map_market("MARKETPLACE"), "Marketplace");
        assert_eq!(map_market("Other"), "Other");
    }
}
