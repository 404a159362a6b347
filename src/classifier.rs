//! Request Classifier
//!
//! Maps the provenance of a request to the agents that should answer it:
//! - Master/Internal: the whole roster
//! - Shareholder/Investor: strategy, finance, market, risk, green hill
//! - Supplier/Provider/OCS feed: operations and compliance
//! - Public: market and strategy
//! - Web source: market and risk

use crate::models::{AgentName, SourceType};

const SHAREHOLDER_AGENTS: &[AgentName] = &[
    AgentName::Strategy,
    AgentName::Finance,
    AgentName::Market,
    AgentName::Risk,
    AgentName::GreenHill,
];

const SUPPLIER_AGENTS: &[AgentName] = &[AgentName::Operations, AgentName::Compliance];

const PUBLIC_AGENTS: &[AgentName] = &[AgentName::Market, AgentName::Strategy];

const WEB_AGENTS: &[AgentName] = &[AgentName::Market, AgentName::Risk];

/// Agents selected for `source_type`, deduplicated, in canonical order.
pub fn select_agents(source_type: SourceType) -> Vec<AgentName> {
    let selected: &[AgentName] = match source_type {
        SourceType::Master | SourceType::Internal => &AgentName::ALL,
        // Unrecognized sources get the full roster, never an empty one, so a
        // question run always has analyses to merge.
        SourceType::Unknown => &AgentName::ALL,
        SourceType::Shareholder | SourceType::Investor => SHAREHOLDER_AGENTS,
        SourceType::Supplier | SourceType::Provider | SourceType::OcsFeed => SUPPLIER_AGENTS,
        SourceType::Public => PUBLIC_AGENTS,
        SourceType::WebSource => WEB_AGENTS,
    };

    canonical(selected)
}

/// Sort and deduplicate an agent list.
pub fn canonical(agents: &[AgentName]) -> Vec<AgentName> {
    let mut out = agents.to_vec();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_selects_everyone() {
        assert_eq!(select_agents(SourceType::Internal), AgentName::ALL.to_vec());
    }

    #[test]
    fn test_unknown_source_is_never_empty() {
        assert_eq!(select_agents(SourceType::Unknown), AgentName::ALL.to_vec());
    }

    #[test]
    fn test_public_selection_is_canonical() {
        assert_eq!(
            select_agents(SourceType::Public),
            vec![AgentName::Strategy, AgentName::Market]
        );
    }

    #[test]
    fn test_supplier_family() {
        for st in [SourceType::Supplier, SourceType::Provider, SourceType::OcsFeed] {
            assert_eq!(
                select_agents(st),
                vec![AgentName::Operations, AgentName::Compliance]
            );
        }
    }

    #[test]
    fn test_investor_includes_green_hill() {
        let agents = select_agents(SourceType::Investor);
        assert_eq!(agents.len(), 5);
        assert_eq!(agents.last(), Some(&AgentName::GreenHill));
    }

    #[test]
    fn test_canonical_dedups() {
        assert_eq!(
            canonical(&[AgentName::Risk, AgentName::Market, AgentName::Risk]),
            vec![AgentName::Market, AgentName::Risk]
        );
    }
}
