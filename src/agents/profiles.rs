//! Static agent profiles.

use crate::models::AgentName;

/// Everything that distinguishes one specialist from another.
#[derive(Debug)]
pub struct AgentProfile {
    pub name: AgentName,
    pub title: &'static str,
    /// Terms used to rank retrieved passages for this agent.
    pub focus_terms: &'static [&'static str],
    /// Question words that make the router propose this agent.
    pub triggers: &'static [&'static str],
    pub instruction: &'static str,
    pub focus_areas: &'static [&'static str],
}

static STRATEGY: AgentProfile = AgentProfile {
    name: AgentName::Strategy,
    title: "STRATEGIC ANALYSIS",
    focus_terms: &["strategy", "planning", "vision", "positioning", "growth"],
    triggers: &["strategy", "strategic", "vision", "roadmap", "positioning", "partnership"],
    instruction: "Analyze strategic opportunities and positioning for",
    focus_areas: &[
        "Market expansion and positioning in the Atlantic region",
        "Strategic partnerships and alliance opportunities",
        "Competitive advantages and differentiation",
        "Long-term vision and growth roadmap",
    ],
};

static OPERATIONS: AgentProfile = AgentProfile {
    name: AgentName::Operations,
    title: "OPERATIONS ANALYSIS",
    focus_terms: &["operations", "process", "efficiency", "logistics", "capacity"],
    triggers: &["operations", "operational", "logistics", "supply", "process", "capacity"],
    instruction: "Analyze operational requirements and optimization for",
    focus_areas: &[
        "Process automation and workflow optimization",
        "Resource allocation and efficiency metrics",
        "Supply chain and logistics management",
        "Infrastructure scalability and capacity planning",
    ],
};

static FINANCE: AgentProfile = AgentProfile {
    name: AgentName::Finance,
    title: "FINANCIAL ANALYSIS",
    focus_terms: &["finance", "investment", "funding", "capex", "revenue", "cost"],
    triggers: &["capex", "opex", "revenue", "cost", "budget", "funding", "roi", "investment"],
    instruction: "Analyze financial implications and investment opportunities for",
    focus_areas: &[
        "ROI optimization and investment strategies",
        "Funding mechanisms and capital structure",
        "Cost-benefit analysis and financial modeling",
        "Cash flow management and liquidity planning",
    ],
};

static MARKET: AgentProfile = AgentProfile {
    name: AgentName::Market,
    title: "MARKET INTELLIGENCE",
    focus_terms: &["market", "competition", "customer", "demand", "canary"],
    triggers: &["market", "competitor", "competition", "customer", "demand", "pricing"],
    instruction: "Analyze market opportunities and competitive landscape for",
    focus_areas: &[
        "Market size, growth potential and trends",
        "Competitive landscape and positioning",
        "Customer segments and value propositions",
        "Market entry strategies and barriers",
    ],
};

static RISK: AgentProfile = AgentProfile {
    name: AgentName::Risk,
    title: "RISK ANALYSIS",
    focus_terms: &["risk", "assessment", "mitigation", "exposure", "climate"],
    triggers: &["risk", "threat", "exposure", "mitigation", "downside", "contingency"],
    instruction: "Analyze risks and mitigation strategies for",
    focus_areas: &[
        "Market and operational risk assessment",
        "Regulatory and compliance risks",
        "Financial and liquidity risks",
        "Environmental and climate considerations",
    ],
};

static COMPLIANCE: AgentProfile = AgentProfile {
    name: AgentName::Compliance,
    title: "COMPLIANCE ANALYSIS",
    focus_terms: &["compliance", "regulatory", "legal", "permit", "eu"],
    triggers: &["compliance", "regulation", "regulatory", "legal", "permit", "license", "gdpr"],
    instruction: "Analyze compliance and regulatory requirements for",
    focus_areas: &[
        "Spanish and EU regulatory requirements",
        "Special economic zone obligations and benefits",
        "Environmental and sustainability compliance",
        "Data protection and privacy regulations",
    ],
};

static INNOVATION: AgentProfile = AgentProfile {
    name: AgentName::Innovation,
    title: "INNOVATION ANALYSIS",
    focus_terms: &["innovation", "technology", "digital", "automation", "research"],
    triggers: &["innovation", "technology", "digital", "automation", "ai", "r&d"],
    instruction: "Analyze innovation opportunities and technology applications for",
    focus_areas: &[
        "Digital transformation opportunities",
        "Emerging technology applications",
        "Innovation ecosystem and partnerships",
        "AI and automation integration",
    ],
};

static GREEN_HILL: AgentProfile = AgentProfile {
    name: AgentName::GreenHill,
    title: "GREEN HILL PROJECT BRIEF",
    focus_terms: &["green", "hill", "project", "sustainability", "shareholder"],
    triggers: &["green hill", "sustainability", "shareholder", "esg", "renewable"],
    instruction: "Summarize the project position and shareholder-relevant facts for",
    focus_areas: &[
        "Project milestones and delivery status",
        "Sustainability commitments and ESG posture",
        "Shareholder-relevant commitments and disclosures",
    ],
};

/// Profile for `agent`.
pub fn profile(agent: AgentName) -> &'static AgentProfile {
    match agent {
        AgentName::Strategy => &STRATEGY,
        AgentName::Operations => &OPERATIONS,
        AgentName::Finance => &FINANCE,
        AgentName::Market => &MARKET,
        AgentName::Risk => &RISK,
        AgentName::Compliance => &COMPLIANCE,
        AgentName::Innovation => &INNOVATION,
        AgentName::GreenHill => &GREEN_HILL,
    }
}
