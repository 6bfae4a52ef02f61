//! UV index severity bands.

/// Ordered UV severity band. Upper edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// UV ≤ 3
    Low,
    /// UV ≤ 6
    Moderate,
    /// UV ≤ 8
    High,
    /// UV ≤ 11
    VeryHigh,
    /// UV > 11
    Extreme,
}

impl Severity {
    pub fn classify(uv: f64) -> Self {
        if uv <= 3.0 {
            Severity::Low
        } else if uv <= 6.0 {
            Severity::Moderate
        } else if uv <= 8.0 {
            Severity::High
        } else if uv <= 11.0 {
            Severity::VeryHigh
        } else {
            Severity::Extreme
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "vrijwel geen",
            Severity::Moderate => "matig",
            Severity::High => "sterk",
            Severity::VeryHigh => "zeer sterk",
            Severity::Extreme => "extreem",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Low => "🟩",
            Severity::Moderate => "🟨",
            Severity::High => "🟧",
            Severity::VeryHigh => "🟥",
            Severity::Extreme => "🟪",
        }
    }
}
