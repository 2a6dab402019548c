//! Risk scoring: the weighted derivation and threshold mapping from
//! spec.md §4.9 "Risk score derivation". Pure; no I/O.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
            RiskLevel::Minimal => "MINIMAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(RiskLevel::Critical),
            "HIGH" => Ok(RiskLevel::High),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "LOW" => Ok(RiskLevel::Low),
            "MINIMAL" => Ok(RiskLevel::Minimal),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

/// Maps a `[0,1]` risk score to a level using the fixed thresholds in
/// spec.md §4.9. Boundaries are inclusive on the lower bound of the higher
/// level (`score == 0.8` is `CRITICAL`).
pub fn risk_level_for_score(score: f64) -> RiskLevel {
    if score >= 0.8 {
        RiskLevel::Critical
    } else if score >= 0.6 {
        RiskLevel::High
    } else if score >= 0.4 {
        RiskLevel::Medium
    } else if score >= 0.2 {
        RiskLevel::Low
    } else {
        RiskLevel::Minimal
    }
}

/// The three evidence signals feeding the weighted risk score (spec.md
/// §4.9): each is already normalized to `[0,1]` by the caller (a max or
/// mean over the relevant evidence list, capped at 1.0).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskSignals {
    pub incident_severity: f64,
    pub cochange_severity: f64,
    pub ownership_staleness: f64,
}

pub const INCIDENT_WEIGHT: f64 = 0.5;
pub const COCHANGE_WEIGHT: f64 = 0.3;
pub const OWNERSHIP_WEIGHT: f64 = 0.2;

/// Weighted 50/30/20 risk-score derivation, capped to `[0,1]`.
pub fn derive_risk_score(signals: RiskSignals) -> f64 {
    let raw = INCIDENT_WEIGHT * signals.incident_severity.min(1.0).max(0.0)
        + COCHANGE_WEIGHT * signals.cochange_severity.min(1.0).max(0.0)
        + OWNERSHIP_WEIGHT * signals.ownership_staleness.min(1.0).max(0.0);
    raw.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_map_exactly() {
        assert_eq!(risk_level_for_score(0.8), RiskLevel::Critical);
        assert_eq!(risk_level_for_score(0.79999), RiskLevel::High);
        assert_eq!(risk_level_for_score(0.6), RiskLevel::High);
        assert_eq!(risk_level_for_score(0.59999), RiskLevel::Medium);
        assert_eq!(risk_level_for_score(0.4), RiskLevel::Medium);
        assert_eq!(risk_level_for_score(0.39999), RiskLevel::Low);
        assert_eq!(risk_level_for_score(0.2), RiskLevel::Low);
        assert_eq!(risk_level_for_score(0.19999), RiskLevel::Minimal);
        assert_eq!(risk_level_for_score(0.0), RiskLevel::Minimal);
    }

    #[test]
    fn weighted_score_matches_formula() {
        let signals = RiskSignals {
            incident_severity: 1.0,
            cochange_severity: 1.0,
            ownership_staleness: 1.0,
        };
        assert!((derive_risk_score(signals) - 1.0).abs() < 1e-9);

        let signals = RiskSignals {
            incident_severity: 1.0,
            cochange_severity: 0.0,
            ownership_staleness: 0.0,
        };
        assert!((derive_risk_score(signals) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn signals_outside_range_are_clamped() {
        let signals = RiskSignals {
            incident_severity: 2.0,
            cochange_severity: -1.0,
            ownership_staleness: 0.0,
        };
        assert!((derive_risk_score(signals) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn round_trip_via_str() {
        for level in [
            RiskLevel::Minimal,
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            let parsed: RiskLevel = level.as_str().parse().unwrap();
            assert_eq!(parsed, level);
        }
    }
}
