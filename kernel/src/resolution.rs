//! Shared types for path resolution (spec.md §4.5 "File Resolver"). The
//! actual git/filesystem work lives in `riskgraph-core`; this module only
//! names the result shape and the pure confidence bucketing per method, so
//! C5's implementation and C7's prompt builder agree on one type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionMethod {
    Exact,
    GitFollow,
    ContentSimilarity,
    Basename,
}

impl ResolutionMethod {
    pub fn label(self) -> &'static str {
        match self {
            ResolutionMethod::Exact => "exact",
            ResolutionMethod::GitFollow => "git-follow",
            ResolutionMethod::ContentSimilarity => "content-similarity",
            ResolutionMethod::Basename => "basename",
        }
    }

    /// The fixed confidence (or confidence range) spec.md §4.5 assigns to
    /// each method. `exact` and `git-follow` are point values; the other
    /// two are ranges whose exact value the caller computes from a
    /// similarity measure and then clamps into range with `clamp_to_range`.
    pub fn confidence_range(self) -> (f64, f64) {
        match self {
            ResolutionMethod::Exact => (1.0, 1.0),
            ResolutionMethod::GitFollow => (0.95, 0.95),
            ResolutionMethod::ContentSimilarity => (0.5, 0.85),
            ResolutionMethod::Basename => (0.3, 0.5),
        }
    }

    pub fn clamp_to_range(self, raw_confidence: f64) -> f64 {
        let (low, high) = self.confidence_range();
        raw_confidence.clamp(low, high)
    }
}

/// One historical path match returned by C5 (spec.md §4.5, §6
/// `ResolvePaths`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedPath {
    pub historical_path: String,
    pub confidence: f64,
    pub method: ResolutionMethod,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_git_follow_are_fixed() {
        assert_eq!(ResolutionMethod::Exact.clamp_to_range(0.3), 1.0);
        assert_eq!(ResolutionMethod::GitFollow.clamp_to_range(0.1), 0.95);
    }

    #[test]
    fn content_similarity_is_clamped_into_range() {
        assert_eq!(ResolutionMethod::ContentSimilarity.clamp_to_range(0.9), 0.85);
        assert_eq!(ResolutionMethod::ContentSimilarity.clamp_to_range(0.1), 0.5);
        assert_eq!(ResolutionMethod::ContentSimilarity.clamp_to_range(0.7), 0.7);
    }
}
