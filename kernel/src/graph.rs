//! Node and edge vocabulary for the historical knowledge graph (spec.md §3).
//!
//! This module carries no I/O; it only names the shapes the graph store
//! writes and the pure rule that keeps Tier-A and Tier-B edges from
//! colliding.

use serde::{Deserialize, Serialize};

/// Unique identity of a node, matching the natural keys in spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKey {
    Repository { repo_id: String },
    Developer { email: String },
    Commit { sha: String },
    Pr { repo_id: String, number: i64 },
    Issue { repo_id: String, number: i64 },
    File { repo_id: String, path: String },
}

impl NodeKey {
    /// The graph label this key's node is stored under. `PR` and `Issue`
    /// both key on `(repo_id, number)` -- a repo where a PR and an issue
    /// share a number is within the data model's contract (spec.md §3 names
    /// them as two independent unique constraints), so any edge match
    /// against a `NodeKey` must constrain on this label, not just the
    /// property values, or it can attach to the wrong node.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKey::Repository { .. } => "Repository",
            NodeKey::Developer { .. } => "Developer",
            NodeKey::Commit { .. } => "Commit",
            NodeKey::Pr { .. } => "PR",
            NodeKey::Issue { .. } => "Issue",
            NodeKey::File { .. } => "File",
        }
    }
}

/// The two confidence tiers an edge can belong to. Tier A is definitive
/// (confidence is implicitly 1.0); Tier B is inferred and carries an
/// explicit confidence in `[0.4, 0.95]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeTier {
    Definitive,
    Inferred,
}

/// Tier-A edge kinds. Every variant is derived purely from Git/GitHub
/// metadata, never from text heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefinitiveEdgeKind {
    Authored,
    Modified,
    Created,
    MergedAs,
    References,
    ClosedBy,
}

impl DefinitiveEdgeKind {
    pub fn label(self) -> &'static str {
        match self {
            DefinitiveEdgeKind::Authored => "AUTHORED",
            DefinitiveEdgeKind::Modified => "MODIFIED",
            DefinitiveEdgeKind::Created => "CREATED",
            DefinitiveEdgeKind::MergedAs => "MERGED_AS",
            DefinitiveEdgeKind::References => "REFERENCES",
            DefinitiveEdgeKind::ClosedBy => "CLOSED_BY",
        }
    }

    /// The semantic category used by the collision rule: two edges collide
    /// only if they connect the same ordered pair under the same category,
    /// e.g. a `REFERENCES`/`ASSOCIATED_WITH` pair both describe "this issue
    /// relates to this PR/commit".
    pub fn semantic_category(self) -> SemanticCategory {
        match self {
            DefinitiveEdgeKind::References | DefinitiveEdgeKind::ClosedBy => {
                SemanticCategory::IssueToFix
            }
            DefinitiveEdgeKind::MergedAs => SemanticCategory::PrToCommit,
            DefinitiveEdgeKind::Authored => SemanticCategory::Authorship,
            DefinitiveEdgeKind::Modified => SemanticCategory::FileTouch,
            DefinitiveEdgeKind::Created => SemanticCategory::Authorship,
        }
    }
}

/// Tier-B edge kinds. Kept as a tagged enum on a single record type rather
/// than a subclass hierarchy per spec.md §9's "Inferred polymorphism" note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InferredEdgeKind {
    AssociatedWith,
    /// A specialization of `ASSOCIATED_WITH` emitted when the extracted
    /// action is "fixes" (spec.md §3). Kept distinct from the resolved
    /// open question of collapsing the two: see SPEC_FULL.md.
    FixedBy,
}

impl InferredEdgeKind {
    pub fn label(self) -> &'static str {
        match self {
            InferredEdgeKind::AssociatedWith => "ASSOCIATED_WITH",
            InferredEdgeKind::FixedBy => "FIXED_BY",
        }
    }

    pub fn semantic_category(self) -> SemanticCategory {
        SemanticCategory::IssueToFix
    }
}

/// Coarse category used only to decide whether two edges collide. Distinct
/// from the edge kind itself: several definitive kinds and both inferred
/// kinds can share a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticCategory {
    IssueToFix,
    PrToCommit,
    Authorship,
    FileTouch,
}

/// How a Tier-B edge was detected; carried as an audit field (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectedVia {
    CommitExtraction,
    PrExtraction,
    Temporal,
    LlmLinkResolution,
}

/// Per-check validator flags carried on every Tier-B edge (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationFlags {
    pub temporal_validated: bool,
    pub semantic_validated: bool,
    pub file_overlap_validated: bool,
}

impl ValidationFlags {
    pub fn passed_count(self) -> u8 {
        self.temporal_validated as u8 + self.semantic_validated as u8 + self.file_overlap_validated as u8
    }
}

/// A candidate or accepted Tier-B edge, prior to being written to the
/// graph store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferredEdge {
    pub kind: InferredEdgeKind,
    pub from: NodeKey,
    pub to: NodeKey,
    pub confidence: f64,
    pub detected_via: DetectedVia,
    pub evidence: String,
    pub flags: ValidationFlags,
}

/// Minimum/maximum confidence a Tier-B edge may carry (spec.md §3).
pub const INFERRED_CONFIDENCE_FLOOR: f64 = 0.4;
pub const INFERRED_CONFIDENCE_CEIL: f64 = 0.95;

/// The central collision invariant: an ordered pair may carry at most one
/// edge in a given semantic category, preferring whichever tier already
/// exists. Returns `true` if writing `candidate_tier`/`candidate_category`
/// between the same pair that already has `existing_tier` would violate
/// the invariant.
pub fn would_collide(existing_tier: EdgeTier, candidate_tier: EdgeTier) -> bool {
    match (existing_tier, candidate_tier) {
        (EdgeTier::Definitive, EdgeTier::Inferred) => true,
        (EdgeTier::Definitive, EdgeTier::Definitive) => false,
        (EdgeTier::Inferred, _) => false,
    }
}

/// The multiplier/threshold knobs C3's acceptance math depends on (spec.md
/// §4.3 steps 3-4), lifted out of `LinkResolverConfig` so this function
/// stays decoupled from the config crate's load path.
#[derive(Debug, Clone, Copy)]
pub struct LinkScoringParams {
    pub base_confidence_prior: f64,
    pub temporal_multiplier: f64,
    pub semantic_multiplier: f64,
    pub file_overlap_multiplier: f64,
    pub confidence_ceiling: f64,
    pub acceptance_floor: f64,
    pub min_validators_passed: u8,
}

/// Applies spec.md §4.3 steps 3-4 to one candidate's validator flags: base
/// prior times whichever multipliers passed, capped at the ceiling,
/// rejected below either the validator-count floor or the confidence floor.
/// Pure -- no I/O, so it's the one place S3's exact literal values (§8) are
/// checked without touching a staging or graph store.
pub fn score_candidate(flags: ValidationFlags, params: LinkScoringParams) -> Option<f64> {
    if flags.passed_count() < params.min_validators_passed {
        return None;
    }

    let mut confidence = params.base_confidence_prior;
    if flags.temporal_validated {
        confidence *= params.temporal_multiplier;
    }
    if flags.semantic_validated {
        confidence *= params.semantic_multiplier;
    }
    if flags.file_overlap_validated {
        confidence *= params.file_overlap_multiplier;
    }
    confidence = confidence.min(params.confidence_ceiling);

    if confidence < params.acceptance_floor {
        return None;
    }
    Some(confidence)
}

pub fn validate_inferred_confidence(confidence: f64) -> Result<(), String> {
    if confidence >= 1.0 {
        return Err(format!(
            "confidence {confidence} is reserved for Tier-A edges and cannot be used for an inferred edge"
        ));
    }
    if confidence < INFERRED_CONFIDENCE_FLOOR {
        return Err(format!(
            "confidence {confidence} is below the inferred-edge floor {INFERRED_CONFIDENCE_FLOOR}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitive_then_inferred_collides() {
        assert!(would_collide(EdgeTier::Definitive, EdgeTier::Inferred));
    }

    #[test]
    fn definitive_then_definitive_does_not_collide() {
        assert!(!would_collide(EdgeTier::Definitive, EdgeTier::Definitive));
    }

    #[test]
    fn inferred_existing_never_blocks() {
        assert!(!would_collide(EdgeTier::Inferred, EdgeTier::Inferred));
        assert!(!would_collide(EdgeTier::Inferred, EdgeTier::Definitive));
    }

    #[test]
    fn confidence_ceiling_rejected() {
        assert!(validate_inferred_confidence(1.0).is_err());
    }

    #[test]
    fn confidence_floor_rejected() {
        assert!(validate_inferred_confidence(0.39).is_err());
    }

    #[test]
    fn confidence_in_range_accepted() {
        assert!(validate_inferred_confidence(0.6).is_ok());
    }

    #[test]
    fn references_and_closed_by_share_category() {
        assert_eq!(
            DefinitiveEdgeKind::References.semantic_category(),
            DefinitiveEdgeKind::ClosedBy.semantic_category()
        );
        assert_eq!(
            DefinitiveEdgeKind::References.semantic_category(),
            InferredEdgeKind::AssociatedWith.semantic_category()
        );
    }
}
