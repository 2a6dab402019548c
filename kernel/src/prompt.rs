//! Deterministic kickoff-prompt assembly (spec.md §4.7). No LLM calls; pure
//! string construction from typed inputs, so the exact prompt text is
//! unit-testable without a live model.

use crate::investigation::{ChangedFile, ModificationType, Phase0Classification};
use crate::resolution::ResolvedPath;

/// The repository's link-quality grade (spec.md glossary: "CLQS"), reported
/// to the investigator as prior context.
#[derive(Debug, Clone, Copy)]
pub struct DataQualityContext {
    pub issue_pr_link_coverage: f64,
    pub evidence_diversity: f64,
    pub temporal_precision: f64,
    pub semantic_strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl DataQualityContext {
    pub fn overall(&self) -> f64 {
        (self.issue_pr_link_coverage
            + self.evidence_diversity
            + self.temporal_precision
            + self.semantic_strength)
            / 4.0
    }

    pub fn grade(&self) -> Grade {
        let overall = self.overall();
        if overall >= 0.9 {
            Grade::A
        } else if overall >= 0.75 {
            Grade::B
        } else if overall >= 0.6 {
            Grade::C
        } else if overall >= 0.4 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

/// Pre-computed Phase 1 signals for one changed file (spec.md §4.7 point
/// 3).
#[derive(Debug, Clone, Copy)]
pub struct Phase1Metrics {
    pub coupling_score: f64,
    pub cochange_max_frequency: f64,
    pub incident_count_in_window: u32,
    pub churn: f64,
    pub ownership_staleness_days: u32,
}

/// Everything C7 needs, gathered by the caller from C1/C2/C6 and the
/// Phase-1/Phase-0 collaborators.
pub struct KickoffInputs<'a> {
    pub changed_files: &'a [ChangedFile],
    pub resolutions: &'a [(String, Vec<ResolvedPath>)],
    pub phase1_by_path: &'a [(String, Phase1Metrics)],
    pub phase0: &'a Phase0Classification,
    pub data_quality: DataQualityContext,
}

fn role_frame() -> String {
    "You are a pre-commit regression-risk investigator. Your job is \
incident prevention: decide how likely this change is to cause a \
production incident, and why, by correlating it against the \
repository's historical knowledge graph. You are explicitly NOT \
responsible for general code review, style, lint findings, or \
generic bug-hunting unrelated to incident risk -- do not comment on \
those. Stay scoped to incident prevention or the investigation drifts \
into generic review."
        .to_string()
}

fn data_quality_section(dq: DataQualityContext) -> String {
    let grade = match dq.grade() {
        Grade::A => "A",
        Grade::B => "B",
        Grade::C => "C",
        Grade::D => "D",
        Grade::F => "F",
    };
    let guidance = match dq.grade() {
        Grade::A | Grade::B => {
            "This repository's issue/PR/commit linkage is high quality. Trust the \
historical evidence you retrieve; do not second-guess well-linked incidents."
        }
        _ => {
            "This repository's issue/PR/commit linkage is weak or sparse. Weight \
structural signals (co-change, ownership staleness) more heavily than sparse \
historical links, which may be incomplete rather than absent."
        }
    };
    format!(
        "## Data quality\n\
Link-quality grade: {grade} (coverage={:.2}, evidence_diversity={:.2}, \
temporal_precision={:.2}, semantic_strength={:.2}).\n{guidance}",
        dq.issue_pr_link_coverage, dq.evidence_diversity, dq.temporal_precision, dq.semantic_strength
    )
}

fn phase1_section(phase1_by_path: &[(String, Phase1Metrics)]) -> String {
    let mut out = String::from(
        "## Phase 1 signals (already computed; investigate, do not re-derive)\n",
    );
    for (path, m) in phase1_by_path {
        out.push_str(&format!(
            "- {path}: coupling={:.2}, max_cochange_freq={:.2}, incidents_in_window={}, \
churn={:.2}, ownership_stale_days={}\n",
            m.coupling_score, m.cochange_max_frequency, m.incident_count_in_window, m.churn,
            m.ownership_staleness_days
        ));
    }
    out
}

fn per_file_section(inputs: &KickoffInputs) -> String {
    let mut out = String::from("## Changed files\n");
    for file in inputs.changed_files {
        let resolutions = inputs
            .resolutions
            .iter()
            .find(|(path, _)| path == &file.current_path)
            .map(|(_, r)| r.as_slice())
            .unwrap_or(&[]);
        out.push_str(&format!(
            "### {}\nstatus={:?} +{} -{}\n",
            file.current_path, file.change_status, file.additions, file.deletions
        ));
        if resolutions.is_empty() {
            out.push_str("no historical aliases resolved.\n");
        } else {
            out.push_str("historical aliases (query entry points):\n");
            for r in resolutions {
                out.push_str(&format!(
                    "  - {} (method={}, confidence={:.2})\n",
                    r.historical_path,
                    r.method.label(),
                    r.confidence
                ));
            }
        }
        let diff: String = file.truncated_diff.chars().take(300).collect();
        out.push_str(&format!("diff (truncated): {diff}\n\n"));
    }
    out
}

fn task_guidance_section(inputs: &KickoffInputs) -> String {
    let mut focus_areas = Vec::new();
    let large_change = inputs
        .changed_files
        .iter()
        .any(|f| f.additions + f.deletions > 200);
    if large_change {
        focus_areas.push(
            "This is a large change. Ask what kind of change it is (refactor, new \
feature, behavioral fix) before judging risk from size alone.",
        );
    }
    let has_incident_history = inputs
        .phase1_by_path
        .iter()
        .any(|(_, m)| m.incident_count_in_window > 0);
    if has_incident_history {
        focus_areas.push(
            "At least one file has prior incidents in the configured window. Ask \
whether the proposed change matches the pattern of a prior bug -- a past revert \
means a past bug, and a diff matching the pre-revert pattern is escalation, not \
reassurance, even if the revert looks like it 'fixed' things.",
        );
    }
    let many_aliases = inputs
        .resolutions
        .iter()
        .any(|(_, r)| r.len() > 2);
    if many_aliases {
        focus_areas.push(
            "At least one file has many historical aliases (renames). Ask whether the \
current owner is aware of the file's rename history and any incidents tied to its \
old paths.",
        );
    }
    let phase0_note = match inputs.phase0.modification_type {
        ModificationType::Documentation => {
            "Phase 0 classified this as a documentation change. If the runtime \
surface is genuinely unchanged, you may finalize quickly with low risk."
        }
        ModificationType::Security => {
            "Phase 0 flagged this as touching security-sensitive code. Treat \
ownership staleness and incident history with extra weight."
        }
        _ => "",
    };

    let mut out = String::from("## Task guidance\n");
    for area in focus_areas {
        out.push_str(&format!("- {area}\n"));
    }
    if !phase0_note.is_empty() {
        out.push_str(&format!("- {phase0_note}\n"));
    }
    out
}

fn output_contract_section() -> String {
    "## Output contract\n\
When you call `finish_investigation`, you must provide: risk_level \
(CRITICAL/HIGH/MEDIUM/LOW/MINIMAL), confidence in [0,1], a summary, a \
reasoning trace, and recommendations. Evidence must be enumerated -- \
specific incident titles, commit SHAs, developer names, and co-change \
counts. Do not substitute vague summaries like \"multiple incidents\" for \
the enumerated list of which incidents, with their identifiers."
        .to_string()
}

/// Assembles the investigator's first-turn prompt in the fixed order
/// spec.md §4.7 specifies. Order is part of the contract; callers must not
/// reorder these sections.
pub fn build_kickoff_prompt(inputs: &KickoffInputs) -> String {
    let mut sections = Vec::new();
    sections.push(role_frame());
    sections.push(data_quality_section(inputs.data_quality));
    sections.push(phase1_section(inputs.phase1_by_path));
    sections.push(per_file_section(inputs));
    sections.push(task_guidance_section(inputs));
    sections.push(output_contract_section());
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation::ChangeStatus;

    fn sample_inputs() -> (Vec<ChangedFile>, Phase0Classification) {
        let files = vec![ChangedFile {
            current_path: "src/auth/login.py".into(),
            change_status: ChangeStatus::Modified,
            additions: 10,
            deletions: 2,
            truncated_diff: "- old\n+ new".into(),
        }];
        let phase0 = Phase0Classification {
            modification_type: ModificationType::General,
            reason: "generic".into(),
        };
        (files, phase0)
    }

    #[test]
    fn sections_appear_in_order() {
        let (files, phase0) = sample_inputs();
        let resolutions = vec![];
        let phase1 = vec![];
        let dq = DataQualityContext {
            issue_pr_link_coverage: 0.9,
            evidence_diversity: 0.9,
            temporal_precision: 0.9,
            semantic_strength: 0.9,
        };
        let inputs = KickoffInputs {
            changed_files: &files,
            resolutions: &resolutions,
            phase1_by_path: &phase1,
            phase0: &phase0,
            data_quality: dq,
        };
        let prompt = build_kickoff_prompt(&inputs);
        let role_idx = prompt.find("incident prevention").unwrap();
        let quality_idx = prompt.find("Link-quality grade").unwrap();
        let phase1_idx = prompt.find("Phase 1 signals").unwrap();
        let files_idx = prompt.find("Changed files").unwrap();
        let guidance_idx = prompt.find("Task guidance").unwrap();
        let contract_idx = prompt.find("Output contract").unwrap();
        assert!(role_idx < quality_idx);
        assert!(quality_idx < phase1_idx);
        assert!(phase1_idx < files_idx);
        assert!(files_idx < guidance_idx);
        assert!(guidance_idx < contract_idx);
    }

    #[test]
    fn grade_reflects_overall_quality() {
        let dq = DataQualityContext {
            issue_pr_link_coverage: 0.2,
            evidence_diversity: 0.2,
            temporal_precision: 0.2,
            semantic_strength: 0.2,
        };
        assert_eq!(dq.grade(), Grade::F);
    }

    #[test]
    fn documentation_note_appears_for_doc_changes() {
        let (files, _) = sample_inputs();
        let phase0 = Phase0Classification {
            modification_type: ModificationType::Documentation,
            reason: "docs only".into(),
        };
        let resolutions = vec![];
        let phase1 = vec![];
        let dq = DataQualityContext {
            issue_pr_link_coverage: 0.9,
            evidence_diversity: 0.9,
            temporal_precision: 0.9,
            semantic_strength: 0.9,
        };
        let inputs = KickoffInputs {
            changed_files: &files,
            resolutions: &resolutions,
            phase1_by_path: &phase1,
            phase0: &phase0,
            data_quality: dq,
        };
        let prompt = build_kickoff_prompt(&inputs);
        assert!(prompt.contains("documentation change"));
    }
}
