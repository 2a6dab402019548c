//! Shared scaffolding for the scenario tests (spec.md §8's S1-S6). Unlike
//! the corpus's own `tests/src/fixtures.rs` -- which builds a release
//! binary and drives it as a subprocess, since that system's surface is a
//! CLI -- this system has no CLI (spec.md §1), so the fixtures here are
//! just a small git repository builder (shared with `file_resolver.rs`'s
//! own inline test helper) and a couple of `Investigation` constructors.

use std::process::Command;

use riskgraph_kernel::investigation::{
    ChangeStatus, ChangedFile, Investigation, InvestigationBudgets, ModificationType,
    Phase0Classification,
};

/// A repo with one file (`auth/login.py`) committed, then renamed to
/// `src/auth/login.py` in a second commit -- the exact shape spec.md §8's
/// S2 ("Renamed file carries history") names.
pub fn repo_with_renamed_file() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let run = |args: &[&str]| {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir.path())
            .status()
            .unwrap();
        assert!(status.success());
    };
    run(&["init", "-q"]);
    run(&["config", "user.email", "dev@example.com"]);
    run(&["config", "user.name", "dev"]);
    std::fs::create_dir_all(dir.path().join("auth")).unwrap();
    std::fs::write(dir.path().join("auth/login.py"), "print('login')\n").unwrap();
    run(&["add", "."]);
    run(&["commit", "-q", "-m", "add login"]);

    std::fs::create_dir_all(dir.path().join("src/auth")).unwrap();
    run(&["mv", "auth/login.py", "src/auth/login.py"]);
    run(&["commit", "-q", "-m", "rename: move under src/"]);
    dir
}

fn budgets(max_hops: u32) -> InvestigationBudgets {
    InvestigationBudgets {
        max_hops,
        hop_timeout_secs: 60,
        total_timeout_secs: 600,
        history_token_budget: 2_000.0,
        hard_token_budget: 50_000.0,
    }
}

/// A documentation-only change, the shape S4 ("Documentation change
/// terminates fast") describes: `modification_type=Documentation`, a
/// single modified file whose diff never touches a runtime surface.
pub fn documentation_investigation(id: &str) -> Investigation {
    Investigation::new(
        id,
        "repo-1",
        vec![ChangedFile {
            current_path: "docs/guide.md".to_string(),
            change_status: ChangeStatus::Modified,
            additions: 12,
            deletions: 3,
            truncated_diff: "+Updated the setup instructions.\n".to_string(),
        }],
        Phase0Classification {
            modification_type: ModificationType::Documentation,
            reason: "only markdown under docs/ changed".to_string(),
        },
        budgets(30),
    )
}

/// A general-surface change under investigation, used by the
/// incident-escalation (S5) and budget-exhaustion (S6) scenarios.
pub fn general_investigation(id: &str, max_hops: u32) -> Investigation {
    Investigation::new(
        id,
        "repo-1",
        vec![ChangedFile {
            current_path: "src/payments/charge.rs".to_string(),
            change_status: ChangeStatus::Modified,
            additions: 40,
            deletions: 8,
            truncated_diff: "+retry logic around the charge call\n".to_string(),
        }],
        Phase0Classification {
            modification_type: ModificationType::General,
            reason: "touches payment-processing control flow".to_string(),
        },
        budgets(max_hops),
    )
}
