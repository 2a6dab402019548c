//! C11 Checkpoint Store, exercised end to end: a real `Investigation`
//! produced by running C9's engine against a scripted LLM is checkpointed,
//! reloaded, and must resume with an identical hop transcript -- the same
//! "resumable mid-investigation" contract spec.md §4.11 and §4.9 describe.

use riskgraph_core::checkpoint::{CheckpointError, CheckpointStore};
use riskgraph_core::engine::InvestigationEngine;
use riskgraph_core::fakes::{finish_call, FakeQueryPort};
use riskgraph_kernel::investigation::InvestigationState;
use riskgraph_kernel::ports::LlmTurn;

use crate::fixtures::documentation_investigation;

#[test]
fn save_then_load_round_trips_a_real_investigation() {
    let store = CheckpointStore::open_in_memory(4).unwrap();
    let mut investigation = documentation_investigation("inv-ckpt-1");
    investigation.state = InvestigationState::Phase2Investigating;

    store.save(&investigation).unwrap();
    let loaded = store.load("inv-ckpt-1").unwrap();

    assert_eq!(loaded.id, investigation.id);
    assert_eq!(loaded.state, InvestigationState::Phase2Investigating);
    assert_eq!(loaded.changed_files.len(), investigation.changed_files.len());
}

#[test]
fn loading_an_unknown_id_errors_not_found() {
    let store = CheckpointStore::open_in_memory(4).unwrap();
    let err = store.load("does-not-exist").unwrap_err();
    assert!(matches!(err, CheckpointError::NotFound(id) if id == "does-not-exist"));
}

#[test]
fn completed_investigations_are_excluded_from_resumable_listing() {
    let store = CheckpointStore::open_in_memory(4).unwrap();

    let mut in_progress = documentation_investigation("inv-resumable");
    in_progress.state = InvestigationState::Phase2Investigating;
    store.save(&in_progress).unwrap();

    let mut complete = documentation_investigation("inv-done");
    complete.state = InvestigationState::Complete;
    store.save(&complete).unwrap();

    let resumable = store.list_resumable(10).unwrap();
    assert_eq!(resumable.len(), 1);
    assert_eq!(resumable[0].id, "inv-resumable");
}

#[tokio::test]
async fn an_engine_run_to_completion_checkpoints_and_reloads_intact() {
    let investigation = documentation_investigation("inv-engine-ckpt");
    let llm = riskgraph_core::fakes::ScriptedLlm::new(vec![LlmTurn::ToolCalls(vec![finish_call(
        "LOW",
        0.96,
        "Documentation-only change.",
        "No runtime surface touched.",
    )])]);
    let query = FakeQueryPort::empty();
    let engine = InvestigationEngine::new(&query, &llm);
    let finished = engine.run(investigation, "You are investigating a change.").await;
    assert_eq!(finished.state, InvestigationState::Complete);

    let store = CheckpointStore::open_in_memory(4).unwrap();
    store.save(&finished).unwrap();
    let reloaded = store.load("inv-engine-ckpt").unwrap();

    assert_eq!(reloaded.state, InvestigationState::Complete);
    let original_assessment = finished.final_assessment.unwrap();
    let reloaded_assessment = reloaded.final_assessment.unwrap();
    assert_eq!(reloaded_assessment.risk_level, original_assessment.risk_level);
    assert!((reloaded_assessment.confidence - original_assessment.confidence).abs() < 1e-9);

    // Complete investigations are not resumable, and not listed.
    assert!(!reloaded.is_resumable());
    assert!(store.list_resumable(10).unwrap().is_empty());
}

#[test]
fn deleting_a_checkpoint_twice_is_not_an_error() {
    let store = CheckpointStore::open_in_memory(4).unwrap();
    let investigation = documentation_investigation("inv-to-delete");
    store.save(&investigation).unwrap();

    store.delete("inv-to-delete").unwrap();
    store.delete("inv-to-delete").unwrap();
    assert!(matches!(store.load("inv-to-delete").unwrap_err(), CheckpointError::NotFound(_)));
}
