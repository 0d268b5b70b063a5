//! Lifecycle tests for the open-loop router.
//!
//! Drive `TaskRouter::route` through multi-step auto-loops with scripted
//! collaborators and check the journal and narrative logs they leave.

use std::fs;
use std::sync::Arc;
use std::thread;

use serde_json::Value;
use taskrouter::core::guard::{check_ack, extract_task};
use taskrouter::route::RouteRequest;
use taskrouter::test_support::{AckingInvoker, ScriptedOracle, router_in};

fn types(records: &[Value]) -> Vec<&str> {
    records
        .iter()
        .map(|r| r["type"].as_str().unwrap_or_default())
        .collect()
}

/// Full auto-loop: kickoff -> two oracle hops -> DONE.
///
/// Checks the step counter, the per-step journal pairs, the final summary in
/// both narrative logs, and that each worker saw only its own guarded task.
#[test]
fn kickoff_runs_to_done_and_journals_every_step() {
    let temp = tempfile::tempdir().expect("tempdir");
    let oracle = ScriptedOracle::new(vec![
        "BackendDeveloper: add /api/signup".to_string(),
        "TestRunner: run the suite".to_string(),
        "DONE\nSignup shipped".to_string(),
    ]);
    let router = router_in(temp.path(), AckingInvoker::default(), oracle);

    let response = router
        .route(RouteRequest {
            from_taskrouter: true,
            workflow_id: Some("wf-signup".to_string()),
            ..RouteRequest::new("FileCreator: scaffold signup page")
        })
        .expect("route");

    assert!(response.done);
    assert_eq!(response.step, 3);

    let records = router.sink().journal_records().expect("records");
    assert_eq!(
        types(&records),
        vec![
            "step",
            "agent_response",
            "step",
            "agent_response",
            "step",
            "agent_response",
            "done"
        ]
    );
    assert!(records.iter().all(|r| r["workflow_id"] == "wf-signup"));
    assert_eq!(records[2]["agent"], "BackendDeveloper");
    assert_eq!(records[6]["step"], 3);

    let response_text = records[3]["response"].as_str().expect("response");
    assert!(
        check_ack(response_text, "BackendDeveloper", "API & Services Policy").is_matched()
    );

    let paths = router.sink().paths();
    let step_log = fs::read_to_string(&paths.step_log_path).expect("step log");
    assert_eq!(step_log.matches("| `wf-signup` |").count(), 3);
    assert!(step_log.contains("Final Summary (wf-signup)"));
    let changelog = fs::read_to_string(&paths.summary_log_path).expect("changelog");
    assert!(changelog.contains("Workflow wf-signup Completed"));
    assert!(changelog.contains("Signup shipped"));
}

#[test]
fn worker_receives_guarded_instruction_for_its_own_task() {
    let temp = tempfile::tempdir().expect("tempdir");
    let router = router_in(temp.path(), AckingInvoker::default(), ScriptedOracle::finishing());

    router
        .route(RouteRequest::new("UXResearcher: interview five users"))
        .expect("route");

    let request = router.invoker().last_request().expect("request");
    assert_eq!(request.agent_key, "ux-researcher");
    assert!(
        request
            .instruction
            .contains("rules loaded (agent=UXResearcher | rule=Research Artifacts Policy)")
    );
    assert_eq!(
        extract_task(&request.instruction),
        Some((
            "UXResearcher".to_string(),
            "interview five users".to_string()
        ))
    );
    assert_eq!(router.oracle().calls(), 0);
}

#[test]
fn step_cap_stops_and_writes_narrative_line() {
    let temp = tempfile::tempdir().expect("tempdir");
    let router = router_in(
        temp.path(),
        AckingInvoker::default(),
        ScriptedOracle::repeating("TestRunner: again"),
    );

    let response = router
        .route(RouteRequest {
            auto_loop: Some(true),
            max_steps: Some(2),
            ..RouteRequest::new("FileCreator: start")
        })
        .expect("route");

    assert!(response.stopped);
    assert_eq!(response.step, 2);
    let records = router.sink().journal_records().expect("records");
    let last = records.last().expect("last record");
    assert_eq!(last["type"], "stopped");
    assert_eq!(last["reason"], "max_steps");
    assert_eq!(last["max_steps"], 2);
    let step_log = fs::read_to_string(&router.sink().paths().step_log_path).expect("step log");
    assert!(step_log.contains("**Router** -> Stopped due to step limit (2)."));
}

#[test]
fn concurrent_workflows_keep_journal_lines_whole() {
    let temp = tempfile::tempdir().expect("tempdir");
    let router = Arc::new(router_in(
        temp.path(),
        AckingInvoker::default(),
        ScriptedOracle::repeating("TestRunner: again"),
    ));

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let router = Arc::clone(&router);
            thread::spawn(move || {
                router
                    .route(RouteRequest {
                        auto_loop: Some(true),
                        max_steps: Some(5),
                        workflow_id: Some(format!("wf-{n}")),
                        ..RouteRequest::new("FileCreator: start")
                    })
                    .expect("route")
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().expect("join").stopped);
    }

    let records = router.sink().journal_records().expect("every line parses");
    assert_eq!(records.len(), 4 * (5 * 2 + 1));
    for n in 0..4 {
        let id = format!("wf-{n}");
        let steps: Vec<u64> = records
            .iter()
            .filter(|r| r["workflow_id"] == id.as_str() && r["type"] == "step")
            .filter_map(|r| r["step"].as_u64())
            .collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
    }
}
