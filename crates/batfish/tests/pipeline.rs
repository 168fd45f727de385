//! Integration tests for the work lifecycle against an in-memory backend.
//!
//! These tests drive the executor through the same submit / poll / fetch
//! protocol the HTTP transport implements, with a scripted status sequence
//! and call counters in place of a coordinator.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use batfish::answer::Answer;
use batfish::error::{Error, Result};
use batfish::schema::SchemaValue;
use batfish::work::{TaskStatus, WorkBackend, WorkExecutor, WorkItem, WorkStatus};

#[derive(Debug, Default, Clone, Copy)]
struct Calls {
    queued: usize,
    status_checks: usize,
    fetches: usize,
    kills: usize,
}

/// Scripted coordinator: serves a fixed status sequence and counts calls.
struct FakeBackend {
    statuses: Mutex<Vec<WorkStatus>>,
    answer: String,
    fail_queue: bool,
    calls: Mutex<Calls>,
}

impl FakeBackend {
    fn new(statuses: Vec<WorkStatus>, answer: &str) -> FakeBackend {
        FakeBackend {
            statuses: Mutex::new(statuses),
            answer: answer.to_string(),
            fail_queue: false,
            calls: Mutex::new(Calls::default()),
        }
    }

    fn failing_submission() -> FakeBackend {
        FakeBackend {
            fail_queue: true,
            ..FakeBackend::new(vec![], "")
        }
    }

    fn calls(&self) -> Calls {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl WorkBackend for FakeBackend {
    async fn queue_work(&self, _item: &WorkItem) -> Result<()> {
        self.calls.lock().unwrap().queued += 1;
        if self.fail_queue {
            return Err(Error::Submission("queuework failed: worker unavailable".into()));
        }
        Ok(())
    }

    async fn work_status(&self, _work_id: &str) -> Result<(WorkStatus, TaskStatus)> {
        self.calls.lock().unwrap().status_checks += 1;
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.remove(0)
        } else {
            statuses[0]
        };
        Ok((status, TaskStatus::default()))
    }

    async fn get_object(
        &self,
        _network: &str,
        _snapshot: Option<&str>,
        _key: &str,
    ) -> Result<String> {
        self.calls.lock().unwrap().fetches += 1;
        Ok(self.answer.clone())
    }

    async fn kill_work(&self, _work_id: &str) -> Result<()> {
        self.calls.lock().unwrap().kills += 1;
        Ok(())
    }
}

fn executor(backend: &FakeBackend) -> WorkExecutor<'_> {
    WorkExecutor::new(backend).with_poll_interval(Duration::from_millis(1))
}

const TABLE_ANSWER: &str = r#"{
    "answerElements": [{
        "metadata": {"columnMetadata": [
            {"name": "Node", "schema": "Node"},
            {"name": "Interfaces", "schema": "List<Interface>"}
        ]},
        "rows": [{"Node": {"name": "r1"},
                  "Interfaces": [{"hostname": "r1", "interface": "eth0"}]}]
    }],
    "status": "SUCCESS",
    "question": {"instance": {"instanceName": "interfaceList"}}
}"#;

#[tokio::test]
async fn test_poll_sequence_counts_calls() {
    // ASSIGNED, ASSIGNED, TERMINATEDNORMALLY: three status checks, then
    // exactly one answer fetch
    let backend = FakeBackend::new(
        vec![
            WorkStatus::Assigned,
            WorkStatus::Assigned,
            WorkStatus::TerminatedNormally,
        ],
        "{}",
    );
    let item = WorkItem::answer_question("net", "snap", "q1");
    executor(&backend).execute(&item).await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.queued, 1);
    assert_eq!(calls.status_checks, 3);
    assert_eq!(calls.fetches, 1);
    assert_eq!(calls.kills, 0);
}

#[tokio::test]
async fn test_abnormal_termination_raises_without_fetch() {
    let backend = FakeBackend::new(
        vec![WorkStatus::Assigned, WorkStatus::TerminatedAbnormally],
        "{}",
    );
    let item = WorkItem::answer_question("net", "snap", "q1");
    let err = executor(&backend).execute(&item).await.unwrap_err();

    match err {
        Error::JobFailed { status, work_item } => {
            assert_eq!(status, WorkStatus::TerminatedAbnormally);
            assert!(work_item.contains(&item.id));
        }
        other => panic!("expected JobFailed, got {:?}", other),
    }
    assert_eq!(backend.calls().fetches, 0);
}

#[tokio::test]
async fn test_every_failure_status_raises() {
    for status in [
        WorkStatus::AssignmentError,
        WorkStatus::RequeueFailure,
        WorkStatus::TerminatedAbnormally,
        WorkStatus::TerminatedByUser,
    ] {
        let backend = FakeBackend::new(vec![status], "{}");
        let item = WorkItem::answer_question("net", "snap", "q1");
        let err = executor(&backend).execute(&item).await.unwrap_err();
        assert!(matches!(err, Error::JobFailed { .. }), "status {}", status);
    }
}

#[tokio::test]
async fn test_background_submission_never_polls() {
    let backend = FakeBackend::new(vec![WorkStatus::Unassigned], "{}");
    let item = WorkItem::answer_question("net", "snap", "q1");
    executor(&backend).submit(&item).await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.queued, 1);
    assert_eq!(calls.status_checks, 0);
    assert_eq!(calls.fetches, 0);
}

#[tokio::test]
async fn test_submission_failure_raises_before_polling() {
    let backend = FakeBackend::failing_submission();
    let item = WorkItem::answer_question("net", "snap", "q1");
    let err = executor(&backend).execute(&item).await.unwrap_err();

    assert!(matches!(err, Error::Submission(_)));
    assert_eq!(backend.calls().status_checks, 0);
}

#[tokio::test]
async fn test_answer_text_deserializes_into_table() {
    let backend = FakeBackend::new(vec![WorkStatus::TerminatedNormally], TABLE_ANSWER);
    let item = WorkItem::answer_question("net", "snap", "interfaceList");
    let text = executor(&backend).execute(&item).await.unwrap();

    let answer = Answer::parse(serde_json::from_str(&text).unwrap()).unwrap();
    assert_eq!(answer.question_name(), Some("interfaceList"));
    let table = answer.as_table().expect("table answer");
    assert_eq!(table.column_names(), vec!["Node", "Interfaces"]);
    assert_eq!(table.row_count(), 1);
    assert_eq!(
        table.rows[0].get("Node"),
        Some(&SchemaValue::Str("r1".into()))
    );
    match table.rows[0].get("Interfaces") {
        Some(SchemaValue::List(interfaces)) => assert_eq!(interfaces.len(), 1),
        other => panic!("expected interface list, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_to_completion_skips_answer_fetch() {
    let backend = FakeBackend::new(
        vec![WorkStatus::Assigned, WorkStatus::TerminatedNormally],
        "{}",
    );
    let item = WorkItem::parse_snapshot("net", "snap");
    executor(&backend).run_to_completion(&item).await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.status_checks, 2);
    assert_eq!(calls.fetches, 0);
}
