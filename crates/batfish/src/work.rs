//! Work items and the job-lifecycle state machine.
//!
//! One unit of backend work is a [`WorkItem`]: a fresh UUID, the owning
//! network, and the command parameters. The [`WorkExecutor`] drives an item
//! through submit, poll-until-terminal, and answer fetch against any
//! [`WorkBackend`]; the HTTP implementation lives in [`crate::transport`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// How long the foreground poll sleeps between status checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle state of a work item, as reported by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkStatus {
    Unassigned,
    TryingToAssign,
    Assigned,
    AssignmentError,
    Blocked,
    CheckingStatus,
    RequeueFailure,
    TerminatedAbnormally,
    TerminatedByUser,
    TerminatedNormally,
}

impl WorkStatus {
    /// Whether the work item will never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkStatus::AssignmentError
                | WorkStatus::RequeueFailure
                | WorkStatus::TerminatedAbnormally
                | WorkStatus::TerminatedByUser
                | WorkStatus::TerminatedNormally
        )
    }

    /// Whether the work item finished successfully. Only normal
    /// termination counts; every other terminal state is a failure.
    pub fn is_success(self) -> bool {
        self == WorkStatus::TerminatedNormally
    }

    fn as_str(self) -> &'static str {
        match self {
            WorkStatus::Unassigned => "UNASSIGNED",
            WorkStatus::TryingToAssign => "TRYINGTOASSIGN",
            WorkStatus::Assigned => "ASSIGNED",
            WorkStatus::AssignmentError => "ASSIGNMENTERROR",
            WorkStatus::Blocked => "BLOCKED",
            WorkStatus::CheckingStatus => "CHECKINGSTATUS",
            WorkStatus::RequeueFailure => "REQUEUEFAILURE",
            WorkStatus::TerminatedAbnormally => "TERMINATEDABNORMALLY",
            WorkStatus::TerminatedByUser => "TERMINATEDBYUSER",
            WorkStatus::TerminatedNormally => "TERMINATEDNORMALLY",
        }
    }

    /// All statuses the coordinator can report.
    pub const ALL: [WorkStatus; 10] = [
        WorkStatus::Unassigned,
        WorkStatus::TryingToAssign,
        WorkStatus::Assigned,
        WorkStatus::AssignmentError,
        WorkStatus::Blocked,
        WorkStatus::CheckingStatus,
        WorkStatus::RequeueFailure,
        WorkStatus::TerminatedAbnormally,
        WorkStatus::TerminatedByUser,
        WorkStatus::TerminatedNormally,
    ];
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        WorkStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Deserialization(format!("unknown work status: {}", s)))
    }
}

/// One unit of backend work. Created fresh per submission with a unique id;
/// immutable once submitted, never reused across retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,
    pub container_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testrig_name: Option<String>,
    pub request_params: BTreeMap<String, String>,
}

impl WorkItem {
    fn new(network: &str, snapshot: Option<&str>) -> WorkItem {
        WorkItem {
            id: Uuid::new_v4().to_string(),
            container_name: network.to_string(),
            testrig_name: snapshot.map(String::from),
            request_params: BTreeMap::new(),
        }
    }

    /// Work item that answers a named question against a snapshot.
    pub fn answer_question(network: &str, snapshot: &str, question_name: &str) -> WorkItem {
        let mut item = WorkItem::new(network, Some(snapshot));
        item.request_params
            .insert("command".to_string(), "answer".to_string());
        item.request_params
            .insert("questionname".to_string(), question_name.to_string());
        item.request_params
            .insert("testrig".to_string(), snapshot.to_string());
        item
    }

    /// Marks the item as a differential run against a reference snapshot.
    pub fn differential(mut self, reference_snapshot: &str) -> WorkItem {
        self.request_params
            .insert("deltatestrig".to_string(), reference_snapshot.to_string());
        self.request_params
            .insert("differential".to_string(), "true".to_string());
        self
    }

    /// Work item that parses an uploaded snapshot.
    pub fn parse_snapshot(network: &str, snapshot: &str) -> WorkItem {
        let mut item = WorkItem::new(network, Some(snapshot));
        item.request_params
            .insert("command".to_string(), "parse".to_string());
        item.request_params
            .insert("testrig".to_string(), snapshot.to_string());
        item
    }
}

/// Progress batches reported while a task runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: i64,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub start_date: String,
}

/// Detailed task state attached to a status-check response. Arrives as a
/// JSON-encoded string inside the envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(default)]
    pub obtained: String,
    #[serde(default)]
    pub batches: Vec<Batch>,
}

impl TaskStatus {
    pub fn parse(encoded: &str) -> Result<TaskStatus> {
        serde_json::from_str(encoded)
            .map_err(|e| Error::Deserialization(format!("task status: {}", e)))
    }
}

/// The coordinator operations the job lifecycle needs.
///
/// The HTTP transport is the production implementation; tests drive the
/// executor with an in-memory fake.
#[async_trait]
pub trait WorkBackend: Send + Sync {
    /// Submits a work item. A non-success envelope is an error.
    async fn queue_work(&self, item: &WorkItem) -> Result<()>;

    /// Checks a work item's status.
    async fn work_status(&self, work_id: &str) -> Result<(WorkStatus, TaskStatus)>;

    /// Fetches a named object from a snapshot, decoded as text.
    async fn get_object(
        &self,
        network: &str,
        snapshot: Option<&str>,
        key: &str,
    ) -> Result<String>;

    /// Best-effort cancellation of a queued or running work item.
    async fn kill_work(&self, work_id: &str) -> Result<()>;
}

/// Drives work items through the submit / poll / fetch lifecycle.
pub struct WorkExecutor<'a> {
    backend: &'a dyn WorkBackend,
    poll_interval: Duration,
}

impl<'a> WorkExecutor<'a> {
    pub fn new(backend: &'a dyn WorkBackend) -> WorkExecutor<'a> {
        WorkExecutor {
            backend,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval (tests use a short one).
    pub fn with_poll_interval(mut self, interval: Duration) -> WorkExecutor<'a> {
        self.poll_interval = interval;
        self
    }

    /// Submits a work item for background execution and returns
    /// immediately. The caller checks status later via the work id.
    pub async fn submit(&self, item: &WorkItem) -> Result<()> {
        self.backend.queue_work(item).await?;
        debug!("queued work item {} for background execution", item.id);
        Ok(())
    }

    /// Submits a work item and polls until it terminates normally.
    ///
    /// Any other terminal status raises [`Error::JobFailed`] embedding the
    /// status and the serialized item. A user interrupt while polling
    /// triggers a best-effort remote cancellation before propagating as
    /// [`Error::Interrupted`].
    pub async fn run_to_completion(&self, item: &WorkItem) -> Result<()> {
        self.backend.queue_work(item).await?;
        debug!("queued work item {}", item.id);
        let status = self.wait_for_terminal(item).await?;
        if !status.is_success() {
            return Err(Error::JobFailed {
                status,
                work_item: serde_json::to_string(item).unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Like [`WorkExecutor::run_to_completion`], then fetches the answer
    /// object named after the work item id and returns it as text.
    pub async fn execute(&self, item: &WorkItem) -> Result<String> {
        self.run_to_completion(item).await?;
        let key = format!("{}.json", item.id);
        self.backend
            .get_object(&item.container_name, item.testrig_name.as_deref(), &key)
            .await
    }

    async fn wait_for_terminal(&self, item: &WorkItem) -> Result<WorkStatus> {
        let started = Instant::now();
        loop {
            let (status, task) = self.backend.work_status(&item.id).await?;
            if status.is_terminal() {
                debug!("work item {} finished with status {}", item.id, status);
                return Ok(status);
            }
            for batch in &task.batches {
                debug!(
                    "work item {}: {} ({}/{}), {}s elapsed",
                    item.id,
                    batch.description,
                    batch.completed,
                    batch.size,
                    started.elapsed().as_secs()
                );
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_ok() {
                        warn!("interrupted; cancelling work item {}", item.id);
                        if let Err(err) = self.backend.kill_work(&item.id).await {
                            warn!("could not cancel work item {}: {}", item.id, err);
                        }
                        return Err(Error::Interrupted);
                    }
                    // signal handler unavailable; keep polling
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}
