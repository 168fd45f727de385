//! Session: per-client coordinator context and orchestration glue.
//!
//! A [`Session`] holds the current network and snapshot selection and wires
//! validated questions through the work lifecycle to deserialized answers.
//! Sessions are single-writer: only their own setters mutate the selection.

use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::answer::Answer;
use crate::error::{Error, Result};
use crate::question::{Question, QuestionTemplate};
use crate::transport::{CoordinatorConfig, Transport};
use crate::work::{TaskStatus, WorkBackend, WorkExecutor, WorkItem, WorkStatus};

/// Longest allowed network or snapshot name.
pub const NAME_MAX_LENGTH: usize = 150;

/// Names the backend reserves for itself.
const RESERVED_NAMES: [&str; 1] = ["settings"];

/// Built-in diagnostic question: parse status per input file.
const FILE_PARSE_STATUS_TEMPLATE: &str = r#"{
  "class": "org.batfish.question.initialization.FileParseStatusQuestion",
  "instance": {
    "instanceName": "fileParseStatus",
    "description": "Displays file parse status.",
    "variables": {}
  }
}"#;

/// Built-in diagnostic question: issues found while initializing.
const INIT_ISSUES_TEMPLATE: &str = r#"{
  "class": "org.batfish.question.initialization.InitIssuesQuestion",
  "instance": {
    "instanceName": "initIssues",
    "description": "Returns issues encountered when processing the snapshot.",
    "variables": {}
  }
}"#;

/// Validates a network or snapshot name.
///
/// Names use only letters, digits, `-` and `_` (which also rules out `/`,
/// a path separator on the backend's storage layout), are length-bounded,
/// and must not collide with reserved words.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > NAME_MAX_LENGTH {
        return Err(Error::Validation(format!(
            "Name {:?} must be between 1 and {} characters",
            name, NAME_MAX_LENGTH
        )));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(Error::Validation(format!(
            "Name {:?} is a reserved word",
            name
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Validation(format!(
            "Name {:?} is invalid: names use only letters, digits, '-' and '_'",
            name
        )));
    }
    Ok(())
}

/// Validates a bound question and builds the work item that answers it.
///
/// Runs entirely before any network call: parameter validation and the
/// differential precondition both fail here.
pub(crate) fn prepare_work(
    question: &Question,
    network: &str,
    snapshot: &str,
    reference_snapshot: Option<&str>,
) -> Result<WorkItem> {
    question.validate()?;
    if question.differential && reference_snapshot.is_none() {
        return Err(Error::Validation(format!(
            "Question {} is differential and needs a reference snapshot",
            question.instance_name
        )));
    }
    let mut item = WorkItem::answer_question(network, snapshot, &question.instance_name);
    if let Some(reference) = reference_snapshot {
        item = item.differential(reference);
    }
    Ok(item)
}

/// Client context for one coordinator.
pub struct Session {
    transport: Transport,
    network: Option<String>,
    snapshot: Option<String>,
}

impl Session {
    /// Connects to the coordinator and runs the fail-fast version check,
    /// so a totally unreachable backend errors in seconds.
    pub async fn connect(config: &CoordinatorConfig) -> Result<Session> {
        let transport = Transport::new(config)?;
        let version = transport.check_version().await?;
        info!(
            "connected to coordinator {} (version {})",
            config.host, version
        );
        Ok(Session {
            transport,
            network: None,
            snapshot: None,
        })
    }

    /// Builds a session without the connectivity check.
    pub fn offline(config: &CoordinatorConfig) -> Result<Session> {
        Ok(Session {
            transport: Transport::new(config)?,
            network: None,
            snapshot: None,
        })
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    fn require_network(&self) -> Result<String> {
        self.network
            .clone()
            .ok_or_else(|| Error::Validation("no network set; call set_network first".to_string()))
    }

    fn require_snapshot(&self) -> Result<String> {
        self.snapshot.clone().ok_or_else(|| {
            Error::Validation("no snapshot set; call set_snapshot or init_snapshot first".to_string())
        })
    }

    /// Selects a network, creating it on the coordinator if absent.
    pub async fn set_network(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        let existing = self.list_networks().await?;
        if !existing.iter().any(|n| n == name) {
            self.transport
                .v2_post(&format!("/networks/{}", name), &json!({}))
                .await?;
            info!("created network {}", name);
        }
        self.network = Some(name.to_string());
        Ok(())
    }

    /// Selects an existing snapshot in the current network.
    pub async fn set_snapshot(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        let existing = self.list_snapshots().await?;
        if !existing.iter().any(|s| s == name) {
            return Err(Error::Validation(format!(
                "Snapshot {} does not exist in network {}",
                name,
                self.require_network()?
            )));
        }
        self.snapshot = Some(name.to_string());
        Ok(())
    }

    pub async fn list_networks(&self) -> Result<Vec<String>> {
        let raw: Vec<Value> = self.transport.v2_get("/networks").await?;
        Ok(raw.iter().filter_map(name_of).collect())
    }

    /// Deletes a network. A nonexistent name is an error, never a no-op.
    pub async fn delete_network(&mut self, name: &str) -> Result<()> {
        self.transport
            .v2_delete(&format!("/networks/{}", name))
            .await?;
        if self.network.as_deref() == Some(name) {
            self.network = None;
            self.snapshot = None;
        }
        Ok(())
    }

    pub async fn list_snapshots(&self) -> Result<Vec<String>> {
        let network = self.require_network()?;
        let raw: Vec<Value> = self
            .transport
            .v2_get(&format!("/networks/{}/snapshots", network))
            .await?;
        Ok(raw.iter().filter_map(name_of).collect())
    }

    /// Deletes a snapshot. A nonexistent name is an error, never a no-op.
    pub async fn delete_snapshot(&mut self, name: &str) -> Result<()> {
        let network = self.require_network()?;
        self.transport
            .v2_delete(&format!("/networks/{}/snapshots/{}", network, name))
            .await?;
        if self.snapshot.as_deref() == Some(name) {
            self.snapshot = None;
        }
        Ok(())
    }

    /// Uploads and parses a snapshot, then makes it current.
    ///
    /// `path` is either a snapshot directory (zipped on the fly) or a
    /// pre-zipped archive. Without `overwrite`, a name collision is an
    /// error. A failed parse job raises; partial parse problems only warn,
    /// via the post-init diagnostics.
    pub async fn init_snapshot(
        &mut self,
        path: &Path,
        name: Option<&str>,
        overwrite: bool,
    ) -> Result<String> {
        let network = self.require_network()?;
        let snapshot = match name {
            Some(name) => {
                validate_name(name)?;
                name.to_string()
            }
            None => format!("ss_{}", Uuid::new_v4()),
        };
        if !overwrite && self.list_snapshots().await?.contains(&snapshot) {
            return Err(Error::Validation(format!(
                "Snapshot {} already exists in network {}; pass overwrite to replace it",
                snapshot, network
            )));
        }

        let zip_bytes = if path.is_dir() {
            zip_directory(path)?
        } else {
            std::fs::read(path)?
        };
        self.transport
            .upload_snapshot(&network, &snapshot, zip_bytes)
            .await?;

        let item = WorkItem::parse_snapshot(&network, &snapshot);
        WorkExecutor::new(&self.transport)
            .run_to_completion(&item)
            .await?;

        self.snapshot = Some(snapshot.clone());
        self.diagnose_snapshot(&network, &snapshot).await;
        Ok(snapshot)
    }

    /// Forks an existing snapshot under a new name and makes it current.
    pub async fn fork_snapshot(
        &mut self,
        base: &str,
        new_name: &str,
        overwrite: bool,
    ) -> Result<String> {
        let network = self.require_network()?;
        validate_name(new_name)?;
        if !overwrite && self.list_snapshots().await?.iter().any(|s| s == new_name) {
            return Err(Error::Validation(format!(
                "Snapshot {} already exists in network {}; pass overwrite to replace it",
                new_name, network
            )));
        }
        self.transport
            .v2_post(
                &format!("/networks/{}/snapshots:fork", network),
                &json!({"snapshotBase": base, "snapshotNew": new_name}),
            )
            .await?;
        self.snapshot = Some(new_name.to_string());
        Ok(new_name.to_string())
    }

    /// Fetches the backend's question templates, keyed by name.
    ///
    /// Templates this client cannot parse are skipped with a warning so a
    /// newer backend's catalog still loads.
    pub async fn questions(&self) -> Result<HashMap<String, QuestionTemplate>> {
        let raw = self.transport.get_question_templates().await?;
        let mut templates = HashMap::new();
        for (name, value) in raw {
            match QuestionTemplate::from_dict(&value) {
                Ok(template) => {
                    templates.insert(name, template);
                }
                Err(err) => warn!("skipping unparseable question template {}: {}", name, err),
            }
        }
        Ok(templates)
    }

    /// Answers a question against the current snapshot.
    pub async fn answer(&self, question: &Question) -> Result<Answer> {
        self.answer_with(question, None, None).await
    }

    /// Answers a question, optionally against an explicit snapshot and
    /// reference snapshot. Differential questions require the reference.
    pub async fn answer_with(
        &self,
        question: &Question,
        snapshot: Option<&str>,
        reference_snapshot: Option<&str>,
    ) -> Result<Answer> {
        let item = self
            .prepare_and_upload(question, snapshot, reference_snapshot)
            .await?;
        let text = WorkExecutor::new(&self.transport).execute(&item).await?;
        Answer::parse(serde_json::from_str(&text)?)
    }

    /// Submits a question for background execution and returns the work id.
    /// Check progress later with [`Session::work_status`].
    pub async fn answer_background(
        &self,
        question: &Question,
        snapshot: Option<&str>,
        reference_snapshot: Option<&str>,
    ) -> Result<String> {
        let item = self
            .prepare_and_upload(question, snapshot, reference_snapshot)
            .await?;
        WorkExecutor::new(&self.transport).submit(&item).await?;
        Ok(item.id)
    }

    async fn prepare_and_upload(
        &self,
        question: &Question,
        snapshot: Option<&str>,
        reference_snapshot: Option<&str>,
    ) -> Result<WorkItem> {
        let network = self.require_network()?;
        let snapshot = match snapshot {
            Some(snapshot) => snapshot.to_string(),
            None => self.require_snapshot()?,
        };
        let item = prepare_work(question, &network, &snapshot, reference_snapshot)?;
        self.transport
            .v2_put(
                &format!("/networks/{}/questions/{}", network, question.instance_name),
                &question.to_wire(),
            )
            .await?;
        Ok(item)
    }

    /// Status of a previously submitted work item.
    pub async fn work_status(&self, work_id: &str) -> Result<(WorkStatus, TaskStatus)> {
        self.transport.work_status(work_id).await
    }

    /// Runs the built-in diagnostic questions after snapshot init and logs
    /// actionable warnings. Best-effort: diagnostics failing is itself only
    /// a warning.
    async fn diagnose_snapshot(&self, network: &str, snapshot: &str) {
        if let Err(err) = self.try_diagnose(network, snapshot).await {
            warn!("snapshot diagnostics did not complete: {}", err);
        }
    }

    async fn try_diagnose(&self, network: &str, snapshot: &str) -> Result<()> {
        let parse_status = self
            .run_diagnostic(FILE_PARSE_STATUS_TEMPLATE, network, snapshot)
            .await?;
        if let Some(table) = parse_status.as_table() {
            for row in &table.rows {
                let status = row
                    .get("Status")
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                if status != "PASSED" && !status.is_empty() {
                    let file = row
                        .get("File_Name")
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| "<unknown file>".to_string());
                    warn!(
                        "snapshot {}: file {} was not fully recognized (status {})",
                        snapshot, file, status
                    );
                }
            }
        }

        let issues = self
            .run_diagnostic(INIT_ISSUES_TEMPLATE, network, snapshot)
            .await?;
        if let Some(table) = issues.as_table() {
            if table.row_count() > 0 {
                warn!(
                    "snapshot {}: initialization reported {} issues; answer initIssues for details",
                    snapshot,
                    table.row_count()
                );
            }
        }
        Ok(())
    }

    async fn run_diagnostic(
        &self,
        template: &str,
        network: &str,
        snapshot: &str,
    ) -> Result<Answer> {
        let template = QuestionTemplate::from_dict(&serde_json::from_str(template)?)?;
        let question = template.instantiate(None, HashMap::new())?;
        let item = prepare_work(&question, network, snapshot, None)?;
        self.transport
            .v2_put(
                &format!("/networks/{}/questions/{}", network, question.instance_name),
                &question.to_wire(),
            )
            .await?;
        let text = WorkExecutor::new(&self.transport).execute(&item).await?;
        Answer::parse(serde_json::from_str(&text)?)
    }
}

fn name_of(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Object(map) => map.get("name").and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

/// Zips a snapshot directory in memory, entries named relative to the
/// directory's parent so the archive keeps the snapshot directory as its
/// top-level entry.
fn zip_directory(root: &Path) -> Result<Vec<u8>> {
    use std::io::Cursor;
    use zip::write::SimpleFileOptions;

    let zip_err = |e: zip::result::ZipError| Error::Io(std::io::Error::other(e));
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let base = root.parent().unwrap_or(root);

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let name = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            writer.start_file(name, options).map_err(zip_err)?;
            let mut file = std::fs::File::open(&path)?;
            std::io::copy(&mut file, &mut writer)?;
        }
    }
    Ok(writer.finish().map_err(zip_err)?.into_inner())
}
