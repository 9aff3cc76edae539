//! Batch upload: one file at a time, upload → optional public link → header
//! check → row append, with a per-file status that only moves forward.

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::{
    error::{ApiError, ValidationError},
    gateway::Gateway,
    models::{BatchReport, LocalFile, TaskEvent, TaskStatus, UploadTask},
    schema::{drive_view_link, SheetSchema},
};

/// Everything a batch needs, captured once when the batch starts.
#[derive(Clone, Debug, Default)]
pub struct BatchConfig {
    pub spreadsheet_id: String,
    pub tab: String,
    pub folder_id: Option<String>,
    /// Batch-wide lookup selection, copied onto every task.
    pub identifier: Option<String>,
    pub content: String,
    pub make_public: bool,
    pub schema: SheetSchema,
}

impl BatchConfig {
    pub fn validate(&self, files: &[LocalFile]) -> Result<(), ValidationError> {
        if files.is_empty() {
            return Err(ValidationError::NoFiles);
        }
        if self.spreadsheet_id.trim().is_empty() {
            return Err(ValidationError::NoSpreadsheet);
        }
        if self.tab.trim().is_empty() {
            return Err(ValidationError::NoTab);
        }
        Ok(())
    }
}

/// Writes the schema header into row 1 unless something is already there.
/// Returns whether a write happened.
pub async fn ensure_header(
    gateway: &dyn Gateway,
    token: &str,
    spreadsheet_id: &str,
    tab: &str,
    schema: SheetSchema,
) -> Result<bool, ApiError> {
    let existing = gateway
        .read_header(token, spreadsheet_id, tab, schema)
        .await?;
    let empty = existing
        .iter()
        .all(|row| row.iter().all(|cell| cell.is_empty()));
    if !empty {
        return Ok(false);
    }

    gateway
        .write_header(token, spreadsheet_id, tab, schema)
        .await?;
    info!("[pipeline] 📝 header written to {}/{}", spreadsheet_id, tab);
    Ok(true)
}

fn batch_key(index: usize) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}-{}", index, millis)
}

fn emit(task: &UploadTask, events: Option<&UnboundedSender<TaskEvent>>) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is watching anymore.
        let _ = tx.send(TaskEvent::from(task));
    }
}

fn transition(
    task: &mut UploadTask,
    next: TaskStatus,
    events: Option<&UnboundedSender<TaskEvent>>,
) {
    if !task.advance(next) {
        warn!(
            "[pipeline] refused transition {:?} -> {:?} for {}",
            task.status, next, task.file_name
        );
        return;
    }
    emit(task, events);
}

/// Runs the whole batch and returns only once every task is `done` or
/// `failed`. A failing file never stops the files after it.
pub async fn run_batch(
    gateway: &dyn Gateway,
    token: &str,
    config: &BatchConfig,
    files: &[LocalFile],
    events: Option<&UnboundedSender<TaskEvent>>,
) -> Result<BatchReport, ValidationError> {
    config.validate(files)?;

    let mut tasks: Vec<UploadTask> = files
        .iter()
        .enumerate()
        .map(|(i, f)| UploadTask::new(batch_key(i), f.name.clone(), config.identifier.clone()))
        .collect();
    for task in &tasks {
        emit(task, events);
    }

    info!(
        "[pipeline] 🎬 batch of {} files → {}/{} (schema {:?}, public={})",
        files.len(),
        config.spreadsheet_id,
        config.tab,
        config.schema,
        config.make_public
    );

    for (file, task) in files.iter().zip(tasks.iter_mut()) {
        let started = SystemTime::now();
        match process_file(gateway, token, config, file, task, events).await {
            Ok(()) => {
                let elapsed = started.elapsed().map(|d| d.as_secs_f64()).unwrap_or(0.0);
                info!("[pipeline] ✅ {} done in {:.2}s", file.name, elapsed);
            }
            Err(e) => {
                error!("[pipeline] ❌ {} failed: {}", file.name, e);
                transition(task, TaskStatus::Failed, events);
            }
        }
    }

    let report = BatchReport::from_tasks(tasks);
    info!(
        "[pipeline] 📊 batch finished: {} done, {} failed",
        report.succeeded, report.failed
    );
    Ok(report)
}

async fn process_file(
    gateway: &dyn Gateway,
    token: &str,
    config: &BatchConfig,
    file: &LocalFile,
    task: &mut UploadTask,
    events: Option<&UnboundedSender<TaskEvent>>,
) -> Result<(), ApiError> {
    transition(task, TaskStatus::Uploading, events);

    let uploaded = gateway
        .upload_file(token, file, config.folder_id.as_deref())
        .await?;

    if config.make_public {
        // Row writing goes ahead even when sharing fails; the task keeps the reason.
        if let Err(e) = gateway.set_public(token, &uploaded.id).await {
            warn!("[pipeline] could not make {} public: {}", file.name, e);
            task.warning = Some(format!("not shared publicly: {}", e));
        }
    }

    let link = uploaded
        .web_view_link
        .clone()
        .unwrap_or_else(|| drive_view_link(&uploaded.id));
    task.result_link = Some(link.clone());
    transition(task, TaskStatus::Writing, events);

    ensure_header(gateway, token, &config.spreadsheet_id, &config.tab, config.schema).await?;

    let row = config
        .schema
        .row(&link, &config.content, task.resolved_identifier.as_deref());
    gateway
        .append_row(token, &config.spreadsheet_id, &config.tab, config.schema, &row)
        .await?;

    transition(task, TaskStatus::Done, events);
    Ok(())
}
