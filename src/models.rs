use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    config::Config,
    gateway::Gateway,
    prefs::PreferenceStore,
};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn Gateway>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub config: Config,
}

/// Authenticated caller, resolved from the bearer token.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Session {
    #[serde(skip_serializing)]
    pub token: String,
    pub email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email_address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Spreadsheet {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub owners: Vec<Owner>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupItem {
    pub name: String,
    pub identifier: String,
}

/// A file picked by the user, fully buffered.
#[derive(Clone, Debug)]
pub struct LocalFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// What Drive hands back after an upload.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub web_content_link: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Uploading,
    Writing,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    /// Forward-only transitions; a failed or done task never moves again.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match self {
            Queued => matches!(next, Uploading),
            Uploading => matches!(next, Writing | Failed),
            Writing => matches!(next, Done | Failed),
            Done | Failed => false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadTask {
    pub key: String,
    pub file_name: String,
    pub status: TaskStatus,
    pub result_link: Option<String>,
    pub resolved_identifier: Option<String>,
    /// Non-fatal problem, e.g. the file could not be shared publicly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl UploadTask {
    pub fn new(key: String, file_name: String, resolved_identifier: Option<String>) -> Self {
        Self {
            key,
            file_name,
            status: TaskStatus::Queued,
            result_link: None,
            resolved_identifier,
            warning: None,
        }
    }

    /// Moves the task to `next`; returns false and leaves it untouched when
    /// the transition is not allowed.
    pub fn advance(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}

/// One status change, emitted while a batch runs.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TaskEvent {
    pub key: String,
    pub file_name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl From<&UploadTask> for TaskEvent {
    fn from(task: &UploadTask) -> Self {
        Self {
            key: task.key.clone(),
            file_name: task.file_name.clone(),
            status: task.status,
            link: task.result_link.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct BatchReport {
    pub tasks: Vec<UploadTask>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn from_tasks(tasks: Vec<UploadTask>) -> Self {
        let succeeded = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .count();
        let failed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        Self {
            tasks,
            succeeded,
            failed,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default = "default_parent")]
    pub parent_id: String,
}

fn default_parent() -> String {
    "root".to_string()
}

#[derive(Deserialize, Default)]
pub struct CreateSpreadsheetRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct AddTabsRequest {
    pub titles: Vec<String>,
}

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Serialize)]
pub struct TabsResponse {
    pub spreadsheet_id: String,
    pub link: String,
    pub tabs: Vec<String>,
    pub default_tab: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Display-name overrides for spreadsheets, keyed by spreadsheet id.
pub type AliasMap = HashMap<String, String>;
