//! In-memory [`Gateway`] for unit tests. Records every call so tests can
//! assert on ordering, and can be told to fail specific operations.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::{
    error::ApiError,
    gateway::Gateway,
    models::{Folder, LocalFile, Spreadsheet, UploadedFile},
    schema::SheetSchema,
};

#[derive(Default)]
pub struct FakeGateway {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: usize,
    calls: Vec<String>,
    folders: Vec<(Folder, String)>,
    spreadsheets: Vec<Spreadsheet>,
    tabs: HashMap<String, Vec<String>>,
    rows: HashMap<(String, String), Vec<Vec<String>>>,
    headers: HashMap<(String, String), Vec<String>>,
    appended: Vec<(String, String, Vec<String>)>,
    header_writes: usize,
    uploads: Vec<(String, Option<String>)>,
    public: Vec<String>,
    no_view_links: bool,
    fail_uploads: HashSet<String>,
    fail_reads: HashSet<String>,
    fail_appends: bool,
    fail_public: bool,
    email: String,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn set_email(&self, email: &str) {
        self.lock().email = email.to_string();
    }

    pub fn set_rows(&self, spreadsheet_id: &str, range: &str, rows: Vec<Vec<String>>) {
        self.lock()
            .rows
            .insert((spreadsheet_id.to_string(), range.to_string()), rows);
    }

    pub fn set_tabs(&self, spreadsheet_id: &str, tabs: &[&str]) {
        self.lock().tabs.insert(
            spreadsheet_id.to_string(),
            tabs.iter().map(|t| t.to_string()).collect(),
        );
    }

    pub fn add_spreadsheet(&self, id: &str, name: &str) {
        self.lock().spreadsheets.push(Spreadsheet {
            id: id.to_string(),
            name: name.to_string(),
            modified_time: None,
            owners: Vec::new(),
        });
    }

    pub fn set_header(&self, spreadsheet_id: &str, tab: &str, header: &[&str]) {
        self.lock().headers.insert(
            (spreadsheet_id.to_string(), tab.to_string()),
            header.iter().map(|h| h.to_string()).collect(),
        );
    }

    pub fn without_view_links(&self) {
        self.lock().no_view_links = true;
    }

    pub fn fail_upload_of(&self, file_name: &str) {
        self.lock().fail_uploads.insert(file_name.to_string());
    }

    pub fn fail_reads_of(&self, spreadsheet_id: &str) {
        self.lock().fail_reads.insert(spreadsheet_id.to_string());
    }

    pub fn fail_appends(&self) {
        self.lock().fail_appends = true;
    }

    pub fn fail_public(&self) {
        self.lock().fail_public = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn header_writes(&self) -> usize {
        self.lock().header_writes
    }

    pub fn header(&self, spreadsheet_id: &str, tab: &str) -> Option<Vec<String>> {
        self.lock()
            .headers
            .get(&(spreadsheet_id.to_string(), tab.to_string()))
            .cloned()
    }

    pub fn appended(&self) -> Vec<(String, String, Vec<String>)> {
        self.lock().appended.clone()
    }

    pub fn uploads(&self) -> Vec<(String, Option<String>)> {
        self.lock().uploads.clone()
    }

    pub fn public_files(&self) -> Vec<String> {
        self.lock().public.clone()
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.lock().folders.iter().map(|(f, _)| f.clone()).collect()
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::http(404, format!("{} not found", what))
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn user_email(&self, _token: &str) -> Result<String, ApiError> {
        let mut inner = self.lock();
        inner.calls.push("user_email".into());
        Ok(inner.email.clone())
    }

    async fn list_folders(&self, _token: &str) -> Result<Vec<Folder>, ApiError> {
        let mut inner = self.lock();
        inner.calls.push("list_folders".into());
        Ok(inner.folders.iter().rev().map(|(f, _)| f.clone()).collect())
    }

    async fn create_folder(
        &self,
        _token: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<String, ApiError> {
        let mut inner = self.lock();
        inner.calls.push(format!("create_folder:{}", name));
        if let Some((folder, _)) = inner
            .folders
            .iter()
            .find(|(f, parent)| f.name == name && parent == parent_id)
        {
            return Ok(folder.id.clone());
        }
        inner.next_id += 1;
        let id = format!("folder-{}", inner.next_id);
        inner.folders.push((
            Folder {
                id: id.clone(),
                name: name.to_string(),
            },
            parent_id.to_string(),
        ));
        Ok(id)
    }

    async fn list_spreadsheets(&self, _token: &str) -> Result<Vec<Spreadsheet>, ApiError> {
        let mut inner = self.lock();
        inner.calls.push("list_spreadsheets".into());
        Ok(inner.spreadsheets.clone())
    }

    async fn create_spreadsheet(&self, _token: &str, title: &str) -> Result<String, ApiError> {
        let mut inner = self.lock();
        inner.calls.push(format!("create_spreadsheet:{}", title));
        inner.next_id += 1;
        let id = format!("sheet-{}", inner.next_id);
        inner.spreadsheets.insert(
            0,
            Spreadsheet {
                id: id.clone(),
                name: title.to_string(),
                modified_time: None,
                owners: Vec::new(),
            },
        );
        inner.tabs.insert(id.clone(), vec!["Sheet1".to_string()]);
        Ok(id)
    }

    async fn list_tabs(&self, _token: &str, spreadsheet_id: &str) -> Result<Vec<String>, ApiError> {
        let mut inner = self.lock();
        inner.calls.push(format!("list_tabs:{}", spreadsheet_id));
        inner
            .tabs
            .get(spreadsheet_id)
            .cloned()
            .ok_or_else(|| not_found(spreadsheet_id))
    }

    async fn add_tabs(
        &self,
        _token: &str,
        spreadsheet_id: &str,
        titles: &[String],
    ) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner
            .calls
            .push(format!("add_tabs:{}:{}", spreadsheet_id, titles.join(",")));
        inner
            .tabs
            .entry(spreadsheet_id.to_string())
            .or_default()
            .extend(titles.iter().cloned());
        Ok(())
    }

    async fn read_header(
        &self,
        _token: &str,
        spreadsheet_id: &str,
        tab: &str,
        _schema: SheetSchema,
    ) -> Result<Vec<Vec<String>>, ApiError> {
        let mut inner = self.lock();
        inner
            .calls
            .push(format!("read_header:{}/{}", spreadsheet_id, tab));
        if inner.fail_reads.contains(spreadsheet_id) {
            return Err(not_found(spreadsheet_id));
        }
        Ok(inner
            .headers
            .get(&(spreadsheet_id.to_string(), tab.to_string()))
            .map(|h| vec![h.clone()])
            .unwrap_or_default())
    }

    async fn write_header(
        &self,
        _token: &str,
        spreadsheet_id: &str,
        tab: &str,
        schema: SheetSchema,
    ) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner
            .calls
            .push(format!("write_header:{}/{}", spreadsheet_id, tab));
        inner.header_writes += 1;
        inner.headers.insert(
            (spreadsheet_id.to_string(), tab.to_string()),
            schema.header().iter().map(|h| h.to_string()).collect(),
        );
        Ok(())
    }

    async fn append_row(
        &self,
        _token: &str,
        spreadsheet_id: &str,
        tab: &str,
        _schema: SheetSchema,
        values: &[String],
    ) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.calls.push(format!("append:{}/{}", spreadsheet_id, tab));
        if inner.fail_appends {
            return Err(ApiError::http(400, "Unable to parse range"));
        }
        inner.appended.push((
            spreadsheet_id.to_string(),
            tab.to_string(),
            values.to_vec(),
        ));
        Ok(())
    }

    async fn read_rows(
        &self,
        _token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, ApiError> {
        let mut inner = self.lock();
        inner
            .calls
            .push(format!("read_rows:{}/{}", spreadsheet_id, range));
        if inner.fail_reads.contains(spreadsheet_id) {
            return Err(not_found(spreadsheet_id));
        }
        Ok(inner
            .rows
            .get(&(spreadsheet_id.to_string(), range.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn upload_file(
        &self,
        _token: &str,
        file: &LocalFile,
        parent_folder_id: Option<&str>,
    ) -> Result<UploadedFile, ApiError> {
        let mut inner = self.lock();
        inner.calls.push(format!("upload:{}", file.name));
        if inner.fail_uploads.contains(&file.name) {
            return Err(ApiError::transport("connection reset by peer"));
        }
        inner.next_id += 1;
        let id = format!("file-{}", inner.next_id);
        inner
            .uploads
            .push((file.name.clone(), parent_folder_id.map(str::to_string)));
        let web_view_link = if inner.no_view_links {
            None
        } else {
            Some(format!(
                "https://drive.google.com/file/d/{}/view?usp=drivesdk",
                id
            ))
        };
        Ok(UploadedFile {
            id,
            web_view_link,
            web_content_link: None,
        })
    }

    async fn set_public(&self, _token: &str, file_id: &str) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.calls.push(format!("set_public:{}", file_id));
        if inner.fail_public {
            return Err(ApiError::http(403, "The user does not have sufficient permissions"));
        }
        inner.public.push(file_id.to_string());
        Ok(())
    }
}

pub const BOUNDARY: &str = "----batch-form-boundary";

/// `multipart/form-data` body with text fields followed by `file` parts.
pub fn form_body(fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (file_name, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: video/mp4\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn form_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
