//! Typed wrappers over the Drive v3, Sheets v4 and userinfo REST endpoints.
//!
//! Every call takes the caller's bearer token and either returns the decoded
//! value or an [`ApiError`]. Nothing is retried or cached here.

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder, Url,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::{
    config::GoogleConfig,
    error::ApiError,
    models::{Folder, LocalFile, Spreadsheet, UploadedFile},
    schema::{escape_query, SheetSchema},
};

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
pub const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn user_email(&self, token: &str) -> Result<String, ApiError>;

    /// Non-trashed folders, most recently modified first, at most 200.
    async fn list_folders(&self, token: &str) -> Result<Vec<Folder>, ApiError>;

    /// Returns the id of the folder named `name` under `parent_id`,
    /// creating it only when no such folder exists.
    async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<String, ApiError>;

    /// Non-trashed spreadsheets, most recently modified first, at most 50.
    async fn list_spreadsheets(&self, token: &str) -> Result<Vec<Spreadsheet>, ApiError>;

    async fn create_spreadsheet(&self, token: &str, title: &str) -> Result<String, ApiError>;

    /// Tab titles in the order the service returns them.
    async fn list_tabs(&self, token: &str, spreadsheet_id: &str) -> Result<Vec<String>, ApiError>;

    async fn add_tabs(
        &self,
        token: &str,
        spreadsheet_id: &str,
        titles: &[String],
    ) -> Result<(), ApiError>;

    /// Row 1 over the schema width; empty when the row has no values.
    async fn read_header(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab: &str,
        schema: SheetSchema,
    ) -> Result<Vec<Vec<String>>, ApiError>;

    async fn write_header(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab: &str,
        schema: SheetSchema,
    ) -> Result<(), ApiError>;

    async fn append_row(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab: &str,
        schema: SheetSchema,
        values: &[String],
    ) -> Result<(), ApiError>;

    async fn read_rows(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, ApiError>;

    async fn upload_file(
        &self,
        token: &str,
        file: &LocalFile,
        parent_folder_id: Option<&str>,
    ) -> Result<UploadedFile, ApiError>;

    /// Grants "anyone with the link" read access.
    async fn set_public(&self, token: &str, file_id: &str) -> Result<(), ApiError>;

    /// Adds only the titles the spreadsheet does not have yet; returns the
    /// titles that were added.
    async fn ensure_tabs(
        &self,
        token: &str,
        spreadsheet_id: &str,
        titles: &[String],
    ) -> Result<Vec<String>, ApiError> {
        let existing = self.list_tabs(token, spreadsheet_id).await?;
        let mut missing: Vec<String> = Vec::new();
        for title in titles {
            if !existing.contains(title) && !missing.contains(title) {
                missing.push(title.clone());
            }
        }
        if !missing.is_empty() {
            self.add_tabs(token, spreadsheet_id, &missing).await?;
        }
        Ok(missing)
    }
}

pub struct GoogleGateway {
    client: Client,
    drive_api: String,
    upload_api: String,
    sheets_api: String,
    userinfo_url: String,
}

#[derive(Deserialize)]
struct FileList<T> {
    #[serde(default = "Vec::new")]
    files: Vec<T>,
}

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    #[serde(default)]
    properties: Option<SheetProperties>,
}

#[derive(Deserialize)]
struct SheetProperties {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: Option<String>,
}

impl GoogleGateway {
    pub fn new(config: &GoogleConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            drive_api: config.drive_api.clone(),
            upload_api: config.upload_api.clone(),
            sheets_api: config.sheets_api.clone(),
            userinfo_url: config.userinfo_url.clone(),
        })
    }

    /// Appends `segments` to `base`, percent-encoding each one.
    fn url(base: &str, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(base)
            .map_err(|e| ApiError::transport(format!("invalid base url {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::transport(format!("base url {} cannot have a path", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url, ApiError> {
        Self::url(&self.sheets_api, &["spreadsheets", spreadsheet_id, "values", range])
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::http(status.as_u16(), error_message(&body)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }

    async fn list_files<T: DeserializeOwned>(
        &self,
        token: &str,
        query: &str,
        fields: &str,
        page_size: u32,
        order_by: Option<&str>,
    ) -> Result<Vec<T>, ApiError> {
        let url = Self::url(&self.drive_api, &["files"])?;
        let page_size = page_size.to_string();
        let mut params = vec![("q", query), ("fields", fields), ("pageSize", page_size.as_str())];
        if let Some(order) = order_by {
            params.push(("orderBy", order));
        }

        let list: FileList<T> = self
            .send_json(self.client.get(url).bearer_auth(token).query(&params))
            .await?;
        Ok(list.files)
    }
}

/// Pulls `error.message` out of a Google error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn cell_to_string(cell: Value) -> String {
    match cell {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn into_string_rows(rows: Vec<Vec<Value>>) -> Vec<Vec<String>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(cell_to_string).collect())
        .collect()
}

/// Drive's multipart upload: a JSON `metadata` part, then the file itself.
fn upload_form(metadata: &Value, file: &LocalFile) -> Result<Form, ApiError> {
    let metadata = Part::text(metadata.to_string()).mime_str("application/json; charset=UTF-8")?;
    let media = Part::bytes(file.bytes.to_vec())
        .file_name(file.name.clone())
        .mime_str(&file.mime_type)?;
    Ok(Form::new().part("metadata", metadata).part("file", media))
}

#[async_trait]
impl Gateway for GoogleGateway {
    async fn user_email(&self, token: &str) -> Result<String, ApiError> {
        let info: UserInfo = self
            .send_json(self.client.get(&self.userinfo_url).bearer_auth(token))
            .await?;
        Ok(info.email.unwrap_or_default())
    }

    async fn list_folders(&self, token: &str) -> Result<Vec<Folder>, ApiError> {
        let query = format!("mimeType='{}' and trashed=false", FOLDER_MIME);
        let folders: Vec<Folder> = self
            .list_files(token, &query, "files(id,name)", 200, Some("modifiedTime desc"))
            .await?;
        debug!("[gateway] 📁 listed {} folders", folders.len());
        Ok(folders)
    }

    async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<String, ApiError> {
        let query = [
            format!("mimeType='{}'", FOLDER_MIME),
            format!("name='{}'", escape_query(name)),
            format!("'{}' in parents", escape_query(parent_id)),
            "trashed=false".to_string(),
        ]
        .join(" and ");

        let hits: Vec<Folder> = self
            .list_files(token, &query, "files(id,name)", 10, None)
            .await?;
        if let Some(hit) = hits.into_iter().next() {
            debug!("[gateway] 📁 folder {:?} already exists: {}", name, hit.id);
            return Ok(hit.id);
        }

        let url = Self::url(&self.drive_api, &["files"])?;
        let created: IdOnly = self
            .send_json(
                self.client
                    .post(url)
                    .bearer_auth(token)
                    .query(&[("fields", "id")])
                    .json(&json!({
                        "name": name,
                        "mimeType": FOLDER_MIME,
                        "parents": [parent_id],
                    })),
            )
            .await?;
        debug!("[gateway] 📁 created folder {:?}: {}", name, created.id);
        Ok(created.id)
    }

    async fn list_spreadsheets(&self, token: &str) -> Result<Vec<Spreadsheet>, ApiError> {
        let query = format!("mimeType='{}' and trashed=false", SPREADSHEET_MIME);
        self.list_files(
            token,
            &query,
            "files(id,name,modifiedTime,owners(displayName,emailAddress))",
            50,
            Some("modifiedTime desc"),
        )
        .await
    }

    async fn create_spreadsheet(&self, token: &str, title: &str) -> Result<String, ApiError> {
        let url = Self::url(&self.sheets_api, &["spreadsheets"])?;
        let created: CreatedSpreadsheet = self
            .send_json(
                self.client
                    .post(url)
                    .bearer_auth(token)
                    .json(&json!({ "properties": { "title": title } })),
            )
            .await?;
        Ok(created.spreadsheet_id)
    }

    async fn list_tabs(&self, token: &str, spreadsheet_id: &str) -> Result<Vec<String>, ApiError> {
        let url = Self::url(&self.sheets_api, &["spreadsheets", spreadsheet_id])?;
        let meta: SpreadsheetMeta = self
            .send_json(
                self.client
                    .get(url)
                    .bearer_auth(token)
                    .query(&[("fields", "sheets(properties(sheetId,title))")]),
            )
            .await?;
        Ok(meta
            .sheets
            .into_iter()
            .filter_map(|s| s.properties.and_then(|p| p.title))
            .collect())
    }

    async fn add_tabs(
        &self,
        token: &str,
        spreadsheet_id: &str,
        titles: &[String],
    ) -> Result<(), ApiError> {
        let segment = format!("{}:batchUpdate", spreadsheet_id);
        let url = Self::url(&self.sheets_api, &["spreadsheets", &segment])?;
        let requests: Vec<Value> = titles
            .iter()
            .map(|title| json!({ "addSheet": { "properties": { "title": title } } }))
            .collect();
        self.send(
            self.client
                .post(url)
                .bearer_auth(token)
                .json(&json!({ "requests": requests })),
        )
        .await?;
        Ok(())
    }

    async fn read_header(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab: &str,
        schema: SheetSchema,
    ) -> Result<Vec<Vec<String>>, ApiError> {
        self.read_rows(token, spreadsheet_id, &schema.header_range(tab))
            .await
    }

    async fn write_header(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab: &str,
        schema: SheetSchema,
    ) -> Result<(), ApiError> {
        let url = self.values_url(spreadsheet_id, &schema.header_range(tab))?;
        self.send(
            self.client
                .put(url)
                .bearer_auth(token)
                .query(&[("valueInputOption", "USER_ENTERED")])
                .json(&json!({ "values": [schema.header()] })),
        )
        .await?;
        Ok(())
    }

    async fn append_row(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab: &str,
        schema: SheetSchema,
        values: &[String],
    ) -> Result<(), ApiError> {
        let range = format!("{}:append", schema.append_range(tab));
        let url = self.values_url(spreadsheet_id, &range)?;
        let mut params = vec![("valueInputOption", "USER_ENTERED")];
        if schema.inserts_rows() {
            params.push(("insertDataOption", "INSERT_ROWS"));
        }
        self.send(
            self.client
                .post(url)
                .bearer_auth(token)
                .query(&params)
                .json(&json!({ "values": [values] })),
        )
        .await?;
        Ok(())
    }

    async fn read_rows(
        &self,
        token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, ApiError> {
        let url = self.values_url(spreadsheet_id, range)?;
        let values: ValueRange = self
            .send_json(self.client.get(url).bearer_auth(token))
            .await?;
        Ok(into_string_rows(values.values))
    }

    async fn upload_file(
        &self,
        token: &str,
        file: &LocalFile,
        parent_folder_id: Option<&str>,
    ) -> Result<UploadedFile, ApiError> {
        let mut metadata = json!({ "name": file.name });
        if let Some(parent) = parent_folder_id {
            metadata["parents"] = json!([parent]);
        }

        let form = upload_form(&metadata, file)?;
        let url = Self::url(&self.upload_api, &["files"])?;

        debug!(
            "[gateway] ⬆️  uploading {} ({} bytes)",
            file.name,
            file.bytes.len()
        );
        self.send_json(
            self.client
                .post(url)
                .bearer_auth(token)
                .query(&[
                    ("uploadType", "multipart"),
                    ("fields", "id,webViewLink,webContentLink"),
                ])
                .multipart(form),
        )
        .await
    }

    async fn set_public(&self, token: &str, file_id: &str) -> Result<(), ApiError> {
        let url = Self::url(&self.drive_api, &["files", file_id, "permissions"])?;
        self.send(
            self.client
                .post(url)
                .bearer_auth(token)
                .json(&json!({ "role": "reader", "type": "anyone" })),
        )
        .await?;
        Ok(())
    }
}
