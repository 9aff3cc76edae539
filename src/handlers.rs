use crate::{
    error::{AppError, ValidationError},
    lookup::{load_lookup_items, resolve_identifier},
    models::{
        AddTabsRequest, AliasMap, AppState, BatchReport, CreateFolderRequest,
        CreateSpreadsheetRequest, CreatedResponse, Folder, LocalFile, LookupItem, Session,
        Spreadsheet, TabsResponse,
    },
    pipeline::{run_batch, BatchConfig},
    prefs::{FOLDER_KEY, SHEET_ALIAS_KEY},
    schema::{extract_spreadsheet_id, spreadsheet_link, SheetSchema},
};
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap,
    },
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use http_body_util::BodyExt;
use multer::{Constraints, Multipart, SizeLimit};
use serde_json::{json, Value};
use std::{convert::Infallible, sync::Arc, time::SystemTime};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Pulls the caller's token out of `Authorization: Bearer <token>`.
pub fn bearer(headers: &HeaderMap) -> Result<String, AppError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Auth)?;
    let (scheme, token) = value.trim().split_once(' ').ok_or(AppError::Auth)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AppError::Auth);
    }
    Ok(token.to_string())
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Resolve the signed-in user's email
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Session>, AppError> {
    let token = bearer(&headers)?;
    let email = state.gateway.user_email(&token).await?;
    info!("[GET /me] 👤 {}", email);
    Ok(Json(Session { token, email }))
}

pub async fn list_folders_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Folder>>, AppError> {
    let token = bearer(&headers)?;
    Ok(Json(state.gateway.list_folders(&token).await?))
}

/// Find-or-create a folder and remember it as the preferred destination
pub async fn create_folder_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateFolderRequest>,
) -> Result<Json<CreatedResponse>, AppError> {
    let token = bearer(&headers)?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ValidationError::Malformed("folder name is empty".into()).into());
    }

    let id = state
        .gateway
        .create_folder(&token, name, &request.parent_id)
        .await?;
    state.preferences.set(FOLDER_KEY, json!(id))?;
    info!("[POST /folders] 📁 {} -> {}", name, id);

    Ok(Json(CreatedResponse { id, link: None }))
}

pub async fn list_spreadsheets_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Spreadsheet>>, AppError> {
    let token = bearer(&headers)?;
    let mut sheets = state.gateway.list_spreadsheets(&token).await?;

    let aliases: AliasMap = state
        .preferences
        .get(SHEET_ALIAS_KEY)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    for sheet in &mut sheets {
        if let Some(alias) = aliases.get(&sheet.id) {
            sheet.name = alias.clone();
        }
    }

    Ok(Json(sheets))
}

pub async fn create_spreadsheet_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<CreateSpreadsheetRequest>>,
) -> Result<Json<CreatedResponse>, AppError> {
    let token = bearer(&headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| {
            let secs = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            format!("New Sheet {}", secs)
        });

    let id = state.gateway.create_spreadsheet(&token, &title).await?;
    info!("[POST /spreadsheets] 📄 {:?} -> {}", title, id);
    let link = Some(spreadsheet_link(&id));
    Ok(Json(CreatedResponse { id, link }))
}

pub async fn list_tabs_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(spreadsheet): Path<String>,
) -> Result<Json<TabsResponse>, AppError> {
    let token = bearer(&headers)?;
    let spreadsheet_id = extract_spreadsheet_id(&spreadsheet);
    let tabs = state.gateway.list_tabs(&token, &spreadsheet_id).await?;

    Ok(Json(TabsResponse {
        link: spreadsheet_link(&spreadsheet_id),
        default_tab: tabs.first().cloned(),
        spreadsheet_id,
        tabs,
    }))
}

pub async fn add_tabs_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(spreadsheet): Path<String>,
    Json(request): Json<AddTabsRequest>,
) -> Result<Json<Value>, AppError> {
    let token = bearer(&headers)?;
    let spreadsheet_id = extract_spreadsheet_id(&spreadsheet);
    let titles: Vec<String> = request
        .titles
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let added = state
        .gateway
        .ensure_tabs(&token, &spreadsheet_id, &titles)
        .await?;
    Ok(Json(json!({ "added": added })))
}

pub async fn lookup_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((spreadsheet, tab)): Path<(String, String)>,
) -> Result<Json<Vec<LookupItem>>, AppError> {
    let token = bearer(&headers)?;
    let spreadsheet_id = extract_spreadsheet_id(&spreadsheet);
    let items = load_lookup_items(state.gateway.as_ref(), &token, &spreadsheet_id, &tab).await?;
    Ok(Json(items))
}

pub async fn get_preference_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    bearer(&headers)?;
    let value = state.preferences.get(&key).unwrap_or(Value::Null);
    Ok(Json(json!({ "key": key, "value": value })))
}

pub async fn put_preference_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, AppError> {
    bearer(&headers)?;
    state.preferences.set(&key, value.clone())?;
    info!("[PUT /preferences] 💾 {}", key);
    Ok(Json(json!({ "key": key, "value": value })))
}

/// Fields of a batch form, before any remote lookup.
#[derive(Debug, Default)]
pub struct BatchForm {
    pub spreadsheet_id: String,
    pub tab: String,
    pub folder_id: Option<String>,
    pub content: String,
    pub make_public: bool,
    pub schema: Option<SheetSchema>,
    pub identifier: Option<String>,
    pub source_spreadsheet_id: Option<String>,
    pub source_tab: Option<String>,
    pub lookup_name: Option<String>,
    pub files: Vec<LocalFile>,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "on" | "1" | "yes"
    )
}

fn chunk_error(e: multer::Error, max_file_size: u64) -> AppError {
    match e {
        multer::Error::FieldSizeExceeded { .. } => {
            error!("File exceeds {} bytes", max_file_size);
            AppError::TooLarge {
                size_mb: max_file_size as f64 / 1024.0 / 1024.0,
                max_mb: max_file_size / 1024 / 1024,
            }
        }
        other => {
            error!("Failed to read file chunk: {}", other);
            ValidationError::Malformed(format!("failed to read file: {}", other)).into()
        }
    }
}

/// Parse the multipart batch form
pub async fn parse_batch_form(
    state: &AppState,
    request: Request<Body>,
) -> Result<BatchForm, AppError> {
    let max_file_size = state.config.max_file_size;

    // Get content type
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ValidationError::Malformed("missing Content-Type header".into()))?;

    // Parse boundary from content type
    let boundary = multer::parse_boundary(content_type).map_err(|e| {
        error!("Failed to parse boundary: {}", e);
        ValidationError::Malformed(format!("invalid multipart request: {}", e))
    })?;

    // Convert body to bytes
    let body_bytes = request
        .into_body()
        .collect()
        .await
        .map_err(|e| {
            error!("Failed to read request body: {}", e);
            ValidationError::Malformed(format!("failed to read request: {}", e))
        })?
        .to_bytes();

    let body_stream = stream::once(async move { Ok::<Bytes, Infallible>(body_bytes) });
    let mut multipart = Multipart::with_constraints(
        body_stream,
        boundary,
        Constraints::new().size_limit(SizeLimit::new().per_field(max_file_size)),
    );

    let mut form = BatchForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        error!("Multipart parsing error: {}", e);
        ValidationError::Malformed(format!("error parsing multipart request: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            let mime_type = field
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            if !mime_type.starts_with("video/") && mime_type != "application/octet-stream" {
                return Err(ValidationError::Malformed("only video files are allowed".into()).into());
            }
            let file_name = field.file_name().unwrap_or("video.mp4").to_string();

            // Read field data in chunks to enforce the size limit
            let mut data = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| chunk_error(e, max_file_size))?
            {
                data.extend_from_slice(&chunk);

                if data.len() as u64 > max_file_size {
                    let size_mb = data.len() as f64 / 1024.0 / 1024.0;
                    error!(
                        "File too large: {:.2}MB (max: {}MB)",
                        size_mb,
                        max_file_size / 1024 / 1024
                    );
                    return Err(AppError::TooLarge {
                        size_mb,
                        max_mb: max_file_size / 1024 / 1024,
                    });
                }
            }

            form.files.push(LocalFile {
                name: file_name,
                mime_type,
                bytes: Bytes::from(data),
            });
            continue;
        }

        let text = field.text().await.map_err(|e| {
            ValidationError::Malformed(format!("failed to read field {}: {}", name, e))
        })?;
        match name.as_str() {
            "spreadsheet_id" => form.spreadsheet_id = extract_spreadsheet_id(&text),
            "tab" => form.tab = text.trim().to_string(),
            "folder_id" => form.folder_id = non_empty(text),
            "content" => form.content = text,
            "make_public" => form.make_public = parse_flag(&text),
            "schema" => {
                form.schema = match non_empty(text) {
                    Some(s) => Some(s.parse().map_err(ValidationError::Malformed)?),
                    None => None,
                }
            }
            "identifier" => form.identifier = non_empty(text),
            "source_spreadsheet_id" => {
                form.source_spreadsheet_id = non_empty(extract_spreadsheet_id(&text))
            }
            "source_tab" => form.source_tab = non_empty(text),
            "lookup_name" => form.lookup_name = non_empty(text),
            other => warn!("[batch] ignoring unknown field {:?}", other),
        }
    }

    Ok(form)
}

/// Validates the form and resolves the batch-wide identifier.
pub async fn prepare_batch(
    state: &AppState,
    token: &str,
    form: BatchForm,
) -> Result<(BatchConfig, Vec<LocalFile>), AppError> {
    let mut config = BatchConfig {
        spreadsheet_id: form.spreadsheet_id,
        tab: form.tab,
        folder_id: form.folder_id,
        identifier: form.identifier,
        content: form.content,
        make_public: form.make_public,
        schema: form.schema.unwrap_or(state.config.schema),
    };
    config.validate(&form.files)?;

    if config.identifier.is_none() {
        if let (Some(source), Some(tab), Some(name)) =
            (&form.source_spreadsheet_id, &form.source_tab, &form.lookup_name)
        {
            let items = load_lookup_items(state.gateway.as_ref(), token, source, tab).await?;
            let identifier = resolve_identifier(&items, name)
                .ok_or_else(|| ValidationError::UnknownLookupName(name.clone()))?;
            config.identifier = Some(identifier);
        }
    }

    if let Some(folder) = &config.folder_id {
        state.preferences.set(FOLDER_KEY, json!(folder))?;
    }

    Ok((config, form.files))
}

/// Upload a batch and return the final per-file table
pub async fn batch_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request<Body>,
) -> Result<Json<BatchReport>, AppError> {
    let start_time = SystemTime::now();
    let token = bearer(&headers)?;
    let form = parse_batch_form(&state, request).await?;
    let (config, files) = prepare_batch(&state, &token, form).await?;

    let total_mb = files.iter().map(|f| f.bytes.len()).sum::<usize>() as f64 / 1024.0 / 1024.0;
    info!("[POST /batches] ⏱️  START - {:?}", SystemTime::now());
    info!(
        "[POST /batches] 📦 {} files, {:.2} MB total",
        files.len(),
        total_mb
    );

    let report = run_batch(state.gateway.as_ref(), &token, &config, &files, None).await?;

    let elapsed = start_time
        .elapsed()
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    info!(
        "[POST /batches] ✅ FINISHED in {:.2}s - {} done, {} failed",
        elapsed, report.succeeded, report.failed
    );

    Ok(Json(report))
}

/// Upload a batch, streaming every status change as a server-sent event
pub async fn batch_events_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request<Body>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let token = bearer(&headers)?;
    let form = parse_batch_form(&state, request).await?;
    let (config, files) = prepare_batch(&state, &token, form).await?;
    info!("[POST /batches/events] 📡 streaming {} files", files.len());

    let (tx, rx) = mpsc::unbounded_channel();
    let gateway = state.gateway.clone();
    let batch = tokio::spawn(async move {
        run_batch(gateway.as_ref(), &token, &config, &files, Some(&tx)).await
    });

    let task_events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .map(|event| Event::default().event("task").json_data(event));

    let finished = stream::once(async move {
        match batch.await {
            Ok(Ok(report)) => Event::default().event("done").json_data(report),
            Ok(Err(e)) => Ok(Event::default().event("error").data(e.to_string())),
            Err(e) => {
                error!("[POST /batches/events] batch task panicked: {}", e);
                Ok(Event::default().event("error").data("batch aborted"))
            }
        }
    });

    Ok(Sse::new(task_events.chain(finished)).keep_alive(KeepAlive::default()))
}
