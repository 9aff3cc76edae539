use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config,
    gateway::{Gateway, GoogleGateway},
    handlers::{
        add_tabs_handler, batch_events_handler, batch_handler, create_folder_handler,
        create_spreadsheet_handler, get_preference_handler, health_handler, list_folders_handler,
        list_spreadsheets_handler, list_tabs_handler, lookup_handler, me_handler,
        put_preference_handler,
    },
    models::AppState,
    prefs::{JsonFilePreferences, MemoryPreferences, PreferenceStore},
};

/// Wires the real Google gateway and the configured preference store.
pub fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let gateway: Arc<dyn Gateway> = Arc::new(GoogleGateway::new(&config.google)?);
    let preferences: Arc<dyn PreferenceStore> = match &config.preferences_path {
        Some(path) => Arc::new(JsonFilePreferences::open(path)),
        None => Arc::new(MemoryPreferences::new()),
    };

    Ok(Arc::new(AppState {
        gateway,
        preferences,
        config,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/me", get(me_handler))
        .route("/folders", get(list_folders_handler).post(create_folder_handler))
        .route(
            "/spreadsheets",
            get(list_spreadsheets_handler).post(create_spreadsheet_handler),
        )
        .route(
            "/spreadsheets/:id/tabs",
            get(list_tabs_handler).post(add_tabs_handler),
        )
        .route("/spreadsheets/:id/tabs/:tab/lookup", get(lookup_handler))
        .route("/batches", post(batch_handler))
        .route("/batches/events", post(batch_events_handler))
        .route(
            "/preferences/:key",
            get(get_preference_handler).put(put_preference_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
