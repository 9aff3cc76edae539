use tracing::info;
use tracing_subscriber::EnvFilter;

use drive_sheet_uploader::{app, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env();

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "drive_sheet_uploader={},tower_http=debug",
            config.log_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port = config.port;
    let state = app::build_state(config)?;
    let router = app::router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    info!("🚀 Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("{}", "=".repeat(60));
    println!("✅ Server running on http://0.0.0.0:{}", port);
    println!("✅ Server accessible at http://localhost:{}", port);
    println!("{}", "=".repeat(60));
    println!("📊 Configuration:");
    println!("   Drive API: {}", state.config.google.drive_api);
    println!("   Sheets API: {}", state.config.google.sheets_api);
    println!("   Sheet schema: {:?}", state.config.schema);
    println!(
        "   Max file size: {} MB",
        state.config.max_file_size / 1024 / 1024
    );
    match &state.config.preferences_path {
        Some(path) => println!("   Preferences: {:?}", path),
        None => println!("   Preferences: in-memory"),
    }
    println!("{}", "=".repeat(60));

    info!("✅ Server listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
