// Haydon Cross-Reference - Web Server
// REST API with Axum over a snapshot loaded once at startup

use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::Connection;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use haydon_xref::api::{router, AppState};
use haydon_xref::{load_snapshot, CatalogSnapshot, Config};

#[derive(Parser)]
#[command(name = "xref-server")]
#[command(version = haydon_xref::VERSION)]
#[command(about = "Haydon part number cross-reference web server", long_about = None)]
struct Args {
    /// Config file (default: ./haydon-xref.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read the CSV exports directly instead of the store
    #[arg(long)]
    csv: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haydon_xref=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    println!("🌐 Haydon Cross-Reference - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::load(args.config.as_deref())?;

    let snapshot = if args.csv {
        CatalogSnapshot::from_csv(&config.data.catalog_csv, &config.data.reference_csv)?
    } else {
        let db_path = &config.data.database;
        if !db_path.exists() {
            eprintln!("❌ Database not found at {:?}", db_path);
            eprintln!("   Run: haydon-xref import");
            eprintln!("   or start with --csv to read the CSV exports directly.");
            std::process::exit(1);
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open {}", db_path.display()))?;
        load_snapshot(&conn)?
    };
    println!(
        "✓ Snapshot loaded: {} catalog entries, {} reference entries",
        snapshot.catalog().len(),
        snapshot.references().len()
    );

    let mut state = AppState::new(snapshot, config.matching);

    if config.preview.enabled {
        state = with_preview(state, &config).await?;
    }

    let app = router(state);

    let addr = config.server.addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/search?q=H-132", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

#[cfg(feature = "preview")]
async fn with_preview(state: AppState, config: &Config) -> Result<AppState> {
    let search_url = config.preview.search_url.clone();
    let timeout = config.preview.timeout();

    // Blocking client must be built off the async workers
    let source = tokio::task::spawn_blocking(move || {
        haydon_xref::WebPreviewSource::new(&search_url, timeout)
    })
    .await??;

    println!("✓ Preview images enabled");
    Ok(state.with_preview(std::sync::Arc::new(source)))
}

#[cfg(not(feature = "preview"))]
async fn with_preview(state: AppState, _config: &Config) -> Result<AppState> {
    tracing::warn!("preview.enabled is set but this build lacks the `preview` feature");
    Ok(state)
}
