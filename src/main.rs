// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use haydon_xref::{
    extract_core_part, lookup_order, count_catalog_entries, count_reference_entries, get_imports,
    load_catalog_csv, load_reference_csv, load_snapshot, record_import, replace_catalog_entries,
    replace_reference_entries, setup_database, CatalogEntry, CatalogSnapshot,
    Config, ImportRecord, LookupOutcome, Matcher, PreviewSource, VERSION,
};

#[derive(Parser)]
#[command(name = "haydon-xref")]
#[command(version = VERSION)]
#[command(about = "Haydon part number cross-reference lookup", long_about = None)]
struct Cli {
    /// Config file (default: ./haydon-xref.toml if present)
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the SQLite store with the Export and Image CSVs
    Import,
    /// Look up a Haydon or vendor part number
    Search {
        query: String,
        /// Read the CSV exports directly instead of the store
        #[arg(long)]
        csv: bool,
    },
    /// Show the reference fallback candidates for a part
    Candidates { part: String },
    /// Show the import log
    History,
    /// Interactive search (default)
    Ui {
        #[arg(long)]
        csv: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Ui { csv: false }) {
        Commands::Import => run_import(&config),
        Commands::Search { query, csv } => run_search(&config, &query, csv),
        Commands::Candidates { part } => run_candidates(&config, &part),
        Commands::History => run_history(&config),
        Commands::Ui { csv } => run_ui_mode(&config, csv),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haydon_xref=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_import(config: &Config) -> Result<()> {
    println!("🗄️  Import: CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let catalog_path = &config.data.catalog_csv;
    let reference_path = &config.data.reference_csv;

    // 1. Load CSVs
    println!("\n📂 Loading CSVs...");
    let catalog = load_catalog_csv(catalog_path)?;
    println!("✓ Loaded {} catalog entries from {}", catalog.len(), catalog_path.display());
    let references = load_reference_csv(reference_path)?;
    println!("✓ Loaded {} reference entries from {}", references.len(), reference_path.display());

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    if let Some(parent) = config.data.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let mut conn = Connection::open(&config.data.database)
        .with_context(|| format!("Failed to open {}", config.data.database.display()))?;
    setup_database(&conn)?;
    println!("✓ Database initialized with WAL mode");

    // 3. Replace stored rows with the sheets
    println!("\n💾 Replacing stored entries...");
    let catalog_changed = replace_catalog_entries(&mut conn, &catalog)?;
    record_import(
        &conn,
        &ImportRecord::new("catalog", &catalog_path.display().to_string(), catalog.len(), catalog_changed),
    )?;
    let reference_changed = replace_reference_entries(&mut conn, &references)?;
    record_import(
        &conn,
        &ImportRecord::new(
            "reference",
            &reference_path.display().to_string(),
            references.len(),
            reference_changed,
        ),
    )?;

    // 4. Verify counts
    println!("\n🔍 Verifying database...");
    println!(
        "✓ Catalog: {} stored, {} new or edited since last import",
        count_catalog_entries(&conn)?,
        catalog_changed
    );
    println!(
        "✓ Reference: {} stored, {} new or edited since last import",
        count_reference_entries(&conn)?,
        reference_changed
    );

    println!("\n✅ Import complete");
    Ok(())
}

/// Snapshot from the store, or straight from the CSV exports
fn open_snapshot(config: &Config, from_csv: bool) -> Result<CatalogSnapshot> {
    if from_csv {
        return CatalogSnapshot::from_csv(&config.data.catalog_csv, &config.data.reference_csv);
    }

    let db_path: &Path = &config.data.database;
    if !db_path.exists() {
        eprintln!("❌ Database not found at {}", db_path.display());
        eprintln!("   Run: haydon-xref import");
        eprintln!("   or pass --csv to read the CSV exports directly.");
        std::process::exit(1);
    }

    let conn = Connection::open(db_path)?;
    load_snapshot(&conn)
}

#[cfg(feature = "preview")]
fn build_preview(config: &Config) -> Result<Option<Box<dyn PreviewSource>>> {
    if !config.preview.enabled {
        return Ok(None);
    }

    let source =
        haydon_xref::WebPreviewSource::new(&config.preview.search_url, config.preview.timeout())?;
    Ok(Some(Box::new(source)))
}

#[cfg(not(feature = "preview"))]
fn build_preview(config: &Config) -> Result<Option<Box<dyn PreviewSource>>> {
    if config.preview.enabled {
        tracing::warn!("preview.enabled is set but this build lacks the `preview` feature");
    }
    Ok(None)
}

fn run_search(config: &Config, query: &str, from_csv: bool) -> Result<()> {
    if query.trim().is_empty() {
        eprintln!("❌ Enter a Haydon or vendor part number.");
        std::process::exit(2);
    }

    let snapshot = open_snapshot(config, from_csv)?;
    let preview = build_preview(config)?;

    let mut matcher = Matcher::new(&snapshot, config.matching);
    if let Some(source) = preview.as_deref() {
        matcher = matcher.with_preview(source);
    }

    let outcome = matcher.lookup(query);
    print!("{}", render_outcome(&outcome));

    Ok(())
}

fn run_candidates(config: &Config, part: &str) -> Result<()> {
    print!("{}", render_candidates(config, part));
    Ok(())
}

fn render_candidates(config: &Config, part: &str) -> String {
    let mut out = format!("Part:      {}\n", part);
    out.push_str(&format!(
        "Core part: {}\n",
        extract_core_part(part, config.matching.core_part_suffix)
    ));
    out.push_str(&format!(
        "Reference lookup order ({} mode):\n",
        config.matching.mode.as_str()
    ));
    for (i, candidate) in lookup_order(part).iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, candidate));
    }
    out
}

fn run_history(config: &Config) -> Result<()> {
    let conn = Connection::open(&config.data.database)?;
    setup_database(&conn)?;

    let imports = get_imports(&conn)?;
    if imports.is_empty() {
        println!("No imports recorded.");
        return Ok(());
    }

    for record in imports {
        println!(
            "{}  {:<9}  read {:>6}  changed {:>6}  {}",
            record.imported_at.format("%Y-%m-%d %H:%M:%S"),
            record.table_name,
            record.rows_read,
            record.rows_changed,
            record.source_file
        );
    }

    Ok(())
}

/// Plain-text rendering of one lookup: result table, then product details
fn render_outcome(outcome: &LookupOutcome) -> String {
    let LookupOutcome::Matched {
        entries,
        core_part,
        reference,
        ..
    } = outcome
    else {
        return "⚠️  No cross-reference found for that part number.\n".to_string();
    };

    let mut out = format!("Found {} matching entry(ies):\n\n", entries.len());
    out.push_str(&render_table(entries));

    out.push_str("\nProduct Details\n");
    out.push_str("━━━━━━━━━━━━━━━\n");
    out.push_str(&format!("Core part: {}\n", core_part));

    if let Some(url) = outcome.image_url() {
        out.push_str(&format!("🖼️  Image: {}\n", url));
    }

    match reference {
        Some(found) => {
            out.push_str(&format!("Reference: {} (via {})\n", found.entry.name, found.candidate));
            match outcome.submittal_url() {
                Some(url) => out.push_str(&format!("📄 View Submittal: {}\n", url)),
                None => out.push_str("ℹ️  No submittal file available.\n"),
            }
        }
        None => out.push_str("ℹ️  No product image/submittal found in reference list.\n"),
    }

    out
}

fn render_table(entries: &[CatalogEntry]) -> String {
    let mut headers: Vec<String> = vec![
        "Haydon Part #".to_string(),
        "Vendor Part #".to_string(),
        "Vendor".to_string(),
    ];
    if let Some(first) = entries.first() {
        headers.extend(first.extra.iter().map(|(column, _)| column.clone()));
    }

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            let mut row = vec![
                entry.haydon_part.clone(),
                entry.vendor_part.clone().unwrap_or_default(),
                entry.vendor_name.clone().unwrap_or_default(),
            ];
            row.extend(headers[3..].iter().map(|column| {
                entry.extra_value(column).unwrap_or("").to_string()
            }));
            row
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |cells: &[String]| -> String {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        format!("{}\n", line.join("  ").trim_end())
    };

    let mut out = format_row(&headers);
    let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    out.push_str(&format!("{}\n", rule.join("  ")));
    for row in &rows {
        out.push_str(&format_row(row));
    }
    out
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config, from_csv: bool) -> Result<()> {
    println!("🖥️  Loading Haydon Cross-Reference UI...\n");

    let snapshot = open_snapshot(config, from_csv)?;
    println!(
        "✓ Loaded {} catalog entries, {} reference entries\n",
        snapshot.catalog().len(),
        snapshot.references().len()
    );

    let preview = build_preview(config)?;
    let mut app = ui::App::new(snapshot, config.matching, preview);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config, _from_csv: bool) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or search directly: haydon-xref search <part>");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use haydon_xref::{MatchOptions, ReferenceEntry};

    fn test_snapshot() -> CatalogSnapshot {
        CatalogSnapshot::new(
            vec![
                CatalogEntry::new("H-132-HDG", Some("AB-99".to_string()), Some("Acme".to_string()))
                    .with_extra(vec![("Description".to_string(), "Beam clamp".to_string())]),
                CatalogEntry::new("Q-77", None, None)
                    .with_extra(vec![("Description".to_string(), "Pipe strap".to_string())]),
            ],
            vec![
                ReferenceEntry::new("H-132", Some("http://x/img.png".to_string()), None),
                ReferenceEntry::new(
                    "Q-77",
                    Some("http://x/q77.png".to_string()),
                    Some("http://x/q77.pdf".to_string()),
                ),
            ],
        )
    }

    #[test]
    fn test_render_no_matches() {
        let text = render_outcome(&LookupOutcome::NoMatches);
        assert!(text.contains("No cross-reference found"));
        assert!(!text.contains("Product Details"));
    }

    #[test]
    fn test_render_match_without_submittal() {
        let snapshot = test_snapshot();
        let outcome = Matcher::new(&snapshot, MatchOptions::default()).lookup("AB-99");
        let text = render_outcome(&outcome);

        assert!(text.starts_with("Found 1 matching entry(ies):"));
        assert!(text.contains("Beam clamp"));
        assert!(text.contains("Core part: H-132"));
        assert!(text.contains("Image: http://x/img.png"));
        assert!(text.contains("No submittal file available."));
        assert!(!text.contains("ab99"), "Normalized keys are never shown");
    }

    #[test]
    fn test_render_match_with_submittal() {
        let snapshot = test_snapshot();
        let outcome = Matcher::new(&snapshot, MatchOptions::default()).lookup("q-77");
        let text = render_outcome(&outcome);

        assert!(text.contains("View Submittal: http://x/q77.pdf"));
    }

    #[test]
    fn test_render_candidates_lists_written_part_first() {
        let text = render_candidates(&Config::default(), "TSN 802");
        let steps: Vec<&str> = text.lines().skip(3).collect();

        assert!(text.contains("Core part: TSN 802"));
        assert!(text.contains("lookup order (prefix mode)"));
        assert_eq!(
            steps,
            vec!["  1. TSN 802", "  2. TSN-802", "  3. TSN", "  4. TSN800"]
        );
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let table = render_table(test_snapshot().catalog());
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4, "Header, rule, two rows");
        assert!(lines[0].starts_with("Haydon Part #  Vendor Part #  Vendor  Description"));
        assert!(lines[2].starts_with("H-132-HDG      AB-99"));
        assert!(lines[3].ends_with("Pipe strap"));
    }
}
