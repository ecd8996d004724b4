use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::catalog::{CatalogEntry, CatalogSnapshot, ReferenceEntry};

/// Field separator for content hashes (never appears in spreadsheet cells)
const HASH_SEPARATOR: char = '\u{1f}';

// ============================================================================
// CONTENT HASHES
// ============================================================================

/// Hash of every stored column, used to count rows changed between imports
pub fn catalog_entry_hash(entry: &CatalogEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.haydon_part.as_bytes());
    for value in [entry.vendor_part.as_deref(), entry.vendor_name.as_deref()] {
        hasher.update(HASH_SEPARATOR.to_string());
        hasher.update(value.unwrap_or("").as_bytes());
    }
    for (column, value) in &entry.extra {
        hasher.update(HASH_SEPARATOR.to_string());
        hasher.update(column.as_bytes());
        hasher.update("=");
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

pub fn reference_entry_hash(entry: &ReferenceEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.name.as_bytes());
    for value in [entry.cover_image_url.as_deref(), entry.submittal_url.as_deref()] {
        hasher.update(HASH_SEPARATOR.to_string());
        hasher.update(value.unwrap_or("").as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// IMPORT LOG
// ============================================================================

/// One import run of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub import_id: String,
    pub imported_at: DateTime<Utc>,
    /// "catalog" or "reference"
    pub table_name: String,
    pub source_file: String,
    pub rows_read: usize,
    /// Rows whose content was not in the table before this import
    pub rows_changed: usize,
}

impl ImportRecord {
    pub fn new(table_name: &str, source_file: &str, rows_read: usize, rows_changed: usize) -> Self {
        Self {
            import_id: uuid::Uuid::new_v4().to_string(),
            imported_at: Utc::now(),
            table_name: table_name.to_string(),
            source_file: source_file.to_string(),
            rows_read,
            rows_changed,
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS catalog_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            row_index INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            haydon_part TEXT NOT NULL,
            vendor_part TEXT,
            vendor_name TEXT,
            extra TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reference_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            row_index INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            name TEXT NOT NULL,
            cover_image_url TEXT,
            submittal_url TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS imports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_id TEXT UNIQUE NOT NULL,
            imported_at TEXT NOT NULL,
            table_name TEXT NOT NULL,
            source_file TEXT NOT NULL,
            rows_read INTEGER NOT NULL,
            rows_changed INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_catalog_row ON catalog_entries(row_index)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reference_row ON reference_entries(row_index)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// WRITES
// ============================================================================

/// Hashes currently stored in `table`, one per row (duplicates kept)
fn stored_hashes(tx: &Transaction, table: &str) -> Result<HashMap<String, usize>> {
    let mut stmt = tx.prepare(&format!("SELECT content_hash FROM {}", table))?;
    let mut counts = HashMap::new();
    for hash in stmt.query_map([], |row| row.get::<_, String>(0))? {
        *counts.entry(hash?).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Rows of `hashes` not accounted for by `previous` (multiset difference)
fn count_changed(mut previous: HashMap<String, usize>, hashes: &[String]) -> usize {
    hashes
        .iter()
        .filter(|hash| match previous.get_mut(*hash) {
            Some(n) if *n > 0 => {
                *n -= 1;
                false
            }
            _ => true,
        })
        .count()
}

/// Replace the stored catalog with `entries`, one row per sheet row, in one
/// transaction. Returns how many rows are new or edited since the last import.
pub fn replace_catalog_entries(conn: &mut Connection, entries: &[CatalogEntry]) -> Result<usize> {
    let tx = conn.transaction()?;
    let previous = stored_hashes(&tx, "catalog_entries")?;
    let hashes: Vec<String> = entries.iter().map(catalog_entry_hash).collect();

    tx.execute("DELETE FROM catalog_entries", [])?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO catalog_entries (
                row_index, content_hash, haydon_part, vendor_part, vendor_name, extra
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        for (row_index, (entry, hash)) in entries.iter().zip(&hashes).enumerate() {
            let extra_json = serde_json::to_string(&entry.extra)?;
            stmt.execute(params![
                row_index as i64,
                hash,
                entry.haydon_part,
                entry.vendor_part,
                entry.vendor_name,
                extra_json,
            ])?;
        }
    }

    tx.commit()?;

    let changed = count_changed(previous, &hashes);
    info!(rows = entries.len(), changed, "Stored catalog entries");
    Ok(changed)
}

/// Replace the stored reference list with `entries`. Returns rows changed.
pub fn replace_reference_entries(conn: &mut Connection, entries: &[ReferenceEntry]) -> Result<usize> {
    let tx = conn.transaction()?;
    let previous = stored_hashes(&tx, "reference_entries")?;
    let hashes: Vec<String> = entries.iter().map(reference_entry_hash).collect();

    tx.execute("DELETE FROM reference_entries", [])?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO reference_entries (
                row_index, content_hash, name, cover_image_url, submittal_url
            ) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;

        for (row_index, (entry, hash)) in entries.iter().zip(&hashes).enumerate() {
            stmt.execute(params![
                row_index as i64,
                hash,
                entry.name,
                entry.cover_image_url,
                entry.submittal_url,
            ])?;
        }
    }

    tx.commit()?;

    let changed = count_changed(previous, &hashes);
    info!(rows = entries.len(), changed, "Stored reference entries");
    Ok(changed)
}

pub fn record_import(conn: &Connection, record: &ImportRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO imports (
            import_id, imported_at, table_name, source_file, rows_read, rows_changed
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.import_id,
            record.imported_at.to_rfc3339(),
            record.table_name,
            record.source_file,
            record.rows_read as i64,
            record.rows_changed as i64,
        ],
    )?;

    Ok(())
}

// ============================================================================
// READS
// ============================================================================

/// Rebuild the in-memory snapshot, rows in sheet order
pub fn load_snapshot(conn: &Connection) -> Result<CatalogSnapshot> {
    let mut stmt = conn.prepare(
        "SELECT haydon_part, vendor_part, vendor_name, extra
         FROM catalog_entries
         ORDER BY row_index",
    )?;

    let catalog = stmt
        .query_map([], |row| {
            let extra_json: String = row.get(3)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                extra_json,
            ))
        })?
        .map(|row| {
            let (haydon_part, vendor_part, vendor_name, extra_json) = row?;
            let extra: Vec<(String, String)> = serde_json::from_str(&extra_json)
                .with_context(|| format!("Corrupt extra columns for part '{}'", haydon_part))?;
            Ok(CatalogEntry::new(haydon_part, vendor_part, vendor_name).with_extra(extra))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT name, cover_image_url, submittal_url
         FROM reference_entries
         ORDER BY row_index",
    )?;

    let references = stmt
        .query_map([], |row| {
            Ok(ReferenceEntry::new(
                row.get::<_, String>(0)?,
                row.get(1)?,
                row.get(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CatalogSnapshot::new(catalog, references))
}

pub fn count_catalog_entries(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM catalog_entries", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_reference_entries(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM reference_entries", [], |row| row.get(0))?;
    Ok(count)
}

/// Import log, newest first
pub fn get_imports(conn: &Connection) -> Result<Vec<ImportRecord>> {
    let mut stmt = conn.prepare(
        "SELECT import_id, imported_at, table_name, source_file, rows_read, rows_changed
         FROM imports
         ORDER BY id DESC",
    )?;

    let records = stmt
        .query_map([], |row| {
            let imported_at: String = row.get(1)?;
            let rows_read: i64 = row.get(4)?;
            let rows_changed: i64 = row.get(5)?;
            Ok((
                row.get::<_, String>(0)?,
                imported_at,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                rows_read,
                rows_changed,
            ))
        })?
        .map(|row| {
            let (import_id, imported_at, table_name, source_file, rows_read, rows_changed) = row?;
            let imported_at = DateTime::parse_from_rfc3339(&imported_at)
                .with_context(|| format!("Bad timestamp on import {}", import_id))?
                .with_timezone(&Utc);
            Ok(ImportRecord {
                import_id,
                imported_at,
                table_name,
                source_file,
                rows_read: rows_read as usize,
                rows_changed: rows_changed as usize,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry::new("H-132-HDG", Some("AB-99".to_string()), Some("Acme".to_string()))
                .with_extra(vec![
                    ("Description".to_string(), "Beam clamp".to_string()),
                    ("List Price".to_string(), "12.50".to_string()),
                ]),
            CatalogEntry::new("H-119", None, None),
            CatalogEntry::new("", Some("UN-7".to_string()), Some("Unistrut".to_string())),
        ]
    }

    fn test_references() -> Vec<ReferenceEntry> {
        vec![
            ReferenceEntry::new(
                "H-132",
                Some("http://x/img.png".to_string()),
                Some("http://x/h132.pdf".to_string()),
            ),
            ReferenceEntry::new("H-119", None, None),
        ]
    }

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_reimport_same_sheet_changes_nothing() {
        let mut conn = test_db();
        let catalog = test_catalog();

        let changed1 = replace_catalog_entries(&mut conn, &catalog).unwrap();
        let changed2 = replace_catalog_entries(&mut conn, &catalog).unwrap();

        assert_eq!(changed1, 3, "First import: every row is new");
        assert_eq!(changed2, 0, "Same sheet again: nothing changed");
        assert_eq!(count_catalog_entries(&conn).unwrap(), 3);

        let refs = test_references();
        assert_eq!(replace_reference_entries(&mut conn, &refs).unwrap(), 2);
        assert_eq!(replace_reference_entries(&mut conn, &refs).unwrap(), 0);
        assert_eq!(count_reference_entries(&conn).unwrap(), 2);
    }

    #[test]
    fn test_duplicate_sheet_rows_are_kept() {
        let mut conn = test_db();
        let row = CatalogEntry::new("H-132-HDG", Some("AB-99".to_string()), None);
        let catalog = vec![row.clone(), row.clone()];

        assert_eq!(replace_catalog_entries(&mut conn, &catalog).unwrap(), 2);
        assert_eq!(load_snapshot(&conn).unwrap().catalog(), catalog.as_slice());

        // One copy dropped from the sheet: nothing new, one row fewer
        assert_eq!(replace_catalog_entries(&mut conn, &[row]).unwrap(), 0);
        assert_eq!(count_catalog_entries(&conn).unwrap(), 1);
    }

    #[test]
    fn test_edited_sheet_replaces_stale_rows() {
        let mut conn = test_db();
        replace_catalog_entries(&mut conn, &test_catalog()).unwrap();

        let mut edited = test_catalog();
        edited[0].vendor_part = Some("AB-77".to_string());
        let edited = CatalogSnapshot::new(edited, Vec::new()).catalog().to_vec();

        assert_eq!(replace_catalog_entries(&mut conn, &edited).unwrap(), 1);

        let snapshot = load_snapshot(&conn).unwrap();
        assert_eq!(snapshot.catalog(), edited.as_slice());
        assert!(!snapshot
            .catalog()
            .iter()
            .any(|e| e.vendor_part.as_deref() == Some("AB-99")));
    }

    #[test]
    fn test_catalog_entry_hash() {
        let catalog = test_catalog();

        assert_eq!(catalog_entry_hash(&catalog[0]), catalog_entry_hash(&catalog[0]));
        assert_eq!(catalog_entry_hash(&catalog[0]).len(), 64, "SHA-256 hex digest");
        assert_ne!(catalog_entry_hash(&catalog[0]), catalog_entry_hash(&catalog[1]));

        // Field boundaries matter
        let a = CatalogEntry::new("H-1", Some("23".to_string()), None);
        let b = CatalogEntry::new("H-12", Some("3".to_string()), None);
        assert_ne!(catalog_entry_hash(&a), catalog_entry_hash(&b));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut conn = test_db();
        replace_catalog_entries(&mut conn, &test_catalog()).unwrap();
        replace_reference_entries(&mut conn, &test_references()).unwrap();

        let snapshot = load_snapshot(&conn).unwrap();

        assert_eq!(snapshot.catalog(), test_catalog().as_slice());
        assert_eq!(snapshot.references(), test_references().as_slice());
        assert_eq!(snapshot.catalog()[0].normalized_vendor_part(), "ab99");
        assert_eq!(snapshot.catalog()[0].extra_value("List Price"), Some("12.50"));
        assert_eq!(snapshot.references()[0].lookup_key(), "H-132");
    }

    #[test]
    fn test_import_log() {
        let conn = test_db();

        let first = ImportRecord::new("catalog", "data/export.csv", 4, 3);
        let second = ImportRecord::new("reference", "data/image.csv", 2, 2);
        record_import(&conn, &first).unwrap();
        record_import(&conn, &second).unwrap();

        let imports = get_imports(&conn).unwrap();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].table_name, "reference", "Newest first");
        assert_eq!(imports[1].import_id, first.import_id);
        assert_eq!(imports[1].rows_read, 4);
        assert_eq!(imports[1].rows_changed, 3);
        assert_eq!(
            imports[1].imported_at.timestamp_micros(),
            first.imported_at.timestamp_micros()
        );
    }
}
