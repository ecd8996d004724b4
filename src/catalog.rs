// 📚 Catalog Tables - Cross-reference rows + image/submittal reference rows
// Loaded once per session into an immutable snapshot, then only queried

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::{info, warn};

use crate::matcher::normalize;

/// Column headers of the "Export" sheet
pub const HAYDON_PART_COLUMN: &str = "Haydon Part #";
pub const VENDOR_PART_COLUMN: &str = "Vendor Part #";
pub const VENDOR_NAME_COLUMN: &str = "Vendor";

/// Column headers of the "Image" sheet
pub const REFERENCE_NAME_COLUMN: &str = "Name";
pub const COVER_IMAGE_COLUMN: &str = "Cover Image";
pub const SUBMITTAL_COLUMN: &str = "Files";

// ============================================================================
// CATALOG ENTRY
// ============================================================================

/// One row of the cross-reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Haydon's own catalog code (may be blank on vendor-only rows)
    pub haydon_part: String,

    /// Competitor / customer equivalent code
    pub vendor_part: Option<String>,

    /// Competitor / customer name
    pub vendor_name: Option<String>,

    /// Remaining display columns, in source order, passed through unchanged
    #[serde(default)]
    pub extra: Vec<(String, String)>,

    #[serde(skip)]
    normalized_haydon_part: String,

    #[serde(skip)]
    normalized_vendor_part: String,
}

impl CatalogEntry {
    pub fn new(
        haydon_part: impl Into<String>,
        vendor_part: Option<String>,
        vendor_name: Option<String>,
    ) -> Self {
        let haydon_part = haydon_part.into();
        let normalized_haydon_part = normalize(Some(&haydon_part));
        let normalized_vendor_part = normalize(vendor_part.as_deref());

        CatalogEntry {
            haydon_part,
            vendor_part,
            vendor_name,
            extra: Vec::new(),
            normalized_haydon_part,
            normalized_vendor_part,
        }
    }

    /// Attach the pass-through display columns
    pub fn with_extra(mut self, extra: Vec<(String, String)>) -> Self {
        self.extra = extra;
        self
    }

    pub fn normalized_haydon_part(&self) -> &str {
        &self.normalized_haydon_part
    }

    pub fn normalized_vendor_part(&self) -> &str {
        &self.normalized_vendor_part
    }

    /// Look up a pass-through column by header
    pub fn extra_value(&self, column: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Recompute derived keys (after deserializing, where they are skipped)
    fn with_derived_keys(self) -> Self {
        let extra = self.extra;
        CatalogEntry::new(self.haydon_part, self.vendor_part, self.vendor_name).with_extra(extra)
    }
}

// ============================================================================
// REFERENCE ENTRY
// ============================================================================

/// One row of the image/submittal reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Core/family part code, e.g. "H-132"
    pub name: String,

    pub cover_image_url: Option<String>,

    pub submittal_url: Option<String>,

    /// Trimmed, upper-cased name used when comparing against candidates
    #[serde(skip)]
    lookup_key: String,
}

impl ReferenceEntry {
    pub fn new(
        name: impl Into<String>,
        cover_image_url: Option<String>,
        submittal_url: Option<String>,
    ) -> Self {
        let name = name.into();
        let lookup_key = name.trim().to_uppercase();

        ReferenceEntry {
            name,
            cover_image_url,
            submittal_url,
            lookup_key,
        }
    }

    pub fn lookup_key(&self) -> &str {
        &self.lookup_key
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Immutable pair of tables built once at startup and shared by reference
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    catalog: Vec<CatalogEntry>,
    references: Vec<ReferenceEntry>,
}

impl CatalogSnapshot {
    pub fn new(catalog: Vec<CatalogEntry>, references: Vec<ReferenceEntry>) -> Self {
        CatalogSnapshot {
            catalog: catalog.into_iter().map(CatalogEntry::with_derived_keys).collect(),
            references: references
                .into_iter()
                .map(|r| ReferenceEntry::new(r.name, r.cover_image_url, r.submittal_url))
                .collect(),
        }
    }

    /// Load both tables straight from their CSV exports
    pub fn from_csv(catalog_path: &Path, reference_path: &Path) -> Result<Self> {
        let catalog = load_catalog_csv(catalog_path)?;
        let references = load_reference_csv(reference_path)?;

        info!(
            catalog = catalog.len(),
            references = references.len(),
            "Loaded catalog snapshot from CSV"
        );

        Ok(CatalogSnapshot::new(catalog, references))
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    pub fn references(&self) -> &[ReferenceEntry] {
        &self.references
    }
}

// ============================================================================
// CSV LOADING
// ============================================================================

pub fn load_catalog_csv(csv_path: &Path) -> Result<Vec<CatalogEntry>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open catalog CSV: {}", csv_path.display()))?;
    read_catalog(file).with_context(|| format!("Failed to read catalog CSV: {}", csv_path.display()))
}

pub fn load_reference_csv(csv_path: &Path) -> Result<Vec<ReferenceEntry>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open reference CSV: {}", csv_path.display()))?;
    read_references(file)
        .with_context(|| format!("Failed to read reference CSV: {}", csv_path.display()))
}

/// Read "Export" rows from any CSV source
pub fn read_catalog<R: io::Read>(source: R) -> Result<Vec<CatalogEntry>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(source);
    let headers = trimmed_headers(&mut rdr)?;

    let haydon_idx = require_column(&headers, HAYDON_PART_COLUMN)?;
    let vendor_idx = find_column(&headers, VENDOR_PART_COLUMN);
    let vendor_name_idx = find_column(&headers, VENDOR_NAME_COLUMN);

    let mut entries = Vec::new();
    let mut skipped = 0;

    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Malformed catalog row {}", line + 2))?;

        let haydon_part = cell(&record, Some(haydon_idx));
        let vendor_part = cell(&record, vendor_idx);

        // Nothing to match on
        if haydon_part.is_none() && vendor_part.is_none() {
            skipped += 1;
            continue;
        }

        let extra = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| {
                *idx != haydon_idx && Some(*idx) != vendor_idx && Some(*idx) != vendor_name_idx
            })
            .map(|(idx, name)| (name.clone(), record.get(idx).unwrap_or("").to_string()))
            .collect();

        entries.push(
            CatalogEntry::new(
                haydon_part.unwrap_or_default(),
                vendor_part,
                cell(&record, vendor_name_idx),
            )
            .with_extra(extra),
        );
    }

    if skipped > 0 {
        warn!(skipped, "Skipped catalog rows with no Haydon or vendor part");
    }

    Ok(entries)
}

/// Read "Image" rows from any CSV source
pub fn read_references<R: io::Read>(source: R) -> Result<Vec<ReferenceEntry>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(source);
    let headers = trimmed_headers(&mut rdr)?;

    let name_idx = require_column(&headers, REFERENCE_NAME_COLUMN)?;
    let image_idx = find_column(&headers, COVER_IMAGE_COLUMN);
    let files_idx = find_column(&headers, SUBMITTAL_COLUMN);

    let mut entries = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Malformed reference row {}", line + 2))?;

        let Some(name) = cell(&record, Some(name_idx)) else {
            continue;
        };

        entries.push(ReferenceEntry::new(
            name,
            cell(&record, image_idx),
            cell(&record, files_idx),
        ));
    }

    Ok(entries)
}

fn trimmed_headers<R: io::Read>(rdr: &mut csv::Reader<R>) -> Result<Vec<String>> {
    let headers = rdr.headers().context("Failed to read CSV header row")?;
    Ok(headers.iter().map(|h| h.trim().to_string()).collect())
}

fn find_column(headers: &[String], column: &str) -> Option<usize> {
    headers.iter().position(|h| h == column)
}

fn require_column(headers: &[String], column: &str) -> Result<usize> {
    match find_column(headers, column) {
        Some(idx) => Ok(idx),
        None => bail!("Missing required column '{}' (found: {:?})", column, headers),
    }
}

/// Blank or whitespace-only cells are absent
fn cell(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    let value = record.get(idx?)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
