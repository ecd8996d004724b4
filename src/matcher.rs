// 🔎 Matcher - Part number normalization, search and reference fallback
//
// Problem solved:
// - "H-132-HDG", "h132hdg", "H 132 HDG" → same key
// - Partial input ("132") still finds catalog rows (substring search)
// - Full SKUs ("H-132-HDG X 10") resolve to a family image ("H-132")
//   by dropping trailing modifier tokens one at a time

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

use crate::catalog::{CatalogEntry, CatalogSnapshot, ReferenceEntry};
use crate::preview::PreviewSource;

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Collapse a part code to its comparison key
///
/// Absent input → "". Otherwise every non-ASCII-alphanumeric character is
/// dropped and the rest lower-cased. Idempotent.
pub fn normalize(raw: Option<&str>) -> String {
    match raw {
        Some(s) => s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect(),
        None => String::new(),
    }
}

// ============================================================================
// CROSS-REFERENCE SEARCH
// ============================================================================

/// Substring search over the normalized Haydon and vendor part codes
///
/// An empty normalized query matches every entry with a non-empty key.
pub fn search<'a>(entries: &'a [CatalogEntry], query: &str) -> Vec<&'a CatalogEntry> {
    let normalized_query = normalize(Some(query));

    entries
        .iter()
        .filter(|entry| {
            contains_key(entry.normalized_haydon_part(), &normalized_query)
                || contains_key(entry.normalized_vendor_part(), &normalized_query)
        })
        .collect()
}

fn contains_key(field: &str, query: &str) -> bool {
    !field.is_empty() && field.contains(query)
}

// ============================================================================
// CORE PART EXTRACTION
// ============================================================================

fn core_part_regex(with_suffix: bool) -> &'static Regex {
    static PLAIN: OnceLock<Regex> = OnceLock::new();
    static WITH_SUFFIX: OnceLock<Regex> = OnceLock::new();

    if with_suffix {
        WITH_SUFFIX.get_or_init(|| {
            Regex::new(r"(?i)^([A-Z]+-[0-9]+(?:-[A-Z0-9]+)?)").expect("core part regex")
        })
    } else {
        PLAIN.get_or_init(|| Regex::new(r"(?i)^([A-Z]+-[0-9]+)").expect("core part regex"))
    }
}

/// Family code of a full catalog SKU
///
/// Example: "H-132-HDG X 10" → "H-132" ("H-132-HDG" with the suffix block).
/// Falls back to the trimmed, upper-cased input when the pattern is absent.
pub fn extract_core_part(haydon_part: &str, with_suffix: bool) -> String {
    let trimmed = haydon_part.trim();

    match core_part_regex(with_suffix).captures(trimmed) {
        Some(caps) => caps[1].to_uppercase(),
        None => trimmed.to_uppercase(),
    }
}

// ============================================================================
// FALLBACK CANDIDATES
// ============================================================================

fn token_separator_regex() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[ \-()]+").expect("separator regex"))
}

fn numeric_family_regex() -> &'static Regex {
    static FAMILY: OnceLock<Regex> = OnceLock::new();
    FAMILY.get_or_init(|| Regex::new(r"^([A-Z]+)([0-9]{3,})$").expect("numeric family regex"))
}

/// Progressively generalized codes for one part, most specific first
///
/// Truncations of the leading tokens come first (longest to shortest),
/// then the numeric-family code if the part ends in 3+ digits.
#[derive(Debug, Clone)]
pub struct Candidates {
    tokens: Vec<String>,
    remaining: usize,
    numeric_family: Option<String>,
}

impl Iterator for Candidates {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.remaining > 0 {
            let joined = self.tokens[..self.remaining].join("-");
            self.remaining -= 1;
            return Some(joined);
        }

        self.numeric_family.take()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining + usize::from(self.numeric_family.is_some());
        (n, Some(n))
    }
}

/// Build the candidate sequence for a part; call again to restart
pub fn candidates(haydon_part: &str) -> Candidates {
    let upper = haydon_part.trim().to_uppercase();

    let tokens: Vec<String> = token_separator_regex()
        .split(&upper)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Candidates {
        remaining: tokens.len(),
        tokens,
        numeric_family: numeric_family(&upper),
    }
}

/// "TSN802" → "TSN800": first two digits of the run, then a single zero
///
/// Separators are stripped first, so "TSN 802" and "TSN (802)" qualify too.
fn numeric_family(upper: &str) -> Option<String> {
    let stripped = token_separator_regex().replace_all(upper, "");
    let caps = numeric_family_regex().captures(&stripped)?;

    let prefix = &caps[1];
    let digits = &caps[2];

    Some(format!("{}{}0", prefix, &digits[..2]))
}

/// Every code tried against the reference list, in order: the part as
/// written (trimmed, upper-cased), then its candidates. Empty codes and
/// repeats are dropped.
pub fn lookup_order(haydon_part: &str) -> Vec<String> {
    let unmodified = haydon_part.trim().to_uppercase();
    let mut order: Vec<String> = Vec::new();

    for candidate in std::iter::once(unmodified).chain(candidates(haydon_part)) {
        if !candidate.is_empty() && !order.contains(&candidate) {
            order.push(candidate);
        }
    }

    order
}

// ============================================================================
// MATCHING OPTIONS
// ============================================================================

/// How a candidate is compared with a reference name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Reference name starts with the candidate
    #[default]
    Prefix,

    /// Reference name equals the candidate
    Exact,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Prefix => "prefix",
            MatchMode::Exact => "exact",
        }
    }

    fn accepts(&self, lookup_key: &str, candidate: &str) -> bool {
        match self {
            MatchMode::Prefix => lookup_key.starts_with(candidate),
            MatchMode::Exact => lookup_key == candidate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    pub mode: MatchMode,

    /// Keep a "-SUFFIX" block in the extracted core part
    pub core_part_suffix: bool,
}

// ============================================================================
// LOOKUP RESULTS
// ============================================================================

/// Reference row found for a part, and the candidate that reached it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceMatch {
    pub candidate: String,
    pub entry: ReferenceEntry,
}

/// Outcome of one user query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LookupOutcome {
    /// No catalog row matched; no reference lookup was attempted
    NoMatches,

    Matched {
        entries: Vec<CatalogEntry>,

        /// Family code of the first match, used as the image caption
        core_part: String,

        /// None = matched, but nothing in the reference list
        reference: Option<ReferenceMatch>,

        /// Best-effort web image, only looked up when no catalog image exists
        preview: Option<String>,
    },
}

impl LookupOutcome {
    pub fn entries(&self) -> &[CatalogEntry] {
        match self {
            LookupOutcome::NoMatches => &[],
            LookupOutcome::Matched { entries, .. } => entries,
        }
    }

    /// Image URL to show: reference cover image first, then the preview
    pub fn image_url(&self) -> Option<&str> {
        match self {
            LookupOutcome::NoMatches => None,
            LookupOutcome::Matched { reference, preview, .. } => reference
                .as_ref()
                .and_then(|r| r.entry.cover_image_url.as_deref())
                .or(preview.as_deref()),
        }
    }

    pub fn submittal_url(&self) -> Option<&str> {
        match self {
            LookupOutcome::NoMatches => None,
            LookupOutcome::Matched { reference, .. } => reference
                .as_ref()
                .and_then(|r| r.entry.submittal_url.as_deref()),
        }
    }

    /// Matched rows but no reference image to show
    pub fn wants_preview(&self) -> bool {
        match self {
            LookupOutcome::NoMatches => false,
            LookupOutcome::Matched { reference, preview, .. } => {
                preview.is_none()
                    && reference
                        .as_ref()
                        .and_then(|r| r.entry.cover_image_url.as_ref())
                        .is_none()
            }
        }
    }

    /// Part code to feed the preview source
    pub fn preview_query(&self) -> Option<&str> {
        self.entries().first().map(|e| {
            if e.haydon_part.is_empty() {
                e.vendor_part.as_deref().unwrap_or("")
            } else {
                e.haydon_part.as_str()
            }
        })
    }
}

// ============================================================================
// MATCHER
// ============================================================================

/// Query engine over one immutable snapshot
pub struct Matcher<'a> {
    snapshot: &'a CatalogSnapshot,
    options: MatchOptions,
    preview: Option<&'a dyn PreviewSource>,
}

impl<'a> Matcher<'a> {
    pub fn new(snapshot: &'a CatalogSnapshot, options: MatchOptions) -> Self {
        Matcher {
            snapshot,
            options,
            preview: None,
        }
    }

    /// Fall back to a web preview when no reference image exists
    pub fn with_preview(mut self, preview: &'a dyn PreviewSource) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn options(&self) -> MatchOptions {
        self.options
    }

    pub fn search(&self, query: &str) -> Vec<&'a CatalogEntry> {
        search(self.snapshot.catalog(), query)
    }

    pub fn core_part(&self, haydon_part: &str) -> String {
        extract_core_part(haydon_part, self.options.core_part_suffix)
    }

    /// First reference row reachable from the part's candidate sequence
    ///
    /// Order: the unmodified part, each truncation longest to shortest,
    /// then the numeric-family code.
    pub fn resolve_reference(&self, haydon_part: &str) -> Option<ReferenceMatch> {
        for candidate in lookup_order(haydon_part) {
            let hit = self
                .snapshot
                .references()
                .iter()
                .find(|r| self.options.mode.accepts(r.lookup_key(), &candidate));

            if let Some(entry) = hit {
                debug!(part = haydon_part, %candidate, reference = %entry.name, "Reference resolved");
                return Some(ReferenceMatch {
                    candidate,
                    entry: entry.clone(),
                });
            }

            debug!(part = haydon_part, %candidate, "No reference for candidate");
        }

        None
    }

    /// Search, then resolve the reference for the first match
    pub fn lookup(&self, query: &str) -> LookupOutcome {
        let entries: Vec<CatalogEntry> = self.search(query).into_iter().cloned().collect();

        let Some(first) = entries.first() else {
            debug!(query, "No catalog match");
            return LookupOutcome::NoMatches;
        };

        let core_part = self.core_part(&first.haydon_part);
        let reference = self.resolve_reference(&first.haydon_part);

        let mut outcome = LookupOutcome::Matched {
            entries,
            core_part,
            reference,
            preview: None,
        };

        if let Some(source) = self.preview {
            if outcome.wants_preview() {
                let fetched = outcome
                    .preview_query()
                    .and_then(|q| source.fetch_preview_image(q));
                if let LookupOutcome::Matched { preview, .. } = &mut outcome {
                    *preview = fetched;
                }
            }
        }

        outcome
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn entry(haydon: &str, vendor: Option<&str>) -> CatalogEntry {
        CatalogEntry::new(haydon, vendor.map(str::to_string), None)
    }

    fn reference(name: &str, image: Option<&str>) -> ReferenceEntry {
        ReferenceEntry::new(name, image.map(str::to_string), None)
    }

    fn collect(part: &str) -> Vec<String> {
        candidates(part).collect()
    }

    #[test]
    fn test_normalize_collapses_punctuation_and_case() {
        assert_eq!(normalize(Some("H-132-HDG")), "h132hdg");
        assert_eq!(normalize(Some("h132hdg")), "h132hdg");
        assert_eq!(normalize(Some("H 132 HDG")), "h132hdg");
        assert_eq!(normalize(Some("  (TSN) 802/b ")), "tsn802b");
    }

    #[test]
    fn test_normalize_absent_and_non_ascii() {
        assert_eq!(normalize(None), "");
        assert_eq!(normalize(Some("")), "");
        assert_eq!(normalize(Some("Ø-12 µm")), "12m");
    }

    #[test]
    fn test_normalize_idempotent() {
        for raw in ["H-132-HDG X 10", "ab-99", "  ", "Ünïcode-7"] {
            let once = normalize(Some(raw));
            assert_eq!(normalize(Some(&once)), once);
        }
    }

    #[test]
    fn test_search_substring_on_both_keys() {
        let entries = vec![
            entry("H-132-HDG", Some("AB-99")),
            entry("AB-1320", None),
            entry("H-119", Some("XY-5")),
        ];

        let hits = search(&entries, "132");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].haydon_part, "H-132-HDG");
        assert_eq!(hits[1].haydon_part, "AB-1320");

        let hits = search(&entries, "ab 99");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].haydon_part, "H-132-HDG");

        assert!(search(&entries, "zzz").is_empty());
    }

    #[test]
    fn test_search_empty_query_matches_non_empty_keys() {
        let entries = vec![
            entry("H-132-HDG", None),
            entry("", Some("UN-7")),
            entry("", None),
        ];

        let hits = search(&entries, "");
        assert_eq!(hits.len(), 2);

        // Punctuation-only queries normalize to empty too
        assert_eq!(search(&entries, " -- ").len(), 2);
    }

    #[test]
    fn test_extract_core_part() {
        assert_eq!(extract_core_part("H-132-HDG X 10", false), "H-132");
        assert_eq!(extract_core_part("h-132-hdg", false), "H-132");
        assert_eq!(extract_core_part("H-132-HDG X 10", true), "H-132-HDG");
        assert_eq!(extract_core_part("TSN-802", true), "TSN-802");
    }

    #[test]
    fn test_extract_core_part_falls_back_to_input() {
        assert_eq!(extract_core_part("  tsn802 ", false), "TSN802");
        assert_eq!(extract_core_part("", false), "");
    }

    #[test]
    fn test_candidates_truncate_longest_first() {
        assert_eq!(
            collect("H-132-HDG X 10"),
            vec!["H-132-HDG-X-10", "H-132-HDG-X", "H-132-HDG", "H-132", "H"]
        );
    }

    #[test]
    fn test_candidates_split_on_parens_and_runs() {
        assert_eq!(
            collect("h-200 (ss) --4"),
            vec!["H-200-SS-4", "H-200-SS", "H-200", "H"]
        );
    }

    #[test]
    fn test_candidates_numeric_family_last() {
        assert_eq!(collect("TSN-802"), vec!["TSN-802", "TSN", "TSN800"]);
        assert_eq!(collect("AB-1320"), vec!["AB-1320", "AB", "AB130"]);
    }

    #[test]
    fn test_candidates_numeric_family_ignores_separators() {
        assert_eq!(collect("TSN 802"), vec!["TSN-802", "TSN", "TSN800"]);
        assert_eq!(collect("tsn (802)"), vec!["TSN-802", "TSN", "TSN800"]);
    }

    #[test]
    fn test_candidates_keep_x_as_token() {
        // "X" is part of the code, never a separator
        assert_eq!(collect("HX-100"), vec!["HX-100", "HX", "HX100"]);
        assert_eq!(collect("H-132 X 10")[0], "H-132-X-10");
    }

    #[test]
    fn test_lookup_order_starts_with_unmodified_part() {
        assert_eq!(
            lookup_order(" tsn 802 "),
            vec!["TSN 802", "TSN-802", "TSN", "TSN800"]
        );
        // Written form equal to the first candidate is tried once
        assert_eq!(lookup_order("TSN-802"), vec!["TSN-802", "TSN", "TSN800"]);
        assert!(lookup_order("  ").is_empty());
    }

    #[test]
    fn test_candidates_without_numeric_family() {
        // Fewer than three trailing digits
        assert_eq!(collect("H-12"), vec!["H-12", "H"]);
        // Does not end in digits once dashes are stripped
        assert!(!collect("H-132-HDG").iter().any(|c| c.ends_with('0')));
    }

    #[test]
    fn test_candidates_empty_input() {
        assert!(collect("").is_empty());
        assert!(collect("  ()  ").is_empty());
    }

    #[test]
    fn test_candidates_restartable_and_size_hint() {
        let mut first = candidates("TSN-802");
        assert_eq!(first.size_hint(), (3, Some(3)));
        first.next();
        assert_eq!(first.size_hint(), (2, Some(2)));

        assert_eq!(collect("TSN-802"), collect("TSN-802"));
    }

    #[test]
    fn test_resolve_reference_prefix_mode() {
        let snapshot = CatalogSnapshot::new(
            vec![],
            vec![reference("H-1320", Some("http://x/1320.png")), reference("H-132", None)],
        );
        let matcher = Matcher::new(&snapshot, MatchOptions::default());

        // "H-132" is a prefix of "H-1320", which comes first in the table
        let found = matcher.resolve_reference("H-132-HDG").unwrap();
        assert_eq!(found.candidate, "H-132");
        assert_eq!(found.entry.name, "H-1320");
    }

    #[test]
    fn test_resolve_reference_exact_mode() {
        let snapshot = CatalogSnapshot::new(
            vec![],
            vec![reference("H-1320", Some("http://x/1320.png")), reference("h-132", None)],
        );
        let options = MatchOptions {
            mode: MatchMode::Exact,
            ..MatchOptions::default()
        };
        let matcher = Matcher::new(&snapshot, options);

        let found = matcher.resolve_reference("H-132-HDG").unwrap();
        assert_eq!(found.entry.name, "h-132");
    }

    #[test]
    fn test_resolve_reference_unmodified_part_first() {
        let snapshot = CatalogSnapshot::new(
            vec![],
            vec![reference("H-132", None), reference("H-132-HDG X 10", None)],
        );
        let options = MatchOptions {
            mode: MatchMode::Exact,
            ..MatchOptions::default()
        };
        let matcher = Matcher::new(&snapshot, options);

        let found = matcher.resolve_reference("h-132-hdg x 10").unwrap();
        assert_eq!(found.candidate, "H-132-HDG X 10");
        assert_eq!(found.entry.name, "H-132-HDG X 10");
    }

    #[test]
    fn test_resolve_reference_numeric_family() {
        let snapshot = CatalogSnapshot::new(vec![], vec![reference("TSN800", Some("http://x/800.png"))]);
        let options = MatchOptions {
            mode: MatchMode::Exact,
            ..MatchOptions::default()
        };
        let matcher = Matcher::new(&snapshot, options);

        let found = matcher.resolve_reference("TSN-802").unwrap();
        assert_eq!(found.candidate, "TSN800");
    }

    #[test]
    fn test_resolve_reference_none() {
        let snapshot = CatalogSnapshot::new(vec![], vec![reference("Q-1", None)]);
        let matcher = Matcher::new(&snapshot, MatchOptions::default());

        assert_eq!(matcher.resolve_reference("H-132-HDG"), None);
        assert_eq!(matcher.resolve_reference(""), None, "Empty part never matches");
    }

    #[test]
    fn test_lookup_no_matches_skips_reference() {
        let snapshot = CatalogSnapshot::new(
            vec![entry("H-132-HDG", Some("AB-99"))],
            vec![reference("H-132", Some("http://x/img.png"))],
        );
        let matcher = Matcher::new(&snapshot, MatchOptions::default());

        let outcome = matcher.lookup("ZZ-404");
        assert_eq!(outcome, LookupOutcome::NoMatches);
        assert!(outcome.entries().is_empty());
        assert_eq!(outcome.image_url(), None);
        assert!(!outcome.wants_preview());
    }

    #[test]
    fn test_lookup_matched_without_reference() {
        let snapshot = CatalogSnapshot::new(vec![entry("Q-77", None)], vec![reference("H-132", None)]);
        let matcher = Matcher::new(&snapshot, MatchOptions::default());

        match matcher.lookup("q77") {
            LookupOutcome::Matched {
                entries,
                core_part,
                reference,
                preview,
            } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(core_part, "Q-77");
                assert_eq!(reference, None);
                assert_eq!(preview, None);
            }
            other => panic!("Expected a match, got {:?}", other),
        }
    }

    struct RecordingPreview {
        queries: Mutex<Vec<String>>,
    }

    impl PreviewSource for RecordingPreview {
        fn fetch_preview_image(&self, query: &str) -> Option<String> {
            self.queries.lock().unwrap().push(query.to_string());
            Some(format!("http://preview/{}.jpg", query))
        }
    }

    #[test]
    fn test_lookup_uses_preview_only_without_image() {
        let snapshot = CatalogSnapshot::new(
            vec![entry("H-132-HDG", None), entry("Q-77", None)],
            vec![reference("H-132", Some("http://x/img.png"))],
        );
        let source = RecordingPreview {
            queries: Mutex::new(Vec::new()),
        };
        let matcher = Matcher::new(&snapshot, MatchOptions::default()).with_preview(&source);

        let with_image = matcher.lookup("H-132");
        assert_eq!(with_image.image_url(), Some("http://x/img.png"));
        assert!(source.queries.lock().unwrap().is_empty());

        let without_image = matcher.lookup("Q-77");
        assert_eq!(without_image.image_url(), Some("http://preview/Q-77.jpg"));
        assert_eq!(*source.queries.lock().unwrap(), vec!["Q-77".to_string()]);
    }
}
