//! Occurrence index: the read-only catalogue of one document.
//!
//! The index is parsed from the `index.json` resource emitted by the
//! segmentation pipeline. Parsing is all-or-nothing: a document that violates
//! any invariant (duplicate identity, two occurrences in one grid cell,
//! malformed crop rectangle) is rejected as a whole, so callers never observe
//! a partially applied catalogue.
//!
//! There is no mutation API. Crop corrections made by the annotator produce a
//! regenerated resource, which is loaded as a fresh index.

use crate::core::io::read_file_async;
use crate::types::{GridPosition, Occurrence, OccurrenceId};
use crate::{InkgridError, Result};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// On-disk shape of `index.json`. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct IndexDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    total_chars: Option<usize>,
    files: Vec<Occurrence>,
}

/// Immutable catalogue of occurrences with lookups by character and page.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceIndex {
    name: String,
    occurrences: Vec<Occurrence>,
    by_id: AHashMap<OccurrenceId, usize>,
    /// Positions per character, ordered by identity
    by_char: AHashMap<String, Vec<usize>>,
    /// Positions per page, ordered by grid cell
    by_page: BTreeMap<u32, Vec<usize>>,
}

impl OccurrenceIndex {
    /// An index with no occurrences, used when the resource is unavailable.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse an index from JSON bytes.
    ///
    /// # Errors
    ///
    /// - `InkgridError::Parsing` if the bytes are not a valid index document
    /// - `InkgridError::Validation` if an index invariant is violated
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let document: IndexDocument = serde_json::from_slice(bytes)
            .map_err(|e| InkgridError::parsing_with_source("Invalid index document", e))?;
        Self::from_document(document)
    }

    /// Parse an index from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_slice(json.as_bytes())
    }

    /// Build an index from already-parsed occurrences.
    pub fn from_occurrences(name: impl Into<String>, occurrences: Vec<Occurrence>) -> Result<Self> {
        Self::from_document(IndexDocument {
            name: name.into(),
            total_chars: None,
            files: occurrences,
        })
    }

    /// Load an index resource from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = read_file_async(path.as_ref()).await?;
        let index = Self::from_slice(&bytes)?;
        tracing::debug!(
            "Loaded index '{}' from {}: {} occurrences, {} characters",
            index.name,
            path.as_ref().display(),
            index.len(),
            index.by_char.len()
        );
        Ok(index)
    }

    fn from_document(document: IndexDocument) -> Result<Self> {
        if let Some(total) = document.total_chars
            && total != document.files.len()
        {
            tracing::warn!(
                "Index '{}' declares {} occurrences but lists {}",
                document.name,
                total,
                document.files.len()
            );
        }

        let listed = document.files.len();
        let occurrences: Vec<Occurrence> = document
            .files
            .into_iter()
            .filter(|occ| {
                let labelled = !occ.character.trim().is_empty();
                if !labelled {
                    tracing::warn!("Skipping occurrence {} without a character label", occ.id);
                }
                labelled
            })
            .collect();
        if occurrences.len() < listed {
            tracing::debug!("Index '{}': kept {} of {} records", document.name, occurrences.len(), listed);
        }

        let mut by_id = AHashMap::with_capacity(occurrences.len());
        let mut cells: AHashSet<(u32, GridPosition)> = AHashSet::with_capacity(occurrences.len());
        let mut by_char: AHashMap<String, Vec<usize>> = AHashMap::new();
        let mut by_page: BTreeMap<u32, Vec<usize>> = BTreeMap::new();

        for (position, occ) in occurrences.iter().enumerate() {
            validate_occurrence(occ)?;

            if by_id.insert(occ.id, position).is_some() {
                return Err(InkgridError::validation(format!("Duplicate occurrence identity {}", occ.id)));
            }
            if !cells.insert((occ.source.page, occ.source.grid)) {
                return Err(InkgridError::validation(format!(
                    "Occurrence {} shares page {} cell (col {}, row {}) with another occurrence",
                    occ.id, occ.source.page, occ.source.grid.col, occ.source.grid.row
                )));
            }

            by_char.entry(occ.character.clone()).or_default().push(position);
            by_page.entry(occ.source.page).or_default().push(position);
        }

        for positions in by_char.values_mut() {
            positions.sort_by_key(|&p| occurrences[p].id);
        }
        for positions in by_page.values_mut() {
            positions.sort_by_key(|&p| occurrences[p].source.grid);
        }

        Ok(Self {
            name: document.name,
            occurrences,
            by_id,
            by_char,
            by_page,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    /// All occurrences in document order.
    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    pub fn get(&self, id: OccurrenceId) -> Option<&Occurrence> {
        self.by_id.get(&id).map(|&p| &self.occurrences[p])
    }

    /// Occurrences of `character`, ordered by identity.
    ///
    /// Returns an empty list for characters that are not in the index.
    pub fn occurrences_for(&self, character: &str) -> Vec<&Occurrence> {
        self.by_char
            .get(character)
            .map(|positions| positions.iter().map(|&p| &self.occurrences[p]).collect())
            .unwrap_or_default()
    }

    /// Number of occurrences of `character`.
    pub fn count_for(&self, character: &str) -> usize {
        self.by_char.get(character).map_or(0, Vec::len)
    }

    /// Distinct character labels, sorted.
    pub fn characters(&self) -> Vec<&str> {
        let mut chars: Vec<&str> = self.by_char.keys().map(String::as_str).collect();
        chars.sort_unstable();
        chars
    }

    /// Page numbers that carry at least one occurrence, ascending.
    pub fn pages(&self) -> Vec<u32> {
        self.by_page.keys().copied().collect()
    }

    /// Occurrences on `page`, ordered by grid column then row.
    pub fn occurrences_on_page(&self, page: u32) -> Vec<&Occurrence> {
        self.by_page
            .get(&page)
            .map(|positions| positions.iter().map(|&p| &self.occurrences[p]).collect())
            .unwrap_or_default()
    }

    /// Reconstruct the column layout of `page` for reading-order display.
    pub fn page_layout(&self, page: u32) -> Option<PageLayout> {
        let positions = self.by_page.get(&page)?;
        let first = &self.occurrences[*positions.first()?];

        let mut columns: Vec<PageColumn> = Vec::new();
        for &p in positions {
            let occ = &self.occurrences[p];
            let cell = PageCell {
                row: occ.source.grid.row,
                id: occ.id,
                character: occ.character.clone(),
            };
            match columns.last_mut() {
                Some(column) if column.col == occ.source.grid.col => column.cells.push(cell),
                _ => columns.push(PageColumn {
                    col: occ.source.grid.col,
                    cells: vec![cell],
                }),
            }
        }

        Some(PageLayout {
            page,
            image: first.source.image.clone(),
            columns,
        })
    }

    /// Summary statistics, with the `top_n` most frequent characters.
    pub fn stats(&self, top_n: usize) -> IndexStats {
        let mut frequencies: Vec<CharacterFrequency> = self
            .by_char
            .iter()
            .map(|(character, positions)| CharacterFrequency {
                character: character.clone(),
                count: positions.len(),
            })
            .collect();
        frequencies.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.character.cmp(&b.character)));
        frequencies.truncate(top_n);

        IndexStats {
            name: self.name.clone(),
            occurrences: self.occurrences.len(),
            characters: self.by_char.len(),
            pages: self.by_page.len(),
            analyzable_characters: self.by_char.values().filter(|p| p.len() >= 2).count(),
            most_frequent: frequencies,
        }
    }
}

fn validate_occurrence(occ: &Occurrence) -> Result<()> {
    if occ.file.trim().is_empty() {
        return Err(InkgridError::validation(format!("Occurrence {} has no bitmap file", occ.id)));
    }
    if !occ.source.crop_box.is_well_formed() {
        return Err(InkgridError::validation(format!(
            "Occurrence {} has a malformed crop box {:?}",
            occ.id, occ.source.crop_box
        )));
    }
    Ok(())
}

/// One cell of a reconstructed page layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCell {
    pub row: u32,
    pub id: OccurrenceId,
    pub character: String,
}

/// One grid column of a page, cells ordered by row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageColumn {
    pub col: u32,
    pub cells: Vec<PageCell>,
}

/// Occurrences of one page arranged by grid column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page: u32,
    /// Page image filename
    pub image: String,
    pub columns: Vec<PageColumn>,
}

impl PageLayout {
    /// Characters in reading order: column by column, top to bottom.
    pub fn text(&self) -> String {
        self.columns
            .iter()
            .flat_map(|column| column.cells.iter().map(|cell| cell.character.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterFrequency {
    pub character: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub name: String,
    pub occurrences: usize,
    pub characters: usize,
    pub pages: usize,
    /// Characters with at least two occurrences
    pub analyzable_characters: usize,
    /// Ordered by descending count, ties by character
    pub most_frequent: Vec<CharacterFrequency>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, ch: &str, page: u32, col: u32, row: u32) -> String {
        format!(
            r#"{{"index": {id}, "char": "{ch}", "file": "g_{id:04}.png",
                "source": {{"image": "page_{page:02}.jpg", "image_index": {page},
                "grid": {{"col": {col}, "row": {row}}}, "crop_box": [10, 20, 60, 80]}}}}"#
        )
    }

    fn document(records: &[String]) -> String {
        format!(
            r#"{{"name": "兰亭集序", "total_chars": {}, "files": [{}]}}"#,
            records.len(),
            records.join(",")
        )
    }

    fn sample_index() -> OccurrenceIndex {
        let json = document(&[
            record(0, "永", 1, 0, 0),
            record(1, "和", 1, 0, 1),
            record(2, "之", 1, 1, 0),
            record(3, "之", 2, 0, 0),
            record(4, "九", 1, 1, 1),
            record(5, "之", 2, 0, 1),
        ]);
        OccurrenceIndex::from_json_str(&json).unwrap()
    }

    #[test]
    fn test_lookup_by_character() {
        let index = sample_index();
        assert_eq!(index.name(), "兰亭集序");
        assert_eq!(index.len(), 6);

        let ids: Vec<u32> = index.occurrences_for("之").iter().map(|o| o.id.0).collect();
        assert_eq!(ids, vec![2, 3, 5]);
        assert_eq!(index.count_for("之"), 3);
        assert!(index.occurrences_for("書").is_empty());
    }

    #[test]
    fn test_lookup_by_page() {
        let index = sample_index();
        assert_eq!(index.pages(), vec![1, 2]);

        let ids: Vec<u32> = index.occurrences_on_page(1).iter().map(|o| o.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 4]);
        assert!(index.occurrences_on_page(9).is_empty());
    }

    #[test]
    fn test_get_by_identity() {
        let index = sample_index();
        assert_eq!(index.get(OccurrenceId(4)).unwrap().character, "九");
        assert!(index.get(OccurrenceId(99)).is_none());
    }

    #[test]
    fn test_page_layout_reading_order() {
        let index = sample_index();
        let layout = index.page_layout(1).unwrap();
        assert_eq!(layout.image, "page_01.jpg");
        assert_eq!(layout.columns.len(), 2);
        assert_eq!(layout.columns[0].cells.len(), 2);
        assert_eq!(layout.text(), "永和之九");
        assert!(index.page_layout(7).is_none());
    }

    #[test]
    fn test_stats() {
        let index = sample_index();
        let stats = index.stats(2);
        assert_eq!(stats.occurrences, 6);
        assert_eq!(stats.characters, 4);
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.analyzable_characters, 1);
        assert_eq!(stats.most_frequent[0].character, "之");
        assert_eq!(stats.most_frequent[0].count, 3);
        assert_eq!(stats.most_frequent.len(), 2);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let json = document(&[record(1, "之", 1, 0, 0), record(1, "和", 1, 0, 1)]);
        let err = OccurrenceIndex::from_json_str(&json).unwrap_err();
        assert!(matches!(err, InkgridError::Validation { .. }));
        assert!(err.to_string().contains("Duplicate occurrence identity 1"));
    }

    #[test]
    fn test_shared_grid_cell_rejected() {
        let json = document(&[record(1, "之", 1, 0, 0), record(2, "和", 1, 0, 0)]);
        let err = OccurrenceIndex::from_json_str(&json).unwrap_err();
        assert!(matches!(err, InkgridError::Validation { .. }));
    }

    #[test]
    fn test_unlabelled_record_is_skipped() {
        let json = document(&[record(1, "之", 1, 0, 0), record(2, " ", 1, 0, 1), record(3, "之", 1, 0, 2)]);
        let index = OccurrenceIndex::from_json_str(&json).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.get(OccurrenceId(2)).is_none());
        assert_eq!(index.count_for("之"), 2);
        assert_eq!(index.characters(), vec!["之"]);
    }

    #[test]
    fn test_malformed_document_rejected() {
        let err = OccurrenceIndex::from_json_str(r#"{"name": "x"}"#).unwrap_err();
        assert!(matches!(err, InkgridError::Parsing { .. }));

        let err = OccurrenceIndex::from_json_str("not json").unwrap_err();
        assert!(matches!(err, InkgridError::Parsing { .. }));
    }

    #[test]
    fn test_malformed_crop_box_rejected() {
        let json = document(&[record(1, "之", 1, 0, 0)]).replace("[10, 20, 60, 80]", "[60, 20, 10, 80]");
        let err = OccurrenceIndex::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("malformed crop box"));
    }

    #[test]
    fn test_empty_index() {
        let index = OccurrenceIndex::empty();
        assert!(index.is_empty());
        assert!(index.characters().is_empty());
        assert!(index.pages().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_resource_is_io_error() {
        let err = OccurrenceIndex::load("/nonexistent/index.json").await.unwrap_err();
        assert!(matches!(err, InkgridError::Io(_)));
    }
}
