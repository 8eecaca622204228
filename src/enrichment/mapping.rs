//! Gene identifier translation

use std::collections::HashMap;
use std::path::Path;

use crate::error::{DgeError, Result};

/// Translates dataset gene ids into the identifier space of an annotation catalog
pub trait GeneIdMapper: Send + Sync {
    /// Mapped id, or `None` when the gene has no counterpart
    fn map_id(&self, gene_id: &str) -> Option<String>;
}

/// Passes ids through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl GeneIdMapper for IdentityMapper {
    fn map_id(&self, gene_id: &str) -> Option<String> {
        Some(gene_id.to_string())
    }
}

/// Lookup table from source to target ids
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    map: HashMap<String, String>,
}

impl MappingTable {
    /// Build from (source, target) pairs; the first target seen for a source wins
    pub fn from_pairs<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut map = HashMap::new();
        for (source, target) in pairs {
            map.entry(source.into()).or_insert_with(|| target.into());
        }
        Self { map }
    }

    /// Load a two-column tab-separated file (source id, target id).
    /// A header line is skipped when it is the first line; empty targets are ignored.
    pub fn from_tsv<P: AsRef<Path>>(path: P, has_header: bool) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(has_header)
            .flexible(true)
            .from_path(path)?;

        let mut pairs = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let source = record.get(0).map(str::trim).unwrap_or("");
            let target = record.get(1).map(str::trim).unwrap_or("");
            if source.is_empty() {
                return Err(DgeError::Parse {
                    line: line + 1 + usize::from(has_header),
                    reason: "empty source identifier".to_string(),
                });
            }
            if !target.is_empty() {
                pairs.push((source.to_string(), target.to_string()));
            }
        }

        let table = Self::from_pairs(pairs);
        log::info!("Loaded {} identifier mappings", table.len());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl GeneIdMapper for MappingTable {
    fn map_id(&self, gene_id: &str) -> Option<String> {
        self.map.get(gene_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_identity() {
        assert_eq!(IdentityMapper.map_id("ENSG1").as_deref(), Some("ENSG1"));
    }

    #[test]
    fn test_first_mapping_wins() {
        let table = MappingTable::from_pairs(vec![("a", "1"), ("b", "2"), ("a", "3")]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.map_id("a").as_deref(), Some("1"));
        assert!(table.map_id("z").is_none());
    }

    #[test]
    fn test_from_tsv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "symbol\tentrez").unwrap();
        writeln!(file, "TP53\t7157").unwrap();
        writeln!(file, "BRCA1\t672").unwrap();
        writeln!(file, "ORPHAN\t").unwrap();
        let table = MappingTable::from_tsv(file.path(), true).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.map_id("BRCA1").as_deref(), Some("672"));
        assert!(table.map_id("ORPHAN").is_none());
    }
}
