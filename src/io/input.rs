//! Readers for count matrices and sample designs

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::Array2;

use crate::data::{CountMatrix, DesignTable};
use crate::error::{DgeError, Result};

/// Strip surrounding quotes and whitespace from a field
fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\''))) {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Tab when the header has one, comma otherwise
fn detect_delimiter(header: &str) -> char {
    if header.contains('\t') {
        '\t'
    } else {
        ','
    }
}

/// Non-empty lines with their 1-based line numbers
fn numbered_lines<P: AsRef<Path>>(path: P) -> Result<Vec<(usize, String)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim_end_matches('\r');
        if !trimmed.trim().is_empty() {
            out.push((i + 1, trimmed.to_string()));
        }
    }
    Ok(out)
}

/// A labelled numeric table as read from disk
#[derive(Debug, Clone)]
pub struct ExpressionTable {
    pub row_ids: Vec<String>,
    pub col_ids: Vec<String>,
    /// rows x columns
    pub values: Array2<f64>,
}

/// Read a labelled numeric table.
///
/// The first row holds column ids (its first cell, the row id column
/// label, is ignored); each further row is a row id followed by one value
/// per column. Tab- or comma-delimited.
pub fn read_expression_table<P: AsRef<Path>>(path: P) -> Result<ExpressionTable> {
    let lines = numbered_lines(path)?;
    let mut lines = lines.into_iter();

    let (header_no, header_line) = lines.next().ok_or_else(|| DgeError::InvalidInput {
        reason: "empty table".to_string(),
    })?;
    let delimiter = detect_delimiter(&header_line);
    let header: Vec<String> = header_line.split(delimiter).map(strip_quotes).collect();
    if header.len() < 2 {
        return Err(DgeError::Parse {
            line: header_no,
            reason: "header needs an id column and at least one data column".to_string(),
        });
    }
    let col_ids = header[1..].to_vec();
    let n_cols = col_ids.len();

    let mut row_ids = Vec::new();
    let mut values = Vec::new();
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != n_cols + 1 {
            return Err(DgeError::Parse {
                line: line_no,
                reason: format!("{} fields, expected {}", fields.len(), n_cols + 1),
            });
        }
        row_ids.push(strip_quotes(fields[0]));
        for field in &fields[1..] {
            let raw = strip_quotes(field);
            let value = raw.parse::<f64>().map_err(|_| DgeError::Parse {
                line: line_no,
                reason: format!("invalid value '{}'", raw),
            })?;
            values.push(value);
        }
    }

    let values = Array2::from_shape_vec((row_ids.len(), n_cols), values).map_err(|e| DgeError::InvalidInput {
        reason: e.to_string(),
    })?;
    log::debug!("Read {} rows x {} columns", row_ids.len(), n_cols);
    Ok(ExpressionTable {
        row_ids,
        col_ids,
        values,
    })
}

/// Read a gene x sample count matrix (see [`read_expression_table`] for the layout)
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let table = read_expression_table(path)?;
    if table.row_ids.is_empty() {
        return Err(DgeError::InvalidCountMatrix {
            reason: "no gene rows in count file".to_string(),
        });
    }
    CountMatrix::new(table.values, table.row_ids, table.col_ids)
}

/// Read a two-column (sample, condition) design file.
///
/// A first row whose sample cell is not among `sample_order` is taken as a
/// header. The returned table follows `sample_order`.
pub fn read_design<P: AsRef<Path>>(
    path: P,
    sample_order: &[String],
    reference: Option<&str>,
) -> Result<DesignTable> {
    let lines = numbered_lines(path)?;
    let Some((_, first)) = lines.first() else {
        return Err(DgeError::InvalidDesign {
            reason: "empty design file".to_string(),
        });
    };
    let delimiter = detect_delimiter(first);

    let mut mapping: HashMap<String, String> = HashMap::new();
    for (idx, (line_no, line)) in lines.iter().enumerate() {
        let fields: Vec<String> = line.split(delimiter).map(strip_quotes).collect();
        if fields.len() < 2 {
            return Err(DgeError::Parse {
                line: *line_no,
                reason: "expected sample and condition columns".to_string(),
            });
        }
        if idx == 0 && !sample_order.contains(&fields[0]) {
            continue;
        }
        if mapping.insert(fields[0].clone(), fields[1].clone()).is_some() {
            return Err(DgeError::InvalidDesign {
                reason: format!("sample '{}' listed twice", fields[0]),
            });
        }
    }

    DesignTable::from_mapping(&mapping, sample_order, reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn samples(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_read_tsv_counts() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2\ts3").unwrap();
        writeln!(file, "gene1\t100\t200\t150").unwrap();
        writeln!(file, "gene2\t50\t75\t60").unwrap();

        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.counts()[[1, 2]], 60.0);
    }

    #[test]
    fn test_read_quoted_csv_counts() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "\"\",\"a\",\"b\"").unwrap();
        writeln!(file, "\"g1\",1,2").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "\"g2\",3,4").unwrap();

        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.sample_ids(), &samples(&["a", "b"])[..]);
        assert_eq!(matrix.gene_ids(), &samples(&["g1", "g2"])[..]);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene\ts1\ts2").unwrap();
        writeln!(file, "g1\t1\t2").unwrap();
        writeln!(file, "g2\t1\tNA!").unwrap();

        match read_count_matrix(file.path()).unwrap_err() {
            DgeError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_ragged_row_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene\ts1\ts2").unwrap();
        writeln!(file, "g1\t1").unwrap();
        assert!(matches!(read_count_matrix(file.path()), Err(DgeError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_expression_table_allows_negative_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\ta\tb").unwrap();
        writeln!(file, "r1\t-1.5\t2").unwrap();
        let table = read_expression_table(file.path()).unwrap();
        assert_eq!(table.values[[0, 0]], -1.5);
        assert!(read_count_matrix(file.path()).is_err());
    }

    #[test]
    fn test_read_design_with_header_reorders() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample\tcondition").unwrap();
        writeln!(file, "s2\ttreated").unwrap();
        writeln!(file, "s1\tcontrol").unwrap();

        let design = read_design(file.path(), &samples(&["s1", "s2"]), Some("control")).unwrap();
        assert_eq!(design.conditions(), &samples(&["control", "treated"])[..]);
        assert_eq!(design.reference(), "control");
    }

    #[test]
    fn test_read_design_missing_sample() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "s1,control").unwrap();
        let err = read_design(file.path(), &samples(&["s1", "s2"]), None).unwrap_err();
        assert!(matches!(err, DgeError::InvalidDesign { .. }));
    }
}
