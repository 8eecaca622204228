//! Tab-delimited and JSON writers for pipeline outputs

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use ndarray::ArrayView2;
use serde::Serialize;

use crate::cluster::ClusterAssignment;
use crate::enrichment::EnrichmentReport;
use crate::error::{DgeError, Result};
use crate::normalization::SizeFactors;
use crate::testing::ContrastResults;

const MISSING: &str = "NA";

fn tsv_writer<P: AsRef<Path>>(path: P) -> Result<csv::Writer<File>> {
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

fn fmt_opt(value: Option<f64>, scientific: bool) -> String {
    match value {
        Some(v) if v.is_finite() => {
            if scientific {
                format!("{:.6e}", v)
            } else {
                format!("{:.6}", v)
            }
        }
        _ => MISSING.to_string(),
    }
}

/// One row per gene: baseMean, log2FoldChange, lfcSE, stat, pvalue, padj,
/// dispersion and the degeneracy tag (empty when the gene tested cleanly)
pub fn write_test_results<P: AsRef<Path>>(path: P, results: &ContrastResults) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record([
        "gene_id",
        "baseMean",
        "log2FoldChange",
        "lfcSE",
        "stat",
        "pvalue",
        "padj",
        "dispersion",
        "degeneracy",
    ])?;
    for row in &results.rows {
        writer.write_record([
            row.gene_id.clone(),
            fmt_opt(Some(row.base_mean), false),
            fmt_opt(Some(row.log2_fold_change), false),
            fmt_opt(Some(row.lfc_se), false),
            fmt_opt(row.stat, false),
            fmt_opt(row.pvalue, true),
            fmt_opt(row.padj, true),
            fmt_opt(Some(row.dispersion), true),
            row.degeneracy.map(|d| d.as_str().to_string()).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// gene_id and 1-based cluster label
pub fn write_clusters<P: AsRef<Path>>(path: P, assignment: &ClusterAssignment) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(["gene_id", "cluster"])?;
    for (gene, label) in assignment.gene_ids.iter().zip(&assignment.labels) {
        writer.write_record([gene.as_str(), label.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Ranked enrichment table; overlapping genes are comma-joined
pub fn write_enrichment<P: AsRef<Path>>(path: P, report: &EnrichmentReport) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record([
        "term_id",
        "description",
        "branch",
        "count",
        "term_size",
        "foreground_size",
        "universe_size",
        "fold_enrichment",
        "pvalue",
        "padj",
        "genes",
    ])?;
    let branch = report.branch.short_name();
    for r in &report.results {
        writer.write_record([
            r.term_id.clone(),
            r.description.clone(),
            branch.to_string(),
            r.count.to_string(),
            r.term_size.to_string(),
            r.foreground_size.to_string(),
            r.universe_size.to_string(),
            format!("{:.4}", r.fold_enrichment()),
            fmt_opt(Some(r.pvalue), true),
            fmt_opt(Some(r.padj), true),
            r.genes.join(","),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Labelled numeric matrix; `corner` heads the row-id column
pub fn write_matrix<P: AsRef<Path>>(
    path: P,
    corner: &str,
    row_ids: &[String],
    col_ids: &[String],
    values: ArrayView2<f64>,
) -> Result<()> {
    if values.dim() != (row_ids.len(), col_ids.len()) {
        return Err(DgeError::DimensionMismatch {
            expected: format!("{} x {} matrix", row_ids.len(), col_ids.len()),
            got: format!("{} x {} matrix", values.nrows(), values.ncols()),
        });
    }
    let mut writer = tsv_writer(path)?;
    let mut header = Vec::with_capacity(col_ids.len() + 1);
    header.push(corner.to_string());
    header.extend(col_ids.iter().cloned());
    writer.write_record(&header)?;

    for (id, row) in row_ids.iter().zip(values.rows()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(id.clone());
        record.extend(row.iter().map(|v| format!("{:.6}", v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_size_factors<P: AsRef<Path>>(path: P, sample_ids: &[String], size_factors: &SizeFactors) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(["sample", "size_factor"])?;
    for (sample, sf) in sample_ids.iter().zip(size_factors.as_slice()) {
        writer.write_record([sample.clone(), format!("{:.6}", sf)])?;
    }
    writer.flush()?;
    Ok(())
}

/// Pretty-printed JSON of any serializable output
pub fn write_json<P: AsRef<Path>, T: Serialize + ?Sized>(path: P, value: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Degeneracy, TestRow};
    use ndarray::array;
    use tempfile::tempdir;

    fn row(id: &str, padj: Option<f64>, degeneracy: Option<Degeneracy>) -> TestRow {
        TestRow {
            gene_id: id.to_string(),
            base_mean: 12.5,
            log2_fold_change: 1.5,
            lfc_se: 0.25,
            stat: padj.map(|_| 6.0),
            pvalue: padj,
            padj,
            dispersion: 0.05,
            degeneracy,
        }
    }

    #[test]
    fn test_results_table_marks_missing_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("res.tsv");
        let results = ContrastResults {
            level: "A".into(),
            reference: "ctl".into(),
            rows: vec![row("g1", Some(0.01), None), row("g2", None, Some(Degeneracy::NonConvergence))],
        };
        write_test_results(&path, &results).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("gene_id\tbaseMean\tlog2FoldChange"));
        assert!(lines[1].starts_with("g1\t12.500000\t1.500000"));
        let fields: Vec<&str> = lines[2].split('\t').collect();
        assert_eq!(fields[4], "NA");
        assert_eq!(fields[6], "NA");
        assert_eq!(fields[8], Degeneracy::NonConvergence.as_str());
    }

    #[test]
    fn test_matrix_dimension_check() {
        let dir = tempdir().unwrap();
        let ids = vec!["a".to_string()];
        let err = write_matrix(dir.path().join("m.tsv"), "gene", &ids, &ids, array![[1.0, 2.0]].view()).unwrap_err();
        assert!(matches!(err, DgeError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_json_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v.json");
        write_json(&path, &vec![1, 2, 3]).unwrap();
        let back: Vec<i32> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
