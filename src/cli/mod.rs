//! Command-line interface for rust_dge

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rust_dge")]
#[command(version)]
#[command(about = "Differential expression, gene clustering and GO enrichment for RNA-seq counts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Number of worker threads (0 = all cores)
    #[arg(short = 't', long, global = true, default_value = "0")]
    pub threads: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline
    #[command(
        long_about = "Run the full pipeline\n\n\
            Drops low-count genes, estimates size factors and dispersions, runs a\n\
            Wald test of every condition against the reference, selects the\n\
            differentially expressed set, projects samples on its principal\n\
            components and clusters its genes. With --annotations the set is also\n\
            tested for GO term over-representation.",
        after_long_help = "\
Examples:
  rust_dge run -c counts.tsv -d design.tsv --reference Control -o results/

  # GO enrichment with an identifier mapping
  rust_dge run -c counts.tsv -d design.tsv -o results/ \\
    --annotations go.tsv --mapping ids.tsv --branch mf"
    )]
    Run {
        /// Count matrix (genes x samples, TSV or CSV)
        #[arg(short, long)]
        counts: String,

        /// Design file with sample and condition columns
        #[arg(short, long)]
        design: String,

        /// Output directory
        #[arg(short, long, default_value = "rust_dge_results")]
        output: String,

        /// JSON configuration; command-line options override its fields
        #[arg(long, value_name = "FILE")]
        config: Option<String>,

        /// Reference condition [default: first level in the design file]
        #[arg(short, long)]
        reference: Option<String>,

        /// Adjusted p-value threshold for the differential set
        #[arg(short, long)]
        alpha: Option<f64>,

        /// Absolute log2 fold change a gene must exceed
        #[arg(long)]
        lfc_threshold: Option<f64>,

        /// Genes with total count at or below this are dropped
        #[arg(long)]
        min_total_count: Option<f64>,

        /// Dispersion trend: parametric or mean
        #[arg(long, value_name = "METHOD")]
        fit_type: Option<String>,

        /// Largest number of clusters scanned
        #[arg(long)]
        max_k: Option<usize>,

        /// Annotation catalog TSV (branch, term, description, gene)
        #[arg(long, value_name = "FILE")]
        annotations: Option<String>,

        /// Two-column TSV mapping count-matrix ids to catalog ids
        #[arg(long, value_name = "FILE")]
        mapping: Option<String>,

        /// Ontology branch: bp, mf or cc
        #[arg(long)]
        branch: Option<String>,

        /// Raw p-value cutoff for reported terms
        #[arg(long)]
        pvalue_cutoff: Option<f64>,

        /// Report at most this many terms
        #[arg(long)]
        top_n: Option<usize>,
    },

    /// Estimate size factors and write normalized counts
    #[command(after_long_help = "\
Examples:
  rust_dge normalize -c counts.tsv -o normalized.tsv")]
    Normalize {
        /// Count matrix (genes x samples, TSV or CSV)
        #[arg(short, long)]
        counts: String,

        /// Normalized count output
        #[arg(short, long)]
        output: String,

        /// Also write the size factors here
        #[arg(long, value_name = "FILE")]
        size_factors: Option<String>,

        /// Genes with total count at or below this are dropped [default: 10]
        #[arg(long, default_value = "10")]
        min_total_count: f64,
    },

    /// Cluster the rows of an expression table
    #[command(after_long_help = "\
Examples:
  rust_dge cluster -i normalized.tsv -o clusters.tsv --max-k 10")]
    Cluster {
        /// Expression table (rows x samples, TSV or CSV)
        #[arg(short, long)]
        input: String,

        /// Cluster assignment output
        #[arg(short, long)]
        output: String,

        /// Smallest number of clusters scanned
        #[arg(long, default_value = "2")]
        min_k: usize,

        /// Largest number of clusters scanned
        #[arg(long, default_value = "20")]
        max_k: usize,

        /// Also write the silhouette scan as JSON
        #[arg(long, value_name = "FILE")]
        silhouette: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "rust_dge", "-v", "run", "-c", "counts.tsv", "-d", "design.tsv", "--alpha", "0.1", "--max-k", "8",
            "-t", "4",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.threads, 4);
        match cli.command {
            Some(Commands::Run { alpha, max_k, output, reference, .. }) => {
                assert_eq!(alpha, Some(0.1));
                assert_eq!(max_k, Some(8));
                assert_eq!(output, "rust_dge_results");
                assert!(reference.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cluster_requires_input() {
        assert!(Cli::try_parse_from(["rust_dge", "cluster", "-o", "out.tsv"]).is_err());
    }
}
