//! rust_dge command-line interface

use std::fs;
use std::path::Path;

use clap::Parser;
use log::{info, LevelFilter};

use rust_dge::cli::{Cli, Commands};
use rust_dge::io::{
    read_expression_table, write_clusters, write_enrichment, write_json, write_matrix, write_size_factors,
    write_test_results,
};
use rust_dge::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Options of the `run` subcommand that override the configuration file
struct RunOverrides {
    reference: Option<String>,
    alpha: Option<f64>,
    lfc_threshold: Option<f64>,
    min_total_count: Option<f64>,
    fit_type: Option<String>,
    max_k: Option<usize>,
    branch: Option<String>,
    pvalue_cutoff: Option<f64>,
    top_n: Option<usize>,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    if cli.threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(cli.threads).build_global() {
            log::warn!("Could not configure {} threads: {}", cli.threads, e);
        }
    }

    let result = match cli.command {
        Some(Commands::Run {
            counts,
            design,
            output,
            config,
            reference,
            alpha,
            lfc_threshold,
            min_total_count,
            fit_type,
            max_k,
            annotations,
            mapping,
            branch,
            pvalue_cutoff,
            top_n,
        }) => run_analysis(
            &counts,
            &design,
            &output,
            config.as_deref(),
            annotations.as_deref(),
            mapping.as_deref(),
            RunOverrides {
                reference,
                alpha,
                lfc_threshold,
                min_total_count,
                fit_type,
                max_k,
                branch,
                pvalue_cutoff,
                top_n,
            },
        ),
        Some(Commands::Normalize {
            counts,
            output,
            size_factors,
            min_total_count,
        }) => run_normalize(&counts, &output, size_factors.as_deref(), min_total_count),
        Some(Commands::Cluster {
            input,
            output,
            min_k,
            max_k,
            silhouette,
        }) => run_cluster(&input, &output, min_k, max_k, silhouette.as_deref()),
        None => {
            println!("rust_dge v{}", VERSION);
            println!("Run `rust_dge --help` for usage.");
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn build_config(config_path: Option<&str>, overrides: RunOverrides) -> Result<AnalysisConfig> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            AnalysisConfig::from_json_file(path)?
        }
        None => AnalysisConfig::default(),
    };

    if overrides.reference.is_some() {
        config.reference_level = overrides.reference;
    }
    if let Some(alpha) = overrides.alpha {
        config.selection.alpha = alpha;
    }
    if let Some(lfc) = overrides.lfc_threshold {
        config.selection.lfc_threshold = lfc;
    }
    if let Some(min_total) = overrides.min_total_count {
        config.min_total_count = min_total;
    }
    if let Some(fit_type) = overrides.fit_type {
        config.dispersion.trend = match fit_type.as_str() {
            "parametric" => TrendFitMethod::Parametric,
            "mean" => TrendFitMethod::Mean,
            other => {
                return Err(DgeError::InvalidInput {
                    reason: format!("unknown fit type '{}'; use 'parametric' or 'mean'", other),
                })
            }
        };
    }
    if let Some(max_k) = overrides.max_k {
        config.cluster.max_k = max_k;
    }
    if let Some(branch) = overrides.branch {
        config.enrichment.branch = branch.parse()?;
    }
    if let Some(cutoff) = overrides.pvalue_cutoff {
        config.enrichment.pvalue_cutoff = cutoff;
    }
    if overrides.top_n.is_some() {
        config.enrichment.top_n = overrides.top_n;
    }

    config.validate()?;
    Ok(config)
}

fn run_analysis(
    counts_path: &str,
    design_path: &str,
    output_dir: &str,
    config_path: Option<&str>,
    annotations_path: Option<&str>,
    mapping_path: Option<&str>,
    overrides: RunOverrides,
) -> Result<()> {
    let config = build_config(config_path, overrides)?;

    info!("Loading count matrix from: {}", counts_path);
    let counts = read_count_matrix(counts_path)?;
    info!("  {} genes, {} samples", counts.n_genes(), counts.n_samples());

    info!("Loading design from: {}", design_path);
    let design = read_design(design_path, counts.sample_ids(), config.reference_level.as_deref())?;

    let output = run_pipeline(counts, design, &config, &CancelToken::new())?;

    let out = Path::new(output_dir);
    fs::create_dir_all(out)?;

    for contrast in output.results.iter() {
        let path = out.join(format!("{}.tsv", contrast.name()));
        write_test_results(&path, contrast)?;
        info!(
            "{}: {} of {} genes tested, {} with padj <= {} -> {}",
            contrast.name(),
            contrast.n_tested(),
            contrast.len(),
            contrast.n_significant(config.selection.alpha),
            config.selection.alpha,
            path.display()
        );
    }

    write_json(out.join("diff_exp.json"), &output.diff_exp)?;
    write_matrix(
        out.join("diff_exp_normalized.tsv"),
        "gene_id",
        &output.diff_exp.genes,
        output.dataset.counts().sample_ids(),
        output.normalized_submatrix.view(),
    )?;
    if let Some(sf) = output.dataset.size_factors() {
        write_size_factors(out.join("size_factors.tsv"), output.dataset.counts().sample_ids(), sf)?;
    }
    if let Some(dispersions) = output.dataset.dispersions() {
        write_json(out.join("dispersions.json"), dispersions)?;
    }
    if let Some(pca) = &output.pca {
        let components: Vec<String> = (1..=pca.n_components()).map(|c| format!("PC{}", c)).collect();
        write_matrix(out.join("pca.tsv"), "sample", &pca.sample_ids, &components, pca.coordinates.view())?;
        write_json(out.join("pca.json"), pca)?;
    }
    if let Some(clusters) = &output.clusters {
        write_clusters(out.join("clusters.tsv"), clusters)?;
        write_json(out.join("silhouette.json"), &clusters.silhouette_scan)?;
    }

    if let Some(annotations) = annotations_path {
        info!("Loading annotation catalog from: {}", annotations);
        let catalog = InMemoryCatalog::from_tsv(annotations)?;
        let report = match mapping_path {
            Some(mapping) => {
                let mapper = MappingTable::from_tsv(mapping, false)?;
                run_enrichment(&output, &mapper, &catalog, &config.enrichment)?
            }
            None => run_enrichment(&output, &IdentityMapper, &catalog, &config.enrichment)?,
        };
        write_enrichment(
            out.join(format!("enrichment_{}.tsv", report.branch.short_name())),
            &report,
        )?;
    }

    info!("Results written to: {}", out.display());
    Ok(())
}

fn run_normalize(counts_path: &str, output: &str, sf_path: Option<&str>, min_total_count: f64) -> Result<()> {
    info!("Loading count matrix from: {}", counts_path);
    let counts = read_count_matrix(counts_path)?;
    let (counts, removed) = counts.filter_by_total(min_total_count)?;
    info!("  {} genes kept, {} removed by the count floor", counts.n_genes(), removed);

    let sf = rust_dge::normalization::median_of_ratios(counts.counts(), &SizeFactorParams::default())?;
    let normalized = sf.normalize(counts.counts());
    write_matrix(output, "gene_id", counts.gene_ids(), counts.sample_ids(), normalized.view())?;
    if let Some(path) = sf_path {
        write_size_factors(path, counts.sample_ids(), &sf)?;
    }
    info!("Normalized counts written to: {}", output);
    Ok(())
}

fn run_cluster(input: &str, output: &str, min_k: usize, max_k: usize, silhouette: Option<&str>) -> Result<()> {
    info!("Loading expression table from: {}", input);
    let table = read_expression_table(input)?;
    let params = ClusterParams { min_k, max_k };
    let assignment = cluster_genes(table.values.view(), &table.row_ids, &params, &CancelToken::new())?;
    write_clusters(output, &assignment)?;
    if let Some(path) = silhouette {
        write_json(path, &assignment.silhouette_scan)?;
    }
    info!("{} rows in {} clusters written to: {}", table.row_ids.len(), assignment.k, output);
    Ok(())
}
