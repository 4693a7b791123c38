//! deseq-artifacts command-line interface

use std::path::PathBuf;

use clap::Parser;
use log::{info, LevelFilter};

use deseq_artifacts::cli::{Cli, Commands};
use deseq_artifacts::filter::max_cooks_per_gene;
use deseq_artifacts::prelude::*;

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

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn layout_for(root: Option<PathBuf>) -> ProjectLayout {
    root.map_or_else(ProjectLayout::default, ProjectLayout::rooted)
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Train {
            counts,
            metadata,
            design,
            root,
        } => run_train(&layout_for(root), &counts, &metadata, &design),
        Commands::Inspect { design, root } => run_inspect(&layout_for(root), &design),
        Commands::Locate { filename, root } => {
            let layout = layout_for(root);
            let path = find_file(&filename, &layout.search_dir).ok_or_else(|| DeseqError::FileNotFound {
                filename: filename.clone(),
                search_dir: layout.search_dir.clone(),
            })?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::List { root } => {
            for artifact in layout_for(root).list_artifacts()? {
                println!("{}\t{}", artifact.key, artifact.path.display());
            }
            Ok(())
        }
    }
}

fn run_train(layout: &ProjectLayout, counts: &str, metadata: &str, design: &[String]) -> Result<()> {
    info!("Loading counts table: {}", counts);
    let counts = layout.load_df(counts)?;
    info!("  {} genes, {} samples", counts.n_rows(), counts.n_cols());

    info!("Loading design table: {}", metadata);
    let metadata = layout.load_df(metadata)?;

    let dds = train_model_in(layout, &TrainingConfig::default(), &counts, &metadata, design)?;

    let replaced = dds.replaced()?.iter().filter(|&&r| r).count();
    info!(
        "Fitted {} genes ({} refit after outlier replacement) -> {}",
        dds.n_genes(),
        replaced,
        layout.artifact_path(design).display()
    );
    Ok(())
}

fn run_inspect(layout: &ProjectLayout, design: &[String]) -> Result<()> {
    let dds = layout.load_model(design)?;

    let cutoff = dds.cooks_cutoff()?;
    let cooks_flagged = max_cooks_per_gene(dds.cooks()?)
        .iter()
        .filter(|&&c| c > cutoff)
        .count();

    let summary = serde_json::json!({
        "key": artifact_key(design),
        "design_factors": dds.design_factors(),
        "genes": dds.n_genes(),
        "samples": dds.n_samples(),
        "coefficients": dds.design_info().coef_names,
        "size_factors": dds.size_factors()?.to_vec(),
        "dispersion_trend": dds.dispersion_trend()?,
        "prior_variance": dds.dispersion_prior()?.prior_var,
        "cooks_cutoff": cutoff,
        "genes_above_cooks_cutoff": cooks_flagged,
        "genes_refit": dds.replaced()?.iter().filter(|&&r| r).count(),
        "refit_cooks": dds.refit_cooks(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
