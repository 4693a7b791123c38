//! Command-line interface for deseq-artifacts

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "deseq-artifacts")]
#[command(version)]
#[command(about = "Fit DESeq2 models on count tables and manage their artifacts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit a model and save it under its design key
    #[command(
        long_about = "Fit a DESeq2 model and save it under its design key.\n\n\
            Both tables are looked up by file name under the project's data\n\
            directory. The fitted model is written to models/dds<key>.pkl where\n\
            the key is \"_\" followed by each design factor, in the given order.",
        after_long_help = "\
Examples:
  deseq-artifacts train -c counts.csv -m design.csv -d condition
  deseq-artifacts train -c counts.csv -m design.csv -d batch -d condition --root /srv/project"
    )]
    Train {
        /// Counts table file name (genes x samples)
        #[arg(short, long,
            long_help = "Counts table file name.\n\
                Format: first column = gene IDs, remaining columns = raw counts per sample.")]
        counts: String,

        /// Design table file name (samples x factors)
        #[arg(short, long,
            long_help = "Sample design table file name.\n\
                Format: first column = sample IDs (matching the counts columns),\n\
                remaining columns = experimental variables.")]
        metadata: String,

        /// Design factor; repeat for multi-factor designs
        #[arg(short, long, required = true, value_name = "FACTOR")]
        design: Vec<String>,

        /// Project root holding data/ and models/
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// Print a JSON summary of a stored model
    Inspect {
        /// Design factors the model was trained with, in training order
        #[arg(short, long, required = true, value_name = "FACTOR")]
        design: Vec<String>,

        /// Project root holding data/ and models/
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// Print the path of the first file with this name under the data directory
    Locate {
        filename: String,

        /// Project root holding data/ and models/
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// List stored model artifacts
    List {
        /// Project root holding data/ and models/
        #[arg(short, long)]
        root: Option<PathBuf>,
    },
}
