use anyhow::Result;
use clap::{Parser, Subcommand};
use folio_core::build::build_index;
use folio_core::corpus::load_corpus;
use folio_core::persist::{load_dump, save_index, IndexPaths};
use folio_core::{Searcher, VectorizerConfig};
use tracing_subscriber::{EnvFilter, fmt};

use std::path::Path;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and inspect the portfolio retrieval index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a directory of markdown / JSON / JSONL project files
    Build {
        /// Corpus directory
        #[arg(long, default_value = "./content")]
        input: String,
        /// Output index directory
        #[arg(long, default_value = "./index")]
        output: String,
        /// Maximum vocabulary size
        #[arg(long, default_value_t = 5000)]
        max_features: usize,
        /// Drop terms found in more than this fraction of documents
        #[arg(long, default_value_t = 0.8)]
        max_df: f64,
        /// Use unsmoothed IDF = ln(N/df) + 1 instead of ln((1+N)/(1+df)) + 1
        #[arg(long, default_value_t = false)]
        raw_idf: bool,
        /// Use sublinear term frequency 1 + ln(tf)
        #[arg(long, default_value_t = false)]
        sublinear_tf: bool,
        /// Apply English stemming before building terms
        #[arg(long, default_value_t = false)]
        stem: bool,
    },
    /// List the documents stored in an index
    List {
        #[arg(long, default_value = "./index")]
        index: String,
    },
    /// Run a query against a built index and print the hits as JSON
    Query {
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long, default_value_t = 5)]
        k: usize,
        query: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, max_features, max_df, raw_idf, sublinear_tf, stem } => {
            let config = VectorizerConfig {
                max_features,
                max_df,
                smooth_idf: !raw_idf,
                sublinear_tf,
                stem,
                ..Default::default()
            };
            run_build(Path::new(&input), Path::new(&output), config)
        }
        Commands::List { index } => {
            let dump = load_dump(&IndexPaths::new(&index))?;
            for doc in dump.documents {
                println!("{}\t{}", doc.slug, doc.title);
            }
            Ok(())
        }
        Commands::Query { index, k, query } => {
            let searcher = Searcher::load(&IndexPaths::new(&index));
            let hits = searcher.search(&query, k);
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }
    }
}

fn run_build(input: &Path, output: &Path, config: VectorizerConfig) -> Result<()> {
    let sources = load_corpus(input);
    tracing::info!(num_sources = sources.len(), "ingested documents");
    let built = build_index(sources, config);
    let paths = IndexPaths::new(output);
    save_index(&paths, &built)?;
    tracing::info!(
        output = %output.display(),
        num_docs = built.documents.len(),
        num_terms = built.vectorizer.num_features(),
        "index build complete"
    );
    Ok(())
}
