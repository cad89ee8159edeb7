use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Hybrid-retrieval assistant for HR documents", long_about = None)]
struct Cli {
    /// Config file
    #[arg(long, global = true, default_value = hrag::config::CONFIG_FILE, env = "HRAG_CONFIG")]
    config: PathBuf,

    /// Debug logging for hrag modules
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and index a directory of documents (replaces the index)
    Ingest {
        /// Directory with .txt / .md documents
        #[arg(default_value = "data")]
        dir: PathBuf,

        /// Target chunk length in characters
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive chunks
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Retrieve passages for a query without generating an answer
    Search {
        query: String,

        /// Number of passages
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Skip the cross-encoder reranker
        #[arg(long)]
        no_rerank: bool,

        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Answer a question from the indexed documents
    Ask {
        question: String,

        /// Print the answer as it is generated
        #[arg(short, long)]
        stream: bool,

        /// Number of passages
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Skip the cross-encoder reranker
        #[arg(long)]
        no_rerank: bool,

        /// Output the full answer record as JSON
        #[arg(short, long, conflicts_with = "stream")]
        json: bool,
    },

    /// Run the labeled question set and report recall, latency and groundedness
    Eval {
        /// JSONL question set (default: from config)
        #[arg(long)]
        questions: Option<PathBuf>,

        /// Directory for eval_results.jsonl and eval_summary.json
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Number of passages
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Measure retrieval only (no LLM calls)
        #[arg(long)]
        retrieval_only: bool,

        /// Skip the cross-encoder reranker
        #[arg(long)]
        no_rerank: bool,

        /// Output the summary as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    hrag::logging::init(cli.verbose, cli.log_json);

    let mut config = commands::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            dir,
            chunk_size,
            chunk_overlap,
        } => {
            if let Some(size) = chunk_size {
                config.ingest.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                config.ingest.chunk_overlap = overlap;
            }
            commands::ingest::execute(&config, &dir)?;
        }
        Commands::Search {
            query,
            top_k,
            no_rerank,
            json,
        } => {
            commands::apply_top_k(&mut config, top_k);
            commands::search::execute(&config, &query, no_rerank, json)?;
        }
        Commands::Ask {
            question,
            stream,
            top_k,
            no_rerank,
            json,
        } => {
            commands::apply_top_k(&mut config, top_k);
            commands::ask::execute(
                &config,
                &question,
                commands::ask::AskOptions {
                    stream,
                    no_rerank,
                    json,
                },
            )?;
        }
        Commands::Eval {
            questions,
            report_dir,
            top_k,
            retrieval_only,
            no_rerank,
            json,
        } => {
            commands::apply_top_k(&mut config, top_k);
            if let Some(path) = questions {
                config.eval.questions = path;
            }
            if let Some(dir) = report_dir {
                config.eval.report_dir = dir;
            }
            commands::eval::execute(
                &config,
                commands::eval::EvalOptions {
                    retrieval_only,
                    no_rerank,
                    json,
                },
            )?;
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
