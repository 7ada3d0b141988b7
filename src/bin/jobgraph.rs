use anyhow::Result;
use clap::{Parser, Subcommand};
use jobgraph::compiler::loader;
use jobgraph::{Compiler, CompilerOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a pipeline file and print the resulting graph
    Compile {
        /// Path to the pipeline YAML file
        file: PathBuf,

        /// Keep edges that are implied by longer paths
        #[arg(long)]
        no_reduce: bool,

        /// Print the graph as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check mandatory parameters without printing the graph
    Validate {
        /// Path to the pipeline YAML file
        file: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { file, no_reduce, json } => {
            info!("Loading pipeline from: {:?}", file);
            let pipeline = loader::load_pipeline_from_yaml(&file.to_string_lossy())?;

            let options = CompilerOptions {
                reduce_dependencies: !no_reduce,
                ..CompilerOptions::default()
            };
            let mut compiled = Compiler::with_options(options).compile(&pipeline)?;
            let summary = compiled.graph.to_summary()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for node in &summary.nodes {
                    println!("{}", node.id);
                    for (key, value) in &node.configuration {
                        println!("    {} = {}", key, serde_json::to_string(value)?);
                    }
                }
                println!();
                for edge in &summary.edges {
                    match (&edge.source_property, &edge.target_property) {
                        (Some(from), Some(to)) => println!(
                            "{}.{} -> {}.{} [{}]",
                            edge.source, from, edge.target, to, edge.kind
                        ),
                        _ => println!("{} -> {} [{}]", edge.source, edge.target, edge.kind),
                    }
                }
            }

            for error in &compiled.validation_errors {
                eprintln!("error: {}", error);
            }
            Ok(if compiled.is_valid() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Validate { file } => {
            let pipeline = loader::load_pipeline_from_yaml(&file.to_string_lossy())?;
            let compiled = Compiler::new().compile(&pipeline)?;

            if compiled.is_valid() {
                println!("{}: ok", file.display());
                return Ok(ExitCode::SUCCESS);
            }
            for error in &compiled.validation_errors {
                println!("{}", error);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
