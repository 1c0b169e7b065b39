//! Operator entry point: wires Bridge + Executor + Planner in-process and
//! supervises the Worker as a child process, the way `mofa-cli` wires its
//! own `CliContext` only for the subcommands that need it.

mod client;
mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "toc-cli", about = "Tripartite Orchestration Core operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run Bridge + Executor + Planner in this process and supervise the
    /// Worker as a child process.
    Serve,
    /// Submit an intent to a running Planner and print the resulting plan.
    Submit {
        intent: String,
        #[arg(long, env = "TOC_PLANNER_URL", default_value = "http://127.0.0.1:8080/planner")]
        planner_url: String,
    },
    /// Fetch the current state of a plan.
    Status {
        plan_id: String,
        #[arg(long, env = "TOC_PLANNER_URL", default_value = "http://127.0.0.1:8080/planner")]
        planner_url: String,
    },
    /// Cancel a plan.
    Cancel {
        plan_id: String,
        #[arg(long, env = "TOC_PLANNER_URL", default_value = "http://127.0.0.1:8080/planner")]
        planner_url: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Serve => rt.block_on(serve::run()),
        Commands::Submit { intent, planner_url } => {
            rt.block_on(client::submit(&planner_url, &intent))
        }
        Commands::Status { plan_id, planner_url } => {
            rt.block_on(client::status(&planner_url, &plan_id))
        }
        Commands::Cancel { plan_id, planner_url } => {
            rt.block_on(client::cancel(&planner_url, &plan_id))
        }
    }
}
