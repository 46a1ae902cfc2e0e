use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "linktest",
    about = "Bench-grade Ethernet link validation between a UUT and its remote endpoint",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the test catalog
    List,

    /// Auto-detect connected Ethernet ports
    Detect,

    /// Run one test from the catalog across all configured channels
    Run {
        /// Channel configuration file (TOML)
        #[arg(long, default_value = "linktest.toml")]
        config: PathBuf,

        /// Test to run: ordinal id or display name
        #[arg(long)]
        test: String,
    },

    /// Run the whole catalog in order, saving results
    RunAll {
        /// Channel configuration file (TOML)
        #[arg(long, default_value = "linktest.toml")]
        config: PathBuf,

        /// For eligible tests, run channels in parallel
        #[arg(long)]
        parallel: bool,

        /// Directory results are written under
        #[arg(long, default_value = "results")]
        results_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            let catalog = linktest::catalog::builtin();
            println!(
                "{:<3} | {:<35} | {:<8} | Description",
                "Id", "Name", "Parallel"
            );
            println!("{:-<3}-|-{:-<35}-|-{:-<8}-|-{:-<40}", "", "", "", "");
            for def in &catalog {
                println!(
                    "{:<3} | {:<35} | {:<8} | {}",
                    def.id,
                    def.name,
                    if def.concurrent_eligible { "yes" } else { "no" },
                    def.description
                );
            }
        }
        Commands::Detect => {
            tracing::info!("Auto-detecting connected Ethernet ports");
            let tools = linktest::config::ToolPaths::default();
            let ports = linktest::system::diag::detect_ethernet_ports(&tools.ip).await?;
            if ports.is_empty() {
                println!("No connected Ethernet ports detected.");
            } else {
                println!("{:<12} | {:<15} | {:<10} | State", "Interface", "IP", "Speed");
                println!("{:-<12}-|-{:-<15}-|-{:-<10}-|-{:-<6}", "", "", "", "");
                for port in &ports {
                    let ip = port
                        .ip
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "not assigned".into());
                    let speed = port
                        .speed_mbps
                        .map(|mbps| format!("{} Mbps", mbps))
                        .unwrap_or_else(|| "unknown".into());
                    println!(
                        "{:<12} | {:<15} | {:<10} | {}",
                        port.name, ip, speed, port.state
                    );
                }
            }
        }
        Commands::Run { config, test } => {
            let config = linktest::config::RunConfig::load(&config)?;
            let catalog = linktest::catalog::builtin();
            let def = linktest::catalog::find(&catalog, &test)
                .with_context(|| format!("no such test: {test}"))?;
            tracing::info!(test = def.name, "running");

            // Single tests show results in the terminal; artifacts go to a
            // scratch directory discarded afterwards.
            let scratch =
                std::env::temp_dir().join(format!("linktest_{}", linktest::report::timestamp()));
            let outcomes = linktest::dispatch::run_single(def, &config, &scratch).await;

            println!("\nTest: {}", def.name);
            println!("{:<12} | {:<6} | Details", "Channel", "Result");
            println!("{:-<12}-|-{:-<6}-|-{:-<40}", "", "", "");
            for outcome in &outcomes {
                println!(
                    "{:<12} | {:<6} | {}",
                    outcome.channel, outcome.status, outcome.detail
                );
            }
            let _ = std::fs::remove_dir_all(&scratch);
        }
        Commands::RunAll {
            config,
            parallel,
            results_dir,
        } => {
            let config = linktest::config::RunConfig::load(&config)?;
            let catalog = linktest::catalog::builtin();
            let options = linktest::dispatch::RunAllOptions {
                parallel,
                results_root: results_dir,
            };
            let (summary, run_dir) =
                linktest::dispatch::run_all(&catalog, &config, &options).await?;
            println!("{}", summary.render());
            println!("Results saved to: {}", run_dir.display());
        }
    }

    Ok(())
}
