use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;

use web_deadend::config::responses::load_route_table;
use web_deadend::config::validation::lint_routes;
use web_deadend::routing::{resolve, MatchMode, RouteMatcher};

#[derive(Parser)]
#[command(name = "deadend-cli")]
#[command(about = "Operator CLI for web-deadend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query a running instance's status endpoint
    Status {
        #[arg(short, long, default_value = "http://localhost:3000")]
        url: String,
    },
    /// Report route-table entries that will not behave as written
    Lint {
        /// Route table (YAML)
        file: PathBuf,
    },
    /// Show which route answers a request
    Match {
        /// Route table (YAML)
        file: PathBuf,
        /// HTTP method, e.g. GET
        method: String,
        /// Request path, e.g. /cgi-bin/luci
        path: String,
        /// Apply %IP% / %EPOCH% value rules
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status { url } => {
            let client = reqwest::Client::new();
            let res = client
                .get(format!("{}/deadend-status", url.trim_end_matches('/')))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Lint { file } => {
            let table = match load_route_table(&file) {
                Ok(table) => table,
                Err(e) => {
                    eprintln!("Error: cannot load {}: {}", file.display(), e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            let findings = lint_routes(&table);
            for finding in &findings {
                println!("{finding}");
            }
            println!("{} routes, {} findings", table.len(), findings.len());
        }
        Commands::Match {
            file,
            method,
            path,
            strict,
        } => {
            let table = match load_route_table(&file) {
                Ok(table) => table,
                Err(e) => {
                    eprintln!("Error: cannot load {}: {}", file.display(), e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            let mode = if strict { MatchMode::Strict } else { MatchMode::Generic };
            match resolve(&table, &RouteMatcher::new(mode), &method.to_uppercase(), &path) {
                Some(resolution) => {
                    println!("route: {}", resolution.pattern);
                    println!("status: {}", resolution.spec.status);
                    let mut variables: Vec<_> = resolution.variables.iter().collect();
                    variables.sort();
                    for (name, value) in variables {
                        println!("  {name} = {value}");
                    }
                }
                None => println!("no match (204)"),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    println!("Status: {}", status);
    if status == reqwest::StatusCode::NO_CONTENT {
        println!("(no content: endpoint hidden from this address)");
        return Ok(());
    }
    if !status.is_success() {
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
