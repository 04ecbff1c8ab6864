use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use retirement_forecast::api::{
    self, ApiError, CliWithdrawalOrder, CompareRequest, load_scenario, project_scenario,
};

#[derive(Parser, Debug)]
#[command(name = "retirement-forecast", about = "Deterministic household retirement projections")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Project one scenario file and print the result as JSON.
    Project {
        file: PathBuf,
        /// Overrides the scenario's forecast horizon.
        #[arg(long)]
        horizon: Option<u32>,
        #[arg(long, value_enum)]
        order: Option<CliWithdrawalOrder>,
    },
    /// Compare scenario files against the first one.
    Compare {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("retirement_forecast=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Serve { port } => api::run_http_server(port)
            .await
            .map_err(|e| e.to_string()),
        Command::Project {
            file,
            horizon,
            order,
        } => run_project(file, horizon, order).map_err(|e| e.to_string()),
        Command::Compare { files } => run_compare(files).map_err(|e| e.to_string()),
    };

    if let Err(msg) = outcome {
        tracing::error!("{msg}");
        std::process::exit(1);
    }
}

fn run_project(
    file: PathBuf,
    horizon: Option<u32>,
    order: Option<CliWithdrawalOrder>,
) -> Result<(), ApiError> {
    let mut scenario = load_scenario(&file)?;
    if let Some(years) = horizon {
        scenario.household.horizon_years = years;
    }
    if let Some(order) = order {
        scenario.household.withdrawal_order = order.into();
    }

    let result = project_scenario(&scenario)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_compare(files: Vec<PathBuf>) -> Result<(), ApiError> {
    let scenarios = files
        .iter()
        .map(|file| load_scenario(file))
        .collect::<Result<Vec<_>, _>>()?;
    let response = api::compare(&CompareRequest { scenarios })?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
