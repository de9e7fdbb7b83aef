use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use powerball_lib::config;
use powerball_lib::connection::conn;
use powerball_lib::use_cases::{
    AnalysisUseCase, AuthUseCase, DrawInput, DrawUseCase, InsightKind, preview_import,
    validate_input,
};
use powerball_lib::{ApiClient, SessionStore};

#[derive(Parser)]
#[command(name = "powerball", about = "Command-line client for the Powerball Analyzer API")]
struct Cli {
    /// Base URL of the API (overrides POWERBALL_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session locally
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "POWERBALL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// Create a new account
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: Option<String>,
        #[arg(short, long, env = "POWERBALL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show the stored session
    Whoami,

    /// Browse and manage draws
    Draws {
        #[command(subcommand)]
        command: DrawsCommand,
    },

    /// Upload draws from CSV/TXT files
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Generate a prediction
    Predict {
        #[arg(short, long, default_value = "frequency")]
        method: String,
    },

    /// List past predictions
    Predictions {
        #[arg(short, long)]
        method: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Number statistics computed by the API
    Insights {
        #[command(subcommand)]
        kind: InsightCommand,
    },

    /// Check a ticket against a draw
    Check {
        #[arg(short, long)]
        draw_id: String,
        #[arg(short, long, num_args = 5, required = true)]
        white: Vec<String>,
        #[arg(short, long)]
        powerball: String,
    },

    /// Ask the API to fetch the latest official draw (admin)
    Scrape,

    /// Show activity counters for the current user
    Stats,

    /// Validate draw fields without contacting the API
    Validate {
        #[command(flatten)]
        draw: DrawArgs,
    },

    /// Parse import files and print the rows without uploading
    Parse {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DrawsCommand {
    /// List draws, newest first
    List {
        #[arg(short, long, default_value = "20")]
        limit: u32,
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },

    /// Show one draw
    Show { id: String },

    /// Add a draw (admin)
    Add {
        #[command(flatten)]
        draw: DrawArgs,
    },

    /// Correct the winner count of a draw (admin)
    Winners { id: String, winners: u32 },
}

#[derive(Subcommand)]
enum InsightCommand {
    Frequency,
    Hot,
    Due,
    Pairs,
    Positions,
}

impl From<InsightCommand> for InsightKind {
    fn from(command: InsightCommand) -> Self {
        match command {
            InsightCommand::Frequency => InsightKind::Frequency,
            InsightCommand::Hot => InsightKind::Hot,
            InsightCommand::Due => InsightKind::Due,
            InsightCommand::Pairs => InsightKind::Pairs,
            InsightCommand::Positions => InsightKind::Positions,
        }
    }
}

#[derive(clap::Args)]
struct DrawArgs {
    #[arg(short, long)]
    number: String,
    /// YYYY-MM-DD
    #[arg(short, long)]
    date: String,
    #[arg(short, long, num_args = 1.., required = true)]
    white: Vec<String>,
    #[arg(short, long)]
    powerball: String,
    #[arg(short, long)]
    jackpot: Option<f64>,
    #[arg(long)]
    winners: Option<u32>,
}

impl From<DrawArgs> for DrawInput {
    fn from(args: DrawArgs) -> Self {
        DrawInput {
            draw_number: args.number,
            draw_date: args.date,
            white_balls: args.white,
            powerball: args.powerball,
            jackpot_amount: args.jackpot,
            winners: args.winners,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = config::load()?;
    if let Some(url) = cli.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let output = match cli.command {
        Command::Validate { draw } => validate_input(&draw.into())?,
        Command::Parse { files } => preview_import(&files).await?,
        command => run_online(command, &config).await?,
    };

    println!("{}", output);
    Ok(())
}

async fn run_online(command: Command, config: &config::Config) -> Result<String> {
    let db_conn = conn(&config.session_path)?;
    let client = ApiClient::new(config, SessionStore::new(db_conn))
        .context("Failed to create API client")?;
    let client = Arc::new(client);
    tracing::debug!(api_url = %config.api_url, "using API");

    let auth = AuthUseCase::new(Arc::clone(&client));
    let draws = DrawUseCase::new(Arc::clone(&client), config.upload_batch_size);
    let analysis = AnalysisUseCase::new(Arc::clone(&client));

    let result = match command {
        Command::Login { username, password } => auth.login(&username, &password).await,
        Command::Logout => auth.logout().await,
        Command::Register {
            username,
            email,
            password,
        } => auth.register(&username, email.as_deref(), &password).await,
        Command::Whoami => auth.whoami().await,
        Command::Draws { command } => match command {
            DrawsCommand::List { limit, offset } => draws.list_draws(limit, offset).await,
            DrawsCommand::Show { id } => draws.show_draw(&id).await,
            DrawsCommand::Add { draw } => draws.add_draw(&draw.into()).await,
            DrawsCommand::Winners { id, winners } => draws.update_winners(&id, winners).await,
        },
        Command::Import { files } => draws.import_files(&files).await,
        Command::Scrape => draws.scrape_latest().await,
        Command::Predict { method } => analysis.generate_prediction(&method).await,
        Command::Predictions { method, limit } => {
            analysis.list_predictions(method.as_deref(), limit).await
        }
        Command::Insights { kind } => analysis.insight(kind.into()).await,
        Command::Check {
            draw_id,
            white,
            powerball,
        } => analysis.check_numbers(&draw_id, &white, &powerball).await,
        Command::Stats => analysis.user_stats().await,
        Command::Validate { draw } => validate_input(&draw.into()),
        Command::Parse { files } => preview_import(&files).await,
    };

    result.inspect_err(|e| {
        tracing::error!("command failed: {:#}", e);
    })
}
