//! Credential Store - register users and check logins from the command line.

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use credential_store_lib::Command;
use domain::CreateUserInput;

#[derive(Parser)]
#[command(name = "credential-store")]
#[command(about = "User credential store backed by Postgres")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user
    Register(CredentialArgs),
    /// Check a username and password
    Login(CredentialArgs),
    /// Connect to the database and print pool statistics
    Check,
}

#[derive(Args)]
struct CredentialArgs {
    #[arg(long)]
    username: String,
    #[arg(long, env = "CREDENTIAL_PASSWORD", hide_env_values = true)]
    password: String,
}

impl From<CredentialArgs> for CreateUserInput {
    fn from(args: CredentialArgs) -> Self {
        CreateUserInput::new(args.username, args.password)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = match cli.command {
        Commands::Register(args) => Command::Register(args.into()),
        Commands::Login(args) => Command::Login(args.into()),
        Commands::Check => Command::Check,
    };

    let output = credential_store_lib::run(command).await?;
    println!("{}", output);

    Ok(if output.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
