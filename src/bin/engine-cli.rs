use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "engine-cli")]
#[command(about = "Management CLI for the configuration engine", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine status
    Status,
    /// List configurations and their states
    List,
    /// Show one configuration
    Show { name: String },
    /// Print the message log of a configuration (`*ALL*` for the aggregate)
    Log { name: String },
    /// Load a configuration
    Load { name: String },
    /// Unload a configuration
    Unload { name: String },
    /// Reload a configuration
    Reload { name: String },
    /// Destroy and re-initialize every configuration
    FullReload,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match &cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::List => client.get(format!("{base}/admin/configurations")),
        Commands::Show { name } => client.get(format!("{base}/admin/configurations/{name}")),
        Commands::Log { name } => client.get(format!("{base}/admin/logs/{name}")),
        Commands::Load { name } => {
            client.post(format!("{base}/admin/configurations/{name}/load"))
        }
        Commands::Unload { name } => {
            client.post(format!("{base}/admin/configurations/{name}/unload"))
        }
        Commands::Reload { name } => {
            client.post(format!("{base}/admin/configurations/{name}/reload"))
        }
        Commands::FullReload => client.post(format!("{base}/admin/full-reload")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
