use anyhow::Result;
use clap::{Parser, Subcommand};
use keyescrow_cli::export::export_key;
use keyescrow_cli::{EscrowClient, KeyRecord, KeyState};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// KeyEscrow CLI - operator tool for escrowed recovery keys
#[derive(Parser)]
#[command(name = "keyescrow")]
#[command(about = "Operator tool for escrowed recovery keys", long_about = None)]
struct Cli {
    /// Escrow server base URL
    #[arg(long, global = true, env = "KEYESCROW_SERVER", default_value = "http://127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List escrowed key records, newest first
    List {
        /// Only records submitted under this username
        #[arg(long)]
        owner: Option<String>,
    },

    /// Show details of one record
    Show {
        /// Record ID
        id: String,
    },

    /// Set the state of a record
    SetState {
        /// Record ID
        id: String,

        /// New state
        #[arg(value_enum)]
        state: KeyState,
    },

    /// Flip a record between secured and unsecured
    Toggle {
        /// Record ID
        id: String,
    },

    /// Delete a record permanently
    Delete {
        /// Record ID
        id: String,
    },

    /// Write a record's key material to key_<hostname>.txt
    Export {
        /// Record ID
        id: String,

        /// Directory to write into
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let cli = Cli::parse();
    let client = EscrowClient::new(&cli.server)?;

    match cli.command {
        Commands::List { owner } => {
            let result = match owner.as_deref() {
                Some(username) => client.list_keys_for(username).await,
                None => client.list_keys().await,
            };
            let keys = match result {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::error!("Listing failed: {}", e);
                    anyhow::bail!("Failed to fetch encryption keys");
                }
            };
            print_table(&keys);
        }
        Commands::Show { id } => {
            let key = client.find_key(&id).await?;
            print_details(&key);
        }
        Commands::SetState { id, state } => {
            let updated = client.update_state(&id, state).await?;
            println!("{} is now {}", updated.id, display_state(updated.state));
        }
        Commands::Toggle { id } => {
            let updated = client.toggle_state(&id).await?;
            println!("{} is now {}", updated.id, display_state(updated.state));
        }
        Commands::Delete { id } => {
            let message = client.delete_key(&id).await?;
            println!("{}", message);
        }
        Commands::Export { id, dir } => {
            let key = client.find_key(&id).await?;
            let path = export_key(&key, &dir)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

fn print_table(keys: &[KeyRecord]) {
    if keys.is_empty() {
        println!("No machines found");
        return;
    }

    println!(
        "{:<4} {:<24} {:<16} {:<10} {:<16} {}",
        "#", "HOSTNAME", "IP ADDRESS", "STATE", "USERNAME", "ID"
    );
    for (index, key) in keys.iter().enumerate() {
        println!(
            "{:<4} {:<24} {:<16} {:<10} {:<16} {}",
            index + 1,
            or_placeholder(&key.hostname, "Unknown"),
            or_placeholder(&key.ip_address, "Unknown"),
            display_state(key.state),
            or_placeholder(&key.username, "-"),
            key.id
        );
    }
}

fn print_details(key: &KeyRecord) {
    println!("ID:          {}", key.id);
    println!("Hostname:    {}", or_placeholder(&key.hostname, "Unknown"));
    println!("IP Address:  {}", or_placeholder(&key.ip_address, "Unknown"));
    println!("MAC Address: {}", or_placeholder(&key.mac_address, "Not available"));
    println!("OS Info:     {}", or_placeholder(&key.os_info, "Not available"));
    println!("Username:    {}", or_placeholder(&key.username, "Not available"));
    println!("State:       {}", display_state(key.state));
    println!("Created At:  {}", or_placeholder(&key.sent_at, "Not available"));
}

fn or_placeholder<'a>(value: &'a Option<String>, placeholder: &'a str) -> &'a str {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(placeholder)
}

fn display_state(state: Option<KeyState>) -> String {
    state.map_or_else(|| "unsecured".to_string(), |s| s.to_string())
}
