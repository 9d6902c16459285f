//! signhost CLI
//!
//! Command-line interface for a signhost daemon

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use signhost_api::Host;
use signhost_api::requests::EditHostRequest;
use signhost_client::{HttpClient, WsClient};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "signhost")]
#[command(about = "Signage fleet roster CLI", long_about = None)]
struct Cli {
    /// Daemon base URL
    #[arg(long, default_value = "http://localhost:8000")]
    url: String,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all hosts
    #[command(name = "hosts")]
    Hosts,
    /// Show one host
    Show { ip: String },
    /// Add a host by address
    Add {
        ip: String,
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Edit a host's operator fields
    Edit {
        ip: String,
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long)]
        hostname: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Move the record to a new address
        #[arg(long = "ip")]
        new_ip: Option<String>,
        #[arg(long)]
        vpn_ip: Option<String>,
    },
    /// Remove a host
    Remove { ip: String },
    /// Move a host to the top of the roster
    Primary { ip: String },
    /// Probe one host, or the whole roster
    Probe { ip: Option<String> },
    /// Scan the local subnet for peers
    Scan {
        /// Scan the /24 around this address instead of the primary interface
        #[arg(long)]
        interface: Option<String>,
    },
    /// Push the roster to peers (all known peers if none given)
    Push { targets: Vec<String> },
    /// Pull and merge a peer's roster
    Pull { peer: String },
    /// Back up the live roster
    Backup,
    /// List backups
    Backups,
    /// Restore a backup by name
    Restore { name: String },
    /// Download the live store file
    Export { path: PathBuf },
    /// Replace the live roster with a store file
    Import { path: PathBuf },
    /// Stream roster events
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = HttpClient::new(&cli.url)?;
    debug!(url = %cli.url, "using daemon");

    match cli.command {
        Commands::Hosts => {
            let hosts = client.list_hosts().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&hosts)?);
            } else {
                print_hosts(&hosts);
            }
        }
        Commands::Show { ip } => {
            let host = client.get_host(&ip).await?;
            println!("{}", serde_json::to_string_pretty(&host)?);
        }
        Commands::Add {
            ip,
            nickname,
            notes,
        } => {
            let mut host = Host::with_address(ip);
            if let Some(nickname) = nickname {
                host.nickname = nickname;
            }
            if let Some(notes) = notes {
                host.notes = notes;
            }
            let host = client.add_host(&host).await?;
            println!("added {} ({})", host.ip_address, host.id);
        }
        Commands::Edit {
            ip,
            nickname,
            hostname,
            notes,
            new_ip,
            vpn_ip,
        } => {
            let edit = EditHostRequest {
                nickname,
                hostname,
                notes,
                ip_address: new_ip,
                vpn_ip_address: vpn_ip,
            };
            let host = client.edit_host(&ip, &edit).await?;
            println!("updated {} ({})", host.ip_address, host.id);
        }
        Commands::Remove { ip } => {
            let host = client.delete_host(&ip).await?;
            println!("removed {} ({})", host.ip_address, host.id);
        }
        Commands::Primary { ip } => {
            let hosts = client.set_primary(&ip).await?;
            print_hosts(&hosts);
        }
        Commands::Probe { ip } => {
            let accepted = match ip {
                Some(ip) => client.probe_host(&ip).await?,
                None => client.probe_all().await?,
            };
            println!("{}", accepted.message);
        }
        Commands::Scan { interface } => {
            println!("{}", client.start_discovery(interface).await?.message);
        }
        Commands::Push { targets } => {
            println!("{}", client.push(targets).await?.message);
        }
        Commands::Pull { peer } => {
            println!("{}", client.pull(peer).await?.message);
        }
        Commands::Backup => match client.create_backup().await?.backup {
            Some(name) => println!("created {name}"),
            None => println!("nothing to back up"),
        },
        Commands::Backups => {
            let backups = client.list_backups().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
            } else {
                for b in backups {
                    println!(
                        "{:<40} {:>10}  {}",
                        b.name,
                        b.size_bytes,
                        b.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        Commands::Restore { name } => {
            let created = client.restore_backup(&name).await?;
            println!("restored {name}");
            if let Some(previous) = created.backup {
                println!("previous roster saved as {previous}");
            }
        }
        Commands::Export { path } => {
            let bytes = client.snapshot().await?;
            std::fs::write(&path, &bytes)
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            println!("wrote {} bytes to {}", bytes.len(), path.display());
        }
        Commands::Import { path } => {
            let bytes = std::fs::read(&path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            let created = client.import_snapshot(bytes).await?;
            println!("imported {}", path.display());
            if let Some(previous) = created.backup {
                println!("previous roster saved as {previous}");
            }
        }
        Commands::Watch => {
            let mut events = WsClient::connect(events_url(&cli.url)).await?;
            while let Some(event) = events.recv().await {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }

    Ok(())
}

fn print_hosts(hosts: &[Host]) {
    println!(
        "{:<16} {:<24} {:<12} {:<10} {:>6}",
        "IP", "NICKNAME", "STATUS", "CMS", "ASSETS"
    );
    for h in hosts {
        println!(
            "{:<16} {:<24} {:<12} {:<10} {:>6}",
            h.ip_address, h.nickname, h.status, h.cms_status, h.asset_count
        );
    }
}

fn events_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws}/ws/events")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_url() {
        assert_eq!(
            events_url("http://localhost:8000/"),
            "ws://localhost:8000/ws/events"
        );
        assert_eq!(
            events_url("https://signs.example"),
            "wss://signs.example/ws/events"
        );
    }

    #[test]
    fn test_parse_push_targets() {
        let cli = Cli::try_parse_from(["signhost", "push", "10.0.0.2", "10.0.0.3"]).unwrap();
        match cli.command {
            Commands::Push { targets } => assert_eq!(targets, ["10.0.0.2", "10.0.0.3"]),
            _ => panic!("expected push"),
        }
    }

    #[test]
    fn test_parse_scan_override() {
        let cli = Cli::try_parse_from(["signhost", "scan", "--interface", "10.1.2.3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Scan { interface: Some(ref a) } if a == "10.1.2.3"
        ));
    }
}
