//! fwctl - injection-safe iptables policy manager
//!
//! Command-line frontend over the policy store and the apply/rollback
//! orchestrator. The heavy lifting lives in the library; this binary wires
//! the JSON store, the iptables engine, and the service together.
//!
//! # Usage
//!
//! ```bash
//! fwctl rules list                   # Show stored filter rules
//! fwctl rules add --chain INPUT --protocol tcp --dport 22 --action ACCEPT
//! fwctl rules rm <id>                # Delete a rule
//! fwctl nat list                     # Show stored NAT rules
//! fwctl apply                        # Push policy into the kernel
//! fwctl rollback                     # Restore the previous snapshot
//! fwctl counters                     # Live per-chain/rule traffic counters
//! fwctl config show                  # Global toggles
//! fwctl config set --ip-forwarding on
//! fwctl ifaces add eth0 --zone public
//! fwctl zones add dmz --target REJECT
//! fwctl history                      # Recent snapshots
//! ```

use clap::{Parser, Subcommand};
use fwctl::audit;
use fwctl::core::engine::IptablesEngine;
use fwctl::core::error::{Error, Result};
use fwctl::core::rules::{Action, Chain, NatKind, NetworkInterface, Protocol, Zone};
use fwctl::core::service::{FirewallService, NatRuleDraft, RuleDraft};
use fwctl::store::json::{JsonHistoryStore, JsonStore};
use fwctl::store::{InterfaceStore, ZoneStore};
use fwctl::utils;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fwctl", version, about = "Injection-safe iptables policy manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage filter rules
    Rules {
        #[command(subcommand)]
        command: RuleCommands,
    },
    /// Manage NAT rules
    Nat {
        #[command(subcommand)]
        command: NatCommands,
    },
    /// Push the stored policy into the live engine
    Apply,
    /// Restore the previously captured snapshot
    Rollback,
    /// Show live traffic counters
    Counters,
    /// Global firewall toggles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Interface metadata records
    Ifaces {
        #[command(subcommand)]
        command: IfaceCommands,
    },
    /// Zone metadata records
    Zones {
        #[command(subcommand)]
        command: ZoneCommands,
    },
    /// List recent snapshots
    History {
        /// Maximum entries to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum IfaceCommands {
    /// List interfaces by name
    List,
    /// Register an interface
    Add {
        name: String,
        #[arg(long, default_value = "")]
        zone: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Remove an interface record
    Rm { id: Uuid },
}

#[derive(Subcommand)]
enum ZoneCommands {
    /// List zones by name
    List,
    /// Register a zone
    Add {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "ACCEPT")]
        target: String,
    },
    /// Remove a zone record
    Rm { id: Uuid },
}

#[derive(Subcommand)]
enum RuleCommands {
    /// List stored rules in apply order
    List,
    /// Add a rule
    Add {
        #[arg(long)]
        chain: Chain,
        #[arg(long, default_value = "all")]
        protocol: Protocol,
        #[arg(long, default_value = "")]
        src: String,
        #[arg(long, default_value = "")]
        dst: String,
        #[arg(long, default_value = "")]
        sport: String,
        #[arg(long, default_value = "")]
        dport: String,
        #[arg(long)]
        action: Action,
        #[arg(long, default_value = "")]
        comment: String,
        #[arg(long, default_value_t = 0)]
        position: i32,
        /// Store the rule disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Delete a rule
    Rm { id: Uuid },
}

#[derive(Subcommand)]
enum NatCommands {
    /// List stored NAT rules in apply order
    List,
    /// Add a NAT rule
    Add {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long)]
        kind: NatKind,
        #[arg(long, default_value = "all")]
        protocol: Protocol,
        #[arg(long, default_value = "")]
        in_interface: String,
        #[arg(long, default_value = "")]
        out_interface: String,
        #[arg(long, default_value = "")]
        source_ip: String,
        #[arg(long, default_value = "")]
        source_port: String,
        #[arg(long, default_value = "")]
        dest_ip: String,
        #[arg(long, default_value = "")]
        dest_port: String,
        #[arg(long)]
        nat_to_ip: String,
        #[arg(long, default_value = "")]
        nat_to_port: String,
        #[arg(long, default_value = "")]
        comment: String,
        #[arg(long, default_value_t = 0)]
        position: i32,
    },
    /// Delete a NAT rule
    Rm { id: Uuid },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the global toggles
    Show,
    /// Update the global toggles
    Set {
        #[arg(long, value_parser = parse_on_off)]
        ip_forwarding: Option<bool>,
        #[arg(long, value_parser = parse_on_off)]
        nat_enabled: Option<bool>,
    },
}

fn parse_on_off(value: &str) -> std::result::Result<bool, String> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(format!("expected on/off, got {other}")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fwctl=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = utils::ensure_dirs() {
        eprintln!("Error: failed to create data directories: {e}");
        return ExitCode::FAILURE;
    }

    let app = match App::build().await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli.command, &app).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Wired-together application: the orchestrator plus the store handle the
/// metadata commands act on directly
struct App {
    service: FirewallService,
    store: Arc<JsonStore>,
}

impl App {
    async fn build() -> Result<Self> {
        let data_dir = utils::get_data_dir()
            .ok_or_else(|| Error::Internal("data directory not found".to_string()))?;
        let state_dir = utils::get_state_dir()
            .ok_or_else(|| Error::Internal("state directory not found".to_string()))?;

        let store = Arc::new(JsonStore::open(&data_dir).await?);
        let history = Arc::new(JsonHistoryStore::open(&state_dir));
        let engine = Arc::new(IptablesEngine::new());

        let service = FirewallService::with_config(
            store.clone(),
            history,
            store.clone(),
            store.clone(),
            engine,
        );
        Ok(Self { service, store })
    }
}

fn warn_if_unprivileged() {
    if !nix::unistd::getuid().is_root() {
        warn!("not running as root; engine operations will likely be refused");
    }
}

async fn run(command: &Commands, app: &App) -> Result<()> {
    let service = &app.service;
    match command {
        Commands::Rules { command } => run_rules(command, service).await,
        Commands::Nat { command } => run_nat(command, service).await,
        Commands::Apply => {
            warn_if_unprivileged();
            let result = service.apply_rules().await;
            match &result {
                Ok(report) => {
                    audit::log_apply(report.rule_count, &report.warnings, true, None).await;
                    println!("Applied {} rules.", report.rule_count);
                    if !report.snapshot_captured {
                        println!("Warning: no pre-apply snapshot captured; rollback unavailable for this apply.");
                    }
                    for warning in &report.warnings {
                        println!("Warning: {warning}");
                    }
                }
                Err(e) => {
                    audit::log_apply(0, &[], false, Some(e.to_string())).await;
                }
            }
            result.map(|_| ())
        }
        Commands::Rollback => {
            warn_if_unprivileged();
            let result = service.rollback().await;
            match &result {
                Ok(id) => {
                    audit::log_rollback(Some(id.to_string()), true, None).await;
                    println!("Rolled back to snapshot {id}.");
                }
                Err(e) => {
                    audit::log_rollback(None, false, Some(e.to_string())).await;
                }
            }
            result.map(|_| ())
        }
        Commands::Counters => {
            warn_if_unprivileged();
            let counters = service.counters().await?;
            println!("{:<12} {:>12} {:>14}  RULE", "CHAIN", "PACKETS", "BYTES");
            for counter in counters {
                println!(
                    "{:<12} {:>12} {:>14}  {}",
                    counter.chain, counter.packets, counter.bytes, counter.rule
                );
            }
            Ok(())
        }
        Commands::Config { command } => run_config(command, service).await,
        Commands::Ifaces { command } => run_ifaces(command, &app.store).await,
        Commands::Zones { command } => run_zones(command, &app.store).await,
        Commands::History { limit } => {
            let entries = service.history_entries(*limit).await?;
            for entry in entries {
                println!(
                    "{}  {}  {}",
                    entry.applied_at.to_rfc3339(),
                    entry.id,
                    entry.description
                );
            }
            Ok(())
        }
    }
}

async fn run_rules(command: &RuleCommands, service: &FirewallService) -> Result<()> {
    match command {
        RuleCommands::List => {
            let rules = service.list_rules().await?;
            for rule in rules {
                let state = if rule.enabled { "" } else { " (disabled)" };
                println!(
                    "{}  pos={:<3} {} {} src={} dst={} sport={} dport={} -> {}{}",
                    rule.id,
                    rule.position,
                    rule.chain,
                    rule.protocol,
                    display_any(&rule.src),
                    display_any(&rule.dst),
                    display_any(&rule.src_port),
                    display_any(&rule.dst_port),
                    rule.action,
                    state
                );
            }
            Ok(())
        }
        RuleCommands::Add {
            chain,
            protocol,
            src,
            dst,
            sport,
            dport,
            action,
            comment,
            position,
            disabled,
        } => {
            let rule = service
                .create_rule(RuleDraft {
                    chain: *chain,
                    protocol: *protocol,
                    src: src.clone(),
                    dst: dst.clone(),
                    src_port: sport.clone(),
                    dst_port: dport.clone(),
                    action: *action,
                    enabled: !disabled,
                    comment: comment.clone(),
                    position: *position,
                })
                .await?;
            println!("Created rule {}.", rule.id);
            Ok(())
        }
        RuleCommands::Rm { id } => {
            service.delete_rule(*id).await?;
            println!("Deleted rule {id}.");
            Ok(())
        }
    }
}

async fn run_nat(command: &NatCommands, service: &FirewallService) -> Result<()> {
    match command {
        NatCommands::List => {
            let rules = service.list_nat_rules().await?;
            for rule in rules {
                let state = if rule.enabled { "" } else { " (disabled)" };
                println!(
                    "{}  pos={:<3} {} {} to={}{}{}",
                    rule.id,
                    rule.position,
                    rule.kind,
                    rule.protocol,
                    display_any(&rule.nat_to_ip),
                    if rule.nat_to_port.is_empty() {
                        String::new()
                    } else {
                        format!(":{}", rule.nat_to_port)
                    },
                    state
                );
            }
            Ok(())
        }
        NatCommands::Add {
            name,
            kind,
            protocol,
            in_interface,
            out_interface,
            source_ip,
            source_port,
            dest_ip,
            dest_port,
            nat_to_ip,
            nat_to_port,
            comment,
            position,
        } => {
            let rule = service
                .create_nat_rule(NatRuleDraft {
                    name: name.clone(),
                    kind: *kind,
                    protocol: *protocol,
                    in_interface: in_interface.clone(),
                    out_interface: out_interface.clone(),
                    source_ip: source_ip.clone(),
                    source_port: source_port.clone(),
                    dest_ip: dest_ip.clone(),
                    dest_port: dest_port.clone(),
                    nat_to_ip: nat_to_ip.clone(),
                    nat_to_port: nat_to_port.clone(),
                    comment: comment.clone(),
                    enabled: true,
                    position: *position,
                })
                .await?;
            println!("Created NAT rule {}.", rule.id);
            Ok(())
        }
        NatCommands::Rm { id } => {
            service.delete_nat_rule(*id).await?;
            println!("Deleted NAT rule {id}.");
            Ok(())
        }
    }
}

async fn run_config(
    command: &ConfigCommands,
    service: &FirewallService,
) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = service.get_config().await?;
            println!("ip_forwarding: {}", config.ip_forwarding);
            println!("nat_enabled:   {}", config.nat_enabled);
            Ok(())
        }
        ConfigCommands::Set {
            ip_forwarding,
            nat_enabled,
        } => {
            let current = service.get_config().await?;
            let config = service
                .update_config(
                    ip_forwarding.unwrap_or(current.ip_forwarding),
                    nat_enabled.unwrap_or(current.nat_enabled),
                )
                .await?;
            audit::log_config_update(config.ip_forwarding, config.nat_enabled).await;
            println!("ip_forwarding: {}", config.ip_forwarding);
            println!("nat_enabled:   {}", config.nat_enabled);
            Ok(())
        }
    }
}

async fn run_ifaces(command: &IfaceCommands, store: &Arc<JsonStore>) -> Result<()> {
    match command {
        IfaceCommands::List => {
            let interfaces = InterfaceStore::list(store.as_ref()).await?;
            for iface in interfaces {
                println!(
                    "{}  {:<15} zone={} {}",
                    iface.id,
                    iface.name,
                    display_any(&iface.zone),
                    iface.notes
                );
            }
            Ok(())
        }
        IfaceCommands::Add { name, zone, notes } => {
            fwctl::validators::validate_interface(name)
                .map_err(|m| Error::validation("name", m))?;
            let now = chrono::Utc::now();
            let iface = NetworkInterface {
                id: Uuid::new_v4(),
                name: name.clone(),
                zone: zone.clone(),
                enabled: true,
                notes: notes.clone(),
                created_at: now,
                updated_at: now,
            };
            InterfaceStore::create(store.as_ref(), iface.clone()).await?;
            println!("Created interface {}.", iface.id);
            Ok(())
        }
        IfaceCommands::Rm { id } => {
            InterfaceStore::delete(store.as_ref(), *id).await?;
            println!("Deleted interface {id}.");
            Ok(())
        }
    }
}

async fn run_zones(command: &ZoneCommands, store: &Arc<JsonStore>) -> Result<()> {
    match command {
        ZoneCommands::List => {
            let zones = ZoneStore::list(store.as_ref()).await?;
            for zone in zones {
                println!(
                    "{}  {:<12} target={} {}",
                    zone.id, zone.name, zone.target, zone.description
                );
            }
            Ok(())
        }
        ZoneCommands::Add {
            name,
            description,
            target,
        } => {
            let now = chrono::Utc::now();
            let zone = Zone {
                id: Uuid::new_v4(),
                name: name.clone(),
                description: description.clone(),
                target: target.clone(),
                in_policy: String::new(),
                out_policy: String::new(),
                created_at: now,
                updated_at: now,
            };
            ZoneStore::create(store.as_ref(), zone.clone()).await?;
            println!("Created zone {}.", zone.id);
            Ok(())
        }
        ZoneCommands::Rm { id } => {
            ZoneStore::delete(store.as_ref(), *id).await?;
            println!("Deleted zone {id}.");
            Ok(())
        }
    }
}

fn display_any(value: &str) -> &str {
    if value.is_empty() {
        "any"
    } else {
        value
    }
}
