//! `fabric-client` entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load the optional `--settings` TOML file and
//!    apply command-line overrides.
//! 2. **Wire observability**: configure `tracing-subscriber` (text or JSON)
//!    and, when an endpoint is given, an OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: create the in-process [`LocalEngine`] and
//!    a [`FabricClient`] bound to it.
//! 4. **Run one subcommand** through the client's Begin/End surface and print
//!    the result.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use client::{FabricClient, PagedResult};
use local_engine::LocalEngine;
use protocol::interfaces::subsystem;
use protocol::payloads::{EnumerateSubNamesRequest, NodeQueryRequest, PropertyValue};
use protocol::{ClientRole, FabricName, NodeName, PropertyName, Timeout};

use crate::config::{CliConfig, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "fabric-client")]
#[command(about = "Issue fabric client operations against an in-process engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Per-operation timeout; defaults to the settings' default timeout
    #[arg(long, global = true)]
    timeout_ms: Option<u32>,

    /// Interface version to issue through; defaults to the newest the
    /// engine supports
    #[arg(long, global = true)]
    interface_version: Option<u32>,

    /// Connect with the admin role
    #[arg(long, global = true)]
    admin: bool,

    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// OTLP gRPC collector, e.g. http://localhost:4317
    #[arg(long, global = true)]
    otlp_endpoint: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every interface ladder and its operation slots
    Interfaces,

    /// Manage names
    Names {
        #[command(subcommand)]
        action: NameAction,
    },

    /// Read and write properties
    Properties {
        #[command(subcommand)]
        action: PropertyAction,
    },

    /// List the cluster's nodes
    Nodes,

    /// Show cluster health, or one node's health
    Health {
        #[arg(long)]
        node: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum NameAction {
    Create { name: String },
    Exists { name: String },
    Delete { name: String },
    /// List sub-names
    List {
        name: String,
        #[arg(long)]
        recursive: bool,
    },
}

#[derive(Debug, Subcommand)]
enum PropertyAction {
    Put {
        name: String,
        property: String,
        value: String,
        #[arg(long, value_enum, default_value_t = ValueKind::String)]
        kind: ValueKind,
        /// Create the name first if it does not exist
        #[arg(long)]
        create_name: bool,
    },
    Get {
        name: String,
        property: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ValueKind {
    String,
    Int64,
    Double,
    Guid,
}

impl ValueKind {
    fn parse(self, raw: &str) -> anyhow::Result<PropertyValue> {
        Ok(match self {
            Self::String => PropertyValue::String(raw.to_string()),
            Self::Int64 => PropertyValue::Int64(raw.parse().context("not a 64-bit integer")?),
            Self::Double => PropertyValue::Double(raw.parse().context("not a number")?),
            Self::Guid => PropertyValue::Guid(raw.parse().context("not a GUID")?),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.settings.as_deref())?;
    if let Some(format) = cli.log_format {
        config.observability.log_format = format;
    }
    if let Some(endpoint) = &cli.otlp_endpoint {
        config.observability.otlp_endpoint = Some(endpoint.clone());
    }
    let _telemetry = telemetry::init(&config.observability)?;

    let engine = LocalEngine::new();
    let role = if cli.admin {
        ClientRole::Admin
    } else {
        ClientRole::User
    };
    let client = FabricClient::builder()
        .local()
        .role(role)
        .settings(config.client)
        .connect(Arc::new(engine))?;

    let timeout = cli
        .timeout_ms
        .map(Timeout::from_millis)
        .unwrap_or_else(|| client.default_timeout());
    let session = Session {
        client: client.clone(),
        timeout,
        version: cli.interface_version,
    };

    let outcome = session.run(cli.command).await;
    client.close();
    outcome
}

struct Session {
    client: FabricClient,
    timeout: Timeout,
    version: Option<u32>,
}

impl Session {
    fn version_for(&self, subsystem_name: &str) -> anyhow::Result<u32> {
        match self.version {
            Some(version) => Ok(version),
            None => self
                .client
                .best_version(subsystem_name)
                .with_context(|| format!("engine does not implement {subsystem_name}")),
        }
    }

    async fn run(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Interfaces => self.interfaces(),
            Command::Names { action } => self.names(action).await,
            Command::Properties { action } => self.properties(action).await,
            Command::Nodes => self.nodes().await,
            Command::Health { node } => self.health(node).await,
        }
    }

    fn interfaces(&self) -> anyhow::Result<()> {
        for ladder in self.client.catalog().ladders() {
            let highest = self
                .client
                .engine_capabilities()
                .highest_version(ladder.subsystem().as_str());
            println!(
                "{} (engine supports up to v{})",
                ladder.subsystem(),
                highest.map_or_else(|| "-".to_string(), |v| v.to_string())
            );
            for descriptor in ladder.versions() {
                println!("  v{} {}", descriptor.version, descriptor.id);
                for (slot, operation) in descriptor.slots.iter().enumerate() {
                    println!("    [{slot}] {operation}");
                }
            }
        }
        Ok(())
    }

    async fn names(&self, action: NameAction) -> anyhow::Result<()> {
        let pm = self
            .client
            .property_management(self.version_for(subsystem::PROPERTY_MANAGEMENT)?)?;
        match action {
            NameAction::Create { name } => {
                pm.create_name(&fabric_name(&name)?, self.timeout).await?;
                println!("created {name}");
            }
            NameAction::Exists { name } => {
                let exists = pm.name_exists(&fabric_name(&name)?, self.timeout).await?;
                println!("{exists}");
            }
            NameAction::Delete { name } => {
                pm.delete_name(&fabric_name(&name)?, self.timeout).await?;
                println!("deleted {name}");
            }
            NameAction::List { name, recursive } => {
                let mut request = EnumerateSubNamesRequest {
                    name: fabric_name(&name)?,
                    recursive,
                    continuation: None,
                    max_results: None,
                };
                loop {
                    let page = pm.enumerate_sub_names(&request, self.timeout).await?;
                    for sub_name in page.names() {
                        println!("{sub_name}");
                    }
                    match page.continuation() {
                        Some(token) => request.continuation = Some(token.to_string()),
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    async fn properties(&self, action: PropertyAction) -> anyhow::Result<()> {
        let pm = self
            .client
            .property_management(self.version_for(subsystem::PROPERTY_MANAGEMENT)?)?;
        match action {
            PropertyAction::Put {
                name,
                property,
                value,
                kind,
                create_name,
            } => {
                let name = fabric_name(&name)?;
                if create_name && !pm.name_exists(&name, self.timeout).await? {
                    pm.create_name(&name, self.timeout).await?;
                }
                pm.put_property(&name, &property_name(&property)?, kind.parse(&value)?, self.timeout)
                    .await?;
                println!("{name}/{property} = {value}");
            }
            PropertyAction::Get { name, property } => {
                let result = pm
                    .get_property(&fabric_name(&name)?, &property_name(&property)?, self.timeout)
                    .await?;
                let metadata = result.metadata();
                println!(
                    "{} ({}, {} bytes, seq {})",
                    result.value(),
                    metadata.type_id,
                    metadata.value_size,
                    metadata.sequence_number
                );
            }
        }
        Ok(())
    }

    async fn nodes(&self) -> anyhow::Result<()> {
        let query = self.client.query(self.version_for(subsystem::QUERY)?)?;
        let list = query
            .get_node_list(&NodeQueryRequest::default(), self.timeout)
            .await?;
        for node in list.nodes() {
            println!(
                "{:<10} {:<10} {:?} seed={} health={:?}",
                node.name, node.node_type, node.status, node.is_seed, node.health_state
            );
        }
        Ok(())
    }

    async fn health(&self, node: Option<String>) -> anyhow::Result<()> {
        let health = self.client.health(self.version_for(subsystem::HEALTH)?)?;
        match node {
            Some(node) => {
                let node_name = NodeName::new(node).context("node name must not be empty")?;
                let result = health.get_node_health(&node_name, self.timeout).await?;
                println!("{}: {:?}", result.node_name(), result.aggregated_state());
                for event in result.events() {
                    println!("  {}/{} {:?} {}", event.source_id, event.property, event.state, event.description);
                }
            }
            None => {
                let result = health.get_cluster_health(self.timeout).await?;
                println!("cluster: {:?}", result.aggregated_state());
                for node in result.node_states() {
                    println!("  {:<10} {:?}", node.node_name, node.aggregated_state);
                }
            }
        }
        Ok(())
    }
}

fn fabric_name(raw: &str) -> anyhow::Result<FabricName> {
    FabricName::new(raw)
        .with_context(|| format!("'{raw}' is not a fabric name (expected {}...)", FabricName::SCHEME))
}

fn property_name(raw: &str) -> anyhow::Result<PropertyName> {
    PropertyName::new(raw).context("property name must not be empty")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "fabric-client",
            "names",
            "create",
            "fabric:/app",
            "--timeout-ms",
            "250",
            "--interface-version",
            "1",
        ])
        .unwrap();
        assert_eq!(cli.timeout_ms, Some(250));
        assert_eq!(cli.interface_version, Some(1));
        assert!(matches!(
            cli.command,
            Command::Names {
                action: NameAction::Create { .. }
            }
        ));
    }

    #[test]
    fn test_value_kinds_parse() {
        assert_eq!(ValueKind::Int64.parse("42").unwrap(), PropertyValue::Int64(42));
        assert!(ValueKind::Double.parse("abc").is_err());
        assert_eq!(
            ValueKind::String.parse("x").unwrap(),
            PropertyValue::String("x".into())
        );
    }

    #[test]
    fn test_fabric_name_requires_scheme() {
        assert!(fabric_name("fabric:/a").is_ok());
        assert!(fabric_name("/a").is_err());
    }

    #[tokio::test]
    async fn test_session_runs_against_local_engine() {
        let client = FabricClient::builder()
            .local()
            .connect(Arc::new(LocalEngine::new()))
            .unwrap();
        let session = Session {
            client,
            timeout: Timeout::from_millis(1_000),
            version: None,
        };
        session
            .run(Command::Properties {
                action: PropertyAction::Put {
                    name: "fabric:/app".into(),
                    property: "replicas".into(),
                    value: "3".into(),
                    kind: ValueKind::Int64,
                    create_name: true,
                },
            })
            .await
            .unwrap();
        session.run(Command::Nodes).await.unwrap();
        session.run(Command::Health { node: None }).await.unwrap();
        assert!(session
            .run(Command::Names {
                action: NameAction::Delete {
                    name: "fabric:/missing".into()
                }
            })
            .await
            .is_err());
    }
}
