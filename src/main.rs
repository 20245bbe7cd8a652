use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::prelude::*;

use kubectl_query_core::core::client::session::ClusterSession;
use kubectl_query_core::core::config::{resolve, CallerInfo, ProcessEnv, ResolvedConnection, Settings};
use kubectl_query_core::core::discovery::disk_cache::CacheLayout;
use kubectl_query_core::domain::snapshot::{SnapshotKindName, SnapshotScope};

const REDACTED: &str = "<redacted>";

#[derive(Debug, Parser)]
#[command(name = "kubectl-query", version, about = "Read-only snapshots of a Kubernetes cluster")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Target {
    /// Provider settings as YAML or JSON; `-` reads stdin
    #[arg(long, default_value = "-")]
    settings: String,

    /// Directory holding the discovery cache instead of ~/.kube
    #[arg(long)]
    kube_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the resolved connection with secrets redacted
    Resolve {
        #[command(flatten)]
        target: Target,
    },
    /// Capture a snapshot and print the record as JSON
    Capture {
        #[arg(value_parser = parse_kind)]
        kind: SnapshotKindName,
        #[command(flatten)]
        target: Target,
        #[arg(short, long, default_value = "default")]
        namespace: String,
        /// Opaque key=value pairs echoed on the record
        #[arg(long = "trigger", value_parser = parse_trigger)]
        triggers: Vec<(String, String)>,
    },
    /// Print the REST mapping for a kind, resource name or short name
    Mapping {
        name: String,
        #[command(flatten)]
        target: Target,
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

fn parse_kind(s: &str) -> Result<SnapshotKindName, String> {
    s.parse().map_err(|e: kubectl_query_core::errors::ProviderError| e.to_string())
}

fn parse_trigger(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

fn init_logging(verbose: bool) -> tracing_appender::non_blocking::WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let default = if verbose {
        "kubectl_query_core=debug,kubectl_query=debug"
    } else {
        "kubectl_query_core=info,kubectl_query=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_target(false))
        .init();
    guard
}

fn read_settings(source: &str) -> Result<Settings> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read settings from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read settings file {source}"))?
    };
    let bag: Value = if raw.trim().is_empty() {
        json!({})
    } else {
        serde_yaml::from_str(&raw).context("settings are neither YAML nor JSON")?
    };
    Ok(Settings::from_bag(&bag, &ProcessEnv)?)
}

fn resolve_target(target: &Target) -> Result<(ResolvedConnection, Option<CacheLayout>)> {
    let settings = read_settings(&target.settings)?;
    let connection = resolve(&settings, &CallerInfo::default(), &ProcessEnv)?;
    let layout = target.kube_dir.as_deref().map(CacheLayout::under);
    Ok((connection, layout))
}

async fn open_session(target: &Target) -> Result<ClusterSession> {
    let (connection, layout) = resolve_target(target)?;
    let session = ClusterSession::connect(connection).await?;
    Ok(match layout {
        Some(layout) => session.with_cache_layout(layout),
        None => session,
    })
}

fn secret(present: bool) -> Value {
    if present {
        json!(REDACTED)
    } else {
        Value::Null
    }
}

fn redacted_connection(connection: &ResolvedConnection, layout: Option<&CacheLayout>) -> Value {
    let creds = &connection.credentials;
    let cache = layout.map(|l| {
        json!({
            "discovery_dir": l.discovery_dir_for(connection.host()),
            "http_cache_dir": l.http_cache_dir,
        })
    });
    json!({
        "host": creds.host,
        "username": creds.username,
        "password": secret(!creds.password.is_empty()),
        "token": secret(!creds.bearer_token.is_empty()),
        "client_certificate": secret(creds.has_client_certificate()),
        "client_key": secret(!creds.client_key.is_empty()),
        "cluster_ca_certificate": !creds.cluster_ca_certificate.is_empty(),
        "insecure": creds.insecure,
        "exec": creds.exec,
        "auth_provider": creds.auth_provider(),
        "credential_kinds": creds.credential_kinds(),
        "rate_limit": connection.rate_limit,
        "user_agent": connection.user_agent,
        "apply_retry_count": connection.apply_retry_count,
        "cache": cache,
    })
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose);
    debug!("{:?}", cli.command);

    match cli.command {
        Command::Resolve { target } => {
            let (connection, layout) = resolve_target(&target)?;
            let layout = match layout {
                Some(layout) => Some(layout),
                None => CacheLayout::user_default().ok(),
            };
            print_json(&redacted_connection(&connection, layout.as_ref()))?;
        }
        Command::Capture {
            kind,
            target,
            namespace,
            triggers,
        } => {
            let session = open_session(&target).await?;
            info!("Capturing {} from {}", kind, session.connection().host());
            let triggers: BTreeMap<String, String> = triggers.into_iter().collect();
            let record = kind
                .capture(&session, &SnapshotScope::namespace(namespace), triggers)
                .await?;
            print_json(&record)?;
        }
        Command::Mapping {
            name,
            target,
            namespace,
        } => {
            let session = open_session(&target).await?;
            let mut mapper = session.rest_mapper()?;
            let mapping = mapper.mapping_for(&name).await?;
            info!("Resolved '{}' to {}/{}", name, mapping.api_version(), mapping.kind);
            let path = mapping.rest_path(namespace.as_deref());
            print_json(&json!({ "mapping": mapping, "path": path }))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubectl_query_core::core::config::CredentialMaterial;

    #[test]
    fn trigger_needs_key_and_equals() {
        assert_eq!(parse_trigger("rev=3").unwrap(), ("rev".to_string(), "3".to_string()));
        assert_eq!(parse_trigger("note=a=b").unwrap().1, "a=b");
        assert!(parse_trigger("rev").is_err());
        assert!(parse_trigger("=3").is_err());
    }

    #[test]
    fn resolve_output_hides_secrets() {
        let connection = ResolvedConnection {
            credentials: CredentialMaterial {
                host: "https://10.0.0.1:6443".into(),
                bearer_token: "s3cr3t".into(),
                client_key: b"KEY".to_vec(),
                ..Default::default()
            },
            rate_limit: Default::default(),
            user_agent: "ua".into(),
            apply_retry_count: 1,
        };
        let layout = CacheLayout::under(std::path::Path::new("/tmp/kube"));
        let out = redacted_connection(&connection, Some(&layout)).to_string();

        assert!(!out.contains("s3cr3t"));
        assert!(!out.contains("KEY"));
        assert!(out.contains(REDACTED));
        assert!(out.contains("10.0.0.1_6443"));
    }

    #[test]
    fn cli_parses_capture() {
        let cli = Cli::try_parse_from([
            "kubectl-query",
            "capture",
            "server-version",
            "--settings",
            "s.yaml",
            "--trigger",
            "a=1",
        ])
        .unwrap();
        match cli.command {
            Command::Capture { kind, triggers, namespace, .. } => {
                assert_eq!(kind, SnapshotKindName::ServerVersion);
                assert_eq!(namespace, "default");
                assert_eq!(triggers.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
