//! `toolwire` binary: host the file tools or drive them as a client.

mod cli;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use cli::{Cli, ClientAction, ClientArgs, Command, ServeArgs};
use serde_json::{Value, json};
use toolwire::{
    client::{ConfirmationPolicy, ToolClient, ToolClientBuilder},
    host::ToolHost,
    server::{ToolServer, TransportMode},
    session::SessionConfig,
    tools::Sandbox,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Client(args) => client(args).await,
    }
}

fn base_dir(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => dirs::home_dir()
            .map(|home| home.join("toolwire-play"))
            .context("no --base-dir given and the home directory is unknown"),
    }
}

#[cfg(feature = "websocket")]
fn transport_mode(websocket: bool) -> anyhow::Result<TransportMode> {
    Ok(if websocket {
        TransportMode::WebSocket
    } else {
        TransportMode::Framed
    })
}

#[cfg(not(feature = "websocket"))]
fn transport_mode(websocket: bool) -> anyhow::Result<TransportMode> {
    if websocket {
        anyhow::bail!("built without the websocket feature");
    }
    Ok(TransportMode::Framed)
}

#[cfg(feature = "metrics")]
fn install_metrics(listen: Option<SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = listen {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        tracing::info!("serving metrics: addr={addr}");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(listen: Option<SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = listen {
        anyhow::bail!("built without the metrics feature; cannot serve metrics on {addr}");
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    install_metrics(args.metrics_listen)?;
    let base = base_dir(args.base_dir)?;
    let sandbox =
        Sandbox::open(&base).with_context(|| format!("preparing base directory {}", base.display()))?;
    tracing::info!("serving files: base_dir={}", sandbox.base().display());

    let host = ToolHost::new().with_file_tools(&sandbox);
    let config = SessionConfig::default().request_timeout(Duration::from_secs(args.request_timeout_secs));
    let server = ToolServer::new(Arc::new(host))
        .session_config(config)
        .transport_mode(transport_mode(args.websocket)?)
        .bind(SocketAddr::new(args.bind, args.port))?;
    server.run().await?;
    Ok(())
}

async fn connect(args: &ClientArgs) -> anyhow::Result<ToolClient> {
    let policy = if args.decline {
        ConfirmationPolicy::Decline
    } else {
        ConfirmationPolicy::Accept
    };
    let builder = ToolClientBuilder::new().confirmation(policy);
    if args.websocket {
        return connect_websocket(builder, args).await;
    }
    Ok(builder.connect((args.host.as_str(), args.port)).await?)
}

#[cfg(feature = "websocket")]
async fn connect_websocket(builder: ToolClientBuilder, args: &ClientArgs) -> anyhow::Result<ToolClient> {
    let url = format!("ws://{}:{}", args.host, args.port);
    Ok(builder.connect_websocket(&url).await?)
}

#[cfg(not(feature = "websocket"))]
async fn connect_websocket(_builder: ToolClientBuilder, _args: &ClientArgs) -> anyhow::Result<ToolClient> {
    anyhow::bail!("built without the websocket feature")
}

async fn client(args: ClientArgs) -> anyhow::Result<()> {
    let client = connect(&args).await?;
    let result = match args.action {
        ClientAction::Init => Ok(client.server_info().clone()),
        ClientAction::Tools => client.list_tools().await.map(|tools| {
            let lines: Vec<String> = tools
                .into_iter()
                .map(|t| format!("{}: {}", t.name, t.description))
                .collect();
            json!({ "content": lines.join("\n") })
        }),
        ClientAction::List { dir } => client.list_files(dir.as_deref().unwrap_or(".")).await,
        ClientAction::Read { path } => client.read_text(&path).await,
        ClientAction::Write {
            path,
            content,
            overwrite,
        } => client.write_text(&path, &content, overwrite).await,
        ClientAction::Delete { path, force } => client.delete_file(&path, force).await,
    };
    client.close().await;
    print_result(&result?)
}

fn print_result(value: &Value) -> anyhow::Result<()> {
    match value.get("content").and_then(Value::as_str) {
        Some(content) if value.get("status").is_none() => println!("{content}"),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
