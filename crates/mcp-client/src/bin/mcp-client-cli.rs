//! Reference CLI for `mcp-client` (spec.md §6: "none mandated by the core...
//! a reference binary may expose `connect`, `list-tools`, `call-tool`,
//! `ping`, `cleanup`; exit codes 0 on success, 1 on any error").
//!
//! Connects to a single server via [`mcp_client::config::quick_connect`] and
//! runs one subcommand against it. Not meant as a full agent host — just
//! enough surface to poke a server from a shell.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mcp_client::config::quick_connect;
use mcp_client::{ClientBuilder, ServerSelector};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcp-client-cli", about = "Reference CLI for the mcp-client library")]
struct Cli {
    /// Connect target: a stdio command line, a `stdio://` URI, or an
    /// `http(s)://` URL (see `quick_connect`'s target grammar).
    #[arg(long, env = "MCP_SERVER")]
    server: String,

    /// Name this server is registered under.
    #[arg(long, default_value = "default")]
    name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and print the negotiated server name.
    Connect,
    /// List tools available on the server.
    ListTools,
    /// Call a tool by name with JSON-encoded arguments.
    CallTool {
        tool: String,
        #[arg(long, default_value = "{}")]
        arguments: String,
    },
    /// Send a liveness ping.
    Ping,
    /// Connect then immediately tear the connection down.
    Cleanup,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = quick_connect(cli.name.clone(), &cli.server)?;
    let client = ClientBuilder::new().add_server(config).build().await?;
    let selector = ServerSelector::Name(cli.name.clone());

    let result: anyhow::Result<()> = async {
        match cli.command {
            Command::Connect => {
                let names = client.server_names().await;
                println!("connected: {}", names.join(", "));
            }
            Command::ListTools => {
                let tools = client.list_tools(true).await?;
                println!("{}", serde_json::to_string_pretty(&tools)?);
            }
            Command::CallTool { tool, arguments } => {
                let arguments: serde_json::Value = serde_json::from_str(&arguments)?;
                let result = client.call_tool(&tool, arguments, Some(selector), None).await?;
                println!("{}", serde_json::to_string_pretty(&result.content)?);
            }
            Command::Ping => {
                client.ping(selector).await?;
                println!("pong");
            }
            Command::Cleanup => {
                println!("cleaned up");
            }
        }
        Ok(())
    }
    .await;

    // `shutdown` is idempotent (spec.md §5), so cleanup always runs on the
    // way out regardless of which subcommand was requested or whether it
    // succeeded.
    client.shutdown().await;
    result
}
