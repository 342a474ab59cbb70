//! toolhost — entry point.

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use toolhost::{CapabilityKind, Dispatcher, InvocationResult};
use toolhost_mcp::capabilities::build_registry;
use toolhost_mcp::config::{resolve_timeout, TransportConfig};
use toolhost_mcp::protocol::convert;
use toolhost_mcp::session::Session;
use toolhost_mcp::types::InitializeResult;
use toolhost_mcp::ClientSession;

#[derive(Parser)]
#[command(
    name = "toolhost",
    about = "MCP capability host — serve tools, resources, and prompts, or talk to a host as a client",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Client request deadline in seconds (also TOOLHOST_TIMEOUT_SECS).
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the host over stdio (default).
    Serve,

    /// Start the host over streaming HTTP (/mcp) and SSE (/sse).
    #[cfg(feature = "http")]
    ServeHttp {
        /// Listen address (host:port). Also reads TOOLHOST_ADDR.
        #[arg(long)]
        addr: Option<String>,

        /// Seconds an idle session is kept. Also reads TOOLHOST_SESSION_TTL_SECS.
        #[arg(long)]
        session_ttl: Option<u64>,
    },

    /// Print server capabilities and the catalog as JSON.
    Info,

    /// Connect to a host and print what it advertises.
    ///
    /// Targets: stdio:<command> [args…], http(s)://host/mcp, sse+http(s)://host/sse
    List {
        target: String,
    },

    /// Connect to a host and invoke one capability.
    ///
    /// Examples:
    ///   toolhost call "stdio:toolhost serve" tool echo '{"text":"hi"}'
    ///   toolhost call http://127.0.0.1:8000/mcp resource echo://hello
    Call {
        target: String,
        /// tool, resource, or prompt.
        kind: CapabilityKind,
        /// Capability name (a URI for resources).
        name: String,
        /// Arguments as a JSON object.
        arguments: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   toolhost completions bash > ~/.local/share/bash-completion/completions/toolhost
    ///   toolhost completions zsh > ~/.zfunc/_toolhost
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch the interactive client REPL.
    Repl,
}

fn dispatcher() -> anyhow::Result<Dispatcher> {
    let registry = build_registry(None)?;
    Ok(Dispatcher::new(Arc::new(registry)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let timeout = resolve_timeout(cli.timeout);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            #[cfg(feature = "stdio")]
            {
                let transport = Arc::new(toolhost_mcp::StdioTransport::stdio());
                Session::new(dispatcher()?).serve(transport).await?;
            }
            #[cfg(not(feature = "stdio"))]
            anyhow::bail!("this build has no stdio binding");
        }

        #[cfg(feature = "http")]
        Commands::ServeHttp { addr, session_ttl } => {
            let addr = toolhost_mcp::resolve_bind_addr(addr.as_deref());
            let server = toolhost_mcp::HttpServer::new(dispatcher()?)
                .with_session_ttl(toolhost_mcp::resolve_session_ttl(session_ttl));
            server.run(&addr).await?;
        }

        Commands::Info => {
            let dispatcher = dispatcher()?;
            let result = InitializeResult::with_catalog(convert::catalog(dispatcher.registry()));
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::List { target } => {
            let config = TransportConfig::parse(&target)?;
            let session = ClientSession::open(&config, timeout).await?;

            for kind in CapabilityKind::ALL {
                let descriptors = session.list_capabilities(kind).await?;
                println!("{kind}s ({}):", descriptors.len());
                for d in &descriptors {
                    let name = match &d.uri_template {
                        Some(template) => template.to_string(),
                        None => d.name.clone(),
                    };
                    println!("  {name:<28} {}", d.description);
                }
            }
            session.close().await?;
        }

        Commands::Call {
            target,
            kind,
            name,
            arguments,
        } => {
            let arguments = arguments
                .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
                .transpose()?;
            let config = TransportConfig::parse(&target)?;
            let session = ClientSession::open(&config, timeout).await?;
            let result = session.invoke(kind, &name, arguments).await;
            session.close().await?;

            match result? {
                InvocationResult::Success { payload } => {
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                }
                InvocationResult::Failure(failure) => {
                    eprintln!("{failure}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "toolhost", &mut std::io::stdout());
        }

        Commands::Repl => {
            let handle = tokio::runtime::Handle::current();
            tokio::task::spawn_blocking(move || toolhost_mcp::repl::run(handle)).await??;
        }
    }

    Ok(())
}
