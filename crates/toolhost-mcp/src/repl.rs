//! Interactive client REPL.
//!
//! Launch with `toolhost repl`, then `/connect <target>` to reach a host.
//! Type `/help` for available commands, Tab for completion.

use std::time::Duration;

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use serde_json::Value;
use tokio::runtime::Handle;

use toolhost::{CapabilityKind, InvocationResult};

use crate::client::ClientSession;
use crate::config::{resolve_timeout, TransportConfig};

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/connect", "Connect to a host (stdio:<cmd>, http://…, sse+http://…)"),
    ("/tools", "List the host's tools"),
    ("/resources", "List resources and resource templates"),
    ("/prompts", "List prompts"),
    ("/call", "Invoke a tool: /call <name> [json]"),
    ("/read", "Read a resource: /read <uri>"),
    ("/prompt", "Render a prompt: /prompt <name> [json]"),
    ("/info", "Show the connected server"),
    ("/close", "Close the current session"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

#[derive(Default)]
struct ClientHelper;

impl Completer for ClientHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for ClientHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for ClientHelper {}
impl Validator for ClientHelper {}
impl Helper for ClientHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

struct ReplState {
    runtime: Handle,
    timeout: Duration,
    session: Option<ClientSession>,
    target: Option<String>,
}

impl ReplState {
    fn session(&self) -> Option<&ClientSession> {
        if self.session.is_none() {
            eprintln!("  Not connected. Use /connect <target> first.");
        }
        self.session.as_ref()
    }
}

/// Run the interactive REPL. Must be called off the async runtime's worker
/// threads (e.g. from `spawn_blocking`); `runtime` drives the client.
pub fn run(runtime: Handle) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mtoolhost v{}\x1b[0m \x1b[90m\u{2014} MCP client\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<ClientHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(ClientHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".toolhost_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mut state = ReplState {
        runtime,
        timeout: resolve_timeout(None),
        session: None,
        target: None,
    };
    let prompt = " \x1b[36mtoolhost>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let mut parts = input.splitn(2, ' ');
                let cmd = parts.next().unwrap_or("");
                let args = parts.next().unwrap_or("").trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "connect" => cmd_connect(args, &mut state),
                    "tools" => cmd_list(CapabilityKind::Tool, &state),
                    "resources" => cmd_list(CapabilityKind::Resource, &state),
                    "prompts" => cmd_list(CapabilityKind::Prompt, &state),
                    "call" => cmd_invoke(CapabilityKind::Tool, args, &state),
                    "read" => cmd_invoke(CapabilityKind::Resource, args, &state),
                    "prompt" => cmd_invoke(CapabilityKind::Prompt, args, &state),
                    "info" => cmd_info(&state),
                    "close" => cmd_close(&mut state),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    cmd_close(&mut state);

    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or(std::path::Path::new(".")));
    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Arguments are a JSON object, e.g. /call echo {{\"text\":\"hi\"}}");
    eprintln!();
}

fn cmd_connect(args: &str, state: &mut ReplState) {
    if args.is_empty() {
        eprintln!("  Usage: /connect <stdio:cmd … | http://… | sse+http://…>");
        return;
    }
    let config = match TransportConfig::parse(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("  {e}");
            return;
        }
    };

    cmd_close(state);
    match state
        .runtime
        .block_on(ClientSession::open(&config, state.timeout))
    {
        Ok(session) => {
            if let Some(info) = session.server_info() {
                eprintln!(
                    "  Connected to {} v{} (protocol {})",
                    info.server_info.name, info.server_info.version, info.protocol_version
                );
            }
            state.session = Some(session);
            state.target = Some(config.to_string());
        }
        Err(e) => eprintln!("  Connection failed: {e}"),
    }
}

fn cmd_close(state: &mut ReplState) {
    if let Some(session) = state.session.take() {
        if let Err(e) = state.runtime.block_on(session.close()) {
            eprintln!("  Close failed: {e}");
        }
        if let Some(target) = state.target.take() {
            eprintln!("  Disconnected from {target}");
        }
    }
}

fn cmd_info(state: &ReplState) {
    let Some(session) = state.session() else {
        return;
    };
    let Some(info) = session.server_info() else {
        return;
    };
    eprintln!();
    eprintln!("  Target:   {}", state.target.as_deref().unwrap_or("?"));
    eprintln!(
        "  Server:   {} v{}",
        info.server_info.name, info.server_info.version
    );
    eprintln!("  Protocol: {}", info.protocol_version);
    if let Some(catalog) = session.catalog() {
        eprintln!("  Tools:     {}", catalog.tools.len());
        eprintln!(
            "  Resources: {}",
            catalog.resources.len() + catalog.resource_templates.len()
        );
        eprintln!("  Prompts:   {}", catalog.prompts.len());
    }
    if let Some(instructions) = &info.instructions {
        eprintln!();
        eprintln!("  {instructions}");
    }
    eprintln!();
}

fn cmd_list(kind: CapabilityKind, state: &ReplState) {
    let Some(session) = state.session() else {
        return;
    };
    match state.runtime.block_on(session.list_capabilities(kind)) {
        Ok(descriptors) => {
            eprintln!();
            eprintln!("  {} {kind}s:", descriptors.len());
            eprintln!();
            for d in &descriptors {
                let name = match &d.uri_template {
                    Some(template) => template.to_string(),
                    None => d.name.clone(),
                };
                eprintln!("    {name:<28} {}", d.description);
            }
            eprintln!();
        }
        Err(e) => eprintln!("  Listing failed: {e}"),
    }
}

fn cmd_invoke(kind: CapabilityKind, args: &str, state: &ReplState) {
    let Some(session) = state.session() else {
        return;
    };
    let mut parts = args.splitn(2, ' ');
    let name = parts.next().unwrap_or("");
    if name.is_empty() {
        eprintln!("  Usage: /{} <name> [json]", verb(kind));
        return;
    }
    let arguments = match parts.next().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                eprintln!("  Arguments are not valid JSON: {e}");
                return;
            }
        },
        None => None,
    };

    match state.runtime.block_on(session.invoke(kind, name, arguments)) {
        Ok(InvocationResult::Success { payload }) => {
            let rendered = match &payload {
                Value::String(s) => s.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
            };
            eprintln!();
            for line in rendered.lines() {
                eprintln!("  {line}");
            }
            eprintln!();
        }
        Ok(InvocationResult::Failure(failure)) => eprintln!("  \x1b[31m{failure}\x1b[0m"),
        Err(e) => eprintln!("  Transport error: {e}"),
    }
}

fn verb(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Tool => "call",
        CapabilityKind::Resource => "read",
        CapabilityKind::Prompt => "prompt",
    }
}
