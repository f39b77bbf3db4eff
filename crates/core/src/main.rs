use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sa_core::agent_loop::AgentEvent;
use sa_core::boot::build_orchestrator;
use sa_core::cli::{load_config, Cli, Command, ConfigCommand};
use sa_core::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Chat { .. }) => {
            init_tracing();
            let (session, model) = match cli.command {
                Some(Command::Chat { session, model }) => (session, model),
                _ => ("cli:chat".to_string(), None),
            };
            let (config, _path) = load_config()?;
            let orchestrator = build_orchestrator(config).await?;
            chat(orchestrator, session, model).await
        }
        Some(Command::Run { message, session, model }) => {
            init_tracing();
            let (config, _path) = load_config()?;
            let orchestrator = build_orchestrator(config).await?;
            run_once(orchestrator, &session, message, model).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = load_config()?;
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues.iter().any(|i| i.severity == sa_domain::config::ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("{config_path}: OK");
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _path) = load_config()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("serialagent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sa_core=debug")))
        .json()
        .init();
}

/// Send a single message and print the streamed response to stdout.
async fn run_once(
    orchestrator: Arc<Orchestrator>,
    session: &str,
    message: String,
    model: Option<String>,
) -> anyhow::Result<()> {
    let mut rx = orchestrator.process_input(session, message, model, Vec::new());
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::ResponseChunk { text } => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            AgentEvent::Error { message } => {
                eprintln!("error: {message}");
            }
            AgentEvent::ResponseComplete { .. } => {
                println!();
            }
            _ => {}
        }
    }
    Ok(())
}

/// Interactive chat REPL: readline loop with slash commands for session and
/// model switching, streaming each turn's events to stdout/stderr.
async fn chat(orchestrator: Arc<Orchestrator>, mut session: String, mut model: Option<String>) -> anyhow::Result<()> {
    let history_path = dirs::home_dir().unwrap_or_default().join(".serialagent").join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("SerialAgent interactive chat");
    eprintln!("Session: {session}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!();

    loop {
        let readline = rl.readline("you> ");
        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &mut session, &mut model, &orchestrator) {
                        break;
                    }
                    continue;
                }

                let mut rx = orchestrator.process_input(&session, trimmed.to_string(), model.clone(), Vec::new());
                while let Some(event) = rx.recv().await {
                    match event {
                        AgentEvent::ResponseChunk { text } => {
                            print!("{text}");
                            std::io::stdout().flush().ok();
                        }
                        AgentEvent::Thinking { content } => {
                            eprint!("\x1B[2m{content}\x1B[0m");
                            std::io::stderr().flush().ok();
                        }
                        AgentEvent::ToolCall { tool_name, .. } => {
                            eprintln!("\x1B[2m[tool: {tool_name}]\x1B[0m");
                        }
                        AgentEvent::ResponseComplete { .. } => {
                            println!();
                            println!();
                        }
                        AgentEvent::Error { message } => {
                            eprintln!("\x1B[31merror: {message}\x1B[0m");
                        }
                        _ => {}
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    eprintln!("Goodbye!");
    Ok(())
}

/// Process a slash command. Returns `true` if the REPL should exit.
fn handle_slash_command(input: &str, session: &mut String, model: &mut Option<String>, orchestrator: &Arc<Orchestrator>) -> bool {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim());

    match cmd {
        "/exit" | "/quit" => return true,

        "/session" => {
            if let Some(name) = arg.filter(|s| !s.is_empty()) {
                *session = name.to_string();
                eprintln!("Session switched to: {session}");
            } else {
                eprintln!("Current session: {session}");
            }
        }

        "/model" => {
            if let Some(name) = arg.filter(|s| !s.is_empty()) {
                *model = Some(name.to_string());
                eprintln!("Model set to: {name}");
            } else {
                eprintln!("Current model: {}", model.as_deref().unwrap_or("(default)"));
            }
        }

        "/clear" => {
            eprint!("\x1B[2J\x1B[1;1H");
        }

        "/stop" => {
            let stopped = orchestrator.stop_session(session);
            eprintln!("{}", if stopped { "Turn cancelled." } else { "No turn running." });
        }

        "/reset" => {
            orchestrator.close_session(session);
            let ts = chrono::Utc::now().timestamp();
            *session = format!("{session}:{ts}");
            eprintln!("Session reset. New session key: {session}");
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /session <name>  Switch to a named session");
            eprintln!("  /model <name>    Set the model (e.g. openai/gpt-4o)");
            eprintln!("  /stop            Cancel the current turn");
            eprintln!("  /reset           Start a fresh session");
            eprintln!("  /clear           Clear the screen");
            eprintln!("  /exit, /quit     Exit the chat");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}
