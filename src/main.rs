use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cua_agent::action::MouseButton;
use cua_agent::helper::HelperOutput;
use cua_agent::{Agent, ClaudeClient, HelperBackend, RunStatus, Settings};

#[derive(Parser)]
#[command(name = "cua-agent", about = "Vision-model driven computer use agent")]
struct Cli {
    /// Print single-action results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent loop until the task is done
    Run {
        /// Task to accomplish; prompted for when omitted
        task: Option<String>,
        #[arg(short = 'n', long, default_value_t = 15)]
        max_steps: usize,
        #[arg(short, long)]
        debug: bool,
    },
    /// Take a screenshot
    Screenshot {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Click at coordinates
    Click {
        x: i64,
        y: i64,
        #[arg(short, long, default_value = "left")]
        button: String,
        #[arg(long)]
        double: bool,
    },
    /// Type text
    Type { text: String },
    /// Press a key or shortcut such as cmd+s
    Key { shortcut: String },
    /// Scroll at a position by a signed delta
    Scroll {
        x: i64,
        y: i64,
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },
    /// Move the mouse
    Move { x: i64, y: i64 },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = matches!(cli.command, Command::Run { debug: true, .. });
    let default_filter = if debug { "cua_agent=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::resolve()?;
    let backend = HelperBackend::new(settings.helper())?;

    let out = match cli.command {
        Command::Run { task, max_steps, debug } => {
            let client = ClaudeClient::new(settings.claude()?)?;
            let task = match task {
                Some(t) => t,
                None => prompt_task()?,
            };
            let agent = Agent::new(backend, client, settings.agent(max_steps, debug));
            let outcome = agent.run(&task).await;
            return Ok(match outcome.status {
                RunStatus::Done => {
                    println!("Task complete: {}", outcome.reason.unwrap_or_default());
                    ExitCode::SUCCESS
                }
                RunStatus::Exhausted => {
                    println!("Step budget of {} exhausted before the task was done", max_steps);
                    ExitCode::from(2)
                }
                RunStatus::Failed => {
                    eprintln!("Run failed: {}", outcome.error.unwrap_or_default());
                    ExitCode::FAILURE
                }
            });
        }
        Command::Screenshot { output } => {
            let path = output.unwrap_or_else(|| std::env::temp_dir().join("screenshot.png"));
            let out = backend.invoke("screenshot", &[path.display().to_string()]).await;
            report(&out, &format!("Screenshot saved to: {}", path.display()), cli.json)
        }
        Command::Click { x, y, button, double } => {
            let Some(button) = MouseButton::parse(&button) else {
                bail!("unknown mouse button {button:?}");
            };
            let args = [x.to_string(), y.to_string(), button.to_string()];
            let mut out = backend.invoke("click", &args).await;
            if double && out.success {
                tokio::time::sleep(settings.double_click_delay).await;
                out = backend.invoke("click", &args).await;
            }
            report(&out, &format!("Clicked at ({x}, {y})"), cli.json)
        }
        Command::Type { text } => {
            let out = backend.invoke("type", &[text.clone()]).await;
            report(&out, &format!("Typed: {}", cua_agent::executor::preview(&text, 50)), cli.json)
        }
        Command::Key { shortcut } => {
            let combo = cua_agent::action::normalize_key_combo(&shortcut);
            let out = backend.invoke("key", &[combo]).await;
            report(&out, &format!("Pressed: {shortcut}"), cli.json)
        }
        Command::Scroll { x, y, delta } => {
            let out = backend.invoke("scroll", &[x.to_string(), y.to_string(), delta.to_string()]).await;
            report(&out, &format!("Scrolled at ({x}, {y}) by {delta}"), cli.json)
        }
        Command::Move { x, y } => {
            let out = backend.invoke("move", &[x.to_string(), y.to_string()]).await;
            report(&out, &format!("Moved to ({x}, {y})"), cli.json)
        }
    };
    Ok(out)
}

fn report(out: &HelperOutput, ok_message: &str, json: bool) -> ExitCode {
    if json {
        println!("{}", serde_json::to_string(out).unwrap_or_default());
    } else if out.success {
        println!("{ok_message}");
    } else {
        eprintln!("Failed: {}", out.stderr);
    }
    if out.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn prompt_task() -> Result<String> {
    print!("Enter task: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let task = line.trim().to_string();
    if task.is_empty() {
        bail!("no task given");
    }
    Ok(task)
}
