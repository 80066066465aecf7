//! `praxis` command-line interface.
//!
//! Every command works against an explicit base directory holding the
//! workspace registry; the selected workspace is remembered in
//! `<base>/current_workspace` between invocations.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::Value;

use praxis::agents::AgentSettings;
use praxis::chat::ChatSession;
use praxis::core::cancel::CancelToken;
use praxis::exit_codes;
use praxis::io::config::{PraxisConfig, config_path, load_config, write_config};
use praxis::io::generator::{CommandGenerator, RetryingGenerator};
use praxis::io::records::{list_chats, list_run_logs, load_chat};
use praxis::io::workspace_store::{Session, WorkspaceStore};
use praxis::looping::LoopEvent;
use praxis::objective::{RunStatus, run_objective};

const BASE_DIR_NAME: &str = "PraxisWorkspaces";
const CHAT_EXIT_COMMAND: &str = "exit";

#[derive(Parser)]
#[command(name = "praxis", version, about = "Multi-agent task-decomposition runner")]
struct Cli {
    /// Directory holding the workspace registry and all workspaces.
    #[arg(long, env = "PRAXIS_HOME", global = true)]
    base_path: Option<PathBuf>,

    /// Workspace to use instead of the current one.
    #[arg(long, env = "PRAXIS_WORKSPACE", global = true)]
    workspace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the base directory and `praxis.toml` if missing.
    Init {
        /// Overwrite an existing config with defaults.
        #[arg(short, long)]
        force: bool,
    },
    /// Manage workspaces.
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
    /// Run an objective in the selected workspace.
    Run {
        objective: String,
        /// Override `max_iterations` from the config.
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Chat on stdin; `exit` ends the session and saves it.
    Chat {
        /// Title of the saved chat.
        #[arg(long, default_value = "chat")]
        title: String,
    },
    /// Saved chats of the selected workspace.
    #[command(subcommand)]
    Chats(ChatsCommand),
    /// Run logs of the selected workspace.
    #[command(subcommand)]
    Logs(LogsCommand),
}

#[derive(Subcommand)]
enum WorkspaceCommand {
    /// Create a workspace and select it.
    Create {
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Also create the standard folder layout.
        #[arg(long)]
        scaffold: bool,
    },
    List,
    Select {
        title: String,
    },
    /// Delete a workspace and its directory tree.
    Delete {
        title: String,
    },
    /// Print the path of a workspace (default: the selected one).
    Path {
        title: Option<String>,
    },
    /// Print the selected workspace.
    Current,
    /// Store an extra key on the selected workspace; VALUE is JSON or a string.
    Set {
        key: String,
        value: String,
    },
    /// Create the standard folder layout in the selected workspace.
    Scaffold,
    /// Create a folder inside the selected workspace.
    Mkdir {
        folder: String,
    },
}

#[derive(Subcommand)]
enum ChatsCommand {
    List,
    Show { title: String },
}

#[derive(Subcommand)]
enum LogsCommand {
    List,
}

fn main() {
    praxis::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let base_path = match cli.base_path {
        Some(path) => path,
        None => default_base_path()?,
    };
    let workspace = cli.workspace.as_deref();
    match cli.command {
        Command::Init { force } => cmd_init(base_path, force),
        Command::Workspace(command) => cmd_workspace(base_path, workspace, command),
        Command::Run {
            objective,
            max_iterations,
        } => cmd_run(base_path, workspace, &objective, max_iterations),
        Command::Chat { title } => cmd_chat(base_path, workspace, &title),
        Command::Chats(command) => cmd_chats(base_path, workspace, command),
        Command::Logs(LogsCommand::List) => {
            let session = open_session(base_path)?;
            for name in list_run_logs(&session.resolve(workspace)?)? {
                println!("{name}");
            }
            Ok(exit_codes::OK)
        }
    }
}

/// `<desktop or home>/PraxisWorkspaces`.
fn default_base_path() -> Result<PathBuf> {
    dirs::desktop_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join(BASE_DIR_NAME))
        .ok_or_else(|| anyhow!("cannot determine a home directory; pass --base-path"))
}

fn open_session(base_path: PathBuf) -> Result<Session> {
    let store = WorkspaceStore::open(base_path)?;
    Ok(Session::persistent(store)?)
}

fn load_base_config(session: &Session) -> Result<PraxisConfig> {
    load_config(&config_path(session.store().base_path()))
}

fn cmd_init(base_path: PathBuf, force: bool) -> Result<i32> {
    let store = WorkspaceStore::open(base_path)?;
    let path = config_path(store.base_path());
    if force || !path.exists() {
        write_config(&path, &PraxisConfig::default())?;
    }
    println!("{}", store.base_path().display());
    Ok(exit_codes::OK)
}

fn cmd_workspace(base_path: PathBuf, workspace: Option<&str>, command: WorkspaceCommand) -> Result<i32> {
    let mut session = open_session(base_path)?;
    match command {
        WorkspaceCommand::Create {
            title,
            description,
            scaffold,
        } => {
            let scope = session.create(&title, &description)?;
            if scaffold {
                session.store().initialize_structure(&title)?;
            }
            println!("{}", scope.path.display());
        }
        WorkspaceCommand::List => {
            for summary in session.store().list() {
                let marker = if session.current() == Some(summary.title.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}\t{}", summary.title, summary.description);
            }
        }
        WorkspaceCommand::Select { title } => {
            let scope = session.select(&title)?;
            println!("{}", scope.path.display());
        }
        WorkspaceCommand::Delete { title } => {
            session.delete(&title)?;
            println!("deleted {title}");
        }
        WorkspaceCommand::Path { title } => {
            let scope = session.resolve(title.as_deref().or(workspace))?;
            println!("{}", scope.path.display());
        }
        WorkspaceCommand::Current => match session.current() {
            Some(title) => println!("{title}"),
            None => println!("(none)"),
        },
        WorkspaceCommand::Set { key, value } => {
            let scope = session.resolve(workspace)?;
            let value = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            session.store_mut().update_state(&scope.title, &key, value)?;
        }
        WorkspaceCommand::Scaffold => {
            let scope = session.resolve(workspace)?;
            session.store().initialize_structure(&scope.title)?;
        }
        WorkspaceCommand::Mkdir { folder } => {
            let scope = session.resolve(workspace)?;
            let path = session.store().create_folder(&scope.title, &folder)?;
            println!("{}", path.display());
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_run(
    base_path: PathBuf,
    workspace: Option<&str>,
    objective: &str,
    max_iterations: Option<u32>,
) -> Result<i32> {
    let session = open_session(base_path)?;
    let scope = session.resolve(workspace)?;
    let mut config = load_base_config(&session)?;
    if let Some(max_iterations) = max_iterations {
        config.max_iterations = max_iterations;
        config.validate()?;
    }
    let generator = RetryingGenerator::new(CommandGenerator::new(config.agents.clone()), &config.retry);

    let report = run_objective(
        &generator,
        &scope,
        objective,
        &config,
        &CancelToken::new(),
        print_event,
    )?;

    if let Some(output) = &report.refined_output {
        println!("\n{output}");
    }
    if let Some(materialized) = &report.materialized {
        println!("project: {}", materialized.project_root.display());
        for warning in &materialized.warnings {
            eprintln!("warning: {warning}");
        }
        for error in &materialized.errors {
            eprintln!("error: {error}");
        }
    }
    for problem in &report.problems {
        eprintln!("warning: {problem}");
    }
    if let Some(path) = &report.log_path {
        println!("run log: {}", path.display());
    }
    Ok(match report.status {
        RunStatus::Complete => exit_codes::OK,
        RunStatus::Incomplete => {
            eprintln!("run stopped after {} iterations without completing", config.max_iterations);
            exit_codes::INCOMPLETE
        }
        RunStatus::Cancelled => exit_codes::CANCELLED,
    })
}

fn print_event(event: &LoopEvent) {
    match event {
        LoopEvent::Started { run_id } => println!("run {run_id}"),
        LoopEvent::OrchestratorReplied { iteration, complete } => {
            if *complete {
                println!("[{iteration}] orchestrator: objective complete");
            }
        }
        LoopEvent::TaskStarted { iteration, task } => {
            println!("[{iteration}] task: {}", task.description);
        }
        LoopEvent::TaskCompleted { iteration, .. } => println!("[{iteration}] task completed"),
        LoopEvent::Refined { bytes } => println!("refined output: {bytes} bytes"),
    }
}

/// Interactive chat over stdin. Agent failures are reported per line and the
/// transcript collected so far is still saved.
fn cmd_chat(base_path: PathBuf, workspace: Option<&str>, title: &str) -> Result<i32> {
    let mut session = match workspace {
        // An explicit workspace applies to this chat only; the shared pointer
        // is left alone.
        Some(workspace) => {
            let mut session = Session::new(WorkspaceStore::open(base_path)?);
            session.select(workspace)?;
            session
        }
        None => open_session(base_path)?,
    };
    let config = load_base_config(&session)?;
    let generator = RetryingGenerator::new(CommandGenerator::new(config.agents.clone()), &config.retry);
    let mut chat = ChatSession::new(&session, AgentSettings::from_config(&config));

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut failed = false;
    for line in stdin.lock().lines() {
        let line = line.context("read stdin")?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case(CHAT_EXIT_COMMAND) {
            break;
        }
        let turn = match chat.send(&mut session, &generator, input) {
            Ok(turn) => turn,
            Err(err) => {
                eprintln!("error: {err:#}");
                failed = true;
                continue;
            }
        };
        writeln!(stdout, "Praxis: {}", turn.reply).context("write stdout")?;
        for result in &turn.tool_results {
            writeln!(stdout, "  {}", result.render()).context("write stdout")?;
        }
        if let Some(follow_up) = &turn.follow_up {
            writeln!(stdout, "Praxis: {follow_up}").context("write stdout")?;
        }
    }

    if !chat.transcript().is_empty() {
        match chat.save(title) {
            Ok(path) => println!("saved chat: {}", path.display()),
            Err(err) => eprintln!("chat not saved: {err:#}"),
        }
    }
    Ok(if failed { exit_codes::FAILED } else { exit_codes::OK })
}

fn cmd_chats(base_path: PathBuf, workspace: Option<&str>, command: ChatsCommand) -> Result<i32> {
    let session = open_session(base_path)?;
    let scope = session.resolve(workspace)?;
    match command {
        ChatsCommand::List => {
            for chat in list_chats(&scope)? {
                println!("{}\t{}", chat.saved_at.format("%Y-%m-%d %H:%M:%S"), chat.title);
            }
            Ok(exit_codes::OK)
        }
        ChatsCommand::Show { title } => match load_chat(&scope, &title)? {
            Some(contents) => {
                print!("{contents}");
                Ok(exit_codes::OK)
            }
            None => Err(anyhow!("no saved chat titled '{title}' in {}", scope.title)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["praxis", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_with_budget_and_globals() {
        let cli = Cli::parse_from([
            "praxis",
            "run",
            "Write a hello-world script",
            "--max-iterations",
            "4",
            "--workspace",
            "demo",
        ]);
        assert_eq!(cli.workspace.as_deref(), Some("demo"));
        match cli.command {
            Command::Run {
                objective,
                max_iterations,
            } => {
                assert_eq!(objective, "Write a hello-world script");
                assert_eq!(max_iterations, Some(4));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_workspace_create() {
        let cli = Cli::parse_from(["praxis", "workspace", "create", "notes", "-d", "my notes"]);
        assert!(matches!(
            cli.command,
            Command::Workspace(WorkspaceCommand::Create { ref title, ref description, scaffold: false })
                if title == "notes" && description == "my notes"
        ));
    }
}
