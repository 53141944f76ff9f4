use anyhow::Result;
use clap::{Parser, Subcommand};
use pastor_core::{Config, GeminiClient, Orchestrator, Outcome};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;

#[derive(Parser)]
#[command(name = "pastor")]
#[command(about = "Ask the AI Pastor your questions, answered with a parable")]
#[command(version)]
struct Cli {
    /// Gemini model to use (overrides config and PASTOR_MODEL)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Path to a config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where the chat screen writes its log
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Include this many earlier messages in each prompt
    #[arg(long, global = true)]
    history: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Ask a single question and print the answer
    Ask {
        /// Your question
        question: String,
    },
    /// List known Gemini models
    Models {
        /// Save this model as the default
        #[arg(long)]
        set: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let log_path = match cli.log_file {
                Some(path) => path,
                None => logging::default_log_path()?,
            };
            logging::init_file(&log_path)?;
            run_chat(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ask { question } => {
            logging::init_stderr()?;
            Ok(ask(&config, &question).await)
        }
        Commands::Models { set } => {
            list_models(&config, set.as_deref(), cli.config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?.with_env_overrides(|name| std::env::var(name).ok()),
        None => Config::load()?,
    };

    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(turns) = cli.history {
        config.history_turns = turns;
    }
    Ok(config)
}

async fn run_chat(config: &Config) -> Result<()> {
    info!(model = %config.model, "starting chat");
    let mut app = App::new(Orchestrator::from_config(config));

    tui::install_panic_hook();
    let mut guard = tui::TerminalGuard::enter()?;
    let mut events = tui::EventHandler::new();

    while !app.should_quit {
        guard.terminal().draw(|frame| ui::render(&mut app, frame))?;
        if let Some(event) = events.next().await {
            handler::handle_event(&mut app, event).await;
        }
    }

    Ok(())
}

async fn ask(config: &Config, question: &str) -> ExitCode {
    let mut orchestrator = Orchestrator::from_config(config);

    match orchestrator.submit(question).await {
        Outcome::Answered(_) => {
            if let Some(reply) = orchestrator.conversation().last() {
                println!("{}", reply.text());
            }
            ExitCode::SUCCESS
        }
        Outcome::Ignored | Outcome::Busy => ExitCode::SUCCESS,
        // Already logged by the orchestrator
        Outcome::Failed(_) => ExitCode::FAILURE,
    }
}

fn list_models(config: &Config, set: Option<&str>, config_path: Option<&Path>) -> Result<()> {
    if let Some(model) = set {
        match config_path {
            Some(path) => {
                let mut file_config = Config::load_from(path)?;
                file_config.model = model.to_string();
                file_config.save_to(path)?;
            }
            None => Config::save_default_model(model)?,
        }
        println!("Default model set to {}", model);
        return Ok(());
    }

    for model in GeminiClient::list_models() {
        let marker = if model == config.model { "*" } else { " " };
        println!("{} {}", marker, model);
    }
    Ok(())
}
