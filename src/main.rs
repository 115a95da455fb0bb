use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::Shell;
use iocraft::prelude::*;
use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::{
    client::DocChatClient,
    config::{Config, DEFAULT_BASE_URL},
    controller::{ChatController, ControllerSettings, UiState},
    ui::{ConfigHeader, ErrorMessage, InputPrompt, SuccessMessage, TerminalView},
};

mod client;
mod config;
mod controller;
mod error;
mod mindmap;
mod rest_types;
mod serde_utils;
mod session;
mod ui;
mod upload;

#[cfg(test)]
mod tests;

#[derive(Parser)]
#[command(name = "docchat")]
#[command(version)]
#[command(about = "Chat with your documents, get study summaries and review suggestions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a document and have it processed
    Upload {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    /// Ask a question about the processed document
    Chat {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Generate a study summary and its mind map
    Summary {
        /// Save the mind map as SVG
        #[arg(short, long)]
        export: bool,
        /// Directory for the exported mind map
        #[arg(short, long, value_hint = ValueHint::DirPath)]
        out_dir: Option<PathBuf>,
    },
    /// Get review suggestions for the processed document
    Review,
    /// Start an interactive session
    Session {
        /// Upload this document before the first prompt
        #[arg(value_hint = ValueHint::FilePath)]
        file: Option<PathBuf>,
    },
    /// Configure docchat interactively
    Config,
    /// Store your API token in the OS keyring
    SetToken { token: String },
    /// Print shell completions
    Completions { shell: Shell },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    rt.block_on(async {
        match cli.command {
            Commands::Config => interactive_config().map(|_| ExitCode::SUCCESS),
            Commands::SetToken { token } => {
                config::set_api_token_keyring(token).map(|_| ExitCode::SUCCESS)
            }
            Commands::Completions { shell } => {
                clap_complete::generate(shell, &mut Cli::command(), "docchat", &mut io::stdout());
                Ok(ExitCode::SUCCESS)
            }
            needs_backend => {
                let config = config::read_config()?;
                run_action(needs_backend, config).await
            }
        }
    })
}

fn controller_for(config: &Config, initial_state: UiState) -> ChatController<TerminalView> {
    let client = DocChatClient::new(config.base_url.clone(), config.api_token.clone());
    let settings = ControllerSettings {
        policy: config.policy.clone(),
        initial_state,
        ..ControllerSettings::default()
    };
    ChatController::new(client, TerminalView::default(), settings)
}

/// Runs a command against the backend. Failures have already been printed by
/// the view, so they only change the exit code.
async fn run_action(command: Commands, config: Config) -> Result<ExitCode> {
    let outcome = match command {
        Commands::Upload { file } => controller_for(&config, UiState::Idle).upload(&file).await,
        Commands::Chat { message } => {
            controller_for(&config, UiState::DocumentLoaded)
                .send_message(&message.join(" "))
                .await
        }
        Commands::Summary { export, out_dir } => {
            let controller = controller_for(&config, UiState::DocumentLoaded);
            match controller.summary().await {
                Ok(()) if export => {
                    let dir = out_dir.unwrap_or_else(|| config.export_dir.clone());
                    if controller.export_mindmap(&dir).is_err() {
                        return Ok(ExitCode::FAILURE);
                    }
                    Ok(())
                }
                other => other,
            }
        }
        Commands::Review => controller_for(&config, UiState::DocumentLoaded).review().await,
        Commands::Session { file } => {
            let controller = controller_for(&config, UiState::Idle);
            session::run(&controller, file.as_deref(), &config.export_dir).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Config | Commands::SetToken { .. } | Commands::Completions { .. } => {
            unreachable!("handled before the config is read")
        }
    };

    Ok(match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    })
}

fn read_input(prompt: &str, default: Option<&str>, description: Option<&str>) -> Result<String> {
    element! {
        InputPrompt(
            prompt: prompt.to_string(),
            default: default.map(|s| s.to_string()),
            description: description.map(|s| s.to_string())
        )
    }
    .print();

    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_string();

    match (input.is_empty(), default) {
        (true, Some(def)) => Ok(def.to_string()),
        _ => Ok(input),
    }
}

fn interactive_config() -> Result<()> {
    element!(ConfigHeader()).print();

    let mut config_file = config::read_config_file()?;
    let current_url = config_file
        .base_url
        .as_ref()
        .map(|url| url.to_string())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let base_url = loop {
        let base_url_str = read_input(
            "Backend URL",
            Some(&current_url),
            Some("The base URL of the document-chat backend"),
        )?;

        match Url::parse(&base_url_str) {
            Ok(url) => break url,
            Err(e) => {
                element!(ErrorMessage(message: format!("Invalid URL: {}", e))).print();
                println!();
            }
        }
    };

    let api_token = read_input(
        "API Token",
        None,
        Some("Optional: a bearer token for the backend (stored securely in OS keyring)"),
    )?;

    let current_dir = config_file
        .export_dir
        .as_ref()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|| ".".to_string());
    let export_dir = read_input(
        "Export Directory",
        Some(&current_dir),
        Some("Where exported mind maps are saved"),
    )?;

    if !api_token.is_empty() {
        config::set_api_token_keyring(api_token)?;
    }

    config_file.base_url = Some(base_url);
    config_file.export_dir = Some(PathBuf::from(export_dir));
    let path = config::write_config(&config_file)?;

    element!(SuccessMessage(message: format!("Configuration saved to {}", path.display()))).print();

    Ok(())
}
