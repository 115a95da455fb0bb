use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Result;
use iocraft::prelude::*;

use crate::controller::{ChatController, View as ChatView};
use crate::ui::{ErrorMessage, SessionHeader, SessionHelp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Upload(PathBuf),
    Summary,
    Review,
    Export,
    Help,
    Quit,
    Unknown(String),
    Message(String),
    Empty,
}

impl SessionCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return SessionCommand::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return SessionCommand::Message(line.to_string());
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        match name {
            "upload" if !rest.is_empty() => SessionCommand::Upload(PathBuf::from(rest)),
            "summary" => SessionCommand::Summary,
            "review" => SessionCommand::Review,
            "export" => SessionCommand::Export,
            "help" => SessionCommand::Help,
            "quit" | "exit" => SessionCommand::Quit,
            _ => SessionCommand::Unknown(line.to_string()),
        }
    }
}

fn prompt(controller_ready: bool) -> Result<Option<String>> {
    print!("{}", if controller_ready { "you> " } else { "> " });
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

/// Runs the interactive loop until `/quit` or end of input.
///
/// Action failures are already reported through the view, so they never end
/// the session.
pub async fn run<V: ChatView>(
    controller: &ChatController<V>,
    initial_upload: Option<&Path>,
    export_dir: &Path,
) -> Result<()> {
    element!(SessionHeader(base_url: controller.base_url().to_string())).print();

    if let Some(path) = initial_upload {
        let _ = controller.upload(path).await;
    }

    while let Some(line) = prompt(controller.controls().input_enabled)? {
        match SessionCommand::parse(&line) {
            SessionCommand::Empty => {}
            SessionCommand::Upload(path) => {
                let _ = controller.upload(&path).await;
            }
            SessionCommand::Summary => {
                let _ = controller.summary().await;
            }
            SessionCommand::Review => {
                let _ = controller.review().await;
            }
            SessionCommand::Export => {
                let _ = controller.export_mindmap(export_dir);
            }
            SessionCommand::Help => element!(SessionHelp()).print(),
            SessionCommand::Quit => break,
            SessionCommand::Unknown(command) => {
                element!(ErrorMessage(message: format!("Unknown command: {command}"))).print();
            }
            SessionCommand::Message(text) => {
                let _ = controller.send_message(&text).await;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            SessionCommand::parse("/upload  notes/week 1.pdf \n"),
            SessionCommand::Upload(PathBuf::from("notes/week 1.pdf"))
        );
        assert_eq!(SessionCommand::parse("/summary"), SessionCommand::Summary);
        assert_eq!(SessionCommand::parse(" /review "), SessionCommand::Review);
        assert_eq!(SessionCommand::parse("/export"), SessionCommand::Export);
        assert_eq!(SessionCommand::parse("/help"), SessionCommand::Help);
        assert_eq!(SessionCommand::parse("/exit"), SessionCommand::Quit);
    }

    #[test]
    fn test_parse_plain_text_and_unknown() {
        assert_eq!(
            SessionCommand::parse("what is chapter 2 about?\n"),
            SessionCommand::Message("what is chapter 2 about?".into())
        );
        assert_eq!(SessionCommand::parse("   \n"), SessionCommand::Empty);
        assert_eq!(
            SessionCommand::parse("/upload"),
            SessionCommand::Unknown("/upload".into())
        );
        assert_eq!(
            SessionCommand::parse("/frobnicate now"),
            SessionCommand::Unknown("/frobnicate now".into())
        );
    }
}
