use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, PoisonError},
    time::SystemTime,
};

use iocraft::prelude::*;

use crate::controller::{ChatEntry, Controls, ProgressId, Speaker, View as ChatView};
use crate::mindmap::{MindMap, MindMapError};

#[derive(Default, Props)]
pub struct ChatMessageProps {
    pub sender: String,
    pub content: String,
    pub timestamp: String,
    pub color: Option<Color>,
}

#[component]
pub fn ChatMessage(props: &ChatMessageProps) -> impl Into<AnyElement<'static>> {
    let color = props.color.unwrap_or(Color::Reset);
    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(weight: Weight::Bold, color: color, content: props.sender.clone())
                Text(color: Color::DarkGrey, content: format!(" {}", props.timestamp))
            }
            Text(content: props.content.clone())
        }
    }
}

#[derive(Default, Props)]
pub struct ErrorMessageProps {
    pub message: String,
}

#[component]
pub fn ErrorMessage(props: &ErrorMessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Red, content: "▲ ")
            Text(color: Color::Red, content: props.message.clone())
        }
    }
}

#[derive(Default, Props)]
pub struct SuccessMessageProps {
    pub message: String,
}

#[component]
pub fn SuccessMessage(props: &SuccessMessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::Green, content: "◆ ")
            Text(content: props.message.clone())
        }
    }
}

#[derive(Default, Props)]
pub struct InputPromptProps {
    pub prompt: String,
    pub default: Option<String>,
    pub description: Option<String>,
}

#[component]
pub fn InputPrompt(props: &InputPromptProps) -> impl Into<AnyElement<'static>> {
    let prompt = match &props.default {
        Some(default) => format!("{} [{}]", props.prompt, default),
        None => props.prompt.clone(),
    };
    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(weight: Weight::Bold, content: prompt)
            #(props.description.as_ref().map(|description| element! {
                Text(color: Color::DarkGrey, content: description.clone())
            }))
        }
    }
}

#[component]
pub fn ConfigHeader() -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            View(background_color: Color::Blue) {
                Text(color: Color::White, content: " docchat configuration ")
            }
            Text(content: "Press enter to keep the value shown in brackets.")
        }
    }
}

#[derive(Default, Props)]
pub struct SessionHeaderProps {
    pub base_url: String,
}

#[component]
pub fn SessionHeader(props: &SessionHeaderProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            View(flex_direction: FlexDirection::Row) {
                Text(content: "┌ ")
                View(background_color: Color::Blue) {
                    Text(color: Color::White, content: " docchat ")
                }
                Text(color: Color::DarkGrey, content: format!(" {}", props.base_url))
            }
            Text(content: "└ Type /help for commands.")
        }
    }
}

#[component]
pub fn SessionHelp() -> impl Into<AnyElement<'static>> {
    let commands = [
        ("/upload <file>", "Upload and process a document"),
        ("/summary", "Generate a study summary with a mind map"),
        ("/review", "Get review suggestions"),
        ("/export", "Save the latest mind map as SVG"),
        ("/quit", "Leave the session"),
    ];
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(commands.into_iter().map(|(command, help)| element! {
                View(flex_direction: FlexDirection::Row) {
                    Text(weight: Weight::Bold, content: format!("{command:<16}"))
                    Text(content: help)
                }
            }))
            Text(color: Color::DarkGrey, content: "Anything else is sent as a chat message.")
        }
    }
}

#[derive(Default, Props)]
pub struct SummaryCardProps {
    pub summary: String,
    pub outline: Vec<String>,
    pub error: Option<String>,
}

#[component]
pub fn SummaryCard(props: &SummaryCardProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(weight: Weight::Bold, content: "📚 Study summary")
            Text(content: props.summary.clone())
            Text(content: "│")
            #(props.outline.iter().map(|line| element! {
                Text(color: Color::Blue, content: line.clone())
            }))
            #(props.error.as_ref().map(|error| element! {
                View(flex_direction: FlexDirection::Column) {
                    Text(color: Color::Red, content: format!("Mind map failed to load: {error}"))
                    Text(color: Color::DarkGrey, content: "Check the summary format and try again")
                }
            }))
        }
    }
}

const PROGRESS_BAR_WIDTH: usize = 24;

/// Fixed-width bar for `current` out of `total` steps.
pub fn progress_bar(current: u64, total: u64, width: usize) -> String {
    let filled = if total == 0 {
        width
    } else {
        (current.min(total) as usize * width) / total as usize
    };
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

#[derive(Default, Props)]
pub struct ProgressBarProps {
    pub title: String,
    pub current: u64,
    pub total: u64,
}

#[component]
pub fn ProgressBar(props: &ProgressBarProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(color: Color::DarkGrey, content: format!("{} ", props.title))
            Text(color: Color::Blue, content: progress_bar(props.current, props.total, PROGRESS_BAR_WIDTH))
            Text(content: format!(" {}/{}", props.current, props.total))
        }
    }
}

/// Indented text rendering of the visible part of a mind map.
pub fn mindmap_outline(map: &MindMap) -> Vec<String> {
    map.nodes()
        .iter()
        .map(|node| {
            let marker = if node.depth == 0 { "◆" } else { "├─" };
            let indent = "│  ".repeat(node.depth.saturating_sub(1));
            let label = if node.label.is_empty() { "·" } else { node.label.as_str() };
            if node.folded > 0 {
                format!("{indent}{marker} {label} (+{})", node.folded)
            } else {
                format!("{indent}{marker} {label}")
            }
        })
        .collect()
}

fn speaker_color(speaker: Speaker) -> Color {
    match speaker {
        Speaker::System => Color::Yellow,
        Speaker::User => Color::Cyan,
        Speaker::Ai => Color::Green,
    }
}

fn format_time(timestamp: SystemTime) -> String {
    let formatted = humantime::format_rfc3339_seconds(timestamp).to_string();
    formatted.get(11..19).unwrap_or(&formatted).to_string()
}

/// Prints controller output to stdout as it happens.
#[derive(Default)]
pub struct TerminalView {
    active: Mutex<BTreeSet<ProgressId>>,
    last_progress: Mutex<BTreeMap<ProgressId, (u64, u64)>>,
    controls: Mutex<Option<Controls>>,
}

impl ChatView for TerminalView {
    fn show_message(&self, entry: ChatEntry) {
        element! {
            ChatMessage(
                sender: entry.speaker.to_string(),
                content: entry.content,
                timestamp: format_time(entry.timestamp),
                color: Some(speaker_color(entry.speaker))
            )
        }
        .print();
    }

    fn show_progress(&self, id: ProgressId) {
        let inserted = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        if inserted {
            element!(Text(color: Color::DarkGrey, content: format!("◐ {}...", id.label()))).print();
        }
    }

    fn update_progress(&self, id: ProgressId, current: u64, total: u64) {
        let previous = self
            .last_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (current, total));
        if previous == Some((current, total)) {
            return;
        }
        element! {
            ProgressBar(title: id.label().to_string(), current: current, total: total)
        }
        .print();
    }

    fn remove_progress(&self, id: ProgressId) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.last_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn show_summary(&self, summary: &str, mindmap: Result<&MindMap, &MindMapError>) {
        let (outline, error) = match mindmap {
            Ok(map) => (mindmap_outline(map), None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        element! {
            SummaryCard(summary: summary.to_string(), outline: outline, error: error)
        }
        .print();
    }

    fn set_controls(&self, controls: Controls) {
        let previous = self
            .controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(controls);
        let was_enabled = previous.is_some_and(|c| c.send_enabled);
        if controls.send_enabled && !was_enabled {
            element!(SuccessMessage(message: "Chat is ready. Ask anything about your document.".to_string())).print();
        }
    }
}
