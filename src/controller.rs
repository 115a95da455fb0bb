use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use futures::{StreamExt, stream::BoxStream};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::{DocChatClient, UploadEvent};
use crate::error::{ClientError, ClientResult};
use crate::mindmap::{self, MindMap, MindMapError, MindMapOptions, Size};
use crate::rest_types::Reviews;
use crate::upload::{UploadPolicy, UploadSource};

const DEFAULT_UPLOAD_SUCCESS: &str =
    "File uploaded and processed. You can start chatting now.";

/// Whether a processed document is available on the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UiState {
    #[default]
    Idle,
    DocumentLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub input_enabled: bool,
    pub send_enabled: bool,
    pub actions_enabled: bool,
}

impl From<UiState> for Controls {
    fn from(state: UiState) -> Self {
        let enabled = state == UiState::DocumentLoaded;
        Self {
            input_enabled: enabled,
            send_enabled: enabled,
            actions_enabled: enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Speaker {
    System,
    User,
    Ai,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::System => write!(f, "System"),
            Speaker::User => write!(f, "You"),
            Speaker::Ai => write!(f, "AI"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub speaker: Speaker,
    pub content: String,
    pub timestamp: SystemTime,
}

impl ChatEntry {
    /// Builds an entry for display. Markdown emphasis markers are dropped.
    pub fn new(speaker: Speaker, content: impl AsRef<str>) -> Self {
        Self {
            speaker,
            content: content.as_ref().replace('*', ""),
            timestamp: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgressId {
    Upload,
    Chat,
    Summary,
    Review,
}

impl ProgressId {
    pub fn label(&self) -> &'static str {
        match self {
            ProgressId::Upload => "Uploading",
            ProgressId::Chat => "Waiting for a reply",
            ProgressId::Summary => "Generating summary",
            ProgressId::Review => "Generating review",
        }
    }
}

/// Everything the controller needs from a front end.
pub trait View: Send + Sync {
    fn show_message(&self, entry: ChatEntry);
    fn show_progress(&self, id: ProgressId);
    fn update_progress(&self, id: ProgressId, current: u64, total: u64);
    fn remove_progress(&self, id: ProgressId);
    /// Shows a generated summary with its mind map, or the reason the map could not be drawn.
    fn show_summary(&self, summary: &str, mindmap: Result<&MindMap, &MindMapError>);
    fn set_controls(&self, controls: Controls);
}

/// Removes its progress indicator when dropped.
struct ProgressGuard<'a, V: View> {
    view: &'a V,
    id: ProgressId,
}

impl<'a, V: View> ProgressGuard<'a, V> {
    fn show(view: &'a V, id: ProgressId) -> Self {
        view.show_progress(id);
        Self { view, id }
    }
}

impl<V: View> Drop for ProgressGuard<'_, V> {
    fn drop(&mut self) {
        self.view.remove_progress(self.id);
    }
}

/// Holds the busy flag until dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub policy: UploadPolicy,
    pub mindmap: MindMapOptions,
    pub viewport: Size,
    pub initial_state: UiState,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            policy: UploadPolicy::default(),
            mindmap: MindMapOptions::default(),
            viewport: Size {
                width: 1200.0,
                height: 800.0,
            },
            initial_state: UiState::Idle,
        }
    }
}

/// Drives one chat page: uploads, chat, summaries and reviews.
///
/// Built once by the front end and kept for the whole session.
pub struct ChatController<V: View> {
    client: DocChatClient,
    view: V,
    settings: ControllerSettings,
    state: watch::Sender<UiState>,
    uploading: AtomicBool,
    last_mindmap: Mutex<Option<MindMap>>,
}

impl<V: View> ChatController<V> {
    pub fn new(client: DocChatClient, view: V, settings: ControllerSettings) -> Self {
        let (state, _) = watch::channel(settings.initial_state);
        view.set_controls(Controls::from(settings.initial_state));

        Self {
            client,
            view,
            settings,
            state,
            uploading: AtomicBool::new(false),
            last_mindmap: Mutex::new(None),
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn base_url(&self) -> &url::Url {
        self.client.base_url()
    }

    pub fn state(&self) -> UiState {
        *self.state.borrow()
    }

    pub fn controls(&self) -> Controls {
        Controls::from(self.state())
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: UiState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            info!(state = ?next, "ui state changed");
            self.view.set_controls(Controls::from(next));
        }
    }

    fn system(&self, content: impl AsRef<str>) {
        self.view.show_message(ChatEntry::new(Speaker::System, content));
    }

    fn ensure_document(&self) -> ClientResult<()> {
        if self.controls().actions_enabled {
            Ok(())
        } else {
            let err = ClientError::NoDocument;
            self.system(err.to_string());
            Err(err)
        }
    }

    /// Uploads the file at `path` and has the backend process it.
    pub async fn upload(&self, path: &Path) -> ClientResult<()> {
        let Some(_busy) = BusyGuard::acquire(&self.uploading) else {
            let err = ClientError::Busy;
            warn!(path = %path.display(), "upload rejected, another one is in flight");
            self.system(format!("❌ {err}"));
            return Err(err);
        };

        let source = match UploadSource::from_path(path) {
            Ok(source) => source,
            Err(e) => {
                self.system(format!("❌ Upload failed: {e}"));
                return Err(e);
            }
        };

        let mut stream = match self.client.chunked_upload(source, &self.settings.policy) {
            Ok(stream) => stream,
            Err(e) => {
                self.system(e.to_string());
                return Err(e);
            }
        };

        self.system("Starting file upload...");
        let progress = ProgressGuard::show(&self.view, ProgressId::Upload);
        let result = self.drive_upload(&mut stream).await;
        drop(progress);

        match result {
            Ok(message) => {
                let message = message.unwrap_or_else(|| DEFAULT_UPLOAD_SUCCESS.to_string());
                self.system(format!("✅ {message}"));
                self.set_state(UiState::DocumentLoaded);
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "upload failed");
                self.system(format!("❌ Upload failed: {e}"));
                self.set_state(UiState::Idle);
                Err(e)
            }
        }
    }

    async fn drive_upload(
        &self,
        stream: &mut BoxStream<'_, ClientResult<UploadEvent>>,
    ) -> ClientResult<Option<String>> {
        while let Some(event) = stream.next().await {
            match event? {
                UploadEvent::Progress(progress) => {
                    self.view.update_progress(
                        ProgressId::Upload,
                        progress.uploaded_chunks,
                        progress.total_chunks,
                    );
                    self.system(format!(
                        "Uploaded {}/{} chunks",
                        progress.uploaded_chunks, progress.total_chunks
                    ));
                }
                UploadEvent::Finalizing => self.system("Upload complete, processing..."),
                UploadEvent::Complete { message } => return Ok(message),
            }
        }

        Err(ClientError::Server(
            "The upload ended without a confirmation".to_string(),
        ))
    }

    pub async fn send_message(&self, text: &str) -> ClientResult<()> {
        let message = text.trim();
        if message.is_empty() {
            return Ok(());
        }
        if !self.controls().send_enabled {
            let err = ClientError::NoDocument;
            self.system(err.to_string());
            return Err(err);
        }

        self.view
            .show_message(ChatEntry::new(Speaker::User, message));
        let progress = ProgressGuard::show(&self.view, ProgressId::Chat);
        let result = self.client.chat(message).await;
        drop(progress);

        match result {
            Ok(reply) => {
                self.view.show_message(ChatEntry::new(Speaker::Ai, reply));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "chat request failed");
                self.system(format!("Send failed: {e}"));
                Err(e)
            }
        }
    }

    pub async fn summary(&self) -> ClientResult<()> {
        self.ensure_document()?;

        self.system("Generating study summary...");
        let progress = ProgressGuard::show(&self.view, ProgressId::Summary);
        let result = self.client.summary().await;

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                drop(progress);
                warn!(error = %e, "summary request failed");
                self.system(format!("❌ Failed to generate summary: {e}"));
                return Err(e);
            }
        };

        let mindmap = mindmap::transform(&summary).map(|root| {
            MindMap::render(root, self.settings.mindmap.clone(), self.settings.viewport)
        });
        match &mindmap {
            Ok(map) => info!(root = %map.root().content, nodes = map.nodes().len(), "mind map rendered"),
            Err(e) => warn!(error = %e, "mind map could not be rendered"),
        }

        self.view.show_summary(&summary, mindmap.as_ref());
        if let Ok(map) = mindmap {
            *self
                .last_mindmap
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(map);
        }
        drop(progress);

        Ok(())
    }

    pub async fn review(&self) -> ClientResult<()> {
        self.ensure_document()?;

        self.system("Generating review suggestions...");
        let progress = ProgressGuard::show(&self.view, ProgressId::Review);
        self.view.update_progress(ProgressId::Review, 1, 2);
        let result = self.client.review().await;
        drop(progress);

        match result {
            Ok(Reviews::List(items)) => {
                self.system("📝 Review suggestions:");
                for (index, item) in items.iter().enumerate() {
                    self.system(format!("{}. {}", index + 1, item));
                }
                Ok(())
            }
            Ok(Reviews::Text(text)) => {
                self.system(format!("📝 {text}"));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "review request failed");
                self.system(format!("❌ Failed to get review suggestions: {e}"));
                Err(e)
            }
        }
    }

    /// Saves the most recent mind map as SVG into `dir`.
    pub fn export_mindmap(&self, dir: &Path) -> Result<PathBuf, MindMapError> {
        let guard = self
            .last_mindmap
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(map) = guard.as_ref() else {
            let err = MindMapError::NotRendered;
            self.system(format!("❌ Download failed: {err}"));
            return Err(err);
        };

        match map.export(dir) {
            Ok(path) => {
                self.system(format!("✅ Mind map downloaded: {}", path.display()));
                Ok(path)
            }
            Err(e) => {
                self.system(format!("❌ Download failed: {e}"));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
