//! Reload & persistence controller.
//!
//! A [`PreviewSession`] owns the live file set, the debounce policy, the
//! mounted sandbox, and the one resource that outlives remounts: the
//! persistent store. Bursts of edits collapse into a single recompilation;
//! a failed compile keeps the previous bundle running and records the
//! blocking error; a successful compile bumps the monotonic remount key,
//! discards the old sandbox wholesale, and mounts a fresh one.
//!
//! Compiles are never pipelined: each pass reads the latest complete file
//! set, and the newest bundle wins by virtue of being the one that mounts.

use prevu_core::bundle::{compile_project, Bundle, CompileError};
use prevu_core::compiler::SwcBackend;
use prevu_core::config::PreviewConfig;
use prevu_core::files::ProjectFiles;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::messages::{Envelope, LogLevel, SandboxMessage};
use crate::sandbox::{Sandbox, SandboxError};
use crate::store::{PersistentStore, SharedStore};

/// Bounded console history retained for the host's log viewer.
const CONSOLE_LOG_CAP: usize = 500;

/// One captured console call, as retained in the session buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Session error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// The reload & persistence controller for one project editing session.
pub struct PreviewSession {
    config: PreviewConfig,
    backend: SwcBackend,
    files: ProjectFiles,
    store: SharedStore,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
    sandbox: Option<Sandbox>,
    bundle: Option<Bundle>,
    compile_error: Option<CompileError>,
    remount_key: u64,
    deadline: Option<Instant>,
    console_logs: VecDeque<ConsoleLogEntry>,
    last_runtime_error: Option<String>,
    fix_attempted: bool,
}

impl PreviewSession {
    /// Create a session. The store is created here, before the first
    /// mount, and re-attached to every sandbox this session ever mounts.
    #[must_use]
    pub fn new(config: PreviewConfig, files: ProjectFiles) -> Self {
        let store = if config.durable_store {
            PersistentStore::durable(&config.project_id)
        } else {
            PersistentStore::in_memory()
        }
        .shared();

        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            config,
            backend: SwcBackend::new(),
            files,
            store,
            tx,
            rx,
            sandbox: None,
            bundle: None,
            compile_error: None,
            remount_key: 0,
            deadline: None,
            console_logs: VecDeque::new(),
            last_runtime_error: None,
            fix_attempted: false,
        }
    }

    /// The session's shared store handle.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        SharedStore::clone(&self.store)
    }

    /// Monotonic remount counter; increments once per successful reload.
    #[must_use]
    pub fn remount_key(&self) -> u64 {
        self.remount_key
    }

    /// The blocking compilation error from the most recent pass, if any.
    #[must_use]
    pub fn compile_error(&self) -> Option<&CompileError> {
        self.compile_error.as_ref()
    }

    /// The last successfully compiled bundle (the one currently mounted).
    #[must_use]
    pub fn bundle(&self) -> Option<&Bundle> {
        self.bundle.as_ref()
    }

    /// The retained console history, oldest first.
    pub fn console_logs(&self) -> impl Iterator<Item = &ConsoleLogEntry> {
        self.console_logs.iter()
    }

    /// The most recent runtime error string, if the current mount reported
    /// one. This is what an auto-fix trigger feeds on.
    #[must_use]
    pub fn last_runtime_error(&self) -> Option<&str> {
        self.last_runtime_error.as_deref()
    }

    /// Insert or replace a file. A user-initiated change: arms the
    /// debounce timer and resets the auto-fix gate.
    pub fn update_file(&mut self, path: impl Into<String>, content: impl Into<String>) {
        if self.files.upsert(path, content) {
            self.mark_dirty();
        }
    }

    /// Remove a file. Also a user-initiated change.
    pub fn remove_file(&mut self, path: &str) {
        if self.files.remove(path) {
            self.mark_dirty();
        }
    }

    fn mark_dirty(&mut self) {
        self.deadline = Some(Instant::now() + Duration::from_millis(self.config.debounce_ms));
        self.last_runtime_error = None;
        self.fix_attempted = false;
    }

    /// Whether edits are pending a reload.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.deadline.is_some()
    }

    /// Wait out the debounce window, then reload once. Edits arriving
    /// while waiting push the deadline; everything inside the window
    /// collapses into the single pass. Returns `true` if a remount
    /// happened. No-op when nothing is pending.
    pub async fn reload_when_due(&mut self) -> Result<bool, SessionError> {
        loop {
            let Some(deadline) = self.deadline else {
                return Ok(false);
            };
            tokio::time::sleep_until(deadline).await;
            // A concurrent edit may have pushed the deadline while asleep.
            if self.deadline == Some(deadline) {
                return self.reload_now().await;
            }
        }
    }

    /// Compile the current file set and remount immediately, debounce
    /// aside. Used for the initial mount; tests use it too.
    pub async fn reload_now(&mut self) -> Result<bool, SessionError> {
        self.deadline = None;

        match compile_project(&self.files, &self.config.entry_point, &self.backend) {
            Ok(bundle) => {
                self.compile_error = None;
                self.remount_key += 1;
                info!(
                    remount = self.remount_key,
                    modules = bundle.modules.len(),
                    "mounting preview bundle"
                );

                // Old sandbox (and any mid-flight async work in it) is
                // discarded wholesale; the store handle carries over.
                self.sandbox = None;
                let mut sandbox = Sandbox::new(
                    &bundle,
                    Some(self.store()),
                    self.tx.clone(),
                    self.remount_key,
                    self.config.script_timeout_ms,
                )?;
                sandbox.execute().await;

                self.sandbox = Some(sandbox);
                self.bundle = Some(bundle);
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "compilation failed; previous bundle keeps running");
                self.compile_error = Some(e);
                Ok(false)
            }
        }
    }

    /// Drain pending sandbox messages, dropping envelopes from stale
    /// instances, folding console output into the bounded buffer, and
    /// returning the accepted messages in arrival order.
    pub fn drain_messages(&mut self) -> Vec<SandboxMessage> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            if envelope.sandbox_id != self.remount_key {
                debug!(
                    from = envelope.sandbox_id,
                    current = self.remount_key,
                    "dropping message from stale sandbox"
                );
                continue;
            }
            match &envelope.message {
                SandboxMessage::ConsoleLog { level, message } => {
                    if self.console_logs.len() == CONSOLE_LOG_CAP {
                        self.console_logs.pop_front();
                    }
                    self.console_logs.push_back(ConsoleLogEntry {
                        level: *level,
                        message: message.clone(),
                    });
                }
                SandboxMessage::PreviewError { message, .. } => {
                    self.last_runtime_error = Some(message.clone());
                }
                SandboxMessage::VisualEditSelect { .. } => {}
            }
            out.push(envelope.message);
        }
        out
    }

    /// Auto-fix gating: true at most once per distinct runtime error
    /// occurrence, so a failed fix cannot storm. The gate resets on the
    /// next user-initiated change. Compile errors never pass this gate;
    /// they ask for a re-emit directly.
    pub fn should_attempt_auto_fix(&mut self, error: &str) -> bool {
        if self.fix_attempted && self.last_runtime_error.as_deref() == Some(error) {
            return false;
        }
        self.last_runtime_error = Some(error.to_string());
        self.fix_attempted = true;
        true
    }

    /// HTML snapshot of the current preview, if a sandbox is mounted.
    pub fn capture_html(&mut self) -> Result<Option<String>, SessionError> {
        match &mut self.sandbox {
            Some(sandbox) => Ok(Some(sandbox.capture_html()?)),
            None => Ok(None),
        }
    }

    /// Toggle visual-selection mode on the mounted sandbox.
    pub fn set_visual_edit(&mut self, enabled: bool) -> Result<(), SessionError> {
        if let Some(sandbox) = &mut self.sandbox {
            sandbox.set_visual_edit(enabled)?;
        }
        Ok(())
    }

    /// Synthetic pointer-over in the preview.
    pub fn pointer_over(&mut self, selector: &str) -> Result<bool, SessionError> {
        match &mut self.sandbox {
            Some(sandbox) => Ok(sandbox.pointer_over(selector)?),
            None => Ok(false),
        }
    }

    /// Synthetic click in the preview.
    pub fn click(&mut self, selector: &str) -> Result<bool, SessionError> {
        match &mut self.sandbox {
            Some(sandbox) => Ok(sandbox.click(selector)?),
            None => Ok(false),
        }
    }

    /// Drive the mounted sandbox's pending async work (e.g. after a
    /// dispatched click triggered handler activity).
    pub async fn settle(&mut self) {
        if let Some(sandbox) = &mut self.sandbox {
            sandbox.settle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prevu_core::files::SourceFile;

    fn session_with(files: &[(&str, &str)]) -> PreviewSession {
        let files = ProjectFiles::from_files(
            files
                .iter()
                .map(|(path, content)| SourceFile::new(*path, *content)),
        );
        PreviewSession::new(PreviewConfig::default(), files)
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_edit_bursts() {
        let mut session = session_with(&[("src/App.tsx", "export default () => 'v0';")]);
        session.reload_now().await.unwrap();
        assert_eq!(session.remount_key(), 1);

        for i in 1..=5 {
            session.update_file("src/App.tsx", format!("export default () => 'v{i}';"));
        }
        assert!(session.is_dirty());

        let remounted = session.reload_when_due().await.unwrap();
        assert!(remounted);
        // Five edits, exactly one recompilation and one remount.
        assert_eq!(session.remount_key(), 2);
        assert!(!session.is_dirty());

        let html = session.capture_html().unwrap().unwrap();
        assert!(html.contains("v5"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_session_reload_is_noop() {
        let mut session = session_with(&[("src/App.tsx", "export default () => 'hi';")]);
        session.reload_now().await.unwrap();
        assert!(!session.reload_when_due().await.unwrap());
        assert_eq!(session.remount_key(), 1);
    }

    #[tokio::test]
    async fn test_compile_failure_keeps_previous_bundle() {
        let mut session = session_with(&[("src/App.tsx", "export default () => 'stable';")]);
        session.reload_now().await.unwrap();
        assert_eq!(session.remount_key(), 1);

        session.update_file("src/App.tsx", "export default () => {");
        let remounted = session.reload_now().await.unwrap();
        assert!(!remounted);
        assert_eq!(session.remount_key(), 1);
        assert!(session.compile_error().is_some());

        // The previous sandbox is still mounted and inspectable.
        let html = session.capture_html().unwrap().unwrap();
        assert!(html.contains("stable"));

        // A fixed file clears the error on the next pass.
        session.update_file("src/App.tsx", "export default () => 'fixed';");
        assert!(session.reload_now().await.unwrap());
        assert!(session.compile_error().is_none());
        assert_eq!(session.remount_key(), 2);
    }

    #[tokio::test]
    async fn test_store_survives_remounts() {
        let mut session = session_with(&[("src/App.tsx", "export default () => 'hi';")]);
        session.reload_now().await.unwrap();

        session
            .store()
            .borrow_mut()
            .set("count", serde_json::json!(3));

        session.update_file("src/App.tsx", "export default () => 'again';");
        session.reload_now().await.unwrap();
        assert_eq!(session.remount_key(), 2);
        assert_eq!(
            session.store().borrow().get("count"),
            Some(serde_json::json!(3))
        );
    }

    #[tokio::test]
    async fn test_stale_sandbox_messages_are_dropped() {
        let mut session = session_with(&[(
            "src/App.tsx",
            "console.log('from mount'); export default () => 'hi';",
        )]);
        session.reload_now().await.unwrap();

        // Remount before draining: the first mount's messages are stale.
        session.update_file(
            "src/App.tsx",
            "console.log('second mount'); export default () => 'hi';",
        );
        session.reload_now().await.unwrap();

        let messages = session.drain_messages();
        assert!(messages.iter().all(|m| !matches!(
            m,
            SandboxMessage::ConsoleLog { message, .. } if message.contains("from mount")
        )));
        assert!(messages.iter().any(|m| matches!(
            m,
            SandboxMessage::ConsoleLog { message, .. } if message.contains("second mount")
        )));
    }

    #[tokio::test]
    async fn test_console_buffer_is_bounded() {
        let mut session = session_with(&[(
            "src/App.tsx",
            "for (let i = 0; i < 600; i++) console.log('line', i);\nexport default () => 'hi';",
        )]);
        session.reload_now().await.unwrap();
        session.drain_messages();
        assert_eq!(session.console_logs().count(), CONSOLE_LOG_CAP);
    }

    #[tokio::test]
    async fn test_auto_fix_gate_is_once_per_occurrence() {
        let mut session = session_with(&[("src/App.tsx", "export default () => 'hi';")]);
        session.reload_now().await.unwrap();

        assert!(session.should_attempt_auto_fix("boom at App"));
        assert!(!session.should_attempt_auto_fix("boom at App"));
        // A different error is a new occurrence.
        assert!(session.should_attempt_auto_fix("other failure"));

        // A user edit resets the gate.
        session.update_file("src/App.tsx", "export default () => 'edited';");
        assert!(session.should_attempt_auto_fix("boom at App"));
    }
}
