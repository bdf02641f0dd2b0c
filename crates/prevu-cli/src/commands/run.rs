//! `prevu run` command: watch a project directory and keep it mounted in
//! the live preview, printing structured sandbox output as it arrives.

use miette::{IntoDiagnostic, Result};
use notify::{
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use prevu_core::config::PreviewConfig;
use prevu_core::files::ProjectFiles;
use prevu_sandbox::{PreviewSession, SandboxMessage};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(
    dir: &Path,
    entry: String,
    once: bool,
    durable: bool,
    project_id: String,
    json: bool,
) -> Result<()> {
    let files = ProjectFiles::load_dir(dir).into_diagnostic()?;
    let config = PreviewConfig {
        entry_point: entry,
        durable_store: durable,
        project_id,
        ..PreviewConfig::default()
    };

    let mut session = PreviewSession::new(config, files);
    session.reload_now().await.map_err(|e| miette::miette!("{e}"))?;
    report(&mut session, json);

    if once {
        if let Some(error) = session.compile_error() {
            return Err(miette::miette!("{error}"));
        }
        if let Some(html) = session.capture_html().map_err(|e| miette::miette!("{e}"))? {
            println!("{html}");
        }
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();
    let _watcher = start_watcher(dir, tx)?;
    info!(dir = %dir.display(), "watching for changes");

    loop {
        // Fold in every queued filesystem event before deciding what to do.
        while let Ok(paths) = rx.try_recv() {
            apply_fs_paths(&mut session, dir, &paths);
        }

        if session.is_dirty() {
            session
                .reload_when_due()
                .await
                .map_err(|e| miette::miette!("{e}"))?;
            report(&mut session, json);
            continue;
        }

        match rx.recv().await {
            Some(paths) => apply_fs_paths(&mut session, dir, &paths),
            None => break,
        }
    }

    Ok(())
}

/// Mirror filesystem changes into the session's in-memory file set.
fn apply_fs_paths(session: &mut PreviewSession, root: &Path, paths: &[PathBuf]) {
    for path in paths {
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if key.is_empty() {
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => session.update_file(key, content),
            Err(_) => session.remove_file(&key),
        }
    }
}

/// Print everything the sandbox reported since the last call.
fn report(session: &mut PreviewSession, json: bool) {
    if let Some(error) = session.compile_error() {
        warn!(error = %error, "compilation error; preview not reloaded");
    }

    for message in session.drain_messages() {
        if json {
            match serde_json::to_string(&message) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialize sandbox message"),
            }
            continue;
        }
        match message {
            SandboxMessage::PreviewError { message, .. } => {
                warn!(error = %message, "preview error");
            }
            SandboxMessage::ConsoleLog { level, message } => {
                info!(level = ?level, "{message}");
            }
            SandboxMessage::VisualEditSelect { selector, tag_name } => {
                info!(selector = %selector, tag = %tag_name, "visual selection");
            }
        }
    }
}

/// Start the recursive file watcher, forwarding relevant event paths.
fn start_watcher(root: &Path, tx: mpsc::UnboundedSender<Vec<PathBuf>>) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if should_process_event(&event) {
                    let _ = tx.send(event.paths);
                }
            }
            Err(e) => {
                warn!(error = %e, "watch error");
            }
        },
        Config::default(),
    )
    .into_diagnostic()?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .into_diagnostic()?;
    Ok(watcher)
}

/// File-content changes only; directory chatter and metadata are ignored.
fn should_process_event(event: &Event) -> bool {
    match &event.kind {
        EventKind::Create(CreateKind::File) => true,
        EventKind::Modify(ModifyKind::Data(_)) => true,
        EventKind::Modify(ModifyKind::Name(
            RenameMode::To | RenameMode::From | RenameMode::Both,
        )) => true,
        EventKind::Remove(RemoveKind::File) => true,
        _ => false,
    }
}
