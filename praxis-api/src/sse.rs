//! Server-Sent Events stream and the base-directory watcher.

use std::collections::HashSet;
use std::convert::Infallible;
use std::path::{Component, Path};
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use praxis::io::records::{CHATS_DIR, LOGS_DIR};
use praxis::io::workspace_store::{CURRENT_FILE_NAME, REGISTRY_FILE_NAME};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::state::{AppState, ChangeEvent};

/// Workspace-record files already announced, keyed by (kind dir, workspace, file).
type KnownRecords = HashSet<(&'static str, String, String)>;

/// SSE endpoint handler.
pub async fn events_handler(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(change_event) => {
                    if let Ok(json) = serde_json::to_string(&change_event) {
                        yield Ok(Event::default().event("change").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

/// Start the base-directory watcher in a background task.
pub fn start_file_watcher(state: AppState) {
    tokio::spawn(async move {
        if let Err(e) = run_file_watcher(state).await {
            warn!(error = %e, "file watcher failed");
        }
    });
}

async fn run_file_watcher(state: AppState) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(100);

    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.try_send(event);
            }
        },
        notify::Config::default().with_poll_interval(Duration::from_millis(250)),
    )?;
    watcher.watch(state.base_path(), RecursiveMode::Recursive)?;
    info!(path = %state.base_path().display(), "watching base directory");

    let mut known = collect_known_records(state.base_path());
    let mut pending_events: Vec<NotifyEvent> = Vec::new();
    let mut flush_tick = tokio::time::interval(Duration::from_millis(250));
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                pending_events.push(event);
            }
            _ = flush_tick.tick() => {
                if pending_events.is_empty() {
                    continue;
                }
                process_events(&state, &pending_events, &mut known);
                pending_events.clear();
            }
        }
    }
}

fn process_events(state: &AppState, events: &[NotifyEvent], known: &mut KnownRecords) {
    let base = state.base_path();
    let registry_path = base.join(REGISTRY_FILE_NAME);
    let current_path = base.join(CURRENT_FILE_NAME);
    let mut registry_changed = false;
    let mut current_changed = false;
    let mut added = Vec::new();

    for event in events {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            continue;
        }
        for path in &event.paths {
            if path == &registry_path {
                registry_changed = true;
            } else if path == &current_path {
                current_changed = true;
            } else if let Some(record) = parse_record_path(base, path)
                && known.insert(record.clone())
            {
                added.push(record);
            }
        }
    }

    if registry_changed {
        debug!("broadcasting registry change");
        state.broadcast(ChangeEvent::RegistryChanged);
    }
    if current_changed {
        debug!("broadcasting current workspace change");
        state.broadcast(ChangeEvent::CurrentChanged);
    }
    added.sort();
    for (kind, workspace, file) in added {
        debug!(workspace = %workspace, file = %file, kind, "broadcasting new record");
        let event = if kind == LOGS_DIR {
            ChangeEvent::RunLogAdded { workspace, file }
        } else {
            ChangeEvent::ChatSaved { workspace, file }
        };
        state.broadcast(event);
    }
}

/// `<base>/<workspace>/{logs,chats}/<file>.md` → (kind, workspace, file).
fn parse_record_path(base: &Path, path: &Path) -> Option<(&'static str, String, String)> {
    let rel = path.strip_prefix(base).ok()?;
    let parts = rel
        .components()
        .map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    let [workspace, kind, file] = parts.as_slice() else {
        return None;
    };
    if !file.ends_with(".md") {
        return None;
    }
    let kind = match *kind {
        LOGS_DIR => LOGS_DIR,
        CHATS_DIR => CHATS_DIR,
        _ => return None,
    };
    Some((kind, workspace.to_string(), file.to_string()))
}

fn collect_known_records(base: &Path) -> KnownRecords {
    let mut known = HashSet::new();
    let Ok(workspaces) = std::fs::read_dir(base) else {
        return known;
    };
    for workspace in workspaces.flatten() {
        for kind in [LOGS_DIR, CHATS_DIR] {
            let Ok(files) = std::fs::read_dir(workspace.path().join(kind)) else {
                continue;
            };
            for file in files.flatten() {
                if let Some(record) = parse_record_path(base, &file.path()) {
                    known.insert(record);
                }
            }
        }
    }
    known
}
