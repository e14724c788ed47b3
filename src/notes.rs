use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::storage::{Storage, StorageError};

/// Per-video free-text notes, kept in the shared key/value store
#[derive(Debug, Clone)]
pub struct NoteStore<S> {
    storage: S,
}

impl<S: Storage> NoteStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    fn key(video_id: &str) -> String {
        format!("notes:{video_id}")
    }

    pub fn load(&self, video_id: &str) -> String {
        self.storage.get(&Self::key(video_id)).unwrap_or_default()
    }

    pub fn save(&self, video_id: &str, notes: &str) -> Result<(), StorageError> {
        self.storage.set(&Self::key(video_id), notes)
    }
}

/// Debounced background writer for note edits.
///
/// Each edit restarts the quiet period; pending notes are written once no edit has
/// arrived for `delay`, and on [`NoteAutosaver::close`].
pub struct NoteAutosaver {
    tx: mpsc::UnboundedSender<(String, String)>,
    handle: JoinHandle<()>,
}

impl NoteAutosaver {
    pub fn spawn<S: Storage>(store: NoteStore<S>, delay: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, String)>();

        let handle = tokio::spawn(async move {
            let mut pending: HashMap<String, String> = HashMap::new();
            loop {
                let next = if pending.is_empty() {
                    rx.recv().await
                } else {
                    match tokio::time::timeout(delay, rx.recv()).await {
                        Ok(next) => next,
                        Err(_) => {
                            flush(&store, &mut pending);
                            continue;
                        }
                    }
                };

                match next {
                    Some((video_id, notes)) => {
                        pending.insert(video_id, notes);
                    }
                    None => {
                        flush(&store, &mut pending);
                        break;
                    }
                }
            }
        });

        Self { tx, handle }
    }

    /// Queue the latest notes for a video
    pub fn edit(&self, video_id: &str, notes: &str) {
        if self.tx.send((video_id.to_string(), notes.to_string())).is_err() {
            warn!("Note autosaver stopped; dropping edit for {video_id}");
        }
    }

    /// Write anything still pending and stop the background task
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!("Note autosaver task failed: {e}");
        }
    }
}

fn flush<S: Storage>(store: &NoteStore<S>, pending: &mut HashMap<String, String>) {
    for (video_id, notes) in pending.drain() {
        match store.save(&video_id, &notes) {
            Ok(()) => debug!("Autosaved notes for {video_id}"),
            Err(e) => warn!("Failed to autosave notes for {video_id}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_notes_are_keyed_by_video() {
        let store = NoteStore::new(MemoryStorage::new());
        store.save("a", "notes for a").unwrap();
        assert_eq!(store.load("a"), "notes for a");
        assert_eq!(store.load("b"), "");
    }

    #[tokio::test]
    async fn test_autosave_waits_for_quiet_period() {
        let store = NoteStore::new(MemoryStorage::new());
        let saver = NoteAutosaver::spawn(store.clone(), Duration::from_millis(100));

        saver.edit("a", "draft");
        saver.edit("a", "draft two");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.load("a"), "");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.load("a"), "draft two");

        saver.close().await;
    }

    #[tokio::test]
    async fn test_close_flushes_pending_edits() {
        let store = NoteStore::new(MemoryStorage::new());
        let saver = NoteAutosaver::spawn(store.clone(), Duration::from_secs(60));

        saver.edit("a", "first");
        saver.edit("b", "second");
        saver.close().await;

        assert_eq!(store.load("a"), "first");
        assert_eq!(store.load("b"), "second");
    }
}
