//! Watches the content directory and reports article changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

use folio_content::EXTENSIONS;

/// Repeats of the same event within this window are dropped.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// A change under a watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchEvent {
    /// Created, written, or renamed into place
    Changed(PathBuf),

    /// Deleted or renamed away
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Changed(p) | Self::Removed(p) => p,
        }
    }

    /// Whether the path has an article extension.
    pub fn is_article(&self) -> bool {
        self.path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext))
    }
}

/// Keeps the underlying notify watcher alive.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` recursively. Missing paths are skipped with a warning.
    pub fn new(
        paths: &[PathBuf],
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (raw_tx, raw_rx) = mpsc::channel::<notify::Event>();
        let (tx, rx) = async_mpsc::channel(64);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(e) => tracing::warn!("Watch error: {}", e),
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if !path.exists() {
                tracing::warn!("Not watching missing path {}", path.display());
                continue;
            }
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(std::io::Error::other)?;
        }

        std::thread::spawn(move || {
            let mut debouncer = Debouncer::new(DEBOUNCE);
            for event in raw_rx {
                let now = Instant::now();
                let changes = event
                    .paths
                    .iter()
                    .filter_map(|path| classify_event(path, &event.kind));
                for change in changes {
                    if debouncer.admit(&change, now) && tx.blocking_send(change).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, rx))
    }
}

/// Drops an event seen less than `window` ago.
struct Debouncer {
    window: Duration,
    seen: HashMap<WatchEvent, Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    fn admit(&mut self, event: &WatchEvent, now: Instant) -> bool {
        let window = self.window;
        self.seen.retain(|_, at| now.duration_since(*at) < window);
        if self.seen.contains_key(event) {
            return false;
        }
        self.seen.insert(event.clone(), now);
        true
    }
}

/// Map a notify event to a change, ignoring hidden files and metadata churn.
fn classify_event(path: &Path, kind: &EventKind) -> Option<WatchEvent> {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'));
    if hidden {
        return None;
    }

    let path = path.to_path_buf();
    match kind {
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            Some(WatchEvent::Removed(path))
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Create(_) | EventKind::Modify(_) => Some(WatchEvent::Changed(path)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn classifies_changes_and_removals() {
        let edit = EventKind::Modify(ModifyKind::Data(DataChange::Content));

        assert_eq!(
            classify_event(Path::new("/c/a/x.mdx"), &edit),
            Some(WatchEvent::Changed(PathBuf::from("/c/a/x.mdx")))
        );
        assert_eq!(
            classify_event(Path::new("/c/a/y.md"), &EventKind::Create(CreateKind::File)),
            Some(WatchEvent::Changed(PathBuf::from("/c/a/y.md")))
        );
        assert_eq!(
            classify_event(Path::new("/c/a/x.mdx"), &EventKind::Remove(RemoveKind::File)),
            Some(WatchEvent::Removed(PathBuf::from("/c/a/x.mdx")))
        );
        assert_eq!(
            classify_event(
                Path::new("/c/a/x.mdx"),
                &EventKind::Modify(ModifyKind::Name(RenameMode::From))
            ),
            Some(WatchEvent::Removed(PathBuf::from("/c/a/x.mdx")))
        );
    }

    #[test]
    fn ignores_hidden_files_and_metadata() {
        let edit = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        let chmod = EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions));

        assert_eq!(classify_event(Path::new("/c/a/.x.mdx.swp"), &edit), None);
        assert_eq!(classify_event(Path::new("/c/a/x.mdx"), &chmod), None);
        assert_eq!(classify_event(Path::new("/c/a/x.mdx"), &EventKind::Any), None);
    }

    #[test]
    fn recognizes_article_paths() {
        assert!(WatchEvent::Changed(PathBuf::from("/c/a/x.mdx")).is_article());
        assert!(WatchEvent::Removed(PathBuf::from("/c/a/x.md")).is_article());
        assert!(!WatchEvent::Changed(PathBuf::from("/c/site.css")).is_article());
    }

    #[test]
    fn debouncer_drops_repeats_within_window() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let event = WatchEvent::Changed(PathBuf::from("/c/a/x.mdx"));
        let start = Instant::now();

        assert!(debouncer.admit(&event, start));
        assert!(!debouncer.admit(&event, start + Duration::from_millis(50)));
        assert!(debouncer.admit(
            &WatchEvent::Removed(PathBuf::from("/c/a/x.mdx")),
            start + Duration::from_millis(50)
        ));
        assert!(debouncer.admit(&event, start + Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn reports_new_articles() {
        let temp = tempdir().unwrap();
        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        // Give the backend time to register the watch
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(temp.path().join("post.mdx"), "# New").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        drop(watcher);

        let event = event.expect("timed out waiting for watch event");
        assert!(event.is_some_and(|e| e.is_article()));
    }
}
