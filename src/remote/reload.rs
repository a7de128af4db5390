//! Polling file watcher that triggers worker restarts
//!
//! When `reload_on_file_changes` is set, the worker runtime runs this loop
//! alongside dispatch. It snapshots a fingerprint of the module path
//! (every file's mtime and size), polls on an interval, and emits the
//! reserved restart signal the first time the fingerprint differs. The
//! supervisor then tears the worker down, so the watcher exits after one
//! trigger; the replacement worker starts its own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::runtime::PublicationEmitter;

pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(500);

type Fingerprint = BTreeMap<PathBuf, (SystemTime, u64)>;

fn fingerprint(path: &Path) -> Fingerprint {
    let mut entries = BTreeMap::new();
    for entry in WalkDir::new(path).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "failed to walk watched path");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                entries.insert(entry.path().to_path_buf(), (modified, meta.len()));
            }
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "failed to stat watched file");
            }
        }
    }
    entries
}

pub(crate) async fn watch_for_changes(path: PathBuf, emitter: PublicationEmitter) {
    if !path.exists() {
        warn!(path = %path.display(), "watch path does not exist, reload disabled");
        return;
    }

    let baseline = fingerprint(&path);
    let mut ticker = time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if fingerprint(&path) != baseline {
            info!(path = %path.display(), "watched files changed, requesting worker restart");
            emitter.request_restart().await;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::port_pair;
    use crate::remote::envelope::Envelope;
    use crate::remote::RESTART_EVENT_NAME;

    #[tokio::test]
    async fn test_change_triggers_restart_signal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("module.txt");
        std::fs::write(&file, "one").unwrap();

        let (worker_side, mut host_side) = port_pair::<Envelope>(8);
        let (tx, _rx) = worker_side.split();
        let emitter = PublicationEmitter::new(tx);

        let watcher = tokio::spawn(watch_for_changes(dir.path().to_path_buf(), emitter));

        // Length change guarantees the fingerprint differs even on coarse
        // mtime filesystems.
        std::fs::write(&file, "one-and-then-some").unwrap();

        let envelope = tokio::time::timeout(Duration::from_secs(5), host_side.recv())
            .await
            .expect("watcher never fired")
            .expect("port closed without a signal");
        match envelope {
            Envelope::Publication { event, .. } => assert_eq!(event.name, RESTART_EVENT_NAME),
            other => panic!("unexpected envelope: {}", other.kind()),
        }

        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_path_exits_without_signal() {
        let (worker_side, mut host_side) = port_pair::<Envelope>(8);
        let (tx, _rx) = worker_side.split();
        let emitter = PublicationEmitter::new(tx);

        watch_for_changes(PathBuf::from("/definitely/not/a/real/path"), emitter).await;
        assert!(host_side.recv().await.is_none());
    }
}
