//! One JSON file per player, written off the game thread

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::game::hooks::PlayerSink;
use crate::game::player::Player;

use super::StoreError;

/// On-disk player record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPlayer {
    pub player: Player,
    pub saved_at: DateTime<Utc>,
}

enum SaveJob {
    Write(Box<SavedPlayer>),
    Flush(oneshot::Sender<()>),
}

/// Player store backed by a directory of JSON files.
///
/// `save` only enqueues; a background task performs the writes in order.
#[derive(Clone)]
pub struct JsonPlayerStore {
    dir: PathBuf,
    tx: mpsc::UnboundedSender<SaveJob>,
}

impl JsonPlayerStore {
    /// Start the writer task for `dir`
    pub fn spawn(dir: impl Into<PathBuf>) -> (Self, JoinHandle<()>) {
        let dir = dir.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_writer(dir.clone(), rx));
        (Self { dir, tx }, handle)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read a saved player, `None` if they have never been saved.
    ///
    /// Saves queued before the call are written first, so a quick reconnect
    /// never reads a record older than its own logout.
    pub async fn load(&self, name: &str) -> Result<Option<Player>, StoreError> {
        if let Err(e) = self.flush().await {
            warn!(player = %name, error = %e, "Loading without draining pending saves");
        }
        let path = player_path(&self.dir, name);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let saved: SavedPlayer = serde_json::from_slice(&raw)?;
        debug!(player = %name, saved_at = %saved.saved_at, "Loaded player");
        Ok(Some(saved.player))
    }

    /// Wait until every save queued so far has been written
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(SaveJob::Flush(done_tx))
            .map_err(|_| StoreError::WriterClosed)?;
        done_rx.await.map_err(|_| StoreError::WriterClosed)
    }
}

impl PlayerSink for JsonPlayerStore {
    fn save(&self, player: &Player) -> Result<(), StoreError> {
        let record = SavedPlayer {
            player: player.clone(),
            saved_at: Utc::now(),
        };
        self.tx
            .send(SaveJob::Write(Box::new(record)))
            .map_err(|_| StoreError::WriterClosed)
    }
}

fn player_path(dir: &Path, name: &str) -> PathBuf {
    let file: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase();
    dir.join(format!("{file}.json"))
}

async fn run_writer(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<SaveJob>) {
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create save directory");
    }
    info!(dir = %dir.display(), "Save writer started");

    while let Some(job) = rx.recv().await {
        match job {
            SaveJob::Write(record) => {
                let name = record.player.name.clone();
                if let Err(e) = write_record(&dir, &record).await {
                    error!(player = %name, error = %e, "Failed to save player");
                }
            }
            SaveJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    info!("Save writer stopped");
}

async fn write_record(dir: &Path, record: &SavedPlayer) -> Result<(), StoreError> {
    let path = player_path(dir, &record.player.name);
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(record)?;
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, &path).await?;
    debug!(player = %record.player.name, path = %path.display(), "Player saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::Location;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    fn sample(name: &str) -> Player {
        let mut p = Player::new(name, Location::new("forest", "path"));
        p.gold = 42;
        p.add_item("pelt", 2);
        p.recall = Some(Location::new("forest", "clearing"));
        p
    }

    #[tokio::test]
    async fn saved_player_loads_back() {
        let tmp = TempDir::new().unwrap();
        let (store, _writer) = JsonPlayerStore::spawn(tmp.path());

        assert_ok!(store.save(&sample("Amy")));
        assert_ok!(store.flush().await);

        let loaded = store.load("Amy").await.unwrap().unwrap();
        assert_eq!(loaded.gold, 42);
        assert_eq!(loaded.item_count("pelt"), 2);
        assert_eq!(loaded.recall, Some(Location::new("forest", "clearing")));
        assert!(tmp.path().join("amy.json").exists());
    }

    #[tokio::test]
    async fn later_save_wins() {
        let tmp = TempDir::new().unwrap();
        let (store, _writer) = JsonPlayerStore::spawn(tmp.path());

        let mut p = sample("amy");
        store.save(&p).unwrap();
        p.gold = 7;
        store.save(&p).unwrap();
        assert_ok!(store.flush().await);

        assert_eq!(store.load("amy").await.unwrap().unwrap().gold, 7);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_sees_the_save_queued_just_before_it() {
        let tmp = TempDir::new().unwrap();
        let (store, _writer) = JsonPlayerStore::spawn(tmp.path());

        let mut p = sample("Amy");
        for gold in 0..50 {
            p.gold = gold;
            store.save(&p).unwrap();
            let loaded = store.load("Amy").await.unwrap().unwrap();
            assert_eq!(loaded.gold, gold);
        }
    }

    #[tokio::test]
    async fn unknown_player_is_none() {
        let tmp = TempDir::new().unwrap();
        let (store, _writer) = JsonPlayerStore::spawn(tmp.path());
        assert!(store.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("amy.json"), b"{ not json").unwrap();
        let (store, _writer) = JsonPlayerStore::spawn(tmp.path());
        assert!(matches!(store.load("amy").await, Err(StoreError::Json(_))));
    }

    #[tokio::test]
    async fn save_after_writer_stops_fails() {
        let tmp = TempDir::new().unwrap();
        let (store, writer) = JsonPlayerStore::spawn(tmp.path());
        writer.abort();
        let _ = writer.await;
        assert!(matches!(
            store.save(&sample("amy")),
            Err(StoreError::WriterClosed)
        ));
    }
}
