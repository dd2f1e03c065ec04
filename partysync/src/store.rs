//! Local persistence of the party membership.
//!
//! A single record lives under the fixed key `party`; it exists exactly as
//! long as the local user is a member of a party.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use crate::errors::{Result, SyncError};
use crate::model::Party;

pub const PARTY_KEY: &str = "party";
const STORE_FILE: &str = "party.json";

#[async_trait]
pub trait PartyStore: Send + Sync {
    async fn load(&self) -> Result<Option<Party>>;
    async fn save(&self, party: &Party) -> Result<()>;
    /// Removes the record; clearing an empty store is a no-op.
    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryPartyStore {
    party: Mutex<Option<Party>>,
}

impl MemoryPartyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_party(party: Party) -> Self {
        Self {
            party: Mutex::new(Some(party)),
        }
    }
}

#[async_trait]
impl PartyStore for MemoryPartyStore {
    async fn load(&self) -> Result<Option<Party>> {
        Ok(self.party.lock().unwrap().clone())
    }

    async fn save(&self, party: &Party) -> Result<()> {
        *self.party.lock().unwrap() = Some(party.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.party.lock().unwrap().take();
        Ok(())
    }
}

/// Keeps the record as `{"party": {...}}` in `party.json`.
///
/// Writes go through a temporary file and a rename.
#[derive(Debug, Clone)]
pub struct FilePartyStore {
    path: PathBuf,
}

impl FilePartyStore {
    /// Store rooted in `directory`, which must exist.
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            path: directory.as_ref().join(STORE_FILE),
        }
    }

    /// Store in the directory configured under `party.store.directory`.
    #[cfg(feature = "partyconfig")]
    pub fn from_config() -> Result<Self> {
        use crate::config_ext::PartySyncConfigExt;

        let config = partyconfig::get_config();
        Ok(Self::new(config.party_store_dir()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_records(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => Ok(records),
                Err(e) => {
                    warn!(path = %self.path.display(), "Discarding unreadable party store: {}", e);
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_records(&self, records: &BTreeMap<String, serde_json::Value>) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PartyStore for FilePartyStore {
    async fn load(&self) -> Result<Option<Party>> {
        let mut records = self.read_records().await?;
        match records.remove(PARTY_KEY) {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SyncError::store(format!("invalid party record: {e}"))),
            None => Ok(None),
        }
    }

    async fn save(&self, party: &Party) -> Result<()> {
        let mut records = self.read_records().await?;
        records.insert(PARTY_KEY.to_string(), serde_json::to_value(party)?);
        self.write_records(&records).await?;
        debug!(path = %self.path.display(), playlist = %party.playlist_id, "Party saved");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut records = self.read_records().await?;
        if records.remove(PARTY_KEY).is_some() {
            self.write_records(&records).await?;
            debug!(path = %self.path.display(), "Party cleared");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlaylistId, UserId};

    fn party() -> Party {
        Party {
            playlist_id: PlaylistId::from("p1"),
            user_id: UserId::from("u1"),
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn test_file_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePartyStore::new(dir.path());

        assert_eq!(store.load().await.unwrap(), None);
        store.save(&party()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(party()));

        // a second store on the same directory sees the record
        let other = FilePartyStore::new(dir.path());
        assert_eq!(other.load().await.unwrap(), Some(party()));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(other.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_uses_party_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePartyStore::new(dir.path());
        store.save(&party()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw[PARTY_KEY]["playlistId"], "p1");
        assert_eq!(raw[PARTY_KEY]["isAdmin"], false);
    }

    #[tokio::test]
    async fn test_corrupted_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePartyStore::new(dir.path());
        std::fs::write(store.path(), b"{not json").unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryPartyStore::with_party(party());
        assert!(store.load().await.unwrap().is_some());
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
