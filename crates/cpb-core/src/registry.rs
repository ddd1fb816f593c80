//! Channel registry: which user linked which channel.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    Result,
};

/// A channel (or group) linked to one user account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLink {
    pub owner: UserId,
    pub channel_id: ChatId,
    pub title: String,
    pub username: Option<String>,
    pub linked_at: DateTime<Utc>,
}

/// Storage port for channel links. A channel id is linked to at most one owner.
#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    async fn find_by_user(&self, owner: UserId) -> Result<Vec<ChannelLink>>;
    async fn find_by_channel(&self, channel_id: ChatId) -> Result<Option<ChannelLink>>;
    /// Insert unless the channel is already linked. Returns whether a row was added.
    async fn insert(&self, link: ChannelLink) -> Result<bool>;
    /// Remove the owner's link to `channel_id`. Returns the number of rows removed.
    async fn delete(&self, owner: UserId, channel_id: ChatId) -> Result<usize>;
}

#[derive(Default, Serialize, Deserialize)]
struct RegistryFile {
    channels: Vec<ChannelLink>,
}

/// Channel registry kept in memory and, when opened on a path, mirrored to a JSON file
/// after every write.
pub struct ChannelStore {
    path: Option<PathBuf>,
    links: Mutex<Vec<ChannelLink>>,
}

impl ChannelStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            links: Mutex::new(Vec::new()),
        }
    }

    /// Open (or create on first write) the registry file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let links = load_registry_file(&path)?;
        tracing::info!(path = %path.display(), channels = links.len(), "channel registry loaded");
        Ok(Self {
            path: Some(path),
            links: Mutex::new(links),
        })
    }

    fn persist(&self, links: &[ChannelLink]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        save_registry_file(path, links)
    }
}

#[async_trait]
impl ChannelRegistry for ChannelStore {
    async fn find_by_user(&self, owner: UserId) -> Result<Vec<ChannelLink>> {
        let links = self.links.lock().await;
        Ok(links.iter().filter(|l| l.owner == owner).cloned().collect())
    }

    async fn find_by_channel(&self, channel_id: ChatId) -> Result<Option<ChannelLink>> {
        let links = self.links.lock().await;
        Ok(links.iter().find(|l| l.channel_id == channel_id).cloned())
    }

    async fn insert(&self, link: ChannelLink) -> Result<bool> {
        let mut links = self.links.lock().await;
        if links.iter().any(|l| l.channel_id == link.channel_id) {
            return Ok(false);
        }
        links.push(link);
        if let Err(e) = self.persist(&links) {
            links.pop();
            return Err(e);
        }
        Ok(true)
    }

    async fn delete(&self, owner: UserId, channel_id: ChatId) -> Result<usize> {
        let mut links = self.links.lock().await;
        let before = links.clone();
        links.retain(|l| !(l.owner == owner && l.channel_id == channel_id));
        let removed = before.len() - links.len();
        if removed > 0 {
            if let Err(e) = self.persist(&links) {
                *links = before;
                return Err(e);
            }
        }
        Ok(removed)
    }
}

fn load_registry_file(path: &Path) -> Result<Vec<ChannelLink>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let txt = std::fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(Vec::new());
    }
    let data: RegistryFile = serde_json::from_str(&txt)?;
    Ok(data.channels)
}

fn save_registry_file(path: &Path, links: &[ChannelLink]) -> Result<()> {
    let data = RegistryFile {
        channels: links.to_vec(),
    };
    let txt = serde_json::to_string_pretty(&data)?;

    // Write next to the target and rename so a crash never leaves half a file.
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "registry path has no file name".to_string(),
        })?
        .to_string_lossy();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&tmp, txt)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(owner: i64, channel: i64, title: &str) -> ChannelLink {
        ChannelLink {
            owner: UserId(owner),
            channel_id: ChatId(channel),
            title: title.to_string(),
            username: None,
            linked_at: Utc::now(),
        }
    }

    fn tmp_path(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        PathBuf::from(format!("/tmp/{prefix}-{}-{ts}.json", std::process::id()))
    }

    #[tokio::test]
    async fn channel_is_linked_at_most_once() {
        let store = ChannelStore::in_memory();
        assert!(store.insert(link(1, -1001, "News")).await.unwrap());
        assert!(!store.insert(link(2, -1001, "News")).await.unwrap());

        let owner = store.find_by_channel(ChatId(-1001)).await.unwrap().unwrap();
        assert_eq!(owner.owner, UserId(1));
        assert!(store.find_by_user(UserId(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_scoped_to_owner() {
        let store = ChannelStore::in_memory();
        store.insert(link(1, -1001, "A")).await.unwrap();
        store.insert(link(1, -1002, "B")).await.unwrap();

        assert_eq!(store.delete(UserId(2), ChatId(-1001)).await.unwrap(), 0);
        assert_eq!(store.delete(UserId(1), ChatId(-1001)).await.unwrap(), 1);

        let left = store.find_by_user(UserId(1)).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].title, "B");
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let path = tmp_path("cpb-registry-test");
        {
            let store = ChannelStore::open(&path).unwrap();
            store.insert(link(5, -1009, "Announcements")).await.unwrap();
        }

        let reopened = ChannelStore::open(&path).unwrap();
        let links = reopened.find_by_user(UserId(5)).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Announcements");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let store = ChannelStore::open(tmp_path("cpb-registry-missing")).unwrap();
        assert!(store.find_by_user(UserId(1)).await.unwrap().is_empty());
    }
}
