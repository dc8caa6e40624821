use crate::app::storage::LocalStore;
use crate::formats::Bookmark;

pub const BOOKMARKS_KEY: &str = "bookmarks";
pub const VISITED_KEY: &str = "visited";

/// Bookmarks keyed by chapter id, read once when opened and written through on
/// every change.
#[derive(Debug)]
pub struct BookmarkStore {
    store: LocalStore,
    items: Vec<Bookmark>,
}

impl BookmarkStore {
    /// An absent or unreadable entry opens as an empty list.
    pub async fn open(store: LocalStore) -> Self {
        let items = match store.get_item::<Vec<Bookmark>>(BOOKMARKS_KEY).await {
            Ok(items) => items.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(err = %format!("{err:#}"), "ignoring unreadable bookmarks");
                Vec::new()
            }
        };
        tracing::debug!(count = items.len(), "bookmarks loaded");
        Self { store, items }
    }

    pub fn list(&self) -> &[Bookmark] {
        &self.items
    }

    pub fn contains(&self, chapter: u32) -> bool {
        self.items.iter().any(|b| b.chapter == chapter)
    }

    /// Returns `false` when the chapter was already bookmarked.
    pub async fn add(&mut self, bookmark: Bookmark) -> anyhow::Result<bool> {
        if self.contains(bookmark.chapter) {
            return Ok(false);
        }
        let mut items = self.items.clone();
        items.push(bookmark);
        self.replace(items).await?;
        Ok(true)
    }

    /// Returns `false` when the chapter was not bookmarked.
    pub async fn remove(&mut self, chapter: u32) -> anyhow::Result<bool> {
        if !self.contains(chapter) {
            return Ok(false);
        }
        let items = self
            .items
            .iter()
            .filter(|b| b.chapter != chapter)
            .cloned()
            .collect();
        self.replace(items).await?;
        Ok(true)
    }

    /// Adds or removes; returns whether the chapter is bookmarked afterwards.
    pub async fn toggle(&mut self, bookmark: Bookmark) -> anyhow::Result<bool> {
        if self.contains(bookmark.chapter) {
            self.remove(bookmark.chapter).await?;
            Ok(false)
        } else {
            self.add(bookmark).await?;
            Ok(true)
        }
    }

    /// Memory only changes once the write has succeeded.
    async fn replace(&mut self, items: Vec<Bookmark>) -> anyhow::Result<()> {
        self.store.set_item(BOOKMARKS_KEY, &items).await?;
        tracing::debug!(count = items.len(), "bookmarks saved");
        self.items = items;
        Ok(())
    }
}

/// Whether this data directory has been used before. Unreadable reads as `false`.
pub async fn has_visited(store: &LocalStore) -> bool {
    match store.get_item::<bool>(VISITED_KEY).await {
        Ok(flag) => flag.unwrap_or(false),
        Err(err) => {
            tracing::warn!(err = %format!("{err:#}"), "ignoring unreadable visited flag");
            false
        }
    }
}

pub async fn mark_visited(store: &LocalStore) -> anyhow::Result<()> {
    store.set_item(VISITED_KEY, &true).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bookmark(chapter: u32) -> Bookmark {
        Bookmark {
            title: format!("Chapter {chapter}"),
            chapter,
        }
    }

    #[tokio::test]
    async fn mutations_write_through() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut bookmarks = BookmarkStore::open(LocalStore::new(dir.path())).await;
        assert!(bookmarks.add(bookmark(3)).await?);
        assert!(!bookmarks.add(bookmark(3)).await?);
        assert!(bookmarks.add(bookmark(1)).await?);

        let reopened = BookmarkStore::open(LocalStore::new(dir.path())).await;
        assert_eq!(reopened.list(), &[bookmark(3), bookmark(1)]);

        let mut bookmarks = reopened;
        assert!(bookmarks.remove(3).await?);
        assert!(!bookmarks.remove(3).await?);
        let reopened = BookmarkStore::open(LocalStore::new(dir.path())).await;
        assert_eq!(reopened.list(), &[bookmark(1)]);
        Ok(())
    }

    #[tokio::test]
    async fn toggle_flips_membership() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut bookmarks = BookmarkStore::open(LocalStore::new(dir.path())).await;
        assert!(bookmarks.toggle(bookmark(2)).await?);
        assert!(bookmarks.contains(2));
        assert!(!bookmarks.toggle(bookmark(2)).await?);
        assert!(!bookmarks.contains(2));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_entry_opens_empty() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("bookmarks.json"), br#"{"title": 1}"#)?;
        std::fs::write(dir.path().join("visited.json"), b"maybe")?;
        let store = LocalStore::new(dir.path());

        assert!(BookmarkStore::open(store.clone()).await.list().is_empty());
        assert!(!has_visited(&store).await);
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_leaves_list_unchanged() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let good = LocalStore::new(dir.path());
        good.set_item(BOOKMARKS_KEY, &vec![bookmark(1)]).await?;
        let mut bookmarks = BookmarkStore::open(good).await;

        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file")?;
        bookmarks.store = LocalStore::new(&blocker);

        assert!(bookmarks.add(bookmark(7)).await.is_err());
        assert!(!bookmarks.contains(7));
        assert!(bookmarks.remove(1).await.is_err());
        assert!(bookmarks.contains(1));
        assert_eq!(bookmarks.list(), &[bookmark(1)]);
        Ok(())
    }

    #[tokio::test]
    async fn visited_flag_round_trips() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = LocalStore::new(dir.path());
        assert!(!has_visited(&store).await);
        mark_visited(&store).await?;
        assert!(has_visited(&store).await);
        Ok(())
    }
}
