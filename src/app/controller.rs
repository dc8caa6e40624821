use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::app::bookmarks::{self, BookmarkStore};
use crate::app::pane::ContentPane;
use crate::app::share::{Clipboard, SharePlatform, ShareOutcome, ShareRequest, share_with_fallback};
use crate::app::storage::LocalStore;
use crate::config::Settings;
use crate::content::ContentStore;
use crate::error::LoadError;
use crate::events::{AppEvent, ContentSelection, EventBus};
use crate::formats::{Bookmark, Course};
use crate::mindmap::{LayoutKind, MindMap};
use crate::nav::NavigationTree;
use crate::search::{Debouncer, SearchIndex, SearchItem, SearchView};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    MindmapOnly,
    ContentOnly,
    #[default]
    Split,
}

/// Wires the navigation tree, mind map and search to one content pane.
///
/// All three views emit [`AppEvent::Content`] on the shared bus; [`AppController::pump`]
/// is the single place those turn into a rendered pane.
pub struct AppController {
    course: Arc<Course>,
    bus: EventBus,
    events: broadcast::Receiver<AppEvent>,
    nav: NavigationTree,
    mindmap: MindMap,
    search: SearchIndex,
    debouncer: Debouncer,
    mode: ViewMode,
    breakpoint_px: u32,
    pane: Option<ContentPane>,
    store: LocalStore,
    bookmarks: BookmarkStore,
    first_visit: bool,
}

impl AppController {
    /// Loads the course, then builds the views. A load failure is returned as is; the
    /// caller shows it with [`crate::app::pane::render_load_error`].
    pub async fn start(
        content: &ContentStore,
        settings: &Settings,
        layout: LayoutKind,
    ) -> Result<Self, LoadError> {
        let course = content.load().await?;
        let store = LocalStore::new(&settings.data_dir);
        let bookmarks = BookmarkStore::open(store.clone()).await;
        let first_visit = !bookmarks::has_visited(&store).await;
        if first_visit && let Err(err) = bookmarks::mark_visited(&store).await {
            tracing::warn!(err = %format!("{err:#}"), "failed to record first visit");
        }
        Ok(Self::with_parts(course, settings, layout, store, bookmarks, first_visit))
    }

    fn with_parts(
        course: Arc<Course>,
        settings: &Settings,
        layout: LayoutKind,
        store: LocalStore,
        bookmarks: BookmarkStore,
        first_visit: bool,
    ) -> Self {
        let bus = EventBus::default();
        let events = bus.subscribe();
        let nav = NavigationTree::new(&course, bus.clone());
        let mindmap = MindMap::from_course(&course, layout, bus.clone());
        let search = SearchIndex::new(Arc::clone(&course));
        tracing::info!(
            chapters = course.chapters.len(),
            layout = mindmap.layout_name(),
            first_visit,
            "course browser ready"
        );
        Self {
            course,
            bus,
            events,
            nav,
            mindmap,
            search,
            debouncer: Debouncer::new(settings.search_debounce),
            mode: ViewMode::default(),
            breakpoint_px: settings.breakpoint_px,
            pane: None,
            store,
            bookmarks,
            first_visit,
        }
    }

    pub fn course(&self) -> &Arc<Course> {
        &self.course
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn nav(&self) -> &NavigationTree {
        &self.nav
    }

    pub fn nav_mut(&mut self) -> &mut NavigationTree {
        &mut self.nav
    }

    pub fn mindmap(&self) -> &MindMap {
        &self.mindmap
    }

    pub fn mindmap_mut(&mut self) -> &mut MindMap {
        &mut self.mindmap
    }

    pub fn is_first_visit(&self) -> bool {
        self.first_visit
    }

    pub fn breakpoint_px(&self) -> u32 {
        self.breakpoint_px
    }

    pub fn view_mode(&self) -> ViewMode {
        self.mode
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        if self.mode != mode {
            tracing::debug!(from = ?self.mode, to = ?mode, "view mode");
            self.mode = mode;
        }
    }

    /// Narrow widths push split view to content-only. Widening never restores split.
    pub fn on_resize(&mut self, width: u32) -> ViewMode {
        if self.mode == ViewMode::Split && width < self.breakpoint_px {
            tracing::info!(width, breakpoint = self.breakpoint_px, "narrow viewport, content only");
            self.mode = ViewMode::ContentOnly;
        }
        self.mode
    }

    pub fn search(&self, raw: &str) -> Option<SearchView> {
        self.search.query(raw)
    }

    /// Runs the search after the debounce delay, replacing any pending one.
    pub fn search_debounced<F>(&mut self, raw: String, deliver: F)
    where
        F: FnOnce(Option<SearchView>) + Send + 'static,
    {
        let index = self.search.clone();
        self.debouncer.schedule(async move {
            deliver(index.query(&raw));
        });
    }

    pub fn open_search_result(&self, item: &SearchItem) {
        self.bus.emit(AppEvent::Content(item.target.clone()));
    }

    /// Handles every queued event. Returns how many content selections were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.events.try_recv() {
                Ok(AppEvent::Content(selection)) => {
                    match ContentPane::resolve(&self.course, &selection) {
                        Some(pane) => {
                            tracing::debug!(
                                event = selection.event_name(),
                                chapter_id = selection.chapter,
                                "show content"
                            );
                            self.pane = Some(pane);
                            applied += 1;
                        }
                        None => {
                            tracing::debug!(?selection, "selection not found, pane unchanged");
                        }
                    }
                }
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event consumer lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        applied
    }

    pub fn pane(&self) -> Option<&ContentPane> {
        self.pane.as_ref()
    }

    /// Emits `selection` and pumps it. `None` when it resolves to nothing; the
    /// previous pane stays in place.
    pub fn select(&mut self, selection: ContentSelection) -> Option<&ContentPane> {
        self.bus.emit(AppEvent::Content(selection));
        if self.pump() == 0 {
            return None;
        }
        self.pane.as_ref()
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        self.bookmarks.list()
    }

    pub fn is_bookmarked(&self, chapter: u32) -> bool {
        self.bookmarks.contains(chapter)
    }

    fn bookmark_for(&self, chapter: u32) -> anyhow::Result<Bookmark> {
        let title = self
            .course
            .chapter(chapter)
            .map(|c| c.title.clone())
            .ok_or_else(|| anyhow::anyhow!("unknown chapter: {chapter}"))?;
        Ok(Bookmark { title, chapter })
    }

    /// Returns whether the chapter is bookmarked afterwards.
    pub async fn toggle_bookmark(&mut self, chapter: u32) -> anyhow::Result<bool> {
        let bookmark = self.bookmark_for(chapter)?;
        self.bookmarks.toggle(bookmark).await
    }

    /// Returns `false` when the chapter was already bookmarked.
    pub async fn add_bookmark(&mut self, chapter: u32) -> anyhow::Result<bool> {
        let bookmark = self.bookmark_for(chapter)?;
        self.bookmarks.add(bookmark).await
    }

    /// Returns `false` when the chapter was not bookmarked.
    pub async fn remove_bookmark(&mut self, chapter: u32) -> anyhow::Result<bool> {
        self.bookmarks.remove(chapter).await
    }

    /// Shares the content currently shown. `None` when the pane is empty.
    pub fn share_current(
        &self,
        platform: &dyn SharePlatform,
        clipboard: &dyn Clipboard,
        base_url: Option<&str>,
    ) -> Option<ShareOutcome> {
        let pane = self.pane.as_ref()?;
        let request = ShareRequest::for_pane(pane, &self.course.course_title, base_url);
        Some(share_with_fallback(platform, clipboard, &request))
    }
}
