use serde::ser::SerializeMap as _;
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;

use crate::formats::SectionRef;
use crate::nav::NavNodeId;

const DEFAULT_CAPACITY: usize = 256;

/// What to show in the content pane. Navigation, mind map and search all emit this
/// same shape.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ContentSelection {
    pub chapter: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub takeaway: Option<usize>,
}

impl ContentSelection {
    pub fn chapter(chapter: u32) -> Self {
        Self {
            chapter,
            section: None,
            takeaway: None,
        }
    }

    pub fn section(chapter: u32, section: SectionRef) -> Self {
        Self {
            chapter,
            section: Some(section),
            takeaway: None,
        }
    }

    pub fn takeaway(chapter: u32, index: usize) -> Self {
        Self {
            chapter,
            section: None,
            takeaway: Some(index),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match (&self.section, self.takeaway) {
            (Some(_), _) => "content:loadSection",
            (None, Some(_)) => "content:loadTakeaway",
            (None, None) => "content:loadChapter",
        }
    }
}

/// Serialized as one flat object whose `event` field is [`AppEvent::name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Content(ContentSelection),
    MindmapNodeClick { node: String },
    NavItemClick { item: NavNodeId },
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Content(selection) => selection.event_name(),
            Self::MindmapNodeClick { .. } => "mindmap:nodeClick",
            Self::NavItemClick { .. } => "nav:itemClick",
        }
    }
}

impl Serialize for AppEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("event", self.name())?;
        match self {
            Self::Content(selection) => {
                map.serialize_entry("chapter", &selection.chapter)?;
                if let Some(section) = &selection.section {
                    map.serialize_entry("section", section)?;
                }
                if let Some(takeaway) = selection.takeaway {
                    map.serialize_entry("takeaway", &takeaway)?;
                }
            }
            Self::MindmapNodeClick { node } => map.serialize_entry("node", node)?,
            Self::NavItemClick { item } => map.serialize_entry("item", item)?,
        }
        map.end()
    }
}

/// Typed in-process event channel shared by the views and the controller.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: AppEvent) {
        tracing::debug!(event = event.name(), ?event, "emit");
        // Fails only when nobody is subscribed.
        let _ = self.tx.send(event);
    }
}
