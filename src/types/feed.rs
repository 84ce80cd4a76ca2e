use serde::{Deserialize, Serialize};

/// Status transitions reported by a change-feed subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    Subscribed,
    Error(String),
    TimedOut,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Bookmarks,
    Collections,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A hint that some row changed. Consumers reconcile instead of applying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub kind: ChangeKind,
    pub row_id: String,
}

/// Everything a subscription can deliver to its sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Status(ChannelStatus),
    Changes(Vec<ChangeEvent>),
}

/// Connection state of the supervised subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Live,
}

/// Why a reconciliation pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileTrigger {
    Change,
    Poll,
    Foreground,
    ChannelFailure,
}
