//! View descriptions: which slice of a user's bookmarks a consumer wants,
//! and the store-side filters each slice translates to.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::bookmark::Bookmark;

/// Maximum number of rows in the `recent` bucket.
pub const RECENT_LIMIT: usize = 10;

/// A fixed navigation bucket or a user-defined collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    All,
    Favorites,
    Recent,
    Trash,
    Collection(String),
}

impl Bucket {
    /// The store-side predicate for this bucket.
    pub fn filter(&self) -> BookmarkFilter {
        match self {
            Bucket::All | Bucket::Recent => BookmarkFilter::live(),
            Bucket::Favorites => BookmarkFilter {
                is_favorite: Some(true),
                ..BookmarkFilter::live()
            },
            Bucket::Trash => BookmarkFilter::trashed(),
            Bucket::Collection(id) => BookmarkFilter {
                collection_id: Some(id.clone()),
                ..BookmarkFilter::live()
            },
        }
    }

    /// The full read issued when loading this bucket.
    pub fn query(&self) -> BookmarkQuery {
        let limit = match self {
            Bucket::Recent => Some(RECENT_LIMIT),
            Bucket::All | Bucket::Favorites | Bucket::Trash | Bucket::Collection(_) => None,
        };
        BookmarkQuery {
            filter: self.filter(),
            limit,
        }
    }

    /// Whether a freshly created row may be shown under this bucket without
    /// waiting for a reload.
    pub fn admits_new(&self, bookmark: &Bookmark) -> bool {
        match self {
            Bucket::All | Bucket::Recent => true,
            Bucket::Favorites => bookmark.is_favorite && !bookmark.is_deleted,
            Bucket::Trash => bookmark.is_deleted,
            Bucket::Collection(id) => bookmark.collection_id.as_deref() == Some(id.as_str()),
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::All => write!(f, "all"),
            Bucket::Favorites => write!(f, "favorites"),
            Bucket::Recent => write!(f, "recent"),
            Bucket::Trash => write!(f, "trash"),
            Bucket::Collection(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for Bucket {
    type Err = std::convert::Infallible;

    /// Parses the loose identifier used by navigation links. Anything that is
    /// not a fixed bucket name is treated as a collection id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "all" | "" => Bucket::All,
            "favorites" => Bucket::Favorites,
            "recent" => Bucket::Recent,
            "trash" => Bucket::Trash,
            other => Bucket::Collection(other.to_string()),
        })
    }
}

/// Store-side row predicate. Every field is ANDed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkFilter {
    pub is_deleted: bool,
    pub is_favorite: Option<bool>,
    pub collection_id: Option<String>,
}

impl BookmarkFilter {
    pub fn live() -> Self {
        Self {
            is_deleted: false,
            is_favorite: None,
            collection_id: None,
        }
    }

    pub fn trashed() -> Self {
        Self {
            is_deleted: true,
            is_favorite: None,
            collection_id: None,
        }
    }

    pub fn matches(&self, bookmark: &Bookmark) -> bool {
        bookmark.is_deleted == self.is_deleted
            && self.is_favorite.map_or(true, |fav| bookmark.is_favorite == fav)
            && self
                .collection_id
                .as_deref()
                .map_or(true, |id| bookmark.collection_id.as_deref() == Some(id))
    }
}

/// A filtered read. Results are always ordered by `created_at` descending
/// (ties broken by id descending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkQuery {
    pub filter: BookmarkFilter,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// What a consumer wants to render: a bucket plus client-side search and sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub bucket: Bucket,
    pub search_text: String,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
}

impl Default for ViewSpec {
    fn default() -> Self {
        Self::bucket(Bucket::All)
    }
}

impl ViewSpec {
    pub fn bucket(bucket: Bucket) -> Self {
        Self {
            bucket,
            search_text: String::new(),
            sort_key: SortKey::default(),
            sort_direction: SortDirection::default(),
        }
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search_text = text.into();
        self
    }

    pub fn sorted_by(mut self, key: SortKey, direction: SortDirection) -> Self {
        self.sort_key = key;
        self.sort_direction = direction;
        self
    }

    /// Two specs read the same rows from the store when their buckets match;
    /// search and sort are applied locally.
    pub fn same_source(&self, other: &ViewSpec) -> bool {
        self.bucket == other.bucket
    }

    fn matches_search(&self, bookmark: &Bookmark) -> bool {
        let needle = self.search_text.trim();
        if needle.is_empty() {
            return true;
        }
        let needle = needle.to_lowercase();
        bookmark.title.to_lowercase().contains(&needle)
            || bookmark.url.to_lowercase().contains(&needle)
    }

    fn compare(&self, a: &Bookmark, b: &Bookmark) -> Ordering {
        let ord = match self.sort_key {
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        };
        match self.sort_direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }

    /// Search and sort a list of rows for rendering. The sort is stable, so
    /// rows that compare equal keep their store order.
    pub fn apply(&self, items: &[Bookmark]) -> Vec<Bookmark> {
        let mut out: Vec<Bookmark> = items
            .iter()
            .filter(|b| self.matches_search(b))
            .cloned()
            .collect();
        out.sort_by(|a, b| self.compare(a, b));
        out
    }
}
