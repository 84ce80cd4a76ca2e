use serde::{Deserialize, Serialize};

/// A saved URL owned by exactly one user.
///
/// `deleted_at` is set if and only if `is_deleted` is true. Only
/// [`BookmarkPatch`] constructors should be used to change either field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub user_id: String,
    pub collection_id: Option<String>,
    pub title: String,
    pub url: String,
    pub is_favorite: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Bookmark {
    /// Whether the soft-delete fields agree with each other.
    pub fn trash_state_consistent(&self) -> bool {
        self.is_deleted == self.deleted_at.is_some()
    }
}

/// Fields required to insert a bookmark. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub user_id: String,
    pub title: String,
    pub url: String,
    pub collection_id: Option<String>,
}

/// Partial update of a single bookmark row.
///
/// `None` leaves a field untouched. For the nullable columns the inner
/// `Option` is the new value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkPatch {
    pub is_favorite: Option<bool>,
    pub is_deleted: Option<bool>,
    pub deleted_at: Option<Option<i64>>,
    pub collection_id: Option<Option<String>>,
}

impl BookmarkPatch {
    pub fn favorite(value: bool) -> Self {
        Self {
            is_favorite: Some(value),
            ..Self::default()
        }
    }

    /// Soft-deletes the row, stamping `deleted_at` with `now`.
    pub fn trash(now: i64) -> Self {
        Self {
            is_deleted: Some(true),
            deleted_at: Some(Some(now)),
            ..Self::default()
        }
    }

    pub fn restore() -> Self {
        Self {
            is_deleted: Some(false),
            deleted_at: Some(None),
            ..Self::default()
        }
    }

    pub fn move_to(collection_id: Option<&str>) -> Self {
        Self {
            collection_id: Some(collection_id.map(str::to_string)),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_favorite.is_none()
            && self.is_deleted.is_none()
            && self.deleted_at.is_none()
            && self.collection_id.is_none()
    }

    /// Applies the patch to a local copy of a row.
    pub fn apply_to(&self, bookmark: &mut Bookmark) {
        if let Some(fav) = self.is_favorite {
            bookmark.is_favorite = fav;
        }
        if let Some(deleted) = self.is_deleted {
            bookmark.is_deleted = deleted;
        }
        if let Some(deleted_at) = self.deleted_at {
            bookmark.deleted_at = deleted_at;
        }
        if let Some(collection_id) = &self.collection_id {
            bookmark.collection_id = collection_id.clone();
        }
    }
}

/// A named, user-ordered group of bookmarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub position: i32,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCollection {
    pub user_id: String,
    pub name: String,
    pub position: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPatch {
    pub name: Option<String>,
    pub position: Option<i32>,
}
