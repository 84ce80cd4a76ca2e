//! Property-based tests for optimistic favorite toggles.
//!
//! For any sequence of toggles, some of which the gateway rejects, the
//! projection must agree with the store after every call: accepted toggles
//! stick and rejected ones are undone exactly.

#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::Ordering;

use proptest::prelude::*;

use common::{identity, local, seed, FlakyGateway, USER};
use linkshelf::gateway::RemoteBookmarkGateway;
use linkshelf::managers::projection::BookmarkProjection;
use linkshelf::types::bookmark::BookmarkPatch;
use linkshelf::types::view::{Bucket, ViewSpec};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn projection_tracks_store_through_toggles(
        rows in 1..6usize,
        toggles in prop::collection::vec((0..6usize, any::<bool>()), 1..25),
    ) {
        runtime().block_on(async move {
            let gw = FlakyGateway::new(local());
            seed(&gw.inner, USER, rows).await;
            let projection = BookmarkProjection::new(gw.clone(), identity());
            projection.load(ViewSpec::default()).await.unwrap();
            let ids: Vec<String> = projection.items().into_iter().map(|b| b.id).collect();

            for (index, fail) in toggles {
                let id = &ids[index % rows];
                let before = projection.items();
                gw.fail_updates.store(fail, Ordering::SeqCst);

                let result = projection.toggle_favorite(id).await;

                let stored = gw
                    .inner
                    .select_bookmarks(USER, &Bucket::All.query())
                    .await
                    .unwrap();
                let mine = projection.items();
                assert_eq!(result.is_err(), fail);
                if fail {
                    assert_eq!(mine, before, "rejected toggle must restore the exact list");
                }
                for (local_row, stored_row) in mine.iter().zip(stored.iter()) {
                    assert_eq!(local_row.id, stored_row.id);
                    assert_eq!(local_row.is_favorite, stored_row.is_favorite);
                }
            }
        });
    }

    #[test]
    fn favorites_view_only_holds_favorites(
        rows in 1..6usize,
        toggles in prop::collection::vec((0..6usize, any::<bool>()), 1..25),
    ) {
        runtime().block_on(async move {
            let gw = FlakyGateway::new(local());
            let seeded = seed(&gw.inner, USER, rows).await;
            for b in &seeded {
                gw.inner
                    .update_bookmark(USER, &b.id, BookmarkPatch::favorite(true))
                    .await
                    .unwrap();
            }
            let projection = BookmarkProjection::new(gw.clone(), identity());
            projection.load(ViewSpec::bucket(Bucket::Favorites)).await.unwrap();

            for (index, fail) in toggles {
                let items = projection.items();
                if items.is_empty() {
                    break;
                }
                let id = items[index % items.len()].id.clone();
                gw.fail_updates.store(fail, Ordering::SeqCst);

                let _ = projection.toggle_favorite(&id).await;

                let stored = gw
                    .inner
                    .select_bookmarks(USER, &Bucket::Favorites.query())
                    .await
                    .unwrap();
                let mine = projection.items();
                assert!(mine.iter().all(|b| b.is_favorite));
                let mine_ids: Vec<&str> = mine.iter().map(|b| b.id.as_str()).collect();
                let stored_ids: Vec<&str> = stored.iter().map(|b| b.id.as_str()).collect();
                assert_eq!(mine_ids, stored_ids);
            }
        });
    }
}
