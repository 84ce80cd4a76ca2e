//! Linkshelf demo.
//!
//! Runs two sessions of the same user against a local gateway and shows a
//! change made in one propagating to the other.

use std::sync::Arc;
use std::time::Duration;

use linkshelf::app::SyncApp;
use linkshelf::gateway::local::LocalGateway;
use linkshelf::services::logging;
use linkshelf::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use linkshelf::types::bookmark::{Bookmark, Collection};
use linkshelf::types::feed::ChannelStatus;
use linkshelf::types::outcome::Outcome;
use linkshelf::types::view::{Bucket, ViewSpec};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = SettingsEngine::new(None);
    let settings = engine.load()?;
    logging::init(&settings.log_filter);

    let gateway = Arc::new(match &settings.database_path {
        Some(path) => LocalGateway::open(path)?,
        None => LocalGateway::open_in_memory()?,
    });

    let laptop = SyncApp::new(gateway.clone(), &settings);
    let phone = SyncApp::new(gateway.clone(), &settings);
    laptop.sign_in("demo-user").await?;
    phone.sign_in("demo-user").await?;

    section("Collections");
    let reading = laptop.collections.create("Reading").await?;
    println!("  created collection '{}' at position {}", reading.name, reading.position);
    let duplicate: Outcome<Collection> = phone.collections.create("Reading").await.into();
    println!("  second 'Reading' from phone: {}", serde_json::to_string(&duplicate)?);

    section("Optimistic add");
    let rust = laptop
        .projection
        .add_bookmark("The Rust Book", "https://doc.rust-lang.org/book/", Some(&reading.id))
        .await?;
    laptop
        .projection
        .add_bookmark("Tokio", "https://tokio.rs", None)
        .await?;
    print_items("laptop/all", &laptop.projection.items());

    settle().await;
    print_items("phone/all (via change feed)", &phone.projection.items());

    section("Favorites and trash");
    laptop.projection.toggle_favorite(&rust.id).await?;
    laptop.projection.load(ViewSpec::bucket(Bucket::Favorites)).await?;
    print_items("laptop/favorites", &laptop.projection.items());
    laptop.projection.load(ViewSpec::bucket(Bucket::All)).await?;
    laptop.projection.move_to_trash(&rust.id).await?;
    println!("  counts: {:?}", laptop.counts.counts());

    section("Degraded channel");
    gateway.interrupt_feed("demo-user", ChannelStatus::Closed);
    println!(
        "  phone channel: {:?}, polling: {}",
        phone.supervisor().state(),
        phone.supervisor().is_polling()
    );

    section("Collection delete");
    let moved = laptop.delete_collection(&reading.id).await?;
    println!("  {} bookmark(s) moved to unassigned", moved);

    laptop.sign_out();
    phone.sign_out();
    Ok(())
}

fn section(name: &str) {
    println!("───────────────────────────────────────────────────────────────");
    println!("  {}", name);
    println!("───────────────────────────────────────────────────────────────");
}

fn print_items(label: &str, items: &[Bookmark]) {
    println!("  {} ({} items)", label, items.len());
    for b in items {
        let star = if b.is_favorite { "*" } else { " " };
        println!("   {} {}  {}", star, b.title, b.url);
    }
}

/// Lets the driver tasks drain queued reconciliations.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
