//! Inventory seeding for tests. Racks, switches and panels are owned by the
//! inventory tool in production, so only tests insert them directly.

use std::time::Duration;
use tempfile::TempDir;

use crate::models::PanelFamily;

use super::Store;

/// Fresh store on a throwaway SQLite file. Keep the TempDir alive for the test.
pub async fn test_store() -> (TempDir, Store) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = Store::with_options(dir.path().join("rack-sync.db"), 5, Duration::from_secs(5))
        .await
        .expect("open test store");
    (dir, store)
}

/// Insert the rack if missing and return its id
pub async fn seed_rack(store: &Store, name: &str) -> i64 {
    sqlx::query("INSERT OR IGNORE INTO racks (name) VALUES (?)")
        .bind(name)
        .execute(store.pool())
        .await
        .expect("insert rack");
    let row: (i64,) = sqlx::query_as("SELECT id FROM racks WHERE name = ?")
        .bind(name)
        .fetch_one(store.pool())
        .await
        .expect("select rack");
    row.0
}

/// Returns (rack_id, switch_id)
pub async fn seed_switch(store: &Store, rack: &str, name: &str, ports: i64) -> (i64, i64) {
    let rack_id = seed_rack(store, rack).await;
    let result = sqlx::query("INSERT INTO switches (name, rack_id, ports) VALUES (?, ?, ?)")
        .bind(name)
        .bind(rack_id)
        .bind(ports)
        .execute(store.pool())
        .await
        .expect("insert switch");
    (rack_id, result.last_insert_rowid())
}

/// Returns (rack_id, panel_id)
pub async fn seed_panel(store: &Store, rack: &str, family: PanelFamily, letter: &str) -> (i64, i64) {
    let rack_id = seed_rack(store, rack).await;
    let sql = match family {
        PanelFamily::Patch => "INSERT INTO patch_panels (rack_id, panel_letter, total_ports) VALUES (?, ?, 24)",
        PanelFamily::Fiber => "INSERT INTO fiber_panels (rack_id, panel_letter, total_fibers) VALUES (?, ?, 12)",
    };
    let result = sqlx::query(sql)
        .bind(rack_id)
        .bind(letter)
        .execute(store.pool())
        .await
        .expect("insert panel");
    (rack_id, result.last_insert_rowid())
}

/// Row counts of (ports, patch_ports + fiber_ports, connection_history)
pub async fn table_counts(store: &Store) -> (i64, i64, i64) {
    let count = |table: &'static str| async move {
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(store.pool())
            .await
            .expect("count rows");
        row.0
    };
    let ports = count("ports").await;
    let panel_ports = count("patch_ports").await + count("fiber_ports").await;
    let history = count("connection_history").await;
    (ports, panel_ports, history)
}
