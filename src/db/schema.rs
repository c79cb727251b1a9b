/// Schema for the shared offline store.
///
/// Both subsystems live in one database: the response cache partitions used
/// by the fetch router, and the per-type record stores drained by the sync
/// queue.
pub const SCHEMA: &str = r#"
-- Cached HTTP responses, grouped into named partitions
CREATE TABLE IF NOT EXISTS response_cache (
    partition TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (partition, url_hash)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_stored
    ON response_cache(partition, stored_at);

-- Locally created or edited records pending synchronization
CREATE TABLE IF NOT EXISTS sync_records (
    record_type TEXT NOT NULL,
    record_id TEXT NOT NULL,
    payload BLOB NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0,
    dead INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0,
    sort_key TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (record_type, record_id)
);

CREATE INDEX IF NOT EXISTS idx_sync_records_synced
    ON sync_records(record_type, synced);

CREATE INDEX IF NOT EXISTS idx_sync_records_sort
    ON sync_records(record_type, sort_key);
"#;
