/// Schema for the three durable collections: cached videos, pending
/// mutations and sync metadata.
pub const SCHEMA: &str = r#"
-- Projected remote entities (serialized JSON in `data`)
CREATE TABLE IF NOT EXISTS videos (
    id TEXT PRIMARY KEY,
    video_id TEXT NOT NULL,
    published_at TEXT NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_videos_video_id ON videos(video_id);
CREATE INDEX IF NOT EXISTS idx_videos_published ON videos(published_at);

-- Local writes awaiting remote confirmation
CREATE TABLE IF NOT EXISTS pending_mutations (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    target_id TEXT NOT NULL,
    payload TEXT,
    timestamp TEXT NOT NULL,
    seq INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_pending_mutations_timestamp
    ON pending_mutations(timestamp, seq);
CREATE INDEX IF NOT EXISTS idx_pending_mutations_target
    ON pending_mutations(target_id);

-- Key/value sync bookkeeping
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
