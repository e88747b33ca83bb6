//! SQLite schema for the full data model. One DDL string executed via
//! `execute_batch` rather than an ORM or a migrations directory.

use rusqlite::Connection;

use crate::error::Result;

pub fn init_sqlite_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SQL)?;
    Ok(())
}

const SQL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS clusters (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    load_a_factor REAL NOT NULL DEFAULT 1.0,
    load_m_factor REAL NOT NULL DEFAULT 30.0,
    load_cpu_iterations INTEGER NOT NULL DEFAULT 6,
    load_cpu_max REAL NOT NULL DEFAULT 5000.0,
    hash_algorithm TEXT NOT NULL DEFAULT 'sha256'
);

CREATE TABLE IF NOT EXISTS cluster_groups (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS cluster_group_relations (
    uuid TEXT PRIMARY KEY,
    cluster_group_uuid TEXT NOT NULL REFERENCES cluster_groups(uuid) ON DELETE CASCADE,
    cluster_uuid TEXT NOT NULL REFERENCES clusters(uuid) ON DELETE CASCADE,
    UNIQUE(cluster_group_uuid, cluster_uuid)
);

CREATE TABLE IF NOT EXISTS nodes (
    uuid TEXT PRIMARY KEY,
    cluster_uuid TEXT NOT NULL REFERENCES clusters(uuid) ON DELETE RESTRICT,
    slug TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    secret TEXT NOT NULL,
    attendees INTEGER NOT NULL DEFAULT 0,
    meetings INTEGER NOT NULL DEFAULT 0,
    cpu_load INTEGER NOT NULL DEFAULT 0,
    has_errors INTEGER NOT NULL DEFAULT 1,
    maintenance INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS node_meeting_lists (
    node_uuid TEXT PRIMARY KEY REFERENCES nodes(uuid) ON DELETE CASCADE,
    xml TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tenants (
    uuid TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    cluster_group_uuid TEXT NOT NULL REFERENCES cluster_groups(uuid) ON DELETE RESTRICT,
    attendee_limit INTEGER NOT NULL DEFAULT 0,
    meeting_limit INTEGER NOT NULL DEFAULT 0,
    recording_enabled INTEGER NOT NULL DEFAULT 0,
    records_hold_time INTEGER NOT NULL DEFAULT 14,
    stats_token TEXT NOT NULL UNIQUE,

    CHECK (slug = upper(slug))
);

CREATE TABLE IF NOT EXISTS secrets (
    uuid TEXT PRIMARY KEY,
    tenant_uuid TEXT NOT NULL REFERENCES tenants(uuid) ON DELETE CASCADE,
    description TEXT NOT NULL DEFAULT '',
    sub_id INTEGER NOT NULL,
    secret TEXT NOT NULL,
    secret2 TEXT NOT NULL DEFAULT '',
    attendee_limit INTEGER NOT NULL DEFAULT 0,
    meeting_limit INTEGER NOT NULL DEFAULT 0,
    recording_enabled INTEGER NOT NULL DEFAULT 1,
    records_hold_time INTEGER NOT NULL DEFAULT 14,

    UNIQUE(tenant_uuid, sub_id),
    CHECK (sub_id BETWEEN 0 AND 999)
);

CREATE TABLE IF NOT EXISTS secret_meeting_lists (
    secret_uuid TEXT PRIMARY KEY REFERENCES secrets(uuid) ON DELETE CASCADE,
    xml TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS meetings (
    id TEXT NOT NULL,
    secret_uuid TEXT NOT NULL REFERENCES secrets(uuid) ON DELETE CASCADE,
    node_uuid TEXT NOT NULL REFERENCES nodes(uuid) ON DELETE CASCADE,
    room_name TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    attendees INTEGER NOT NULL DEFAULT 0,
    listener_count INTEGER NOT NULL DEFAULT 0,
    voice_participant_count INTEGER NOT NULL DEFAULT 0,
    moderator_count INTEGER NOT NULL DEFAULT 0,
    video_count INTEGER NOT NULL DEFAULT 0,
    bbb_origin TEXT NOT NULL DEFAULT '',
    bbb_origin_server_name TEXT NOT NULL DEFAULT '',
    end_callback_url TEXT NOT NULL DEFAULT '',
    nonce TEXT NOT NULL UNIQUE,

    PRIMARY KEY (id, secret_uuid)
);

CREATE INDEX IF NOT EXISTS idx_meetings_node ON meetings(node_uuid);

CREATE TABLE IF NOT EXISTS record_profiles (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    webcam_width INTEGER NOT NULL DEFAULT 0,
    webcam_height INTEGER NOT NULL DEFAULT 0,
    webcam_side_by_side INTEGER NOT NULL DEFAULT 0,
    include_annotations INTEGER NOT NULL DEFAULT 0,
    container TEXT NOT NULL DEFAULT 'mp4',
    extension TEXT NOT NULL DEFAULT 'mp4',
    is_default INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS secret_record_profile_relations (
    uuid TEXT PRIMARY KEY,
    secret_uuid TEXT NOT NULL REFERENCES secrets(uuid) ON DELETE CASCADE,
    record_profile_uuid TEXT NOT NULL REFERENCES record_profiles(uuid) ON DELETE CASCADE,
    UNIQUE(secret_uuid, record_profile_uuid)
);

CREATE TABLE IF NOT EXISTS record_sets (
    uuid TEXT PRIMARY KEY,
    secret_uuid TEXT NOT NULL REFERENCES secrets(uuid) ON DELETE CASCADE,
    meeting_id TEXT NOT NULL DEFAULT '',
    state TEXT NOT NULL DEFAULT 'UNKNOWN',
    nonce TEXT NOT NULL UNIQUE,
    recording_ready_origin_url TEXT,
    created_at TEXT NOT NULL,
    bbb_origin TEXT,
    bbb_origin_version TEXT,
    bbb_origin_server_name TEXT,
    started_at TEXT,
    ended_at TEXT,
    participants INTEGER NOT NULL DEFAULT 0,
    gl_listed INTEGER NOT NULL DEFAULT 0,

    CHECK (state IN ('UNKNOWN', 'UPLOADED', 'RENDERED', 'DELETING'))
);

CREATE INDEX IF NOT EXISTS idx_record_sets_secret ON record_sets(secret_uuid);
CREATE INDEX IF NOT EXISTS idx_record_sets_state ON record_sets(state);

CREATE TABLE IF NOT EXISTS records (
    uuid TEXT PRIMARY KEY,
    record_set_uuid TEXT NOT NULL REFERENCES record_sets(uuid) ON DELETE CASCADE,
    record_profile_uuid TEXT NOT NULL REFERENCES record_profiles(uuid) ON DELETE CASCADE,
    file_path TEXT NOT NULL DEFAULT '',
    published INTEGER NOT NULL DEFAULT 0,
    delivery_nonce TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL DEFAULT '',

    UNIQUE(record_set_uuid, record_profile_uuid)
);

CREATE TABLE IF NOT EXISTS metrics (
    name TEXT NOT NULL,
    secret_uuid TEXT REFERENCES secrets(uuid) ON DELETE CASCADE,
    node_uuid TEXT REFERENCES nodes(uuid) ON DELETE CASCADE,
    value INTEGER NOT NULL DEFAULT 0,

    UNIQUE(name, secret_uuid, node_uuid)
);

CREATE TABLE IF NOT EXISTS stats (
    uuid TEXT PRIMARY KEY,
    tenant_uuid TEXT REFERENCES tenants(uuid) ON DELETE CASCADE,
    bbb_origin TEXT NOT NULL DEFAULT '',
    bbb_origin_server_name TEXT NOT NULL DEFAULT '',
    attendees INTEGER NOT NULL DEFAULT 0,
    meetings INTEGER NOT NULL DEFAULT 0,
    listener_count INTEGER NOT NULL DEFAULT 0,
    voice_participant_count INTEGER NOT NULL DEFAULT 0,
    moderator_count INTEGER NOT NULL DEFAULT 0,
    video_count INTEGER NOT NULL DEFAULT 0,

    UNIQUE(tenant_uuid, bbb_origin, bbb_origin_server_name)
);

CREATE TABLE IF NOT EXISTS parameters (
    tenant_uuid TEXT NOT NULL REFERENCES tenants(uuid) ON DELETE CASCADE,
    parameter TEXT NOT NULL,
    mode TEXT NOT NULL,
    value TEXT,

    PRIMARY KEY (tenant_uuid, parameter),
    CHECK (mode IN ('BLOCK', 'SET', 'OVERRIDE'))
);

CREATE TABLE IF NOT EXISTS assets (
    tenant_uuid TEXT PRIMARY KEY REFERENCES tenants(uuid) ON DELETE CASCADE,
    slide_blob_key TEXT,
    slide_filename TEXT,
    slide_mimetype TEXT,
    logo_blob_key TEXT,
    logo_mimetype TEXT,
    custom_css_blob_key TEXT
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_applies_cleanly() {
        let conn = Connection::open_in_memory().unwrap();
        init_sqlite_schema(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(count >= 15);
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_sqlite_schema(&conn).unwrap();
        init_sqlite_schema(&conn).unwrap();
    }
}
