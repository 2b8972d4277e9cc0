//! Schema migration system.
//!
//! Migrations are static SQL strings keyed by version number.  Applied
//! versions are tracked in a `_migrations` table, so running the set is
//! idempotent and each migration executes exactly once, inside its own
//! transaction.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// Raw SQL. May contain multiple statements separated by `;`.
    sql: &'static str,
}

/// All migrations in order. Add new migrations to the end of this array.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial schema — users, communities, channels, conversations, messages",
    sql: r#"
        CREATE TABLE users (
            id               TEXT PRIMARY KEY,
            email            TEXT NOT NULL UNIQUE,
            username         TEXT NOT NULL UNIQUE,
            password_hash    TEXT NOT NULL,
            primary_language TEXT NOT NULL,
            avatar           TEXT,
            status_message   TEXT,
            created_at       INTEGER NOT NULL,
            updated_at       INTEGER NOT NULL
        );

        CREATE TABLE communities (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE community_members (
            community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            joined_at    INTEGER NOT NULL,
            PRIMARY KEY (community_id, user_id)
        );
        CREATE INDEX idx_members_user ON community_members(user_id);

        CREATE TABLE channels (
            id           TEXT PRIMARY KEY,
            community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            name         TEXT NOT NULL,
            description  TEXT,
            created_at   INTEGER NOT NULL,
            UNIQUE (community_id, name)
        );
        CREATE INDEX idx_channels_community ON channels(community_id);

        -- Direct-message threads. Participants are stored sorted so the
        -- unordered pair is unique. A conversation id doubles as the
        -- channel_id of its messages.
        CREATE TABLE conversations (
            id              TEXT PRIMARY KEY,
            participant_a   TEXT NOT NULL REFERENCES users(id),
            participant_b   TEXT NOT NULL REFERENCES users(id),
            created_at      INTEGER NOT NULL,
            last_message_at INTEGER,
            UNIQUE (participant_a, participant_b),
            CHECK (participant_a < participant_b)
        );

        CREATE TABLE messages (
            id                 TEXT PRIMARY KEY,
            channel_id         TEXT NOT NULL,
            sender_id          TEXT NOT NULL REFERENCES users(id),
            content            TEXT NOT NULL,
            source_language    TEXT NOT NULL,
            detected_romanized INTEGER NOT NULL DEFAULT 0,
            status             TEXT NOT NULL
                CHECK (status IN ('sent','translating','translated','failed')),
            attachment         TEXT,
            created_at_ms      INTEGER NOT NULL
        );
        CREATE INDEX idx_messages_channel_time ON messages(channel_id, created_at_ms);

        CREATE TABLE translations (
            message_id      TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            target_language TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at      INTEGER NOT NULL,
            PRIMARY KEY (message_id, target_language)
        );

        CREATE TABLE reactions (
            message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id    TEXT NOT NULL,
            emoji      TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE TABLE glossary_terms (
            id            TEXT PRIMARY KEY,
            community_id  TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            term          TEXT NOT NULL,
            category      TEXT NOT NULL
                CHECK (category IN ('technical','brand','proper_noun','custom')),
            preserve_case INTEGER NOT NULL DEFAULT 1,
            created_at    INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX idx_glossary_unique
            ON glossary_terms(community_id, term COLLATE NOCASE);
    "#,
}];

/// Apply every migration that has not been applied yet.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version    INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row("SELECT coalesce(max(version), 0) FROM _migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(version = migration.version, "migration already applied");
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );

        conn.execute_batch(&format!("BEGIN; {} COMMIT;", migration.sql))
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                message: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, applied_at) VALUES (?1, strftime('%s','now'))",
            [migration.version],
        )?;
    }

    Ok(())
}
