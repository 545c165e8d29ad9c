use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (chat schema)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS customers (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                name             TEXT NOT NULL,
                email            TEXT,
                avatar           TEXT,
                active_status    INTEGER NOT NULL DEFAULT 0,
                dark_mode        INTEGER NOT NULL DEFAULT 0,
                messenger_color  TEXT,
                created_at       TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS drivers (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                type        TEXT NOT NULL DEFAULT 'user',
                from_id     INTEGER NOT NULL,
                to_id       INTEGER NOT NULL,
                body        TEXT NOT NULL DEFAULT '',
                sent_by     TEXT NOT NULL DEFAULT 'user',
                attachment  TEXT,
                seen        INTEGER DEFAULT 0,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_pair
                ON messages(from_id, to_id, created_at);

            CREATE INDEX IF NOT EXISTS idx_messages_to
                ON messages(to_id, created_at);

            CREATE TABLE IF NOT EXISTS favorites (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER NOT NULL,
                favorite_id  INTEGER NOT NULL,
                created_at   TEXT NOT NULL,
                UNIQUE(user_id, favorite_id)
            );

            CREATE TABLE IF NOT EXISTS device_tokens (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_class  TEXT NOT NULL,
                recipient_id     INTEGER NOT NULL,
                token            TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                UNIQUE(recipient_class, recipient_id, token)
            );

            CREATE INDEX IF NOT EXISTS idx_device_tokens_recipient
                ON device_tokens(recipient_class, recipient_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
