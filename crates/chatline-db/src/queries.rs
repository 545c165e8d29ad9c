use crate::models::{
    ContactRow, CustomerRow, DeletedMessages, FavoriteRow, MessageRow, NewMessage, Page,
};
use crate::{Database, now_timestamp, page_offset};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};

const MESSAGE_COLUMNS: &str =
    "id, type, from_id, to_id, body, sent_by, attachment, seen, created_at, updated_at";

const CUSTOMER_COLUMNS: &str =
    "id, name, email, avatar, active_status, dark_mode, messenger_color, created_at";

// Both directions of a two-party conversation; binds ?1 and ?2.
const PAIR_FILTER: &str =
    "((from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1))";

impl Database {
    // -- Accounts --

    pub fn create_customer(&self, name: &str, email: Option<&str>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO customers (name, email, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![name, email, now_timestamp()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn create_driver(&self, name: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO drivers (name, created_at) VALUES (?1, ?2)",
                rusqlite::params![name, now_timestamp()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_customer(&self, id: i64) -> Result<Option<CustomerRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM customers WHERE id = ?1", CUSTOMER_COLUMNS);
            conn.query_row(&sql, [id], customer_from_row).optional()
        })
    }

    pub fn driver_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: i64 =
                conn.query_row("SELECT COUNT(*) FROM drivers WHERE id = ?1", [id], |r| r.get(0))?;
            Ok(found > 0)
        })
    }

    /// Customers whose name contains `input` (case-insensitive), excluding
    /// the viewer. An empty input matches everyone.
    pub fn search_customers(
        &self,
        viewer_id: i64,
        input: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<CustomerRow>> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM customers
                 WHERE id != ?1 AND instr(lower(name), lower(?2)) > 0",
                rusqlite::params![viewer_id, input],
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT {} FROM customers
                 WHERE id != ?1 AND instr(lower(name), lower(?2)) > 0
                 ORDER BY name ASC, id ASC
                 LIMIT ?3 OFFSET ?4",
                CUSTOMER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(
                    rusqlite::params![viewer_id, input, per_page, page_offset(page, per_page)],
                    customer_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Page { items, total: total as u64 })
        })
    }

    pub fn set_dark_mode(&self, id: i64, dark: bool) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute("UPDATE customers SET dark_mode = ?2 WHERE id = ?1", rusqlite::params![id, dark])?)
        })
    }

    pub fn set_messenger_color(&self, id: i64, color: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE customers SET messenger_color = ?2 WHERE id = ?1",
                rusqlite::params![id, color],
            )?)
        })
    }

    pub fn set_avatar(&self, id: i64, avatar: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute("UPDATE customers SET avatar = ?2 WHERE id = ?1", rusqlite::params![id, avatar])?)
        })
    }

    pub fn set_active_status(&self, id: i64, active: bool) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE customers SET active_status = ?2 WHERE id = ?1",
                rusqlite::params![id, active],
            )?)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let now = now_timestamp();
            conn.execute(
                "INSERT INTO messages (type, from_id, to_id, body, sent_by, attachment, seen, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
                rusqlite::params![
                    msg.kind,
                    msg.from_id,
                    msg.to_id,
                    msg.body,
                    msg.sent_by,
                    msg.attachment,
                    now,
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, id)?.ok_or_else(|| anyhow!("Inserted message {} vanished", id))
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Whole conversation between `a` and `b`, oldest first.
    pub fn conversation_full(&self, a: i64, b: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages WHERE {} ORDER BY created_at ASC, id ASC",
                MESSAGE_COLUMNS, PAIR_FILTER
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![a, b], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One page of the conversation, newest first. Page 1 holds the latest
    /// `per_page` messages.
    pub fn conversation_page(
        &self,
        a: i64,
        b: i64,
        page: u32,
        per_page: u32,
    ) -> Result<Page<MessageRow>> {
        self.with_conn(|conn| {
            let count_sql = format!("SELECT COUNT(*) FROM messages WHERE {}", PAIR_FILTER);
            let total: i64 = conn.query_row(&count_sql, rusqlite::params![a, b], |r| r.get(0))?;

            let sql = format!(
                "SELECT {} FROM messages WHERE {}
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3 OFFSET ?4",
                MESSAGE_COLUMNS, PAIR_FILTER
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(
                    rusqlite::params![a, b, per_page, page_offset(page, per_page)],
                    message_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Page { items, total: total as u64 })
        })
    }

    /// Marks everything `from_id` sent to `to_id` as seen. Returns rows changed.
    pub fn mark_seen(&self, from_id: i64, to_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET seen = 1, updated_at = ?3
                 WHERE from_id = ?1 AND to_id = ?2 AND COALESCE(seen, 0) = 0",
                rusqlite::params![from_id, to_id, now_timestamp()],
            )?;
            Ok(changed)
        })
    }

    /// Attachment columns of the conversation, newest first.
    pub fn conversation_attachments(&self, a: i64, b: i64) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT attachment FROM messages
                 WHERE {} AND attachment IS NOT NULL
                 ORDER BY created_at DESC, id DESC",
                PAIR_FILTER
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![a, b], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_conversation(&self, a: i64, b: i64) -> Result<DeletedMessages> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let attachments = {
                let sql = format!(
                    "SELECT attachment FROM messages WHERE {} AND attachment IS NOT NULL",
                    PAIR_FILTER
                );
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params![a, b], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };
            let count = tx.execute(
                &format!("DELETE FROM messages WHERE {}", PAIR_FILTER),
                rusqlite::params![a, b],
            )?;
            tx.commit()?;
            Ok(DeletedMessages { count, attachments })
        })
    }

    /// Deletes a message only when `sender_id` sent it. Returns the removed row.
    pub fn delete_message(&self, id: i64, sender_id: i64) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let row = query_message(&tx, id)?.filter(|m| m.from_id == sender_id);
            if row.is_some() {
                tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            }
            tx.commit()?;
            Ok(row)
        })
    }

    /// Counterparties the viewer has exchanged messages with, most recent first.
    pub fn list_contacts(&self, viewer_id: i64, page: u32, per_page: u32) -> Result<Page<ContactRow>> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT c.id)
                 FROM messages m
                 JOIN customers c
                   ON c.id = CASE WHEN m.from_id = ?1 THEN m.to_id ELSE m.from_id END
                 WHERE (m.from_id = ?1 OR m.to_id = ?1) AND c.id != ?1",
                [viewer_id],
                |r| r.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.email, c.avatar, c.active_status, c.dark_mode,
                        c.messenger_color, c.created_at, MAX(m.created_at) AS max_created_at
                 FROM messages m
                 JOIN customers c
                   ON c.id = CASE WHEN m.from_id = ?1 THEN m.to_id ELSE m.from_id END
                 WHERE (m.from_id = ?1 OR m.to_id = ?1) AND c.id != ?1
                 GROUP BY c.id
                 ORDER BY max_created_at DESC, MAX(m.id) DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let items = stmt
                .query_map(
                    rusqlite::params![viewer_id, per_page, page_offset(page, per_page)],
                    |row| {
                        Ok(ContactRow {
                            customer: customer_from_row(row)?,
                            max_created_at: row.get(8)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Page { items, total: total as u64 })
        })
    }

    // -- Favorites --

    pub fn is_favorite(&self, user_id: i64, favorite_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: i64 = conn.query_row(
                "SELECT COUNT(*) FROM favorites WHERE user_id = ?1 AND favorite_id = ?2",
                rusqlite::params![user_id, favorite_id],
                |r| r.get(0),
            )?;
            Ok(found > 0)
        })
    }

    /// Toggle a favorite: removes if present, inserts if not.
    /// Returns true when the pair is a favorite afterwards.
    pub fn toggle_favorite(&self, user_id: i64, favorite_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND favorite_id = ?2",
                rusqlite::params![user_id, favorite_id],
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO favorites (user_id, favorite_id, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![user_id, favorite_id, now_timestamp()],
                )?;
            }
            tx.commit()?;
            Ok(removed == 0)
        })
    }

    pub fn list_favorites(&self, user_id: i64) -> Result<Vec<FavoriteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, favorite_id, created_at FROM favorites
                 WHERE user_id = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(FavoriteRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        favorite_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Device tokens --

    /// Device tokens for a recipient. `None` means the recipient does not
    /// exist in its class's account table.
    pub fn device_tokens(&self, class: &str, recipient_id: i64) -> Result<Option<Vec<String>>> {
        let table = account_table(class)?;
        self.with_conn(|conn| {
            let exists: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", table),
                [recipient_id],
                |r| r.get(0),
            )?;
            if exists == 0 {
                return Ok(None);
            }

            let mut stmt = conn.prepare(
                "SELECT token FROM device_tokens
                 WHERE recipient_class = ?1 AND recipient_id = ?2
                 ORDER BY id DESC",
            )?;
            let tokens = stmt
                .query_map(rusqlite::params![class, recipient_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Some(tokens))
        })
    }

    /// Returns false when the token was already registered.
    pub fn add_device_token(&self, class: &str, recipient_id: i64, token: &str) -> Result<bool> {
        account_table(class)?;
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO device_tokens (recipient_class, recipient_id, token, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![class, recipient_id, token, now_timestamp()],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn remove_device_token(&self, class: &str, recipient_id: i64, token: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM device_tokens
                 WHERE recipient_class = ?1 AND recipient_id = ?2 AND token = ?3",
                rusqlite::params![class, recipient_id, token],
            )?;
            Ok(removed > 0)
        })
    }
}

fn account_table(class: &str) -> Result<&'static str> {
    match class {
        "customer" => Ok("customers"),
        "driver" => Ok("drivers"),
        other => Err(anyhow!("Unknown recipient class: {}", other)),
    }
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    conn.query_row(&sql, [id], message_from_row).optional()
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        from_id: row.get(2)?,
        to_id: row.get(3)?,
        body: row.get(4)?,
        sent_by: row.get(5)?,
        attachment: row.get(6)?,
        seen: row.get::<_, Option<bool>>(7)?.unwrap_or(false),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<CustomerRow> {
    Ok(CustomerRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        avatar: row.get(3)?,
        active_status: row.get(4)?,
        dark_mode: row.get(5)?,
        messenger_color: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
