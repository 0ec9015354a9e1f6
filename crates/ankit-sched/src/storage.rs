//! SQLite-backed storage for a collection file.
//!
//! [`Storage`] offers the raw query primitives the scheduler is built on
//! (`query_scalar`, `query_ids`, `execute`, `transact`, `find_cards`) plus
//! typed helpers for cards, notes, and the review log. It never caches: the
//! scheduler owns all in-memory state.

use std::fmt::Write as _;
use std::path::Path;

use rusqlite::types::{FromSql, Value};
use rusqlite::{Connection, OptionalExtension, Params, Row, params};
use tracing::debug;

use crate::card::{Card, CardId, NoteId, Queue};
use crate::error::{Error, Result};
use crate::revlog::ReviewLogEntry;
use crate::schema::{DEFAULT_CONF, DEFAULT_DCONF, DEFAULT_DECKS, SCHEMA, SCHEMA_VERSION};
use crate::search::SqlSearch;

const CARD_COLUMNS: &str = "id, nid, did, ord, mod, usn, type, queue, due, ivl, factor, reps, \
                            lapses, left, odue, odid, flags, data";

/// Note field separator (ASCII unit separator).
pub const FIELD_SEPARATOR: char = '\x1f';

/// Raw JSON columns of the `col` row.
#[derive(Debug, Clone)]
pub(crate) struct ColRow {
    pub crt: i64,
    pub conf: String,
    pub decks: String,
    pub dconf: String,
}

/// A connection to a collection database.
#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) a collection file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open a private in-memory collection.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Create tables and the `col` row if they do not exist yet.
    ///
    /// Returns `true` when a fresh collection was written.
    pub(crate) fn initialize(&self, crt: i64, now: i64) -> Result<bool> {
        self.conn.execute_batch(SCHEMA)?;
        let existing: i64 = self.query_scalar("SELECT count() FROM col", [])?;
        if existing > 0 {
            return Ok(false);
        }
        self.conn.execute(
            "INSERT INTO col VALUES (1, ?1, ?2, ?3, ?4, 0, 0, 0, ?5, '{}', ?6, ?7, '{}')",
            params![
                crt,
                now,
                now * 1000,
                SCHEMA_VERSION,
                DEFAULT_CONF,
                DEFAULT_DECKS,
                DEFAULT_DCONF
            ],
        )?;
        debug!(crt, "initialized new collection");
        Ok(true)
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Run a query returning a single value.
    pub fn query_scalar<T: FromSql>(&self, sql: &str, params: impl Params) -> Result<T> {
        Ok(self.conn.query_row(sql, params, |row| row.get(0))?)
    }

    /// Run a query returning the first column of every row as an ID.
    pub fn query_ids(&self, sql: &str, params: impl Params) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let ids = stmt
            .query_map(params, |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Execute a statement, returning the number of changed rows.
    pub fn execute(&self, sql: &str, params: impl Params) -> Result<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    /// Run `f` inside one transaction, rolling back if it returns an error.
    ///
    /// Nested calls join the outer transaction.
    pub fn transact<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        if !self.conn.is_autocommit() {
            return f(self);
        }
        let tx = self.conn.unchecked_transaction()?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    /// Card IDs matching a compiled search, optionally ordered and limited.
    pub fn find_cards(
        &self,
        search: &SqlSearch,
        order: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<CardId>> {
        let mut sql = format!(
            "SELECT c.id FROM cards c JOIN notes n ON c.nid = n.id WHERE {}",
            search.clause
        );
        if let Some(order) = order {
            let _ = write!(sql, " ORDER BY {order}");
        }
        if let Some(limit) = limit {
            let _ = write!(sql, " LIMIT {limit}");
        }
        self.query_ids(&sql, rusqlite::params_from_iter(search.params.iter()))
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // ========================================================================
    // Cards
    // ========================================================================

    /// Load a card.
    pub fn get_card(&self, id: CardId) -> Result<Card> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1");
        self.conn
            .query_row(&sql, [id], row_to_card)
            .optional()?
            .ok_or(Error::CardNotFound(id))
    }

    /// Load every card matching a `WHERE` clause.
    pub fn cards_where(&self, clause: &str, params: impl Params) -> Result<Vec<Card>> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE {clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let cards = stmt
            .query_map(params, row_to_card)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    /// Load the given cards, skipping IDs that do not exist.
    pub fn get_cards(&self, ids: &[CardId]) -> Result<Vec<Card>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.cards_where(&format!("id IN {}", ids_sql(ids)), [])
    }

    /// Insert a new card row.
    pub fn insert_card(&self, card: &Card) -> Result<()> {
        let sql = format!(
            "INSERT INTO cards ({CARD_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        );
        self.conn.execute(&sql, card_params(card))?;
        Ok(())
    }

    /// Write every scheduling field of a card.
    pub fn update_card(&self, card: &Card) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE cards SET nid = ?2, did = ?3, ord = ?4, mod = ?5, usn = ?6, type = ?7, \
             queue = ?8, due = ?9, ivl = ?10, factor = ?11, reps = ?12, lapses = ?13, \
             left = ?14, odue = ?15, odid = ?16, flags = ?17, data = ?18 WHERE id = ?1",
            card_params(card),
        )?;
        if changed == 0 {
            return Err(Error::CardNotFound(card.id));
        }
        Ok(())
    }

    /// Move cards into a queue without touching other fields.
    pub fn set_queue(&self, ids: &[CardId], queue: Queue, mtime: i64) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE cards SET queue = ?1, mod = ?2, usn = -1 WHERE id IN {}",
            ids_sql(ids)
        );
        self.execute(&sql, params![queue, mtime])
    }

    // ========================================================================
    // Notes
    // ========================================================================

    /// Insert a note. Card generation is left to the caller.
    pub fn add_note(&self, id: NoteId, fields: &[&str], tags: &[&str]) -> Result<()> {
        let flds = fields.join(&FIELD_SEPARATOR.to_string());
        let sort_field = fields.first().copied().unwrap_or_default();
        self.conn.execute(
            "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data) \
             VALUES (?1, ?2, 1, 0, -1, ?3, ?4, ?5, 0, 0, '')",
            params![id, format!("{id:x}"), tags_string(tags), flds, sort_field],
        )?;
        Ok(())
    }

    /// Tags of a note.
    pub fn note_tags(&self, id: NoteId) -> Result<Vec<String>> {
        let tags: String = self.query_scalar("SELECT tags FROM notes WHERE id = ?1", [id])?;
        Ok(tags.split_whitespace().map(str::to_string).collect())
    }

    /// Add a tag to a note. Returns `false` if it was already present.
    pub fn add_note_tag(&self, id: NoteId, tag: &str, mtime: i64) -> Result<bool> {
        let mut tags = self.note_tags(id)?;
        if tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return Ok(false);
        }
        tags.push(tag.to_string());
        let refs: Vec<&str> = tags.iter().map(String::as_str).collect();
        self.conn.execute(
            "UPDATE notes SET tags = ?2, mod = ?3, usn = -1 WHERE id = ?1",
            params![id, tags_string(&refs), mtime],
        )?;
        Ok(true)
    }

    // ========================================================================
    // Review log
    // ========================================================================

    /// Append a log entry, bumping its ID past any existing entry.
    ///
    /// Returns the ID actually written.
    pub fn insert_revlog(&self, entry: &ReviewLogEntry) -> Result<i64> {
        let last: i64 = self.query_scalar("SELECT coalesce(max(id), 0) FROM revlog", [])?;
        let id = entry.id.max(last + 1);
        self.conn.execute(
            "INSERT INTO revlog (id, cid, usn, ease, ivl, lastIvl, factor, time, type) \
             VALUES (?1, ?2, -1, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                entry.card_id,
                entry.ease,
                entry.interval,
                entry.last_interval,
                entry.factor,
                entry.time_taken,
                entry.kind.as_i64()
            ],
        )?;
        Ok(id)
    }

    // ========================================================================
    // Collection row
    // ========================================================================

    pub(crate) fn load_col(&self) -> Result<ColRow> {
        Ok(self.conn.query_row(
            "SELECT crt, conf, decks, dconf FROM col WHERE id = 1",
            [],
            |row| {
                Ok(ColRow {
                    crt: row.get(0)?,
                    conf: row.get(1)?,
                    decks: row.get(2)?,
                    dconf: row.get(3)?,
                })
            },
        )?)
    }

    pub(crate) fn save_decks(&self, decks: &str, dconf: &str, mtime: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE col SET decks = ?1, dconf = ?2, mod = ?3 WHERE id = 1",
            params![decks, dconf, mtime],
        )?;
        Ok(())
    }

    pub(crate) fn save_conf(&self, conf: &str, mtime: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE col SET conf = ?1, mod = ?2 WHERE id = 1",
            params![conf, mtime],
        )?;
        Ok(())
    }
}

/// Render IDs as an SQL list: `(1,2,3)`.
pub(crate) fn ids_sql(ids: &[i64]) -> String {
    let mut out = String::from("(");
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{id}");
    }
    out.push(')');
    out
}

fn tags_string(tags: &[&str]) -> String {
    if tags.is_empty() {
        String::new()
    } else {
        format!(" {} ", tags.join(" "))
    }
}

fn card_params(card: &Card) -> impl Params {
    let values: [Value; 18] = [
        card.id.into(),
        card.note_id.into(),
        card.deck_id.into(),
        card.ord.into(),
        card.mtime.into(),
        card.usn.into(),
        card.ctype.as_i64().into(),
        card.queue.as_i64().into(),
        card.due.into(),
        card.interval.into(),
        card.factor.into(),
        card.reps.into(),
        card.lapses.into(),
        card.left.into(),
        card.original_due.unwrap_or(0).into(),
        card.original_deck_id.unwrap_or(0).into(),
        card.flags.into(),
        card.data.clone().into(),
    ];
    rusqlite::params_from_iter(values)
}

fn row_to_card(row: &Row<'_>) -> rusqlite::Result<Card> {
    let odue: i64 = row.get(14)?;
    let odid: i64 = row.get(15)?;
    Ok(Card {
        id: row.get(0)?,
        note_id: row.get(1)?,
        deck_id: row.get(2)?,
        ord: row.get(3)?,
        mtime: row.get(4)?,
        usn: row.get(5)?,
        ctype: row.get(6)?,
        queue: row.get(7)?,
        due: row.get(8)?,
        interval: row.get(9)?,
        factor: row.get(10)?,
        reps: row.get(11)?,
        lapses: row.get(12)?,
        left: row.get(13)?,
        original_due: (odue != 0).then_some(odue),
        original_deck_id: (odid != 0).then_some(odid),
        flags: row.get(16)?,
        data: row.get(17)?,
    })
}
