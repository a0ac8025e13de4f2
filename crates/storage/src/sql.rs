//! SQL text for the relational backends
//!
//! Every dialect uses the same table shape: three key columns under a unique
//! constraint, the serialized payload, and (PostgreSQL only) the
//! history-tracking columns the atomic upsert maintains.

use eventbench_core::StatementKind;

/// SQLite dialect
pub mod sqlite {
    /// Create the events table
    pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY,
    event_namespace TEXT NOT NULL,
    event_entity TEXT NOT NULL,
    event_check TEXT NOT NULL,
    serialized BLOB NOT NULL,
    UNIQUE (event_namespace, event_entity, event_check)
)";

    /// Point lookup
    pub const LOOKUP: &str = "SELECT serialized FROM events \
        WHERE event_namespace = ?1 AND event_entity = ?2 AND event_check = ?3";

    /// Plain insert
    pub const INSERT: &str = "INSERT INTO events \
        (event_namespace, event_entity, event_check, serialized) VALUES (?1, ?2, ?3, ?4)";

    /// Payload update
    pub const UPDATE: &str = "UPDATE events SET serialized = ?1 \
        WHERE event_namespace = ?2 AND event_entity = ?3 AND event_check = ?4";

    /// Teardown
    pub const DELETE_ALL: &str = "DELETE FROM events";

    /// Row count
    pub const COUNT: &str = "SELECT COUNT(*) FROM events";
}

/// PostgreSQL dialect
pub mod postgres {
    /// Create the events table
    pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS events (
    id bigserial PRIMARY KEY,
    event_namespace text NOT NULL,
    event_entity text NOT NULL,
    event_check text NOT NULL,
    status integer NOT NULL DEFAULT 0,
    last_ok bigint NOT NULL DEFAULT 0,
    occurrences bigint NOT NULL DEFAULT 0,
    occurrences_wm bigint NOT NULL DEFAULT 0,
    history_index integer NOT NULL DEFAULT 0,
    history_ts bigint[] NOT NULL DEFAULT '{}',
    history_status integer[] NOT NULL DEFAULT '{}',
    serialized bytea NOT NULL,
    previous_serialized bytea,
    UNIQUE (event_namespace, event_entity, event_check)
)";

    /// Transaction-scoped advisory lock on one composite key
    ///
    /// Taken before the lookup inside a transaction: `FOR UPDATE` cannot lock
    /// a row that does not exist yet, so first writers of a key would
    /// otherwise all see it absent and race to insert.
    pub const KEY_LOCK: &str = "SELECT pg_advisory_xact_lock(hashtextextended(\
        $1::text || '/' || $2::text || '/' || $3::text, 0))";

    /// Point lookup, locking the row if it exists
    pub const LOOKUP: &str = "SELECT serialized FROM events \
        WHERE event_namespace = $1 AND event_entity = $2 AND event_check = $3 FOR UPDATE";

    /// Plain insert
    pub const INSERT: &str = "INSERT INTO events \
        (event_namespace, event_entity, event_check, serialized) VALUES ($1, $2, $3, $4)";

    /// Payload update
    pub const UPDATE: &str = "UPDATE events SET serialized = $1 \
        WHERE event_namespace = $2 AND event_entity = $3 AND event_check = $4";

    /// Insert-or-merge with a 20-slot history ring
    ///
    /// Every right-hand side reads the pre-update row, so all derived
    /// columns are computed from the previous values. A row first written
    /// by the plain insert carries the column defaults: status 0, zero
    /// counters and an empty ring at index 0.
    pub const UPSERT: &str = "INSERT INTO events AS e (
    event_namespace, event_entity, event_check, status, last_ok,
    occurrences, occurrences_wm, history_index, history_ts, history_status, serialized
) VALUES (
    $1, $2, $3, $4::integer,
    CASE WHEN $4::integer = 0 THEN $5::bigint ELSE 0 END,
    1, 1, 1, ARRAY[$5::bigint], ARRAY[$4::integer], $6
)
ON CONFLICT (event_namespace, event_entity, event_check) DO UPDATE SET
    history_index = (e.history_index % 20) + 1,
    history_ts[(e.history_index % 20) + 1] = EXCLUDED.history_ts[1],
    history_status[(e.history_index % 20) + 1] = EXCLUDED.status,
    last_ok = CASE WHEN EXCLUDED.status = 0 THEN EXCLUDED.history_ts[1] ELSE e.last_ok END,
    status = EXCLUDED.status,
    occurrences = CASE WHEN e.status = EXCLUDED.status THEN e.occurrences + 1 ELSE 1 END,
    occurrences_wm = CASE
        WHEN e.status = 0 AND EXCLUDED.status <> 0 THEN 1
        WHEN e.status <> EXCLUDED.status THEN e.occurrences_wm
        WHEN e.occurrences < e.occurrences_wm THEN e.occurrences_wm
        ELSE e.occurrences_wm + 1
    END,
    previous_serialized = e.serialized,
    serialized = EXCLUDED.serialized
RETURNING history_ts, history_status, last_ok, occurrences, occurrences_wm, previous_serialized";

    /// Teardown
    pub const DELETE_ALL: &str = "DELETE FROM events";

    /// Row count
    pub const COUNT: &str = "SELECT COUNT(*) FROM events";
}

/// MySQL dialect (InnoDB)
pub mod mysql {
    /// Create the events table
    pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS events (
    id bigint AUTO_INCREMENT PRIMARY KEY,
    event_namespace varchar(255) NOT NULL,
    event_entity varchar(255) NOT NULL,
    event_check varchar(255) NOT NULL,
    serialized mediumblob NOT NULL,
    UNIQUE KEY events_key (event_namespace, event_entity, event_check)
) ENGINE = InnoDB";

    /// Named lock on one composite key, waiting at most the second parameter
    /// in seconds
    ///
    /// Yields 1 when granted, 0 on timeout. Named locks belong to the
    /// session, so the transaction releases them with [`RELEASE_KEY_LOCKS`]
    /// once it ends.
    pub const KEY_LOCK: &str = "SELECT GET_LOCK(\
        CONCAT('eventbench/', SHA1(CONCAT_WS('/', ?, ?, ?))), ?)";

    /// Release every named lock the session holds
    pub const RELEASE_KEY_LOCKS: &str = "DO RELEASE_ALL_LOCKS()";

    /// Point lookup, locking the row if it exists
    pub const LOOKUP: &str = "SELECT serialized FROM events \
        WHERE event_namespace = ? AND event_entity = ? AND event_check = ? FOR UPDATE";

    /// Plain insert
    pub const INSERT: &str = "INSERT INTO events \
        (event_namespace, event_entity, event_check, serialized) VALUES (?, ?, ?, ?)";

    /// Payload update
    pub const UPDATE: &str = "UPDATE events SET serialized = ? \
        WHERE event_namespace = ? AND event_entity = ? AND event_check = ?";

    /// Teardown
    pub const DELETE_ALL: &str = "DELETE FROM events";

    /// Row count
    pub const COUNT: &str = "SELECT COUNT(*) FROM events";
}

/// SQLite text for `kind`, `None` if the dialect has no form of it
pub fn sqlite_statement(kind: StatementKind) -> Option<&'static str> {
    match kind {
        StatementKind::Lookup => Some(sqlite::LOOKUP),
        StatementKind::Insert => Some(sqlite::INSERT),
        StatementKind::Update => Some(sqlite::UPDATE),
        StatementKind::Upsert => None,
    }
}

/// PostgreSQL text for `kind`
pub fn postgres_statement(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::Lookup => postgres::LOOKUP,
        StatementKind::Insert => postgres::INSERT,
        StatementKind::Update => postgres::UPDATE,
        StatementKind::Upsert => postgres::UPSERT,
    }
}

/// MySQL text for `kind`, `None` if the dialect has no form of it
pub fn mysql_statement(kind: StatementKind) -> Option<&'static str> {
    match kind {
        StatementKind::Lookup => Some(mysql::LOOKUP),
        StatementKind::Insert => Some(mysql::INSERT),
        StatementKind::Update => Some(mysql::UPDATE),
        StatementKind::Upsert => None,
    }
}
