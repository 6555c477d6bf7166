//! SQL schema for the identity store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS contacts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    email           TEXT,
    phone_number    TEXT,
    link_precedence TEXT    NOT NULL,   -- 'primary' | 'secondary'
    linked_id       INTEGER REFERENCES contacts(id),
    created_at      TEXT    NOT NULL,   -- RFC 3339 UTC, fixed width
    updated_at      TEXT    NOT NULL,
    deleted_at      TEXT,
    CHECK (email IS NOT NULL OR phone_number IS NOT NULL),
    CHECK (link_precedence IN ('primary', 'secondary')),
    CHECK ((link_precedence = 'primary') = (linked_id IS NULL))
);

CREATE INDEX IF NOT EXISTS contacts_email_idx  ON contacts(email);
CREATE INDEX IF NOT EXISTS contacts_phone_idx  ON contacts(phone_number);
CREATE INDEX IF NOT EXISTS contacts_linked_idx ON contacts(linked_id);

-- At most one live primary per email and per phone number. A request that
-- would create a second one loses the race and is retried.
CREATE UNIQUE INDEX IF NOT EXISTS contacts_primary_email_uq
    ON contacts(email)
    WHERE link_precedence = 'primary' AND deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS contacts_primary_phone_uq
    ON contacts(phone_number)
    WHERE link_precedence = 'primary' AND deleted_at IS NULL;

PRAGMA user_version = 1;
";
