//! SQL schema for the Firmograph SQLite store.
//!
//! Executed once at connection startup. Every statement is idempotent, so
//! reopening a finalized database leaves the slimmed `company` table alone.

/// Full schema DDL.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Staging rows. The payload columns after `profile_pic_url` are dropped by
-- schema finalization; what remains is the base company table.
CREATE TABLE IF NOT EXISTS company (
    company_id           TEXT PRIMARY KEY,
    staged_at            TEXT NOT NULL,   -- RFC 3339 UTC
    name                 TEXT,
    description          TEXT,
    website              TEXT,
    tagline              TEXT,
    founded_year         INTEGER,
    follower_count       INTEGER,
    linkedin_internal_id TEXT,
    profile_pic_url      TEXT,
    specialities         TEXT,            -- JSON array of strings
    locations            TEXT,            -- JSON array of objects
    company_size         TEXT,            -- JSON [low, high]
    company_type         TEXT,            -- plain text
    industry             TEXT,            -- plain text
    updates              TEXT,            -- JSON array of objects
    affiliated_companies TEXT,            -- JSON array of objects
    similar_companies    TEXT,            -- JSON array of objects
    hq                   TEXT,
    exit_data            TEXT,
    acquisitions         TEXT,
    extra                TEXT,
    funding_data         TEXT,
    categories           TEXT,
    customer_list        TEXT
);

-- ── Dimensions ──────────────────────────────────────────────────────────────
-- Rows are never updated once minted.

CREATE TABLE IF NOT EXISTS specialty (
    specialty_id   TEXT PRIMARY KEY,
    specialty_name TEXT NOT NULL,
    UNIQUE (specialty_name)
);

CREATE TABLE IF NOT EXISTS company_type (
    company_type_id   TEXT PRIMARY KEY,
    company_type_name TEXT NOT NULL,
    UNIQUE (company_type_name)
);

CREATE TABLE IF NOT EXISTS industry (
    industry_id   TEXT PRIMARY KEY,
    industry_name TEXT NOT NULL,
    UNIQUE (industry_name)
);

CREATE TABLE IF NOT EXISTS size_range (
    size_range_id TEXT PRIMARY KEY,
    label         TEXT NOT NULL,   -- '0-1' .. '10001+'
    UNIQUE (label)
);

CREATE TABLE IF NOT EXISTS location (
    location_id   TEXT PRIMARY KEY,
    country       TEXT NOT NULL,
    city          TEXT,
    postal_code   TEXT,
    address_line1 TEXT,
    state         TEXT,
    is_hq         INTEGER NOT NULL DEFAULT 0
);

-- NULLs never collide in a plain UNIQUE constraint; key on IFNULL so two
-- locations that both lack a city are the same location.
CREATE UNIQUE INDEX IF NOT EXISTS location_natural_key ON location (
    country,
    IFNULL(city, ''),
    IFNULL(postal_code, ''),
    IFNULL(address_line1, ''),
    IFNULL(state, ''),
    is_hq
);

CREATE TABLE IF NOT EXISTS similar_company (
    similar_company_id TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    linkedin_url       TEXT NOT NULL,
    industry           TEXT NOT NULL,
    location           TEXT NOT NULL,
    UNIQUE (name, linkedin_url, industry, location)
);

-- ── Links ───────────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS specialty_link (
    company_id   TEXT NOT NULL REFERENCES company(company_id),
    specialty_id TEXT NOT NULL REFERENCES specialty(specialty_id),
    UNIQUE (company_id, specialty_id)
);

CREATE TABLE IF NOT EXISTS company_type_link (
    company_id      TEXT NOT NULL REFERENCES company(company_id),
    company_type_id TEXT NOT NULL REFERENCES company_type(company_type_id),
    UNIQUE (company_id, company_type_id)
);

CREATE TABLE IF NOT EXISTS industry_link (
    company_id  TEXT NOT NULL REFERENCES company(company_id),
    industry_id TEXT NOT NULL REFERENCES industry(industry_id),
    UNIQUE (company_id, industry_id)
);

CREATE TABLE IF NOT EXISTS size_range_link (
    company_id    TEXT NOT NULL REFERENCES company(company_id),
    size_range_id TEXT NOT NULL REFERENCES size_range(size_range_id),
    UNIQUE (company_id, size_range_id)
);

CREATE TABLE IF NOT EXISTS location_link (
    company_id  TEXT NOT NULL REFERENCES company(company_id),
    location_id TEXT NOT NULL REFERENCES location(location_id),
    UNIQUE (company_id, location_id)
);

CREATE TABLE IF NOT EXISTS similar_company_link (
    company_id         TEXT NOT NULL REFERENCES company(company_id),
    similar_company_id TEXT NOT NULL REFERENCES similar_company(similar_company_id),
    UNIQUE (company_id, similar_company_id)
);

-- ── Details ─────────────────────────────────────────────────────────────────
-- Append-only; identical content on two companies is two rows.

CREATE TABLE IF NOT EXISTS company_update (
    update_id    TEXT PRIMARY KEY,
    company_id   TEXT NOT NULL REFERENCES company(company_id),
    article_link TEXT NOT NULL,
    image        TEXT NOT NULL,
    posted_on    TEXT NOT NULL,   -- YYYY-MM-DD; 1900 means unknown
    update_text  TEXT NOT NULL,
    total_likes  INTEGER NOT NULL,
    UNIQUE (update_id, company_id)
);

CREATE TABLE IF NOT EXISTS affiliated_company (
    affiliated_company_id TEXT PRIMARY KEY,
    company_id            TEXT NOT NULL REFERENCES company(company_id),
    name                  TEXT NOT NULL,
    linkedin_url          TEXT NOT NULL,
    industry              TEXT NOT NULL,
    location              TEXT NOT NULL,
    UNIQUE (affiliated_company_id, company_id)
);

-- ── Stage ledger ────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS stage_run (
    stage        TEXT PRIMARY KEY,
    completed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS company_update_company_idx     ON company_update(company_id);
CREATE INDEX IF NOT EXISTS affiliated_company_company_idx ON affiliated_company(company_id);

PRAGMA user_version = 1;
";
