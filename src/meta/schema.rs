//! Record store schemas, one per backend

/// SQLite schema
pub const SQLITE_SCHEMA: &str = r#"
-- Documents: one row per distinct content fingerprint
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    report_date TEXT NOT NULL,
    source TEXT NOT NULL,
    fingerprint TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id),
    source TEXT NOT NULL,
    price_type TEXT NOT NULL,
    value REAL NOT NULL,
    price_date TEXT NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    unit TEXT NOT NULL DEFAULT 'ton',
    UNIQUE(document_id, price_type)
);

CREATE TABLE IF NOT EXISTS inventories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id),
    source TEXT NOT NULL,
    inventory_type TEXT NOT NULL,
    value REAL NOT NULL,
    data_date TEXT NOT NULL,
    UNIQUE(document_id, inventory_type)
);

CREATE TABLE IF NOT EXISTS news (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id),
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    sentiment TEXT NOT NULL,
    news_date TEXT NOT NULL,
    category TEXT,
    tags_json TEXT
);

CREATE TABLE IF NOT EXISTS charts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id),
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    page INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    image BLOB NOT NULL,
    description TEXT NOT NULL,
    chart_date TEXT NOT NULL
);

-- Audit trail: append-only
CREATE TABLE IF NOT EXISTS processing_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER REFERENCES documents(id),
    fingerprint TEXT NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    details_json TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id),
    task TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    items_found INTEGER NOT NULL,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_prices_document ON prices(document_id);
CREATE INDEX IF NOT EXISTS idx_inventories_document ON inventories(document_id);
CREATE INDEX IF NOT EXISTS idx_news_document ON news(document_id);
CREATE INDEX IF NOT EXISTS idx_charts_document ON charts(document_id);
CREATE INDEX IF NOT EXISTS idx_events_document ON processing_events(document_id);
CREATE INDEX IF NOT EXISTS idx_task_logs_document ON task_logs(document_id);
"#;

/// PostgreSQL schema
pub const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id BIGSERIAL PRIMARY KEY,
    filename TEXT NOT NULL,
    report_date DATE NOT NULL,
    source TEXT NOT NULL,
    fingerprint TEXT NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS prices (
    id BIGSERIAL PRIMARY KEY,
    document_id BIGINT NOT NULL REFERENCES documents(id),
    source TEXT NOT NULL,
    price_type TEXT NOT NULL,
    value DOUBLE PRECISION NOT NULL,
    price_date DATE NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    unit TEXT NOT NULL DEFAULT 'ton',
    UNIQUE(document_id, price_type)
);

CREATE TABLE IF NOT EXISTS inventories (
    id BIGSERIAL PRIMARY KEY,
    document_id BIGINT NOT NULL REFERENCES documents(id),
    source TEXT NOT NULL,
    inventory_type TEXT NOT NULL,
    value DOUBLE PRECISION NOT NULL,
    data_date DATE NOT NULL,
    UNIQUE(document_id, inventory_type)
);

CREATE TABLE IF NOT EXISTS news (
    id BIGSERIAL PRIMARY KEY,
    document_id BIGINT NOT NULL REFERENCES documents(id),
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    sentiment TEXT NOT NULL,
    news_date DATE NOT NULL,
    category TEXT,
    tags_json TEXT
);

CREATE TABLE IF NOT EXISTS charts (
    id BIGSERIAL PRIMARY KEY,
    document_id BIGINT NOT NULL REFERENCES documents(id),
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    page BIGINT NOT NULL,
    mime_type TEXT NOT NULL,
    image BYTEA NOT NULL,
    description TEXT NOT NULL,
    chart_date DATE NOT NULL
);

CREATE TABLE IF NOT EXISTS processing_events (
    id BIGSERIAL PRIMARY KEY,
    document_id BIGINT REFERENCES documents(id),
    fingerprint TEXT NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    duration_ms BIGINT NOT NULL,
    details_json TEXT,
    error_message TEXT,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS task_logs (
    id BIGSERIAL PRIMARY KEY,
    document_id BIGINT NOT NULL REFERENCES documents(id),
    task TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    finished_at TIMESTAMPTZ NOT NULL,
    items_found BIGINT NOT NULL,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_prices_document ON prices(document_id);
CREATE INDEX IF NOT EXISTS idx_inventories_document ON inventories(document_id);
CREATE INDEX IF NOT EXISTS idx_news_document ON news(document_id);
CREATE INDEX IF NOT EXISTS idx_charts_document ON charts(document_id);
CREATE INDEX IF NOT EXISTS idx_events_document ON processing_events(document_id);
CREATE INDEX IF NOT EXISTS idx_task_logs_document ON task_logs(document_id);
"#;
