pub const SCHEMA: &str = r#"
-- article_references table (dedup ledger, rows are never deleted)
CREATE TABLE IF NOT EXISTS article_references (
    source_key TEXT NOT NULL,
    url_name TEXT NOT NULL,
    category TEXT NOT NULL,
    title TEXT,
    author TEXT,
    thumbnail TEXT,
    published_at TEXT,
    collected_at TEXT NOT NULL DEFAULT (datetime('now')),
    is_processed INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (source_key, url_name)
);

CREATE INDEX IF NOT EXISTS idx_article_references_unprocessed
    ON article_references(category, is_processed);

-- articles table
CREATE TABLE IF NOT EXISTS articles (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    thumbnail TEXT,
    published_at TEXT NOT NULL,
    author TEXT NOT NULL,
    content_preview TEXT,
    category TEXT NOT NULL,
    collected_at TEXT NOT NULL DEFAULT (datetime('now')),
    is_evaluated INTEGER NOT NULL DEFAULT 0,
    evaluation_retry_count INTEGER NOT NULL DEFAULT 0,
    is_excluded INTEGER NOT NULL DEFAULT 0,
    exclusion_reason TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_articles_is_evaluated ON articles(is_evaluated, is_excluded);
CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category);
CREATE INDEX IF NOT EXISTS idx_articles_collected_at ON articles(collected_at);

-- evaluations table (retry chain via nullable self-reference)
CREATE TABLE IF NOT EXISTS evaluations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id TEXT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    quality_score INTEGER NOT NULL,
    originality_score INTEGER NOT NULL,
    entertainment_score INTEGER NOT NULL,
    total_score INTEGER NOT NULL,
    ai_summary TEXT NOT NULL,
    is_retry_evaluation INTEGER NOT NULL DEFAULT 0,
    original_evaluation_id INTEGER REFERENCES evaluations(id),
    retry_reason TEXT,
    evaluated_at TEXT NOT NULL DEFAULT (datetime('now')),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_evaluations_article_id ON evaluations(article_id);
CREATE INDEX IF NOT EXISTS idx_evaluations_total_score ON evaluations(total_score DESC);
CREATE INDEX IF NOT EXISTS idx_evaluations_evaluated_at ON evaluations(evaluated_at);

-- twitter_posts table (written by the posting workflow)
CREATE TABLE IF NOT EXISTS twitter_posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tweet_id TEXT,
    content TEXT NOT NULL,
    posted_at TEXT,
    status TEXT NOT NULL,
    error_message TEXT
);

-- system_logs table (run summaries and operator-visible events)
CREATE TABLE IF NOT EXISTS system_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    component TEXT NOT NULL,
    details TEXT,
    logged_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
