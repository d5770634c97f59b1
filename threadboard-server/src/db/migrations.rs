//! Schema migrations for the relational engine
//!
//! Every statement is idempotent so `run` is safe on each start.

use sqlx::PgPool;

/// Statements in application order.
const STATEMENTS: &[(&str, &str)] = &[
    (
        "posts",
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id BIGSERIAL PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            content TEXT NOT NULL,
            allow_comments BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "comments",
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            id BIGSERIAL PRIMARY KEY,
            post_id BIGINT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            author TEXT NOT NULL,
            text TEXT NOT NULL,
            has_replies BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "comment_hierarchy",
        r#"
        CREATE TABLE IF NOT EXISTS comment_hierarchy (
            parent_id BIGINT NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
            child_id BIGINT NOT NULL UNIQUE REFERENCES comments(id) ON DELETE CASCADE,
            PRIMARY KEY (parent_id, child_id)
        )
        "#,
    ),
    (
        "idx_posts_created",
        "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC, id DESC)",
    ),
    (
        "idx_comments_thread",
        "CREATE INDEX IF NOT EXISTS idx_comments_thread ON comments(post_id, created_at, id)",
    ),
    (
        "idx_hierarchy_parent",
        "CREATE INDEX IF NOT EXISTS idx_hierarchy_parent ON comment_hierarchy(parent_id)",
    ),
];

/// Run all board migrations
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running board migrations...");

    let mut tx = pool.begin().await?;
    for (name, sql) in STATEMENTS {
        tracing::debug!(migration = *name, "Applying");
        sqlx::query(sql).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    tracing::info!(count = STATEMENTS.len(), "Board migrations complete");
    Ok(())
}
