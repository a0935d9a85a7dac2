// Schema for `operational.db`. Each statement is `CREATE TABLE IF NOT
// EXISTS` so opening a store is idempotent whether the project is brand
// new or has been running for months.

use sqlx::SqlitePool;

pub(crate) async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project (
            name        TEXT PRIMARY KEY,
            description TEXT,
            active      INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            modified_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flows (
            id               TEXT PRIMARY KEY,
            path             TEXT NOT NULL UNIQUE,
            name             TEXT NOT NULL UNIQUE,
            description      TEXT,
            cron_schedules   TEXT NOT NULL,
            start_datetime   TEXT,
            end_datetime     TEXT,
            max_delay_secs   INTEGER,
            checksum         TEXT NOT NULL,
            active           INTEGER NOT NULL DEFAULT 1,
            created_at       TEXT NOT NULL,
            modified_at      TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id                TEXT PRIMARY KEY,
            flow_id           TEXT NOT NULL REFERENCES flows(id) ON DELETE CASCADE,
            name              TEXT NOT NULL,
            retry_max         INTEGER NOT NULL,
            retry_delay_secs  INTEGER NOT NULL,
            UNIQUE(flow_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_edges (
            id                  TEXT PRIMARY KEY,
            source_task_id      TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            downstream_task_id  TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            UNIQUE(source_task_id, downstream_task_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flow_schedules (
            id                  TEXT PRIMARY KEY,
            flow_id             TEXT NOT NULL REFERENCES flows(id) ON DELETE CASCADE,
            schedule_datetime   TEXT NOT NULL,
            max_delay_secs      INTEGER,
            is_manual           INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_flow_schedules_flow_id ON flow_schedules(flow_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flow_runs (
            id                  TEXT PRIMARY KEY,
            flow_id             TEXT NOT NULL REFERENCES flows(id) ON DELETE CASCADE,
            schedule_id         TEXT REFERENCES flow_schedules(id) ON DELETE SET NULL,
            schedule_datetime   TEXT,
            max_delay_secs      INTEGER,
            is_manual           INTEGER NOT NULL DEFAULT 0,
            status              TEXT NOT NULL,
            created_at          TEXT NOT NULL,
            modified_at         TEXT NOT NULL,
            started_at          TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_flow_runs_flow_id ON flow_runs(flow_id, status)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_runs (
            id                  TEXT PRIMARY KEY,
            flow_run_id         TEXT NOT NULL REFERENCES flow_runs(id) ON DELETE CASCADE,
            task_id             TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            attempt             INTEGER NOT NULL DEFAULT 1,
            retry_max           INTEGER NOT NULL,
            retry_delay_secs    INTEGER NOT NULL,
            status              TEXT NOT NULL,
            created_at          TEXT NOT NULL,
            modified_at         TEXT NOT NULL,
            started_at          TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_task_runs_flow_run_id ON task_runs(flow_run_id, task_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scheduler_sessions (
            id               TEXT PRIMARY KEY,
            heartbeat_secs   INTEGER NOT NULL,
            worker_count     INTEGER NOT NULL,
            log_path         TEXT NOT NULL,
            created_at       TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
