//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all application data. The uniqueness rules that keep
//! academic years and versioned records consistent are enforced here, as indexes.

mod exams;
mod profiles;
mod repository;
mod settings;
mod sponsors;
mod students;

pub use repository::*;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Current schema version, stored in `meta` and in backup documents.
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Increment the revision ID and return the new value.
///
/// The revision is the cache-invalidation token for clients: any write that changes what a
/// cached view would show must bump it, inside the same transaction when there is one.
pub async fn bump_revision<'e, E>(executor: E) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now().to_rfc3339();
    sqlx::query_scalar(
        "UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1 RETURNING revision_id",
    )
    .bind(now)
    .fetch_one(executor)
    .await
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at) VALUES (1, ?, 0, datetime('now'))",
    )
    .bind(SCHEMA_VERSION)
    .execute(pool)
    .await?;

    // At most one current year, enforced by the partial unique index.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS academic_years (
            id TEXT PRIMARY KEY,
            year_name TEXT NOT NULL UNIQUE,
            start_date TEXT,
            end_date TEXT,
            is_current INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_academic_years_single_current
            ON academic_years(is_current) WHERE is_current = 1;
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT,
            role TEXT NOT NULL DEFAULT 'viewer',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sponsors (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            secondary_email TEXT,
            phone TEXT,
            address TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            start_date TEXT,
            profile_image_url TEXT,
            primary_email_for_updates TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS students (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            date_of_birth TEXT,
            gender TEXT,
            sponsor_id TEXT REFERENCES sponsors(id) ON DELETE SET NULL,
            sponsored_since TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS relatives (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            relationship TEXT,
            phone TEXT,
            notes TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS exams (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            term TEXT,
            academic_year TEXT NOT NULL,
            max_score REAL NOT NULL,
            passing_score REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS exam_scores (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            exam_id TEXT NOT NULL REFERENCES exams(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            UNIQUE (student_id, exam_id)
        );

        CREATE TABLE IF NOT EXISTS letters (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            sponsor_id TEXT REFERENCES sponsors(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS timeline_events (
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sponsor_timeline_events (
            id TEXT PRIMARY KEY,
            sponsor_id TEXT NOT NULL REFERENCES sponsors(id) ON DELETE CASCADE,
            event_type TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            event_date TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            entity TEXT NOT NULL,
            entity_id TEXT,
            details TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Versioned record tables: one row per (entity, year), at most one flagged current.
    for (table, entity, anchor, value_columns) in VERSIONED_TABLES {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                {entity} TEXT NOT NULL REFERENCES {anchor}(id) ON DELETE CASCADE,
                academic_year_recorded TEXT NOT NULL,
                is_current_record INTEGER NOT NULL DEFAULT 0,
                record_date TEXT NOT NULL,
                {value_columns},
                UNIQUE ({entity}, academic_year_recorded)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_single_current
                ON {table}({entity}) WHERE is_current_record = 1;
            "#
        );
        sqlx::query(&ddl).execute(pool).await?;
    }

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_students_sponsor ON students(sponsor_id);
        CREATE INDEX IF NOT EXISTS idx_students_name ON students(last_name, first_name);
        CREATE INDEX IF NOT EXISTS idx_sponsors_name ON sponsors(last_name, first_name);
        CREATE INDEX IF NOT EXISTS idx_exams_year ON exams(academic_year);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs(created_at);
        CREATE INDEX IF NOT EXISTS idx_sponsor_timeline_sponsor ON sponsor_timeline_events(sponsor_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Names of the tables holding year-scoped record rows.
pub fn versioned_table_names() -> impl Iterator<Item = &'static str> {
    VERSIONED_TABLES.iter().map(|(table, ..)| *table)
}

/// Versioned tables: (table, entity column, anchor table, value column DDL).
const VERSIONED_TABLES: [(&str, &str, &str, &str); 5] = [
    (
        "student_records",
        "student_id",
        "students",
        "grade_level TEXT, school_name TEXT, enrollment_status TEXT, notes TEXT",
    ),
    (
        "student_photos",
        "student_id",
        "students",
        "photo_url TEXT, caption TEXT",
    ),
    (
        "exam_score_records",
        "score_id",
        "exam_scores",
        "score REAL, did_not_sit INTEGER NOT NULL DEFAULT 0, remarks TEXT",
    ),
    (
        "letter_records",
        "letter_id",
        "letters",
        "title TEXT, body TEXT, letter_url TEXT, sent_date TEXT",
    ),
    (
        "timeline_event_records",
        "event_id",
        "timeline_events",
        "event_type TEXT, title TEXT, description TEXT, event_date TEXT",
    ),
];
