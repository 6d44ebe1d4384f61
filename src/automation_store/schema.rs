//! SQLite schema for the automation database.
//!
//! Holds per-pipeline settings and the append-only run ledger.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Settings and run ledger
// =============================================================================

const PIPELINE_SETTINGS_TABLE_V1: Table = Table {
    name: "pipeline_settings",
    columns: &[
        sqlite_column!("pipeline_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("enabled", &SqlType::Integer, non_null = true),
        sqlite_column!("cadence", &SqlType::Text, non_null = true),
        sqlite_column!("last_run_at", &SqlType::Text),
        sqlite_column!("next_run_at", &SqlType::Text),
        sqlite_column!("batch_params", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const PIPELINE_RUNS_TABLE_V1: Table = Table {
    name: "pipeline_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("pipeline_id", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("added", &SqlType::Integer, non_null = true),
        sqlite_column!("skipped", &SqlType::Integer, non_null = true),
        sqlite_column!("errors", &SqlType::Integer, non_null = true),
        sqlite_column!("error_detail", &SqlType::Text),
    ],
    indices: &[("idx_pipeline_runs_pipeline_started", "pipeline_id, started_at DESC")],
    unique_constraints: &[],
};

// =============================================================================
// Version 2 - Trigger source and duration on ledger rows
// =============================================================================

const PIPELINE_RUNS_TABLE_V2: Table = Table {
    name: "pipeline_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("pipeline_id", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("added", &SqlType::Integer, non_null = true),
        sqlite_column!("skipped", &SqlType::Integer, non_null = true),
        sqlite_column!("errors", &SqlType::Integer, non_null = true),
        sqlite_column!("error_detail", &SqlType::Text),
        sqlite_column!(
            "triggered_by",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'schedule'")
        ),
        sqlite_column!(
            "duration_ms",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_pipeline_runs_pipeline_started", "pipeline_id, started_at DESC")],
    unique_constraints: &[],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "ALTER TABLE pipeline_runs ADD COLUMN triggered_by TEXT NOT NULL DEFAULT 'schedule'",
        [],
    )?;
    conn.execute(
        "ALTER TABLE pipeline_runs ADD COLUMN duration_ms INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

pub const AUTOMATION_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[PIPELINE_SETTINGS_TABLE_V1, PIPELINE_RUNS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[PIPELINE_SETTINGS_TABLE_V1, PIPELINE_RUNS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
