use super::models::{
    BatchParams, Cadence, NewRunRecord, PipelineId, PipelineSettings, RunHistoryPage, RunRecord,
    RunStatus, RunTrigger, SettingsPatch,
};
use super::schema::AUTOMATION_VERSIONED_SCHEMAS;
use super::{AutomationStore, MAX_HISTORY_PAGE_SIZE};
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const RUN_COLUMNS: &str = "id, pipeline_id, started_at, status, added, skipped, errors, \
     error_detail, triggered_by, duration_ms";

pub struct SqliteAutomationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAutomationStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), "automation", AUTOMATION_VERSIONED_SCHEMAS)
            .context("Failed to open automation database")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn row_to_settings(
        pipeline_id: PipelineId,
        row: &rusqlite::Row,
    ) -> rusqlite::Result<PipelineSettings> {
        let enabled: i64 = row.get("enabled")?;
        let cadence_str: String = row.get("cadence")?;
        let last_run_at: Option<String> = row.get("last_run_at")?;
        let next_run_at: Option<String> = row.get("next_run_at")?;
        let batch_params: Option<String> = row.get("batch_params")?;

        let cadence = Cadence::parse(&cadence_str).unwrap_or_else(|| {
            warn!(
                pipeline = %pipeline_id,
                cadence = %cadence_str,
                "Unknown cadence in settings, falling back to daily"
            );
            Cadence::Daily
        });

        Ok(PipelineSettings {
            pipeline_id,
            enabled: enabled != 0,
            cadence,
            last_run_at: last_run_at.as_deref().and_then(Self::parse_datetime),
            next_run_at: next_run_at.as_deref().and_then(Self::parse_datetime),
            batch_params: BatchParams::from_json(pipeline_id, batch_params.as_deref()),
        })
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
        let pipeline_str: String = row.get("pipeline_id")?;
        let pipeline_id = PipelineId::parse(&pipeline_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown pipeline id {}", pipeline_str).into(),
            )
        })?;
        let started_at_str: String = row.get("started_at")?;
        let status_str: String = row.get("status")?;
        let trigger_str: String = row.get("triggered_by")?;

        Ok(RunRecord {
            id: row.get("id")?,
            pipeline_id,
            started_at: Self::parse_datetime(&started_at_str).unwrap_or_else(Utc::now),
            duration_ms: row.get("duration_ms")?,
            status: RunStatus::parse(&status_str).unwrap_or(RunStatus::Error),
            triggered_by: RunTrigger::parse(&trigger_str).unwrap_or(RunTrigger::Schedule),
            added: row.get("added")?,
            skipped: row.get("skipped")?,
            errors: row.get("errors")?,
            error_detail: row.get("error_detail")?,
        })
    }

    fn load_settings(conn: &Connection, pipeline_id: PipelineId) -> Result<PipelineSettings> {
        let settings = conn
            .query_row(
                "SELECT enabled, cadence, last_run_at, next_run_at, batch_params
                 FROM pipeline_settings WHERE pipeline_id = ?1",
                params![pipeline_id.as_str()],
                |row| Self::row_to_settings(pipeline_id, row),
            )
            .optional()?;
        Ok(settings.unwrap_or_else(|| PipelineSettings::defaults(pipeline_id)))
    }

    fn count_runs_with(conn: &Connection, pipeline_id: Option<PipelineId>) -> Result<usize> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pipeline_runs WHERE ?1 IS NULL OR pipeline_id = ?1",
            params![pipeline_id.map(|id| id.as_str())],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn write_settings(conn: &Connection, settings: &PipelineSettings) -> Result<()> {
        conn.execute(
            "INSERT INTO pipeline_settings
                (pipeline_id, enabled, cadence, last_run_at, next_run_at, batch_params)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(pipeline_id) DO UPDATE SET
                enabled = excluded.enabled,
                cadence = excluded.cadence,
                last_run_at = excluded.last_run_at,
                next_run_at = excluded.next_run_at,
                batch_params = excluded.batch_params",
            params![
                settings.pipeline_id.as_str(),
                settings.enabled as i64,
                settings.cadence.as_str(),
                settings.last_run_at.as_ref().map(Self::format_datetime),
                settings.next_run_at.as_ref().map(Self::format_datetime),
                settings.batch_params.to_json(),
            ],
        )?;
        Ok(())
    }
}

impl AutomationStore for SqliteAutomationStore {
    fn get_settings(&self, pipeline_id: PipelineId) -> Result<PipelineSettings> {
        let conn = self.conn.lock().unwrap();
        Self::load_settings(&conn, pipeline_id)
    }

    fn get_all_settings(&self) -> Result<Vec<PipelineSettings>> {
        let conn = self.conn.lock().unwrap();
        PipelineId::ALL
            .iter()
            .map(|id| Self::load_settings(&conn, *id))
            .collect()
    }

    fn seed_settings(&self, settings: &PipelineSettings) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO pipeline_settings
                (pipeline_id, enabled, cadence, last_run_at, next_run_at, batch_params)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                settings.pipeline_id.as_str(),
                settings.enabled as i64,
                settings.cadence.as_str(),
                settings.last_run_at.as_ref().map(Self::format_datetime),
                settings.next_run_at.as_ref().map(Self::format_datetime),
                settings.batch_params.to_json(),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn update_settings(
        &self,
        pipeline_id: PipelineId,
        patch: &SettingsPatch,
    ) -> Result<PipelineSettings> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut settings = Self::load_settings(&tx, pipeline_id)?;

        if let Some(enabled) = patch.enabled {
            settings.enabled = enabled;
        }
        if let Some(cadence) = patch.cadence {
            if cadence != settings.cadence {
                debug!(
                    pipeline = %pipeline_id,
                    from = settings.cadence.as_str(),
                    to = cadence.as_str(),
                    "Cadence changed, clearing next_run_at"
                );
                settings.next_run_at = None;
            }
            settings.cadence = cadence;
        }
        if let Some(batch_params) = &patch.batch_params {
            settings.batch_params = batch_params.clone();
        }

        Self::write_settings(&tx, &settings)?;
        tx.commit()?;
        Ok(settings)
    }

    fn record_schedule(
        &self,
        pipeline_id: PipelineId,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut settings = Self::load_settings(&tx, pipeline_id)?;
        settings.last_run_at = Some(last_run_at);
        settings.next_run_at = Some(next_run_at);
        Self::write_settings(&tx, &settings)?;
        tx.commit()?;
        Ok(())
    }

    fn set_next_run_at(&self, pipeline_id: PipelineId, next_run_at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut settings = Self::load_settings(&tx, pipeline_id)?;
        settings.next_run_at = Some(next_run_at);
        Self::write_settings(&tx, &settings)?;
        tx.commit()?;
        Ok(())
    }

    fn append_run(&self, run: &NewRunRecord) -> Result<RunRecord> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pipeline_runs
                (pipeline_id, started_at, status, added, skipped, errors, error_detail,
                 triggered_by, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run.pipeline_id.as_str(),
                Self::format_datetime(&run.started_at),
                run.status.as_str(),
                run.added,
                run.skipped,
                run.errors,
                run.error_detail,
                run.triggered_by.as_str(),
                run.duration_ms,
            ],
        )?;

        Ok(RunRecord {
            id: conn.last_insert_rowid(),
            pipeline_id: run.pipeline_id,
            started_at: run.started_at,
            duration_ms: run.duration_ms,
            status: run.status,
            triggered_by: run.triggered_by,
            added: run.added,
            skipped: run.skipped,
            errors: run.errors,
            error_detail: run.error_detail.clone(),
        })
    }

    fn list_runs(
        &self,
        pipeline_id: Option<PipelineId>,
        page: usize,
        page_size: usize,
    ) -> Result<RunHistoryPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_HISTORY_PAGE_SIZE);
        let offset = (page - 1) * page_size;
        let filter = pipeline_id.map(|id| id.as_str());

        let conn = self.conn.lock().unwrap();
        let total_count = Self::count_runs_with(&conn, pipeline_id)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pipeline_runs
             WHERE ?1 IS NULL OR pipeline_id = ?1
             ORDER BY started_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
            RUN_COLUMNS
        ))?;
        let records = stmt
            .query_map(
                params![filter, page_size as i64, offset as i64],
                Self::row_to_run,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(RunHistoryPage {
            records,
            total_count,
            page,
            page_size,
        })
    }

    fn get_last_run(&self, pipeline_id: PipelineId) -> Result<Option<RunRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pipeline_runs WHERE pipeline_id = ?1
             ORDER BY started_at DESC, id DESC LIMIT 1",
            RUN_COLUMNS
        ))?;
        let run = stmt
            .query_row(params![pipeline_id.as_str()], Self::row_to_run)
            .optional()?;
        Ok(run)
    }

    fn count_runs(&self, pipeline_id: Option<PipelineId>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Self::count_runs_with(&conn, pipeline_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation_store::{CatalogSyncParams, ContentGenerationParams};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn create_store() -> (SqliteAutomationStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteAutomationStore::new(temp_dir.path().join("automation.db")).unwrap();
        (store, temp_dir)
    }

    fn run(pipeline_id: PipelineId, started_at: DateTime<Utc>) -> NewRunRecord {
        NewRunRecord {
            pipeline_id,
            started_at,
            duration_ms: 12,
            status: RunStatus::Success,
            triggered_by: RunTrigger::Schedule,
            added: 1,
            skipped: 2,
            errors: 0,
            error_detail: None,
        }
    }

    #[test]
    fn test_missing_settings_load_as_defaults() {
        let (store, _temp_dir) = create_store();
        let settings = store.get_settings(PipelineId::SeoOptimization).unwrap();
        assert_eq!(settings, PipelineSettings::defaults(PipelineId::SeoOptimization));

        let all = store.get_all_settings().unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].pipeline_id, PipelineId::CatalogSync);
    }

    #[test]
    fn test_seed_does_not_overwrite() {
        let (store, _temp_dir) = create_store();
        let mut seeded = PipelineSettings::defaults(PipelineId::CatalogSync);
        seeded.enabled = true;
        assert!(store.seed_settings(&seeded).unwrap());

        let mut second = seeded.clone();
        second.enabled = false;
        assert!(!store.seed_settings(&second).unwrap());
        assert!(store.get_settings(PipelineId::CatalogSync).unwrap().enabled);
    }

    #[test]
    fn test_update_settings_patch() {
        let (store, _temp_dir) = create_store();
        let updated = store
            .update_settings(
                PipelineId::ContentGeneration,
                &SettingsPatch {
                    enabled: Some(true),
                    cadence: None,
                    batch_params: Some(BatchParams::ContentGeneration(ContentGenerationParams {
                        templates_per_run: 2,
                    })),
                },
            )
            .unwrap();
        assert!(updated.enabled);

        let loaded = store.get_settings(PipelineId::ContentGeneration).unwrap();
        assert_eq!(loaded.batch_params.content_generation().templates_per_run, 2);
        assert_eq!(loaded.cadence, Cadence::Daily);
    }

    #[test]
    fn test_cadence_change_clears_next_run() {
        let (store, _temp_dir) = create_store();
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        store
            .record_schedule(PipelineId::CatalogSync, t, t + Duration::hours(24))
            .unwrap();

        let same = store
            .update_settings(
                PipelineId::CatalogSync,
                &SettingsPatch {
                    cadence: Some(Cadence::Daily),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(same.next_run_at, Some(t + Duration::hours(24)));

        let changed = store
            .update_settings(
                PipelineId::CatalogSync,
                &SettingsPatch {
                    cadence: Some(Cadence::Weekly),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(changed.next_run_at, None);
        assert_eq!(changed.last_run_at, Some(t));
    }

    #[test]
    fn test_record_schedule_keeps_operator_fields() {
        let (store, _temp_dir) = create_store();
        store
            .update_settings(
                PipelineId::CatalogSync,
                &SettingsPatch {
                    enabled: Some(true),
                    cadence: Some(Cadence::Monthly),
                    batch_params: Some(BatchParams::CatalogSync(CatalogSyncParams {
                        entries_per_run: 3,
                    })),
                },
            )
            .unwrap();

        let t = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        store
            .record_schedule(PipelineId::CatalogSync, t, t + Duration::days(30))
            .unwrap();

        let settings = store.get_settings(PipelineId::CatalogSync).unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.cadence, Cadence::Monthly);
        assert_eq!(settings.batch_params.catalog_sync().entries_per_run, 3);
        assert_eq!(settings.last_run_at, Some(t));
        assert_eq!(settings.next_run_at, Some(t + Duration::days(30)));
    }

    #[test]
    fn test_append_and_page_runs() {
        let (store, _temp_dir) = create_store();
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        for i in 0..5 {
            store
                .append_run(&run(PipelineId::CatalogSync, t + Duration::hours(i)))
                .unwrap();
        }
        store
            .append_run(&run(PipelineId::SeoOptimization, t))
            .unwrap();

        let page = store.list_runs(Some(PipelineId::CatalogSync), 1, 2).unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].started_at, t + Duration::hours(4));

        let last_page = store.list_runs(Some(PipelineId::CatalogSync), 3, 2).unwrap();
        assert_eq!(last_page.records.len(), 1);
        assert_eq!(last_page.records[0].started_at, t);

        let everything = store.list_runs(None, 1, 50).unwrap();
        assert_eq!(everything.total_count, 6);
        assert_eq!(store.count_runs(Some(PipelineId::SeoOptimization)).unwrap(), 1);
    }

    #[test]
    fn test_appended_run_roundtrips() {
        let (store, _temp_dir) = create_store();
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut new_run = run(PipelineId::ReviewGeneration, t);
        new_run.status = RunStatus::Partial;
        new_run.triggered_by = RunTrigger::Manual;
        new_run.errors = 4;
        new_run.error_detail = Some("4 item(s) failed".to_string());

        let appended = store.append_run(&new_run).unwrap();
        let last = store
            .get_last_run(PipelineId::ReviewGeneration)
            .unwrap()
            .unwrap();
        assert_eq!(appended, last);
        assert!(store
            .get_last_run(PipelineId::CatalogSync)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_reopen_existing_database() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("automation.db");
        {
            let store = SqliteAutomationStore::new(&path).unwrap();
            store
                .append_run(&run(PipelineId::CatalogSync, Utc::now()))
                .unwrap();
        }
        let store = SqliteAutomationStore::new(&path).unwrap();
        let page = store.list_runs(None, 1, 10).unwrap();
        assert_eq!(page.total_count, 1);
    }
}
