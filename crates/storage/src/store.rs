//! SQLite-backed scenario store.

use std::path::Path;

use chrono::{DateTime, Utc};
use eo_common::Bbox;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, error, info};

use crate::error::{Result, StorageError};
use crate::model::{status_text, ProductInfo, Scenario, ScenarioStatus};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scenarios (
        ncn_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        dsrc TEXT NOT NULL,
        dsrc_type TEXT NOT NULL,
        min_x REAL NOT NULL,
        min_y REAL NOT NULL,
        max_x REAL NOT NULL,
        max_y REAL NOT NULL,
        from_date TEXT,
        to_date TEXT,
        cloud_cover TEXT,
        view_angle TEXT,
        sensor_type TEXT,
        dssids TEXT NOT NULL DEFAULT '[]',
        custom_conditions TEXT NOT NULL DEFAULT '[]',
        repeat_interval INTEGER NOT NULL DEFAULT 0,
        starting_date TEXT NOT NULL,
        coastline_check BOOLEAN NOT NULL DEFAULT 0,
        coastline_file TEXT,
        check_archived BOOLEAN NOT NULL DEFAULT 0,
        cat_registration BOOLEAN NOT NULL DEFAULT 0,
        download_subset BOOLEAN NOT NULL DEFAULT 0,
        tar_result BOOLEAN NOT NULL DEFAULT 0,
        ingest_scripts TEXT NOT NULL DEFAULT '[]',
        delete_scripts TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scenario_status (
        ncn_id TEXT PRIMARY KEY,
        is_available INTEGER NOT NULL DEFAULT 1,
        status TEXT NOT NULL DEFAULT 'IDLE',
        done REAL NOT NULL DEFAULT 0,
        active_dar TEXT NOT NULL DEFAULT '',
        ingestion_pid INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS archived_products (
        ncn_id TEXT NOT NULL,
        eoid TEXT NOT NULL,
        archived_at TEXT NOT NULL,
        PRIMARY KEY (ncn_id, eoid)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS product_info (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        info_date TEXT NOT NULL,
        info_status TEXT NOT NULL,
        info_error TEXT NOT NULL DEFAULT '',
        new_product_id TEXT NOT NULL DEFAULT '',
        product_url TEXT NOT NULL DEFAULT ''
    )
    "#,
];

/// Scenario database handle. Cheap to clone via the inner pool.
#[derive(Clone)]
pub struct ScenarioStore {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct ScenarioRow {
    ncn_id: String,
    name: String,
    description: String,
    dsrc: String,
    dsrc_type: String,
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    from_date: Option<String>,
    to_date: Option<String>,
    cloud_cover: Option<String>,
    view_angle: Option<String>,
    sensor_type: Option<String>,
    dssids: String,
    custom_conditions: String,
    repeat_interval: i64,
    starting_date: String,
    coastline_check: bool,
    coastline_file: Option<String>,
    check_archived: bool,
    cat_registration: bool,
    download_subset: bool,
    tar_result: bool,
    ingest_scripts: String,
    delete_scripts: String,
}

impl ScenarioRow {
    fn into_scenario(self) -> Result<Scenario> {
        Ok(Scenario {
            ncn_id: self.ncn_id,
            name: self.name,
            description: self.description,
            dsrc: self.dsrc,
            dsrc_type: self.dsrc_type,
            aoi: Bbox::new(self.min_x, self.min_y, self.max_x, self.max_y),
            from_date: self.from_date.as_deref().map(parse_dt).transpose()?,
            to_date: self.to_date.as_deref().map(parse_dt).transpose()?,
            cloud_cover: self.cloud_cover,
            view_angle: self.view_angle,
            sensor_type: self.sensor_type,
            dssids: serde_json::from_str(&self.dssids)?,
            custom_conditions: serde_json::from_str(&self.custom_conditions)?,
            repeat_interval: self.repeat_interval,
            starting_date: parse_dt(&self.starting_date)?,
            coastline_check: self.coastline_check,
            coastline_file: self.coastline_file,
            check_archived: self.check_archived,
            cat_registration: self.cat_registration,
            download_subset: self.download_subset,
            tar_result: self.tar_result,
            ingest_scripts: serde_json::from_str(&self.ingest_scripts)?,
            delete_scripts: serde_json::from_str(&self.delete_scripts)?,
        })
    }
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| {
            StorageError::Sqlx(sqlx::Error::Decode(
                format!("bad datetime in database: '{}'", s).into(),
            ))
        })
}

impl ScenarioStore {
    /// Open or create the database at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }

        info!(path = %path.display(), "Opened scenario database");
        Ok(Self { pool })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// Insert or replace a scenario, making sure its status row exists.
    pub async fn upsert_scenario(&self, sc: &Scenario) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO scenarios (
                ncn_id, name, description, dsrc, dsrc_type,
                min_x, min_y, max_x, max_y,
                from_date, to_date,
                cloud_cover, view_angle, sensor_type,
                dssids, custom_conditions,
                repeat_interval, starting_date,
                coastline_check, coastline_file, check_archived,
                cat_registration, download_subset, tar_result,
                ingest_scripts, delete_scripts
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sc.ncn_id)
        .bind(&sc.name)
        .bind(&sc.description)
        .bind(&sc.dsrc)
        .bind(&sc.dsrc_type)
        .bind(sc.aoi.min_x)
        .bind(sc.aoi.min_y)
        .bind(sc.aoi.max_x)
        .bind(sc.aoi.max_y)
        .bind(sc.from_date.map(|d| d.to_rfc3339()))
        .bind(sc.to_date.map(|d| d.to_rfc3339()))
        .bind(&sc.cloud_cover)
        .bind(&sc.view_angle)
        .bind(&sc.sensor_type)
        .bind(serde_json::to_string(&sc.dssids)?)
        .bind(serde_json::to_string(&sc.custom_conditions)?)
        .bind(sc.repeat_interval)
        .bind(sc.starting_date.to_rfc3339())
        .bind(sc.coastline_check)
        .bind(&sc.coastline_file)
        .bind(sc.check_archived)
        .bind(sc.cat_registration)
        .bind(sc.download_subset)
        .bind(sc.tar_result)
        .bind(serde_json::to_string(&sc.ingest_scripts)?)
        .bind(serde_json::to_string(&sc.delete_scripts)?)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO scenario_status (ncn_id, is_available, status) VALUES (?, 1, ?)",
        )
        .bind(&sc.ncn_id)
        .bind(status_text::IDLE)
        .execute(&self.pool)
        .await?;

        debug!(ncn_id = %sc.ncn_id, "Stored scenario");
        Ok(())
    }

    pub async fn get_scenario(&self, ncn_id: &str) -> Result<Option<Scenario>> {
        let row: Option<ScenarioRow> =
            sqlx::query_as("SELECT * FROM scenarios WHERE ncn_id = ?")
                .bind(ncn_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(ScenarioRow::into_scenario).transpose()
    }

    pub async fn list_scenarios(&self) -> Result<Vec<Scenario>> {
        let rows: Vec<ScenarioRow> =
            sqlx::query_as("SELECT * FROM scenarios ORDER BY ncn_id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(ScenarioRow::into_scenario).collect()
    }

    /// Delete a scenario together with its status row and archive.
    pub async fn delete_scenario(&self, ncn_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM archived_products WHERE ncn_id = ?")
            .bind(ncn_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM scenario_status WHERE ncn_id = ?")
            .bind(ncn_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM scenarios WHERE ncn_id = ?")
            .bind(ncn_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(ncn_id, "Deleted scenario");
        Ok(())
    }

    pub async fn get_status(&self, ncn_id: &str) -> Result<Option<ScenarioStatus>> {
        let row: Option<(String, bool, String, f64, String, i64)> = sqlx::query_as(
            "SELECT ncn_id, is_available, status, done, active_dar, ingestion_pid \
             FROM scenario_status WHERE ncn_id = ?",
        )
        .bind(ncn_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ScenarioStatus {
            ncn_id: r.0,
            is_available: r.1,
            status: r.2,
            done: r.3,
            active_dar: r.4,
            ingestion_pid: r.5,
        }))
    }

    pub async fn list_statuses(&self) -> Result<Vec<ScenarioStatus>> {
        let rows: Vec<(String, bool, String, f64, String, i64)> = sqlx::query_as(
            "SELECT ncn_id, is_available, status, done, active_dar, ingestion_pid \
             FROM scenario_status ORDER BY ncn_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ScenarioStatus {
                ncn_id: r.0,
                is_available: r.1,
                status: r.2,
                done: r.3,
                active_dar: r.4,
                ingestion_pid: r.5,
            })
            .collect())
    }

    /// Set availability, status text and percent done in one go.
    pub async fn set_status(
        &self,
        ncn_id: &str,
        is_available: bool,
        status: &str,
        done: f64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scenario_status SET is_available = ?, status = ?, done = ? WHERE ncn_id = ?",
        )
        .bind(is_available)
        .bind(status)
        .bind(done)
        .bind(ncn_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update only the percent done of the current phase.
    pub async fn set_done(&self, ncn_id: &str, done: f64) -> Result<()> {
        sqlx::query("UPDATE scenario_status SET done = ? WHERE ncn_id = ?")
            .bind(done)
            .bind(ncn_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Claim the scenario for a worker. Returns false when it is
    /// already taken.
    pub async fn try_lock(&self, ncn_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scenario_status SET is_available = 0 WHERE ncn_id = ? AND is_available = 1",
        )
        .bind(ncn_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_pid(&self, ncn_id: &str, pid: i64) -> Result<()> {
        sqlx::query("UPDATE scenario_status SET ingestion_pid = ? WHERE ncn_id = ?")
            .bind(pid)
            .bind(ncn_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the active download. Fails when another one is already
    /// recorded; a download must be cleared before the next starts.
    pub async fn set_active_dar(&self, ncn_id: &str, dar_url: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scenario_status SET active_dar = ? WHERE ncn_id = ? AND active_dar = ''",
        )
        .bind(dar_url)
        .bind(ncn_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            error!(ncn_id, "Refusing to overwrite an active download");
            return Ok(false);
        }
        Ok(true)
    }

    /// Clear the active download. Returns false when it was already
    /// cleared, which a downloading worker takes as its stop signal.
    pub async fn clear_active_dar(&self, ncn_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scenario_status SET active_dar = '' WHERE ncn_id = ? AND active_dar != ''",
        )
        .bind(ncn_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_active_dar(&self, ncn_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT active_dar FROM scenario_status WHERE ncn_id = ?")
                .bind(ncn_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    /// Request a running task to stop.
    ///
    /// When a worker owns the scenario the status is set to the stop
    /// sentinel and the active download is taken away from it; the
    /// returned URL (when non-empty) still has to be cancelled at the
    /// DM. An idle scenario is just reset.
    pub async fn stop_request(&self, ncn_id: &str) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT active_dar, ingestion_pid FROM scenario_status WHERE ncn_id = ?",
        )
        .bind(ncn_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((active_dar, pid)) = row else {
            return Err(StorageError::NoSuchScenario(ncn_id.to_string()));
        };

        if !active_dar.is_empty() || pid != 0 {
            sqlx::query(
                "UPDATE scenario_status SET status = ?, is_available = 1, active_dar = '' \
                 WHERE ncn_id = ?",
            )
            .bind(status_text::STOP_REQUEST)
            .bind(ncn_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(Some(active_dar))
        } else {
            sqlx::query(
                "UPDATE scenario_status SET status = ?, is_available = 1, done = 0 \
                 WHERE ncn_id = ?",
            )
            .bind(status_text::IDLE)
            .bind(ncn_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(None)
        }
    }

    /// True when the stop sentinel is set for the scenario.
    pub async fn stop_requested(&self, ncn_id: &str) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM scenario_status WHERE ncn_id = ?")
                .bind(ncn_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map_or(false, |r| r.0 == status_text::STOP_REQUEST))
    }

    /// Scenarios whose auto-ingest is due.
    pub async fn due_scenarios(&self, now: DateTime<Utc>) -> Result<Vec<Scenario>> {
        let rows: Vec<ScenarioRow> = sqlx::query_as(
            "SELECT * FROM scenarios WHERE repeat_interval > 0 AND starting_date <= ?",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ScenarioRow::into_scenario).collect()
    }

    pub async fn set_starting_date(&self, ncn_id: &str, date: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE scenarios SET starting_date = ? WHERE ncn_id = ?")
            .bind(date.to_rfc3339())
            .bind(ncn_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record an ingested product. Returns false when it was already
    /// in the archive.
    pub async fn add_archived(&self, ncn_id: &str, eoid: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO archived_products (ncn_id, eoid, archived_at) VALUES (?, ?, ?)",
        )
        .bind(ncn_id)
        .bind(eoid)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_archived(&self, ncn_id: &str, eoid: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM archived_products WHERE ncn_id = ? AND eoid = ?",
        )
        .bind(ncn_id)
        .bind(eoid)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    pub async fn archived_eoids(&self, ncn_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT eoid FROM archived_products WHERE ncn_id = ? ORDER BY eoid",
        )
        .bind(ncn_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Create a new add-product operation record, status "processing".
    pub async fn create_product_info(&self) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO product_info (info_date, info_status) VALUES (?, 'processing')",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_product_info(
        &self,
        id: i64,
        status: &str,
        error: &str,
        new_product_id: &str,
        product_url: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE product_info SET info_status = ?, info_error = ?, \
             new_product_id = ?, product_url = ? WHERE id = ?",
        )
        .bind(status)
        .bind(error)
        .bind(new_product_id)
        .bind(product_url)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_product_info(&self, id: i64) -> Result<Option<ProductInfo>> {
        let row: Option<(i64, String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, info_date, info_status, info_error, new_product_id, product_url \
             FROM product_info WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(ProductInfo {
                id: r.0,
                info_date: parse_dt(&r.1)?,
                info_status: r.2,
                info_error: r.3,
                new_product_id: r.4,
                product_url: r.5,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::sample;

    #[tokio::test]
    async fn test_scenario_round_trip() {
        let store = ScenarioStore::open_memory().await.unwrap();
        let sc = sample();
        store.upsert_scenario(&sc).await.unwrap();

        let loaded = store.get_scenario(&sc.ncn_id).await.unwrap().unwrap();
        assert_eq!(loaded.ncn_id, sc.ncn_id);
        assert_eq!(loaded.aoi, sc.aoi);
        assert_eq!(loaded.dssids, sc.dssids);
        assert_eq!(loaded.from_date, sc.from_date);
        assert_eq!(loaded.ingest_scripts, sc.ingest_scripts);

        // Status row was created alongside.
        let status = store.get_status(&sc.ncn_id).await.unwrap().unwrap();
        assert!(status.is_available);
        assert_eq!(status.status, status_text::IDLE);

        assert!(store.get_scenario("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let store = ScenarioStore::open_memory().await.unwrap();
        store.upsert_scenario(&sample()).await.unwrap();

        assert!(store.try_lock("sc_test_1").await.unwrap());
        assert!(!store.try_lock("sc_test_1").await.unwrap());

        store
            .set_status("sc_test_1", true, status_text::IDLE, 0.0)
            .await
            .unwrap();
        assert!(store.try_lock("sc_test_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_active_dar_handoff() {
        let store = ScenarioStore::open_memory().await.unwrap();
        store.upsert_scenario(&sample()).await.unwrap();

        assert!(store
            .set_active_dar("sc_test_1", "http://127.0.0.1:8000/ingest/darResponse/0")
            .await
            .unwrap());
        // A second download may not replace the first.
        assert!(!store
            .set_active_dar("sc_test_1", "http://127.0.0.1:8000/ingest/darResponse/1")
            .await
            .unwrap());

        assert!(store.clear_active_dar("sc_test_1").await.unwrap());
        // Second clear reports the download already gone.
        assert!(!store.clear_active_dar("sc_test_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_request_idle_and_busy() {
        let store = ScenarioStore::open_memory().await.unwrap();
        store.upsert_scenario(&sample()).await.unwrap();

        // Idle scenario resets to IDLE.
        let dar = store.stop_request("sc_test_1").await.unwrap();
        assert!(dar.is_none());
        let status = store.get_status("sc_test_1").await.unwrap().unwrap();
        assert_eq!(status.status, status_text::IDLE);

        // Busy scenario gets the sentinel and loses its download.
        store.set_pid("sc_test_1", 7).await.unwrap();
        store
            .set_active_dar("sc_test_1", "http://dar.example/0")
            .await
            .unwrap();
        let dar = store.stop_request("sc_test_1").await.unwrap();
        assert_eq!(dar.as_deref(), Some("http://dar.example/0"));
        assert!(store.stop_requested("sc_test_1").await.unwrap());

        let status = store.get_status("sc_test_1").await.unwrap().unwrap();
        assert!(status.is_available);
        assert!(status.active_dar.is_empty());

        assert!(store.stop_request("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_due_scenarios_and_reschedule() {
        let store = ScenarioStore::open_memory().await.unwrap();
        let mut sc = sample();
        sc.repeat_interval = 60;
        sc.starting_date = "2020-01-01T00:00:00Z".parse().unwrap();
        store.upsert_scenario(&sc).await.unwrap();

        let now = "2020-06-01T00:00:00Z".parse().unwrap();
        let due = store.due_scenarios(now).await.unwrap();
        assert_eq!(due.len(), 1);

        // Pushing the starting date forward takes it out of the sweep.
        let next = "2021-01-01T00:00:00Z".parse().unwrap();
        store.set_starting_date(&sc.ncn_id, next).await.unwrap();
        assert!(store.due_scenarios(now).await.unwrap().is_empty());

        // Interval 0 never comes due.
        let mut sc2 = sample();
        sc2.ncn_id = "sc_test_2".into();
        sc2.repeat_interval = 0;
        store.upsert_scenario(&sc2).await.unwrap();
        assert!(store.due_scenarios(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_archive_dedup() {
        let store = ScenarioStore::open_memory().await.unwrap();
        store.upsert_scenario(&sample()).await.unwrap();

        assert!(store.add_archived("sc_test_1", "eoid_1").await.unwrap());
        assert!(!store.add_archived("sc_test_1", "eoid_1").await.unwrap());
        assert!(store.is_archived("sc_test_1", "eoid_1").await.unwrap());
        assert!(!store.is_archived("sc_test_1", "eoid_2").await.unwrap());
        assert_eq!(store.archived_eoids("sc_test_1").await.unwrap(), vec!["eoid_1"]);

        store.delete_scenario("sc_test_1").await.unwrap();
        assert!(!store.is_archived("sc_test_1", "eoid_1").await.unwrap());
        assert!(store.get_scenario("sc_test_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_product_info_lifecycle() {
        let store = ScenarioStore::open_memory().await.unwrap();

        let id = store.create_product_info().await.unwrap();
        let info = store.get_product_info(id).await.unwrap().unwrap();
        assert_eq!(info.info_status, "processing");

        store
            .update_product_info(id, "success", "", "new_cov_1", "http://p.example/1")
            .await
            .unwrap();
        let info = store.get_product_info(id).await.unwrap().unwrap();
        assert_eq!(info.info_status, "success");
        assert_eq!(info.new_product_id, "new_cov_1");
    }
}
