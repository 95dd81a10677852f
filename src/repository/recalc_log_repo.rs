// ==========================================
// 橱柜工坊偏差引擎 - 重算日志仓储
// ==========================================
// 职责: 记录每个重算任务的执行结果 (成功 / 失败 / 重试次数)
// 状态: RUNNING → COMPLETED | FAILED
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub const STATUS_RUNNING: &str = "RUNNING";
pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_FAILED: &str = "FAILED";

#[derive(Debug, Clone, PartialEq)]
pub struct RecalcLogEntity {
    pub job_id: String,
    pub project_id: Option<String>,
    pub trigger_type: String,
    /// 逗号分隔的阶段名
    pub stages: String,
    pub status: String,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcLogCounts {
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

pub struct RecalcLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RecalcLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入 RUNNING 记录
    pub fn insert_running(&self, entity: &RecalcLogEntity) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO recalc_log (
              job_id, project_id, trigger_type, stages, status, retry_count, started_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                entity.job_id,
                entity.project_id,
                entity.trigger_type,
                entity.stages,
                STATUS_RUNNING,
                entity.retry_count,
                entity.started_at,
            ],
        )?;
        Ok(())
    }

    /// 更新为终态
    pub fn finish(
        &self,
        job_id: &str,
        status: &str,
        retry_count: i64,
        error_message: Option<&str>,
        completed_at: &str,
        duration_ms: i64,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let n = conn.execute(
            r#"
            UPDATE recalc_log
            SET status = ?2, retry_count = ?3, error_message = ?4,
                completed_at = ?5, duration_ms = ?6
            WHERE job_id = ?1
            "#,
            params![job_id, status, retry_count, error_message, completed_at, duration_ms],
        )?;
        if n == 0 {
            return Err(RepositoryError::NotFound {
                entity: "RecalcLog".to_string(),
                id: job_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn find_by_id(&self, job_id: &str) -> RepositoryResult<Option<RecalcLogEntity>> {
        let conn = self.get_conn()?;
        conn.query_row(
            r#"
            SELECT job_id, project_id, trigger_type, stages, status, retry_count,
                   error_message, started_at, completed_at, duration_ms
            FROM recalc_log
            WHERE job_id = ?1
            "#,
            params![job_id],
            map_log_row,
        )
        .optional()
        .map_err(|e| e.into())
    }

    /// 最近的日志（按开始时间倒序）
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<RecalcLogEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT job_id, project_id, trigger_type, stages, status, retry_count,
                   error_message, started_at, completed_at, duration_ms
            FROM recalc_log
            ORDER BY started_at DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt
            .query_map(params![limit as i64], map_log_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_counts(&self) -> RepositoryResult<RecalcLogCounts> {
        let conn = self.get_conn()?;
        let (running, completed, failed) = conn.query_row(
            r#"
            SELECT
              COALESCE(SUM(CASE WHEN status = 'RUNNING' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN status = 'COMPLETED' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0)
            FROM recalc_log
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(RecalcLogCounts {
            running,
            completed,
            failed,
        })
    }
}

fn map_log_row(row: &Row) -> rusqlite::Result<RecalcLogEntity> {
    Ok(RecalcLogEntity {
        job_id: row.get(0)?,
        project_id: row.get(1)?,
        trigger_type: row.get(2)?,
        stages: row.get(3)?,
        status: row.get(4)?,
        retry_count: row.get(5)?,
        error_message: row.get(6)?,
        started_at: row.get(7)?,
        completed_at: row.get(8)?,
        duration_ms: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn setup_repo() -> RecalcLogRepository {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        RecalcLogRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn entity(job_id: &str) -> RecalcLogEntity {
        RecalcLogEntity {
            job_id: job_id.to_string(),
            project_id: Some("P1".to_string()),
            trigger_type: "CostLinesChanged".to_string(),
            stages: "financial".to_string(),
            status: STATUS_RUNNING.to_string(),
            retry_count: 0,
            error_message: None,
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
            completed_at: None,
            duration_ms: None,
        }
    }

    #[test]
    fn test_running_then_failed() {
        let repo = setup_repo();
        repo.insert_running(&entity("J1")).unwrap();
        assert_eq!(repo.get_counts().unwrap().running, 1);

        repo.finish(
            "J1",
            STATUS_FAILED,
            2,
            Some("stage financial failed"),
            "2026-01-01T00:00:01+00:00",
            1000,
        )
        .unwrap();

        let log = repo.find_by_id("J1").unwrap().unwrap();
        assert_eq!(log.status, STATUS_FAILED);
        assert_eq!(log.retry_count, 2);
        assert_eq!(log.error_message.as_deref(), Some("stage financial failed"));
        assert_eq!(
            repo.get_counts().unwrap(),
            RecalcLogCounts {
                running: 0,
                completed: 0,
                failed: 1
            }
        );
    }

    #[test]
    fn test_finish_unknown_job() {
        let repo = setup_repo();
        let result = repo.finish("NOPE", STATUS_COMPLETED, 0, None, "t", 0);
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }
}
