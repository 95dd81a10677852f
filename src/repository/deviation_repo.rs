// ==========================================
// 橱柜工坊偏差引擎 - 偏差数据仓储
// ==========================================
// 去重键: (project_id, deviation_type, group_key)
// 红线: 同一去重键最多一条 resolved = 0 的记录
//   - upsert 在连接锁内的单个事务中完成查找与写入
//   - 部分唯一索引 uq_deviation_open_key 兜底
// 红线: resolve 为批量 UPDATE ... WHERE，不按ID逐条更新
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::deviation::{Deviation, DeviationDraft, UpsertOutcome};
use crate::domain::types::{DeviationType, Severity};
use crate::repository::error::{parse_column, parse_timestamp, RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ==========================================
// DeviationRepository Trait
// ==========================================
pub trait DeviationRepository: Send + Sync {
    /// 查询去重键对应的未解决偏差
    fn find_open(
        &self,
        project_id: Option<&str>,
        deviation_type: DeviationType,
        group_key: &str,
    ) -> RepositoryResult<Option<Deviation>>;

    /// 新建或原地刷新未解决偏差
    ///
    /// # 返回
    /// - Inserted(id): 新建
    /// - Updated(id): 已存在，仅刷新 severity / message / impact_value
    fn upsert_open(&self, draft: &DeviationDraft) -> RepositoryResult<UpsertOutcome>;

    /// 批量标记去重键下全部未解决偏差为已解决
    ///
    /// # 返回
    /// 受影响行数
    fn resolve_open(
        &self,
        project_id: Option<&str>,
        deviation_type: DeviationType,
        group_key: &str,
    ) -> RepositoryResult<usize>;

    /// 批量标记项目某类型的全部未解决偏差为已解决
    fn resolve_all_open(
        &self,
        project_id: Option<&str>,
        deviation_type: DeviationType,
    ) -> RepositoryResult<usize>;

    /// 查询项目未解决偏差
    ///
    /// # 参数
    /// - deviation_type: None 表示全部类型
    fn list_open(
        &self,
        project_id: Option<&str>,
        deviation_type: Option<DeviationType>,
    ) -> RepositoryResult<Vec<Deviation>>;

    /// 查询项目偏差（可含历史）
    fn list_for_project(
        &self,
        project_id: &str,
        include_resolved: bool,
    ) -> RepositoryResult<Vec<Deviation>>;
}

// ==========================================
// DeviationRepositoryImpl
// ==========================================
pub struct DeviationRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

const DEVIATION_COLUMNS: &str = "deviation_id, project_id, deviation_type, severity, group_key, \
     message, impact_value, resolved, created_at, updated_at, resolved_at";

struct RawDeviation {
    id: String,
    project_id: Option<String>,
    deviation_type: String,
    severity: String,
    group_key: String,
    message: String,
    impact_value: Option<f64>,
    resolved: bool,
    created_at: String,
    updated_at: String,
    resolved_at: Option<String>,
}

fn map_raw(row: &rusqlite::Row) -> rusqlite::Result<RawDeviation> {
    Ok(RawDeviation {
        id: row.get(0)?,
        project_id: row.get(1)?,
        deviation_type: row.get(2)?,
        severity: row.get(3)?,
        group_key: row.get(4)?,
        message: row.get(5)?,
        impact_value: row.get(6)?,
        resolved: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        resolved_at: row.get(10)?,
    })
}

impl RawDeviation {
    fn into_deviation(self) -> RepositoryResult<Deviation> {
        Ok(Deviation {
            id: self.id,
            project_id: self.project_id,
            deviation_type: parse_column(
                "deviation.deviation_type",
                &self.deviation_type,
                DeviationType::parse,
            )?,
            severity: parse_column("deviation.severity", &self.severity, Severity::parse)?,
            group_key: self.group_key,
            message: self.message,
            impact_value: self.impact_value,
            resolved: self.resolved,
            created_at: parse_timestamp("deviation.created_at", &self.created_at)?,
            updated_at: parse_timestamp("deviation.updated_at", &self.updated_at)?,
            resolved_at: self
                .resolved_at
                .as_deref()
                .map(|raw| parse_timestamp("deviation.resolved_at", raw))
                .transpose()?,
        })
    }
}

impl DeviationRepositoryImpl {
    /// 创建新的 DeviationRepositoryImpl 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 统计去重键下未解决记录数（用于一致性检查）
    pub fn count_open(
        &self,
        project_id: Option<&str>,
        deviation_type: DeviationType,
        group_key: &str,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row(
            r#"
            SELECT COUNT(*) FROM deviation
            WHERE project_id IS ?1 AND deviation_type = ?2 AND group_key = ?3 AND resolved = 0
            "#,
            params![project_id, deviation_type.as_str(), group_key],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

impl DeviationRepository for DeviationRepositoryImpl {
    fn find_open(
        &self,
        project_id: Option<&str>,
        deviation_type: DeviationType,
        group_key: &str,
    ) -> RepositoryResult<Option<Deviation>> {
        let raw = {
            let conn = self.get_conn()?;
            let sql = format!(
                "SELECT {} FROM deviation \
                 WHERE project_id IS ?1 AND deviation_type = ?2 AND group_key = ?3 AND resolved = 0 \
                 ORDER BY created_at ASC LIMIT 1",
                DEVIATION_COLUMNS
            );
            let found = conn
                .query_row(
                    &sql,
                    params![project_id, deviation_type.as_str(), group_key],
                    map_raw,
                )
                .optional()?;
            found
        };
        raw.map(RawDeviation::into_deviation).transpose()
    }

    fn upsert_open(&self, draft: &DeviationDraft) -> RepositoryResult<UpsertOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        let existing: Option<String> = tx
            .query_row(
                r#"
                SELECT deviation_id FROM deviation
                WHERE project_id IS ?1 AND deviation_type = ?2 AND group_key = ?3 AND resolved = 0
                ORDER BY created_at ASC LIMIT 1
                "#,
                params![
                    draft.project_id,
                    draft.deviation_type.as_str(),
                    draft.group_key
                ],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(id) => {
                tx.execute(
                    r#"
                    UPDATE deviation
                    SET severity = ?1, message = ?2, impact_value = ?3, updated_at = ?4
                    WHERE deviation_id = ?5
                    "#,
                    params![
                        draft.severity.as_str(),
                        draft.message,
                        draft.impact_value,
                        now,
                        id
                    ],
                )?;
                UpsertOutcome::Updated(id)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    r#"
                    INSERT INTO deviation (
                        deviation_id, project_id, deviation_type, severity, group_key,
                        message, impact_value, resolved, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)
                    "#,
                    params![
                        id,
                        draft.project_id,
                        draft.deviation_type.as_str(),
                        draft.severity.as_str(),
                        draft.group_key,
                        draft.message,
                        draft.impact_value,
                        now,
                    ],
                )?;
                UpsertOutcome::Inserted(id)
            }
        };

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(outcome)
    }

    fn resolve_open(
        &self,
        project_id: Option<&str>,
        deviation_type: DeviationType,
        group_key: &str,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            r#"
            UPDATE deviation
            SET resolved = 1, resolved_at = ?4, updated_at = ?4
            WHERE project_id IS ?1 AND deviation_type = ?2 AND group_key = ?3 AND resolved = 0
            "#,
            params![project_id, deviation_type.as_str(), group_key, now],
        )?;
        Ok(n)
    }

    fn resolve_all_open(
        &self,
        project_id: Option<&str>,
        deviation_type: DeviationType,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            r#"
            UPDATE deviation
            SET resolved = 1, resolved_at = ?3, updated_at = ?3
            WHERE project_id IS ?1 AND deviation_type = ?2 AND resolved = 0
            "#,
            params![project_id, deviation_type.as_str(), now],
        )?;
        Ok(n)
    }

    fn list_open(
        &self,
        project_id: Option<&str>,
        deviation_type: Option<DeviationType>,
    ) -> RepositoryResult<Vec<Deviation>> {
        let raw = {
            let conn = self.get_conn()?;
            let sql = format!(
                "SELECT {} FROM deviation \
                 WHERE project_id IS ?1 AND (?2 IS NULL OR deviation_type = ?2) AND resolved = 0 \
                 ORDER BY deviation_type ASC, group_key ASC",
                DEVIATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![project_id, deviation_type.map(|t| t.as_str())],
                    map_raw,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        raw.into_iter().map(RawDeviation::into_deviation).collect()
    }

    fn list_for_project(
        &self,
        project_id: &str,
        include_resolved: bool,
    ) -> RepositoryResult<Vec<Deviation>> {
        let raw = {
            let conn = self.get_conn()?;
            let sql = format!(
                "SELECT {} FROM deviation \
                 WHERE project_id = ?1 AND (?2 = 1 OR resolved = 0) \
                 ORDER BY created_at ASC, deviation_id ASC",
                DEVIATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![project_id, include_resolved as i64], map_raw)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        raw.into_iter().map(RawDeviation::into_deviation).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn setup_repo() -> DeviationRepositoryImpl {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        DeviationRepositoryImpl::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn draft(severity: Severity, impact: f64) -> DeviationDraft {
        DeviationDraft::for_project(
            "P1",
            DeviationType::InventoryShortage,
            severity,
            "MDF18",
            format!("short {}", impact),
            Some(impact),
        )
    }

    #[test]
    fn test_upsert_refreshes_in_place() {
        let repo = setup_repo();
        let first = repo.upsert_open(&draft(Severity::Medium, 2.0)).unwrap();
        assert!(matches!(first, UpsertOutcome::Inserted(_)));

        let second = repo.upsert_open(&draft(Severity::High, 5.0)).unwrap();
        assert_eq!(second, UpsertOutcome::Updated(first.id().to_string()));

        let open = repo
            .find_open(Some("P1"), DeviationType::InventoryShortage, "MDF18")
            .unwrap()
            .unwrap();
        assert_eq!(open.id, first.id());
        assert_eq!(open.severity, Severity::High);
        assert_eq!(open.impact_value, Some(5.0));
        assert_eq!(open.message, "short 5");
    }

    #[test]
    fn test_resolve_then_upsert_creates_new_row() {
        let repo = setup_repo();
        let first = repo.upsert_open(&draft(Severity::Medium, 2.0)).unwrap();
        assert_eq!(
            repo.resolve_open(Some("P1"), DeviationType::InventoryShortage, "MDF18")
                .unwrap(),
            1
        );
        let second = repo.upsert_open(&draft(Severity::Medium, 2.0)).unwrap();
        assert_ne!(first.id(), second.id());

        let history = repo.list_for_project("P1", true).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].resolved);
        assert!(history[0].resolved_at.is_some());
        assert_eq!(repo.list_for_project("P1", false).unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_without_open_row_is_noop() {
        let repo = setup_repo();
        assert_eq!(
            repo.resolve_open(Some("P1"), DeviationType::OrderDelay, "X")
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_null_project_matches_null_only() {
        let repo = setup_repo();
        let mut global = draft(Severity::Low, 1.0);
        global.project_id = None;
        repo.upsert_open(&global).unwrap();
        repo.upsert_open(&global).unwrap();

        assert_eq!(
            repo.count_open(None, DeviationType::InventoryShortage, "MDF18")
                .unwrap(),
            1
        );
        assert!(repo
            .find_open(Some("P1"), DeviationType::InventoryShortage, "MDF18")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_open_filters_type() {
        let repo = setup_repo();
        repo.upsert_open(&draft(Severity::Medium, 2.0)).unwrap();
        repo.upsert_open(&DeviationDraft::for_project(
            "P1",
            DeviationType::OrderDelay,
            Severity::Medium,
            "PLY12",
            "no order",
            Some(3.0),
        ))
        .unwrap();

        assert_eq!(repo.list_open(Some("P1"), None).unwrap().len(), 2);
        let delays = repo
            .list_open(Some("P1"), Some(DeviationType::OrderDelay))
            .unwrap();
        assert_eq!(delays.len(), 1);
        assert_eq!(delays[0].group_key, "PLY12");

        assert_eq!(
            repo.resolve_all_open(Some("P1"), DeviationType::OrderDelay)
                .unwrap(),
            1
        );
        assert_eq!(repo.list_open(Some("P1"), None).unwrap().len(), 1);
    }
}
