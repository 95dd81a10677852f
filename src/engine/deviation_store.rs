// ==========================================
// 橱柜工坊偏差引擎 - 偏差存储协议
// ==========================================
// 所有检测器共用的 upsert / resolve 协议
// - upsert: 有未解决记录则原地刷新，否则新建
// - resolve: 批量标记，不删除
// - resolve_stale: 本轮未出现的分组键一律标记已解决
// ==========================================

use crate::domain::deviation::{Deviation, DeviationDraft, UpsertOutcome};
use crate::domain::types::DeviationType;
use crate::engine::error::EngineResult;
use crate::repository::DeviationRepository;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct DeviationStore {
    repo: Arc<dyn DeviationRepository>,
}

impl DeviationStore {
    pub fn new(repo: Arc<dyn DeviationRepository>) -> Self {
        Self { repo }
    }

    pub fn upsert(&self, draft: DeviationDraft) -> EngineResult<UpsertOutcome> {
        let outcome = self.repo.upsert_open(&draft)?;
        tracing::debug!(
            project_id = ?draft.project_id,
            deviation_type = %draft.deviation_type,
            group_key = %draft.group_key,
            severity = %draft.severity,
            outcome = ?outcome,
            "偏差已写入"
        );
        Ok(outcome)
    }

    pub fn resolve(
        &self,
        project_id: Option<&str>,
        deviation_type: DeviationType,
        group_key: &str,
    ) -> EngineResult<usize> {
        let n = self.repo.resolve_open(project_id, deviation_type, group_key)?;
        if n > 0 {
            tracing::debug!(
                project_id = ?project_id,
                deviation_type = %deviation_type,
                group_key,
                resolved = n,
                "偏差已解决"
            );
        }
        Ok(n)
    }

    pub fn resolve_all(
        &self,
        project_id: Option<&str>,
        deviation_type: DeviationType,
    ) -> EngineResult<usize> {
        Ok(self.repo.resolve_all_open(project_id, deviation_type)?)
    }

    /// 解决分组键不在 `keep` 中的未解决偏差
    pub fn resolve_stale(
        &self,
        project_id: Option<&str>,
        deviation_type: DeviationType,
        keep: &HashSet<String>,
    ) -> EngineResult<usize> {
        let mut resolved = 0;
        let stale: HashSet<String> = self
            .repo
            .list_open(project_id, Some(deviation_type))?
            .into_iter()
            .map(|d| d.group_key)
            .filter(|key| !keep.contains(key))
            .collect();
        for key in stale {
            resolved += self.resolve(project_id, deviation_type, &key)?;
        }
        Ok(resolved)
    }

    pub fn list_open(
        &self,
        project_id: Option<&str>,
        deviation_type: Option<DeviationType>,
    ) -> EngineResult<Vec<Deviation>> {
        Ok(self.repo.list_open(project_id, deviation_type)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;
    use crate::domain::types::Severity;
    use crate::repository::DeviationRepositoryImpl;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup_store() -> DeviationStore {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        DeviationStore::new(Arc::new(DeviationRepositoryImpl::from_connection(Arc::new(
            Mutex::new(conn),
        ))))
    }

    fn delay(code: &str) -> DeviationDraft {
        DeviationDraft::for_project(
            "P1",
            DeviationType::OrderDelay,
            Severity::Medium,
            code,
            format!("{} not ordered", code),
            Some(1.0),
        )
    }

    #[test]
    fn test_dedup_over_mixed_sequence() {
        let store = setup_store();
        let ops: Vec<bool> = vec![true, true, false, false, true, true, true, false, true];
        for upsert in ops {
            if upsert {
                store.upsert(delay("MDF18")).unwrap();
            } else {
                store
                    .resolve(Some("P1"), DeviationType::OrderDelay, "MDF18")
                    .unwrap();
            }
            let open = store
                .list_open(Some("P1"), Some(DeviationType::OrderDelay))
                .unwrap();
            assert!(open.len() <= 1);
        }
    }

    #[test]
    fn test_resolve_stale_keeps_listed_keys() {
        let store = setup_store();
        store.upsert(delay("MDF18")).unwrap();
        store.upsert(delay("PLY12")).unwrap();
        store.upsert(delay("OAK")).unwrap();

        let keep: HashSet<String> = ["PLY12".to_string()].into_iter().collect();
        assert_eq!(
            store
                .resolve_stale(Some("P1"), DeviationType::OrderDelay, &keep)
                .unwrap(),
            2
        );
        let open = store.list_open(Some("P1"), None).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].group_key, "PLY12");
    }
}
