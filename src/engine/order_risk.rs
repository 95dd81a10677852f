// ==========================================
// 橱柜工坊偏差引擎 - 采购延误检测
// ==========================================
// 需求 > 已预留，且系统内没有任何采购单行引用该物料 → order_delay
// 说明: 引用检查是全局的，其他项目下的采购单也算覆盖
// 收尾: 本轮未标记的 order_delay 一律解决
// ==========================================

use crate::domain::deviation::DeviationDraft;
use crate::domain::types::{DeviationType, Severity};
use crate::engine::deviation_store::DeviationStore;
use crate::engine::error::EngineResult;
use crate::i18n::{fmt_num, t_with_args};
use crate::repository::{OrderRepository, ProjectRepository};
use std::collections::HashSet;
use std::sync::Arc;

pub struct OrderRiskDetector {
    project_repo: Arc<dyn ProjectRepository>,
    order_repo: Arc<dyn OrderRepository>,
    store: DeviationStore,
}

impl OrderRiskDetector {
    pub fn new(
        project_repo: Arc<dyn ProjectRepository>,
        order_repo: Arc<dyn OrderRepository>,
        store: DeviationStore,
    ) -> Self {
        Self {
            project_repo,
            order_repo,
            store,
        }
    }

    pub async fn recalc(&self, project_id: &str) -> EngineResult<()> {
        let requirements = self.project_repo.list_material_requirements(project_id)?;

        let mut delayed: HashSet<String> = HashSet::new();
        for req in requirements.iter().filter(|r| r.required_qty > r.allocated_qty) {
            if self
                .order_repo
                .any_line_references_material(&req.material_code)?
            {
                continue;
            }
            let unmet = req.unmet_qty();
            self.store.upsert(DeviationDraft::for_project(
                project_id,
                DeviationType::OrderDelay,
                Severity::Medium,
                req.material_code.as_str(),
                t_with_args(
                    "deviation.order_delay",
                    &[("code", req.material_code.as_str()), ("unmet", fmt_num(unmet).as_str())],
                ),
                Some(unmet),
            ))?;
            delayed.insert(req.material_code.clone());
        }

        let stale = self
            .store
            .resolve_stale(Some(project_id), DeviationType::OrderDelay, &delayed)?;

        tracing::info!(
            project_id,
            delayed = delayed.len(),
            stale_resolved = stale,
            "采购延误检测完成"
        );
        Ok(())
    }
}
