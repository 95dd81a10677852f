// ==========================================
// 橱柜工坊偏差引擎 - 库存短缺检测
// ==========================================
// 可用库存 = available + incoming（在途采购也算覆盖）
// 短缺比例 ≥ inventory_shortage_high → HIGH，否则 MEDIUM
// group_key = 物料编码
// ==========================================

use crate::domain::deviation::DeviationDraft;
use crate::domain::types::{DeviationType, Severity};
use crate::engine::deviation_store::DeviationStore;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::inventory_state::InventoryStateComputer;
use crate::engine::settings_resolver::RiskSettingsResolver;
use crate::i18n::{fmt_num, fmt_pct, t_with_args};
use crate::repository::ProjectRepository;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// 短缺评估
///
/// # 返回
/// - None: 无短缺
/// - Some((shortage, shortage_percent, severity))
pub fn assess_shortage(
    required_qty: f64,
    available_stock: f64,
    shortage_high: f64,
) -> Option<(f64, f64, Severity)> {
    if required_qty <= available_stock {
        return None;
    }
    let shortage = required_qty - available_stock;
    let percent = shortage / required_qty;
    let severity = if percent >= shortage_high {
        Severity::High
    } else {
        Severity::Medium
    };
    Some((shortage, percent, severity))
}

pub struct InventoryRiskDetector {
    project_repo: Arc<dyn ProjectRepository>,
    state: Arc<InventoryStateComputer>,
    resolver: Arc<dyn RiskSettingsResolver>,
    store: DeviationStore,
}

impl InventoryRiskDetector {
    pub fn new(
        project_repo: Arc<dyn ProjectRepository>,
        state: Arc<InventoryStateComputer>,
        resolver: Arc<dyn RiskSettingsResolver>,
        store: DeviationStore,
    ) -> Self {
        Self {
            project_repo,
            state,
            resolver,
            store,
        }
    }

    pub async fn recalc(&self, project_id: &str) -> EngineResult<()> {
        let requirements = self.project_repo.list_material_requirements(project_id)?;
        if requirements.is_empty() {
            let resolved = self
                .store
                .resolve_all(Some(project_id), DeviationType::InventoryShortage)?;
            tracing::debug!(project_id, resolved, "项目无物料需求，清除全部短缺偏差");
            return Ok(());
        }

        let project = self
            .project_repo
            .find_project(project_id)?
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;
        let settings = self
            .resolver
            .resolve(&project.project_type, Some(project_id))
            .await;

        let codes: Vec<String> = requirements.iter().map(|r| r.material_code.clone()).collect();
        let stock: HashMap<String, f64> = self
            .state
            .compute(Some(codes.as_slice()))?
            .into_iter()
            .map(|s| {
                let available = s.available_stock();
                (s.material_code, available)
            })
            .collect();

        let mut short = 0;
        for req in &requirements {
            let available_stock = stock.get(&req.material_code).copied().unwrap_or(0.0);
            match assess_shortage(
                req.required_qty,
                available_stock,
                settings.inventory_shortage_high,
            ) {
                Some((shortage, percent, severity)) => {
                    short += 1;
                    tracing::debug!(
                        project_id,
                        material_code = %req.material_code,
                        required = req.required_qty,
                        available_stock,
                        shortage,
                        "物料短缺"
                    );
                    self.store.upsert(DeviationDraft::for_project(
                        project_id,
                        DeviationType::InventoryShortage,
                        severity,
                        req.material_code.as_str(),
                        t_with_args(
                            "deviation.inventory_shortage",
                            &[
                                ("code", req.material_code.as_str()),
                                ("required", fmt_num(req.required_qty).as_str()),
                                ("available", fmt_num(available_stock).as_str()),
                                ("shortage", fmt_num(shortage).as_str()),
                                ("percent", fmt_pct(percent).as_str()),
                            ],
                        ),
                        Some(shortage),
                    ))?;
                }
                None => {
                    self.store.resolve(
                        Some(project_id),
                        DeviationType::InventoryShortage,
                        &req.material_code,
                    )?;
                }
            }
        }

        // 不再是需求的物料，其短缺偏差一并清除
        let keep: HashSet<String> = codes.into_iter().collect();
        let stale = self.store.resolve_stale(
            Some(project_id),
            DeviationType::InventoryShortage,
            &keep,
        )?;

        tracing::info!(
            project_id,
            materials = requirements.len(),
            short,
            stale_resolved = stale,
            "库存短缺检测完成"
        );
        Ok(())
    }
}
