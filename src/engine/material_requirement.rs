// ==========================================
// 橱柜工坊偏差引擎 - 物料需求计算与落库
// ==========================================
// 计算: 板件面积 → 整张板材数量（向上取整）
// 落库: material_requirement 是快照，不是历史
//   - upsert: 需求集合 ∪ 已预留集合
//   - delete: 不在需求集合中的行（仅有预留不保留）
// ==========================================

use crate::domain::project::{MaterialRequirement, PanelPart, SheetFormat};
use crate::domain::types::MovementType;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::settings_resolver::RiskSettingsResolver;
use crate::repository::{InventoryRepository, ProjectRepository};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// ==========================================
// MaterialRequirementCalculator - 纯函数
// ==========================================
pub struct MaterialRequirementCalculator;

impl MaterialRequirementCalculator {
    /// 计算每种物料所需数量
    ///
    /// # 参数
    /// - parts: 板件（无物料编码的板件不参与）
    /// - sheet_format: 板材规格；缺失或尺寸非正时退化为按面积取整
    /// - waste_factor: 损耗系数
    ///
    /// # 返回
    /// 物料编码 → 需求数量（整数值）
    pub fn compute(
        parts: &[PanelPart],
        sheet_format: Option<SheetFormat>,
        waste_factor: f64,
    ) -> BTreeMap<String, f64> {
        let mut area_by_code: BTreeMap<String, f64> = BTreeMap::new();
        for part in parts {
            let Some(code) = part.material_code.as_deref().filter(|c| !c.is_empty()) else {
                continue;
            };
            *area_by_code.entry(code.to_string()).or_insert(0.0) +=
                part.length * part.width * part.qty;
        }

        let sheet_area = sheet_format.and_then(|s| s.area());
        area_by_code
            .into_iter()
            .map(|(code, total_area)| {
                let required = match sheet_area {
                    Some(sheet_area) => ((total_area / sheet_area) * waste_factor).ceil(),
                    // 退化模式: 面积直接作为件数
                    None => total_area.ceil(),
                };
                (code, required)
            })
            .collect()
    }
}

/// 需求重算结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequirementRecalcSummary {
    pub upserted: usize,
    pub deleted: usize,
}

// ==========================================
// MaterialRequirementRecalculator - 落库
// ==========================================
pub struct MaterialRequirementRecalculator {
    project_repo: Arc<dyn ProjectRepository>,
    inventory_repo: Arc<dyn InventoryRepository>,
    resolver: Arc<dyn RiskSettingsResolver>,
}

impl MaterialRequirementRecalculator {
    pub fn new(
        project_repo: Arc<dyn ProjectRepository>,
        inventory_repo: Arc<dyn InventoryRepository>,
        resolver: Arc<dyn RiskSettingsResolver>,
    ) -> Self {
        Self {
            project_repo,
            inventory_repo,
            resolver,
        }
    }

    pub async fn recalc(&self, project_id: &str) -> EngineResult<RequirementRecalcSummary> {
        let project = self
            .project_repo
            .find_project(project_id)?
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;
        let settings = self
            .resolver
            .resolve(&project.project_type, Some(project_id))
            .await;

        let parts = self.project_repo.list_panel_parts(project_id)?;
        let sheet_format = self.project_repo.find_sheet_format(project_id)?;
        if sheet_format.and_then(|s| s.area()).is_none() && !parts.is_empty() {
            tracing::debug!(project_id, "未配置有效板材规格，按面积取整计算需求");
        }
        let required =
            MaterialRequirementCalculator::compute(&parts, sheet_format, settings.waste_factor);

        let mut allocated: BTreeMap<String, f64> = BTreeMap::new();
        for row in self.inventory_repo.list_project_movements(project_id)? {
            if matches!(
                row.movement.movement_type,
                MovementType::Allocate | MovementType::Consume
            ) {
                *allocated.entry(row.material_code).or_insert(0.0) += row.movement.quantity;
            }
        }

        let codes: BTreeSet<&String> = required.keys().chain(allocated.keys()).collect();
        let mut summary = RequirementRecalcSummary::default();
        for code in codes {
            self.project_repo
                .upsert_material_requirement(&MaterialRequirement {
                    project_id: project_id.to_string(),
                    material_code: code.clone(),
                    required_qty: required.get(code).copied().unwrap_or(0.0),
                    allocated_qty: allocated.get(code).copied().unwrap_or(0.0),
                })?;
            summary.upserted += 1;
        }

        let keep: Vec<String> = required.keys().cloned().collect();
        summary.deleted = self
            .project_repo
            .delete_material_requirements_except(project_id, &keep)?;

        tracing::info!(
            project_id,
            upserted = summary.upserted,
            deleted = summary.deleted,
            waste_factor = settings.waste_factor,
            "物料需求重算完成"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(length: f64, width: f64, qty: f64, code: Option<&str>) -> PanelPart {
        PanelPart {
            length,
            width,
            qty,
            material_code: code.map(str::to_string),
        }
    }

    const SHEET: SheetFormat = SheetFormat {
        length: 96.0,
        width: 48.0,
    };

    #[test]
    fn test_single_part_geometry() {
        let parts = vec![part(48.0, 24.0, 2.0, Some("X"))];
        let required = MaterialRequirementCalculator::compute(&parts, Some(SHEET), 1.15);
        assert_eq!(required.get("X"), Some(&1.0));
    }

    #[test]
    fn test_parts_without_code_are_excluded() {
        let parts = vec![
            part(96.0, 48.0, 3.0, None),
            part(96.0, 48.0, 1.0, Some("")),
            part(96.0, 48.0, 1.0, Some("MDF18")),
        ];
        let required = MaterialRequirementCalculator::compute(&parts, Some(SHEET), 1.0);
        assert_eq!(required.len(), 1);
        assert_eq!(required.get("MDF18"), Some(&1.0));
    }

    #[test]
    fn test_groups_sum_area_before_rounding() {
        // 两块各半张: 合计一张，乘损耗后向上取整为 2
        let parts = vec![
            part(48.0, 48.0, 1.0, Some("MDF18")),
            part(48.0, 48.0, 1.0, Some("MDF18")),
        ];
        let required = MaterialRequirementCalculator::compute(&parts, Some(SHEET), 1.15);
        assert_eq!(required.get("MDF18"), Some(&2.0));
        let exact = MaterialRequirementCalculator::compute(&parts, Some(SHEET), 1.0);
        assert_eq!(exact.get("MDF18"), Some(&1.0));
    }

    #[test]
    fn test_fallback_without_sheet_format_uses_raw_area() {
        // 退化模式: 很少走到，但必须是面积向上取整
        let parts = vec![part(2.5, 1.5, 1.0, Some("EDGE"))];
        let required = MaterialRequirementCalculator::compute(&parts, None, 1.15);
        assert_eq!(required.get("EDGE"), Some(&4.0));

        let degenerate = SheetFormat {
            length: 0.0,
            width: 48.0,
        };
        let required = MaterialRequirementCalculator::compute(&parts, Some(degenerate), 1.15);
        assert_eq!(required.get("EDGE"), Some(&4.0));
    }

    #[test]
    fn test_required_is_monotonic_in_waste_factor_and_never_below_ratio() {
        let part_sets = vec![
            vec![part(48.0, 24.0, 2.0, Some("A"))],
            vec![part(30.0, 17.0, 7.0, Some("A")), part(96.0, 48.0, 3.0, Some("B"))],
            vec![part(11.0, 13.0, 41.0, Some("A"))],
        ];
        let sheet_area = 96.0 * 48.0;
        for parts in &part_sets {
            let mut previous: BTreeMap<String, f64> = BTreeMap::new();
            for step in 0..=20 {
                let waste = 1.0 + step as f64 * 0.05;
                let required = MaterialRequirementCalculator::compute(parts, Some(SHEET), waste);
                for (code, qty) in &required {
                    assert_eq!(qty.fract(), 0.0);
                    let area: f64 = parts
                        .iter()
                        .filter(|p| p.material_code.as_deref() == Some(code.as_str()))
                        .map(|p| p.length * p.width * p.qty)
                        .sum();
                    assert!(*qty >= area / sheet_area * waste);
                    if let Some(prev) = previous.get(code) {
                        assert!(qty >= prev);
                    }
                }
                previous = required;
            }
        }
    }
}
