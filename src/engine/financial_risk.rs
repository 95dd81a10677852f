// ==========================================
// 橱柜工坊偏差引擎 - 财务风险检测
// ==========================================
// cost_overrun: 实际成本 > 预估成本 (group_key = project_id)
// margin_risk:  实际毛利率 < 预警线 (group_key = "margin")
// 红线: 建议售价 ≤ 0 时毛利检测整体跳过（不新建也不解决）
// ==========================================

use crate::domain::deviation::DeviationDraft;
use crate::domain::settings::RiskSettings;
use crate::domain::types::{CostKind, DeviationType, Severity};
use crate::engine::deviation_store::DeviationStore;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::settings_resolver::RiskSettingsResolver;
use crate::i18n::{fmt_num, fmt_pct, t_with_args};
use crate::repository::ProjectRepository;
use std::sync::Arc;

pub const MARGIN_GROUP_KEY: &str = "margin";

/// 毛利评估结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginAssessment {
    pub recommended_price: f64,
    pub real_margin: f64,
    /// None 表示毛利不低于预警线
    pub severity: Option<Severity>,
    pub impact: f64,
}

/// 毛利评估
///
/// # 返回
/// - None: 建议售价 ≤ 0，无法评估
pub fn assess_margin(
    expected_cost: f64,
    real_cost: f64,
    markup: f64,
    settings: &RiskSettings,
) -> Option<MarginAssessment> {
    let recommended_price = expected_cost * markup;
    if recommended_price <= 0.0 {
        return None;
    }
    let real_margin = (recommended_price - real_cost) / recommended_price;
    let severity = if real_margin >= settings.warning_margin {
        None
    } else if real_margin < settings.critical_margin {
        Some(Severity::Critical)
    } else if real_margin < settings.high_risk_margin {
        Some(Severity::High)
    } else {
        Some(Severity::Medium)
    };
    Some(MarginAssessment {
        recommended_price,
        real_margin,
        severity,
        // 实际毛利已高于目标但低于预警线时可能为负
        impact: recommended_price * (settings.target_margin - real_margin),
    })
}

pub struct FinancialRiskDetector {
    project_repo: Arc<dyn ProjectRepository>,
    resolver: Arc<dyn RiskSettingsResolver>,
    store: DeviationStore,
}

impl FinancialRiskDetector {
    pub fn new(
        project_repo: Arc<dyn ProjectRepository>,
        resolver: Arc<dyn RiskSettingsResolver>,
        store: DeviationStore,
    ) -> Self {
        Self {
            project_repo,
            resolver,
            store,
        }
    }

    pub async fn recalc(&self, project_id: &str) -> EngineResult<()> {
        let project = self
            .project_repo
            .find_project(project_id)?
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.to_string()))?;

        let mut expected_cost = 0.0;
        let mut real_cost = 0.0;
        for line in self.project_repo.list_cost_lines(project_id)? {
            match line.kind {
                CostKind::Estimate => expected_cost += line.amount,
                CostKind::Actual => real_cost += line.amount,
            }
        }

        // ===== cost_overrun =====
        if real_cost > expected_cost {
            let overrun = real_cost - expected_cost;
            self.store.upsert(DeviationDraft::for_project(
                project_id,
                DeviationType::CostOverrun,
                Severity::Medium,
                project_id,
                t_with_args(
                    "deviation.cost_overrun",
                    &[
                        ("actual", fmt_num(real_cost).as_str()),
                        ("expected", fmt_num(expected_cost).as_str()),
                        ("overrun", fmt_num(overrun).as_str()),
                    ],
                ),
                Some(overrun),
            ))?;
        } else {
            self.store
                .resolve(Some(project_id), DeviationType::CostOverrun, project_id)?;
        }

        // ===== margin_risk =====
        let settings = self
            .resolver
            .resolve(&project.project_type, Some(project_id))
            .await;
        let markup = project.effective_markup();
        let Some(assessment) = assess_margin(expected_cost, real_cost, markup, &settings) else {
            tracing::debug!(project_id, expected_cost, markup, "无预估成本，跳过毛利检测");
            return Ok(());
        };

        match assessment.severity {
            Some(severity) => {
                self.store.upsert(DeviationDraft::for_project(
                    project_id,
                    DeviationType::MarginRisk,
                    severity,
                    MARGIN_GROUP_KEY,
                    t_with_args(
                        "deviation.margin_risk",
                        &[
                            ("margin", fmt_pct(assessment.real_margin).as_str()),
                            ("warning", fmt_pct(settings.warning_margin).as_str()),
                            ("price", fmt_num(assessment.recommended_price).as_str()),
                            ("actual", fmt_num(real_cost).as_str()),
                        ],
                    ),
                    Some(assessment.impact),
                ))?;
            }
            None => {
                self.store.resolve(
                    Some(project_id),
                    DeviationType::MarginRisk,
                    MARGIN_GROUP_KEY,
                )?;
            }
        }

        tracing::info!(
            project_id,
            expected_cost,
            real_cost,
            real_margin = assessment.real_margin,
            "财务风险检测完成"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_margin_has_no_severity() {
        let a = assess_margin(1000.0, 1200.0, 2.5, &RiskSettings::default()).unwrap();
        assert_eq!(a.recommended_price, 2500.0);
        assert!((a.real_margin - 0.52).abs() < 1e-9);
        assert_eq!(a.severity, None);
    }

    #[test]
    fn test_severity_bands() {
        let s = RiskSettings::default();
        // 建议售价 1000
        let band = |real: f64| assess_margin(400.0, real, 2.5, &s).unwrap().severity;
        assert_eq!(band(760.0), Some(Severity::Medium)); // 0.24
        assert_eq!(band(830.0), Some(Severity::High)); // 0.17
        assert_eq!(band(890.0), Some(Severity::Critical)); // 0.11
        assert_eq!(band(750.0), None); // 0.25 不低于预警线
    }

    #[test]
    fn test_impact_can_be_negative() {
        let s = RiskSettings {
            target_margin: 0.20,
            warning_margin: 0.30,
            ..RiskSettings::default()
        };
        // 毛利 0.24: 低于预警线但高于目标
        let a = assess_margin(400.0, 760.0, 2.5, &s).unwrap();
        assert_eq!(a.severity, Some(Severity::Medium));
        assert!(a.impact < 0.0);
        assert!((a.impact - 1000.0 * (0.20 - 0.24)).abs() < 1e-9);
    }

    #[test]
    fn test_no_estimate_skips_margin() {
        assert!(assess_margin(0.0, 500.0, 2.5, &RiskSettings::default()).is_none());
        assert!(assess_margin(100.0, 500.0, 0.0, &RiskSettings::default()).is_none());
    }
}
