// ==========================================
// 橱柜工坊偏差引擎 - 重算编排器
// ==========================================
// 全量顺序: Financial → MaterialRequirement → InventoryRisk → OrderRisk
// 后一阶段依赖前一阶段写入的状态
// 红线: 单阶段失败只记录，不中断后续阶段，不抛给调用方
// 触发器 → 阶段映射见 RecalcStage::for_trigger
// ==========================================

use crate::config::ConfigScope;
use crate::engine::deviation_store::DeviationStore;
use crate::engine::error::EngineResult;
use crate::engine::events::{RecalcStage, RecalcTrigger};
use crate::engine::financial_risk::FinancialRiskDetector;
use crate::engine::inventory_risk::InventoryRiskDetector;
use crate::engine::inventory_state::InventoryStateComputer;
use crate::engine::material_requirement::MaterialRequirementRecalculator;
use crate::engine::order_risk::OrderRiskDetector;
use crate::engine::repositories::RiskRepositories;
use crate::engine::settings_resolver::{primary_project_type, RiskSettingsResolver};
use crate::i18n::t_with_args;
use crate::repository::ProjectRepository;
use std::sync::Arc;
use tracing::{error, info};

// ==========================================
// 重算报告
// ==========================================

/// 单个项目一次重算的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectRecalcReport {
    pub project_id: String,
    pub completed: Vec<RecalcStage>,
    /// (阶段, 错误信息)
    pub failures: Vec<(RecalcStage, String)>,
}

impl ProjectRecalcReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 一个触发器展开后全部项目的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecalcReport {
    pub stages: Vec<RecalcStage>,
    pub projects: Vec<ProjectRecalcReport>,
}

impl RecalcReport {
    pub fn is_success(&self) -> bool {
        self.projects.iter().all(|p| p.is_success())
    }

    pub fn failure_count(&self) -> usize {
        self.projects.iter().map(|p| p.failures.len()).sum()
    }

    /// 汇总失败信息（写入 recalc_log.error_message）
    pub fn failure_summary(&self) -> Option<String> {
        let lines: Vec<String> = self
            .projects
            .iter()
            .flat_map(|p| {
                p.failures.iter().map(move |(stage, e)| {
                    format!("{}: {}", p.project_id, stage_failure_text(*stage, e))
                })
            })
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("; "))
        }
    }
}

fn stage_failure_text(stage: RecalcStage, error: &str) -> String {
    t_with_args(
        "recalc.stage_failed",
        &[("stage", stage.as_str()), ("error", error)],
    )
}

// ==========================================
// RiskOrchestrator - 重算编排器
// ==========================================

pub struct RiskOrchestrator {
    project_repo: Arc<dyn ProjectRepository>,
    financial: FinancialRiskDetector,
    requirements: MaterialRequirementRecalculator,
    inventory: InventoryRiskDetector,
    orders: OrderRiskDetector,
}

impl RiskOrchestrator {
    /// 创建新的编排器实例
    ///
    /// # 参数
    /// - repos: 仓储集合
    /// - resolver: 阈值解析器（每次检测重新解析）
    pub fn new(repos: RiskRepositories, resolver: Arc<dyn RiskSettingsResolver>) -> Self {
        let store = DeviationStore::new(repos.deviation_repo.clone());
        let state = Arc::new(InventoryStateComputer::new(
            repos.inventory_repo.clone(),
            repos.order_repo.clone(),
        ));
        Self {
            financial: FinancialRiskDetector::new(
                repos.project_repo.clone(),
                resolver.clone(),
                store.clone(),
            ),
            requirements: MaterialRequirementRecalculator::new(
                repos.project_repo.clone(),
                repos.inventory_repo.clone(),
                resolver.clone(),
            ),
            inventory: InventoryRiskDetector::new(
                repos.project_repo.clone(),
                state,
                resolver,
                store.clone(),
            ),
            orders: OrderRiskDetector::new(
                repos.project_repo.clone(),
                repos.order_repo.clone(),
                store,
            ),
            project_repo: repos.project_repo,
        }
    }

    /// 全量重算单个项目
    pub async fn recalculate_project_state(&self, project_id: &str) -> ProjectRecalcReport {
        self.run_stages(project_id, &RecalcStage::ALL).await
    }

    // ===== 触发入口 =====

    /// 成本行变更: 仅财务
    pub async fn on_cost_lines_changed(&self, project_id: &str) -> RecalcReport {
        self.dispatch(&RecalcTrigger::CostLinesChanged {
            project_id: project_id.to_string(),
        })
        .await
    }

    /// 板件变更: 需求 + 库存 + 采购
    pub async fn on_panel_parts_changed(&self, project_id: &str) -> RecalcReport {
        self.dispatch(&RecalcTrigger::PanelPartsChanged {
            project_id: project_id.to_string(),
        })
        .await
    }

    /// 库存/流水变更: 引用这些物料的项目做库存检测
    pub async fn on_inventory_changed(&self, material_codes: &[String]) -> RecalcReport {
        self.dispatch(&RecalcTrigger::InventoryChanged {
            material_codes: material_codes.to_vec(),
        })
        .await
    }

    /// 采购单变更: 引用这些物料的项目做库存 + 采购检测
    pub async fn on_orders_changed(&self, material_codes: &[String]) -> RecalcReport {
        self.dispatch(&RecalcTrigger::OrdersChanged {
            material_codes: material_codes.to_vec(),
        })
        .await
    }

    /// 阈值变更: 受影响项目做财务 + 需求
    pub async fn on_settings_changed(&self, scope: &ConfigScope) -> RecalcReport {
        self.dispatch(&RecalcTrigger::SettingsChanged {
            scope: scope.clone(),
        })
        .await
    }

    /// 项目变更: 全量
    pub async fn on_project_changed(&self, project_id: &str) -> RecalcReport {
        self.dispatch(&RecalcTrigger::ProjectChanged {
            project_id: project_id.to_string(),
        })
        .await
    }

    /// 执行触发器，目标项目解析失败也只记录
    pub async fn dispatch(&self, trigger: &RecalcTrigger) -> RecalcReport {
        match self.execute(trigger).await {
            Ok(report) => report,
            Err(e) => {
                error!(trigger = trigger.as_str(), error = %e, "重算目标解析失败");
                RecalcReport {
                    stages: RecalcStage::for_trigger(trigger),
                    projects: Vec::new(),
                }
            }
        }
    }

    /// 执行触发器
    ///
    /// # 返回
    /// - Err: 仅当受影响项目无法确定时
    /// - Ok(report): 各项目各阶段结果（阶段失败不会变成 Err）
    pub async fn execute(&self, trigger: &RecalcTrigger) -> EngineResult<RecalcReport> {
        let stages = RecalcStage::for_trigger(trigger);
        let project_ids = self.affected_projects(trigger)?;

        let mut report = RecalcReport {
            stages: stages.clone(),
            projects: Vec::with_capacity(project_ids.len()),
        };
        for project_id in &project_ids {
            report
                .projects
                .push(self.run_stages(project_id, &stages).await);
        }

        info!(
            trigger = trigger.as_str(),
            projects = project_ids.len(),
            stages = %RecalcStage::join(&stages),
            failures = report.failure_count(),
            "触发器处理完成"
        );
        Ok(report)
    }

    /// 触发器 → 受影响项目
    pub fn affected_projects(&self, trigger: &RecalcTrigger) -> EngineResult<Vec<String>> {
        let ids = match trigger {
            RecalcTrigger::CostLinesChanged { project_id }
            | RecalcTrigger::PanelPartsChanged { project_id }
            | RecalcTrigger::ProjectChanged { project_id }
            | RecalcTrigger::Manual {
                project_id: Some(project_id),
            } => vec![project_id.clone()],
            RecalcTrigger::Manual { project_id: None } => self.all_project_ids()?,
            RecalcTrigger::InventoryChanged { material_codes }
            | RecalcTrigger::OrdersChanged { material_codes } => self
                .project_repo
                .find_project_ids_by_material_codes(material_codes)?,
            RecalcTrigger::SettingsChanged { scope } => match scope {
                ConfigScope::Global => self.all_project_ids()?,
                ConfigScope::Project { project_id } => vec![project_id.clone()],
                // 与阈值解析一致: 只按项目类型串的第一个标记匹配
                ConfigScope::ProjectType { project_type } => self
                    .project_repo
                    .list_projects()?
                    .into_iter()
                    .filter(|p| primary_project_type(&p.project_type) == Some(project_type.as_str()))
                    .map(|p| p.id)
                    .collect(),
            },
        };
        Ok(ids)
    }

    fn all_project_ids(&self) -> EngineResult<Vec<String>> {
        Ok(self
            .project_repo
            .list_projects()?
            .into_iter()
            .map(|p| p.id)
            .collect())
    }

    /// 按固定顺序执行指定阶段
    pub async fn run_stages(&self, project_id: &str, stages: &[RecalcStage]) -> ProjectRecalcReport {
        let mut ordered = stages.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut report = ProjectRecalcReport {
            project_id: project_id.to_string(),
            ..Default::default()
        };
        for stage in ordered {
            let result = match stage {
                RecalcStage::Financial => self.financial.recalc(project_id).await,
                RecalcStage::MaterialRequirement => {
                    self.requirements.recalc(project_id).await.map(|_| ())
                }
                RecalcStage::InventoryRisk => self.inventory.recalc(project_id).await,
                RecalcStage::OrderRisk => self.orders.recalc(project_id).await,
            };
            match result {
                Ok(()) => report.completed.push(stage),
                Err(e) => {
                    error!(
                        project_id,
                        stage = stage.as_str(),
                        error = %e,
                        "重算阶段失败，继续后续阶段"
                    );
                    report.failures.push((stage, e.to_string()));
                }
            }
        }
        report
    }
}
