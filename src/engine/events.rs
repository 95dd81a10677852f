// ==========================================
// 橱柜工坊偏差引擎 - 重算触发事件
// ==========================================
// 职责: 定义重算触发器与事件发布 trait，实现依赖倒置
// 说明: 上游变更处理方只依赖发布 trait，RecalcQueue 实现适配
// ==========================================

use crate::config::ConfigScope;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 重算触发器
// ==========================================

/// 上游数据变更后请求的重算
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecalcTrigger {
    /// 成本行变更
    CostLinesChanged { project_id: String },
    /// 板件变更
    PanelPartsChanged { project_id: String },
    /// 库存/库存流水变更
    InventoryChanged { material_codes: Vec<String> },
    /// 采购单变更
    OrdersChanged { material_codes: Vec<String> },
    /// 风险阈值变更
    SettingsChanged { scope: ConfigScope },
    /// 项目本身变更（全量重算）
    ProjectChanged { project_id: String },
    /// 手动触发（None 表示全部项目）
    Manual { project_id: Option<String> },
}

impl RecalcTrigger {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &'static str {
        match self {
            RecalcTrigger::CostLinesChanged { .. } => "CostLinesChanged",
            RecalcTrigger::PanelPartsChanged { .. } => "PanelPartsChanged",
            RecalcTrigger::InventoryChanged { .. } => "InventoryChanged",
            RecalcTrigger::OrdersChanged { .. } => "OrdersChanged",
            RecalcTrigger::SettingsChanged { .. } => "SettingsChanged",
            RecalcTrigger::ProjectChanged { .. } => "ProjectChanged",
            RecalcTrigger::Manual { .. } => "Manual",
        }
    }

    /// 直接指定的单个项目（按物料/作用域展开的触发器返回 None）
    pub fn project_id(&self) -> Option<&str> {
        match self {
            RecalcTrigger::CostLinesChanged { project_id }
            | RecalcTrigger::PanelPartsChanged { project_id }
            | RecalcTrigger::ProjectChanged { project_id } => Some(project_id),
            RecalcTrigger::Manual { project_id } => project_id.as_deref(),
            RecalcTrigger::SettingsChanged {
                scope: ConfigScope::Project { project_id },
            } => Some(project_id),
            _ => None,
        }
    }
}

// ==========================================
// 重算阶段
// ==========================================

/// 固定执行顺序: Financial → MaterialRequirement → InventoryRisk → OrderRisk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalcStage {
    Financial,
    MaterialRequirement,
    InventoryRisk,
    OrderRisk,
}

impl RecalcStage {
    pub const ALL: [RecalcStage; 4] = [
        RecalcStage::Financial,
        RecalcStage::MaterialRequirement,
        RecalcStage::InventoryRisk,
        RecalcStage::OrderRisk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecalcStage::Financial => "financial",
            RecalcStage::MaterialRequirement => "material_requirement",
            RecalcStage::InventoryRisk => "inventory_risk",
            RecalcStage::OrderRisk => "order_risk",
        }
    }

    fn should_run(&self, trigger: &RecalcTrigger) -> bool {
        match self {
            RecalcStage::Financial => matches!(
                trigger,
                RecalcTrigger::CostLinesChanged { .. }
                    | RecalcTrigger::SettingsChanged { .. }
                    | RecalcTrigger::ProjectChanged { .. }
                    | RecalcTrigger::Manual { .. }
            ),
            RecalcStage::MaterialRequirement => matches!(
                trigger,
                RecalcTrigger::PanelPartsChanged { .. }
                    | RecalcTrigger::SettingsChanged { .. }
                    | RecalcTrigger::ProjectChanged { .. }
                    | RecalcTrigger::Manual { .. }
            ),
            RecalcStage::InventoryRisk => matches!(
                trigger,
                RecalcTrigger::PanelPartsChanged { .. }
                    | RecalcTrigger::InventoryChanged { .. }
                    | RecalcTrigger::OrdersChanged { .. }
                    | RecalcTrigger::ProjectChanged { .. }
                    | RecalcTrigger::Manual { .. }
            ),
            RecalcStage::OrderRisk => matches!(
                trigger,
                RecalcTrigger::PanelPartsChanged { .. }
                    | RecalcTrigger::OrdersChanged { .. }
                    | RecalcTrigger::ProjectChanged { .. }
                    | RecalcTrigger::Manual { .. }
            ),
        }
    }

    /// 触发器 → 需要执行的阶段（已按固定顺序排列）
    pub fn for_trigger(trigger: &RecalcTrigger) -> Vec<RecalcStage> {
        RecalcStage::ALL
            .into_iter()
            .filter(|stage| stage.should_run(trigger))
            .collect()
    }

    /// 逗号拼接的阶段名（写入 recalc_log.stages）
    pub fn join(stages: &[RecalcStage]) -> String {
        stages
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 重算事件发布者 Trait
///
/// # 实现说明
/// - `RecalcQueue` 实现此 trait，将触发器入队
/// - 发布方不等待重算完成
pub trait RecalcEventPublisher: Send + Sync {
    /// 发布触发器
    ///
    /// # 返回
    /// - `Ok(job_id)`: 任务 ID（如果支持）或空字符串
    fn publish(&self, trigger: RecalcTrigger) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要触发重算的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl RecalcEventPublisher for NoOpEventPublisher {
    fn publish(&self, trigger: RecalcTrigger) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(trigger = trigger.as_str(), "NoOpEventPublisher: 跳过触发");
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn RecalcEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn RecalcEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布触发器（如果有发布者）
    ///
    /// 说明: 发布失败只记日志，不影响调用方
    pub fn publish(&self, trigger: RecalcTrigger) {
        let Some(publisher) = &self.inner else {
            tracing::debug!(
                trigger = trigger.as_str(),
                "OptionalEventPublisher: 未配置发布者，跳过触发"
            );
            return;
        };
        let name = trigger.as_str();
        if let Err(e) = publisher.publish(trigger) {
            tracing::error!(trigger = name, error = %e, "重算触发发布失败");
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn codes() -> Vec<String> {
        vec!["MDF18".to_string()]
    }

    #[test]
    fn test_trigger_stage_map() {
        use RecalcStage::*;
        let pid = || "P1".to_string();

        assert_eq!(
            RecalcStage::for_trigger(&RecalcTrigger::CostLinesChanged { project_id: pid() }),
            vec![Financial]
        );
        assert_eq!(
            RecalcStage::for_trigger(&RecalcTrigger::PanelPartsChanged { project_id: pid() }),
            vec![MaterialRequirement, InventoryRisk, OrderRisk]
        );
        assert_eq!(
            RecalcStage::for_trigger(&RecalcTrigger::InventoryChanged {
                material_codes: codes()
            }),
            vec![InventoryRisk]
        );
        assert_eq!(
            RecalcStage::for_trigger(&RecalcTrigger::OrdersChanged {
                material_codes: codes()
            }),
            vec![InventoryRisk, OrderRisk]
        );
        assert_eq!(
            RecalcStage::for_trigger(&RecalcTrigger::SettingsChanged {
                scope: ConfigScope::Global
            }),
            vec![Financial, MaterialRequirement]
        );
        assert_eq!(
            RecalcStage::for_trigger(&RecalcTrigger::ProjectChanged { project_id: pid() }),
            RecalcStage::ALL.to_vec()
        );
        assert_eq!(
            RecalcStage::for_trigger(&RecalcTrigger::Manual { project_id: None }),
            RecalcStage::ALL.to_vec()
        );
    }

    #[test]
    fn test_stage_join() {
        assert_eq!(
            RecalcStage::join(&[RecalcStage::InventoryRisk, RecalcStage::OrderRisk]),
            "inventory_risk,order_risk"
        );
    }

    #[test]
    fn test_trigger_project_id() {
        let t = RecalcTrigger::SettingsChanged {
            scope: ConfigScope::Project {
                project_id: "P9".to_string(),
            },
        };
        assert_eq!(t.project_id(), Some("P9"));
        assert_eq!(
            RecalcTrigger::InventoryChanged {
                material_codes: codes()
            }
            .project_id(),
            None
        );
    }

    struct RecordingPublisher {
        seen: Mutex<Vec<&'static str>>,
    }

    impl RecalcEventPublisher for RecordingPublisher {
        fn publish(&self, trigger: RecalcTrigger) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.seen.lock().unwrap().push(trigger.as_str());
            Err("queue closed".into())
        }
    }

    #[test]
    fn test_optional_publisher_swallows_errors() {
        let recorder = Arc::new(RecordingPublisher {
            seen: Mutex::new(Vec::new()),
        });
        let publisher = OptionalEventPublisher::with_publisher(recorder.clone());
        assert!(publisher.is_configured());

        publisher.publish(RecalcTrigger::Manual { project_id: None });
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["Manual"]);

        let empty = OptionalEventPublisher::default();
        assert!(!empty.is_configured());
        empty.publish(RecalcTrigger::Manual { project_id: None });
    }
}
