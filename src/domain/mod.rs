// ==========================================
// 橱柜工坊偏差引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、值对象
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod deviation;
pub mod inventory;
pub mod order;
pub mod project;
pub mod settings;
pub mod types;

// 重导出核心类型
pub use deviation::{Deviation, DeviationDraft, UpsertOutcome};
pub use inventory::{InventoryItem, InventoryStateItem, StockMovement};
pub use order::{Order, OrderLine};
pub use project::{
    CostLine, MaterialRequirement, PanelPart, Project, SheetFormat, DEFAULT_MARKUP,
};
pub use settings::{RiskSettings, RiskSettingsOverride};
pub use types::{CostKind, DeviationType, MovementType, OrderStatus, Severity};
