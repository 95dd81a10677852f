// ==========================================
// 橱柜工坊偏差引擎 - 引擎层
// ==========================================
// 职责: 偏差检测规则与重算编排，不拼 SQL
// 红线: 检测器幂等，只通过 DeviationStore 写偏差
// ==========================================

pub mod deviation_store;
pub mod error;
pub mod events;
pub mod financial_risk;
pub mod inventory_risk;
pub mod inventory_state;
pub mod material_requirement;
pub mod orchestrator;
pub mod order_risk;
pub mod recalc_queue;
pub mod receiving;
pub mod repositories;
pub mod settings_resolver;

// 重导出核心引擎
pub use deviation_store::DeviationStore;
pub use error::{EngineError, EngineResult};
pub use events::{
    NoOpEventPublisher, OptionalEventPublisher, RecalcEventPublisher, RecalcStage, RecalcTrigger,
};
pub use financial_risk::{assess_margin, FinancialRiskDetector, MarginAssessment};
pub use inventory_risk::{assess_shortage, InventoryRiskDetector};
pub use inventory_state::InventoryStateComputer;
pub use material_requirement::{
    MaterialRequirementCalculator, MaterialRequirementRecalculator, RequirementRecalcSummary,
};
pub use orchestrator::{ProjectRecalcReport, RecalcReport, RiskOrchestrator};
pub use order_risk::OrderRiskDetector;
pub use recalc_queue::{QueueStats, RecalcJob, RecalcQueue};
pub use receiving::ReceivingService;
pub use repositories::RiskRepositories;
pub use settings_resolver::{LayeredRiskSettingsResolver, RiskSettingsResolver};
