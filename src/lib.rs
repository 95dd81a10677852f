// ==========================================
// 橱柜工坊偏差引擎 - 核心库
// ==========================================
// 职责: 项目成本/物料/库存/采购数据变更后重算偏差
// 技术栈: Rust + SQLite + tokio
// 输出: deviation 表（看板只读）
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 检测规则与重算编排
pub mod engine;

// 配置层 - 风险阈值与队列配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{CostKind, DeviationType, MovementType, OrderStatus, Severity};

// 领域实体
pub use domain::{
    CostLine, Deviation, InventoryItem, MaterialRequirement, Order, OrderLine, PanelPart,
    Project, RiskSettings, SheetFormat, StockMovement,
};

// 引擎
pub use engine::{
    EngineError, RecalcQueue, RecalcTrigger, ReceivingService, RiskOrchestrator,
    RiskRepositories,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "橱柜工坊偏差引擎";
