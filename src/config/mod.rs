// ==========================================
// 橱柜工坊偏差引擎 - 配置层
// ==========================================
// 职责: 风险阈值与重算队列配置，支持多级覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod legacy_migration;
pub mod risk_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, ConfigScope, RecalcConfig};
pub use legacy_migration::migrate_legacy_global_settings;
pub use risk_config_trait::{ConfigResult, RiskConfigReader};
