// ==========================================
// 橱柜工坊偏差引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod deviation_repo;
pub mod error;
pub mod inventory_repo;
pub mod order_repo;
pub mod project_repo;
pub mod recalc_log_repo;

// 重导出核心仓储
pub use deviation_repo::{DeviationRepository, DeviationRepositoryImpl};
pub use error::{RepositoryError, RepositoryResult};
pub use inventory_repo::{InventoryRepository, InventoryRepositoryImpl, ProjectMovement};
pub use order_repo::{OrderRepository, OrderRepositoryImpl};
pub use project_repo::{ProjectRepository, ProjectRepositoryImpl};
pub use recalc_log_repo::{RecalcLogCounts, RecalcLogEntity, RecalcLogRepository};
