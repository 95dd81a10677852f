// ==========================================
// 橱柜工坊偏差引擎 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合偏差引擎所需的所有 Repository
// 目标: 减少 RiskOrchestrator 的构造函数参数数量
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    DeviationRepository, DeviationRepositoryImpl, InventoryRepository, InventoryRepositoryImpl,
    OrderRepository, OrderRepositoryImpl, ProjectRepository, ProjectRepositoryImpl,
};

/// 偏差引擎仓储集合
///
/// 均为 trait 对象，单元测试可替换任意一个
#[derive(Clone)]
pub struct RiskRepositories {
    pub project_repo: Arc<dyn ProjectRepository>,
    pub inventory_repo: Arc<dyn InventoryRepository>,
    pub order_repo: Arc<dyn OrderRepository>,
    pub deviation_repo: Arc<dyn DeviationRepository>,
}

impl RiskRepositories {
    /// 创建新的仓储集合
    pub fn new(
        project_repo: Arc<dyn ProjectRepository>,
        inventory_repo: Arc<dyn InventoryRepository>,
        order_repo: Arc<dyn OrderRepository>,
        deviation_repo: Arc<dyn DeviationRepository>,
    ) -> Self {
        Self {
            project_repo,
            inventory_repo,
            order_repo,
            deviation_repo,
        }
    }

    /// 基于同一 SQLite 连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            project_repo: Arc::new(ProjectRepositoryImpl::from_connection(conn.clone())),
            inventory_repo: Arc::new(InventoryRepositoryImpl::from_connection(conn.clone())),
            order_repo: Arc::new(OrderRepositoryImpl::from_connection(conn.clone())),
            deviation_repo: Arc::new(DeviationRepositoryImpl::from_connection(conn)),
        }
    }
}
