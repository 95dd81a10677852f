// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的临时数据库、仓储与测试数据生成
// ==========================================

#![allow(dead_code)]

use cabinet_risk_engine::config::ConfigManager;
use cabinet_risk_engine::db::{ensure_schema, open_sqlite_connection};
use cabinet_risk_engine::domain::{
    CostKind, CostLine, InventoryItem, MovementType, Order, OrderLine, OrderStatus, PanelPart,
    Project, SheetFormat, StockMovement,
};
use cabinet_risk_engine::engine::{LayeredRiskSettingsResolver, RiskOrchestrator, RiskRepositories};
use cabinet_risk_engine::repository::{
    DeviationRepositoryImpl, InventoryRepository, InventoryRepositoryImpl, OrderRepositoryImpl,
    ProjectRepositoryImpl, RecalcLogRepository,
};
use chrono::{Duration, TimeZone, Utc};
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 标准板材 96 x 48
pub const SHEET: SheetFormat = SheetFormat {
    length: 96.0,
    width: 48.0,
};

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("temp path is not utf-8")?
        .to_string();

    let conn = open_sqlite_connection(&db_path)?;
    ensure_schema(&conn)?;

    Ok((temp_file, db_path))
}

// ==========================================
// TestContext - 共享连接上的全部仓储
// ==========================================
pub struct TestContext {
    _temp_file: NamedTempFile,
    pub db_path: String,
    pub conn: Arc<Mutex<Connection>>,
    pub projects: ProjectRepositoryImpl,
    pub inventory: InventoryRepositoryImpl,
    pub orders: OrderRepositoryImpl,
    pub deviations: DeviationRepositoryImpl,
    pub config: Arc<ConfigManager>,
}

impl TestContext {
    pub fn new() -> Self {
        let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
        let conn = Arc::new(Mutex::new(
            open_sqlite_connection(&db_path).expect("Failed to open test db"),
        ));
        Self {
            _temp_file: temp_file,
            db_path,
            projects: ProjectRepositoryImpl::from_connection(conn.clone()),
            inventory: InventoryRepositoryImpl::from_connection(conn.clone()),
            orders: OrderRepositoryImpl::from_connection(conn.clone()),
            deviations: DeviationRepositoryImpl::from_connection(conn.clone()),
            config: Arc::new(
                ConfigManager::from_connection(conn.clone()).expect("Failed to create config"),
            ),
            conn,
        }
    }

    /// 基于 ConfigManager 阈值的编排器
    pub fn orchestrator(&self) -> RiskOrchestrator {
        let resolver = Arc::new(LayeredRiskSettingsResolver::new(self.config.clone()));
        RiskOrchestrator::new(RiskRepositories::from_connection(self.conn.clone()), resolver)
    }

    pub fn log_repo(&self) -> Arc<RecalcLogRepository> {
        Arc::new(RecalcLogRepository::new(self.conn.clone()))
    }

    // ===== 测试数据 =====

    pub fn seed_project(&self, project_id: &str, project_type: &str) {
        self.projects
            .save_project(&Project {
                id: project_id.to_string(),
                project_type: project_type.to_string(),
                markup: None,
            })
            .expect("Failed to save project");
    }

    pub fn add_cost(&self, project_id: &str, kind: CostKind, amount: f64) {
        self.projects
            .insert_cost_line(&CostLine {
                id: uuid::Uuid::new_v4().to_string(),
                project_id: project_id.to_string(),
                kind,
                amount,
            })
            .expect("Failed to insert cost line");
    }

    /// 写入板件并设置标准板材
    pub fn set_parts(&self, project_id: &str, parts: &[(f64, f64, f64, &str)]) {
        let parts: Vec<PanelPart> = parts
            .iter()
            .map(|(length, width, qty, code)| PanelPart {
                length: *length,
                width: *width,
                qty: *qty,
                material_code: Some(code.to_string()),
            })
            .collect();
        self.projects
            .replace_panel_parts(project_id, &parts)
            .expect("Failed to replace panel parts");
        self.projects
            .set_sheet_format(project_id, Some(SHEET))
            .expect("Failed to set sheet format");
    }

    pub fn add_item(&self, item_id: &str, material_code: &str, on_hand: f64) {
        self.inventory
            .save_item(&InventoryItem {
                id: item_id.to_string(),
                material_code: material_code.to_string(),
                on_hand,
                min_threshold: 0.0,
                reorder_point: 0.0,
            })
            .expect("Failed to save inventory item");
    }

    /// 追加流水（seq 决定时间顺序）
    pub fn add_movement(
        &self,
        item_id: &str,
        project_id: Option<&str>,
        movement_type: MovementType,
        quantity: f64,
        seq: i64,
    ) {
        let base = Utc
            .with_ymd_and_hms(2026, 3, 1, 8, 0, 0)
            .single()
            .expect("valid timestamp");
        self.inventory
            .append_movement(&StockMovement {
                id: uuid::Uuid::new_v4().to_string(),
                inventory_item_id: item_id.to_string(),
                project_id: project_id.map(str::to_string),
                order_line_id: None,
                movement_type,
                quantity,
                note: None,
                created_at: base + Duration::minutes(seq),
            })
            .expect("Failed to append movement");
    }

    /// 新增采购单（单行，按物料编码）
    pub fn add_order_line(
        &self,
        order_id: &str,
        line_id: &str,
        status: OrderStatus,
        material_code: &str,
        quantity: f64,
    ) {
        self.orders
            .save_order(&Order {
                id: order_id.to_string(),
                status,
                project_id: None,
            })
            .expect("Failed to save order");
        self.orders
            .save_line(&OrderLine {
                id: line_id.to_string(),
                order_id: order_id.to_string(),
                order_status: status,
                material_code: Some(material_code.to_string()),
                linked_material_code: None,
                inventory_item_id: None,
                quantity,
                received_qty: 0.0,
            })
            .expect("Failed to save order line");
    }
}
