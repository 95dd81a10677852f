// ==========================================
// 橱柜工坊偏差引擎 - 库存领域模型
// ==========================================
// 红线: 预留量/可用量永不落库，只由流水重放得出
// ==========================================

use crate::domain::types::MovementType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// InventoryItem - 库存物料
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub material_code: String, // 自然键
    pub on_hand: f64,          // 现存量 (仅 receive/adjust 增加)
    pub min_threshold: f64,
    pub reorder_point: f64,
}

// ==========================================
// StockMovement - 库存流水 (只追加)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: String,
    pub inventory_item_id: String,
    pub project_id: Option<String>,
    pub order_line_id: Option<String>,
    pub movement_type: MovementType,
    pub quantity: f64, // 非负
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// InventoryStateItem - 库存状态快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryStateItem {
    pub inventory_item_id: String,
    pub material_code: String,
    pub on_hand: f64,
    pub reserved_qty: f64,
    pub available_qty: f64,
    pub incoming_qty: f64,
}

impl InventoryStateItem {
    /// 可覆盖需求的库存 = 可用 + 在途
    pub fn available_stock(&self) -> f64 {
        self.available_qty + self.incoming_qty
    }
}
