// ==========================================
// 橱柜工坊偏差引擎 - 采购单领域模型
// ==========================================

use crate::domain::types::OrderStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    pub project_id: Option<String>,
}

// ==========================================
// OrderLine - 采购单行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    pub order_status: OrderStatus,
    /// 行上冗余的物料编码
    pub material_code: Option<String>,
    /// 关联库存物料的编码 (存在时以此为准)
    pub linked_material_code: Option<String>,
    pub inventory_item_id: Option<String>,
    pub quantity: f64,
    pub received_qty: f64,
}

impl OrderLine {
    /// 解析后的物料编码: 关联库存物料优先，其次行上编码
    pub fn resolved_material_code(&self) -> Option<&str> {
        self.linked_material_code
            .as_deref()
            .or(self.material_code.as_deref())
            .filter(|code| !code.is_empty())
    }

    /// 未到货数量 (不为负)
    pub fn outstanding_qty(&self) -> f64 {
        (self.quantity - self.received_qty).max(0.0)
    }
}
