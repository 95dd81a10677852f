// ==========================================
// 橱柜工坊偏差引擎 - 项目领域模型
// ==========================================
// 职责: 引擎读取的项目视图 (成本行/板件/板材规格/物料需求)
// ==========================================

use crate::domain::types::CostKind;
use serde::{Deserialize, Serialize};

/// 项目未配置加价倍率时的默认值
pub const DEFAULT_MARKUP: f64 = 2.5;

// ==========================================
// Project - 项目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    /// 逗号拼接的类型串，例如 "kitchen,vanity"
    pub project_type: String,
    pub markup: Option<f64>,
}

impl Project {
    pub fn effective_markup(&self) -> f64 {
        self.markup.unwrap_or(DEFAULT_MARKUP)
    }
}

// ==========================================
// CostLine - 成本行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub id: String,
    pub project_id: String,
    pub kind: CostKind,
    pub amount: f64,
}

// ==========================================
// PanelPart - 板件 (来自下料清单)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelPart {
    pub length: f64,
    pub width: f64,
    pub qty: f64,
    /// 无编码的板件不计入物料需求
    pub material_code: Option<String>,
}

// ==========================================
// SheetFormat - 板材规格
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SheetFormat {
    pub length: f64,
    pub width: f64,
}

impl SheetFormat {
    /// 单张面积；尺寸非正时返回 None
    pub fn area(&self) -> Option<f64> {
        if self.length > 0.0 && self.width > 0.0 {
            Some(self.length * self.width)
        } else {
            None
        }
    }
}

// ==========================================
// MaterialRequirement - 物料需求快照
// ==========================================
// 唯一键: (project_id, material_code)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub project_id: String,
    pub material_code: String,
    pub required_qty: f64,
    pub allocated_qty: f64,
}

impl MaterialRequirement {
    /// 未满足的需求量 (<=0 表示已满足)
    pub fn unmet_qty(&self) -> f64 {
        self.required_qty - self.allocated_qty
    }
}
