// ==========================================
// 橱柜工坊偏差引擎 - 领域类型定义
// ==========================================
// 职责: 偏差类型/严重度/库存流水/订单状态等枚举
// 序列化格式: snake_case (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 偏差类型 (Deviation Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationType {
    CostOverrun,       // 成本超支
    MarginRisk,        // 毛利风险
    InventoryShortage, // 库存短缺
    OrderDelay,        // 未下采购单
}

impl DeviationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviationType::CostOverrun => "cost_overrun",
            DeviationType::MarginRisk => "margin_risk",
            DeviationType::InventoryShortage => "inventory_shortage",
            DeviationType::OrderDelay => "order_delay",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cost_overrun" => Some(DeviationType::CostOverrun),
            "margin_risk" => Some(DeviationType::MarginRisk),
            "inventory_shortage" => Some(DeviationType::InventoryShortage),
            "order_delay" => Some(DeviationType::OrderDelay),
            _ => None,
        }
    }
}

impl fmt::Display for DeviationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 严重度 (Severity)
// ==========================================
// 排序: LOW < MEDIUM < HIGH < CRITICAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 库存流水类型 (Stock Movement Type)
// ==========================================
// quantity 恒为非负，方向由类型决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Allocate,   // 预留
    Deallocate, // 取消预留
    Receive,    // 入库
    Consume,    // 领用
    Return,     // 退回
    Adjust,     // 盘点调整
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Allocate => "allocate",
            MovementType::Deallocate => "deallocate",
            MovementType::Receive => "receive",
            MovementType::Consume => "consume",
            MovementType::Return => "return",
            MovementType::Adjust => "adjust",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allocate" => Some(MovementType::Allocate),
            "deallocate" => Some(MovementType::Deallocate),
            "receive" => Some(MovementType::Receive),
            "consume" => Some(MovementType::Consume),
            "return" => Some(MovementType::Return),
            "adjust" => Some(MovementType::Adjust),
            _ => None,
        }
    }

    /// 对预留量的影响方向: +1 / -1 / 0
    pub fn reservation_sign(&self) -> f64 {
        match self {
            MovementType::Allocate | MovementType::Consume => 1.0,
            MovementType::Deallocate | MovementType::Return => -1.0,
            MovementType::Receive | MovementType::Adjust => 0.0,
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 采购单状态 (Order Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Placed,
    Received,
    Partial,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Placed => "placed",
            OrderStatus::Received => "received",
            OrderStatus::Partial => "partial",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(OrderStatus::Draft),
            "placed" => Some(OrderStatus::Placed),
            "received" => Some(OrderStatus::Received),
            "partial" => Some(OrderStatus::Partial),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// 只有已下单/部分到货的采购单计入在途
    pub fn counts_as_incoming(&self) -> bool {
        matches!(self, OrderStatus::Placed | OrderStatus::Partial)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 成本行类型 (Cost Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    Estimate, // 预估
    Actual,   // 实际
}

impl CostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostKind::Estimate => "estimate",
            CostKind::Actual => "actual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "estimate" => Some(CostKind::Estimate),
            "actual" => Some(CostKind::Actual),
            _ => None,
        }
    }
}

impl fmt::Display for CostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviation_type_round_trip_str() {
        for t in [
            DeviationType::CostOverrun,
            DeviationType::MarginRisk,
            DeviationType::InventoryShortage,
            DeviationType::OrderDelay,
        ] {
            assert_eq!(DeviationType::parse(t.as_str()), Some(t));
        }
        assert_eq!(DeviationType::parse("bogus"), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_reservation_sign() {
        assert_eq!(MovementType::Allocate.reservation_sign(), 1.0);
        assert_eq!(MovementType::Consume.reservation_sign(), 1.0);
        assert_eq!(MovementType::Deallocate.reservation_sign(), -1.0);
        assert_eq!(MovementType::Return.reservation_sign(), -1.0);
        assert_eq!(MovementType::Receive.reservation_sign(), 0.0);
        assert_eq!(MovementType::Adjust.reservation_sign(), 0.0);
    }

    #[test]
    fn test_incoming_status() {
        assert!(OrderStatus::Placed.counts_as_incoming());
        assert!(OrderStatus::Partial.counts_as_incoming());
        assert!(!OrderStatus::Draft.counts_as_incoming());
        assert!(!OrderStatus::Received.counts_as_incoming());
        assert!(!OrderStatus::Cancelled.counts_as_incoming());
    }
}
