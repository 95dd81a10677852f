// ==========================================
// 橱柜工坊偏差引擎 - 库存状态计算
// ==========================================
// 职责: 由现存量 + 流水回放 + 在途采购单推导每个物料的
//       reserved / available / incoming
// 红线: 只读，不写库；结果是快照，不是缓存
// 红线: reserved / available 从不落库
// ==========================================

use crate::domain::inventory::{InventoryStateItem, StockMovement};
use crate::domain::order::OrderLine;
use crate::engine::error::EngineResult;
use crate::repository::{InventoryRepository, OrderRepository};
use std::collections::HashMap;
use std::sync::Arc;

pub struct InventoryStateComputer {
    inventory_repo: Arc<dyn InventoryRepository>,
    order_repo: Arc<dyn OrderRepository>,
}

impl InventoryStateComputer {
    pub fn new(
        inventory_repo: Arc<dyn InventoryRepository>,
        order_repo: Arc<dyn OrderRepository>,
    ) -> Self {
        Self {
            inventory_repo,
            order_repo,
        }
    }

    /// 计算库存状态
    ///
    /// # 参数
    /// - material_codes: None 表示全部库存物料
    ///
    /// # 返回
    /// 仅包含库存物料表中存在的物料；调用方对缺失物料按零库存处理
    pub fn compute(
        &self,
        material_codes: Option<&[String]>,
    ) -> EngineResult<Vec<InventoryStateItem>> {
        let items = self.inventory_repo.list_items(material_codes)?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let item_ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        let movements = self.inventory_repo.list_movements(&item_ids)?;
        let mut ledger: HashMap<&str, Vec<&StockMovement>> = HashMap::new();
        for m in &movements {
            ledger.entry(m.inventory_item_id.as_str()).or_default().push(m);
        }

        let incoming = incoming_by_material(&self.order_repo.list_open_lines()?);

        let states = items
            .into_iter()
            .map(|item| {
                let reserved_qty = replay_reserved(
                    ledger
                        .get(item.id.as_str())
                        .map(|v| v.as_slice())
                        .unwrap_or(&[])
                        .iter()
                        .copied(),
                );
                let available_qty = (item.on_hand - reserved_qty).max(0.0);
                let incoming_qty = incoming.get(&item.material_code).copied().unwrap_or(0.0);
                InventoryStateItem {
                    inventory_item_id: item.id,
                    material_code: item.material_code,
                    on_hand: item.on_hand,
                    reserved_qty,
                    available_qty,
                    incoming_qty,
                }
            })
            .collect();
        Ok(states)
    }
}

/// 回放流水得到预留量
///
/// allocate/consume 增加，deallocate/return 减少，receive/adjust 不影响；
/// 只在最后截断为非负，中间过程允许为负
pub fn replay_reserved<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> f64 {
    let raw: f64 = movements
        .into_iter()
        .map(|m| m.movement_type.reservation_sign() * m.quantity)
        .sum();
    raw.max(0.0)
}

/// 按解析后物料编码汇总在途数量
///
/// 只统计 placed / partial 采购单，已收满的行不计入
pub fn incoming_by_material(lines: &[OrderLine]) -> HashMap<String, f64> {
    let mut incoming: HashMap<String, f64> = HashMap::new();
    for line in lines.iter().filter(|l| l.order_status.counts_as_incoming()) {
        let Some(code) = line.resolved_material_code() else {
            continue;
        };
        let outstanding = line.outstanding_qty();
        if outstanding > 0.0 {
            *incoming.entry(code.to_string()).or_insert(0.0) += outstanding;
        }
    }
    incoming
}
