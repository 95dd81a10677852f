// ==========================================
// 橱柜工坊偏差引擎 - 采购收货
// ==========================================
// 收货 = 追加 receive 流水 + 现存量增加 + 采购单行已收数量增加（同一事务）
// 采购单行须指向同一库存物料或同一物料编码
// 完成后发布库存/采购两个触发器（不等待重算）
// ==========================================

use crate::domain::inventory::StockMovement;
use crate::domain::types::MovementType;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{OptionalEventPublisher, RecalcTrigger};
use crate::repository::{InventoryRepository, OrderRepository};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct ReceivingService {
    inventory_repo: Arc<dyn InventoryRepository>,
    order_repo: Arc<dyn OrderRepository>,
    publisher: OptionalEventPublisher,
}

impl ReceivingService {
    pub fn new(
        inventory_repo: Arc<dyn InventoryRepository>,
        order_repo: Arc<dyn OrderRepository>,
        publisher: OptionalEventPublisher,
    ) -> Self {
        Self {
            inventory_repo,
            order_repo,
            publisher,
        }
    }

    /// 采购单行收货
    ///
    /// # 参数
    /// - line_id: 采购单行ID
    /// - item_id: 入库的库存物料ID
    /// - qty: 收货数量（必须 > 0）
    ///
    /// # 返回
    /// - 新增流水ID
    pub fn receive_order_line(&self, line_id: &str, item_id: &str, qty: f64) -> EngineResult<String> {
        if !(qty > 0.0) {
            return Err(EngineError::InvalidInput {
                field: "qty".to_string(),
                message: format!("收货数量必须大于 0: {}", qty),
            });
        }

        let line = self
            .order_repo
            .find_line(line_id)?
            .ok_or_else(|| EngineError::NotFound {
                entity: "OrderLine".to_string(),
                id: line_id.to_string(),
            })?;
        let item = self
            .inventory_repo
            .find_item(item_id)?
            .ok_or_else(|| EngineError::NotFound {
                entity: "InventoryItem".to_string(),
                id: item_id.to_string(),
            })?;

        // 采购单行已关联其他库存物料（或编码不一致）时拒绝入库
        let mismatched = match line.inventory_item_id.as_deref() {
            Some(linked) => linked != item.id,
            None => line
                .resolved_material_code()
                .is_some_and(|code| code != item.material_code),
        };
        if mismatched {
            return Err(EngineError::InvalidInput {
                field: "item_id".to_string(),
                message: format!(
                    "采购单行 {} 与库存物料 {} ({}) 不匹配",
                    line.id, item.id, item.material_code
                ),
            });
        }

        let movement = StockMovement {
            id: Uuid::new_v4().to_string(),
            inventory_item_id: item.id.clone(),
            project_id: None,
            order_line_id: Some(line.id.clone()),
            movement_type: MovementType::Receive,
            quantity: qty,
            note: None,
            created_at: Utc::now(),
        };
        self.inventory_repo.record_receipt(&movement, &line.id)?;

        info!(
            line_id,
            item_id,
            material_code = %item.material_code,
            qty,
            "采购收货完成"
        );

        let codes = vec![item.material_code.clone()];
        self.publisher.publish(RecalcTrigger::InventoryChanged {
            material_codes: codes.clone(),
        });
        self.publisher.publish(RecalcTrigger::OrdersChanged {
            material_codes: codes,
        });

        Ok(movement.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;
    use crate::domain::inventory::InventoryItem;
    use crate::domain::order::{Order, OrderLine};
    use crate::domain::types::OrderStatus;
    use crate::engine::events::RecalcEventPublisher;
    use crate::repository::error::RepositoryResult;
    use crate::repository::{InventoryRepositoryImpl, OrderRepositoryImpl};
    use rusqlite::Connection;
    use std::error::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        triggers: Mutex<Vec<RecalcTrigger>>,
    }

    impl RecalcEventPublisher for Recorder {
        fn publish(&self, trigger: RecalcTrigger) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.triggers.lock().unwrap().push(trigger);
            Ok("job".to_string())
        }
    }

    fn setup() -> (
        ReceivingService,
        Arc<InventoryRepositoryImpl>,
        Arc<OrderRepositoryImpl>,
        Arc<Recorder>,
    ) {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let inventory = Arc::new(InventoryRepositoryImpl::from_connection(conn.clone()));
        let orders = Arc::new(OrderRepositoryImpl::from_connection(conn));

        for (id, code) in [("I1", "MDF18"), ("I2", "PLY12")] {
            inventory
                .save_item(&InventoryItem {
                    id: id.to_string(),
                    material_code: code.to_string(),
                    on_hand: 4.0,
                    min_threshold: 0.0,
                    reorder_point: 0.0,
                })
                .unwrap();
        }
        orders
            .save_order(&Order {
                id: "O1".to_string(),
                status: OrderStatus::Placed,
                project_id: None,
            })
            .unwrap();
        orders
            .save_line(&OrderLine {
                id: "L1".to_string(),
                order_id: "O1".to_string(),
                order_status: OrderStatus::Placed,
                material_code: None,
                linked_material_code: None,
                inventory_item_id: Some("I1".to_string()),
                quantity: 10.0,
                received_qty: 0.0,
            })
            .unwrap();
        // 未关联库存物料，只有编码
        orders
            .save_line(&OrderLine {
                id: "L2".to_string(),
                order_id: "O1".to_string(),
                order_status: OrderStatus::Placed,
                material_code: Some("PLY12".to_string()),
                linked_material_code: None,
                inventory_item_id: None,
                quantity: 5.0,
                received_qty: 0.0,
            })
            .unwrap();

        let recorder = Arc::new(Recorder::default());
        let service = ReceivingService::new(
            inventory.clone(),
            orders.clone(),
            OptionalEventPublisher::with_publisher(recorder.clone()),
        );
        (service, inventory, orders, recorder)
    }

    #[test]
    fn test_receive_updates_stock_and_line() {
        let (service, inventory, orders, recorder) = setup();

        let movement_id = service.receive_order_line("L1", "I1", 6.0).unwrap();
        assert!(!movement_id.is_empty());

        assert_eq!(inventory.find_item("I1").unwrap().unwrap().on_hand, 10.0);
        assert_eq!(orders.find_line("L1").unwrap().unwrap().received_qty, 6.0);

        let movements = inventory.list_movements(&["I1".to_string()]).unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::Receive);
        assert_eq!(movements[0].order_line_id.as_deref(), Some("L1"));

        let codes = vec!["MDF18".to_string()];
        assert_eq!(
            *recorder.triggers.lock().unwrap(),
            vec![
                RecalcTrigger::InventoryChanged {
                    material_codes: codes.clone()
                },
                RecalcTrigger::OrdersChanged {
                    material_codes: codes
                },
            ]
        );
    }

    #[test]
    fn test_receive_rejects_non_positive_qty() {
        let (service, inventory, _, recorder) = setup();
        let err = service.receive_order_line("L1", "I1", 0.0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
        assert_eq!(inventory.find_item("I1").unwrap().unwrap().on_hand, 4.0);
        assert!(recorder.triggers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_receive_unknown_line() {
        let (service, _, _, _) = setup();
        let err = service.receive_order_line("nope", "I1", 1.0).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_receive_into_other_item_rejected() {
        let (service, inventory, orders, recorder) = setup();

        // L1 关联 I1 (MDF18)
        let err = service.receive_order_line("L1", "I2", 3.0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
        // L2 只有编码 PLY12
        let err = service.receive_order_line("L2", "I1", 3.0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));

        assert_eq!(inventory.find_item("I1").unwrap().unwrap().on_hand, 4.0);
        assert_eq!(inventory.find_item("I2").unwrap().unwrap().on_hand, 4.0);
        assert_eq!(orders.find_line("L1").unwrap().unwrap().received_qty, 0.0);
        assert!(recorder.triggers.lock().unwrap().is_empty());

        // 编码一致即可入库
        service.receive_order_line("L2", "I2", 3.0).unwrap();
        assert_eq!(orders.find_line("L2").unwrap().unwrap().received_qty, 3.0);
    }

    /// 返回数据库中不存在的采购单行，收货的单行更新必然失败
    struct StaleLineOrders;

    impl OrderRepository for StaleLineOrders {
        fn list_open_lines(&self) -> RepositoryResult<Vec<OrderLine>> {
            Ok(Vec::new())
        }

        fn any_line_references_material(&self, _material_code: &str) -> RepositoryResult<bool> {
            Ok(false)
        }

        fn find_line(&self, line_id: &str) -> RepositoryResult<Option<OrderLine>> {
            Ok(Some(OrderLine {
                id: line_id.to_string(),
                order_id: "O-gone".to_string(),
                order_status: OrderStatus::Placed,
                material_code: Some("MDF18".to_string()),
                linked_material_code: None,
                inventory_item_id: None,
                quantity: 10.0,
                received_qty: 0.0,
            }))
        }
    }

    #[test]
    fn test_failed_line_update_leaves_stock_untouched() {
        let (_, inventory, _, recorder) = setup();
        let service = ReceivingService::new(
            inventory.clone(),
            Arc::new(StaleLineOrders),
            OptionalEventPublisher::with_publisher(recorder.clone()),
        );

        let result = service.receive_order_line("L-gone", "I1", 6.0);
        assert!(result.is_err());

        // 流水与现存量随单行更新一并回滚
        assert_eq!(inventory.find_item("I1").unwrap().unwrap().on_hand, 4.0);
        assert!(inventory.list_movements(&["I1".to_string()]).unwrap().is_empty());
        assert!(recorder.triggers.lock().unwrap().is_empty());
    }
}
