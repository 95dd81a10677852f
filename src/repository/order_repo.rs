// ==========================================
// 橱柜工坊偏差引擎 - 采购单数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 物料编码解析: 关联库存物料编码优先 (LEFT JOIN inventory_item)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::order::{Order, OrderLine};
use crate::domain::types::OrderStatus;
use crate::repository::error::{parse_column, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// OrderRepository Trait
// ==========================================
pub trait OrderRepository: Send + Sync {
    /// 查询计入在途的采购单行 (placed / partial)
    fn list_open_lines(&self) -> RepositoryResult<Vec<OrderLine>>;

    /// 是否存在任意采购单行引用该物料编码
    ///
    /// 说明: 全局检查，不区分项目与订单状态
    fn any_line_references_material(&self, material_code: &str) -> RepositoryResult<bool>;

    /// 按ID查询采购单行
    fn find_line(&self, line_id: &str) -> RepositoryResult<Option<OrderLine>>;
}

// ==========================================
// OrderRepositoryImpl
// ==========================================
pub struct OrderRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

const LINE_SELECT: &str = r#"
    SELECT ol.order_line_id, ol.order_id, po.status, ol.material_code,
           ii.material_code, ol.inventory_item_id, ol.quantity, ol.received_qty
    FROM order_line ol
    JOIN purchase_order po ON po.order_id = ol.order_id
    LEFT JOIN inventory_item ii ON ii.inventory_item_id = ol.inventory_item_id
"#;

impl OrderRepositoryImpl {
    /// 创建新的 OrderRepositoryImpl 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或更新采购单头
    pub fn save_order(&self, order: &Order) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO purchase_order (order_id, status, project_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(order_id) DO UPDATE SET status = ?2, project_id = ?3
            "#,
            params![order.id, order.status.as_str(), order.project_id],
        )?;
        Ok(())
    }

    /// 新增或更新采购单行
    ///
    /// 说明: order_status / linked_material_code 为读模型字段，不落库
    pub fn save_line(&self, line: &OrderLine) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO order_line (order_line_id, order_id, material_code, inventory_item_id, quantity, received_qty)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(order_line_id) DO UPDATE SET
                order_id = ?2, material_code = ?3, inventory_item_id = ?4,
                quantity = ?5, received_qty = ?6
            "#,
            params![
                line.id,
                line.order_id,
                line.material_code,
                line.inventory_item_id,
                line.quantity,
                line.received_qty,
            ],
        )?;
        Ok(())
    }

    fn query_lines(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> RepositoryResult<Vec<OrderLine>> {
        let raw = {
            let conn = self.get_conn()?;
            let sql = format!("{} {} ORDER BY ol.order_line_id ASC", LINE_SELECT, where_clause);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params, |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, f64>(7)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        raw.into_iter()
            .map(
                |(id, order_id, status, material_code, linked, item_id, quantity, received_qty)| {
                    Ok(OrderLine {
                        id,
                        order_id,
                        order_status: parse_column(
                            "purchase_order.status",
                            &status,
                            OrderStatus::parse,
                        )?,
                        material_code,
                        linked_material_code: linked,
                        inventory_item_id: item_id,
                        quantity,
                        received_qty,
                    })
                },
            )
            .collect()
    }
}

impl OrderRepository for OrderRepositoryImpl {
    fn list_open_lines(&self) -> RepositoryResult<Vec<OrderLine>> {
        self.query_lines(
            "WHERE po.status IN (?1, ?2)",
            &[&OrderStatus::Placed.as_str(), &OrderStatus::Partial.as_str()],
        )
    }

    fn any_line_references_material(&self, material_code: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                r#"
                SELECT 1
                FROM order_line ol
                LEFT JOIN inventory_item ii ON ii.inventory_item_id = ol.inventory_item_id
                WHERE ol.material_code = ?1 OR ii.material_code = ?1
                LIMIT 1
                "#,
                params![material_code],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(found)
    }

    fn find_line(&self, line_id: &str) -> RepositoryResult<Option<OrderLine>> {
        let mut lines = self.query_lines("WHERE ol.order_line_id = ?1", &[&line_id])?;
        Ok(lines.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn setup_repo() -> OrderRepositoryImpl {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO inventory_item (inventory_item_id, material_code) VALUES ('I1', 'MDF18')",
            [],
        )
        .unwrap();
        OrderRepositoryImpl::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn line(id: &str, order_id: &str, code: Option<&str>, item: Option<&str>) -> OrderLine {
        OrderLine {
            id: id.to_string(),
            order_id: order_id.to_string(),
            order_status: OrderStatus::Draft,
            material_code: code.map(str::to_string),
            linked_material_code: None,
            inventory_item_id: item.map(str::to_string),
            quantity: 10.0,
            received_qty: 0.0,
        }
    }

    fn order(id: &str, status: OrderStatus) -> Order {
        Order {
            id: id.to_string(),
            status,
            project_id: None,
        }
    }

    #[test]
    fn test_open_lines_only_placed_or_partial() {
        let repo = setup_repo();
        repo.save_order(&order("O1", OrderStatus::Placed)).unwrap();
        repo.save_order(&order("O2", OrderStatus::Draft)).unwrap();
        repo.save_order(&order("O3", OrderStatus::Partial)).unwrap();
        repo.save_line(&line("L1", "O1", Some("PLY12"), None)).unwrap();
        repo.save_line(&line("L2", "O2", Some("PLY12"), None)).unwrap();
        repo.save_line(&line("L3", "O3", Some("PLY12"), None)).unwrap();

        let ids: Vec<String> = repo.list_open_lines().unwrap().into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["L1".to_string(), "L3".to_string()]);
    }

    #[test]
    fn test_linked_material_code_is_loaded() {
        let repo = setup_repo();
        repo.save_order(&order("O1", OrderStatus::Placed)).unwrap();
        repo.save_line(&line("L1", "O1", Some("OLD"), Some("I1"))).unwrap();

        let l = repo.find_line("L1").unwrap().unwrap();
        assert_eq!(l.linked_material_code.as_deref(), Some("MDF18"));
        assert_eq!(l.resolved_material_code(), Some("MDF18"));
        assert_eq!(l.order_status, OrderStatus::Placed);
    }

    #[test]
    fn test_any_line_references_material_any_status() {
        let repo = setup_repo();
        repo.save_order(&order("O1", OrderStatus::Cancelled)).unwrap();
        repo.save_line(&line("L1", "O1", None, Some("I1"))).unwrap();

        assert!(repo.any_line_references_material("MDF18").unwrap());
        assert!(!repo.any_line_references_material("PLY12").unwrap());
    }
}
