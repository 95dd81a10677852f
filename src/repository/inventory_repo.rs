// ==========================================
// 橱柜工坊偏差引擎 - 库存数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: stock_movement 只追加，不更新不删除
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::inventory::{InventoryItem, StockMovement};
use crate::domain::types::MovementType;
use crate::repository::error::{parse_column, parse_timestamp, RepositoryError, RepositoryResult};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 带物料编码的项目流水
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectMovement {
    pub material_code: String,
    pub movement: StockMovement,
}

// ==========================================
// InventoryRepository Trait
// ==========================================
// 实现者: InventoryRepositoryImpl（使用 rusqlite）
pub trait InventoryRepository: Send + Sync {
    /// 查询库存物料
    ///
    /// # 参数
    /// - material_codes: None 表示全部
    fn list_items(&self, material_codes: Option<&[String]>) -> RepositoryResult<Vec<InventoryItem>>;

    /// 按ID查询库存物料
    fn find_item(&self, item_id: &str) -> RepositoryResult<Option<InventoryItem>>;

    /// 查询指定物料的全部流水（按时间顺序）
    fn list_movements(&self, item_ids: &[String]) -> RepositoryResult<Vec<StockMovement>>;

    /// 查询归属于项目的全部流水（附物料编码）
    fn list_project_movements(&self, project_id: &str) -> RepositoryResult<Vec<ProjectMovement>>;

    /// 追加流水
    fn append_movement(&self, movement: &StockMovement) -> RepositoryResult<()>;

    /// 采购收货: 追加 receive 流水 + 现存量增加 + 采购单行已收数量增加
    ///
    /// 三项写入在同一事务内，任一失败全部回滚
    ///
    /// # 参数
    /// - movement: receive 流水（inventory_item_id / quantity 即入库物料与数量）
    /// - order_line_id: 收货的采购单行
    fn record_receipt(&self, movement: &StockMovement, order_line_id: &str) -> RepositoryResult<()>;
}

// ==========================================
// InventoryRepositoryImpl
// ==========================================
pub struct InventoryRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl InventoryRepositoryImpl {
    /// 创建新的 InventoryRepositoryImpl 实例
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

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或更新库存物料（供上游 CRUD 与测试数据准备使用）
    pub fn save_item(&self, item: &InventoryItem) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO inventory_item (inventory_item_id, material_code, on_hand, min_threshold, reorder_point)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(inventory_item_id) DO UPDATE SET
                material_code = ?2, on_hand = ?3, min_threshold = ?4, reorder_point = ?5
            "#,
            params![
                item.id,
                item.material_code,
                item.on_hand,
                item.min_threshold,
                item.reorder_point,
            ],
        )?;
        Ok(())
    }

    fn map_item(row: &rusqlite::Row) -> rusqlite::Result<InventoryItem> {
        Ok(InventoryItem {
            id: row.get(0)?,
            material_code: row.get(1)?,
            on_hand: row.get(2)?,
            min_threshold: row.get(3)?,
            reorder_point: row.get(4)?,
        })
    }

    /// 原始行 → StockMovement
    fn build_movement(raw: RawMovement) -> RepositoryResult<StockMovement> {
        Ok(StockMovement {
            id: raw.id,
            inventory_item_id: raw.inventory_item_id,
            project_id: raw.project_id,
            order_line_id: raw.order_line_id,
            movement_type: parse_column(
                "stock_movement.movement_type",
                &raw.movement_type,
                MovementType::parse,
            )?,
            quantity: raw.quantity,
            note: raw.note,
            created_at: parse_timestamp("stock_movement.created_at", &raw.created_at)?,
        })
    }
}

struct RawMovement {
    id: String,
    inventory_item_id: String,
    project_id: Option<String>,
    order_line_id: Option<String>,
    movement_type: String,
    quantity: f64,
    note: Option<String>,
    created_at: String,
}

fn map_raw_movement(row: &rusqlite::Row) -> rusqlite::Result<RawMovement> {
    Ok(RawMovement {
        id: row.get(0)?,
        inventory_item_id: row.get(1)?,
        project_id: row.get(2)?,
        order_line_id: row.get(3)?,
        movement_type: row.get(4)?,
        quantity: row.get(5)?,
        note: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const MOVEMENT_COLUMNS: &str = "sm.movement_id, sm.inventory_item_id, sm.project_id, sm.order_line_id, \
     sm.movement_type, sm.quantity, sm.note, sm.created_at";

impl InventoryRepository for InventoryRepositoryImpl {
    fn list_items(&self, material_codes: Option<&[String]>) -> RepositoryResult<Vec<InventoryItem>> {
        let conn = self.get_conn()?;
        let base = "SELECT inventory_item_id, material_code, on_hand, min_threshold, reorder_point FROM inventory_item";

        let items = match material_codes {
            None => {
                let mut stmt = conn.prepare(&format!("{} ORDER BY material_code ASC", base))?;
                let rows = stmt
                    .query_map([], Self::map_item)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            Some([]) => Vec::new(),
            Some(codes) => {
                let placeholders = (0..codes.len())
                    .map(|i| format!("?{}", i + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "{} WHERE material_code IN ({}) ORDER BY material_code ASC",
                    base, placeholders
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(codes.iter()), Self::map_item)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(items)
    }

    fn find_item(&self, item_id: &str) -> RepositoryResult<Option<InventoryItem>> {
        let conn = self.get_conn()?;
        let item = conn
            .query_row(
                "SELECT inventory_item_id, material_code, on_hand, min_threshold, reorder_point FROM inventory_item WHERE inventory_item_id = ?1",
                params![item_id],
                Self::map_item,
            )
            .optional()?;
        Ok(item)
    }

    fn list_movements(&self, item_ids: &[String]) -> RepositoryResult<Vec<StockMovement>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw = {
            let conn = self.get_conn()?;
            let placeholders = (0..item_ids.len())
                .map(|i| format!("?{}", i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {} FROM stock_movement sm WHERE sm.inventory_item_id IN ({}) ORDER BY sm.created_at ASC, sm.movement_id ASC",
                MOVEMENT_COLUMNS, placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(item_ids.iter()), map_raw_movement)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        raw.into_iter().map(Self::build_movement).collect()
    }

    fn list_project_movements(&self, project_id: &str) -> RepositoryResult<Vec<ProjectMovement>> {
        let raw = {
            let conn = self.get_conn()?;
            let sql = format!(
                r#"
                SELECT {}, ii.material_code
                FROM stock_movement sm
                JOIN inventory_item ii ON ii.inventory_item_id = sm.inventory_item_id
                WHERE sm.project_id = ?1
                ORDER BY sm.created_at ASC, sm.movement_id ASC
                "#,
                MOVEMENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![project_id], |row| {
                    Ok((map_raw_movement(row)?, row.get::<_, String>(8)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        raw.into_iter()
            .map(|(raw, material_code)| {
                Ok(ProjectMovement {
                    material_code,
                    movement: Self::build_movement(raw)?,
                })
            })
            .collect()
    }

    fn append_movement(&self, movement: &StockMovement) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        insert_movement(&conn, movement)
    }

    fn record_receipt(&self, movement: &StockMovement, order_line_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        insert_movement(&tx, movement)?;

        let n = tx.execute(
            "UPDATE inventory_item SET on_hand = on_hand + ?1 WHERE inventory_item_id = ?2",
            params![movement.quantity, movement.inventory_item_id],
        )?;
        if n == 0 {
            return Err(RepositoryError::NotFound {
                entity: "InventoryItem".to_string(),
                id: movement.inventory_item_id.clone(),
            });
        }

        let n = tx.execute(
            "UPDATE order_line SET received_qty = received_qty + ?1 WHERE order_line_id = ?2",
            params![movement.quantity, order_line_id],
        )?;
        if n == 0 {
            return Err(RepositoryError::NotFound {
                entity: "OrderLine".to_string(),
                id: order_line_id.to_string(),
            });
        }

        tx.commit()?;
        Ok(())
    }
}

fn insert_movement(conn: &Connection, movement: &StockMovement) -> RepositoryResult<()> {
    if movement.quantity < 0.0 {
        return Err(RepositoryError::FieldValueError {
            field: "stock_movement.quantity".to_string(),
            message: format!("数量不能为负: {}", movement.quantity),
        });
    }
    conn.execute(
        r#"
        INSERT INTO stock_movement (
            movement_id, inventory_item_id, project_id, order_line_id,
            movement_type, quantity, note, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            movement.id,
            movement.inventory_item_id,
            movement.project_id,
            movement.order_line_id,
            movement.movement_type.as_str(),
            movement.quantity,
            movement.note,
            movement.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}
