// ==========================================
// 橱柜工坊偏差引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 集中维护引擎所需表结构
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表（幂等）
///
/// 说明：
/// - deviation 表上的部分唯一索引保证同一去重键最多一条未解决记录
/// - material_requirement 随项目删除级联清理
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS project (
            project_id TEXT PRIMARY KEY,
            project_type TEXT NOT NULL DEFAULT '',
            markup REAL
        );

        CREATE TABLE IF NOT EXISTS cost_line (
            cost_line_id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES project(project_id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0.0
        );

        CREATE TABLE IF NOT EXISTS panel_part (
            part_id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES project(project_id) ON DELETE CASCADE,
            length REAL NOT NULL,
            width REAL NOT NULL,
            qty REAL NOT NULL DEFAULT 1.0,
            material_code TEXT
        );

        CREATE TABLE IF NOT EXISTS project_sheet_format (
            project_id TEXT PRIMARY KEY REFERENCES project(project_id) ON DELETE CASCADE,
            length REAL NOT NULL,
            width REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS material_requirement (
            project_id TEXT NOT NULL REFERENCES project(project_id) ON DELETE CASCADE,
            material_code TEXT NOT NULL,
            required_qty REAL NOT NULL DEFAULT 0.0,
            allocated_qty REAL NOT NULL DEFAULT 0.0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (project_id, material_code)
        );

        CREATE INDEX IF NOT EXISTS idx_material_requirement_code
          ON material_requirement(material_code);

        CREATE TABLE IF NOT EXISTS inventory_item (
            inventory_item_id TEXT PRIMARY KEY,
            material_code TEXT NOT NULL UNIQUE,
            on_hand REAL NOT NULL DEFAULT 0.0,
            min_threshold REAL NOT NULL DEFAULT 0.0,
            reorder_point REAL NOT NULL DEFAULT 0.0
        );

        CREATE TABLE IF NOT EXISTS stock_movement (
            movement_id TEXT PRIMARY KEY,
            inventory_item_id TEXT NOT NULL REFERENCES inventory_item(inventory_item_id),
            project_id TEXT,
            order_line_id TEXT,
            movement_type TEXT NOT NULL,
            quantity REAL NOT NULL CHECK (quantity >= 0),
            note TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_stock_movement_item
          ON stock_movement(inventory_item_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_stock_movement_project
          ON stock_movement(project_id, movement_type);

        CREATE TABLE IF NOT EXISTS purchase_order (
            order_id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'draft',
            project_id TEXT
        );

        CREATE TABLE IF NOT EXISTS order_line (
            order_line_id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES purchase_order(order_id) ON DELETE CASCADE,
            material_code TEXT,
            inventory_item_id TEXT REFERENCES inventory_item(inventory_item_id),
            quantity REAL NOT NULL DEFAULT 0.0,
            received_qty REAL NOT NULL DEFAULT 0.0
        );

        CREATE TABLE IF NOT EXISTS deviation (
            deviation_id TEXT PRIMARY KEY,
            project_id TEXT,
            deviation_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            group_key TEXT NOT NULL,
            message TEXT NOT NULL,
            impact_value REAL,
            resolved INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            resolved_at TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS uq_deviation_open_key
          ON deviation(project_id, deviation_type, group_key)
          WHERE resolved = 0;

        CREATE INDEX IF NOT EXISTS idx_deviation_project
          ON deviation(project_id, deviation_type, resolved);

        CREATE TABLE IF NOT EXISTS recalc_log (
            job_id TEXT PRIMARY KEY,
            project_id TEXT,
            trigger_type TEXT NOT NULL,
            stages TEXT NOT NULL,
            status TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            duration_ms INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_recalc_log_status
          ON recalc_log(status, started_at);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}
