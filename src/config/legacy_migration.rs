// ==========================================
// 橱柜工坊偏差引擎 - 旧版全局阈值迁移
// ==========================================
// 历史上存在两种全局阈值表:
// - shop_settings        (旧)
// - global_risk_settings (新，两者并存时优先)
// 一次性迁移到 config_kv 的 global 作用域，运行期不再读取旧表
// ==========================================

use crate::config::config_manager::config_keys;
use rusqlite::{params, Connection, OptionalExtension};

const LEGACY_TABLES: [&str; 2] = ["global_risk_settings", "shop_settings"];

/// 旧表列名 → 配置键
const COLUMN_KEYS: [(&str, &str); 6] = [
    ("target_margin", config_keys::RISK_TARGET_MARGIN),
    ("warning_margin", config_keys::RISK_WARNING_MARGIN),
    ("high_risk_margin", config_keys::RISK_HIGH_RISK_MARGIN),
    ("critical_margin", config_keys::RISK_CRITICAL_MARGIN),
    ("waste_factor", config_keys::RISK_WASTE_FACTOR),
    ("inventory_shortage_high", config_keys::RISK_INVENTORY_SHORTAGE_HIGH),
];

/// 迁移旧版全局阈值
///
/// # 返回
/// - 写入的配置键数量（已迁移过或无旧表时为 0）
///
/// # 说明
/// - global 作用域已有任一 risk.* 键时不做任何写入（幂等）
/// - 旧表只取第一行；NULL 列跳过
pub fn migrate_legacy_global_settings(conn: &Connection) -> rusqlite::Result<usize> {
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM config_kv WHERE scope_id = 'global' AND key LIKE 'risk.%'",
        [],
        |row| row.get(0),
    )?;
    if existing > 0 {
        tracing::debug!(existing, "全局阈值已存在，跳过旧表迁移");
        return Ok(0);
    }

    let Some(table) = find_first_legacy_table(conn)? else {
        return Ok(0);
    };

    let columns = table_columns(conn, table)?;
    let mut written = 0;
    for (column, key) in COLUMN_KEYS {
        if !columns.iter().any(|c| c == column) {
            continue;
        }
        let sql = format!("SELECT {} FROM {} LIMIT 1", column, table);
        let value: Option<f64> = conn
            .query_row(&sql, [], |row| row.get::<_, Option<f64>>(0))
            .optional()?
            .flatten();
        if let Some(v) = value {
            conn.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, v.to_string()],
            )?;
            written += 1;
        }
    }

    tracing::info!(legacy_table = table, written, "旧版全局阈值迁移完成");
    Ok(written)
}

/// 按优先级返回第一张存在且非空的旧表
fn find_first_legacy_table(conn: &Connection) -> rusqlite::Result<Option<&'static str>> {
    for table in LEGACY_TABLES {
        let exists = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1",
                params![table],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !exists {
            continue;
        }
        let rows: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        if rows > 0 {
            return Ok(Some(table));
        }
    }
    Ok(None)
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn
    }

    fn global_value(conn: &Connection, key: &str) -> Option<String> {
        conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .unwrap()
    }

    #[test]
    fn test_no_legacy_tables() {
        let conn = setup_conn();
        assert_eq!(migrate_legacy_global_settings(&conn).unwrap(), 0);
    }

    #[test]
    fn test_newer_table_preferred() {
        let conn = setup_conn();
        conn.execute_batch(
            r#"
            CREATE TABLE shop_settings (target_margin REAL, waste_factor REAL);
            INSERT INTO shop_settings VALUES (0.40, 1.50);
            CREATE TABLE global_risk_settings (
                target_margin REAL, warning_margin REAL, high_risk_margin REAL,
                critical_margin REAL, waste_factor REAL, inventory_shortage_high REAL
            );
            INSERT INTO global_risk_settings VALUES (0.30, NULL, NULL, NULL, 1.20, NULL);
            "#,
        )
        .unwrap();

        assert_eq!(migrate_legacy_global_settings(&conn).unwrap(), 2);
        assert_eq!(
            global_value(&conn, config_keys::RISK_TARGET_MARGIN).as_deref(),
            Some("0.3")
        );
        assert_eq!(
            global_value(&conn, config_keys::RISK_WASTE_FACTOR).as_deref(),
            Some("1.2")
        );
        assert_eq!(global_value(&conn, config_keys::RISK_WARNING_MARGIN), None);
    }

    #[test]
    fn test_old_table_used_when_alone_and_migration_is_idempotent() {
        let conn = setup_conn();
        conn.execute_batch(
            r#"
            CREATE TABLE shop_settings (target_margin REAL, waste_factor REAL, shop_name TEXT);
            INSERT INTO shop_settings VALUES (0.40, 1.50, 'main');
            "#,
        )
        .unwrap();

        assert_eq!(migrate_legacy_global_settings(&conn).unwrap(), 2);
        assert_eq!(migrate_legacy_global_settings(&conn).unwrap(), 0);
        assert_eq!(
            global_value(&conn, config_keys::RISK_TARGET_MARGIN).as_deref(),
            Some("0.4")
        );
    }
}
