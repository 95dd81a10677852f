// ==========================================
// 橱柜工坊偏差引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 作用域: GLOBAL / PROJECT_TYPE / PROJECT
// ==========================================

use crate::config::risk_config_trait::{ConfigResult, RiskConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::settings::RiskSettingsOverride;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 读取配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_value(&self, scope: &ConfigScope, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![scope.scope_id(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入配置值（作用域行不存在时自动创建）
    pub fn set_value(&self, scope: &ConfigScope, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        ensure_scope_row(&conn, scope)?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// 删除配置值
    ///
    /// # 返回
    /// - true: 删除了已有配置
    pub fn remove_value(&self, scope: &ConfigScope, key: &str) -> ConfigResult<bool> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let n = conn.execute(
            "DELETE FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![scope.scope_id(), key],
        )?;
        Ok(n > 0)
    }

    /// 读取某作用域的风险覆写
    ///
    /// 说明: 非法数值或超出取值范围记 warn 并视为未配置
    pub fn get_risk_override(&self, scope: &ConfigScope) -> ConfigResult<RiskSettingsOverride> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = ?1 AND key LIKE 'risk.%'",
        )?;
        let rows = stmt
            .query_map(params![scope.scope_id()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut layer = RiskSettingsOverride::default();
        for (key, raw) in rows {
            let value = match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => v,
                _ => {
                    tracing::warn!(
                        scope_id = %scope.scope_id(),
                        config_key = %key,
                        raw_value = %raw,
                        "风险阈值配置格式错误，忽略"
                    );
                    continue;
                }
            };
            if !risk_value_range(&key).contains(&value) {
                tracing::warn!(
                    scope_id = %scope.scope_id(),
                    config_key = %key,
                    value,
                    "风险阈值超出取值范围，忽略"
                );
                continue;
            }
            match key.as_str() {
                config_keys::RISK_TARGET_MARGIN => layer.target_margin = Some(value),
                config_keys::RISK_WARNING_MARGIN => layer.warning_margin = Some(value),
                config_keys::RISK_HIGH_RISK_MARGIN => layer.high_risk_margin = Some(value),
                config_keys::RISK_CRITICAL_MARGIN => layer.critical_margin = Some(value),
                config_keys::RISK_WASTE_FACTOR => layer.waste_factor = Some(value),
                config_keys::RISK_INVENTORY_SHORTAGE_HIGH => {
                    layer.inventory_shortage_high = Some(value)
                }
                _ => {}
            }
        }
        Ok(layer)
    }

    /// 写入某作用域的风险覆写
    ///
    /// 说明: None 字段会删除对应键（恢复继承）
    ///
    /// # 返回
    /// - Err: 任一字段超出取值范围（此时不写入任何键）
    pub fn set_risk_override(
        &self,
        scope: &ConfigScope,
        layer: &RiskSettingsOverride,
    ) -> ConfigResult<()> {
        let fields = [
            (config_keys::RISK_TARGET_MARGIN, layer.target_margin),
            (config_keys::RISK_WARNING_MARGIN, layer.warning_margin),
            (config_keys::RISK_HIGH_RISK_MARGIN, layer.high_risk_margin),
            (config_keys::RISK_CRITICAL_MARGIN, layer.critical_margin),
            (config_keys::RISK_WASTE_FACTOR, layer.waste_factor),
            (
                config_keys::RISK_INVENTORY_SHORTAGE_HIGH,
                layer.inventory_shortage_high,
            ),
        ];
        for (key, value) in fields {
            let Some(v) = value else { continue };
            let range = risk_value_range(key);
            if !v.is_finite() || !range.contains(&v) {
                return Err(format!(
                    "字段值错误 (field={}): {} 超出取值范围 [{}, {}]",
                    key,
                    v,
                    range.start(),
                    range.end()
                )
                .into());
            }
        }

        for (key, value) in fields {
            match value {
                Some(v) => self.set_value(scope, key, &v.to_string())?,
                None => {
                    self.remove_value(scope, key)?;
                }
            }
        }
        Ok(())
    }

    /// 读取重算队列配置（缺失或非法时取默认值）
    pub fn load_recalc_config(&self) -> ConfigResult<RecalcConfig> {
        let defaults = RecalcConfig::default();
        let scope = ConfigScope::Global;

        let worker_count = self
            .get_value(&scope, config_keys::RECALC_WORKER_COUNT)?
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.worker_count);
        let queue_capacity = self
            .get_value(&scope, config_keys::RECALC_QUEUE_CAPACITY)?
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.queue_capacity);
        let max_retries = self
            .get_value(&scope, config_keys::RECALC_MAX_RETRIES)?
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);

        Ok(RecalcConfig {
            worker_count,
            queue_capacity,
            max_retries,
        })
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 返回
    /// - Ok(String): {scope_id: {key: value}}
    ///
    /// # 用途
    /// - 排查阈值问题时导出当前生效的存储配置
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT scope_id, key, value FROM config_kv ORDER BY scope_id, key")?;

        let mut config_map: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        for row in rows {
            let (scope_id, key, value) = row?;
            config_map.entry(scope_id).or_default().insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    fn load_override(&self, scope: &ConfigScope) -> ConfigResult<Option<RiskSettingsOverride>> {
        let layer = self.get_risk_override(scope)?;
        Ok(if layer.is_empty() { None } else { Some(layer) })
    }
}

/// 风险阈值取值范围: 损耗系数 [1, 2]，其余比例 [0, 1]
fn risk_value_range(key: &str) -> RangeInclusive<f64> {
    if key == config_keys::RISK_WASTE_FACTOR {
        1.0..=2.0
    } else {
        0.0..=1.0
    }
}

/// 确保作用域行存在
fn ensure_scope_row(conn: &Connection, scope: &ConfigScope) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key) VALUES (?1, ?2, ?3)",
        params![scope.scope_id(), scope.scope_type(), scope.scope_key()],
    )?;
    Ok(())
}

// ==========================================
// RiskConfigReader Trait 实现
// ==========================================
#[async_trait]
impl RiskConfigReader for ConfigManager {
    async fn load_global_override(&self) -> ConfigResult<Option<RiskSettingsOverride>> {
        self.load_override(&ConfigScope::Global)
    }

    async fn load_project_type_override(
        &self,
        project_type: &str,
    ) -> ConfigResult<Option<RiskSettingsOverride>> {
        self.load_override(&ConfigScope::ProjectType {
            project_type: project_type.to_string(),
        })
    }

    async fn load_project_override(
        &self,
        project_id: &str,
    ) -> ConfigResult<Option<RiskSettingsOverride>> {
        self.load_override(&ConfigScope::Project {
            project_id: project_id.to_string(),
        })
    }
}

// ==========================================
// ConfigScope - 配置作用域
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,                                 // 全局
    ProjectType { project_type: String },   // 项目类型
    Project { project_id: String },         // 单项目
}

impl ConfigScope {
    pub fn scope_type(&self) -> &'static str {
        match self {
            ConfigScope::Global => "GLOBAL",
            ConfigScope::ProjectType { .. } => "PROJECT_TYPE",
            ConfigScope::Project { .. } => "PROJECT",
        }
    }

    pub fn scope_key(&self) -> &str {
        match self {
            ConfigScope::Global => "global",
            ConfigScope::ProjectType { project_type } => project_type,
            ConfigScope::Project { project_id } => project_id,
        }
    }

    /// config_kv.scope_id
    pub fn scope_id(&self) -> String {
        match self {
            ConfigScope::Global => "global".to_string(),
            ConfigScope::ProjectType { project_type } => format!("project_type:{}", project_type),
            ConfigScope::Project { project_id } => format!("project:{}", project_id),
        }
    }
}

// ==========================================
// RecalcConfig - 重算队列配置
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalcConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub max_retries: u32,
}

impl Default for RecalcConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_capacity: 256,
            max_retries: 3,
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 风险阈值
    pub const RISK_TARGET_MARGIN: &str = "risk.target_margin";
    pub const RISK_WARNING_MARGIN: &str = "risk.warning_margin";
    pub const RISK_HIGH_RISK_MARGIN: &str = "risk.high_risk_margin";
    pub const RISK_CRITICAL_MARGIN: &str = "risk.critical_margin";
    pub const RISK_WASTE_FACTOR: &str = "risk.waste_factor";
    pub const RISK_INVENTORY_SHORTAGE_HIGH: &str = "risk.inventory_shortage_high";

    // 重算队列
    pub const RECALC_WORKER_COUNT: &str = "recalc.worker_count";
    pub const RECALC_QUEUE_CAPACITY: &str = "recalc.queue_capacity";
    pub const RECALC_MAX_RETRIES: &str = "recalc.max_retries";
}
