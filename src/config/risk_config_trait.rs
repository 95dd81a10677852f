// ==========================================
// 橱柜工坊偏差引擎 - 风险配置读取 Trait
// ==========================================
// 职责: 定义阈值解析所需的三级配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含合并逻辑
// ==========================================

use crate::domain::settings::RiskSettingsOverride;
use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// RiskConfigReader Trait
// ==========================================
// 用途: 阈值解析器读取已存储的覆写层
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait RiskConfigReader: Send + Sync {
    /// 读取全局覆写
    ///
    /// # 返回
    /// - None: 全局未配置任何风险键
    async fn load_global_override(&self) -> ConfigResult<Option<RiskSettingsOverride>>;

    /// 读取项目类型覆写
    ///
    /// # 参数
    /// - project_type: 单个类型标记（调用方已完成切分）
    async fn load_project_type_override(
        &self,
        project_type: &str,
    ) -> ConfigResult<Option<RiskSettingsOverride>>;

    /// 读取单项目覆写
    async fn load_project_override(
        &self,
        project_id: &str,
    ) -> ConfigResult<Option<RiskSettingsOverride>>;
}
