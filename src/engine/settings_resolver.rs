// ==========================================
// 橱柜工坊偏差引擎 - 风险阈值解析器
// ==========================================
// 合并顺序（低 → 高）:
// 1. 内置默认值
// 2. 全局配置
// 3. 项目类型覆写（仅取类型串的第一个标记）
// 4. 单项目覆写
// 红线: 不缓存，每次检测重新解析；任何一级缺失都只是跳过
// ==========================================

use crate::config::RiskConfigReader;
use crate::domain::settings::{RiskSettings, RiskSettingsOverride};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait RiskSettingsResolver: Send + Sync {
    /// 解析生效阈值
    ///
    /// # 参数
    /// - project_type: 项目类型串（可能为逗号拼接的多类型）
    /// - project_id: 提供时叠加单项目覆写
    async fn resolve(&self, project_type: &str, project_id: Option<&str>) -> RiskSettings;
}

/// 取类型串的第一个标记
///
/// 多类型项目（如 "kitchen,vanity"）只有第一个类型参与覆写查找
pub fn primary_project_type(project_type: &str) -> Option<&str> {
    project_type
        .split(',')
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ==========================================
// LayeredRiskSettingsResolver
// ==========================================
pub struct LayeredRiskSettingsResolver {
    reader: Arc<dyn RiskConfigReader>,
}

impl LayeredRiskSettingsResolver {
    pub fn new(reader: Arc<dyn RiskConfigReader>) -> Self {
        Self { reader }
    }

    fn apply_layer(
        settings: RiskSettings,
        level: &str,
        layer: Result<Option<RiskSettingsOverride>, Box<dyn std::error::Error + Send + Sync>>,
    ) -> RiskSettings {
        match layer {
            Ok(Some(layer)) => settings.apply(&layer),
            Ok(None) => settings,
            Err(e) => {
                tracing::warn!(config_level = level, error = %e, "阈值配置读取失败，按未配置处理");
                settings
            }
        }
    }
}

#[async_trait]
impl RiskSettingsResolver for LayeredRiskSettingsResolver {
    async fn resolve(&self, project_type: &str, project_id: Option<&str>) -> RiskSettings {
        let mut settings = RiskSettings::default();

        settings = Self::apply_layer(settings, "global", self.reader.load_global_override().await);

        if let Some(primary) = primary_project_type(project_type) {
            if project_type.contains(',') {
                tracing::debug!(
                    project_type,
                    primary,
                    "多类型项目仅按第一个类型查找类型覆写"
                );
            }
            settings = Self::apply_layer(
                settings,
                "project_type",
                self.reader.load_project_type_override(primary).await,
            );
        }

        if let Some(project_id) = project_id {
            settings = Self::apply_layer(
                settings,
                "project",
                self.reader.load_project_override(project_id).await,
            );
        }

        settings
    }
}
