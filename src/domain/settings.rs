// ==========================================
// 橱柜工坊偏差引擎 - 风险阈值模型
// ==========================================
// 四级合并: 默认值 → 全局 → 项目类型 → 单项目
// 每级只覆盖自己定义的字段 (None = 继承)
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// RiskSettings - 生效阈值
// ==========================================
// 值对象，不落库，每次检测重新解析
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSettings {
    pub target_margin: f64,
    pub warning_margin: f64,
    pub high_risk_margin: f64,
    pub critical_margin: f64,
    /// 损耗系数，取值 [1, 2]
    pub waste_factor: f64,
    pub inventory_shortage_high: f64,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            target_margin: 0.25,
            warning_margin: 0.25,
            high_risk_margin: 0.18,
            critical_margin: 0.12,
            waste_factor: 1.15,
            inventory_shortage_high: 0.20,
        }
    }
}

impl RiskSettings {
    /// 叠加一层覆写
    pub fn apply(mut self, layer: &RiskSettingsOverride) -> Self {
        if let Some(v) = layer.target_margin {
            self.target_margin = v;
        }
        if let Some(v) = layer.warning_margin {
            self.warning_margin = v;
        }
        if let Some(v) = layer.high_risk_margin {
            self.high_risk_margin = v;
        }
        if let Some(v) = layer.critical_margin {
            self.critical_margin = v;
        }
        if let Some(v) = layer.waste_factor {
            self.waste_factor = v;
        }
        if let Some(v) = layer.inventory_shortage_high {
            self.inventory_shortage_high = v;
        }
        self
    }
}

// ==========================================
// RiskSettingsOverride - 单层覆写
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSettingsOverride {
    pub target_margin: Option<f64>,
    pub warning_margin: Option<f64>,
    pub high_risk_margin: Option<f64>,
    pub critical_margin: Option<f64>,
    pub waste_factor: Option<f64>,
    pub inventory_shortage_high: Option<f64>,
}

impl RiskSettingsOverride {
    pub fn is_empty(&self) -> bool {
        self.target_margin.is_none()
            && self.warning_margin.is_none()
            && self.high_risk_margin.is_none()
            && self.critical_margin.is_none()
            && self.waste_factor.is_none()
            && self.inventory_shortage_high.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_only_defined_fields() {
        let layer = RiskSettingsOverride {
            waste_factor: Some(1.3),
            ..Default::default()
        };
        let merged = RiskSettings::default().apply(&layer);
        assert_eq!(merged.waste_factor, 1.3);
        assert_eq!(merged.target_margin, 0.25);
        assert_eq!(merged.inventory_shortage_high, 0.20);
    }

    #[test]
    fn test_empty_override() {
        assert!(RiskSettingsOverride::default().is_empty());
        let layer = RiskSettingsOverride {
            critical_margin: Some(0.1),
            ..Default::default()
        };
        assert!(!layer.is_empty());
    }
}
