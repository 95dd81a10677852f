// ==========================================
// 橱柜工坊偏差引擎 - 偏差领域模型
// ==========================================
// 去重键: (project_id, deviation_type, group_key)
// 红线: 同一去重键最多一条未解决记录
// ==========================================

use crate::domain::types::{DeviationType, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Deviation - 偏差记录
// ==========================================
// 用途: 看板只读，仅由检测器写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub id: String,                      // 偏差ID (uuid)
    pub project_id: Option<String>,      // 项目ID (全局偏差为空)
    pub deviation_type: DeviationType,   // 偏差类型
    pub severity: Severity,              // 严重度
    pub group_key: String,               // 去重子键 (物料编码 / "margin" 等)
    pub message: String,                 // 说明，每次重算重新生成
    pub impact_value: Option<f64>,       // 影响量 (金额 / 短缺数量)
    pub resolved: bool,                  // 是否已解决

    // ===== 元数据 =====
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// ==========================================
// DeviationDraft - 检测器输出
// ==========================================
// 检测器只产出草稿，id/时间戳由存储层决定
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationDraft {
    pub project_id: Option<String>,
    pub deviation_type: DeviationType,
    pub severity: Severity,
    pub group_key: String,
    pub message: String,
    pub impact_value: Option<f64>,
}

impl DeviationDraft {
    /// 项目级偏差
    pub fn for_project(
        project_id: &str,
        deviation_type: DeviationType,
        severity: Severity,
        group_key: impl Into<String>,
        message: impl Into<String>,
        impact_value: Option<f64>,
    ) -> Self {
        Self {
            project_id: Some(project_id.to_string()),
            deviation_type,
            severity,
            group_key: group_key.into(),
            message: message.into(),
            impact_value,
        }
    }
}

/// upsert 结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// 新建记录
    Inserted(String),
    /// 原地刷新已有未解决记录
    Updated(String),
}

impl UpsertOutcome {
    pub fn id(&self) -> &str {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => id,
        }
    }
}
