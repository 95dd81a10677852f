// ==========================================
// 橱柜工坊偏差引擎 - 引擎层错误类型
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("项目不存在: {0}")]
    ProjectNotFound(String),

    #[error("{entity} 不存在: {id}")]
    NotFound { entity: String, id: String },

    #[error("参数错误 (field={field}): {message}")]
    InvalidInput { field: String, message: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
