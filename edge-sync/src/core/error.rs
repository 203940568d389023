use shared::error::{AppError, ErrorCode};
use thiserror::Error;
use uuid::Uuid;

use crate::conflict::{DetectionError, ResolutionError};

/// 同步引擎错误
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("冲突检测失败: {0}")]
    Detection(#[from] DetectionError),

    #[error("冲突解决失败: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("订单未找到: {0}")]
    OrderNotFound(Uuid),

    #[error("本地存储错误: {0}")]
    Store(AppError),

    #[error("后端错误: {0}")]
    Backend(AppError),

    #[error("配置错误: {0}")]
    Config(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Detection(e) => e.code(),
            EngineError::Resolution(e) => e.code(),
            EngineError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            EngineError::Store(e) | EngineError::Backend(e) => e.code,
            EngineError::Config(_) => ErrorCode::ConfigError,
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Store(e) | EngineError::Backend(e) => e,
            EngineError::OrderNotFound(id) => {
                AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", id.to_string())
            }
            other => AppError::with_message(other.code(), other.to_string()),
        }
    }
}

/// 引擎的 Result 类型别名
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use shared::sync::ConflictResolutionStrategy;

    #[test]
    fn test_engine_error_codes() {
        assert_eq!(
            EngineError::Config("SYNC_MAX_RETRIES".into()).code(),
            ErrorCode::ConfigError
        );
        assert_eq!(
            EngineError::from(ResolutionError::RequiresInput(
                ConflictResolutionStrategy::Escalate
            ))
            .code(),
            ErrorCode::ResolutionRequiresInput
        );
    }

    #[test]
    fn test_into_app_error_keeps_collaborator_error() {
        let app: AppError = EngineError::Store(AppError::storage("disk full")).into();
        assert_eq!(app.code, ErrorCode::StorageError);
        assert_eq!(app.message, "disk full");

        let id = Uuid::new_v4();
        let app: AppError = EngineError::OrderNotFound(id).into();
        assert_eq!(app.code, ErrorCode::OrderNotFound);
        assert_eq!(app.detail("order_id").unwrap(), &id.to_string());
    }
}
