use thiserror::Error;

/// Star错误类型定义
#[derive(Debug, Error)]
pub enum StarError {
    #[error("非法输入: {0}")]
    IllegalInput(String),

    #[error("未授权: {0}")]
    NotAuthorized(String),

    #[error("服务未找到: {0}")]
    NotFound(String),

    #[error("服务不可用: {0}")]
    ServiceUnavailable(String),

    #[error("致命错误: {0}")]
    Fatal(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl StarError {
    pub fn illegal_input(message: impl Into<String>) -> Self {
        StarError::IllegalInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        StarError::NotFound(message.into())
    }

    /// 是否属于请求方的问题（4xx 类）
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StarError::IllegalInput(_) | StarError::NotAuthorized(_) | StarError::NotFound(_)
        )
    }
}

impl From<serde_json::Error> for StarError {
    fn from(err: serde_json::Error) -> Self {
        StarError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type StarResult<T> = std::result::Result<T, StarError>;
