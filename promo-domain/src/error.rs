//! 领域层统一错误定义
//!
//! 聚焦序列化、消息通道、仓储、邮件发送与配置校验等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use crate::messaging::ChannelError;
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化/解析 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },

    // --- 消息通道 ---
    #[error("channel error: {source}")]
    Channel {
        #[from]
        source: ChannelError,
    },

    // --- 仓储/持久化 ---
    #[error("repository error: {reason}")]
    Repository { reason: String },
    #[error("database error: {reason}")]
    Database { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },

    // --- 邮件发送 ---
    #[error("send transport error: {reason}")]
    SendTransport { reason: String },

    // --- 配置/值校验 ---
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
}

impl DomainError {
    pub fn repository(reason: impl Into<String>) -> Self {
        Self::Repository {
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn send_transport(reason: impl Into<String>) -> Self {
        Self::SendTransport {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx/toml 等错误转换为 DomainError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound {
                reason: "row not found".to_string(),
            },
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}

impl From<toml::de::Error> for DomainError {
    fn from(err: toml::de::Error) -> Self {
        DomainError::InvalidConfig {
            reason: err.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for DomainError {
    fn from(err: std::num::ParseIntError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}
