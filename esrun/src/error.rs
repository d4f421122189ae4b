//! 运行时统一错误定义
//!
//! 聚焦版本冲突、类型路由、事件应用、持久化与加载等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use thiserror::Error;

/// 统一错误类型（运行时最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 并发控制/路由 ---
    #[error("version conflict: expected={expected}, actual={actual}")]
    VersionConflict { expected: usize, actual: usize },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 事件应用/持久化/加载 ---
    #[error("event handling failed: event_type={event_type}, reason={reason}")]
    EventHandling {
        event_type: String,
        reason: String,
    },
    #[error("persistence failed: {reason}")]
    Persistence { reason: String },
    #[error("load failed: {reason}")]
    Load { reason: String },
    #[error("supervisor unavailable: {reason}")]
    Supervisor { reason: String },

    // --- 领域规则/命令与状态 ---
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
}

impl DomainError {
    pub fn event_handling(event_type: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::EventHandling {
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        DomainError::Persistence {
            reason: reason.into(),
        }
    }

    pub fn load(reason: impl Into<String>) -> Self {
        DomainError::Load {
            reason: reason.into(),
        }
    }

    pub fn supervisor(reason: impl Into<String>) -> Self {
        DomainError::Supervisor {
            reason: reason.into(),
        }
    }

    pub fn invalid_command(reason: impl Into<String>) -> Self {
        DomainError::InvalidCommand {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        DomainError::InvalidState {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;
