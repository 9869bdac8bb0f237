use thiserror::Error;

use crate::notifications::model::NotificationId;

/// SDK 错误类型
///
/// 按通知管线的错误分类组织：
/// - 传输类（Transport / Timeout / Http）：可重试，不会破坏游标
/// - 解码类（InvalidNotificationStructure / UnknownNotificationType）：仅中止当前周期
/// - 权限类（NoPermission）：等待会话状态变化后由下一个周期重试
/// - 处理器副作用类（Handler）：游标停留在最后一个成功的通知
#[derive(Debug, Error)]
pub enum WalletSDKError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("HTTP error [{status}]: {body}")]
    Http { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("KV store error: {0}")]
    KvStore(String),

    #[error("IO error: {0}")]
    IO(String),

    #[error("Invalid notification structure: {0}")]
    InvalidNotificationStructure(String),

    #[error("Unknown notification type {raw_type} (id={notification_id}, session={session_uuid})")]
    UnknownNotificationType {
        notification_id: NotificationId,
        session_uuid: String,
        raw_type: String,
    },

    #[error("No permission to process notification {notification_id} (session={session_uuid})")]
    NoPermission {
        notification_id: NotificationId,
        session_uuid: String,
    },

    #[error("Missing previous notification for {notification_id} (session={session_uuid}, last_id={last_id})")]
    MissingPreviousNotification {
        notification_id: NotificationId,
        session_uuid: String,
        last_id: NotificationId,
    },

    #[error("Failed to fetch notifications after {from_id} ({attempts} attempts)")]
    FailedFetch {
        from_id: NotificationId,
        attempts: u32,
    },

    #[error("Refetch made no progress: cursor={cursor}, max_seen={max_seen}")]
    NoProgress {
        cursor: NotificationId,
        max_seen: NotificationId,
    },

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Shutting down: {0}")]
    ShuttingDown(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl WalletSDKError {
    /// 是否为传输类错误（可在有界重试内重试）
    pub fn is_retryable(&self) -> bool {
        match self {
            WalletSDKError::Transport(_) | WalletSDKError::Timeout(_) => true,
            // 5xx 服务端错误可重试，4xx 客户端错误不重试
            WalletSDKError::Http { status, .. } => *status >= 500 && *status < 600,
            // 响应体 JSON 损坏同样按传输错误处理
            WalletSDKError::Serialization(_) => true,
            _ => false,
        }
    }

    /// 处理器副作用失败的便捷构造
    pub fn handler<T: std::fmt::Display>(msg: T) -> Self {
        WalletSDKError::Handler(msg.to_string())
    }
}

impl From<serde_json::Error> for WalletSDKError {
    fn from(error: serde_json::Error) -> Self {
        WalletSDKError::Serialization(error.to_string())
    }
}

impl From<sled::Error> for WalletSDKError {
    fn from(error: sled::Error) -> Self {
        WalletSDKError::KvStore(error.to_string())
    }
}

impl From<std::io::Error> for WalletSDKError {
    fn from(error: std::io::Error) -> Self {
        WalletSDKError::IO(error.to_string())
    }
}

impl From<reqwest::Error> for WalletSDKError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            WalletSDKError::Timeout(error.to_string())
        } else if error.is_decode() {
            WalletSDKError::Serialization(error.to_string())
        } else if let Some(status) = error.status() {
            WalletSDKError::Http {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            WalletSDKError::Transport(error.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, WalletSDKError>;
