//! 服务端边界：报告拉取 + 送达确认

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletSDKError};
use crate::notifications::model::{Notification, NotificationId, Report};

/// 一次拉取的结果
#[derive(Debug)]
pub enum FetchOutcome {
    Complete(Report),
    /// 拿到了部分通知，同时也有错误
    Partial { report: Report, error: WalletSDKError },
    Failed(WalletSDKError),
}

impl FetchOutcome {
    /// 含有可用通知的结果才会被接受
    pub fn into_usable(self) -> std::result::Result<(Report, Option<WalletSDKError>), WalletSDKError> {
        match self {
            FetchOutcome::Complete(report) => Ok((report, None)),
            FetchOutcome::Partial { report, error } if !report.preview.is_empty() => Ok((report, Some(error))),
            FetchOutcome::Partial { error, .. } => Err(error),
            FetchOutcome::Failed(error) => Err(error),
        }
    }
}

impl From<Result<Report>> for FetchOutcome {
    fn from(result: Result<Report>) -> Self {
        match result {
            Ok(report) => FetchOutcome::Complete(report),
            Err(error) => FetchOutcome::Failed(error),
        }
    }
}

/// 通知服务（Houston）
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// `GET /sessions/notification_report?after={id}`；`after == 0` 表示从头开始
    async fn fetch_report_after(&self, after: NotificationId) -> FetchOutcome;

    /// `PUT /sessions/notifications/confirm?until=...`
    async fn confirm_delivery_until(&self, until: NotificationId, device: &DeviceInfo) -> Result<()>;

    /// `GET /sessions/notifications/{id}`
    async fn fetch_notification(&self, id: NotificationId) -> Result<Notification>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    Foreground,
    Background,
    Inactive,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Foreground => "FOREGROUND",
            AppStatus::Background => "BACKGROUND",
            AppStatus::Inactive => "INACTIVE",
        }
    }
}

/// 送达确认附带的设备信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub os_version: String,
    pub app_status: AppStatus,
}

pub trait DeviceInfoProvider: Send + Sync {
    fn device_info(&self) -> DeviceInfo;
}

/// 固定机型/系统版本，App 状态由生命周期事件更新
#[derive(Debug)]
pub struct DeviceInfoState {
    model: String,
    os_version: String,
    app_status: RwLock<AppStatus>,
}

impl DeviceInfoState {
    pub fn new(model: impl Into<String>, os_version: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            os_version: os_version.into(),
            app_status: RwLock::new(AppStatus::Foreground),
        }
    }

    pub fn set_app_status(&self, status: AppStatus) {
        *self.app_status.write() = status;
    }

    pub fn app_status(&self) -> AppStatus {
        *self.app_status.read()
    }
}

impl DeviceInfoProvider for DeviceInfoState {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            model: self.model.clone(),
            os_version: self.os_version.clone(),
            app_status: self.app_status(),
        }
    }
}
