//! 通知管线生命周期 Hook
//!
//! App 回到前台时触发一次拉取式重同步（补上后台期间可能丢失的推送），
//! 同时记录 App 状态，供送达确认附带。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::lifecycle::LifecycleHook;
use crate::notifications::service::{AppStatus, DeviceInfoState};
use crate::notifications::worker::NotificationWorker;

pub struct NotificationLifecycleHook {
    worker: Arc<NotificationWorker>,
    device: Arc<DeviceInfoState>,
}

impl NotificationLifecycleHook {
    pub fn new(worker: Arc<NotificationWorker>, device: Arc<DeviceInfoState>) -> Self {
        Self { worker, device }
    }
}

#[async_trait]
impl LifecycleHook for NotificationLifecycleHook {
    async fn on_background(&self) -> Result<()> {
        self.device.set_app_status(AppStatus::Background);
        info!("[Notification Hook] App 切换到后台");
        Ok(())
    }

    /// 不等待周期完成，结果通过 worker 的广播通道观察
    async fn on_foreground(&self) -> Result<()> {
        self.device.set_app_status(AppStatus::Foreground);
        info!("[Notification Hook] App 切换到前台，触发通知重同步");

        if let Err(e) = self.worker.poll().await {
            // worker 已关闭不算致命错误
            warn!("[Notification Hook] ⚠️ 触发重同步失败: {}", e);
        }
        Ok(())
    }
}
