//! 推送入口
//!
//! 把平台层交来的原始推送负载解码成报告，再交给串行 worker 处理。
//! 解码失败同样以 `CycleResult::Failed` 的形式返回，推送调用方不需要处理错误。

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::notifications::decoder::NotificationDecoder;
use crate::notifications::model::{Notification, Report};
use crate::notifications::service::NotificationService;
use crate::notifications::worker::NotificationWorker;
use crate::notifications::{CycleResult, CycleSummary};

pub struct NotificationPipeline {
    decoder: NotificationDecoder,
    service: Arc<dyn NotificationService>,
    worker: Arc<NotificationWorker>,
}

impl NotificationPipeline {
    pub fn new(
        decoder: NotificationDecoder,
        service: Arc<dyn NotificationService>,
        worker: Arc<NotificationWorker>,
    ) -> Self {
        Self {
            decoder,
            service,
            worker,
        }
    }

    pub fn worker(&self) -> &Arc<NotificationWorker> {
        &self.worker
    }

    /// 处理一条推送，等待对应周期结束
    pub async fn handle_push(&self, payload: &Value) -> CycleResult {
        let report = match self.decoder.decode_push(payload) {
            Ok(report) => report,
            Err(e) => {
                error!("❌ 推送负载解码失败: {}", e);
                return CycleResult::Failed {
                    summary: CycleSummary::default(),
                    reason: e.to_string(),
                };
            }
        };

        info!(
            "📨 收到推送报告: previous_id={}, maximum_id={}, preview_len={}",
            report.previous_id,
            report.maximum_id,
            report.preview.len()
        );
        self.run(self.worker.submit_report(report).await).await
    }

    /// 从当前游标拉取式重同步，等待周期结束
    pub async fn poll(&self) -> CycleResult {
        self.run(self.worker.poll().await).await
    }

    async fn run(&self, handle: Result<crate::notifications::worker::CycleHandle>) -> CycleResult {
        match handle {
            Ok(handle) => handle.wait().await,
            Err(e) => {
                warn!("⚠️ 无法提交通知周期: {}", e);
                CycleResult::Failed {
                    summary: CycleSummary::default(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// 取一条可展示给用户的通知
    ///
    /// 预览非空时直接用第一条；预览为空时向服务端单独拉取 `maximum_id` 那一条。
    /// 只用于展示，不推进游标。
    pub async fn resolve_push_preview(&self, report: &Report) -> Result<Option<Notification>> {
        if let Some(first) = report.preview.first() {
            return Ok(Some(first.clone()));
        }

        if report.maximum_id == 0 {
            debug!("报告为空且没有最大 ID，无可展示的通知");
            return Ok(None);
        }

        debug!("预览为空，单独拉取通知: id={}", report.maximum_id);
        let notification = self.service.fetch_notification(report.maximum_id).await?;
        Ok(Some(notification))
    }
}
