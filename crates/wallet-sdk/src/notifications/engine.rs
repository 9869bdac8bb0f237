//! 通知同步引擎
//!
//! 职责：
//! - 间隙检测（报告的 previous_id 大于本地游标时，从游标重新拉取）
//! - 有界重试拉取
//! - 按序应用通知，每条成功后立即推进游标
//! - 游标前进后确认送达
//!
//! 引擎本身不加锁，由 `NotificationWorker` 保证同一时刻只有一个周期在运行。

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{Result, WalletSDKError};
use crate::notifications::cursor_store::CursorStore;
use crate::notifications::handler::{resolve_handler, HandlerContext};
use crate::notifications::model::{Notification, NotificationId, Report};
use crate::notifications::retry::FetchRetryConfig;
use crate::notifications::service::{DeviceInfoProvider, FetchOutcome, NotificationService};
use crate::notifications::{CycleResult, CycleState, CycleSummary, CycleTrigger};

pub struct NotificationEngine {
    cursor_store: Arc<dyn CursorStore>,
    service: Arc<dyn NotificationService>,
    handler_ctx: HandlerContext,
    device: Arc<dyn DeviceInfoProvider>,
    retry: FetchRetryConfig,
    state: CycleState,
}

impl NotificationEngine {
    pub fn new(
        cursor_store: Arc<dyn CursorStore>,
        service: Arc<dyn NotificationService>,
        handler_ctx: HandlerContext,
        device: Arc<dyn DeviceInfoProvider>,
        retry: FetchRetryConfig,
    ) -> Self {
        Self {
            cursor_store,
            service,
            handler_ctx,
            device,
            retry,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// 当前持久化游标
    pub async fn cursor(&self) -> Result<NotificationId> {
        self.cursor_store.get().await
    }

    /// 运行一个完整的处理周期
    ///
    /// 错误只记录日志，不向上抛出；调用方只看到 `Completed` / `Failed`。
    pub async fn run_cycle(&mut self, trigger: CycleTrigger) -> CycleResult {
        let start_cursor = match self.cursor_store.get().await {
            Ok(cursor) => cursor,
            Err(e) => {
                error!("读取通知游标失败，周期中止: {}", e);
                return CycleResult::Failed {
                    summary: CycleSummary::default(),
                    reason: e.to_string(),
                };
            }
        };

        info!(
            "通知周期开始: trigger={}, cursor={}",
            trigger.kind(),
            start_cursor
        );

        let mut summary = CycleSummary {
            start_cursor,
            end_cursor: start_cursor,
            ..CycleSummary::default()
        };

        let outcome = self.synchronize(trigger, &mut summary).await;

        if let Err(e) = &outcome {
            error!(
                "通知周期中止: cursor={}, applied={}, error={}",
                summary.end_cursor, summary.applied, e
            );
        }

        // 即便周期中途中止，只要游标前进了也要确认
        if summary.end_cursor != start_cursor {
            self.state = CycleState::Confirming;
            summary.confirmed = self.confirm(summary.end_cursor).await;
        }

        self.state = CycleState::Idle;

        match outcome {
            Ok(()) => {
                info!(
                    "✅ 通知周期完成: cursor={} -> {}, applied={}, fetches={}",
                    start_cursor, summary.end_cursor, summary.applied, summary.fetches
                );
                CycleResult::Completed(summary)
            }
            Err(e) => CycleResult::Failed {
                summary,
                reason: e.to_string(),
            },
        }
    }

    async fn synchronize(&mut self, trigger: CycleTrigger, summary: &mut CycleSummary) -> Result<()> {
        self.state = CycleState::GapCheck;
        let mut cursor = summary.start_cursor;
        // 服务端已知的最大通知 ID，只在本周期内有效
        let mut max_seen: NotificationId = 0;

        // 来自推送的报告只在没有间隙时直接使用
        let (mut report, mut fetched) = match trigger {
            CycleTrigger::Report(report) => {
                max_seen = max_seen.max(report.maximum_id);
                if report.previous_id > cursor {
                    info!(
                        "检测到间隙，从游标重新拉取: cursor={}, report_previous_id={}",
                        cursor, report.previous_id
                    );
                    (self.fetch_with_retry(cursor, summary).await?, true)
                } else {
                    (report, false)
                }
            }
            CycleTrigger::Poll => (self.fetch_with_retry(cursor, summary).await?, true),
        };

        loop {
            max_seen = max_seen.max(report.maximum_id);

            let before = cursor;
            self.apply(&report.preview, &mut cursor, summary).await?;

            if max_seen <= cursor {
                return Ok(());
            }

            if fetched && cursor == before {
                // 服务端声称还有更多，但从游标拉取的结果推进不了
                return Err(WalletSDKError::NoProgress { cursor, max_seen });
            }

            debug!(
                "预览已处理完但服务端还有更多: cursor={}, max_seen={}",
                cursor, max_seen
            );
            report = self.fetch_with_retry(cursor, summary).await?;
            fetched = true;
        }
    }

    /// 按序应用通知；任何错误都会中止剩余部分
    async fn apply(
        &mut self,
        preview: &[Notification],
        cursor: &mut NotificationId,
        summary: &mut CycleSummary,
    ) -> Result<()> {
        let mut pending: Vec<&Notification> = preview.iter().filter(|n| n.id > *cursor).collect();
        pending.sort_by_key(|n| n.id);
        pending.dedup_by_key(|n| n.id);

        if pending.len() < preview.len() {
            debug!(
                "忽略已处理的通知: skipped={}, cursor={}",
                preview.len() - pending.len(),
                cursor
            );
        }

        for notification in pending {
            self.state = CycleState::Applying {
                notification_id: notification.id,
            };

            let handler = resolve_handler(notification)?;

            if let Some(required) = handler.required_permission {
                if !self.handler_ctx.session.has_permission_for(required).await {
                    return Err(WalletSDKError::NoPermission {
                        notification_id: notification.id,
                        session_uuid: notification.sender_session_uuid.clone(),
                    });
                }
            }

            if *cursor != notification.previous_id {
                return Err(WalletSDKError::MissingPreviousNotification {
                    notification_id: notification.id,
                    session_uuid: notification.sender_session_uuid.clone(),
                    last_id: *cursor,
                });
            }

            handler.process(&self.handler_ctx).await?;

            self.cursor_store.set(notification.id).await?;
            *cursor = notification.id;
            summary.end_cursor = notification.id;
            summary.applied += 1;

            debug!(
                "通知已应用: id={}, type={}",
                notification.id,
                notification.message.message_type()
            );
        }

        Ok(())
    }

    /// 有界重试拉取：带通知的部分成功直接接受，空结果加错误则重试
    async fn fetch_with_retry(&mut self, from_id: NotificationId, summary: &mut CycleSummary) -> Result<Report> {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            summary.fetches += 1;
            self.state = CycleState::Refetching {
                from_id,
                attempt: attempts,
            };

            let outcome = self.service.fetch_report_after(from_id).await;
            // 部分结果为空时总是重试
            let partial = matches!(outcome, FetchOutcome::Partial { .. });

            match outcome.into_usable() {
                Ok((report, None)) => {
                    debug!(
                        "拉取报告成功: after={}, previous_id={}, maximum_id={}, preview={}",
                        from_id,
                        report.previous_id,
                        report.maximum_id,
                        report.preview.len()
                    );
                    return Ok(report);
                }
                Ok((report, Some(e))) => {
                    warn!(
                        "⚠️ 拉取到通知的同时也有错误，接受部分结果: after={}, preview={}, error={}",
                        from_id,
                        report.preview.len(),
                        e
                    );
                    return Ok(report);
                }
                Err(e) => {
                    if !partial && !e.is_retryable() {
                        error!(
                            "拉取报告失败且不可重试: after={}, attempt={}, error={}",
                            from_id, attempts, e
                        );
                        return Err(WalletSDKError::FailedFetch { from_id, attempts });
                    }
                    if !self.retry.should_retry(attempts) {
                        return Err(WalletSDKError::FailedFetch { from_id, attempts });
                    }
                    let delay = self.retry.delay_for(attempts);
                    warn!(
                        "⚠️ 拉取报告失败，准备重试: after={}, attempt={}/{}, delay_ms={}, error={}",
                        from_id,
                        attempts,
                        self.retry.max_attempts,
                        delay.as_millis(),
                        e
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// 尽力而为的送达确认，失败只记录
    async fn confirm(&self, until: NotificationId) -> bool {
        let device = self.device.device_info();
        match self.service.confirm_delivery_until(until, &device).await {
            Ok(()) => {
                debug!("送达确认成功: until={}", until);
                true
            }
            Err(e) => {
                warn!("⚠️ 送达确认失败: until={}, error={}", until, e);
                false
            }
        }
    }
}
