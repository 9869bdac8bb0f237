//! 通知同步与处理管线
//!
//! 服务端事件流严格有序但可能有间隙，经由推送或轮询到达。管线负责：
//! - 检测间隙并按游标重新拉取缺失区间
//! - 严格按 ID 升序、逐条、恰好一次地应用每条通知
//! - 每成功应用一条就推进持久化游标
//! - 游标前进后向服务端确认送达
//!
//! 所有周期都在同一个串行 worker 上执行，游标只有这一个写者。

pub mod cursor_store;
pub mod decoder;
pub mod engine;
pub mod handler;
pub mod model;
pub mod pipeline;
pub mod retry;
pub mod service;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};

pub use cursor_store::{CursorStore, KvCursorStore};
pub use decoder::{NotificationDecoder, OperationMetadataDecrypter};
pub use engine::NotificationEngine;
pub use handler::{
    resolve_handler, HandlerAction, HandlerContext, IncomingSwapActions, NotificationHandler,
    OperationActions, RealTimeDataActions, SessionActions, SessionPermission,
};
pub use model::{Notification, NotificationId, NotificationPayload, Report};
pub use pipeline::NotificationPipeline;
pub use retry::FetchRetryConfig;
pub use service::{AppStatus, DeviceInfo, DeviceInfoProvider, DeviceInfoState, FetchOutcome, NotificationService};
pub use worker::{CycleHandle, NotificationWorker};

/// 处理周期的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    GapCheck,
    Refetching { from_id: NotificationId, attempt: u32 },
    Applying { notification_id: NotificationId },
    Confirming,
}

/// 触发一个处理周期的来源
#[derive(Debug, Clone)]
pub enum CycleTrigger {
    /// 推送送达的报告
    Report(Report),
    /// 从当前游标开始的拉取式重同步
    Poll,
}

impl CycleTrigger {
    pub fn kind(&self) -> &'static str {
        match self {
            CycleTrigger::Report(_) => "report",
            CycleTrigger::Poll => "poll",
        }
    }
}

/// 一个周期的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub start_cursor: NotificationId,
    pub end_cursor: NotificationId,
    pub applied: usize,
    pub fetches: u32,
    pub confirmed: bool,
}

/// 周期的终态信号（推送调用方只能观察到这个）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleResult {
    Completed(CycleSummary),
    Failed { summary: CycleSummary, reason: String },
}

impl CycleResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleResult::Completed(_))
    }

    pub fn summary(&self) -> &CycleSummary {
        match self {
            CycleResult::Completed(summary) => summary,
            CycleResult::Failed { summary, .. } => summary,
        }
    }
}
