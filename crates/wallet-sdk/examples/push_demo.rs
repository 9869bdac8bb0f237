//! 通知管线演示
//!
//! 用一个内存版的 Houston 服务演示：推送带来的报告有间隙时，管线如何回拉缺失区间、
//! 按序应用并确认送达。

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use wallet_sdk::notifications::model::{EventKind, NewOperation, OperationUpdate};
use wallet_sdk::notifications::service::{DeviceInfoState, FetchOutcome};
use wallet_sdk::{
    CursorStore, DeviceInfo, FetchRetryConfig, HandlerContext, IncomingSwapActions, KvCursorStore,
    KvStore, Notification, NotificationDecoder, NotificationEngine, NotificationId,
    NotificationPayload, NotificationPipeline, NotificationService, NotificationWorker,
    OperationActions, RealTimeDataActions, Report, SessionActions, SessionPermission,
};

const PAGE_SIZE: usize = 3;

/// 内存版 Houston：按页返回游标之后的通知
struct InMemoryHouston {
    notifications: Vec<Notification>,
    confirmed: Mutex<Vec<NotificationId>>,
}

impl InMemoryHouston {
    fn new(count: NotificationId) -> Self {
        let notifications = (1..=count)
            .map(|id| {
                let payload = if id % 3 == 0 {
                    NotificationPayload::EventCommunication(EventKind::TaprootActivated)
                } else {
                    NotificationPayload::NoOp
                };
                Notification::new(id, id - 1, payload).with_sender("demo-session")
            })
            .collect();
        Self {
            notifications,
            confirmed: Mutex::new(Vec::new()),
        }
    }

    fn maximum_id(&self) -> NotificationId {
        self.notifications.last().map(|n| n.id).unwrap_or(0)
    }
}

#[async_trait]
impl NotificationService for InMemoryHouston {
    async fn fetch_report_after(&self, after: NotificationId) -> FetchOutcome {
        let preview: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.id > after)
            .take(PAGE_SIZE)
            .cloned()
            .collect();
        println!("  ↪ 拉取报告 after={} → {} 条", after, preview.len());
        FetchOutcome::Complete(Report {
            previous_id: after,
            maximum_id: self.maximum_id(),
            preview,
        })
    }

    async fn confirm_delivery_until(&self, until: NotificationId, device: &DeviceInfo) -> wallet_sdk::Result<()> {
        println!("  ↪ 确认送达 until={} (app_status={})", until, device.app_status.as_str());
        self.confirmed.lock().push(until);
        Ok(())
    }

    async fn fetch_notification(&self, id: NotificationId) -> wallet_sdk::Result<Notification> {
        self.notifications
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| wallet_sdk::WalletSDKError::InvalidArgument(format!("notification {} not found", id)))
    }
}

/// 只打印副作用的协作者
struct PrintingActions;

#[async_trait]
impl SessionActions for PrintingActions {
    async fn session_status(&self) -> Option<SessionPermission> {
        Some(SessionPermission::LoggedIn)
    }

    async fn email_authorized(&self) -> wallet_sdk::Result<()> {
        println!("  ✉️ 邮箱已授权");
        Ok(())
    }

    async fn authorize_rc_sign_in(&self) -> wallet_sdk::Result<()> {
        println!("  🔑 恢复码登录已授权");
        Ok(())
    }

    async fn verify_password_change(&self, authorized: bool) -> wallet_sdk::Result<()> {
        println!("  🔑 密码修改验证: {}", authorized);
        Ok(())
    }
}

#[async_trait]
impl OperationActions for PrintingActions {
    async fn received_new_operation(&self, new_operation: &NewOperation) -> wallet_sdk::Result<()> {
        println!("  💰 新操作: {}", new_operation.operation.request_id);
        Ok(())
    }

    async fn operation_updated(&self, update: &OperationUpdate) -> wallet_sdk::Result<()> {
        println!("  💰 操作更新: {:?}", update.status);
        Ok(())
    }
}

#[async_trait]
impl IncomingSwapActions for PrintingActions {
    async fn fulfill(&self, uuid: &str) -> wallet_sdk::Result<()> {
        println!("  ⚡ 履约入账交换: {}", uuid);
        Ok(())
    }
}

#[async_trait]
impl RealTimeDataActions for PrintingActions {
    async fn refresh(&self, force_update: bool) -> wallet_sdk::Result<()> {
        println!("  📈 刷新实时数据 (force={})", force_update);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("\n==============================================");
    println!("📨 通知管线演示 ({})", wallet_sdk::version_summary());
    println!("==============================================\n");

    let data_dir = std::env::temp_dir().join("wallet-sdk-push-demo");
    let kv = Arc::new(KvStore::new(&data_dir).await?);
    let cursor_store = Arc::new(KvCursorStore::new(kv));
    cursor_store.reset().await?;

    let houston = Arc::new(InMemoryHouston::new(8));
    let actions = Arc::new(PrintingActions);
    let handler_ctx = HandlerContext::new(actions.clone(), actions.clone(), actions.clone(), actions);
    let device = Arc::new(DeviceInfoState::new("demo-phone", "17.0"));

    let engine = NotificationEngine::new(
        cursor_store.clone(),
        houston.clone(),
        handler_ctx,
        device,
        FetchRetryConfig::default(),
    );
    let worker = Arc::new(NotificationWorker::spawn(engine, 8));
    let pipeline = NotificationPipeline::new(NotificationDecoder::default(), houston.clone(), worker.clone());

    // 场景 1: 推送只带来了 4..=5，本地游标为 0，需要先回拉 1..=3
    println!("场景 1: 有间隙的推送");
    let payload = json!({
        "aps": {"alert": {
            "previousId": 3,
            "maximumId": 8,
            "preview": [
                {"id": 4, "previousId": 3, "senderSessionUuid": "demo-session", "messageType": "no-op", "message": {}},
                {"id": 5, "previousId": 4, "senderSessionUuid": "demo-session", "messageType": "no-op", "message": {}}
            ]
        }}
    });
    let result = pipeline.handle_push(&payload).await;
    println!("  结果: {:?}\n", result);

    // 场景 2: 空预览的推送，只解析一条用于展示
    println!("场景 2: 解析展示用的通知");
    let shown = pipeline.resolve_push_preview(&Report::empty(7, 8)).await?;
    println!("  展示: {:?}\n", shown.map(|n| n.message.message_type().to_string()));

    // 场景 3: 已是最新，轮询不会应用任何东西
    println!("场景 3: 拉取式重同步");
    let result = pipeline.poll().await;
    println!("  结果: {:?}", result);
    println!("  游标: {}", cursor_store.get().await?);
    println!("  已确认: {:?}", houston.confirmed.lock().clone());

    worker.shutdown().await;

    println!("\n==============================================");
    println!("✅ 演示完成");
    println!("==============================================\n");
    Ok(())
}
