//! 测试用的协作者替身

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

use crate::error::{Result, WalletSDKError};
use crate::notifications::cursor_store::{CursorStore, KvCursorStore};
use crate::notifications::engine::NotificationEngine;
use crate::notifications::handler::{
    HandlerContext, IncomingSwapActions, OperationActions, RealTimeDataActions, SessionActions,
    SessionPermission,
};
use crate::notifications::model::{
    NewOperation, Notification, NotificationId, NotificationPayload, OperationUpdate, Report,
};
use crate::notifications::retry::FetchRetryConfig;
use crate::notifications::service::{DeviceInfo, DeviceInfoState, FetchOutcome, NotificationService};
use crate::notifications::CycleResult;
use crate::storage::KvStore;

pub(crate) fn noop(id: NotificationId, previous_id: NotificationId) -> Notification {
    Notification::new(id, previous_id, NotificationPayload::NoOp).with_sender("session-test")
}

pub(crate) fn new_operation(id: NotificationId, previous_id: NotificationId) -> Notification {
    let new_op: NewOperation = serde_json::from_value(json!({
        "operation": {
            "id": id,
            "requestId": format!("req-{}", id),
            "isExternal": false,
            "direction": "INCOMING",
            "amount": {
                "inSatoshis": 1_000,
                "inInputCurrency": {"amount": "1000", "currency": "BTC"},
                "inPrimaryCurrency": {"amount": "0.5", "currency": "USD"}
            },
            "fee": {
                "inSatoshis": 0,
                "inInputCurrency": {"amount": "0", "currency": "BTC"},
                "inPrimaryCurrency": {"amount": "0", "currency": "USD"}
            },
            "status": "BROADCASTED",
            "creationDate": "2022-01-01T00:00:00Z"
        },
        "nextTransactionSize": {"sizeProgression": [], "expectedDebtInSat": 0}
    }))
    .expect("valid operation fixture");

    Notification::new(id, previous_id, NotificationPayload::NewOperation(new_op)).with_sender("session-test")
}

pub(crate) trait CycleResultExt {
    fn reason_contains(&self, needle: &str) -> bool;
}

impl CycleResultExt for CycleResult {
    fn reason_contains(&self, needle: &str) -> bool {
        match self {
            CycleResult::Failed { reason, .. } => reason.contains(needle),
            CycleResult::Completed(_) => false,
        }
    }
}

/// 按脚本返回结果的服务端替身；脚本耗尽后返回失败
#[derive(Default)]
pub(crate) struct ScriptedService {
    script: Mutex<VecDeque<FetchOutcome>>,
    fetches: Mutex<Vec<NotificationId>>,
    confirms: Mutex<Vec<NotificationId>>,
    confirm_devices: Mutex<Vec<DeviceInfo>>,
    fail_confirms: AtomicBool,
    notifications: Mutex<HashMap<NotificationId, Notification>>,
}

impl ScriptedService {
    pub(crate) fn push_ok(&self, report: Report) {
        self.script.lock().push_back(FetchOutcome::Complete(report));
    }

    pub(crate) fn push_partial(&self, report: Report) {
        self.script.lock().push_back(FetchOutcome::Partial {
            report,
            error: WalletSDKError::Transport("connection reset mid-body".into()),
        });
    }

    pub(crate) fn push_err(&self) {
        self.script
            .lock()
            .push_back(FetchOutcome::Failed(WalletSDKError::Timeout("scripted".into())));
    }

    pub(crate) fn push_rejected(&self, status: u16) {
        self.script.lock().push_back(FetchOutcome::Failed(WalletSDKError::Http {
            status,
            body: "rejected".into(),
        }));
    }

    pub(crate) fn fail_confirms(&self) {
        self.fail_confirms.store(true, Ordering::SeqCst);
    }

    pub(crate) fn insert_notification(&self, notification: Notification) {
        self.notifications.lock().insert(notification.id, notification);
    }

    pub(crate) fn fetches(&self) -> Vec<NotificationId> {
        self.fetches.lock().clone()
    }

    pub(crate) fn confirms(&self) -> Vec<NotificationId> {
        self.confirms.lock().clone()
    }

    pub(crate) fn confirm_devices(&self) -> Vec<DeviceInfo> {
        self.confirm_devices.lock().clone()
    }
}

#[async_trait]
impl NotificationService for ScriptedService {
    async fn fetch_report_after(&self, after: NotificationId) -> FetchOutcome {
        self.fetches.lock().push(after);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| FetchOutcome::Failed(WalletSDKError::Transport("script exhausted".into())))
    }

    async fn confirm_delivery_until(&self, until: NotificationId, device: &DeviceInfo) -> Result<()> {
        if self.fail_confirms.load(Ordering::SeqCst) {
            return Err(WalletSDKError::Http {
                status: 500,
                body: "confirm failed".into(),
            });
        }
        self.confirms.lock().push(until);
        self.confirm_devices.lock().push(device.clone());
        Ok(())
    }

    async fn fetch_notification(&self, id: NotificationId) -> Result<Notification> {
        self.notifications
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| WalletSDKError::Http {
                status: 404,
                body: format!("notification {} not found", id),
            })
    }
}

/// 记录副作用顺序的协作者替身
pub(crate) struct RecordingActions {
    events: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
    session: Mutex<Option<SessionPermission>>,
    fee_rate: Mutex<Option<f64>>,
}

impl Default for RecordingActions {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            session: Mutex::new(Some(SessionPermission::LoggedIn)),
            fee_rate: Mutex::new(None),
        }
    }
}

impl RecordingActions {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub(crate) fn fail_on(&self, event: &str) {
        *self.fail_on.lock() = Some(event.to_string());
    }

    pub(crate) fn clear_failure(&self) {
        *self.fail_on.lock() = None;
    }

    pub(crate) fn set_session(&self, level: Option<SessionPermission>) {
        *self.session.lock() = level;
    }

    pub(crate) fn set_fee_rate(&self, fee_rate: f64) {
        *self.fee_rate.lock() = Some(fee_rate);
    }

    fn record(&self, event: String) -> Result<()> {
        if self.fail_on.lock().as_deref() == Some(event.as_str()) {
            return Err(WalletSDKError::handler(format!("{} failed", event)));
        }
        self.events.lock().push(event);
        Ok(())
    }
}

#[async_trait]
impl SessionActions for RecordingActions {
    async fn session_status(&self) -> Option<SessionPermission> {
        *self.session.lock()
    }

    async fn email_authorized(&self) -> Result<()> {
        self.record("email_authorized".into())
    }

    async fn authorize_rc_sign_in(&self) -> Result<()> {
        self.record("authorize_rc_sign_in".into())
    }

    async fn verify_password_change(&self, authorized: bool) -> Result<()> {
        self.record(format!("verify_password_change:{}", authorized))
    }
}

#[async_trait]
impl OperationActions for RecordingActions {
    async fn received_new_operation(&self, new_operation: &NewOperation) -> Result<()> {
        self.record(format!("operation:{}", new_operation.operation.request_id))
    }

    async fn operation_updated(&self, update: &OperationUpdate) -> Result<()> {
        self.record(format!("update:{}", update.id))
    }
}

#[async_trait]
impl IncomingSwapActions for RecordingActions {
    async fn fulfill(&self, uuid: &str) -> Result<()> {
        self.record(format!("fulfill:{}", uuid))
    }
}

#[async_trait]
impl RealTimeDataActions for RecordingActions {
    async fn refresh(&self, force_update: bool) -> Result<()> {
        self.record(format!("refresh:{}", force_update))
    }

    async fn current_fee_rate(&self) -> Option<f64> {
        *self.fee_rate.lock()
    }
}

/// 引擎测试夹具：sled 游标 + 脚本服务 + 记录型协作者
pub(crate) struct Fixture {
    _dir: TempDir,
    pub(crate) cursor_store: Arc<KvCursorStore>,
    pub(crate) service: Arc<ScriptedService>,
    pub(crate) actions: Arc<RecordingActions>,
    pub(crate) device: Arc<DeviceInfoState>,
}

impl Fixture {
    pub(crate) async fn new(cursor: NotificationId) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let kv = Arc::new(KvStore::new(dir.path()).await.expect("kv store"));
        let cursor_store = Arc::new(KvCursorStore::new(kv));
        if cursor > 0 {
            cursor_store.set(cursor).await.expect("seed cursor");
        }

        Self {
            _dir: dir,
            cursor_store,
            service: Arc::new(ScriptedService::default()),
            actions: Arc::new(RecordingActions::default()),
            device: Arc::new(DeviceInfoState::new("test-device", "1.0")),
        }
    }

    pub(crate) fn handler_ctx(&self) -> HandlerContext {
        HandlerContext::new(
            self.actions.clone(),
            self.actions.clone(),
            self.actions.clone(),
            self.actions.clone(),
        )
    }

    pub(crate) fn engine(&self) -> NotificationEngine {
        NotificationEngine::new(
            self.cursor_store.clone(),
            self.service.clone(),
            self.handler_ctx(),
            self.device.clone(),
            FetchRetryConfig::immediate(5),
        )
    }

    pub(crate) async fn cursor(&self) -> NotificationId {
        self.cursor_store.get().await.expect("read cursor")
    }
}
