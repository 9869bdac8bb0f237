//! 通知数据模型
//!
//! `Notification` 是短暂的：由解码器从线上字节构造，被同步引擎消费一次后丢弃，
//! 只有它的 `id` 会以游标的形式持久化。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 服务端按会话分配的严格递增通知 ID
pub type NotificationId = u64;

/// 单条通知
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub previous_id: NotificationId,
    pub sender_session_uuid: String,
    pub message: NotificationPayload,
}

impl Notification {
    pub fn new(id: NotificationId, previous_id: NotificationId, message: NotificationPayload) -> Self {
        Self {
            id,
            previous_id,
            sender_session_uuid: String::new(),
            message,
        }
    }

    pub fn with_sender(mut self, sender_session_uuid: impl Into<String>) -> Self {
        self.sender_session_uuid = sender_session_uuid.into();
        self
    }
}

/// 通知负载（封闭的和类型）
///
/// 新增服务端消息类型时必须在这里加一个分支，处理器解析处的穷尽匹配会在编译期提醒。
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationPayload {
    SessionAuthorized,
    NewOperation(NewOperation),
    OperationUpdate(OperationUpdate),
    FulfillIncomingSwap { uuid: String },
    VerifiedEmail,
    UpdateAuthorizeChallenge,
    AuthorizeRcSignIn,
    EventCommunication(EventKind),
    NoOp,
    /// 当前客户端版本无法识别的消息类型
    UnknownMessage(String),

    // 以下为前向兼容的消息类型：可被接受，但在本客户端版本上没有动作
    NewContact,
    ExpiredSession,
    UpdateContact,
    CompletePairingAck,
    AddHardwareWallet,
    WithdrawalResult,
    GetSatelliteState,
}

impl NotificationPayload {
    /// 线上 `messageType` 字符串
    pub fn message_type(&self) -> &str {
        match self {
            NotificationPayload::SessionAuthorized => "sessions/authorized",
            NotificationPayload::NewOperation(_) => "operation/new",
            NotificationPayload::OperationUpdate(_) => "operations/update",
            NotificationPayload::FulfillIncomingSwap { .. } => "incoming_swap/fulfill",
            NotificationPayload::VerifiedEmail => "users/email_verified",
            NotificationPayload::UpdateAuthorizeChallenge => "challenge/update/authorize",
            NotificationPayload::AuthorizeRcSignIn => "authorize_rc_signin",
            NotificationPayload::EventCommunication(_) => "event_communication",
            NotificationPayload::NoOp => "no-op",
            NotificationPayload::UnknownMessage(raw) => raw.as_str(),
            NotificationPayload::NewContact => "contact/new",
            NotificationPayload::ExpiredSession => "session/expired",
            NotificationPayload::UpdateContact => "contact/update",
            NotificationPayload::CompletePairingAck => "satellite/completePairingAck",
            NotificationPayload::AddHardwareWallet => "satellite/addHardwareWallet",
            NotificationPayload::WithdrawalResult => "satellite/withdrawalResult",
            NotificationPayload::GetSatelliteState => "satellite/getState",
        }
    }
}

/// 通知报告：`maximum_id` 可能大于 `preview` 中最后一个 ID（预览被截断）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Report {
    pub previous_id: NotificationId,
    pub maximum_id: NotificationId,
    pub preview: Vec<Notification>,
}

impl Report {
    pub fn empty(previous_id: NotificationId, maximum_id: NotificationId) -> Self {
        Self {
            previous_id,
            maximum_id,
            preview: Vec::new(),
        }
    }

    pub fn last_id(&self) -> Option<NotificationId> {
        self.preview.last().map(|n| n.id)
    }
}

/// 服务端推送的事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    TaprootActivated,
    TaprootPreactivation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOperation {
    pub operation: Operation,
    pub next_transaction_size: NextTransactionSize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationUpdate {
    pub id: i64,
    pub confirmations: i64,
    pub status: OperationStatus,
    #[serde(default)]
    pub hash: Option<String>,
    pub next_transaction_size: NextTransactionSize,
    #[serde(default)]
    pub swap_details: Option<SubmarineSwap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationDirection {
    Incoming,
    Outgoing,
    Cyclical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Created,
    Signing,
    Signed,
    Broadcasted,
    SwapPending,
    SwapOpeningChannel,
    SwapWaitingChannel,
    SwapRouting,
    SwapPayed,
    SwapFailed,
    SwapExpired,
    Confirmed,
    Settled,
    Dropped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonetaryAmount {
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitcoinAmount {
    pub in_satoshis: i64,
    pub in_input_currency: MonetaryAmount,
    pub in_primary_currency: MonetaryAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    #[serde(default)]
    pub confirmations: i64,
}

/// 操作元数据（解密后的 sender/receiver metadata）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetadata {
    #[serde(default)]
    pub lnurl_sender: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub invoice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub id: Option<i64>,
    pub request_id: String,
    #[serde(default)]
    pub is_external: bool,
    pub direction: OperationDirection,
    pub amount: BitcoinAmount,
    pub fee: BitcoinAmount,
    #[serde(default)]
    pub confirmations: Option<i64>,
    #[serde(default)]
    pub exchange_rates_window_id: i64,
    pub status: OperationStatus,
    #[serde(default)]
    pub transaction: Option<Transaction>,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub swap: Option<SubmarineSwap>,
    #[serde(default)]
    pub incoming_swap: Option<IncomingSwap>,
    /// 明文描述（旧字段），解密出的描述会覆盖它
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sender_metadata: Option<String>,
    #[serde(default)]
    pub receiver_metadata: Option<String>,
    /// 解码时由解密器填充，不参与序列化
    #[serde(skip)]
    pub metadata: Option<OperationMetadata>,
}

impl Operation {
    /// 需要解密的元数据字段：收款方向读 receiver，其余读 sender
    pub fn encrypted_metadata(&self) -> Option<&str> {
        match self.direction {
            OperationDirection::Incoming => self.receiver_metadata.as_deref(),
            _ => self.sender_metadata.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineSwapReceiver {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub network_addresses: Vec<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineSwapFees {
    pub lightning_in_sats: i64,
    pub sweep_in_sats: i64,
    #[serde(default)]
    pub channel_open_in_sats: i64,
    #[serde(default)]
    pub channel_close_in_sats: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestRouteFees {
    pub max_capacity_in_sat: i64,
    pub proportional_millionth: i64,
    pub base_in_sat: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingOutputPolicies {
    pub maximum_debt_in_sat: i64,
    pub potential_collect_in_sat: i64,
    pub max_amount_in_sat_for0_conf: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineSwap {
    pub swap_uuid: String,
    pub invoice: String,
    pub receiver: SubmarineSwapReceiver,
    #[serde(default)]
    pub fees: Option<SubmarineSwapFees>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub will_pre_open_channel: bool,
    #[serde(default)]
    pub best_route_fees: Option<Vec<BestRouteFees>>,
    #[serde(default)]
    pub funding_output_policies: Option<FundingOutputPolicies>,
    #[serde(default)]
    pub payed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preimage_in_hex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingSwap {
    pub uuid: String,
    #[serde(default)]
    pub payment_hash: Option<String>,
    #[serde(default)]
    pub collect_in_sats: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeForAmount {
    pub amount_in_satoshis: i64,
    /// 实际单位是 weight unit，除以 4 得到 vbytes
    pub size_in_bytes: i64,
    #[serde(default)]
    pub outpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextTransactionSize {
    #[serde(default)]
    pub size_progression: Vec<SizeForAmount>,
    #[serde(default)]
    pub valid_at_operation_hid: Option<i64>,
    #[serde(default)]
    pub expected_debt_in_sat: i64,
}

impl NextTransactionSize {
    /// 全部 UTXO 的总金额
    pub fn total_balance(&self) -> i64 {
        self.size_progression
            .last()
            .map(|s| s.amount_in_satoshis)
            .unwrap_or(0)
    }
}
