//! 通知处理器解析
//!
//! 负载类型到处理器的全映射。处理器 = 所需会话权限 + 一个有副作用的异步工作单元。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, WalletSDKError};
use crate::notifications::model::{NewOperation, Notification, NotificationPayload, OperationUpdate};
use crate::settlement::{FeeInfo, SwapFeeCalculator, SwapFees};

/// 会话权限等级（有序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPermission {
    Created,
    BlockedByEmail,
    AuthorizedByEmail,
    LoggedIn,
}

impl SessionPermission {
    /// 当前等级是否满足 `required`
    pub fn satisfies(self, required: SessionPermission) -> bool {
        required <= self
    }
}

/// 会话状态协作者
#[async_trait]
pub trait SessionActions: Send + Sync {
    /// 当前会话等级；没有会话时返回 `None`
    async fn session_status(&self) -> Option<SessionPermission>;

    async fn has_permission_for(&self, required: SessionPermission) -> bool {
        match self.session_status().await {
            Some(current) => current.satisfies(required),
            None => false,
        }
    }

    async fn email_authorized(&self) -> Result<()>;

    async fn authorize_rc_sign_in(&self) -> Result<()>;

    async fn verify_password_change(&self, authorized: bool) -> Result<()>;
}

/// 操作（交易）协作者
#[async_trait]
pub trait OperationActions: Send + Sync {
    async fn received_new_operation(&self, new_operation: &NewOperation) -> Result<()>;

    async fn operation_updated(&self, update: &OperationUpdate) -> Result<()>;
}

/// 入账交换协作者
#[async_trait]
pub trait IncomingSwapActions: Send + Sync {
    async fn fulfill(&self, uuid: &str) -> Result<()>;
}

/// 汇率/费率实时数据协作者
#[async_trait]
pub trait RealTimeDataActions: Send + Sync {
    async fn refresh(&self, force_update: bool) -> Result<()>;

    /// 当前链上费率（sat/vbyte），未知时返回 `None`
    async fn current_fee_rate(&self) -> Option<f64> {
        None
    }
}

/// 处理器执行所需的协作者集合
#[derive(Clone)]
pub struct HandlerContext {
    pub session: Arc<dyn SessionActions>,
    pub operations: Arc<dyn OperationActions>,
    pub incoming_swaps: Arc<dyn IncomingSwapActions>,
    pub real_time_data: Arc<dyn RealTimeDataActions>,
    pub swap_fee_calculator: Option<Arc<dyn SwapFeeCalculator>>,
}

impl HandlerContext {
    pub fn new(
        session: Arc<dyn SessionActions>,
        operations: Arc<dyn OperationActions>,
        incoming_swaps: Arc<dyn IncomingSwapActions>,
        real_time_data: Arc<dyn RealTimeDataActions>,
    ) -> Self {
        Self {
            session,
            operations,
            incoming_swaps,
            real_time_data,
            swap_fee_calculator: None,
        }
    }

    pub fn with_swap_fee_calculator(mut self, calculator: Arc<dyn SwapFeeCalculator>) -> Self {
        self.swap_fee_calculator = Some(calculator);
        self
    }
}

/// 处理器要执行的动作
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerAction {
    EmailAuthorized,
    AuthorizeRcSignIn,
    ReceivedOperation(NewOperation),
    OperationUpdated(OperationUpdate),
    FulfillIncomingSwap(String),
    VerifyPasswordChange,
    RefreshRealTimeData,
    NoOp,
    /// 前向兼容：接受但不做任何事
    FutureCompat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationHandler {
    pub required_permission: Option<SessionPermission>,
    pub action: HandlerAction,
}

impl NotificationHandler {
    fn gated(required: SessionPermission, action: HandlerAction) -> Self {
        Self {
            required_permission: Some(required),
            action,
        }
    }

    fn open(action: HandlerAction) -> Self {
        Self {
            required_permission: None,
            action,
        }
    }

    pub async fn process(&self, ctx: &HandlerContext) -> Result<()> {
        match &self.action {
            HandlerAction::EmailAuthorized => ctx.session.email_authorized().await,
            HandlerAction::AuthorizeRcSignIn => ctx.session.authorize_rc_sign_in().await,
            HandlerAction::ReceivedOperation(new_operation) => {
                evaluate_settlement(ctx, new_operation).await;
                ctx.operations.received_new_operation(new_operation).await
            }
            HandlerAction::OperationUpdated(update) => ctx.operations.operation_updated(update).await,
            HandlerAction::FulfillIncomingSwap(uuid) => ctx.incoming_swaps.fulfill(uuid).await,
            HandlerAction::VerifyPasswordChange => ctx.session.verify_password_change(true).await,
            HandlerAction::RefreshRealTimeData => ctx.real_time_data.refresh(true).await,
            HandlerAction::NoOp | HandlerAction::FutureCompat => Ok(()),
        }
    }
}

/// 解析通知的处理器；未知消息类型在这里就失败
pub fn resolve_handler(notification: &Notification) -> Result<NotificationHandler> {
    use HandlerAction as A;
    use SessionPermission as P;

    let handler = match &notification.message {
        NotificationPayload::SessionAuthorized => NotificationHandler::gated(P::BlockedByEmail, A::EmailAuthorized),
        NotificationPayload::AuthorizeRcSignIn => {
            NotificationHandler::gated(P::BlockedByEmail, A::AuthorizeRcSignIn)
        }
        NotificationPayload::NewOperation(new_operation) => {
            NotificationHandler::gated(P::LoggedIn, A::ReceivedOperation(new_operation.clone()))
        }
        NotificationPayload::OperationUpdate(update) => {
            NotificationHandler::gated(P::LoggedIn, A::OperationUpdated(update.clone()))
        }
        NotificationPayload::FulfillIncomingSwap { uuid } => {
            NotificationHandler::gated(P::LoggedIn, A::FulfillIncomingSwap(uuid.clone()))
        }
        NotificationPayload::VerifiedEmail => NotificationHandler::gated(P::LoggedIn, A::EmailAuthorized),
        NotificationPayload::UpdateAuthorizeChallenge => {
            NotificationHandler::gated(P::LoggedIn, A::VerifyPasswordChange)
        }
        NotificationPayload::EventCommunication(_) => NotificationHandler::open(A::RefreshRealTimeData),
        NotificationPayload::NoOp => NotificationHandler::open(A::NoOp),
        NotificationPayload::NewContact
        | NotificationPayload::ExpiredSession
        | NotificationPayload::UpdateContact
        | NotificationPayload::CompletePairingAck
        | NotificationPayload::AddHardwareWallet
        | NotificationPayload::WithdrawalResult
        | NotificationPayload::GetSatelliteState => NotificationHandler::open(A::FutureCompat),
        NotificationPayload::UnknownMessage(raw_type) => {
            return Err(WalletSDKError::UnknownNotificationType {
                notification_id: notification.id,
                session_uuid: notification.sender_session_uuid.clone(),
                raw_type: raw_type.clone(),
            });
        }
    };

    Ok(handler)
}

/// 新操作携带海底交换时评估结算；余额不足只记录日志
async fn evaluate_settlement(ctx: &HandlerContext, new_operation: &NewOperation) {
    let Some(calculator) = &ctx.swap_fee_calculator else {
        return;
    };
    let Some(swap) = &new_operation.operation.swap else {
        return;
    };
    let Some(fee_rate) = ctx.real_time_data.current_fee_rate().await else {
        debug!("费率未知，跳过交换结算评估: swap_uuid={}", swap.swap_uuid);
        return;
    };

    let fee_info = FeeInfo {
        fee_rate,
        next_transaction_size: new_operation.next_transaction_size.clone(),
    };
    let amount = new_operation.operation.amount.in_satoshis;

    match calculator.compute_swap_fees(swap, amount, &fee_info) {
        SwapFees::Valid { total_fee, fee_rate, .. } => {
            info!(
                "交换结算评估: swap_uuid={}, amount={}, total_fee={}, fee_rate={}",
                swap.swap_uuid, amount, total_fee, fee_rate
            );
        }
        SwapFees::Invalid { amount_plus_fee } => {
            warn!(
                "⚠️ 余额不足以按当前费率覆盖交换费用: swap_uuid={}, amount_plus_fee={}",
                swap.swap_uuid, amount_plus_fee
            );
        }
    }
}
