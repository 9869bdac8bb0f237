//! Wallet SDK - 钱包通知同步与处理管线
//!
//! 本 SDK 负责把服务端下发的有序事件流安全地应用到本地：
//! - 📨 解码推送负载（三种历史形态）和 Houston 报告
//! - 🔁 检测间隙，按持久化游标重新拉取，带退避的有界重试
//! - ✅ 严格按 ID 升序、逐条、恰好一次地执行处理器
//! - 🔐 按会话权限级别过滤通知
//! - 📬 游标前进后向服务端确认送达
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use wallet_sdk::{HandlerContext, WalletConfig, WalletSDK};
//!
//! # async fn run(handler_ctx: HandlerContext, payload: serde_json::Value) -> wallet_sdk::Result<()> {
//! let config = WalletConfig::builder()
//!     .data_dir("/path/to/data")
//!     .houston_url("https://houston.example.com/houston")
//!     .poll_interval_secs(300)
//!     .build();
//!
//! let sdk = WalletSDK::initialize(config, handler_ctx, None).await?;
//! sdk.set_session_token(Some("token".to_string()));
//!
//! // 平台层交来的推送
//! let result = sdk.handle_push(&payload).await;
//! println!("cycle completed: {}", result.is_completed());
//!
//! sdk.shutdown().await?;
//! # Ok(())
//! # }
//! ```

// 导出核心模块
pub mod error;
pub mod version;
pub mod storage;
pub mod notifications;
pub mod settlement;
pub mod http_client;
pub mod lifecycle;
pub mod sdk;

// 重新导出核心类型，方便使用
pub use error::{Result, WalletSDKError};
pub use sdk::{HttpClientConfig, WalletConfig, WalletConfigBuilder, WalletSDK};
pub use http_client::HoustonClient;
pub use lifecycle::{LifecycleHook, LifecycleManager};
pub use notifications::{
    AppStatus, CursorStore, CycleResult, CycleSummary, CycleTrigger, DeviceInfo,
    FetchOutcome, FetchRetryConfig, HandlerContext, IncomingSwapActions, KvCursorStore,
    Notification, NotificationDecoder, NotificationEngine, NotificationId, NotificationPayload,
    NotificationPipeline, NotificationService, NotificationWorker, OperationActions,
    OperationMetadataDecrypter, RealTimeDataActions, Report, SessionActions, SessionPermission,
};
pub use settlement::{DefaultSwapFeeCalculator, SwapFeeCalculator, SwapFees};
pub use storage::KvStore;
pub use version::{SDK_VERSION, version_summary};
