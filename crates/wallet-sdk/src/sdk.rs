//! SDK 主入口：配置与门面
//!
//! `WalletSDK` 把存储、Houston 客户端、同步引擎、串行 worker 和生命周期 Hook 组装在一起，
//! 平台层只需要交来推送负载和前后台事件。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::error::{Result, WalletSDKError};
use crate::http_client::HoustonClient;
use crate::lifecycle::{LifecycleManager, NotificationLifecycleHook};
use crate::notifications::cursor_store::{CursorStore, KvCursorStore};
use crate::notifications::decoder::{NotificationDecoder, OperationMetadataDecrypter};
use crate::notifications::engine::NotificationEngine;
use crate::notifications::handler::HandlerContext;
use crate::notifications::model::{Notification, NotificationId, Report};
use crate::notifications::pipeline::NotificationPipeline;
use crate::notifications::retry::FetchRetryConfig;
use crate::notifications::service::{DeviceInfoState, NotificationService};
use crate::notifications::worker::NotificationWorker;
use crate::notifications::{CycleResult, CycleSummary};
use crate::storage::KvStore;

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
        }
    }
}

/// Wallet SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// 数据存储目录
    pub data_dir: PathBuf,
    /// Houston 服务基础 URL
    pub houston_url: String,
    /// `X-Client-Type` 请求头
    pub client_type: String,
    /// `X-Client-Language` 请求头
    pub client_language: String,
    /// HTTP 客户端配置
    pub http_client_config: HttpClientConfig,
    /// 报告拉取的重试策略
    pub fetch_retry: FetchRetryConfig,
    /// 周期性重同步间隔（秒）；None 表示只靠推送和前台事件
    pub poll_interval_secs: Option<u64>,
    /// 串行 worker 的队列长度
    pub worker_queue_size: usize,
    /// 送达确认附带的机型；None 时使用平台信息
    pub device_model: Option<String>,
    /// 送达确认附带的系统版本；None 时使用平台信息
    pub os_version: Option<String>,
    /// 调试模式
    pub debug_mode: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            data_dir: get_default_data_dir(),
            houston_url: "https://pub.api.muun.io/houston".to_string(),
            client_type: "FALCON".to_string(),
            client_language: "en".to_string(),
            http_client_config: HttpClientConfig::default(),
            fetch_retry: FetchRetryConfig::default(),
            poll_interval_secs: None,
            worker_queue_size: 32,
            device_model: None,
            os_version: None,
            debug_mode: false,
        }
    }
}

/// 获取默认数据目录 ~/.wallet-sdk/
fn get_default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".wallet-sdk")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        home_dir.join(".wallet-sdk")
    } else {
        PathBuf::from(".wallet-sdk")
    }
}

fn platform_info() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

impl WalletConfig {
    pub fn builder() -> WalletConfigBuilder {
        WalletConfigBuilder::new()
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.houston_url.trim().is_empty() {
            return Err(WalletSDKError::Config("Houston URL 不能为空".to_string()));
        }

        if self.fetch_retry.max_attempts == 0 {
            return Err(WalletSDKError::Config("最大拉取尝试次数不能为0".to_string()));
        }

        if self.worker_queue_size == 0 {
            return Err(WalletSDKError::Config("worker 队列长度不能为0".to_string()));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(WalletSDKError::Config("数据目录不能为空".to_string()));
        }

        if self.poll_interval_secs == Some(0) {
            return Err(WalletSDKError::Config("轮询间隔不能为0".to_string()));
        }

        Ok(())
    }
}

/// Wallet SDK 配置构建器
pub struct WalletConfigBuilder {
    config: WalletConfig,
}

impl WalletConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: WalletConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn houston_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.houston_url = url.into();
        self
    }

    pub fn client_type<S: Into<String>>(mut self, client_type: S) -> Self {
        self.config.client_type = client_type.into();
        self
    }

    pub fn client_language<S: Into<String>>(mut self, language: S) -> Self {
        self.config.client_language = language.into();
        self
    }

    /// 设置 HTTP 客户端配置
    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    /// 设置报告拉取的重试策略
    pub fn fetch_retry(mut self, retry: FetchRetryConfig) -> Self {
        self.config.fetch_retry = retry;
        self
    }

    /// 启用周期性重同步
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = Some(secs);
        self
    }

    pub fn worker_queue_size(mut self, size: usize) -> Self {
        self.config.worker_queue_size = size;
        self
    }

    pub fn device<S: Into<String>>(mut self, model: S, os_version: S) -> Self {
        self.config.device_model = Some(model.into());
        self.config.os_version = Some(os_version.into());
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    pub fn build(self) -> WalletConfig {
        self.config
    }
}

impl Default for WalletConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 统一 SDK 主接口
pub struct WalletSDK {
    config: WalletConfig,
    kv: Arc<KvStore>,
    cursor_store: Arc<KvCursorStore>,
    /// 测试中可能换成其它服务实现，此时为 None
    houston: Option<Arc<HoustonClient>>,
    pipeline: NotificationPipeline,
    device: Arc<DeviceInfoState>,
    lifecycle_manager: RwLock<LifecycleManager>,
    shutting_down: AtomicBool,
}

impl WalletSDK {
    /// 初始化 SDK
    ///
    /// 需要在 tokio 运行时内调用；`handler_ctx` 提供处理通知时用到的全部协作者。
    pub async fn initialize(
        config: WalletConfig,
        handler_ctx: HandlerContext,
        decrypter: Option<Arc<dyn OperationMetadataDecrypter>>,
    ) -> Result<Arc<Self>> {
        info!("正在初始化 WalletSDK...");
        config.validate()?;

        let decoder = NotificationDecoder::new(decrypter);
        let houston = Arc::new(HoustonClient::from_config(&config, decoder.clone())?);

        Self::assemble(config, houston.clone(), Some(houston), handler_ctx, decoder).await
    }

    async fn assemble(
        config: WalletConfig,
        service: Arc<dyn NotificationService>,
        houston: Option<Arc<HoustonClient>>,
        handler_ctx: HandlerContext,
        decoder: NotificationDecoder,
    ) -> Result<Arc<Self>> {
        // === 第1层：游标存储 ===
        let kv = Arc::new(KvStore::new(&config.data_dir).await?);
        let cursor_store = Arc::new(KvCursorStore::new(kv.clone()));
        info!("游标存储初始化完成: cursor={}", cursor_store.get().await?);

        // === 第2层：同步引擎 + 串行 worker ===
        let device = Arc::new(DeviceInfoState::new(
            config.device_model.clone().unwrap_or_else(platform_info),
            config.os_version.clone().unwrap_or_else(platform_info),
        ));
        let engine = NotificationEngine::new(
            cursor_store.clone(),
            service.clone(),
            handler_ctx,
            device.clone(),
            config.fetch_retry.clone(),
        );
        let worker = Arc::new(NotificationWorker::spawn(engine, config.worker_queue_size));
        if let Some(secs) = config.poll_interval_secs {
            worker.start_periodic_poll(Duration::from_secs(secs));
        }
        info!("通知 worker 初始化完成");

        // === 第3层：生命周期管理器 ===
        let mut lifecycle_manager = LifecycleManager::new();
        lifecycle_manager.register_hook(Arc::new(NotificationLifecycleHook::new(
            worker.clone(),
            device.clone(),
        )));

        let pipeline = NotificationPipeline::new(decoder, service, worker);

        info!("✅ WalletSDK 初始化完成: data_dir={}", config.data_dir.display());
        Ok(Arc::new(Self {
            config,
            kv,
            cursor_store,
            houston,
            pipeline,
            device,
            lifecycle_manager: RwLock::new(lifecycle_manager),
            shutting_down: AtomicBool::new(false),
        }))
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn kv_store(&self) -> &Arc<KvStore> {
        &self.kv
    }

    pub fn device_info(&self) -> &Arc<DeviceInfoState> {
        &self.device
    }

    fn check_running(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(WalletSDKError::ShuttingDown("WalletSDK 已关闭".to_string()));
        }
        Ok(())
    }

    fn rejected(&self) -> Option<CycleResult> {
        self.check_running().err().map(|e| CycleResult::Failed {
            summary: CycleSummary::default(),
            reason: e.to_string(),
        })
    }

    /// 处理平台层交来的推送负载，返回该周期的终态
    pub async fn handle_push(&self, payload: &Value) -> CycleResult {
        if let Some(rejected) = self.rejected() {
            return rejected;
        }
        self.pipeline.handle_push(payload).await
    }

    /// 从当前游标拉取式重同步
    pub async fn poll(&self) -> CycleResult {
        if let Some(rejected) = self.rejected() {
            return rejected;
        }
        self.pipeline.poll().await
    }

    /// 取一条可展示的通知（预览为空时向服务端单独拉取）
    pub async fn resolve_push_preview(&self, report: &Report) -> Result<Option<Notification>> {
        self.check_running()?;
        self.pipeline.resolve_push_preview(report).await
    }

    /// 订阅所有周期的终态
    pub fn subscribe(&self) -> broadcast::Receiver<CycleResult> {
        self.pipeline.worker().subscribe()
    }

    /// 当前持久化游标
    pub async fn notification_cursor(&self) -> Result<NotificationId> {
        self.cursor_store.get().await
    }

    /// 重置游标（全量数据清除时调用）
    pub async fn reset_notification_cursor(&self) -> Result<()> {
        self.cursor_store.reset().await?;
        info!("🧹 通知游标已重置");
        Ok(())
    }

    /// 设置（或清除）Houston 会话令牌
    pub fn set_session_token(&self, token: Option<String>) {
        match &self.houston {
            Some(houston) => houston.set_session_token(token),
            None => warn!("⚠️ 当前通知服务不是 Houston 客户端，忽略会话令牌"),
        }
    }

    /// App 切换到前台
    pub async fn on_foreground(&self) -> Result<()> {
        self.check_running()?;
        self.lifecycle_manager.read().await.notify_foreground().await
    }

    /// App 切换到后台
    pub async fn on_background(&self) -> Result<()> {
        self.check_running()?;
        self.lifecycle_manager.read().await.notify_background().await
    }

    /// 关闭 SDK：等待正在执行的周期结束
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("正在关闭 WalletSDK...");
        self.pipeline.worker().shutdown().await;
        info!("WalletSDK 关闭完成");
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}
