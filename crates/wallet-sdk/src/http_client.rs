//! HTTP 客户端模块 - Houston 通知接口
//!
//! 基于 reqwest，实现 `NotificationService`：
//! - `GET /sessions/notification_report?after={id}` 拉取报告
//! - `PUT /sessions/notifications/confirm?until=...` 确认送达（空请求体）
//! - `GET /sessions/notifications/{id}` 拉取单条通知

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::{debug, error, info};

use crate::error::{Result, WalletSDKError};
use crate::notifications::decoder::NotificationDecoder;
use crate::notifications::model::{Notification, NotificationId};
use crate::notifications::service::{DeviceInfo, FetchOutcome, NotificationService};
use crate::sdk::{HttpClientConfig, WalletConfig};
use crate::version::SDK_VERSION;

pub struct HoustonClient {
    client: Client,
    base_url: String,
    client_type: String,
    client_language: String,
    session_token: RwLock<Option<String>>,
    decoder: NotificationDecoder,
}

impl HoustonClient {
    /// 创建新的 Houston 客户端
    pub fn new(
        config: &HttpClientConfig,
        base_url: impl Into<String>,
        client_type: impl Into<String>,
        client_language: impl Into<String>,
        decoder: NotificationDecoder,
    ) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| WalletSDKError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("✅ Houston 客户端已创建 (base_url: {})", base_url);

        Ok(Self {
            client,
            base_url,
            client_type: client_type.into(),
            client_language: client_language.into(),
            session_token: RwLock::new(None),
            decoder,
        })
    }

    pub fn from_config(config: &WalletConfig, decoder: NotificationDecoder) -> Result<Self> {
        Self::new(
            &config.http_client_config,
            config.houston_url.clone(),
            config.client_type.clone(),
            config.client_language.clone(),
            decoder,
        )
    }

    /// 设置（或清除）会话令牌
    pub fn set_session_token(&self, token: Option<String>) {
        *self.session_token.write() = token;
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .client
            .request(method, url)
            .header("X-Client-Version", SDK_VERSION)
            .header("X-Client-Type", &self.client_type)
            .header("X-Client-Language", &self.client_language)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json");

        if let Some(token) = self.session_token.read().as_ref() {
            builder = builder.header("Authorization", token);
        }
        builder
    }

    /// 非 2xx 响应映射为 `Http` 错误
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "无法读取错误信息".to_string());
        error!("❌ Houston 请求失败，HTTP 状态码: {}, 错误: {}", status, body);
        Err(WalletSDKError::Http {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_report_bytes(&self, after: NotificationId) -> Result<Vec<u8>> {
        let mut request = self.request(Method::GET, "/sessions/notification_report");
        if after > 0 {
            request = request.query(&[("after", after)]);
        }

        let response = Self::check_status(request.send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl NotificationService for HoustonClient {
    async fn fetch_report_after(&self, after: NotificationId) -> FetchOutcome {
        let bytes = match self.fetch_report_bytes(after).await {
            Ok(bytes) => bytes,
            Err(e) => return FetchOutcome::Failed(e),
        };

        match self.decoder.decode_report_lenient(&bytes) {
            Ok((report, None)) => FetchOutcome::Complete(report),
            Ok((report, Some(error))) => FetchOutcome::Partial { report, error },
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    async fn confirm_delivery_until(&self, until: NotificationId, device: &DeviceInfo) -> Result<()> {
        let until = until.to_string();
        let request = self
            .request(Method::PUT, "/sessions/notifications/confirm")
            .query(&[
                ("until", until.as_str()),
                ("deviceModel", device.model.as_str()),
                ("osVersion", device.os_version.as_str()),
                ("appStatus", device.app_status.as_str()),
            ]);

        Self::check_status(request.send().await?).await?;
        debug!("送达确认完成: until={}", until);
        Ok(())
    }

    async fn fetch_notification(&self, id: NotificationId) -> Result<Notification> {
        let path = format!("/sessions/notifications/{}", id);
        let response = Self::check_status(self.request(Method::GET, &path).send().await?).await?;
        let bytes = response.bytes().await?;
        self.decoder.decode_notification(&bytes)
    }
}
