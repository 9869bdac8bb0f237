//! SDK 生命周期管理
//!
//! 管理 App 前后台切换等一级生命周期事件，统一触发各模块的状态切换。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;

/// 生命周期回调 Hook
///
/// 各模块通过实现此 trait 来响应生命周期变化
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// App 切换到后台时调用
    async fn on_background(&self) -> Result<()>;

    /// App 切换到前台时调用
    async fn on_foreground(&self) -> Result<()>;
}

/// 生命周期管理器
pub struct LifecycleManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// 注册生命周期回调 Hook
    pub fn register_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
        info!("✅ 生命周期 Hook 已注册: 当前共 {} 个", self.hooks.len());
    }

    /// 通知所有 Hook：App 切换到后台
    ///
    /// 按注册顺序执行；某个 Hook 失败时记录错误并继续，最后返回第一个错误
    pub async fn notify_background(&self) -> Result<()> {
        info!("🔄 通知所有模块：App 切换到后台");

        let mut first_error = None;
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_background().await {
                warn!("⚠️ Hook #{} 后台切换失败: {}", index, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 通知所有 Hook：App 切换到前台
    pub async fn notify_foreground(&self) -> Result<()> {
        info!("🔄 通知所有模块：App 切换到前台");

        let mut first_error = None;
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_foreground().await {
                warn!("⚠️ Hook #{} 前台切换失败: {}", index, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

// 通知管线的 Hook（SDK 内部自动注册）
mod push_hook;
pub use push_hook::NotificationLifecycleHook;
