//! 通知游标存储
//!
//! 游标是"最后一个完整应用的通知 ID"，缺省为 0。只由同步引擎写入。

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::notifications::model::NotificationId;
use crate::storage::kv::{keys, KvStore};

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self) -> Result<NotificationId>;

    async fn set(&self, id: NotificationId) -> Result<()>;

    /// 本地数据全量清除时调用
    async fn reset(&self) -> Result<()>;
}

/// 基于 sled KV 的游标存储
pub struct KvCursorStore {
    kv: Arc<KvStore>,
}

impl KvCursorStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl CursorStore for KvCursorStore {
    async fn get(&self) -> Result<NotificationId> {
        let value = self
            .kv
            .get::<&str, NotificationId>(keys::LAST_PROCESSED_NOTIFICATION)
            .await?;
        Ok(value.unwrap_or(0))
    }

    async fn set(&self, id: NotificationId) -> Result<()> {
        self.kv.set(keys::LAST_PROCESSED_NOTIFICATION, &id).await
    }

    async fn reset(&self) -> Result<()> {
        self.kv.delete(keys::LAST_PROCESSED_NOTIFICATION).await?;
        Ok(())
    }
}
