//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 数据放在 `{base_path}/kv` 下的一个 sled Tree 中，值以 JSON 编码，每次写入后落盘。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::error::{Result, WalletSDKError};

/// 存放数据的 Tree
const TREE_NAME: &str = "ns_wallet";

/// KV 存储组件
#[derive(Debug)]
pub struct KvStore {
    /// 主数据库实例
    _db: Db,
    tree: Tree,
}

impl KvStore {
    /// 在 `{base_path}/kv` 打开（或创建）KV 存储
    pub async fn new(base_path: &Path) -> Result<Self> {
        let kv_path: PathBuf = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| WalletSDKError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 上一个实例可能刚释放文件锁，带退避重试
        const MAX_OPEN_RETRIES: u32 = 5;
        const RETRY_DELAY_MS: u64 = 100;
        let mut last_err: Option<sled::Error> = None;
        let mut db_opt: Option<Db> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = e.to_string();
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            WalletSDKError::KvStore(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        let tree = db
            .open_tree(TREE_NAME)
            .map_err(|e| WalletSDKError::KvStore(format!("打开 Tree 失败: {}", e)))?;

        tracing::debug!("KV 存储已打开: {}", kv_path.display());
        Ok(Self { _db: db, tree })
    }

    /// 设置键值对（写入后立即落盘）
    pub async fn set<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let tree = &self.tree;
        let value_bytes = serde_json::to_vec(value)
            .map_err(|e| WalletSDKError::Serialization(format!("序列化值失败: {}", e)))?;

        tree.insert(key, value_bytes)
            .map_err(|e| WalletSDKError::KvStore(format!("设置键值对失败: {}", e)))?;
        tree.flush_async()
            .await
            .map_err(|e| WalletSDKError::KvStore(format!("落盘失败: {}", e)))?;

        Ok(())
    }

    /// 获取键值对
    pub async fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: for<'de> Deserialize<'de>,
    {
        let tree = &self.tree;

        let result = tree
            .get(key)
            .map_err(|e| WalletSDKError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(value_bytes) => {
                let value = serde_json::from_slice(&value_bytes)
                    .map_err(|e| WalletSDKError::Serialization(format!("反序列化值失败: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 删除键值对
    pub async fn delete<K>(&self, key: K) -> Result<bool>
    where
        K: AsRef<[u8]>,
    {
        let tree = &self.tree;

        let removed = tree
            .remove(key)
            .map_err(|e| WalletSDKError::KvStore(format!("删除键值对失败: {}", e)))?;
        tree.flush_async()
            .await
            .map_err(|e| WalletSDKError::KvStore(format!("落盘失败: {}", e)))?;

        Ok(removed.is_some())
    }
}

/// 常用的键常量
pub mod keys {
    /// 最后一个成功处理的通知 ID
    pub const LAST_PROCESSED_NOTIFICATION: &str = "notifications:last_processed_id";
}
