//! 存储模块 - 钱包 SDK 的本地持久化层
//!
//! 通知管线只持久化一个值（游标），放在基于 sled 的 KV 存储中。

pub mod kv;

pub use kv::KvStore;
