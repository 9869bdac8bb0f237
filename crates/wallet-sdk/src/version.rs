//! SDK 版本与运行时元信息
//!
//! - **SDK Version** → Cargo.toml（唯一权威源）
//! - **Runtime Metadata** → 本模块（Houston 请求头 X-Client-Version、日志）

/// SDK semver，来自 Cargo.toml
///
/// 禁止手写版本号，必须用 `env!("CARGO_PKG_VERSION")` 与 Cargo.toml 保持同步。
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// git commit（由 vergen 在 build.rs 中生成）
pub const GIT_SHA: &str = env!("VERGEN_GIT_SHA");

/// build time（由 vergen 在 build.rs 中生成）
pub const BUILD_TIME: &str = env!("VERGEN_BUILD_TIMESTAMP");

/// 单行版本摘要，用于启动日志
pub fn version_summary() -> String {
    format!("wallet-sdk {} ({}, built {})", SDK_VERSION, GIT_SHA, BUILD_TIME)
}
