use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 报告拉取的重试策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRetryConfig {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 基础延迟（毫秒）
    pub base_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for FetchRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl FetchRetryConfig {
    /// 不等待的策略（测试用）
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            backoff_factor: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// 第 `attempt` 次失败（从 1 开始）后、下一次尝试前的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }

        // 基础延迟 = base_delay * (backoff_factor ^ (attempt - 1))
        let exponent = attempt.saturating_sub(1) as f64;
        let base_delay = self.base_delay_ms as f64 * self.backoff_factor.powf(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter = capped_delay * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    /// 是否还可以再试一次
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}
