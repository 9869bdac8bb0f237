//! 海底交换（submarine swap）结算费用计算
//!
//! 只保留两种结果的契约：`Valid` 给出执行参数和费用，`Invalid` 表示按当前费率余额不足以覆盖费用。
//! 调用方必须把 `Invalid` 当作"余额不足"，而不是硬错误。

use crate::notifications::model::{NextTransactionSize, SubmarineSwap};

/// 计算链上费用所需的上下文
#[derive(Debug, Clone, PartialEq)]
pub struct FeeInfo {
    /// sat/vbyte
    pub fee_rate: f64,
    pub next_transaction_size: NextTransactionSize,
}

/// 交换执行参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapExecutionParams {
    pub sweep_fee_in_sats: i64,
    pub routing_fee_in_sats: i64,
    pub confirmations_needed: u32,
}

impl SwapExecutionParams {
    pub fn offchain_fee(&self) -> i64 {
        self.sweep_fee_in_sats.saturating_add(self.routing_fee_in_sats)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwapFees {
    Valid {
        params: SwapExecutionParams,
        total_fee: i64,
        fee_rate: f64,
        updated_amount: i64,
    },
    Invalid {
        amount_plus_fee: i64,
    },
}

pub trait SwapFeeCalculator: Send + Sync {
    fn compute_swap_fees(&self, swap: &SubmarineSwap, amount_in_sats: i64, fee_info: &FeeInfo) -> SwapFees;
}

/// 默认实现
///
/// 固定金额的交换直接使用服务端报价的费用；用户自选金额的交换按最优路由费和 0-conf 策略估算。
#[derive(Debug, Clone, Default)]
pub struct DefaultSwapFeeCalculator;

impl DefaultSwapFeeCalculator {
    fn params_for(&self, swap: &SubmarineSwap, amount: i64) -> Option<SwapExecutionParams> {
        if let Some(fees) = &swap.fees {
            return Some(SwapExecutionParams {
                sweep_fee_in_sats: fees.sweep_in_sats,
                routing_fee_in_sats: fees.lightning_in_sats,
                confirmations_needed: 0,
            });
        }

        let routes = swap.best_route_fees.as_ref()?;
        let policies = swap.funding_output_policies.as_ref()?;

        let route = routes
            .iter()
            .find(|r| r.max_capacity_in_sat >= amount)
            .or_else(|| routes.last())?;
        // 报价来自服务端，溢出时视为无法结算
        let routing_fee = amount
            .checked_mul(route.proportional_millionth)?
            .checked_div(1_000_000)?
            .checked_add(route.base_in_sat)?;
        let confirmations_needed = if amount.checked_add(routing_fee)? > policies.max_amount_in_sat_for0_conf {
            1
        } else {
            0
        };

        Some(SwapExecutionParams {
            sweep_fee_in_sats: 0,
            routing_fee_in_sats: routing_fee,
            confirmations_needed,
        })
    }

    /// 链上费用：取能覆盖输出金额的最小 UTXO 组合的体积
    fn onchain_fee(output_amount: i64, fee_info: &FeeInfo) -> Option<i64> {
        let size = fee_info
            .next_transaction_size
            .size_progression
            .iter()
            .find(|s| s.amount_in_satoshis >= output_amount)?;
        let vbytes = (size.size_in_bytes as f64 / 4.0).ceil();
        Some((vbytes * fee_info.fee_rate).ceil() as i64)
    }

    fn minimum_fee(fee_info: &FeeInfo) -> i64 {
        fee_info
            .next_transaction_size
            .size_progression
            .first()
            .map(|s| ((s.size_in_bytes as f64 / 4.0).ceil() * fee_info.fee_rate).ceil() as i64)
            .unwrap_or(0)
    }
}

impl SwapFeeCalculator for DefaultSwapFeeCalculator {
    fn compute_swap_fees(&self, swap: &SubmarineSwap, amount_in_sats: i64, fee_info: &FeeInfo) -> SwapFees {
        let Some(params) = self.params_for(swap, amount_in_sats) else {
            return SwapFees::Invalid {
                amount_plus_fee: amount_in_sats.saturating_add(Self::minimum_fee(fee_info)),
            };
        };

        let output_amount = amount_in_sats.saturating_add(params.offchain_fee());
        let Some(onchain_fee) = Self::onchain_fee(output_amount, fee_info) else {
            return SwapFees::Invalid {
                amount_plus_fee: output_amount.saturating_add(Self::minimum_fee(fee_info)),
            };
        };

        let total_fee = params.offchain_fee().saturating_add(onchain_fee);
        let balance = fee_info.next_transaction_size.total_balance();
        let amount_plus_fee = amount_in_sats.saturating_add(total_fee);
        if amount_plus_fee > balance {
            return SwapFees::Invalid {
                amount_plus_fee,
            };
        }

        SwapFees::Valid {
            params,
            total_fee,
            fee_rate: fee_info.fee_rate,
            updated_amount: amount_in_sats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::model::{
        BestRouteFees, FundingOutputPolicies, SizeForAmount, SubmarineSwapFees, SubmarineSwapReceiver,
    };
    use chrono::Utc;

    fn swap(fees: Option<SubmarineSwapFees>) -> SubmarineSwap {
        SubmarineSwap {
            swap_uuid: "swap-1".into(),
            invoice: "lnbc1".into(),
            receiver: SubmarineSwapReceiver {
                alias: Some("node".into()),
                network_addresses: vec![],
                public_key: None,
            },
            fees,
            expires_at: Utc::now(),
            will_pre_open_channel: false,
            best_route_fees: Some(vec![BestRouteFees {
                max_capacity_in_sat: 1_000_000,
                proportional_millionth: 1_000,
                base_in_sat: 1,
            }]),
            funding_output_policies: Some(FundingOutputPolicies {
                maximum_debt_in_sat: 0,
                potential_collect_in_sat: 0,
                max_amount_in_sat_for0_conf: 50_000,
            }),
            payed_at: None,
            preimage_in_hex: None,
        }
    }

    fn fee_info(balance: i64) -> FeeInfo {
        FeeInfo {
            fee_rate: 10.0,
            next_transaction_size: NextTransactionSize {
                size_progression: vec![SizeForAmount {
                    amount_in_satoshis: balance,
                    size_in_bytes: 400,
                    outpoint: None,
                }],
                valid_at_operation_hid: None,
                expected_debt_in_sat: 0,
            },
        }
    }

    #[test]
    fn fixed_amount_swap_uses_quoted_fees() {
        let swap = swap(Some(SubmarineSwapFees {
            lightning_in_sats: 5,
            sweep_in_sats: 20,
            channel_open_in_sats: 0,
            channel_close_in_sats: 0,
        }));
        let result = DefaultSwapFeeCalculator.compute_swap_fees(&swap, 10_000, &fee_info(100_000));
        match result {
            SwapFees::Valid { params, total_fee, updated_amount, .. } => {
                assert_eq!(params.offchain_fee(), 25);
                // 400 wu = 100 vbytes, 10 sat/vbyte
                assert_eq!(total_fee, 25 + 1_000);
                assert_eq!(updated_amount, 10_000);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn insufficient_balance_is_invalid_not_error() {
        let swap = swap(None);
        let result = DefaultSwapFeeCalculator.compute_swap_fees(&swap, 10_000, &fee_info(10_500));
        match result {
            SwapFees::Invalid { amount_plus_fee } => assert!(amount_plus_fee > 10_500),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn user_amount_above_zero_conf_limit_needs_confirmation() {
        let swap = swap(None);
        let result = DefaultSwapFeeCalculator.compute_swap_fees(&swap, 60_000, &fee_info(200_000));
        let SwapFees::Valid { params, .. } = result else {
            panic!("expected valid fees");
        };
        assert_eq!(params.confirmations_needed, 1);
        assert_eq!(params.routing_fee_in_sats, 1 + 60);
    }

    #[test]
    fn absurd_route_quote_degrades_to_invalid() {
        let mut swap = swap(None);
        swap.best_route_fees = Some(vec![BestRouteFees {
            max_capacity_in_sat: 1_000_000,
            proportional_millionth: i64::MAX,
            base_in_sat: 1,
        }]);

        let result = DefaultSwapFeeCalculator.compute_swap_fees(&swap, 10_000, &fee_info(200_000));
        assert_eq!(result, SwapFees::Invalid { amount_plus_fee: 10_000 + 1_000 });
    }
}
