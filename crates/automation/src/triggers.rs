//! Sell trigger evaluation.
//!
//! Pure checks against a position and its current price, in priority
//! order. The trailing stop only arms once the position has been
//! profitable at least once; before that point the ordinary stop-loss is
//! the downside protection, and an immediate trailing trigger on a
//! position that never moved into profit would defeat its purpose.

use rust_decimal::Decimal;

use sniper_core::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellTrigger {
    TakeProfit,
    StopLoss,
    TrailingStop,
    Manual,
}

impl SellTrigger {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::TrailingStop => "trailing_stop",
            Self::Manual => "manual",
        }
    }
}

/// Checks all automated triggers against the current price. The caller
/// must have folded the current price into `highest_price_seen` first.
#[must_use]
pub fn check_triggers(position: &Position, price: Decimal) -> Option<SellTrigger> {
    if let Some(take_profit) = position.take_profit_price {
        if price >= take_profit {
            return Some(SellTrigger::TakeProfit);
        }
    }

    if let Some(stop_loss) = position.stop_loss_price {
        if price <= stop_loss {
            return Some(SellTrigger::StopLoss);
        }
    }

    if let Some(trailing_pct) = position.trailing_stop_pct {
        if let Some(peak) = position.highest_price_seen {
            if peak > position.entry_price && peak > Decimal::ZERO {
                let drawdown_pct = (peak - price) / peak * Decimal::from(100);
                if drawdown_pct >= trailing_pct {
                    return Some(SellTrigger::TrailingStop);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sniper_core::{ExitRules, SniperConfig, SniperFilters};
    use uuid::Uuid;

    fn position_with(exits: ExitRules, entry_price: Decimal) -> Position {
        let sniper = SniperConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            is_active: true,
            buy_amount_sol: dec!(1),
            slippage_bps: 300,
            priority_fee_lamports: 0,
            mev_protection: false,
            filters: SniperFilters::default(),
            exits,
        };
        Position::from_fill(
            &sniper,
            "MintA",
            entry_price,
            dec!(1),
            dec!(1) / entry_price,
            Utc::now(),
        )
    }

    #[test]
    fn take_profit_fires_at_or_above_target() {
        let position = position_with(
            ExitRules {
                take_profit_pct: Some(dec!(100)),
                stop_loss_pct: None,
                trailing_stop_pct: None,
            },
            dec!(1),
        );

        assert_eq!(check_triggers(&position, dec!(1.99)), None);
        assert_eq!(
            check_triggers(&position, dec!(2)),
            Some(SellTrigger::TakeProfit)
        );
        assert_eq!(
            check_triggers(&position, dec!(3)),
            Some(SellTrigger::TakeProfit)
        );
    }

    #[test]
    fn stop_loss_fires_at_or_below_target() {
        let position = position_with(
            ExitRules {
                take_profit_pct: None,
                stop_loss_pct: Some(dec!(50)),
                trailing_stop_pct: None,
            },
            dec!(1),
        );

        assert_eq!(check_triggers(&position, dec!(0.51)), None);
        assert_eq!(
            check_triggers(&position, dec!(0.5)),
            Some(SellTrigger::StopLoss)
        );
    }

    #[test]
    fn take_profit_wins_over_stop_loss_in_priority_order() {
        // Degenerate configuration where both bands would fire.
        let mut position = position_with(
            ExitRules {
                take_profit_pct: Some(dec!(0)),
                stop_loss_pct: Some(dec!(0)),
                trailing_stop_pct: None,
            },
            dec!(1),
        );
        position.take_profit_price = Some(dec!(1));
        position.stop_loss_price = Some(dec!(1));

        assert_eq!(
            check_triggers(&position, dec!(1)),
            Some(SellTrigger::TakeProfit)
        );
    }

    #[test]
    fn trailing_stop_never_fires_before_the_position_was_profitable() {
        let mut position = position_with(
            ExitRules {
                take_profit_pct: None,
                stop_loss_pct: None,
                trailing_stop_pct: Some(dec!(10)),
            },
            dec!(1),
        );

        // Price fell sharply but the peak never exceeded entry.
        position.highest_price_seen = Some(dec!(1));
        assert_eq!(check_triggers(&position, dec!(0.4)), None);

        // No peak observed at all.
        position.highest_price_seen = None;
        assert_eq!(check_triggers(&position, dec!(0.1)), None);
    }

    #[test]
    fn armed_trailing_stop_fires_on_drawdown_from_peak() {
        let mut position = position_with(
            ExitRules {
                take_profit_pct: None,
                stop_loss_pct: None,
                trailing_stop_pct: Some(dec!(10)),
            },
            dec!(1),
        );
        position.highest_price_seen = Some(dec!(2));

        // 5% off the peak: hold.
        assert_eq!(check_triggers(&position, dec!(1.9)), None);
        // 10% off the peak: sell.
        assert_eq!(
            check_triggers(&position, dec!(1.8)),
            Some(SellTrigger::TrailingStop)
        );
    }

    #[test]
    fn position_without_rules_never_triggers() {
        let position = position_with(ExitRules::default(), dec!(1));
        assert_eq!(check_triggers(&position, dec!(100)), None);
        assert_eq!(check_triggers(&position, dec!(0.0001)), None);
    }
}
