//! Pure filter evaluation for one configuration against one migration
//! event. Checks short-circuit in a fixed order, cheapest first, and each
//! miss carries the concrete reason for counting and logging.
//!
//! Behavior on missing external data is a single auditable table
//! ([`on_unavailable`]) rather than per-call conditionals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use sniper_core::{MarketSnapshot, MigrationEvent, SniperConfig, SniperFilters, TokenAnalysis};

#[derive(Debug, Clone, Copy)]
pub struct FilterContext {
    pub now: DateTime<Utc>,
    /// Events older than this were lost to faster participants already.
    pub staleness_bound_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Freshness,
    NameExclude,
    NameInclude,
    MigrationSpeed,
    Volume,
    MarketCap,
    HolderCount,
    DevConcentration,
    Top10Concentration,
    Socials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnUnavailable {
    Allow,
    Reject,
}

/// Policy table: what a filter does when the data it needs is unavailable.
///
/// Numeric thresholds fail open so a provider outage cannot starve every
/// trade; presence requirements fail closed because a false negative only
/// costs a missed trade, never a bad one.
#[must_use]
pub const fn on_unavailable(kind: FilterKind) -> OnUnavailable {
    match kind {
        FilterKind::Volume
        | FilterKind::MarketCap
        | FilterKind::HolderCount
        | FilterKind::DevConcentration
        | FilterKind::Top10Concentration
        | FilterKind::NameExclude => OnUnavailable::Allow,
        FilterKind::Socials | FilterKind::NameInclude => OnUnavailable::Reject,
        // Evaluated from the event itself; data is always present.
        FilterKind::Freshness | FilterKind::MigrationSpeed => OnUnavailable::Allow,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMiss {
    Stale,
    NameExcluded,
    NameNotIncluded,
    MigrationTooSlow,
    VolumeTooLow,
    MarketCapTooHigh,
    TooFewHolders,
    DevConcentrationTooHigh,
    Top10ConcentrationTooHigh,
    MissingSocials,
    Unavailable(FilterKind),
}

impl FilterMiss {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "stale_event",
            Self::NameExcluded => "name_excluded",
            Self::NameNotIncluded => "name_not_included",
            Self::MigrationTooSlow => "migration_too_slow",
            Self::VolumeTooLow => "volume_too_low",
            Self::MarketCapTooHigh => "market_cap_too_high",
            Self::TooFewHolders => "too_few_holders",
            Self::DevConcentrationTooHigh => "dev_concentration_too_high",
            Self::Top10ConcentrationTooHigh => "top10_concentration_too_high",
            Self::MissingSocials => "missing_socials",
            Self::Unavailable(_) => "data_unavailable",
        }
    }
}

/// Evaluates every filter of `config` against the event and the shared
/// analysis snapshot. Returns the first miss, in evaluation order.
///
/// # Errors
/// The `Err` variant is the filter miss — expected control flow, not a
/// failure.
pub fn evaluate(
    config: &SniperConfig,
    event: &MigrationEvent,
    analysis: &TokenAnalysis,
    ctx: &FilterContext,
) -> Result<(), FilterMiss> {
    check_freshness(event, ctx)?;
    check_name_patterns(&config.filters, analysis.market.as_ref())?;
    check_migration_speed(&config.filters, event)?;
    check_volume(&config.filters, analysis)?;
    check_market_cap(&config.filters, analysis)?;
    check_holders(&config.filters, analysis)?;
    check_socials(&config.filters, analysis.market.as_ref())?;
    Ok(())
}

fn check_freshness(event: &MigrationEvent, ctx: &FilterContext) -> Result<(), FilterMiss> {
    let age_secs = (ctx.now - event.detected_at).num_seconds();
    if age_secs > ctx.staleness_bound_secs {
        return Err(FilterMiss::Stale);
    }
    Ok(())
}

fn matches_any(patterns: &[String], name: &str, symbol: &str) -> bool {
    let name = name.to_lowercase();
    let symbol = symbol.to_lowercase();
    patterns.iter().any(|pattern| {
        let pattern = pattern.to_lowercase();
        name.contains(&pattern) || symbol.contains(&pattern)
    })
}

fn check_name_patterns(
    filters: &SniperFilters,
    market: Option<&MarketSnapshot>,
) -> Result<(), FilterMiss> {
    if !filters.name_excludes.is_empty() {
        match market {
            Some(market) => {
                if matches_any(&filters.name_excludes, &market.name, &market.symbol) {
                    return Err(FilterMiss::NameExcluded);
                }
            }
            None => {
                if on_unavailable(FilterKind::NameExclude) == OnUnavailable::Reject {
                    return Err(FilterMiss::Unavailable(FilterKind::NameExclude));
                }
            }
        }
    }

    if !filters.name_includes.is_empty() {
        match market {
            Some(market) => {
                if !matches_any(&filters.name_includes, &market.name, &market.symbol) {
                    return Err(FilterMiss::NameNotIncluded);
                }
            }
            None => {
                if on_unavailable(FilterKind::NameInclude) == OnUnavailable::Reject {
                    return Err(FilterMiss::Unavailable(FilterKind::NameInclude));
                }
            }
        }
    }

    Ok(())
}

fn check_migration_speed(
    filters: &SniperFilters,
    event: &MigrationEvent,
) -> Result<(), FilterMiss> {
    if let Some(max_secs) = filters.max_migration_secs {
        if event.migration_secs() > max_secs {
            return Err(FilterMiss::MigrationTooSlow);
        }
    }
    Ok(())
}

/// Applies a numeric threshold under the unavailability policy.
fn check_threshold<T: Copy>(
    kind: FilterKind,
    value: Option<T>,
    miss: FilterMiss,
    violates: impl FnOnce(T) -> bool,
) -> Result<(), FilterMiss> {
    match value {
        Some(value) if violates(value) => Err(miss),
        Some(_) => Ok(()),
        None => match on_unavailable(kind) {
            OnUnavailable::Allow => Ok(()),
            OnUnavailable::Reject => Err(FilterMiss::Unavailable(kind)),
        },
    }
}

fn check_volume(filters: &SniperFilters, analysis: &TokenAnalysis) -> Result<(), FilterMiss> {
    let Some(min_volume) = filters.min_volume_usd else {
        return Ok(());
    };
    check_threshold(
        FilterKind::Volume,
        analysis.volume.as_ref().map(|v| v.volume_24h_usd),
        FilterMiss::VolumeTooLow,
        |volume: Decimal| volume < min_volume,
    )
}

fn check_market_cap(filters: &SniperFilters, analysis: &TokenAnalysis) -> Result<(), FilterMiss> {
    let Some(max_cap) = filters.max_market_cap_usd else {
        return Ok(());
    };
    check_threshold(
        FilterKind::MarketCap,
        analysis.market.as_ref().map(|m| m.market_cap_usd),
        FilterMiss::MarketCapTooHigh,
        |cap: Decimal| cap > max_cap,
    )
}

fn check_holders(filters: &SniperFilters, analysis: &TokenAnalysis) -> Result<(), FilterMiss> {
    let holders = analysis.holders.as_ref();

    if let Some(min_holders) = filters.min_holder_count {
        check_threshold(
            FilterKind::HolderCount,
            holders.map(|h| h.holder_count),
            FilterMiss::TooFewHolders,
            |count| count < min_holders,
        )?;
    }

    if let Some(max_dev) = filters.max_dev_holding_pct {
        check_threshold(
            FilterKind::DevConcentration,
            holders.map(|h| h.dev_holding_pct),
            FilterMiss::DevConcentrationTooHigh,
            |pct: Decimal| pct > max_dev,
        )?;
    }

    if let Some(max_top10) = filters.max_top10_holding_pct {
        check_threshold(
            FilterKind::Top10Concentration,
            holders.map(|h| h.top10_holding_pct),
            FilterMiss::Top10ConcentrationTooHigh,
            |pct: Decimal| pct > max_top10,
        )?;
    }

    Ok(())
}

fn check_socials(
    filters: &SniperFilters,
    market: Option<&MarketSnapshot>,
) -> Result<(), FilterMiss> {
    if !filters.require_twitter && !filters.require_telegram && !filters.require_website {
        return Ok(());
    }

    let Some(market) = market else {
        return match on_unavailable(FilterKind::Socials) {
            OnUnavailable::Allow => Ok(()),
            OnUnavailable::Reject => Err(FilterMiss::Unavailable(FilterKind::Socials)),
        };
    };

    let satisfied = (!filters.require_twitter || market.has_twitter)
        && (!filters.require_telegram || market.has_telegram)
        && (!filters.require_website || market.has_website);
    if satisfied {
        Ok(())
    } else {
        Err(FilterMiss::MissingSocials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sniper_core::{ExitRules, HolderSnapshot, VolumeSnapshot};
    use uuid::Uuid;

    fn config_with(filters: SniperFilters) -> SniperConfig {
        SniperConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            is_active: true,
            buy_amount_sol: dec!(0.5),
            slippage_bps: 300,
            priority_fee_lamports: 100_000,
            mev_protection: false,
            filters,
            exits: ExitRules::default(),
        }
    }

    fn event_detected_secs_ago(now: DateTime<Utc>, secs: i64) -> MigrationEvent {
        let detected = now - chrono::Duration::seconds(secs);
        MigrationEvent {
            token_mint: "MintA".to_string(),
            pool_address: "PoolA".to_string(),
            creator_address: None,
            token_created_at: detected - chrono::Duration::seconds(120),
            detected_at: detected,
            initial_liquidity_sol: dec!(40),
        }
    }

    fn ctx(now: DateTime<Utc>) -> FilterContext {
        FilterContext {
            now,
            staleness_bound_secs: 30,
        }
    }

    fn market(name: &str, symbol: &str) -> MarketSnapshot {
        MarketSnapshot {
            name: name.to_string(),
            symbol: symbol.to_string(),
            market_cap_usd: dec!(50_000),
            has_twitter: false,
            has_telegram: false,
            has_website: false,
        }
    }

    #[test]
    fn fresh_event_with_no_filters_matches() {
        let now = Utc::now();
        let config = config_with(SniperFilters::default());
        let event = event_detected_secs_ago(now, 2);

        assert_eq!(
            evaluate(&config, &event, &TokenAnalysis::default(), &ctx(now)),
            Ok(())
        );
    }

    #[test]
    fn event_older_than_the_bound_never_dispatches() {
        let now = Utc::now();
        let config = config_with(SniperFilters::default());
        let event = event_detected_secs_ago(now, 31);

        assert_eq!(
            evaluate(&config, &event, &TokenAnalysis::default(), &ctx(now)),
            Err(FilterMiss::Stale)
        );
    }

    #[test]
    fn event_at_the_bound_still_dispatches() {
        let now = Utc::now();
        let config = config_with(SniperFilters::default());
        let event = event_detected_secs_ago(now, 30);

        assert_eq!(
            evaluate(&config, &event, &TokenAnalysis::default(), &ctx(now)),
            Ok(())
        );
    }

    #[test]
    fn exclude_pattern_matches_case_insensitively_on_name_or_symbol() {
        let now = Utc::now();
        let config = config_with(SniperFilters {
            name_excludes: vec!["RUG".to_string()],
            ..SniperFilters::default()
        });
        let event = event_detected_secs_ago(now, 1);

        let analysis = TokenAnalysis {
            market: Some(market("definitely a rugpull", "DRP")),
            ..TokenAnalysis::default()
        };
        assert_eq!(
            evaluate(&config, &event, &analysis, &ctx(now)),
            Err(FilterMiss::NameExcluded)
        );

        let analysis = TokenAnalysis {
            market: Some(market("honest token", "HON")),
            ..TokenAnalysis::default()
        };
        assert_eq!(evaluate(&config, &event, &analysis, &ctx(now)), Ok(()));
    }

    #[test]
    fn include_pattern_requires_a_match() {
        let now = Utc::now();
        let config = config_with(SniperFilters {
            name_includes: vec!["pepe".to_string()],
            ..SniperFilters::default()
        });
        let event = event_detected_secs_ago(now, 1);

        let analysis = TokenAnalysis {
            market: Some(market("PEPE CLASSIC", "PEPEC")),
            ..TokenAnalysis::default()
        };
        assert_eq!(evaluate(&config, &event, &analysis, &ctx(now)), Ok(()));

        let analysis = TokenAnalysis {
            market: Some(market("doge", "DOGE")),
            ..TokenAnalysis::default()
        };
        assert_eq!(
            evaluate(&config, &event, &analysis, &ctx(now)),
            Err(FilterMiss::NameNotIncluded)
        );
    }

    #[test]
    fn slow_migration_is_rejected() {
        let now = Utc::now();
        let config = config_with(SniperFilters {
            max_migration_secs: Some(60),
            ..SniperFilters::default()
        });
        // Helper creates events that migrated in 120 seconds.
        let event = event_detected_secs_ago(now, 1);

        assert_eq!(
            evaluate(&config, &event, &TokenAnalysis::default(), &ctx(now)),
            Err(FilterMiss::MigrationTooSlow)
        );
    }

    #[test]
    fn volume_threshold_rejects_below_minimum() {
        let now = Utc::now();
        let config = config_with(SniperFilters {
            min_volume_usd: Some(dec!(10_000)),
            ..SniperFilters::default()
        });
        let event = event_detected_secs_ago(now, 1);

        let analysis = TokenAnalysis {
            volume: Some(VolumeSnapshot {
                volume_24h_usd: dec!(500),
            }),
            ..TokenAnalysis::default()
        };
        assert_eq!(
            evaluate(&config, &event, &analysis, &ctx(now)),
            Err(FilterMiss::VolumeTooLow)
        );
    }

    #[test]
    fn unavailable_volume_fails_open_while_unavailable_socials_fail_closed() {
        let now = Utc::now();
        let event = event_detected_secs_ago(now, 1);
        let analysis = TokenAnalysis::default();

        let volume_config = config_with(SniperFilters {
            min_volume_usd: Some(dec!(10_000)),
            ..SniperFilters::default()
        });
        assert_eq!(evaluate(&volume_config, &event, &analysis, &ctx(now)), Ok(()));

        let socials_config = config_with(SniperFilters {
            require_twitter: true,
            ..SniperFilters::default()
        });
        assert_eq!(
            evaluate(&socials_config, &event, &analysis, &ctx(now)),
            Err(FilterMiss::Unavailable(FilterKind::Socials))
        );
    }

    #[test]
    fn concentration_thresholds_reject_above_maximum() {
        let now = Utc::now();
        let event = event_detected_secs_ago(now, 1);
        let analysis = TokenAnalysis {
            holders: Some(HolderSnapshot {
                holder_count: 250,
                dev_holding_pct: dec!(30),
                top10_holding_pct: dec!(80),
            }),
            ..TokenAnalysis::default()
        };

        let dev_config = config_with(SniperFilters {
            max_dev_holding_pct: Some(dec!(20)),
            ..SniperFilters::default()
        });
        assert_eq!(
            evaluate(&dev_config, &event, &analysis, &ctx(now)),
            Err(FilterMiss::DevConcentrationTooHigh)
        );

        let top10_config = config_with(SniperFilters {
            max_top10_holding_pct: Some(dec!(60)),
            ..SniperFilters::default()
        });
        assert_eq!(
            evaluate(&top10_config, &event, &analysis, &ctx(now)),
            Err(FilterMiss::Top10ConcentrationTooHigh)
        );

        let holders_config = config_with(SniperFilters {
            min_holder_count: Some(100),
            ..SniperFilters::default()
        });
        assert_eq!(evaluate(&holders_config, &event, &analysis, &ctx(now)), Ok(()));
    }

    #[test]
    fn socials_present_satisfy_the_requirement() {
        let now = Utc::now();
        let event = event_detected_secs_ago(now, 1);
        let config = config_with(SniperFilters {
            require_twitter: true,
            require_website: true,
            ..SniperFilters::default()
        });

        let mut snapshot = market("token", "TOK");
        snapshot.has_twitter = true;
        snapshot.has_website = true;
        let analysis = TokenAnalysis {
            market: Some(snapshot),
            ..TokenAnalysis::default()
        };
        assert_eq!(evaluate(&config, &event, &analysis, &ctx(now)), Ok(()));

        let mut snapshot = market("token", "TOK");
        snapshot.has_twitter = true;
        let analysis = TokenAnalysis {
            market: Some(snapshot),
            ..TokenAnalysis::default()
        };
        assert_eq!(
            evaluate(&config, &event, &analysis, &ctx(now)),
            Err(FilterMiss::MissingSocials)
        );
    }

    #[test]
    fn policy_table_is_fail_open_for_numerics_and_fail_closed_for_presence() {
        for kind in [
            FilterKind::Volume,
            FilterKind::MarketCap,
            FilterKind::HolderCount,
            FilterKind::DevConcentration,
            FilterKind::Top10Concentration,
            FilterKind::NameExclude,
        ] {
            assert_eq!(on_unavailable(kind), OnUnavailable::Allow);
        }
        for kind in [FilterKind::Socials, FilterKind::NameInclude] {
            assert_eq!(on_unavailable(kind), OnUnavailable::Reject);
        }
    }
}
