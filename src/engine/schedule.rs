//! Commission schedule: level → payout rate.

use crate::domain::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// Payout for one level: a fixed amount or a percentage of the order amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CommissionRate {
    Fixed(Decimal),
    Percent(Decimal),
}

impl CommissionRate {
    /// Commission owed for an order of `order_amount`, rounded to cents.
    pub fn amount_for(&self, order_amount: Decimal) -> Decimal {
        let amount = match self {
            CommissionRate::Fixed(amount) => *amount,
            CommissionRate::Percent(pct) => order_amount * *pct / Decimal::hundred(),
        };
        amount.round_money()
    }

    fn value(&self) -> Decimal {
        match self {
            CommissionRate::Fixed(v) | CommissionRate::Percent(v) => *v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid schedule entry '{0}', expected LEVEL:AMOUNT or LEVEL:PERCENT%")]
    InvalidEntry(String),
    #[error("level must be a positive integer, got '{0}'")]
    InvalidLevel(String),
    #[error("level {0} is configured more than once")]
    DuplicateLevel(u32),
    #[error("level {0} has a negative rate")]
    NegativeRate(u32),
}

/// Immutable level → rate mapping. Levels without an entry pay zero.
///
/// Loaded once at startup and shared behind an `Arc`; records already
/// written are never recomputed from a newer schedule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CommissionSchedule {
    rates: BTreeMap<u32, CommissionRate>,
}

impl CommissionSchedule {
    pub fn new(
        entries: impl IntoIterator<Item = (u32, CommissionRate)>,
    ) -> Result<Self, ScheduleError> {
        let mut rates = BTreeMap::new();
        for (level, rate) in entries {
            if level == 0 {
                return Err(ScheduleError::InvalidLevel(level.to_string()));
            }
            if rate.value().is_negative() {
                return Err(ScheduleError::NegativeRate(level));
            }
            if rates.insert(level, rate).is_some() {
                return Err(ScheduleError::DuplicateLevel(level));
            }
        }
        Ok(Self { rates })
    }

    /// Schedule of fixed amounts, e.g. `[(1, 75000), (2, 12500)]`.
    pub fn fixed(entries: &[(u32, i64)]) -> Result<Self, ScheduleError> {
        Self::new(
            entries
                .iter()
                .map(|&(level, amount)| (level, CommissionRate::Fixed(Decimal::from(amount)))),
        )
    }

    pub fn rate(&self, level: u32) -> Option<CommissionRate> {
        self.rates.get(&level).copied()
    }

    /// Commission for `level`; zero when the level is not configured.
    pub fn amount_for(&self, level: u32, order_amount: Decimal) -> Decimal {
        self.rate(level)
            .map(|r| r.amount_for(order_amount))
            .unwrap_or_else(Decimal::zero)
    }

    /// Highest configured level, or 0 for an empty schedule.
    pub fn max_level(&self) -> u32 {
        self.rates.keys().next_back().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, CommissionRate)> + '_ {
        self.rates.iter().map(|(l, r)| (*l, *r))
    }
}

impl FromStr for CommissionSchedule {
    type Err = ScheduleError;

    /// Parse `"1:75000,2:12500,3:12500"`; a trailing `%` makes a rate a percentage.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();
        for raw in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (level_str, rate_str) = raw
                .split_once(':')
                .ok_or_else(|| ScheduleError::InvalidEntry(raw.to_string()))?;

            let level = level_str
                .trim()
                .parse::<u32>()
                .map_err(|_| ScheduleError::InvalidLevel(level_str.trim().to_string()))?;

            let rate_str = rate_str.trim();
            let rate = match rate_str.strip_suffix('%') {
                Some(pct) => CommissionRate::Percent(
                    Decimal::from_str_canonical(pct)
                        .map_err(|_| ScheduleError::InvalidEntry(raw.to_string()))?,
                ),
                None => CommissionRate::Fixed(
                    Decimal::from_str_canonical(rate_str)
                        .map_err(|_| ScheduleError::InvalidEntry(raw.to_string()))?,
                ),
            };
            entries.push((level, rate));
        }
        Self::new(entries)
    }
}
