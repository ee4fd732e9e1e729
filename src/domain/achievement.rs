//! Donor achievements and the rules that award them.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::UserId;

/// Kinds of achievement a donor can hold. At most one award per
/// `(user, type)` pair ever exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementType {
    /// First completed donation.
    FirstDonation,
    /// Cumulative completed amount reached the configured threshold.
    GenerousDonor,
    /// Completed donations in the configured number of consecutive months.
    MonthlyStreak,
}

impl AchievementType {
    /// All achievement types.
    pub const ALL: [Self; 3] = [Self::FirstDonation, Self::GenerousDonor, Self::MonthlyStreak];

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FirstDonation => "first_donation",
            Self::GenerousDonor => "generous_donor",
            Self::MonthlyStreak => "monthly_streak",
        }
    }
}

impl fmt::Display for AchievementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown achievement type: {s}"))
    }
}

/// A recorded award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementAward {
    /// Award holder.
    pub user_id: UserId,
    /// Achievement kind.
    pub achievement_type: AchievementType,
    /// When the award was recorded.
    pub achieved_at: DateTime<Utc>,
}

/// A completed donation as seen by achievement evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedDonation {
    /// Donation amount.
    pub amount: Decimal,
    /// When it completed.
    pub completed_at: DateTime<Utc>,
}

/// Thresholds for achievement evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AchievementRules {
    /// Cumulative amount needed for [`AchievementType::GenerousDonor`].
    pub cumulative_threshold: Decimal,
    /// Consecutive months needed for [`AchievementType::MonthlyStreak`].
    pub streak_months: u32,
}

impl Default for AchievementRules {
    fn default() -> Self {
        Self {
            cumulative_threshold: Decimal::ONE_THOUSAND,
            streak_months: 3,
        }
    }
}

impl AchievementRules {
    /// Returns every achievement type the donation history qualifies for,
    /// regardless of what is already awarded.
    #[must_use]
    pub fn qualifying(&self, history: &[CompletedDonation]) -> BTreeSet<AchievementType> {
        let mut earned = BTreeSet::new();
        if history.is_empty() {
            return earned;
        }
        earned.insert(AchievementType::FirstDonation);

        let total: Decimal = history.iter().map(|d| d.amount).sum();
        if total >= self.cumulative_threshold {
            earned.insert(AchievementType::GenerousDonor);
        }

        if self.streak_months > 0 && longest_month_streak(history) >= self.streak_months {
            earned.insert(AchievementType::MonthlyStreak);
        }
        earned
    }
}

/// Length of the longest run of consecutive calendar months containing at
/// least one completed donation.
#[must_use]
pub fn longest_month_streak(history: &[CompletedDonation]) -> u32 {
    let months: BTreeSet<i64> = history
        .iter()
        .map(|d| i64::from(d.completed_at.year()) * 12 + i64::from(d.completed_at.month0()))
        .collect();

    let mut longest = 0u32;
    let mut current = 0u32;
    let mut previous: Option<i64> = None;
    for month in months {
        current = match previous {
            Some(p) if month == p + 1 => current.saturating_add(1),
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(month);
    }
    longest
}
