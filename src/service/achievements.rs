//! Donor achievement awarding.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{AchievementAward, AchievementRules, Donation};
use crate::error::DonationError;
use crate::persistence::AwardStore;

/// Evaluates and records achievements after a donation completes.
///
/// Evaluation is idempotent: awards are keyed by `(user, type)` in the
/// [`AwardStore`], so re-running it for the same donation records nothing.
#[derive(Debug, Clone)]
pub struct AchievementEvaluator {
    store: Arc<dyn AwardStore>,
    rules: AchievementRules,
}

impl AchievementEvaluator {
    /// Creates an evaluator over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AwardStore>, rules: AchievementRules) -> Self {
        Self { store, rules }
    }

    /// Records every achievement the donation's owner now qualifies for
    /// and does not yet hold. Returns only the newly recorded awards.
    ///
    /// Donations without a user earn nothing.
    ///
    /// # Errors
    ///
    /// Storage failure while reading history or writing an award.
    pub async fn process_achievements_for_donation(
        &self,
        donation: &Donation,
    ) -> Result<Vec<AchievementAward>, DonationError> {
        let Some(user_id) = donation.user_id else {
            return Ok(Vec::new());
        };

        let history = self.store.completed_donations_for(user_id).await?;
        let achieved_at = Utc::now();
        let mut awarded = Vec::new();
        for achievement_type in self.rules.qualifying(&history) {
            if self
                .store
                .record_award(user_id, achievement_type, achieved_at)
                .await?
            {
                tracing::info!(%user_id, achievement = %achievement_type, "achievement awarded");
                awarded.push(AchievementAward {
                    user_id,
                    achievement_type,
                    achieved_at,
                });
            }
        }
        Ok(awarded)
    }
}
