//! PostgreSQL implementation of the ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::models::{AwardRow, CauseRow, DonationRow, GatewayCheckRow, TransactionRow};
use super::{AwardStore, LedgerStore};
use crate::config::AppConfig;
use crate::domain::{
    AchievementAward, AchievementType, Cause, CauseId, CauseProgress, CompletedDonation,
    Donation, DonationId, GatewayCheck, NewDonation, NewGatewayCheck, PaymentStatus,
    Transaction, TransactionId, TransitionOutcome, UserId,
};
use crate::error::{DonationError, persistence};

const DONATION_COLUMNS: &str = "id, cause_id, user_id, amount, covered_fee, total_amount, currency, \
     is_anonymous, is_gift, gift_recipient_name, gift_recipient_email, gift_message, payment_id, \
     payment_status, completed_at, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, donation_id, payment_method, payment_status, \
     gateway_reference, gateway_payment_id, created_at, updated_at";

/// PostgreSQL-backed ledger using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a ledger over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the configured pool settings and applies pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DonationError::PersistenceFailure`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(config: &AppConfig) -> Result<Self, DonationError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(std::time::Duration::from_secs(
                config.database_connect_timeout_secs,
            ))
            .connect(&config.database_url)
            .await
            .map_err(persistence)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DonationError::PersistenceFailure(e.to_string()))?;
        tracing::info!("database migrations applied");

        Ok(Self::new(pool))
    }
}

fn status_strings(statuses: &[PaymentStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// `raised_amount = raised_amount + amount`, evaluated by the database.
async fn increment_cause_raised(
    conn: &mut PgConnection,
    cause_id: Uuid,
    amount: Decimal,
) -> Result<Decimal, DonationError> {
    sqlx::query_scalar::<_, Decimal>(
        "UPDATE causes SET raised_amount = raised_amount + $2, updated_at = now() \
         WHERE id = $1 RETURNING raised_amount",
    )
    .bind(cause_id)
    .bind(amount)
    .fetch_one(conn)
    .await
    .map_err(persistence)
}

/// `raised_amount = raised_amount - amount`, evaluated by the database.
async fn decrement_cause_raised(
    conn: &mut PgConnection,
    cause_id: Uuid,
    amount: Decimal,
) -> Result<Decimal, DonationError> {
    sqlx::query_scalar::<_, Decimal>(
        "UPDATE causes SET raised_amount = raised_amount - $2, updated_at = now() \
         WHERE id = $1 RETURNING raised_amount",
    )
    .bind(cause_id)
    .bind(amount)
    .fetch_one(conn)
    .await
    .map_err(persistence)
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn find_cause(&self, cause_id: CauseId) -> Result<Option<Cause>, DonationError> {
        let row = sqlx::query_as::<_, CauseRow>(
            "SELECT id, title, goal_amount, raised_amount, created_at FROM causes WHERE id = $1",
        )
        .bind(*cause_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(row.map(Cause::from))
    }

    async fn cause_progress(
        &self,
        cause_id: CauseId,
    ) -> Result<Option<CauseProgress>, DonationError> {
        let row = sqlx::query_as::<_, (Decimal, Decimal, i64)>(
            "SELECT c.goal_amount, c.raised_amount, \
                    (SELECT COUNT(DISTINCT d.user_id) \
                            + COUNT(*) FILTER (WHERE d.user_id IS NULL) \
                       FROM donations d \
                      WHERE d.cause_id = c.id AND d.payment_status = 'completed' \
                        AND d.deleted_at IS NULL) \
             FROM causes c WHERE c.id = $1",
        )
        .bind(*cause_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(row.map(|(goal, raised, count)| {
            CauseProgress::new(cause_id, goal, raised, u64::try_from(count).unwrap_or(0))
        }))
    }

    async fn insert_donation(
        &self,
        donation: &NewDonation,
    ) -> Result<(Donation, Transaction), DonationError> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;

        let cause_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM causes WHERE id = $1)",
        )
        .bind(*donation.cause_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(persistence)?;
        if !cause_exists {
            return Err(DonationError::CauseNotFound(*donation.cause_id.as_uuid()));
        }

        let gift = donation.gift.as_ref();
        let donation_row = sqlx::query_as::<_, DonationRow>(&format!(
            "INSERT INTO donations (id, cause_id, user_id, amount, covered_fee, total_amount, \
             currency, is_anonymous, is_gift, gift_recipient_name, gift_recipient_email, \
             gift_message, payment_status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {DONATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(*donation.cause_id.as_uuid())
        .bind(donation.user_id.map(Uuid::from))
        .bind(donation.amount)
        .bind(donation.covered_fee)
        .bind(donation.total_amount())
        .bind(&donation.currency)
        .bind(donation.is_anonymous)
        .bind(gift.is_some())
        .bind(gift.map(|g| g.recipient_name.clone()))
        .bind(gift.map(|g| g.recipient_email.clone()))
        .bind(gift.and_then(|g| g.message.clone()))
        .bind(PaymentStatus::Processing.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(persistence)?;

        let transaction_row = sqlx::query_as::<_, TransactionRow>(&format!(
            "INSERT INTO transactions (id, donation_id, payment_method, payment_status) \
             VALUES ($1, $2, $3, $4) RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(donation_row.id)
        .bind(&donation.payment_method)
        .bind(PaymentStatus::Processing.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(persistence)?;

        tx.commit().await.map_err(persistence)?;

        Ok((donation_row.try_into()?, transaction_row.try_into()?))
    }

    async fn attach_invoice(
        &self,
        transaction_id: TransactionId,
        invoice_id: &str,
    ) -> Result<bool, DonationError> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;
        let from = status_strings(PaymentStatus::Initiated.predecessors());

        let donation_id = sqlx::query_scalar::<_, Uuid>(
            "UPDATE transactions \
             SET gateway_reference = $2, \
                 payment_status = CASE WHEN payment_status = ANY($4) THEN $3 ELSE payment_status END, \
                 updated_at = now() \
             WHERE id = $1 AND gateway_reference IS NULL RETURNING donation_id",
        )
        .bind(*transaction_id.as_uuid())
        .bind(invoice_id)
        .bind(PaymentStatus::Initiated.as_str())
        .bind(&from)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => DonationError::Internal(format!(
                "gateway reference {invoice_id} already attached to another transaction"
            )),
            _ => persistence(e),
        })?;

        let Some(donation_id) = donation_id else {
            tx.rollback().await.map_err(persistence)?;
            return Ok(false);
        };

        sqlx::query(
            "UPDATE donations \
             SET payment_id = COALESCE(payment_id, $2), \
                 payment_status = CASE WHEN payment_status = ANY($4) THEN $3 ELSE payment_status END, \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(donation_id)
        .bind(invoice_id)
        .bind(PaymentStatus::Initiated.as_str())
        .bind(&from)
        .execute(&mut *tx)
        .await
        .map_err(persistence)?;

        tx.commit().await.map_err(persistence)?;
        Ok(true)
    }

    async fn attach_payment_id(
        &self,
        transaction_id: TransactionId,
        payment_id: &str,
    ) -> Result<bool, DonationError> {
        let result = sqlx::query(
            "UPDATE transactions SET gateway_payment_id = $2, updated_at = now() \
             WHERE id = $1 AND gateway_payment_id IS NULL",
        )
        .bind(*transaction_id.as_uuid())
        .bind(payment_id)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<Transaction>, DonationError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(*transaction_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .map(Transaction::try_from)
        .transpose()
    }

    async fn find_transaction_by_gateway_ref(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, DonationError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE gateway_reference = $1 OR gateway_payment_id = $1 \
             ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .map(Transaction::try_from)
        .transpose()
    }

    async fn find_donation(
        &self,
        donation_id: DonationId,
    ) -> Result<Option<Donation>, DonationError> {
        sqlx::query_as::<_, DonationRow>(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(*donation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .map(Donation::try_from)
        .transpose()
    }

    async fn current_transaction(
        &self,
        donation_id: DonationId,
    ) -> Result<Option<Transaction>, DonationError> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE donation_id = $1 \
             ORDER BY updated_at DESC, created_at DESC LIMIT 1"
        ))
        .bind(*donation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?
        .map(Transaction::try_from)
        .transpose()
    }

    async fn record_gateway_check(&self, check: &NewGatewayCheck) -> Result<(), DonationError> {
        sqlx::query(
            "INSERT INTO gateway_checks \
             (transaction_id, source, hint, gateway_status, mapped_status, payload) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*check.transaction_id.as_uuid())
        .bind(check.source.as_str())
        .bind(check.hint.as_deref())
        .bind(&check.gateway_status)
        .bind(check.mapped_status.as_str())
        .bind(&check.payload)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(())
    }

    async fn gateway_checks(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<GatewayCheck>, DonationError> {
        sqlx::query_as::<_, GatewayCheckRow>(
            "SELECT id, transaction_id, source, hint, gateway_status, mapped_status, payload, \
             checked_at FROM gateway_checks WHERE transaction_id = $1 ORDER BY id ASC",
        )
        .bind(*transaction_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?
        .into_iter()
        .map(GatewayCheck::try_from)
        .collect()
    }

    async fn apply_terminal_transition(
        &self,
        transaction_id: TransactionId,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<TransitionOutcome, DonationError> {
        let from = status_strings(from);
        let mut tx = self.pool.begin().await.map_err(persistence)?;

        // Concurrent updates of the same row serialize on its lock; the
        // loser re-evaluates the WHERE clause and matches nothing.
        let donation_id = sqlx::query_scalar::<_, Uuid>(
            "UPDATE transactions SET payment_status = $2, updated_at = now() \
             WHERE id = $1 AND payment_status = ANY($3) RETURNING donation_id",
        )
        .bind(*transaction_id.as_uuid())
        .bind(to.as_str())
        .bind(&from)
        .fetch_optional(&mut *tx)
        .await
        .map_err(persistence)?;

        let Some(donation_id) = donation_id else {
            tx.rollback().await.map_err(persistence)?;
            return Ok(TransitionOutcome::not_applied());
        };

        let moved = sqlx::query_as::<_, (Uuid, Decimal)>(
            "UPDATE donations \
             SET payment_status = $2, \
                 completed_at = CASE WHEN $4 THEN now() ELSE completed_at END, \
                 updated_at = now() \
             WHERE id = $1 AND payment_status = ANY($3) AND deleted_at IS NULL \
             RETURNING cause_id, amount",
        )
        .bind(donation_id)
        .bind(to.as_str())
        .bind(&from)
        .bind(to == PaymentStatus::Completed)
        .fetch_optional(&mut *tx)
        .await
        .map_err(persistence)?;

        let cause_raised = match (moved, to) {
            (Some((cause_id, amount)), PaymentStatus::Completed) => {
                Some(increment_cause_raised(&mut tx, cause_id, amount).await?)
            }
            (Some((cause_id, amount)), PaymentStatus::Refunded) => {
                Some(decrement_cause_raised(&mut tx, cause_id, amount).await?)
            }
            _ => None,
        };

        tx.commit().await.map_err(persistence)?;

        Ok(TransitionOutcome {
            was_applied: true,
            donation_transitioned: moved.is_some(),
            cause_raised,
        })
    }
}

#[async_trait]
impl AwardStore for PostgresLedger {
    async fn completed_donations_for(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CompletedDonation>, DonationError> {
        let rows = sqlx::query_as::<_, (Decimal, DateTime<Utc>)>(
            "SELECT amount, COALESCE(completed_at, updated_at) FROM donations \
             WHERE user_id = $1 AND payment_status = 'completed' AND deleted_at IS NULL \
             ORDER BY completed_at ASC",
        )
        .bind(*user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(rows
            .into_iter()
            .map(|(amount, completed_at)| CompletedDonation {
                amount,
                completed_at,
            })
            .collect())
    }

    async fn awards_for(&self, user_id: UserId) -> Result<Vec<AchievementAward>, DonationError> {
        sqlx::query_as::<_, AwardRow>(
            "SELECT user_id, achievement_type, achieved_at FROM achievement_awards \
             WHERE user_id = $1 ORDER BY achieved_at ASC",
        )
        .bind(*user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?
        .into_iter()
        .map(AchievementAward::try_from)
        .collect()
    }

    async fn record_award(
        &self,
        user_id: UserId,
        achievement_type: AchievementType,
        achieved_at: DateTime<Utc>,
    ) -> Result<bool, DonationError> {
        let result = sqlx::query(
            "INSERT INTO achievement_awards (user_id, achievement_type, achieved_at) \
             VALUES ($1, $2, $3) ON CONFLICT (user_id, achievement_type) DO NOTHING",
        )
        .bind(*user_id.as_uuid())
        .bind(achievement_type.as_str())
        .bind(achieved_at)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(result.rows_affected() == 1)
    }
}
