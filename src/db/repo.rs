//! Repository layer for database operations.

use crate::domain::{
    ContentId, Credits, CreditTransaction, DomainMetrics, InstructionStatus, Opportunity,
    OpportunityId, OpportunityStatus, PlacementAttempt, PlacementInstruction, PlacementMethod,
    TimeMs, TransactionKind, UserId,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use thiserror::Error;

/// Error from the atomic ledger write.
#[derive(Debug, Error)]
pub enum ApplyTransactionError {
    #[error("unknown user: {0}")]
    UnknownUser(UserId),
    #[error("concurrent balance update for user {0}")]
    Conflict(UserId),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Repository for database operations.
#[derive(Debug)]
pub struct Repository {
    pool: SqlitePool,
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // ---- users ----

    /// Insert a user row. Users are normally created by the surrounding
    /// product; this exists for seeding and tests.
    pub async fn insert_user(
        &self,
        id: UserId,
        email: &str,
        balance: Credits,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, email, credit_balance, created_at_ms) VALUES (?, ?, ?, ?)",
        )
        .bind(id.as_i64())
        .bind(email)
        .bind(balance.to_canonical_string())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Current denormalized balance, or None for an unknown user.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored amount is corrupt.
    pub async fn get_balance(&self, user_id: UserId) -> Result<Option<Credits>, sqlx::Error> {
        let row = sqlx::query("SELECT credit_balance FROM users WHERE id = ?")
            .bind(user_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let raw: String = r.get("credit_balance");
            Credits::from_str_canonical(&raw)
                .map_err(|e| decode_err(format!("bad credit_balance {:?}: {}", raw, e)))
        })
        .transpose()
    }

    pub async fn get_user_id_by_email(&self, email: &str) -> Result<Option<UserId>, sqlx::Error> {
        let row = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserId::new(r.get("id"))))
    }

    // ---- opportunities ----

    /// Insert an opportunity row (seeding and tests; the matching process
    /// owns creation in production).
    pub async fn insert_opportunity(&self, opp: &Opportunity) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO opportunities (
                id, source_user_id, target_user_id, source_content_id, target_content_id,
                suggested_target_url, suggested_anchor_text, suggested_placement_context,
                match_score, estimated_value, status, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(opp.id.as_i64())
        .bind(opp.source_user_id.as_i64())
        .bind(opp.target_user_id.as_i64())
        .bind(opp.source_content_id.as_i64())
        .bind(opp.target_content_id.as_i64())
        .bind(&opp.suggested_target_url)
        .bind(&opp.suggested_anchor_text)
        .bind(&opp.suggested_placement_context)
        .bind(opp.match_score)
        .bind(opp.estimated_value.to_canonical_string())
        .bind(opp.status.as_str())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_opportunity(
        &self,
        id: OpportunityId,
    ) -> Result<Option<Opportunity>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM opportunities WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_opportunity).transpose()
    }

    /// Attemptable opportunities for a source user, best match first.
    pub async fn list_attemptable_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Opportunity>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM opportunities
            WHERE source_user_id = ? AND status IN ('pending', 'approved')
            ORDER BY match_score DESC, id ASC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_opportunity).collect()
    }

    /// Transition an opportunity to placed, recording placement metadata.
    ///
    /// The status guard keeps transitions monotonic: a row already placed or
    /// failed is left untouched and `false` is returned.
    pub async fn mark_opportunity_placed(
        &self,
        id: OpportunityId,
        placement_url: Option<&str>,
        method: PlacementMethod,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE opportunities
            SET status = 'placed', placement_url = ?, placement_method = ?, placed_at_ms = ?
            WHERE id = ? AND status IN ('pending', 'approved')
            "#,
        )
        .bind(placement_url)
        .bind(method.as_str())
        .bind(TimeMs::now().as_ms())
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition an opportunity to failed. Same monotonicity guard as
    /// `mark_opportunity_placed`.
    pub async fn mark_opportunity_failed(&self, id: OpportunityId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE opportunities
            SET status = 'failed'
            WHERE id = ? AND status IN ('pending', 'approved')
            "#,
        )
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- placement instructions ----

    /// Upsert the instruction for an opportunity (at most one live row per
    /// opportunity). Re-running a placement refreshes the payload in place.
    pub async fn upsert_instruction(
        &self,
        instruction: &PlacementInstruction,
    ) -> Result<(), sqlx::Error> {
        let now = TimeMs::now().as_ms();
        sqlx::query(
            r#"
            INSERT INTO placement_instructions (
                opportunity_id, token, target_url, anchor_text, sentence_html,
                target_content_id, status, created_at_ms, updated_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(opportunity_id) DO UPDATE SET
                token = excluded.token,
                target_url = excluded.target_url,
                anchor_text = excluded.anchor_text,
                sentence_html = excluded.sentence_html,
                target_content_id = excluded.target_content_id,
                updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(instruction.opportunity_id.as_i64())
        .bind(&instruction.token)
        .bind(&instruction.target_url)
        .bind(&instruction.anchor_text)
        .bind(&instruction.sentence_html)
        .bind(instruction.target_content_id.as_i64())
        .bind(instruction.status.as_str())
        .bind(instruction.created_at.as_ms())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_instruction_by_opportunity(
        &self,
        opportunity_id: OpportunityId,
    ) -> Result<Option<PlacementInstruction>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM placement_instructions WHERE opportunity_id = ?")
            .bind(opportunity_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_instruction).transpose()
    }

    /// Number of not-yet-completed instructions aimed at one target content
    /// item. The scheduler caps this to avoid saturating a single page.
    pub async fn count_live_instructions_for_target(
        &self,
        target_content_id: ContentId,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM placement_instructions
            WHERE target_content_id = ? AND status = 'pending'
            "#,
        )
        .bind(target_content_id.as_i64())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    /// Flip an instruction to completed. Called on behalf of the out-of-band
    /// consumer report; the engine itself never assumes execution timing.
    pub async fn mark_instruction_completed(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE placement_instructions
            SET status = 'completed', updated_at_ms = ?
            WHERE token = ? AND status = 'pending'
            "#,
        )
        .bind(TimeMs::now().as_ms())
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- placement attempts ----

    /// Append an attempt to the audit log.
    pub async fn insert_attempt(&self, attempt: &PlacementAttempt) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO placement_attempts (
                opportunity_id, run_id, target_domain, method, success,
                verification_success, response_time_ms, error, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.opportunity_id.as_i64())
        .bind(&attempt.run_id)
        .bind(&attempt.target_domain)
        .bind(attempt.method.as_str())
        .bind(attempt.success as i64)
        .bind(attempt.verification_success as i64)
        .bind(attempt.response_time_ms)
        .bind(&attempt.error)
        .bind(attempt.created_at.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_attempts_for_opportunity(
        &self,
        opportunity_id: OpportunityId,
    ) -> Result<Vec<PlacementAttempt>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM placement_attempts WHERE opportunity_id = ? ORDER BY id ASC",
        )
        .bind(opportunity_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_attempt).collect()
    }

    // ---- credit ledger ----

    /// Apply one signed ledger mutation as a single logical unit.
    ///
    /// Reads the balance, writes the transaction row with
    /// balance_before/balance_after, and updates the denormalized balance
    /// with a compare-and-set guard, all inside one database transaction.
    /// A CAS miss means another writer touched this user concurrently; the
    /// caller sees `Conflict` and nothing is written.
    pub async fn apply_transaction(
        &self,
        user_id: UserId,
        kind: TransactionKind,
        amount: Credits,
        description: &str,
        opportunity_id: Option<OpportunityId>,
        refund_reason: Option<&str>,
    ) -> Result<CreditTransaction, ApplyTransactionError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT credit_balance FROM users WHERE id = ?")
            .bind(user_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ApplyTransactionError::UnknownUser(user_id))?;

        let raw: String = row.get("credit_balance");
        let balance_before = Credits::from_str_canonical(&raw)
            .map_err(|e| decode_err(format!("bad credit_balance {:?}: {}", raw, e)))?;
        let balance_after = balance_before + amount;

        let updated = sqlx::query(
            "UPDATE users SET credit_balance = ? WHERE id = ? AND credit_balance = ?",
        )
        .bind(balance_after.to_canonical_string())
        .bind(user_id.as_i64())
        .bind(balance_before.to_canonical_string())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(ApplyTransactionError::Conflict(user_id));
        }

        let created_at = TimeMs::now();
        sqlx::query(
            r#"
            INSERT INTO credit_transactions (
                user_id, kind, amount, balance_before, balance_after,
                description, opportunity_id, refund_reason, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id.as_i64())
        .bind(kind.as_str())
        .bind(amount.to_canonical_string())
        .bind(balance_before.to_canonical_string())
        .bind(balance_after.to_canonical_string())
        .bind(description)
        .bind(opportunity_id.map(|id| id.as_i64()))
        .bind(refund_reason)
        .bind(created_at.as_ms())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CreditTransaction {
            user_id,
            kind,
            amount,
            balance_before,
            balance_after,
            description: description.to_string(),
            opportunity_id,
            refund_reason: refund_reason.map(String::from),
            created_at,
        })
    }

    pub async fn list_transactions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CreditTransaction>, sqlx::Error> {
        let rows =
            sqlx::query("SELECT * FROM credit_transactions WHERE user_id = ? ORDER BY id ASC")
                .bind(user_id.as_i64())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(map_transaction).collect()
    }

    /// Running sum of a user's ledger rows. Must always equal the
    /// denormalized balance minus the seeded starting balance.
    pub async fn sum_transactions(&self, user_id: UserId) -> Result<Credits, sqlx::Error> {
        let txs = self.list_transactions_for_user(user_id).await?;
        Ok(txs
            .into_iter()
            .fold(Credits::zero(), |acc, tx| acc + tx.amount))
    }

    // ---- domain metrics ----

    /// Upsert cached site facts for a user (normally written by the external
    /// metrics-refresh job; this engine reads only).
    pub async fn upsert_domain_metrics(&self, metrics: &DomainMetrics) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO domain_metrics (
                user_id, site_url, domain, wp_api_enabled, wp_username,
                wp_app_password, authority_score, refreshed_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                site_url = excluded.site_url,
                domain = excluded.domain,
                wp_api_enabled = excluded.wp_api_enabled,
                wp_username = excluded.wp_username,
                wp_app_password = excluded.wp_app_password,
                authority_score = excluded.authority_score,
                refreshed_at_ms = excluded.refreshed_at_ms
            "#,
        )
        .bind(metrics.user_id.as_i64())
        .bind(&metrics.site_url)
        .bind(&metrics.domain)
        .bind(metrics.wp_api_enabled as i64)
        .bind(&metrics.wp_username)
        .bind(&metrics.wp_app_password)
        .bind(metrics.authority_score)
        .bind(metrics.refreshed_at.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_domain_metrics(
        &self,
        user_id: UserId,
    ) -> Result<Option<DomainMetrics>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM domain_metrics WHERE user_id = ?")
            .bind(user_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| DomainMetrics {
            user_id: UserId::new(r.get("user_id")),
            site_url: r.get("site_url"),
            domain: r.get("domain"),
            wp_api_enabled: r.get::<i64, _>("wp_api_enabled") != 0,
            wp_username: r.get("wp_username"),
            wp_app_password: r.get("wp_app_password"),
            authority_score: r.get("authority_score"),
            refreshed_at: TimeMs::new(r.get("refreshed_at_ms")),
        }))
    }
}

fn map_opportunity(row: SqliteRow) -> Result<Opportunity, sqlx::Error> {
    let status_raw: String = row.get("status");
    let status = OpportunityStatus::parse(&status_raw)
        .ok_or_else(|| decode_err(format!("bad opportunity status {:?}", status_raw)))?;

    let value_raw: String = row.get("estimated_value");
    let estimated_value = Credits::from_str_canonical(&value_raw)
        .map_err(|e| decode_err(format!("bad estimated_value {:?}: {}", value_raw, e)))?;

    Ok(Opportunity {
        id: OpportunityId::new(row.get("id")),
        source_user_id: UserId::new(row.get("source_user_id")),
        target_user_id: UserId::new(row.get("target_user_id")),
        source_content_id: ContentId::new(row.get("source_content_id")),
        target_content_id: ContentId::new(row.get("target_content_id")),
        suggested_target_url: row.get("suggested_target_url"),
        suggested_anchor_text: row.get("suggested_anchor_text"),
        suggested_placement_context: row.get("suggested_placement_context"),
        match_score: row.get("match_score"),
        estimated_value,
        status,
        placement_url: row.get("placement_url"),
        placement_method: row.get("placement_method"),
        placed_at: row
            .get::<Option<i64>, _>("placed_at_ms")
            .map(TimeMs::new),
    })
}

fn map_instruction(row: SqliteRow) -> Result<PlacementInstruction, sqlx::Error> {
    let status_raw: String = row.get("status");
    let status = InstructionStatus::parse(&status_raw)
        .ok_or_else(|| decode_err(format!("bad instruction status {:?}", status_raw)))?;

    Ok(PlacementInstruction {
        opportunity_id: OpportunityId::new(row.get("opportunity_id")),
        token: row.get("token"),
        target_url: row.get("target_url"),
        anchor_text: row.get("anchor_text"),
        sentence_html: row.get("sentence_html"),
        target_content_id: ContentId::new(row.get("target_content_id")),
        status,
        created_at: TimeMs::new(row.get("created_at_ms")),
    })
}

fn map_attempt(row: SqliteRow) -> Result<PlacementAttempt, sqlx::Error> {
    let method_raw: String = row.get("method");
    let method = PlacementMethod::parse(&method_raw)
        .ok_or_else(|| decode_err(format!("bad attempt method {:?}", method_raw)))?;

    Ok(PlacementAttempt {
        opportunity_id: OpportunityId::new(row.get("opportunity_id")),
        run_id: row.get("run_id"),
        target_domain: row.get("target_domain"),
        method,
        success: row.get::<i64, _>("success") != 0,
        verification_success: row.get::<i64, _>("verification_success") != 0,
        response_time_ms: row.get("response_time_ms"),
        error: row.get("error"),
        created_at: TimeMs::new(row.get("created_at_ms")),
    })
}

fn map_transaction(row: SqliteRow) -> Result<CreditTransaction, sqlx::Error> {
    let kind_raw: String = row.get("kind");
    let kind = TransactionKind::parse(&kind_raw)
        .ok_or_else(|| decode_err(format!("bad transaction kind {:?}", kind_raw)))?;

    let parse = |col: &str| -> Result<Credits, sqlx::Error> {
        let raw: String = row.get(col);
        Credits::from_str_canonical(&raw)
            .map_err(|e| decode_err(format!("bad {} {:?}: {}", col, raw, e)))
    };

    Ok(CreditTransaction {
        user_id: UserId::new(row.get("user_id")),
        kind,
        amount: parse("amount")?,
        balance_before: parse("balance_before")?,
        balance_after: parse("balance_after")?,
        description: row.get("description"),
        opportunity_id: row
            .get::<Option<i64>, _>("opportunity_id")
            .map(OpportunityId::new),
        refund_reason: row.get("refund_reason"),
        created_at: TimeMs::new(row.get("created_at_ms")),
    })
}
