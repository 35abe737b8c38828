//! Wallet service: SMS ingestion, manual adjustments, and claim matching.
//!
//! Balance writes are serialized per tenant: the ledger append and the
//! balance update on the schedule config row happen in one transaction,
//! so `balance_after` chaining holds under concurrency.

use chrono::{Duration, Utc};
use database::bank_sms::{self, NewBankSms};
use database::wallet_transaction::{self, NewWalletTransaction};
use database::{schedule, tenant, BankSms, Database, DatabaseError, TransactionSource,
    WalletTransaction};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::WalletConfig;
use crate::error::{Result, WalletError};
use crate::parser;

/// Direction of a manual balance adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustOperation {
    Add,
    Subtract,
}

/// Result of a balance-changing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    pub tenant_id: i64,
    pub balance_toman: i64,
    pub schedule_version: i64,
    pub transaction_id: i64,
}

/// A claimed top-up to reconcile against the SMS inbox.
#[derive(Debug, Clone, Deserialize)]
pub struct TopUpClaim {
    pub amount_toman: i64,
    /// Jalali date the customer saw on their bank receipt, `YYYY/MM/DD`.
    #[serde(rename = "jalali_date")]
    pub date: String,
    pub hour: u32,
    pub minute: u32,
}

pub struct WalletService {
    db: Database,
    config: WalletConfig,
}

impl WalletService {
    pub fn new(db: Database, config: WalletConfig) -> Self {
        Self { db, config }
    }

    /// Store an inbound SMS. Every message is kept raw regardless of
    /// sender or parse outcome; parse results and the bank-sender flag
    /// ride along for later matching and audit.
    pub async fn ingest(
        &self,
        sender: &str,
        receiver: Option<&str>,
        body: &str,
    ) -> Result<BankSms> {
        let is_bank_sender = self.config.is_bank_sender(sender);
        let parsed = parser::parse_bank_sms(body, &self.config.tz_offset);

        let new_sms = match &parsed {
            Ok(p) => NewBankSms {
                sender: sender.to_string(),
                receiver: receiver.map(str::to_string),
                body: body.to_string(),
                is_bank_sender,
                parsed_amount_rial: Some(p.amount_rial),
                parsed_amount_toman: Some(p.amount_toman),
                parsed_transaction_at: p.transaction_at,
                parsed_is_credit: Some(p.is_credit),
                parse_error: None,
            },
            Err(e) => NewBankSms {
                sender: sender.to_string(),
                receiver: receiver.map(str::to_string),
                body: body.to_string(),
                is_bank_sender,
                parsed_amount_rial: None,
                parsed_amount_toman: None,
                parsed_transaction_at: None,
                parsed_is_credit: None,
                parse_error: Some(e.code().to_string()),
            },
        };

        let stored = bank_sms::insert_sms(self.db.pool(), &new_sms).await?;

        match &parsed {
            Ok(p) => info!(
                sms_id = stored.id,
                sender,
                is_bank_sender,
                amount_toman = p.amount_toman,
                is_credit = p.is_credit,
                "ingested sms"
            ),
            Err(e) => warn!(sms_id = stored.id, sender, code = e.code(), "ingested unparsed sms"),
        }

        Ok(stored)
    }

    /// Operator-initiated balance change. The ledger entry and balance
    /// write commit together.
    pub async fn manual_adjust(
        &self,
        tenant_slug: &str,
        amount_toman: i64,
        operation: AdjustOperation,
        note: Option<String>,
        created_by_agent_id: Option<i64>,
    ) -> Result<BalanceSnapshot> {
        if amount_toman <= 0 {
            return Err(WalletError::Validation(
                "amount_toman must be positive".to_string(),
            ));
        }
        let signed = match operation {
            AdjustOperation::Add => amount_toman,
            AdjustOperation::Subtract => -amount_toman,
        };

        let tenant = tenant::get_active_by_slug(self.db.pool(), tenant_slug).await?;
        schedule::get_or_create_config(self.db.pool(), tenant.id).await?;

        let mut tx = schedule::begin_ledger_tx(self.db.pool()).await?;
        let config = schedule::get_config_tx(&mut tx, tenant.id).await?;
        let balance_after = config.wallet_balance + signed;

        let transaction_id = wallet_transaction::append(
            &mut tx,
            &NewWalletTransaction {
                tenant_id: tenant.id,
                amount_toman: signed,
                balance_after,
                source: TransactionSource::ManualAdjust,
                note,
                transaction_at: Utc::now(),
                created_by_agent_id,
                bank_sms_id: None,
            },
        )
        .await?;
        schedule::apply_balance(&mut tx, tenant.id, balance_after).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        let config = schedule::get_config(self.db.pool(), tenant.id).await?;
        info!(
            tenant = tenant_slug,
            amount = signed,
            balance = balance_after,
            "manual adjustment"
        );

        Ok(BalanceSnapshot {
            tenant_id: tenant.id,
            balance_toman: config.wallet_balance,
            schedule_version: config.version,
            transaction_id,
        })
    }

    /// Reconcile a claimed top-up against the SMS inbox and credit the
    /// wallet. Exactly one unconsumed bank credit must match the claimed
    /// amount within the tolerance window around the claimed minute; the
    /// guarded consume plus the unique ledger index make the charge
    /// exactly-once even under concurrent identical claims.
    pub async fn match_and_charge(
        &self,
        tenant_slug: &str,
        claim: &TopUpClaim,
        created_by_agent_id: Option<i64>,
    ) -> Result<BalanceSnapshot> {
        if claim.amount_toman <= 0 {
            return Err(WalletError::Validation(
                "amount_toman must be positive".to_string(),
            ));
        }
        let claimed_at = crate::jalali::minute_to_utc(
            &claim.date,
            claim.hour,
            claim.minute,
            &self.config.tz_offset,
        )?;

        let tenant = tenant::get_active_by_slug(self.db.pool(), tenant_slug).await?;
        schedule::get_or_create_config(self.db.pool(), tenant.id).await?;

        let tolerance = Duration::seconds(self.config.match_tolerance_secs);
        let candidates = bank_sms::find_match_candidates(
            self.db.pool(),
            claim.amount_toman,
            claimed_at - tolerance,
            claimed_at + tolerance,
        )
        .await?;

        let sms = match candidates.as_slice() {
            [] => {
                return Err(WalletError::NoMatch(format!(
                    "no unconsumed bank credit of {} toman near the claimed time",
                    claim.amount_toman
                )))
            }
            [one] => one.clone(),
            many => {
                return Err(WalletError::AmbiguousMatch {
                    candidates: many.len(),
                })
            }
        };

        let mut tx = schedule::begin_ledger_tx(self.db.pool()).await?;
        if !bank_sms::consume(&mut tx, sms.id).await? {
            return Err(WalletError::NoMatch(
                "matched sms was already consumed".to_string(),
            ));
        }
        let config = schedule::get_config_tx(&mut tx, tenant.id).await?;
        let balance_after = config.wallet_balance + claim.amount_toman;

        let appended = wallet_transaction::append(
            &mut tx,
            &NewWalletTransaction {
                tenant_id: tenant.id,
                amount_toman: claim.amount_toman,
                balance_after,
                source: TransactionSource::BankMatch,
                note: Some(format!("matched sms from {}", sms.sender)),
                transaction_at: sms.parsed_transaction_at.unwrap_or(claimed_at),
                created_by_agent_id,
                bank_sms_id: Some(sms.id),
            },
        )
        .await;
        let transaction_id = match appended {
            Ok(id) => id,
            // The unique index on bank_sms_id backstops the consume guard.
            Err(DatabaseError::AlreadyExists { .. }) => {
                return Err(WalletError::NoMatch(
                    "matched sms already funded a transaction".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        schedule::apply_balance(&mut tx, tenant.id, balance_after).await?;
        tx.commit().await.map_err(DatabaseError::from)?;

        let config = schedule::get_config(self.db.pool(), tenant.id).await?;
        info!(
            tenant = tenant_slug,
            sms_id = sms.id,
            amount = claim.amount_toman,
            balance = balance_after,
            "matched top-up"
        );

        Ok(BalanceSnapshot {
            tenant_id: tenant.id,
            balance_toman: config.wallet_balance,
            schedule_version: config.version,
            transaction_id,
        })
    }

    /// A tenant's ledger page (newest first) plus the total entry count.
    pub async fn list_transactions(
        &self,
        tenant_slug: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WalletTransaction>, i64)> {
        let tenant = tenant::get_active_by_slug(self.db.pool(), tenant_slug).await?;
        let rows =
            wallet_transaction::list_for_tenant(self.db.pool(), tenant.id, limit, offset).await?;
        let total = wallet_transaction::count_for_tenant(self.db.pool(), tenant.id).await?;
        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const BANK_PREFIX: &str = "+9820";

    async fn service() -> WalletService {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        WalletService::new(db, WalletConfig::tehran(vec![BANK_PREFIX.to_string()]))
    }

    async fn make_tenant(svc: &WalletService, slug: &str) {
        tenant::create_tenant(svc.db.pool(), slug, slug).await.unwrap();
    }

    fn claim_7m() -> TopUpClaim {
        TopUpClaim {
            amount_toman: 7_000_000,
            date: "1404/11/13".to_string(),
            hour: 14,
            minute: 3,
        }
    }

    const CREDIT_BODY: &str = "70,000,000+\n1404/11/13-14:03\nمانده:70,694,954";

    #[tokio::test]
    async fn test_ingest_stores_parse_results() {
        let svc = service().await;
        let sms = svc.ingest("+982000075", None, CREDIT_BODY).await.unwrap();
        assert!(sms.is_bank_sender);
        assert_eq!(sms.parsed_amount_toman, Some(7_000_000));
        assert_eq!(sms.parsed_is_credit, Some(true));
        assert!(sms.parsed_transaction_at.is_some());
        assert!(sms.parse_error.is_none());
        assert!(!sms.consumed);
    }

    #[tokio::test]
    async fn test_ingest_keeps_non_bank_and_unparsable_messages() {
        let svc = service().await;

        let sms = svc.ingest("09121234567", None, CREDIT_BODY).await.unwrap();
        assert!(!sms.is_bank_sender);
        assert_eq!(sms.parsed_amount_toman, Some(7_000_000));

        let sms = svc
            .ingest("+982000075", None, "1404/11/13-14:03\nبدون مبلغ")
            .await
            .unwrap();
        assert_eq!(sms.parse_error.as_deref(), Some("amount_sign_not_found"));
        assert_eq!(sms.parsed_amount_toman, None);
    }

    #[tokio::test]
    async fn test_manual_adjust_chains_balances() {
        let svc = service().await;
        make_tenant(&svc, "acme").await;

        let snap = svc
            .manual_adjust("acme", 5_000, AdjustOperation::Add, None, None)
            .await
            .unwrap();
        assert_eq!(snap.balance_toman, 5_000);

        let snap = svc
            .manual_adjust("acme", 2_000, AdjustOperation::Subtract, Some("refund".into()), None)
            .await
            .unwrap();
        assert_eq!(snap.balance_toman, 3_000);

        let ledger = wallet_transaction::list_chronological(svc.db.pool(), snap.tenant_id)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 2);
        let mut prev = 0;
        for entry in &ledger {
            assert_eq!(entry.balance_after, prev + entry.amount_toman);
            prev = entry.balance_after;
        }
        let config = schedule::get_config(svc.db.pool(), snap.tenant_id).await.unwrap();
        assert_eq!(config.wallet_balance, prev);
    }

    #[tokio::test]
    async fn test_concurrent_adjusts_queue_on_the_config_row() {
        let svc = Arc::new(service().await);
        make_tenant(&svc, "acme").await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let svc = Arc::clone(&svc);
            handles.push(tokio::spawn(async move {
                svc.manual_adjust("acme", 1_000, AdjustOperation::Add, None, None)
                    .await
            }));
        }
        // Every writer commits; none is aborted by a lock-upgrade race.
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let tenant = tenant::get_active_by_slug(svc.db.pool(), "acme").await.unwrap();
        let ledger = wallet_transaction::list_chronological(svc.db.pool(), tenant.id)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 10);
        let mut prev = 0;
        for entry in &ledger {
            assert_eq!(entry.balance_after, prev + entry.amount_toman);
            prev = entry.balance_after;
        }
        assert_eq!(prev, 10_000);
        let config = schedule::get_config(svc.db.pool(), tenant.id).await.unwrap();
        assert_eq!(config.wallet_balance, 10_000);
    }

    #[tokio::test]
    async fn test_chain_holds_across_interleaved_adjusts_and_matches() {
        let svc = service().await;
        make_tenant(&svc, "acme").await;
        svc.ingest("+982000075", None, CREDIT_BODY).await.unwrap();
        svc.ingest("+982000075", None, "30,000,000+\n1404/11/13-16:30")
            .await
            .unwrap();

        svc.manual_adjust("acme", 1_000, AdjustOperation::Add, None, None)
            .await
            .unwrap();
        svc.match_and_charge("acme", &claim_7m(), None).await.unwrap();
        svc.manual_adjust("acme", 500, AdjustOperation::Subtract, None, None)
            .await
            .unwrap();
        let snap = svc
            .match_and_charge(
                "acme",
                &TopUpClaim {
                    amount_toman: 3_000_000,
                    date: "1404/11/13".to_string(),
                    hour: 16,
                    minute: 30,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(snap.balance_toman, 1_000 + 7_000_000 - 500 + 3_000_000);

        let ledger = wallet_transaction::list_chronological(svc.db.pool(), snap.tenant_id)
            .await
            .unwrap();
        let sources: Vec<TransactionSource> = ledger.iter().map(|e| e.source).collect();
        assert_eq!(
            sources,
            vec![
                TransactionSource::ManualAdjust,
                TransactionSource::BankMatch,
                TransactionSource::ManualAdjust,
                TransactionSource::BankMatch,
            ]
        );
        let mut prev = 0;
        for entry in &ledger {
            assert_eq!(entry.balance_after, prev + entry.amount_toman);
            prev = entry.balance_after;
        }
        let config = schedule::get_config(svc.db.pool(), snap.tenant_id).await.unwrap();
        assert_eq!(config.wallet_balance, prev);
    }

    #[tokio::test]
    async fn test_manual_adjust_rejects_non_positive_amounts() {
        let svc = service().await;
        make_tenant(&svc, "acme").await;
        let err = svc
            .manual_adjust("acme", 0, AdjustOperation::Add, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Validation(_)));
    }

    #[tokio::test]
    async fn test_match_charges_exactly_once() {
        let svc = service().await;
        make_tenant(&svc, "acme").await;
        let sms = svc.ingest("+982000075", None, CREDIT_BODY).await.unwrap();

        let snap = svc.match_and_charge("acme", &claim_7m(), None).await.unwrap();
        assert_eq!(snap.balance_toman, 7_000_000);

        let consumed = bank_sms::get_sms(svc.db.pool(), sms.id).await.unwrap();
        assert!(consumed.consumed);
        assert!(consumed.consumed_at.is_some());

        // The same claim cannot fund a second transaction.
        let err = svc.match_and_charge("acme", &claim_7m(), None).await.unwrap_err();
        assert!(matches!(err, WalletError::NoMatch(_)));
        let ledger = wallet_transaction::list_chronological(svc.db.pool(), snap.tenant_id)
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].bank_sms_id, Some(sms.id));
        assert_eq!(ledger[0].source, TransactionSource::BankMatch);
    }

    #[tokio::test]
    async fn test_match_respects_tolerance_window() {
        let svc = service().await;
        make_tenant(&svc, "acme").await;
        svc.ingest("+982000075", None, CREDIT_BODY).await.unwrap();

        // 14:05 claimed vs 14:03 in the SMS: exactly at the 120s edge.
        let mut claim = claim_7m();
        claim.minute = 5;
        svc.match_and_charge("acme", &claim, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_match_rejects_outside_tolerance_and_wrong_amount() {
        let svc = service().await;
        make_tenant(&svc, "acme").await;
        svc.ingest("+982000075", None, CREDIT_BODY).await.unwrap();

        let mut late = claim_7m();
        late.minute = 6;
        assert!(matches!(
            svc.match_and_charge("acme", &late, None).await.unwrap_err(),
            WalletError::NoMatch(_)
        ));

        let mut wrong_amount = claim_7m();
        wrong_amount.amount_toman = 6_000_000;
        assert!(matches!(
            svc.match_and_charge("acme", &wrong_amount, None).await.unwrap_err(),
            WalletError::NoMatch(_)
        ));
    }

    #[tokio::test]
    async fn test_match_refuses_ambiguous_claims() {
        let svc = service().await;
        make_tenant(&svc, "acme").await;
        svc.ingest("+982000075", None, CREDIT_BODY).await.unwrap();
        svc.ingest("+982000076", None, CREDIT_BODY).await.unwrap();

        let err = svc.match_and_charge("acme", &claim_7m(), None).await.unwrap_err();
        assert!(matches!(err, WalletError::AmbiguousMatch { candidates: 2 }));
    }

    #[tokio::test]
    async fn test_match_ignores_debits_and_non_bank_senders() {
        let svc = service().await;
        make_tenant(&svc, "acme").await;
        // Right amount and time, but a debit.
        svc.ingest("+982000075", None, "70,000,000-\n1404/11/13-14:03")
            .await
            .unwrap();
        // Right amount and time, but not from a bank sender.
        svc.ingest("09121234567", None, CREDIT_BODY).await.unwrap();

        let err = svc.match_and_charge("acme", &claim_7m(), None).await.unwrap_err();
        assert!(matches!(err, WalletError::NoMatch(_)));
    }

    #[tokio::test]
    async fn test_match_rejects_malformed_claim_date() {
        let svc = service().await;
        make_tenant(&svc, "acme").await;
        let mut claim = claim_7m();
        claim.date = "1404-11-13".to_string();
        assert!(matches!(
            svc.match_and_charge("acme", &claim, None).await.unwrap_err(),
            WalletError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_list_transactions_pages_newest_first() {
        let svc = service().await;
        make_tenant(&svc, "acme").await;
        for amount in [1_000, 2_000, 3_000] {
            svc.manual_adjust("acme", amount, AdjustOperation::Add, None, None)
                .await
                .unwrap();
        }
        let (page, total) = svc.list_transactions("acme", 2, 0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].amount_toman, 3_000);
    }
}
