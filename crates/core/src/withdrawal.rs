//! Bank accounts, wallet balances and withdrawal requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::events::MarketEvent;
use crate::fees::FeeQuote;
use crate::market::Marketplace;
use crate::money::Kobo;

pub const ACCOUNT_NUMBER_LENGTH: usize = 10;

/// Resolves the holder name registered for a bank account.
///
/// Implementations talk to a bank-verification vendor; `Ok(None)` means the
/// account could not be resolved.
pub trait AccountNameLookup: Send + Sync {
    fn resolve(&self, bank_code: &str, account_number: &str) -> MarketResult<Option<String>>;
}

/// Fixed lookup table. Stands in for the vendor in sandbox setups and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAccountDirectory {
    accounts: HashMap<(String, String), String>,
}

impl StaticAccountDirectory {
    pub fn with_account(mut self, bank_code: &str, account_number: &str, name: &str) -> Self {
        self.insert(bank_code, account_number, name);
        self
    }

    pub fn insert(&mut self, bank_code: &str, account_number: &str, name: &str) {
        self.accounts.insert(
            (bank_code.to_string(), account_number.to_string()),
            name.to_string(),
        );
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountNameLookup for StaticAccountDirectory {
    fn resolve(&self, bank_code: &str, account_number: &str) -> MarketResult<Option<String>> {
        Ok(self
            .accounts
            .get(&(bank_code.to_string(), account_number.to_string()))
            .cloned())
    }
}

fn name_tokens(name: &str) -> BTreeSet<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Case- and order-insensitive holder name comparison. Names with more than
/// one word must share at least two; a single-word name must match exactly.
pub fn names_match(registered: &str, supplied: &str) -> bool {
    let registered = name_tokens(registered);
    let supplied = name_tokens(supplied);
    if registered.is_empty() || supplied.is_empty() {
        return false;
    }
    if registered.len() == 1 || supplied.len() == 1 {
        return registered == supplied;
    }
    registered.intersection(&supplied).count() >= 2
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub is_default: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBankAccount {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
            WithdrawalStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bank_account_id: Uuid,
    pub amount: Kobo,
    pub fee: Kobo,
    pub net_amount: Kobo,
    /// Transfer reference echoed back by the payout provider
    pub reference: String,
    pub status: WithdrawalStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: Kobo,
}

fn validate_account_details(input: &NewBankAccount) -> MarketResult<()> {
    let account_ok = input.account_number.len() == ACCOUNT_NUMBER_LENGTH
        && input.account_number.bytes().all(|b| b.is_ascii_digit());
    if !account_ok {
        return Err(MarketError::Validation(format!(
            "account number must be {ACCOUNT_NUMBER_LENGTH} digits"
        )));
    }
    let code_ok = (3..=6).contains(&input.bank_code.len())
        && input.bank_code.bytes().all(|b| b.is_ascii_digit());
    if !code_ok {
        return Err(MarketError::Validation(
            "bank code must be 3 to 6 digits".to_string(),
        ));
    }
    if input.account_name.trim().is_empty() {
        return Err(MarketError::Validation("account name is required".to_string()));
    }
    Ok(())
}

impl Marketplace {
    // ---- bank accounts ----

    /// Register a payout account. It is marked verified when the name the bank
    /// holds for it matches the name supplied.
    pub fn add_bank_account(
        &self,
        user_id: Uuid,
        input: NewBankAccount,
    ) -> MarketResult<BankAccount> {
        validate_account_details(&input)?;
        self.store.read().verified_user(user_id)?;

        let resolved = self
            .accounts
            .resolve(&input.bank_code, &input.account_number)?;
        let (account_name, is_verified) = match resolved {
            Some(registered) if names_match(&registered, &input.account_name) => (registered, true),
            Some(_) => {
                tracing::info!(%user_id, bank_code = %input.bank_code, "bank account name mismatch");
                (input.account_name.trim().to_string(), false)
            }
            None => (input.account_name.trim().to_string(), false),
        };

        let mut tables = self.store.write();
        let duplicate = tables.bank_accounts.values().any(|a| {
            a.user_id == user_id
                && a.bank_code == input.bank_code
                && a.account_number == input.account_number
        });
        if duplicate {
            return Err(MarketError::AlreadyExists("this bank account".to_string()));
        }
        let is_default = !tables.bank_accounts.values().any(|a| a.user_id == user_id);
        let account = BankAccount {
            id: Uuid::new_v4(),
            user_id,
            bank_code: input.bank_code,
            account_number: input.account_number,
            account_name,
            is_default,
            is_verified,
            created_at: Utc::now(),
        };
        tables.bank_accounts.insert(account.id, account.clone());
        tables.publish(MarketEvent::BankAccountAdded {
            bank_account_id: account.id,
            user_id,
            verified: is_verified,
        });
        Ok(account)
    }

    pub fn set_default_bank_account(
        &self,
        user_id: Uuid,
        bank_account_id: Uuid,
    ) -> MarketResult<BankAccount> {
        let mut tables = self.store.write();
        if tables.bank_account(bank_account_id)?.user_id != user_id {
            return Err(MarketError::Forbidden("not your bank account".to_string()));
        }
        let mut chosen = None;
        for account in tables
            .bank_accounts
            .values_mut()
            .filter(|a| a.user_id == user_id)
        {
            account.is_default = account.id == bank_account_id;
            if account.is_default {
                chosen = Some(account.clone());
            }
        }
        chosen.ok_or_else(|| MarketError::not_found("bank account", bank_account_id))
    }

    pub fn bank_accounts(&self, user_id: Uuid) -> MarketResult<Vec<BankAccount>> {
        let tables = self.store.read();
        tables.user(user_id)?;
        let mut accounts: Vec<BankAccount> = tables
            .bank_accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    // ---- wallet ----

    pub fn balance(&self, user_id: Uuid) -> MarketResult<Kobo> {
        let tables = self.store.read();
        tables.user(user_id)?;
        Ok(tables.balance(user_id))
    }

    pub fn wallet(&self, user_id: Uuid) -> MarketResult<Wallet> {
        Ok(Wallet {
            user_id,
            balance: self.balance(user_id)?,
        })
    }

    // ---- withdrawals ----

    /// Fee quote for a withdrawal, including the minimum-amount rule.
    pub fn quote_withdrawal(&self, amount: Kobo) -> MarketResult<FeeQuote> {
        if amount < self.settings.min_withdrawal {
            return Err(MarketError::InvalidAmount(format!(
                "minimum withdrawal is {}",
                crate::money::format_naira(self.settings.min_withdrawal)
            )));
        }
        self.settings.withdrawal_fees.quote(amount)
    }

    /// Debit the wallet and record a pending payout to one of the user's
    /// verified bank accounts. The PIN is checked before anything else is
    /// looked at.
    pub fn request_withdrawal(
        &self,
        user_id: Uuid,
        amount: Kobo,
        bank_account_id: Uuid,
        pin: &str,
    ) -> MarketResult<WithdrawalRequest> {
        self.require_pin(user_id, pin)?;
        let quote = self.quote_withdrawal(amount)?;

        let mut tables = self.store.write();
        tables.verified_user(user_id)?;
        let account = tables.bank_account(bank_account_id)?;
        if account.user_id != user_id {
            return Err(MarketError::Forbidden("not your bank account".to_string()));
        }
        if !account.is_verified {
            return Err(MarketError::Validation(
                "bank account has not been verified".to_string(),
            ));
        }
        tables.debit(user_id, quote.amount)?;

        let now = Utc::now();
        let withdrawal = WithdrawalRequest {
            id: Uuid::new_v4(),
            user_id,
            bank_account_id,
            amount: quote.amount,
            fee: quote.fee,
            net_amount: quote.net_amount,
            reference: format!("wd_{}", Uuid::new_v4().simple()),
            status: WithdrawalStatus::Pending,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        tables.withdrawals.insert(withdrawal.id, withdrawal.clone());
        tables.publish(MarketEvent::WithdrawalRequested {
            withdrawal_id: withdrawal.id,
            user_id,
            amount: withdrawal.amount,
            fee: withdrawal.fee,
            net_amount: withdrawal.net_amount,
        });
        Ok(withdrawal)
    }

    pub fn withdrawal(&self, withdrawal_id: Uuid) -> MarketResult<WithdrawalRequest> {
        self.store.read().withdrawal(withdrawal_id).cloned()
    }

    pub fn withdrawal_by_reference(&self, reference: &str) -> MarketResult<WithdrawalRequest> {
        self.store
            .read()
            .withdrawals
            .values()
            .find(|w| w.reference == reference)
            .cloned()
            .ok_or_else(|| MarketError::not_found("withdrawal", reference))
    }

    pub fn withdrawals(&self, user_id: Uuid) -> MarketResult<Vec<WithdrawalRequest>> {
        let tables = self.store.read();
        tables.user(user_id)?;
        let mut withdrawals: Vec<WithdrawalRequest> = tables
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        withdrawals.sort_by_key(|w| w.created_at);
        Ok(withdrawals)
    }

    /// Payout handed to the transfer provider.
    pub fn mark_withdrawal_processing(
        &self,
        withdrawal_id: Uuid,
    ) -> MarketResult<WithdrawalRequest> {
        self.move_withdrawal(
            withdrawal_id,
            &[WithdrawalStatus::Pending],
            WithdrawalStatus::Processing,
            None,
        )
    }

    pub fn complete_withdrawal(&self, withdrawal_id: Uuid) -> MarketResult<WithdrawalRequest> {
        self.move_withdrawal(
            withdrawal_id,
            &[WithdrawalStatus::Processing],
            WithdrawalStatus::Completed,
            None,
        )
    }

    /// Mark the payout failed and put the amount back in the wallet.
    pub fn fail_withdrawal(
        &self,
        withdrawal_id: Uuid,
        reason: &str,
    ) -> MarketResult<WithdrawalRequest> {
        self.move_withdrawal(
            withdrawal_id,
            &[WithdrawalStatus::Pending, WithdrawalStatus::Processing],
            WithdrawalStatus::Failed,
            Some(reason),
        )
    }

    /// Owner cancels a payout that has not been picked up yet.
    pub fn cancel_withdrawal(
        &self,
        user_id: Uuid,
        withdrawal_id: Uuid,
    ) -> MarketResult<WithdrawalRequest> {
        if self.withdrawal(withdrawal_id)?.user_id != user_id {
            return Err(MarketError::Forbidden("not your withdrawal".to_string()));
        }
        self.move_withdrawal(
            withdrawal_id,
            &[WithdrawalStatus::Pending],
            WithdrawalStatus::Cancelled,
            None,
        )
    }

    fn move_withdrawal(
        &self,
        withdrawal_id: Uuid,
        expected: &[WithdrawalStatus],
        next: WithdrawalStatus,
        reason: Option<&str>,
    ) -> MarketResult<WithdrawalRequest> {
        let mut tables = self.store.write();
        let record = tables.withdrawal_expecting(withdrawal_id, expected)?;
        record.status = next;
        record.updated_at = Utc::now();
        if let Some(reason) = reason {
            record.failure_reason = Some(reason.to_string());
        }
        let withdrawal = record.clone();

        if matches!(next, WithdrawalStatus::Failed | WithdrawalStatus::Cancelled) {
            tables.credit(withdrawal.user_id, withdrawal.amount)?;
        }
        tables.publish(MarketEvent::WithdrawalStatusChanged {
            withdrawal_id,
            status: next,
        });
        Ok(withdrawal)
    }
}
