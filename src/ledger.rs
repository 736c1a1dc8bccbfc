//! Wallets and the append-only transaction log
//!
//! Each `*_in` function works inside a caller-supplied [`UnitOfWork`] and requires the
//! affected user's lock, so check-then-write sequences cannot interleave with another
//! mutation of the same wallet. [`Ledger`] wraps them for callers that need a single
//! self-contained operation.

use crate::common::traits::Clock;
use crate::common::types::{Cents, UserId};
use crate::errors::{CasinoError, CasinoResult};
use crate::models::{Direction, Transaction, TransactionStatus, Wallet};
use crate::records;
use crate::unit_of_work::{Store, UnitOfWork};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Current balance; a user without a wallet has zero.
pub fn balance_in(uow: &UnitOfWork, user: UserId) -> CasinoResult<Cents> {
    Ok(records::load_wallet(uow, user)?.map(|w| w.balance).unwrap_or(0))
}

fn wallet_in(uow: &UnitOfWork, user: UserId, now: DateTime<Utc>) -> CasinoResult<Wallet> {
    Ok(records::load_wallet(uow, user)?.unwrap_or_else(|| Wallet::empty(user, now)))
}

fn append(
    uow: &mut UnitOfWork,
    wallet: &mut Wallet,
    direction: Direction,
    amount: Cents,
    reason: &str,
    now: DateTime<Utc>,
) -> CasinoResult<Transaction> {
    wallet.sequence += 1;
    wallet.updated_at = now;
    let tx = Transaction {
        id: Uuid::new_v4(),
        user_id: wallet.user_id,
        sequence: wallet.sequence,
        direction,
        amount,
        reason: reason.to_string(),
        status: TransactionStatus::Completed,
        created_at: now,
    };
    records::store_wallet(uow, wallet)?;
    records::store_transaction(uow, &tx)?;
    Ok(tx)
}

fn ensure_positive(amount: Cents) -> CasinoResult<()> {
    if amount == 0 {
        return Err(CasinoError::InvalidAmount("amount must be greater than zero".into()));
    }
    Ok(())
}

pub fn credit_in(
    uow: &mut UnitOfWork,
    user: UserId,
    amount: Cents,
    reason: &str,
    now: DateTime<Utc>,
) -> CasinoResult<Transaction> {
    uow.require_lock(user)?;
    ensure_positive(amount)?;
    let mut wallet = wallet_in(uow, user, now)?;
    wallet.balance = wallet
        .balance
        .checked_add(amount)
        .ok_or_else(|| CasinoError::InvalidAmount("balance would overflow".into()))?;
    let tx = append(uow, &mut wallet, Direction::Credit, amount, reason, now)?;
    tracing::debug!(user_id = user, amount, reason, balance = wallet.balance, "wallet credited");
    Ok(tx)
}

pub fn debit_in(
    uow: &mut UnitOfWork,
    user: UserId,
    amount: Cents,
    reason: &str,
    now: DateTime<Utc>,
) -> CasinoResult<Transaction> {
    uow.require_lock(user)?;
    ensure_positive(amount)?;
    let mut wallet = wallet_in(uow, user, now)?;
    if wallet.balance < amount {
        tracing::debug!(user_id = user, amount, balance = wallet.balance, reason, "debit declined");
        return Err(CasinoError::InsufficientFunds { needed: amount, available: wallet.balance });
    }
    wallet.balance -= amount;
    let tx = append(uow, &mut wallet, Direction::Debit, amount, reason, now)?;
    tracing::debug!(user_id = user, amount, reason, balance = wallet.balance, "wallet debited");
    Ok(tx)
}

/// Administrative override. The difference is logged as one adjustment transaction so
/// the log still sums to the balance; setting the current balance records nothing.
pub fn set_balance_in(
    uow: &mut UnitOfWork,
    user: UserId,
    target: Cents,
    now: DateTime<Utc>,
) -> CasinoResult<Option<Transaction>> {
    uow.require_lock(user)?;
    let mut wallet = wallet_in(uow, user, now)?;
    let previous = wallet.balance;
    let tx = match target.cmp(&previous) {
        std::cmp::Ordering::Equal => return Ok(None),
        std::cmp::Ordering::Greater => {
            wallet.balance = target;
            append(uow, &mut wallet, Direction::Credit, target - previous, "admin_set_balance", now)?
        }
        std::cmp::Ordering::Less => {
            wallet.balance = target;
            append(uow, &mut wallet, Direction::Debit, previous - target, "admin_set_balance", now)?
        }
    };
    tracing::info!(user_id = user, previous, balance = target, "balance set by operator");
    Ok(Some(tx))
}

/// Both legs of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub debit: Transaction,
    pub credit: Transaction,
}

pub fn transfer_in(
    uow: &mut UnitOfWork,
    from: UserId,
    to: UserId,
    amount: Cents,
    now: DateTime<Utc>,
) -> CasinoResult<Transfer> {
    if from == to {
        return Err(CasinoError::InvalidAmount("cannot transfer to yourself".into()));
    }
    ensure_positive(amount)?;
    if let Some(sender) = records::load_user(uow, from)? {
        if sender.is_banned {
            return Err(CasinoError::UserBanned(from));
        }
    }
    if records::load_user(uow, to)?.is_none() {
        return Err(CasinoError::UserNotFound(to));
    }
    let debit = debit_in(uow, from, amount, &format!("transfer_to:{}", to), now)?;
    let credit = credit_in(uow, to, amount, &format!("transfer_from:{}", from), now)?;
    Ok(Transfer { debit, credit })
}

/// Balance checked against the signed sum of the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub user_id: UserId,
    pub balance: Cents,
    pub transaction_sum: i128,
    pub transaction_count: usize,
    pub consistent: bool,
}

#[derive(Clone)]
pub struct Ledger {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Balance of `user`, opening an empty wallet on first use.
    pub async fn get_balance(&self, user: UserId) -> CasinoResult<Cents> {
        let mut uow = self.store.begin(&[user]).await;
        if let Some(wallet) = records::load_wallet(&uow, user)? {
            return Ok(wallet.balance);
        }
        records::store_wallet(&mut uow, &Wallet::empty(user, self.clock.now()))?;
        uow.commit()?;
        Ok(0)
    }

    pub async fn credit(&self, user: UserId, amount: Cents, reason: &str) -> CasinoResult<Transaction> {
        let mut uow = self.store.begin(&[user]).await;
        let tx = credit_in(&mut uow, user, amount, reason, self.clock.now())?;
        uow.commit()?;
        Ok(tx)
    }

    pub async fn debit(&self, user: UserId, amount: Cents, reason: &str) -> CasinoResult<Transaction> {
        let mut uow = self.store.begin(&[user]).await;
        let tx = debit_in(&mut uow, user, amount, reason, self.clock.now())?;
        uow.commit()?;
        Ok(tx)
    }

    pub async fn set_balance(&self, user: UserId, amount: Cents) -> CasinoResult<Option<Transaction>> {
        let mut uow = self.store.begin(&[user]).await;
        let tx = set_balance_in(&mut uow, user, amount, self.clock.now())?;
        uow.commit()?;
        Ok(tx)
    }

    pub async fn transfer(&self, from: UserId, to: UserId, amount: Cents) -> CasinoResult<Transfer> {
        let mut uow = self.store.begin(&[from, to]).await;
        let transfer = transfer_in(&mut uow, from, to, amount, self.clock.now())?;
        uow.commit()?;
        tracing::info!(from, to, amount, "transfer completed");
        Ok(transfer)
    }

    /// Most recent transactions first.
    pub async fn transactions(&self, user: UserId, limit: usize) -> CasinoResult<Vec<Transaction>> {
        let mut txs = records::load_transactions(&self.store.reader(), user)?;
        txs.reverse();
        txs.truncate(limit);
        Ok(txs)
    }

    pub async fn audit(&self, user: UserId) -> CasinoResult<LedgerAudit> {
        // the lock gives a consistent view of wallet and log together
        let uow = self.store.begin(&[user]).await;
        let balance = balance_in(&uow, user)?;
        let txs = records::load_transactions(&uow, user)?;
        let transaction_sum: i128 = txs.iter().map(Transaction::signed_amount).sum();
        let audit = LedgerAudit {
            user_id: user,
            balance,
            transaction_sum,
            transaction_count: txs.len(),
            consistent: transaction_sum == balance as i128,
        };
        if !audit.consistent {
            tracing::error!(user_id = user, balance, transaction_sum, "ledger mismatch");
        }
        Ok(audit)
    }
}
