use thiserror::Error;

/// Error raised by transaction lifecycle operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("failed to open transaction: {reason}")]
    Begin { reason: String },
    #[error("failed to commit transaction: {reason}")]
    Commit { reason: String },
    #[error("failed to roll back transaction: {reason}")]
    Rollback { reason: String },
}

/// Open transaction produced by a [`TransactionManager`].
pub trait Transaction: Send {
    /// Commits all work performed while the transaction was open.
    fn commit(self: Box<Self>) -> Result<(), TransactionError>;

    /// Discards all work performed while the transaction was open.
    fn rollback(self: Box<Self>) -> Result<(), TransactionError>;
}

/// Opens the transactions wrapping token-store operations and handler
/// side effects, so both commit or roll back together.
pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> Result<Box<dyn Transaction>, TransactionError>;
}

/// Runs `work` inside a transaction: commits when it succeeds, rolls
/// back when it fails. A rollback failure never masks the original error.
pub fn in_transaction<T, E, F>(manager: &dyn TransactionManager, work: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<TransactionError>,
{
    let transaction = manager.begin()?;
    match work() {
        Ok(value) => {
            transaction.commit()?;
            Ok(value)
        }
        Err(error) => {
            let _ = transaction.rollback();
            Err(error)
        }
    }
}

/// Transaction manager for backends without transactional semantics;
/// begin, commit, and rollback are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransactionManager;

struct NoTransaction;

impl Transaction for NoTransaction {
    fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        Ok(())
    }
}

impl TransactionManager for NoTransactionManager {
    fn begin(&self) -> Result<Box<dyn Transaction>, TransactionError> {
        Ok(Box::new(NoTransaction))
    }
}
