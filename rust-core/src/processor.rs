// Block-level driver: applies a block's transactions in order against one
// store and keeps the batch all-or-nothing.

use crate::config::ProtocolConfig;
use crate::error::{FatalError, TransactionResponse};
use crate::state::StateStore;
use crate::transaction::Transaction;
use crate::types::to_hex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Fatal(#[from] FatalError),
    /// Responses cover every transaction up to and including the rejected one.
    #[error("transaction {index} in batch was not applied")]
    Rejected {
        index: usize,
        responses: Vec<TransactionResponse>,
    },
}

pub struct BlockProcessor {
    config: ProtocolConfig,
}

impl BlockProcessor {
    pub fn new(config: ProtocolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Warm the store, then validate and apply each transaction. If any
    /// transaction is not OK (FAIL or PENDING) the store is restored to its
    /// state before the batch.
    pub fn apply_batch<S: StateStore + Clone>(
        &self,
        store: &mut S,
        transactions: &[Transaction],
    ) -> Result<Vec<TransactionResponse>, ProcessError> {
        let checkpoint = store.clone();
        let filters: Vec<_> = transactions.iter().flat_map(Transaction::cache_filters).collect();
        store.cache(&filters);

        let mut responses = Vec::with_capacity(transactions.len());
        for (index, tx) in transactions.iter().enumerate() {
            let validated = tx.validate(&self.config);
            let response = if validated.is_ok() {
                match tx.apply(store, &self.config) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(index, error = %e, "fatal error, batch aborted");
                        *store = checkpoint;
                        return Err(e.into());
                    }
                }
            } else {
                validated
            };
            let ok = response.is_ok();
            responses.push(response);
            if !ok {
                warn!(index, id = %to_hex(&responses[index].id), "batch rejected, state restored");
                *store = checkpoint;
                return Err(ProcessError::Rejected { index, responses });
            }
        }
        debug!(transactions = transactions.len(), "batch applied");
        Ok(responses)
    }

    /// Undo a previously applied batch, last transaction first. Responses are
    /// returned in block order.
    pub fn undo_batch<S: StateStore>(
        &self,
        store: &mut S,
        transactions: &[Transaction],
    ) -> Result<Vec<TransactionResponse>, ProcessError> {
        let mut responses = Vec::with_capacity(transactions.len());
        for tx in transactions.iter().rev() {
            responses.push(tx.undo(store, &self.config)?);
        }
        responses.reverse();
        debug!(transactions = transactions.len(), "batch undone");
        Ok(responses)
    }
}
