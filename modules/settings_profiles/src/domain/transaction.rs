//! Undo log of value changes made to a profile

use super::value::EntryValue;

/// One recorded value change
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChangeOperation {
    /// Entry that changed
    pub name: String,
    /// Value before the change
    pub previous: EntryValue,
}

/// Group of operations applied together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    operations: Vec<ValueChangeOperation>,
}

impl Transaction {
    pub fn operations(&self) -> &[ValueChangeOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Stack of completed transactions plus at most one open transaction
///
/// Transactions may nest; operations join the outermost open transaction,
/// which becomes visible in [`TransactionStack::transaction_count`] only once
/// completed.
#[derive(Debug, Default)]
pub struct TransactionStack {
    completed: Vec<Transaction>,
    pending: Option<Transaction>,
    depth: usize,
}

impl TransactionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_transaction(&mut self) {
        if self.depth == 0 {
            self.pending = Some(Transaction::default());
        }
        self.depth += 1;
    }

    /// Record an operation; outside a transaction it forms its own
    pub fn push_operation(&mut self, operation: ValueChangeOperation) {
        match self.pending.as_mut() {
            Some(transaction) => transaction.operations.push(operation),
            None => self.completed.push(Transaction {
                operations: vec![operation],
            }),
        }
    }

    pub fn complete_transaction(&mut self) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        if self.depth == 0 {
            if let Some(transaction) = self.pending.take() {
                if !transaction.is_empty() {
                    self.completed.push(transaction);
                }
            }
        }
    }

    pub fn is_in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Number of completed transactions
    pub fn transaction_count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.pending.as_ref().map_or(true, Transaction::is_empty)
    }

    pub fn clear(&mut self) {
        self.completed.clear();
        self.pending = None;
        self.depth = 0;
    }

    /// Remove every operation, newest first, leaving the stack empty
    pub fn drain_for_rollback(&mut self) -> Vec<ValueChangeOperation> {
        let mut operations: Vec<ValueChangeOperation> = self
            .completed
            .drain(..)
            .chain(self.pending.take())
            .flat_map(|transaction| transaction.operations)
            .collect();
        operations.reverse();
        self.depth = 0;
        operations
    }
}
