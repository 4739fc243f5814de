use super::transaction::Transaction;

/// Transactions waiting to be sealed into the next block
#[derive(Debug, Clone, Default)]
pub struct TransactionPool {
    transactions: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a transaction behind everything already pooled
    pub fn add(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    /// Takes every pooled transaction in insertion order, leaving the pool empty
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Gets the number of pooled transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
