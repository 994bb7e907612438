pub mod transaction;

pub use transaction::{
    new_utr, reversal_key, Balances, LegKey, OperationType, TransactionKind, TransactionRecord,
    TransactionStatus, REVERSAL_SUFFIX,
};
