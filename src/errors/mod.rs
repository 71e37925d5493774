use crate::pages::PageId;
use crate::txn::TxnId;

#[derive(Debug)]
pub enum Error {
    Internal(String),
    NoFreeFrames,
    UnknownFrame(usize),
    UnknownPage(PageId),
    PinCountZero(PageId),
    PagePinned(PageId),
    DirectoryFull,
    DuplicateKey(String),
    TupleTooBig(usize, usize),
    SlotTooSmall(usize, usize),
    WriteConflict(TxnId),
    TxnTainted(TxnId),
    TxnNotRunning(TxnId),
    TableExists(String),
    TableNotFound(String),
    IndexNotFound(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal(context) => write!(f, "Internal Error: {context}."),
            Error::NoFreeFrames => write!(f, "No free frames and nothing is evictable."),
            Error::UnknownFrame(frame) => write!(f, "Frame {frame} is not tracked."),
            Error::UnknownPage(page) => write!(f, "Page {page} is not in the pool."),
            Error::PinCountZero(page) => {
                write!(f, "Page {page} has pin count 0, but an unpin was attempted.")
            }
            Error::PagePinned(page) => write!(f, "Page {page} is pinned and can't be deleted."),
            Error::DirectoryFull => write!(f, "Hash directory reached its max depth."),
            Error::DuplicateKey(key) => write!(f, "Key {key} already exists."),
            Error::TupleTooBig(limit, actual) => {
                write!(f, "Tuple of size {actual} exceeds the limit of {limit}.")
            }
            Error::SlotTooSmall(capacity, actual) => {
                write!(f, "Tuple of size {actual} doesn't fit in a slot of {capacity}.")
            }
            Error::WriteConflict(txn) => write!(f, "Txn {txn} hit a write-write conflict."),
            Error::TxnTainted(txn) => write!(f, "Txn {txn} is tainted and must abort."),
            Error::TxnNotRunning(txn) => write!(f, "Txn {txn} is not running."),
            Error::TableExists(table) => write!(f, "Table {table} already exists."),
            Error::TableNotFound(table) => write!(f, "Table {table} does not exist."),
            Error::IndexNotFound(index) => write!(f, "Index {index} does not exist."),
        }
    }
}
