use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use web3::types::H256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Donate,
    FundPool,
    StartRound,
    SelectWinner,
    Withdraw,
}

impl OpKind {
    /// Admin-gated operations; the ledger enforces this too, the client just
    /// refuses to submit what it knows would be rejected.
    pub fn requires_admin(self) -> bool {
        matches!(self, OpKind::StartRound | OpKind::SelectWinner)
    }
}

impl Display for OpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Donate => "donate",
            OpKind::FundPool => "fund-pool",
            OpKind::StartRound => "start-round",
            OpKind::SelectWinner => "select-winner",
            OpKind::Withdraw => "withdraw",
        };
        write!(f, "{}", name)
    }
}

/// Opaque transaction hash handed back by the ledger on acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle(pub H256);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// One in-flight write operation. Created pending with no handle, the handle
/// arrives with ledger acceptance, and the status settles to confirmed or
/// failed exactly once. Terminal records are immutable history.
#[derive(Debug, Clone)]
pub struct TxRecord {
    pub kind: OpKind,
    handle: Option<TxHandle>,
    status: TxStatus,
    message: String,
}

impl TxRecord {
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            handle: None,
            status: TxStatus::Pending,
            message: "submitting".to_owned(),
        }
    }

    pub fn handle(&self) -> Option<TxHandle> {
        self.handle
    }

    pub fn status(&self) -> TxStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TxStatus::Pending
    }

    /// The ledger accepted the submission and issued a handle.
    pub fn accepted(&mut self, handle: TxHandle) {
        if self.is_terminal() {
            return;
        }
        self.handle = Some(handle);
        self.message = "waiting for confirmation".to_owned();
    }

    pub fn confirm(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.status = TxStatus::Confirmed;
        self.message = "confirmed".to_owned();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.status = TxStatus::Failed;
        self.message = message.into();
    }
}

/// Tracks the most recent record per operation kind and enforces that at most
/// one of each kind is unterminated at a time.
#[derive(Debug, Default)]
pub struct ActiveOps {
    records: HashMap<OpKind, TxRecord>,
}

impl ActiveOps {
    /// Starts a fresh pending record, rejecting the request if one of the same
    /// kind has not reached a terminal state yet.
    pub fn begin(&mut self, kind: OpKind) -> Result<TxRecord> {
        if let Some(rec) = self.records.get(&kind) {
            if !rec.is_terminal() {
                return Err(Error::DuplicateOperation(kind));
            }
        }
        let record = TxRecord::new(kind);
        self.records.insert(kind, record.clone());
        Ok(record)
    }

    pub fn store(&mut self, record: TxRecord) {
        self.records.insert(record.kind, record);
    }

    pub fn get(&self, kind: OpKind) -> Option<&TxRecord> {
        self.records.get(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> TxHandle {
        TxHandle(H256::from_low_u64_be(42))
    }

    #[test]
    fn record_lifecycle() {
        let mut rec = TxRecord::new(OpKind::Donate);
        assert_eq!(rec.status(), TxStatus::Pending);
        assert!(rec.handle().is_none());
        assert!(!rec.is_terminal());

        rec.accepted(handle());
        assert_eq!(rec.handle(), Some(handle()));
        assert_eq!(rec.status(), TxStatus::Pending);

        rec.confirm();
        assert_eq!(rec.status(), TxStatus::Confirmed);
        assert!(rec.is_terminal());
    }

    #[test]
    fn rejected_before_acceptance_fails_without_handle() {
        let mut rec = TxRecord::new(OpKind::FundPool);
        rec.fail("wallet rejected");
        assert_eq!(rec.status(), TxStatus::Failed);
        assert!(rec.handle().is_none());
        assert_eq!(rec.message(), "wallet rejected");
    }

    #[test]
    fn terminal_status_is_set_exactly_once() {
        let mut rec = TxRecord::new(OpKind::Donate);
        rec.accepted(handle());
        rec.fail("reverted");
        rec.confirm();
        assert_eq!(rec.status(), TxStatus::Failed);
        assert_eq!(rec.message(), "reverted");
    }

    #[test]
    fn duplicate_kind_rejected_while_pending() {
        let mut active = ActiveOps::default();
        active.begin(OpKind::Donate).unwrap();

        match active.begin(OpKind::Donate) {
            Err(Error::DuplicateOperation(OpKind::Donate)) => {}
            other => panic!("expected DuplicateOperation, got {:?}", other),
        }

        // A different kind is not blocked, exclusion is per kind.
        active.begin(OpKind::FundPool).unwrap();
    }

    #[test]
    fn new_record_allowed_after_terminal() {
        let mut active = ActiveOps::default();
        let mut rec = active.begin(OpKind::Withdraw).unwrap();
        rec.fail("reverted");
        active.store(rec);

        assert!(active.begin(OpKind::Withdraw).is_ok());
    }
}
