//! Event records emitted by committed transactions.
//!
//! Every receipt returned by the contracts becomes one [`Event`]. The
//! deployment stamps them with a sequence number and a UTC timestamp when a
//! transaction commits; reverted transactions emit nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use valocracy_protocol::storage::Sequenced;

use crate::asset::{AssetApproval, AssetTransfer};
use crate::treasury::{AssetsRedeemed, SharesCredited};
use crate::valocracy::{
    CertificateIssued, CertificateTransferred, OwnershipTransferred, TreasuryUpdated, ValorUpdated,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A certificate type was defined or redefined.
    ValorUpdate(ValorUpdated),
    /// A certificate was issued.
    Mint(CertificateIssued),
    /// A certificate moved (mint from null, or burn to null).
    Transfer(CertificateTransferred),
    /// The registry was bound to a treasury.
    TreasuryUpdate(TreasuryUpdated),
    OwnershipTransferred(OwnershipTransferred),
    /// Shares were credited by the treasury.
    Deposit(SharesCredited),
    /// Assets were redeemed from the treasury.
    Withdraw(AssetsRedeemed),
    AssetTransfer(AssetTransfer),
    AssetApproval(AssetApproval),
}

impl Event {
    /// Short name used in logs and API output.
    pub fn name(&self) -> &'static str {
        match self {
            Event::ValorUpdate(_) => "ValorUpdate",
            Event::Mint(_) => "Mint",
            Event::Transfer(_) => "Transfer",
            Event::TreasuryUpdate(_) => "TreasuryUpdate",
            Event::OwnershipTransferred(_) => "OwnershipTransferred",
            Event::Deposit(_) => "Deposit",
            Event::Withdraw(_) => "Withdraw",
            Event::AssetTransfer(_) => "AssetTransfer",
            Event::AssetApproval(_) => "AssetApproval",
        }
    }
}

/// A committed event with its position in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Journal position, starting at 1 and never reused.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl Sequenced for EventRecord {
    fn sequence(&self) -> u64 {
        self.sequence
    }
}
