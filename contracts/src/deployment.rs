//! # Deployment Host
//!
//! A [`Deployment`] is one asset ledger, one certificate registry and the
//! treasuries deployed against them, driven as a unit. It is the only place
//! that sees all three contracts at once, so it is where cross-contract
//! calls are wired and where transactions get their boundary.
//!
//! ## Transactions
//!
//! Every mutating entry point runs through [`Deployment::transact`]. The
//! closure works on a clone of the contract state; the clone replaces the
//! live state (and its events are journaled) only if the closure returns
//! `Ok`. A failure anywhere in a nested call therefore reverts the whole
//! transaction, including effects already applied by earlier contracts in
//! the same call chain.
//!
//! ## Journal
//!
//! Committed events are numbered from 1 in commit order. The in-memory
//! journal holds events committed since the deployment was loaded; callers
//! that persist the deployment drain it with [`Deployment::drain_journal`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use valocracy_protocol::config::{self, ASSET_NAME, ASSET_SYMBOL, REGISTRY_NAME, REGISTRY_SYMBOL};
use valocracy_protocol::config::{TREASURY_NAME, TREASURY_SYMBOL};
use valocracy_protocol::identity::Address;

use crate::asset::{AssetApproval, AssetError, AssetLedger, AssetTransfer, FungibleAsset};
use crate::events::{Event, EventRecord};
use crate::treasury::{AssetsRedeemed, SharesCredited, Treasury, TreasuryError};
use crate::valocracy::{
    CertificateIssued, CertificateTransferred, OwnershipTransferred, TreasuryUpdated, Valocracy,
    ValocracyError, ValorUpdated,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Any failure of a deployment entry point.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error(transparent)]
    Treasury(#[from] TreasuryError),

    #[error(transparent)]
    Valocracy(#[from] ValocracyError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("no treasury deployed at {0}")]
    UnknownTreasury(Address),
}

/// Coarse failure classes shared by every contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    InvalidRecipient,
    NonTransferable,
    InsufficientShares,
    InsufficientAssets,
    ArithmeticOverflow,
    /// A referenced valor, certificate or treasury does not exist.
    NotFound,
    /// Input rejected for a reason other than the above.
    InvalidInput,
    /// Contracts are not wired together as the call requires.
    Misconfigured,
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::Treasury(e) => treasury_kind(e),
            ContractError::Valocracy(e) => valocracy_kind(e),
            ContractError::Asset(e) => asset_kind(e),
            ContractError::UnknownTreasury(_) => ErrorKind::NotFound,
        }
    }
}

fn asset_kind(e: &AssetError) -> ErrorKind {
    match e {
        AssetError::Unauthorized { .. } | AssetError::InsufficientAllowance { .. } => {
            ErrorKind::Unauthorized
        }
        AssetError::InvalidRecipient => ErrorKind::InvalidRecipient,
        AssetError::InsufficientBalance { .. } => ErrorKind::InsufficientAssets,
        AssetError::Overflow { .. } => ErrorKind::ArithmeticOverflow,
    }
}

fn treasury_kind(e: &TreasuryError) -> ErrorKind {
    match e {
        TreasuryError::Unauthorized { .. } => ErrorKind::Unauthorized,
        TreasuryError::InvalidRecipient => ErrorKind::InvalidRecipient,
        TreasuryError::InsufficientShares { .. } => ErrorKind::InsufficientShares,
        TreasuryError::InsufficientAssets { .. } => ErrorKind::InsufficientAssets,
        TreasuryError::ArithmeticOverflow => ErrorKind::ArithmeticOverflow,
        TreasuryError::AssetMismatch { .. } => ErrorKind::Misconfigured,
        TreasuryError::Asset(inner) => asset_kind(inner),
    }
}

fn valocracy_kind(e: &ValocracyError) -> ErrorKind {
    match e {
        ValocracyError::Unauthorized { .. } | ValocracyError::NotTokenOwner { .. } => {
            ErrorKind::Unauthorized
        }
        ValocracyError::InvalidRecipient => ErrorKind::InvalidRecipient,
        ValocracyError::NonTransferable { .. } => ErrorKind::NonTransferable,
        ValocracyError::UnknownValor { .. } | ValocracyError::UnknownToken { .. } => {
            ErrorKind::NotFound
        }
        ValocracyError::TreasuryNotSet | ValocracyError::TreasuryMismatch { .. } => {
            ErrorKind::Misconfigured
        }
        ValocracyError::MetadataTooLong { .. } => ErrorKind::InvalidInput,
        ValocracyError::ArithmeticOverflow => ErrorKind::ArithmeticOverflow,
        ValocracyError::Treasury(inner) => treasury_kind(inner),
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// Contract state replaced wholesale when a transaction commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct State {
    asset: AssetLedger,
    valocracy: Valocracy,
    treasuries: BTreeMap<Address, Treasury>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    state: State,
    /// Sequence of the last committed event.
    sequence: u64,
    #[serde(skip)]
    journal: Vec<EventRecord>,
}

impl Deployment {
    /// Deploys the asset ledger (issued by `owner`), the registry
    /// (administered by `owner`) and a first treasury bound to the registry.
    pub fn bootstrap(owner: Address) -> Result<Self, ContractError> {
        if owner.is_null() {
            return Err(ValocracyError::InvalidRecipient.into());
        }

        let asset = AssetLedger::new(
            config::asset_address(),
            ASSET_NAME.to_string(),
            ASSET_SYMBOL.to_string(),
            owner,
        );
        let valocracy = Valocracy::new(
            config::registry_address(),
            REGISTRY_NAME.to_string(),
            REGISTRY_SYMBOL.to_string(),
            owner,
        );
        let mut deployment = Self {
            state: State {
                asset,
                valocracy,
                treasuries: BTreeMap::new(),
            },
            sequence: 0,
            journal: Vec::new(),
        };

        let treasury = deployment.deploy_treasury(owner, TREASURY_NAME, TREASURY_SYMBOL)?;
        deployment.set_treasury(owner, treasury)?;
        Ok(deployment)
    }

    /// Runs `operation` against a copy of the state and commits the copy and
    /// the events it produced only if it succeeds.
    fn transact<T, F>(&mut self, operation: &'static str, f: F) -> Result<T, ContractError>
    where
        F: FnOnce(&mut State, &mut Vec<Event>) -> Result<T, ContractError>,
    {
        let mut working = self.state.clone();
        let mut events = Vec::new();

        match f(&mut working, &mut events) {
            Ok(value) => {
                self.state = working;
                let timestamp = Utc::now();
                for event in events {
                    self.sequence += 1;
                    self.journal.push(EventRecord {
                        sequence: self.sequence,
                        timestamp,
                        event,
                    });
                }
                tracing::info!(operation, sequence = self.sequence, "transaction committed");
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(operation, error = %e, kind = ?e.kind(), "transaction reverted");
                Err(e)
            }
        }
    }

    // -- Registry entry points -----------------------------------------------

    pub fn set_valor(
        &mut self,
        caller: Address,
        valor_id: u64,
        rarity: u64,
        metadata: impl Into<String>,
    ) -> Result<ValorUpdated, ContractError> {
        let metadata = metadata.into();
        self.transact("set_valor", |state, events| {
            let receipt = state
                .valocracy
                .set_valor(caller, valor_id, rarity, metadata)?;
            events.push(Event::ValorUpdate(receipt.clone()));
            Ok(receipt)
        })
    }

    /// Binds the registry to a treasury deployed by this host.
    pub fn set_treasury(
        &mut self,
        caller: Address,
        treasury: Address,
    ) -> Result<TreasuryUpdated, ContractError> {
        self.transact("set_treasury", |state, events| {
            if !state.treasuries.contains_key(&treasury) {
                return Err(ContractError::UnknownTreasury(treasury));
            }
            let receipt = state.valocracy.set_treasury(caller, treasury)?;
            events.push(Event::TreasuryUpdate(receipt));
            Ok(receipt)
        })
    }

    /// Deploys another treasury over the pooled asset, accepting credits
    /// from the registry. Restricted to the registry owner.
    pub fn deploy_treasury(
        &mut self,
        caller: Address,
        name: &str,
        symbol: &str,
    ) -> Result<Address, ContractError> {
        self.transact("deploy_treasury", |state, _| {
            if caller != state.valocracy.owner() {
                return Err(ValocracyError::Unauthorized { caller }.into());
            }
            let index = u32::try_from(state.treasuries.len())
                .map_err(|_| TreasuryError::ArithmeticOverflow)?;
            let address = config::treasury_address(index);
            let treasury = Treasury::new(
                address,
                state.asset.address(),
                state.valocracy.address(),
                name.to_string(),
                symbol.to_string(),
            );
            state.treasuries.insert(address, treasury);
            tracing::debug!(treasury = %address, index, "treasury deployed");
            Ok(address)
        })
    }

    /// Issues a certificate and credits its rarity to the bound treasury.
    pub fn issue(
        &mut self,
        caller: Address,
        to: Address,
        valor_id: u64,
    ) -> Result<CertificateIssued, ContractError> {
        self.transact("issue", |state, events| {
            let State {
                asset,
                valocracy,
                treasuries,
            } = state;
            let target = valocracy.mint_target(caller, to, valor_id)?;
            let treasury = treasuries
                .get_mut(&target)
                .ok_or(ContractError::UnknownTreasury(target))?;

            let issued = valocracy.mint(caller, to, valor_id, &mut treasury.bind(&*asset))?;
            events.push(Event::Deposit(issued.credit));
            events.push(Event::Transfer(CertificateTransferred {
                from: Address::NULL,
                to,
                token_id: issued.token_id,
            }));
            events.push(Event::Mint(issued));
            Ok(issued)
        })
    }

    pub fn burn(
        &mut self,
        caller: Address,
        token_id: u64,
    ) -> Result<CertificateTransferred, ContractError> {
        self.transact("burn", |state, events| {
            let receipt = state.valocracy.burn(caller, token_id)?;
            events.push(Event::Transfer(receipt));
            Ok(receipt)
        })
    }

    pub fn transfer_certificate(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        token_id: u64,
    ) -> Result<CertificateTransferred, ContractError> {
        self.transact("transfer_certificate", |state, events| {
            let receipt = state.valocracy.transfer_from(caller, from, to, token_id)?;
            events.push(Event::Transfer(receipt));
            Ok(receipt)
        })
    }

    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Result<OwnershipTransferred, ContractError> {
        self.transact("transfer_ownership", |state, events| {
            let receipt = state.valocracy.transfer_ownership(caller, new_owner)?;
            events.push(Event::OwnershipTransferred(receipt));
            Ok(receipt)
        })
    }

    // -- Treasury entry points -----------------------------------------------

    /// Direct call into a treasury's credit path. Only succeeds when
    /// `caller` is the treasury's registry.
    pub fn credit_shares(
        &mut self,
        caller: Address,
        treasury: Address,
        recipient: Address,
        weight: u64,
    ) -> Result<SharesCredited, ContractError> {
        self.transact("credit_shares", |state, events| {
            let vault = state
                .treasuries
                .get_mut(&treasury)
                .ok_or(ContractError::UnknownTreasury(treasury))?;
            let receipt = vault.credit_shares(caller, recipient, weight, &state.asset)?;
            events.push(Event::Deposit(receipt));
            Ok(receipt)
        })
    }

    /// Redeems `asset_amount` units of `treasury`'s asset for `holder`.
    pub fn redeem(
        &mut self,
        caller: Address,
        treasury: Address,
        holder: Address,
        asset_amount: u64,
    ) -> Result<AssetsRedeemed, ContractError> {
        self.transact("redeem", |state, events| {
            let vault = state
                .treasuries
                .get_mut(&treasury)
                .ok_or(ContractError::UnknownTreasury(treasury))?;
            let receipt = vault.redeem(caller, holder, asset_amount, &mut state.asset)?;
            push_withdrawal(events, receipt);
            Ok(receipt)
        })
    }

    /// Redeems exactly `shares` of `holder`'s shares in `treasury`.
    pub fn redeem_shares(
        &mut self,
        caller: Address,
        treasury: Address,
        holder: Address,
        shares: u64,
    ) -> Result<AssetsRedeemed, ContractError> {
        self.transact("redeem_shares", |state, events| {
            let vault = state
                .treasuries
                .get_mut(&treasury)
                .ok_or(ContractError::UnknownTreasury(treasury))?;
            let receipt = vault.redeem_shares(caller, holder, shares, &mut state.asset)?;
            push_withdrawal(events, receipt);
            Ok(receipt)
        })
    }

    // -- Asset entry points --------------------------------------------------

    pub fn mint_asset(
        &mut self,
        caller: Address,
        to: Address,
        amount: u64,
    ) -> Result<AssetTransfer, ContractError> {
        self.transact("mint_asset", |state, events| {
            let receipt = state.asset.mint(caller, to, amount)?;
            events.push(Event::AssetTransfer(receipt));
            Ok(receipt)
        })
    }

    pub fn transfer_asset(
        &mut self,
        caller: Address,
        to: Address,
        amount: u64,
    ) -> Result<AssetTransfer, ContractError> {
        self.transact("transfer_asset", |state, events| {
            let receipt = state.asset.transfer(caller, to, amount)?;
            events.push(Event::AssetTransfer(receipt));
            Ok(receipt)
        })
    }

    /// Donates `amount` of the caller's asset to `treasury`, raising the
    /// value of every outstanding share.
    pub fn fund(
        &mut self,
        caller: Address,
        treasury: Address,
        amount: u64,
    ) -> Result<AssetTransfer, ContractError> {
        self.transact("fund", |state, events| {
            if !state.treasuries.contains_key(&treasury) {
                return Err(ContractError::UnknownTreasury(treasury));
            }
            let receipt = state.asset.transfer(caller, treasury, amount)?;
            events.push(Event::AssetTransfer(receipt));
            Ok(receipt)
        })
    }

    pub fn approve_asset(
        &mut self,
        caller: Address,
        spender: Address,
        amount: u64,
    ) -> Result<AssetApproval, ContractError> {
        self.transact("approve_asset", |state, events| {
            let receipt = state.asset.approve(caller, spender, amount)?;
            events.push(Event::AssetApproval(receipt));
            Ok(receipt)
        })
    }

    pub fn transfer_asset_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<AssetTransfer, ContractError> {
        self.transact("transfer_asset_from", |state, events| {
            let receipt = state.asset.transfer_from(caller, from, to, amount)?;
            events.push(Event::AssetTransfer(receipt));
            Ok(receipt)
        })
    }

    // -- Queries -------------------------------------------------------------

    pub fn asset(&self) -> &AssetLedger {
        &self.state.asset
    }

    pub fn valocracy(&self) -> &Valocracy {
        &self.state.valocracy
    }

    pub fn treasury(&self, address: Address) -> Result<&Treasury, ContractError> {
        self.state
            .treasuries
            .get(&address)
            .ok_or(ContractError::UnknownTreasury(address))
    }

    pub fn treasuries(&self) -> impl Iterator<Item = &Treasury> + '_ {
        self.state.treasuries.values()
    }

    /// The treasury the registry currently credits on issuance.
    pub fn bound_treasury(&self) -> Option<Address> {
        self.state.valocracy.treasury()
    }

    pub fn total_assets(&self, treasury: Address) -> Result<u64, ContractError> {
        Ok(self.treasury(treasury)?.total_assets(&self.state.asset))
    }

    pub fn total_shares(&self, treasury: Address) -> Result<u64, ContractError> {
        Ok(self.treasury(treasury)?.total_shares())
    }

    pub fn shares_of(&self, treasury: Address, holder: Address) -> Result<u64, ContractError> {
        Ok(self.treasury(treasury)?.shares_of(holder))
    }

    pub fn assets_of(&self, treasury: Address, holder: Address) -> Result<u64, ContractError> {
        Ok(self.treasury(treasury)?.assets_of(holder, &self.state.asset))
    }

    /// Sequence of the last committed event (0 before any commit).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Journaled events with a sequence greater than `after`.
    pub fn events_since(&self, after: u64) -> &[EventRecord] {
        let start = self.journal.partition_point(|r| r.sequence <= after);
        &self.journal[start..]
    }

    /// Takes the journaled events, leaving the journal empty.
    pub fn drain_journal(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.journal)
    }

    /// Checks that every treasury's share supply equals the sum of its
    /// holders' balances.
    pub fn invariant_holds(&self) -> bool {
        self.state.treasuries.values().all(Treasury::invariant_holds)
    }
}

fn push_withdrawal(events: &mut Vec<Event>, receipt: AssetsRedeemed) {
    events.push(Event::AssetTransfer(AssetTransfer {
        from: receipt.treasury,
        to: receipt.holder,
        amount: receipt.assets,
    }));
    events.push(Event::Withdraw(receipt));
}
