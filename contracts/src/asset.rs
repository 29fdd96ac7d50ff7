//! # Pooled Asset Ledger
//!
//! The treasury holds a single fungible asset. The vault never needs more
//! from it than the [`FungibleAsset`] trait: read a balance, move units out
//! of its own account, and (for funding flows) move units on someone else's
//! behalf under an allowance.
//!
//! [`AssetLedger`] is the concrete ledger used by local deployments and
//! tests. It follows standard fungible-token semantics:
//!
//! - **Mint gating**: only the ledger's issuer can create supply.
//! - **Transfers** fail on insufficient balance and never accept the null
//!   address as a recipient.
//! - **Allowances** are consumed by `transfer_from`; the owner can always
//!   move their own funds.
//! - **Supply tracking**: every credit is overflow-checked.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use valocracy_protocol::identity::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during asset ledger operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    /// The caller is not the issuer of this asset.
    #[error("unauthorized: {caller} is not the asset issuer")]
    Unauthorized {
        /// The principal that attempted the call.
        caller: Address,
    },

    /// Transfers and mints to the null address are rejected.
    #[error("invalid recipient: the null address cannot receive assets")]
    InvalidRecipient,

    /// The source account does not hold enough units.
    #[error("insufficient balance: {owner} has {balance}, tried to move {amount}")]
    InsufficientBalance {
        /// Account being debited.
        owner: Address,
        /// Current balance of the account.
        balance: u64,
        /// Amount the caller tried to move.
        amount: u64,
    },

    /// The spender's allowance does not cover the transfer.
    #[error("insufficient allowance: {spender} may move {allowance}, tried {amount}")]
    InsufficientAllowance {
        /// Principal spending on behalf of the owner.
        spender: Address,
        /// Remaining allowance.
        allowance: u64,
        /// Amount the spender tried to move.
        amount: u64,
    },

    /// A balance or the total supply would exceed `u64::MAX`.
    #[error("supply overflow: crediting {amount} would exceed u64::MAX")]
    Overflow {
        /// The amount that was attempted.
        amount: u64,
    },
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// A completed movement of asset units. `from` is the null address for mints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
}

/// A recorded allowance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetApproval {
    pub owner: Address,
    pub spender: Address,
    pub amount: u64,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The operations the treasury needs from its underlying asset.
///
/// `caller` is the principal executing the call; for [`transfer`](Self::transfer)
/// it is also the account debited.
pub trait FungibleAsset {
    /// Address of the asset ledger itself.
    fn address(&self) -> Address;

    /// Units held by `owner`; zero for unknown accounts.
    fn balance_of(&self, owner: Address) -> u64;

    /// Moves `amount` from `caller` to `to`.
    fn transfer(
        &mut self,
        caller: Address,
        to: Address,
        amount: u64,
    ) -> Result<AssetTransfer, AssetError>;

    /// Moves `amount` from `from` to `to`, consuming `caller`'s allowance
    /// unless `caller == from`.
    fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<AssetTransfer, AssetError>;
}

// ---------------------------------------------------------------------------
// AssetLedger
// ---------------------------------------------------------------------------

/// An in-memory fungible asset ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLedger {
    address: Address,
    name: String,
    symbol: String,
    /// The only principal allowed to mint.
    issuer: Address,
    total_supply: u64,
    balances: BTreeMap<Address, u64>,
    /// `owner -> (spender -> remaining allowance)`.
    allowances: BTreeMap<Address, BTreeMap<Address, u64>>,
}

impl AssetLedger {
    /// Creates an empty ledger with zero supply.
    pub fn new(address: Address, name: String, symbol: String, issuer: Address) -> Self {
        Self {
            address,
            name,
            symbol,
            issuer,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn issuer(&self) -> Address {
        self.issuer
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Remaining units `spender` may move out of `owner`'s account.
    pub fn allowance(&self, owner: Address, spender: Address) -> u64 {
        self.allowances
            .get(&owner)
            .and_then(|m| m.get(&spender))
            .copied()
            .unwrap_or(0)
    }

    /// Creates `amount` new units in `to`'s account.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::Unauthorized`] if `caller` is not the issuer,
    /// [`AssetError::InvalidRecipient`] for the null address, and
    /// [`AssetError::Overflow`] if the supply would exceed `u64::MAX`.
    pub fn mint(
        &mut self,
        caller: Address,
        to: Address,
        amount: u64,
    ) -> Result<AssetTransfer, AssetError> {
        if caller != self.issuer {
            return Err(AssetError::Unauthorized { caller });
        }
        if to.is_null() {
            return Err(AssetError::InvalidRecipient);
        }

        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(AssetError::Overflow { amount })?;
        // Any single balance is bounded by the supply, so this cannot fail
        // once the supply check passed.
        let new_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(AssetError::Overflow { amount })?;

        self.total_supply = new_supply;
        self.balances.insert(to, new_balance);

        Ok(AssetTransfer {
            from: Address::NULL,
            to,
            amount,
        })
    }

    /// Sets the allowance `spender` has over `caller`'s account.
    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        amount: u64,
    ) -> Result<AssetApproval, AssetError> {
        if spender.is_null() {
            return Err(AssetError::InvalidRecipient);
        }
        self.allowances
            .entry(caller)
            .or_default()
            .insert(spender, amount);

        Ok(AssetApproval {
            owner: caller,
            spender,
            amount,
        })
    }

    /// Validates and applies a balance movement. No state changes on error.
    fn move_units(
        &mut self,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<AssetTransfer, AssetError> {
        if to.is_null() {
            return Err(AssetError::InvalidRecipient);
        }

        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(AssetError::InsufficientBalance {
                owner: from,
                balance: from_balance,
                amount,
            });
        }

        if from != to {
            let to_balance = self
                .balance_of(to)
                .checked_add(amount)
                .ok_or(AssetError::Overflow { amount })?;
            self.balances.insert(from, from_balance - amount);
            self.balances.insert(to, to_balance);
        }

        Ok(AssetTransfer { from, to, amount })
    }
}

impl FungibleAsset for AssetLedger {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, owner: Address) -> u64 {
        self.balances.get(&owner).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        caller: Address,
        to: Address,
        amount: u64,
    ) -> Result<AssetTransfer, AssetError> {
        self.move_units(caller, to, amount)
    }

    fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<AssetTransfer, AssetError> {
        if caller == from {
            return self.move_units(from, to, amount);
        }

        let allowance = self.allowance(from, caller);
        if allowance < amount {
            return Err(AssetError::InsufficientAllowance {
                spender: caller,
                allowance,
                amount,
            });
        }

        let receipt = self.move_units(from, to, amount)?;
        self.allowances
            .entry(from)
            .or_default()
            .insert(caller, allowance - amount);
        Ok(receipt)
    }
}
