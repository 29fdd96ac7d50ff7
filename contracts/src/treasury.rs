//! # Treasury Vault
//!
//! The treasury pools a single fungible asset and tracks proportional claims
//! on it in an internal share ledger. It has two mutating entry points:
//!
//! 1. **Credit**: the certificate registry (and only the registry) credits
//!    shares to a recipient for a certificate's weight. No asset moves;
//!    funding reaches the treasury independently.
//! 2. **Redeem**: a holder's shares are burned and the corresponding asset
//!    units are transferred out to the holder.
//!
//! ## Exchange rate
//!
//! The rate is never stored. Every conversion reads the live asset balance
//! of the treasury (`A`) and the current share supply (`S`):
//!
//! ```text
//! credit:  shares = weight * S / A        (floor)
//! redeem:  shares = assets * S / A        (ceiling)
//! value:   assets = shares * A / S        (floor)
//! ```
//!
//! While `S == 0` or `A == 0` the rate is one share per asset unit. Assets
//! sent straight to the treasury address (donations) raise `A` without
//! touching `S` and so lift the value of every outstanding share.
//!
//! Rounding always favours the holders who stay in the vault: a redeemer is
//! never charged fewer shares than the assets they take out are worth.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use valocracy_protocol::identity::Address;

use crate::asset::{AssetError, FungibleAsset};
use crate::math::{checked_add, checked_sub, mul_div, MathError, Rounding};
use crate::valocracy::ShareIssuer;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during treasury operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreasuryError {
    /// Only the bound certificate registry may credit shares.
    #[error("unauthorized: {caller} is not the certificate registry")]
    Unauthorized {
        /// The principal that attempted the call.
        caller: Address,
    },

    /// The null address cannot hold or receive a claim.
    #[error("invalid recipient: the null address cannot hold shares")]
    InvalidRecipient,

    /// The holder does not own enough shares to cover the redemption.
    #[error("insufficient shares: {holder} holds {balance}, redemption costs {required}")]
    InsufficientShares {
        /// Holder being debited.
        holder: Address,
        /// Current share balance.
        balance: u64,
        /// Shares required at the current rate.
        required: u64,
    },

    /// The treasury does not hold enough of the pooled asset.
    #[error("insufficient assets: requested {requested}, treasury holds {available}")]
    InsufficientAssets {
        /// Asset units requested.
        requested: u64,
        /// Asset units currently held.
        available: u64,
    },

    /// A share or asset total would leave the representable range.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// The operation was given a ledger other than the treasury's asset.
    #[error("asset mismatch: treasury pools {expected}, got {got}")]
    AssetMismatch {
        /// The asset this treasury was deployed with.
        expected: Address,
        /// The ledger passed to the call.
        got: Address,
    },

    /// The underlying asset transfer failed.
    #[error("asset transfer failed: {0}")]
    Asset(#[from] AssetError),
}

impl From<MathError> for TreasuryError {
    fn from(_: MathError) -> Self {
        // Division by zero is excluded by the bootstrap rule, so every math
        // failure that reaches here is an overflow.
        TreasuryError::ArithmeticOverflow
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// Outcome of a successful share credit. Totals are post-credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharesCredited {
    pub treasury: Address,
    pub recipient: Address,
    pub weight: u64,
    pub shares: u64,
    pub total_assets: u64,
    pub total_shares: u64,
}

/// Outcome of a successful redemption. Totals are post-redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsRedeemed {
    pub treasury: Address,
    pub caller: Address,
    pub holder: Address,
    pub assets: u64,
    pub shares: u64,
    pub total_assets: u64,
    pub total_shares: u64,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Shares equivalent to `assets` at the rate `total_assets : total_shares`.
pub fn shares_for_assets(
    assets: u64,
    total_assets: u64,
    total_shares: u64,
    rounding: Rounding,
) -> Result<u64, MathError> {
    if total_shares == 0 || total_assets == 0 {
        return Ok(assets);
    }
    mul_div(assets, total_shares, total_assets, rounding)
}

/// Assets equivalent to `shares` at the rate `total_assets : total_shares`.
pub fn assets_for_shares(
    shares: u64,
    total_assets: u64,
    total_shares: u64,
    rounding: Rounding,
) -> Result<u64, MathError> {
    if total_shares == 0 {
        return Ok(shares);
    }
    mul_div(shares, total_assets, total_shares, rounding)
}

// ---------------------------------------------------------------------------
// Treasury
// ---------------------------------------------------------------------------

/// A single-asset treasury vault and its share ledger.
///
/// The pooled asset balance is not stored here: it is whatever the asset
/// ledger reports for [`Treasury::address`], which is why most methods take
/// the asset as an argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    address: Address,
    asset: Address,
    /// The certificate registry allowed to credit shares.
    valocracy: Address,
    name: String,
    symbol: String,
    shares: BTreeMap<Address, u64>,
    total_shares: u64,
}

impl Treasury {
    /// Deploys an empty treasury (no shares) over `asset`, accepting credits
    /// only from `valocracy`.
    pub fn new(
        address: Address,
        asset: Address,
        valocracy: Address,
        name: String,
        symbol: String,
    ) -> Self {
        Self {
            address,
            asset,
            valocracy,
            name,
            symbol,
            shares: BTreeMap::new(),
            total_shares: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Address of the pooled asset ledger.
    pub fn asset(&self) -> Address {
        self.asset
    }

    /// The registry permitted to credit shares.
    pub fn valocracy(&self) -> Address {
        self.valocracy
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    fn ensure_asset<A: FungibleAsset + ?Sized>(&self, asset: &A) -> Result<(), TreasuryError> {
        if asset.address() != self.asset {
            return Err(TreasuryError::AssetMismatch {
                expected: self.asset,
                got: asset.address(),
            });
        }
        Ok(())
    }

    // -- Mutations -----------------------------------------------------------

    /// Credits `recipient` with shares worth `weight` asset units at the
    /// current rate, rounding down.
    ///
    /// No asset moves. A zero weight succeeds and mints nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TreasuryError::Unauthorized`] unless `caller` is the bound
    /// registry, [`TreasuryError::InvalidRecipient`] for the null address,
    /// and [`TreasuryError::ArithmeticOverflow`] if a total would overflow.
    pub fn credit_shares<A: FungibleAsset + ?Sized>(
        &mut self,
        caller: Address,
        recipient: Address,
        weight: u64,
        asset: &A,
    ) -> Result<SharesCredited, TreasuryError> {
        if caller != self.valocracy {
            return Err(TreasuryError::Unauthorized { caller });
        }
        if recipient.is_null() {
            return Err(TreasuryError::InvalidRecipient);
        }
        self.ensure_asset(asset)?;

        let total_assets = asset.balance_of(self.address);
        let shares = shares_for_assets(weight, total_assets, self.total_shares, Rounding::Floor)?;
        let new_total = checked_add(self.total_shares, shares)?;
        let new_balance = checked_add(self.shares_of(recipient), shares)?;

        if shares > 0 {
            self.shares.insert(recipient, new_balance);
        }
        self.total_shares = new_total;

        tracing::debug!(
            treasury = %self.address,
            recipient = %recipient,
            weight,
            shares,
            total_assets,
            total_shares = new_total,
            "shares credited"
        );

        Ok(SharesCredited {
            treasury: self.address,
            recipient,
            weight,
            shares,
            total_assets,
            total_shares: new_total,
        })
    }

    /// Pays `asset_amount` units out to `holder`, burning the shares they
    /// cost at the current rate, rounding up.
    ///
    /// Anyone may submit the call; the assets always go to `holder`.
    ///
    /// # Errors
    ///
    /// Returns [`TreasuryError::InsufficientAssets`] if the treasury holds
    /// less than `asset_amount`, [`TreasuryError::InsufficientShares`] if the
    /// holder cannot cover the cost, and [`TreasuryError::Asset`] if the
    /// outbound transfer fails. The share ledger is untouched on any error.
    pub fn redeem<A: FungibleAsset + ?Sized>(
        &mut self,
        caller: Address,
        holder: Address,
        asset_amount: u64,
        asset: &mut A,
    ) -> Result<AssetsRedeemed, TreasuryError> {
        if holder.is_null() {
            return Err(TreasuryError::InvalidRecipient);
        }
        self.ensure_asset(asset)?;

        let total_assets = asset.balance_of(self.address);
        if asset_amount > total_assets {
            return Err(TreasuryError::InsufficientAssets {
                requested: asset_amount,
                available: total_assets,
            });
        }

        let required =
            shares_for_assets(asset_amount, total_assets, self.total_shares, Rounding::Ceiling)?;
        self.settle(caller, holder, required, asset_amount, total_assets, asset)
    }

    /// Burns exactly `shares` of `holder`'s shares and pays out what they are
    /// worth at the current rate, rounding down.
    pub fn redeem_shares<A: FungibleAsset + ?Sized>(
        &mut self,
        caller: Address,
        holder: Address,
        shares: u64,
        asset: &mut A,
    ) -> Result<AssetsRedeemed, TreasuryError> {
        if holder.is_null() {
            return Err(TreasuryError::InvalidRecipient);
        }
        self.ensure_asset(asset)?;

        let balance = self.shares_of(holder);
        if balance < shares {
            return Err(TreasuryError::InsufficientShares {
                holder,
                balance,
                required: shares,
            });
        }

        let total_assets = asset.balance_of(self.address);
        let assets = assets_for_shares(shares, total_assets, self.total_shares, Rounding::Floor)?;
        if assets > total_assets {
            return Err(TreasuryError::InsufficientAssets {
                requested: assets,
                available: total_assets,
            });
        }
        self.settle(caller, holder, shares, assets, total_assets, asset)
    }

    /// Burns `shares` from `holder` and transfers `assets` out.
    ///
    /// Every check runs before the transfer, and the ledger is written only
    /// after the transfer succeeded.
    fn settle<A: FungibleAsset + ?Sized>(
        &mut self,
        caller: Address,
        holder: Address,
        shares: u64,
        assets: u64,
        total_assets: u64,
        asset: &mut A,
    ) -> Result<AssetsRedeemed, TreasuryError> {
        let balance = self.shares_of(holder);
        if balance < shares {
            return Err(TreasuryError::InsufficientShares {
                holder,
                balance,
                required: shares,
            });
        }
        let new_balance = balance - shares;
        let new_total = checked_sub(self.total_shares, shares)?;
        let remaining_assets = checked_sub(total_assets, assets)?;

        asset.transfer(self.address, holder, assets)?;

        if new_balance == 0 {
            self.shares.remove(&holder);
        } else {
            self.shares.insert(holder, new_balance);
        }
        self.total_shares = new_total;

        tracing::debug!(
            treasury = %self.address,
            holder = %holder,
            caller = %caller,
            assets,
            shares,
            total_assets = remaining_assets,
            total_shares = new_total,
            "assets redeemed"
        );

        Ok(AssetsRedeemed {
            treasury: self.address,
            caller,
            holder,
            assets,
            shares,
            total_assets: remaining_assets,
            total_shares: new_total,
        })
    }

    // -- Queries -------------------------------------------------------------

    /// Pooled asset units currently held, read live from the asset ledger.
    pub fn total_assets<A: FungibleAsset + ?Sized>(&self, asset: &A) -> u64 {
        asset.balance_of(self.address)
    }

    pub fn total_shares(&self) -> u64 {
        self.total_shares
    }

    pub fn shares_of(&self, holder: Address) -> u64 {
        self.shares.get(&holder).copied().unwrap_or(0)
    }

    /// Asset value of `holder`'s shares at the current rate, rounded down.
    pub fn assets_of<A: FungibleAsset + ?Sized>(&self, holder: Address, asset: &A) -> u64 {
        let shares = self.shares_of(holder);
        // shares <= total_shares, so the quotient is bounded by total_assets.
        assets_for_shares(
            shares,
            self.total_assets(asset),
            self.total_shares,
            Rounding::Floor,
        )
        .unwrap_or(0)
    }

    /// Shares `assets` units are worth at the current rate, rounded down.
    pub fn convert_to_shares<A: FungibleAsset + ?Sized>(
        &self,
        assets: u64,
        asset: &A,
    ) -> Result<u64, TreasuryError> {
        Ok(shares_for_assets(
            assets,
            self.total_assets(asset),
            self.total_shares,
            Rounding::Floor,
        )?)
    }

    /// Assets `shares` are worth at the current rate, rounded down.
    pub fn convert_to_assets<A: FungibleAsset + ?Sized>(
        &self,
        shares: u64,
        asset: &A,
    ) -> Result<u64, TreasuryError> {
        Ok(assets_for_shares(
            shares,
            self.total_assets(asset),
            self.total_shares,
            Rounding::Floor,
        )?)
    }

    /// Shares a credit of `weight` would mint right now.
    pub fn preview_credit<A: FungibleAsset + ?Sized>(
        &self,
        weight: u64,
        asset: &A,
    ) -> Result<u64, TreasuryError> {
        self.convert_to_shares(weight, asset)
    }

    /// Shares a redemption of `asset_amount` would burn right now.
    pub fn preview_redeem<A: FungibleAsset + ?Sized>(
        &self,
        asset_amount: u64,
        asset: &A,
    ) -> Result<u64, TreasuryError> {
        Ok(shares_for_assets(
            asset_amount,
            self.total_assets(asset),
            self.total_shares,
            Rounding::Ceiling,
        )?)
    }

    /// The most `holder` can withdraw in one redemption.
    pub fn max_redeem<A: FungibleAsset + ?Sized>(&self, holder: Address, asset: &A) -> u64 {
        self.assets_of(holder, asset)
    }

    /// Holders with a non-zero balance, in address order.
    pub fn holders(&self) -> impl Iterator<Item = (Address, u64)> + '_ {
        self.shares.iter().map(|(addr, shares)| (*addr, *shares))
    }

    pub fn holder_count(&self) -> usize {
        self.shares.len()
    }

    /// `total_shares == Σ shares_of(*)`.
    pub fn invariant_holds(&self) -> bool {
        self.shares
            .values()
            .try_fold(0u64, |acc, s| acc.checked_add(*s))
            .map_or(false, |sum| sum == self.total_shares)
    }

    /// Pairs the treasury with its asset ledger so the registry can credit
    /// shares through [`ShareIssuer`].
    pub fn bind<'a, A: FungibleAsset + ?Sized>(&'a mut self, asset: &'a A) -> BoundTreasury<'a, A> {
        BoundTreasury {
            treasury: self,
            asset,
        }
    }
}

/// A treasury paired with a read view of its asset ledger.
pub struct BoundTreasury<'a, A: FungibleAsset + ?Sized> {
    treasury: &'a mut Treasury,
    asset: &'a A,
}

impl<A: FungibleAsset + ?Sized> ShareIssuer for BoundTreasury<'_, A> {
    fn address(&self) -> Address {
        self.treasury.address
    }

    fn credit_shares(
        &mut self,
        caller: Address,
        recipient: Address,
        weight: u64,
    ) -> Result<SharesCredited, TreasuryError> {
        self.treasury
            .credit_shares(caller, recipient, weight, self.asset)
    }
}
