//! # Valocracy Certificate Registry
//!
//! The registry issues soulbound contribution certificates. Each certificate
//! is an instance of a *valor*: an owner-defined certificate type carrying a
//! `rarity` (the economic weight credited to the treasury on issuance) and a
//! metadata URI.
//!
//! ## Lifecycle
//!
//! 1. The owner defines valors with [`Valocracy::set_valor`].
//! 2. The owner binds a treasury with [`Valocracy::set_treasury`].
//! 3. The owner issues a certificate with [`Valocracy::mint`]. The bound
//!    treasury credits the recipient with shares worth the valor's rarity
//!    *before* the certificate is recorded; if the treasury refuses, the
//!    registry is left untouched.
//! 4. Certificates never move between holders. A holder may burn their own
//!    certificate, which leaves the shares it earned in the treasury.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use valocracy_protocol::config::{FIRST_TOKEN_ID, MAX_METADATA_LENGTH};
use valocracy_protocol::identity::Address;

use crate::treasury::{SharesCredited, TreasuryError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValocracyError {
    /// The caller is not the registry owner (or, for burns, not the holder).
    #[error("unauthorized: caller {caller} is not the owner")]
    Unauthorized {
        /// The principal that attempted the call.
        caller: Address,
    },

    /// Certificates and ownership cannot be assigned to the null address.
    #[error("invalid recipient: the null address")]
    InvalidRecipient,

    /// Certificates cannot move between two non-null holders.
    #[error("certificate {token_id} is soulbound")]
    NonTransferable { token_id: u64 },

    /// `from` does not hold the certificate.
    #[error("{from} does not hold certificate {token_id}")]
    NotTokenOwner { token_id: u64, from: Address },

    #[error("unknown valor {valor_id}")]
    UnknownValor { valor_id: u64 },

    #[error("unknown certificate {token_id}")]
    UnknownToken { token_id: u64 },

    /// No treasury has been bound yet, so nothing can be issued.
    #[error("no treasury bound to the registry")]
    TreasuryNotSet,

    /// The issuer handed to `mint` is not the bound treasury.
    #[error("treasury mismatch: registry is bound to {expected}, got {got}")]
    TreasuryMismatch { expected: Address, got: Address },

    #[error("metadata too long: {length} bytes (max {max})")]
    MetadataTooLong { length: usize, max: usize },

    /// A counter would overflow.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// The treasury rejected the share credit.
    #[error(transparent)]
    Treasury(#[from] TreasuryError),
}

// ---------------------------------------------------------------------------
// Share issuance seam
// ---------------------------------------------------------------------------

/// The part of a treasury the registry depends on: crediting shares on
/// issuance.
pub trait ShareIssuer {
    /// Address of the treasury behind this issuer.
    fn address(&self) -> Address;

    /// Credits `recipient` with shares worth `weight` asset units.
    fn credit_shares(
        &mut self,
        caller: Address,
        recipient: Address,
        weight: u64,
    ) -> Result<SharesCredited, TreasuryError>;
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A certificate type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valor {
    /// Weight credited to the treasury for each certificate of this type.
    pub rarity: u64,
    /// Content URI describing the certificate.
    pub metadata: String,
}

/// An issued certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub owner: Address,
    pub valor_id: u64,
}

// -- Receipts ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValorUpdated {
    pub valor_id: u64,
    pub rarity: u64,
    pub metadata: String,
}

/// Outcome of a successful issuance, including the treasury credit it caused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateIssued {
    pub to: Address,
    pub token_id: u64,
    pub valor_id: u64,
    pub credit: SharesCredited,
}

/// A certificate movement. Only mints (`from` null) and burns (`to` null)
/// ever happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateTransferred {
    pub from: Address,
    pub to: Address,
    pub token_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryUpdated {
    pub previous: Option<Address>,
    pub treasury: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTransferred {
    pub previous_owner: Address,
    pub new_owner: Address,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valocracy {
    address: Address,
    name: String,
    symbol: String,
    owner: Address,
    treasury: Option<Address>,
    valors: BTreeMap<u64, Valor>,
    tokens: BTreeMap<u64, Certificate>,
    balances: BTreeMap<Address, u64>,
    next_token_id: u64,
    total_supply: u64,
}

impl Valocracy {
    /// Deploys an empty registry administered by `owner`.
    pub fn new(address: Address, name: String, symbol: String, owner: Address) -> Self {
        Self {
            address,
            name,
            symbol,
            owner,
            treasury: None,
            valors: BTreeMap::new(),
            tokens: BTreeMap::new(),
            balances: BTreeMap::new(),
            next_token_id: FIRST_TOKEN_ID,
            total_supply: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// The treasury credited on issuance, if one is bound.
    pub fn treasury(&self) -> Option<Address> {
        self.treasury
    }

    fn only_owner(&self, caller: Address) -> Result<(), ValocracyError> {
        if caller != self.owner {
            return Err(ValocracyError::Unauthorized { caller });
        }
        Ok(())
    }

    // -- Administration ------------------------------------------------------

    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Result<OwnershipTransferred, ValocracyError> {
        self.only_owner(caller)?;
        if new_owner.is_null() {
            return Err(ValocracyError::InvalidRecipient);
        }
        let previous_owner = self.owner;
        self.owner = new_owner;
        Ok(OwnershipTransferred {
            previous_owner,
            new_owner,
        })
    }

    /// Defines or redefines certificate type `valor_id`.
    ///
    /// Redefining only affects certificates issued afterwards; shares already
    /// credited are never revisited.
    pub fn set_valor(
        &mut self,
        caller: Address,
        valor_id: u64,
        rarity: u64,
        metadata: String,
    ) -> Result<ValorUpdated, ValocracyError> {
        self.only_owner(caller)?;
        if metadata.len() > MAX_METADATA_LENGTH {
            return Err(ValocracyError::MetadataTooLong {
                length: metadata.len(),
                max: MAX_METADATA_LENGTH,
            });
        }
        self.valors.insert(
            valor_id,
            Valor {
                rarity,
                metadata: metadata.clone(),
            },
        );
        Ok(ValorUpdated {
            valor_id,
            rarity,
            metadata,
        })
    }

    /// Binds (or rebinds) the treasury credited on issuance.
    pub fn set_treasury(
        &mut self,
        caller: Address,
        treasury: Address,
    ) -> Result<TreasuryUpdated, ValocracyError> {
        self.only_owner(caller)?;
        if treasury.is_null() {
            return Err(ValocracyError::InvalidRecipient);
        }
        let previous = self.treasury.replace(treasury);
        Ok(TreasuryUpdated { previous, treasury })
    }

    // -- Issuance ------------------------------------------------------------

    /// Issues a certificate of type `valor_id` to `to`, crediting the
    /// recipient with treasury shares worth the valor's rarity.
    ///
    /// # Errors
    ///
    /// Fails with [`ValocracyError::Unauthorized`] for non-owners,
    /// [`ValocracyError::UnknownValor`] for undefined types,
    /// [`ValocracyError::TreasuryNotSet`] before a treasury is bound, and
    /// [`ValocracyError::Treasury`] if the credit is refused. The registry
    /// is unchanged on every error.
    pub fn mint<I: ShareIssuer + ?Sized>(
        &mut self,
        caller: Address,
        to: Address,
        valor_id: u64,
        issuer: &mut I,
    ) -> Result<CertificateIssued, ValocracyError> {
        let treasury = self.mint_target(caller, to, valor_id)?;
        let rarity = self.rarity_of(valor_id)?;
        if issuer.address() != treasury {
            return Err(ValocracyError::TreasuryMismatch {
                expected: treasury,
                got: issuer.address(),
            });
        }

        let token_id = self.next_token_id;
        let next_token_id = token_id
            .checked_add(1)
            .ok_or(ValocracyError::ArithmeticOverflow)?;
        let total_supply = self
            .total_supply
            .checked_add(1)
            .ok_or(ValocracyError::ArithmeticOverflow)?;
        let balance = self
            .balance_of(to)
            .checked_add(1)
            .ok_or(ValocracyError::ArithmeticOverflow)?;

        let credit = issuer.credit_shares(self.address, to, rarity)?;

        self.tokens.insert(
            token_id,
            Certificate {
                owner: to,
                valor_id,
            },
        );
        self.balances.insert(to, balance);
        self.next_token_id = next_token_id;
        self.total_supply = total_supply;

        Ok(CertificateIssued {
            to,
            token_id,
            valor_id,
            credit,
        })
    }

    /// Runs the registry-side checks of [`Valocracy::mint`] and returns the
    /// treasury the credit must go through.
    pub fn mint_target(
        &self,
        caller: Address,
        to: Address,
        valor_id: u64,
    ) -> Result<Address, ValocracyError> {
        self.only_owner(caller)?;
        if to.is_null() {
            return Err(ValocracyError::InvalidRecipient);
        }
        if !self.valors.contains_key(&valor_id) {
            return Err(ValocracyError::UnknownValor { valor_id });
        }
        self.treasury.ok_or(ValocracyError::TreasuryNotSet)
    }

    // -- Transfers -----------------------------------------------------------

    /// Moves a certificate. Only burns (`to` null) are permitted, and only by
    /// the holder.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        token_id: u64,
    ) -> Result<CertificateTransferred, ValocracyError> {
        let holder = self.owner_of(token_id)?;
        if !to.is_null() {
            return Err(ValocracyError::NonTransferable { token_id });
        }
        if caller != holder {
            return Err(ValocracyError::Unauthorized { caller });
        }
        if from != holder {
            return Err(ValocracyError::NotTokenOwner { token_id, from });
        }

        let balance = self.balance_of(holder);
        self.tokens.remove(&token_id);
        if balance <= 1 {
            self.balances.remove(&holder);
        } else {
            self.balances.insert(holder, balance - 1);
        }
        self.total_supply = self.total_supply.saturating_sub(1);

        Ok(CertificateTransferred {
            from: holder,
            to: Address::NULL,
            token_id,
        })
    }

    /// Burns `token_id`. The caller must hold it.
    pub fn burn(
        &mut self,
        caller: Address,
        token_id: u64,
    ) -> Result<CertificateTransferred, ValocracyError> {
        let holder = self.owner_of(token_id)?;
        self.transfer_from(caller, holder, Address::NULL, token_id)
    }

    // -- Queries -------------------------------------------------------------

    pub fn valor(&self, valor_id: u64) -> Option<&Valor> {
        self.valors.get(&valor_id)
    }

    pub fn valors(&self) -> impl Iterator<Item = (u64, &Valor)> + '_ {
        self.valors.iter().map(|(id, v)| (*id, v))
    }

    pub fn rarity_of(&self, valor_id: u64) -> Result<u64, ValocracyError> {
        self.valor(valor_id)
            .map(|v| v.rarity)
            .ok_or(ValocracyError::UnknownValor { valor_id })
    }

    pub fn metadata_of(&self, valor_id: u64) -> Result<&str, ValocracyError> {
        self.valor(valor_id)
            .map(|v| v.metadata.as_str())
            .ok_or(ValocracyError::UnknownValor { valor_id })
    }

    pub fn certificate(&self, token_id: u64) -> Option<&Certificate> {
        self.tokens.get(&token_id)
    }

    pub fn owner_of(&self, token_id: u64) -> Result<Address, ValocracyError> {
        self.certificate(token_id)
            .map(|c| c.owner)
            .ok_or(ValocracyError::UnknownToken { token_id })
    }

    pub fn valor_of(&self, token_id: u64) -> Result<u64, ValocracyError> {
        self.certificate(token_id)
            .map(|c| c.valor_id)
            .ok_or(ValocracyError::UnknownToken { token_id })
    }

    /// Metadata URI of the certificate's valor, as it is defined now.
    pub fn token_uri(&self, token_id: u64) -> Result<&str, ValocracyError> {
        let valor_id = self.valor_of(token_id)?;
        self.metadata_of(valor_id)
    }

    pub fn balance_of(&self, owner: Address) -> u64 {
        self.balances.get(&owner).copied().unwrap_or(0)
    }

    /// Certificates currently outstanding (issued minus burned).
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Certificate ids held by `owner`, ascending.
    pub fn tokens_of(&self, owner: Address) -> Vec<u64> {
        self.tokens
            .iter()
            .filter(|(_, c)| c.owner == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Id the next issued certificate will receive.
    pub fn next_token_id(&self) -> u64 {
        self.next_token_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::derive("owner")
    }

    fn alice() -> Address {
        Address::derive("alice")
    }

    fn bob() -> Address {
        Address::derive("bob")
    }

    fn vault() -> Address {
        Address::derive("vault")
    }

    /// Records credits instead of keeping a real share ledger.
    struct RecordingIssuer {
        address: Address,
        credits: Vec<(Address, Address, u64)>,
        refuse: bool,
    }

    impl RecordingIssuer {
        fn new() -> Self {
            Self {
                address: vault(),
                credits: Vec::new(),
                refuse: false,
            }
        }
    }

    impl ShareIssuer for RecordingIssuer {
        fn address(&self) -> Address {
            self.address
        }

        fn credit_shares(
            &mut self,
            caller: Address,
            recipient: Address,
            weight: u64,
        ) -> Result<SharesCredited, TreasuryError> {
            if self.refuse {
                return Err(TreasuryError::ArithmeticOverflow);
            }
            self.credits.push((caller, recipient, weight));
            Ok(SharesCredited {
                treasury: self.address,
                recipient,
                weight,
                shares: weight,
                total_assets: 0,
                total_shares: weight,
            })
        }
    }

    fn registry() -> Valocracy {
        let mut registry = Valocracy::new(
            Address::derive("registry"),
            "Valocracy".into(),
            "gVal".into(),
            owner(),
        );
        registry.set_treasury(owner(), vault()).unwrap();
        registry
            .set_valor(owner(), 1, 100, "ipfs://founder".into())
            .unwrap();
        registry
    }

    #[test]
    fn set_valor_records_type() {
        let registry = registry();
        assert_eq!(registry.rarity_of(1).unwrap(), 100);
        assert_eq!(registry.metadata_of(1).unwrap(), "ipfs://founder");
        assert_eq!(
            registry.rarity_of(9),
            Err(ValocracyError::UnknownValor { valor_id: 9 })
        );
    }

    #[test]
    fn set_valor_requires_owner() {
        let mut registry = registry();
        let err = registry
            .set_valor(alice(), 2, 5, "ipfs://x".into())
            .unwrap_err();
        assert_eq!(err, ValocracyError::Unauthorized { caller: alice() });
        assert!(registry.valor(2).is_none());
    }

    #[test]
    fn set_valor_rejects_oversized_metadata() {
        let mut registry = registry();
        let err = registry
            .set_valor(owner(), 2, 5, "x".repeat(MAX_METADATA_LENGTH + 1))
            .unwrap_err();
        assert!(matches!(err, ValocracyError::MetadataTooLong { .. }));
    }

    #[test]
    fn mint_credits_rarity_and_assigns_first_id() {
        let mut registry = registry();
        let mut issuer = RecordingIssuer::new();

        let issued = registry.mint(owner(), alice(), 1, &mut issuer).unwrap();
        assert_eq!(issued.token_id, FIRST_TOKEN_ID);
        assert_eq!(issued.credit.shares, 100);
        assert_eq!(issuer.credits, vec![(registry.address(), alice(), 100)]);
        assert_eq!(registry.owner_of(1).unwrap(), alice());
        assert_eq!(registry.valor_of(1).unwrap(), 1);
        assert_eq!(registry.token_uri(1).unwrap(), "ipfs://founder");
        assert_eq!(registry.balance_of(alice()), 1);
        assert_eq!(registry.total_supply(), 1);

        let second = registry.mint(owner(), bob(), 1, &mut issuer).unwrap();
        assert_eq!(second.token_id, 2);
    }

    #[test]
    fn mint_requires_owner() {
        let mut registry = registry();
        let mut issuer = RecordingIssuer::new();
        let err = registry.mint(alice(), alice(), 1, &mut issuer).unwrap_err();
        assert_eq!(err, ValocracyError::Unauthorized { caller: alice() });
        assert!(issuer.credits.is_empty());
    }

    #[test]
    fn mint_unknown_valor_fails() {
        let mut registry = registry();
        let mut issuer = RecordingIssuer::new();
        let err = registry.mint(owner(), alice(), 7, &mut issuer).unwrap_err();
        assert_eq!(err, ValocracyError::UnknownValor { valor_id: 7 });
        assert!(issuer.credits.is_empty());
    }

    #[test]
    fn mint_without_treasury_fails() {
        let mut registry = Valocracy::new(
            Address::derive("registry"),
            "Valocracy".into(),
            "gVal".into(),
            owner(),
        );
        registry.set_valor(owner(), 1, 10, String::new()).unwrap();
        let err = registry
            .mint(owner(), alice(), 1, &mut RecordingIssuer::new())
            .unwrap_err();
        assert_eq!(err, ValocracyError::TreasuryNotSet);
    }

    #[test]
    fn mint_through_wrong_treasury_fails() {
        let mut registry = registry();
        let mut issuer = RecordingIssuer::new();
        issuer.address = Address::derive("elsewhere");
        let err = registry.mint(owner(), alice(), 1, &mut issuer).unwrap_err();
        assert!(matches!(err, ValocracyError::TreasuryMismatch { .. }));
    }

    #[test]
    fn refused_credit_leaves_registry_untouched() {
        let mut registry = registry();
        let mut issuer = RecordingIssuer::new();
        issuer.refuse = true;
        let before = registry.clone();

        let err = registry.mint(owner(), alice(), 1, &mut issuer).unwrap_err();
        assert_eq!(err, ValocracyError::Treasury(TreasuryError::ArithmeticOverflow));
        assert_eq!(registry, before);
    }

    #[test]
    fn certificates_are_soulbound() {
        let mut registry = registry();
        registry
            .mint(owner(), alice(), 1, &mut RecordingIssuer::new())
            .unwrap();

        let err = registry.transfer_from(alice(), alice(), bob(), 1).unwrap_err();
        assert_eq!(err, ValocracyError::NonTransferable { token_id: 1 });
        assert_eq!(registry.owner_of(1).unwrap(), alice());
    }

    #[test]
    fn holder_can_burn() {
        let mut registry = registry();
        registry
            .mint(owner(), alice(), 1, &mut RecordingIssuer::new())
            .unwrap();

        let burned = registry.burn(alice(), 1).unwrap();
        assert_eq!(burned.from, alice());
        assert!(burned.to.is_null());
        assert_eq!(
            registry.owner_of(1),
            Err(ValocracyError::UnknownToken { token_id: 1 })
        );
        assert_eq!(registry.balance_of(alice()), 0);
        assert_eq!(registry.total_supply(), 0);
    }

    #[test]
    fn burn_by_non_holder_rejected() {
        let mut registry = registry();
        registry
            .mint(owner(), alice(), 1, &mut RecordingIssuer::new())
            .unwrap();

        let err = registry.burn(owner(), 1).unwrap_err();
        assert_eq!(err, ValocracyError::Unauthorized { caller: owner() });
        let err = registry
            .transfer_from(alice(), bob(), Address::NULL, 1)
            .unwrap_err();
        assert_eq!(
            err,
            ValocracyError::NotTokenOwner {
                token_id: 1,
                from: bob()
            }
        );
    }

    #[test]
    fn burned_ids_are_not_reused() {
        let mut registry = registry();
        let mut issuer = RecordingIssuer::new();
        registry.mint(owner(), alice(), 1, &mut issuer).unwrap();
        registry.burn(alice(), 1).unwrap();
        let issued = registry.mint(owner(), alice(), 1, &mut issuer).unwrap();
        assert_eq!(issued.token_id, 2);
        assert_eq!(registry.tokens_of(alice()), vec![2]);
    }

    #[test]
    fn ownership_transfer() {
        let mut registry = registry();
        let receipt = registry.transfer_ownership(owner(), alice()).unwrap();
        assert_eq!(receipt.previous_owner, owner());
        assert_eq!(registry.owner(), alice());
        assert!(registry.set_valor(owner(), 3, 1, String::new()).is_err());
        assert_eq!(
            registry.transfer_ownership(alice(), Address::NULL),
            Err(ValocracyError::InvalidRecipient)
        );
    }

    #[test]
    fn set_treasury_rebinds() {
        let mut registry = registry();
        let other = Address::derive("vault-2");
        let receipt = registry.set_treasury(owner(), other).unwrap();
        assert_eq!(receipt.previous, Some(vault()));
        assert_eq!(registry.treasury(), Some(other));
        assert!(registry.set_treasury(alice(), vault()).is_err());
    }
}
