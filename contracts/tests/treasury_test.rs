//! Integration tests for the treasury vault.
//!
//! These drive the vault through a full deployment: shares are credited by
//! issuing certificates through the registry, assets arrive as donations,
//! and holders redeem against the live exchange rate.

use proptest::prelude::*;
use valocracy_contracts::asset::FungibleAsset;
use valocracy_contracts::deployment::{ContractError, Deployment, ErrorKind};
use valocracy_contracts::treasury::TreasuryError;
use valocracy_protocol::identity::Address;

fn admin() -> Address {
    Address::derive("admin")
}

fn holder(name: &str) -> Address {
    Address::derive(name)
}

/// Helper: a deployment with valors 1..=3 of rarity 1000, 1000 and 2000.
fn setup() -> (Deployment, Address) {
    let mut deployment = Deployment::bootstrap(admin()).unwrap();
    deployment.set_valor(admin(), 1, 1000, "ipfs://bronze").unwrap();
    deployment.set_valor(admin(), 2, 1000, "ipfs://silver").unwrap();
    deployment.set_valor(admin(), 3, 2000, "ipfs://gold").unwrap();
    let treasury = deployment.bound_treasury().unwrap();
    (deployment, treasury)
}

/// Helper: mints `amount` asset units to the admin and donates them.
fn donate(deployment: &mut Deployment, treasury: Address, amount: u64) {
    deployment.mint_asset(admin(), admin(), amount).unwrap();
    deployment.fund(admin(), treasury, amount).unwrap();
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn bootstrap_scenario() {
    let (mut deployment, treasury) = setup();
    let x = holder("x");

    deployment.issue(admin(), x, 1).unwrap();
    assert_eq!(deployment.shares_of(treasury, x).unwrap(), 1000);
    assert_eq!(deployment.total_shares(treasury).unwrap(), 1000);

    donate(&mut deployment, treasury, 1000);
    assert_eq!(deployment.total_assets(treasury).unwrap(), 1000);
    assert_eq!(deployment.total_shares(treasury).unwrap(), 1000);

    let receipt = deployment.redeem(x, treasury, x, 500).unwrap();
    assert_eq!(receipt.shares, 500);
    assert_eq!(deployment.shares_of(treasury, x).unwrap(), 500);
    assert_eq!(deployment.total_assets(treasury).unwrap(), 500);
    assert_eq!(deployment.total_shares(treasury).unwrap(), 500);
    assert_eq!(deployment.asset().balance_of(x), 500);
    assert!(deployment.invariant_holds());
}

#[test]
fn multi_holder_proportionality() {
    let (mut deployment, treasury) = setup();
    let (x, y, z) = (holder("x"), holder("y"), holder("z"));

    deployment.issue(admin(), x, 1).unwrap();
    donate(&mut deployment, treasury, 1000);
    deployment.issue(admin(), y, 2).unwrap();
    donate(&mut deployment, treasury, 1000);
    deployment.issue(admin(), z, 3).unwrap();
    donate(&mut deployment, treasury, 2000);

    assert_eq!(deployment.shares_of(treasury, x).unwrap(), 1000);
    assert_eq!(deployment.shares_of(treasury, y).unwrap(), 1000);
    assert_eq!(deployment.shares_of(treasury, z).unwrap(), 2000);
    assert_eq!(deployment.assets_of(treasury, x).unwrap(), 1000);
    assert_eq!(deployment.assets_of(treasury, z).unwrap(), 2000);

    // A donation after crediting is shared by weight at withdrawal time.
    donate(&mut deployment, treasury, 4000);
    assert_eq!(deployment.assets_of(treasury, x).unwrap(), 2000);
    assert_eq!(deployment.assets_of(treasury, y).unwrap(), 2000);
    assert_eq!(deployment.assets_of(treasury, z).unwrap(), 4000);

    // z exits completely; everyone else keeps their rate.
    let receipt = deployment.redeem(z, treasury, z, 4000).unwrap();
    assert_eq!(receipt.shares, 2000);
    assert_eq!(deployment.shares_of(treasury, z).unwrap(), 0);
    assert_eq!(deployment.assets_of(treasury, x).unwrap(), 2000);
    assert_eq!(deployment.assets_of(treasury, y).unwrap(), 2000);
    assert!(deployment.invariant_holds());
}

#[test]
fn credit_after_rate_rise_buys_fewer_shares() {
    let (mut deployment, treasury) = setup();
    deployment.issue(admin(), holder("x"), 1).unwrap();
    donate(&mut deployment, treasury, 3000);

    let issued = deployment.issue(admin(), holder("y"), 1).unwrap();
    // 1000 * 1000 / 3000, rounded down.
    assert_eq!(issued.credit.shares, 333);
}

// ---------------------------------------------------------------------------
// Failure Tests
// ---------------------------------------------------------------------------

#[test]
fn direct_credit_by_non_registry_rejected() {
    let (mut deployment, treasury) = setup();
    let err = deployment
        .credit_shares(admin(), treasury, holder("x"), 10)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(deployment.total_shares(treasury).unwrap(), 0);
}

#[test]
fn direct_credit_from_registry_succeeds() {
    let (mut deployment, treasury) = setup();
    let registry = deployment.valocracy().address();
    let receipt = deployment
        .credit_shares(registry, treasury, holder("x"), 10)
        .unwrap();
    assert_eq!(receipt.shares, 10);
}

#[test]
fn redeem_beyond_holdings_rejected() {
    let (mut deployment, treasury) = setup();
    let x = holder("x");
    deployment.issue(admin(), x, 1).unwrap();
    deployment.issue(admin(), holder("y"), 1).unwrap();
    donate(&mut deployment, treasury, 2000);

    let err = deployment.redeem(x, treasury, x, 1001).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientShares);

    let err = deployment.redeem(x, treasury, x, 2001).unwrap_err();
    assert_eq!(
        err,
        ContractError::Treasury(TreasuryError::InsufficientAssets {
            requested: 2001,
            available: 2000,
        })
    );
    assert_eq!(deployment.total_assets(treasury).unwrap(), 2000);
    assert_eq!(deployment.shares_of(treasury, x).unwrap(), 1000);
}

#[test]
fn redeem_shares_beyond_holdings_rejected() {
    let (mut deployment, treasury) = setup();
    let x = holder("x");
    deployment.issue(admin(), x, 1).unwrap();
    donate(&mut deployment, treasury, 1000);

    for shares in [1001, u64::MAX] {
        let err = deployment.redeem_shares(x, treasury, x, shares).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientShares);
    }
    assert_eq!(deployment.total_assets(treasury).unwrap(), 1000);
    assert_eq!(deployment.shares_of(treasury, x).unwrap(), 1000);
}

#[test]
fn redeem_for_null_holder_rejected() {
    let (mut deployment, treasury) = setup();
    let err = deployment
        .redeem(admin(), treasury, Address::NULL, 0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRecipient);
}

#[test]
fn share_overflow_reverts_issue() {
    let (mut deployment, treasury) = setup();
    deployment.set_valor(admin(), 9, u64::MAX, "ipfs://max").unwrap();
    deployment.issue(admin(), holder("x"), 9).unwrap();
    let sequence = deployment.sequence();

    let err = deployment.issue(admin(), holder("y"), 9).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArithmeticOverflow);
    assert_eq!(deployment.valocracy().total_supply(), 1);
    assert_eq!(deployment.shares_of(treasury, holder("y")).unwrap(), 0);
    assert_eq!(deployment.sequence(), sequence);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// One step of a generated deployment history.
#[derive(Debug, Clone)]
enum Op {
    Issue { who: usize, valor: u64 },
    Donate { amount: u64 },
    /// Redeems `pick % (assets_of + 1)` for the holder.
    Redeem { who: usize, pick: u64 },
}

const HOLDERS: [&str; 4] = ["a", "b", "c", "d"];

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..HOLDERS.len(), 1u64..=3).prop_map(|(who, valor)| Op::Issue { who, valor }),
        (1u64..5000).prop_map(|amount| Op::Donate { amount }),
        (0..HOLDERS.len(), any::<u64>()).prop_map(|(who, pick)| Op::Redeem { who, pick }),
    ]
}

proptest! {
    /// A late contributor's claim is never worth more than their weight.
    #[test]
    fn round_trip_never_exceeds_weight(
        seed_weight in 1u64..1_000_000_000,
        donation in 1u64..1_000_000_000,
        weight in 1u64..1_000_000_000,
    ) {
        let mut deployment = Deployment::bootstrap(admin()).unwrap();
        let treasury = deployment.bound_treasury().unwrap();
        deployment.set_valor(admin(), 1, seed_weight, "").unwrap();
        deployment.set_valor(admin(), 2, weight, "").unwrap();

        deployment.issue(admin(), holder("seed"), 1).unwrap();
        donate(&mut deployment, treasury, donation);

        let x = holder("x");
        deployment.issue(admin(), x, 2).unwrap();
        let value = deployment.assets_of(treasury, x).unwrap();
        prop_assert!(value <= weight);

        let before = deployment.asset().balance_of(x);
        deployment.redeem(x, treasury, x, value).unwrap();
        prop_assert_eq!(deployment.asset().balance_of(x) - before, value);
        prop_assert!(deployment.invariant_holds());
    }

    /// Shares always sum to the total, credits only grow the recipient, and
    /// redemptions never grow anyone.
    #[test]
    fn interleaved_operations_preserve_invariants(
        ops in prop::collection::vec(op_strategy(), 1..100),
    ) {
        let (mut deployment, treasury) = setup();
        let holders: Vec<Address> = HOLDERS.iter().map(|name| holder(name)).collect();

        for op in ops {
            let before: Vec<u64> = holders
                .iter()
                .map(|h| deployment.shares_of(treasury, *h).unwrap())
                .collect();

            match op {
                Op::Issue { who, valor } => {
                    deployment.issue(admin(), holders[who], valor).unwrap();
                    for (i, (h, b)) in holders.iter().zip(&before).enumerate() {
                        let now = deployment.shares_of(treasury, *h).unwrap();
                        if i == who {
                            prop_assert!(now >= *b);
                        } else {
                            prop_assert_eq!(now, *b);
                        }
                    }
                }
                Op::Donate { amount } => donate(&mut deployment, treasury, amount),
                Op::Redeem { who, pick } => {
                    let who = holders[who];
                    let max = deployment.assets_of(treasury, who).unwrap();
                    let amount = pick % (max + 1);
                    // Anything up to assets_of is always affordable.
                    deployment.redeem(who, treasury, who, amount).unwrap();
                    for (h, b) in holders.iter().zip(&before) {
                        prop_assert!(deployment.shares_of(treasury, *h).unwrap() <= *b);
                    }
                }
            }

            prop_assert!(deployment.invariant_holds());
            let total: u64 = holders
                .iter()
                .map(|h| deployment.shares_of(treasury, *h).unwrap())
                .sum();
            prop_assert_eq!(total, deployment.total_shares(treasury).unwrap());
        }
    }
}

#[test]
fn redeeming_shares_pays_floor() {
    let (mut deployment, treasury) = setup();
    let x = holder("x");
    deployment.set_valor(admin(), 4, 3, "").unwrap();
    deployment.issue(admin(), x, 4).unwrap();
    donate(&mut deployment, treasury, 10);

    let receipt = deployment.redeem_shares(x, treasury, x, 1).unwrap();
    assert_eq!(receipt.assets, 3);
    assert_eq!(deployment.total_assets(treasury).unwrap(), 7);
    assert_eq!(deployment.shares_of(treasury, x).unwrap(), 2);
}
