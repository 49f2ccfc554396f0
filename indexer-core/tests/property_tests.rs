//! Property-based tests for indexer invariants
//!
//! These tests use proptest to verify:
//! - Decimal conversion: truncation is idempotent and never rounds up
//! - Supply conservation: total supply equals minted minus redeemed tokens
//! - Balance conservation: transfers never create or destroy pool tokens
//! - Deterministic replay: the same events yield the same entities

use bigdecimal::BigDecimal;
use indexer_core::chain::ContractFixture;
use indexer_core::decimal::{normalize, to_decimal, truncate, Decimals};
use indexer_core::entities::{position_id, AccountCToken, EntityFamily, Market};
use indexer_core::events::{AccrueInterest, MarketListed, Mint, Redeem, Transfer};
use indexer_core::{
    Address, EventKind, EventMeta, Indexer, LogEvent, MemoryStore, SourceSet,
    StaticContractReader, TxHash,
};
use num_bigint::BigInt;
use num_traits::Zero;
use proptest::prelude::*;

const COMPTROLLER: Address = Address::from_bytes([0x01; 20]);
const MARKET: Address = Address::from_bytes([0x10; 20]);
const UNDERLYING: Address = Address::from_bytes([0x11; 20]);

/// Supply-side operations on one market
#[derive(Debug, Clone)]
enum Op {
    Mint { account: u8, tokens: u64 },
    Redeem { account: u8, tokens: u64 },
    Transfer { from: u8, to: u8, tokens: u64 },
}

/// Strategy for generating raw mantissas
fn mantissa_strategy() -> impl Strategy<Value = BigInt> {
    (any::<u64>(), any::<u64>()).prop_map(|(high, low)| (BigInt::from(high) << 64) + low)
}

/// Strategy for generating decimal counts
fn decimals_strategy() -> impl Strategy<Value = Decimals> {
    (0u8..=36).prop_map(Decimals::new)
}

/// Strategy for generating supply operations among four accounts
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u8..5, 1u64..1_000_000).prop_map(|(account, tokens)| Op::Mint { account, tokens }),
        (1u8..5, 1u64..1_000_000).prop_map(|(account, tokens)| Op::Redeem { account, tokens }),
        (1u8..5, 1u8..5, 1u64..1_000_000)
            .prop_map(|(from, to, tokens)| Op::Transfer { from, to, tokens }),
    ]
}

fn account(id: u8) -> Address {
    Address::from_bytes([0xa0 + id; 20])
}

/// Create test indexer with one listed market
fn create_test_indexer() -> Indexer<MemoryStore, StaticContractReader> {
    let reader = StaticContractReader::new()
        .with(
            MARKET,
            ContractFixture {
                symbol: Some("crUSDC".to_string()),
                decimals: Some(Decimals::new(8)),
                underlying: Some(UNDERLYING),
                ..ContractFixture::default()
            },
        )
        .with_token(UNDERLYING, "USDC", "USD Coin", 6);

    let mut indexer = Indexer::new(
        MemoryStore::new(),
        reader,
        SourceSet::with_static(COMPTROLLER, None),
    )
    .unwrap();

    indexer
        .process(&log(COMPTROLLER, 0, EventKind::MarketListed(MarketListed { c_token: MARKET })))
        .unwrap();
    indexer
}

fn log(emitter: Address, index: u64, event: EventKind) -> LogEvent {
    LogEvent {
        meta: EventMeta {
            address: emitter,
            block_number: 1 + index / 16,
            block_timestamp: 1_600_000_000,
            transaction_hash: TxHash::from_bytes([(index / 16) as u8; 32]),
            log_index: index % 16,
        },
        event,
    }
}

/// Expand an operation into the events the pool token emits for it
fn events_for(op: &Op) -> Vec<EventKind> {
    match *op {
        Op::Mint { account: id, tokens } => vec![
            EventKind::Mint(Mint {
                minter: account(id),
                mint_amount: BigInt::from(tokens) * 200,
                mint_tokens: BigInt::from(tokens),
            }),
            EventKind::Transfer(Transfer {
                from: MARKET,
                to: account(id),
                amount: BigInt::from(tokens),
            }),
        ],
        Op::Redeem { account: id, tokens } => vec![
            EventKind::Transfer(Transfer {
                from: account(id),
                to: MARKET,
                amount: BigInt::from(tokens),
            }),
            EventKind::Redeem(Redeem {
                redeemer: account(id),
                redeem_amount: BigInt::from(tokens) * 200,
                redeem_tokens: BigInt::from(tokens),
            }),
        ],
        Op::Transfer { from, to, tokens } => vec![EventKind::Transfer(Transfer {
            from: account(from),
            to: account(to),
            amount: BigInt::from(tokens),
        })],
    }
}

fn replay(ops: &[Op]) -> Indexer<MemoryStore, StaticContractReader> {
    let mut indexer = create_test_indexer();
    let mut index = 1;

    indexer
        .process(&log(
            MARKET,
            index,
            EventKind::AccrueInterest(AccrueInterest {
                cash_prior: BigInt::from(0),
                total_borrows: BigInt::from(0),
            }),
        ))
        .unwrap();

    for op in ops {
        for event in events_for(op) {
            index += 1;
            indexer.process(&log(MARKET, index, event)).unwrap();
        }
    }
    indexer
}

fn balance(indexer: &Indexer<MemoryStore, StaticContractReader>, id: u8) -> BigDecimal {
    indexer
        .load::<AccountCToken>(&position_id(&MARKET, &account(id)))
        .unwrap()
        .map(|position| position.ctoken_balance)
        .unwrap_or_else(BigDecimal::zero)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: Truncating twice equals truncating once
    #[test]
    fn prop_truncate_idempotent(mantissa in mantissa_strategy(), d in decimals_strategy(), keep in decimals_strategy()) {
        let value = to_decimal(&mantissa, d);
        let once = truncate(&value, keep);
        prop_assert_eq!(truncate(&once, keep), once);
    }

    /// Property: Truncation never rounds away from zero
    #[test]
    fn prop_truncate_toward_zero(mantissa in mantissa_strategy(), negative in any::<bool>(), d in decimals_strategy(), keep in decimals_strategy()) {
        let mantissa = if negative { -mantissa } else { mantissa };
        let value = to_decimal(&mantissa, d);
        let truncated = truncate(&value, keep);
        prop_assert!(truncated.abs() <= value.abs());
        prop_assert!(truncated.is_zero() || (truncated < BigDecimal::zero()) == negative);
    }

    /// Property: A mantissa with `d` decimals converts without loss
    #[test]
    fn prop_normalize_is_exact(mantissa in mantissa_strategy(), d in decimals_strategy()) {
        let value = normalize(&mantissa, d);
        let (digits, scale) = value.with_scale(i64::from(d.get())).into_bigint_and_exponent();
        prop_assert_eq!(scale, i64::from(d.get()));
        prop_assert_eq!(digits, mantissa);
    }

    /// Property: Total supply tracks mints minus redeems, and balances sum to it
    #[test]
    fn prop_supply_conservation(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let indexer = replay(&ops);
        let market: Market = indexer.load(&MARKET.to_hex()).unwrap().unwrap();

        let net: i128 = ops
            .iter()
            .map(|op| match *op {
                Op::Mint { tokens, .. } => i128::from(tokens),
                Op::Redeem { tokens, .. } => -i128::from(tokens),
                Op::Transfer { .. } => 0,
            })
            .sum();
        let expected = to_decimal(&BigInt::from(net), Decimals::new(8));
        prop_assert_eq!(&market.total_supply, &expected);

        let held = (1u8..5).fold(BigDecimal::zero(), |sum, id| sum + balance(&indexer, id));
        prop_assert_eq!(held, expected);
    }

    /// Property: Every mint and redeem leaves exactly one audit record
    #[test]
    fn prop_one_record_per_event(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let indexer = replay(&ops);
        let store = indexer.store();

        let mints = ops.iter().filter(|op| matches!(op, Op::Mint { .. })).count();
        let redeems = ops.iter().filter(|op| matches!(op, Op::Redeem { .. })).count();
        prop_assert_eq!(store.count(EntityFamily::MintEvent), mints);
        prop_assert_eq!(store.count(EntityFamily::RedeemEvent), redeems);
        prop_assert_eq!(store.count(EntityFamily::TransferEvent), ops.len());
    }

    /// Property: Replaying the same events yields the same market
    #[test]
    fn prop_deterministic_replay(ops in prop::collection::vec(op_strategy(), 1..20)) {
        let first = replay(&ops);
        let second = replay(&ops);

        let market1: Market = first.load(&MARKET.to_hex()).unwrap().unwrap();
        let market2: Market = second.load(&MARKET.to_hex()).unwrap().unwrap();
        prop_assert_eq!(market1, market2);
        prop_assert_eq!(first.store().len(), second.store().len());
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_exchange_rate_follows_last_mint() {
        let indexer = replay(&[
            Op::Mint { account: 1, tokens: 5_000_000_000 },
            Op::Redeem { account: 1, tokens: 1_000_000_000 },
        ]);
        let market: Market = indexer.load(&MARKET.to_hex()).unwrap().unwrap();

        // 200 underlying base units (6 decimals) per pool-token base unit (8 decimals)
        assert_eq!(market.exchange_rate, BigDecimal::from_str("20000").unwrap());
        assert_eq!(market.total_supply, BigDecimal::from(40));
        assert_eq!(market.cash, BigDecimal::from(800_000));
    }
}
