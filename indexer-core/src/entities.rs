//! Indexed entities
//!
//! Every entity is keyed by a stable string id built from lowercase `0x`
//! addresses (see [`crate::types::Address::to_hex`]). Decimal quantities are
//! stored as base-10 strings so a value read back from storage is bit-for-bit
//! the value that was written.
//!
//! # Invariants
//!
//! - Nothing is ever deleted; a market is only flagged `delisted`
//! - Per-event records and [`AccountCTokenTransaction`] are write-once
//! - Lazily created families get their defaults from [`Seeded::with_defaults`]
//!   and nowhere else

use crate::decimal::{decimal_string, initial_exchange_rate, Decimals};
use crate::repository::{Entity, Seeded};
use crate::types::{Address, EventMeta, TxHash};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of entity families; one storage column family each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityFamily {
    Comptroller,
    Market,
    Account,
    AccountCToken,
    AccountCTokenTransaction,
    CreditLimit,
    StakingRewardsFactory,
    StakingRewards,
    StakingRewardsUser,
    StakingRewardsUserReward,
    MintEvent,
    RedeemEvent,
    BorrowEvent,
    RepayEvent,
    LiquidationEvent,
    TransferEvent,
    FlashloanEvent,
}

impl EntityFamily {
    /// All families, in column family creation order
    pub const ALL: [EntityFamily; 17] = [
        EntityFamily::Comptroller,
        EntityFamily::Market,
        EntityFamily::Account,
        EntityFamily::AccountCToken,
        EntityFamily::AccountCTokenTransaction,
        EntityFamily::CreditLimit,
        EntityFamily::StakingRewardsFactory,
        EntityFamily::StakingRewards,
        EntityFamily::StakingRewardsUser,
        EntityFamily::StakingRewardsUserReward,
        EntityFamily::MintEvent,
        EntityFamily::RedeemEvent,
        EntityFamily::BorrowEvent,
        EntityFamily::RepayEvent,
        EntityFamily::LiquidationEvent,
        EntityFamily::TransferEvent,
        EntityFamily::FlashloanEvent,
    ];

    /// Storage column family name
    pub fn cf_name(self) -> &'static str {
        match self {
            EntityFamily::Comptroller => "comptroller",
            EntityFamily::Market => "market",
            EntityFamily::Account => "account",
            EntityFamily::AccountCToken => "account_ctoken",
            EntityFamily::AccountCTokenTransaction => "account_ctoken_tx",
            EntityFamily::CreditLimit => "credit_limit",
            EntityFamily::StakingRewardsFactory => "staking_rewards_factory",
            EntityFamily::StakingRewards => "staking_rewards",
            EntityFamily::StakingRewardsUser => "staking_rewards_user",
            EntityFamily::StakingRewardsUserReward => "staking_rewards_user_reward",
            EntityFamily::MintEvent => "mint_event",
            EntityFamily::RedeemEvent => "redeem_event",
            EntityFamily::BorrowEvent => "borrow_event",
            EntityFamily::RepayEvent => "repay_event",
            EntityFamily::LiquidationEvent => "liquidation_event",
            EntityFamily::TransferEvent => "transfer_event",
            EntityFamily::FlashloanEvent => "flashloan_event",
        }
    }

    /// Append-only audit record family
    pub fn is_event_record(self) -> bool {
        matches!(
            self,
            EntityFamily::MintEvent
                | EntityFamily::RedeemEvent
                | EntityFamily::BorrowEvent
                | EntityFamily::RepayEvent
                | EntityFamily::LiquidationEvent
                | EntityFamily::TransferEvent
                | EntityFamily::FlashloanEvent
        )
    }
}

impl fmt::Display for EntityFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn zero() -> BigDecimal {
    BigDecimal::from(0)
}

/// `market-account`
pub fn position_id(market: &Address, account: &Address) -> String {
    format!("{}-{}", market, account)
}

/// Protocol-wide aggregate, keyed by the comptroller address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comptroller {
    /// Comptroller address
    pub id: String,

    /// Current admin
    pub admin: Option<Address>,

    /// Current implementation behind the proxy
    pub implementation: Option<Address>,

    /// Close factor (mantissa / 1e18)
    #[serde(with = "decimal_string")]
    pub close_factor: BigDecimal,

    /// Liquidation incentive (mantissa / 1e18)
    #[serde(with = "decimal_string")]
    pub liquidation_incentive: BigDecimal,

    /// Price oracle
    pub price_oracle: Option<Address>,

    /// Pause guardian
    pub pause_guardian: Option<Address>,

    /// Liquidity mining module
    pub liquidity_mining: Option<Address>,

    /// Protocol-wide transfer pause
    pub transfer_guardian_paused: bool,

    /// Protocol-wide seize pause
    pub seize_guardian_paused: bool,

    /// Listed minus delisted markets
    pub total_markets: u32,
}

/// Seed of the comptroller aggregate, read from the contract on first use
#[derive(Debug, Clone)]
pub struct ComptrollerSeed {
    pub address: Address,
    pub admin: Option<Address>,
    pub implementation: Option<Address>,
}

impl Entity for Comptroller {
    const FAMILY: EntityFamily = EntityFamily::Comptroller;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Seeded for Comptroller {
    type Seed = ComptrollerSeed;

    fn id_for(seed: &ComptrollerSeed) -> String {
        seed.address.to_hex()
    }

    fn with_defaults(seed: ComptrollerSeed) -> Self {
        Self {
            id: seed.address.to_hex(),
            admin: seed.admin,
            implementation: seed.implementation,
            close_factor: zero(),
            liquidation_incentive: zero(),
            price_oracle: None,
            pause_guardian: None,
            liquidity_mining: None,
            transfer_guardian_paused: false,
            seize_guardian_paused: false,
            total_markets: 0,
        }
    }
}

/// A listed lending pool
///
/// `total_supply` is in pool-token units; `cash`, `total_borrows` and the
/// caps are in underlying units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Pool token address
    pub id: String,

    /// Pool token symbol
    pub symbol: String,

    /// Pool token name
    pub name: String,

    /// Pool token decimals
    pub decimals: Decimals,

    /// Underlying asset (absent when the read failed)
    pub underlying_address: Option<Address>,

    /// Underlying symbol (empty until known)
    pub underlying_symbol: String,

    /// Underlying name (empty until known)
    pub underlying_name: String,

    /// Underlying decimals
    pub underlying_decimals: Decimals,

    /// Pool token implementation
    pub implementation: Option<Address>,

    /// Interest rate model
    pub interest_rate_model: Option<Address>,

    /// Underlying per pool token, truncated to 18 digits
    #[serde(with = "decimal_string")]
    pub exchange_rate: BigDecimal,

    /// Outstanding pool tokens
    #[serde(with = "decimal_string")]
    pub total_supply: BigDecimal,

    /// Outstanding borrows
    #[serde(with = "decimal_string")]
    pub total_borrows: BigDecimal,

    /// Underlying held by the pool
    #[serde(with = "decimal_string")]
    pub cash: BigDecimal,

    /// Pool tokens flagged as collateral
    #[serde(with = "decimal_string")]
    pub total_collateral_tokens: BigDecimal,

    /// Collateral factor (mantissa / 1e18)
    #[serde(with = "decimal_string")]
    pub collateral_factor: BigDecimal,

    /// Reserve factor (mantissa / 1e18)
    #[serde(with = "decimal_string")]
    pub reserve_factor: BigDecimal,

    /// Collateral cap in pool tokens
    #[serde(with = "decimal_string")]
    pub collateral_cap: BigDecimal,

    /// Supply cap
    #[serde(with = "decimal_string")]
    pub supply_cap: BigDecimal,

    /// Borrow cap
    #[serde(with = "decimal_string")]
    pub borrow_cap: BigDecimal,

    /// Minting paused
    pub supply_paused: bool,

    /// Borrowing paused
    pub borrow_paused: bool,

    /// Flashloans paused
    pub flashloan_paused: bool,

    /// Market delisted (never removed)
    pub delisted: bool,

    /// Ids of credit limits opened against this market
    pub credit_limits: Vec<String>,

    /// Timestamp of the last interest accrual
    pub block_timestamp: i64,
}

impl Market {
    /// Market as listed, before any contract metadata is applied
    pub fn new(address: Address) -> Self {
        Self {
            id: address.to_hex(),
            symbol: String::new(),
            name: String::new(),
            decimals: Decimals::CTOKEN,
            underlying_address: None,
            underlying_symbol: String::new(),
            underlying_name: String::new(),
            underlying_decimals: Decimals::DEFAULT_UNDERLYING,
            implementation: None,
            interest_rate_model: None,
            exchange_rate: initial_exchange_rate(),
            total_supply: zero(),
            total_borrows: zero(),
            cash: zero(),
            total_collateral_tokens: zero(),
            collateral_factor: zero(),
            reserve_factor: zero(),
            collateral_cap: zero(),
            supply_cap: zero(),
            borrow_cap: zero(),
            supply_paused: false,
            borrow_paused: false,
            flashloan_paused: false,
            delisted: false,
            credit_limits: Vec::new(),
            block_timestamp: 0,
        }
    }

    /// Underlying metadata still missing
    pub fn needs_underlying_backfill(&self) -> bool {
        self.underlying_symbol.is_empty() && self.underlying_address.is_some()
    }
}

impl Entity for Market {
    const FAMILY: EntityFamily = EntityFamily::Market;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A participant address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
}

impl Entity for Account {
    const FAMILY: EntityFamily = EntityFamily::Account;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Seeded for Account {
    type Seed = Address;

    fn id_for(address: &Address) -> String {
        address.to_hex()
    }

    fn with_defaults(address: Address) -> Self {
        Self {
            id: address.to_hex(),
        }
    }
}

/// Position of one account in one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCToken {
    /// `market-account`
    pub id: String,

    /// Market id
    pub market: String,

    /// Account id
    pub account: String,

    /// Pool token symbol at creation
    pub symbol: String,

    /// Pool tokens held
    #[serde(with = "decimal_string")]
    pub ctoken_balance: BigDecimal,

    /// Pool tokens flagged as collateral
    #[serde(with = "decimal_string")]
    pub ctoken_collateral_balance: BigDecimal,

    /// Borrow balance as of the last borrow or repay (underlying units)
    #[serde(with = "decimal_string")]
    pub stored_borrow_balance: BigDecimal,

    /// Account entered the market as collateral
    pub entered_market: bool,

    /// Last touched
    pub block_time: i64,
}

/// Seed of a position: the pair it belongs to and the market symbol
#[derive(Debug, Clone)]
pub struct PositionSeed {
    pub market: Address,
    pub account: Address,
    pub symbol: String,
}

impl Entity for AccountCToken {
    const FAMILY: EntityFamily = EntityFamily::AccountCToken;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Seeded for AccountCToken {
    type Seed = PositionSeed;

    fn id_for(seed: &PositionSeed) -> String {
        position_id(&seed.market, &seed.account)
    }

    fn with_defaults(seed: PositionSeed) -> Self {
        Self {
            id: position_id(&seed.market, &seed.account),
            market: seed.market.to_hex(),
            account: seed.account.to_hex(),
            symbol: seed.symbol,
            ctoken_balance: zero(),
            ctoken_collateral_balance: zero(),
            stored_borrow_balance: zero(),
            entered_market: false,
            block_time: 0,
        }
    }
}

/// Activity marker of a position, one per touching event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCTokenTransaction {
    /// `market-account-txHash-logIndex`
    pub id: String,
    pub account_ctoken: String,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub block_time: i64,
    pub log_index: u64,
}

impl AccountCTokenTransaction {
    /// Marker for `position` touched by the event at `meta`
    pub fn new(position: &str, meta: &EventMeta) -> Self {
        Self {
            id: format!("{}-{}", position, meta.record_id()),
            account_ctoken: position.to_string(),
            tx_hash: meta.transaction_hash,
            block_number: meta.block_number,
            block_time: meta.block_timestamp,
            log_index: meta.log_index,
        }
    }
}

impl Entity for AccountCTokenTransaction {
    const FAMILY: EntityFamily = EntityFamily::AccountCTokenTransaction;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Uncollateralized borrow allowance of a (borrower, market) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditLimit {
    /// `borrower-market`
    pub id: String,

    /// Borrower id
    pub borrower: String,

    /// Market id
    pub market: String,

    /// Granted limit (underlying units)
    #[serde(with = "decimal_string")]
    pub credit_limit: BigDecimal,

    /// Borrowed against the limit, mirrored from borrow and repay
    #[serde(with = "decimal_string")]
    pub credit_borrow: BigDecimal,

    /// Last update
    pub block_timestamp: i64,
}

/// Seed of a credit limit
#[derive(Debug, Clone, Copy)]
pub struct CreditKey {
    pub borrower: Address,
    pub market: Address,
}

impl Entity for CreditLimit {
    const FAMILY: EntityFamily = EntityFamily::CreditLimit;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Seeded for CreditLimit {
    type Seed = CreditKey;

    fn id_for(key: &CreditKey) -> String {
        format!("{}-{}", key.borrower, key.market)
    }

    fn with_defaults(key: CreditKey) -> Self {
        Self {
            id: Self::id_for(&key),
            borrower: key.borrower.to_hex(),
            market: key.market.to_hex(),
            credit_limit: zero(),
            credit_borrow: zero(),
            block_timestamp: 0,
        }
    }
}

/// Factory deploying staking pools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingRewardsFactory {
    pub id: String,
    /// Pools created by this factory
    pub pools: Vec<String>,
}

impl Entity for StakingRewardsFactory {
    const FAMILY: EntityFamily = EntityFamily::StakingRewardsFactory;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Seeded for StakingRewardsFactory {
    type Seed = Address;

    fn id_for(address: &Address) -> String {
        address.to_hex()
    }

    fn with_defaults(address: Address) -> Self {
        Self {
            id: address.to_hex(),
            pools: Vec::new(),
        }
    }
}

/// A staking pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingRewards {
    /// Pool address
    pub id: String,

    /// Factory id
    pub factory: String,

    /// Token being staked
    pub staking_token: Address,

    /// Market id when the staking token is a listed pool token
    pub market: Option<String>,

    /// Staked tokens
    #[serde(with = "decimal_string")]
    pub total_staked: BigDecimal,

    /// `total_staked` valued in underlying at the last stake or withdrawal
    #[serde(with = "decimal_string")]
    pub total_staked_underlying: BigDecimal,
}

impl StakingRewards {
    /// Empty pool
    pub fn new(address: Address, factory: &str, staking_token: Address, market: Option<String>) -> Self {
        Self {
            id: address.to_hex(),
            factory: factory.to_string(),
            staking_token,
            market,
            total_staked: zero(),
            total_staked_underlying: zero(),
        }
    }
}

impl Entity for StakingRewards {
    const FAMILY: EntityFamily = EntityFamily::StakingRewards;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Stake of one user in one pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingRewardsUser {
    /// `pool-user`
    pub id: String,
    pub staking_rewards: String,
    pub user: Address,
    #[serde(with = "decimal_string")]
    pub staked_balance: BigDecimal,
    #[serde(with = "decimal_string")]
    pub staked_balance_underlying: BigDecimal,
}

/// Seed of a staker record
#[derive(Debug, Clone, Copy)]
pub struct StakerKey {
    pub pool: Address,
    pub user: Address,
}

impl Entity for StakingRewardsUser {
    const FAMILY: EntityFamily = EntityFamily::StakingRewardsUser;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Seeded for StakingRewardsUser {
    type Seed = StakerKey;

    fn id_for(key: &StakerKey) -> String {
        format!("{}-{}", key.pool, key.user)
    }

    fn with_defaults(key: StakerKey) -> Self {
        Self {
            id: Self::id_for(&key),
            staking_rewards: key.pool.to_hex(),
            user: key.user,
            staked_balance: zero(),
            staked_balance_underlying: zero(),
        }
    }
}

/// Cumulative rewards of one staker in one reward token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingRewardsUserReward {
    /// `pool-user-rewardToken`
    pub id: String,
    pub staking_rewards_user: String,
    pub rewards_token: Address,
    #[serde(with = "decimal_string")]
    pub total_rewards_claimed: BigDecimal,
}

/// Seed of a reward record
#[derive(Debug, Clone, Copy)]
pub struct RewardKey {
    pub staker: StakerKey,
    pub token: Address,
}

impl Entity for StakingRewardsUserReward {
    const FAMILY: EntityFamily = EntityFamily::StakingRewardsUserReward;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Seeded for StakingRewardsUserReward {
    type Seed = RewardKey;

    fn id_for(key: &RewardKey) -> String {
        format!("{}-{}", StakingRewardsUser::id_for(&key.staker), key.token)
    }

    fn with_defaults(key: RewardKey) -> Self {
        Self {
            id: Self::id_for(&key),
            staking_rewards_user: StakingRewardsUser::id_for(&key.staker),
            rewards_token: key.token,
            total_rewards_claimed: zero(),
        }
    }
}

// Per-event audit records. All ids are `txHash-logIndex`.

/// Supply of underlying
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintEvent {
    pub id: String,
    pub market: String,
    pub minter: Address,
    #[serde(with = "decimal_string")]
    pub ctoken_amount: BigDecimal,
    #[serde(with = "decimal_string")]
    pub underlying_amount: BigDecimal,
    pub symbol: String,
    pub block_number: u64,
    pub block_time: i64,
}

/// Redemption of pool tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedeemEvent {
    pub id: String,
    pub market: String,
    pub redeemer: Address,
    #[serde(with = "decimal_string")]
    pub ctoken_amount: BigDecimal,
    #[serde(with = "decimal_string")]
    pub underlying_amount: BigDecimal,
    pub symbol: String,
    pub block_number: u64,
    pub block_time: i64,
}

/// Borrow of underlying
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorrowEvent {
    pub id: String,
    pub market: String,
    pub borrower: Address,
    #[serde(with = "decimal_string")]
    pub amount: BigDecimal,
    /// Borrower's total after the borrow
    #[serde(with = "decimal_string")]
    pub account_borrows: BigDecimal,
    pub underlying_symbol: String,
    pub block_number: u64,
    pub block_time: i64,
}

/// Repayment of a borrow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepayEvent {
    pub id: String,
    pub market: String,
    pub payer: Address,
    pub borrower: Address,
    #[serde(with = "decimal_string")]
    pub amount: BigDecimal,
    /// Borrower's total after the repayment
    #[serde(with = "decimal_string")]
    pub account_borrows: BigDecimal,
    pub underlying_symbol: String,
    pub block_number: u64,
    pub block_time: i64,
}

/// Liquidation snapshot; balances move through the companion transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub id: String,
    /// Market the borrow was repaid in
    pub market: String,
    /// Market the collateral was seized from
    pub collateral_market: String,
    pub liquidator: Address,
    pub borrower: Address,
    /// Seized pool tokens of the collateral market
    #[serde(with = "decimal_string")]
    pub seized_ctokens: BigDecimal,
    /// Seized tokens valued in the collateral's underlying
    #[serde(with = "decimal_string")]
    pub seized_underlying: BigDecimal,
    /// Repaid amount in the borrowed underlying
    #[serde(with = "decimal_string")]
    pub repay_amount: BigDecimal,
    /// Borrower's collateral left, in the collateral's underlying
    #[serde(with = "decimal_string")]
    pub remaining_collateral: BigDecimal,
    /// Borrower's stored borrow balance in the repay market
    #[serde(with = "decimal_string")]
    pub remaining_borrow: BigDecimal,
    pub collateral_symbol: String,
    pub underlying_repay_symbol: String,
    pub block_number: u64,
    pub block_time: i64,
}

/// Pool-token transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub id: String,
    pub market: String,
    pub from: Address,
    pub to: Address,
    #[serde(with = "decimal_string")]
    pub amount: BigDecimal,
    /// `amount` at the market exchange rate when the transfer was indexed
    #[serde(with = "decimal_string")]
    pub underlying_amount: BigDecimal,
    pub symbol: String,
    pub block_number: u64,
    pub block_time: i64,
}

/// Flashloan taken from a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashloanEvent {
    pub id: String,
    pub market: String,
    pub receiver: Address,
    #[serde(with = "decimal_string")]
    pub amount: BigDecimal,
    #[serde(with = "decimal_string")]
    pub total_fee: BigDecimal,
    #[serde(with = "decimal_string")]
    pub reserves_fee: BigDecimal,
    pub underlying_symbol: String,
    pub block_number: u64,
    pub block_time: i64,
}

impl Entity for MintEvent {
    const FAMILY: EntityFamily = EntityFamily::MintEvent;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for RedeemEvent {
    const FAMILY: EntityFamily = EntityFamily::RedeemEvent;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for BorrowEvent {
    const FAMILY: EntityFamily = EntityFamily::BorrowEvent;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for RepayEvent {
    const FAMILY: EntityFamily = EntityFamily::RepayEvent;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for LiquidationEvent {
    const FAMILY: EntityFamily = EntityFamily::LiquidationEvent;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for TransferEvent {
    const FAMILY: EntityFamily = EntityFamily::TransferEvent;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for FlashloanEvent {
    const FAMILY: EntityFamily = EntityFamily::FlashloanEvent;

    fn id(&self) -> &str {
        &self.id
    }
}
