//! Decoded log events
//!
//! One struct per event signature; only the parameters the handlers consume
//! are decoded (extra JSON fields are ignored). Integer parameters are raw
//! mantissas, given as base-10 or `0x` hex strings or as JSON integers of
//! any width; see [`crate::decimal`] for the conversion rules.
//!
//! # Wire format (NDJSON)
//!
//! ```text
//! {"address":"0x..","blockNumber":1,"blockTimestamp":1600000000,
//!  "transactionHash":"0x..","logIndex":0,
//!  "event":{"name":"Mint","params":{"minter":"0x..","mintAmount":"100","mintTokens":"5000"}}}
//! ```

use crate::decimal::{mantissa_string, Mantissa};
use crate::sources::SourceTemplate;
use crate::types::{Address, EventMeta};
use serde::{Deserialize, Serialize};

/// A log event as delivered by the event source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Position and emitter
    #[serde(flatten)]
    pub meta: EventMeta,

    /// Decoded event
    pub event: EventKind,
}

impl LogEvent {
    /// Parse one NDJSON line
    pub fn from_json(line: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Every event the indexer understands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", content = "params")]
pub enum EventKind {
    // Comptroller
    /// Comptroller admin changed
    NewAdmin(NewAdmin),
    /// Comptroller implementation upgraded
    NewComptrollerImplementation(NewComptrollerImplementation),
    /// Close factor changed
    NewCloseFactor(NewCloseFactor),
    /// Liquidation incentive changed
    NewLiquidationIncentive(NewLiquidationIncentive),
    /// Price oracle changed
    NewPriceOracle(NewPriceOracle),
    /// Pause guardian changed
    NewPauseGuardian(NewPauseGuardian),
    /// Liquidity mining module changed
    NewLiquidityMining(NewLiquidityMining),
    /// Protocol-wide action paused or unpaused
    ActionPaused(ActionPaused),
    /// Per-market action paused or unpaused
    MarketActionPaused(MarketActionPaused),
    /// Market listed
    MarketListed(MarketListed),
    /// Market delisted
    MarketDelisted(MarketDelisted),
    /// Account entered a market
    MarketEntered(MarketMembership),
    /// Account exited a market
    MarketExited(MarketMembership),
    /// Collateral factor changed
    NewCollateralFactor(NewCollateralFactor),
    /// Borrow cap changed
    NewBorrowCap(NewBorrowCap),
    /// Supply cap changed
    NewSupplyCap(NewSupplyCap),
    /// Credit limit granted or changed
    CreditLimitChanged(CreditLimitChanged),

    // Pool token
    /// Interest accrued
    AccrueInterest(AccrueInterest),
    /// Underlying supplied
    Mint(Mint),
    /// Pool tokens redeemed
    Redeem(Redeem),
    /// Underlying borrowed
    Borrow(Borrow),
    /// Borrow repaid
    RepayBorrow(RepayBorrow),
    /// Borrow liquidated
    LiquidateBorrow(LiquidateBorrow),
    /// Pool tokens moved
    Transfer(Transfer),
    /// Flashloan taken
    Flashloan(Flashloan),
    /// Collateral balance of an account changed
    UserCollateralChanged(UserCollateralChanged),
    /// Reserve factor changed
    NewReserveFactor(NewReserveFactor),
    /// Interest rate model changed
    NewMarketInterestRateModel(NewMarketInterestRateModel),
    /// Pool token implementation upgraded
    NewMarketImplementation(NewMarketImplementation),
    /// Collateral cap changed
    NewCollateralCap(NewCollateralCap),
    /// Pool token renamed
    NewTokenName(NewTokenName),
    /// Pool token symbol changed
    NewTokenSymbol(NewTokenSymbol),

    // Staking
    /// Staking pool deployed by the factory
    StakingRewardsCreated(StakingRewardsCreated),
    /// Tokens staked
    Staked(StakeChange),
    /// Tokens withdrawn
    Withdrawn(StakeChange),
    /// Reward claimed
    RewardPaid(RewardPaid),
}

impl EventKind {
    /// Event name, used as a metrics label
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::NewAdmin(_) => "NewAdmin",
            EventKind::NewComptrollerImplementation(_) => "NewComptrollerImplementation",
            EventKind::NewCloseFactor(_) => "NewCloseFactor",
            EventKind::NewLiquidationIncentive(_) => "NewLiquidationIncentive",
            EventKind::NewPriceOracle(_) => "NewPriceOracle",
            EventKind::NewPauseGuardian(_) => "NewPauseGuardian",
            EventKind::NewLiquidityMining(_) => "NewLiquidityMining",
            EventKind::ActionPaused(_) => "ActionPaused",
            EventKind::MarketActionPaused(_) => "MarketActionPaused",
            EventKind::MarketListed(_) => "MarketListed",
            EventKind::MarketDelisted(_) => "MarketDelisted",
            EventKind::MarketEntered(_) => "MarketEntered",
            EventKind::MarketExited(_) => "MarketExited",
            EventKind::NewCollateralFactor(_) => "NewCollateralFactor",
            EventKind::NewBorrowCap(_) => "NewBorrowCap",
            EventKind::NewSupplyCap(_) => "NewSupplyCap",
            EventKind::CreditLimitChanged(_) => "CreditLimitChanged",
            EventKind::AccrueInterest(_) => "AccrueInterest",
            EventKind::Mint(_) => "Mint",
            EventKind::Redeem(_) => "Redeem",
            EventKind::Borrow(_) => "Borrow",
            EventKind::RepayBorrow(_) => "RepayBorrow",
            EventKind::LiquidateBorrow(_) => "LiquidateBorrow",
            EventKind::Transfer(_) => "Transfer",
            EventKind::Flashloan(_) => "Flashloan",
            EventKind::UserCollateralChanged(_) => "UserCollateralChanged",
            EventKind::NewReserveFactor(_) => "NewReserveFactor",
            EventKind::NewMarketInterestRateModel(_) => "NewMarketInterestRateModel",
            EventKind::NewMarketImplementation(_) => "NewMarketImplementation",
            EventKind::NewCollateralCap(_) => "NewCollateralCap",
            EventKind::NewTokenName(_) => "NewTokenName",
            EventKind::NewTokenSymbol(_) => "NewTokenSymbol",
            EventKind::StakingRewardsCreated(_) => "StakingRewardsCreated",
            EventKind::Staked(_) => "Staked",
            EventKind::Withdrawn(_) => "Withdrawn",
            EventKind::RewardPaid(_) => "RewardPaid",
        }
    }

    /// Kind of contract that emits this event
    pub fn source(&self) -> SourceTemplate {
        match self {
            EventKind::NewAdmin(_)
            | EventKind::NewComptrollerImplementation(_)
            | EventKind::NewCloseFactor(_)
            | EventKind::NewLiquidationIncentive(_)
            | EventKind::NewPriceOracle(_)
            | EventKind::NewPauseGuardian(_)
            | EventKind::NewLiquidityMining(_)
            | EventKind::ActionPaused(_)
            | EventKind::MarketActionPaused(_)
            | EventKind::MarketListed(_)
            | EventKind::MarketDelisted(_)
            | EventKind::MarketEntered(_)
            | EventKind::MarketExited(_)
            | EventKind::NewCollateralFactor(_)
            | EventKind::NewBorrowCap(_)
            | EventKind::NewSupplyCap(_)
            | EventKind::CreditLimitChanged(_) => SourceTemplate::Comptroller,

            EventKind::AccrueInterest(_)
            | EventKind::Mint(_)
            | EventKind::Redeem(_)
            | EventKind::Borrow(_)
            | EventKind::RepayBorrow(_)
            | EventKind::LiquidateBorrow(_)
            | EventKind::Transfer(_)
            | EventKind::Flashloan(_)
            | EventKind::UserCollateralChanged(_)
            | EventKind::NewReserveFactor(_)
            | EventKind::NewMarketInterestRateModel(_)
            | EventKind::NewMarketImplementation(_)
            | EventKind::NewCollateralCap(_)
            | EventKind::NewTokenName(_)
            | EventKind::NewTokenSymbol(_) => SourceTemplate::CToken,

            EventKind::StakingRewardsCreated(_) => SourceTemplate::StakingRewardsFactory,

            EventKind::Staked(_) | EventKind::Withdrawn(_) | EventKind::RewardPaid(_) => {
                SourceTemplate::StakingRewards
            }
        }
    }
}

/// Actions the pause guardian can toggle
///
/// Decoding fails on any other action string, so a new action kind shows up
/// as an event failure instead of being silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseAction {
    /// Pool-token transfers (protocol-wide)
    Transfer,
    /// Collateral seizure (protocol-wide)
    Seize,
    /// Supplying (per market)
    Mint,
    /// Borrowing (per market)
    Borrow,
    /// Flashloans (per market)
    Flashloan,
}

/// `NewAdmin(oldAdmin, newAdmin)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAdmin {
    pub new_admin: Address,
}

/// `NewImplementation(oldImplementation, newImplementation)` on the comptroller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComptrollerImplementation {
    pub new_implementation: Address,
}

/// `NewCloseFactor(oldCloseFactorMantissa, newCloseFactorMantissa)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCloseFactor {
    #[serde(with = "mantissa_string")]
    pub new_close_factor_mantissa: Mantissa,
}

/// `NewLiquidationIncentive(old, newLiquidationIncentiveMantissa)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLiquidationIncentive {
    #[serde(with = "mantissa_string")]
    pub new_liquidation_incentive_mantissa: Mantissa,
}

/// `NewPriceOracle(oldPriceOracle, newPriceOracle)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPriceOracle {
    pub new_price_oracle: Address,
}

/// `NewPauseGuardian(oldPauseGuardian, newPauseGuardian)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPauseGuardian {
    pub new_pause_guardian: Address,
}

/// `NewLiquidityMining(oldLiquidityMining, newLiquidityMining)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLiquidityMining {
    pub new_liquidity_mining: Address,
}

/// `ActionPaused(string action, bool pauseState)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPaused {
    pub action: PauseAction,
    pub pause_state: bool,
}

/// `ActionPaused(address cToken, string action, bool pauseState)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketActionPaused {
    pub c_token: Address,
    pub action: PauseAction,
    pub pause_state: bool,
}

/// `MarketListed(address cToken)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketListed {
    pub c_token: Address,
}

/// `MarketDelisted(address cToken)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDelisted {
    pub c_token: Address,
}

/// `MarketEntered(cToken, account)` and `MarketExited(cToken, account)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketMembership {
    pub c_token: Address,
    pub account: Address,
}

/// `NewCollateralFactor(cToken, old, newCollateralFactorMantissa)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCollateralFactor {
    pub c_token: Address,
    #[serde(with = "mantissa_string")]
    pub new_collateral_factor_mantissa: Mantissa,
}

/// `NewBorrowCap(cToken, newBorrowCap)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBorrowCap {
    pub c_token: Address,
    #[serde(with = "mantissa_string")]
    pub new_borrow_cap: Mantissa,
}

/// `NewSupplyCap(cToken, newSupplyCap)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSupplyCap {
    pub c_token: Address,
    #[serde(with = "mantissa_string")]
    pub new_supply_cap: Mantissa,
}

/// `CreditLimitChanged(protocol, market, creditLimit)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditLimitChanged {
    pub protocol: Address,
    pub market: Address,
    #[serde(with = "mantissa_string")]
    pub credit_limit: Mantissa,
}

/// `AccrueInterest(cashPrior, interestAccumulated, borrowIndex, totalBorrows)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrueInterest {
    #[serde(with = "mantissa_string")]
    pub cash_prior: Mantissa,
    #[serde(with = "mantissa_string")]
    pub total_borrows: Mantissa,
}

/// `Mint(minter, mintAmount, mintTokens)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mint {
    pub minter: Address,
    #[serde(with = "mantissa_string")]
    pub mint_amount: Mantissa,
    #[serde(with = "mantissa_string")]
    pub mint_tokens: Mantissa,
}

/// `Redeem(redeemer, redeemAmount, redeemTokens)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redeem {
    pub redeemer: Address,
    #[serde(with = "mantissa_string")]
    pub redeem_amount: Mantissa,
    #[serde(with = "mantissa_string")]
    pub redeem_tokens: Mantissa,
}

/// `Borrow(borrower, borrowAmount, accountBorrows, totalBorrows)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Borrow {
    pub borrower: Address,
    #[serde(with = "mantissa_string")]
    pub borrow_amount: Mantissa,
    #[serde(with = "mantissa_string")]
    pub account_borrows: Mantissa,
    #[serde(with = "mantissa_string")]
    pub total_borrows: Mantissa,
}

/// `RepayBorrow(payer, borrower, repayAmount, accountBorrows, totalBorrows)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepayBorrow {
    pub payer: Address,
    pub borrower: Address,
    #[serde(with = "mantissa_string")]
    pub repay_amount: Mantissa,
    #[serde(with = "mantissa_string")]
    pub account_borrows: Mantissa,
    #[serde(with = "mantissa_string")]
    pub total_borrows: Mantissa,
}

/// `LiquidateBorrow(liquidator, borrower, repayAmount, cTokenCollateral, seizeTokens)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidateBorrow {
    pub liquidator: Address,
    pub borrower: Address,
    #[serde(with = "mantissa_string")]
    pub repay_amount: Mantissa,
    pub c_token_collateral: Address,
    #[serde(with = "mantissa_string")]
    pub seize_tokens: Mantissa,
}

/// `Transfer(from, to, amount)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    #[serde(with = "mantissa_string")]
    pub amount: Mantissa,
}

/// `Flashloan(receiver, amount, totalFee, reservesFee)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashloan {
    pub receiver: Address,
    #[serde(with = "mantissa_string")]
    pub amount: Mantissa,
    #[serde(with = "mantissa_string")]
    pub total_fee: Mantissa,
    #[serde(with = "mantissa_string")]
    pub reserves_fee: Mantissa,
}

/// `UserCollateralChanged(account, newCollateralTokens)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCollateralChanged {
    pub account: Address,
    #[serde(with = "mantissa_string")]
    pub new_collateral_tokens: Mantissa,
}

/// `NewReserveFactor(old, newReserveFactorMantissa)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReserveFactor {
    #[serde(with = "mantissa_string")]
    pub new_reserve_factor_mantissa: Mantissa,
}

/// `NewMarketInterestRateModel(old, newInterestRateModel)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMarketInterestRateModel {
    pub new_interest_rate_model: Address,
}

/// `NewImplementation(old, newImplementation)` on a pool token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMarketImplementation {
    pub new_implementation: Address,
}

/// `NewCollateralCap(token, newCap)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCollateralCap {
    #[serde(with = "mantissa_string")]
    pub new_cap: Mantissa,
}

/// `NewTokenName(oldName, newName)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTokenName {
    pub new_name: String,
}

/// `NewTokenSymbol(oldSymbol, newSymbol)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTokenSymbol {
    pub new_symbol: String,
}

/// `StakingRewardsCreated(stakingRewards, stakingToken)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingRewardsCreated {
    pub staking_rewards: Address,
    pub staking_token: Address,
}

/// `Staked(user, amount)` and `Withdrawn(user, amount)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeChange {
    pub user: Address,
    #[serde(with = "mantissa_string")]
    pub amount: Mantissa,
}

/// `RewardPaid(user, rewardsToken, reward)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPaid {
    pub user: Address,
    pub rewards_token: Address,
    #[serde(with = "mantissa_string")]
    pub reward: Mantissa,
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    #[test]
    fn test_parse_ndjson_line() {
        let line = r#"{"address":"0x0000000000000000000000000000000000000abc","blockNumber":12,
            "blockTimestamp":1600000000,
            "transactionHash":"0x00000000000000000000000000000000000000000000000000000000000000ff",
            "logIndex":3,
            "event":{"name":"Mint","params":{"minter":"0x0000000000000000000000000000000000000001",
            "mintAmount":"1000000000000000000","mintTokens":5000000000}}}"#;

        let event = LogEvent::from_json(line).unwrap();
        assert_eq!(event.meta.block_number, 12);
        assert_eq!(event.meta.log_index, 3);
        assert_eq!(event.event.name(), "Mint");
        assert_eq!(event.event.source(), SourceTemplate::CToken);

        match event.event {
            EventKind::Mint(mint) => {
                assert_eq!(mint.mint_amount, BigInt::from(1_000_000_000_000_000_000u64));
                assert_eq!(mint.mint_tokens, BigInt::from(5_000_000_000u64));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_integer_wider_than_u64() {
        let line = r#"{"address":"0x0000000000000000000000000000000000000abc","blockNumber":12,
            "blockTimestamp":1600000000,
            "transactionHash":"0x00000000000000000000000000000000000000000000000000000000000000ff",
            "logIndex":3,
            "event":{"params":{"minter":"0x0000000000000000000000000000000000000001",
            "mintAmount":100000000000000000000,"mintTokens":500000000000},"name":"Mint"}}"#;

        let event = LogEvent::from_json(line).unwrap();
        assert_eq!(event.meta.block_number, 12);
        match event.event {
            EventKind::Mint(mint) => {
                assert_eq!(mint.mint_amount, BigInt::from(10u64).pow(20));
                assert_eq!(mint.mint_tokens, BigInt::from(500_000_000_000u64));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_fractional_amount_is_rejected() {
        let line = r#"{"address":"0x0000000000000000000000000000000000000abc","blockNumber":1,
            "blockTimestamp":1600000000,
            "transactionHash":"0x00000000000000000000000000000000000000000000000000000000000000ff",
            "logIndex":0,
            "event":{"name":"Mint","params":{"minter":"0x0000000000000000000000000000000000000001",
            "mintAmount":1.5e20,"mintTokens":5}}}"#;

        assert!(LogEvent::from_json(line).is_err());
    }

    #[test]
    fn test_unknown_pause_action_is_rejected() {
        let params = r#"{"action":"Liquidate","pauseState":true}"#;
        assert!(serde_json::from_str::<ActionPaused>(params).is_err());

        let params = r#"{"action":"Seize","pauseState":true}"#;
        let paused: ActionPaused = serde_json::from_str(params).unwrap();
        assert_eq!(paused.action, PauseAction::Seize);
    }
}
