//! Market lifecycle: comptroller configuration, listing, membership
//!
//! Every handler here receives the comptroller aggregate by `&mut`; the
//! dispatcher loads (or seeds) it before and saves it after.
//!
//! Market-keyed events naming a market that was never listed are ignored:
//! the comptroller may reference a market before its listing is indexed.

use super::{credit_limit, Context};
use crate::chain::ContractReader;
use crate::decimal::{normalize, Decimals};
use crate::entities::{Comptroller, ComptrollerSeed, Market};
use crate::events::{
    ActionPaused, EventKind, MarketActionPaused, MarketMembership, NewBorrowCap,
    NewCollateralFactor, NewSupplyCap, PauseAction,
};
use crate::repository::Seeded;
use crate::sources::SourceTemplate;
use crate::types::Address;
use crate::Result;

/// Stored aggregate, or a fresh one seeded from the contract
pub(crate) fn load_or_seed(ctx: &Context<'_>) -> Result<Comptroller> {
    let address = ctx.meta.address;
    if let Some(existing) = ctx.repo.load::<Comptroller>(&address.to_hex())? {
        return Ok(existing);
    }

    let seed = ComptrollerSeed {
        address,
        admin: ctx.reader.admin(address).ok(),
        implementation: ctx.reader.comptroller_implementation(address).ok(),
    };
    tracing::info!(comptroller = %address, admin = ?seed.admin, "Creating comptroller");
    Ok(Comptroller::with_defaults(seed))
}

pub(crate) fn handle(ctx: &mut Context<'_>, comptroller: &mut Comptroller, event: &EventKind) -> Result<()> {
    match event {
        EventKind::NewAdmin(p) => comptroller.admin = Some(p.new_admin),
        EventKind::NewComptrollerImplementation(p) => {
            comptroller.implementation = Some(p.new_implementation)
        }
        EventKind::NewCloseFactor(p) => {
            comptroller.close_factor = normalize(&p.new_close_factor_mantissa, Decimals::MANTISSA)
        }
        EventKind::NewLiquidationIncentive(p) => {
            comptroller.liquidation_incentive =
                normalize(&p.new_liquidation_incentive_mantissa, Decimals::MANTISSA)
        }
        EventKind::NewPriceOracle(p) => comptroller.price_oracle = Some(p.new_price_oracle),
        EventKind::NewPauseGuardian(p) => comptroller.pause_guardian = Some(p.new_pause_guardian),
        EventKind::NewLiquidityMining(p) => {
            comptroller.liquidity_mining = Some(p.new_liquidity_mining)
        }
        EventKind::ActionPaused(p) => global_action_paused(comptroller, p),
        EventKind::MarketActionPaused(p) => market_action_paused(ctx, p)?,
        EventKind::MarketListed(p) => market_listed(ctx, comptroller, p.c_token)?,
        EventKind::MarketDelisted(p) => market_delisted(ctx, comptroller, p.c_token)?,
        EventKind::MarketEntered(p) => set_membership(ctx, p, true)?,
        EventKind::MarketExited(p) => set_membership(ctx, p, false)?,
        EventKind::NewCollateralFactor(p) => new_collateral_factor(ctx, p)?,
        EventKind::NewBorrowCap(p) => new_borrow_cap(ctx, p)?,
        EventKind::NewSupplyCap(p) => new_supply_cap(ctx, p)?,
        EventKind::CreditLimitChanged(p) => credit_limit::credit_limit_changed(ctx, p)?,
        other => {
            tracing::warn!(event = other.name(), "Not a comptroller event");
        }
    }
    Ok(())
}

fn global_action_paused(comptroller: &mut Comptroller, event: &ActionPaused) {
    match event.action {
        PauseAction::Transfer => comptroller.transfer_guardian_paused = event.pause_state,
        PauseAction::Seize => comptroller.seize_guardian_paused = event.pause_state,
        PauseAction::Mint | PauseAction::Borrow | PauseAction::Flashloan => {
            tracing::debug!(action = ?event.action, "Per-market action paused globally, ignored");
        }
    }
}

fn market_action_paused(ctx: &mut Context<'_>, event: &MarketActionPaused) -> Result<()> {
    let Some(mut market) = ctx.find_market(&event.c_token)? else {
        tracing::debug!(market = %event.c_token, "Pause on unlisted market ignored");
        return Ok(());
    };

    match event.action {
        PauseAction::Mint => market.supply_paused = event.pause_state,
        PauseAction::Borrow => market.borrow_paused = event.pause_state,
        PauseAction::Flashloan => market.flashloan_paused = event.pause_state,
        PauseAction::Transfer | PauseAction::Seize => {
            tracing::debug!(
                market = %event.c_token,
                action = ?event.action,
                "Global action paused per market, ignored"
            );
            return Ok(());
        }
    }

    ctx.repo.save(&market)
}

fn market_listed(ctx: &mut Context<'_>, comptroller: &mut Comptroller, c_token: Address) -> Result<()> {
    if ctx.find_market(&c_token)?.is_some() {
        tracing::warn!(market = %c_token, "Market listed twice, keeping existing");
        return Ok(());
    }

    let market = read_market(ctx.reader, c_token);
    ctx.discover(SourceTemplate::CToken, c_token);
    comptroller.total_markets += 1;

    tracing::info!(
        market = %c_token,
        symbol = %market.symbol,
        underlying = %market.underlying_symbol,
        total_markets = comptroller.total_markets,
        "Market listed"
    );

    ctx.repo.save(&market)
}

/// Market seeded from the pool token and its underlying
///
/// Failed reads fall back to empty strings, absent addresses and the default
/// decimal counts. When the underlying's `decimals()` fails the asset is
/// assumed not deployed yet: 18 decimals and empty metadata, backfilled on
/// the first interest accrual.
pub(crate) fn read_market(reader: &dyn ContractReader, c_token: Address) -> Market {
    let mut market = Market::new(c_token);
    market.symbol = reader.symbol(c_token).unwrap_or_default();
    market.name = reader.name(c_token).unwrap_or_default();
    market.decimals = reader.decimals(c_token).unwrap_or(Decimals::CTOKEN);
    market.underlying_address = reader.underlying(c_token).ok();
    market.implementation = reader.implementation(c_token).ok();
    market.interest_rate_model = reader.interest_rate_model(c_token).ok();

    if let Some(underlying) = market.underlying_address {
        match reader.decimals(underlying) {
            Ok(decimals) => {
                market.underlying_decimals = decimals;
                market.underlying_symbol = reader.symbol(underlying).unwrap_or_default();
                market.underlying_name = reader.name(underlying).unwrap_or_default();
            }
            Err(err) => {
                tracing::debug!(market = %c_token, %underlying, %err, "Underlying not readable yet");
            }
        }
    }

    market
}

fn market_delisted(ctx: &mut Context<'_>, comptroller: &mut Comptroller, c_token: Address) -> Result<()> {
    let Some(mut market) = ctx.find_market(&c_token)? else {
        tracing::debug!(market = %c_token, "Delisting unlisted market ignored");
        return Ok(());
    };
    if market.delisted {
        return Ok(());
    }

    market.delisted = true;
    comptroller.total_markets = comptroller.total_markets.saturating_sub(1);
    tracing::info!(market = %c_token, total_markets = comptroller.total_markets, "Market delisted");

    ctx.repo.save(&market)
}

fn set_membership(ctx: &mut Context<'_>, event: &MarketMembership, entered: bool) -> Result<()> {
    let Some(market) = ctx.find_market(&event.c_token)? else {
        tracing::debug!(market = %event.c_token, "Membership change on unlisted market ignored");
        return Ok(());
    };

    let mut position = ctx.touch_position(&market, event.account)?;
    position.entered_market = entered;
    ctx.repo.save(&position)
}

fn new_collateral_factor(ctx: &mut Context<'_>, event: &NewCollateralFactor) -> Result<()> {
    let Some(mut market) = ctx.find_market(&event.c_token)? else {
        tracing::debug!(market = %event.c_token, "Collateral factor on unlisted market ignored");
        return Ok(());
    };

    market.collateral_factor = normalize(&event.new_collateral_factor_mantissa, Decimals::MANTISSA);
    ctx.repo.save(&market)
}

fn new_borrow_cap(ctx: &mut Context<'_>, event: &NewBorrowCap) -> Result<()> {
    let Some(mut market) = ctx.find_market(&event.c_token)? else {
        tracing::debug!(market = %event.c_token, "Borrow cap on unlisted market ignored");
        return Ok(());
    };

    market.borrow_cap = normalize(&event.new_borrow_cap, market.underlying_decimals);
    ctx.repo.save(&market)
}

fn new_supply_cap(ctx: &mut Context<'_>, event: &NewSupplyCap) -> Result<()> {
    let Some(mut market) = ctx.find_market(&event.c_token)? else {
        tracing::debug!(market = %event.c_token, "Supply cap on unlisted market ignored");
        return Ok(());
    };

    market.supply_cap = normalize(&event.new_supply_cap, market.underlying_decimals);
    ctx.repo.save(&market)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ContractFixture, StaticContractReader};

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[test]
    fn test_read_market_full_metadata() {
        let reader = StaticContractReader::new()
            .with(
                addr(1),
                ContractFixture {
                    symbol: Some("cUSDC".to_string()),
                    name: Some("Cream USDC".to_string()),
                    decimals: Some(Decimals::new(8)),
                    underlying: Some(addr(2)),
                    implementation: Some(addr(3)),
                    interest_rate_model: Some(addr(4)),
                    ..ContractFixture::default()
                },
            )
            .with_token(addr(2), "USDC", "USD Coin", 6);

        let market = read_market(&reader, addr(1));
        assert_eq!(market.symbol, "cUSDC");
        assert_eq!(market.underlying_symbol, "USDC");
        assert_eq!(market.underlying_decimals, Decimals::new(6));
        assert_eq!(market.implementation, Some(addr(3)));
        assert_eq!(market.interest_rate_model, Some(addr(4)));
        assert!(!market.needs_underlying_backfill());
    }

    #[test]
    fn test_read_market_underlying_not_deployed() {
        let reader = StaticContractReader::new().with(
            addr(1),
            ContractFixture {
                symbol: Some("cNEW".to_string()),
                underlying: Some(addr(2)),
                ..ContractFixture::default()
            },
        );

        let market = read_market(&reader, addr(1));
        assert_eq!(market.underlying_decimals, Decimals::DEFAULT_UNDERLYING);
        assert_eq!(market.underlying_symbol, "");
        assert_eq!(market.underlying_name, "");
        assert_eq!(market.decimals, Decimals::CTOKEN);
        assert!(market.implementation.is_none());
        assert!(market.needs_underlying_backfill());
    }
}
