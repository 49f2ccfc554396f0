//! Token-flow handlers for events emitted by pool tokens
//!
//! Amounts in pool tokens are normalized with the market's `decimals`,
//! amounts in the underlying with `underlying_decimals`, and derived ratios
//! are truncated to 18 digits.
//!
//! Every handler except [`accrue_interest`] requires the emitting market to
//! be listed and fails with `MarketNotFound` otherwise.

use super::{credit_limit, Context};
use crate::chain::ContractReader;
use crate::decimal::{normalize, truncate, Decimals};
use crate::entities::{
    BorrowEvent, FlashloanEvent, LiquidationEvent, Market, MintEvent, RedeemEvent, RepayEvent,
    TransferEvent,
};
use crate::events::{
    AccrueInterest, Borrow, EventKind, Flashloan, LiquidateBorrow, Mint, Redeem, RepayBorrow,
    Transfer, UserCollateralChanged,
};
use crate::Result;
use bigdecimal::BigDecimal;
use num_traits::Zero;

pub(crate) fn handle(ctx: &mut Context<'_>, event: &EventKind) -> Result<()> {
    match event {
        EventKind::AccrueInterest(p) => accrue_interest(ctx, p),
        EventKind::Mint(p) => mint(ctx, p),
        EventKind::Redeem(p) => redeem(ctx, p),
        EventKind::Borrow(p) => borrow(ctx, p),
        EventKind::RepayBorrow(p) => repay_borrow(ctx, p),
        EventKind::LiquidateBorrow(p) => liquidate_borrow(ctx, p),
        EventKind::Transfer(p) => transfer(ctx, p),
        EventKind::Flashloan(p) => flashloan(ctx, p),
        EventKind::UserCollateralChanged(p) => user_collateral_changed(ctx, p),
        EventKind::NewReserveFactor(p) => update_market(ctx, |market| {
            market.reserve_factor = normalize(&p.new_reserve_factor_mantissa, Decimals::MANTISSA);
        }),
        EventKind::NewMarketInterestRateModel(p) => update_market(ctx, |market| {
            market.interest_rate_model = Some(p.new_interest_rate_model);
        }),
        EventKind::NewMarketImplementation(p) => update_market(ctx, |market| {
            market.implementation = Some(p.new_implementation);
        }),
        EventKind::NewCollateralCap(p) => update_market(ctx, |market| {
            market.collateral_cap = normalize(&p.new_cap, market.decimals);
        }),
        EventKind::NewTokenName(p) => update_market(ctx, |market| {
            market.name = p.new_name.clone();
        }),
        EventKind::NewTokenSymbol(p) => update_market(ctx, |market| {
            market.symbol = p.new_symbol.clone();
        }),
        other => {
            tracing::warn!(event = other.name(), "Not a pool token event");
            Ok(())
        }
    }
}

/// Underlying per pool token, truncated to 18 digits
fn exchange_rate(underlying: &BigDecimal, ctokens: &BigDecimal) -> BigDecimal {
    truncate(&(underlying / ctokens), Decimals::MANTISSA)
}

/// Overwrite `cash` and `total_borrows` with the accrued absolute values
///
/// Backfills the underlying metadata first when listing could not read it,
/// so the new values are normalized with the real decimals.
fn accrue_interest(ctx: &mut Context<'_>, event: &AccrueInterest) -> Result<()> {
    let address = ctx.meta.address;
    let Some(mut market) = ctx.find_market(&address)? else {
        tracing::debug!(market = %address, "Interest accrued on unlisted market ignored");
        return Ok(());
    };

    if market.needs_underlying_backfill() {
        backfill_underlying(ctx.reader, &mut market);
    }

    market.block_timestamp = ctx.meta.block_timestamp;
    market.cash = normalize(&event.cash_prior, market.underlying_decimals);
    market.total_borrows = normalize(&event.total_borrows, market.underlying_decimals);

    ctx.repo.save(&market)
}

fn backfill_underlying(reader: &dyn ContractReader, market: &mut Market) {
    let Some(underlying) = market.underlying_address else {
        return;
    };

    match reader.decimals(underlying) {
        Ok(decimals) => {
            market.underlying_decimals = decimals;
            market.underlying_symbol = reader.symbol(underlying).unwrap_or_default();
            market.underlying_name = reader.name(underlying).unwrap_or_default();
            tracing::info!(
                market = %market.id,
                symbol = %market.underlying_symbol,
                decimals = %decimals,
                "Backfilled underlying metadata"
            );
        }
        Err(err) => {
            tracing::debug!(market = %market.id, %err, "Underlying still not readable");
        }
    }
}

/// Supply: grows `total_supply` and `cash`
///
/// Requires: `AccrueInterest` of this block already applied. The minter's
/// balance moves in the companion `Transfer` from the market address.
fn mint(ctx: &mut Context<'_>, event: &Mint) -> Result<()> {
    let mut market = ctx.emitting_market()?;
    let ctoken_amount = normalize(&event.mint_tokens, market.decimals);
    let underlying_amount = normalize(&event.mint_amount, market.underlying_decimals);

    if ctoken_amount > BigDecimal::zero() {
        market.exchange_rate = exchange_rate(&underlying_amount, &ctoken_amount);
        market.total_supply = &market.total_supply + &ctoken_amount;
        market.cash = &market.cash + &underlying_amount;
        ctx.repo.save(&market)?;
    }

    let meta = ctx.meta;
    ctx.repo.save(&MintEvent {
        id: meta.record_id(),
        market: market.id.clone(),
        minter: event.minter,
        ctoken_amount,
        underlying_amount,
        symbol: market.symbol.clone(),
        block_number: meta.block_number,
        block_time: meta.block_timestamp,
    })
}

/// Redemption: shrinks `total_supply` and `cash`
///
/// Requires: `AccrueInterest` of this block already applied. The redeemer's
/// balance moves in the companion `Transfer` to the market address.
fn redeem(ctx: &mut Context<'_>, event: &Redeem) -> Result<()> {
    let mut market = ctx.emitting_market()?;
    let ctoken_amount = normalize(&event.redeem_tokens, market.decimals);
    let underlying_amount = normalize(&event.redeem_amount, market.underlying_decimals);

    if ctoken_amount > BigDecimal::zero() {
        market.exchange_rate = exchange_rate(&underlying_amount, &ctoken_amount);
        market.total_supply = &market.total_supply - &ctoken_amount;
        market.cash = &market.cash - &underlying_amount;
        ctx.repo.save(&market)?;
    }

    let meta = ctx.meta;
    ctx.repo.save(&RedeemEvent {
        id: meta.record_id(),
        market: market.id.clone(),
        redeemer: event.redeemer,
        ctoken_amount,
        underlying_amount,
        symbol: market.symbol.clone(),
        block_number: meta.block_number,
        block_time: meta.block_timestamp,
    })
}

/// Borrow: `cash` shrinks, `total_borrows` and the borrower's stored balance
/// are overwritten with the event's absolute values
fn borrow(ctx: &mut Context<'_>, event: &Borrow) -> Result<()> {
    let mut market = ctx.emitting_market()?;
    let decimals = market.underlying_decimals;
    let amount = normalize(&event.borrow_amount, decimals);
    let account_borrows = normalize(&event.account_borrows, decimals);

    market.total_borrows = normalize(&event.total_borrows, decimals);
    market.cash = &market.cash - &amount;
    ctx.repo.save(&market)?;

    let mut position = ctx.touch_position(&market, event.borrower)?;
    position.stored_borrow_balance = account_borrows.clone();
    ctx.repo.save(&position)?;

    let meta = ctx.meta;
    ctx.repo.save(&BorrowEvent {
        id: meta.record_id(),
        market: market.id.clone(),
        borrower: event.borrower,
        amount,
        account_borrows: account_borrows.clone(),
        underlying_symbol: market.underlying_symbol.clone(),
        block_number: meta.block_number,
        block_time: meta.block_timestamp,
    })?;

    credit_limit::mirror_borrow(ctx, event.borrower, meta.address, &account_borrows)
}

/// Repayment: mirror of [`borrow`] with `cash` growing
///
/// The stored balance follows the event even after a full repayment.
fn repay_borrow(ctx: &mut Context<'_>, event: &RepayBorrow) -> Result<()> {
    let mut market = ctx.emitting_market()?;
    let decimals = market.underlying_decimals;
    let amount = normalize(&event.repay_amount, decimals);
    let account_borrows = normalize(&event.account_borrows, decimals);

    market.total_borrows = normalize(&event.total_borrows, decimals);
    market.cash = &market.cash + &amount;
    ctx.repo.save(&market)?;

    let mut position = ctx.touch_position(&market, event.borrower)?;
    position.stored_borrow_balance = account_borrows.clone();
    ctx.repo.save(&position)?;

    let meta = ctx.meta;
    ctx.repo.save(&RepayEvent {
        id: meta.record_id(),
        market: market.id.clone(),
        payer: event.payer,
        borrower: event.borrower,
        amount,
        account_borrows: account_borrows.clone(),
        underlying_symbol: market.underlying_symbol.clone(),
        block_number: meta.block_number,
        block_time: meta.block_timestamp,
    })?;

    credit_limit::mirror_borrow(ctx, event.borrower, meta.address, &account_borrows)
}

/// Audit snapshot of a liquidation; the seize moves through `Transfer`
///
/// A collateral market that is not listed makes the event a no-op.
fn liquidate_borrow(ctx: &mut Context<'_>, event: &LiquidateBorrow) -> Result<()> {
    let market = ctx.emitting_market()?;
    let Some(collateral) = ctx.find_market(&event.c_token_collateral)? else {
        tracing::debug!(
            market = %market.id,
            collateral = %event.c_token_collateral,
            "Liquidation against unlisted collateral market ignored"
        );
        return Ok(());
    };

    let seized_ctokens = normalize(&event.seize_tokens, collateral.decimals);
    let seized_underlying = truncate(
        &(&collateral.exchange_rate * &seized_ctokens),
        collateral.underlying_decimals,
    );
    let repay_amount = normalize(&event.repay_amount, market.underlying_decimals);

    let remaining_collateral = match ctx.find_position(&event.c_token_collateral, &event.borrower)? {
        Some(position) => truncate(
            &(&collateral.exchange_rate * &position.ctoken_balance),
            collateral.underlying_decimals,
        ),
        None => BigDecimal::zero(),
    };
    let remaining_borrow = ctx
        .find_position(&ctx.meta.address, &event.borrower)?
        .map(|position| position.stored_borrow_balance)
        .unwrap_or_else(BigDecimal::zero);

    let meta = ctx.meta;
    ctx.repo.save(&LiquidationEvent {
        id: meta.record_id(),
        market: market.id.clone(),
        collateral_market: collateral.id.clone(),
        liquidator: event.liquidator,
        borrower: event.borrower,
        seized_ctokens,
        seized_underlying,
        repay_amount,
        remaining_collateral,
        remaining_borrow,
        collateral_symbol: collateral.symbol.clone(),
        underlying_repay_symbol: market.underlying_symbol.clone(),
        block_number: meta.block_number,
        block_time: meta.block_timestamp,
    })
}

/// The only handler that moves pool-token balances
///
/// A leg whose address is the market itself is the mint or redeem side of
/// the transfer and is skipped, so supply changes are never counted twice.
/// Tokens sent directly to the market address are dropped by the same rule.
/// Balances are not clamped at zero.
fn transfer(ctx: &mut Context<'_>, event: &Transfer) -> Result<()> {
    let market = ctx.emitting_market()?;
    let market_address = ctx.meta.address;
    let amount = normalize(&event.amount, market.decimals);

    if event.from != market_address {
        let mut sender = ctx.touch_position(&market, event.from)?;
        sender.ctoken_balance = &sender.ctoken_balance - &amount;
        ctx.repo.save(&sender)?;
    }

    if event.to != market_address {
        let mut recipient = ctx.touch_position(&market, event.to)?;
        recipient.ctoken_balance = &recipient.ctoken_balance + &amount;
        ctx.repo.save(&recipient)?;
    }

    let underlying_amount = truncate(&(&market.exchange_rate * &amount), market.underlying_decimals);

    let meta = ctx.meta;
    ctx.repo.save(&TransferEvent {
        id: meta.record_id(),
        market: market.id.clone(),
        from: event.from,
        to: event.to,
        amount,
        underlying_amount,
        symbol: market.symbol.clone(),
        block_number: meta.block_number,
        block_time: meta.block_timestamp,
    })
}

fn flashloan(ctx: &mut Context<'_>, event: &Flashloan) -> Result<()> {
    let market = ctx.emitting_market()?;
    let decimals = market.underlying_decimals;

    let meta = ctx.meta;
    ctx.repo.save(&FlashloanEvent {
        id: meta.record_id(),
        market: market.id.clone(),
        receiver: event.receiver,
        amount: normalize(&event.amount, decimals),
        total_fee: normalize(&event.total_fee, decimals),
        reserves_fee: normalize(&event.reserves_fee, decimals),
        underlying_symbol: market.underlying_symbol.clone(),
        block_number: meta.block_number,
        block_time: meta.block_timestamp,
    })
}

/// New absolute collateral balance; the market aggregate takes the delta
fn user_collateral_changed(ctx: &mut Context<'_>, event: &UserCollateralChanged) -> Result<()> {
    let mut market = ctx.emitting_market()?;
    let market_address = ctx.meta.address;

    ctx.ensure_account(event.account)?;
    let mut position = ctx.position_or_default(&market, market_address, event.account)?;

    let new_balance = normalize(&event.new_collateral_tokens, market.decimals);
    let delta = &new_balance - &position.ctoken_collateral_balance;

    position.ctoken_collateral_balance = new_balance;
    ctx.repo.save(&position)?;

    market.total_collateral_tokens = &market.total_collateral_tokens + &delta;
    ctx.repo.save(&market)
}

fn update_market(ctx: &mut Context<'_>, apply: impl FnOnce(&mut Market)) -> Result<()> {
    let mut market = ctx.emitting_market()?;
    apply(&mut market);
    ctx.repo.save(&market)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_exchange_rate_truncates() {
        let underlying = BigDecimal::from(1);
        let ctokens = BigDecimal::from(3);
        assert_eq!(
            exchange_rate(&underlying, &ctokens),
            BigDecimal::from_str("0.333333333333333333").unwrap()
        );
    }

    #[test]
    fn test_exchange_rate_exact() {
        let underlying = BigDecimal::from_str("1.5").unwrap();
        let ctokens = BigDecimal::from(75);
        assert_eq!(
            exchange_rate(&underlying, &ctokens),
            BigDecimal::from_str("0.02").unwrap()
        );
    }
}
