//! Credit limits granted by the comptroller
//!
//! `credit_limit` is owned by this handler; `credit_borrow` is mirrored by the
//! borrow and repay handlers through [`mirror_borrow`].

use super::Context;
use crate::decimal::normalize;
use crate::entities::{CreditKey, CreditLimit};
use crate::events::CreditLimitChanged;
use crate::repository::Seeded;
use crate::types::Address;
use crate::Result;
use bigdecimal::BigDecimal;

pub(crate) fn credit_limit_changed(ctx: &mut Context<'_>, event: &CreditLimitChanged) -> Result<()> {
    let Some(mut market) = ctx.find_market(&event.market)? else {
        tracing::debug!(market = %event.market, "Credit limit on unlisted market ignored");
        return Ok(());
    };

    let key = CreditKey {
        borrower: event.protocol,
        market: event.market,
    };
    let (mut credit, created) = ctx.repo.get_or_create::<CreditLimit>(key)?;
    if created {
        market.credit_limits.push(credit.id.clone());
        ctx.repo.save(&market)?;
        tracing::info!(borrower = %event.protocol, market = %event.market, "Credit limit opened");
    }

    credit.credit_limit = normalize(&event.credit_limit, market.underlying_decimals);
    credit.block_timestamp = ctx.meta.block_timestamp;
    ctx.repo.save(&credit)
}

/// Copy a borrower's new borrow total into their credit limit, if they have one
pub(crate) fn mirror_borrow(
    ctx: &mut Context<'_>,
    borrower: Address,
    market: Address,
    account_borrows: &BigDecimal,
) -> Result<()> {
    let id = CreditLimit::id_for(&CreditKey { borrower, market });
    if let Some(mut credit) = ctx.repo.load::<CreditLimit>(&id)? {
        credit.credit_borrow = account_borrows.clone();
        credit.block_timestamp = ctx.meta.block_timestamp;
        ctx.repo.save(&credit)?;
    }
    Ok(())
}
