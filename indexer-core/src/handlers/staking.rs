//! Staking rewards: pools deployed by the factory, stakes and claims
//!
//! Staked amounts are pool tokens when the staking token is a listed market;
//! the `*_underlying` totals are re-valued at that market's exchange rate on
//! every stake and withdrawal, and stay zero for other staking tokens.

use super::Context;
use crate::decimal::{normalize, truncate, Decimals};
use crate::entities::{
    Market, RewardKey, StakerKey, StakingRewards, StakingRewardsFactory, StakingRewardsUser,
    StakingRewardsUserReward,
};
use crate::events::{EventKind, RewardPaid, StakeChange, StakingRewardsCreated};
use crate::sources::SourceTemplate;
use crate::Result;
use bigdecimal::BigDecimal;
use num_traits::Zero;

pub(crate) fn handle(ctx: &mut Context<'_>, event: &EventKind) -> Result<()> {
    match event {
        EventKind::StakingRewardsCreated(p) => staking_rewards_created(ctx, p),
        EventKind::Staked(p) => stake(ctx, p, Direction::Stake),
        EventKind::Withdrawn(p) => stake(ctx, p, Direction::Withdraw),
        EventKind::RewardPaid(p) => reward_paid(ctx, p),
        other => {
            tracing::warn!(event = other.name(), "Not a staking event");
            Ok(())
        }
    }
}

fn staking_rewards_created(ctx: &mut Context<'_>, event: &StakingRewardsCreated) -> Result<()> {
    let (mut factory, _) = ctx
        .repo
        .get_or_create::<StakingRewardsFactory>(ctx.meta.address)?;

    let pool_id = event.staking_rewards.to_hex();
    if ctx.repo.exists::<StakingRewards>(&pool_id)? {
        tracing::warn!(pool = %pool_id, "Staking pool created twice, keeping existing");
        return Ok(());
    }

    let market = ctx.find_market(&event.staking_token)?.map(|market| market.id);
    ctx.discover(SourceTemplate::StakingRewards, event.staking_rewards);

    let pool = StakingRewards::new(event.staking_rewards, &factory.id, event.staking_token, market);
    factory.pools.push(pool.id.clone());

    tracing::info!(
        pool = %pool.id,
        staking_token = %event.staking_token,
        market = ?pool.market,
        "Staking pool created"
    );

    ctx.repo.save(&pool)?;
    ctx.repo.save(&factory)
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Stake,
    Withdraw,
}

/// Pool the current event was emitted by; its creation is always indexed first
fn emitting_pool(ctx: &Context<'_>) -> Result<StakingRewards> {
    ctx.repo.require(&ctx.meta.address.to_hex())
}

fn stake(ctx: &mut Context<'_>, event: &StakeChange, direction: Direction) -> Result<()> {
    let mut pool = emitting_pool(ctx)?;
    let market: Option<Market> = match &pool.market {
        Some(id) => ctx.repo.load(id)?,
        None => None,
    };

    let decimals = market.as_ref().map_or(Decimals::CTOKEN, |m| m.decimals);
    let amount = normalize(&event.amount, decimals);

    let (mut staker, _) = ctx.repo.get_or_create::<StakingRewardsUser>(StakerKey {
        pool: ctx.meta.address,
        user: event.user,
    })?;

    match direction {
        Direction::Stake => {
            pool.total_staked = &pool.total_staked + &amount;
            staker.staked_balance = &staker.staked_balance + &amount;
        }
        Direction::Withdraw => {
            pool.total_staked = &pool.total_staked - &amount;
            staker.staked_balance = &staker.staked_balance - &amount;
        }
    }

    pool.total_staked_underlying = underlying_value(market.as_ref(), &pool.total_staked);
    staker.staked_balance_underlying = underlying_value(market.as_ref(), &staker.staked_balance);

    tracing::debug!(
        pool = %pool.id,
        user = %event.user,
        ?direction,
        amount = %amount,
        "Stake changed"
    );

    ctx.repo.save(&pool)?;
    ctx.repo.save(&staker)
}

fn underlying_value(market: Option<&Market>, staked: &BigDecimal) -> BigDecimal {
    match market {
        Some(market) => truncate(&(&market.exchange_rate * staked), market.underlying_decimals),
        None => BigDecimal::zero(),
    }
}

/// Adds a claim to the staker's running total for the reward token
///
/// The token's decimals are read at claim time; a failed read falls back to
/// 18 decimals.
fn reward_paid(ctx: &mut Context<'_>, event: &RewardPaid) -> Result<()> {
    let pool = emitting_pool(ctx)?;
    let staker = StakerKey {
        pool: ctx.meta.address,
        user: event.user,
    };

    let decimals = match ctx.reader.decimals(event.rewards_token) {
        Ok(decimals) => decimals,
        Err(err) => {
            tracing::warn!(
                pool = %pool.id,
                token = %event.rewards_token,
                %err,
                "Reward token decimals unavailable, assuming 18"
            );
            Decimals::DEFAULT_UNDERLYING
        }
    };

    let (mut reward, _) = ctx
        .repo
        .get_or_create::<StakingRewardsUserReward>(RewardKey {
            staker,
            token: event.rewards_token,
        })?;
    reward.total_rewards_claimed =
        &reward.total_rewards_claimed + &normalize(&event.reward, decimals);

    ctx.repo.save(&reward)
}
