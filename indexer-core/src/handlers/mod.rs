//! Event handlers
//!
//! Every handler works against a [`Context`]: the unit of work of the event
//! being processed and the contract reader. Handlers stage writes and
//! newly discovered sources only; the caller commits the writes, then
//! registers the sources.
//!
//! # Preconditions
//!
//! Handlers do not re-derive state that upstream emission order guarantees:
//!
//! - `AccrueInterest` precedes any same-block flow event of its market, so
//!   flow handlers apply deltas on top of the accrued `cash`/`total_borrows`
//! - `Mint`/`Redeem` are paired with a `Transfer` from/to the market address;
//!   balances only move in the transfer handler
//! - a market's own events are only delivered after `MarketListed`

pub(crate) mod comptroller;
pub(crate) mod credit_limit;
pub(crate) mod ctoken;
pub(crate) mod staking;

use crate::chain::ContractReader;
use crate::entities::{
    position_id, Account, AccountCToken, AccountCTokenTransaction, Market, PositionSeed,
};
use crate::events::EventKind;
use crate::repository::Repository;
use crate::sources::SourceTemplate;
use crate::storage::EntityStore;
use crate::types::{Address, EventMeta};
use crate::{Error, Result};

/// Everything a handler may touch while processing one event
pub(crate) struct Context<'a> {
    /// Unit of work of the event
    pub repo: Repository<'a, dyn EntityStore + 'a>,
    /// Contract state reads
    pub reader: &'a dyn ContractReader,
    /// Sources discovered by the event, registered after commit
    pub discovered: Vec<(SourceTemplate, Address)>,
    /// Position and emitter of the event
    pub meta: &'a EventMeta,
}

/// Side effects the caller reports on
#[derive(Debug, Default)]
pub(crate) struct Applied {
    /// Market count after a comptroller event
    pub total_markets: Option<u32>,
    /// Contracts to start tracking once the event is committed
    pub discovered: Vec<(SourceTemplate, Address)>,
}

/// Route an event to its handler
pub(crate) fn apply(ctx: &mut Context<'_>, event: &EventKind) -> Result<Applied> {
    let total_markets = match event.source() {
        SourceTemplate::Comptroller => {
            let mut aggregate = comptroller::load_or_seed(ctx)?;
            comptroller::handle(ctx, &mut aggregate, event)?;
            ctx.repo.save(&aggregate)?;
            Some(aggregate.total_markets)
        }
        SourceTemplate::CToken => {
            ctoken::handle(ctx, event)?;
            None
        }
        SourceTemplate::StakingRewardsFactory | SourceTemplate::StakingRewards => {
            staking::handle(ctx, event)?;
            None
        }
    };

    Ok(Applied {
        total_markets,
        discovered: std::mem::take(&mut ctx.discovered),
    })
}

impl Context<'_> {
    /// Start tracking `address` once this event commits
    pub fn discover(&mut self, template: SourceTemplate, address: Address) {
        self.discovered.push((template, address));
    }

    /// Market keyed by address, if listed
    pub fn find_market(&self, address: &Address) -> Result<Option<Market>> {
        self.repo.load(&address.to_hex())
    }

    /// Market that emitted the current event
    pub fn emitting_market(&self) -> Result<Market> {
        let address = self.meta.address;
        self.find_market(&address)?
            .ok_or_else(|| Error::MarketNotFound(address.to_hex()))
    }

    /// Stage the account record if it is new
    pub fn ensure_account(&mut self, address: Address) -> Result<()> {
        let (account, created) = self.repo.get_or_create::<Account>(address)?;
        if created {
            tracing::debug!(account = %address, "New account");
            self.repo.save(&account)?;
        }
        Ok(())
    }

    /// Position of `account` in `market`, touched by the current event
    ///
    /// Creates the account and position when missing, records the activity
    /// marker and stamps the block time. The caller saves the position.
    pub fn touch_position(&mut self, market: &Market, account: Address) -> Result<AccountCToken> {
        self.ensure_account(account)?;

        let market_address: Address = market.id.parse()?;
        let mut position = self.position_or_default(market, market_address, account)?;

        let marker = AccountCTokenTransaction::new(&position.id, self.meta);
        if !self.repo.exists::<AccountCTokenTransaction>(&marker.id)? {
            self.repo.save(&marker)?;
        }

        position.block_time = self.meta.block_timestamp;
        Ok(position)
    }

    /// Position of `account` in `market` without recording activity
    pub fn position_or_default(
        &self,
        market: &Market,
        market_address: Address,
        account: Address,
    ) -> Result<AccountCToken> {
        let (position, _) = self.repo.get_or_create::<AccountCToken>(PositionSeed {
            market: market_address,
            account,
            symbol: market.symbol.clone(),
        })?;
        Ok(position)
    }

    /// Existing position, if any
    pub fn find_position(&self, market: &Address, account: &Address) -> Result<Option<AccountCToken>> {
        self.repo.load(&position_id(market, account))
    }
}
