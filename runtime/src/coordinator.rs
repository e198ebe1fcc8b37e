//! Idempotency coordinator: collapses retried or concurrent creations that
//! share a `(table_id, key)` into exactly one committed order.
//!
//! # Protocol
//!
//! 1. No key: run `create` directly.
//! 2. Place `Pending { claim_id }` with `set_if_absent` and a fixed TTL.
//!    - Won: run `create`; on success upgrade the marker to
//!      `Committed { order_id }` (TTL kept), on failure release the marker and
//!      propagate the error unchanged.
//!    - Lost: read the marker. `Committed` resolves by looking the order up in
//!      the ledger. `Pending` is polled with bounded backoff; if it vanishes or
//!      outlives the poll budget the claim is attempted again.
//! 3. A key reused after the TTL is a new key.
//!
//! Claim rounds are bounded, so a wedged marker costs at most one TTL window.
//!
//! # Cancellation
//!
//! Dropping the future returned by [`IdempotencyCoordinator::claim_or_join`]
//! (for example under a caller-imposed request timeout) leaves any marker it
//! placed untouched. Other waiters may still see it resolve, and the cache
//! evicts it at the end of its TTL otherwise.

use crate::backoff::BackoffPolicy;
use crate::metrics::{IDEMPOTENCY_CLAIMS, IDEMPOTENCY_COMMIT_UPGRADE_FAILED, IDEMPOTENCY_JOINS};
use std::future::Future;
use std::time::Duration;
use table_orders_core::idempotency::{ClaimId, IDEMPOTENCY_TTL};
use table_orders_core::{
    ClaimState, CoordinationCache, IdempotencyKey, LedgerError, Order, OrderId, Result, TableId,
};
use tracing::{debug, error, info, warn};

/// Outcome of one `set_if_absent` attempt.
///
/// `Conflict` is the internal claim-conflict signal: it is always resolved
/// by joining or re-claiming and never reaches callers.
enum Claim {
    Won { pending: String },
    Conflict,
}

/// Outcome of waiting on somebody else's marker.
enum Joined {
    Resolved(Order),
    Vacant,
    StillPending,
}

/// Coordinates idempotency claims through a [`CoordinationCache`].
///
/// # Example
///
/// ```ignore
/// let coordinator = IdempotencyCoordinator::new(cache);
/// let order = coordinator
///     .claim_or_join(
///         table_id,
///         Some(&key),
///         || ledger.insert(new_order),
///         |order_id| ledger.get(table_id, order_id),
///     )
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct IdempotencyCoordinator<C> {
    cache: C,
    ttl: Duration,
    poll: BackoffPolicy,
}

impl<C: CoordinationCache> IdempotencyCoordinator<C> {
    /// Coordinator with the 10 minute validity window and default polling.
    #[must_use]
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            ttl: IDEMPOTENCY_TTL,
            poll: BackoffPolicy::default(),
        }
    }

    /// Coordinator with an explicit window and poll policy.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] unless the poll budget is
    /// strictly shorter than the TTL and every join actually waits: the
    /// budget, the initial delay and the delay cap must all be non-zero.
    pub fn with_policy(cache: C, ttl: Duration, poll: BackoffPolicy) -> Result<Self> {
        // The round limit assumes each join sleeps for the whole budget.
        if poll.budget.is_zero() || poll.initial_delay.is_zero() || poll.max_delay.is_zero() {
            return Err(LedgerError::invalid(format!(
                "poll budget {:?}, initial delay {:?} and max delay {:?} must all be non-zero",
                poll.budget, poll.initial_delay, poll.max_delay
            )));
        }
        if poll.budget >= ttl {
            return Err(LedgerError::invalid(format!(
                "poll budget {:?} must be shorter than the claim TTL {ttl:?}",
                poll.budget
            )));
        }
        Ok(Self { cache, ttl, poll })
    }

    /// The underlying cache.
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Validity window of a claim.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Run `create` at most once per `(table_id, key)` within the TTL window.
    ///
    /// `lookup` fetches the order a committed marker points to, so joiners see
    /// its current state (a cancelled order comes back cancelled).
    ///
    /// # Errors
    ///
    /// - `CacheUnavailable`: the cache failed, or the claim did not resolve
    ///   within the bounded number of rounds
    /// - `Internal`: a marker in the cache could not be decoded
    /// - any error of `create` or `lookup`, unchanged
    #[tracing::instrument(
        skip_all,
        fields(table_id = %table_id, key = key.map(IdempotencyKey::as_str))
    )]
    pub async fn claim_or_join<Create, CreateFut, Lookup, LookupFut>(
        &self,
        table_id: TableId,
        key: Option<&IdempotencyKey>,
        create: Create,
        lookup: Lookup,
    ) -> Result<Order>
    where
        Create: FnOnce() -> CreateFut,
        CreateFut: Future<Output = Result<Order>>,
        Lookup: Fn(OrderId) -> LookupFut,
        LookupFut: Future<Output = Result<Order>>,
    {
        let Some(key) = key else {
            return create().await;
        };
        let marker_key = key.marker_key(table_id);

        for round in 0..self.max_claim_rounds() {
            if let Claim::Won { pending } = self.try_claim(&marker_key).await? {
                metrics::counter!(IDEMPOTENCY_CLAIMS, "outcome" => "won").increment(1);
                return self.run_claimed(&marker_key, &pending, create).await;
            }
            metrics::counter!(IDEMPOTENCY_CLAIMS, "outcome" => "conflict").increment(1);

            match self.join(&marker_key, &lookup).await? {
                Joined::Resolved(order) => {
                    debug!(order_id = %order.id, round, "Joined committed idempotency claim");
                    return Ok(order);
                }
                Joined::Vacant => {
                    debug!(round, "Claim marker vanished, claiming again");
                }
                Joined::StillPending => {
                    warn!(
                        round,
                        budget_ms = self.poll.budget.as_millis(),
                        "Pending claim did not resolve within poll budget, treating it as expired"
                    );
                }
            }
        }

        Err(LedgerError::CacheUnavailable(format!(
            "idempotency claim {marker_key} did not resolve within its window"
        )))
    }

    /// Enough rounds for a stuck `Pending` marker to reach the end of its TTL.
    fn max_claim_rounds(&self) -> u32 {
        let budget = self.poll.budget.max(Duration::from_millis(1)).as_millis();
        let rounds = self.ttl.as_millis().div_ceil(budget).saturating_add(2);
        u32::try_from(rounds).unwrap_or(u32::MAX)
    }

    async fn try_claim(&self, marker_key: &str) -> Result<Claim> {
        let pending = ClaimState::Pending {
            claim_id: ClaimId::generate(),
        }
        .encode()?;

        if self.cache.set_if_absent(marker_key, &pending, self.ttl).await? {
            Ok(Claim::Won { pending })
        } else {
            Ok(Claim::Conflict)
        }
    }

    async fn run_claimed<Create, CreateFut>(
        &self,
        marker_key: &str,
        pending: &str,
        create: Create,
    ) -> Result<Order>
    where
        Create: FnOnce() -> CreateFut,
        CreateFut: Future<Output = Result<Order>>,
    {
        let order = match create().await {
            Ok(order) => order,
            Err(err) => {
                self.release(marker_key, pending).await;
                return Err(err);
            }
        };

        self.commit(marker_key, pending, &order).await;
        Ok(order)
    }

    /// Upgrade our `Pending` marker to `Committed`.
    ///
    /// The order already exists, so a failed upgrade is reported rather than
    /// returned: the marker stays `Pending` until its TTL ends and a retry
    /// after that can create a second order.
    async fn commit(&self, marker_key: &str, pending: &str, order: &Order) {
        let upgrade = match (ClaimState::Committed { order_id: order.id }).encode() {
            Ok(committed) => self.cache.compare_and_set(marker_key, pending, &committed).await,
            Err(err) => Err(err),
        };

        match upgrade {
            Ok(true) => {
                info!(
                    table_id = %order.table_id,
                    order_id = %order.id,
                    "Committed idempotency claim"
                );
            }
            Ok(false) => {
                metrics::counter!(IDEMPOTENCY_COMMIT_UPGRADE_FAILED, "reason" => "marker_lost")
                    .increment(1);
                error!(
                    table_id = %order.table_id,
                    order_id = %order.id,
                    marker_key,
                    "Claim marker expired or was replaced before commit; the order has no idempotency record"
                );
            }
            Err(err) => {
                metrics::counter!(IDEMPOTENCY_COMMIT_UPGRADE_FAILED, "reason" => "cache_error")
                    .increment(1);
                error!(
                    table_id = %order.table_id,
                    order_id = %order.id,
                    marker_key,
                    error = %err,
                    "Failed to commit idempotency claim; the order has no idempotency record"
                );
            }
        }
    }

    /// Release our own `Pending` marker after a failed create.
    async fn release(&self, marker_key: &str, pending: &str) {
        match self.cache.compare_and_delete(marker_key, pending).await {
            Ok(true) => debug!(marker_key, "Released idempotency claim after failed create"),
            Ok(false) => debug!(marker_key, "Idempotency claim already gone at release"),
            Err(err) => warn!(
                marker_key,
                error = %err,
                "Failed to release idempotency claim; it will expire with its TTL"
            ),
        }
    }

    async fn join<Lookup, LookupFut>(&self, marker_key: &str, lookup: &Lookup) -> Result<Joined>
    where
        Lookup: Fn(OrderId) -> LookupFut,
        LookupFut: Future<Output = Result<Order>>,
    {
        let mut backoff = self.poll.schedule();

        loop {
            let Some(raw) = self.cache.get(marker_key).await? else {
                metrics::counter!(IDEMPOTENCY_JOINS, "outcome" => "vacant").increment(1);
                return Ok(Joined::Vacant);
            };

            match ClaimState::decode(&raw)? {
                ClaimState::Committed { order_id } => {
                    metrics::counter!(IDEMPOTENCY_JOINS, "outcome" => "committed").increment(1);
                    return lookup(order_id).await.map(Joined::Resolved);
                }
                ClaimState::Pending { claim_id } => {
                    let Some(delay) = backoff.next() else {
                        metrics::counter!(IDEMPOTENCY_JOINS, "outcome" => "timeout").increment(1);
                        return Ok(Joined::StillPending);
                    };
                    debug!(
                        %claim_id,
                        delay_ms = delay.as_millis(),
                        waited_ms = backoff.elapsed().as_millis(),
                        "Claim pending, waiting"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
