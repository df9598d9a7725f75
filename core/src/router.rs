//! Router & ContextResolver (spec §4.1).
//!
//! Resolves a `(tenant, domain, collection)` routing context to one or more
//! backend ids configured in [`crate::config::Config`]. Precedence is
//! tenant-specific routes over domain-specific routes over fully generic
//! (collection-only) routes. When more than one backend is eligible for a
//! context, a deterministic pick is made so repeated calls for the same
//! context always land on the same backend without needing a lookup table
//! of prior decisions.

use sha2::{Digest, Sha256};

use crate::config::{BackendId, Config, RouteEntry};
use crate::error::{Error, Result};
use crate::model::{CollectionName, DomainId, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingContext {
    pub tenant: Option<TenantId>,
    pub domain: Option<DomainId>,
    pub collection: CollectionName,
}

impl RoutingContext {
    pub fn new(collection: impl Into<CollectionName>) -> Self {
        Self {
            tenant: None,
            domain: None,
            collection: collection.into(),
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<DomainId>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Stable string used as the HRW routing key; distinct contexts always
    /// produce distinct keys, and matching contexts always produce the
    /// same key.
    fn routing_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.tenant.as_deref().unwrap_or(""),
            self.domain.as_deref().unwrap_or(""),
            self.collection
        )
    }
}

/// The routing strategy used when a resolved route entry names more than
/// one backend. `Tiered` is the default (spec §9 Open Question c); the
/// legacy `Rendezvous` mode is kept only so configuration contracts that
/// already name weighted candidate sets keep resolving the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingStrategy {
    /// Prefer the first backend in declaration order that is reachable;
    /// callers supply reachability via `Router::resolve`'s `is_healthy`.
    Tiered,
    /// Highest-random-weight hash across all candidates, ignoring health.
    Rendezvous,
}

pub struct Router {
    config: Config,
    strategy: RoutingStrategy,
}

impl Router {
    pub fn new(config: Config, strategy: RoutingStrategy) -> Self {
        Self { config, strategy }
    }

    /// Find the route entry with the highest precedence that matches `ctx`.
    /// Precedence, highest first: tenant+domain+collection, tenant+collection,
    /// domain+collection, collection only.
    fn best_entry(&self, ctx: &RoutingContext) -> Option<&RouteEntry> {
        self.config
            .routes
            .iter()
            .filter(|entry| route_matches(entry, ctx))
            .max_by_key(|entry| specificity(entry))
    }

    /// Resolve a routing context to a single backend id.
    ///
    /// `is_healthy` lets the caller exclude backends that are currently
    /// known to be down; in tiered mode the first healthy candidate in
    /// declaration order wins, falling back to HRW across all candidates if
    /// none are reported healthy (so routing still makes progress rather
    /// than failing outright when health information is unavailable).
    pub fn resolve(&self, ctx: &RoutingContext, is_healthy: impl Fn(&BackendId) -> bool) -> Result<BackendId> {
        let entry = self
            .best_entry(ctx)
            .ok_or_else(|| Error::RouteNotFound {
                tenant: ctx.tenant.clone(),
                domain: ctx.domain.clone(),
                collection: ctx.collection.clone(),
            })?;

        if entry.backends.is_empty() {
            return Err(Error::ConfigRefMissing(format!(
                "route for collection '{}' names no backends",
                ctx.collection
            )));
        }

        if entry.backends.len() == 1 {
            return Ok(entry.backends[0].clone());
        }

        match self.strategy {
            RoutingStrategy::Tiered => {
                if let Some(backend) = entry.backends.iter().find(|b| is_healthy(b)) {
                    Ok(backend.clone())
                } else {
                    Ok(rendezvous_pick(&ctx.routing_key(), &entry.backends))
                }
            }
            RoutingStrategy::Rendezvous => Ok(rendezvous_pick(&ctx.routing_key(), &entry.backends)),
        }
    }
}

fn route_matches(entry: &RouteEntry, ctx: &RoutingContext) -> bool {
    if let Some(collection) = &entry.collection {
        if collection != &ctx.collection {
            return false;
        }
    }
    if let Some(tenant) = &entry.tenant {
        if Some(tenant) != ctx.tenant.as_ref() {
            return false;
        }
    }
    if let Some(domain) = &entry.domain {
        if Some(domain) != ctx.domain.as_ref() {
            return false;
        }
    }
    true
}

fn specificity(entry: &RouteEntry) -> u8 {
    let mut score = 0;
    if entry.collection.is_some() {
        score += 1;
    }
    if entry.domain.is_some() {
        score += 2;
    }
    if entry.tenant.is_some() {
        score += 4;
    }
    score
}

/// Highest-random-weight selection: the candidate maximizing
/// `SHA-256(routing_key || candidate)` interpreted as an unsigned integer
/// wins. Deterministic across processes and independent of candidate
/// iteration order.
fn rendezvous_pick(routing_key: &str, candidates: &[BackendId]) -> BackendId {
    candidates
        .iter()
        .max_by_key(|candidate| hrw_weight(routing_key, candidate))
        .cloned()
        .expect("candidates is non-empty, checked by caller")
}

fn hrw_weight(routing_key: &str, candidate: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(routing_key.as_bytes());
    hasher.update(b"|");
    hasher.update(candidate.as_bytes());
    hasher.finalize().into()
}
