//! # Chronos
//!
//! Top-level facade crate: wires a [`chronos_core::Router`], a set of
//! configured `DocumentStore`/`ObjectStore` backends, and a
//! [`chronos_core::Config`] into a single handle exposing the
//! [`chronos_core::BoundOps`] contract, and owns the background fallback
//! worker and retention sweeper.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chronos::{Xronox, XronoxBuilder};
//! use chronos_core::{CallContext, RouteEntry};
//!
//! # async fn run() -> chronos::error::Result<()> {
//! let pg_pool = chronos_postgres::create_pool("postgres://localhost/chronos").await?;
//! chronos_postgres::run_migrations(&pg_pool).await?;
//! let doc_store = Arc::new(chronos_postgres::PgDocumentStore::new(pg_pool));
//! let object_store = Arc::new(chronos_objectstore::Store::local("./data/objects")?);
//!
//! let mut core_config = chronos_core::Config::default();
//! core_config.routes.push(RouteEntry {
//!     tenant: None,
//!     domain: None,
//!     collection: Some("users".into()),
//!     backends: vec!["primary".into()],
//! });
//!
//! let xronox = XronoxBuilder::new(core_config)
//!     .with_backend("primary", doc_store, object_store)
//!     .build();
//!
//! let item = xronox.with(CallContext::new()).create("users", serde_json::json!({"name": "Alice"}), 1_700_000_000).await?;
//! assert_eq!(item.system.ov, 0);
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod runtime;

use std::sync::Arc;

use chronos_core::{BoundOps, CallContext, Config as CoreConfig, FallbackOp, ReplayOutcome, Router, RoutingContext, RoutingStrategy, WriteOp, WritePath};

pub use backends::Backends;
pub use config::{Config, ObjectStoreBackend};
pub use error::Error;
pub use runtime::Runtime;

/// The engine handle: a bound `Router` + `Backends` + `Config` triple.
/// Cloning is cheap (everything inside is `Arc`-backed); callers typically
/// hold one `Xronox` per process and call [`Xronox::with`] per request.
pub struct Xronox {
    router: Router,
    backends: Backends,
    config: CoreConfig,
}

impl Xronox {
    /// Bind a tenant/domain scope and get the operation surface callers
    /// actually invoke (`create`, `update`, `query`, ...).
    pub fn with(self: &Arc<Self>, ctx: CallContext) -> BoundOps<'_> {
        BoundOps::new(&self.router, &self.backends, &self.config, ctx)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Every collection named in the routing table or given an explicit
    /// policy, for the retention sweeper to iterate without a caller
    /// having to enumerate collections separately.
    fn tracked_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.collection_policies.keys().cloned().collect();
        for route in &self.config.routes {
            if let Some(collection) = &route.collection {
                if !names.contains(collection) {
                    names.push(collection.clone());
                }
            }
        }
        names
    }

    /// Replay a queued [`FallbackOp`] through the same write-path saga a
    /// live call would use, reported back to [`chronos_core::FallbackWorker`]
    /// as a [`ReplayOutcome`].
    async fn replay_fallback(&self, op: FallbackOp) -> ReplayOutcome {
        let write_op = match op.kind {
            chronos_core::FallbackOpKind::Create => WriteOp::Create {
                collection: op.collection.clone(),
                item_id: Some(op.item_id),
                payload: op.payload,
                actor: None,
                reason: None,
                parent: None,
                origin: None,
            },
            chronos_core::FallbackOpKind::Update => {
                let expected_ov = match self.peek_expected_ov(&op.collection, op.item_id).await {
                    Ok(ov) => ov,
                    Err(err) => return ReplayOutcome::Failed(err.to_string()),
                };
                WriteOp::Update {
                    collection: op.collection.clone(),
                    item_id: op.item_id,
                    expected_ov,
                    payload: op.payload,
                }
            }
            chronos_core::FallbackOpKind::Delete => {
                let expected_ov = match self.peek_expected_ov(&op.collection, op.item_id).await {
                    Ok(ov) => ov,
                    Err(err) => return ReplayOutcome::Failed(err.to_string()),
                };
                WriteOp::Delete {
                    collection: op.collection.clone(),
                    item_id: op.item_id,
                    expected_ov,
                }
            }
            chronos_core::FallbackOpKind::Enrich => WriteOp::Enrich {
                collection: op.collection.clone(),
                item_id: op.item_id,
                patch: op.payload,
            },
        };

        let write_path = WritePath::new(&self.router, &self.backends, &self.config);
        let ctx = RoutingContext::new(write_op.collection());
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        match write_path.execute(write_op, ctx, now).await {
            Ok(_) => ReplayOutcome::Committed,
            Err(err) => ReplayOutcome::Failed(err.to_string()),
        }
    }

    async fn peek_expected_ov(&self, collection: &str, item_id: chronos_core::OpaqueId) -> chronos_core::Result<u64> {
        use chronos_core::BackendResolver;

        let ctx = RoutingContext::new(collection);
        let backend_id = self.router.resolve(&ctx, |_| true)?;
        let (doc_store, _) = self
            .backends
            .resolve(&backend_id)
            .ok_or_else(|| chronos_core::Error::ConfigRefMissing(format!("no adapter registered for backend '{backend_id}'")))?;
        let head = doc_store
            .get_head(collection, item_id)
            .await?
            .ok_or_else(|| chronos_core::Error::not_found(collection, item_id.to_string()))?;
        Ok(head.ov)
    }
}

/// Builds an [`Xronox`] handle from a [`chronos_core::Config`] and a set of
/// named backends. `#[non_exhaustive]`-style growth room: new builder
/// methods can be added without breaking callers who only use `new`/`build`.
pub struct XronoxBuilder {
    config: CoreConfig,
    backends: Backends,
    strategy: RoutingStrategy,
}

impl XronoxBuilder {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            backends: Backends::new(),
            strategy: RoutingStrategy::Tiered,
        }
    }

    pub fn with_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_backend(
        self,
        id: impl Into<String>,
        doc_store: Arc<dyn chronos_core::DocumentStore>,
        object_store: Arc<dyn chronos_core::ObjectStore>,
    ) -> Self {
        self.backends.register(id, doc_store, object_store);
        self
    }

    pub fn build(self) -> Arc<Xronox> {
        let router = Router::new(self.config.clone(), self.strategy);
        Arc::new(Xronox {
            router,
            backends: self.backends,
            config: self.config,
        })
    }
}
