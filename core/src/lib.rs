//! # Chronos Core
//!
//! Versioned, multi-backend document persistence engine.
//!
//! This crate holds the storage-agnostic core of a time-travel document
//! store: routing, the write-path saga, the read path, the deep-merge
//! engine, externalization, analytics and the fallback queue. It never
//! touches a network socket or a database connection directly — those live
//! behind the [`store_trait::DocumentStore`] and [`object_trait::ObjectStore`]
//! adapter traits, implemented in sibling crates (`chronos-postgres`,
//! `chronos-objectstore`) and wired together by the facade crate (`chronos`).
//!
//! ## Design Principles
//!
//! - **Adapters at the edge**: IO lives behind two narrow traits; everything
//!   above them is ordinary synchronous-in-spirit logic that happens to
//!   cross an `async` boundary at the adapter call.
//! - **Optimistic concurrency, always forward**: every write CASes a head's
//!   `ov`; failures are surfaced, never silently retried inside the saga.
//! - **Saga, not two-phase commit**: a write externalizes blobs before it
//!   commits the document row, and compensates (deletes the blobs) if the
//!   commit fails, rather than holding a distributed transaction open.
//! - **Pure configuration**: [`config::Config`] is a plain value this crate
//!   never resolves from environment or files itself.
//!
//! ## Core Concepts
//!
//! ### Routing
//!
//! The [`router::Router`] resolves a `(tenant, domain, collection)`
//! [`router::RoutingContext`] to a backend id, preferring tenant-specific
//! routes over domain-specific routes over generic ones, and falling back to
//! rendezvous (highest-random-weight) hashing when a route names more than
//! one candidate backend.
//!
//! ### The write-path saga
//!
//! [`saga::WritePath::execute`] drives every create/update/delete/enrich
//! through validate → route → load head → transform → externalize → commit,
//! compensating externalized blobs and durably queuing the original request
//! for retry if the final commit fails transiently.
//!
//! ### BoundOps
//!
//! [`bound_ops::BoundOps`] is the contract most callers actually use: it
//! composes the write path, read path, merger and analytics layer into
//! `create`, `update`, `delete`, `enrich`, `smart_insert`, `get_item`,
//! `query`, `restore_object`, `restore_collection`, `insert_with_entities`
//! and `get_with_entities`.
//!
//! ## Quick Start
//!
//! ```rust
//! use chronos_core::{BackendResolver, BoundOps, CallContext, Config, DocumentStore, ObjectStore, RouteEntry, Router, RoutingStrategy};
//! use std::sync::Arc;
//!
//! # struct SingleBackend { doc: Arc<dyn DocumentStore>, obj: Arc<dyn ObjectStore> }
//! # impl BackendResolver for SingleBackend {
//! #     fn resolve(&self, id: &str) -> Option<(Arc<dyn DocumentStore>, Arc<dyn ObjectStore>)> {
//! #         (id == "primary").then(|| (self.doc.clone(), self.obj.clone()))
//! #     }
//! # }
//! # async fn run(doc: Arc<dyn DocumentStore>, obj: Arc<dyn ObjectStore>) -> chronos_core::error::Result<()> {
//! let mut config = Config::default();
//! config.routes.push(RouteEntry {
//!     tenant: None,
//!     domain: None,
//!     collection: Some("users".into()),
//!     backends: vec!["primary".into()],
//! });
//! let router = Router::new(config.clone(), RoutingStrategy::Tiered);
//! let backends = SingleBackend { doc, obj };
//!
//! let ops = BoundOps::new(&router, &backends, &config, CallContext::new());
//! let item = ops.create("users", serde_json::json!({"name": "Alice"}), 1_700_000_000).await?;
//! assert_eq!(item.system.ov, 0);
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod bound_ops;
pub mod config;
pub mod error;
pub mod externalizer;
pub mod fallback;
pub mod id;
pub mod merger;
pub mod model;
pub mod object_trait;
pub mod read_path;
pub mod retention;
pub mod router;
pub mod saga;
pub mod store_trait;

#[cfg(test)]
mod testutil;

pub use bound_ops::{
    BoundOps, CallContext, CreateOptions, EntityMapping, GetItemOptions, InsertWithEntitiesResult, ItemMeta, ItemView, RestoreCollectionOutcome,
    RestoreTarget, SmartInsertOptions, SmartInsertResult,
};
pub use config::{AnalyticsRule, BackendId, CollectionPolicy, Config, FallbackPolicy, RetentionPolicy, RouteEntry};
pub use error::{Error, Result};
pub use fallback::{ReplayOutcome, Worker as FallbackWorker};
pub use id::OpaqueId;
pub use merger::deep_merge;
pub use model::{
    CollectionCounter, CollectionName, CollectionVersion, CounterTotals, DomainId, ExternalizedBlob, FallbackOp, FallbackOpKind, Head, Item, ItemVersion,
    LineageRef, PayloadObjectRef, PayloadSystem, SyncState, SystemEnvelope, TenantId, Timestamp, Version,
};
pub use object_trait::{ObjectMeta, ObjectStore};
pub use read_path::{ReadPath, ReadSelector};
pub use retention::{RetentionSweep, SweepReport};
pub use router::{Router, RoutingContext, RoutingStrategy};
pub use saga::{BackendResolver, SagaState, WriteOp, WritePath};
pub use store_trait::{DocumentStore, QueryFilter};
