//! Disposable local Elasticsearch for automated tests.
//!
//! Starts (or reuses) a single-node Elasticsearch container under a
//! well-known name, waits until it answers, wipes every index and creates
//! the ones the test asks for. Tear it down with [`ElasticLocal::stop`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        ElasticLocal::start                            │
//! │                                                                       │
//! │   ┌─────────────┐   ┌──────────────┐   ┌────────────┐   ┌──────────┐ │
//! │   │ Ensure      │──▶│ Reconciler   │──▶│ Readiness  │──▶│ Index    │ │
//! │   │ image       │   │ find/revive/ │   │ probe      │   │ reset    │ │
//! │   │             │   │ create       │   │ GET / ==200│   │ wipe+PUT │ │
//! │   └─────────────┘   └──────────────┘   └────────────┘   └──────────┘ │
//! │          │                 │                                          │
//! │          ▼                 ▼                                          │
//! │   ┌──────────────────────────────┐    ┌───────────────────────────┐  │
//! │   │ ContainerRuntime (Docker)    │    │ LifecycleObserver         │  │
//! │   └──────────────────────────────┘    └───────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use es_local_docker::{ElasticLocal, IndexSpec, StartOptions};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = StartOptions::default().with_port(9201).with_index(IndexSpec::new(
//!     "docs",
//!     json!({ "mappings": { "properties": { "title": { "type": "text" } } } }),
//! ));
//!
//! let es = ElasticLocal::start(options).await?;
//! println!("Elasticsearch at {}", es.url());
//!
//! es.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod indexes;
pub mod lifecycle;
pub mod observer;
pub mod readiness;
pub mod reconciler;
pub mod runtime;
pub mod testing;

pub use config::{IndexSpec, StartOptions};
pub use endpoint::ServiceEndpoint;
pub use error::{ConfigError, ElasticError, Result};
pub use indexes::{IndexFailure, ResetReport};
pub use lifecycle::{ElasticLocal, Stage, start, stop};
pub use observer::{LifecycleEvent, LifecycleObserver, TracingObserver, init_tracing};
pub use runtime::{ContainerRef, ContainerRuntime, ContainerState};
