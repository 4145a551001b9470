//! # Tracegraph Graph
//!
//! Bidirectional association graph and bad-entity discovery over the
//! tracegraph persistent multimap.
//!
//! ## Features
//!
//! - **Dual mirrored indices** - every edge stored forward and reverse,
//!   kept in lockstep by all mutating operations
//! - **Telemetry ingestion** - line-delimited `<context> <key> <value>`
//!   records, malformed lines warned and skipped
//! - **Crawl** - breadth-first propagation from indicator seeds, with
//!   high-prevalence entities memoized as benign infrastructure
//! - **Purge** - retraction of every edge touching an entity
//!
//! ## Architecture
//!
//! ```text
//! telemetry lines
//!     │
//!     ├──> AssociationGraph::ingest
//!     │      ├─ forward index: key = from, value = to
//!     │      └─ reverse index: key = to,   value = from
//!     │
//!     └──> AssociationGraph::crawl(indicators, min_prevalence)
//!            ├─ frontier: FIFO over suspect entities
//!            ├─ known-good memo: prevalence >= threshold stops expansion
//!            └─ output: sorted bad entities + sorted interactions
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use tracegraph_graph::AssociationGraph;
//!
//! fn main() -> tracegraph_graph::Result<()> {
//!     let mut graph = AssociationGraph::create_new("telemetry", 10_000)?;
//!     graph.ingest_file("telemetry.txt")?;
//!
//!     let indicators = vec!["a.exe".to_string()];
//!     let outcome = graph.crawl(&indicators, 12)?;
//!     for entity in &outcome.bad_entities {
//!         println!("bad: {entity}");
//!     }
//!     graph.close()?;
//!     Ok(())
//! }
//! ```

mod error;
mod graph;
mod types;

pub use error::{GraphError, Result};
pub use graph::AssociationGraph;
pub use types::{CrawlOutcome, IngestStats, Interaction};

// Re-export store types that surface through the graph API.
pub use tracegraph_store::{Association, StoreError};
