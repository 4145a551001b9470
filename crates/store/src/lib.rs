//! # Tracegraph Store
//!
//! Disk-resident multimap used as the index layer of the tracegraph
//! association engine.
//!
//! ## Features
//!
//! - **Fixed-bucket hash table** persisted in a single binary file
//! - **On-disk chaining** - collision chains of fixed-size records linked
//!   by byte offset
//! - **Slot recycling** via an intrusive free list, before the file grows
//! - **Durable header** - growth pointer, free-list head and bucket count
//!   survive close/reopen
//!
//! ## Architecture
//!
//! ```text
//! PersistentMultiMap
//!     │
//!     ├──> Header (growth pointer, free-list head, bucket count)
//!     │
//!     ├──> Bucket table (num_buckets offsets, -1 = empty)
//!     │
//!     └──> Record area (fixed 371-byte records)
//!            ├─ key[121] value[121] context[121] next
//!            └─ every slot is on exactly one of {live chain, free list}
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use tracegraph_store::PersistentMultiMap;
//!
//! fn main() -> tracegraph_store::Result<()> {
//!     let mut map = PersistentMultiMap::create_new("index.dat", 100)?;
//!     map.insert("a.exe", "b.exe", "comp1")?;
//!
//!     for assoc in map.search("a.exe")? {
//!         println!("{} -> {} ({})", assoc.key, assoc.value, assoc.context);
//!     }
//!     map.close()?;
//!     Ok(())
//! }
//! ```

mod block_file;
mod error;
mod multimap;
mod types;

pub use block_file::BlockFile;
pub use error::{Result, StoreError};
pub use multimap::{Matches, PersistentMultiMap, MAX_FIELD_LEN};
pub use types::Association;
