//! bangumi-filter - condition queries over Bangumi archive dumps
//!
//! # Architecture
//!
//! - **Model**: subjects with direct fields, an infobox annex and tags
//! - **Codes**: relation and staff-position names, scoped by subject type
//! - **Index**: relations, staff and episodes grouped by subject
//! - **Query**: line-oriented condition language, evaluator and executor
//! - **Loader / Report**: JSON-lines dumps in, JSON lines and CSV out
//!
//! # Usage example
//!
//! ```no_run
//! use bangumi_filter::{parse_query, EvalOptions, Executor, Indices, Record, RecordStore, SubjectType};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store: RecordStore = vec![
//!     Record::new(1, SubjectType::Book).field_value("出版社", "角川"),
//! ]
//! .into_iter()
//! .collect();
//!
//! let parsed = parse_query("出版社:角川\n书籍");
//! let indices = Indices::new();
//! let executor = Executor::new(&parsed.query, &indices, Some(&store), EvalOptions::default())?;
//! for entry in executor.run(&store) {
//!     println!("{} {}", entry.id, entry.url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod model;
pub mod codes;
pub mod index;
pub mod query;
pub mod loader;
pub mod report;
pub mod config;
pub mod error;

pub use model::{Record, SubjectType, FieldSource, RelationEdge, StaffAssignment, Episode};
pub use index::{Indices, LinkIndex, RecordLookup, RecordStore};
pub use query::{parse, parse_query, Condition, EvalOptions, Evaluator, Executor, ParsedQuery, Query, ResultEntry, RunStats};
pub use config::Config;
pub use error::{FilterError, Result};
