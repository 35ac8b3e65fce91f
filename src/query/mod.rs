//! Condition query language over catalog records
//!
//! A query is a list of one-line conditions combined with AND.
//!
//! # Example
//! ```ignore
//! 出版社:角川
//! 单行本:all:发售日:晚于:2020-06-01
//! 册数:等于:{{count:单行本}}
//! ```

mod types;
mod parser;
mod eval;
mod executor;
pub mod compare;

pub use types::*;
pub use parser::*;
pub use eval::*;
pub use executor::*;

#[cfg(test)]
mod tests;
