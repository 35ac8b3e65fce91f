//! Query executor: streams records through the evaluator and AND-combines
//! the top-level conditions

use std::borrow::Borrow;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{FilterError, Result};
use crate::index::{Indices, RecordLookup};
use crate::model::{Record, SubjectType};
use crate::query::eval::{Capture, EvalOptions, Evaluator, Warnings};
use crate::query::types::Query;

/// One matching record with everything captured on the way
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultEntry {
    pub id: u64,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    pub url: String,
    #[serde(flatten)]
    pub capture: Capture,
}

/// Run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub scanned: usize,
    pub matched: usize,
    pub warnings: Warnings,
}

impl RunStats {
    fn record(&mut self, matched: bool, warnings: Warnings) {
        self.scanned += 1;
        if matched {
            self.matched += 1;
        }
        self.warnings += warnings;
    }
}

pub struct Executor<'a> {
    query: &'a Query,
    evaluator: Evaluator<'a>,
}

impl<'a> Executor<'a> {
    /// Check that everything the query needs is loaded.
    ///
    /// Fails when the query is empty, when a relation, staff or episode
    /// condition (or count reference) has no index to read from, or when a
    /// relation condition inspects related subjects but no record store is
    /// given.
    pub fn new(
        query: &'a Query,
        indices: &'a Indices,
        records: Option<&'a dyn RecordLookup>,
        options: EvalOptions,
    ) -> Result<Self> {
        if query.is_empty() {
            return Err(FilterError::EmptyQuery);
        }

        let required = query.requirements();
        if required.relations && indices.relations.is_none() {
            return Err(FilterError::MissingIndex("relations"));
        }
        if required.staff && indices.staff.is_none() {
            return Err(FilterError::MissingIndex("staff"));
        }
        if required.episodes && indices.episodes.is_none() {
            return Err(FilterError::MissingIndex("episodes"));
        }
        if required.record_lookup && records.is_none() {
            return Err(FilterError::RecordStoreRequired);
        }

        debug!(conditions = query.len(), ?required, "executor ready");
        Ok(Executor { query, evaluator: Evaluator::new(indices, records, options) })
    }

    pub fn query(&self) -> &Query {
        self.query
    }

    /// Evaluate every top-level condition, stopping at the first failure
    pub fn evaluate_record(&self, record: &Record) -> (Option<ResultEntry>, Warnings) {
        let mut capture = Capture::default();
        let mut warnings = Warnings::default();

        for condition in self.query.conditions() {
            let outcome = self.evaluator.evaluate(condition, record);
            warnings += outcome.warnings;
            if !outcome.matched {
                return (None, warnings);
            }
            capture.merge(outcome.capture);
        }

        let entry = ResultEntry {
            id: record.id(),
            subject_type: record.subject_type(),
            url: record.url(),
            capture,
        };
        (Some(entry), warnings)
    }

    /// Lazily yield matches in input order
    pub fn run<I>(&self, records: I) -> Run<'_, 'a, I::IntoIter>
    where
        I: IntoIterator,
        I::Item: Borrow<Record>,
    {
        Run { executor: self, records: records.into_iter(), stats: RunStats::default() }
    }

    /// Evaluate on the rayon pool; matches keep input order
    pub fn run_parallel(&self, records: &[Record]) -> (Vec<ResultEntry>, RunStats) {
        let evaluated: Vec<(Option<ResultEntry>, Warnings)> =
            records.par_iter().map(|record| self.evaluate_record(record)).collect();

        let mut stats = RunStats::default();
        let mut entries = Vec::new();
        for (entry, warnings) in evaluated {
            stats.record(entry.is_some(), warnings);
            entries.extend(entry);
        }

        info!(scanned = stats.scanned, matched = stats.matched, "parallel run finished");
        (entries, stats)
    }
}

/// Iterator returned by [`Executor::run`]
pub struct Run<'e, 'a, I> {
    executor: &'e Executor<'a>,
    records: I,
    stats: RunStats,
}

impl<I> Run<'_, '_, I> {
    /// Counters so far; final once the iterator is exhausted
    pub fn stats(&self) -> RunStats {
        self.stats
    }
}

impl<I> Iterator for Run<'_, '_, I>
where
    I: Iterator,
    I::Item: Borrow<Record>,
{
    type Item = ResultEntry;

    fn next(&mut self) -> Option<ResultEntry> {
        for record in self.records.by_ref() {
            let (entry, warnings) = self.executor.evaluate_record(record.borrow());
            self.stats.record(entry.is_some(), warnings);
            if entry.is_some() {
                return entry;
            }
        }
        None
    }
}
