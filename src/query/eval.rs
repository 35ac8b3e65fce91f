//! Condition evaluator
//!
//! Evaluation is a pure function of the condition, the record and the
//! read-only indices. Everything a condition produces besides its verdict
//! (captured values, warning counters) is returned in an [`Outcome`].

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::AddAssign;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::codes;
use crate::index::{Indices, RecordLookup};
use crate::model::{Blank, FieldSource, Record};
use crate::query::compare;
use crate::query::types::*;

/// Evaluation switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalOptions {
    /// Keep evaluating linked entities after the verdict is known, so every
    /// matching id is captured
    pub exhaustive: bool,
}

/// Evaluation anomalies. None of them abort a run; each one collapses into a
/// defined outcome and is only counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Warnings {
    /// Invalid regular expression, matched as literal text instead
    pub regex_fallbacks: usize,
    /// Relation or position name unknown for the record's type
    pub unresolved_names: usize,
    /// Relation target absent from the record store
    pub missing_targets: usize,
    /// `{{field}}` / `{{{field}}}` reference to an absent field
    pub missing_references: usize,
}

impl Warnings {
    pub fn total(&self) -> usize {
        self.regex_fallbacks + self.unresolved_names + self.missing_targets + self.missing_references
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for Warnings {
    fn add_assign(&mut self, other: Warnings) {
        self.regex_fallbacks += other.regex_fallbacks;
        self.unresolved_names += other.unresolved_names;
        self.missing_targets += other.missing_targets;
        self.missing_references += other.missing_references;
    }
}

/// Values collected while a record is evaluated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capture {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    /// relation name -> matched target ids
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, Vec<u64>>,
    /// position name -> matched person ids
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub staff: BTreeMap<String, Vec<u64>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub episodes: Vec<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub meta_tags: Vec<String>,
}

fn extend_unique<T: PartialEq>(into: &mut Vec<T>, items: Vec<T>) {
    for item in items {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

impl Capture {
    pub fn merge(&mut self, other: Capture) {
        for (name, value) in other.fields {
            self.fields.entry(name).or_insert(value);
        }
        for (name, ids) in other.relations {
            extend_unique(self.relations.entry(name).or_default(), ids);
        }
        for (name, ids) in other.staff {
            extend_unique(self.staff.entry(name).or_default(), ids);
        }
        extend_unique(&mut self.episodes, other.episodes);
        self.counts.extend(other.counts);
        extend_unique(&mut self.tags, other.tags);
        extend_unique(&mut self.meta_tags, other.meta_tags);
    }
}

/// Result of evaluating one condition against one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub matched: bool,
    pub capture: Capture,
    pub warnings: Warnings,
}

/// What field references resolve against
#[derive(Clone, Copy)]
struct Scope<'r> {
    /// Entity under test: the record itself, a related record, an
    /// assignment or an episode
    current: &'r dyn FieldSource,
    /// Record whose linked entities `{{count:...}}` counts. `None` for a
    /// relation target missing from the record store.
    owner: Option<&'r Record>,
    /// Subject of the enclosing link condition, target of `{{{field}}}`
    source: Option<&'r Record>,
}

impl<'r> Scope<'r> {
    fn top(record: &'r Record) -> Self {
        Scope { current: record, owner: Some(record), source: None }
    }

    fn is_top(&self) -> bool {
        self.source.is_none()
    }
}

/// One entity enumerated by a link condition
struct Linked<'r> {
    id: u64,
    entity: &'r dyn FieldSource,
    owner: Option<&'r Record>,
}

/// Condition evaluator over a fixed set of indices
pub struct Evaluator<'a> {
    indices: &'a Indices,
    records: Option<&'a dyn RecordLookup>,
    options: EvalOptions,
}

impl<'a> Evaluator<'a> {
    pub fn new(indices: &'a Indices, records: Option<&'a dyn RecordLookup>, options: EvalOptions) -> Self {
        Evaluator { indices, records, options }
    }

    pub fn options(&self) -> EvalOptions {
        self.options
    }

    /// Evaluate one condition against one record
    pub fn evaluate(&self, condition: &Condition, record: &Record) -> Outcome {
        let mut out = Outcome::default();
        out.matched = match condition {
            Condition::Field(cond) => self.eval_field(cond, Scope::top(record), &mut out),
            Condition::Wildcard(cond) => self.eval_wildcard(cond, record, &mut out),
            Condition::Relation(cond) => self.eval_relation(cond, record, &mut out),
            Condition::Staff(cond) => self.eval_staff(cond, record, &mut out),
            Condition::Episode(cond) => self.eval_episodes(cond, record, &mut out),
            Condition::Tag(cond) => eval_tag(cond, record, &mut out),
        };
        out
    }

    // ========================================================================
    // Field conditions
    // ========================================================================

    fn eval_field(&self, cond: &FieldCond, scope: Scope<'_>, out: &mut Outcome) -> bool {
        let value: Cow<'_, str> = match &cond.subject {
            Subject::Field(name) => scope.current.field(name).unwrap_or_default(),
            Subject::Count(count) => Cow::Owned(self.count(count, scope, out).to_string()),
        };

        let hit = self.match_value(&cond.matcher, &value, scope, out);
        let matched = hit != cond.negated;

        if matched && scope.is_top() {
            if let Subject::Field(name) = &cond.subject {
                if !value.is_empty() {
                    out.capture.fields.entry(name.clone()).or_insert_with(|| value.into_owned());
                }
            }
            capture_references(&cond.matcher, scope, out);
        }
        matched
    }

    fn eval_wildcard(&self, cond: &WildcardCond, record: &Record, out: &mut Outcome) -> bool {
        let scope = Scope::top(record);
        let mut hits: Vec<(String, String)> = Vec::new();

        for (name, value) in record.all_fields() {
            if self.match_value(&cond.matcher, &value, scope, out) {
                hits.push((name.into_owned(), value.into_owned()));
                if !self.options.exhaustive {
                    break;
                }
            }
        }

        let matched = hits.is_empty() == cond.negated;
        if matched {
            for (name, value) in hits {
                out.capture.fields.entry(name).or_insert(value);
            }
            capture_references(&cond.matcher, scope, out);
        }
        matched
    }

    /// Test `value` against `matcher`. An empty value fails every matcher but
    /// the empty check.
    fn match_value(&self, matcher: &Matcher, value: &str, scope: Scope<'_>, out: &mut Outcome) -> bool {
        if let Matcher::Empty = matcher {
            return value.is_empty();
        }
        if value.is_empty() {
            return false;
        }

        match matcher {
            Matcher::Empty => false,
            Matcher::Contains(template) => {
                let operand = self.render(template, scope, out);
                !operand.is_empty() && value.contains(operand.as_str())
            }
            Matcher::Equals(template) => {
                let operand = self.render(template, scope, out);
                let operand = operand.trim();
                !operand.is_empty() && value.trim() == operand
            }
            Matcher::Regex(pattern) => match &pattern.compiled {
                Some(Ok(re)) => re.is_match(value),
                Some(Err(_)) => {
                    out.warnings.regex_fallbacks += 1;
                    let literal = self.render(&pattern.template, scope, out);
                    value.contains(literal.as_str())
                }
                None => {
                    let source = self.render(&pattern.template, scope, out);
                    match Regex::new(&source) {
                        Ok(re) => re.is_match(value),
                        Err(e) => {
                            debug!("regular expression '{}' does not compile, matching as text: {}", source, e);
                            out.warnings.regex_fallbacks += 1;
                            value.contains(source.as_str())
                        }
                    }
                }
            },
            Matcher::Compare(op, template) => {
                let operand = self.render(template, scope, out);
                compare::compare(*op, value, &operand)
            }
        }
    }

    /// Substitute references into an operand
    fn render(&self, template: &Template, scope: Scope<'_>, out: &mut Outcome) -> String {
        let mut rendered = String::new();
        for segment in template.segments() {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Field(name) => match scope.current.field(name) {
                    Some(value) => rendered.push_str(&value),
                    None => out.warnings.missing_references += 1,
                },
                Segment::Source(name) => match scope.source.and_then(|s| s.field(name)) {
                    Some(value) => rendered.push_str(&value),
                    None => out.warnings.missing_references += 1,
                },
                Segment::Count(count) => {
                    let n = self.count(count, scope, out);
                    rendered.push_str(&n.to_string());
                }
            }
        }
        rendered
    }

    // ========================================================================
    // Counts
    // ========================================================================

    /// Number of linked entities of one kind, regardless of any nested
    /// conditions. Unresolvable names and unloaded relation targets count zero.
    fn count(&self, count: &CountRef, scope: Scope<'_>, out: &mut Outcome) -> usize {
        let Some(owner) = scope.owner else {
            out.warnings.missing_references += 1;
            return 0;
        };
        let n = match count {
            CountRef::Relation(name) => match codes::resolve_relation(owner.subject_type(), name) {
                Some(code) => self
                    .indices
                    .relations
                    .as_ref()
                    .map_or(0, |index| index.edges(owner.id(), code).count()),
                None => {
                    out.warnings.unresolved_names += 1;
                    0
                }
            },
            CountRef::Staff(position) => match codes::resolve_position(owner.subject_type(), position) {
                Some(code) => self
                    .indices
                    .staff
                    .as_ref()
                    .map_or(0, |index| index.assignments(owner.id(), code).count()),
                None => {
                    out.warnings.unresolved_names += 1;
                    0
                }
            },
            CountRef::Episodes => self.indices.episodes.as_ref().map_or(0, |index| index.of(owner.id()).len()),
        };

        if scope.is_top() {
            out.capture.counts.insert(count.label(), n);
        }
        n
    }

    // ========================================================================
    // Link conditions
    // ========================================================================

    fn eval_relation(&self, cond: &RelationCond, record: &Record, out: &mut Outcome) -> bool {
        let Some(code) = codes::resolve_relation(record.subject_type(), &cond.name) else {
            out.warnings.unresolved_names += 1;
            return cond.link.negated;
        };
        let edges = self
            .indices
            .relations
            .as_ref()
            .map(|index| index.edges(record.id(), code).collect::<Vec<_>>())
            .unwrap_or_default();

        let needs_targets = !cond.link.negated && !cond.link.nested.is_empty();
        let mut linked = Vec::with_capacity(edges.len());
        for edge in edges {
            let target = if needs_targets {
                self.records.and_then(|records| records.get(edge.target))
            } else {
                None
            };
            match target {
                Some(target) => linked.push(Linked { id: edge.target, entity: target, owner: Some(target) }),
                None => {
                    if needs_targets {
                        debug!(source = record.id(), target = edge.target, "relation target not loaded");
                        out.warnings.missing_targets += 1;
                    }
                    linked.push(Linked { id: edge.target, entity: &Blank, owner: None });
                }
            }
        }

        let (matched, ids) = self.eval_link(&cond.link, &linked, record, out);
        if matched && !cond.link.negated {
            extend_unique(out.capture.relations.entry(cond.name.clone()).or_default(), ids);
        }
        matched
    }

    fn eval_staff(&self, cond: &StaffCond, record: &Record, out: &mut Outcome) -> bool {
        let Some(code) = codes::resolve_position(record.subject_type(), &cond.position) else {
            out.warnings.unresolved_names += 1;
            return cond.link.negated;
        };
        let linked: Vec<Linked<'_>> = self
            .indices
            .staff
            .as_ref()
            .map(|index| {
                index
                    .assignments(record.id(), code)
                    .map(|a| Linked { id: a.person, entity: a, owner: Some(record) })
                    .collect()
            })
            .unwrap_or_default();

        let (matched, ids) = self.eval_link(&cond.link, &linked, record, out);
        if matched && !cond.link.negated {
            extend_unique(out.capture.staff.entry(cond.position.clone()).or_default(), ids);
        }
        matched
    }

    fn eval_episodes(&self, cond: &EpisodeCond, record: &Record, out: &mut Outcome) -> bool {
        let linked: Vec<Linked<'_>> = self
            .indices
            .episodes
            .as_ref()
            .map(|index| {
                index
                    .of(record.id())
                    .iter()
                    .map(|e| Linked { id: e.id, entity: e, owner: Some(record) })
                    .collect()
            })
            .unwrap_or_default();

        let (matched, ids) = self.eval_link(&cond.link, &linked, record, out);
        if matched && !cond.link.negated {
            extend_unique(&mut out.capture.episodes, ids);
        }
        matched
    }

    /// Quantify nested conditions over linked entities. Returns the verdict
    /// and the ids of entities that satisfied every nested condition.
    fn eval_link(&self, link: &LinkCond, linked: &[Linked<'_>], record: &Record, out: &mut Outcome) -> (bool, Vec<u64>) {
        if link.negated {
            return (linked.is_empty(), Vec::new());
        }

        let full = self.options.exhaustive || link.nested.is_empty() || !link.count_checks.is_empty();
        let mut ids = Vec::new();
        let mut failed = false;

        for item in linked {
            let scope = Scope { current: item.entity, owner: item.owner, source: Some(record) };
            let ok = link.nested.iter().all(|cond| self.eval_field(cond, scope, out));
            if ok {
                ids.push(item.id);
                if link.mode == MatchMode::Any && !full {
                    break;
                }
            } else {
                failed = true;
                if link.mode == MatchMode::All && !full {
                    break;
                }
            }
        }

        if !link.count_checks.is_empty() {
            let n = ids.len().to_string();
            let scope = Scope::top(record);
            let matched = link
                .count_checks
                .iter()
                .all(|check| self.match_value(&check.matcher, &n, scope, out) != check.negated);
            return (matched, ids);
        }

        let matched = match link.mode {
            MatchMode::Any => !ids.is_empty(),
            MatchMode::All => !linked.is_empty() && !failed,
        };
        (matched, ids)
    }
}

fn eval_tag(cond: &TagCond, record: &Record, out: &mut Outcome) -> bool {
    let set = match cond.kind {
        TagKind::Tag => record.tags(),
        TagKind::MetaTag => record.meta_tags(),
    };
    let matched = set.contains(&cond.name) != cond.negated;
    if matched && !cond.negated {
        let captured = match cond.kind {
            TagKind::Tag => &mut out.capture.tags,
            TagKind::MetaTag => &mut out.capture.meta_tags,
        };
        extend_unique(captured, vec![cond.name.clone()]);
    }
    matched
}

/// Record the values of `{{field}}` references so reports can show what an
/// operand was compared against
fn capture_references(matcher: &Matcher, scope: Scope<'_>, out: &mut Outcome) {
    let Some(template) = matcher.template() else {
        return;
    };
    for name in template.fields() {
        if let Some(value) = scope.current.field(name) {
            out.capture.fields.entry(name.to_string()).or_insert_with(|| value.into_owned());
        }
    }
}
