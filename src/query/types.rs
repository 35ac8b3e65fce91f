//! Condition tree: Template, Matcher, FieldCond, link conditions, Query

use regex::Regex;

/// Aggregate operand: number of linked entities of one kind
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CountRef {
    /// `{{count:单行本}}`
    Relation(String),
    /// `{{count:staff:作者}}`
    Staff(String),
    /// `{{count:ep}}`
    Episodes,
}

impl CountRef {
    /// Key under which the resolved count is reported
    pub fn label(&self) -> String {
        match self {
            CountRef::Relation(name) => name.clone(),
            CountRef::Staff(position) => format!("staff:{}", position),
            CountRef::Episodes => "ep".to_string(),
        }
    }
}

/// A piece of an operand
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// `{{field}}` - field of the entity being tested
    Field(String),
    /// `{{{field}}}` - field of the source subject of a link condition
    Source(String),
    /// `{{count:...}}`
    Count(CountRef),
}

/// Operand text with embedded references, resolved per evaluation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn new(segments: Vec<Segment>) -> Self {
        Template { segments }
    }

    pub fn literal(text: &str) -> Self {
        if text.is_empty() {
            return Template::default();
        }
        Template { segments: vec![Segment::Text(text.to_string())] }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Text of a template without references
    pub fn as_literal(&self) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                _ => return None,
            }
        }
        Some(out)
    }

    /// True if the whole template is one `{{field}}` or `{{{field}}}`
    pub fn is_single_reference(&self) -> bool {
        matches!(self.segments.as_slice(), [Segment::Field(_)] | [Segment::Source(_)])
    }

    pub fn has_count(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Count(_)))
    }

    pub fn has_source(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Source(_)))
    }

    /// Names of `{{field}}` references
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn counts(&self) -> impl Iterator<Item = &CountRef> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Count(c) => Some(c),
            _ => None,
        })
    }
}

/// Ordering comparisons
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// `大于:` numeric
    Greater,
    /// `小于:` numeric
    Less,
    /// `早于:` date
    Before,
    /// `晚于:` date
    After,
}

impl Comparison {
    pub fn is_date(self) -> bool {
        matches!(self, Comparison::Before | Comparison::After)
    }
}

/// Regular expression operand. Patterns without references are compiled once
/// at parse time; `compiled` keeps the compile error so evaluation can fall
/// back to a substring match.
#[derive(Clone, Debug)]
pub struct Pattern {
    pub template: Template,
    pub compiled: Option<Result<Regex, String>>,
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

/// How a value is tested
#[derive(Clone, Debug, PartialEq)]
pub enum Matcher {
    /// Value is the empty string
    Empty,
    Contains(Template),
    Equals(Template),
    Regex(Pattern),
    Compare(Comparison, Template),
}

impl Matcher {
    pub fn template(&self) -> Option<&Template> {
        match self {
            Matcher::Empty => None,
            Matcher::Contains(t) | Matcher::Equals(t) | Matcher::Compare(_, t) => Some(t),
            Matcher::Regex(p) => Some(&p.template),
        }
    }
}

/// Left-hand side of a field condition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subject {
    Field(String),
    Count(CountRef),
}

/// `field:value`
#[derive(Clone, Debug, PartialEq)]
pub struct FieldCond {
    pub subject: Subject,
    pub matcher: Matcher,
    pub negated: bool,
}

impl FieldCond {
    pub fn new(field: &str, matcher: Matcher) -> Self {
        FieldCond { subject: Subject::Field(field.to_string()), matcher, negated: false }
    }

    pub fn has_count(&self) -> bool {
        matches!(self.subject, Subject::Count(_))
            || self.matcher.template().is_some_and(Template::has_count)
    }

    pub fn has_source(&self) -> bool {
        self.matcher.template().is_some_and(Template::has_source)
    }

    fn counts(&self) -> impl Iterator<Item = &CountRef> {
        let lhs = match &self.subject {
            Subject::Count(c) => Some(c),
            Subject::Field(_) => None,
        };
        lhs.into_iter()
            .chain(self.matcher.template().into_iter().flat_map(|t| t.counts()))
    }
}

/// `*:value`
#[derive(Clone, Debug, PartialEq)]
pub struct WildcardCond {
    pub matcher: Matcher,
    pub negated: bool,
    /// `{{field}}` references found in the value, reported alongside matches
    pub referenced: Vec<String>,
}

/// Quantifier over linked entities
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchMode {
    #[default]
    Any,
    All,
}

/// `count:...` inside a link condition: tests the number of linked entities
/// that satisfy the other nested conditions
#[derive(Clone, Debug, PartialEq)]
pub struct CountCheck {
    pub matcher: Matcher,
    pub negated: bool,
}

/// Shared body of relation, staff and episode conditions
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkCond {
    pub mode: MatchMode,
    /// Satisfied only when no entity of this kind exists; nested conditions
    /// are not evaluated
    pub negated: bool,
    pub nested: Vec<FieldCond>,
    pub count_checks: Vec<CountCheck>,
}

impl LinkCond {
    pub fn is_bare(&self) -> bool {
        self.nested.is_empty() && self.count_checks.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationCond {
    pub name: String,
    pub link: LinkCond,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StaffCond {
    pub position: String,
    pub link: LinkCond,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeCond {
    pub link: LinkCond,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagKind {
    Tag,
    MetaTag,
}

/// `tag:Name`, `meta_tag:!Name`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagCond {
    pub kind: TagKind,
    pub name: String,
    pub negated: bool,
}

/// One parsed query line (or block)
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Field(FieldCond),
    Wildcard(WildcardCond),
    Relation(RelationCond),
    Staff(StaffCond),
    Episode(EpisodeCond),
    Tag(TagCond),
}

impl Condition {
    /// Logical complement, where one exists without changing meaning:
    /// field conditions free of count references, tags, and link conditions
    /// with no nested conditions.
    pub fn negate(&self) -> Option<Condition> {
        match self {
            Condition::Field(f) if !f.has_count() => {
                let mut f = f.clone();
                f.negated = !f.negated;
                Some(Condition::Field(f))
            }
            Condition::Wildcard(w) => {
                let mut w = w.clone();
                w.negated = !w.negated;
                Some(Condition::Wildcard(w))
            }
            Condition::Tag(t) => {
                let mut t = t.clone();
                t.negated = !t.negated;
                Some(Condition::Tag(t))
            }
            Condition::Relation(r) if r.link.is_bare() => {
                let mut r = r.clone();
                r.link.negated = !r.link.negated;
                Some(Condition::Relation(r))
            }
            Condition::Staff(s) if s.link.is_bare() => {
                let mut s = s.clone();
                s.link.negated = !s.link.negated;
                Some(Condition::Staff(s))
            }
            Condition::Episode(e) if e.link.is_bare() => {
                let mut e = e.clone();
                e.link.negated = !e.link.negated;
                Some(Condition::Episode(e))
            }
            _ => None,
        }
    }

    fn field_conds(&self) -> Vec<&FieldCond> {
        match self {
            Condition::Field(f) => vec![f],
            Condition::Relation(RelationCond { link, .. })
            | Condition::Staff(StaffCond { link, .. })
            | Condition::Episode(EpisodeCond { link }) => link.nested.iter().collect(),
            Condition::Wildcard(_) | Condition::Tag(_) => vec![],
        }
    }

    fn count_refs(&self) -> Vec<&CountRef> {
        let mut refs: Vec<&CountRef> = self.field_conds().into_iter().flat_map(|f| f.counts()).collect();
        if let Condition::Wildcard(w) = self {
            refs.extend(w.matcher.template().into_iter().flat_map(|t| t.counts()));
        }
        if let Condition::Relation(RelationCond { link, .. })
        | Condition::Staff(StaffCond { link, .. })
        | Condition::Episode(EpisodeCond { link }) = self
        {
            for check in &link.count_checks {
                refs.extend(check.matcher.template().into_iter().flat_map(|t| t.counts()));
            }
        }
        refs
    }
}

/// What a query needs from the data layer before it can run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Requirements {
    pub relations: bool,
    pub staff: bool,
    pub episodes: bool,
    /// Related subjects must be addressable by id
    pub record_lookup: bool,
}

/// Report columns implied by a query, in query order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Columns {
    pub fields: Vec<String>,
    pub counts: Vec<String>,
    pub relations: Vec<String>,
    pub staff: Vec<String>,
    pub episodes: bool,
    pub tags: bool,
    pub meta_tags: bool,
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|x| x == item) {
        list.push(item.to_string());
    }
}

/// Top-level conditions, combined with AND
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    conditions: Vec<Condition>,
}

impl Query {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Query { conditions }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn requirements(&self) -> Requirements {
        let mut req = Requirements::default();
        for condition in &self.conditions {
            match condition {
                Condition::Relation(r) => {
                    req.relations = true;
                    if !r.link.negated && !r.link.nested.is_empty() {
                        req.record_lookup = true;
                    }
                }
                Condition::Staff(_) => req.staff = true,
                Condition::Episode(_) => req.episodes = true,
                _ => {}
            }
            for count in condition.count_refs() {
                match count {
                    CountRef::Relation(_) => req.relations = true,
                    CountRef::Staff(_) => req.staff = true,
                    CountRef::Episodes => req.episodes = true,
                }
            }
        }
        req
    }

    pub fn columns(&self) -> Columns {
        let mut columns = Columns::default();
        for condition in &self.conditions {
            match condition {
                Condition::Field(f) => {
                    if let Subject::Field(name) = &f.subject {
                        push_unique(&mut columns.fields, name);
                    }
                }
                Condition::Wildcard(w) => {
                    for name in &w.referenced {
                        push_unique(&mut columns.fields, name);
                    }
                }
                Condition::Relation(r) if !r.link.negated => push_unique(&mut columns.relations, &r.name),
                Condition::Staff(s) if !s.link.negated => push_unique(&mut columns.staff, &s.position),
                Condition::Episode(e) if !e.link.negated => columns.episodes = true,
                Condition::Tag(TagCond { kind: TagKind::Tag, negated: false, .. }) => columns.tags = true,
                Condition::Tag(TagCond { kind: TagKind::MetaTag, negated: false, .. }) => {
                    columns.meta_tags = true
                }
                _ => {}
            }
            for count in condition.count_refs() {
                push_unique(&mut columns.counts, &count.label());
            }
        }
        columns
    }
}
