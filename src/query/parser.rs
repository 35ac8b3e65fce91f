//! Query DSL parser
//!
//! One condition per line; lines are split at `:` outside `{{ ... }}`.
//!
//! - Field: `出版社:角川`, `名称:re:^魔法`, `页数:大于:300`, `发售日:晚于:2020年`,
//!   `册数:等于:{{count:单行本}}`, `中文名:{{name}}`, `作者:!某人`, `别名:`
//! - Count on the left: `{{count:单行本}}:大于:0`
//! - Wildcard: `*:角川`
//! - Relation: `单行本:发售日:晚于:2020-06-01`, `relation:单行本:all:出版社:角川`,
//!   `relation:!单行本`
//!
//!   A bare head naming a relation is read as a relation whenever its value
//!   holds another top-level `:`, so `其他:re:a:b` is the relation 其他, not
//!   the field 其他. `relation:` is the unambiguous form.
//! - Staff: `staff:作者`, `staff:!插图`, `staff:作者:count:大于:1`
//! - Episodes: `ep`, `ep:!`, `ep:all:airdate:晚于:2020`
//! - Tags: `tag:轻小说`, `meta_tag:!漫画`
//! - Type: `type:1`, `type:书籍`, `动画`
//!
//! Relation, staff and episode conditions also have a block form whose body
//! lines are nested field conditions; inside a block `{{{field}}}` refers to
//! the owning subject:
//!
//! ```text
//! 单行本:all {
//!     发售日:晚于:2020-06-01
//!     出版社:{{{出版社}}}
//! }
//! ```

use thiserror::Error;
use tracing::{debug, warn};

use regex::Regex;

use crate::codes::{self, CodeKind};
use crate::model::SubjectType;
use crate::query::compare;
use crate::query::types::*;

/// Parse error for one query line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message} (`{text}`)")]
pub struct ParseError {
    pub line: usize,
    pub text: String,
    pub message: String,
}

/// Conditions that parsed, plus one error per dropped condition
#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    pub query: Query,
    pub errors: Vec<ParseError>,
}

impl ParsedQuery {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    TopLevel,
    Nested,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkKind {
    Relation,
    Staff,
    Episodes,
}

#[derive(Debug)]
enum LinkTarget {
    Relation(String),
    Staff(String),
    Episodes,
}

#[derive(Debug)]
struct LinkHead {
    target: LinkTarget,
    negated: bool,
    mode: MatchMode,
}

enum NestedItem {
    Cond(FieldCond),
    Count(CountCheck),
}

const COMPARISONS: &[(&str, Comparison)] = &[
    ("大于:", Comparison::Greater),
    ("小于:", Comparison::Less),
    ("早于:", Comparison::Before),
    ("晚于:", Comparison::After),
    ("gt:", Comparison::Greater),
    ("lt:", Comparison::Less),
    ("before:", Comparison::Before),
    ("after:", Comparison::After),
];

const EQUALS: &[&str] = &["等于:", "eq:"];

/// Split at the first `:` that is not inside `{{ ... }}`
fn split_top(s: &str) -> Option<(&str, &str)> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"{{") {
            depth += 1;
            i += 2;
        } else if depth > 0 && bytes[i..].starts_with(b"}}") {
            depth -= 1;
            i += 2;
        } else if depth == 0 && bytes[i] == b':' {
            return Some((&s[..i], &s[i + 1..]));
        } else {
            i += 1;
        }
    }
    None
}

fn strip_bang(s: &str) -> (bool, &str) {
    match s.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, s),
    }
}

fn parse_mode(s: &str) -> Option<MatchMode> {
    match s.trim() {
        "all" => Some(MatchMode::All),
        "any" => Some(MatchMode::Any),
        _ => None,
    }
}

/// A bare name usable as relation shorthand: known somewhere, not a number
fn is_relation_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with("{{")
        && name.parse::<u32>().is_err()
        && codes::is_known(CodeKind::Relation, name)
}

/// Parser state for one line
struct Parser<'a> {
    text: &'a str,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Parser { text, line }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            text: self.text.to_string(),
            message: message.into(),
        }
    }

    fn parse_condition(&self) -> Result<Condition, ParseError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(self.error("empty condition"));
        }

        let Some((head, rest)) = split_top(text) else {
            return self.parse_bare(text);
        };
        let head = head.trim();
        let rest = rest.trim();

        match head {
            "*" => self.parse_wildcard(rest).map(Condition::Wildcard),
            "tag" => self.parse_tag(TagKind::Tag, rest).map(Condition::Tag),
            "meta_tag" => self.parse_tag(TagKind::MetaTag, rest).map(Condition::Tag),
            "type" if !rest.contains("{{") => self.parse_type(rest).map(Condition::Field),
            "relation" => self.parse_link_line(LinkKind::Relation, rest),
            "staff" => self.parse_link_line(LinkKind::Staff, rest),
            "ep" => self.parse_link_line(LinkKind::Episodes, rest),
            name if is_relation_name(name) && split_top(rest).is_some() => {
                debug!(line = self.line, relation = name, "bare head read as a relation condition");
                self.parse_link_line(LinkKind::Relation, text)
            }
            _ => self
                .parse_field(head, rest, Scope::TopLevel)
                .map(Condition::Field),
        }
    }

    /// A line without any top-level `:`
    fn parse_bare(&self, text: &str) -> Result<Condition, ParseError> {
        if text == "ep" {
            return self.parse_link_line(LinkKind::Episodes, "");
        }
        if let Some(subject_type) = SubjectType::from_name(text) {
            return Ok(Condition::Field(type_condition(subject_type, false)));
        }
        if is_relation_name(text) {
            return self.parse_link_line(LinkKind::Relation, text);
        }
        Err(self.error("expected `field:value`"))
    }

    fn parse_type(&self, rest: &str) -> Result<FieldCond, ParseError> {
        let (negated, name) = strip_bang(rest);
        SubjectType::from_name(name)
            .map(|t| type_condition(t, negated))
            .ok_or_else(|| self.error(format!("unknown subject type '{}'", name)))
    }

    fn parse_tag(&self, kind: TagKind, rest: &str) -> Result<TagCond, ParseError> {
        let (negated, name) = strip_bang(rest);
        if name.is_empty() {
            return Err(self.error("missing tag name"));
        }
        Ok(TagCond { kind, name: name.to_string(), negated })
    }

    fn parse_wildcard(&self, rest: &str) -> Result<WildcardCond, ParseError> {
        let (negated, value) = strip_bang(rest);
        let matcher = self.parse_matcher(value)?;
        let template = matcher.template();
        if template.is_some_and(Template::has_source) {
            return Err(self.error("`{{{field}}}` is only valid inside relation, staff or episode conditions"));
        }
        let mut referenced: Vec<String> = Vec::new();
        for name in template.into_iter().flat_map(|t| t.fields()) {
            if !referenced.iter().any(|r| r == name) {
                referenced.push(name.to_string());
            }
        }
        Ok(WildcardCond { matcher, negated, referenced })
    }

    fn parse_field(&self, head: &str, value: &str, scope: Scope) -> Result<FieldCond, ParseError> {
        let head = head.trim();
        if head.is_empty() {
            return Err(self.error("missing field name"));
        }

        let subject = if head.starts_with("{{") {
            match self.parse_template(head)?.segments() {
                [Segment::Count(count)] => Subject::Count(count.clone()),
                _ => return Err(self.error("only a `{{count:...}}` reference may stand in for a field name")),
            }
        } else {
            Subject::Field(head.to_string())
        };

        let (negated, value) = strip_bang(value.trim());
        let matcher = self.parse_matcher(value)?;

        if scope == Scope::TopLevel && matcher.template().is_some_and(Template::has_source) {
            return Err(self.error("`{{{field}}}` is only valid inside relation, staff or episode conditions"));
        }

        Ok(FieldCond { subject, matcher, negated })
    }

    fn parse_matcher(&self, value: &str) -> Result<Matcher, ParseError> {
        if value.is_empty() {
            return Ok(Matcher::Empty);
        }

        for (prefix, op) in COMPARISONS {
            if let Some(operand) = value.strip_prefix(prefix) {
                let template = self.parse_template(operand.trim())?;
                if let Some(literal) = template.as_literal() {
                    compare::validate_operand(*op, &literal).map_err(|e| self.error(e))?;
                }
                return Ok(Matcher::Compare(*op, template));
            }
        }

        for prefix in EQUALS {
            if let Some(operand) = value.strip_prefix(prefix) {
                let template = self.parse_template(operand.trim())?;
                if template.segments().is_empty() {
                    return Ok(Matcher::Empty);
                }
                return Ok(Matcher::Equals(template));
            }
        }

        if let Some(pattern) = value.strip_prefix("re:") {
            let template = self.parse_template(pattern)?;
            let compiled = template.as_literal().map(|source| {
                Regex::new(&source).map_err(|e| {
                    warn!(line = self.line, "invalid regular expression '{}', matching it as text: {}", source, e);
                    e.to_string()
                })
            });
            return Ok(Matcher::Regex(Pattern { template, compiled }));
        }

        let template = self.parse_template(value)?;
        if template.is_single_reference() {
            Ok(Matcher::Equals(template))
        } else {
            Ok(Matcher::Contains(template))
        }
    }

    fn parse_template(&self, s: &str) -> Result<Template, ParseError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = s;

        while let Some(start) = rest.find("{{") {
            text.push_str(&rest[..start]);
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }

            let open = &rest[start..];
            if let Some(inner) = open.strip_prefix("{{{") {
                let end = inner
                    .find("}}}")
                    .ok_or_else(|| self.error("unterminated `{{{`"))?;
                let name = inner[..end].trim();
                if name.is_empty() {
                    return Err(self.error("empty `{{{}}}` reference"));
                }
                segments.push(Segment::Source(name.to_string()));
                rest = &inner[end + 3..];
            } else {
                let inner = &open[2..];
                let end = inner
                    .find("}}")
                    .ok_or_else(|| self.error("unterminated `{{`"))?;
                segments.push(self.parse_reference(inner[..end].trim())?);
                rest = &inner[end + 2..];
            }
        }

        text.push_str(rest);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(Template::new(segments))
    }

    /// Inside `{{ }}`: `count:...` or a field name
    fn parse_reference(&self, inner: &str) -> Result<Segment, ParseError> {
        if inner.is_empty() {
            return Err(self.error("empty `{{}}` reference"));
        }
        match inner.strip_prefix("count:") {
            Some(target) => self.parse_count_ref(target.trim()).map(Segment::Count),
            None => Ok(Segment::Field(inner.to_string())),
        }
    }

    fn parse_count_ref(&self, target: &str) -> Result<CountRef, ParseError> {
        match target {
            "ep" | "episode" | "episodes" => return Ok(CountRef::Episodes),
            _ => {}
        }
        if let Some(position) = target.strip_prefix("staff:") {
            let position = position.trim();
            if !codes::is_known(CodeKind::Position, position) {
                return Err(self.error(format!("unknown staff position '{}'", position)));
            }
            return Ok(CountRef::Staff(position.to_string()));
        }
        if !codes::is_known(CodeKind::Relation, target) {
            return Err(self.error(format!("unknown relation '{}'", target)));
        }
        Ok(CountRef::Relation(target.to_string()))
    }

    /// Link head from the text after `relation:` / `staff:` / `ep:` (or the
    /// whole line for the bare relation form). Returns the inline nested
    /// condition, if any.
    fn parse_link_head<'t>(&self, kind: LinkKind, rest: &'t str) -> Result<(LinkHead, Option<&'t str>), ParseError> {
        let (target, negated, tail) = match kind {
            LinkKind::Relation | LinkKind::Staff => {
                let (name, tail) = match split_top(rest) {
                    Some((name, tail)) => (name.trim(), Some(tail.trim())),
                    None => (rest.trim(), None),
                };
                let (negated, name) = strip_bang(name);
                if name.is_empty() {
                    return Err(self.error("missing relation or position name"));
                }
                let target = if kind == LinkKind::Relation {
                    if !codes::is_known(CodeKind::Relation, name) {
                        return Err(self.error(format!("unknown relation '{}'", name)));
                    }
                    LinkTarget::Relation(name.to_string())
                } else {
                    if !codes::is_known(CodeKind::Position, name) {
                        return Err(self.error(format!("unknown staff position '{}'", name)));
                    }
                    LinkTarget::Staff(name.to_string())
                };
                (target, negated, tail)
            }
            LinkKind::Episodes => {
                let rest = rest.trim();
                match rest {
                    "" => (LinkTarget::Episodes, false, None),
                    "!" => (LinkTarget::Episodes, true, None),
                    _ => (LinkTarget::Episodes, false, Some(rest)),
                }
            }
        };

        let (mode, nested) = match tail {
            None | Some("") => (MatchMode::Any, None),
            Some(tail) => match split_top(tail) {
                Some((first, after)) if parse_mode(first).is_some() => {
                    (parse_mode(first).unwrap_or_default(), Some(after.trim()))
                }
                _ => match parse_mode(tail) {
                    Some(mode) => (mode, None),
                    None => (MatchMode::Any, Some(tail)),
                },
            },
        };

        if negated && nested.is_some_and(|n| !n.is_empty()) {
            return Err(self.error("a negated link condition takes no nested condition"));
        }

        Ok((LinkHead { target, negated, mode }, nested.filter(|n| !n.is_empty())))
    }

    fn parse_link_line(&self, kind: LinkKind, rest: &str) -> Result<Condition, ParseError> {
        let (head, nested) = self.parse_link_head(kind, rest)?;
        let items = match nested {
            Some(line) => vec![self.parse_nested_in(line)?],
            None => vec![],
        };
        Ok(assemble(head, items))
    }

    /// `name[:mode]` followed by `{`; `None` if the text is not a link head
    fn parse_block_header(&self, header: &str) -> Option<Result<LinkHead, ParseError>> {
        let header = header.trim();
        let (first, rest) = match split_top(header) {
            Some((first, rest)) => (first.trim(), rest),
            None => (header, ""),
        };
        let parsed = match first {
            "relation" => self.parse_link_head(LinkKind::Relation, rest),
            "staff" => self.parse_link_head(LinkKind::Staff, rest),
            "ep" => self.parse_link_head(LinkKind::Episodes, rest),
            name if is_relation_name(name) => self.parse_link_head(LinkKind::Relation, header),
            _ => return None,
        };
        Some(parsed.and_then(|(head, nested)| match nested {
            Some(_) => Err(self.error("a block header cannot carry an inline condition")),
            None => Ok(head),
        }))
    }

    fn parse_nested(&self) -> Result<NestedItem, ParseError> {
        self.parse_nested_in(self.text.trim())
    }

    fn parse_nested_in(&self, text: &str) -> Result<NestedItem, ParseError> {
        let Some((head, value)) = split_top(text) else {
            return Err(self.error("expected nested `field:value`"));
        };
        match head.trim() {
            "count" => {
                let (negated, value) = strip_bang(value.trim());
                let matcher = self.parse_matcher(value)?;
                Ok(NestedItem::Count(CountCheck { matcher, negated }))
            }
            "*" => Err(self.error("wildcard conditions cannot be nested")),
            _ => self.parse_field(head, value, Scope::Nested).map(NestedItem::Cond),
        }
    }
}

fn type_condition(subject_type: SubjectType, negated: bool) -> FieldCond {
    FieldCond {
        subject: Subject::Field("type".to_string()),
        matcher: Matcher::Equals(Template::literal(&subject_type.code().to_string())),
        negated,
    }
}

fn assemble(head: LinkHead, items: Vec<NestedItem>) -> Condition {
    let mut link = LinkCond { mode: head.mode, negated: head.negated, ..LinkCond::default() };
    for item in items {
        match item {
            NestedItem::Cond(cond) => link.nested.push(cond),
            NestedItem::Count(check) => link.count_checks.push(check),
        }
    }
    match head.target {
        LinkTarget::Relation(name) => Condition::Relation(RelationCond { name, link }),
        LinkTarget::Staff(position) => Condition::Staff(StaffCond { position, link }),
        LinkTarget::Episodes => Condition::Episode(EpisodeCond { link }),
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a single condition line
pub fn parse(line: &str) -> Result<Condition, ParseError> {
    Parser::new(line, 1).parse_condition()
}

/// Parse a whole query: one condition per line, block forms, blank lines and
/// `#` comments. A line that fails to parse drops only its own condition.
pub fn parse_query(text: &str) -> ParsedQuery {
    let mut conditions = Vec::new();
    let mut errors = Vec::new();
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

    while let Some((number, line)) = lines.next() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parser = Parser::new(line, number);

        if let Some(header) = line.strip_suffix('{') {
            if let Some(head) = parser.parse_block_header(header) {
                let mut items = Vec::new();
                let mut body_ok = true;
                let mut closed = false;

                for (body_number, body_line) in lines.by_ref() {
                    if body_line.is_empty() || body_line.starts_with('#') {
                        continue;
                    }
                    if body_line == "}" {
                        closed = true;
                        break;
                    }
                    match Parser::new(body_line, body_number).parse_nested() {
                        Ok(item) => items.push(item),
                        Err(e) => {
                            warn!("{}", e);
                            errors.push(e);
                            body_ok = false;
                        }
                    }
                }

                if !closed {
                    if let Err(e) = head {
                        warn!("{}", e);
                        errors.push(e);
                    }
                    let e = parser.error("block is not closed with `}`");
                    warn!("{}", e);
                    errors.push(e);
                    continue;
                }
                match head {
                    Ok(head) if head.negated && !items.is_empty() => {
                        let e = parser.error("a negated link condition takes no nested condition");
                        warn!("{}", e);
                        errors.push(e);
                    }
                    Ok(head) if body_ok => conditions.push(assemble(head, items)),
                    Ok(_) => warn!(line = number, "dropping block because a nested line failed"),
                    Err(e) => {
                        warn!("{}", e);
                        errors.push(e);
                    }
                }
                continue;
            }
        }

        match parser.parse_condition() {
            Ok(condition) => conditions.push(condition),
            Err(e) => {
                warn!("{}", e);
                errors.push(e);
            }
        }
    }

    debug!(conditions = conditions.len(), errors = errors.len(), "parsed query");
    ParsedQuery { query: Query::new(conditions), errors }
}
