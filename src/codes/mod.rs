//! Type-scoped relation and staff-position tables
//!
//! The archive reuses the same numeric code space for every subject type, so
//! a relation or position name is only ever resolved against the table of the
//! owning subject's type. A name missing from that table means the relation
//! does not apply to the subject; it is never looked up in another type's
//! table.

mod positions;
mod relations;

use crate::model::SubjectType;

/// Which code space a table belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeKind {
    Relation,
    Position,
}

/// Read-only name <-> code table for one subject type
#[derive(Clone, Copy, Debug)]
pub struct CodeTable {
    subject_type: SubjectType,
    kind: CodeKind,
    entries: &'static [(u32, &'static str)],
}

impl CodeTable {
    pub fn relations(subject_type: SubjectType) -> Self {
        let entries = match subject_type {
            SubjectType::Book => relations::BOOK,
            SubjectType::Anime => relations::ANIME,
            SubjectType::Music => relations::MUSIC,
            SubjectType::Game => relations::GAME,
            SubjectType::LiveAction => relations::LIVE_ACTION,
        };
        CodeTable { subject_type, kind: CodeKind::Relation, entries }
    }

    pub fn positions(subject_type: SubjectType) -> Self {
        let entries = match subject_type {
            SubjectType::Book => positions::BOOK,
            SubjectType::Anime => positions::ANIME,
            SubjectType::Music => positions::MUSIC,
            SubjectType::Game => positions::GAME,
            SubjectType::LiveAction => positions::LIVE_ACTION,
        };
        CodeTable { subject_type, kind: CodeKind::Position, entries }
    }

    pub fn of(kind: CodeKind, subject_type: SubjectType) -> Self {
        match kind {
            CodeKind::Relation => Self::relations(subject_type),
            CodeKind::Position => Self::positions(subject_type),
        }
    }

    pub fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    pub fn kind(&self) -> CodeKind {
        self.kind
    }

    /// Resolve a name (or its decimal code) within this table
    pub fn code(&self, name: &str) -> Option<u32> {
        let name = name.trim();
        if let Ok(code) = name.parse::<u32>() {
            return self.entries.iter().find(|(c, _)| *c == code).map(|(c, _)| *c);
        }
        self.entries
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(c, _)| *c)
    }

    /// Canonical (first listed) name of a code
    pub fn name(&self, code: u32) -> Option<&'static str> {
        self.entries.iter().find(|(c, _)| *c == code).map(|(_, n)| *n)
    }

    /// All entries, aliases included
    pub fn entries(&self) -> &'static [(u32, &'static str)] {
        self.entries
    }
}

pub fn resolve_relation(subject_type: SubjectType, name: &str) -> Option<u32> {
    CodeTable::relations(subject_type).code(name)
}

pub fn resolve_position(subject_type: SubjectType, name: &str) -> Option<u32> {
    CodeTable::positions(subject_type).code(name)
}

pub fn relation_name(subject_type: SubjectType, code: u32) -> Option<&'static str> {
    CodeTable::relations(subject_type).name(code)
}

pub fn position_name(subject_type: SubjectType, code: u32) -> Option<&'static str> {
    CodeTable::positions(subject_type).name(code)
}

/// Whether any type's table knows this name. Used at parse time, before a
/// subject type is known.
pub fn is_known(kind: CodeKind, name: &str) -> bool {
    SubjectType::ALL
        .iter()
        .any(|t| CodeTable::of(kind, *t).code(name).is_some())
}

/// Canonical name of `name` under `subject_type`, if it resolves there
pub fn canonical_name(kind: CodeKind, subject_type: SubjectType, name: &str) -> Option<&'static str> {
    let table = CodeTable::of(kind, subject_type);
    table.code(name).and_then(|code| table.name(code))
}
