//! Record and linked-entity model

pub mod annex;

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

pub use annex::Annex;

/// Subject type, with the numeric codes used by the archive dump
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SubjectType {
    Book,
    Anime,
    Music,
    Game,
    LiveAction,
}

impl SubjectType {
    pub const ALL: [SubjectType; 5] = [
        SubjectType::Book,
        SubjectType::Anime,
        SubjectType::Music,
        SubjectType::Game,
        SubjectType::LiveAction,
    ];

    pub fn code(self) -> u8 {
        match self {
            SubjectType::Book => 1,
            SubjectType::Anime => 2,
            SubjectType::Music => 3,
            SubjectType::Game => 4,
            SubjectType::LiveAction => 6,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(SubjectType::Book),
            2 => Some(SubjectType::Anime),
            3 => Some(SubjectType::Music),
            4 => Some(SubjectType::Game),
            6 => Some(SubjectType::LiveAction),
            _ => None,
        }
    }

    /// Recognize a type by Chinese display name, English name, or numeric code
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Ok(code) = name.parse::<u64>() {
            return Self::from_code(code);
        }
        match name.to_ascii_lowercase().as_str() {
            "书籍" | "book" => Some(SubjectType::Book),
            "动画" | "anime" => Some(SubjectType::Anime),
            "音乐" | "music" => Some(SubjectType::Music),
            "游戏" | "game" => Some(SubjectType::Game),
            "三次元" | "real" | "live-action" | "liveaction" => Some(SubjectType::LiveAction),
            _ => None,
        }
    }

    /// Chinese display name
    pub fn display_name(self) -> &'static str {
        match self {
            SubjectType::Book => "书籍",
            SubjectType::Anime => "动画",
            SubjectType::Music => "音乐",
            SubjectType::Game => "游戏",
            SubjectType::LiveAction => "三次元",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl From<SubjectType> for u8 {
    fn from(t: SubjectType) -> u8 {
        t.code()
    }
}

impl TryFrom<u8> for SubjectType {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        SubjectType::from_code(u64::from(code)).ok_or_else(|| format!("unknown subject type {}", code))
    }
}

/// Anything a field condition can be evaluated against.
///
/// Absent fields are `None`; the evaluator treats them as the empty string.
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// A catalog subject
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: u64,
    subject_type: SubjectType,
    fields: BTreeMap<String, String>,
    annex: Annex,
    tags: BTreeSet<String>,
    meta_tags: BTreeSet<String>,
}

impl Record {
    pub fn new(id: u64, subject_type: SubjectType) -> Self {
        Record {
            id,
            subject_type,
            fields: BTreeMap::new(),
            annex: Annex::default(),
            tags: BTreeSet::new(),
            meta_tags: BTreeSet::new(),
        }
    }

    pub fn field_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn annex(mut self, text: &str) -> Self {
        self.annex = Annex::parse(text);
        self
    }

    pub fn tag(mut self, name: impl Into<String>) -> Self {
        self.tags.insert(name.into());
        self
    }

    pub fn meta_tag(mut self, name: impl Into<String>) -> Self {
        self.meta_tags.insert(name.into());
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn meta_tags(&self) -> &BTreeSet<String> {
        &self.meta_tags
    }

    pub fn annex_entries(&self) -> &Annex {
        &self.annex
    }

    /// Every field of the record: `id`, `type`, direct attributes, then annex
    /// entries. A name may appear twice if both tiers carry it.
    pub fn all_fields(&self) -> impl Iterator<Item = (Cow<'_, str>, Cow<'_, str>)> {
        let builtin = [
            (Cow::Borrowed("id"), Cow::Owned(self.id.to_string())),
            (Cow::Borrowed("type"), Cow::Owned(self.subject_type.code().to_string())),
        ];
        builtin
            .into_iter()
            .chain(
                self.fields
                    .iter()
                    .map(|(k, v)| (Cow::Borrowed(k.as_str()), Cow::Borrowed(v.as_str()))),
            )
            .chain(
                self.annex
                    .entries()
                    .map(|(k, v)| (Cow::Borrowed(k), Cow::Borrowed(v))),
            )
    }

    /// Canonical subject page
    pub fn url(&self) -> String {
        subject_url(self.id)
    }
}

pub fn subject_url(id: u64) -> String {
    format!("https://bgm.tv/subject/{}", id)
}

impl FieldSource for Record {
    /// Direct attributes first, then the annex
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "id" => return Some(Cow::Owned(self.id.to_string())),
            "type" => return Some(Cow::Owned(self.subject_type.code().to_string())),
            _ => {}
        }
        if let Some(value) = self.fields.get(name) {
            return Some(Cow::Borrowed(value.as_str()));
        }
        self.annex.get(name).map(Cow::Borrowed)
    }
}

/// Directed, type-coded link between two subjects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub source: u64,
    pub target: u64,
    /// Meaningful only under the source subject's type
    pub code: u32,
    #[serde(default)]
    pub ordinal: u32,
}

/// Person credited on a subject under a type-coded position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffAssignment {
    pub subject: u64,
    pub position: u32,
    pub person: u64,
    /// Auxiliary fields such as `appear_eps`
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl FieldSource for StaffAssignment {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "person_id" | "person" => Some(Cow::Owned(self.person.to_string())),
            "subject_id" => Some(Cow::Owned(self.subject.to_string())),
            "position" => Some(Cow::Owned(self.position.to_string())),
            _ => self.extra.get(name).map(|v| Cow::Borrowed(v.as_str())),
        }
    }
}

/// Episode of a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub subject: u64,
    pub id: u64,
    /// Auxiliary fields such as `name`, `airdate`, `sort`
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl FieldSource for Episode {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "id" => Some(Cow::Owned(self.id.to_string())),
            "subject_id" => Some(Cow::Owned(self.subject.to_string())),
            _ => self.extra.get(name).map(|v| Cow::Borrowed(v.as_str())),
        }
    }
}

/// Stand-in for a relation target missing from the record store
pub(crate) struct Blank;

impl FieldSource for Blank {
    fn field(&self, _name: &str) -> Option<Cow<'_, str>> {
        None
    }
}
