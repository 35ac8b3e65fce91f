//! Line-delimited JSON loaders for the archive dump
//!
//! Every loader reads one JSON object per line. Lines that are not JSON
//! objects are skipped and counted as malformed; objects missing a required
//! key (or carrying an unknown subject type) are skipped and counted too.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::index::{Indices, LinkIndex, RecordStore};
use crate::model::annex::LIST_SEPARATOR;
use crate::model::{Episode, Record, RelationEdge, StaffAssignment, SubjectType};
use crate::query::Requirements;

/// Per-file load counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub loaded: usize,
    /// Not a JSON object
    pub malformed: usize,
    /// Valid JSON, but required keys are missing or invalid
    pub skipped: usize,
}

fn read_jsonl<R, T>(
    reader: R,
    mut convert: impl FnMut(Map<String, Value>) -> Option<T>,
    mut sink: impl FnMut(T),
) -> Result<LoadStats>
where
    R: BufRead,
{
    let mut stats = LoadStats::default();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => match convert(map) {
                Some(item) => {
                    sink(item);
                    stats.loaded += 1;
                }
                None => stats.skipped += 1,
            },
            _ => stats.malformed += 1,
        }
    }
    Ok(stats)
}

fn u64_field(map: &Map<String, Value>, key: &str) -> Option<u64> {
    match map.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn u32_field(map: &Map<String, Value>, key: &str) -> Option<u32> {
    u64_field(map, key).and_then(|n| u32::try_from(n).ok())
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Flatten a JSON value into string fields; nested objects become dotted keys
fn flatten(key: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar).collect();
            if !parts.is_empty() {
                out.push((key, parts.join(LIST_SEPARATOR)));
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                flatten(format!("{}.{}", key, k), v, out);
            }
        }
        other => {
            if let Some(s) = scalar(other) {
                out.push((key, s));
            }
        }
    }
}

fn extras(map: Map<String, Value>, skip: &[&str]) -> BTreeMap<String, String> {
    let mut flat = Vec::new();
    for (key, value) in map {
        if !skip.contains(&key.as_str()) {
            flatten(key, &value, &mut flat);
        }
    }
    flat.into_iter().collect()
}

/// `tags` entries are `{"name": ..., "count": ...}`; `meta_tags` are strings
fn tag_names(value: &Value) -> impl Iterator<Item = &str> {
    value.as_array().into_iter().flatten().filter_map(|tag| match tag {
        Value::String(s) => Some(s.as_str()),
        Value::Object(o) => o.get("name").and_then(Value::as_str),
        _ => None,
    })
}

fn subject_from_json(map: Map<String, Value>) -> Option<Record> {
    let id = u64_field(&map, "id").filter(|&id| id > 0)?;
    let subject_type = u64_field(&map, "type").and_then(SubjectType::from_code)?;

    let mut record = Record::new(id, subject_type);
    let mut flat = Vec::new();
    for (key, value) in map {
        match key.as_str() {
            "id" | "type" => {}
            "infobox" => {
                if let Some(text) = value.as_str() {
                    record = record.annex(text);
                }
            }
            "tags" => {
                for name in tag_names(&value) {
                    record = record.tag(name);
                }
            }
            "meta_tags" => {
                for name in tag_names(&value) {
                    record = record.meta_tag(name);
                }
            }
            _ => flatten(key, &value, &mut flat),
        }
    }
    for (key, value) in flat {
        record = record.field_value(key, value);
    }
    Some(record)
}

fn relation_from_json(map: Map<String, Value>) -> Option<RelationEdge> {
    Some(RelationEdge {
        source: u64_field(&map, "subject_id")?,
        target: u64_field(&map, "related_subject_id")?,
        code: u32_field(&map, "relation_type")?,
        ordinal: u32_field(&map, "order").unwrap_or(0),
    })
}

fn staff_from_json(map: Map<String, Value>) -> Option<StaffAssignment> {
    let subject = u64_field(&map, "subject_id")?;
    let person = u64_field(&map, "person_id")?;
    let position = u32_field(&map, "position")?;
    let extra = extras(map, &["subject_id", "person_id", "position"]);
    Some(StaffAssignment { subject, position, person, extra })
}

fn episode_from_json(map: Map<String, Value>) -> Option<Episode> {
    let id = u64_field(&map, "id")?;
    let subject = u64_field(&map, "subject_id")?;
    let extra = extras(map, &["id", "subject_id"]);
    Some(Episode { subject, id, extra })
}

// ============================================================================
// Readers
// ============================================================================

pub fn read_subjects<R: BufRead>(reader: R) -> Result<(RecordStore, LoadStats)> {
    let mut store = RecordStore::new();
    let stats = read_jsonl(reader, subject_from_json, |record| store.push(record))?;
    Ok((store, stats))
}

/// Relation edges, ordered by `order` within each source subject
pub fn read_relations<R: BufRead>(reader: R) -> Result<(LinkIndex<RelationEdge>, LoadStats)> {
    let mut index = LinkIndex::new();
    let stats = read_jsonl(reader, relation_from_json, |edge| index.insert(edge))?;
    index.sort_by_key(|edge| edge.ordinal);
    Ok((index, stats))
}

pub fn read_staff<R: BufRead>(reader: R) -> Result<(LinkIndex<StaffAssignment>, LoadStats)> {
    let mut index = LinkIndex::new();
    let stats = read_jsonl(reader, staff_from_json, |assignment| index.insert(assignment))?;
    Ok((index, stats))
}

pub fn read_episodes<R: BufRead>(reader: R) -> Result<(LinkIndex<Episode>, LoadStats)> {
    let mut index = LinkIndex::new();
    let stats = read_jsonl(reader, episode_from_json, |episode| index.insert(episode))?;
    Ok((index, stats))
}

fn load_file<T>(
    what: &str,
    path: &Path,
    read: fn(BufReader<File>) -> Result<(T, LoadStats)>,
) -> Result<(T, LoadStats)> {
    debug!(path = %path.display(), "loading {}", what);
    let file = File::open(path)?;
    let (loaded, stats) = read(BufReader::new(file))?;
    info!(
        loaded = stats.loaded,
        malformed = stats.malformed,
        skipped = stats.skipped,
        "loaded {} from {}",
        what,
        path.display()
    );
    Ok((loaded, stats))
}

pub fn load_subjects(path: &Path) -> Result<(RecordStore, LoadStats)> {
    load_file("subjects", path, read_subjects)
}

pub fn load_relations(path: &Path) -> Result<(LinkIndex<RelationEdge>, LoadStats)> {
    load_file("relations", path, read_relations)
}

pub fn load_staff(path: &Path) -> Result<(LinkIndex<StaffAssignment>, LoadStats)> {
    load_file("staff assignments", path, read_staff)
}

pub fn load_episodes(path: &Path) -> Result<(LinkIndex<Episode>, LoadStats)> {
    load_file("episodes", path, read_episodes)
}

/// An auxiliary dump that fails to load becomes an absent index
fn load_optional<T>(what: &str, path: &Path, load: fn(&Path) -> Result<(T, LoadStats)>) -> Option<T> {
    match load(path) {
        Ok((loaded, _)) => Some(loaded),
        Err(e) => {
            warn!(path = %path.display(), "could not load {}: {}", what, e);
            None
        }
    }
}

/// Subjects plus whichever auxiliary indices a query needs
#[derive(Debug, Default)]
pub struct Archive {
    pub records: RecordStore,
    pub indices: Indices,
}

impl Archive {
    /// Load the subject dump and the auxiliary dumps named by `required`.
    /// A missing subject dump is an error; a missing auxiliary dump leaves
    /// its index empty, which the executor reports.
    pub fn load(config: &Config, required: Requirements) -> Result<Self> {
        let (records, _) = load_subjects(&config.subjects_path())?;
        let mut indices = Indices::new();
        if required.relations {
            indices.relations = load_optional("relations", &config.relations_path(), load_relations);
        }
        if required.staff {
            indices.staff = load_optional("staff assignments", &config.staff_path(), load_staff);
        }
        if required.episodes {
            indices.episodes = load_optional("episodes", &config.episodes_path(), load_episodes);
        }
        Ok(Archive { records, indices })
    }
}
