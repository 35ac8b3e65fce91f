//! Infobox annex parsing
//!
//! Subjects carry a wiki-style infobox next to their direct attributes:
//!
//! ```text
//! {{Infobox animanga/Novel
//! |中文名= 某小说
//! |别名={
//! [某别名]
//! [日文名|ある小説]
//! }
//! |出版社= 角川
//! |发售日= 2020-01-01
//! }}
//! ```
//!
//! Scalar entries keep their trimmed value. List entries (`key={ ... }`) join
//! their item values with `、`; for `[label|value]` items only the value part
//! is kept.

/// Separator used when flattening list entries
pub const LIST_SEPARATOR: &str = "、";

/// Parsed `|key= value|` entries of an infobox, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annex {
    entries: Vec<(String, String)>,
}

impl Annex {
    /// Parse infobox text. Entries start at a `|` outside `[...]` and list
    /// braces and end at the next such `|`, `{{` or `}}`; text that is not
    /// `key= value` (or `key: value`, `key：value`) is ignored.
    pub fn parse(text: &str) -> Self {
        let entries = split_entries(text).into_iter().filter_map(parse_entry).collect();
        Annex { entries }
    }

    /// Value of the first entry whose key equals `name`, ignoring ASCII case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All entries in source order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Raw text of each `|`-introduced entry
fn split_entries(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut entries = Vec::new();
    let mut start: Option<usize> = None;
    let mut square = 0usize;
    let mut list = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let doubled = bytes.get(i + 1) == Some(&b);
        match b {
            b'[' => square += 1,
            b']' => square = square.saturating_sub(1),
            // an unbalanced `[` in a scalar stops at the line end
            b'\n' if list == 0 => square = 0,
            b'{' | b'}' if doubled && list == 0 && square == 0 => {
                if let Some(s) = start.take() {
                    entries.push(&text[s..i]);
                }
                i += 2;
                continue;
            }
            b'{' if square == 0 => list += 1,
            b'}' if square == 0 => list = list.saturating_sub(1),
            b'|' if square == 0 && list == 0 => {
                if let Some(s) = start.replace(i + 1) {
                    entries.push(&text[s..i]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    if let Some(s) = start {
        entries.push(&text[s..]);
    }
    entries
}

/// `key= value`, `key= {[a][label|b]}`
fn parse_entry(raw: &str) -> Option<(String, String)> {
    let sep = raw.find(['=', ':', '：'])?;
    let key = raw[..sep].trim();
    if key.is_empty() || key.contains('\n') {
        return None;
    }
    let sep_len = raw[sep..].chars().next()?.len_utf8();
    let rest = raw[sep + sep_len..].trim_start_matches([' ', '\t']);

    let value = match rest.strip_prefix('{') {
        Some(body) => {
            let body = body.rfind('}').map_or(body, |end| &body[..end]);
            list_items(body).join(LIST_SEPARATOR)
        }
        None => clean_scalar(rest.lines().next().unwrap_or("")).to_string(),
    };
    Some((key.to_string(), value))
}

fn clean_scalar(raw: &str) -> &str {
    let value = raw.trim();
    // a lone brace is the remnant of a broken list entry
    if value == "}" {
        ""
    } else {
        value
    }
}

/// Values of the `[value]` / `[label|value]` items of a list body
fn list_items(body: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut rest = body;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            break;
        };
        let inner = &after[..close];
        let value = match inner.split_once('|') {
            Some((_, value)) => value,
            None => inner,
        }
        .trim();
        if !value.is_empty() {
            items.push(value.to_string());
        }
        rest = &after[close + 1..];
    }
    items
}
