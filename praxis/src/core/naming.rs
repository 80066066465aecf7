//! Deterministic naming for workspace artifacts.
//!
//! Run logs and saved chats are named `<timestamp>_<suffix>.md` where the
//! timestamp is fixed-width so names can be parsed back and ordered. Names
//! that collide within the same second carry a sequence number right after
//! the timestamp: `<timestamp>-<n>_<suffix>.md`, with `n >= 2`.

use std::sync::LazyLock;

use chrono::NaiveDateTime;

/// `strftime` layout of the timestamp prefix.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const TIMESTAMP_LEN: usize = 19;

static NON_WORD_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\W+").unwrap());

/// Collapse every run of non-word characters into a single `_`.
pub fn sanitize(value: &str) -> String {
    NON_WORD_RE.replace_all(value, "_").into_owned()
}

/// Keep at most `max_chars` characters.
pub fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// True when `name` can be joined onto a directory without escaping it.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control)
}

/// File name of the run log for `objective` started at `at`.
pub fn run_log_file_name(at: NaiveDateTime, objective: &str, max_chars: usize) -> String {
    let sanitized = sanitize(objective);
    format!(
        "{}_{}.md",
        at.format(TIMESTAMP_FORMAT),
        truncate_chars(&sanitized, max_chars)
    )
}

/// File name of a saved chat titled `title`.
pub fn chat_file_name(at: NaiveDateTime, title: &str) -> String {
    format!("{}_{}.md", at.format(TIMESTAMP_FORMAT), sanitize(title))
}

/// `name` with sequence number `n` inserted after its timestamp.
///
/// `name` must come from [`run_log_file_name`] or [`chat_file_name`].
pub fn sequenced_name(name: &str, n: u32) -> String {
    match (name.get(..TIMESTAMP_LEN), name.get(TIMESTAMP_LEN..)) {
        (Some(stamp), Some(rest)) => format!("{stamp}-{n}{rest}"),
        _ => format!("{n}-{name}"),
    }
}

/// Parts of a timestamped artifact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedName {
    pub saved_at: NaiveDateTime,
    /// 1 for the first save within a second, then 2, 3, ...
    pub sequence: u32,
    pub suffix: String,
}

impl TimestampedName {
    /// Ordering key: save time, then sequence within the same second.
    pub fn order_key(&self) -> (NaiveDateTime, u32) {
        (self.saved_at, self.sequence)
    }
}

/// Split a `<timestamp>[-<n>]_<suffix>.md` name back into its parts.
///
/// Returns `None` for names that were not produced by this module.
pub fn parse_timestamped_name(file_name: &str) -> Option<TimestampedName> {
    let stem = file_name.strip_suffix(".md")?;
    let stamp = stem.get(..TIMESTAMP_LEN)?;
    let rest = stem.get(TIMESTAMP_LEN..)?;
    let saved_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    let (sequence, suffix) = match rest.strip_prefix('-') {
        Some(sequenced) => {
            let (digits, suffix) = sequenced.split_once('_')?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let sequence = digits.parse::<u32>().ok().filter(|n| *n >= 2)?;
            (sequence, suffix)
        }
        None => (1, rest.strip_prefix('_')?),
    };
    if suffix.is_empty() {
        return None;
    }
    Some(TimestampedName {
        saved_at,
        sequence,
        suffix: suffix.to_string(),
    })
}
