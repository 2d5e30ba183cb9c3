//! Detection of the `/tool` and `@file` triggers under the cursor.

/// Marker that starts a file reference.
pub const FILE_MARKER: &str = "@file";

/// Which autocomplete, if any, the text before the cursor asks for.
/// Recomputed on every text or cursor change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerContext {
    None,
    Tool { command_start: usize, query: String },
    File { command_start: usize, query: String },
}

impl TriggerContext {
    pub fn command_start(&self) -> Option<usize> {
        match self {
            TriggerContext::None => None,
            TriggerContext::Tool { command_start, .. }
            | TriggerContext::File { command_start, .. } => Some(*command_start),
        }
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            TriggerContext::None => None,
            TriggerContext::Tool { query, .. } | TriggerContext::File { query, .. } => {
                Some(query.as_str())
            }
        }
    }
}

/// Classify the text before `cursor`.
///
/// A file trigger wins when the latest `@` comes after the latest `/` and
/// starts `@file`. Otherwise a `/` opens a tool trigger as long as the user
/// has not typed past the command name; a single trailing space is tolerated
/// so the popup stays up right after a completion.
pub fn detect(text: &str, cursor: usize) -> TriggerContext {
    let cursor = clamp_to_char_boundary(text, cursor);
    let before = &text[..cursor];
    let slash = before.rfind('/');

    if let Some(at) = before.rfind('@')
        && slash.is_none_or(|slash| at > slash)
        && text[at..].starts_with(FILE_MARKER)
    {
        let marker_end = at + FILE_MARKER.len();
        let query = before.get(marker_end..).map(str::trim).unwrap_or_default();
        return TriggerContext::File {
            command_start: at,
            query: query.to_string(),
        };
    }

    let Some(slash) = slash else {
        return TriggerContext::None;
    };
    let after = &before[slash + 1..];
    let name = match after.char_indices().find(|(_, c)| c.is_whitespace()) {
        None => after,
        Some((idx, ' ')) if idx + 1 == after.len() => &after[..idx],
        Some(_) => return TriggerContext::None,
    };
    TriggerContext::Tool {
        command_start: slash,
        query: name.to_lowercase(),
    }
}

pub(crate) fn clamp_to_char_boundary(text: &str, pos: usize) -> usize {
    let mut p = pos.min(text.len());
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}
