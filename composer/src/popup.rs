//! Generic autocomplete state shared by the tool and file popups.

use std::ops::Range;

use quill_protocol::descriptors::FileDescriptor;
use quill_protocol::descriptors::ToolDescriptor;

use crate::trigger::FILE_MARKER;

/// Something an autocomplete popup can offer.
pub trait Candidate: Clone {
    /// Text shown in the popup and matched against the query.
    fn label(&self) -> &str;

    /// Case-insensitive substring match; `query` is already lowercased.
    fn matches(&self, query: &str) -> bool {
        self.label().to_lowercase().contains(query)
    }

    /// Replacement for the trigger text when the candidate is committed.
    fn insertion_text(&self) -> String;
}

impl Candidate for ToolDescriptor {
    fn label(&self) -> &str {
        &self.name
    }

    fn matches(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(query) || self.server.to_lowercase().contains(query)
    }

    fn insertion_text(&self) -> String {
        format!("/{} ", self.name)
    }
}

impl Candidate for FileDescriptor {
    fn label(&self) -> &str {
        &self.filename
    }

    fn insertion_text(&self) -> String {
        format!("{FILE_MARKER} {}", self.filename)
    }
}

/// An edit proposed to the composer: replace `range` with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSplice {
    pub range: Range<usize>,
    pub replacement: String,
}

impl TextSplice {
    /// Apply to `text` and return the cursor position at the end of the
    /// inserted span.
    pub fn apply(&self, text: &mut String) -> usize {
        let end = self.range.end.min(text.len());
        let start = self.range.start.min(end);
        text.replace_range(start..end, &self.replacement);
        start + self.replacement.len()
    }
}

/// Candidates matching `query`, in supplied order. An empty query matches
/// everything.
pub fn filter_candidates<C: Candidate>(all: &[C], query: &str) -> Vec<C> {
    let query = query.to_lowercase();
    if query.is_empty() {
        return all.to_vec();
    }
    all.iter().filter(|c| c.matches(&query)).cloned().collect()
}

/// Popup state: open only while there is at least one candidate.
#[derive(Debug, Clone)]
pub struct Autocomplete<C> {
    all: Vec<C>,
    query: String,
    candidates: Vec<C>,
    selected_index: usize,
    is_open: bool,
}

impl<C: Candidate> Autocomplete<C> {
    pub fn new(all: Vec<C>) -> Self {
        Self {
            all,
            query: String::new(),
            candidates: Vec::new(),
            selected_index: 0,
            is_open: false,
        }
    }

    /// Refilter for `query`. Resets the selection and opens the popup when
    /// anything matches, closes it otherwise.
    pub fn filter(&mut self, query: &str) {
        self.query = query.to_string();
        self.candidates = filter_candidates(&self.all, query);
        self.selected_index = 0;
        self.is_open = !self.candidates.is_empty();
    }

    /// Replace the candidate source. An open popup is refiltered.
    pub fn set_candidates(&mut self, all: Vec<C>) {
        self.all = all;
        if self.is_open {
            let query = std::mem::take(&mut self.query);
            self.filter(&query);
        }
    }

    pub fn close(&mut self) {
        self.is_open = false;
        self.candidates.clear();
        self.selected_index = 0;
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn candidates(&self) -> &[C] {
        &self.candidates
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn selected(&self) -> Option<&C> {
        self.candidates.get(self.selected_index)
    }

    pub fn move_up(&mut self) {
        let len = self.candidates.len();
        if len == 0 {
            return;
        }
        self.selected_index = if self.selected_index == 0 {
            len - 1
        } else {
            self.selected_index - 1
        };
    }

    pub fn move_down(&mut self) {
        let len = self.candidates.len();
        if len == 0 {
            return;
        }
        self.selected_index = (self.selected_index + 1) % len;
    }

    /// Splice that replaces `command_start..cursor` with the selected
    /// candidate. `None` if nothing is selected.
    pub fn commit(&self, command_start: usize, cursor: usize) -> Option<TextSplice> {
        let selected = self.selected()?;
        Some(TextSplice {
            range: command_start..cursor.max(command_start),
            replacement: selected.insertion_text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_protocol::descriptors::FileSource;
    use quill_protocol::descriptors::FileType;

    fn tools() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("mcp", "search"),
            ToolDescriptor::new("mcp", "tooling"),
            ToolDescriptor::new("mcp", "tool_x"),
        ]
    }

    fn names(popup: &Autocomplete<ToolDescriptor>) -> Vec<&str> {
        popup.candidates().iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn substring_filter_keeps_supplied_order() {
        let mut popup = Autocomplete::new(tools());
        popup.filter("too");
        assert_eq!(names(&popup), vec!["tooling", "tool_x"]);
        assert_eq!(popup.selected_index(), 0);
        assert!(popup.is_open());
    }

    #[test]
    fn empty_query_returns_everything() {
        let mut popup = Autocomplete::new(tools());
        popup.filter("");
        assert_eq!(names(&popup), vec!["search", "tooling", "tool_x"]);
    }

    #[test]
    fn filter_is_case_insensitive_and_matches_server() {
        let all = vec![
            ToolDescriptor::new("GitHub", "create_issue"),
            ToolDescriptor::new("mcp", "Search"),
        ];
        assert_eq!(filter_candidates(&all, "SEAR").len(), 1);
        assert_eq!(filter_candidates(&all, "github")[0].name, "create_issue");
    }

    #[test]
    fn no_match_closes_popup() {
        let mut popup = Autocomplete::new(tools());
        popup.filter("zzz");
        assert!(!popup.is_open());
        assert_eq!(popup.selected(), None);
        assert_eq!(popup.commit(0, 4), None);
    }

    #[test]
    fn navigation_wraps_both_ways() {
        let mut popup = Autocomplete::new(tools());
        popup.filter("");
        popup.move_up();
        assert_eq!(popup.selected_index(), 2);
        popup.move_down();
        assert_eq!(popup.selected_index(), 0);
        for _ in 0..3 {
            popup.move_down();
        }
        assert_eq!(popup.selected_index(), 0);
    }

    #[test]
    fn refilter_resets_selection() {
        let mut popup = Autocomplete::new(tools());
        popup.filter("");
        popup.move_down();
        popup.filter("t");
        assert_eq!(popup.selected_index(), 0);
    }

    #[test]
    fn replacing_candidates_refilters_open_popup() {
        let mut popup = Autocomplete::new(tools());
        popup.filter("tool");
        popup.move_down();
        popup.set_candidates(vec![
            ToolDescriptor::new("mcp", "toolbox"),
            ToolDescriptor::new("mcp", "fetch"),
        ]);
        assert_eq!(names(&popup), vec!["toolbox"]);
        assert_eq!(popup.selected_index(), 0);
    }

    #[test]
    fn commit_splices_tool_and_keeps_suffix() {
        let mut popup = Autocomplete::new(tools());
        popup.filter("too");
        popup.move_down();
        let mut text = "run /too please".to_string();
        let splice = popup.commit(4, 8).expect("selection");
        let cursor = splice.apply(&mut text);
        assert_eq!(text, "run /tool_x  please");
        assert_eq!(cursor, 12);
    }

    #[test]
    fn file_commit_inserts_marker_and_name() {
        let mut popup = Autocomplete::new(vec![FileDescriptor {
            filename: "report.csv".to_string(),
            kind: FileType::Data,
            size: 10,
            source: FileSource::User,
            locator: None,
        }]);
        popup.filter("rep");
        let mut text = "see @file rep and more".to_string();
        let cursor = popup.commit(4, 13).expect("selection").apply(&mut text);
        assert_eq!(text, "see @file report.csv and more");
        assert_eq!(&text[..cursor], "see @file report.csv");
    }
}
