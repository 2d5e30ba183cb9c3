use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyEventKind;
use crossterm::event::KeyModifiers;
use quill_protocol::descriptors::FileDescriptor;
use quill_protocol::descriptors::ToolDescriptor;

use crate::popup::Autocomplete;
use crate::popup::TextSplice;
use crate::trigger::TriggerContext;
use crate::trigger::clamp_to_char_boundary;
use crate::trigger::detect;

/// Result returned when the user interacts with the composer.
#[derive(Debug, PartialEq)]
pub enum InputResult {
    Submitted(String),
    None,
}

/// Text in the input box and the cursor as a byte offset into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposerState {
    pub text: String,
    pub cursor: usize,
}

/// Popup state – at most one can be visible at any time.
enum ActivePopup {
    None,
    Tool(Autocomplete<ToolDescriptor>),
    File(Autocomplete<FileDescriptor>),
}

pub struct ChatComposer {
    state: ComposerState,
    active_popup: ActivePopup,
    tools: Vec<ToolDescriptor>,
    files: Vec<FileDescriptor>,
    /// Trigger the user closed the popup for (Esc or a commit). The popup
    /// stays closed until the trigger changes.
    dismissed_trigger: Option<TriggerContext>,
    submit_enabled: bool,
}

impl Default for ChatComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatComposer {
    pub fn new() -> Self {
        Self {
            state: ComposerState::default(),
            active_popup: ActivePopup::None,
            tools: Vec::new(),
            files: Vec::new(),
            dismissed_trigger: None,
            submit_enabled: false,
        }
    }

    pub fn state(&self) -> &ComposerState {
        &self.state
    }

    pub fn text(&self) -> &str {
        &self.state.text
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.state.text.is_empty()
    }

    /// Submission is only allowed while connected with a model selected.
    pub fn set_submit_enabled(&mut self, enabled: bool) {
        self.submit_enabled = enabled;
    }

    pub fn can_submit(&self) -> bool {
        self.submit_enabled && !self.state.text.trim().is_empty()
    }

    pub fn set_tools(&mut self, tools: Vec<ToolDescriptor>) {
        self.tools = tools;
        if let ActivePopup::Tool(popup) = &mut self.active_popup {
            popup.set_candidates(self.tools.clone());
            if !popup.is_open() {
                self.active_popup = ActivePopup::None;
            }
        }
    }

    pub fn set_files(&mut self, files: Vec<FileDescriptor>) {
        self.files = files;
        if let ActivePopup::File(popup) = &mut self.active_popup {
            popup.set_candidates(self.files.clone());
            if !popup.is_open() {
                self.active_popup = ActivePopup::None;
            }
        }
    }

    /// Replace the whole draft and put the cursor at the end.
    pub fn set_text_content(&mut self, text: String) {
        self.state.cursor = text.len();
        self.state.text = text;
        self.sync_popups();
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.state.cursor = clamp_to_char_boundary(&self.state.text, cursor);
        self.sync_popups();
    }

    pub fn insert_str(&mut self, text: &str) {
        self.insert_at_cursor(text);
        self.sync_popups();
    }

    pub fn handle_paste(&mut self, pasted: String) -> bool {
        let normalized = pasted.replace("\r\n", "\n").replace('\r', "\n");
        self.insert_str(&normalized);
        true
    }

    pub fn trigger(&self) -> TriggerContext {
        detect(&self.state.text, self.state.cursor)
    }

    /// Return true if either the tool popup or the file popup is active.
    pub fn popup_active(&self) -> bool {
        !matches!(self.active_popup, ActivePopup::None)
    }

    pub fn tool_popup(&self) -> Option<&Autocomplete<ToolDescriptor>> {
        match &self.active_popup {
            ActivePopup::Tool(popup) => Some(popup),
            _ => None,
        }
    }

    pub fn file_popup(&self) -> Option<&Autocomplete<FileDescriptor>> {
        match &self.active_popup {
            ActivePopup::File(popup) => Some(popup),
            _ => None,
        }
    }

    pub fn handle_key_event(&mut self, key_event: KeyEvent) -> InputResult {
        if key_event.kind == KeyEventKind::Release {
            return InputResult::None;
        }
        let result = if self.popup_active() {
            self.handle_key_event_with_popup(key_event)
        } else {
            self.handle_input_basic(key_event)
        };
        self.sync_popups();
        result
    }

    fn handle_key_event_with_popup(&mut self, key_event: KeyEvent) -> InputResult {
        match key_event {
            KeyEvent {
                code: KeyCode::Up, ..
            }
            | KeyEvent {
                code: KeyCode::Char('p'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                match &mut self.active_popup {
                    ActivePopup::Tool(popup) => popup.move_up(),
                    ActivePopup::File(popup) => popup.move_up(),
                    ActivePopup::None => {}
                }
                InputResult::None
            }
            KeyEvent {
                code: KeyCode::Down,
                ..
            }
            | KeyEvent {
                code: KeyCode::Char('n'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                match &mut self.active_popup {
                    ActivePopup::Tool(popup) => popup.move_down(),
                    ActivePopup::File(popup) => popup.move_down(),
                    ActivePopup::None => {}
                }
                InputResult::None
            }
            KeyEvent {
                code: KeyCode::Esc, ..
            } => {
                // Hide popup without modifying text, remember the trigger to
                // avoid an immediate reopen.
                self.dismissed_trigger = Some(self.trigger());
                self.active_popup = ActivePopup::None;
                InputResult::None
            }
            KeyEvent {
                code: KeyCode::Tab, ..
            }
            | KeyEvent {
                code: KeyCode::Enter,
                modifiers: KeyModifiers::NONE,
                ..
            } => {
                self.commit_selection();
                InputResult::None
            }
            input => self.handle_input_basic(input),
        }
    }

    fn commit_selection(&mut self) {
        let Some(command_start) = self.trigger().command_start() else {
            self.active_popup = ActivePopup::None;
            return;
        };
        let cursor = self.state.cursor;
        let splice = match &self.active_popup {
            ActivePopup::Tool(popup) => popup.commit(command_start, cursor),
            ActivePopup::File(popup) => popup.commit(command_start, cursor),
            ActivePopup::None => None,
        };
        self.active_popup = ActivePopup::None;
        if let Some(splice) = splice {
            self.apply_splice(&splice);
            self.dismissed_trigger = Some(self.trigger());
        }
    }

    /// The composer is the only writer of its state; popups hand back
    /// splices which are applied here.
    fn apply_splice(&mut self, splice: &TextSplice) {
        tracing::debug!("applying completion {:?}", splice.replacement);
        self.state.cursor = splice.apply(&mut self.state.text);
    }

    fn handle_input_basic(&mut self, key_event: KeyEvent) -> InputResult {
        match key_event {
            KeyEvent {
                code: KeyCode::Enter,
                modifiers: KeyModifiers::NONE,
                ..
            } => self.try_submit(),
            KeyEvent {
                code: KeyCode::Enter,
                ..
            } => {
                self.insert_at_cursor("\n");
                InputResult::None
            }
            KeyEvent {
                code: KeyCode::Char(c),
                modifiers,
                ..
            } if !modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
                let mut buf = [0u8; 4];
                self.insert_at_cursor(c.encode_utf8(&mut buf));
                InputResult::None
            }
            KeyEvent {
                code: KeyCode::Backspace,
                ..
            } => {
                if let Some(prev) = self.prev_boundary() {
                    let cursor = self.state.cursor;
                    self.state.text.replace_range(prev..cursor, "");
                    self.state.cursor = prev;
                }
                InputResult::None
            }
            KeyEvent {
                code: KeyCode::Delete,
                ..
            } => {
                if let Some(next) = self.next_boundary() {
                    let cursor = self.state.cursor;
                    self.state.text.replace_range(cursor..next, "");
                }
                InputResult::None
            }
            KeyEvent {
                code: KeyCode::Left,
                ..
            } => {
                if let Some(prev) = self.prev_boundary() {
                    self.state.cursor = prev;
                }
                InputResult::None
            }
            KeyEvent {
                code: KeyCode::Right,
                ..
            } => {
                if let Some(next) = self.next_boundary() {
                    self.state.cursor = next;
                }
                InputResult::None
            }
            KeyEvent {
                code: KeyCode::Home,
                ..
            } => {
                self.state.cursor = 0;
                InputResult::None
            }
            KeyEvent {
                code: KeyCode::End, ..
            } => {
                self.state.cursor = self.state.text.len();
                InputResult::None
            }
            _ => InputResult::None,
        }
    }

    fn try_submit(&mut self) -> InputResult {
        if !self.submit_enabled {
            tracing::debug!("submit ignored: session cannot accept messages");
            return InputResult::None;
        }
        if self.state.text.trim().is_empty() {
            return InputResult::None;
        }
        let text = std::mem::take(&mut self.state.text);
        self.state.cursor = 0;
        self.dismissed_trigger = None;
        InputResult::Submitted(text)
    }

    fn insert_at_cursor(&mut self, text: &str) {
        let cursor = clamp_to_char_boundary(&self.state.text, self.state.cursor);
        self.state.text.insert_str(cursor, text);
        self.state.cursor = cursor + text.len();
    }

    fn prev_boundary(&self) -> Option<usize> {
        self.state.text[..self.state.cursor]
            .char_indices()
            .next_back()
            .map(|(idx, _)| idx)
    }

    fn next_boundary(&self) -> Option<usize> {
        self.state.text[self.state.cursor..]
            .chars()
            .next()
            .map(|c| self.state.cursor + c.len_utf8())
    }

    /// Synchronize the active popup with the trigger under the cursor.
    fn sync_popups(&mut self) {
        let trigger = self.trigger();
        if self.dismissed_trigger.as_ref() == Some(&trigger) {
            self.active_popup = ActivePopup::None;
            return;
        }
        self.dismissed_trigger = None;

        match trigger {
            TriggerContext::None => {
                self.active_popup = ActivePopup::None;
            }
            TriggerContext::Tool { query, .. } => {
                if !matches!(self.active_popup, ActivePopup::Tool(_)) {
                    self.active_popup = ActivePopup::Tool(Autocomplete::new(self.tools.clone()));
                }
                if let ActivePopup::Tool(popup) = &mut self.active_popup {
                    // Navigation keys leave the query alone; keep the selection.
                    if popup.query() != query || !popup.is_open() {
                        popup.filter(&query);
                    }
                    if !popup.is_open() {
                        self.active_popup = ActivePopup::None;
                    }
                }
            }
            TriggerContext::File { query, .. } => {
                if !matches!(self.active_popup, ActivePopup::File(_)) {
                    self.active_popup = ActivePopup::File(Autocomplete::new(self.files.clone()));
                }
                if let ActivePopup::File(popup) = &mut self.active_popup {
                    if popup.query() != query || !popup.is_open() {
                        popup.filter(&query);
                    }
                    if !popup.is_open() {
                        self.active_popup = ActivePopup::None;
                    }
                }
            }
        }
    }
}
