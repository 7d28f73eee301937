use crate::playback::OutputSink;

/// One event the simulated editor received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    Char(char),
    Backspace,
}

#[derive(Debug, Default, Clone)]
struct SimEditorState {
    buf: Vec<char>,
    cursor: usize,
}

impl SimEditorState {
    fn insert_char(&mut self, c: char) {
        self.buf.insert(self.cursor, c);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        self.buf.remove(self.cursor);
    }

    fn as_string(&self) -> String {
        self.buf.iter().collect()
    }
}

/// An in-memory output sink that behaves like a plain text field.
///
/// This is intended for tests and dry runs. It records every event it
/// receives and can be told to drop its connection after a number of them.
#[derive(Debug, Default, Clone)]
pub struct SimulatedEditor {
    editor: SimEditorState,
    events: Vec<SimEvent>,
    disconnect_after: Option<usize>,
}

impl SimulatedEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report disconnected once `events` events have been received.
    pub fn disconnect_after(mut self, events: usize) -> Self {
        self.disconnect_after = Some(events);
        self
    }

    pub fn text(&self) -> String {
        self.editor.as_string()
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn chars_sent(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SimEvent::Char(_)))
            .count()
    }

    pub fn backspaces_sent(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SimEvent::Backspace))
            .count()
    }
}

impl OutputSink for SimulatedEditor {
    fn send(&mut self, c: char) {
        self.events.push(SimEvent::Char(c));
        self.editor.insert_char(c);
    }

    fn send_backspace(&mut self) {
        self.events.push(SimEvent::Backspace);
        self.editor.backspace();
    }

    fn is_connected(&self) -> bool {
        self.disconnect_after
            .map_or(true, |limit| self.events.len() < limit)
    }
}
