use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use pdfdesk_core::{Intent, ZDirection};

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Intent(Intent),
    ClearSelection,
    Save,
    Quit,
    /// Terminal resized to the given cell grid.
    Resize { columns: u16, rows: u16 },
    None,
}

/// Turns key presses into intents, keeping a vi-style numeric count prefix between events.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
}

impl EventMapper {
    /// Pixels scrolled by one `j`/`k` press.
    pub const SCROLL_STEP: f32 = 48.0;
    /// Points an arrow key moves the selection; shift moves it further.
    pub const NUDGE_STEP: f32 = 1.0;
    pub const NUDGE_STEP_LARGE: f32 = 10.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                kind: KeyEventKind::Release,
                ..
            }) => UiEvent::None,
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => self.map_key(code, modifiers),
            Event::Resize(columns, rows) => {
                self.reset_count();
                UiEvent::Resize { columns, rows }
            }
            _ => UiEvent::None,
        }
    }

    fn map_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        let plain = modifiers.is_empty() || modifiers == KeyModifiers::SHIFT;
        match code {
            KeyCode::Char(c) if c.is_ascii_digit() && modifiers.is_empty() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            KeyCode::Char('r') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.intent(Intent::Redo)
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Quit
            }
            KeyCode::Char(_) if !plain => {
                self.reset_count();
                UiEvent::None
            }
            KeyCode::Char('j') => {
                let count = self.take_count() as f32;
                UiEvent::Intent(Intent::ScrollBy {
                    delta: Self::SCROLL_STEP * count,
                })
            }
            KeyCode::Char('k') => {
                let count = self.take_count() as f32;
                UiEvent::Intent(Intent::ScrollBy {
                    delta: -Self::SCROLL_STEP * count,
                })
            }
            KeyCode::Char('J') | KeyCode::PageDown => {
                let count = self.take_count();
                UiEvent::Intent(Intent::NextPage { count })
            }
            KeyCode::Char('K') | KeyCode::PageUp => {
                let count = self.take_count();
                UiEvent::Intent(Intent::PrevPage { count })
            }
            KeyCode::Char('g') | KeyCode::Home => self.intent(Intent::FirstPage),
            KeyCode::Char('G') | KeyCode::End => match self.pending_count.take() {
                // `{n}G` jumps to page n, counted from one like the status line.
                Some(page) => {
                    self.pending_digits.clear();
                    UiEvent::Intent(Intent::GoToPage {
                        page: page.saturating_sub(1),
                    })
                }
                None => self.intent(Intent::LastPage),
            },
            KeyCode::Char('+') => self.intent(Intent::ZoomIn),
            KeyCode::Char('-') => self.intent(Intent::ZoomOut),
            KeyCode::Char('=') => self.intent(Intent::ResetZoom),
            KeyCode::Char('w') => self.intent(Intent::FitWidth),
            KeyCode::Char('p') => self.intent(Intent::FitPage),
            KeyCode::Char('r') => self.intent(Intent::RotateClockwise),
            KeyCode::Char('R') => self.intent(Intent::RotateCounterClockwise),
            KeyCode::Char('v') => self.intent(Intent::CycleViewMode),
            KeyCode::Char('a') => self.intent(Intent::AddNote),
            KeyCode::Char('x') | KeyCode::Delete => self.intent(Intent::DeleteSelection),
            KeyCode::Tab => self.intent(Intent::SelectNext),
            KeyCode::Char(']') => self.intent(Intent::Reorder(ZDirection::Forward)),
            KeyCode::Char('[') => self.intent(Intent::Reorder(ZDirection::Backward)),
            KeyCode::Char('}') => self.intent(Intent::Reorder(ZDirection::Front)),
            KeyCode::Char('{') => self.intent(Intent::Reorder(ZDirection::Back)),
            KeyCode::Char('u') => self.intent(Intent::Undo),
            KeyCode::Char('s') => {
                self.reset_count();
                UiEvent::Save
            }
            KeyCode::Char('q') => {
                self.reset_count();
                UiEvent::Quit
            }
            KeyCode::Esc => {
                self.reset_count();
                UiEvent::ClearSelection
            }
            KeyCode::Left => self.nudge(-1.0, 0.0, modifiers),
            KeyCode::Right => self.nudge(1.0, 0.0, modifiers),
            KeyCode::Up => self.nudge(0.0, -1.0, modifiers),
            KeyCode::Down => self.nudge(0.0, 1.0, modifiers),
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn intent(&mut self, intent: Intent) -> UiEvent {
        self.reset_count();
        UiEvent::Intent(intent)
    }

    fn nudge(&mut self, dx: f32, dy: f32, modifiers: KeyModifiers) -> UiEvent {
        let step = if modifiers.contains(KeyModifiers::SHIFT) {
            Self::NUDGE_STEP_LARGE
        } else {
            Self::NUDGE_STEP
        };
        let distance = step * self.take_count() as f32;
        UiEvent::Intent(Intent::Nudge {
            dx: dx * distance,
            dy: dy * distance,
        })
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn press(mapper: &mut EventMapper, keys: &str) -> UiEvent {
        let mut last = UiEvent::None;
        for c in keys.chars() {
            last = mapper.map_event(key_event(KeyCode::Char(c)));
        }
        last
    }

    #[test]
    fn numeric_prefix_counts_page_steps() {
        let mut mapper = EventMapper::new();
        assert_eq!(press(&mut mapper, "12"), UiEvent::None);
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        assert_eq!(
            press(&mut mapper, "J"),
            UiEvent::Intent(Intent::NextPage { count: 12 })
        );
        assert!(mapper.pending_input().is_none());

        assert_eq!(
            mapper.map_event(key_event_with_modifiers(KeyCode::Char('K'), KeyModifiers::SHIFT)),
            UiEvent::Intent(Intent::PrevPage { count: 1 })
        );
    }

    #[test]
    fn prefix_scales_scrolling_and_is_dropped_by_other_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            press(&mut mapper, "3j"),
            UiEvent::Intent(Intent::ScrollBy {
                delta: 3.0 * EventMapper::SCROLL_STEP
            })
        );
        assert_eq!(press(&mut mapper, "4+"), UiEvent::Intent(Intent::ZoomIn));
        assert_eq!(
            press(&mut mapper, "k"),
            UiEvent::Intent(Intent::ScrollBy {
                delta: -EventMapper::SCROLL_STEP
            })
        );
    }

    #[test]
    fn capital_g_with_count_goes_to_that_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(press(&mut mapper, "G"), UiEvent::Intent(Intent::LastPage));
        assert_eq!(
            press(&mut mapper, "5G"),
            UiEvent::Intent(Intent::GoToPage { page: 4 })
        );
        assert_eq!(press(&mut mapper, "g"), UiEvent::Intent(Intent::FirstPage));
    }

    #[test]
    fn view_and_edit_keys() {
        let mut mapper = EventMapper::new();
        let cases = [
            ('=', Intent::ResetZoom),
            ('-', Intent::ZoomOut),
            ('w', Intent::FitWidth),
            ('p', Intent::FitPage),
            ('r', Intent::RotateClockwise),
            ('R', Intent::RotateCounterClockwise),
            ('v', Intent::CycleViewMode),
            ('a', Intent::AddNote),
            ('x', Intent::DeleteSelection),
            (']', Intent::Reorder(ZDirection::Forward)),
            ('[', Intent::Reorder(ZDirection::Backward)),
            ('}', Intent::Reorder(ZDirection::Front)),
            ('{', Intent::Reorder(ZDirection::Back)),
            ('u', Intent::Undo),
        ];
        for (key, intent) in cases {
            assert_eq!(press(&mut mapper, &key.to_string()), UiEvent::Intent(intent), "key {key}");
        }
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Tab)),
            UiEvent::Intent(Intent::SelectNext)
        );
    }

    #[test]
    fn control_r_redoes_instead_of_rotating() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(KeyCode::Char('r'), KeyModifiers::CONTROL)),
            UiEvent::Intent(Intent::Redo)
        );
    }

    #[test]
    fn arrows_nudge_with_count_and_shift() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Left)),
            UiEvent::Intent(Intent::Nudge { dx: -1.0, dy: 0.0 })
        );
        press(&mut mapper, "4");
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(KeyCode::Down, KeyModifiers::SHIFT)),
            UiEvent::Intent(Intent::Nudge { dx: 0.0, dy: 40.0 })
        );
    }

    #[test]
    fn app_actions_and_resize() {
        let mut mapper = EventMapper::new();
        assert_eq!(press(&mut mapper, "s"), UiEvent::Save);
        assert_eq!(press(&mut mapper, "q"), UiEvent::Quit);
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::ClearSelection);
        assert_eq!(
            mapper.map_event(Event::Resize(120, 40)),
            UiEvent::Resize {
                columns: 120,
                rows: 40
            }
        );
    }

    #[test]
    fn key_releases_are_ignored() {
        let mut mapper = EventMapper::new();
        let release = Event::Key(KeyEvent {
            code: KeyCode::Char('q'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert_eq!(mapper.map_event(release), UiEvent::None);
    }
}
