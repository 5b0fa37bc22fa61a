//! Key bindings: arrows and vim-style.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Action from a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ShiftLeft,
    ShiftRight,
    Rotate,
    Accelerate,
    Pause,
    Restart,
    Quit,
    None,
}

/// Map key event to an action. Arrows and hjkl both work; Ctrl-C always quits.
pub fn key_to_action(key: KeyEvent) -> Action {
    let KeyEvent {
        code, modifiers, ..
    } = key;
    if modifiers == KeyModifiers::CONTROL {
        return match code {
            KeyCode::Char('c') => Action::Quit,
            _ => Action::None,
        };
    }
    let no_mod = modifiers.is_empty() || modifiers == KeyModifiers::SHIFT;
    if !no_mod {
        return Action::None;
    }
    match code {
        KeyCode::Char('q' | 'Q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char('p' | 'P') => Action::Pause,
        KeyCode::Char('r' | 'R') => Action::Restart,
        KeyCode::Left | KeyCode::Char('h') => Action::ShiftLeft,
        KeyCode::Right | KeyCode::Char('l') => Action::ShiftRight,
        KeyCode::Up | KeyCode::Char('k' | ' ') => Action::Rotate,
        KeyCode::Down | KeyCode::Char('j') => Action::Accelerate,
        _ => Action::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn arrows_and_vim_keys_agree() {
        assert_eq!(key_to_action(key(KeyCode::Left)), Action::ShiftLeft);
        assert_eq!(key_to_action(key(KeyCode::Char('h'))), Action::ShiftLeft);
        assert_eq!(key_to_action(key(KeyCode::Right)), Action::ShiftRight);
        assert_eq!(key_to_action(key(KeyCode::Char('l'))), Action::ShiftRight);
        assert_eq!(key_to_action(key(KeyCode::Up)), Action::Rotate);
        assert_eq!(key_to_action(key(KeyCode::Char('k'))), Action::Rotate);
        assert_eq!(key_to_action(key(KeyCode::Down)), Action::Accelerate);
        assert_eq!(key_to_action(key(KeyCode::Char('j'))), Action::Accelerate);
    }

    #[test]
    fn control_keys() {
        assert_eq!(key_to_action(key(KeyCode::Esc)), Action::Quit);
        assert_eq!(key_to_action(key(KeyCode::Char('p'))), Action::Pause);
        assert_eq!(key_to_action(key(KeyCode::Char('r'))), Action::Restart);
        assert_eq!(
            key_to_action(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Action::Quit
        );
        assert_eq!(
            key_to_action(KeyEvent::new(KeyCode::Left, KeyModifiers::ALT)),
            Action::None
        );
    }
}
