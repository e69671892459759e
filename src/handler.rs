use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::App;
use crate::tui::AppEvent;

const WHEEL_LINES: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work whether or not the input is enabled
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match key.code {
        KeyCode::Esc => app.should_quit = true,

        KeyCode::Enter => {
            app.submit();
        }

        // Draft editing
        KeyCode::Backspace => app.delete_before_cursor(),
        KeyCode::Delete => app.delete_at_cursor(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => {
            if app.draft.is_empty() {
                app.scroll_to_latest();
            } else {
                app.cursor_end();
            }
        }

        // Message list scrolling
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::PageUp => app.scroll_up(app.half_page()),
        KeyCode::PageDown => app.scroll_down(app.half_page()),

        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => app.insert_char(c),

        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(WHEEL_LINES),
        MouseEventKind::ScrollUp => app.scroll_up(WHEEL_LINES),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};
    use tokio::sync::mpsc::UnboundedSender;
    use wschat_core::{Channel, ChannelError, ChannelEvent, ConnectionManager};

    struct NullChannel;

    impl Channel for NullChannel {
        fn open(&mut self, _events: UnboundedSender<ChannelEvent>) {}

        fn send(&mut self, _text: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn connected_app() -> App {
        let mut app = App::new(ConnectionManager::with_channel(
            "ws://test/chat",
            Box::new(NullChannel),
        ));
        app.on_channel_event(ChannelEvent::Opened);
        app
    }

    fn press(app: &mut App, code: KeyCode) {
        press_with(app, code, KeyModifiers::NONE);
    }

    fn press_with(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
        let key = KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        };
        handle_event(app, AppEvent::Key(key));
    }

    #[test]
    fn test_typing_and_enter_sends_message() {
        let mut app = connected_app();
        for c in "hi".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Enter);

        assert!(app.draft.is_empty());
        assert_eq!(app.connection.messages().len(), 1);
    }

    #[test]
    fn test_ctrl_c_and_esc_quit() {
        let mut app = connected_app();
        press_with(&mut app, KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(app.should_quit);
        assert!(app.draft.is_empty());

        let mut app = connected_app();
        press(&mut app, KeyCode::Esc);
        assert!(app.should_quit);
    }

    #[test]
    fn test_wheel_outside_chat_is_ignored() {
        let mut app = connected_app();
        app.chat_area = Some(Rect::new(0, 1, 40, 10));
        app.follow_latest = true;

        let wheel = |row| MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 5,
            row,
            modifiers: KeyModifiers::NONE,
        };

        handle_event(&mut app, AppEvent::Mouse(wheel(20)));
        assert!(app.follow_latest);

        handle_event(&mut app, AppEvent::Mouse(wheel(3)));
        assert!(!app.follow_latest);
    }
}
