use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use wschat_core::{ChatRole, ConnectionState};

use crate::app::{wrap_text, App};

const SEND_BUTTON_WIDTH: u16 = 10;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, messages, input row, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_messages(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" wschat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.connection.endpoint().to_string(), Style::default().fg(Color::White)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_messages(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store dimensions for scroll math and mouse hit-testing (inner size minus borders)
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    app.sync_scroll();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let messages = app.connection.messages();
    let text = if messages.is_empty() {
        let hint = match app.connection.state() {
            ConnectionState::Connected => "Say hello to start the conversation.",
            ConnectionState::Connecting => "Waiting for the server...",
            ConnectionState::Disconnected => "Not connected. Restart to try again.",
        };
        Text::from(Span::styled(hint, Style::default().fg(Color::DarkGray)))
    } else {
        let width = app.bubble_width();
        let mut lines: Vec<Line> = Vec::new();

        for msg in messages {
            let (label, label_style, body_style, alignment) = match msg.role {
                ChatRole::User => (
                    "You",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    Style::default().fg(Color::White).bg(Color::Blue),
                    Alignment::Right,
                ),
                ChatRole::Assistant => (
                    "Assistant",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    Style::default(),
                    Alignment::Left,
                ),
            };

            lines.push(Line::from(Span::styled(label, label_style)).alignment(alignment));
            for chunk in wrap_text(&msg.content, width) {
                lines.push(Line::from(Span::styled(chunk, body_style)).alignment(alignment));
            }
            lines.push(Line::default());
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(text).block(block).scroll((app.scroll, 0));
    frame.render_widget(chat, area);

    let max_scroll = app.max_scroll();
    if max_scroll > 0 {
        let mut scrollbar_state = ScrollbarState::new(max_scroll as usize)
            .position(app.scroll as usize);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area,
            &mut scrollbar_state,
        );
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let [field_area, button_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(SEND_BUTTON_WIDTH),
    ])
    .areas(area);

    let enabled = app.can_edit();
    let border_color = if enabled { Color::Yellow } else { Color::DarkGray };
    let field_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message ");

    // Horizontal scrolling keeps the cursor visible
    let inner_width = field_area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if app.cursor >= inner_width {
        app.cursor - inner_width + 1
    } else {
        0
    };

    let field = if app.draft.is_empty() {
        Paragraph::new(Span::styled(
            "Type your message...",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else {
        let visible: String = app
            .draft
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        let style = if enabled {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Paragraph::new(visible).style(style)
    };
    frame.render_widget(field.block(field_block), field_area);

    let button_style = if app.can_send() {
        Style::default().fg(Color::White).bg(Color::Blue).bold()
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let button = Paragraph::new("Send")
        .alignment(Alignment::Center)
        .style(button_style)
        .block(Block::default().borders(Borders::ALL).border_style(button_style));
    frame.render_widget(button, button_area);

    if enabled {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((field_area.x + cursor_x + 1, field_area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let state = app.connection.state();
    let (status, status_style) = match state {
        ConnectionState::Connected => (
            " CONNECTED ".to_string(),
            Style::default().bg(Color::Green).fg(Color::Black),
        ),
        ConnectionState::Connecting => (
            // Animated ellipsis: cycles through ".", "..", "..."
            format!(" CONNECTING{:<3}", ".".repeat(app.animation_frame as usize + 1)),
            Style::default().bg(Color::Yellow).fg(Color::Black),
        ),
        ConnectionState::Disconnected => (
            " DISCONNECTED ".to_string(),
            Style::default().bg(Color::Red).fg(Color::White),
        ),
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let notice_style = Style::default().bg(Color::Black).fg(Color::LightRed);

    let mut spans = vec![Span::styled(status, status_style), Span::styled(" ", label_style)];

    if state != ConnectionState::Connected {
        if let Some(error) = app.connection.last_error() {
            spans.push(Span::styled(format!("{} ", error), notice_style));
        }
    }

    let rejected = app.connection.rejected_payloads();
    if rejected > 0 {
        spans.push(Span::styled(
            format!("{} non-text payload(s) rejected ", rejected),
            notice_style,
        ));
    }

    for (key, label) in [("Enter", "send"), ("↑↓", "scroll"), ("End", "latest"), ("Esc", "quit")] {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, buffer::Buffer, Terminal};
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

    fn new_app() -> App {
        App::new(ConnectionManager::with_channel(
            "ws://localhost:8000/chat",
            Box::new(NullChannel),
        ))
    }

    fn draw(app: &mut App) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|frame| render(app, frame)).unwrap();
        rows(terminal.backend().buffer())
    }

    fn rows(buffer: &Buffer) -> Vec<String> {
        buffer
            .content
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect())
            .collect()
    }

    #[test]
    fn test_user_messages_right_assistant_left() {
        let mut app = new_app();
        app.on_channel_event(ChannelEvent::Opened);
        app.draft = "hello".to_string();
        app.cursor = 5;
        app.submit();
        app.on_channel_event(ChannelEvent::Payload("hi there".to_string()));

        let screen = draw(&mut app);
        let user_row = screen.iter().find(|r| r.contains("hello")).unwrap();
        let reply_row = screen.iter().find(|r| r.contains("hi there")).unwrap();

        assert!(user_row.find("hello").unwrap() > 40, "user row: {user_row:?}");
        assert!(reply_row.find("hi there").unwrap() < 10, "reply row: {reply_row:?}");
        assert!(screen.iter().any(|r| r.contains("CONNECTED")));
    }

    #[test]
    fn test_disconnected_screen_shows_reason() {
        let mut app = new_app();
        app.on_channel_event(ChannelEvent::Closed {
            reason: Some("Connection refused".to_string()),
        });

        let screen = draw(&mut app);
        assert!(screen.iter().any(|r| r.contains("DISCONNECTED")));
        assert!(screen.iter().any(|r| r.contains("Connection refused")));
        assert!(screen.iter().any(|r| r.contains("Type your message...")));
        assert!(screen[0].contains("ws://localhost:8000/chat"));
    }

    #[test]
    fn test_render_records_chat_geometry() {
        let mut app = new_app();
        draw(&mut app);

        // 80x20 minus header, input row, footer and borders
        assert_eq!(app.chat_width, 78);
        assert_eq!(app.chat_height, 13);
        assert_eq!(app.chat_area, Some(Rect::new(0, 1, 80, 15)));
    }

    #[test]
    fn test_wide_character_reply_is_fully_visible() {
        let mut app = new_app();
        app.on_channel_event(ChannelEvent::Opened);
        app.on_channel_event(ChannelEvent::Payload(format!("{}END", "你".repeat(50))));

        let screen = draw(&mut app);
        let shown: usize = screen.iter().map(|r| r.matches('你').count()).sum();
        assert_eq!(shown, 50, "screen: {screen:#?}");
        assert!(screen.iter().any(|r| r.contains("END")), "screen: {screen:#?}");
    }
}
