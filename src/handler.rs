use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::app::App;
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Stream(event) => app.apply_stream_event(event),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => app.should_quit = true,
            KeyCode::Char('u') => app.scroll_half_page_up(),
            KeyCode::Char('d') => app.scroll_half_page_down(),
            // Any modified Enter inserts a newline rather than submitting.
            KeyCode::Enter if !app.is_responding => app.insert_char('\n'),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Esc => app.should_quit = true,

        // Plain Enter submits; a modified Enter (Shift held) inserts a
        // literal newline into the draft instead.
        KeyCode::Enter => {
            if key.modifiers.is_empty() {
                submit(app);
            } else if !app.is_responding {
                app.insert_char('\n');
            }
        }

        // Draft editing is disabled while a response is streaming.
        KeyCode::Char(c) if !app.is_responding => app.insert_char(c),
        KeyCode::Backspace if !app.is_responding => app.delete_before_cursor(),
        KeyCode::Delete if !app.is_responding => app.delete_at_cursor(),

        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),

        // Chat scrolling
        KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::PageUp => app.scroll_chat_up(app.chat_height.max(1)),
        KeyCode::PageDown => app.scroll_chat_down(app.chat_height.max(1)),

        _ => {}
    }
}

/// Dispatch the current draft as a new exchange. Preconditions (non-blank
/// draft, no response in flight) are enforced by `begin_exchange`; a
/// rejected submit changes nothing.
fn submit(app: &mut App) {
    let Some(history) = app.begin_exchange() else {
        return;
    };

    let mut stream = app.client.stream_chat(history);
    let events = app.events_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            if events.send(AppEvent::Stream(event)).is_err() {
                break;
            }
        }
    });
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_chat_up(3),
        MouseEventKind::ScrollDown => app.scroll_chat_down(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatClient;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn key_with(code: KeyCode, modifiers: KeyModifiers) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, modifiers))
    }

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (App::new(ChatClient::new(), tx), rx)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c))).unwrap();
        }
    }

    #[tokio::test]
    async fn plain_enter_submits_the_draft() {
        let (mut app, _rx) = test_app();
        type_text(&mut app, "hello");

        handle_event(&mut app, key(KeyCode::Enter)).unwrap();

        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[0].content, "hello");
        assert!(app.is_responding);
        assert_eq!(app.input_text, "");
    }

    #[tokio::test]
    async fn shift_enter_inserts_a_newline() {
        let (mut app, _rx) = test_app();
        type_text(&mut app, "line one");

        handle_event(&mut app, key_with(KeyCode::Enter, KeyModifiers::SHIFT)).unwrap();
        type_text(&mut app, "line two");

        assert_eq!(app.input_text, "line one\nline two");
        assert!(app.messages.is_empty());
        assert!(!app.is_responding);
    }

    #[tokio::test]
    async fn enter_on_blank_draft_is_a_noop() {
        let (mut app, _rx) = test_app();
        type_text(&mut app, "   ");

        handle_event(&mut app, key(KeyCode::Enter)).unwrap();

        assert!(app.messages.is_empty());
        assert!(!app.is_responding);
    }

    #[tokio::test]
    async fn editing_is_ignored_while_responding() {
        let (mut app, _rx) = test_app();
        type_text(&mut app, "hello");
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        assert!(app.is_responding);

        type_text(&mut app, "more");
        handle_event(&mut app, key(KeyCode::Backspace)).unwrap();
        assert_eq!(app.input_text, "");

        // A second submit while responding appends nothing.
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        assert_eq!(app.messages.len(), 2);
    }

    #[tokio::test]
    async fn ctrl_c_quits() {
        let (mut app, _rx) = test_app();
        handle_event(
            &mut app,
            key_with(KeyCode::Char('c'), KeyModifiers::CONTROL),
        )
        .unwrap();
        assert!(app.should_quit);
    }
}
