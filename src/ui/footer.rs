//! Footer bar with sync status, notifications and keybindings.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use gdocs_sync::models::SyncStatus;
use gdocs_sync::sync::NotifyLevel;

use crate::app::{App, View};

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let keybindings: &[(&str, &str)] = if app.is_new_document_prompt_active() {
        &[("Enter", "Create"), ("Esc", "Cancel")]
    } else {
        match app.view {
            View::Documents => &[
                ("j/k", "Select"),
                ("Enter", "Open"),
                ("n", "New"),
                ("r", "Refresh"),
                ("a", "Auth"),
                ("Ctrl+Q", "Quit"),
            ],
            View::Editor => &[
                ("Ctrl+S", "Push"),
                ("Ctrl+R", "Pull"),
                ("Ctrl+L", "List"),
                ("Ctrl+N/P", "Next/Prev"),
                ("Ctrl+W", "Close"),
                ("Ctrl+Q", "Quit"),
            ],
        }
    };

    let mut spans: Vec<Span> = status_spans(app);

    spans.extend(keybindings.iter().flat_map(|(key, action)| {
        vec![
            Span::styled(
                format!(" {} ", key),
                Style::default().bg(Color::DarkGray).fg(Color::White),
            ),
            Span::raw(format!(" {} ", action)),
            Span::raw(" "),
        ]
    }));

    let notification = app.workspace().notification().map(|n| {
        let color = match n.level {
            NotifyLevel::Info => Color::Green,
            NotifyLevel::Warn => Color::Yellow,
            NotifyLevel::Error => Color::Red,
        };
        Line::from(Span::styled(format!(" {} ", n.message), Style::default().fg(color)))
    });

    let mut block = Block::default().borders(Borders::ALL);
    if let Some(line) = notification {
        block = block.title(line);
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(block)
        .alignment(Alignment::Left);

    frame.render_widget(paragraph, area);
}

/// Status and last sync time of the active document.
fn status_spans(app: &App) -> Vec<Span<'static>> {
    if app.view != View::Editor {
        return Vec::new();
    }
    let Some(surface) = app.workspace().active() else {
        return Vec::new();
    };
    let Some(state) = app.sync_state(surface) else {
        return Vec::new();
    };

    let color = match state.status {
        SyncStatus::Synced if state.dirty => Color::Yellow,
        SyncStatus::Synced => Color::Green,
        SyncStatus::Syncing => Color::Cyan,
        SyncStatus::Error => Color::Red,
    };
    let label = if state.dirty && state.status == SyncStatus::Synced {
        "modified"
    } else {
        state.status.as_str()
    };

    vec![
        Span::styled(
            format!(" {} ", label),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("last sync {}  ", state.last_synced_display()),
            Style::default().fg(Color::DarkGray),
        ),
    ]
}
