//! Header bar with one tab per open document.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Tabs};

use gdocs_sync::models::SyncStatus;

use crate::app::{App, View};

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let workspace = app.workspace();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" gdocs-sync ")
        .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

    if workspace.is_empty() {
        let auth = match app.authenticated {
            Some(true) => Span::styled("authenticated", Style::default().fg(Color::Green)),
            Some(false) => Span::styled(
                "not authenticated (press a)",
                Style::default().fg(Color::Yellow),
            ),
            None => Span::styled("checking account...", Style::default().fg(Color::DarkGray)),
        };
        frame.render_widget(Paragraph::new(Line::from(vec![Span::raw(" "), auth])).block(block), area);
        return;
    }

    let active = workspace.active();
    let titles: Vec<Line> = workspace
        .surfaces()
        .map(|(id, surface)| {
            let marker = if surface.modified { "*" } else { "" };
            let color = match surface.status {
                SyncStatus::Synced => Color::White,
                SyncStatus::Syncing => Color::Yellow,
                SyncStatus::Error => Color::Red,
            };
            let mut style = Style::default().fg(color);
            if Some(id) == active && app.view == View::Editor {
                style = style.add_modifier(Modifier::BOLD);
            }
            Line::from(format!(" {}{} ", surface.title, marker)).style(style)
        })
        .collect();

    let selected = workspace
        .surfaces()
        .position(|(id, _)| Some(id) == active)
        .unwrap_or(0);

    let tabs = Tabs::new(titles)
        .block(block)
        .select(selected)
        .highlight_style(Style::default().fg(Color::Yellow))
        .divider(symbols::line::VERTICAL);

    frame.render_widget(tabs, area);
}
