//! Markdown editor for the active document.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::App;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let workspace = app.workspace();
    let Some(id) = workspace.active() else {
        let empty = Paragraph::new("No document open. Ctrl+L lists your documents.")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(empty, area);
        return;
    };
    let Some(surface) = workspace.surface(id) else {
        return;
    };

    let revision = app
        .handle(id)
        .filter(|h| !h.revision.is_empty())
        .map(|h| format!(" rev {} ", h.revision.short()))
        .unwrap_or_default();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", surface.title))
        .title_style(Style::default().fg(Color::Cyan))
        .title_bottom(
            Line::from(Span::styled(
                format!(" {} {}", surface.doc_id, revision),
                Style::default().fg(Color::DarkGray),
            ))
            .right_aligned(),
        );

    let inner = block.inner(area);
    frame.render_widget(block, area);
    frame.render_widget(&surface.textarea, inner);
}
