//! Title prompt for creating a document.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear};

use super::centered_rect;
use crate::app::App;

pub fn render(frame: &mut Frame, app: &App) {
    let Some(input) = app.new_document.as_ref() else {
        return;
    };

    // One input line plus borders.
    let area = centered_rect(50, 100, frame.area());
    let height = 3.min(area.height);
    let modal_area = Rect {
        y: area.y + (area.height - height) / 2,
        height,
        ..area
    };

    frame.render_widget(Clear, modal_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" New document ")
        .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .border_style(Style::default().fg(Color::Yellow));

    let inner = block.inner(modal_area);
    frame.render_widget(block, modal_area);
    frame.render_widget(input, inner);
}
