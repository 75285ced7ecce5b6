//! Document list view.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use crate::app::App;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.documents_loading {
        " Documents (loading...) ".to_string()
    } else {
        format!(" Documents ({}) ", app.documents.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Cyan));

    if app.documents.is_empty() {
        let hint = if app.documents_loading {
            ""
        } else {
            "No documents. Press n to create one or r to refresh."
        };
        let paragraph = Paragraph::new(hint)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let header = Row::new(vec![
        Cell::from("Name").style(Style::default().fg(Color::Yellow)),
        Cell::from("Modified").style(Style::default().fg(Color::Yellow)),
        Cell::from("ID").style(Style::default().fg(Color::Yellow)),
    ])
    .height(1)
    .bottom_margin(1);

    let workspace = app.workspace();
    let rows: Vec<Row> = app
        .documents
        .iter()
        .map(|doc| {
            let open = workspace.surfaces().any(|(_, s)| s.doc_id == doc.id);
            let name_style = if open {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(doc.name.clone()).style(name_style),
                Cell::from(doc.modified_display()),
                Cell::from(doc.id.to_string()).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Min(24),    // Name
        Constraint::Length(17), // Modified
        Constraint::Length(46), // ID
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = TableState::default();
    state.select(app.selected_document);

    frame.render_stateful_widget(table, area, &mut state);
}
