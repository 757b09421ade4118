use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
};
use charla_core::{ChatRole, Storage};
use crate::app::{App, ChatRow};

fn role_style(role: ChatRole) -> Style {
    match role {
        ChatRole::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ChatRole::Assistant => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    }
}

pub fn render<S: Storage>(app: &mut App<S>, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header<S: Storage>(app: &App<S>, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Chat IA Gemini ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("[{}]", app.model), Style::default().fg(Color::White)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat<S: Storage>(app: &mut App<S>, frame: &mut Frame, area: Rect) {
    // Inner size minus borders; rows are wrapped to this width
    let height = area.height.saturating_sub(2);
    let width = area.width.saturating_sub(2);
    let resized = app.chat_height != height || app.chat_width != width;
    app.chat_height = height;
    app.chat_width = width;
    if resized && app.follow {
        app.scroll_to_bottom();
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} messages ", app.messages().len()));

    let text = if app.messages().is_empty() && !app.is_awaiting() {
        Text::from(Span::styled(
            "Escribe tu pregunta...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        // Animated ellipsis: ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        let lines: Vec<Line> = app
            .visible_rows()
            .into_iter()
            .map(|row| match row {
                ChatRow::Role(role) => {
                    Line::from(Span::styled(format!("{}:", role.label()), role_style(role)))
                }
                ChatRow::Text(text) => Line::from(text),
                ChatRow::Blank => Line::default(),
                ChatRow::Loading => Line::from(Span::styled(
                    format!("loading{}", dots),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )),
            })
            .collect();
        Text::from(lines)
    };

    // Already wrapped and windowed, so no Paragraph wrap or scroll
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_input<S: Storage>(app: &App<S>, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Enviar (Enter) ");

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || app.cursor < inner_width {
        0
    } else {
        app.cursor - inner_width + 1
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    let cursor_x = (app.cursor - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

fn render_footer<S: Storage>(app: &App<S>, frame: &mut Frame, area: Rect) {
    let key_status = match app.key_source {
        Some(source) => Span::styled(format!(" key: {} ", source), Style::default().fg(Color::Green)),
        None => Span::styled(" no GEMINI_API_KEY ", Style::default().fg(Color::Red)),
    };

    let pending = app.store.pending();
    let pending_status = if pending > 0 {
        Span::styled(format!(" {} pending ", pending), Style::default().fg(Color::Yellow))
    } else {
        Span::raw("")
    };

    let footer = Line::from(vec![
        Span::styled(" CHAT ", Style::default().bg(Color::Blue).fg(Color::White)),
        key_status,
        pending_status,
        Span::styled(
            " Enter send | PgUp/PgDn scroll | Esc quit ",
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    frame.render_widget(Paragraph::new(footer), area);
}
