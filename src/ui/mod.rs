pub mod home;

use std::collections::HashMap;
use std::sync::OnceLock;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};

use crate::app::{App, Focus, Popup};
use crate::archive::DocumentStatus;
use crate::theme::Theme;
use home::HomeView;

// Theme is fixed for the life of the process
static THEME: OnceLock<Theme> = OnceLock::new();

/// Apply config overrides; only the first call has any effect
pub fn init_theme(overrides: &HashMap<String, String>) {
    let _ = THEME.set(Theme::from_overrides(overrides));
}

fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::default)
}

fn accent() -> Color { theme().accent }
fn inactive() -> Color { theme().inactive }
fn text() -> Color { theme().text }
fn text_dim() -> Color { theme().text_dim }
fn bg_selected() -> Color { theme().bg_selected }
fn heading() -> Color { theme().heading }

fn status_icon(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Queued => "◌",
        DocumentStatus::Processing => "◐",
        DocumentStatus::Ready => "●",
        DocumentStatus::Error => "✗",
        DocumentStatus::Duplicate => "≡",
    }
}

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints([
            Constraint::Length(1),                    // Info line
            Constraint::Length(HomeView::height(area.width.saturating_sub(2)) + 2), // Front page (bordered)
            Constraint::Length(3),                    // Stats
            Constraint::Min(4),                       // Documents
            Constraint::Length(1),                    // Footer
        ])
        .split(area);

    draw_info_line(f, app, chunks[0]);
    draw_home_box(f, app, chunks[1]);
    draw_stats_box(f, app, chunks[2]);
    draw_documents_box(f, app, chunks[3]);
    draw_footer(f, app, chunks[4]);

    match app.popup {
        Popup::None => {}
        Popup::FileBrowser => draw_file_browser(f, app),
        Popup::Detail => draw_detail_popup(f, app),
        Popup::Help => draw_help_popup(f),
    }
}

fn section_block(title: &str, is_active: bool) -> Block<'_> {
    let border_color = if is_active { accent() } else { inactive() };
    let title_style = if is_active {
        Style::default().fg(accent()).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(inactive())
    };

    Block::default()
        .title(Span::styled(title, title_style))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
}

fn draw_info_line(f: &mut Frame, app: &App, area: Rect) {
    let line = if let Some(ref status) = app.status_message {
        Line::from(vec![Span::styled(status, Style::default().fg(theme().queued))])
    } else if app.stats.processing > 0 {
        Line::from(vec![
            Span::styled("◐ ", Style::default().fg(theme().processing)),
            Span::styled(
                format!("Reading {} document(s)…", app.stats.processing),
                Style::default().fg(text_dim()),
            ),
        ])
    } else {
        Line::from(vec![Span::styled("Ready", Style::default().fg(text_dim()))])
    };

    f.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
}

fn draw_home_box(f: &mut Frame, app: &App, area: Rect) {
    let block = section_block("", app.focus == Focus::Button);
    let inner = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(HomeView::new(theme()), inner);
}

fn draw_stats_box(f: &mut Frame, app: &App, area: Rect) {
    let block = section_block(" Archive ", false);
    let stats = &app.stats;

    let mut spans = vec![
        Span::styled(format!(" {} ", stats.total), Style::default().fg(text()).add_modifier(Modifier::BOLD)),
        Span::styled("documents │ ", Style::default().fg(text_dim())),
    ];
    for (status, count) in [
        (DocumentStatus::Queued, stats.queued),
        (DocumentStatus::Processing, stats.processing),
        (DocumentStatus::Ready, stats.ready),
        (DocumentStatus::Error, stats.errors),
        (DocumentStatus::Duplicate, stats.duplicates),
    ] {
        spans.push(Span::styled(
            format!("{} {} ", status_icon(status), count),
            Style::default().fg(theme().status(status)),
        ));
        spans.push(Span::styled(format!("{}  ", status), Style::default().fg(text_dim())));
    }
    if area.width > 100 {
        spans.push(Span::styled("│ inbox ", Style::default().fg(text_dim())));
        spans.push(Span::styled(
            app.config.watch_dir.display().to_string(),
            Style::default().fg(text()),
        ));
    }

    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_documents_box(f: &mut Frame, app: &App, area: Rect) {
    let is_active = app.focus == Focus::Documents;
    let block = section_block(" Documents ", is_active);

    let show_confidence = area.width > 70;

    let header_style = Style::default().fg(heading());
    let mut header_cells = vec![
        Span::styled("", header_style),
        Span::styled("Name", header_style),
        Span::styled("Status", header_style),
        Span::styled("Words", header_style),
    ];
    if show_confidence {
        header_cells.push(Span::styled("Conf", header_style));
        header_cells.push(Span::styled("Updated", header_style));
    }
    let header = Row::new(header_cells);

    let rows: Vec<Row> = if app.documents.is_empty() {
        vec![
            Row::new(vec![Span::raw(""), Span::styled("No documents yet", Style::default().fg(text_dim()))]),
            Row::new(vec![Span::raw(""), Span::styled("Drop files in the watch folder or press 'i'", Style::default().fg(accent()))]),
        ]
    } else {
        app.documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let color = theme().status(doc.status);
                let mut cells = vec![
                    Span::styled(status_icon(doc.status), Style::default().fg(color)),
                    Span::styled(doc.file_name.as_str(), Style::default().fg(text())),
                    Span::styled(doc.status.as_str(), Style::default().fg(color)),
                    Span::styled(doc.word_count.to_string(), Style::default().fg(text_dim())),
                ];
                if show_confidence {
                    cells.push(Span::styled(
                        doc.ocr_confidence.map(|c| format!("{:.0}%", c)).unwrap_or_default(),
                        Style::default().fg(text_dim()),
                    ));
                    cells.push(Span::styled(
                        doc.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                        Style::default().fg(text_dim()),
                    ));
                }

                let row_style = if i == app.selected && is_active {
                    Style::default().bg(bg_selected()).fg(text())
                } else {
                    Style::default()
                };
                Row::new(cells).style(row_style)
            })
            .collect()
    };

    let widths = if show_confidence {
        vec![
            Constraint::Length(2),
            Constraint::Percentage(45),
            Constraint::Length(11),
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Length(17),
        ]
    } else {
        vec![
            Constraint::Length(2),
            Constraint::Percentage(60),
            Constraint::Length(11),
            Constraint::Length(7),
        ]
    };

    let table = Table::new(rows, widths).header(header).block(block);
    f.render_widget(table, area);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let hints: Vec<(&str, &str)> = match app.focus {
        Focus::Button => vec![
            ("Tab", "Documents"),
            ("i", "Import"),
            ("h", "Help"),
            ("q", "Quit"),
        ],
        Focus::Documents => vec![
            ("↑↓", "Nav"),
            ("Enter", "Text"),
            ("r", "Retry"),
            ("i", "Import"),
            ("Tab", "Front"),
            ("h", "Help"),
        ],
    };

    let max_hints = if area.width < 60 { 4 } else { hints.len() };

    let hint_spans: Vec<Span> = hints
        .iter()
        .take(max_hints)
        .flat_map(|(key, action)| {
            vec![
                Span::styled(*key, Style::default().fg(accent())),
                Span::styled(format!(" {} │ ", action), Style::default().fg(text_dim())),
            ]
        })
        .collect();

    f.render_widget(Paragraph::new(Line::from(hint_spans)).alignment(Alignment::Center), area);
}

fn draw_file_browser(f: &mut Frame, app: &App) {
    let area = f.area();
    let popup_area = centered_rect(
        if area.width < 80 { 90 } else { 70 },
        if area.height < 30 { 85 } else { 70 },
        area,
    );

    f.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(Span::styled(" Import into archive ", Style::default().fg(accent())))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent()));
    f.render_widget(block, popup_area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(popup_area);

    let path_display = Paragraph::new(Line::from(vec![
        Span::styled("▸ ", Style::default().fg(accent())),
        Span::styled(app.browser_path.to_string_lossy(), Style::default().fg(text())),
    ]))
    .block(Block::default().borders(Borders::BOTTOM).border_style(Style::default().fg(inactive())));
    f.render_widget(path_display, inner[0]);

    let rows: Vec<Row> = if app.browser_entries.is_empty() {
        vec![Row::new(vec![Span::styled(
            "  No documents in this directory",
            Style::default().fg(text_dim()),
        )])]
    } else {
        app.browser_entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let (icon, icon_color) = if entry.is_dir {
                    ("▸", accent())
                } else {
                    ("·", theme().ready)
                };
                let row_style = if i == app.browser_selected {
                    Style::default().bg(bg_selected()).fg(text())
                } else {
                    Style::default()
                };

                Row::new(vec![
                    Span::styled(format!("  {} ", icon), Style::default().fg(icon_color)),
                    Span::styled(entry.name.as_str(), Style::default().fg(text())),
                ])
                .style(row_style)
            })
            .collect()
    };

    let table = Table::new(rows, [Constraint::Length(5), Constraint::Percentage(90)]);
    f.render_widget(table, inner[1]);

    let hint = Paragraph::new(Line::from(vec![
        Span::styled("j/k", Style::default().fg(accent())),
        Span::raw(" nav │ "),
        Span::styled("Enter", Style::default().fg(accent())),
        Span::raw(" import/open │ "),
        Span::styled("Backspace", Style::default().fg(accent())),
        Span::raw(" up │ "),
        Span::styled("Esc", Style::default().fg(accent())),
        Span::raw(" cancel"),
    ]))
    .alignment(Alignment::Center)
    .style(Style::default().fg(text_dim()));
    f.render_widget(hint, inner[2]);
}

fn draw_detail_popup(f: &mut Frame, app: &App) {
    let Some(doc) = app.selected_document() else {
        return;
    };

    let area = f.area();
    let popup_area = centered_rect(
        if area.width < 80 { 95 } else { 80 },
        if area.height < 30 { 90 } else { 80 },
        area,
    );
    f.render_widget(Clear, popup_area);

    let mut lines = vec![
        Line::from(vec![
            Span::styled(status_icon(doc.status), Style::default().fg(theme().status(doc.status))),
            Span::styled(format!(" {} ", doc.status), Style::default().fg(theme().status(doc.status))),
            Span::styled(
                format!(
                    "│ {} words │ {} page(s) │ {} │ {}",
                    doc.word_count,
                    doc.pages,
                    doc.lang,
                    doc.location.as_str()
                ),
                Style::default().fg(text_dim()),
            ),
        ]),
        Line::from(Span::styled(doc.stored_at.display().to_string(), Style::default().fg(text_dim()))),
    ];
    if let Some(ref error) = doc.error {
        lines.push(Line::from(Span::styled(
            format!("Error: {}", error),
            Style::default().fg(theme().error),
        )));
    }
    lines.push(Line::from(""));

    if doc.ocr_text.is_empty() {
        lines.push(Line::from(Span::styled("No text recognized", Style::default().fg(text_dim()))));
    } else {
        lines.extend(doc.ocr_text.lines().map(|l| {
            if l.starts_with("--- Page ") {
                Line::from(Span::styled(l, Style::default().fg(accent())))
            } else {
                Line::from(Span::styled(l, Style::default().fg(text())))
            }
        }));
    }

    let detail = Paragraph::new(lines)
        .block(
            Block::default()
                .title(Span::styled(format!(" {} ", doc.file_name), Style::default().fg(accent())))
                .title_bottom(Line::from(" j/k scroll │ Esc close ").alignment(Alignment::Center))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent())),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll, 0));

    f.render_widget(detail, popup_area);
}

fn draw_help_popup(f: &mut Frame) {
    let area = f.area();
    let popup_area = centered_rect(
        if area.width < 80 { 95 } else { 70 },
        if area.height < 40 { 95 } else { 80 },
        area,
    );

    f.render_widget(Clear, popup_area);

    let section = |title: &'static str| {
        Line::from(Span::styled(title, Style::default().fg(heading()).add_modifier(Modifier::BOLD)))
    };
    let key = |k: &'static str, what: &'static str| {
        Line::from(vec![
            Span::styled(k, Style::default().fg(accent())),
            Span::raw(what),
        ])
    };

    let help_text = vec![
        section("═══ Navigation ═══"),
        key("  Tab       ", "Switch between the front page and the document list"),
        key("  ↑/↓ j/k   ", "Move up/down in lists"),
        Line::from(""),
        section("═══ Documents ═══"),
        key("  Enter     ", "Show recognized text"),
        key("  i         ", "Import a file into the watch folder"),
        key("  r         ", "Retry a failed document"),
        Line::from(""),
        section("═══ Command line ═══"),
        key("  lindley --daemon      ", "Watch and OCR without the UI"),
        key("  lindley --add FILE    ", "Import files"),
        key("  lindley --stats       ", "Totals, processed, errors"),
        key("  lindley --export csv  ", "Export the archive"),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Press ", Style::default().fg(text_dim())),
            Span::styled("h", Style::default().fg(accent())),
            Span::styled("/", Style::default().fg(text_dim())),
            Span::styled("?", Style::default().fg(accent())),
            Span::styled("/", Style::default().fg(text_dim())),
            Span::styled("Esc", Style::default().fg(accent())),
            Span::styled(" to close", Style::default().fg(text_dim())),
        ]),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(Span::styled(" Lindley Help ", Style::default().fg(accent())))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent())),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
