//! The front page: a heading, the "Add Documents" button and the watched
//! folder label.
//!
//! Everything here is a literal. The view takes no data, keeps no state and
//! renders the same cells every time; the button is drawn like a button but
//! nothing is wired to it.

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::theme::Theme;

pub const HEADING: &str = "📚 Lindley Archives";
pub const BUTTON_LABEL: &str = "Add Documents";
pub const WATCHED_PATH_LABEL: &str = r"Watching: C:\Users\Grandma\Documents\Lindley";

/// One element of the fixed visual tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewNode {
    Heading(&'static str),
    Button(&'static str),
    Text(&'static str),
}

impl ViewNode {
    pub fn is_interactive(&self) -> bool {
        matches!(self, ViewNode::Button(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HomeView<'a> {
    theme: &'a Theme,
}

impl<'a> HomeView<'a> {
    /// Rows needed at `width`: heading, gap, 3-row button, gap, label.
    /// Heading and label take extra rows when they don't fit on one.
    pub fn height(width: u16) -> u16 {
        let heading = split_rows(HEADING, width).len() as u16;
        let label = split_rows(WATCHED_PATH_LABEL, width).len() as u16;
        heading + 5 + label
    }

    pub fn new(theme: &'a Theme) -> Self {
        Self { theme }
    }

    pub fn tree() -> [ViewNode; 3] {
        [
            ViewNode::Heading(HEADING),
            ViewNode::Button(BUTTON_LABEL),
            ViewNode::Text(WATCHED_PATH_LABEL),
        ]
    }

    /// Pressing the button. There is no handler.
    pub fn activate() {}

    fn button_area(area: Rect) -> Rect {
        let width = (BUTTON_LABEL.len() as u16 + 6).min(area.width);
        Rect {
            x: area.x + (area.width - width) / 2,
            width,
            ..area
        }
    }
}

impl Widget for HomeView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let heading_rows = split_rows(HEADING, area.width).len() as u16;
        let label_rows = split_rows(WATCHED_PATH_LABEL, area.width).len() as u16;
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(heading_rows),
                Constraint::Length(1),
                Constraint::Length(3), // Button
                Constraint::Length(1),
                Constraint::Length(label_rows), // Watched path
            ])
            .split(area);

        for node in Self::tree() {
            match node {
                ViewNode::Heading(text) => {
                    literal(text, area.width)
                        .style(
                            Style::default()
                                .fg(self.theme.heading)
                                .add_modifier(Modifier::BOLD),
                        )
                        .render(rows[0], buf);
                }
                ViewNode::Button(label) => {
                    Paragraph::new(label)
                        .alignment(Alignment::Center)
                        .style(
                            Style::default()
                                .fg(self.theme.button_text)
                                .bg(self.theme.button),
                        )
                        .block(
                            Block::default()
                                .borders(Borders::ALL)
                                .border_type(BorderType::Rounded)
                                .border_style(Style::default().fg(self.theme.button)),
                        )
                        .render(Self::button_area(rows[2]), buf);
                }
                ViewNode::Text(text) => {
                    literal(text, area.width)
                        .style(Style::default().fg(self.theme.text_dim))
                        .render(rows[4], buf);
                }
            }
        }
    }
}

/// Break `text` into rows of at most `width` columns without dropping or
/// reordering any character, so the rows read back as the exact literal.
fn split_rows(text: &str, width: u16) -> Vec<String> {
    let width = usize::from(width.max(1));
    let mut rows = Vec::new();
    let mut row = String::new();
    let mut used = 0;

    for ch in text.chars() {
        let ch_width = Span::raw(ch.to_string()).width();
        if used + ch_width > width && !row.is_empty() {
            rows.push(std::mem::take(&mut row));
            used = 0;
        }
        row.push(ch);
        used += ch_width;
    }
    if !row.is_empty() {
        rows.push(row);
    }
    rows
}

/// Centered when the literal fits on one row, left-aligned rows otherwise
fn literal(text: &'static str, width: u16) -> Paragraph<'static> {
    let rows = split_rows(text, width);
    let alignment = if rows.len() > 1 {
        Alignment::Left
    } else {
        Alignment::Center
    };
    Paragraph::new(rows.into_iter().map(Line::from).collect::<Vec<_>>()).alignment(alignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(width: u16) -> Buffer {
        let theme = Theme::default();
        let area = Rect::new(0, 0, width, HomeView::height(width));
        let mut buf = Buffer::empty(area);
        HomeView::new(&theme).render(area, &mut buf);
        buf
    }

    fn rows(buf: &Buffer) -> Vec<String> {
        let area = buf.area;
        (area.top()..area.bottom())
            .map(|y| {
                (area.left()..area.right())
                    .map(|x| buf[(x, y)].symbol())
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn test_tree_has_fixed_literals() {
        let tree = HomeView::tree();
        assert_eq!(tree[0], ViewNode::Heading("📚 Lindley Archives"));
        assert_eq!(tree[1], ViewNode::Button("Add Documents"));
        assert_eq!(
            tree[2],
            ViewNode::Text("Watching: C:\\Users\\Grandma\\Documents\\Lindley")
        );
    }

    #[test]
    fn test_exactly_one_interactive_control() {
        let controls: Vec<ViewNode> = HomeView::tree()
            .into_iter()
            .filter(ViewNode::is_interactive)
            .collect();
        assert_eq!(controls, vec![ViewNode::Button(BUTTON_LABEL)]);
    }

    #[test]
    fn test_rendered_output_contains_every_element() {
        let buf = render(60);
        let rows = rows(&buf);

        assert!(rows[0].contains("📚"));
        assert!(rows[0].contains("Lindley Archives"));
        assert_eq!(rows.iter().filter(|r| r.contains(BUTTON_LABEL)).count(), 1);
        assert!(rows[3].contains(BUTTON_LABEL));
        assert!(rows[6].contains(WATCHED_PATH_LABEL));
    }

    #[test]
    fn test_narrow_render_keeps_full_literals() {
        for width in [20, 30, 40, 43] {
            let buf = render(width);
            let rows = rows(&buf);
            // label rows are the last ones; read back as one run of text
            let label_rows = split_rows(WATCHED_PATH_LABEL, width).len();
            let label: String = rows[rows.len() - label_rows..].concat();

            assert!(label_rows > 1, "width {}", width);
            assert!(label.contains(WATCHED_PATH_LABEL), "width {}: {:?}", width, rows);
            assert!(rows[0].contains("Lindley Archives"), "width {}", width);
            assert_eq!(rows.iter().filter(|r| r.contains(BUTTON_LABEL)).count(), 1);
        }
    }

    #[test]
    fn test_height_grows_only_when_needed() {
        assert_eq!(HomeView::height(60), 7);
        assert_eq!(HomeView::height(44), 7);
        assert_eq!(HomeView::height(43), 8);
        assert_eq!(HomeView::height(20), 9);
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render(60), render(60));
        assert_eq!(render(80), render(80));
    }

    #[test]
    fn test_activate_changes_nothing() {
        let theme = Theme::default();
        let view = HomeView::new(&theme);
        let area = Rect::new(0, 0, 60, HomeView::height(60));

        let mut before = Buffer::empty(area);
        view.render(area, &mut before);
        HomeView::activate();
        HomeView::activate();
        let mut after = Buffer::empty(area);
        view.render(area, &mut after);

        assert_eq!(before, after);
    }
}
