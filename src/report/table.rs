//! Tables drawn on a [`PdfCanvas`].
//!
//! Cells wrap on word boundaries, each row is as tall as its tallest cell,
//! and a row that does not fit starts a new page with the header redrawn.

use super::pdf::{Font, PdfCanvas, MARGIN};

const FONT_SIZE: f32 = 9.0;
const LINE_HEIGHT: f32 = 11.0;
const PADDING: f32 = 4.0;
const HEADER_FILL: f32 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub header: String,
    pub width: f32,
    pub align: Align,
}

impl Column {
    pub fn new(header: impl Into<String>, width: f32, align: Align) -> Self {
        Self {
            header: header.into(),
            width,
            align,
        }
    }
}

/// Split `text` into lines no wider than `max_width`. Words longer than a
/// line are broken by character.
pub fn wrap_text(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if font.text_width(&candidate, size) <= max_width {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if font.text_width(word, size) <= max_width {
                line = word.to_string();
            } else {
                for c in word.chars() {
                    let mut next = line.clone();
                    next.push(c);
                    if !line.is_empty() && font.text_width(&next, size) > max_width {
                        lines.push(std::mem::take(&mut line));
                        line.push(c);
                    } else {
                        line = next;
                    }
                }
            }
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Missing cells render empty; extra cells are ignored.
    pub fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn width(&self) -> f32 {
        self.columns.iter().map(|c| c.width).sum()
    }

    fn wrapped(&self, cells: &[String], font: Font) -> Vec<Vec<String>> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let text = cells.get(i).map(String::as_str).unwrap_or_default();
                wrap_text(text, font, FONT_SIZE, col.width - 2.0 * PADDING)
            })
            .collect()
    }

    fn height_of(wrapped: &[Vec<String>]) -> f32 {
        let lines = wrapped.iter().map(Vec::len).max().unwrap_or(1);
        lines as f32 * LINE_HEIGHT + 2.0 * PADDING
    }

    fn draw_row(&self, canvas: &mut PdfCanvas, wrapped: &[Vec<String>], font: Font, fill: Option<f32>) {
        let height = Self::height_of(wrapped);
        let top = canvas.cursor();
        let mut x = MARGIN;
        for (col, lines) in self.columns.iter().zip(wrapped) {
            canvas.rect(x, top - height, col.width, height, fill);
            let mut baseline = top - PADDING - FONT_SIZE;
            for line in lines {
                match col.align {
                    Align::Left => canvas.text(x + PADDING, baseline, font, FONT_SIZE, line),
                    Align::Right => {
                        canvas.text_right(x + col.width - PADDING, baseline, font, FONT_SIZE, line)
                    }
                    Align::Center => {
                        let w = font.text_width(line, FONT_SIZE);
                        canvas.text(x + (col.width - w) / 2.0, baseline, font, FONT_SIZE, line);
                    }
                }
                baseline -= LINE_HEIGHT;
            }
            x += col.width;
        }
        canvas.advance(height);
    }

    /// Draw from the canvas cursor, breaking pages as needed.
    pub fn draw(&self, canvas: &mut PdfCanvas) {
        let header_cells: Vec<String> = self.columns.iter().map(|c| c.header.clone()).collect();
        let header = self.wrapped(&header_cells, Font::Bold);
        let header_height = Self::height_of(&header);

        let first_row_height = self
            .rows
            .first()
            .map_or(0.0, |r| Self::height_of(&self.wrapped(r, Font::Regular)));
        if canvas.remaining() < header_height + first_row_height {
            canvas.new_page();
        }
        self.draw_row(canvas, &header, Font::Bold, Some(HEADER_FILL));

        for cells in &self.rows {
            let wrapped = self.wrapped(cells, Font::Regular);
            if canvas.remaining() < Self::height_of(&wrapped) {
                canvas.new_page();
                self.draw_row(canvas, &header, Font::Bold, Some(HEADER_FILL));
            }
            self.draw_row(canvas, &wrapped, Font::Regular, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("N°", 30.0, Align::Center),
            Column::new("Nom complet", 250.0, Align::Left),
            Column::new("Montant", 100.0, Align::Right),
        ]
    }

    #[test]
    fn test_wrap_respects_width() {
        let text = "Frais de scolarité du premier trimestre et fournitures diverses";
        let lines = wrap_text(text, Font::Regular, 9.0, 80.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(Font::Regular.text_width(line, 9.0) <= 80.0, "{line:?} too wide");
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn test_wrap_breaks_long_words_and_keeps_empty() {
        let lines = wrap_text("AAAAAAAAAAAAAAAAAAAAAAAAAAAA", Font::Bold, 9.0, 40.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), "AAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        assert_eq!(wrap_text("", Font::Regular, 9.0, 40.0), vec![String::new()]);
    }

    #[test]
    fn test_long_table_repeats_header_on_each_page() {
        let mut table = Table::new(columns());
        for i in 0..120 {
            table.row([format!("{}", i + 1), format!("ÉLÈVE {i}"), "25 000".to_string()]);
        }
        let mut canvas = PdfCanvas::new();
        table.draw(&mut canvas);
        let pages = canvas.page_count();
        assert!(pages >= 2);

        let pdf = String::from_utf8_lossy(&canvas.finish().unwrap()).into_owned();
        assert_eq!(pdf.matches("(Nom complet) Tj").count(), pages);
    }

    #[test]
    fn test_tall_rows_grow() {
        let short = vec![vec!["a".to_string()]];
        let tall = vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]];
        assert!(Table::height_of(&tall) > Table::height_of(&short));
    }
}
