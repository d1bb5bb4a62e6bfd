//! Minimal PDF 1.4 writer.
//!
//! Only what the documents need: A4 pages, Helvetica and Helvetica-Bold with
//! WinAnsi encoding, text, lines and filled rectangles. Content streams are
//! stored uncompressed.

use super::RenderError;
use std::fmt::Write as _;

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

// Advance widths (1/1000 em) for ASCII 32..=126, from the standard AFM files.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, 975, 722, 722, 722, 722, 667,
    611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556,
    278, 889, 611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    fn char_width(self, c: char) -> u16 {
        let table = match self {
            Font::Regular => &HELVETICA_WIDTHS,
            Font::Bold => &HELVETICA_BOLD_WIDTHS,
        };
        let base = fold_accent(c);
        match base as u32 {
            code @ 32..=126 => table[(code - 32) as usize],
            _ => 556,
        }
    }

    /// Width of `text` in points at `size`.
    pub fn text_width(self, text: &str, size: f32) -> f32 {
        let units: u32 = text.chars().map(|c| u32::from(self.char_width(c))).sum();
        units as f32 * size / 1000.0
    }
}

/// Accented Latin letters share the width of their base letter.
fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ä' | 'ã' => 'a',
        'À' | 'Á' | 'Â' | 'Ä' | 'Ã' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'î' | 'ï' | 'í' | 'ì' => 'i',
        'Î' | 'Ï' | 'Í' | 'Ì' => 'I',
        'ô' | 'ö' | 'ó' | 'ò' | 'õ' => 'o',
        'Ô' | 'Ö' | 'Ó' | 'Ò' | 'Õ' => 'O',
        'ù' | 'û' | 'ü' | 'ú' => 'u',
        'Ù' | 'Û' | 'Ü' | 'Ú' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        '’' | '‘' => '\'',
        '«' | '»' => '"',
        '\u{a0}' | '\u{202f}' => ' ',
        '–' => '-',
        other => other,
    }
}

/// Map a char to its WinAnsiEncoding byte, if it has one.
fn win_ansi(c: char) -> Option<u8> {
    let code = c as u32;
    match c {
        '€' => Some(0x80),
        '‚' => Some(0x82),
        '„' => Some(0x84),
        '…' => Some(0x85),
        '‘' => Some(0x91),
        '’' => Some(0x92),
        '“' => Some(0x93),
        '”' => Some(0x94),
        '•' => Some(0x95),
        '–' => Some(0x96),
        '—' => Some(0x97),
        'œ' => Some(0x9C),
        'Œ' => Some(0x8C),
        '\u{202f}' => Some(0xA0),
        _ if (0x20..0x7F).contains(&code) || (0xA0..=0xFF).contains(&code) => Some(code as u8),
        _ => None,
    }
}

/// Encode `text` as a PDF literal string body.
fn encode_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match win_ansi(c) {
            Some(b @ (b'(' | b')' | b'\\')) => {
                out.push(b'\\');
                out.push(b);
            }
            Some(b) => out.push(b),
            None => out.push(b'?'),
        }
    }
    out
}

/// Pages under construction. Coordinates are PDF points from the bottom-left
/// corner; `cursor` is a top-down layout position maintained by callers.
pub struct PdfCanvas {
    pages: Vec<Vec<u8>>,
    current: Vec<u8>,
    cursor: f32,
}

impl Default for PdfCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfCanvas {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    pub fn set_cursor(&mut self, y: f32) {
        self.cursor = y;
    }

    /// Move the cursor down.
    pub fn advance(&mut self, dy: f32) {
        self.cursor -= dy;
    }

    /// Vertical space left above the bottom margin.
    pub fn remaining(&self) -> f32 {
        self.cursor - MARGIN
    }

    pub fn page_count(&self) -> usize {
        self.pages.len() + 1
    }

    pub fn new_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.cursor = PAGE_HEIGHT - MARGIN;
    }

    fn op(&mut self, op: &str) {
        self.current.extend_from_slice(op.as_bytes());
        self.current.push(b'\n');
    }

    /// Text with its baseline at `y`.
    pub fn text(&mut self, x: f32, y: f32, font: Font, size: f32, text: &str) {
        if text.is_empty() {
            return;
        }
        self.op(&format!("BT /{} {size:.1} Tf {x:.2} {y:.2} Td (", font.resource()));
        // Undo the newline `op` appended; the string continues on this line.
        self.current.pop();
        self.current.extend_from_slice(&encode_text(text));
        self.op(") Tj ET");
    }

    pub fn text_centered(&mut self, y: f32, font: Font, size: f32, text: &str) {
        let x = (PAGE_WIDTH - font.text_width(text, size)) / 2.0;
        self.text(x.max(MARGIN), y, font, size, text);
    }

    pub fn text_right(&mut self, right: f32, y: f32, font: Font, size: f32, text: &str) {
        let x = right - font.text_width(text, size);
        self.text(x, y, font, size, text);
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.op(&format!("0.5 w {x1:.2} {y1:.2} m {x2:.2} {y2:.2} l S"));
    }

    /// Rectangle outline, optionally filled with a grey level (0 black, 1 white).
    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, fill: Option<f32>) {
        if let Some(grey) = fill {
            self.op(&format!("{grey:.2} g {x:.2} {y:.2} {w:.2} {h:.2} re f 0 g"));
        }
        self.op(&format!("0.5 w {x:.2} {y:.2} {w:.2} {h:.2} re S"));
    }

    /// Serialize every page into a complete PDF file.
    pub fn finish(mut self) -> Result<Vec<u8>, RenderError> {
        self.pages.push(std::mem::take(&mut self.current));
        let page_count = self.pages.len();

        // 1 catalog, 2 pages, 3-4 fonts, then a (page, content) pair per page.
        let mut objects: Vec<Vec<u8>> = Vec::with_capacity(4 + 2 * page_count);
        objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());

        let mut kids = String::new();
        for i in 0..page_count {
            write!(kids, "{} 0 R ", 5 + 2 * i).map_err(fmt_error)?;
        }
        objects.push(
            format!("<< /Type /Pages /Kids [{}] /Count {page_count} >>", kids.trim_end())
                .into_bytes(),
        );
        for base in ["Helvetica", "Helvetica-Bold"] {
            objects.push(
                format!(
                    "<< /Type /Font /Subtype /Type1 /BaseFont /{base} /Encoding /WinAnsiEncoding >>"
                )
                .into_bytes(),
            );
        }
        for (i, content) in self.pages.iter().enumerate() {
            objects.push(
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                     /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                    6 + 2 * i
                )
                .into_bytes(),
            );
            let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
            stream.extend_from_slice(content);
            stream.extend_from_slice(b"\nendstream");
            objects.push(stream);
        }

        let mut out: Vec<u8> = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_at = out.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            write!(xref, "{offset:010} 00000 n \n").map_err(fmt_error)?;
        }
        write!(
            xref,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .map_err(fmt_error)?;
        out.extend_from_slice(xref.as_bytes());
        Ok(out)
    }
}

fn fmt_error(e: std::fmt::Error) -> RenderError {
    RenderError::Backend(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn test_widths() {
        assert!((Font::Regular.text_width("0", 10.0) - 5.56).abs() < 0.001);
        assert!(Font::Bold.text_width("Total", 10.0) > Font::Regular.text_width("Total", 10.0));
        assert_eq!(
            Font::Regular.text_width("é", 12.0),
            Font::Regular.text_width("e", 12.0)
        );
    }

    #[test]
    fn test_encoding_escapes_and_maps_latin1() {
        assert_eq!(encode_text("a(b)\\"), b"a\\(b\\)\\\\".to_vec());
        assert_eq!(encode_text("é"), vec![0xE9]);
        assert_eq!(encode_text("–"), vec![0x96]);
        assert_eq!(encode_text("漢"), b"?".to_vec());
    }

    #[test]
    fn test_document_structure() {
        let mut canvas = PdfCanvas::new();
        canvas.text(MARGIN, 800.0, Font::Bold, 12.0, "Page une");
        canvas.new_page();
        canvas.text(MARGIN, 800.0, Font::Regular, 12.0, "Page deux");
        assert_eq!(canvas.page_count(), 2);

        let pdf = canvas.finish().unwrap();
        let text = as_text(&pdf);
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("/Count 2"));
        assert!(text.contains("/BaseFont /Helvetica-Bold"));
        assert!(text.contains("(Page deux) Tj"));

        // startxref points at the xref table.
        let start = text.rfind("startxref\n").unwrap() + "startxref\n".len();
        let offset: usize = text[start..].lines().next().unwrap().parse().unwrap();
        assert!(pdf[offset..].starts_with(b"xref"));
    }
}
