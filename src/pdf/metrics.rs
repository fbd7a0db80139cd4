//! Text measurement shared by layout and painting.
//!
//! Widths come either from the standard Helvetica family (the PDF base-14
//! fonts, painted without embedding) or from TrueType files configured under
//! `[fonts]`. Whatever the source, the renderer embeds exactly the face that
//! was measured here, so a wrapped line never overflows its box.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::FontConfig;
use crate::error::{InvoiceError, Result};

/// PDF font sizes are in points; layout coordinates are in millimeters.
pub const PT_TO_MM: f32 = 25.4 / 72.0;

/// Baseline-to-baseline distance as a multiple of the font size.
pub const LINE_SPACING: f32 = 1.36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub line_count: usize,
    pub total_height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFace {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
}

// Advance widths for U+0020..=U+007E, in 1/1000 em (Adobe AFM).
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 0..?
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // P.._
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // `..o
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // p..~
];

const HELVETICA_ASCENT: f32 = 718.0;
const HELVETICA_DEFAULT_WIDTH: u16 = 556;

/// Latin-1 letters are as wide as their unaccented base letter in Helvetica.
fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ý' | 'ÿ' => 'y',
        'Ý' => 'Y',
        'º' | 'ª' => 'o',
        other => other,
    }
}

impl BuiltinFace {
    fn advance(self, ch: char) -> u16 {
        let table = match self {
            Self::Helvetica | Self::HelveticaOblique => &HELVETICA_WIDTHS,
            Self::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
        };
        let code = fold_accent(ch) as u32;
        if (0x20..=0x7e).contains(&code) {
            table[(code - 0x20) as usize]
        } else {
            HELVETICA_DEFAULT_WIDTH
        }
    }
}

#[derive(Debug, Clone)]
struct TrueTypeMetrics {
    advances: HashMap<char, u16>,
    units_per_em: f32,
    ascender: f32,
    /// Advance of glyph 0, which the embedded font paints for unmapped characters.
    notdef_advance: u16,
}

impl TrueTypeMetrics {
    fn parse(data: &[u8], origin: &str) -> Result<Self> {
        let face = ttf_parser::Face::parse(data, 0)
            .map_err(|e| InvoiceError::Font(format!("failed to parse {origin}: {e}")))?;
        let units_per_em = face.units_per_em() as f32;
        if units_per_em <= 0.0 {
            return Err(InvoiceError::Font(format!("{origin} has no units per em")));
        }

        let mut advances = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|cp| {
                    let Some(ch) = char::from_u32(cp) else {
                        return;
                    };
                    if let Some(gid) = subtable.glyph_index(cp) {
                        advances
                            .entry(ch)
                            .or_insert_with(|| face.glyph_hor_advance(gid).unwrap_or(0));
                    }
                });
            }
        }

        Ok(Self {
            advances,
            units_per_em,
            ascender: face.ascender() as f32,
            notdef_advance: face.glyph_hor_advance(ttf_parser::GlyphId(0)).unwrap_or(0),
        })
    }

    fn advance(&self, ch: char) -> u16 {
        self.advances.get(&ch).copied().unwrap_or(self.notdef_advance)
    }
}

#[derive(Debug, Clone)]
enum Metrics {
    Builtin(BuiltinFace),
    TrueType(TrueTypeMetrics),
}

/// One measured face plus what the renderer needs to paint it.
#[derive(Debug, Clone)]
pub struct FontFace {
    metrics: Metrics,
    data: Option<Arc<Vec<u8>>>,
}

impl FontFace {
    pub fn builtin(face: BuiltinFace) -> Self {
        Self {
            metrics: Metrics::Builtin(face),
            data: None,
        }
    }

    pub fn from_bytes(data: Vec<u8>, origin: &str) -> Result<Self> {
        let metrics = TrueTypeMetrics::parse(&data, origin)?;
        Ok(Self {
            metrics: Metrics::TrueType(metrics),
            data: Some(Arc::new(data)),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| InvoiceError::Font(format!("failed to read {}: {e}", path.display())))?;
        Self::from_bytes(data, &path.display().to_string())
    }

    /// The base-14 face to reference when nothing is embedded.
    pub fn builtin_face(&self) -> Option<BuiltinFace> {
        match self.metrics {
            Metrics::Builtin(face) => Some(face),
            Metrics::TrueType(_) => None,
        }
    }

    /// Raw TrueType bytes to embed, if this face came from a file.
    pub fn embedded_bytes(&self) -> Option<&[u8]> {
        self.data.as_deref().map(Vec::as_slice)
    }

    pub fn text_width(&self, text: &str, size_pt: f32) -> f32 {
        let width_em = match &self.metrics {
            Metrics::Builtin(face) => {
                text.chars().map(|ch| face.advance(ch) as f32).sum::<f32>() / 1000.0
            }
            Metrics::TrueType(tt) => {
                let units: u32 = text.chars().map(|ch| tt.advance(ch) as u32).sum();
                units as f32 / tt.units_per_em
            }
        };
        width_em * size_pt * PT_TO_MM
    }

    pub fn ascent(&self, size_pt: f32) -> f32 {
        let em = match &self.metrics {
            Metrics::Builtin(_) => HELVETICA_ASCENT / 1000.0,
            Metrics::TrueType(tt) => tt.ascender / tt.units_per_em,
        };
        em * size_pt * PT_TO_MM
    }
}

/// The three faces a document uses.
#[derive(Debug, Clone)]
pub struct FontSet {
    regular: FontFace,
    bold: FontFace,
    italic: FontFace,
}

impl Default for FontSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FontSet {
    pub fn builtin() -> Self {
        Self {
            regular: FontFace::builtin(BuiltinFace::Helvetica),
            bold: FontFace::builtin(BuiltinFace::HelveticaBold),
            italic: FontFace::builtin(BuiltinFace::HelveticaOblique),
        }
    }

    pub fn new(regular: FontFace, bold: FontFace, italic: FontFace) -> Self {
        Self {
            regular,
            bold,
            italic,
        }
    }

    /// Styles without a configured file fall back to their Helvetica face.
    pub fn from_config(config: &FontConfig) -> Result<Self> {
        let load = |path: &Option<std::path::PathBuf>, fallback: BuiltinFace| -> Result<FontFace> {
            match path {
                Some(p) => {
                    tracing::info!(font = %p.display(), "loading TrueType font");
                    FontFace::from_file(p)
                }
                None => Ok(FontFace::builtin(fallback)),
            }
        };
        Ok(Self {
            regular: load(&config.regular, BuiltinFace::Helvetica)?,
            bold: load(&config.bold, BuiltinFace::HelveticaBold)?,
            italic: load(&config.italic, BuiltinFace::HelveticaOblique)?,
        })
    }

    pub fn face(&self, style: FontStyle) -> &FontFace {
        match style {
            FontStyle::Regular => &self.regular,
            FontStyle::Bold => &self.bold,
            FontStyle::Italic => &self.italic,
        }
    }

    pub fn text_width(&self, text: &str, style: FontStyle, size_pt: f32) -> f32 {
        self.face(style).text_width(text, size_pt)
    }

    pub fn ascent(&self, style: FontStyle, size_pt: f32) -> f32 {
        self.face(style).ascent(size_pt)
    }

    pub fn line_height(size_pt: f32) -> f32 {
        size_pt * PT_TO_MM * LINE_SPACING
    }

    /// Hard breaks on `\n`, then greedy word wrap inside each logical line.
    ///
    /// Blank logical lines between text are kept as empty lines; leading and
    /// trailing blank lines are dropped, so whitespace-only input yields no lines.
    pub fn wrap(&self, text: &str, style: FontStyle, size_pt: f32, max_width: f32) -> Vec<String> {
        let logical: Vec<&str> = text
            .split('\n')
            .map(|l| l.trim_end_matches('\r').trim())
            .collect();
        let Some(first) = logical.iter().position(|l| !l.is_empty()) else {
            return Vec::new();
        };
        let last = logical.iter().rposition(|l| !l.is_empty()).unwrap_or(first);

        let face = self.face(style);
        let mut out = Vec::new();
        for line in &logical[first..=last] {
            if line.is_empty() {
                out.push(String::new());
            } else {
                out.extend(wrap_line(face, line, size_pt, max_width));
            }
        }
        out
    }

    pub fn measure(&self, text: &str, style: FontStyle, size_pt: f32, max_width: f32) -> Measurement {
        let line_count = self.wrap(text, style, size_pt, max_width).len();
        Measurement {
            line_count,
            total_height: line_count as f32 * Self::line_height(size_pt),
        }
    }

    /// Shortens `text` with a trailing "..." until it fits in `max_width`.
    pub fn truncate(&self, text: &str, style: FontStyle, size_pt: f32, max_width: f32) -> String {
        const ELLIPSIS: &str = "...";
        let face = self.face(style);
        if face.text_width(text, size_pt) <= max_width {
            return text.to_string();
        }
        let mut kept: Vec<char> = text.chars().collect();
        while !kept.is_empty() {
            kept.pop();
            let candidate = format!("{}{ELLIPSIS}", kept.iter().collect::<String>().trim_end());
            if face.text_width(&candidate, size_pt) <= max_width {
                return candidate;
            }
        }
        ELLIPSIS.to_string()
    }
}

fn split_long_word(face: &FontFace, word: &str, size_pt: f32, max_width: f32) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut chunk = String::new();
    for ch in word.chars() {
        let candidate = format!("{chunk}{ch}");
        if face.text_width(&candidate, size_pt) <= max_width {
            chunk = candidate;
        } else {
            if !chunk.is_empty() {
                chunks.push(std::mem::take(&mut chunk));
            }
            chunk = ch.to_string();
        }
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

fn wrap_line(face: &FontFace, line: &str, size_pt: f32, max_width: f32) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in line.split_whitespace() {
        if !current.is_empty() {
            let candidate = format!("{current} {word}");
            if face.text_width(&candidate, size_pt) <= max_width {
                current = candidate;
                continue;
            }
            out.push(std::mem::take(&mut current));
        }

        if face.text_width(word, size_pt) <= max_width {
            current.push_str(word);
        } else {
            // A single word wider than the column is split by characters.
            let mut chunks = split_long_word(face, word, size_pt, max_width);
            current = chunks.pop().unwrap_or_default();
            out.extend(chunks);
        }
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: f32 = 10.0;

    #[test]
    fn builtin_widths_follow_afm() {
        let fonts = FontSet::builtin();
        let w = fonts.text_width("0000", FontStyle::Regular, SIZE);
        assert!((w - 4.0 * 0.556 * SIZE * PT_TO_MM).abs() < 1e-4);
        assert!(fonts.text_width("Invoice", FontStyle::Bold, SIZE) > fonts.text_width("Invoice", FontStyle::Regular, SIZE));
        assert_eq!(
            fonts.text_width("Serviços", FontStyle::Regular, SIZE),
            fonts.text_width("Servicos", FontStyle::Regular, SIZE)
        );
    }

    #[test]
    fn empty_text_has_no_lines() {
        let fonts = FontSet::builtin();
        let m = fonts.measure("  \n \r\n", FontStyle::Regular, SIZE, 50.0);
        assert_eq!(m.line_count, 0);
        assert_eq!(m.total_height, 0.0);
    }

    #[test]
    fn explicit_breaks_are_hard() {
        let fonts = FontSet::builtin();
        let lines = fonts.wrap("first\r\n\nthird", FontStyle::Regular, SIZE, 500.0);
        assert_eq!(lines, vec!["first".to_string(), String::new(), "third".to_string()]);
    }

    #[test]
    fn greedy_wrap_stays_inside_width() {
        let fonts = FontSet::builtin();
        let text = "Monthly reconciliation of card acquiring fees across all merchant accounts";
        let max = 40.0;
        let lines = fonts.wrap(text, FontStyle::Regular, SIZE, max);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(fonts.text_width(line, FontStyle::Regular, SIZE) <= max);
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn long_word_is_split_by_characters() {
        let fonts = FontSet::builtin();
        let lines = fonts.wrap("BR150000000000001093284081", FontStyle::Regular, SIZE, 15.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), "BR150000000000001093284081");
    }

    #[test]
    fn narrower_width_never_needs_fewer_lines() {
        let fonts = FontSet::builtin();
        let text = "Setup of settlement accounts and onboarding of the finance team";
        let wide = fonts.measure(text, FontStyle::Regular, SIZE, 80.0);
        let narrow = fonts.measure(text, FontStyle::Regular, SIZE, 30.0);
        assert!(narrow.line_count >= wide.line_count);
        assert!(narrow.total_height >= wide.total_height);
    }

    #[test]
    fn measurement_is_deterministic() {
        let fonts = FontSet::builtin();
        let text = "Consulting services\nPhase 2";
        let a = fonts.measure(text, FontStyle::Italic, 8.3, 33.3);
        let b = fonts.measure(text, FontStyle::Italic, 8.3, 33.3);
        assert_eq!(a, b);
    }

    #[test]
    fn truncate_adds_ellipsis_only_when_needed() {
        let fonts = FontSet::builtin();
        assert_eq!(fonts.truncate("30 days", FontStyle::Regular, SIZE, 100.0), "30 days");
        let cut = fonts.truncate("Payment within thirty days of delivery", FontStyle::Regular, SIZE, 25.0);
        assert!(cut.ends_with("..."));
        assert!(fonts.text_width(&cut, FontStyle::Regular, SIZE) <= 25.0);
    }

    #[test]
    fn garbage_bytes_are_a_font_error() {
        let err = FontFace::from_bytes(vec![0, 1, 2, 3], "test.ttf").unwrap_err();
        assert!(matches!(err, InvoiceError::Font(_)));
    }

    #[test]
    fn unmapped_characters_measure_as_notdef() {
        let tt = TrueTypeMetrics {
            advances: HashMap::from([('a', 500)]),
            units_per_em: 1000.0,
            ascender: 800.0,
            notdef_advance: 750,
        };
        assert_eq!(tt.advance('a'), 500);
        assert_eq!(tt.advance('€'), 750);

        let face = FontFace { metrics: Metrics::TrueType(tt), data: None };
        let w = face.text_width("a€", SIZE);
        assert!((w - 1.25 * SIZE * PT_TO_MM).abs() < 1e-4);
    }
}
