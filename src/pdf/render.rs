use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};
use std::io::{BufWriter, Cursor, Write};

use crate::error::{InvoiceError, Result};

use super::layout::{DocumentLayout, PaintOp, Rect};
use super::metrics::{BuiltinFace, FontFace, FontSet, FontStyle};

const TOLERANCE: f32 = 0.5;

struct FaceRefs {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

impl FaceRefs {
    fn register(doc: &PdfDocumentReference, fonts: &FontSet) -> Result<Self> {
        Ok(Self {
            regular: register_face(doc, fonts.face(FontStyle::Regular))?,
            bold: register_face(doc, fonts.face(FontStyle::Bold))?,
            italic: register_face(doc, fonts.face(FontStyle::Italic))?,
        })
    }

    fn get(&self, style: FontStyle) -> &IndirectFontRef {
        match style {
            FontStyle::Regular => &self.regular,
            FontStyle::Bold => &self.bold,
            FontStyle::Italic => &self.italic,
        }
    }
}

fn register_face(doc: &PdfDocumentReference, face: &FontFace) -> Result<IndirectFontRef> {
    let added = match (face.embedded_bytes(), face.builtin_face()) {
        (Some(bytes), _) => doc.add_external_font(Cursor::new(bytes)),
        (None, Some(builtin)) => doc.add_builtin_font(match builtin {
            BuiltinFace::Helvetica => BuiltinFont::Helvetica,
            BuiltinFace::HelveticaBold => BuiltinFont::HelveticaBold,
            BuiltinFace::HelveticaOblique => BuiltinFont::HelveticaOblique,
        }),
        (None, None) => return Err(InvoiceError::fault("font face has neither bytes nor a builtin fallback")),
    };
    added.map_err(|e| InvoiceError::Font(e.to_string()))
}

fn finite(values: &[f32]) -> bool {
    values.iter().all(|v| v.is_finite())
}

fn check_rect(rect: &Rect, w: f32, h: f32) -> bool {
    finite(&[rect.x, rect.y, rect.width, rect.height])
        && rect.width >= 0.0
        && rect.height >= 0.0
        && rect.x >= -TOLERANCE
        && rect.y >= -TOLERANCE
        && rect.right() <= w + TOLERANCE
        && rect.bottom() <= h + TOLERANCE
}

fn check_op(op: &PaintOp, w: f32, h: f32) -> bool {
    let inside = |x: f32, y: f32| (-TOLERANCE..=w + TOLERANCE).contains(&x) && (-TOLERANCE..=h + TOLERANCE).contains(&y);
    match op {
        PaintOp::Text { x, baseline, size, .. } => {
            finite(&[*x, *baseline, *size]) && *size > 0.0 && inside(*x, *baseline)
        }
        PaintOp::Line { x1, y1, x2, y2, thickness } => {
            finite(&[*x1, *y1, *x2, *y2, *thickness]) && inside(*x1, *y1) && inside(*x2, *y2)
        }
        PaintOp::Fill { rect, gray } => gray.is_finite() && check_rect(rect, w, h),
    }
}

/// The renderer trusts layout for placement but not for sanity: any broken
/// geometry is a layout bug and aborts before a byte is written.
fn check_geometry(layout: &DocumentLayout) -> Result<()> {
    let (w, h) = (layout.page_width, layout.page_height);
    if !(finite(&[w, h]) && w > 0.0 && h > 0.0) {
        return Err(InvoiceError::fault(format!("invalid page size {w}x{h}")));
    }
    if layout.pages.is_empty() {
        return Err(InvoiceError::fault("layout produced no pages"));
    }
    for page in &layout.pages {
        for b in &page.boxes {
            if !check_rect(&b.rect, w, h) {
                return Err(InvoiceError::fault(format!(
                    "{:?} box on page {} has invalid geometry {:?}",
                    b.kind, page.number, b.rect
                )));
            }
            if b.ops.is_empty() {
                return Err(InvoiceError::fault(format!(
                    "{:?} box on page {} has no paint instructions",
                    b.kind, page.number
                )));
            }
            if let Some(op) = b.ops.iter().find(|op| !check_op(op, w, h)) {
                return Err(InvoiceError::fault(format!(
                    "{:?} box on page {} has an op outside the page: {op:?}",
                    b.kind, page.number
                )));
            }
        }
    }
    Ok(())
}

fn point(x: f32, y: f32) -> (Point, bool) {
    (Point::new(Mm(x), Mm(y)), false)
}

fn paint(layer: &PdfLayerReference, faces: &FaceRefs, page_h: f32, op: &PaintOp) {
    // printpdf uses a bottom-left origin; layout is top-down.
    match op {
        PaintOp::Text {
            x,
            baseline,
            text,
            size,
            style,
        } => {
            layer.use_text(text.as_str(), *size, Mm(*x), Mm(page_h - baseline), faces.get(*style));
        }
        PaintOp::Line {
            x1,
            y1,
            x2,
            y2,
            thickness,
        } => {
            layer.set_outline_thickness(*thickness);
            layer.add_line(Line {
                points: vec![point(*x1, page_h - y1), point(*x2, page_h - y2)],
                is_closed: false,
            });
        }
        PaintOp::Fill { rect, gray } => {
            layer.set_fill_color(Color::Rgb(Rgb::new(*gray, *gray, *gray, None)));
            let r = printpdf::Rect::new(
                Mm(rect.x),
                Mm(page_h - rect.bottom()),
                Mm(rect.right()),
                Mm(page_h - rect.y),
            )
            .with_mode(PaintMode::Fill);
            layer.add_rect(r);
            layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        }
    }
}

/// Paints every page in layout order and streams the document into `out`.
pub fn render<W: Write>(layout: &DocumentLayout, fonts: &FontSet, out: W) -> Result<()> {
    check_geometry(layout)?;

    let (w, h) = (layout.page_width, layout.page_height);
    let (doc, first_page, first_layer) = PdfDocument::new(&layout.title, Mm(w), Mm(h), "Layer 1");
    let faces = FaceRefs::register(&doc, fonts)?;

    let mut targets = vec![(first_page, first_layer)];
    for _ in 1..layout.pages.len() {
        targets.push(doc.add_page(Mm(w), Mm(h), "Layer 1"));
    }

    for (page, (page_idx, layer_idx)) in layout.pages.iter().zip(targets) {
        let layer = doc.get_page(page_idx).get_layer(layer_idx);
        for op in page.boxes.iter().flat_map(|b| b.ops.iter()) {
            paint(&layer, &faces, h, op);
        }
    }

    let mut writer = BufWriter::new(out);
    doc.save(&mut writer)
        .map_err(|e| InvoiceError::fault(format!("failed to write PDF: {e}")))?;
    writer.flush()?;
    Ok(())
}

pub fn render_to_vec(layout: &DocumentLayout, fonts: &FontSet) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    render(layout, fonts, &mut bytes)?;
    Ok(bytes)
}
