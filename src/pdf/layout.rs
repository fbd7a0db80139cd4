//! Invoice layout: turns an [`InvoiceDocumentModel`] into absolute page geometry.
//!
//! Coordinates are millimeters from the top-left corner of an A4 page, y
//! growing downwards. Each section builder is a pure function of the model
//! and the y it starts at; it returns its boxes and the y it ends at. The
//! [`Paginator`] threads that cursor through the fixed section order and
//! starts a new page whenever the next section (or table row) would cross
//! the printable bottom.

use serde::{Deserialize, Serialize};
use time::macros::format_description;

use crate::error::{InvoiceError, Result};
use crate::labels::{labels, Labels};
use crate::model::{
    or_placeholder, present, DocumentKind, InvoiceDocumentModel, Language, LineItem, PLACEHOLDER,
};
use crate::money::{format_currency, format_money, format_qty};

use super::metrics::{FontSet, FontStyle};

pub const PAGE_W: f32 = 210.0;
pub const PAGE_H: f32 = 297.0;
const PAGE_MARGIN_X: f32 = 15.0;
const PAGE_MARGIN_TOP: f32 = 12.0;
const PAGE_MARGIN_BOTTOM: f32 = 12.0;
const FOOTER_H: f32 = 8.0;
const SECTION_GAP: f32 = 4.0;
const COLUMN_GAP: f32 = 6.0;

const CONTENT_LEFT: f32 = PAGE_MARGIN_X;
const CONTENT_RIGHT: f32 = PAGE_W - PAGE_MARGIN_X;
const CONTENT_W: f32 = CONTENT_RIGHT - CONTENT_LEFT;
const BODY_TOP: f32 = PAGE_MARGIN_TOP;
/// Lowest y any body section may reach; the footer band sits below it.
const BODY_BOTTOM: f32 = PAGE_H - PAGE_MARGIN_BOTTOM - FOOTER_H;

const EPSILON: f32 = 0.01;

const CELL_PAD_X: f32 = 1.2;
const CELL_PAD_Y: f32 = 1.8;

const TITLE_SIZE: f32 = 14.0;
const NAME_SIZE: f32 = 11.0;
const SECTION_TITLE_SIZE: f32 = 9.5;
const TEXT_SIZE: f32 = 8.3;
const TABLE_HEADER_SIZE: f32 = 8.0;
const SMALL_SIZE: f32 = 7.2;
const FOOTER_SIZE: f32 = 6.5;

const DETAILS_ROW_H: f32 = 5.6;
const TABLE_HEADER_H: f32 = 7.0;
const MIN_ROW_H: f32 = 7.0;
const TOTALS_ROW_H: f32 = 6.0;
const GRAND_TOTAL_ROW_H: f32 = 7.6;
const LABEL_COL_W: f32 = 38.0;
const BANK_PAD: f32 = 3.0;
const BANK_MIN_H: f32 = 24.0;
const SIGNATURE_COL_W: f32 = 75.0;
const SIGNATURE_SPACE: f32 = 10.0;

const HEADER_FILL_GRAY: f32 = 0.92;
const BANK_FILL_GRAY: f32 = 0.95;

const RULE_HEAVY: f32 = 0.85;
const RULE_REGULAR: f32 = 0.6;
const RULE_HAIRLINE: f32 = 0.4;

/// Table column fractions of the content width; the description takes the remainder.
const COL_SERIAL: f32 = 0.05;
const COL_CODE: f32 = 0.11;
const COL_QTY: f32 = 0.08;
const COL_UNIT: f32 = 0.07;
const COL_UNIT_PRICE: f32 = 0.15;
const COL_TOTAL: f32 = 0.16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// A single paint instruction with every position already resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PaintOp {
    Text {
        x: f32,
        baseline: f32,
        text: String,
        size: f32,
        style: FontStyle,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        thickness: f32,
    },
    Fill {
        rect: Rect,
        gray: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxKind {
    Header,
    Recipient,
    Details,
    TableHeader,
    TableRow,
    Totals,
    Logistics,
    BankInstructions,
    Legal,
    Signature,
    Footer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    pub kind: BoxKind,
    pub rect: Rect,
    pub ops: Vec<PaintOp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub number: usize,
    pub boxes: Vec<LayoutBox>,
}

impl PageLayout {
    pub fn boxes_of(&self, kind: BoxKind) -> impl Iterator<Item = &LayoutBox> {
        self.boxes.iter().filter(move |b| b.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLayout {
    pub title: String,
    pub page_width: f32,
    pub page_height: f32,
    pub pages: Vec<PageLayout>,
}

/// Collects paint ops for one box, resolving alignment against measured widths.
struct Painter<'a> {
    fonts: &'a FontSet,
    ops: Vec<PaintOp>,
}

impl<'a> Painter<'a> {
    fn new(fonts: &'a FontSet) -> Self {
        Self {
            fonts,
            ops: Vec::new(),
        }
    }

    fn text(&mut self, text: &str, style: FontStyle, size: f32, x: f32, baseline: f32) {
        if text.is_empty() {
            return;
        }
        self.ops.push(PaintOp::Text {
            x,
            baseline,
            text: text.to_string(),
            size,
            style,
        });
    }

    fn text_right(&mut self, text: &str, style: FontStyle, size: f32, x_right: f32, baseline: f32) {
        let w = self.fonts.text_width(text, style, size);
        self.text(text, style, size, x_right - w, baseline);
    }

    fn text_centered(&mut self, text: &str, style: FontStyle, size: f32, left: f32, width: f32, baseline: f32) {
        let w = self.fonts.text_width(text, style, size);
        self.text(text, style, size, left + (width - w) / 2.0, baseline);
    }

    fn hline(&mut self, x1: f32, x2: f32, y: f32, thickness: f32) {
        self.ops.push(PaintOp::Line {
            x1,
            y1: y,
            x2,
            y2: y,
            thickness,
        });
    }

    fn vline(&mut self, x: f32, y1: f32, y2: f32, thickness: f32) {
        self.ops.push(PaintOp::Line {
            x1: x,
            y1,
            x2: x,
            y2,
            thickness,
        });
    }

    fn fill(&mut self, rect: Rect, gray: f32) {
        self.ops.push(PaintOp::Fill { rect, gray });
    }

    /// Top, bottom, left and right edges as independent segments.
    fn cell_border(&mut self, rect: Rect, thickness: f32) {
        self.hline(rect.x, rect.right(), rect.y, thickness);
        self.hline(rect.x, rect.right(), rect.bottom(), thickness);
        self.vline(rect.x, rect.y, rect.bottom(), thickness);
        self.vline(rect.right(), rect.y, rect.bottom(), thickness);
    }

    /// Paints pre-wrapped lines top-down and returns the y below the last line.
    fn lines(&mut self, lines: &[String], style: FontStyle, size: f32, x: f32, top: f32) -> f32 {
        let line_h = FontSet::line_height(size);
        let ascent = self.fonts.ascent(style, size);
        for (idx, line) in lines.iter().enumerate() {
            self.text(line, style, size, x, top + ascent + idx as f32 * line_h);
        }
        top + lines.len() as f32 * line_h
    }

    fn finish(self, kind: BoxKind, rect: Rect) -> LayoutBox {
        LayoutBox {
            kind,
            rect,
            ops: self.ops,
        }
    }
}

/// Output of one section builder: its boxes and the y it ends at.
struct Section {
    boxes: Vec<LayoutBox>,
    bottom: f32,
}

impl Section {
    fn single(b: LayoutBox) -> Self {
        let bottom = b.rect.bottom();
        Self {
            boxes: vec![b],
            bottom,
        }
    }
}

struct Ctx<'a> {
    model: &'a InvoiceDocumentModel,
    labels: &'static Labels,
    fonts: &'a FontSet,
}

impl Ctx<'_> {
    fn lang(&self) -> Language {
        self.model.language
    }

    fn wrap(&self, text: &str, style: FontStyle, size: f32, max_width: f32) -> Vec<String> {
        self.fonts.wrap(text, style, size, max_width)
    }
}

/// Fixed table grid shared by the header row, every item row and the totals block.
#[derive(Debug, Clone, Copy)]
struct Columns {
    serial: (f32, f32),
    code: (f32, f32),
    description: (f32, f32),
    qty: (f32, f32),
    unit: (f32, f32),
    unit_price: (f32, f32),
    total: (f32, f32),
}

impl Columns {
    fn new() -> Self {
        let widths = [
            COL_SERIAL,
            COL_CODE,
            1.0 - (COL_SERIAL + COL_CODE + COL_QTY + COL_UNIT + COL_UNIT_PRICE + COL_TOTAL),
            COL_QTY,
            COL_UNIT,
            COL_UNIT_PRICE,
            COL_TOTAL,
        ]
        .map(|f| f * CONTENT_W);
        let mut x = CONTENT_LEFT;
        let mut spans = [(0.0, 0.0); 7];
        for (span, w) in spans.iter_mut().zip(widths) {
            *span = (x, w);
            x += w;
        }
        Self {
            serial: spans[0],
            code: spans[1],
            description: spans[2],
            qty: spans[3],
            unit: spans[4],
            unit_price: spans[5],
            total: spans[6],
        }
    }

    fn all(&self) -> [(f32, f32); 7] {
        [
            self.serial,
            self.code,
            self.description,
            self.qty,
            self.unit,
            self.unit_price,
            self.total,
        ]
    }

    fn inner_width((_, w): (f32, f32)) -> f32 {
        (w - 2.0 * CELL_PAD_X).max(0.0)
    }

    fn right_edge((x, w): (f32, f32)) -> f32 {
        x + w - CELL_PAD_X
    }
}

fn format_date(date: time::Date, lang: Language) -> String {
    let formatted = match lang {
        Language::En => date.format(format_description!("[month repr:short] [day], [year]")),
        Language::Pt => date.format(format_description!("[day]/[month]/[year]")),
    };
    formatted.unwrap_or_else(|_| date.to_string())
}

// ---------------------------------------------------------------- sections

fn header_section(ctx: &Ctx<'_>, top: f32) -> Section {
    let company = &ctx.model.company;
    let mut p = Painter::new(ctx.fonts);
    let text_h = FontSet::line_height(TEXT_SIZE);

    let mut y = top;
    let name_lines = ctx.wrap(&company.name, FontStyle::Bold, NAME_SIZE, CONTENT_W);
    let name_ascent = ctx.fonts.ascent(FontStyle::Bold, NAME_SIZE);
    for line in &name_lines {
        p.text_centered(line, FontStyle::Bold, NAME_SIZE, CONTENT_LEFT, CONTENT_W, y + name_ascent);
        y += FontSet::line_height(NAME_SIZE);
    }

    let mut identity_lines: Vec<String> = company
        .address_lines
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    let contact = [
        present(&company.email).map(|v| format!("{}: {v}", ctx.labels.email)),
        present(&company.phone).map(|v| format!("{}: {v}", ctx.labels.phone)),
        present(&company.website).map(|v| format!("{}: {v}", ctx.labels.website)),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();
    if !contact.is_empty() {
        identity_lines.push(contact.join("  |  "));
    }
    if let Some(tax_id) = present(&company.tax_id) {
        identity_lines.push(format!("{}: {tax_id}", ctx.labels.tax_id));
    }

    let ascent = ctx.fonts.ascent(FontStyle::Regular, TEXT_SIZE);
    for raw in &identity_lines {
        for line in ctx.wrap(raw, FontStyle::Regular, TEXT_SIZE, CONTENT_W) {
            p.text_centered(&line, FontStyle::Regular, TEXT_SIZE, CONTENT_LEFT, CONTENT_W, y + ascent);
            y += text_h;
        }
    }

    y += 2.0;
    p.hline(CONTENT_LEFT, CONTENT_RIGHT, y, RULE_HEAVY);
    y += 2.5;

    let title = format!("{} {}", ctx.labels.invoice_title, ctx.model.meta.number.trim());
    let title_ascent = ctx.fonts.ascent(FontStyle::Bold, TITLE_SIZE);
    p.text_centered(&title, FontStyle::Bold, TITLE_SIZE, CONTENT_LEFT, CONTENT_W, y + title_ascent);
    y += FontSet::line_height(TITLE_SIZE);

    Section::single(p.finish(BoxKind::Header, Rect::new(CONTENT_LEFT, top, CONTENT_W, y - top)))
}

fn customer_lines(ctx: &Ctx<'_>) -> Vec<(String, FontStyle)> {
    let c = &ctx.model.customer;
    let l = ctx.labels;
    let mut rows = vec![(or_placeholder(&c.name).to_string(), FontStyle::Bold)];
    rows.extend(
        c.address_lines
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(|a| (a.to_string(), FontStyle::Regular)),
    );
    rows.push((or_placeholder(&c.city_state).to_string(), FontStyle::Regular));
    rows.push((or_placeholder(&c.country).to_string(), FontStyle::Regular));
    rows.push((format!("{}: {}", l.tax_id, or_placeholder(&c.tax_id)), FontStyle::Regular));
    rows.push((format!("{}: {}", l.email, or_placeholder(&c.email)), FontStyle::Regular));
    rows.push((format!("{}: {}", l.phone, or_placeholder(&c.phone)), FontStyle::Regular));
    rows
}

fn recipient_and_details_section(ctx: &Ctx<'_>, top: f32) -> Section {
    let left_w = (CONTENT_W - COLUMN_GAP) * 0.52;
    let right_x = CONTENT_LEFT + left_w + COLUMN_GAP;
    let right_w = CONTENT_RIGHT - right_x;

    // Left column: free-flowing customer text.
    let mut left = Painter::new(ctx.fonts);
    let title_ascent = ctx.fonts.ascent(FontStyle::Bold, SECTION_TITLE_SIZE);
    left.text(&ctx.labels.bill_to, FontStyle::Bold, SECTION_TITLE_SIZE, CONTENT_LEFT, top + title_ascent);
    let mut y = top + FontSet::line_height(SECTION_TITLE_SIZE);
    for (text, style) in customer_lines(ctx) {
        let wrapped = ctx.wrap(&text, style, TEXT_SIZE, left_w);
        y = left.lines(&wrapped, style, TEXT_SIZE, CONTENT_LEFT, y);
    }
    let left_h = y - top;

    // Right column: one constant-height row per field.
    let meta = &ctx.model.meta;
    let l = ctx.labels;
    let rows = [
        (&l.invoice_number, meta.number.trim().to_string()),
        (&l.issue_date, format_date(meta.issue_date, ctx.lang())),
        (&l.customer_reference, or_placeholder(&meta.customer_reference).to_string()),
        (&l.payment_terms, or_placeholder(&meta.payment_terms).to_string()),
        (&l.delivery_terms, or_placeholder(&meta.delivery_terms).to_string()),
    ];
    let mut right = Painter::new(ctx.fonts);
    let details_h = TABLE_HEADER_H + rows.len() as f32 * DETAILS_ROW_H;
    let label_w = right_w * 0.42;
    let value_x = right_x + label_w;
    let value_w = right_w - label_w - 2.0 * CELL_PAD_X;

    right.fill(Rect::new(right_x, top, right_w, TABLE_HEADER_H), HEADER_FILL_GRAY);
    let text_ascent = ctx.fonts.ascent(FontStyle::Regular, TEXT_SIZE);
    let header_baseline = top + (TABLE_HEADER_H + text_ascent) / 2.0;
    right.text(&l.details_title, FontStyle::Bold, TEXT_SIZE, right_x + CELL_PAD_X, header_baseline);

    let mut row_top = top + TABLE_HEADER_H;
    for (label, value) in &rows {
        let baseline = row_top + (DETAILS_ROW_H + text_ascent) / 2.0;
        let label = ctx.fonts.truncate(label, FontStyle::Bold, TEXT_SIZE, label_w - 2.0 * CELL_PAD_X);
        right.text(&label, FontStyle::Bold, TEXT_SIZE, right_x + CELL_PAD_X, baseline);
        let value = ctx.fonts.truncate(value, FontStyle::Regular, TEXT_SIZE, value_w);
        right.text(&value, FontStyle::Regular, TEXT_SIZE, value_x + CELL_PAD_X, baseline);
        right.hline(right_x, CONTENT_RIGHT, row_top, RULE_HAIRLINE);
        row_top += DETAILS_ROW_H;
    }
    right.cell_border(Rect::new(right_x, top, right_w, details_h), RULE_REGULAR);
    right.vline(value_x, top + TABLE_HEADER_H, top + details_h, RULE_HAIRLINE);

    let height = left_h.max(details_h);
    Section {
        boxes: vec![
            left.finish(BoxKind::Recipient, Rect::new(CONTENT_LEFT, top, left_w, height)),
            right.finish(BoxKind::Details, Rect::new(right_x, top, right_w, details_h)),
        ],
        bottom: top + height,
    }
}

fn table_header_box(ctx: &Ctx<'_>, cols: &Columns, top: f32) -> LayoutBox {
    let l = ctx.labels;
    let mut p = Painter::new(ctx.fonts);
    p.fill(Rect::new(CONTENT_LEFT, top, CONTENT_W, TABLE_HEADER_H), HEADER_FILL_GRAY);

    let ascent = ctx.fonts.ascent(FontStyle::Bold, TABLE_HEADER_SIZE);
    let baseline = top + (TABLE_HEADER_H + ascent) / 2.0;
    let left_aligned = [
        (cols.serial, &l.col_serial),
        (cols.code, &l.col_code),
        (cols.description, &l.col_description),
        (cols.unit, &l.col_unit),
    ];
    for (col, label) in left_aligned {
        let label = ctx
            .fonts
            .truncate(label, FontStyle::Bold, TABLE_HEADER_SIZE, Columns::inner_width(col));
        p.text(&label, FontStyle::Bold, TABLE_HEADER_SIZE, col.0 + CELL_PAD_X, baseline);
    }
    let right_aligned = [
        (cols.qty, &l.col_qty),
        (cols.unit_price, &l.col_unit_price),
        (cols.total, &l.col_total),
    ];
    for (col, label) in right_aligned {
        let label = ctx
            .fonts
            .truncate(label, FontStyle::Bold, TABLE_HEADER_SIZE, Columns::inner_width(col));
        p.text_right(&label, FontStyle::Bold, TABLE_HEADER_SIZE, Columns::right_edge(col), baseline);
    }
    for (x, w) in cols.all() {
        p.cell_border(Rect::new(x, top, w, TABLE_HEADER_H), RULE_REGULAR);
    }
    p.finish(BoxKind::TableHeader, Rect::new(CONTENT_LEFT, top, CONTENT_W, TABLE_HEADER_H))
}

fn description_lines(ctx: &Ctx<'_>, cols: &Columns, item: &LineItem) -> Vec<String> {
    let lines = ctx.wrap(
        &item.description,
        FontStyle::Regular,
        TEXT_SIZE,
        Columns::inner_width(cols.description),
    );
    if lines.is_empty() {
        vec![PLACEHOLDER.to_string()]
    } else {
        lines
    }
}

fn row_height(line_count: usize) -> f32 {
    let measured = line_count as f32 * FontSet::line_height(TEXT_SIZE);
    (measured + 2.0 * CELL_PAD_Y).max(MIN_ROW_H)
}

fn default_unit(ctx: &Ctx<'_>) -> &'static str {
    let l: &'static Labels = ctx.labels;
    match ctx.model.kind {
        DocumentKind::ServiceInvoice => &l.default_service_unit,
        DocumentKind::ProductInvoice => &l.default_product_unit,
    }
}

fn table_row_box(ctx: &Ctx<'_>, cols: &Columns, item: &LineItem, top: f32) -> LayoutBox {
    let lang = ctx.lang();
    let desc = description_lines(ctx, cols, item);
    let height = row_height(desc.len());

    let mut p = Painter::new(ctx.fonts);
    let first_baseline = top + CELL_PAD_Y + ctx.fonts.ascent(FontStyle::Regular, TEXT_SIZE);

    let fit = |text: &str, col: (f32, f32)| {
        ctx.fonts
            .truncate(text, FontStyle::Regular, TEXT_SIZE, Columns::inner_width(col))
    };

    p.text(&fit(&item.serial_index.to_string(), cols.serial), FontStyle::Regular, TEXT_SIZE, cols.serial.0 + CELL_PAD_X, first_baseline);
    p.text(
        &fit(or_placeholder(&item.product_code), cols.code),
        FontStyle::Regular,
        TEXT_SIZE,
        cols.code.0 + CELL_PAD_X,
        first_baseline,
    );
    p.lines(
        &desc,
        FontStyle::Regular,
        TEXT_SIZE,
        cols.description.0 + CELL_PAD_X,
        top + CELL_PAD_Y,
    );
    p.text_right(
        &fit(&format_qty(item.quantity, lang), cols.qty),
        FontStyle::Regular,
        TEXT_SIZE,
        Columns::right_edge(cols.qty),
        first_baseline,
    );
    let unit = present(&item.unit).unwrap_or_else(|| default_unit(ctx));
    p.text(&fit(unit, cols.unit), FontStyle::Regular, TEXT_SIZE, cols.unit.0 + CELL_PAD_X, first_baseline);
    p.text_right(
        &fit(&format_money(item.unit_price, lang), cols.unit_price),
        FontStyle::Regular,
        TEXT_SIZE,
        Columns::right_edge(cols.unit_price),
        first_baseline,
    );
    p.text_right(
        &fit(&format_money(item.line_total, lang), cols.total),
        FontStyle::Bold,
        TEXT_SIZE,
        Columns::right_edge(cols.total),
        first_baseline,
    );

    for (x, w) in cols.all() {
        p.cell_border(Rect::new(x, top, w, height), RULE_HAIRLINE);
    }
    p.finish(BoxKind::TableRow, Rect::new(CONTENT_LEFT, top, CONTENT_W, height))
}

fn totals_section(ctx: &Ctx<'_>, cols: &Columns, top: f32) -> Section {
    let totals = &ctx.model.totals;
    let currency = &ctx.model.meta.currency;
    let lang = ctx.lang();
    let l = ctx.labels;
    let mut p = Painter::new(ctx.fonts);

    let label_x = cols.qty.0 + CELL_PAD_X;
    let value_right = Columns::right_edge(cols.total);
    let ascent = ctx.fonts.ascent(FontStyle::Regular, TEXT_SIZE);

    let mut y = top;
    for (label, value) in [
        (&l.subtotal, totals.subtotal),
        (&l.discount, totals.discount),
        (&l.shipping, totals.shipping),
    ] {
        let baseline = y + (TOTALS_ROW_H + ascent) / 2.0;
        p.text(label, FontStyle::Regular, TEXT_SIZE, label_x, baseline);
        p.text_right(&format_currency(value, currency, lang), FontStyle::Regular, TEXT_SIZE, value_right, baseline);
        y += TOTALS_ROW_H;
    }

    p.hline(cols.qty.0, CONTENT_RIGHT, y, RULE_HEAVY);
    let emph_ascent = ctx.fonts.ascent(FontStyle::Bold, SECTION_TITLE_SIZE);
    let baseline = y + (GRAND_TOTAL_ROW_H + emph_ascent) / 2.0;
    p.text(&l.grand_total, FontStyle::Bold, SECTION_TITLE_SIZE, label_x, baseline);
    p.text_right(
        &format_currency(totals.grand_total, currency, lang),
        FontStyle::Bold,
        SECTION_TITLE_SIZE,
        value_right,
        baseline,
    );
    y += GRAND_TOTAL_ROW_H;
    p.hline(cols.qty.0, CONTENT_RIGHT, y, RULE_REGULAR);
    y += 1.5;

    let words = ctx.wrap(&totals.amount_in_words, FontStyle::Italic, SMALL_SIZE, CONTENT_W);
    let words_ascent = ctx.fonts.ascent(FontStyle::Italic, SMALL_SIZE);
    for line in &words {
        p.text_right(line, FontStyle::Italic, SMALL_SIZE, CONTENT_RIGHT, y + words_ascent);
        y += FontSet::line_height(SMALL_SIZE);
    }

    Section::single(p.finish(BoxKind::Totals, Rect::new(CONTENT_LEFT, top, CONTENT_W, y - top)))
}

/// Label in a fixed column, value wrapped in the remaining width. Returns the y below the row.
fn labeled_row(p: &mut Painter<'_>, ctx: &Ctx<'_>, label: &str, value: &str, x: f32, width: f32, top: f32) -> f32 {
    let label_w = LABEL_COL_W.min(width * 0.45);
    let value_w = width - label_w;
    let label_lines = ctx.wrap(&format!("{label}:"), FontStyle::Bold, TEXT_SIZE, label_w - CELL_PAD_X);
    let value_lines = ctx.wrap(value, FontStyle::Regular, TEXT_SIZE, value_w);
    let value_lines = if value_lines.is_empty() {
        vec![PLACEHOLDER.to_string()]
    } else {
        value_lines
    };
    let after_label = p.lines(&label_lines, FontStyle::Bold, TEXT_SIZE, x, top);
    let after_value = p.lines(&value_lines, FontStyle::Regular, TEXT_SIZE, x + label_w, top);
    after_label.max(after_value)
}

fn section_title(p: &mut Painter<'_>, ctx: &Ctx<'_>, title: &str, x: f32, top: f32) -> f32 {
    let ascent = ctx.fonts.ascent(FontStyle::Bold, SECTION_TITLE_SIZE);
    p.text(title, FontStyle::Bold, SECTION_TITLE_SIZE, x, top + ascent);
    top + FontSet::line_height(SECTION_TITLE_SIZE)
}

fn logistics_section(ctx: &Ctx<'_>, top: f32) -> Section {
    let lg = &ctx.model.logistics;
    let l = ctx.labels;
    let mut p = Painter::new(ctx.fonts);

    let mut y = section_title(&mut p, ctx, &l.logistics_title, CONTENT_LEFT, top);
    p.hline(CONTENT_LEFT, CONTENT_RIGHT, y, RULE_HAIRLINE);
    y += 1.0;

    let delivery = [present(&lg.delivery_info), present(&lg.shipping_method)]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" / ");
    let entries = [
        (&l.country_of_origin, or_placeholder(&lg.country_of_origin).to_string()),
        (&l.hs_code, or_placeholder(&lg.hs_code).to_string()),
        (&l.delivery_info, delivery),
    ];
    for (label, value) in &entries {
        y = labeled_row(&mut p, ctx, label, value, CONTENT_LEFT, CONTENT_W, y);
    }

    Section::single(p.finish(BoxKind::Logistics, Rect::new(CONTENT_LEFT, top, CONTENT_W, y - top)))
}

fn bank_section(ctx: &Ctx<'_>, top: f32) -> Section {
    let pay = &ctx.model.payment;
    let l = ctx.labels;
    let fields = [
        (&l.bank_name, &pay.bank_name),
        (&l.swift, &pay.swift),
        (&l.branch, &pay.branch),
        (&l.account, &pay.account),
        (&l.beneficiary_name, &pay.beneficiary_name),
        (&l.beneficiary_address, &pay.beneficiary_address),
        (&l.intermediary_bank, &pay.intermediary_bank),
        (&l.intermediary_swift, &pay.intermediary_swift),
    ];
    let present_fields: Vec<(&String, &str)> = fields
        .iter()
        .filter_map(|(label, value)| present(value).map(|v| (*label, v)))
        .collect();

    let inner_x = CONTENT_LEFT + BANK_PAD;
    let inner_w = CONTENT_W - 2.0 * BANK_PAD;

    // Text first so the box height is the sum of what was actually measured.
    let mut text = Painter::new(ctx.fonts);
    let mut y = section_title(&mut text, ctx, &l.bank_title, inner_x, top + BANK_PAD);
    y += 1.0;
    if present_fields.is_empty() {
        y = text.lines(&[PLACEHOLDER.to_string()], FontStyle::Regular, TEXT_SIZE, inner_x, y);
    }
    for (label, value) in &present_fields {
        y = labeled_row(&mut text, ctx, label, value, inner_x, inner_w, y);
    }
    let height = (y + BANK_PAD - top).max(BANK_MIN_H);

    let rect = Rect::new(CONTENT_LEFT, top, CONTENT_W, height);
    let mut p = Painter::new(ctx.fonts);
    p.fill(rect, BANK_FILL_GRAY);
    p.ops.extend(text.ops);
    p.cell_border(rect, RULE_HAIRLINE);

    Section::single(p.finish(BoxKind::BankInstructions, rect))
}

fn paragraph_box(ctx: &Ctx<'_>, title: &str, body: &[String], bullets: bool, top: f32) -> LayoutBox {
    const BULLET_INDENT: f32 = 4.0;
    let mut p = Painter::new(ctx.fonts);
    let mut y = section_title(&mut p, ctx, title, CONTENT_LEFT, top);
    for paragraph in body {
        if bullets {
            let lines = ctx.wrap(paragraph, FontStyle::Regular, SMALL_SIZE, CONTENT_W - BULLET_INDENT);
            let ascent = ctx.fonts.ascent(FontStyle::Regular, SMALL_SIZE);
            p.text("-", FontStyle::Regular, SMALL_SIZE, CONTENT_LEFT + 1.0, y + ascent);
            y = p.lines(&lines, FontStyle::Regular, SMALL_SIZE, CONTENT_LEFT + BULLET_INDENT, y);
        } else {
            let lines = ctx.wrap(paragraph, FontStyle::Regular, SMALL_SIZE, CONTENT_W);
            y = p.lines(&lines, FontStyle::Regular, SMALL_SIZE, CONTENT_LEFT, y);
        }
    }
    p.finish(BoxKind::Legal, Rect::new(CONTENT_LEFT, top, CONTENT_W, y - top))
}

fn acknowledgement_text(ctx: &Ctx<'_>) -> String {
    match present(&ctx.model.acknowledgement) {
        Some(text) => text.to_string(),
        None => ctx.labels.acknowledgement(
            or_placeholder(&ctx.model.customer.name),
            ctx.model.meta.number.trim(),
        ),
    }
}

fn signature_section(ctx: &Ctx<'_>, top: f32) -> Section {
    let l = ctx.labels;
    let columns = [
        (CONTENT_LEFT, &l.signature_issuer, ctx.model.company.name.trim().to_string()),
        (
            CONTENT_RIGHT - SIGNATURE_COL_W,
            &l.signature_customer,
            or_placeholder(&ctx.model.customer.name).to_string(),
        ),
    ];

    let mut p = Painter::new(ctx.fonts);
    let mut bottom = top;
    for (x, caption, name) in &columns {
        let caption = ctx.fonts.truncate(caption, FontStyle::Bold, TEXT_SIZE, SIGNATURE_COL_W);
        let name = ctx.fonts.truncate(name, FontStyle::Regular, TEXT_SIZE, SIGNATURE_COL_W);
        let mut y = p.lines(&[caption], FontStyle::Bold, TEXT_SIZE, *x, top);
        y = p.lines(&[name], FontStyle::Regular, TEXT_SIZE, *x, y);
        y += SIGNATURE_SPACE;
        p.hline(*x, x + SIGNATURE_COL_W, y, RULE_REGULAR);
        y += 1.0;
        y = p.lines(&[l.signature_caption.clone()], FontStyle::Italic, SMALL_SIZE, *x, y);
        bottom = bottom.max(y);
    }

    Section::single(p.finish(BoxKind::Signature, Rect::new(CONTENT_LEFT, top, CONTENT_W, bottom - top)))
}

fn footer_box(ctx: &Ctx<'_>, page: usize, pages: usize) -> LayoutBox {
    let top = BODY_BOTTOM + 2.0;
    let mut p = Painter::new(ctx.fonts);
    p.hline(CONTENT_LEFT, CONTENT_RIGHT, top, RULE_HAIRLINE);
    let baseline = top + 1.5 + ctx.fonts.ascent(FontStyle::Regular, FOOTER_SIZE);
    p.text(&ctx.labels.footer_generated, FontStyle::Regular, FOOTER_SIZE, CONTENT_LEFT, baseline);
    p.text_right(&ctx.labels.page_of(page, pages), FontStyle::Regular, FOOTER_SIZE, CONTENT_RIGHT, baseline);
    p.finish(BoxKind::Footer, Rect::new(CONTENT_LEFT, top, CONTENT_W, FOOTER_H - 2.0))
}

// -------------------------------------------------------------- pagination

struct Paginator {
    pages: Vec<Vec<LayoutBox>>,
    cursor: f32,
}

impl Paginator {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            cursor: BODY_TOP,
        }
    }

    fn at_page_top(&self) -> bool {
        (self.cursor - BODY_TOP).abs() < EPSILON
    }

    fn fits(&self, height: f32) -> bool {
        self.cursor + height <= BODY_BOTTOM + EPSILON
    }

    fn break_page(&mut self) {
        self.pages.push(Vec::new());
        self.cursor = BODY_TOP;
        tracing::debug!(page = self.pages.len(), "page break");
    }

    fn push(&mut self, boxes: Vec<LayoutBox>) {
        if let Some(page) = self.pages.last_mut() {
            page.extend(boxes);
        }
    }

    /// Places a whole section, moving it to a fresh page when it does not fit.
    fn place(&mut self, name: &str, build: impl Fn(f32) -> Section) -> Result<()> {
        let mut section = build(self.cursor);
        if section.bottom > BODY_BOTTOM + EPSILON && !self.at_page_top() {
            tracing::debug!(section = name, cursor = self.cursor, "section moved to next page");
            self.break_page();
            section = build(self.cursor);
        }
        if section.bottom > BODY_BOTTOM + EPSILON {
            return Err(InvoiceError::malformed(format!("{name} section is taller than a page")));
        }
        self.push(section.boxes);
        self.cursor = section.bottom + SECTION_GAP;
        Ok(())
    }

    /// Breaks between rows and repeats the header row on every continuation page.
    fn place_table(&mut self, ctx: &Ctx<'_>, cols: &Columns) -> Result<()> {
        let heights: Vec<f32> = ctx
            .model
            .line_items
            .iter()
            .map(|it| row_height(description_lines(ctx, cols, it).len()))
            .collect();

        let max_row = BODY_BOTTOM - BODY_TOP - TABLE_HEADER_H;
        if let Some((idx, _)) = heights.iter().enumerate().find(|(_, h)| **h > max_row + EPSILON) {
            return Err(InvoiceError::malformed(format!(
                "line item {} is taller than a page",
                ctx.model.line_items[idx].serial_index
            )));
        }

        // The header never sits alone at the bottom of a page.
        let first = heights.first().copied().unwrap_or(0.0);
        if !self.fits(TABLE_HEADER_H + first) && !self.at_page_top() {
            self.break_page();
        }
        self.push(vec![table_header_box(ctx, cols, self.cursor)]);
        self.cursor += TABLE_HEADER_H;

        for (item, height) in ctx.model.line_items.iter().zip(heights) {
            if !self.fits(height) {
                self.break_page();
                self.push(vec![table_header_box(ctx, cols, self.cursor)]);
                self.cursor += TABLE_HEADER_H;
            }
            let row = table_row_box(ctx, cols, item, self.cursor);
            self.cursor = row.rect.bottom();
            self.push(vec![row]);
        }
        self.cursor += SECTION_GAP;
        Ok(())
    }
}

/// Lays out the whole invoice. Identical models always produce identical geometry.
pub fn layout(model: &InvoiceDocumentModel, fonts: &FontSet) -> Result<DocumentLayout> {
    model.validate()?;
    let ctx = Ctx {
        model,
        labels: labels(model.language)?,
        fonts,
    };
    let cols = Columns::new();
    let mut pager = Paginator::new();

    pager.place("header", |top| header_section(&ctx, top))?;
    pager.place("recipient", |top| recipient_and_details_section(&ctx, top))?;
    pager.place_table(&ctx, &cols)?;
    pager.place("totals", |top| totals_section(&ctx, &cols, top))?;
    pager.place("logistics", |top| logistics_section(&ctx, top))?;
    pager.place("bank instructions", |top| bank_section(&ctx, top))?;

    let l = ctx.labels;
    let retention = [l.retention_text.clone()];
    let acknowledgement = [acknowledgement_text(&ctx)];
    pager.place("retention clause", |top| {
        Section::single(paragraph_box(&ctx, &l.retention_title, &retention, false, top))
    })?;
    pager.place("acknowledgement", |top| {
        Section::single(paragraph_box(&ctx, &l.acknowledgement_title, &acknowledgement, false, top))
    })?;
    pager.place("terms", |top| {
        Section::single(paragraph_box(&ctx, &l.terms_title, &l.terms, true, top))
    })?;
    pager.place("signature", |top| signature_section(&ctx, top))?;

    let total = pager.pages.len();
    let pages = pager
        .pages
        .into_iter()
        .enumerate()
        .map(|(idx, mut boxes)| {
            boxes.push(footer_box(&ctx, idx + 1, total));
            PageLayout {
                number: idx + 1,
                boxes,
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(invoice = %model.meta.number, pages = total, "layout computed");
    Ok(DocumentLayout {
        title: format!("{} {}", l.doc_title, model.meta.number.trim()),
        page_width: PAGE_W,
        page_height: PAGE_H,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;

    fn fonts() -> FontSet {
        FontSet::builtin()
    }

    fn row_heights(doc: &DocumentLayout) -> Vec<f32> {
        doc.pages
            .iter()
            .flat_map(|p| p.boxes_of(BoxKind::TableRow))
            .map(|b| b.rect.height)
            .collect()
    }

    fn texts(b: &LayoutBox) -> Vec<&str> {
        b.ops
            .iter()
            .filter_map(|op| match op {
                PaintOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn sections_come_in_fixed_order() {
        let doc = layout(&fixtures::model(), &fonts()).unwrap();
        assert_eq!(doc.pages.len(), 1);
        let kinds: Vec<BoxKind> = doc.pages[0].boxes.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BoxKind::Header,
                BoxKind::Recipient,
                BoxKind::Details,
                BoxKind::TableHeader,
                BoxKind::TableRow,
                BoxKind::TableRow,
                BoxKind::Totals,
                BoxKind::Logistics,
                BoxKind::BankInstructions,
                BoxKind::Legal,
                BoxKind::Legal,
                BoxKind::Legal,
                BoxKind::Signature,
                BoxKind::Footer,
            ]
        );
    }

    #[test]
    fn boxes_never_overlap_vertically() {
        let doc = layout(&fixtures::model(), &fonts()).unwrap();
        let mut prev_bottom = 0.0f32;
        for b in &doc.pages[0].boxes {
            if b.kind == BoxKind::Details {
                continue;
            }
            assert!(b.rect.y + EPSILON >= prev_bottom, "{:?} starts above {prev_bottom}", b.kind);
            prev_bottom = b.rect.bottom();
        }
    }

    #[test]
    fn layout_is_deterministic() {
        let model = fixtures::model();
        assert_eq!(layout(&model, &fonts()).unwrap(), layout(&model, &fonts()).unwrap());
    }

    #[test]
    fn longer_description_gives_taller_row() {
        let mut model = fixtures::model();
        let short = row_heights(&layout(&model, &fonts()).unwrap())[0];
        model.line_items[0].description =
            "Consulting services for the migration of card settlement files, reconciliation \
             reports and chargeback workflows to the new acquiring platform"
                .into();
        let long = row_heights(&layout(&model, &fonts()).unwrap())[0];
        assert!(long > short);
        assert!(short >= MIN_ROW_H);
    }

    #[test]
    fn missing_optional_fields_render_placeholders() {
        let mut model = fixtures::model();
        model.customer.phone = None;
        model.logistics = Default::default();
        let doc = layout(&model, &fonts()).unwrap();
        let page = &doc.pages[0];

        let recipient = page.boxes_of(BoxKind::Recipient).next().unwrap();
        assert!(texts(recipient).iter().any(|t| *t == "Phone: -"));

        let logistics = page.boxes_of(BoxKind::Logistics).next().unwrap();
        assert_eq!(texts(logistics).iter().filter(|t| **t == PLACEHOLDER).count(), 3);
    }

    #[test]
    fn bank_box_grows_with_fields_and_keeps_floor() {
        let mut model = fixtures::model();
        model.payment = Default::default();
        model.payment.bank_name = Some("Banco do Brasil".into());
        let small = layout(&model, &fonts()).unwrap();
        let small_h = small.pages[0].boxes_of(BoxKind::BankInstructions).next().unwrap().rect.height;
        assert!((small_h - BANK_MIN_H).abs() < EPSILON);

        model.payment = fixtures::model().payment;
        model.payment.beneficiary_address = Some("Av. Paulista, 1000\nSão Paulo - SP\nBrazil".into());
        model.payment.intermediary_bank = Some("Citibank N.A. New York".into());
        model.payment.intermediary_swift = Some("CITIUS33".into());
        let big = layout(&model, &fonts()).unwrap();
        let bank = big.pages[0].boxes_of(BoxKind::BankInstructions).next().unwrap();
        assert!(bank.rect.height > BANK_MIN_H);
        assert!(matches!(bank.ops[0], PaintOp::Fill { .. }));
    }

    #[test]
    fn cells_have_four_border_segments() {
        let doc = layout(&fixtures::model(), &fonts()).unwrap();
        let row = doc.pages[0].boxes_of(BoxKind::TableRow).next().unwrap();
        let lines = row.ops.iter().filter(|op| matches!(op, PaintOp::Line { .. })).count();
        assert_eq!(lines, 7 * 4);
    }

    #[test]
    fn long_tables_paginate_and_repeat_the_header() {
        let mut model = fixtures::model();
        model.line_items = (1..=60)
            .map(|i| fixtures::item(i, &format!("Monthly processing fee for merchant account {i}"), 1.0, 10.0))
            .collect();
        let doc = layout(&model, &fonts()).unwrap();
        assert!(doc.pages.len() > 1);
        assert_eq!(row_heights(&doc).len(), 60);

        for page in &doc.pages {
            for b in &page.boxes {
                assert!(b.rect.y >= BODY_TOP - EPSILON);
                if b.kind != BoxKind::Footer {
                    assert!(b.rect.bottom() <= BODY_BOTTOM + EPSILON, "{:?} overflows", b.kind);
                }
            }
            let footer = page.boxes_of(BoxKind::Footer).next().unwrap();
            let page_of = format!("Page {} of {}", page.number, doc.pages.len());
            assert!(texts(footer).contains(&page_of.as_str()));
        }
        for page in doc.pages.iter().skip(1) {
            if page.boxes_of(BoxKind::TableRow).next().is_some() {
                assert_eq!(page.boxes[0].kind, BoxKind::TableHeader);
            }
        }
    }

    #[test]
    fn row_taller_than_a_page_is_malformed() {
        let mut model = fixtures::model();
        model.line_items[0].description = "line\n".repeat(120);
        let err = layout(&model, &fonts()).unwrap_err();
        assert!(matches!(err, InvoiceError::MalformedModel(_)));
    }

    #[test]
    fn details_values_are_truncated_to_the_column() {
        let mut model = fixtures::model();
        model.meta.payment_terms =
            Some("Payment within thirty calendar days after the acceptance of the delivered services".into());
        let doc = layout(&model, &fonts()).unwrap();
        let details = doc.pages[0].boxes_of(BoxKind::Details).next().unwrap();
        assert_eq!(details.rect.height, TABLE_HEADER_H + 5.0 * DETAILS_ROW_H);
        assert!(texts(details).iter().any(|t| t.ends_with("...")));
    }

    #[test]
    fn portuguese_dates_and_amounts() {
        let mut model = fixtures::model();
        model.language = Language::Pt;
        let doc = layout(&model, &fonts()).unwrap();
        let page = &doc.pages[0];
        let details = page.boxes_of(BoxKind::Details).next().unwrap();
        assert!(texts(details).contains(&"15/03/2024"));
        let totals = page.boxes_of(BoxKind::Totals).next().unwrap();
        assert!(texts(totals).contains(&"USD $ 1.200,00"));
    }

    #[test]
    fn acknowledgement_defaults_from_labels() {
        let doc = layout(&fixtures::model(), &fonts()).unwrap();
        let legal: Vec<&LayoutBox> = doc.pages[0].boxes_of(BoxKind::Legal).collect();
        let body = texts(legal[1]).join(" ");
        assert!(body.contains("INV-202401"));
    }

    #[test]
    fn delivery_and_shipping_share_one_row() {
        let mut model = fixtures::model();
        model.logistics.delivery_info = Some("Air freight".into());
        model.logistics.shipping_method = Some("DHL Express".into());
        let doc = layout(&model, &fonts()).unwrap();
        let logistics = doc.pages[0].boxes_of(BoxKind::Logistics).next().unwrap();
        assert!(texts(logistics).contains(&"Air freight / DHL Express"));
        assert_eq!(texts(logistics).iter().filter(|t| **t == PLACEHOLDER).count(), 2);

        model.logistics.delivery_info = None;
        let doc = layout(&model, &fonts()).unwrap();
        let logistics = doc.pages[0].boxes_of(BoxKind::Logistics).next().unwrap();
        assert!(texts(logistics).contains(&"DHL Express"));
    }

    #[test]
    fn website_is_labeled_in_the_header() {
        let mut model = fixtures::model();
        model.company.email = None;
        model.company.phone = None;
        model.company.website = Some("zenithpay.com.br".into());
        let doc = layout(&model, &fonts()).unwrap();
        let header = doc.pages[0].boxes_of(BoxKind::Header).next().unwrap();
        assert!(texts(header).contains(&"Web: zenithpay.com.br"));

        model.language = Language::Pt;
        let doc = layout(&model, &fonts()).unwrap();
        let header = doc.pages[0].boxes_of(BoxKind::Header).next().unwrap();
        assert!(texts(header).contains(&"Site: zenithpay.com.br"));
    }

    #[test]
    fn missing_units_follow_the_document_kind() {
        let mut model = fixtures::model();
        let doc = layout(&model, &fonts()).unwrap();
        let row = doc.pages[0].boxes_of(BoxKind::TableRow).next().unwrap();
        assert!(texts(row).contains(&"service"));

        model.kind = DocumentKind::ProductInvoice;
        let doc = layout(&model, &fonts()).unwrap();
        let row = doc.pages[0].boxes_of(BoxKind::TableRow).next().unwrap();
        assert!(texts(row).contains(&"pc"));
    }
}
