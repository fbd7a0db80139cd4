pub mod layout;
pub mod metrics;
pub mod render;

pub use layout::{layout, BoxKind, DocumentLayout, LayoutBox, PageLayout, PaintOp, Rect};
pub use metrics::{FontSet, FontStyle, Measurement};
pub use render::{render, render_to_vec};

use crate::error::Result;
use crate::model::InvoiceDocumentModel;

/// Layout plus painting into memory, for callers that need the whole file.
pub fn generate_pdf_bytes(model: &InvoiceDocumentModel, fonts: &FontSet) -> Result<Vec<u8>> {
    let doc = layout(model, fonts)?;
    let bytes = render_to_vec(&doc, fonts)?;
    tracing::info!(
        invoice = %model.meta.number,
        pages = doc.pages.len(),
        bytes = bytes.len(),
        "invoice rendered"
    );
    Ok(bytes)
}
