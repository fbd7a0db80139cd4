//! Invoice numbering, layout and PDF rendering for the Zenith back office.
//!
//! The pipeline is: allocate a per-year number ([`numbering`]), assemble the
//! request into an [`InvoiceDocumentModel`] ([`assembly`]), archive it
//! ([`archive`]), lay it out in millimetre boxes ([`pdf::layout`]) and paint
//! the boxes into a PDF ([`pdf::render`]). [`service::InvoiceService`] ties
//! the steps together and [`api`] exposes them over HTTP.

pub mod api;
pub mod archive;
pub mod assembly;
pub mod config;
pub mod db;
pub mod error;
pub mod labels;
pub mod model;
pub mod money;
pub mod numbering;
pub mod pdf;
pub mod quote;
pub mod rates;
pub mod service;
pub mod spell;

use std::sync::Arc;

pub use config::Config;
pub use error::{InvoiceError, Result};
pub use model::InvoiceDocumentModel;
pub use service::InvoiceService;

/// Binds the configured address and serves the HTTP API until the process exits.
pub async fn serve(config: &Config) -> Result<()> {
    let service = Arc::new(InvoiceService::from_config(config)?);
    let app = api::router(service);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "invoice service listening");

    axum::serve(listener, app).await?;
    Ok(())
}
