use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tower_http::trace::TraceLayer;

use crate::archive::ArchivedInvoice;
use crate::assembly::InvoiceRequest;
use crate::error::InvoiceError;
use crate::model::InvoiceDocumentModel;
use crate::numbering::InvoiceNumber;
use crate::service::{IssuedInvoice, QuoteInvoiceRequest, SharedService};

const INVOICE_NUMBER_HEADER: HeaderName = HeaderName::from_static("x-invoice-number");

pub struct ApiError(InvoiceError);

impl From<InvoiceError> for ApiError {
    fn from(err: InvoiceError) -> Self {
        Self(err)
    }
}

// Unparseable bodies get the same 422 JSON shape as model validation failures.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(InvoiceError::malformed(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let (status, code, message) = match &err {
            InvoiceError::MalformedModel(_) => (StatusCode::UNPROCESSABLE_ENTITY, "MalformedModel", err.to_string()),
            InvoiceError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", err.to_string()),
            InvoiceError::AllocationConflict { .. } => (StatusCode::CONFLICT, "AllocationConflict", err.to_string()),
            InvoiceError::AlreadyArchived(_) => (StatusCode::CONFLICT, "AlreadyArchived", err.to_string()),
            InvoiceError::RateUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "RateUnavailable", err.to_string()),
            _ => {
                tracing::error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError",
                    "An internal error occurred".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn sanitize_filename(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "invoice".to_string()
    } else {
        cleaned
    }
}

fn pdf_response(number: &str, pdf: Vec<u8>) -> Response {
    let filename = sanitize_filename(number);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime::APPLICATION_PDF.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}.pdf\"")),
            (INVOICE_NUMBER_HEADER, filename),
        ],
        pdf,
    )
        .into_response()
}

fn issued_response(issued: IssuedInvoice) -> Response {
    let IssuedInvoice { archived, pdf } = issued;
    pdf_response(&archived.number, pdf)
}

pub async fn issue_invoice(
    State(service): State<SharedService>,
    payload: Result<Json<InvoiceRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let issued = service.issue(request).await?;
    Ok(issued_response(issued))
}

pub async fn invoice_quote(
    State(service): State<SharedService>,
    payload: Result<Json<QuoteInvoiceRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let issued = service.issue_from_quote(request).await?;
    Ok(issued_response(issued))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub year: Option<i32>,
}

pub async fn list_invoices(
    State(service): State<SharedService>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ArchivedInvoice>>> {
    Ok(Json(service.list(query.year).await?))
}

pub async fn get_invoice(
    State(service): State<SharedService>,
    Path(number): Path<String>,
) -> ApiResult<Json<InvoiceDocumentModel>> {
    Ok(Json(service.get_model(&number).await?))
}

pub async fn download_invoice(
    State(service): State<SharedService>,
    Path(number): Path<String>,
) -> ApiResult<Response> {
    let (number, pdf) = service.redownload(&number).await?;
    Ok(pdf_response(&number, pdf))
}

#[derive(Debug, Deserialize)]
pub struct NextNumberQuery {
    /// `YYYY-MM-DD`; today (UTC) when absent.
    pub date: Option<String>,
}

pub async fn next_number(
    State(service): State<SharedService>,
    Query(query): Query<NextNumberQuery>,
) -> ApiResult<Json<InvoiceNumber>> {
    let date = match query.date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Date::parse(raw, format_description!("[year]-[month]-[day]"))
            .map_err(|e| InvoiceError::malformed(format!("invalid date {raw:?}: {e}")))?,
        None => OffsetDateTime::now_utc().date(),
    };
    Ok(Json(service.preview_next_number(date).await?))
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/invoices", post(issue_invoice).get(list_invoices))
        .route("/api/v1/invoices/:number", get(get_invoice))
        .route("/api/v1/invoices/:number/pdf", get(download_invoice))
        .route("/api/v1/quotes/invoice", post(invoice_quote))
        .route("/api/v1/numbering/next", get(next_number))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
