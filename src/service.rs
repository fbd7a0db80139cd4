use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::Date;

use rusqlite::TransactionBehavior;

use crate::archive::{self, ArchivedInvoice};
use crate::assembly::{assemble, request_from_quote, AssemblyDefaults, InvoiceRequest};
use crate::config::Config;
use crate::db::DbState;
use crate::error::Result;
use crate::model::{ymd, InvoiceDocumentModel, Language};
use crate::numbering::{self, InvoiceNumber, NumberFormat};
use crate::pdf::{generate_pdf_bytes, FontSet};
use crate::quote::Quote;
use crate::rates::RateCache;

/// Body of an "invoice this quote" request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteInvoiceRequest {
    pub quote: Quote,
    #[serde(with = "ymd")]
    pub issue_date: Date,
    /// Invoice currency; the configured default when absent.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub language: Option<Language>,
}

#[derive(Debug, Clone)]
pub struct IssuedInvoice {
    pub archived: ArchivedInvoice,
    pub pdf: Vec<u8>,
}

pub struct InvoiceService {
    db: DbState,
    fonts: FontSet,
    format: NumberFormat,
    defaults: AssemblyDefaults,
    rates: RateCache,
    base_currency: String,
}

impl InvoiceService {
    pub fn new(db: DbState, fonts: FontSet, rates: RateCache, config: &Config) -> Self {
        Self {
            db,
            fonts,
            format: NumberFormat::from(&config.numbering),
            defaults: AssemblyDefaults::from(config),
            rates,
            base_currency: config.rates.base_currency.clone(),
        }
    }

    /// Opens the configured database and fonts.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = DbState::open(&config.database.path)?;
        let fonts = FontSet::from_config(&config.fonts)?;
        Ok(Self::new(db, fonts, RateCache::from_config(&config.rates)?, config))
    }

    /// Allocates, assembles and archives in one transaction, then renders.
    ///
    /// Any failure before the commit rolls the counter back, so the ledger
    /// never holds a number without its archived model.
    pub async fn issue(&self, request: InvoiceRequest) -> Result<IssuedInvoice> {
        let format = self.format.clone();
        let defaults = self.defaults.clone();
        let (archived, model) = self
            .db
            .with_write("issue_invoice", move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let number = numbering::allocate_in(&tx, &format, request.issue_date)?;
                let model = assemble(&request, &number.formatted, &defaults)?;
                let archived = archive::persist(&tx, &model)?;
                tx.commit()?;
                Ok((archived, model))
            })
            .await?;
        tracing::info!(
            invoice = %archived.number,
            kind = archived.kind.as_str(),
            total = archived.grand_total,
            "invoice issued"
        );

        let pdf = self.render(model).await?;
        Ok(IssuedInvoice { archived, pdf })
    }

    pub async fn issue_from_quote(&self, request: QuoteInvoiceRequest) -> Result<IssuedInvoice> {
        request.quote.ensure_invoiceable()?;
        let from = request
            .quote
            .currency
            .clone()
            .unwrap_or_else(|| self.base_currency.clone());
        let to = request
            .currency
            .clone()
            .unwrap_or_else(|| self.defaults.currency.clone());
        let rate = self.rates.rate(&from, &to).await?;
        let invoice = request_from_quote(&request.quote, request.issue_date, &to, rate, request.language)?;
        self.issue(invoice).await
    }

    /// Paints the archived model again; the bytes are deterministic for the same fonts.
    pub async fn redownload(&self, number: &str) -> Result<(String, Vec<u8>)> {
        let model = self.get_model(number).await?;
        let number = model.meta.number.clone();
        let pdf = self.render(model).await?;
        Ok((number, pdf))
    }

    pub async fn get_model(&self, number: &str) -> Result<InvoiceDocumentModel> {
        let number = number.to_string();
        self.db
            .with_read("load_invoice", move |conn| archive::load(conn, &number))
            .await
    }

    pub async fn list(&self, year: Option<i32>) -> Result<Vec<ArchivedInvoice>> {
        self.db
            .with_read("list_invoices", move |conn| archive::list(conn, year))
            .await
    }

    pub async fn preview_next_number(&self, date: Date) -> Result<InvoiceNumber> {
        let format = self.format.clone();
        self.db
            .with_read("preview_next_number", move |conn| {
                numbering::preview_next(conn, &format, date)
            })
            .await
    }

    async fn render(&self, model: InvoiceDocumentModel) -> Result<Vec<u8>> {
        let fonts = self.fonts.clone();
        tokio::task::spawn_blocking(move || generate_pdf_bytes(&model, &fonts)).await?
    }
}

pub type SharedService = Arc<InvoiceService>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{OrderLines, ServiceLine};
    use crate::error::InvoiceError;
    use crate::model::{fixtures, Logistics};
    use crate::quote::{CostKind, QuoteStatus, ServiceCatalogEntry, ServiceStatus};
    use crate::rates::{Clock, RateSource, SystemClock};
    use async_trait::async_trait;
    use std::time::Duration;
    use time::macros::date;

    struct FlatRate(f64);

    #[async_trait]
    impl RateSource for FlatRate {
        async fn fetch(&self, _base: &str, _symbol: &str) -> Result<f64> {
            Ok(self.0)
        }
    }

    fn service() -> InvoiceService {
        let mut config = Config::default();
        config.issuer = fixtures::company();
        config.payment = fixtures::model().payment;
        config.defaults.currency = "USD".into();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let rates = RateCache::new(Arc::new(FlatRate(0.2)), clock, Duration::from_secs(60));
        InvoiceService::new(DbState::open_in_memory().unwrap(), FontSet::builtin(), rates, &config)
    }

    fn request(lines: Vec<ServiceLine>) -> InvoiceRequest {
        InvoiceRequest {
            issue_date: date!(2024 - 03 - 15),
            language: Some(Language::En),
            currency: None,
            customer: fixtures::model().customer,
            customer_reference: None,
            payment_terms: None,
            delivery_terms: None,
            order: OrderLines::Services(lines),
            discount: 0.0,
            shipping: 0.0,
            logistics: Logistics::default(),
            payment: None,
            acknowledgement: None,
        }
    }

    fn line(description: &str, unit_price: f64) -> ServiceLine {
        ServiceLine {
            code: None,
            description: description.into(),
            quantity: None,
            unit: None,
            unit_price,
        }
    }

    #[tokio::test]
    async fn issue_archives_and_renders() {
        let svc = service();
        let issued = svc.issue(request(vec![line("Consulting services", 1000.0)])).await.unwrap();
        assert_eq!(issued.archived.number, "INV-202401");
        assert!(issued.pdf.starts_with(b"%PDF"));

        let model = svc.get_model("INV-202401").await.unwrap();
        assert_eq!(model.totals.grand_total, 1000.0);
        assert_eq!(svc.list(Some(2024)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_assembly_leaves_no_gap() {
        let svc = service();
        let err = svc.issue(request(vec![])).await.unwrap_err();
        assert!(matches!(err, InvoiceError::MalformedModel(_)));

        let next = svc.preview_next_number(date!(2024 - 06 - 01)).await.unwrap();
        assert_eq!(next.formatted, "INV-202401");
        let issued = svc.issue(request(vec![line("Fee", 10.0)])).await.unwrap();
        assert_eq!(issued.archived.number, "INV-202401");
    }

    #[tokio::test]
    async fn redownload_repaints_the_archived_model() {
        let svc = service();
        let issued = svc.issue(request(vec![line("Fee", 10.0)])).await.unwrap();
        let (number, again) = svc.redownload("INV-202401").await.unwrap();
        assert_eq!(number, "INV-202401");
        assert!(again.starts_with(b"%PDF"));
        assert_eq!(issued.archived.model_sha256.len(), 64);
        assert!(matches!(
            svc.redownload("INV-209999").await,
            Err(InvoiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn quote_is_converted_into_invoice_currency() {
        let svc = service();
        let quote = Quote {
            id: "q-1".into(),
            customer: fixtures::model().customer,
            service: ServiceCatalogEntry {
                id: "svc-1".into(),
                name: "Gateway onboarding".into(),
                cost_kind: CostKind::Fixed,
                value: 100.0,
                status: ServiceStatus::Active,
            },
            sale_value: 5000.0,
            commission_percent: 0.0,
            notes: None,
            status: QuoteStatus::Closed,
            currency: Some("BRL".into()),
        };
        let issued = svc
            .issue_from_quote(QuoteInvoiceRequest {
                quote,
                issue_date: date!(2024 - 03 - 20),
                currency: None,
                language: None,
            })
            .await
            .unwrap();
        assert!((issued.archived.grand_total - 1000.0).abs() < 1e-9);
        assert_eq!(issued.archived.currency, "USD");
    }
}
