//! Request payloads and their conversion into the renderer's document model.
//!
//! Business rules live here, not in layout: quantity defaults, totals,
//! discount bounds, payment fallbacks and the spelled-out amount.

use serde::{Deserialize, Serialize};
use time::Date;

use crate::config::Config;
use crate::error::{InvoiceError, Result};
use crate::model::{
    present, ymd, CompanyIdentity, Currency, CustomerBlock, DocumentKind, InvoiceDocumentModel,
    InvoiceMeta, Language, LineItem, Logistics, PaymentInstructions, Totals,
};
use crate::quote::Quote;
use crate::spell::amount_in_words;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLine {
    #[serde(default)]
    pub code: Option<String>,
    pub description: String,
    /// Absent or zero means one unit of service.
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductLine {
    #[serde(default)]
    pub code: Option<String>,
    pub description: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub unit_price: f64,
}

/// Tagged at the boundary so nothing downstream guesses the kind from the payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "lines", rename_all = "snake_case")]
pub enum OrderLines {
    Services(Vec<ServiceLine>),
    Products(Vec<ProductLine>),
}

impl OrderLines {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Services(_) => DocumentKind::ServiceInvoice,
            Self::Products(_) => DocumentKind::ProductInvoice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    #[serde(with = "ymd")]
    pub issue_date: Date,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub currency: Option<String>,
    pub customer: CustomerBlock,
    #[serde(default)]
    pub customer_reference: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub delivery_terms: Option<String>,
    #[serde(flatten)]
    pub order: OrderLines,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub shipping: f64,
    #[serde(default)]
    pub logistics: Logistics,
    #[serde(default)]
    pub payment: Option<PaymentInstructions>,
    #[serde(default)]
    pub acknowledgement: Option<String>,
}

/// Static inputs assembly needs besides the request itself.
#[derive(Debug, Clone)]
pub struct AssemblyDefaults {
    pub issuer: CompanyIdentity,
    pub payment: PaymentInstructions,
    pub language: Language,
    pub currency: String,
}

impl From<&Config> for AssemblyDefaults {
    fn from(cfg: &Config) -> Self {
        Self {
            issuer: cfg.issuer.clone(),
            payment: cfg.payment.clone(),
            language: cfg.defaults.language,
            currency: cfg.defaults.currency.clone(),
        }
    }
}

/// Largest total accepted, ten trillion. Above it f64 no longer carries
/// exact cents.
pub const MAX_TOTAL: f64 = 1e13;

fn check_amount(what: &str, v: f64) -> Result<f64> {
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(InvoiceError::malformed(format!("{what} must be a non-negative amount, got {v}")))
    }
}

fn line_item(
    serial_index: u32,
    code: &Option<String>,
    description: &str,
    quantity: f64,
    unit: &Option<String>,
    unit_price: f64,
) -> Result<LineItem> {
    if description.trim().is_empty() {
        return Err(InvoiceError::malformed(format!("line {serial_index} has no description")));
    }
    let quantity = check_amount(&format!("quantity of line {serial_index}"), quantity)?;
    let unit_price = check_amount(&format!("unit price of line {serial_index}"), unit_price)?;
    Ok(LineItem {
        serial_index,
        product_code: present(code).map(str::to_string),
        description: description.trim().to_string(),
        quantity,
        unit: present(unit).map(str::to_string),
        unit_price,
        line_total: quantity * unit_price,
    })
}

fn line_items(order: &OrderLines) -> Result<Vec<LineItem>> {
    let items = match order {
        OrderLines::Services(lines) => lines
            .iter()
            .zip(1u32..)
            .map(|(l, idx)| {
                let quantity = match l.quantity {
                    Some(q) if q != 0.0 => q,
                    _ => 1.0,
                };
                line_item(idx, &l.code, &l.description, quantity, &l.unit, l.unit_price)
            })
            .collect::<Result<Vec<_>>>()?,
        OrderLines::Products(lines) => lines
            .iter()
            .zip(1u32..)
            .map(|(l, idx)| line_item(idx, &l.code, &l.description, l.quantity, &l.unit, l.unit_price))
            .collect::<Result<Vec<_>>>()?,
    };
    if items.is_empty() {
        return Err(InvoiceError::malformed("invoice has no line items"));
    }
    Ok(items)
}

fn currency(raw: &str) -> Result<Currency> {
    let code = raw.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(InvoiceError::malformed(format!("invalid currency code {code:?}")));
    }
    Ok(Currency::from_code(code))
}

/// Builds the normalized model for an already allocated invoice number.
pub fn assemble(request: &InvoiceRequest, number: &str, defaults: &AssemblyDefaults) -> Result<InvoiceDocumentModel> {
    let items = line_items(&request.order)?;
    let language = request.language.unwrap_or(defaults.language);
    let currency = currency(request.currency.as_deref().unwrap_or(&defaults.currency))?;

    let subtotal: f64 = items.iter().map(|i| i.line_total).sum();
    let discount = check_amount("discount", request.discount)?;
    let shipping = check_amount("shipping", request.shipping)?;
    if discount > subtotal {
        return Err(InvoiceError::malformed(format!(
            "discount {discount} exceeds subtotal {subtotal}"
        )));
    }
    let grand_total = subtotal - discount + shipping;
    if subtotal >= MAX_TOTAL || grand_total >= MAX_TOTAL {
        return Err(InvoiceError::malformed(format!(
            "total {grand_total} exceeds the supported maximum {MAX_TOTAL}"
        )));
    }

    let payment = match &request.payment {
        Some(p) if !p.is_empty() => p.clone(),
        _ => defaults.payment.clone(),
    };

    let model = InvoiceDocumentModel {
        kind: request.order.kind(),
        language,
        company: defaults.issuer.clone(),
        customer: request.customer.clone(),
        meta: InvoiceMeta {
            number: number.to_string(),
            issue_date: request.issue_date,
            customer_reference: request.customer_reference.clone(),
            payment_terms: request.payment_terms.clone(),
            delivery_terms: request.delivery_terms.clone(),
            currency: currency.clone(),
        },
        line_items: items,
        logistics: request.logistics.clone(),
        payment,
        totals: Totals {
            subtotal,
            discount,
            shipping,
            grand_total,
            amount_in_words: amount_in_words(grand_total, &currency, language),
        },
        acknowledgement: request.acknowledgement.clone(),
    };
    model.validate()?;
    Ok(model)
}

/// Turns a closed quote into a one-line service invoice request.
///
/// `rate` converts the quote's currency into `currency`; pass 1.0 when they match.
pub fn request_from_quote(
    quote: &Quote,
    issue_date: Date,
    currency: &str,
    rate: f64,
    language: Option<Language>,
) -> Result<InvoiceRequest> {
    quote.ensure_invoiceable()?;
    if !(rate.is_finite() && rate > 0.0) {
        return Err(InvoiceError::RateUnavailable(format!("invalid conversion rate {rate}")));
    }
    let description = match present(&quote.notes) {
        Some(notes) => format!("{}\n{notes}", quote.service.name.trim()),
        None => quote.service.name.trim().to_string(),
    };
    Ok(InvoiceRequest {
        issue_date,
        language,
        currency: Some(currency.to_string()),
        customer: quote.customer.clone(),
        customer_reference: Some(quote.id.clone()),
        payment_terms: None,
        delivery_terms: None,
        order: OrderLines::Services(vec![ServiceLine {
            code: Some(quote.service.id.clone()),
            description,
            quantity: None,
            unit: None,
            unit_price: quote.sale_value * rate,
        }]),
        discount: 0.0,
        shipping: 0.0,
        logistics: Logistics::default(),
        payment: None,
        acknowledgement: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;
    use crate::quote::{CostKind, QuoteStatus, ServiceCatalogEntry, ServiceStatus};
    use time::macros::date;

    fn defaults() -> AssemblyDefaults {
        AssemblyDefaults {
            issuer: fixtures::company(),
            payment: fixtures::model().payment,
            language: Language::En,
            currency: "USD".into(),
        }
    }

    fn service(description: &str, quantity: Option<f64>, unit_price: f64) -> ServiceLine {
        ServiceLine {
            code: None,
            description: description.into(),
            quantity,
            unit: None,
            unit_price,
        }
    }

    fn request(order: OrderLines) -> InvoiceRequest {
        InvoiceRequest {
            issue_date: date!(2024 - 03 - 15),
            language: None,
            currency: None,
            customer: fixtures::model().customer,
            customer_reference: None,
            payment_terms: None,
            delivery_terms: None,
            order,
            discount: 0.0,
            shipping: 0.0,
            logistics: Logistics::default(),
            payment: None,
            acknowledgement: None,
        }
    }

    #[test]
    fn consulting_example_totals() {
        let mut req = request(OrderLines::Services(vec![
            service("Consulting services", Some(1.0), 1000.0),
            service("Setup fee", Some(1.0), 250.0),
        ]));
        req.discount = 50.0;
        let m = assemble(&req, "INV-202401", &defaults()).unwrap();
        assert_eq!(m.totals.subtotal, 1250.0);
        assert_eq!(m.totals.grand_total, 1200.0);
        assert!(m.totals.amount_in_words.starts_with("ONE THOUSAND TWO HUNDRED"));
        assert_eq!(m.kind, DocumentKind::ServiceInvoice);
        assert_eq!(m.line_items[1].serial_index, 2);
    }

    #[test]
    fn service_quantity_defaults_to_one() {
        let req = request(OrderLines::Services(vec![
            service("Audit", None, 80.0),
            service("Review", Some(0.0), 20.0),
            service("Hours", Some(2.5), 100.0),
        ]));
        let m = assemble(&req, "INV-202401", &defaults()).unwrap();
        let qty: Vec<f64> = m.line_items.iter().map(|i| i.quantity).collect();
        assert_eq!(qty, vec![1.0, 1.0, 2.5]);
        assert_eq!(m.totals.subtotal, 80.0 + 20.0 + 250.0);
    }

    #[test]
    fn product_zero_quantity_is_a_zero_line() {
        let req = request(OrderLines::Products(vec![
            ProductLine {
                code: Some("POS-01".into()),
                description: "POS terminal".into(),
                quantity: 0.0,
                unit: None,
                unit_price: 399.0,
            },
            ProductLine {
                code: None,
                description: "Paper rolls".into(),
                quantity: 3.0,
                unit: Some("box".into()),
                unit_price: 12.5,
            },
        ]));
        let m = assemble(&req, "INV-202401", &defaults()).unwrap();
        assert_eq!(m.kind, DocumentKind::ProductInvoice);
        assert_eq!(m.line_items[0].line_total, 0.0);
        assert_eq!(m.totals.subtotal, 37.5);
    }

    #[test]
    fn totals_follow_the_formula() {
        let lines: Vec<ServiceLine> = (1..=7)
            .map(|i| service(&format!("Item {i}"), Some(i as f64 * 0.5), 19.99 * i as f64))
            .collect();
        let mut req = request(OrderLines::Services(lines.clone()));
        req.discount = 10.0;
        req.shipping = 4.5;
        let m = assemble(&req, "INV-202401", &defaults()).unwrap();
        let expected: f64 = lines
            .iter()
            .map(|l| l.quantity.unwrap_or(1.0) * l.unit_price)
            .sum();
        assert!((m.totals.subtotal - expected).abs() < 1e-9);
        assert!((m.totals.grand_total - (expected - 10.0 + 4.5)).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_requests() {
        let empty = request(OrderLines::Services(vec![]));
        assert!(assemble(&empty, "INV-202401", &defaults()).unwrap_err().is_user_correctable());

        let mut too_much = request(OrderLines::Services(vec![service("Fee", None, 10.0)]));
        too_much.discount = 11.0;
        assert!(assemble(&too_much, "INV-202401", &defaults()).is_err());

        let negative = request(OrderLines::Services(vec![service("Fee", Some(-1.0), 10.0)]));
        assert!(assemble(&negative, "INV-202401", &defaults()).is_err());

        let huge = request(OrderLines::Services(vec![service("Fee", Some(1e6), 1e8)]));
        let err = assemble(&huge, "INV-202401", &defaults()).unwrap_err();
        assert!(matches!(err, InvoiceError::MalformedModel(_)));

        let mut bad_currency = request(OrderLines::Services(vec![service("Fee", None, 10.0)]));
        bad_currency.currency = Some("dollars".into());
        assert!(assemble(&bad_currency, "INV-202401", &defaults()).is_err());
    }

    #[test]
    fn payment_falls_back_to_configured_bank() {
        let mut req = request(OrderLines::Services(vec![service("Fee", None, 10.0)]));
        req.payment = Some(PaymentInstructions {
            bank_name: Some(" ".into()),
            ..Default::default()
        });
        let m = assemble(&req, "INV-202401", &defaults()).unwrap();
        assert_eq!(m.payment, defaults().payment);
    }

    #[test]
    fn request_json_carries_the_kind_tag() {
        let json = r#"{
            "issue_date": "2024-03-15",
            "customer": { "name": "ACME" },
            "kind": "products",
            "lines": [{ "description": "POS terminal", "quantity": 2, "unit_price": 399.0 }]
        }"#;
        let req: InvoiceRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.order.kind(), DocumentKind::ProductInvoice);
        assert_eq!(req.discount, 0.0);
    }

    #[test]
    fn closed_quote_becomes_one_service_line() {
        let quote = Quote {
            id: "q-17".into(),
            customer: fixtures::model().customer,
            service: ServiceCatalogEntry {
                id: "svc-9".into(),
                name: "PIX integration".into(),
                cost_kind: CostKind::Percentage,
                value: 10.0,
                status: ServiceStatus::Active,
            },
            sale_value: 5000.0,
            commission_percent: 2.0,
            notes: Some("Phase 1".into()),
            status: QuoteStatus::Closed,
            currency: Some("BRL".into()),
        };
        let req = request_from_quote(&quote, date!(2024 - 04 - 01), "USD", 0.2, None).unwrap();
        let m = assemble(&req, "INV-202402", &defaults()).unwrap();
        assert_eq!(m.line_items.len(), 1);
        assert_eq!(m.line_items[0].description, "PIX integration\nPhase 1");
        assert!((m.totals.grand_total - 1000.0).abs() < 1e-9);
        assert_eq!(m.meta.customer_reference.as_deref(), Some("q-17"));

        let mut open = quote.clone();
        open.status = QuoteStatus::Analysis;
        assert!(request_from_quote(&open, date!(2024 - 04 - 01), "USD", 1.0, None).is_err());
    }
}
