use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::{InvoiceError, Result};

time::serde::format_description!(pub(crate) ymd, Date, "[year]-[month]-[day]");

/// Placeholder painted for any optional field that is absent.
pub const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Pt,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Pt => "pt",
        }
    }

    /// Accepts locale tags such as `en-US` or `pt_BR`.
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        if lower.starts_with("en") {
            Some(Self::En)
        } else if lower.starts_with("pt") {
            Some(Self::Pt)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    ServiceInvoice,
    ProductInvoice,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServiceInvoice => "service_invoice",
            Self::ProductInvoice => "product_invoice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub symbol: String,
}

impl Currency {
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_ascii_uppercase();
        let symbol = match code.as_str() {
            "USD" => "$",
            "BRL" => "R$",
            "EUR" => "€",
            "GBP" => "£",
            "CHF" => "Fr",
            _ => "",
        };
        Self { symbol: symbol.to_string(), code }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyIdentity {
    pub name: String,
    #[serde(default)]
    pub address_lines: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerBlock {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address_lines: Vec<String>,
    #[serde(default)]
    pub city_state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceMeta {
    pub number: String,
    #[serde(with = "ymd")]
    pub issue_date: Date,
    #[serde(default)]
    pub customer_reference: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub delivery_terms: Option<String>,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub serial_index: u32,
    #[serde(default)]
    pub product_code: Option<String>,
    pub description: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub unit_price: f64,
    /// Computed once at assembly; the renderer paints it as-is.
    pub line_total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Logistics {
    #[serde(default)]
    pub country_of_origin: Option<String>,
    #[serde(default)]
    pub hs_code: Option<String>,
    #[serde(default)]
    pub delivery_info: Option<String>,
    #[serde(default)]
    pub shipping_method: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentInstructions {
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub swift: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub beneficiary_name: Option<String>,
    #[serde(default)]
    pub beneficiary_address: Option<String>,
    #[serde(default)]
    pub intermediary_bank: Option<String>,
    #[serde(default)]
    pub intermediary_swift: Option<String>,
}

impl PaymentInstructions {
    pub fn is_empty(&self) -> bool {
        [
            &self.bank_name,
            &self.swift,
            &self.branch,
            &self.account,
            &self.beneficiary_name,
            &self.beneficiary_address,
            &self.intermediary_bank,
            &self.intermediary_swift,
        ]
        .iter()
        .all(|f| present(f).is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: f64,
    pub discount: f64,
    pub shipping: f64,
    pub grand_total: f64,
    pub amount_in_words: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDocumentModel {
    pub kind: DocumentKind,
    pub language: Language,
    pub company: CompanyIdentity,
    pub customer: CustomerBlock,
    pub meta: InvoiceMeta,
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub logistics: Logistics,
    #[serde(default)]
    pub payment: PaymentInstructions,
    pub totals: Totals,
    #[serde(default)]
    pub acknowledgement: Option<String>,
}

impl InvoiceDocumentModel {
    /// Structural checks the layout engine relies on. Business rules belong to assembly.
    pub fn validate(&self) -> Result<()> {
        if self.meta.number.trim().is_empty() {
            return Err(InvoiceError::malformed("invoice number is empty"));
        }
        if self.line_items.is_empty() {
            return Err(InvoiceError::malformed("invoice has no line items"));
        }
        if self.company.name.trim().is_empty() {
            return Err(InvoiceError::malformed("issuer company name is empty"));
        }
        if self.meta.currency.code.trim().is_empty() {
            return Err(InvoiceError::malformed("currency code is empty"));
        }
        for item in &self.line_items {
            let finite = item.quantity.is_finite()
                && item.unit_price.is_finite()
                && item.line_total.is_finite();
            if !finite {
                return Err(InvoiceError::malformed(format!(
                    "line item {} has a non-finite amount",
                    item.serial_index
                )));
            }
        }
        let t = &self.totals;
        if ![t.subtotal, t.discount, t.shipping, t.grand_total]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(InvoiceError::malformed("totals contain a non-finite amount"));
        }
        Ok(())
    }
}

/// Trimmed, non-empty view of an optional field.
pub fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub fn or_placeholder(value: &Option<String>) -> &str {
    present(value).unwrap_or(PLACEHOLDER)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_parses_locale_tags() {
        assert_eq!(Language::parse("en-US"), Some(Language::En));
        assert_eq!(Language::parse("pt_BR"), Some(Language::Pt));
        assert_eq!(Language::parse("sr"), None);
    }

    #[test]
    fn model_without_items_is_malformed() {
        let mut m = fixtures::model();
        m.line_items.clear();
        let err = m.validate().unwrap_err();
        assert!(err.is_user_correctable());
    }

    #[test]
    fn model_json_keeps_iso_dates() {
        let m = fixtures::model();
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"issue_date\":\"2024-03-15\""));
        let back: InvoiceDocumentModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn payment_with_blank_fields_is_empty() {
        let p = PaymentInstructions {
            bank_name: Some("   ".into()),
            ..Default::default()
        };
        assert!(p.is_empty());
    }
}
