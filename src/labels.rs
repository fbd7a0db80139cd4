use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::{InvoiceError, Result};
use crate::model::Language;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Labels {
    pub doc_title: String,
    pub invoice_title: String,
    pub bill_to: String,
    pub details_title: String,

    pub invoice_number: String,
    pub issue_date: String,
    pub customer_reference: String,
    pub payment_terms: String,
    pub delivery_terms: String,

    pub tax_id: String,
    pub email: String,
    pub phone: String,
    pub website: String,

    pub col_serial: String,
    pub col_code: String,
    pub col_description: String,
    pub col_qty: String,
    pub col_unit: String,
    pub col_unit_price: String,
    pub col_total: String,

    pub subtotal: String,
    pub discount: String,
    pub shipping: String,
    pub grand_total: String,

    pub logistics_title: String,
    pub country_of_origin: String,
    pub hs_code: String,
    pub delivery_info: String,

    pub bank_title: String,
    pub bank_name: String,
    pub swift: String,
    pub branch: String,
    pub account: String,
    pub beneficiary_name: String,
    pub beneficiary_address: String,
    pub intermediary_bank: String,
    pub intermediary_swift: String,

    pub retention_title: String,
    pub retention_text: String,
    pub acknowledgement_title: String,
    pub acknowledgement_default: String,
    pub terms_title: String,
    pub terms: Vec<String>,

    pub signature_issuer: String,
    pub signature_customer: String,
    pub signature_caption: String,

    pub page_of: String,
    pub footer_generated: String,
    pub default_service_unit: String,
    pub default_product_unit: String,
}

impl Labels {
    pub fn acknowledgement(&self, customer: &str, invoice_number: &str) -> String {
        self.acknowledgement_default
            .replace("{CUSTOMER}", customer)
            .replace("{INVOICE_NUMBER}", invoice_number)
    }

    pub fn page_of(&self, page: usize, pages: usize) -> String {
        self.page_of
            .replace("{PAGE}", &page.to_string())
            .replace("{PAGES}", &pages.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct LabelsFile {
    en: Labels,
    pt: Labels,
}

static LABELS: OnceLock<std::result::Result<LabelsFile, String>> = OnceLock::new();

pub fn labels(lang: Language) -> Result<&'static Labels> {
    let file = LABELS.get_or_init(|| {
        let json = include_str!("../assets/labels.json");
        serde_json::from_str::<LabelsFile>(json)
            .map_err(|e| format!("failed to parse embedded assets/labels.json: {e}"))
    });
    let file = file.as_ref().map_err(|e| InvoiceError::Config(e.clone()))?;
    Ok(match lang {
        Language::En => &file.en,
        Language::Pt => &file.pt,
    })
}
