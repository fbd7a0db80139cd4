use serde::{Deserialize, Serialize};

use crate::error::{InvoiceError, Result};
use crate::model::CustomerBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    /// `value` is a percentage of the sale value.
    Percentage,
    /// `value` is an absolute amount.
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCatalogEntry {
    pub id: String,
    pub name: String,
    pub cost_kind: CostKind,
    pub value: f64,
    #[serde(default)]
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteBreakdown {
    pub sale_value: f64,
    pub cost: f64,
    pub margin: f64,
    pub commission: f64,
}

impl QuoteBreakdown {
    pub fn compute(entry: &ServiceCatalogEntry, sale_value: f64, commission_percent: f64) -> Self {
        let cost = match entry.cost_kind {
            CostKind::Percentage => sale_value * (entry.value / 100.0),
            CostKind::Fixed => entry.value,
        };
        Self {
            sale_value,
            cost,
            margin: sale_value - cost,
            commission: sale_value * (commission_percent / 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    #[default]
    Analysis,
    AwaitingConfirmation,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub customer: CustomerBlock,
    pub service: ServiceCatalogEntry,
    pub sale_value: f64,
    #[serde(default)]
    pub commission_percent: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: QuoteStatus,
    /// Currency the sale value is priced in; the configured base currency when absent.
    #[serde(default)]
    pub currency: Option<String>,
}

impl Quote {
    pub fn breakdown(&self) -> QuoteBreakdown {
        QuoteBreakdown::compute(&self.service, self.sale_value, self.commission_percent)
    }

    /// Only closed quotes for active services with a positive sale value can be invoiced.
    pub fn ensure_invoiceable(&self) -> Result<()> {
        if self.status != QuoteStatus::Closed {
            return Err(InvoiceError::malformed(format!(
                "quote {} is not closed",
                self.id
            )));
        }
        if self.service.status != ServiceStatus::Active {
            return Err(InvoiceError::malformed(format!(
                "service {} is inactive",
                self.service.name
            )));
        }
        if !(self.sale_value.is_finite() && self.sale_value > 0.0) {
            return Err(InvoiceError::malformed(format!(
                "quote {} has no sale value",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cost_kind: CostKind, value: f64) -> ServiceCatalogEntry {
        ServiceCatalogEntry {
            id: "svc-1".into(),
            name: "Card acquiring setup".into(),
            cost_kind,
            value,
            status: ServiceStatus::Active,
        }
    }

    fn quote(status: QuoteStatus) -> Quote {
        Quote {
            id: "q-1".into(),
            customer: CustomerBlock::default(),
            service: entry(CostKind::Fixed, 300.0),
            sale_value: 1000.0,
            commission_percent: 5.0,
            notes: None,
            status,
            currency: None,
        }
    }

    #[test]
    fn percentage_cost_scales_with_sale() {
        let b = QuoteBreakdown::compute(&entry(CostKind::Percentage, 12.5), 2000.0, 3.0);
        assert_eq!(b.cost, 250.0);
        assert_eq!(b.margin, 1750.0);
        assert_eq!(b.commission, 60.0);
    }

    #[test]
    fn fixed_cost_ignores_sale() {
        let b = QuoteBreakdown::compute(&entry(CostKind::Fixed, 300.0), 1000.0, 0.0);
        assert_eq!(b.cost, 300.0);
        assert_eq!(b.margin, 700.0);
        assert_eq!(b.commission, 0.0);
    }

    #[test]
    fn only_closed_quotes_are_invoiceable() {
        assert!(quote(QuoteStatus::Closed).ensure_invoiceable().is_ok());
        for status in [QuoteStatus::Analysis, QuoteStatus::AwaitingConfirmation] {
            let err = quote(status).ensure_invoiceable().unwrap_err();
            assert!(err.is_user_correctable());
        }
        let mut inactive = quote(QuoteStatus::Closed);
        inactive.service.status = ServiceStatus::Inactive;
        assert!(inactive.ensure_invoiceable().is_err());
    }

    #[test]
    fn status_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&QuoteStatus::AwaitingConfirmation).unwrap();
        assert_eq!(json, "\"awaiting_confirmation\"");
    }
}
