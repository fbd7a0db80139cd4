//! Per-year gapless invoice numbers.
//!
//! The ledger table `invoice_numbers` is the source of truth: the next
//! counter is always `MAX(counter) + 1` for the year, read and written inside
//! one IMMEDIATE transaction so concurrent allocators queue on SQLite's
//! reserved lock instead of reading the same maximum.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::config::NumberingConfig;
use crate::db::now_iso;
use crate::error::{is_constraint_violation, InvoiceError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNumber {
    pub year: i32,
    pub counter: u32,
    pub formatted: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    pub prefix: String,
    pub pad_width: usize,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            prefix: "INV-".to_string(),
            pad_width: 2,
        }
    }
}

impl From<&NumberingConfig> for NumberFormat {
    fn from(cfg: &NumberingConfig) -> Self {
        Self {
            prefix: cfg.prefix.clone(),
            pad_width: cfg.pad_width,
        }
    }
}

impl NumberFormat {
    /// `INV-` + `2024` + `01`.
    pub fn format(&self, year: i32, counter: u32) -> String {
        format!(
            "{}{:04}{:0width$}",
            self.prefix,
            year,
            counter,
            width = self.pad_width
        )
    }

    fn number(&self, year: i32, counter: u32) -> InvoiceNumber {
        InvoiceNumber {
            year,
            counter,
            formatted: self.format(year, counter),
        }
    }
}

fn next_counter(conn: &Connection, year: i32) -> Result<u32> {
    let highest: Option<u32> = conn
        .query_row(
            "SELECT MAX(counter) FROM invoice_numbers WHERE year = ?1",
            params![year],
            |r| r.get(0),
        )
        .optional()?
        .flatten();
    highest
        .unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| InvoiceError::malformed(format!("invoice counter for {year} is exhausted")))
}

/// Allocates inside a transaction the caller already holds (IMMEDIATE).
///
/// Nothing is committed here; a caller that rolls back releases the counter.
pub fn allocate_in(conn: &Connection, format: &NumberFormat, invoice_date: Date) -> Result<InvoiceNumber> {
    let year = invoice_date.year();
    let counter = next_counter(conn, year)?;
    let number = format.number(year, counter);

    let inserted = conn.execute(
        "INSERT INTO invoice_numbers (number, year, month, counter, createdAt) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            number.formatted,
            year,
            u8::from(invoice_date.month()),
            counter,
            now_iso()
        ],
    );
    match inserted {
        Ok(_) => Ok(number),
        Err(e) if is_constraint_violation(&e) => Err(InvoiceError::AllocationConflict {
            number: number.formatted,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Allocates and durably records the next number for the invoice's civil year.
pub fn allocate(conn: &mut Connection, format: &NumberFormat, invoice_date: Date) -> Result<InvoiceNumber> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let number = allocate_in(&tx, format, invoice_date)?;
    tx.commit()?;
    tracing::info!(number = %number.formatted, "invoice number allocated");
    Ok(number)
}

/// The number the next allocation for this date would receive. Consumes nothing.
pub fn preview_next(conn: &Connection, format: &NumberFormat, invoice_date: Date) -> Result<InvoiceNumber> {
    let year = invoice_date.year();
    Ok(format.number(year, next_counter(conn, year)?))
}
