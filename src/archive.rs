use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::now_iso;
use crate::error::{is_constraint_violation, InvoiceError, Result};
use crate::model::{present, DocumentKind, InvoiceDocumentModel, Language};

/// Listing row for an archived invoice; the full model stays in `data_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedInvoice {
    pub id: String,
    pub number: String,
    pub kind: DocumentKind,
    pub language: Language,
    pub issue_date: String,
    pub currency: String,
    pub grand_total: f64,
    pub customer_name: Option<String>,
    pub model_sha256: String,
    pub created_at: String,
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let out = hasher.finalize();
    out.iter().map(|b| format!("{b:02x}")).collect()
}

fn parse_kind(raw: &str) -> Option<DocumentKind> {
    [DocumentKind::ServiceInvoice, DocumentKind::ProductInvoice]
        .into_iter()
        .find(|k| k.as_str() == raw)
}

fn read_archived(r: &rusqlite::Row<'_>) -> std::result::Result<ArchivedInvoice, rusqlite::Error> {
    let kind: String = r.get(2)?;
    let language: String = r.get(3)?;
    let bad_column = |idx: usize, value: &str| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unexpected value {value:?}").into(),
        )
    };
    Ok(ArchivedInvoice {
        id: r.get(0)?,
        number: r.get(1)?,
        kind: parse_kind(&kind).ok_or_else(|| bad_column(2, &kind))?,
        language: Language::parse(&language).ok_or_else(|| bad_column(3, &language))?,
        issue_date: r.get(4)?,
        currency: r.get(5)?,
        grand_total: r.get(6)?,
        customer_name: r.get(7)?,
        model_sha256: r.get(8)?,
        created_at: r.get(9)?,
    })
}

const SELECT_ARCHIVED: &str = "SELECT id, number, kind, language, issueDate, currency, grandTotal, customerName, modelSha256, createdAt FROM invoice_documents";

/// Stores the assembled model verbatim, keyed by its invoice number.
///
/// The number must already be in the ledger; archiving the same number twice fails.
pub fn persist(conn: &Connection, model: &InvoiceDocumentModel) -> Result<ArchivedInvoice> {
    let number = model.meta.number.trim();
    let allocated = conn
        .query_row(
            "SELECT 1 FROM invoice_numbers WHERE number = ?1",
            params![number],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !allocated {
        return Err(InvoiceError::malformed(format!(
            "invoice number {number} was never allocated"
        )));
    }

    let json = serde_json::to_string(model)?;
    let archived = ArchivedInvoice {
        id: Uuid::new_v4().to_string(),
        number: number.to_string(),
        kind: model.kind,
        language: model.language,
        issue_date: model.meta.issue_date.to_string(),
        currency: model.meta.currency.code.clone(),
        grand_total: model.totals.grand_total,
        customer_name: present(&model.customer.name).map(str::to_string),
        model_sha256: sha256_hex(&json),
        created_at: now_iso(),
    };

    let inserted = conn.execute(
        r#"INSERT INTO invoice_documents (
            id, number, kind, language, issueDate, currency, grandTotal, customerName, modelSha256, data_json, createdAt
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
        params![
            archived.id,
            archived.number,
            archived.kind.as_str(),
            archived.language.as_str(),
            archived.issue_date,
            archived.currency,
            archived.grand_total,
            archived.customer_name,
            archived.model_sha256,
            json,
            archived.created_at,
        ],
    );
    match inserted {
        Ok(_) => Ok(archived),
        Err(e) if is_constraint_violation(&e) => Err(InvoiceError::AlreadyArchived(archived.number)),
        Err(e) => Err(e.into()),
    }
}

/// Loads the exact model that was archived, verifying its checksum.
pub fn load(conn: &Connection, number: &str) -> Result<InvoiceDocumentModel> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT data_json, modelSha256 FROM invoice_documents WHERE number = ?1",
            params![number.trim()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((json, sha)) = row else {
        return Err(InvoiceError::NotFound(format!("invoice {}", number.trim())));
    };
    if sha256_hex(&json) != sha {
        tracing::error!(invoice = %number, "archived model checksum mismatch");
        return Err(InvoiceError::CorruptRecord(number.trim().to_string()));
    }
    Ok(serde_json::from_str(&json)?)
}

pub fn list(conn: &Connection, year: Option<i32>) -> Result<Vec<ArchivedInvoice>> {
    let mut out = Vec::new();
    match year {
        Some(year) => {
            let sql = format!("{SELECT_ARCHIVED} WHERE substr(issueDate, 1, 4) = ?1 ORDER BY issueDate, number");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![format!("{year:04}")], read_archived)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let sql = format!("{SELECT_ARCHIVED} ORDER BY issueDate, number");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], read_archived)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}
