use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

mod quote;
mod receipt;
mod report;
mod settings;
mod voucher;
mod warranty;

pub use quote::{QuoteData, QuoteStep};
pub use receipt::ReceiptData;
pub use report::{PhotoAnalysis, ReportConclusion, ReportSection, TechnicalReportData};
pub use settings::{CompanySettings, DEFAULT_CURRENCY, DEFAULT_TAX_RATE};
pub use voucher::{DiscountVoucherData, PromoVoucherData};
pub use warranty::WarrantyData;

/// The document types the generator knows how to produce and persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Quote,
    TechnicalReport,
    Warranty,
    Receipt,
    DiscountVoucher,
    PromoVoucher,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 6] = [
        DocumentKind::Quote,
        DocumentKind::TechnicalReport,
        DocumentKind::Warranty,
        DocumentKind::Receipt,
        DocumentKind::DiscountVoucher,
        DocumentKind::PromoVoucher,
    ];

    /// Fixed key of the collection holding every record of this type.
    pub fn storage_key(self) -> &'static str {
        match self {
            DocumentKind::Quote => "plumbdoc_quotes",
            DocumentKind::TechnicalReport => "plumbdoc_reports",
            DocumentKind::Warranty => "plumbdoc_warranties",
            DocumentKind::Receipt => "plumbdoc_receipts",
            DocumentKind::DiscountVoucher => "plumbdoc_discount_vouchers",
            DocumentKind::PromoVoucher => "plumbdoc_promo_vouchers",
        }
    }

    pub fn code_prefix(self) -> &'static str {
        match self {
            DocumentKind::Quote => "ORC",
            DocumentKind::TechnicalReport => "REL",
            DocumentKind::Warranty => "GAR",
            DocumentKind::Receipt => "REC",
            DocumentKind::DiscountVoucher => "VAL",
            DocumentKind::PromoVoucher => "PROMO",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            DocumentKind::Quote => "quote",
            DocumentKind::TechnicalReport => "report",
            DocumentKind::Warranty => "warranty",
            DocumentKind::Receipt => "receipt",
            DocumentKind::DiscountVoucher => "discount_voucher",
            DocumentKind::PromoVoucher => "promo_voucher",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DocumentKind::Quote => "Orçamento",
            DocumentKind::TechnicalReport => "Relatório Técnico",
            DocumentKind::Warranty => "Garantia",
            DocumentKind::Receipt => "Recibo",
            DocumentKind::DiscountVoucher => "Vale de Desconto",
            DocumentKind::PromoVoucher => "Vale Promocional",
        }
    }

    /// Alert shown to the user when generating this document type fails.
    pub fn failure_alert(self) -> &'static str {
        match self {
            DocumentKind::Quote => "Erro ao gerar o orçamento. Por favor, tente novamente.",
            DocumentKind::TechnicalReport => {
                "Erro ao gerar o relatório técnico. Por favor, tente novamente."
            }
            DocumentKind::Warranty => "Erro ao gerar a garantia. Por favor, tente novamente.",
            DocumentKind::Receipt => "Erro ao gerar o recibo. Por favor, tente novamente.",
            DocumentKind::DiscountVoucher => {
                "Erro ao gerar o vale de desconto. Por favor, tente novamente."
            }
            DocumentKind::PromoVoucher => {
                "Erro ao gerar o vale promocional. Por favor, tente novamente."
            }
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "quote" | "orcamento" => Ok(DocumentKind::Quote),
            "report" | "technical_report" | "relatorio" => Ok(DocumentKind::TechnicalReport),
            "warranty" | "garantia" => Ok(DocumentKind::Warranty),
            "receipt" | "recibo" => Ok(DocumentKind::Receipt),
            "voucher" | "discount_voucher" | "discount" => Ok(DocumentKind::DiscountVoucher),
            "promo" | "promo_voucher" => Ok(DocumentKind::PromoVoucher),
            _ => Err(format!("unknown document type '{raw}'")),
        }
    }
}

/// A persisted business document.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + 'static {
    const KIND: DocumentKind;

    fn meta(&self) -> &DocumentMeta;
    fn client(&self) -> &ClientIdentity;

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn code(&self) -> &str {
        &self.meta().code
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdentity {
    pub name: String,
    #[serde(default)]
    pub nif: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Identity fields shared by every document; flattened into the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub id: String,
    pub code: String,
    pub created_at: String,
}

impl DocumentMeta {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            id: new_document_id(),
            code: document_code(kind),
            created_at: now_utc_iso(),
        }
    }
}

/// Compact view of a stored record used by history listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub kind: DocumentKind,
    pub id: String,
    pub code: String,
    pub client_name: String,
    pub created_at: String,
}

impl DocumentSummary {
    pub fn from_value(kind: DocumentKind, value: &Value) -> Option<Self> {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let id = value.get("id").and_then(Value::as_str)?.to_string();
        Some(Self {
            kind,
            id,
            code: text("code"),
            client_name: value
                .get("client")
                .and_then(|client| client.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            created_at: text("createdAt"),
        })
    }
}

pub fn new_document_id() -> String {
    Uuid::new_v4().to_string()
}

/// Short display reference such as `ORC-4821`.
pub fn document_code(kind: DocumentKind) -> String {
    let number = Uuid::new_v4().as_u128() % 9000 + 1000;
    format!("{}-{number}", kind.code_prefix())
}

pub(crate) fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}
