use serde::{Deserialize, Serialize};

use super::{ClientIdentity, Document, DocumentKind, DocumentMeta};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptData {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub client: ClientIdentity,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub description: String,
}

impl Document for ReceiptData {
    const KIND: DocumentKind = DocumentKind::Receipt;

    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    fn client(&self) -> &ClientIdentity {
        &self.client
    }
}
