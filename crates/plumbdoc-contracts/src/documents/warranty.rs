use serde::{Deserialize, Serialize};

use super::{ClientIdentity, Document, DocumentKind, DocumentMeta};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyData {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub client: ClientIdentity,
    #[serde(default)]
    pub service_description: String,
    /// Free text such as "2 anos".
    pub period: String,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub exclusions: String,
}

impl Document for WarrantyData {
    const KIND: DocumentKind = DocumentKind::Warranty;

    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    fn client(&self) -> &ClientIdentity {
        &self.client
    }
}
