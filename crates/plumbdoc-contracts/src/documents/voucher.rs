use serde::{Deserialize, Serialize};

use super::{ClientIdentity, Document, DocumentKind, DocumentMeta};
use crate::pricing::{DiscountInputs, DiscountTotals};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountVoucherData {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub client: ClientIdentity,
    pub inputs: DiscountInputs,
    pub totals: DiscountTotals,
    #[serde(default)]
    pub currency: String,
    /// `YYYY-MM-DD`.
    pub expiry_date: String,
    #[serde(default)]
    pub notes: String,
}

impl Document for DiscountVoucherData {
    const KIND: DocumentKind = DocumentKind::DiscountVoucher;

    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    fn client(&self) -> &ClientIdentity {
        &self.client
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoVoucherData {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub client: ClientIdentity,
    #[serde(default)]
    pub campaign: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub conditions: Vec<String>,
    pub inputs: DiscountInputs,
    pub totals: DiscountTotals,
    #[serde(default)]
    pub currency: String,
    pub expiry_date: String,
}

impl Document for PromoVoucherData {
    const KIND: DocumentKind = DocumentKind::PromoVoucher;

    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    fn client(&self) -> &ClientIdentity {
        &self.client
    }
}
