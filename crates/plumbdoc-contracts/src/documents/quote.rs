use serde::{Deserialize, Serialize};

use super::{ClientIdentity, Document, DocumentKind, DocumentMeta};
use crate::pricing::{quote_totals, QuoteTotals};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteStep {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub tax_rate: f64,
}

impl QuoteStep {
    pub fn line_total(&self) -> f64 {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteData {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub client: ClientIdentity,
    #[serde(default)]
    pub city: String,
    pub currency: String,
    #[serde(default)]
    pub steps: Vec<QuoteStep>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub payment_terms: String,
    /// Source photos the quote was drafted from.
    #[serde(default)]
    pub images: Vec<String>,
}

impl QuoteData {
    pub fn totals(&self) -> QuoteTotals {
        quote_totals(&self.steps)
    }
}

impl Document for QuoteData {
    const KIND: DocumentKind = DocumentKind::Quote;

    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    fn client(&self) -> &ClientIdentity {
        &self.client
    }
}

fn default_quantity() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn quote_serializes_flat_camel_case_record() -> anyhow::Result<()> {
        let quote = QuoteData {
            meta: DocumentMeta {
                id: "q-1".to_string(),
                code: "ORC-1234".to_string(),
                created_at: "2026-03-01T09:00:00+00:00".to_string(),
            },
            client: ClientIdentity {
                name: "João Costa".to_string(),
                nif: "501234567".to_string(),
                ..ClientIdentity::default()
            },
            city: "Porto".to_string(),
            currency: "EUR".to_string(),
            steps: vec![QuoteStep {
                title: "Substituição de esquentador".to_string(),
                description: String::new(),
                unit_price: 320.0,
                quantity: 1.0,
                tax_rate: 23.0,
            }],
            summary: String::new(),
            payment_terms: "50% na adjudicação".to_string(),
            images: Vec::new(),
        };
        let value = serde_json::to_value(&quote)?;
        assert_eq!(value["id"], json!("q-1"));
        assert_eq!(value["createdAt"], json!("2026-03-01T09:00:00+00:00"));
        assert_eq!(value["steps"][0]["unitPrice"], json!(320.0));
        assert_eq!(value["paymentTerms"], json!("50% na adjudicação"));
        assert!(value.get("meta").is_none());

        let parsed: QuoteData = serde_json::from_value(value)?;
        assert_eq!(parsed, quote);
        Ok(())
    }

    #[test]
    fn step_quantity_defaults_to_one() -> anyhow::Result<()> {
        let step: QuoteStep =
            serde_json::from_value(json!({"title": "Mão de obra", "unitPrice": 35}))?;
        assert_eq!(step.quantity, 1.0);
        assert_eq!(step.line_total(), 35.0);
        assert_eq!(serde_json::to_value(&step)?["taxRate"], Value::from(0.0));
        Ok(())
    }
}
