use anyhow::{bail, Result};
use plumbdoc_contracts::documents::{ClientIdentity, CompanySettings, DocumentMeta, ReceiptData};
use plumbdoc_contracts::pricing::round_cents;
use serde::Deserialize;
use serde_json::Value;

use super::{client_block, currency_or_default, first_filled, is_unset, DocumentForm};
use crate::extract::parse_draft;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptForm {
    pub client: ClientIdentity,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_method: String,
    /// Service being paid for.
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ReceiptDraft {
    amount: Option<f64>,
    description: String,
    payment_method: String,
}

impl DocumentForm for ReceiptForm {
    type Output = ReceiptData;

    fn client(&self) -> &ClientIdentity {
        &self.client
    }

    fn system_instruction(&self) -> String {
        "Redige a descrição de um recibo de prestação de serviços. Devolve JSON com a forma:\n\
{\"amount\": number, \"description\": string, \"paymentMethod\": string}\n\
O valor deve ser exatamente o indicado pelo utilizador."
            .to_string()
    }

    fn prompt(&self) -> String {
        let mut prompt = vec![
            client_block(&self.client),
            format!(
                "Valor recebido: {:.2} {}",
                self.amount,
                currency_or_default(self.currency.as_deref())
            ),
            format!("Serviço: {}", self.description.trim()),
        ];
        if !self.payment_method.trim().is_empty() {
            prompt.push(format!("Forma de pagamento: {}", self.payment_method.trim()));
        }
        prompt.join("\n")
    }

    fn apply_company_defaults(&mut self, settings: &CompanySettings) {
        if is_unset(self.currency.as_deref()) {
            self.currency = Some(settings.default_currency.clone());
        }
    }

    fn build(&self, meta: DocumentMeta, draft: Value) -> Result<ReceiptData> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            bail!("receipt amount must be a non-negative number");
        }
        let draft: ReceiptDraft = parse_draft(draft)?;
        let amount = round_cents(self.amount);
        if let Some(drafted) = draft.amount {
            if (round_cents(drafted) - amount).abs() >= 0.01 {
                tracing::warn!(
                    form = amount,
                    drafted,
                    "AI changed the receipt amount; keeping the form value"
                );
            }
        }
        Ok(ReceiptData {
            meta,
            client: self.client.clone(),
            amount,
            currency: currency_or_default(self.currency.as_deref()),
            payment_method: first_filled(&[&self.payment_method, &draft.payment_method]),
            description: first_filled(&[&draft.description, &self.description]),
        })
    }
}
