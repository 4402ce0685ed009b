use std::path::PathBuf;

use anyhow::{bail, Result};
use plumbdoc_contracts::documents::{
    ClientIdentity, CompanySettings, DocumentMeta, QuoteData, QuoteStep, DEFAULT_TAX_RATE,
};
use serde::Deserialize;
use serde_json::Value;

use super::{
    client_block, currency_or_default, first_filled, image_names, is_unset, DocumentForm,
};
use crate::extract::parse_draft;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteForm {
    pub client: ClientIdentity,
    #[serde(default)]
    pub city: String,
    /// Falls back to the company default, then EUR.
    #[serde(default)]
    pub currency: Option<String>,
    /// What the client asked for, in the plumber's words.
    pub work_description: String,
    #[serde(default)]
    pub payment_terms: String,
    /// Applied to steps the model returns without a rate.
    #[serde(default)]
    pub tax_rate: Option<f64>,
    #[serde(default)]
    pub images: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct QuoteDraft {
    summary: String,
    steps: Vec<StepDraft>,
    payment_terms: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDraft {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    unit_price: f64,
    quantity: Option<f64>,
    tax_rate: Option<f64>,
}

impl QuoteForm {
    pub fn effective_currency(&self) -> String {
        currency_or_default(self.currency.as_deref())
    }

    pub fn effective_tax_rate(&self) -> f64 {
        self.tax_rate.unwrap_or(DEFAULT_TAX_RATE)
    }
}

impl DocumentForm for QuoteForm {
    type Output = QuoteData;

    fn client(&self) -> &ClientIdentity {
        &self.client
    }

    fn system_instruction(&self) -> String {
        format!(
            "Prepara um orçamento detalhado por etapas. Devolve JSON com a forma:\n\
{{\"summary\": string, \"steps\": [{{\"title\": string, \"description\": string, \
\"unitPrice\": number, \"quantity\": number, \"taxRate\": number}}], \"paymentTerms\": string}}\n\
Os preços são em {} sem IVA; taxRate é a percentagem de IVA (por omissão {}).",
            self.effective_currency(),
            self.effective_tax_rate()
        )
    }

    fn prompt(&self) -> String {
        let mut prompt = vec![client_block(&self.client)];
        if !self.city.trim().is_empty() {
            prompt.push(format!("Localidade da obra: {}", self.city.trim()));
        }
        prompt.push(format!("Trabalho pedido:\n{}", self.work_description.trim()));
        if !self.payment_terms.trim().is_empty() {
            prompt.push(format!("Condições de pagamento: {}", self.payment_terms.trim()));
        }
        if !self.images.is_empty() {
            prompt.push(
                "Usa as fotografias anexadas para estimar materiais e mão de obra.".to_string(),
            );
        }
        prompt.join("\n\n")
    }

    fn images(&self) -> &[PathBuf] {
        &self.images
    }

    fn apply_company_defaults(&mut self, settings: &CompanySettings) {
        if is_unset(self.currency.as_deref()) {
            self.currency = Some(settings.default_currency.clone());
        }
        self.tax_rate.get_or_insert(settings.default_tax_rate);
    }

    fn build(&self, meta: DocumentMeta, draft: Value) -> Result<QuoteData> {
        let draft: QuoteDraft = parse_draft(draft)?;
        if draft.steps.is_empty() {
            bail!("AI response has no quote steps");
        }
        let default_rate = self.effective_tax_rate();
        let steps = draft
            .steps
            .into_iter()
            .map(|step| QuoteStep {
                title: step.title.trim().to_string(),
                description: step.description.trim().to_string(),
                unit_price: step.unit_price.max(0.0),
                quantity: step.quantity.filter(|q| *q > 0.0).unwrap_or(1.0),
                tax_rate: step.tax_rate.unwrap_or(default_rate),
            })
            .collect();
        Ok(QuoteData {
            meta,
            client: self.client.clone(),
            city: self.city.trim().to_string(),
            currency: self.effective_currency(),
            steps,
            summary: draft.summary.trim().to_string(),
            payment_terms: first_filled(&[&self.payment_terms, &draft.payment_terms]),
            images: image_names(&self.images),
        })
    }
}

#[cfg(test)]
mod tests {
    use plumbdoc_contracts::documents::DocumentKind;
    use serde_json::json;

    use super::*;

    fn form() -> anyhow::Result<QuoteForm> {
        Ok(serde_json::from_value(json!({
            "client": {"name": "João Costa", "nif": "501234567"},
            "city": "Porto",
            "workDescription": "Substituir esquentador e tubagem da cozinha."
        }))?)
    }

    #[test]
    fn form_defaults_currency_and_tax() -> anyhow::Result<()> {
        let form = form()?;
        assert_eq!(form.effective_currency(), "EUR");
        assert_eq!(form.effective_tax_rate(), 23.0);
        assert!(form.images.is_empty());
        assert!(form.prompt().contains("Localidade da obra: Porto"));
        Ok(())
    }

    #[test]
    fn build_fills_step_defaults_and_totals() -> anyhow::Result<()> {
        let draft = json!({
            "summary": " Substituição completa. ",
            "steps": [
                {"title": "Esquentador", "unitPrice": 300, "taxRate": 6},
                {"title": "Tubagem", "unitPrice": 10, "quantity": 5}
            ],
            "paymentTerms": "Pronto pagamento"
        });
        let quote = form()?.build(DocumentMeta::new(DocumentKind::Quote), draft)?;
        assert_eq!(quote.summary, "Substituição completa.");
        assert_eq!(quote.steps[0].quantity, 1.0);
        assert_eq!(quote.steps[0].tax_rate, 6.0);
        assert_eq!(quote.steps[1].tax_rate, 23.0);
        assert_eq!(quote.payment_terms, "Pronto pagamento");

        let totals = quote.totals();
        assert_eq!(totals.subtotal, 350.0);
        assert_eq!(totals.tax_amount, 29.5);
        assert_eq!(totals.total, 379.5);
        Ok(())
    }

    #[test]
    fn company_defaults_fill_only_unset_fields() -> anyhow::Result<()> {
        let settings = CompanySettings {
            default_currency: "CHF".to_string(),
            default_tax_rate: 6.0,
            ..CompanySettings::default()
        };
        let mut unset = form()?;
        unset.apply_company_defaults(&settings);
        assert_eq!(unset.effective_currency(), "CHF");
        assert_eq!(unset.effective_tax_rate(), 6.0);
        assert!(unset.system_instruction().contains("por omissão 6"));

        let mut explicit = form()?;
        explicit.currency = Some("EUR".to_string());
        explicit.tax_rate = Some(13.0);
        explicit.apply_company_defaults(&settings);
        assert_eq!(explicit.effective_currency(), "EUR");
        assert_eq!(explicit.effective_tax_rate(), 13.0);
        Ok(())
    }

    #[test]
    fn draft_without_steps_is_rejected() -> anyhow::Result<()> {
        let result = form()?.build(DocumentMeta::new(DocumentKind::Quote), json!({"summary": "x"}));
        assert!(result.is_err());
        Ok(())
    }
}
