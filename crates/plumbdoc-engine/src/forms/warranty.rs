use anyhow::{bail, Result};
use plumbdoc_contracts::documents::{ClientIdentity, DocumentMeta, WarrantyData};
use serde::Deserialize;
use serde_json::Value;

use super::{client_block, first_filled, DocumentForm};
use crate::extract::parse_draft;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyForm {
    pub client: ClientIdentity,
    pub service_description: String,
    /// Free text such as "2 anos".
    pub period: String,
    #[serde(default)]
    pub service_date: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WarrantyDraft {
    service_description: String,
    terms: Vec<String>,
    exclusions: String,
}

impl DocumentForm for WarrantyForm {
    type Output = WarrantyData;

    fn client(&self) -> &ClientIdentity {
        &self.client
    }

    fn system_instruction(&self) -> String {
        "Redige um certificado de garantia de serviços de canalização. \
Devolve JSON com a forma:\n\
{\"serviceDescription\": string, \"terms\": [string], \"exclusions\": string}\n\
Os termos são cláusulas curtas e numeráveis, pela ordem em que devem aparecer."
            .to_string()
    }

    fn prompt(&self) -> String {
        let mut prompt = vec![
            client_block(&self.client),
            format!("Serviço realizado: {}", self.service_description.trim()),
            format!("Período de garantia: {}", self.period.trim()),
        ];
        if !self.service_date.trim().is_empty() {
            prompt.push(format!("Data do serviço: {}", self.service_date.trim()));
        }
        if !self.notes.trim().is_empty() {
            prompt.push(format!("Notas: {}", self.notes.trim()));
        }
        prompt.join("\n")
    }

    fn build(&self, meta: DocumentMeta, draft: Value) -> Result<WarrantyData> {
        if self.period.trim().is_empty() {
            bail!("warranty period is required");
        }
        let draft: WarrantyDraft = parse_draft(draft)?;
        Ok(WarrantyData {
            meta,
            client: self.client.clone(),
            service_description: first_filled(&[
                &draft.service_description,
                &self.service_description,
            ]),
            period: self.period.trim().to_string(),
            terms: draft
                .terms
                .into_iter()
                .map(|term| term.trim().to_string())
                .filter(|term| !term.is_empty())
                .collect(),
            exclusions: draft.exclusions.trim().to_string(),
        })
    }
}
