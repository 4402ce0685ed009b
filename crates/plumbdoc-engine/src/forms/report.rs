use std::path::PathBuf;

use anyhow::Result;
use plumbdoc_contracts::documents::{
    ClientIdentity, DocumentMeta, PhotoAnalysis, ReportConclusion, ReportSection,
    TechnicalReportData,
};
use serde::Deserialize;
use serde_json::Value;

use super::{client_block, first_filled, image_names, DocumentForm};
use crate::extract::parse_draft;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalReportForm {
    pub client: ClientIdentity,
    #[serde(default)]
    pub technician: String,
    #[serde(default)]
    pub title: String,
    /// Technician notes from the visit.
    pub observations: String,
    #[serde(default)]
    pub images: Vec<PathBuf>,
    /// Lets the model look up regulations and manufacturer data.
    #[serde(default)]
    pub search: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ReportDraft {
    title: String,
    development: Vec<ReportSection>,
    photo_analyses: Vec<PhotoAnalysis>,
    conclusion: ReportConclusion,
    recommendations: Vec<String>,
}

impl DocumentForm for TechnicalReportForm {
    type Output = TechnicalReportData;

    fn client(&self) -> &ClientIdentity {
        &self.client
    }

    fn system_instruction(&self) -> String {
        format!(
            "Redige um relatório técnico de canalização. Devolve JSON com a forma:\n\
{{\"title\": string, \"development\": [{{\"title\": string, \"content\": string}}], \
\"photoAnalyses\": [{{\"imageIndex\": number, \"legend\": string, \"description\": string}}], \
\"conclusion\": {{\"summary\": string, \"findings\": [string]}}, \"recommendations\": [string]}}\n\
O campo imageIndex começa em 0 e refere-se à ordem das fotografias anexadas \
({} no total). Não inventes fotografias.",
            self.images.len()
        )
    }

    fn prompt(&self) -> String {
        let mut prompt = vec![
            client_block(&self.client),
            format!(
                "Técnico responsável: {}",
                first_filled(&[&self.technician, "não indicado"])
            ),
        ];
        if !self.title.trim().is_empty() {
            prompt.push(format!("Assunto: {}", self.title.trim()));
        }
        prompt.push(format!("Observações da visita:\n{}", self.observations.trim()));
        if !self.images.is_empty() {
            prompt.push(format!(
                "Analisa cada uma das {} fotografias anexadas.",
                self.images.len()
            ));
        }
        if self.search {
            prompt.push("Consulta normas e documentação técnica atualizadas.".to_string());
        }
        prompt.join("\n\n")
    }

    fn images(&self) -> &[PathBuf] {
        &self.images
    }

    fn use_search(&self) -> bool {
        self.search
    }

    fn build(&self, meta: DocumentMeta, draft: Value) -> Result<TechnicalReportData> {
        let draft: ReportDraft = parse_draft(draft)?;
        let mut report = TechnicalReportData {
            meta,
            client: self.client.clone(),
            technician: self.technician.trim().to_string(),
            title: first_filled(&[&self.title, &draft.title]),
            development: draft.development,
            photo_analyses: draft.photo_analyses,
            conclusion: draft.conclusion,
            recommendations: draft.recommendations,
            images: image_names(&self.images),
        };
        let dropped = report.retain_known_photos();
        if dropped > 0 {
            tracing::warn!(
                dropped,
                photos = report.images.len(),
                "AI analysed photos that were not attached"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use plumbdoc_contracts::documents::DocumentKind;
    use serde_json::json;

    use super::*;

    fn form(images: &[&str]) -> TechnicalReportForm {
        TechnicalReportForm {
            client: ClientIdentity {
                name: "Condomínio Sol".to_string(),
                nif: "901234567".to_string(),
                ..ClientIdentity::default()
            },
            technician: "Rui Almeida".to_string(),
            title: String::new(),
            observations: "Humidade na parede da cozinha.".to_string(),
            images: images.iter().map(PathBuf::from).collect(),
            search: false,
        }
    }

    #[test]
    fn build_keeps_form_identity_and_drops_unknown_photos() -> anyhow::Result<()> {
        let draft = json!({
            "title": "Inspeção de humidade",
            "development": [{"title": "Observações", "content": "Parede húmida."}],
            "photoAnalyses": [
                {"imageIndex": 0, "legend": "Cozinha", "description": "Mancha."},
                {"imageIndex": 4, "legend": "Inventada"}
            ],
            "conclusion": {"summary": "Fuga na tubagem embutida.", "findings": ["Fuga"]},
            "recommendations": ["Abrir roço e substituir tubo"]
        });
        let report = form(&["cozinha.jpg"])
            .build(DocumentMeta::new(DocumentKind::TechnicalReport), draft)?;
        assert_eq!(report.title, "Inspeção de humidade");
        assert_eq!(report.client.nif, "901234567");
        assert_eq!(report.photo_analyses.len(), 1);
        assert_eq!(report.photo_for(&report.photo_analyses[0]), Some("cozinha.jpg"));
        assert_eq!(report.conclusion.findings, vec!["Fuga"]);
        assert!(report.meta.code.starts_with("REL-"));
        Ok(())
    }

    #[test]
    fn form_title_wins_and_missing_sections_default() -> anyhow::Result<()> {
        let mut form = form(&[]);
        form.title = "Vistoria anual".to_string();
        let report = form.build(
            DocumentMeta::new(DocumentKind::TechnicalReport),
            json!({"title": "Outro"}),
        )?;
        assert_eq!(report.title, "Vistoria anual");
        assert!(report.development.is_empty());
        assert_eq!(report.conclusion, ReportConclusion::default());
        Ok(())
    }

    #[test]
    fn wrongly_typed_draft_is_rejected() {
        let result = form(&[]).build(
            DocumentMeta::new(DocumentKind::TechnicalReport),
            json!({"development": "texto corrido"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn prompt_mentions_photos_and_search() {
        let mut form = form(&["a.jpg", "b.jpg"]);
        form.search = true;
        let prompt = form.prompt();
        assert!(prompt.contains("2 fotografias"));
        assert!(prompt.contains("normas"));
        assert!(form.system_instruction().contains("(2 no total)"));
    }
}
