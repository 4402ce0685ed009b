use anyhow::{bail, Result};
use serde_json::{json, Map, Value};

use super::{ProviderRequest, ProviderResponse, TextProvider};

/// Offline provider answering with a canned draft for the document type in
/// `metadata["document_kind"]`.
pub struct DryrunProvider;

impl DryrunProvider {
    fn draft_for(kind: &str, request: &ProviderRequest) -> Result<Value> {
        let draft = match kind {
            "quote" => json!({
                "summary": "Substituição dos troços danificados da rede de águas.",
                "steps": [
                    {
                        "title": "Diagnóstico e preparação",
                        "description": "Localização da fuga e proteção da área de trabalho.",
                        "unitPrice": 45.0,
                        "quantity": 1,
                        "taxRate": 23
                    },
                    {
                        "title": "Substituição de tubagem",
                        "description": "Troca de tubagem em multicamada por metro linear.",
                        "unitPrice": 18.5,
                        "quantity": 4,
                        "taxRate": 23
                    }
                ],
                "paymentTerms": "50% na adjudicação e 50% na conclusão dos trabalhos."
            }),
            "report" => {
                let analyses = (0..request.image_count())
                    .map(|index| {
                        json!({
                            "imageIndex": index,
                            "legend": format!("Foto {}", index + 1),
                            "description": "Registo do estado da instalação no local."
                        })
                    })
                    .collect::<Vec<_>>();
                json!({
                    "title": "Relatório de inspeção à instalação hidráulica",
                    "development": [
                        {
                            "title": "Enquadramento",
                            "content": "Visita técnica pedida pelo cliente por infiltrações."
                        },
                        {
                            "title": "Observações",
                            "content": "Sinais de humidade junto à coluna montante."
                        }
                    ],
                    "photoAnalyses": analyses,
                    "conclusion": {
                        "summary": "A origem provável é uma junta degradada.",
                        "findings": [
                            "Junta degradada",
                            "Pressão da rede dentro dos valores normais"
                        ]
                    },
                    "recommendations": [
                        "Substituir a junta afetada",
                        "Rever a instalação dentro de 12 meses"
                    ]
                })
            }
            "warranty" => json!({
                "serviceDescription": "Instalação e ensaio da rede de abastecimento.",
                "terms": [
                    "A garantia cobre defeitos de material e mão de obra.",
                    "A intervenção deve ser comunicada no prazo de 30 dias após deteção."
                ],
                "exclusions": "Danos por uso indevido, congelamento ou intervenção de terceiros."
            }),
            "receipt" => json!({
                "amount": 0,
                "description": "Serviço de canalização",
                "paymentMethod": "Transferência bancária"
            }),
            "promo_voucher" => json!({
                "headline": "Poupe na sua próxima intervenção",
                "conditions": [
                    "Válido para serviços de canalização.",
                    "Não acumulável com outras campanhas."
                ]
            }),
            other => bail!("dryrun provider has no draft for document kind '{other}'"),
        };
        Ok(draft)
    }
}

impl TextProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let kind = request
            .metadata
            .get("document_kind")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let draft = Self::draft_for(kind, request)?;
        let mut provider_response = Map::new();
        provider_response.insert("dryrun".to_string(), Value::Bool(true));
        Ok(ProviderResponse {
            text: format!("```json\n{}\n```", serde_json::to_string_pretty(&draft)?),
            provider_response,
            warnings: vec!["dryrun provider: content is canned, not generated".to_string()],
        })
    }
}
