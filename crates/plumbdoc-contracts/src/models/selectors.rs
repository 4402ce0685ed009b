use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        capabilities: &[Capability],
    ) -> Result<ModelSelection, String> {
        let needs = describe(capabilities);
        let fallback_reason = match requested {
            Some(name) => {
                if let Some(model) = self.registry.ensure(name, capabilities) {
                    return Ok(ModelSelection {
                        model,
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    });
                }
                if self.registry.get(name).is_some() {
                    format!("Model '{name}' lacks {needs}.")
                } else {
                    format!("Model '{name}' is not registered.")
                }
            }
            None => "No model specified; using default.".to_string(),
        };

        let Some(model) = self.registry.supporting(capabilities).into_iter().next() else {
            return Err(format!("No models available for {needs}."));
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}

fn describe(capabilities: &[Capability]) -> String {
    let names = capabilities
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    if names.is_empty() {
        "any capability".to_string()
    } else {
        format!("capability '{}'", names.join("+"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        ModelRegistry::from_specs([
            ModelSpec::new("lite", "fake", &[Capability::Text]),
            ModelSpec::new("seer", "fake", &[Capability::Text, Capability::Vision]),
        ])
    }

    #[test]
    fn requested_model_is_used_when_capable() -> Result<(), String> {
        let selection =
            ModelSelector::new(Some(registry())).select(Some("lite"), &[Capability::Text])?;
        assert_eq!(selection.model.name, "lite");
        assert_eq!(selection.fallback_reason, None);
        Ok(())
    }

    #[test]
    fn vision_requirement_falls_back_with_reason() -> Result<(), String> {
        let selection = ModelSelector::new(Some(registry()))
            .select(Some("lite"), &[Capability::Text, Capability::Vision])?;
        assert_eq!(selection.model.name, "seer");
        assert_eq!(selection.requested.as_deref(), Some("lite"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Model 'lite' lacks capability 'text+vision'.")
        );
        Ok(())
    }

    #[test]
    fn unknown_and_missing_requests_use_default() -> Result<(), String> {
        let selector = ModelSelector::new(Some(registry()));
        let unknown = selector.select(Some("gpt-x"), &[Capability::Text])?;
        assert_eq!(unknown.model.name, "lite");
        assert_eq!(
            unknown.fallback_reason.as_deref(),
            Some("Model 'gpt-x' is not registered.")
        );
        let none = selector.select(None, &[Capability::Text])?;
        assert_eq!(
            none.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
        Ok(())
    }

    #[test]
    fn no_capable_model_is_an_error() {
        let err = ModelSelector::new(Some(registry()))
            .select(None, &[Capability::Search])
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for capability 'search'.");
    }
}
