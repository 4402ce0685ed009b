pub mod attachments;
pub mod config;
pub mod extract;
pub mod forms;
pub mod providers;
pub mod retry;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use plumbdoc_contracts::documents::{
    CompanySettings, DiscountVoucherData, Document, DocumentKind, DocumentMeta,
};
use plumbdoc_contracts::events::{EventKind, EventPayload, EventWriter};
use plumbdoc_contracts::models::{Capability, ModelRegistry, ModelSelector, ModelSpec};
use plumbdoc_contracts::store::{LocalStore, UpsertOutcome};
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::extract::parse_json_payload;
use crate::forms::{build_request, DiscountVoucherForm, DocumentForm, RequestOptions};
use crate::providers::{default_provider_registry, TextProvider, TextProviderRegistry};
use crate::retry::{error_chain_text, retry_with_backoff};

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Drafts documents through the AI service and persists them.
///
/// One generation runs at a time; every step is mirrored to the event log.
pub struct DocumentEngine {
    config: EngineConfig,
    store: LocalStore,
    events: EventWriter,
    providers: TextProviderRegistry,
    model_selector: ModelSelector,
    sleeper: Sleeper,
    last_fallback_reason: Option<String>,
    last_warnings: Vec<String>,
}

impl DocumentEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed creating data directory {}", config.data_dir.display())
        })?;
        let store = LocalStore::open(config.storage_path());
        let events = EventWriter::for_new_session(config.events_path());
        Ok(Self::with_parts(config, store, events, default_provider_registry()))
    }

    pub fn with_parts(
        config: EngineConfig,
        store: LocalStore,
        events: EventWriter,
        providers: TextProviderRegistry,
    ) -> Self {
        Self {
            config,
            store,
            events,
            providers,
            model_selector: ModelSelector::new(None),
            sleeper: Box::new(std::thread::sleep),
            last_fallback_reason: None,
            last_warnings: Vec::new(),
        }
    }

    pub fn register_provider<P: TextProvider + 'static>(&mut self, provider: P) {
        self.providers.register(provider);
    }

    pub fn set_model_registry(&mut self, registry: ModelRegistry) {
        self.model_selector = ModelSelector::new(Some(registry));
    }

    /// Replaces the pause between retries.
    pub fn set_sleeper(&mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) {
        self.sleeper = Box::new(sleeper);
    }

    pub fn set_model(&mut self, model: Option<String>) {
        self.config.model = model;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.model_selector.registry
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.names()
    }

    pub fn last_fallback_reason(&self) -> Option<&str> {
        self.last_fallback_reason.as_deref()
    }

    pub fn last_warnings(&self) -> &[String] {
        &self.last_warnings
    }

    /// Runs the whole pipeline for one form: model selection, request,
    /// retried provider call, extraction, merge and upsert.
    ///
    /// Errors carry the document type's alert as their outermost context.
    pub fn generate<F: DocumentForm>(&mut self, form: &F) -> Result<F::Output> {
        let kind = F::Output::KIND;
        self.last_warnings.clear();
        match self.run_generation(form) {
            Ok(document) => Ok(document),
            Err(err) => {
                self.events.record(
                    EventKind::GenerationFailed,
                    map_object(json!({
                        "kind": kind.slug(),
                        "error": error_chain_text(&err),
                    })),
                );
                Err(err.context(kind.failure_alert()))
            }
        }
    }

    fn run_generation<F: DocumentForm>(&mut self, form: &F) -> Result<F::Output> {
        let kind = F::Output::KIND;
        let company = self.company_settings()?;
        let mut form = form.clone();
        if let Some(settings) = &company {
            form.apply_company_defaults(settings);
        }
        let capabilities = form.required_capabilities();
        let model = self.resolve_model(&capabilities)?;
        let options = RequestOptions {
            model: model.name.clone(),
            temperature: self.config.temperature,
            timeout: self.config.request_timeout,
            image_max_dim: self.config.image_max_dim,
            company,
        };
        let request = build_request(&form, &options)?;
        let provider = self
            .providers
            .get(&model.provider)
            .ok_or_else(|| anyhow!("provider '{}' is not registered", model.provider))?;

        tracing::info!(
            kind = kind.slug(),
            model = %model.name,
            images = request.image_count(),
            "generating document"
        );
        self.events.record(
            EventKind::GenerationStarted,
            map_object(json!({
                "kind": kind.slug(),
                "client": form.client().name.trim(),
                "model": model.name,
                "provider": model.provider,
                "images": request.image_count(),
                "prompt_chars": request.prompt_chars(),
                "search": !request.tools.is_empty(),
                "fallback_reason": self.last_fallback_reason,
            })),
        );

        let events = &self.events;
        let sleeper = &self.sleeper;
        let response = retry_with_backoff(
            &self.config.retry,
            |delay| sleeper(delay),
            |attempt| {
                events.record(
                    EventKind::GenerationRetry,
                    map_object(json!({
                        "kind": kind.slug(),
                        "retry": attempt.retry,
                        "retries": attempt.retries,
                        "delay_ms": attempt.delay.as_millis() as u64,
                        "error": attempt.error,
                    })),
                );
            },
            |_| provider.generate(&request),
        )?;

        let draft = parse_json_payload(&response.text)?;
        let document = form.build(DocumentMeta::new(kind), draft)?;
        let outcome = self
            .store
            .upsert(&document)
            .with_context(|| format!("failed saving {}", kind.label()))?;
        self.record_saved(&document, outcome, Some(&response.provider_response));
        self.last_warnings = response.warnings;
        Ok(document)
    }

    /// Discount vouchers are priced locally and saved straight away.
    pub fn issue_discount_voucher(
        &mut self,
        form: &DiscountVoucherForm,
    ) -> Result<DiscountVoucherData> {
        let kind = DocumentKind::DiscountVoucher;
        let mut form = form.clone();
        if let Some(settings) = self.company_settings()? {
            form.apply_company_defaults(&settings);
        }
        let voucher = form
            .issue(DocumentMeta::new(kind), Local::now().date_naive())
            .context(kind.failure_alert())?;
        let outcome = self
            .store
            .upsert(&voucher)
            .with_context(|| format!("failed saving {}", kind.label()))?;
        self.events.record(
            EventKind::VoucherIssued,
            map_object(json!({
                "id": voucher.meta.id,
                "code": voucher.meta.code,
                "final_value": voucher.totals.final_value,
                "expiry_date": voucher.expiry_date,
            })),
        );
        self.record_saved(&voucher, outcome, None);
        Ok(voucher)
    }

    pub fn delete(&self, kind: DocumentKind, id: &str) -> Result<bool> {
        let removed = self
            .store
            .delete_raw(kind, id)
            .with_context(|| format!("failed deleting {} {id}", kind.label()))?;
        if removed {
            self.events.record(
                EventKind::DocumentDeleted,
                map_object(json!({ "kind": kind.slug(), "id": id })),
            );
        }
        Ok(removed)
    }

    fn company_settings(&self) -> Result<Option<CompanySettings>> {
        self.store
            .settings()
            .context("failed reading company settings")
    }

    fn record_saved<D: Document>(
        &self,
        document: &D,
        outcome: UpsertOutcome,
        provider_response: Option<&EventPayload>,
    ) {
        let kind = D::KIND;
        let (id, code) = (document.id(), document.code());
        tracing::info!(kind = kind.slug(), id, code, ?outcome, "document saved");
        let mut payload = map_object(json!({
            "kind": kind.slug(),
            "id": id,
            "code": code,
            "client": document.client().name.trim(),
            "updated": outcome == UpsertOutcome::Updated,
        }));
        if let Some(response) = provider_response.filter(|response| !response.is_empty()) {
            payload.insert(
                "provider_response".to_string(),
                Value::Object(response.clone()),
            );
        }
        self.events.record(EventKind::DocumentSaved, payload);
    }

    /// Picks the configured model, then makes sure a provider is registered
    /// for it. Dry-run models are only used when asked for by name.
    fn resolve_model(&mut self, capabilities: &[Capability]) -> Result<ModelSpec> {
        let selection = self
            .model_selector
            .select(self.config.model.as_deref(), capabilities)
            .map_err(anyhow::Error::msg)?;
        let mut fallback_reason = selection.fallback_reason;
        let mut model = selection.model;
        let requested_dryrun = selection
            .requested
            .as_deref()
            .and_then(|name| self.model_selector.registry.get(name))
            .map(|spec| spec.provider == "dryrun")
            .unwrap_or(false);

        let usable = |candidate: &ModelSpec| self.providers.get(&candidate.provider).is_some();
        if !usable(&model) || (model.provider == "dryrun" && !requested_dryrun) {
            let candidates = self.model_selector.registry.supporting(capabilities);
            let replacement = candidates
                .iter()
                .find(|candidate| candidate.provider != "dryrun" && usable(*candidate))
                .or_else(|| candidates.iter().find(|candidate| usable(*candidate)))
                .cloned();
            let Some(replacement) = replacement else {
                let available = self.providers.names().join(", ");
                anyhow::bail!(
                    "no provider registered for model '{}' (available: [{available}])",
                    model.name
                );
            };
            if replacement.name != model.name {
                let reason = format!(
                    "Provider '{}' for model '{}' unavailable; using '{}'.",
                    model.provider, model.name, replacement.name
                );
                fallback_reason = append_fallback_reason(fallback_reason, reason);
                model = replacement;
            }
        }
        if let Some(reason) = fallback_reason.as_deref() {
            tracing::debug!(model = %model.name, reason, "model fallback");
        }
        self.last_fallback_reason = fallback_reason;
        Ok(model)
    }
}

fn append_fallback_reason(existing: Option<String>, reason: String) -> Option<String> {
    match existing {
        Some(previous) if !previous.trim().is_empty() => Some(format!("{previous} {reason}")),
        _ => Some(reason),
    }
}

fn map_object(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => EventPayload::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use plumbdoc_contracts::documents::{ClientIdentity, QuoteData, ReceiptData};

    use super::*;
    use crate::forms::{QuoteForm, ReceiptForm};
    use crate::providers::{ProviderRequest, ProviderResponse};
    use crate::retry::RetryPolicy;

    /// Answers from a script; each entry is either model text or an error.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<String, String>>>,
        calls: Arc<AtomicUsize>,
        instructions: Arc<Mutex<Vec<String>>>,
    }

    impl TextProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.instructions
                .lock()
                .map_err(|_| anyhow!("instructions lock poisoned"))?
                .push(request.system_instruction.clone().unwrap_or_default());
            let next = self
                .script
                .lock()
                .map_err(|_| anyhow!("script lock poisoned"))?
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".to_string()));
            match next {
                Ok(text) => Ok(ProviderResponse {
                    text,
                    provider_response: map_object(
                        json!({ "usage_metadata": { "totalTokenCount": 42 } }),
                    ),
                    warnings: Vec::new(),
                }),
                Err(message) => Err(anyhow!(message)),
            }
        }
    }

    struct Harness {
        engine: DocumentEngine,
        calls: Arc<AtomicUsize>,
        delays: Arc<Mutex<Vec<Duration>>>,
        instructions: Arc<Mutex<Vec<String>>>,
        _temp: tempfile::TempDir,
    }

    fn harness(script: Vec<Result<&str, &str>>) -> anyhow::Result<Harness> {
        let temp = tempfile::tempdir()?;
        let calls = Arc::new(AtomicUsize::new(0));
        let instructions = Arc::new(Mutex::new(Vec::new()));
        let mut providers = TextProviderRegistry::new();
        providers.register(ScriptedProvider {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|row| row.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: Arc::clone(&calls),
            instructions: Arc::clone(&instructions),
        });
        let config = EngineConfig {
            data_dir: temp.path().to_path_buf(),
            model: Some("scripted-1".to_string()),
            retry: RetryPolicy::default(),
            ..EngineConfig::default()
        };
        let mut engine = DocumentEngine::with_parts(
            config,
            LocalStore::in_memory(),
            EventWriter::new(temp.path().join("events.jsonl"), "test-session"),
            providers,
        );
        engine.set_model_registry(ModelRegistry::from_specs([ModelSpec::new(
            "scripted-1",
            "scripted",
            &[Capability::Text, Capability::Vision, Capability::Search],
        )]));
        let delays = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&delays);
        engine.set_sleeper(move |delay| {
            if let Ok(mut rows) = recorded.lock() {
                rows.push(delay);
            }
        });
        Ok(Harness {
            engine,
            calls,
            delays,
            instructions,
            _temp: temp,
        })
    }

    fn receipt_form() -> ReceiptForm {
        ReceiptForm {
            client: ClientIdentity {
                name: "Ana Silva".to_string(),
                nif: "123456789".to_string(),
                ..ClientIdentity::default()
            },
            amount: 50.0,
            currency: None,
            payment_method: String::new(),
            description: "Reparo torneira".to_string(),
        }
    }

    fn event_types(engine: &DocumentEngine) -> anyhow::Result<Vec<String>> {
        Ok(engine
            .events()
            .read_all()?
            .iter()
            .map(|row| row["type"].as_str().unwrap_or_default().to_string())
            .collect())
    }

    #[test]
    fn receipt_is_generated_and_stored() -> anyhow::Result<()> {
        let mut h = harness(vec![Ok(
            "Aqui está:\n```json\n{\"amount\": 50, \"description\": \"Reparo torneira\"}\n```",
        )])?;
        let receipt = h.engine.generate(&receipt_form())?;

        assert_eq!(receipt.amount, 50.0);
        assert_eq!(receipt.currency, "EUR");
        assert_eq!(receipt.description, "Reparo torneira");
        assert!(receipt.meta.code.starts_with("REC-"));
        assert_eq!(receipt.meta.code.len(), 8);

        let stored: Vec<ReceiptData> = h.engine.store().fetch_all()?;
        assert_eq!(stored, vec![receipt.clone()]);
        assert_eq!(stored[0].client.name, "Ana Silva");
        assert_eq!(stored[0].client.nif, "123456789");
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            event_types(&h.engine)?,
            vec!["generation_started", "document_saved"]
        );
        assert_eq!(h.engine.last_fallback_reason(), None);

        let saved = h.engine.events().read_all()?;
        assert_eq!(saved[1]["client"], "Ana Silva");
        assert_eq!(saved[1]["provider_response"]["usage_metadata"]["totalTokenCount"], 42);
        Ok(())
    }

    #[test]
    fn saved_company_settings_shape_the_quote() -> anyhow::Result<()> {
        let mut h = harness(vec![Ok(
            "{\"summary\": \"Troca\", \"steps\": [{\"title\": \"Sifão\", \"unitPrice\": 100}]}",
        )])?;
        h.engine.store().save_settings(&CompanySettings {
            company_name: "Canalizações Silva".to_string(),
            default_tax_rate: 6.0,
            ..CompanySettings::default()
        })?;
        let form: QuoteForm = serde_json::from_value(json!({
            "client": {"name": "João Costa"},
            "workDescription": "Trocar sifão do lava-loiça."
        }))?;

        let quote = h.engine.generate(&form)?;
        assert_eq!(quote.steps[0].tax_rate, 6.0);
        assert_eq!(quote.totals().total, 106.0);
        assert_eq!(h.engine.store().fetch_all::<QuoteData>()?, vec![quote]);

        let instructions = h.instructions.lock().map_err(|_| anyhow!("poisoned"))?;
        assert!(instructions[0].contains("Empresa emissora: Canalizações Silva"));
        assert!(instructions[0].contains("por omissão 6"));
        Ok(())
    }

    #[test]
    fn transient_failures_are_retried_with_backoff() -> anyhow::Result<()> {
        let mut h = harness(vec![
            Err("Gemini request failed (503): UNAVAILABLE"),
            Err("The model is overloaded. Please try again later."),
            Ok("{\"amount\": 50, \"description\": \"Reparo torneira\"}"),
        ])?;
        h.engine.generate(&receipt_form())?;

        assert_eq!(h.calls.load(Ordering::SeqCst), 3);
        let delays = h.delays.lock().map_err(|_| anyhow!("poisoned"))?.clone();
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4)]);
        assert_eq!(
            event_types(&h.engine)?,
            vec![
                "generation_started",
                "generation_retry",
                "generation_retry",
                "document_saved"
            ]
        );
        Ok(())
    }

    #[test]
    fn exhausted_retries_surface_the_failure_alert() -> anyhow::Result<()> {
        let mut h = harness(vec![Err("503"), Err("503"), Err("503"), Err("503"), Err("503")])?;
        let err = match h.engine.generate(&receipt_form()) {
            Ok(_) => anyhow::bail!("generation should fail"),
            Err(err) => err,
        };
        assert_eq!(h.calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.to_string(), DocumentKind::Receipt.failure_alert());
        assert!(h.engine.store().fetch_all::<ReceiptData>()?.is_empty());
        assert_eq!(event_types(&h.engine)?.last().map(String::as_str), Some("generation_failed"));
        Ok(())
    }

    #[test]
    fn malformed_response_fails_without_retry() -> anyhow::Result<()> {
        let mut h = harness(vec![Ok("Não consigo ajudar com isso.")])?;
        assert!(h.engine.generate(&receipt_form()).is_err());
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert!(h.delays.lock().map_err(|_| anyhow!("poisoned"))?.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_model_falls_back_with_reason() -> anyhow::Result<()> {
        let mut h = harness(vec![Ok("{\"amount\": 50}")])?;
        h.engine.set_model(Some("gpt-imaginary".to_string()));
        h.engine.generate(&receipt_form())?;
        assert_eq!(
            h.engine.last_fallback_reason(),
            Some("Model 'gpt-imaginary' is not registered.")
        );
        Ok(())
    }

    #[test]
    fn dryrun_model_is_used_only_when_requested() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = EngineConfig {
            data_dir: temp.path().to_path_buf(),
            model: Some("dryrun-text-1".to_string()),
            ..EngineConfig::default()
        };
        let mut engine = DocumentEngine::new(config)?;
        let receipt = engine.generate(&receipt_form())?;
        assert_eq!(receipt.amount, 50.0);
        assert_eq!(receipt.description, "Serviço de canalização");
        assert_eq!(engine.last_warnings().len(), 1);
        assert!(temp.path().join("storage.json").exists());
        Ok(())
    }

    #[test]
    fn discount_voucher_and_delete_are_logged() -> anyhow::Result<()> {
        let h = harness(Vec::new())?;
        let mut engine = h.engine;
        let form: DiscountVoucherForm = serde_json::from_value(json!({
            "client": {"name": "Marta Lopes"},
            "baseValue": 100,
            "discountValue": 10,
            "taxRate": 23
        }))?;
        let voucher = engine.issue_discount_voucher(&form)?;
        assert_eq!(voucher.totals.final_value, 110.7);

        engine.store().save_settings(&CompanySettings {
            default_tax_rate: 6.0,
            ..CompanySettings::default()
        })?;
        let untaxed: DiscountVoucherForm = serde_json::from_value(json!({
            "client": {"name": "Marta Lopes"},
            "baseValue": 100,
            "discountValue": 10
        }))?;
        let local_rate = engine.issue_discount_voucher(&untaxed)?;
        assert_eq!(local_rate.totals.final_value, 95.4);
        assert!(engine.delete(DocumentKind::DiscountVoucher, &local_rate.meta.id)?);

        assert!(engine.delete(DocumentKind::DiscountVoucher, &voucher.meta.id)?);
        assert!(!engine.delete(DocumentKind::DiscountVoucher, &voucher.meta.id)?);
        assert_eq!(
            event_types(&engine)?,
            vec![
                "voucher_issued",
                "document_saved",
                "voucher_issued",
                "document_saved",
                "document_deleted",
                "document_deleted"
            ]
        );
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }
}
