//! User-facing forms: each one turns its fields into a Portuguese prompt for
//! the AI service and merges the returned draft into a stored document.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use plumbdoc_contracts::documents::{
    ClientIdentity, CompanySettings, Document, DocumentMeta, DEFAULT_CURRENCY,
};
use plumbdoc_contracts::models::Capability;
use serde_json::{json, Map, Value};

use crate::attachments::InlineImage;
use crate::providers::{ProviderRequest, RequestPart};

mod quote;
mod receipt;
mod report;
mod voucher;
mod warranty;

pub use quote::QuoteForm;
pub use receipt::ReceiptForm;
pub use report::TechnicalReportForm;
pub use voucher::{resolve_expiry, DiscountVoucherForm, PromoVoucherForm, VoucherTerms};
pub use warranty::WarrantyForm;

const ASSISTANT_ROLE: &str = "És o assistente administrativo de uma empresa portuguesa de \
canalização e construção. Escreves em português europeu, com tom profissional e objetivo. \
Responde apenas com um objeto JSON válido, sem texto antes ou depois.";

pub trait DocumentForm: Clone {
    type Output: Document;

    fn client(&self) -> &ClientIdentity;
    /// Describes the exact JSON shape the model must answer with.
    fn system_instruction(&self) -> String;
    fn prompt(&self) -> String;

    fn images(&self) -> &[PathBuf] {
        &[]
    }

    fn use_search(&self) -> bool {
        false
    }

    /// Fills fields the user left unset from the saved company settings.
    fn apply_company_defaults(&mut self, _settings: &CompanySettings) {}

    /// Merges the parsed AI draft with the form fields.
    fn build(&self, meta: DocumentMeta, draft: Value) -> Result<Self::Output>;

    fn required_capabilities(&self) -> Vec<Capability> {
        let mut capabilities = vec![Capability::Text];
        if !self.images().is_empty() {
            capabilities.push(Capability::Vision);
        }
        if self.use_search() {
            capabilities.push(Capability::Search);
        }
        capabilities
    }
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub model: String,
    pub temperature: Option<f64>,
    pub timeout: Duration,
    pub image_max_dim: u32,
    /// Issuing company, introduced to the model ahead of the form's own
    /// instruction.
    pub company: Option<CompanySettings>,
}

pub fn build_request<F: DocumentForm>(
    form: &F,
    options: &RequestOptions,
) -> Result<ProviderRequest> {
    let mut parts = vec![RequestPart::Text(form.prompt())];
    for path in form.images() {
        let image = InlineImage::from_path(path, options.image_max_dim)
            .with_context(|| format!("failed attaching photo {}", path.display()))?;
        parts.push(RequestPart::Image(image));
    }
    let tools = if form.use_search() {
        vec![json!({ "googleSearch": {} })]
    } else {
        Vec::new()
    };
    let mut metadata = Map::new();
    metadata.insert(
        "document_kind".to_string(),
        Value::String(F::Output::KIND.slug().to_string()),
    );
    let mut instruction = vec![ASSISTANT_ROLE.to_string()];
    instruction.extend(options.company.as_ref().and_then(company_block));
    instruction.push(form.system_instruction());
    Ok(ProviderRequest {
        model: options.model.clone(),
        system_instruction: Some(instruction.join("\n\n")),
        parts,
        tools,
        temperature: options.temperature,
        timeout: options.timeout,
        metadata,
    })
}

/// The form's currency when filled, otherwise the built-in default.
pub(crate) fn currency_or_default(currency: Option<&str>) -> String {
    first_filled(&[currency.unwrap_or_default(), DEFAULT_CURRENCY])
}

pub(crate) fn is_unset(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}

fn company_block(settings: &CompanySettings) -> Option<String> {
    let name = settings.company_name.trim();
    if name.is_empty() {
        return None;
    }
    let mut lines = vec![format!("Empresa emissora: {name}")];
    let optional = [
        ("NIF", settings.nif.as_str()),
        ("Morada", settings.address.as_str()),
        ("Telefone", settings.phone.as_str()),
        ("Email", settings.email.as_str()),
        ("IBAN", settings.iban.as_deref().unwrap_or_default()),
    ];
    for (label, value) in optional {
        if !value.trim().is_empty() {
            lines.push(format!("{label}: {}", value.trim()));
        }
    }
    Some(lines.join("\n"))
}

pub(crate) fn client_block(client: &ClientIdentity) -> String {
    let mut lines = vec![format!("Cliente: {}", client.name.trim())];
    if !client.nif.trim().is_empty() {
        lines.push(format!("NIF: {}", client.nif.trim()));
    }
    let optional = [
        ("Morada", &client.address),
        ("Telefone", &client.phone),
        ("Email", &client.email),
    ];
    for (label, value) in optional {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            lines.push(format!("{label}: {value}"));
        }
    }
    lines.join("\n")
}

pub(crate) fn image_names(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|path| path.display().to_string()).collect()
}

/// First non-blank candidate, trimmed.
pub(crate) fn first_filled(candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}
