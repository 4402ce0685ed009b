use anyhow::{bail, Context, Result};
use chrono::{Days, Local, NaiveDate};
use plumbdoc_contracts::documents::{
    ClientIdentity, CompanySettings, DiscountVoucherData, DocumentMeta, PromoVoucherData,
    DEFAULT_TAX_RATE,
};
use plumbdoc_contracts::pricing::{compute_discount, DiscountInputs, DiscountType};
use serde::Deserialize;
use serde_json::Value;

use super::{client_block, currency_or_default, first_filled, is_unset, DocumentForm};
use crate::extract::parse_draft;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DEFAULT_VALIDITY_DAYS: u32 = 30;

/// Pricing and validity shared by both voucher forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherTerms {
    pub base_value: f64,
    #[serde(default)]
    pub discount_type: DiscountType,
    pub discount_value: f64,
    #[serde(default)]
    pub tax_rate: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub validity_days: Option<u32>,
}

impl VoucherTerms {
    pub fn inputs(&self) -> Result<DiscountInputs> {
        if !self.base_value.is_finite() || self.base_value <= 0.0 {
            bail!("voucher base value must be positive");
        }
        if !self.discount_value.is_finite() || self.discount_value < 0.0 {
            bail!("voucher discount must not be negative");
        }
        let tax_rate = self.effective_tax_rate();
        if !tax_rate.is_finite() || tax_rate < 0.0 {
            bail!("voucher tax rate must not be negative");
        }
        Ok(DiscountInputs {
            base_value: self.base_value,
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            tax_rate,
        })
    }

    pub fn effective_currency(&self) -> String {
        currency_or_default(self.currency.as_deref())
    }

    pub fn effective_tax_rate(&self) -> f64 {
        self.tax_rate.unwrap_or(DEFAULT_TAX_RATE)
    }

    pub fn apply_company_defaults(&mut self, settings: &CompanySettings) {
        if is_unset(self.currency.as_deref()) {
            self.currency = Some(settings.default_currency.clone());
        }
        self.tax_rate.get_or_insert(settings.default_tax_rate);
    }

    pub fn expiry(&self, today: NaiveDate) -> Result<String> {
        resolve_expiry(self.expiry_date.as_deref(), self.validity_days, today)
    }

    fn describe(&self) -> String {
        let currency = self.effective_currency();
        let discount = match self.discount_type {
            DiscountType::Percentage => format!("{}%", self.discount_value),
            DiscountType::Fixed => format!("{:.2} {currency}", self.discount_value),
        };
        format!(
            "Valor base: {:.2} {currency}\nDesconto: {discount}\nIVA: {}%",
            self.base_value,
            self.effective_tax_rate()
        )
    }
}

/// An explicit `YYYY-MM-DD` date wins and must not be in the past; otherwise
/// the voucher is valid for `validity_days` (30 by default) from `today`.
pub fn resolve_expiry(
    explicit: Option<&str>,
    validity_days: Option<u32>,
    today: NaiveDate,
) -> Result<String> {
    if let Some(raw) = explicit.map(str::trim).filter(|raw| !raw.is_empty()) {
        let date = NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .with_context(|| format!("invalid expiry date '{raw}', expected YYYY-MM-DD"))?;
        if date < today {
            bail!("expiry date {raw} is in the past");
        }
        return Ok(date.format(DATE_FORMAT).to_string());
    }
    let days = validity_days.unwrap_or(DEFAULT_VALIDITY_DAYS);
    let Some(date) = today.checked_add_days(Days::new(u64::from(days))) else {
        bail!("validity of {days} days is out of range");
    };
    Ok(date.format(DATE_FORMAT).to_string())
}

/// Discount vouchers are computed locally; no AI call is involved.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountVoucherForm {
    pub client: ClientIdentity,
    #[serde(flatten)]
    pub terms: VoucherTerms,
    #[serde(default)]
    pub notes: String,
}

impl DiscountVoucherForm {
    pub fn apply_company_defaults(&mut self, settings: &CompanySettings) {
        self.terms.apply_company_defaults(settings);
    }

    pub fn issue(&self, meta: DocumentMeta, today: NaiveDate) -> Result<DiscountVoucherData> {
        let inputs = self.terms.inputs()?;
        Ok(DiscountVoucherData {
            meta,
            client: self.client.clone(),
            totals: compute_discount(&inputs),
            inputs,
            currency: self.terms.effective_currency(),
            expiry_date: self.terms.expiry(today)?,
            notes: self.notes.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoVoucherForm {
    pub client: ClientIdentity,
    pub campaign: String,
    #[serde(flatten)]
    pub terms: VoucherTerms,
    /// Extra context for the copy, e.g. target services or season.
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PromoDraft {
    headline: String,
    conditions: Vec<String>,
}

impl PromoVoucherForm {
    pub fn build_on(
        &self,
        meta: DocumentMeta,
        draft: Value,
        today: NaiveDate,
    ) -> Result<PromoVoucherData> {
        let inputs = self.terms.inputs()?;
        let expiry_date = self.terms.expiry(today)?;
        let draft: PromoDraft = parse_draft(draft)?;
        Ok(PromoVoucherData {
            meta,
            client: self.client.clone(),
            campaign: self.campaign.trim().to_string(),
            headline: first_filled(&[&draft.headline, &self.campaign]),
            conditions: draft
                .conditions
                .into_iter()
                .map(|condition| condition.trim().to_string())
                .filter(|condition| !condition.is_empty())
                .collect(),
            totals: compute_discount(&inputs),
            inputs,
            currency: self.terms.effective_currency(),
            expiry_date,
        })
    }
}

impl DocumentForm for PromoVoucherForm {
    type Output = PromoVoucherData;

    fn client(&self) -> &ClientIdentity {
        &self.client
    }

    fn system_instruction(&self) -> String {
        "Escreve o texto de um vale promocional. Devolve JSON com a forma:\n\
{\"headline\": string, \"conditions\": [string]}\n\
O título é curto e apelativo; as condições são frases curtas. Não alteres valores nem datas."
            .to_string()
    }

    fn prompt(&self) -> String {
        let mut prompt = vec![
            client_block(&self.client),
            format!("Campanha: {}", self.campaign.trim()),
            self.terms.describe(),
        ];
        if !is_unset(self.terms.expiry_date.as_deref()) {
            let expiry = self.terms.expiry_date.as_deref().unwrap_or_default();
            prompt.push(format!("Válido até: {}", expiry.trim()));
        }
        if !self.details.trim().is_empty() {
            prompt.push(format!("Detalhes: {}", self.details.trim()));
        }
        prompt.join("\n")
    }

    fn apply_company_defaults(&mut self, settings: &CompanySettings) {
        self.terms.apply_company_defaults(settings);
    }

    fn build(&self, meta: DocumentMeta, draft: Value) -> Result<PromoVoucherData> {
        self.build_on(meta, draft, Local::now().date_naive())
    }
}
