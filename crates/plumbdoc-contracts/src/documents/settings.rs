use serde::{Deserialize, Serialize};

pub const DEFAULT_CURRENCY: &str = "EUR";
/// Standard Portuguese VAT rate, in percent.
pub const DEFAULT_TAX_RATE: f64 = 23.0;

/// Company details printed on every document. Stored as a singleton.
///
/// The defaults fill in quote and voucher forms that leave currency or tax
/// rate unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySettings {
    pub company_name: String,
    #[serde(default)]
    pub nif: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_tax_rate")]
    pub default_tax_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
}

impl Default for CompanySettings {
    fn default() -> Self {
        Self {
            company_name: String::new(),
            nif: String::new(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            default_currency: default_currency(),
            default_tax_rate: default_tax_rate(),
            iban: None,
        }
    }
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_tax_rate() -> f64 {
    DEFAULT_TAX_RATE
}
