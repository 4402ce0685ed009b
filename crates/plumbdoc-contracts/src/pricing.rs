use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::documents::QuoteStep;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[default]
    Percentage,
    Fixed,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountType::Percentage => f.write_str("percentage"),
            DiscountType::Fixed => f.write_str("fixed"),
        }
    }
}

impl FromStr for DiscountType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" | "%" => Ok(DiscountType::Percentage),
            "fixed" | "amount" | "value" => Ok(DiscountType::Fixed),
            other => Err(format!("unknown discount type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountInputs {
    pub base_value: f64,
    #[serde(default)]
    pub discount_type: DiscountType,
    pub discount_value: f64,
    #[serde(default)]
    pub tax_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountTotals {
    pub discount_amount: f64,
    pub net_value: f64,
    pub tax_amount: f64,
    pub final_value: f64,
}

/// Applies the discount first and the tax on the discounted value.
///
/// Percentages are clamped to 0-100 and fixed discounts never exceed the
/// base, so the net value is never negative. Every stage is rounded to cents
/// before feeding the next one.
pub fn compute_discount(inputs: &DiscountInputs) -> DiscountTotals {
    let base = inputs.base_value.max(0.0);
    let raw_discount = match inputs.discount_type {
        DiscountType::Percentage => base * inputs.discount_value.clamp(0.0, 100.0) / 100.0,
        DiscountType::Fixed => inputs.discount_value.clamp(0.0, base),
    };
    let discount_amount = round_cents(raw_discount);
    let net_value = round_cents(base - discount_amount);
    let tax_amount = round_cents(net_value * inputs.tax_rate.max(0.0) / 100.0);
    DiscountTotals {
        discount_amount,
        net_value,
        tax_amount,
        final_value: round_cents(net_value + tax_amount),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteTotals {
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total: f64,
}

pub fn quote_totals(steps: &[QuoteStep]) -> QuoteTotals {
    let subtotal: f64 = steps.iter().map(QuoteStep::line_total).sum();
    let tax_amount: f64 = steps
        .iter()
        .map(|step| step.line_total() * step.tax_rate / 100.0)
        .sum();
    let subtotal = round_cents(subtotal);
    let tax_amount = round_cents(tax_amount);
    QuoteTotals {
        subtotal,
        tax_amount,
        total: round_cents(subtotal + tax_amount),
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(base: f64, kind: DiscountType, value: f64, tax: f64) -> DiscountInputs {
        DiscountInputs {
            base_value: base,
            discount_type: kind,
            discount_value: value,
            tax_rate: tax,
        }
    }

    #[test]
    fn percentage_discount_then_tax() {
        let totals = compute_discount(&inputs(100.0, DiscountType::Percentage, 10.0, 23.0));
        assert_eq!(totals.discount_amount, 10.0);
        assert_eq!(totals.net_value, 90.0);
        assert_eq!(totals.tax_amount, 20.7);
        assert_eq!(totals.final_value, 110.7);
    }

    #[test]
    fn fixed_discount_is_capped_at_base() {
        let totals = compute_discount(&inputs(40.0, DiscountType::Fixed, 55.0, 23.0));
        assert_eq!(totals.discount_amount, 40.0);
        assert_eq!(totals.net_value, 0.0);
        assert_eq!(totals.final_value, 0.0);

        let totals = compute_discount(&inputs(250.0, DiscountType::Fixed, 25.5, 6.0));
        assert_eq!(totals.net_value, 224.5);
        assert_eq!(totals.tax_amount, 13.47);
        assert_eq!(totals.final_value, 237.97);
    }

    #[test]
    fn percentage_above_hundred_is_clamped() {
        let totals = compute_discount(&inputs(80.0, DiscountType::Percentage, 150.0, 0.0));
        assert_eq!(totals.discount_amount, 80.0);
        assert_eq!(totals.final_value, 0.0);
    }

    #[test]
    fn quote_totals_apply_per_line_tax() {
        let steps = vec![
            QuoteStep {
                title: "Tubagem".to_string(),
                description: String::new(),
                unit_price: 12.5,
                quantity: 4.0,
                tax_rate: 23.0,
            },
            QuoteStep {
                title: "Mão de obra".to_string(),
                description: String::new(),
                unit_price: 30.0,
                quantity: 2.0,
                tax_rate: 6.0,
            },
        ];
        let totals = quote_totals(&steps);
        assert_eq!(totals.subtotal, 110.0);
        assert_eq!(totals.tax_amount, 15.1);
        assert_eq!(totals.total, 125.1);
        assert_eq!(quote_totals(&[]), QuoteTotals::default());
    }

    #[test]
    fn discount_type_parses_aliases() {
        assert_eq!("%".parse::<DiscountType>(), Ok(DiscountType::Percentage));
        assert_eq!("Fixed".parse::<DiscountType>(), Ok(DiscountType::Fixed));
        assert!("bogus".parse::<DiscountType>().is_err());
    }
}
