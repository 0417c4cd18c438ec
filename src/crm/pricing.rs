//! Line item and total arithmetic shared by quotes and invoices.

use super::error::CrmError;
use super::types::{LineItem, LineItemInput};

const CENT_TOLERANCE: f64 = 0.005;

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub discount: f64,
    pub total: f64,
}

impl Totals {
    /// `total = subtotal + subtotal * tax_rate / 100 - discount`
    pub fn compute(items: &[LineItem], tax_rate: f64, discount: f64) -> Self {
        let subtotal = round_cents(items.iter().map(|item| item.line_total).sum());
        let tax_amount = round_cents(subtotal * tax_rate / 100.0);
        let total = round_cents(subtotal + tax_amount - discount);
        Self {
            subtotal,
            tax_rate,
            tax_amount,
            discount: round_cents(discount),
            total,
        }
    }
}

/// Validates priced line items and the tax/discount applied on top of them,
/// returning the normalized items with their totals.
pub fn price_line_items(
    inputs: &[LineItemInput],
    tax_rate: f64,
    discount: f64,
) -> Result<(Vec<LineItem>, Totals), CrmError> {
    let mut details = Vec::new();

    if inputs.is_empty() {
        details.push("lineItems must contain at least one item".to_string());
    }

    let mut items = Vec::with_capacity(inputs.len());
    for (idx, input) in inputs.iter().enumerate() {
        if input.description.trim().is_empty() {
            details.push(format!("lineItems[{idx}].description is required"));
        }
        if !input.quantity.is_finite() || input.quantity < 0.0 {
            details.push(format!("lineItems[{idx}].quantity must be >= 0"));
        }
        if !input.unit_price.is_finite() || input.unit_price < 0.0 {
            details.push(format!("lineItems[{idx}].unitPrice must be >= 0"));
        }

        let expected = round_cents(input.quantity * input.unit_price);
        let line_total = match input.line_total {
            Some(given) if (given - expected).abs() > CENT_TOLERANCE => {
                details.push(format!(
                    "lineItems[{idx}].lineTotal {given} does not equal quantity x unitPrice ({expected})"
                ));
                given
            }
            Some(given) => round_cents(given),
            None => expected,
        };

        items.push(LineItem {
            description: input.description.trim().to_string(),
            quantity: input.quantity,
            unit_price: input.unit_price,
            line_total,
        });
    }

    if !tax_rate.is_finite() || !(0.0..=100.0).contains(&tax_rate) {
        details.push("tax must be between 0 and 100".to_string());
    }
    if !discount.is_finite() || discount < 0.0 {
        details.push("discount must be >= 0".to_string());
    }

    if !details.is_empty() {
        return Err(CrmError::validation(details));
    }

    let totals = Totals::compute(&items, tax_rate, discount);
    if totals.total < 0.0 {
        return Err(CrmError::validation(vec![format!(
            "discount {discount} exceeds subtotal plus tax ({})",
            round_cents(totals.subtotal + totals.tax_amount)
        )]));
    }

    Ok((items, totals))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(description: &str, quantity: f64, unit_price: f64) -> LineItemInput {
        LineItemInput {
            description: description.to_string(),
            quantity,
            unit_price,
            line_total: None,
        }
    }

    #[test]
    fn test_kitchen_remodel_total() {
        let mut cabinets = input("Cabinets", 1.0, 15000.0);
        cabinets.line_total = Some(15000.0);
        let (items, totals) = price_line_items(&[cabinets], 8.5, 0.0).unwrap();
        assert_eq!(items[0].line_total, 15000.0);
        assert_eq!(totals.subtotal, 15000.0);
        assert_eq!(totals.tax_amount, 1275.0);
        assert_eq!(totals.total, 16275.0);
    }

    #[test]
    fn test_total_formula_with_discount() {
        let items = [
            input("Tile", 120.0, 4.75),
            input("Grout", 3.0, 18.99),
            input("Labor", 16.0, 65.0),
        ];
        let (_, totals) = price_line_items(&items, 7.25, 150.0).unwrap();
        let subtotal = 120.0 * 4.75 + 3.0 * 18.99 + 16.0 * 65.0;
        assert_eq!(totals.subtotal, round_cents(subtotal));
        let expected = round_cents(
            totals.subtotal + round_cents(totals.subtotal * 7.25 / 100.0) - 150.0,
        );
        assert_eq!(totals.total, expected);
    }

    #[test]
    fn test_missing_line_total_is_computed() {
        let (items, _) = price_line_items(&[input("Paint", 3.0, 39.99)], 0.0, 0.0).unwrap();
        assert_eq!(items[0].line_total, 119.97);
    }

    #[test]
    fn test_inconsistent_line_total_rejected() {
        let mut item = input("Cabinets", 2.0, 100.0);
        item.line_total = Some(150.0);
        let err = price_line_items(&[item], 0.0, 0.0).unwrap_err();
        assert!(matches!(err, CrmError::Validation { ref details, .. } if details.len() == 1));
    }

    #[test]
    fn test_empty_items_and_bad_rates_collect_all_details() {
        let err = price_line_items(&[], 120.0, -5.0).unwrap_err();
        match err {
            CrmError::Validation { details, .. } => assert_eq!(details.len(), 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_negative_quantity_rejected() {
        assert!(price_line_items(&[input("Refund", -1.0, 50.0)], 0.0, 0.0).is_err());
    }

    #[test]
    fn test_discount_cannot_push_total_below_zero() {
        let err = price_line_items(&[input("Gutter clean", 1.0, 200.0)], 0.0, 250.0).unwrap_err();
        assert!(matches!(err, CrmError::Validation { .. }));
    }
}
