//! Server-side pricing
//!
//! Line prices come from the product rows locked by the creating
//! transaction. The client's own totals are only compared, never trusted.

use std::collections::BTreeMap;

use serde::Deserialize;
use shared::error::{AppError, ErrorCode};
use shared::models::Product;

/// Delivery fee policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingRules {
    /// Flat fee in paisa
    pub delivery_fee: i64,
    /// Subtotal at or above which delivery is free
    pub free_delivery_threshold: i64,
}

impl PricingRules {
    pub fn delivery_fee_for(&self, subtotal: i64) -> i64 {
        if subtotal >= self.free_delivery_threshold {
            0
        } else {
            self.delivery_fee
        }
    }
}

/// Totals the customer was shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientQuote {
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub lines: Vec<PricedLine>,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
}

/// Price merged cart lines against the loaded products
pub fn price_lines(
    products: &[Product],
    lines: &BTreeMap<String, i32>,
    rules: &PricingRules,
) -> Result<PricedOrder, AppError> {
    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal: i64 = 0;
    for (product_id, quantity) in lines {
        let product = products
            .iter()
            .find(|p| &p.id == product_id)
            .ok_or_else(|| AppError::product_not_found(product_id.clone()))?;
        if product.price <= 0 {
            return Err(AppError::new(ErrorCode::ProductInvalidPrice)
                .with_detail("product_id", product_id.clone()));
        }
        subtotal += product.price * i64::from(*quantity);
        priced.push(PricedLine {
            product_id: product_id.clone(),
            product_name: product.name.clone(),
            quantity: *quantity,
            unit_price: product.price,
        });
    }

    let delivery_fee = rules.delivery_fee_for(subtotal);
    Ok(PricedOrder {
        lines: priced,
        subtotal,
        delivery_fee,
        total: subtotal + delivery_fee,
    })
}

/// Reject checkouts whose displayed totals differ from the server's
pub fn check_quote(priced: &PricedOrder, quote: &ClientQuote) -> Result<(), AppError> {
    if priced.subtotal == quote.subtotal
        && priced.delivery_fee == quote.delivery_fee
        && priced.total == quote.total
    {
        return Ok(());
    }
    Err(AppError::new(ErrorCode::OrderTotalMismatch)
        .with_detail("subtotal", priced.subtotal)
        .with_detail("delivery_fee", priced.delivery_fee)
        .with_detail("total", priced.total))
}
