//! Inventory ledger
//!
//! Pure stock arithmetic shared by every store implementation. Callers load
//! (and lock) product rows inside their transaction, run these functions on
//! the loaded values, and persist the results only if every line succeeded.
//!
//! Invariants after every function: `stock >= 0` and `in_stock == (stock > 0)`.

use std::collections::BTreeMap;

use shared::error::{AppError, ErrorCode};
use shared::models::{Product, StockAdjustment, StockLevel};

fn settle(stock: i32, default_stock: i32) -> StockLevel {
    StockLevel {
        stock,
        default_stock,
        in_stock: stock > 0,
    }
}

/// Take `quantity` units out of stock
pub fn reserve(level: StockLevel, quantity: i32, product_name: &str) -> Result<StockLevel, AppError> {
    if quantity <= 0 {
        return Err(AppError::validation("Quantity must be at least 1")
            .with_detail("quantity", quantity));
    }
    if !level.in_stock || level.stock < quantity {
        return Err(AppError::out_of_stock(
            product_name,
            quantity,
            level.stock.max(0),
        ));
    }
    Ok(settle(level.stock - quantity, level.default_stock))
}

/// Put `quantity` units back (order abandoned or cancelled)
pub fn release(level: StockLevel, quantity: i32) -> StockLevel {
    settle(level.stock.saturating_add(quantity.max(0)), level.default_stock)
}

/// Daily restock: stock goes back to the baseline
pub fn reset_to_default(level: StockLevel) -> StockLevel {
    settle(level.default_stock, level.default_stock)
}

/// Operator override of stock and/or baseline
pub fn adjust(level: StockLevel, change: &StockAdjustment) -> Result<StockLevel, AppError> {
    let stock = change.stock.unwrap_or(level.stock);
    let default_stock = change.default_stock.unwrap_or(level.default_stock);
    if stock < 0 || default_stock < 0 {
        return Err(AppError::new(ErrorCode::ProductInvalidStock)
            .with_detail("stock", stock)
            .with_detail("default_stock", default_stock));
    }
    Ok(settle(stock, default_stock))
}

/// Merge cart lines per product, ordered by product id.
///
/// The ordering doubles as the row-lock acquisition order so two carts that
/// share products always lock them in the same sequence.
pub fn merge_lines<'a>(
    lines: impl IntoIterator<Item = (&'a str, i32)>,
) -> Result<BTreeMap<String, i32>, AppError> {
    let mut merged = BTreeMap::new();
    for (product_id, quantity) in lines {
        if quantity <= 0 {
            return Err(AppError::validation("Quantity must be at least 1")
                .with_detail("product_id", product_id)
                .with_detail("quantity", quantity));
        }
        let entry: &mut i32 = merged.entry(product_id.to_string()).or_insert(0);
        *entry = entry
            .checked_add(quantity)
            .ok_or_else(|| AppError::validation("Quantity too large"))?;
    }
    Ok(merged)
}

/// Reserve every merged line against the loaded products.
///
/// All-or-nothing: on the first shortfall the error is returned and the
/// caller must discard `products` (the transaction rolls back).
pub fn reserve_all(
    products: &mut [Product],
    lines: &BTreeMap<String, i32>,
) -> Result<(), AppError> {
    for (product_id, quantity) in lines {
        let product = products
            .iter_mut()
            .find(|p| &p.id == product_id && p.is_active)
            .ok_or_else(|| AppError::product_not_found(product_id.clone()))?;
        let level = reserve(product.stock_level(), *quantity, &product.name)?;
        product.apply_stock(level);
    }
    Ok(())
}

/// Release every line back onto the loaded products.
///
/// Products that no longer exist are skipped; the order history still
/// references them but there is nothing to restock.
pub fn release_all(products: &mut [Product], lines: &BTreeMap<String, i32>) {
    for (product_id, quantity) in lines {
        match products.iter_mut().find(|p| &p.id == product_id) {
            Some(product) => {
                let level = release(product.stock_level(), *quantity);
                product.apply_stock(level);
            }
            None => {
                tracing::warn!(product_id = %product_id, "Release skipped, product missing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(stock: i32, default_stock: i32) -> StockLevel {
        StockLevel {
            stock,
            default_stock,
            in_stock: stock > 0,
        }
    }

    fn product(id: &str, stock: i32) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            unit: "500 g".into(),
            price: 45_000,
            stock,
            default_stock: 10,
            in_stock: stock > 0,
            is_active: true,
            updated_at: 0,
        }
    }

    #[test]
    fn test_reserve_decrements_and_recomputes_in_stock() {
        let after = reserve(level(3, 10), 2, "Pomfret").unwrap();
        assert_eq!(after.stock, 1);
        assert!(after.in_stock);

        let after = reserve(after, 1, "Pomfret").unwrap();
        assert_eq!(after.stock, 0);
        assert!(!after.in_stock);
    }

    #[test]
    fn test_reserve_shortfall() {
        let err = reserve(level(1, 10), 2, "Pomfret").unwrap_err();
        assert_eq!(err.code, ErrorCode::ProductOutOfStock);
    }

    #[test]
    fn test_reserve_respects_in_stock_flag() {
        // A row whose flag says sold out is treated as sold out
        let inconsistent = StockLevel {
            stock: 5,
            default_stock: 5,
            in_stock: false,
        };
        let err = reserve(inconsistent, 1, "Crab").unwrap_err();
        assert_eq!(err.code, ErrorCode::ProductOutOfStock);
    }

    #[test]
    fn test_reserve_rejects_non_positive_quantity() {
        let err = reserve(level(5, 5), 0, "Crab").unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn test_release_restores_flag() {
        let after = release(level(0, 10), 2);
        assert_eq!(after.stock, 2);
        assert!(after.in_stock);
    }

    #[test]
    fn test_reset_to_default_is_idempotent() {
        let once = reset_to_default(level(2, 8));
        let twice = reset_to_default(once);
        assert_eq!(once, twice);
        assert_eq!(once.stock, 8);
        assert!(once.in_stock);

        let zero = reset_to_default(level(4, 0));
        assert_eq!(zero.stock, 0);
        assert!(!zero.in_stock);
    }

    #[test]
    fn test_adjust_validates() {
        let change = StockAdjustment {
            stock: Some(-1),
            default_stock: None,
        };
        assert_eq!(
            adjust(level(1, 1), &change).unwrap_err().code,
            ErrorCode::ProductInvalidStock
        );

        let change = StockAdjustment {
            stock: Some(0),
            default_stock: Some(12),
        };
        let after = adjust(level(4, 4), &change).unwrap();
        assert_eq!(after, level(0, 12));
    }

    #[test]
    fn test_merge_lines_sums_duplicates() {
        let merged = merge_lines([("b", 1), ("a", 2), ("b", 3)]).unwrap();
        let entries: Vec<_> = merged.into_iter().collect();
        assert_eq!(entries, vec![("a".to_string(), 2), ("b".to_string(), 4)]);
    }

    #[test]
    fn test_reserve_all_is_all_or_nothing_for_caller() {
        let mut products = vec![product("a", 5), product("b", 1)];
        let lines = merge_lines([("a", 2), ("b", 2)]).unwrap();
        let err = reserve_all(&mut products, &lines).unwrap_err();
        assert_eq!(err.code, ErrorCode::ProductOutOfStock);
        // The working copy is dirty; callers discard it on error
        assert_eq!(products[0].stock, 3);
    }

    #[test]
    fn test_reserve_all_unknown_or_inactive_product() {
        let mut inactive = product("a", 5);
        inactive.is_active = false;
        let mut products = vec![inactive];
        let lines = merge_lines([("a", 1)]).unwrap();
        assert_eq!(
            reserve_all(&mut products, &lines).unwrap_err().code,
            ErrorCode::ProductNotFound
        );

        let lines = merge_lines([("zzz", 1)]).unwrap();
        assert_eq!(
            reserve_all(&mut products, &lines).unwrap_err().code,
            ErrorCode::ProductNotFound
        );
    }

    #[test]
    fn test_in_stock_invariant_across_operations() {
        let mut products = vec![product("a", 3)];
        let lines = merge_lines([("a", 3)]).unwrap();
        reserve_all(&mut products, &lines).unwrap();
        assert_eq!(products[0].in_stock, products[0].stock > 0);
        release_all(&mut products, &lines);
        assert_eq!(products[0].stock, 3);
        assert_eq!(products[0].in_stock, products[0].stock > 0);
    }
}
