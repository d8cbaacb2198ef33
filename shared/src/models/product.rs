//! Product Model

use serde::{Deserialize, Serialize};

/// Product entity with its inventory counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Selling unit shown to customers, e.g. "500 g" or "1 piece"
    pub unit: String,
    /// Unit price in paisa
    pub price: i64,
    /// Units currently available
    pub stock: i32,
    /// Daily restock baseline
    pub default_stock: i32,
    /// Always `stock > 0`
    pub in_stock: bool,
    pub is_active: bool,
    pub updated_at: i64,
}

impl Product {
    /// Stock counters only, for ledger arithmetic
    pub fn stock_level(&self) -> StockLevel {
        StockLevel {
            stock: self.stock,
            default_stock: self.default_stock,
            in_stock: self.in_stock,
        }
    }

    /// Write ledger results back onto the product
    pub fn apply_stock(&mut self, level: StockLevel) {
        self.stock = level.stock;
        self.default_stock = level.default_stock;
        self.in_stock = level.in_stock;
    }
}

/// Inventory counters of one product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub stock: i32,
    pub default_stock: i32,
    pub in_stock: bool,
}

/// Admin stock adjustment payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub stock: Option<i32>,
    pub default_stock: Option<i32>,
}
