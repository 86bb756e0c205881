//! Medication models and the stock ledger.

use serde::{Deserialize, Serialize};

/// A medication held in the clinic pharmacy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,
    pub brand_name: String,
    #[serde(default)]
    pub scientific_name: String,
    #[serde(default)]
    pub company_name: String,
    /// Dosage form (e.g., "Tablet", "Syrup")
    #[serde(default, rename = "type")]
    pub med_type: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub strength: String,
    #[serde(default)]
    pub category: String,
    /// Units on hand. Never negative.
    pub stock: u32,
    /// Low-stock threshold
    #[serde(default)]
    pub reorder_level: u32,
    /// Current unit price
    pub price_per_unit: f64,
}

/// Record of one stock deduction.
///
/// `applied` can be lower than `requested` when the clamp at zero engaged;
/// that difference is an inventory inconsistency worth flagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDeduction {
    pub medication_id: String,
    pub requested: u32,
    pub applied: u32,
    pub remaining: u32,
}

impl StockDeduction {
    /// Units that could not be deducted.
    pub fn shortfall(&self) -> u32 {
        self.requested - self.applied
    }

    pub fn is_clamped(&self) -> bool {
        self.applied < self.requested
    }
}

impl Medication {
    /// Create a medication with required fields.
    pub fn new(brand_name: String, stock: u32, price_per_unit: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            brand_name,
            scientific_name: String::new(),
            company_name: String::new(),
            med_type: String::new(),
            unit: String::new(),
            strength: String::new(),
            category: String::new(),
            stock,
            reorder_level: 0,
            price_per_unit,
        }
    }

    /// Stock at or below the reorder level.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.reorder_level
    }

    /// Deduct `quantity` units, clamping at zero.
    pub fn deduct(&mut self, quantity: u32) -> StockDeduction {
        let applied = quantity.min(self.stock);
        self.stock -= applied;
        StockDeduction {
            medication_id: self.id.clone(),
            requested: quantity,
            applied,
            remaining: self.stock,
        }
    }

    /// Return `quantity` units to stock.
    pub fn restock(&mut self, quantity: u32) {
        self.stock = self.stock.saturating_add(quantity);
    }

    /// Display label, e.g. "Panadol 500mg".
    pub fn display_name(&self) -> String {
        if self.strength.is_empty() {
            self.brand_name.clone()
        } else {
            format!("{} {}", self.brand_name, self.strength)
        }
    }
}
