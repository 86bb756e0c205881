//! Pharmacy sale models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payment::PaymentStatus;

/// One line of a completed sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PharmacySaleItem {
    pub medication_id: String,
    pub quantity: u32,
    /// Unit price captured at the moment of sale
    pub price_at_time: f64,
}

impl PharmacySaleItem {
    pub fn line_total(&self) -> f64 {
        self.quantity as f64 * self.price_at_time
    }
}

/// A completed pharmacy sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PharmacySale {
    pub id: String,
    pub customer_name: String,
    pub date: DateTime<Utc>,
    pub items: Vec<PharmacySaleItem>,
    /// Sum of quantity x price_at_time over all items
    pub total_amount: f64,
    #[serde(default)]
    pub payment_status: PaymentStatus,
}

impl PharmacySale {
    /// Build a sale, computing the total from its items.
    pub fn new(
        customer_name: String,
        date: DateTime<Utc>,
        items: Vec<PharmacySaleItem>,
        payment_status: PaymentStatus,
    ) -> Self {
        let total_amount = total_of(&items);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            customer_name,
            date,
            items,
            total_amount,
            payment_status,
        }
    }

    /// Whether `total_amount` matches the item lines.
    pub fn is_total_consistent(&self) -> bool {
        self.total_amount == total_of(&self.items)
    }

    pub fn unit_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Sum of line totals, in item order.
pub fn total_of(items: &[PharmacySaleItem]) -> f64 {
    items.iter().map(PharmacySaleItem::line_total).sum()
}
