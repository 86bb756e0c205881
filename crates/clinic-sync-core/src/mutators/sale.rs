//! Pharmacy cart and sale completion.

use chrono::{DateTime, Utc};

use super::stock::deduct_stock;
use super::{MutationError, MutationResult};
use crate::models::{
    ClinicState, Medication, PaymentStatus, PharmacySale, PharmacySaleItem, StockDeduction,
};

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub medication_id: String,
    pub quantity: u32,
}

/// Items staged for sale.
///
/// Each line is bounded by the medication's stock at the time it is edited.
/// Completion does not re-check stock; see [`complete_sale`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn quantity_of(&self, medication_id: &str) -> u32 {
        self.lines
            .iter()
            .find(|l| l.medication_id == medication_id)
            .map_or(0, |l| l.quantity)
    }

    /// Add `quantity` units, merging with an existing line.
    /// Returns the line's new quantity.
    pub fn add(&mut self, medication: &Medication, quantity: u32) -> MutationResult<u32> {
        if quantity == 0 {
            return Err(MutationError::InvalidQuantity {
                medication_id: medication.id.clone(),
                quantity,
            });
        }
        let wanted = self
            .quantity_of(&medication.id)
            .saturating_add(quantity);
        self.set_quantity(medication, wanted)?;
        Ok(wanted)
    }

    /// Set a line's quantity. Zero removes the line.
    pub fn set_quantity(&mut self, medication: &Medication, quantity: u32) -> MutationResult<()> {
        if quantity == 0 {
            self.remove(&medication.id);
            return Ok(());
        }
        if quantity > medication.stock {
            return Err(MutationError::InsufficientStock {
                medication_id: medication.id.clone(),
                requested: quantity,
                available: medication.stock,
            });
        }

        match self
            .lines
            .iter_mut()
            .find(|l| l.medication_id == medication.id)
        {
            Some(line) => line.quantity = quantity,
            None => self.lines.push(CartLine {
                medication_id: medication.id.clone(),
                quantity,
            }),
        }
        Ok(())
    }

    pub fn remove(&mut self, medication_id: &str) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.medication_id != medication_id);
        self.lines.len() < before
    }

    /// Preview total at current prices. Medications that no longer exist
    /// contribute nothing.
    pub fn total(&self, state: &ClinicState) -> f64 {
        self.lines
            .iter()
            .filter_map(|line| {
                state
                    .medication(&line.medication_id)
                    .map(|m| line.quantity as f64 * m.price_per_unit)
            })
            .sum()
    }
}

/// Result of a completed sale.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleReceipt {
    pub sale: PharmacySale,
    pub deductions: Vec<StockDeduction>,
}

impl SaleReceipt {
    /// Lines whose deduction hit the zero clamp.
    pub fn shortfalls(&self) -> impl Iterator<Item = &StockDeduction> {
        self.deductions.iter().filter(|d| d.is_clamped())
    }
}

/// Record a sale and deduct its stock.
///
/// Prices are captured from each medication at call time. Stock is not
/// re-validated against the cart: a concurrent sale on another replica may
/// have consumed it, in which case the deduction clamps at zero and the
/// shortfall is reported on the receipt.
pub fn complete_sale(
    state: &mut ClinicState,
    lines: &[CartLine],
    customer_name: &str,
    payment_status: PaymentStatus,
    now: DateTime<Utc>,
) -> MutationResult<SaleReceipt> {
    if lines.is_empty() {
        return Err(MutationError::EmptyCart);
    }

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(MutationError::InvalidQuantity {
                medication_id: line.medication_id.clone(),
                quantity: line.quantity,
            });
        }
        let medication = state
            .medication(&line.medication_id)
            .ok_or_else(|| MutationError::UnknownMedication(line.medication_id.clone()))?;
        items.push(PharmacySaleItem {
            medication_id: line.medication_id.clone(),
            quantity: line.quantity,
            price_at_time: medication.price_per_unit,
        });
    }

    // Every line resolved above, so each deduction finds its medication.
    let deductions = items
        .iter()
        .filter_map(|item| deduct_stock(state, &item.medication_id, item.quantity))
        .collect();

    let sale = PharmacySale::new(customer_name.to_string(), now, items, payment_status);
    state.sales.push(sale.clone());

    Ok(SaleReceipt { sale, deductions })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_med(stock: u32, price: f64) -> (ClinicState, Medication) {
        let mut state = ClinicState::default();
        let mut med = Medication::new("Panadol".into(), stock, price);
        med.id = "m1".into();
        med.reorder_level = 2;
        state.medications.push(med.clone());
        (state, med)
    }

    #[test]
    fn test_complete_sale_deducts_and_records() {
        let (mut state, med) = state_with_med(10, 50.0);
        let mut cart = Cart::new();
        cart.add(&med, 3).unwrap();

        let receipt = complete_sale(
            &mut state,
            cart.lines(),
            "Walk-in Customer",
            PaymentStatus::Paid,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(state.medications[0].stock, 7);
        assert_eq!(state.sales.len(), 1);
        assert_eq!(receipt.sale.total_amount, 150.0);
        assert_eq!(receipt.sale.items[0].price_at_time, 50.0);
        assert_eq!(receipt.shortfalls().count(), 0);
    }

    #[test]
    fn test_empty_cart_rejected_without_effects() {
        let (mut state, _) = state_with_med(10, 50.0);
        let before = state.clone();

        let result = complete_sale(&mut state, &[], "X", PaymentStatus::Paid, Utc::now());
        assert_eq!(result, Err(MutationError::EmptyCart));
        assert_eq!(state, before);
    }

    #[test]
    fn test_unknown_medication_rejected_before_any_deduction() {
        let (mut state, _) = state_with_med(10, 50.0);
        let before = state.clone();
        let lines = vec![
            CartLine {
                medication_id: "m1".into(),
                quantity: 2,
            },
            CartLine {
                medication_id: "gone".into(),
                quantity: 1,
            },
        ];

        let result = complete_sale(&mut state, &lines, "X", PaymentStatus::Paid, Utc::now());
        assert_eq!(result, Err(MutationError::UnknownMedication("gone".into())));
        assert_eq!(state, before);
    }

    #[test]
    fn test_price_captured_at_sale_time() {
        let (mut state, med) = state_with_med(10, 50.0);
        let lines = vec![CartLine {
            medication_id: med.id.clone(),
            quantity: 1,
        }];
        complete_sale(&mut state, &lines, "X", PaymentStatus::Paid, Utc::now()).unwrap();

        state.medications[0].price_per_unit = 80.0;
        assert_eq!(state.sales[0].items[0].price_at_time, 50.0);
        assert_eq!(state.sales[0].total_amount, 50.0);
    }

    #[test]
    fn test_stale_cart_clamps_and_reports_shortfall() {
        let (mut state, med) = state_with_med(5, 10.0);
        let mut cart = Cart::new();
        cart.add(&med, 5).unwrap();

        // Another replica sold 3 units in the meantime.
        state.medications[0].stock = 2;

        let receipt =
            complete_sale(&mut state, cart.lines(), "X", PaymentStatus::Paid, Utc::now()).unwrap();
        assert_eq!(state.medications[0].stock, 0);
        let shortfall: Vec<_> = receipt.shortfalls().collect();
        assert_eq!(shortfall.len(), 1);
        assert_eq!(shortfall[0].shortfall(), 3);
        // The sale still records what the customer was charged for.
        assert_eq!(receipt.sale.total_amount, 50.0);
    }

    #[test]
    fn test_cart_bounded_by_stock() {
        let (_, med) = state_with_med(4, 10.0);
        let mut cart = Cart::new();

        assert_eq!(cart.add(&med, 3).unwrap(), 3);
        let err = cart.add(&med, 2).unwrap_err();
        assert_eq!(
            err,
            MutationError::InsufficientStock {
                medication_id: "m1".into(),
                requested: 5,
                available: 4,
            }
        );
        assert_eq!(cart.quantity_of("m1"), 3);
    }

    #[test]
    fn test_cart_zero_quantity() {
        let (_, med) = state_with_med(4, 10.0);
        let mut cart = Cart::new();

        assert!(cart.add(&med, 0).is_err());
        cart.add(&med, 2).unwrap();
        cart.set_quantity(&med, 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_cart_total_ignores_missing_medications() {
        let (state, med) = state_with_med(10, 12.5);
        let mut cart = Cart::new();
        cart.add(&med, 2).unwrap();

        let mut ghost = Medication::new("Ghost".into(), 10, 99.0);
        ghost.id = "ghost".into();
        cart.add(&ghost, 1).unwrap();

        assert_eq!(cart.total(&state), 25.0);
        assert!(cart.remove("ghost"));
        assert_eq!(cart.len(), 1);
    }
}
