use guildhall_core::CoreError;
use guildhall_shared::VariantRecord;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("Variant not found: {0}")]
    NotFound(Uuid),

    #[error("Variant {0} is no longer sold")]
    Unavailable(String),

    #[error("Insufficient stock for {sku}: requested {requested}, available {available}")]
    Insufficient {
        sku: String,
        requested: i32,
        available: i32,
    },
}

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(_) => CoreError::NotFoundError(err.to_string()),
            InventoryError::Unavailable(_) | InventoryError::Insufficient { .. } => {
                CoreError::OutOfStockError(err.to_string())
            }
        }
    }
}

/// Check that `requested` units of the variant can be sold right now.
pub fn check_availability(
    variant_id: Uuid,
    record: Option<&VariantRecord>,
    requested: i32,
) -> Result<&VariantRecord, InventoryError> {
    let record = record.ok_or(InventoryError::NotFound(variant_id))?;

    if !record.is_sellable() {
        return Err(InventoryError::Unavailable(record.variant.sku.clone()));
    }

    if record.variant.stock < requested {
        return Err(InventoryError::Insufficient {
            sku: record.variant.sku.clone(),
            requested,
            available: record.variant.stock.max(0),
        });
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildhall_shared::ProductVariant;

    fn record(stock: i32, active: bool) -> VariantRecord {
        VariantRecord {
            variant: ProductVariant {
                id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                sku: "MUG-WHT".to_string(),
                size: None,
                color: Some("white".to_string()),
                base_price_cents: 1200,
                stock,
                is_active: active,
            },
            product_name: "Guild Mug".to_string(),
            product_active: true,
        }
    }

    #[test]
    fn test_available() {
        let r = record(3, true);
        assert!(check_availability(r.variant.id, Some(&r), 3).is_ok());
    }

    #[test]
    fn test_missing_variant() {
        let id = Uuid::new_v4();
        assert_eq!(check_availability(id, None, 1), Err(InventoryError::NotFound(id)));
    }

    #[test]
    fn test_insufficient_and_inactive() {
        let r = record(1, true);
        let err = check_availability(r.variant.id, Some(&r), 2).unwrap_err();
        assert!(matches!(CoreError::from(err), CoreError::OutOfStockError(_)));

        let r = record(10, false);
        assert_eq!(
            check_availability(r.variant.id, Some(&r), 1),
            Err(InventoryError::Unavailable("MUG-WHT".to_string()))
        );
    }

    #[test]
    fn test_negative_stock_reported_as_zero() {
        let r = record(-2, true);
        match check_availability(r.variant.id, Some(&r), 1) {
            Err(InventoryError::Insufficient { available, .. }) => assert_eq!(available, 0),
            other => panic!("unexpected {:?}", other),
        }
    }
}
