use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each entity gets its own id type so an order id can never be passed where
/// an inventory item id is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an id from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of an order.
    OrderId
);
uuid_id!(
    /// Identifier of a single order line.
    OrderItemId
);
uuid_id!(
    /// Identifier of a sellable product.
    ProductId
);
uuid_id!(
    /// Identifier of a product size variant.
    SizeId
);
uuid_id!(
    /// Identifier of a modifier option (e.g. "extra cheese").
    ModifierOptionId
);
uuid_id!(
    /// Identifier of a stock item.
    InventoryItemId
);
uuid_id!(
    /// Identifier of an inventory ledger movement.
    MovementId
);
uuid_id!(
    /// Identifier of a recipe rule.
    RecipeRuleId
);
uuid_id!(
    /// Identifier of a side-effect marker row.
    MarkerId
);
uuid_id!(
    /// Identifier of a staff member acting on an order.
    UserId
);
uuid_id!(
    /// Identifier of a dining table.
    TableId
);
uuid_id!(
    /// Identifier of a registered customer.
    CustomerId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let id1 = OrderId::new();
        let id2 = OrderId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = InventoryItemId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
        assert_eq!(Uuid::from(id), uuid);
    }

    #[test]
    fn serializes_transparently() {
        let id = ProductId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }
}
