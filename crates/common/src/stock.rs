//! Vocabulary shared by the inventory ledger and the side-effect markers.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::InventoryItemId;

/// Error returned when parsing an unknown persisted name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownName {
    pub vocabulary: &'static str,
    pub value: String,
}

impl std::fmt::Display for UnknownName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {}: {}", self.vocabulary, self.value)
    }
}

impl std::error::Error for UnknownName {}

macro_rules! persisted_names {
    ($ty:ident, $vocabulary:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Returns the persisted name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = UnknownName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownName {
                        vocabulary: $vocabulary,
                        value: s.to_string(),
                    })
            }
        }
    };
}

/// A side effect that must happen exactly once per order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SideEffectKind {
    InventoryDeduct,
    PrintTicket,
}

persisted_names!(SideEffectKind, "side-effect kind", {
    InventoryDeduct => "inventory-deduct",
    PrintTicket => "print-ticket",
});

/// Kind of an inventory ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock coming in; positive effect.
    Entry,
    /// Stock going out; negative effect.
    Exit,
    /// Correction with a signed effect.
    Adjustment,
}

persisted_names!(MovementKind, "movement kind", {
    Entry => "entry",
    Exit => "exit",
    Adjustment => "adjustment",
});

/// Who or what caused a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MovementOrigin {
    /// Recipe deduction on the automatic ready path.
    AutomaticRecipe,
    /// Recipe deduction that bypassed the stock check.
    ForcedRecipe,
    /// Recipe deduction applied by the reconciliation backfill.
    Reconciliation,
    /// Operator-entered movement.
    Manual,
    /// Goods received from a supplier.
    Purchase,
}

persisted_names!(MovementOrigin, "movement origin", {
    AutomaticRecipe => "automatic-recipe",
    ForcedRecipe => "forced-recipe",
    Reconciliation => "reconciliation",
    Manual => "manual",
    Purchase => "purchase",
});

/// Per order-line overrides of the product recipe.
///
/// Only rules flagged optional can be skipped and only rules flagged
/// customizable honour a quantity factor; other entries are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCustomization {
    /// Ingredients the customer opted out of.
    #[serde(default)]
    pub skipped: BTreeSet<InventoryItemId>,

    /// Multipliers for customizable ingredients (e.g. 2 for "double cheese").
    #[serde(default)]
    pub factors: BTreeMap<InventoryItemId, Decimal>,
}

impl ItemCustomization {
    pub fn is_empty(&self) -> bool {
        self.skipped.is_empty() && self.factors.is_empty()
    }

    /// Opts out of an optional ingredient.
    pub fn skip(mut self, item: InventoryItemId) -> Self {
        self.skipped.insert(item);
        self
    }

    /// Scales a customizable ingredient.
    pub fn scale(mut self, item: InventoryItemId, factor: Decimal) -> Self {
        self.factors.insert(item, factor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in SideEffectKind::ALL {
            assert_eq!(kind.as_str().parse::<SideEffectKind>().unwrap(), *kind);
        }
        for origin in MovementOrigin::ALL {
            assert_eq!(origin.as_str().parse::<MovementOrigin>().unwrap(), *origin);
        }
        let err = "teleport".parse::<MovementKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown movement kind: teleport");
    }

    #[test]
    fn serde_matches_persisted_names() {
        assert_eq!(
            serde_json::to_string(&MovementOrigin::AutomaticRecipe).unwrap(),
            "\"automatic-recipe\""
        );
        assert_eq!(
            serde_json::to_string(&SideEffectKind::PrintTicket).unwrap(),
            "\"print-ticket\""
        );
    }

    #[test]
    fn customization_builder() {
        let cheese = InventoryItemId::new();
        let onion = InventoryItemId::new();
        let c = ItemCustomization::default().scale(cheese, dec!(2)).skip(onion);
        assert!(!c.is_empty());
        assert!(c.skipped.contains(&onion));
        assert_eq!(c.factors.get(&cheese), Some(&dec!(2)));
    }
}
