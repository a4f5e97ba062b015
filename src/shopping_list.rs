use crate::error::ProductNotFoundError;
use crate::inventory::Inventory;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Form key prefix used by the bulk update form (`qty-<sku>`).
pub const QTY_FIELD_PREFIX: &str = "qty-";

/// Display name for list entries whose sku has left the inventory.
pub const NOT_IN_INVENTORY: &str = "(not in inventory)";

/// Quantity for an add request. Unparsable or non-positive input becomes 1.
pub fn parse_requested_qty(raw: &str) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(qty) if qty >= 1 => u32::try_from(qty).unwrap_or(u32::MAX),
        _ => 1,
    }
}

/// Quantity for a bulk update field. Unparsable input becomes 0, which
/// removes the entry.
pub fn parse_update_qty(raw: &str) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(qty) if qty >= 1 => u32::try_from(qty).unwrap_or(u32::MAX),
        _ => 0,
    }
}

/// A session's shopping list: sku -> requested quantity.
///
/// Every stored quantity is at least 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShoppingList {
    items: BTreeMap<String, u32>,
}

/// One shopping list row enriched from the inventory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListItem {
    pub sku: String,
    pub name: String,
    pub qty: u32,
    pub aisle: String,
}

/// The rendered shopping list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListView {
    pub items: Vec<ListItem>,
    pub total_items: u64,
}

impl ShoppingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sku: &str) -> Option<u32> {
        self.items.get(sku).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.items.iter().map(|(sku, qty)| (sku.as_str(), *qty))
    }

    /// Sum of all requested quantities.
    pub fn total_items(&self) -> u64 {
        self.items.values().map(|&qty| u64::from(qty)).sum()
    }

    /// Add `qty_raw` units of `sku`, accumulating onto any existing entry.
    ///
    /// Fails without touching the list when `sku` is not in `inventory`.
    /// Returns the quantity that was added.
    pub fn add(
        &mut self,
        inventory: &Inventory,
        sku: &str,
        qty_raw: &str,
    ) -> Result<u32, ProductNotFoundError> {
        let sku = sku.trim();
        let qty = parse_requested_qty(qty_raw);

        if !inventory.contains(sku) {
            return Err(ProductNotFoundError {
                sku: sku.to_string(),
            });
        }

        let entry = self.items.entry(sku.to_string()).or_insert(0);
        *entry = entry.saturating_add(qty);
        Ok(qty)
    }

    /// Replace the whole list from `qty-<sku>` form fields.
    ///
    /// Other fields are ignored, as are entries with a quantity below 1.
    /// When a key repeats, its first value decides.
    pub fn bulk_update<I, K, V>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut updated = BTreeMap::new();

        for (key, value) in fields {
            let Some(sku) = key.as_ref().strip_prefix(QTY_FIELD_PREFIX) else {
                continue;
            };
            if sku.is_empty() || !seen.insert(sku.to_string()) {
                continue;
            }

            let qty = parse_update_qty(value.as_ref());
            if qty > 0 {
                updated.insert(sku.to_string(), qty);
            }
        }

        self.items = updated;
    }

    /// Remove `sku`. Returns whether an entry was removed.
    pub fn remove(&mut self, sku: &str) -> bool {
        self.items.remove(sku.trim()).is_some()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Join every entry with its product. Skus no longer in the inventory
    /// get a placeholder row instead of failing.
    pub fn view(&self, inventory: &Inventory) -> ListView {
        let items = self
            .items
            .iter()
            .map(|(sku, &qty)| match inventory.find(sku) {
                Some(product) => ListItem {
                    sku: sku.clone(),
                    name: product.name.clone(),
                    qty,
                    aisle: product.aisle.clone(),
                },
                None => ListItem {
                    sku: sku.clone(),
                    name: NOT_IN_INVENTORY.to_string(),
                    qty,
                    aisle: String::new(),
                },
            })
            .collect();

        ListView {
            items,
            total_items: self.total_items(),
        }
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for ShoppingList {
    /// Build a list directly; zero quantities are skipped.
    fn from_iter<T: IntoIterator<Item = (S, u32)>>(iter: T) -> Self {
        ShoppingList {
            items: iter
                .into_iter()
                .filter(|(_, qty)| *qty > 0)
                .map(|(sku, qty)| (sku.into(), qty))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Product;

    fn inventory(entries: &[(&str, &str, &str)]) -> Inventory {
        Inventory::new(
            entries
                .iter()
                .map(|(sku, name, aisle)| Product {
                    sku: sku.to_string(),
                    name: name.to_string(),
                    brand: String::new(),
                    size: String::new(),
                    color: String::new(),
                    ingredient_tags: String::new(),
                    aisle: aisle.to_string(),
                    price: 1.0,
                    stock_qty: 1,
                })
                .collect(),
        )
    }

    fn store() -> Inventory {
        inventory(&[("A1", "Milk", "Aisle 1"), ("B2", "Bread", "Aisle 2")])
    }

    #[test]
    fn add_accumulates() {
        let inv = store();
        let mut list = ShoppingList::new();

        assert_eq!(list.add(&inv, "A1", "2"), Ok(2));
        assert_eq!(list.add(&inv, "A1", "3"), Ok(3));
        assert_eq!(list, ShoppingList::from_iter([("A1", 5)]));
    }

    #[test]
    fn add_clamps_bad_quantities_to_one() {
        let inv = store();
        let mut list = ShoppingList::new();

        assert_eq!(list.add(&inv, " A1 ", "zero"), Ok(1));
        assert_eq!(list.add(&inv, "A1", "-4"), Ok(1));
        assert_eq!(list.add(&inv, "A1", "0"), Ok(1));
        assert_eq!(list.add(&inv, "A1", "2.5"), Ok(1));
        assert_eq!(list.get("A1"), Some(4));
    }

    #[test]
    fn add_rejects_unknown_sku() {
        let inv = store();
        let mut list = ShoppingList::from_iter([("A1", 1)]);
        let before = list.clone();

        let err = list.add(&inv, "ZZZ", "1").unwrap_err();
        assert_eq!(err.sku, "ZZZ");
        assert_eq!(list, before);
    }

    #[test]
    fn bulk_update_replaces_instead_of_merging() {
        let mut list = ShoppingList::from_iter([("A1", 5), ("B2", 1)]);

        list.bulk_update([("qty-A1", "2")]);
        assert_eq!(list, ShoppingList::from_iter([("A1", 2)]));
    }

    #[test]
    fn bulk_update_drops_non_positive_and_garbage() {
        let mut list = ShoppingList::from_iter([("A1", 5), ("B2", 1), ("C3", 9)]);

        list.bulk_update(vec![
            ("qty-A1".to_string(), "0".to_string()),
            ("qty-B2".to_string(), "many".to_string()),
            ("qty-C3".to_string(), " 4 ".to_string()),
            ("csrf".to_string(), "7".to_string()),
            ("qty-C3".to_string(), "8".to_string()),
        ]);
        assert_eq!(list, ShoppingList::from_iter([("C3", 4)]));
    }

    #[test]
    fn remove_is_a_no_op_for_missing_sku() {
        let mut list = ShoppingList::from_iter([("A1", 2)]);

        assert!(!list.remove("B2"));
        assert_eq!(list.len(), 1);
        assert!(list.remove("A1"));
        assert!(list.is_empty());
    }

    #[test]
    fn clear_is_unconditional() {
        let mut list = ShoppingList::from_iter([("A1", 2), ("B2", 3)]);
        list.clear();
        assert!(list.is_empty());

        let mut empty = ShoppingList::new();
        empty.clear();
        assert_eq!(empty, ShoppingList::new());
    }

    #[test]
    fn view_synthesizes_placeholders() {
        let inv = store();
        let list = ShoppingList::from_iter([("A1", 2), ("GONE", 3)]);

        let view = list.view(&inv);
        assert_eq!(view.total_items, 5);
        assert_eq!(view.items.len(), 2);

        let milk = &view.items[0];
        assert_eq!((milk.name.as_str(), milk.aisle.as_str()), ("Milk", "Aisle 1"));

        let gone = &view.items[1];
        assert_eq!(gone.sku, "GONE");
        assert_eq!(gone.name, "(not in inventory)");
        assert_eq!(gone.aisle, "");
        assert_eq!(gone.qty, 3);
    }

    #[test]
    fn serializes_as_a_plain_map() {
        let list = ShoppingList::from_iter([("A1", 2)]);
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"{"A1":2}"#);

        let back: ShoppingList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }
}
