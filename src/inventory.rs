use crate::error::DataSourceError;
use crate::loader::{CellValue, RawTable, read_table};
use serde::Serialize;
use std::path::Path;

/// Text columns every product carries. Absent columns load as `""`.
pub const TEXT_COLUMNS: [&str; 7] = [
    "sku",
    "name",
    "brand",
    "size",
    "color",
    "ingredient_tags",
    "aisle",
];

pub const PRICE_COLUMN: &str = "price";
pub const STOCK_COLUMN: &str = "stock_qty";

pub const IN_STOCK: &str = "In stock";
pub const OUT_OF_STOCK: &str = "Out of stock";

/// One normalized inventory row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub sku: String,
    pub name: String,
    pub brand: String,
    pub size: String,
    pub color: String,
    pub ingredient_tags: String,
    pub aisle: String,
    pub price: f64,
    pub stock_qty: i64,
}

impl Product {
    pub fn availability(&self) -> &'static str {
        stock_label(self.stock_qty)
    }
}

/// Stringify and trim a cell. Empty and error cells become `""`.
pub fn coerce_text(cell: &CellValue) -> String {
    cell.to_string().trim().to_string()
}

/// Parse a price cell. Anything non-numeric, non-finite or negative is `0.0`.
pub fn coerce_price(cell: &CellValue) -> f64 {
    let price = match cell {
        CellValue::Int(i) => *i as f64,
        CellValue::Float(x) => *x,
        CellValue::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        CellValue::Empty | CellValue::Bool(_) => 0.0,
    };

    if price.is_finite() && price > 0.0 { price } else { 0.0 }
}

/// Parse a stock quantity cell. Fractions truncate toward zero; anything
/// non-numeric is `0`.
pub fn coerce_stock_qty(cell: &CellValue) -> i64 {
    match cell {
        CellValue::Int(i) => *i,
        CellValue::Float(x) => float_to_qty(*x),
        CellValue::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(float_to_qty))
                .unwrap_or(0)
        }
        CellValue::Empty | CellValue::Bool(_) => 0,
    }
}

fn float_to_qty(x: f64) -> i64 {
    // `as` saturates at the i64 bounds and maps NaN to 0
    if x.is_finite() { x.trunc() as i64 } else { 0 }
}

/// Availability label for a stock quantity.
pub fn stock_label(qty: i64) -> &'static str {
    if qty > 0 { IN_STOCK } else { OUT_OF_STOCK }
}

/// Availability label for raw, unparsed input. Anything that is not an
/// integer counts as out of stock.
pub fn stock_label_str(raw: &str) -> &'static str {
    match raw.trim().parse::<i64>() {
        Ok(qty) => stock_label(qty),
        Err(_) => OUT_OF_STOCK,
    }
}

/// Free-text and brand filter for the product listing.
///
/// Both terms are trimmed and lowercased on construction. An empty term
/// matches every product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    query: String,
    brand: String,
}

impl ProductFilter {
    pub fn new(query: &str, brand: &str) -> Self {
        ProductFilter {
            query: query.trim().to_lowercase(),
            brand: brand.trim().to_lowercase(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn matches(&self, product: &Product) -> bool {
        let query_ok = self.query.is_empty()
            || product.name.to_lowercase().contains(&self.query)
            || product.sku.to_lowercase().contains(&self.query);
        let brand_ok = self.brand.is_empty() || product.brand.to_lowercase().contains(&self.brand);
        query_ok && brand_ok
    }
}

/// The normalized product table for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    products: Vec<Product>,
}

impl Inventory {
    pub fn new(products: Vec<Product>) -> Self {
        Inventory { products }
    }

    /// Normalize a raw table into products.
    ///
    /// Missing text columns are synthesized as empty strings, a missing
    /// `price` column as `0.0` and a missing `stock_qty` column as `0`.
    pub fn from_table(table: &RawTable) -> Self {
        let text_cols = TEXT_COLUMNS.map(|name| table.column_index(name));
        let price_col = table.column_index(PRICE_COLUMN);
        let stock_col = table.column_index(STOCK_COLUMN);

        let text = |row: usize, col: usize| -> String {
            text_cols[col]
                .map(|c| coerce_text(table.cell(row, c)))
                .unwrap_or_default()
        };

        let products = (0..table.rows.len())
            .map(|row| Product {
                sku: text(row, 0),
                name: text(row, 1),
                brand: text(row, 2),
                size: text(row, 3),
                color: text(row, 4),
                ingredient_tags: text(row, 5),
                aisle: text(row, 6),
                price: price_col.map_or(0.0, |c| coerce_price(table.cell(row, c))),
                stock_qty: stock_col.map_or(0, |c| coerce_stock_qty(table.cell(row, c))),
            })
            .collect();

        Inventory { products }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// First product with exactly this sku.
    pub fn find(&self, sku: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.sku == sku)
    }

    pub fn contains(&self, sku: &str) -> bool {
        self.find(sku).is_some()
    }

    pub fn search(&self, filter: &ProductFilter) -> Vec<&Product> {
        self.products.iter().filter(|p| filter.matches(p)).collect()
    }
}

/// Read and normalize the inventory file. Nothing is cached; every call
/// re-reads the file.
///
/// # Examples
/// ```no_run
/// use grocerz::inventory::load_products;
///
/// let inventory = load_products("data/inventory.xlsx").unwrap();
/// for product in inventory.products() {
///     println!("{} {} ({})", product.sku, product.name, product.availability());
/// }
/// ```
pub fn load_products(path: impl AsRef<Path>) -> Result<Inventory, DataSourceError> {
    let path = path.as_ref();
    let table = read_table(path)?;
    let inventory = Inventory::from_table(&table);
    log::debug!(
        "Loaded {} products from {}",
        inventory.len(),
        path.display()
    );
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn table(headers: &[&str], rows: Vec<Vec<CellValue>>) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    fn product(sku: &str, name: &str, brand: &str) -> Product {
        Product {
            sku: sku.to_string(),
            name: name.to_string(),
            brand: brand.to_string(),
            size: String::new(),
            color: String::new(),
            ingredient_tags: String::new(),
            aisle: String::new(),
            price: 0.0,
            stock_qty: 0,
        }
    }

    #[test]
    fn missing_columns_are_synthesized() {
        let raw = table(&["sku"], vec![vec![text("A1")], vec![text("B2")]]);
        let inventory = Inventory::from_table(&raw);

        assert_eq!(inventory.len(), 2);
        for p in inventory.products() {
            assert_eq!(p.name, "");
            assert_eq!(p.brand, "");
            assert_eq!(p.size, "");
            assert_eq!(p.color, "");
            assert_eq!(p.ingredient_tags, "");
            assert_eq!(p.aisle, "");
            assert_eq!(p.price, 0.0);
            assert_eq!(p.stock_qty, 0);
        }
    }

    #[test]
    fn text_cells_are_stringified_and_trimmed() {
        let raw = table(
            &[" SKU ", "Name", "aisle"],
            vec![vec![CellValue::Float(1001.0), text("  Oat Milk "), CellValue::Empty]],
        );
        let inv = Inventory::from_table(&raw);
        let p = &inv.products()[0];

        assert_eq!(p.sku, "1001");
        assert_eq!(p.name, "Oat Milk");
        assert_eq!(p.aisle, "");
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let raw = table(
            &["sku", "price", "stock_qty"],
            vec![
                vec![text("A1"), text("abc"), text("lots")],
                vec![text("A2"), text(" 2.49 "), text("3")],
                vec![text("A3"), CellValue::Float(-4.0), CellValue::Float(7.9)],
                vec![text("A4"), CellValue::Empty, text("2.0")],
            ],
        );
        let products = Inventory::from_table(&raw);
        let p = products.products();

        assert_eq!((p[0].price, p[0].stock_qty), (0.0, 0));
        assert_eq!((p[1].price, p[1].stock_qty), (2.49, 3));
        assert_eq!((p[2].price, p[2].stock_qty), (0.0, 7));
        assert_eq!((p[3].price, p[3].stock_qty), (0.0, 2));
    }

    #[test]
    fn coercion_handles_non_finite_values() {
        assert_eq!(coerce_price(&CellValue::Float(f64::INFINITY)), 0.0);
        assert_eq!(coerce_price(&text("NaN")), 0.0);
        assert_eq!(coerce_stock_qty(&CellValue::Float(f64::NAN)), 0);
        assert_eq!(coerce_stock_qty(&CellValue::Bool(true)), 0);
    }

    #[test]
    fn stock_labels() {
        assert_eq!(stock_label(0), "Out of stock");
        assert_eq!(stock_label(-5), "Out of stock");
        assert_eq!(stock_label(3), "In stock");
        assert_eq!(stock_label_str("abc"), "Out of stock");
        assert_eq!(stock_label_str(" 12 "), "In stock");
        assert_eq!(stock_label_str(""), "Out of stock");
    }

    #[test]
    fn search_matches_name_or_sku() {
        let inventory = Inventory::new(vec![
            product("A1", "Milk", "Dairyland"),
            product("B2", "Bread", "Bakehouse"),
        ]);

        let hits = inventory.search(&ProductFilter::new("milk", ""));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sku, "A1");

        assert!(inventory.search(&ProductFilter::new("z", "")).is_empty());

        let by_sku = inventory.search(&ProductFilter::new("b2", ""));
        assert_eq!(by_sku[0].name, "Bread");

        assert_eq!(inventory.search(&ProductFilter::default()).len(), 2);
    }

    #[test]
    fn query_and_brand_are_anded() {
        let inventory = Inventory::new(vec![
            product("A1", "Milk", "Dairyland"),
            product("A2", "Oat Milk", "Oatly"),
        ]);

        let hits = inventory.search(&ProductFilter::new(" MILK ", "oat"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sku, "A2");

        assert!(inventory.search(&ProductFilter::new("bread", "oat")).is_empty());
    }

    #[test]
    fn search_terms_are_literal() {
        let inventory = Inventory::new(vec![product("C3", "Eggs (12)", "Farm")]);
        assert_eq!(inventory.search(&ProductFilter::new("(12", "")).len(), 1);
        assert!(inventory.search(&ProductFilter::new(".*", "")).is_empty());
    }

    #[test]
    fn find_returns_first_duplicate() {
        let inventory = Inventory::new(vec![
            product("A1", "First", ""),
            product("A1", "Second", ""),
        ]);
        assert_eq!(inventory.find("A1").map(|p| p.name.as_str()), Some("First"));
        assert!(!inventory.contains("a1"));
    }
}
