/*!
# Grocerz

A small store web application: browse an inventory spreadsheet, keep a
per-session shopping list, look up aisles on a store map and print QR codes
that link shoppers straight to product pages.

## Architecture

### Core
- **Inventory Loader** - reads the inventory file (Excel workbooks through
  calamine, CSV through the csv crate) and normalizes every row into a
  [`Product`](inventory::Product). Malformed cells degrade to defaults; only
  a missing or unreadable file is an error.
- **Shopping List Store** - a per-session `sku -> qty` map with add, bulk
  update, remove, clear and view operations, kept in an injected
  [`SessionStore`](session::SessionStore).
- **QR Link Generator** - PNG QR codes for arbitrary links.

### Web layer (`web` feature)
- axum router with one handler per endpoint
- handlebars templates embedded in the binary
- signed session cookies (axum-extra)

Nothing is cached between requests: every page that needs products re-reads
the inventory file, so an upload is visible immediately.

## REST API Endpoints

- `GET /products?q=&brand=` - search and filter products
- `GET /product/{sku}` - product detail
- `POST /add_to_list`, `/update_shopping_list`, `/remove_from_list`, `/clear_list`
- `GET /shopping-list` - current list
- `GET /map?highlight=` - store map
- `GET /qr?link=`, `GET /qr/{sku}`, `GET /show-qr?link=` - QR codes
- `POST /admin/upload` - replace the inventory file
*/

pub mod config;
pub mod error;
pub mod inventory;
pub mod loader;
pub mod qr;
pub mod saving;
pub mod session;
pub mod shopping_list;
pub mod store_map;

#[cfg(feature = "web")]
pub mod app;

pub use config::Config;
pub use error::*;
pub use inventory::{Inventory, Product, ProductFilter, load_products, stock_label};
pub use session::{MemorySessionStore, SessionData, SessionStore};
pub use shopping_list::{ListItem, ListView, ShoppingList};
