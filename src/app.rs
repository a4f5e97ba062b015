use axum::{
    Form, Router,
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, Query, Request, State},
    http::{HeaderMap, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::error::{AppError, UploadError};
use crate::inventory::{Inventory, Product, ProductFilter, load_products};
use crate::qr::generate_qr;
use crate::saving::{matches_data_format, replace_inventory, upload_extension};
use crate::session::{MemorySessionStore, SessionStore, new_session_id, with_session};
use crate::shopping_list::ListView;
use crate::store_map::aisle_layout;

/// Name of the signed cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

/// Multipart field holding an uploaded inventory.
pub const UPLOAD_FIELD: &str = "excel";

const TEMPLATES: [(&str, &str); 6] = [
    ("index", include_str!("./static/index.hbs")),
    ("products", include_str!("./static/products.hbs")),
    ("product", include_str!("./static/product.hbs")),
    ("shopping_list", include_str!("./static/shopping_list.hbs")),
    ("map", include_str!("./static/map.hbs")),
    ("qr_page", include_str!("./static/qr_page.hbs")),
];

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionStore>,
    templates: Arc<Handlebars<'static>>,
    key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl AppState {
    /// State backed by an in-memory session store.
    pub fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let sessions = Arc::new(MemorySessionStore::new(config.session_ttl_secs));
        Self::with_sessions(config, sessions)
    }

    pub fn with_sessions(
        config: Config,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let key = match &config.session_secret {
            Some(secret) => Key::derive_from(secret.as_bytes()),
            None => {
                log::warn!("No session_secret configured; sessions will not survive a restart");
                Key::generate()
            }
        };

        Ok(AppState {
            config: Arc::new(config),
            sessions,
            templates: Arc::new(register_templates()?),
            key,
        })
    }

    fn load_inventory(&self) -> Result<Inventory, AppError> {
        Ok(load_products(&self.config.data_path)?)
    }

    /// Base URL for absolute links: `public_url` if configured, otherwise
    /// the host the request came in on.
    fn site_root(&self, headers: &HeaderMap) -> String {
        if let Some(root) = self.config.public_root() {
            return root.to_string();
        }
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or(&self.config.bind_addr);
        format!("http://{}", host)
    }

    /// Render a page, draining the session's pending flash messages into it.
    fn render(
        &self,
        session_id: Option<&str>,
        template: &str,
        mut context: Value,
    ) -> Result<Html<String>, AppError> {
        let flashes = match session_id {
            Some(id) if !self.sessions.get(id).flashes.is_empty() => {
                with_session(self.sessions.as_ref(), id, |session| session.take_flashes())
            }
            _ => Vec::new(),
        };
        if let Value::Object(map) = &mut context {
            map.insert("flashes".to_string(), json!(flashes));
        }
        Ok(Html(self.templates.render(template, &context)?))
    }

    fn flash(&self, session_id: &str, message: impl Into<String>) {
        let message = message.into();
        with_session(self.sessions.as_ref(), session_id, |session| {
            session.flash(message)
        });
    }
}

fn register_templates() -> Result<Handlebars<'static>, handlebars::TemplateError> {
    let mut templates = Handlebars::new();
    templates.register_partial("header", include_str!("./static/header.hbs"))?;
    templates.register_partial("footer", include_str!("./static/footer.hbs"))?;
    for (name, source) in TEMPLATES {
        templates.register_template_string(name, source)?;
    }
    Ok(templates)
}

fn session_id(jar: &SignedCookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| !id.is_empty())
}

/// Reuse the request's session or start a new one.
fn ensure_session(jar: SignedCookieJar) -> (SignedCookieJar, String) {
    if let Some(id) = session_id(&jar) {
        return (jar, id);
    }

    let id = new_session_id();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), id)
}

/// Build the router for all pages and endpoints.
pub fn router(state: AppState) -> Router {
    let static_dir = ServeDir::new(&state.config.static_dir);
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/products", get(products))
        .route("/product/:sku", get(product_detail))
        .route("/add_to_list", post(add_to_list))
        .route("/shopping-list", get(shopping_list))
        .route("/update_shopping_list", post(update_shopping_list))
        .route("/remove_from_list", post(remove_from_list))
        .route("/clear_list", post(clear_list))
        .route("/map", get(store_map))
        .route("/qr", get(qr_image))
        .route("/qr/:sku", get(product_qr_image))
        .route("/show-qr", get(show_qr))
        .route("/admin/upload", post(upload_inventory))
        .nest_service("/static", static_dir)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(config)?;
    log::info!("Serving inventory from {}", state.config.data_path.display());

    let listener = TcpListener::bind(&state.config.bind_addr).await?;
    let local = listener.local_addr()?;
    log::info!("Running Grocerz at http://{}", local);

    // QR codes are scanned by phones, which need an address they can reach
    if local.ip().is_unspecified() {
        match local_ip_address::local_ip() {
            Ok(ip) => log::info!("On the local network: http://{}:{}", ip, local.port()),
            Err(e) => log::warn!("Could not determine local network address: {}", e),
        }
    }

    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    log::info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

/// A product as shown in listings and on the detail page.
#[derive(Serialize)]
struct ProductRow<'a> {
    #[serde(flatten)]
    product: &'a Product,
    availability: &'static str,
    price_display: String,
    detail_href: String,
    map_href: String,
}

impl<'a> From<&'a Product> for ProductRow<'a> {
    fn from(product: &'a Product) -> Self {
        ProductRow {
            product,
            availability: product.availability(),
            price_display: format!("{:.2}", product.price),
            detail_href: format!("/product/{}", urlencoding::encode(&product.sku)),
            map_href: format!("/map?highlight={}", urlencoding::encode(&product.aisle)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProductQuery {
    #[serde(default)]
    q: String,
    #[serde(default)]
    brand: String,
}

#[derive(Debug, Deserialize)]
struct AddToListForm {
    #[serde(default)]
    sku: String,
    #[serde(default = "default_qty")]
    qty: String,
}

fn default_qty() -> String {
    "1".to_string()
}

#[derive(Debug, Deserialize)]
struct SkuForm {
    #[serde(default)]
    sku: String,
}

#[derive(Debug, Default, Deserialize)]
struct MapQuery {
    #[serde(default)]
    highlight: String,
}

#[derive(Debug, Default, Deserialize)]
struct LinkQuery {
    link: Option<String>,
}

async fn index(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<Html<String>, AppError> {
    let accept = upload_extension(&state.config.data_path).unwrap_or_default();
    state.render(
        session_id(&jar).as_deref(),
        "index",
        json!({ "title": "Home", "accept": accept }),
    )
}

async fn products(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<ProductQuery>,
) -> Result<Html<String>, AppError> {
    let inventory = state.load_inventory()?;
    let filter = ProductFilter::new(&params.q, &params.brand);
    let rows: Vec<ProductRow> = inventory
        .search(&filter)
        .into_iter()
        .map(ProductRow::from)
        .collect();

    log::debug!(
        "Product search q={:?} brand={:?}: {} of {} products",
        filter.query(),
        filter.brand(),
        rows.len(),
        inventory.len()
    );

    state.render(
        session_id(&jar).as_deref(),
        "products",
        json!({
            "title": "Products",
            "products": rows,
            "q": params.q.trim(),
            "brand": params.brand.trim(),
        }),
    )
}

async fn product_detail(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(sku): Path<String>,
) -> Result<Html<String>, AppError> {
    let inventory = state.load_inventory()?;
    let product = inventory
        .find(&sku)
        .ok_or_else(|| AppError::ProductNotFound(sku.clone()))?;

    state.render(
        session_id(&jar).as_deref(),
        "product",
        json!({
            "title": product.name,
            "product": ProductRow::from(product),
            "qr_src": format!("/qr/{}", urlencoding::encode(&product.sku)),
        }),
    )
}

async fn add_to_list(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<AddToListForm>,
) -> Result<(SignedCookieJar, Redirect), AppError> {
    let inventory = state.load_inventory()?;
    let (jar, id) = ensure_session(jar);

    with_session(state.sessions.as_ref(), &id, |session| {
        match session.shopping_list.add(&inventory, &form.sku, &form.qty) {
            Ok(qty) => {
                let sku = form.sku.trim();
                log::debug!("Session {} added {} x {}", id, qty, sku);
                session.flash(format!("Added {} x {} to your shopping list.", qty, sku));
            }
            Err(e) => {
                log::debug!("Rejected add to list: {}", e);
                session.flash("Product not found.");
            }
        }
    });

    Ok((jar, Redirect::to("/products")))
}

async fn shopping_list(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<Html<String>, AppError> {
    let id = session_id(&jar);
    let list = id
        .as_deref()
        .map(|id| state.sessions.get(id).shopping_list)
        .unwrap_or_default();

    // an empty list never needs the inventory
    let view = if list.is_empty() {
        ListView::default()
    } else {
        list.view(&state.load_inventory()?)
    };

    state.render(
        id.as_deref(),
        "shopping_list",
        json!({
            "title": "Shopping list",
            "items": view.items,
            "total_items": view.total_items,
        }),
    )
}

async fn update_shopping_list(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(fields): Form<Vec<(String, String)>>,
) -> (SignedCookieJar, Redirect) {
    let (jar, id) = ensure_session(jar);

    with_session(state.sessions.as_ref(), &id, |session| {
        session.shopping_list.bulk_update(fields);
        session.flash("Shopping list updated.");
    });

    (jar, Redirect::to("/shopping-list"))
}

async fn remove_from_list(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<SkuForm>,
) -> (SignedCookieJar, Redirect) {
    let (jar, id) = ensure_session(jar);

    with_session(state.sessions.as_ref(), &id, |session| {
        if session.shopping_list.remove(&form.sku) {
            session.flash(format!(
                "Removed {} from your shopping list.",
                form.sku.trim()
            ));
        }
    });

    (jar, Redirect::to("/shopping-list"))
}

async fn clear_list(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> (SignedCookieJar, Redirect) {
    let (jar, id) = ensure_session(jar);

    with_session(state.sessions.as_ref(), &id, |session| {
        session.shopping_list.clear();
        session.flash("Shopping list cleared.");
    });

    (jar, Redirect::to("/shopping-list"))
}

async fn store_map(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<MapQuery>,
) -> Result<Html<String>, AppError> {
    let aisles = aisle_layout(&state.config.aisles, &params.highlight);

    state.render(
        session_id(&jar).as_deref(),
        "map",
        json!({
            "title": "Map",
            "aisles": aisles,
            "highlight": params.highlight.trim(),
        }),
    )
}

fn png_response(link: &str) -> Result<Response, AppError> {
    let png = generate_qr(link)?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        png,
    )
        .into_response())
}

async fn qr_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LinkQuery>,
) -> Result<Response, AppError> {
    let link = params
        .link
        .filter(|link| !link.is_empty())
        .unwrap_or_else(|| state.site_root(&headers));
    png_response(&link)
}

async fn product_qr_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sku): Path<String>,
) -> Result<Response, AppError> {
    let link = format!(
        "{}/product/{}",
        state.site_root(&headers),
        urlencoding::encode(&sku)
    );
    png_response(&link)
}

fn is_web_link(link: &str) -> bool {
    let lower = link.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

async fn show_qr(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    headers: HeaderMap,
    Query(params): Query<LinkQuery>,
) -> Result<Html<String>, AppError> {
    let link = params
        .link
        .filter(|link| !link.is_empty())
        .unwrap_or_else(|| state.site_root(&headers));
    // anything may be encoded, but only web links are made clickable
    let href = is_web_link(&link).then(|| link.clone());

    state.render(
        session_id(&jar).as_deref(),
        "qr_page",
        json!({
            "title": "QR code",
            "qr_src": format!("/qr?link={}", urlencoding::encode(&link)),
            "link": link,
            "href": href,
        }),
    )
}

async fn upload_inventory(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut multipart: Multipart,
) -> Result<(SignedCookieJar, Redirect), AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        let is_upload = field.name() == Some(UPLOAD_FIELD);
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await?;
        if is_upload && !data.is_empty() {
            upload = Some((file_name, data));
        }
    }

    let (jar, id) = ensure_session(jar);

    let Some((file_name, contents)) = upload else {
        state.flash(&id, "Please select an Excel file to upload.");
        return Ok((jar, Redirect::to("/")));
    };

    let data_path = &state.config.data_path;
    if let Some(name) = file_name.as_deref() {
        if !matches_data_format(data_path, name) {
            log::warn!("Rejected inventory upload {:?}: wrong file type", name);
            let message = match upload_extension(data_path) {
                Some(ext) => format!("Please upload a {} file.", ext),
                None => "Please upload an inventory spreadsheet.".to_string(),
            };
            state.flash(&id, message);
            return Ok((jar, Redirect::to("/")));
        }
    }

    match replace_inventory(data_path, &contents) {
        Ok(count) => {
            log::info!("Inventory upload accepted: {} products", count);
            state.flash(&id, "Inventory uploaded. Visit /products to see the items.");
            Ok((jar, Redirect::to("/products")))
        }
        Err(UploadError::Invalid(e)) => {
            log::warn!("Rejected inventory upload: {}", e);
            state.flash(
                &id,
                "The uploaded file could not be read as an inventory spreadsheet.",
            );
            Ok((jar, Redirect::to("/")))
        }
        Err(UploadError::Io(e)) => Err(AppError::Io(e)),
    }
}
