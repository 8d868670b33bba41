//! Product catalog: public reads, admin writes and image management.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tundra_api::{ApiError, MessageBody};
use tundra_auth::AdminAuth;
use tundra_core::{NewProduct, Product, ProductPage, ProductPatch, parse_price, parse_stock};
use tundra_db_postgres::ProductQuery;
use tundra_db_postgres::product::PRODUCT_NOT_FOUND;

use super::parse_id;
use crate::media::{ImageStore, extract_public_id};
use crate::server::AppState;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

const IMAGE_SERVICE_UNAVAILABLE: &str = "Image upload service is not available";
const REQUIRED_FIELDS: &str = "All fields (name, description, price, stock, category) are required";

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
}

impl ListParams {
    /// Resolves paging: invalid or non-positive values fall back to the
    /// defaults and the size is capped at `max_size`. `pageSize` wins over
    /// `limit` whenever it is present.
    pub fn resolve(&self, default_size: u32, max_size: u32) -> (u32, u32, Option<String>) {
        let page = self.page.as_deref().and_then(parse_positive).unwrap_or(1);
        let requested = match (&self.page_size, &self.limit) {
            (Some(size), _) => parse_positive(size),
            (None, Some(limit)) => parse_positive(limit),
            (None, None) => None,
        };
        let size = requested.unwrap_or(default_size).min(max_size);
        let search = self.search.clone().filter(|s| !s.is_empty());
        (page, size, search)
    }
}

fn parse_positive(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|v| *v > 0)
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub message: &'static str,
    pub product: Product,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub message: &'static str,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

/// `GET /products`
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let pagination = &state.config.pagination;
    let (page, size, search) =
        params.resolve(pagination.default_page_size, pagination.max_page_size);

    if let Some(cached) = state.products_cache.get(page, size, search.as_deref()).await {
        return Ok(with_cache_status(Json(cached), "HIT"));
    }

    let generation = state.products_cache.generation();
    let query = ProductQuery {
        page,
        size,
        search: search.clone(),
    };
    let (products, total) = state.store.products().list(&query).await?;
    let body = ProductPage::new(page, size, total, products);

    state
        .products_cache
        .put_if_current(generation, page, size, search.as_deref(), &body)
        .await;

    Ok(with_cache_status(Json(body), "MISS"))
}

fn with_cache_status(body: impl IntoResponse, status: &'static str) -> Response {
    let mut response = body.into_response();
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(status));
    response
}

/// `GET /products/{id}`
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id = parse_id(&id, PRODUCT_NOT_FOUND)?;
    let product = state
        .store
        .products()
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(PRODUCT_NOT_FOUND))?;
    Ok(Json(product))
}

/// An uploaded file part.
struct ImageFile {
    filename: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct ProductForm {
    name: Option<String>,
    description: Option<String>,
    price: Option<String>,
    stock: Option<String>,
    category: Option<String>,
    image: Option<ImageFile>,
}

async fn read_form(mut multipart: Multipart) -> Result<ProductForm, ApiError> {
    let mut form = ProductForm::default();
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "image" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(form_error)?;
            if !bytes.is_empty() {
                form.image = Some(ImageFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }
        let value = field.text().await.map_err(form_error)?;
        let slot = match name.as_str() {
            "name" => &mut form.name,
            "description" => &mut form.description,
            "price" => &mut form.price,
            "stock" => &mut form.stock,
            "category" => &mut form.category,
            _ => continue,
        };
        *slot = Some(value);
    }
    Ok(form)
}

fn form_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    tracing::debug!(error = %e, "Rejected multipart body");
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large(e.body_text());
    }
    ApiError::bad_request("Failed to parse form data")
}

fn image_store(state: &AppState) -> Result<&Arc<dyn ImageStore>, ApiError> {
    state
        .images
        .as_ref()
        .ok_or_else(|| ApiError::internal(IMAGE_SERVICE_UNAVAILABLE))
}

async fn upload_image(state: &AppState, image: ImageFile) -> Result<String, ApiError> {
    let store = image_store(state)?;
    let folder = &state.config.cloudinary.folder;
    match store.upload(&image.filename, image.bytes, folder).await {
        Ok(url) => {
            crate::metrics::record_image_upload("success");
            Ok(url)
        }
        Err(e) => {
            crate::metrics::record_image_upload("failure");
            tracing::warn!(filename = %image.filename, error = %e, "Image upload failed");
            Err(ApiError::bad_request(format!("Failed to upload image: {e}")))
        }
    }
}

/// Best-effort removal of a product's hosted image.
async fn delete_hosted_image(state: &AppState, image_url: Option<&str>) {
    let (Some(store), Some(url)) = (state.images.as_ref(), image_url) else {
        return;
    };
    let Some(public_id) = extract_public_id(url) else {
        return;
    };
    if let Err(e) = store.delete(&public_id).await {
        tracing::warn!(public_id = %public_id, error = %e, "Failed to delete hosted image");
    }
}

/// `POST /products` (admin, multipart)
pub async fn create_product(
    AdminAuth(admin): AdminAuth,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let form = read_form(multipart).await?;

    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
    let (Some(name), Some(description), Some(price), Some(stock), Some(category)) = (
        non_empty(form.name),
        non_empty(form.description),
        non_empty(form.price),
        non_empty(form.stock),
        non_empty(form.category),
    ) else {
        return Err(ApiError::bad_request(REQUIRED_FIELDS));
    };

    let price = parse_price(&price)?;
    let stock = parse_stock(&stock)?;

    let image_url = match form.image {
        Some(image) => Some(upload_image(&state, image).await?),
        None => None,
    };

    let product = state
        .store
        .products()
        .create(NewProduct {
            name,
            description,
            price,
            stock,
            category,
            image_url,
            user_id: admin.user_id,
        })
        .await?;

    tracing::info!(product_id = %product.id, admin_id = %admin.user_id, "Product created");
    state.products_cache.invalidate_all().await;

    Ok((
        StatusCode::CREATED,
        Json(ProductResponse {
            message: "Product created successfully",
            product,
        }),
    ))
}

/// `PUT /products/{id}` (admin, partial JSON)
pub async fn update_product(
    AdminAuth(admin): AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ProductPatch>, JsonRejection>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id = parse_id(&id, PRODUCT_NOT_FOUND)?;
    let products = state.store.products();
    if products.find_by_id(id).await?.is_none() {
        return Err(ApiError::not_found(PRODUCT_NOT_FOUND));
    }

    let Json(patch) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    patch.validate()?;

    let product = products.update(id, &patch).await?;

    tracing::info!(product_id = %product.id, admin_id = %admin.user_id, "Product updated");
    state.products_cache.invalidate_all().await;

    Ok(Json(ProductResponse {
        message: "Product updated successfully",
        product,
    }))
}

/// `DELETE /products/{id}` (admin)
pub async fn delete_product(
    AdminAuth(admin): AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, ApiError> {
    let id = parse_id(&id, PRODUCT_NOT_FOUND)?;
    let products = state.store.products();
    let product = products
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(PRODUCT_NOT_FOUND))?;

    // The row goes first so a product still referenced by orders keeps its image.
    products.delete(id).await?;
    delete_hosted_image(&state, product.image_url.as_deref()).await;

    tracing::info!(product_id = %id, admin_id = %admin.user_id, "Product deleted");
    state.products_cache.invalidate_all().await;

    Ok(Json(MessageBody::new("Product deleted successfully")))
}

/// `POST /products/{id}/image` (admin, multipart)
pub async fn upload_product_image(
    AdminAuth(admin): AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ImageResponse>, ApiError> {
    let id = parse_id(&id, PRODUCT_NOT_FOUND)?;
    let products = state.store.products();
    let product = products
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(PRODUCT_NOT_FOUND))?;

    image_store(&state)?;
    let image = read_form(multipart)
        .await?
        .image
        .ok_or_else(|| ApiError::bad_request("No image file provided"))?;

    let image_url = upload_image(&state, image).await?;
    products.set_image_url(id, &image_url).await?;
    // Replaced only once the new upload is stored.
    delete_hosted_image(&state, product.image_url.as_deref()).await;

    tracing::info!(product_id = %id, admin_id = %admin.user_id, "Product image replaced");
    state.products_cache.invalidate_all().await;

    Ok(Json(ImageResponse {
        message: "Image uploaded successfully",
        image_url,
    }))
}
