use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use guildhall_catalog::PricingEngine;
use guildhall_shared::Product;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub variants: Vec<VariantResponse>,
}

#[derive(Debug, Serialize)]
pub struct VariantResponse {
    pub id: Uuid,
    pub sku: String,
    pub size: Option<String>,
    pub color: Option<String>,
    /// Retail price after markup
    pub price_cents: i64,
    pub currency: String,
    pub stock: i32,
}

fn to_response(product: Product, engine: &PricingEngine, currency: &str) -> Result<ProductResponse, AppError> {
    let mut images = product.images;
    images.sort_by_key(|image| image.position);

    let variants = product
        .variants
        .iter()
        .filter(|variant| variant.is_active)
        .map(|variant| -> Result<VariantResponse, AppError> {
            Ok(VariantResponse {
                id: variant.id,
                sku: variant.sku.clone(),
                size: variant.size.clone(),
                color: variant.color.clone(),
                price_cents: engine.unit_price(variant)?,
                currency: currency.to_string(),
                stock: variant.stock,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(ProductResponse {
        id: product.id,
        name: product.name,
        description: product.description,
        images: images.into_iter().map(|image| image.url).collect(),
        variants,
    })
}

/// GET /api/products
pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<ProductResponse>>, AppError> {
    let engine = state.markup.engine().await?;
    let products = state.products.list_products(true).await?;

    let response = products
        .into_iter()
        .map(|product| to_response(product, &engine, &state.currency))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(response))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<ProductResponse>, AppError> {
    let product = state
        .products
        .get_product(id)
        .await?
        .filter(|product| product.is_active)
        .ok_or_else(|| AppError::NotFound(format!("product {}", id)))?;

    let engine = state.markup.engine().await?;
    Ok(Json(to_response(product, &engine, &state.currency)?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products))
        .route("/api/products/{id}", get(get_product))
}
