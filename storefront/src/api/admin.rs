//! Operator endpoints: order listing and status, stock adjustment

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    middleware,
    routing::{get, patch, put},
};
use serde::Deserialize;
use shared::models::{Order, OrderStatus, Product, StockAdjustment};

use crate::auth::AdminIdentity;
use crate::auth::admin_auth::admin_auth_middleware;
use crate::state::AppState;
use crate::store::OrderFilter;

use super::ApiResult;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/orders", get(list_orders))
        .route("/admin/orders/{id}", get(get_order))
        .route("/admin/orders/{id}/status", patch(update_status))
        .route("/admin/products/{id}/stock", put(adjust_stock))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
}

/// GET /admin/orders?status=&limit=&offset=
pub async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> ApiResult<Vec<Order>> {
    let orders = state.workflow.list_orders(&filter).await?;
    Ok(Json(orders))
}

/// GET /admin/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    Ok(Json(state.workflow.get_order(&order_id).await?))
}

/// PATCH /admin/orders/{id}/status
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(identity): Extension<AdminIdentity>,
    Path(order_id): Path<String>,
    Json(req): Json<StatusUpdateRequest>,
) -> ApiResult<Order> {
    let order = state.workflow.update_status(&order_id, req.status).await?;
    tracing::info!(admin_id = %identity.admin_id, order_id = %order.id, status = %order.status, "Admin status change");
    Ok(Json(order))
}

/// PUT /admin/products/{id}/stock
pub async fn adjust_stock(
    State(state): State<AppState>,
    Extension(identity): Extension<AdminIdentity>,
    Path(product_id): Path<String>,
    Json(req): Json<StockAdjustment>,
) -> ApiResult<Product> {
    let product = state.workflow.adjust_stock(&product_id, &req).await?;
    tracing::info!(admin_id = %identity.admin_id, product_id = %product.id, "Admin stock adjustment");
    Ok(Json(product))
}
