use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use sqlx::PgPool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::{gym_access::GymAccess, session::AppState};
use crate::api::start_of_day;
use crate::error::{AppError, Result};
use crate::models::{
    payment,
    product::{CreateProductData, Product, UpdateProductData},
    ticket::{Ticket, TicketWithItems},
};
use crate::services::{
    point_of_sale::{self, SaleRequest},
    roles::Permission,
};

#[derive(Deserialize)]
struct ProductQuery {
    #[serde(default)]
    include_inactive: bool,
}

#[derive(Debug, Deserialize)]
struct StockAdjustment {
    delta: i32,
    reason: Option<String>,
}

#[derive(Deserialize)]
struct TicketQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

async fn find_product(state: &AppState, gym_id: Uuid, product_id: Uuid) -> Result<Product> {
    Product::find(&state.pool, gym_id, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}

async fn list_products(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>> {
    GymAccess::load_active(&state, &session, gym_id, None).await?;

    let products = Product::list_by_gym(&state.pool, gym_id, query.include_inactive).await?;

    Ok(Json(products))
}

async fn create_product(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Json(mut data): Json<CreateProductData>,
) -> Result<(StatusCode, Json<Product>)> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageProducts)).await?;

    data.name = data.name.trim().to_string();
    data.validate().map_err(AppError::Validation)?;

    let product = Product::create(&state.pool, gym_id, data).await?;

    tracing::info!(gym_id = %gym_id, product_id = %product.id, "Product created");

    Ok((StatusCode::CREATED, Json(product)))
}

async fn get_product(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Product>> {
    GymAccess::load_active(&state, &session, gym_id, None).await?;
    Ok(Json(find_product(&state, gym_id, product_id).await?))
}

/// Stock is not editable here; it only moves through adjustments and sales
async fn update_product(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, product_id)): Path<(Uuid, Uuid)>,
    Json(data): Json<UpdateProductData>,
) -> Result<Json<Product>> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageProducts)).await?;

    if data.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("Product name cannot be empty".to_string()));
    }
    if data.price_cents.is_some_and(|p| !payment::is_valid_price(p)) {
        return Err(AppError::Validation(format!(
            "Price must be between 0 and {} cents",
            payment::MAX_AMOUNT_CENTS
        )));
    }
    if data.low_stock_threshold.is_some_and(|t| t < 0) {
        return Err(AppError::Validation(
            "Low stock threshold cannot be negative".to_string(),
        ));
    }

    let product = Product::update(&state.pool, gym_id, product_id, data)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    Ok(Json(product))
}

async fn ensure_deletable(pool: &PgPool, product_id: Uuid) -> Result<()> {
    let lines = Product::count_ticket_lines(pool, product_id).await?;
    if lines > 0 {
        return Err(AppError::Conflict(format!(
            "Product appears on {} sale line(s); deactivate it instead",
            lines
        )));
    }
    Ok(())
}

async fn delete_product(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageProducts)).await?;

    find_product(&state, gym_id, product_id).await?;

    ensure_deletable(&state.pool, product_id).await?;

    Product::delete(&state.pool, gym_id, product_id).await?;

    tracing::info!(gym_id = %gym_id, product_id = %product_id, "Product deleted");

    Ok(StatusCode::NO_CONTENT)
}

async fn adjust_stock(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, product_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<StockAdjustment>,
) -> Result<Json<Product>> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::ManageProducts)).await?;

    if req.delta == 0 {
        return Err(AppError::Validation("Delta must not be zero".to_string()));
    }

    let mut tx = state.pool.begin().await?;

    let current = Product::lock(&mut tx, gym_id, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    let product = Product::adjust_stock(&mut tx, product_id, req.delta)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "Only {} in stock, cannot remove {}",
                current.stock_quantity,
                req.delta.unsigned_abs()
            ))
        })?;

    tx.commit().await?;

    tracing::info!(
        gym_id = %gym_id,
        product_id = %product_id,
        delta = req.delta,
        stock = product.stock_quantity,
        reason = req.reason.as_deref().unwrap_or(""),
        user_id = %access.user_id(),
        "Stock adjusted"
    );

    if product.is_low_stock() {
        tracing::warn!(gym_id = %gym_id, product_id = %product_id, stock = product.stock_quantity, "Stock running low");
    }

    Ok(Json(product))
}

async fn create_ticket(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Json(req): Json<SaleRequest>,
) -> Result<(StatusCode, Json<TicketWithItems>)> {
    let access = GymAccess::load_active(&state, &session, gym_id, Some(Permission::SellProducts)).await?;

    let ticket = point_of_sale::sell(&state.pool, gym_id, access.user_id(), req).await?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn list_tickets(
    State(state): State<AppState>,
    session: Session,
    Path(gym_id): Path<Uuid>,
    Query(query): Query<TicketQuery>,
) -> Result<Json<Vec<Ticket>>> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::SellProducts)).await?;

    let from = query.from.map(start_of_day);
    let to = query.to.map(|to| start_of_day(to + Duration::days(1)));
    let tickets = Ticket::list(&state.pool, gym_id, from, to).await?;

    Ok(Json(tickets))
}

async fn get_ticket(
    State(state): State<AppState>,
    session: Session,
    Path((gym_id, ticket_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TicketWithItems>> {
    GymAccess::load_active(&state, &session, gym_id, Some(Permission::SellProducts)).await?;

    let ticket = Ticket::find_with_items(&state.pool, gym_id, ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

    Ok(Json(ticket))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/gyms/:gym_id/products",
            get(list_products).post(create_product),
        )
        .route(
            "/api/gyms/:gym_id/products/:product_id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route(
            "/api/gyms/:gym_id/products/:product_id/stock",
            post(adjust_stock),
        )
        .route(
            "/api/gyms/:gym_id/tickets",
            get(list_tickets).post(create_ticket),
        )
        .route("/api/gyms/:gym_id/tickets/:ticket_id", get(get_ticket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;
    use crate::services::point_of_sale::SaleLine;

    #[tokio::test]
    async fn test_sold_product_cannot_be_deleted() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let gym = test_support::gym(&pool).await;
        let water = test_support::product(&pool, gym.id, "Water", 10).await;

        assert!(ensure_deletable(&pool, water.id).await.is_ok());

        point_of_sale::sell(
            &pool,
            gym.id,
            Uuid::new_v4(),
            SaleRequest {
                items: vec![SaleLine {
                    product_id: water.id,
                    quantity: 1,
                }],
                member_id: None,
                payment_method: "cash".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            ensure_deletable(&pool, water.id).await,
            Err(AppError::Conflict(_))
        ));
    }
}
