use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    member::Member,
    payment,
    product::Product,
    ticket::{self, NewTicketItem, Ticket, TicketWithItems},
};

#[derive(thiserror::Error, Debug)]
pub enum SaleError {
    #[error("A sale needs at least one item")]
    EmptySale,

    #[error("Quantities must be positive")]
    InvalidQuantity,

    #[error("Sale total is too large")]
    AmountTooLarge,

    #[error("Unknown payment method: {0}")]
    InvalidPaymentMethod(String),

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Member not found: {0}")]
    MemberNotFound(Uuid),

    #[error("Product is no longer sold: {0}")]
    ProductInactive(String),

    #[error("Not enough stock for {name}: {available} available, {requested} requested")]
    InsufficientStock {
        name: String,
        available: i32,
        requested: i32,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaleLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaleRequest {
    pub items: Vec<SaleLine>,
    pub member_id: Option<Uuid>,
    pub payment_method: String,
}

/// Validates the lines and folds repeated products into one line.
/// The result is ordered by product id, which is also the order rows are
/// locked in, so concurrent sales of the same products cannot deadlock.
pub fn merge_lines(lines: &[SaleLine]) -> Result<Vec<SaleLine>, SaleError> {
    if lines.is_empty() {
        return Err(SaleError::EmptySale);
    }

    let mut merged: Vec<SaleLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(SaleError::InvalidQuantity);
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or(SaleError::InvalidQuantity)?
            }
            None => merged.push(line.clone()),
        }
    }

    merged.sort_by_key(|line| line.product_id);

    Ok(merged)
}

/// Records a sale: locks every product, checks stock, decrements it and
/// writes the ticket with price snapshots, all in one transaction.
pub async fn sell(
    pool: &PgPool,
    gym_id: Uuid,
    sold_by: Uuid,
    request: SaleRequest,
) -> Result<TicketWithItems, SaleError> {
    if !payment::is_valid_method(&request.payment_method) {
        return Err(SaleError::InvalidPaymentMethod(request.payment_method));
    }

    let lines = merge_lines(&request.items)?;

    if let Some(member_id) = request.member_id {
        Member::find(pool, gym_id, member_id)
            .await?
            .ok_or(SaleError::MemberNotFound(member_id))?;
    }

    let mut tx = pool.begin().await?;
    let mut items = Vec::with_capacity(lines.len());
    let mut low_stock = Vec::new();

    for line in &lines {
        let product = Product::lock(&mut tx, gym_id, line.product_id)
            .await?
            .ok_or(SaleError::ProductNotFound(line.product_id))?;

        if !product.is_active {
            return Err(SaleError::ProductInactive(product.name));
        }

        let item = NewTicketItem::new(product.id, product.name.clone(), line.quantity, product.price_cents)
            .ok_or(SaleError::AmountTooLarge)?;

        let updated = Product::adjust_stock(&mut tx, product.id, -line.quantity)
            .await?
            .ok_or(SaleError::InsufficientStock {
                name: product.name,
                available: product.stock_quantity,
                requested: line.quantity,
            })?;

        if updated.is_low_stock() {
            low_stock.push(updated.name);
        }
        items.push(item);
    }

    let total_cents = ticket::total_cents(&items).ok_or(SaleError::AmountTooLarge)?;

    let ticket = Ticket::create(
        &mut tx,
        gym_id,
        request.member_id,
        &request.payment_method,
        sold_by,
        &items,
        total_cents,
    )
    .await?;

    tx.commit().await?;

    if !low_stock.is_empty() {
        tracing::warn!(gym_id = %gym_id, products = ?low_stock, "Stock running low");
    }

    tracing::info!(
        gym_id = %gym_id,
        ticket_id = %ticket.ticket.id,
        total_cents = ticket.ticket.total_cents,
        lines = ticket.items.len(),
        "Sale recorded"
    );

    Ok(ticket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support;

    fn line(product_id: Uuid, quantity: i32) -> SaleLine {
        SaleLine {
            product_id,
            quantity,
        }
    }

    #[test]
    fn test_merge_folds_duplicates() {
        let water = Uuid::new_v4();
        let bar = Uuid::new_v4();

        let merged = merge_lines(&[line(water, 2), line(bar, 1), line(water, 3)]).unwrap();

        assert_eq!(merged.len(), 2);
        let water_line = merged.iter().find(|l| l.product_id == water).unwrap();
        let bar_line = merged.iter().find(|l| l.product_id == bar).unwrap();
        assert_eq!(water_line.quantity, 5);
        assert_eq!(bar_line.quantity, 1);
    }

    #[test]
    fn test_merge_orders_lines_by_product_regardless_of_input_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let forward: Vec<Uuid> = merge_lines(&[line(a, 1), line(b, 1)])
            .unwrap()
            .iter()
            .map(|l| l.product_id)
            .collect();
        let backward: Vec<Uuid> = merge_lines(&[line(b, 1), line(a, 1)])
            .unwrap()
            .iter()
            .map(|l| l.product_id)
            .collect();

        assert_eq!(forward, backward);
        assert!(forward[0] < forward[1]);
    }

    #[test]
    fn test_empty_sale_rejected() {
        assert!(matches!(merge_lines(&[]), Err(SaleError::EmptySale)));
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let id = Uuid::new_v4();
        assert!(matches!(
            merge_lines(&[line(id, 0)]),
            Err(SaleError::InvalidQuantity)
        ));
        assert!(matches!(
            merge_lines(&[line(id, 2), line(id, -1)]),
            Err(SaleError::InvalidQuantity)
        ));
    }

    #[tokio::test]
    async fn test_opposite_order_sales_do_not_deadlock() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let gym = test_support::gym(&pool).await;
        let a = test_support::product(&pool, gym.id, "Water", 1000).await;
        let b = test_support::product(&pool, gym.id, "Protein bar", 1000).await;

        let (gym_id, a_id, b_id) = (gym.id, a.id, b.id);
        let mut sales = Vec::new();
        for i in 0..40 {
            let pool = pool.clone();
            let items = if i % 2 == 0 {
                vec![line(a_id, 1), line(b_id, 1)]
            } else {
                vec![line(b_id, 1), line(a_id, 1)]
            };
            sales.push(tokio::spawn(async move {
                sell(
                    &pool,
                    gym_id,
                    Uuid::new_v4(),
                    SaleRequest {
                        items,
                        member_id: None,
                        payment_method: "cash".to_string(),
                    },
                )
                .await
            }));
        }

        for sale in sales {
            let ticket = sale.await.unwrap().unwrap();
            assert_eq!(ticket.ticket.total_cents, 500);
        }

        let a = Product::find(&pool, gym.id, a.id).await.unwrap().unwrap();
        let b = Product::find(&pool, gym.id, b.id).await.unwrap().unwrap();
        assert_eq!(a.stock_quantity, 960);
        assert_eq!(b.stock_quantity, 960);
    }

    #[tokio::test]
    async fn test_sale_beyond_stock_is_refused() {
        let Some(pool) = test_support::pool().await else {
            return;
        };
        let gym = test_support::gym(&pool).await;
        let shaker = test_support::product(&pool, gym.id, "Shaker", 2).await;

        let result = sell(
            &pool,
            gym.id,
            Uuid::new_v4(),
            SaleRequest {
                items: vec![line(shaker.id, 3)],
                member_id: None,
                payment_method: "card".to_string(),
            },
        )
        .await;

        assert!(matches!(result, Err(SaleError::InsufficientStock { available: 2, .. })));
        let shaker = Product::find(&pool, gym.id, shaker.id).await.unwrap().unwrap();
        assert_eq!(shaker.stock_quantity, 2);
    }
}
