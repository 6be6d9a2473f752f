use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guildhall_core::repository::{OrderRepository, RepoResult};
use guildhall_shared::{Order, OrderItem, OrderStatus, OrderStatusChangedEvent, ShippingAddress, Tracking};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

pub struct StoreOrderRepository {
    pool: PgPool,
}

impl StoreOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> RepoResult<Vec<OrderItem>> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT id, order_id, product_id, variant_id, sku, name, quantity, unit_price_cents \
             FROM order_items WHERE order_id = ANY($1) ORDER BY sku",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> RepoResult<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in self.load_items(&ids).await? {
            by_order.entry(item.order_id).or_default().push(item);
        }

        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    total_cents: i64,
    currency: String,
    shipping_address: Json<ShippingAddress>,
    payment_session_id: String,
    fulfillment_reference: Option<String>,
    tracking_carrier: Option<String>,
    tracking_number: Option<String>,
    tracking_url: Option<String>,
    shipped_at: Option<DateTime<Utc>>,
    needs_attention: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> RepoResult<Order> {
        let status: OrderStatus = self.status.parse()?;
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            status,
            items,
            total_cents: self.total_cents,
            currency: self.currency,
            shipping_address: self.shipping_address.0,
            payment_session_id: self.payment_session_id,
            fulfillment_reference: self.fulfillment_reference,
            tracking: Tracking {
                carrier: self.tracking_carrier,
                number: self.tracking_number,
                url: self.tracking_url,
                shipped_at: self.shipped_at,
            },
            needs_attention: self.needs_attention,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Uuid,
    sku: String,
    name: String,
    quantity: i32,
    unit_price_cents: i64,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            sku: row.sku,
            name: row.name,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderChangeRow {
    order_id: Uuid,
    from_status: Option<String>,
    to_status: String,
    source: String,
    occurred_at: DateTime<Utc>,
}

const ORDER_COLUMNS: &str = "id, user_id, status, total_cents, currency, shipping_address, payment_session_id, \
     fulfillment_reference, tracking_carrier, tracking_number, tracking_url, shipped_at, needs_attention, \
     created_at, updated_at";

#[async_trait]
impl OrderRepository for StoreOrderRepository {
    async fn create_order(&self, order: &Order) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_cents, currency, shipping_address, payment_session_id,
                                needs_attention, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (payment_session_id) DO NOTHING
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status.as_str())
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(Json(&order.shipping_address))
        .bind(&order.payment_session_id)
        .bind(&order.needs_attention)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, variant_id, sku, name, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(&item.sku)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_payment_session(&self, session_id: &str) -> RepoResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE payment_session_id = $1",
            ORDER_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, user_id: Option<Uuid>) -> RepoResult<Vec<Order>> {
        let rows: Vec<OrderRow> = match user_id {
            Some(user_id) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
                    ORDER_COLUMNS
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!("SELECT {} FROM orders ORDER BY created_at DESC", ORDER_COLUMNS))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        self.hydrate(rows).await
    }

    async fn save_order(&self, order: &Order, expected: OrderStatus) -> RepoResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, tracking_carrier = $3, tracking_number = $4, tracking_url = $5,
                shipped_at = $6, needs_attention = $7, updated_at = $8
            WHERE id = $1 AND status = $9
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(&order.tracking.carrier)
        .bind(&order.tracking.number)
        .bind(&order.tracking.url)
        .bind(order.tracking.shipped_at)
        .bind(&order.needs_attention)
        .bind(order.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn set_fulfillment_reference(&self, id: Uuid, reference: &str) -> RepoResult<()> {
        sqlx::query("UPDATE orders SET fulfillment_reference = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(reference)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn add_order_change(&self, change: &OrderStatusChangedEvent) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO order_changes (order_id, from_status, to_status, source, occurred_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(change.order_id)
        .bind(change.from.map(|s| s.as_str()))
        .bind(change.to.as_str())
        .bind(&change.source)
        .bind(change.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_order_changes(&self, order_id: Uuid) -> RepoResult<Vec<OrderStatusChangedEvent>> {
        let rows: Vec<OrderChangeRow> = sqlx::query_as(
            "SELECT order_id, from_status, to_status, source, occurred_at FROM order_changes \
             WHERE order_id = $1 ORDER BY occurred_at, id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> RepoResult<OrderStatusChangedEvent> {
                let from = row.from_status.map(|s| s.parse::<OrderStatus>()).transpose()?;
                Ok(OrderStatusChangedEvent {
                    order_id: row.order_id,
                    from,
                    to: row.to_status.parse()?,
                    source: row.source,
                    occurred_at: row.occurred_at,
                })
            })
            .collect()
    }
}
