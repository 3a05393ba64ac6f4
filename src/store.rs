//! Authoritative order and execution store.
//!
//! One process-wide [`OrderStore`] is shared by every session and the admin
//! dispatcher. All mutation happens through a single write guard obtained
//! with [`OrderStore::update`]; callers run a state-machine transition and
//! enqueue the resulting report while still holding the guard, so no client
//! ever observes a half-applied execution and per-order report order equals
//! commit order.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::model::{ClOrdId, Execution, Order, SenderCompId};

/// Errors raised by store insertion.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("duplicate ClOrdID: {0}")]
    DuplicateClOrdId(ClOrdId),
}

/// The mutable interior of the store. Only reachable through a lock guard.
#[derive(Debug, Default)]
pub struct StoreInner {
    orders: HashMap<ClOrdId, Order>,
    /// Creation order, for stable admin listings.
    arrival: Vec<ClOrdId>,
    executions: Vec<Execution>,
}

impl StoreInner {
    /// Insert a new order. ClOrdIDs are unique process-wide.
    pub fn insert(&mut self, order: Order) -> Result<(), StoreError> {
        if self.orders.contains_key(&order.cl_ord_id) {
            return Err(StoreError::DuplicateClOrdId(order.cl_ord_id.clone()));
        }
        self.arrival.push(order.cl_ord_id.clone());
        self.orders.insert(order.cl_ord_id.clone(), order);
        Ok(())
    }

    pub fn contains(&self, id: &ClOrdId) -> bool {
        self.orders.contains_key(id)
    }

    pub fn get(&self, id: &ClOrdId) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn get_mut(&mut self, id: &ClOrdId) -> Option<&mut Order> {
        self.orders.get_mut(id)
    }

    /// Session identity that owns an order.
    pub fn owner_of(&self, id: &ClOrdId) -> Option<SenderCompId> {
        self.orders.get(id).map(|o| o.sender_comp_id.clone())
    }

    /// Append an execution record. Executions are immutable once written.
    pub fn record_execution(&mut self, exec: Execution) {
        self.executions.push(exec);
    }

    /// All orders in creation order.
    pub fn orders(&self) -> Vec<Order> {
        self.arrival
            .iter()
            .filter_map(|id| self.orders.get(id))
            .cloned()
            .collect()
    }

    /// All executions in commit order.
    pub fn executions(&self) -> Vec<Execution> {
        self.executions.clone()
    }

    /// Executions recorded against one order.
    pub fn executions_for(&self, id: &ClOrdId) -> Vec<Execution> {
        self.executions
            .iter()
            .filter(|e| &e.cl_ord_id == id)
            .cloned()
            .collect()
    }
}

/// Shared, lock-guarded order store.
#[derive(Debug, Default)]
pub struct OrderStore {
    inner: RwLock<StoreInner>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write guard for a transition. Hold it across the state
    /// change and the report enqueue, then drop it; never across socket I/O.
    pub async fn update(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().await
    }

    /// Read-only snapshot of all orders, in creation order.
    pub async fn list_orders(&self) -> Vec<Order> {
        self.inner.read().await.orders()
    }

    /// Read-only lookup of one order.
    pub async fn get_order(&self, id: &ClOrdId) -> Option<Order> {
        self.inner.read().await.get(id).cloned()
    }

    /// Read-only snapshot of all executions, in commit order.
    pub async fn list_executions(&self) -> Vec<Execution> {
        self.inner.read().await.executions()
    }

    /// Read-only snapshot of one order's executions.
    pub async fn executions_for(&self, id: &ClOrdId) -> Vec<Execution> {
        self.inner.read().await.executions_for(id)
    }

    /// Owning session identity for an order, if the order exists.
    pub async fn owner_of(&self, id: &ClOrdId) -> Option<SenderCompId> {
        self.inner.read().await.owner_of(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecId, ExecType, OrdType, OrderStatus, Side, TimeInForce};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn order(id: &str) -> Order {
        let now = Utc::now();
        Order {
            cl_ord_id: id.into(),
            orig_cl_ord_id: None,
            sender_comp_id: "CLIENT1".into(),
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            order_type: OrdType::Market,
            quantity: 100,
            limit_price: None,
            time_in_force: TimeInForce::Day,
            status: OrderStatus::New,
            filled_quantity: 0,
            avg_px: Decimal::ZERO,
            reject_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut inner = StoreInner::default();
        inner.insert(order("A")).unwrap();

        assert!(inner.contains(&"A".into()));
        assert_eq!(inner.get(&"A".into()).unwrap().symbol, "AAPL");
        assert_eq!(inner.owner_of(&"A".into()), Some("CLIENT1".into()));
        assert_eq!(inner.owner_of(&"B".into()), None);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut inner = StoreInner::default();
        inner.insert(order("A")).unwrap();
        assert!(matches!(
            inner.insert(order("A")),
            Err(StoreError::DuplicateClOrdId(_))
        ));
        assert_eq!(inner.orders().len(), 1);
    }

    #[test]
    fn test_listing_preserves_creation_order() {
        let mut inner = StoreInner::default();
        for id in ["C", "A", "B"] {
            inner.insert(order(id)).unwrap();
        }
        let ids: Vec<String> = inner.orders().iter().map(|o| o.cl_ord_id.0.clone()).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_executions_filtered_per_order() {
        let mut inner = StoreInner::default();
        inner.insert(order("A")).unwrap();
        inner.insert(order("B")).unwrap();
        for (n, id) in [(1u64, "A"), (2, "B"), (3, "A")] {
            inner.record_execution(Execution {
                exec_id: ExecId(format!("E{n:08}")),
                cl_ord_id: id.into(),
                exec_type: ExecType::PartialFill,
                exec_quantity: 10,
                exec_price: dec!(1),
                executed_at: Utc::now(),
            });
        }
        assert_eq!(inner.executions().len(), 3);
        assert_eq!(inner.executions_for(&"A".into()).len(), 2);
        assert_eq!(inner.executions_for(&"B".into()).len(), 1);
    }

    #[tokio::test]
    async fn test_async_views() {
        let store = OrderStore::new();
        store.update().await.insert(order("A")).unwrap();

        assert_eq!(store.list_orders().await.len(), 1);
        assert!(store.get_order(&"A".into()).await.is_some());
        assert_eq!(store.owner_of(&"A".into()).await, Some("CLIENT1".into()));
        assert!(store.list_executions().await.is_empty());
    }
}
