//! Execution dispatcher: the administrative surface.
//!
//! The HTTP admin layer (out of scope here) calls these methods in-process.
//! Each write operation runs the matching state-machine transition under
//! the store's write guard, then routes the report to the owning session.
//! State commits whether or not the owner is connected; with no live
//! session the report is dropped with a warning and never replayed.
//! Errors go back to the caller only; they never become FIX messages.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::engine;
use crate::error::AdminError;
use crate::model::{ClOrdId, ExecIdSource, Execution, Order, SenderCompId};
use crate::session::{Outbound, SessionRegistry};
use crate::store::OrderStore;

pub struct ExecutionDispatcher {
    store: Arc<OrderStore>,
    registry: Arc<SessionRegistry>,
    exec_ids: Arc<ExecIdSource>,
}

impl ExecutionDispatcher {
    pub fn new(
        store: Arc<OrderStore>,
        registry: Arc<SessionRegistry>,
        exec_ids: Arc<ExecIdSource>,
    ) -> Self {
        Self {
            store,
            registry,
            exec_ids,
        }
    }

    /// Post a fill against an open order and push the report to its owner.
    pub async fn submit_fill(
        &self,
        id: &ClOrdId,
        qty: u64,
        price: Decimal,
    ) -> Result<(), AdminError> {
        let mut guard = self.store.update().await;
        let report = engine::admin_fill(&mut guard, id, qty, price, &self.exec_ids, Utc::now())?;
        let owner = guard.owner_of(id);
        info!(%id, qty, %price, exec_id = %report.exec_id, "fill applied");
        self.route(id, owner, Outbound::Exec(report));
        Ok(())
    }

    /// Cancel an open order administratively.
    pub async fn admin_cancel(&self, id: &ClOrdId) -> Result<(), AdminError> {
        let mut guard = self.store.update().await;
        let report = engine::admin_cancel(&mut guard, id, &self.exec_ids, Utc::now())?;
        let owner = guard.owner_of(id);
        info!(%id, "order canceled administratively");
        self.route(id, owner, Outbound::Exec(report));
        Ok(())
    }

    /// Reject a NEW order administratively.
    pub async fn admin_reject(&self, id: &ClOrdId, reason: &str) -> Result<(), AdminError> {
        let mut guard = self.store.update().await;
        let report = engine::admin_reject(&mut guard, id, reason, &self.exec_ids, Utc::now())?;
        let owner = guard.owner_of(id);
        info!(%id, reason, "order rejected administratively");
        self.route(id, owner, Outbound::Exec(report));
        Ok(())
    }

    /// All orders, in creation order.
    pub async fn list_orders(&self) -> Vec<Order> {
        self.store.list_orders().await
    }

    /// One order by ClOrdID.
    pub async fn get_order(&self, id: &ClOrdId) -> Option<Order> {
        self.store.get_order(id).await
    }

    /// All executions, in commit order.
    pub async fn list_executions(&self) -> Vec<Execution> {
        self.store.list_executions().await
    }

    /// Called while the store guard is still held so reports hit the
    /// session queue in commit order.
    fn route(&self, id: &ClOrdId, owner: Option<SenderCompId>, out: Outbound) {
        match owner {
            Some(owner) => {
                if !self.registry.send(&owner, out) {
                    warn!(%id, %owner, "owner has no live session, report dropped");
                }
            }
            None => warn!(%id, "order owner unknown, report dropped"),
        }
    }
}
