//! Order state machine.
//!
//! Every inbound order event (NewOrderSingle, OrderCancelRequest,
//! OrderCancelReplaceRequest) and every administrative event (fill, cancel,
//! reject) funnels through the functions here. Each function validates the
//! event against the current order state, mutates the store, records the
//! execution, and returns the payload to put on the wire. Callers hold the
//! store's write guard for the whole call, so transitions and their reports
//! commit atomically and in order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::AdminError;
use crate::model::{
    ClOrdId, ExecId, ExecIdSource, ExecType, Execution, OrdType, Order, OrderStatus,
    SenderCompId, Side, TimeInForce,
};
use crate::store::StoreInner;

/// Payload of an outbound ExecutionReport (MsgType `8`). The session layer
/// turns this into wire fields; everything here is already decided.
#[derive(Debug, Clone)]
pub struct ExecReport {
    pub cl_ord_id: ClOrdId,
    pub orig_cl_ord_id: Option<ClOrdId>,
    pub exec_id: ExecId,
    pub exec_type: ExecType,
    pub ord_status: OrderStatus,
    pub symbol: String,
    pub side: Option<Side>,
    pub order_type: Option<OrdType>,
    pub order_qty: u64,
    pub price: Option<Decimal>,
    pub last_qty: Option<u64>,
    pub last_px: Option<Decimal>,
    pub cum_qty: u64,
    pub avg_px: Decimal,
    pub leaves_qty: u64,
    pub text: Option<String>,
}

/// Reason code for an OrderCancelReject (tag 434).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CxlRejReason {
    TooLate,
    UnknownOrder,
}

impl CxlRejReason {
    pub fn to_fix(self) -> char {
        match self {
            CxlRejReason::TooLate => '0',
            CxlRejReason::UnknownOrder => '1',
        }
    }
}

/// Payload of an outbound OrderCancelReject (MsgType `9`).
#[derive(Debug, Clone)]
pub struct CancelReject {
    pub cl_ord_id: ClOrdId,
    pub orig_cl_ord_id: ClOrdId,
    pub reason: CxlRejReason,
    pub text: String,
}

/// A NewOrderSingle as extracted from the wire, before validation. Raw
/// characters are kept so validation failures can name the offending field.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub cl_ord_id: String,
    pub symbol: String,
    pub side: Option<char>,
    pub ord_type: Option<char>,
    pub quantity: Option<u64>,
    pub price: Option<Decimal>,
    pub time_in_force: Option<char>,
}

/// An OrderCancelRequest as extracted from the wire.
#[derive(Debug, Clone)]
pub struct CancelRequest {
    pub cl_ord_id: String,
    pub orig_cl_ord_id: String,
}

/// An OrderCancelReplaceRequest as extracted from the wire. Absent fields
/// inherit from the original order.
#[derive(Debug, Clone)]
pub struct ReplaceRequest {
    pub cl_ord_id: String,
    pub orig_cl_ord_id: String,
    pub quantity: Option<u64>,
    pub price: Option<Decimal>,
}

/// E1: process a NewOrderSingle.
///
/// Validation failures produce a Rejected report and store nothing; on
/// success the order is inserted as NEW and an ExecType=New report returned.
pub fn submit_order(
    inner: &mut StoreInner,
    req: NewOrderRequest,
    sender: &SenderCompId,
    exec_ids: &ExecIdSource,
    now: DateTime<Utc>,
) -> ExecReport {
    let reject = |text: String, exec_id: ExecId| ExecReport {
        cl_ord_id: ClOrdId(req.cl_ord_id.clone()),
        orig_cl_ord_id: None,
        exec_id,
        exec_type: ExecType::Rejected,
        ord_status: OrderStatus::Rejected,
        symbol: req.symbol.clone(),
        side: req.side.and_then(Side::from_fix),
        order_type: req.ord_type.and_then(OrdType::from_fix),
        order_qty: req.quantity.unwrap_or(0),
        price: req.price,
        last_qty: None,
        last_px: None,
        cum_qty: 0,
        avg_px: Decimal::ZERO,
        leaves_qty: 0,
        text: Some(text),
    };

    let (side, ord_type, quantity, tif) = match validate_new_order(inner, &req) {
        Ok(parsed) => parsed,
        Err(text) => return reject(text, exec_ids.next()),
    };

    let order = Order {
        cl_ord_id: ClOrdId(req.cl_ord_id.clone()),
        orig_cl_ord_id: None,
        sender_comp_id: sender.clone(),
        symbol: req.symbol.clone(),
        side,
        order_type: ord_type,
        quantity,
        limit_price: req.price,
        time_in_force: tif,
        status: OrderStatus::New,
        filled_quantity: 0,
        avg_px: Decimal::ZERO,
        reject_reason: None,
        created_at: now,
        updated_at: now,
    };
    let report = build_report(&order, exec_ids.next(), ExecType::New, None, None);
    if let Err(err) = inner.insert(order) {
        return reject(err.to_string(), report.exec_id);
    }
    record(inner, &report, now);
    report
}

/// Returns the parsed (side, type, quantity, TIF) or the reject Text.
fn validate_new_order(
    inner: &StoreInner,
    req: &NewOrderRequest,
) -> Result<(Side, OrdType, u64, TimeInForce), String> {
    if req.cl_ord_id.is_empty() {
        return Err("ClOrdID required".to_string());
    }
    if req.symbol.is_empty() {
        return Err("Symbol required".to_string());
    }
    let side = req
        .side
        .and_then(Side::from_fix)
        .ok_or_else(|| "Unknown side".to_string())?;
    let ord_type = req
        .ord_type
        .and_then(OrdType::from_fix)
        .ok_or_else(|| "Unknown order type".to_string())?;
    let quantity = match req.quantity {
        Some(q) if q > 0 => q,
        _ => return Err("OrderQty must be a positive integer".to_string()),
    };
    if ord_type.requires_price() {
        match req.price {
            Some(p) if p > Decimal::ZERO => {}
            _ => return Err(format!("{ord_type} order requires a positive price")),
        }
    }
    let tif = match req.time_in_force {
        None => TimeInForce::default(),
        Some(c) => TimeInForce::from_fix(c).ok_or_else(|| "Unknown TimeInForce".to_string())?,
    };
    if inner.contains(&ClOrdId(req.cl_ord_id.clone())) {
        return Err("Duplicate ClOrdID".to_string());
    }
    Ok((side, ord_type, quantity, tif))
}

/// E2: administrative fill against an open order.
pub fn admin_fill(
    inner: &mut StoreInner,
    id: &ClOrdId,
    qty: u64,
    price: Decimal,
    exec_ids: &ExecIdSource,
    now: DateTime<Utc>,
) -> Result<ExecReport, AdminError> {
    let order = inner.get_mut(id).ok_or_else(|| AdminError::NotFound(id.clone()))?;
    if qty == 0 {
        return Err(AdminError::BadState {
            cl_ord_id: id.clone(),
            status: order.status,
            detail: "fill quantity must be positive".to_string(),
        });
    }
    if !order.status.can_fill() {
        return Err(AdminError::BadState {
            cl_ord_id: id.clone(),
            status: order.status,
            detail: "order is not open".to_string(),
        });
    }
    if qty > order.remaining_quantity() {
        return Err(AdminError::Overfill {
            cl_ord_id: id.clone(),
            fill_qty: qty,
            remaining: order.remaining_quantity(),
        });
    }
    // FOK orders fill in one piece or not at all.
    if order.time_in_force == TimeInForce::Fok && qty != order.remaining_quantity() {
        return Err(AdminError::BadState {
            cl_ord_id: id.clone(),
            status: order.status,
            detail: "FOK order must be filled completely".to_string(),
        });
    }

    let exec_type = order
        .apply_fill(qty, price, now)
        .map_err(AdminError::from_transition)?;
    let report = build_report(order, exec_ids.next(), exec_type, Some((qty, price)), None);
    record(inner, &report, now);
    Ok(report)
}

/// E3: administrative cancel.
pub fn admin_cancel(
    inner: &mut StoreInner,
    id: &ClOrdId,
    exec_ids: &ExecIdSource,
    now: DateTime<Utc>,
) -> Result<ExecReport, AdminError> {
    let order = inner.get_mut(id).ok_or_else(|| AdminError::NotFound(id.clone()))?;
    if !order.status.can_fill() {
        return Err(AdminError::BadState {
            cl_ord_id: id.clone(),
            status: order.status,
            detail: "order is not open".to_string(),
        });
    }
    order.cancel(now).map_err(AdminError::from_transition)?;
    let report = build_report(order, exec_ids.next(), ExecType::Canceled, None, None);
    record(inner, &report, now);
    Ok(report)
}

/// E4: administrative reject, permitted only while the order is NEW.
pub fn admin_reject(
    inner: &mut StoreInner,
    id: &ClOrdId,
    reason: &str,
    exec_ids: &ExecIdSource,
    now: DateTime<Utc>,
) -> Result<ExecReport, AdminError> {
    let order = inner.get_mut(id).ok_or_else(|| AdminError::NotFound(id.clone()))?;
    if order.status != OrderStatus::New {
        return Err(AdminError::BadState {
            cl_ord_id: id.clone(),
            status: order.status,
            detail: "only NEW orders can be rejected".to_string(),
        });
    }
    order.reject(reason, now).map_err(AdminError::from_transition)?;
    let report = build_report(
        order,
        exec_ids.next(),
        ExecType::Rejected,
        None,
        Some(reason.to_string()),
    );
    record(inner, &report, now);
    Ok(report)
}

/// E5: client OrderCancelRequest.
///
/// The report echoes the cancel's own ClOrdID in tag 11 and the canceled
/// order's id in tag 41.
pub fn cancel_request(
    inner: &mut StoreInner,
    req: CancelRequest,
    exec_ids: &ExecIdSource,
    now: DateTime<Utc>,
) -> Result<ExecReport, CancelReject> {
    let orig = ClOrdId(req.orig_cl_ord_id.clone());
    let order = match inner.get_mut(&orig) {
        Some(o) => o,
        None => {
            return Err(CancelReject {
                cl_ord_id: ClOrdId(req.cl_ord_id),
                orig_cl_ord_id: orig,
                reason: CxlRejReason::UnknownOrder,
                text: "Order not found".to_string(),
            })
        }
    };
    if order.status.is_terminal() {
        return Err(CancelReject {
            cl_ord_id: ClOrdId(req.cl_ord_id),
            orig_cl_ord_id: orig,
            reason: CxlRejReason::TooLate,
            text: format!("Order already {}", order.status),
        });
    }

    // Infallible after the terminal check, but keep the transition honest.
    if let Err(err) = order.cancel(now) {
        return Err(CancelReject {
            cl_ord_id: ClOrdId(req.cl_ord_id),
            orig_cl_ord_id: orig,
            reason: CxlRejReason::TooLate,
            text: err.to_string(),
        });
    }

    let mut report = build_report(order, exec_ids.next(), ExecType::Canceled, None, None);
    report.cl_ord_id = ClOrdId(req.cl_ord_id);
    report.orig_cl_ord_id = Some(orig);
    record(inner, &report, now);
    Ok(report)
}

/// E6: client OrderCancelReplaceRequest.
///
/// Creates a new order record carrying the original's fills forward and
/// retires the old record as REPLACED. Fields absent from the request
/// inherit from the original.
pub fn replace_request(
    inner: &mut StoreInner,
    req: ReplaceRequest,
    exec_ids: &ExecIdSource,
    now: DateTime<Utc>,
) -> Result<ExecReport, CancelReject> {
    let orig_id = ClOrdId(req.orig_cl_ord_id.clone());
    let new_id = ClOrdId(req.cl_ord_id.clone());

    let reject = |reason: CxlRejReason, text: String| CancelReject {
        cl_ord_id: new_id.clone(),
        orig_cl_ord_id: orig_id.clone(),
        reason,
        text,
    };

    let original = match inner.get(&orig_id) {
        Some(o) => o.clone(),
        None => {
            return Err(reject(
                CxlRejReason::UnknownOrder,
                "Order not found".to_string(),
            ))
        }
    };
    if original.status.is_terminal() {
        return Err(reject(
            CxlRejReason::TooLate,
            format!("Order already {}", original.status),
        ));
    }
    if inner.contains(&new_id) {
        return Err(reject(CxlRejReason::TooLate, "Duplicate ClOrdID".to_string()));
    }

    let new_qty = req.quantity.unwrap_or(original.quantity);
    if new_qty == 0 {
        return Err(reject(
            CxlRejReason::TooLate,
            "OrderQty must be a positive integer".to_string(),
        ));
    }
    if new_qty < original.filled_quantity {
        return Err(reject(
            CxlRejReason::TooLate,
            "New quantity below filled".to_string(),
        ));
    }

    let status = if original.filled_quantity == 0 {
        OrderStatus::New
    } else if original.filled_quantity < new_qty {
        OrderStatus::PartiallyFilled
    } else {
        OrderStatus::Filled
    };

    let replacement = Order {
        cl_ord_id: new_id.clone(),
        orig_cl_ord_id: Some(orig_id.clone()),
        sender_comp_id: original.sender_comp_id.clone(),
        symbol: original.symbol.clone(),
        side: original.side,
        order_type: original.order_type,
        quantity: new_qty,
        limit_price: req.price.or(original.limit_price),
        time_in_force: original.time_in_force,
        status,
        filled_quantity: original.filled_quantity,
        avg_px: original.avg_px,
        reject_reason: None,
        created_at: now,
        updated_at: now,
    };

    match inner.get_mut(&orig_id) {
        Some(o) => {
            if let Err(err) = o.mark_replaced(now) {
                return Err(reject(CxlRejReason::TooLate, err.to_string()));
            }
        }
        None => {
            return Err(reject(
                CxlRejReason::UnknownOrder,
                "Order not found".to_string(),
            ))
        }
    }

    let report = build_report(&replacement, exec_ids.next(), ExecType::Replaced, None, None);
    if let Err(err) = inner.insert(replacement) {
        return Err(reject(CxlRejReason::TooLate, err.to_string()));
    }
    record(inner, &report, now);
    Ok(report)
}

/// Snapshot an order into a report. LeavesQty is zeroed for terminal
/// non-filled states (the record keeps the audit value).
fn build_report(
    order: &Order,
    exec_id: ExecId,
    exec_type: ExecType,
    last: Option<(u64, Decimal)>,
    text: Option<String>,
) -> ExecReport {
    let leaves_qty = match order.status {
        OrderStatus::Canceled | OrderStatus::Replaced | OrderStatus::Rejected => 0,
        _ => order.remaining_quantity(),
    };
    ExecReport {
        cl_ord_id: order.cl_ord_id.clone(),
        orig_cl_ord_id: order.orig_cl_ord_id.clone(),
        exec_id,
        exec_type,
        ord_status: order.status,
        symbol: order.symbol.clone(),
        side: Some(order.side),
        order_type: Some(order.order_type),
        order_qty: order.quantity,
        price: order.limit_price,
        last_qty: last.map(|(q, _)| q),
        last_px: last.map(|(_, p)| p),
        cum_qty: order.filled_quantity,
        avg_px: order.avg_px,
        leaves_qty,
        text,
    }
}

/// Persist the execution row matching a report.
fn record(inner: &mut StoreInner, report: &ExecReport, now: DateTime<Utc>) {
    inner.record_execution(Execution {
        exec_id: report.exec_id.clone(),
        cl_ord_id: report.cl_ord_id.clone(),
        exec_type: report.exec_type,
        exec_quantity: report.last_qty.unwrap_or(0),
        exec_price: report.last_px.unwrap_or(Decimal::ZERO),
        executed_at: now,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ids() -> ExecIdSource {
        ExecIdSource::new()
    }

    fn sender() -> SenderCompId {
        "TEST_CLIENT".into()
    }

    fn market_order(id: &str, qty: u64) -> NewOrderRequest {
        NewOrderRequest {
            cl_ord_id: id.to_string(),
            symbol: "AAPL".to_string(),
            side: Some('1'),
            ord_type: Some('1'),
            quantity: Some(qty),
            price: None,
            time_in_force: Some('0'),
        }
    }

    fn limit_order(id: &str, qty: u64, price: Decimal) -> NewOrderRequest {
        NewOrderRequest {
            price: Some(price),
            ord_type: Some('2'),
            ..market_order(id, qty)
        }
    }

    fn submit(inner: &mut StoreInner, req: NewOrderRequest, exec_ids: &ExecIdSource) -> ExecReport {
        submit_order(inner, req, &sender(), exec_ids, Utc::now())
    }

    #[test]
    fn test_new_order_accepted() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();

        let report = submit(&mut inner, market_order("A", 100), &exec_ids);
        assert_eq!(report.exec_type, ExecType::New);
        assert_eq!(report.ord_status, OrderStatus::New);
        assert_eq!(report.cum_qty, 0);
        assert_eq!(report.leaves_qty, 100);
        assert_eq!(report.avg_px, Decimal::ZERO);

        let stored = inner.get(&"A".into()).unwrap();
        assert_eq!(stored.status, OrderStatus::New);
        assert_eq!(stored.time_in_force, TimeInForce::Day);
        assert_eq!(inner.executions_for(&"A".into()).len(), 1);
    }

    #[test]
    fn test_limit_without_price_rejected() {
        let mut inner = StoreInner::default();
        let mut req = limit_order("A", 100, dec!(1));
        req.price = None;

        let report = submit(&mut inner, req, &ids());
        assert_eq!(report.exec_type, ExecType::Rejected);
        assert_eq!(report.ord_status, OrderStatus::Rejected);
        assert!(report.text.as_deref().unwrap().contains("price"));
        assert!(!inner.contains(&"A".into()));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut inner = StoreInner::default();
        let report = submit(&mut inner, market_order("A", 0), &ids());
        assert_eq!(report.exec_type, ExecType::Rejected);
        assert!(!inner.contains(&"A".into()));
    }

    #[test]
    fn test_empty_symbol_rejected() {
        let mut inner = StoreInner::default();
        let mut req = market_order("A", 10);
        req.symbol.clear();
        let report = submit(&mut inner, req, &ids());
        assert_eq!(report.exec_type, ExecType::Rejected);
    }

    #[test]
    fn test_unknown_tif_rejected() {
        let mut inner = StoreInner::default();
        let mut req = market_order("A", 10);
        req.time_in_force = Some('7');
        let report = submit(&mut inner, req, &ids());
        assert_eq!(report.exec_type, ExecType::Rejected);
        assert!(report.text.as_deref().unwrap().contains("TimeInForce"));
    }

    #[test]
    fn test_duplicate_cl_ord_id_rejected() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, market_order("A", 10), &exec_ids);
        let report = submit(&mut inner, market_order("A", 10), &exec_ids);
        assert_eq!(report.exec_type, ExecType::Rejected);
        assert!(report.text.as_deref().unwrap().contains("Duplicate"));
    }

    #[test]
    fn test_fill_sequence_partial_then_full() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, market_order("A", 100), &exec_ids);

        let r1 = admin_fill(&mut inner, &"A".into(), 30, dec!(167.25), &exec_ids, Utc::now())
            .unwrap();
        assert_eq!(r1.exec_type, ExecType::PartialFill);
        assert_eq!(r1.ord_status, OrderStatus::PartiallyFilled);
        assert_eq!(r1.cum_qty, 30);
        assert_eq!(r1.leaves_qty, 70);
        assert_eq!(r1.last_qty, Some(30));
        assert_eq!(r1.last_px, Some(dec!(167.25)));
        assert_eq!(r1.avg_px, dec!(167.25));

        let r2 = admin_fill(&mut inner, &"A".into(), 70, dec!(167.25), &exec_ids, Utc::now())
            .unwrap();
        assert_eq!(r2.exec_type, ExecType::Fill);
        assert_eq!(r2.ord_status, OrderStatus::Filled);
        assert_eq!(r2.cum_qty, 100);
        assert_eq!(r2.leaves_qty, 0);

        // Invariant: sum of fill executions equals filled_quantity.
        let fill_sum: u64 = inner
            .executions_for(&"A".into())
            .iter()
            .filter(|e| e.exec_type.is_fill())
            .map(|e| e.exec_quantity)
            .sum();
        assert_eq!(fill_sum, inner.get(&"A".into()).unwrap().filled_quantity);
    }

    #[test]
    fn test_fill_unknown_order() {
        let mut inner = StoreInner::default();
        assert!(matches!(
            admin_fill(&mut inner, &"X".into(), 1, dec!(1), &ids(), Utc::now()),
            Err(AdminError::NotFound(_))
        ));
    }

    #[test]
    fn test_overfill_refused() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, market_order("A", 100), &exec_ids);
        assert!(matches!(
            admin_fill(&mut inner, &"A".into(), 150, dec!(1), &exec_ids, Utc::now()),
            Err(AdminError::Overfill { .. })
        ));
    }

    #[test]
    fn test_zero_fill_refused() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, market_order("A", 100), &exec_ids);
        assert!(matches!(
            admin_fill(&mut inner, &"A".into(), 0, dec!(1), &exec_ids, Utc::now()),
            Err(AdminError::BadState { .. })
        ));
    }

    #[test]
    fn test_fok_partial_fill_refused() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        let mut req = market_order("A", 100);
        req.time_in_force = Some('4');
        submit(&mut inner, req, &exec_ids);

        let err = admin_fill(&mut inner, &"A".into(), 40, dec!(1), &exec_ids, Utc::now())
            .unwrap_err();
        assert!(matches!(err, AdminError::BadState { .. }));

        // A complete fill is fine.
        let report =
            admin_fill(&mut inner, &"A".into(), 100, dec!(1), &exec_ids, Utc::now()).unwrap();
        assert_eq!(report.exec_type, ExecType::Fill);
    }

    #[test]
    fn test_admin_cancel_and_idempotence() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, market_order("A", 100), &exec_ids);

        let report = admin_cancel(&mut inner, &"A".into(), &exec_ids, Utc::now()).unwrap();
        assert_eq!(report.exec_type, ExecType::Canceled);
        assert_eq!(report.ord_status, OrderStatus::Canceled);
        assert_eq!(report.leaves_qty, 0);

        // Re-applying the cancel is a BadState, not a second report.
        let execs_before = inner.executions().len();
        assert!(matches!(
            admin_cancel(&mut inner, &"A".into(), &exec_ids, Utc::now()),
            Err(AdminError::BadState { .. })
        ));
        assert_eq!(inner.executions().len(), execs_before);
    }

    #[test]
    fn test_admin_reject_only_from_new() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, market_order("A", 100), &exec_ids);
        admin_fill(&mut inner, &"A".into(), 10, dec!(1), &exec_ids, Utc::now()).unwrap();
        assert!(matches!(
            admin_reject(&mut inner, &"A".into(), "risk", &exec_ids, Utc::now()),
            Err(AdminError::BadState { .. })
        ));

        submit(&mut inner, market_order("B", 100), &exec_ids);
        let report = admin_reject(&mut inner, &"B".into(), "risk", &exec_ids, Utc::now()).unwrap();
        assert_eq!(report.exec_type, ExecType::Rejected);
        assert_eq!(report.text.as_deref(), Some("risk"));
        assert_eq!(
            inner.get(&"B".into()).unwrap().reject_reason.as_deref(),
            Some("risk")
        );
    }

    #[test]
    fn test_cancel_request_echoes_both_ids() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, limit_order("ORIG", 100, dec!(230.0)), &exec_ids);
        admin_fill(&mut inner, &"ORIG".into(), 40, dec!(230.0), &exec_ids, Utc::now()).unwrap();

        let report = cancel_request(
            &mut inner,
            CancelRequest {
                cl_ord_id: "CANCEL_ORIG".to_string(),
                orig_cl_ord_id: "ORIG".to_string(),
            },
            &exec_ids,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(report.exec_type, ExecType::Canceled);
        assert_eq!(report.ord_status, OrderStatus::Canceled);
        assert_eq!(report.cl_ord_id, "CANCEL_ORIG".into());
        assert_eq!(report.orig_cl_ord_id, Some("ORIG".into()));
        assert_eq!(report.cum_qty, 40);
        assert_eq!(report.leaves_qty, 0);
        // Audit value survives on the record.
        assert_eq!(inner.get(&"ORIG".into()).unwrap().remaining_quantity(), 60);
    }

    #[test]
    fn test_cancel_unknown_order() {
        let mut inner = StoreInner::default();
        let err = cancel_request(
            &mut inner,
            CancelRequest {
                cl_ord_id: "C1".to_string(),
                orig_cl_ord_id: "NONEXISTENT".to_string(),
            },
            &ids(),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.reason, CxlRejReason::UnknownOrder);
        assert_eq!(err.text, "Order not found");
    }

    #[test]
    fn test_cancel_filled_order_too_late() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, market_order("A", 100), &exec_ids);
        admin_fill(&mut inner, &"A".into(), 100, dec!(230.10), &exec_ids, Utc::now()).unwrap();

        let err = cancel_request(
            &mut inner,
            CancelRequest {
                cl_ord_id: "C1".to_string(),
                orig_cl_ord_id: "A".to_string(),
            },
            &exec_ids,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.reason, CxlRejReason::TooLate);
        assert_eq!(err.text, "Order already FILLED");
    }

    #[test]
    fn test_replace_quantity() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, limit_order("AMEND_QTY_001", 100, dec!(225.0)), &exec_ids);

        let report = replace_request(
            &mut inner,
            ReplaceRequest {
                cl_ord_id: "AMEND_QTY_001_V2".to_string(),
                orig_cl_ord_id: "AMEND_QTY_001".to_string(),
                quantity: Some(150),
                price: Some(dec!(225.0)),
            },
            &exec_ids,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(report.exec_type, ExecType::Replaced);
        assert_eq!(report.ord_status, OrderStatus::New);
        assert_eq!(report.order_qty, 150);
        assert_eq!(report.leaves_qty, 150);
        assert_eq!(report.cl_ord_id, "AMEND_QTY_001_V2".into());
        assert_eq!(report.orig_cl_ord_id, Some("AMEND_QTY_001".into()));

        // Old record retired, both records persist.
        assert_eq!(
            inner.get(&"AMEND_QTY_001".into()).unwrap().status,
            OrderStatus::Replaced
        );
        let new = inner.get(&"AMEND_QTY_001_V2".into()).unwrap();
        assert_eq!(new.quantity, 150);
        assert_eq!(new.orig_cl_ord_id, Some("AMEND_QTY_001".into()));

        // Cancelling the old id is now too late.
        let err = cancel_request(
            &mut inner,
            CancelRequest {
                cl_ord_id: "C1".to_string(),
                orig_cl_ord_id: "AMEND_QTY_001".to_string(),
            },
            &exec_ids,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.reason, CxlRejReason::TooLate);
        assert_eq!(err.text, "Order already REPLACED");
    }

    #[test]
    fn test_replace_carries_fills_forward() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, limit_order("A", 100, dec!(10)), &exec_ids);
        admin_fill(&mut inner, &"A".into(), 40, dec!(10), &exec_ids, Utc::now()).unwrap();

        let report = replace_request(
            &mut inner,
            ReplaceRequest {
                cl_ord_id: "A2".to_string(),
                orig_cl_ord_id: "A".to_string(),
                quantity: Some(120),
                price: None,
            },
            &exec_ids,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(report.ord_status, OrderStatus::PartiallyFilled);
        assert_eq!(report.cum_qty, 40);
        assert_eq!(report.leaves_qty, 80);
        // Price inherited from the original.
        assert_eq!(report.price, Some(dec!(10)));
        assert_eq!(inner.get(&"A2".into()).unwrap().avg_px, dec!(10));
    }

    #[test]
    fn test_replace_below_filled_too_late() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, market_order("A", 100), &exec_ids);
        admin_fill(&mut inner, &"A".into(), 60, dec!(1), &exec_ids, Utc::now()).unwrap();

        let err = replace_request(
            &mut inner,
            ReplaceRequest {
                cl_ord_id: "A2".to_string(),
                orig_cl_ord_id: "A".to_string(),
                quantity: Some(50),
                price: None,
            },
            &exec_ids,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.reason, CxlRejReason::TooLate);
        assert_eq!(err.text, "New quantity below filled");
        // Nothing changed.
        assert_eq!(inner.get(&"A".into()).unwrap().status, OrderStatus::PartiallyFilled);
        assert!(!inner.contains(&"A2".into()));
    }

    #[test]
    fn test_replace_unknown_order() {
        let mut inner = StoreInner::default();
        let err = replace_request(
            &mut inner,
            ReplaceRequest {
                cl_ord_id: "A2".to_string(),
                orig_cl_ord_id: "MISSING".to_string(),
                quantity: Some(10),
                price: None,
            },
            &ids(),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.reason, CxlRejReason::UnknownOrder);
    }

    #[test]
    fn test_replace_duplicate_new_id() {
        let mut inner = StoreInner::default();
        let exec_ids = ids();
        submit(&mut inner, market_order("A", 100), &exec_ids);
        submit(&mut inner, market_order("B", 100), &exec_ids);

        let err = replace_request(
            &mut inner,
            ReplaceRequest {
                cl_ord_id: "B".to_string(),
                orig_cl_ord_id: "A".to_string(),
                quantity: Some(200),
                price: None,
            },
            &exec_ids,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.reason, CxlRejReason::TooLate);
        assert!(err.text.contains("Duplicate"));
    }
}
