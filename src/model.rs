//! Order and execution domain model.
//!
//! Types follow the FIX 4.2 vocabulary: every enum knows its wire character,
//! and `Order` owns the fill arithmetic so that callers can never observe a
//! half-applied execution. State changes go through the checked methods;
//! the struct fields are otherwise plain data.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// FIX tag 54 character.
    pub fn to_fix(self) -> char {
        match self {
            Side::Buy => '1',
            Side::Sell => '2',
        }
    }

    pub fn from_fix(c: char) -> Option<Self> {
        match c {
            '1' => Some(Side::Buy),
            '2' => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type. Market and Limit arrive over the wire; Stop and StopLimit
/// are accepted for completeness of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrdType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrdType {
    /// FIX tag 40 character.
    pub fn to_fix(self) -> char {
        match self {
            OrdType::Market => '1',
            OrdType::Limit => '2',
            OrdType::Stop => '3',
            OrdType::StopLimit => '4',
        }
    }

    pub fn from_fix(c: char) -> Option<Self> {
        match c {
            '1' => Some(OrdType::Market),
            '2' => Some(OrdType::Limit),
            '3' => Some(OrdType::Stop),
            '4' => Some(OrdType::StopLimit),
            _ => None,
        }
    }

    /// True when the type carries a limit price.
    pub fn requires_price(self) -> bool {
        matches!(self, OrdType::Limit | OrdType::StopLimit)
    }
}

impl fmt::Display for OrdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrdType::Market => write!(f, "MARKET"),
            OrdType::Limit => write!(f, "LIMIT"),
            OrdType::Stop => write!(f, "STOP"),
            OrdType::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// Time in force. Defaults to Day when tag 59 is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    #[default]
    Day,
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    /// FIX tag 59 character.
    pub fn to_fix(self) -> char {
        match self {
            TimeInForce::Day => '0',
            TimeInForce::Gtc => '1',
            TimeInForce::Ioc => '3',
            TimeInForce::Fok => '4',
        }
    }

    pub fn from_fix(c: char) -> Option<Self> {
        match c {
            '0' => Some(TimeInForce::Day),
            '1' => Some(TimeInForce::Gtc),
            '3' => Some(TimeInForce::Ioc),
            '4' => Some(TimeInForce::Fok),
            _ => None,
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeInForce::Day => write!(f, "DAY"),
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
            TimeInForce::Fok => write!(f, "FOK"),
        }
    }
}

/// Order lifecycle status.
///
/// `Replaced` is internal: the old record of a cancel/replace. It is
/// terminal and behaves like `Canceled` for all transition checks; it never
/// appears as an outbound OrdStatus (the replace report carries the new
/// order's status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Replaced,
    Rejected,
}

impl OrderStatus {
    /// FIX tag 39 character.
    pub fn to_fix(self) -> char {
        match self {
            OrderStatus::New => '0',
            OrderStatus::PartiallyFilled => '1',
            OrderStatus::Filled => '2',
            OrderStatus::Canceled | OrderStatus::Replaced => '4',
            OrderStatus::Rejected => '8',
        }
    }

    /// Terminal states admit no further state-changing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Replaced
                | OrderStatus::Rejected
        )
    }

    /// States in which a fill may be applied.
    pub fn can_fill(self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
            OrderStatus::Replaced => write!(f, "REPLACED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Execution event kind, FIX tag 150.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecType {
    New,
    PartialFill,
    Fill,
    Canceled,
    Replaced,
    Rejected,
}

impl ExecType {
    pub fn to_fix(self) -> char {
        match self {
            ExecType::New => '0',
            ExecType::PartialFill => '1',
            ExecType::Fill => '2',
            ExecType::Canceled => '4',
            ExecType::Replaced => '5',
            ExecType::Rejected => '8',
        }
    }

    /// True for events that move `filled_quantity`.
    pub fn is_fill(self) -> bool {
        matches!(self, ExecType::PartialFill | ExecType::Fill)
    }
}

/// Client-assigned order identifier (tag 11), unique process-wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ClOrdId(pub String);

impl ClOrdId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClOrdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClOrdId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClOrdId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Counterparty identity (tag 49 on inbound messages).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SenderCompId(pub String);

impl SenderCompId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderCompId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SenderCompId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Server-assigned execution identifier (tag 17).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExecId(pub String);

impl fmt::Display for ExecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide monotonic source of execution ids.
#[derive(Debug, Default)]
pub struct ExecIdSource {
    next: AtomicU64,
}

impl ExecIdSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> ExecId {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        ExecId(format!("E{n:08}"))
    }
}

/// A single-leg equity order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub cl_ord_id: ClOrdId,
    /// Set on replacement orders: the ClOrdID this record superseded.
    pub orig_cl_ord_id: Option<ClOrdId>,
    /// Session that submitted the order; reports route back to it.
    pub sender_comp_id: SenderCompId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrdType,
    pub quantity: u64,
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub filled_quantity: u64,
    /// Volume-weighted average fill price; zero until the first fill.
    pub avg_px: Decimal,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Quantity still open. The record keeps this derivable even after a
    /// cancel; reports zero out LeavesQty separately.
    pub fn remaining_quantity(&self) -> u64 {
        self.quantity - self.filled_quantity
    }

    /// Apply a fill, updating filled quantity, VWAP, and status.
    ///
    /// Returns the execution event kind (`PartialFill` or `Fill`) to report.
    pub fn apply_fill(
        &mut self,
        qty: u64,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ExecType, OrderError> {
        if !self.status.can_fill() {
            return Err(OrderError::Closed {
                cl_ord_id: self.cl_ord_id.clone(),
                status: self.status,
            });
        }
        if qty > self.remaining_quantity() {
            return Err(OrderError::Overfill {
                cl_ord_id: self.cl_ord_id.clone(),
                fill_qty: qty,
                remaining: self.remaining_quantity(),
            });
        }

        let total = self.filled_quantity + qty;
        self.avg_px = (self.avg_px * Decimal::from(self.filled_quantity)
            + price * Decimal::from(qty))
            / Decimal::from(total);
        self.filled_quantity = total;
        self.updated_at = now;

        if self.remaining_quantity() == 0 {
            self.status = OrderStatus::Filled;
            Ok(ExecType::Fill)
        } else {
            self.status = OrderStatus::PartiallyFilled;
            Ok(ExecType::PartialFill)
        }
    }

    /// Cancel the order if it is still working.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::Closed {
                cl_ord_id: self.cl_ord_id.clone(),
                status: self.status,
            });
        }
        self.status = OrderStatus::Canceled;
        self.updated_at = now;
        Ok(())
    }

    /// Reject the order. Permitted only from `New`.
    pub fn reject(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::New {
            return Err(OrderError::Closed {
                cl_ord_id: self.cl_ord_id.clone(),
                status: self.status,
            });
        }
        self.status = OrderStatus::Rejected;
        self.reject_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Retire the order as the old half of a cancel/replace.
    pub fn mark_replaced(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::Closed {
                cl_ord_id: self.cl_ord_id.clone(),
                status: self.status,
            });
        }
        self.status = OrderStatus::Replaced;
        self.updated_at = now;
        Ok(())
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order({} {} {} {} {} status={} filled={}/{})",
            self.cl_ord_id,
            self.side,
            self.order_type,
            self.symbol,
            self.limit_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "MKT".to_string()),
            self.status,
            self.filled_quantity,
            self.quantity,
        )
    }
}

/// One execution event against an order. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    pub exec_id: ExecId,
    pub cl_ord_id: ClOrdId,
    pub exec_type: ExecType,
    /// Positive for fills; zero for New/Canceled/Rejected/Replaced events.
    pub exec_quantity: u64,
    /// Fill price; zero when the event is not a fill.
    pub exec_price: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Errors raised by order state transitions.
#[derive(Debug, Clone, Error)]
pub enum OrderError {
    #[error("order {cl_ord_id} is {status} and cannot transition")]
    Closed {
        cl_ord_id: ClOrdId,
        status: OrderStatus,
    },

    #[error("over-fill on {cl_ord_id}: fill {fill_qty} > remaining {remaining}")]
    Overfill {
        cl_ord_id: ClOrdId,
        fill_qty: u64,
        remaining: u64,
    },
}

/// Render a timestamp in FIX SendingTime format, UTC with milliseconds.
pub fn fix_timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y%m%d-%H:%M:%S%.3f").to_string()
}

/// Render a price for the wire: at most 6 decimal places, trailing zeros
/// trimmed so repeated averaging does not bloat the field.
pub fn fix_price(p: Decimal) -> String {
    p.round_dp(6).normalize().to_string()
}
