//! Error taxonomy for the acceptor.
//!
//! Each failure domain has its own enum, defined next to the code that
//! raises it and re-exported here: framing errors close the connection,
//! session errors produce a Logout, order errors become reject reports,
//! and admin errors go back to the administrative caller only.

use thiserror::Error;

use crate::model::{ClOrdId, OrderError, OrderStatus};

pub use crate::fix::codec::FramingError;
pub use crate::model::OrderError as TransitionError;
pub use crate::store::StoreError;

/// Session-level failures. Each one ends the session with a Logout whose
/// Text carries the diagnostic.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("logon rejected: {0}")]
    LogonRejected(String),

    #[error("MsgSeqNum too low")]
    SeqNumTooLow,

    #[error("MsgSeqNum (tag 34) missing")]
    MissingSeqNum,

    #[error("message requires an active logon")]
    NotLoggedOn,

    #[error("no inbound traffic within the idle window")]
    IdleTimeout,
}

/// Errors returned to the administrative caller. These never produce FIX
/// messages to the client.
#[derive(Debug, Clone, Error)]
pub enum AdminError {
    #[error("order not found: {0}")]
    NotFound(ClOrdId),

    #[error("order {cl_ord_id} in state {status}: {detail}")]
    BadState {
        cl_ord_id: ClOrdId,
        status: OrderStatus,
        detail: String,
    },

    #[error("over-fill on {cl_ord_id}: fill {fill_qty} exceeds remaining {remaining}")]
    Overfill {
        cl_ord_id: ClOrdId,
        fill_qty: u64,
        remaining: u64,
    },
}

impl AdminError {
    /// Lift a transition failure into the admin taxonomy.
    pub fn from_transition(err: OrderError) -> Self {
        match err {
            OrderError::Closed { cl_ord_id, status } => AdminError::BadState {
                cl_ord_id,
                status,
                detail: "order is not open".to_string(),
            },
            OrderError::Overfill {
                cl_ord_id,
                fill_qty,
                remaining,
            } => AdminError::Overfill {
                cl_ord_id,
                fill_qty,
                remaining,
            },
        }
    }
}
