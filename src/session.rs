//! FIX session layer.
//!
//! One [`Session`] per accepted TCP connection. A single task owns both
//! halves of the socket and multiplexes, via `select!`: inbound bytes, the
//! outbound queue, the heartbeat timer, the inbound idle deadline, and the
//! server shutdown signal. Every outbound frame funnels through one write
//! path that assigns MsgSeqNum and stamps SendingTime, so sequence numbers
//! are gap-free and heartbeats never interleave mid-message with a report.
//!
//! Reports produced while a store write guard is held are pushed onto the
//! session's unbounded queue before the guard drops; queue order is
//! therefore commit order.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::engine::{
    self, CancelReject, CancelRequest, ExecReport, NewOrderRequest, ReplaceRequest,
};
use crate::error::SessionError;
use crate::fix::codec::{self, FixDecoder};
use crate::fix::message::FixMessage;
use crate::fix::tag;
use crate::model::{fix_price, fix_timestamp, ExecIdSource, SenderCompId};
use crate::store::OrderStore;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, no logon yet.
    Connected,
    /// Logon exchanged; order-bearing messages are admitted.
    LoggedIn,
    /// Logout sent or received; draining.
    LoggingOut,
    /// Torn down.
    Closed,
}

/// A message queued for emission on a session.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Logon echo confirming the handshake.
    Logon { heartbeat_s: u64 },
    /// Heartbeat, optionally answering a TestRequest.
    Heartbeat { test_req_id: Option<String> },
    /// Logout; writing one ends the session.
    Logout { text: Option<String> },
    Exec(ExecReport),
    CancelReject(CancelReject),
}

impl Outbound {
    fn closes_session(&self) -> bool {
        matches!(self, Outbound::Logout { .. })
    }

    /// Body fields only; the write path prepends the standard header.
    fn into_message(self) -> FixMessage {
        match self {
            Outbound::Logon { heartbeat_s } => {
                let mut msg = FixMessage::new("A");
                msg.push(tag::ENCRYPT_METHOD, "0")
                    .push(tag::HEART_BT_INT, heartbeat_s.to_string());
                msg
            }
            Outbound::Heartbeat { test_req_id } => {
                let mut msg = FixMessage::new("0");
                if let Some(id) = test_req_id {
                    msg.push(tag::TEST_REQ_ID, id);
                }
                msg
            }
            Outbound::Logout { text } => {
                let mut msg = FixMessage::new("5");
                if let Some(text) = text {
                    msg.push(tag::TEXT, text);
                }
                msg
            }
            Outbound::Exec(report) => {
                let mut msg = FixMessage::new("8");
                msg.push(tag::CL_ORD_ID, report.cl_ord_id.0);
                if let Some(orig) = report.orig_cl_ord_id {
                    msg.push(tag::ORIG_CL_ORD_ID, orig.0);
                }
                msg.push(tag::EXEC_ID, report.exec_id.0)
                    .push(tag::EXEC_TYPE, report.exec_type.to_fix().to_string())
                    .push(tag::ORD_STATUS, report.ord_status.to_fix().to_string())
                    .push(tag::SYMBOL, report.symbol);
                if let Some(side) = report.side {
                    msg.push(tag::SIDE, side.to_fix().to_string());
                }
                msg.push(tag::ORDER_QTY, report.order_qty.to_string());
                if let Some(t) = report.order_type {
                    msg.push(tag::ORD_TYPE, t.to_fix().to_string());
                }
                if let Some(price) = report.price {
                    msg.push(tag::PRICE, price.to_string());
                }
                if let Some(qty) = report.last_qty {
                    msg.push(tag::LAST_QTY, qty.to_string());
                }
                if let Some(px) = report.last_px {
                    msg.push(tag::LAST_PX, px.to_string());
                }
                msg.push(tag::CUM_QTY, report.cum_qty.to_string())
                    .push(tag::AVG_PX, fix_price(report.avg_px))
                    .push(tag::LEAVES_QTY, report.leaves_qty.to_string())
                    .push(tag::TRANSACT_TIME, fix_timestamp(Utc::now()));
                if let Some(text) = report.text {
                    msg.push(tag::TEXT, text);
                }
                msg
            }
            Outbound::CancelReject(reject) => {
                let mut msg = FixMessage::new("9");
                msg.push(tag::CL_ORD_ID, reject.cl_ord_id.0)
                    .push(tag::ORIG_CL_ORD_ID, reject.orig_cl_ord_id.0)
                    .push(tag::CXL_REJ_REASON, reject.reason.to_fix().to_string())
                    .push(tag::TEXT, reject.text);
                msg
            }
        }
    }
}

/// Live sessions keyed by SenderCompID. Readers are the dispatcher and the
/// logon collision check; writers are logon and teardown.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<SenderCompId, mpsc::UnboundedSender<Outbound>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an identity. Fails when a session with the same SenderCompID
    /// is already active.
    pub(crate) fn register(&self, id: SenderCompId, tx: mpsc::UnboundedSender<Outbound>) -> bool {
        let mut map = self.inner.write();
        if map.contains_key(&id) {
            return false;
        }
        map.insert(id, tx);
        true
    }

    /// Release an identity, but only if it still maps to this session's
    /// channel.
    fn deregister(&self, id: &SenderCompId, tx: &mpsc::UnboundedSender<Outbound>) {
        let mut map = self.inner.write();
        if map.get(id).is_some_and(|t| t.same_channel(tx)) {
            map.remove(id);
        }
    }

    /// Enqueue a message on the identified session. Returns false when no
    /// live session holds that identity.
    pub fn send(&self, id: &SenderCompId, out: Outbound) -> bool {
        match self.inner.read().get(id) {
            Some(tx) => tx.send(out).is_ok(),
            None => false,
        }
    }

    /// Number of logged-in sessions.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Shared dependencies handed to every session.
#[derive(Clone)]
pub struct SessionContext {
    pub settings: Arc<Settings>,
    pub store: Arc<OrderStore>,
    pub registry: Arc<SessionRegistry>,
    pub exec_ids: Arc<ExecIdSource>,
}

/// Why the session loop ended; used only for the teardown log line.
#[derive(Debug)]
enum Close {
    Disconnected,
    LoggedOut,
    Framing,
    Session(SessionError),
    Shutdown,
    Io(std::io::Error),
}

struct Session {
    ctx: SessionContext,
    peer: SocketAddr,
    state: SessionState,
    /// Claimed at logon; used for tag 56 on every outbound frame.
    sender_comp_id: Option<SenderCompId>,
    heartbeat_s: u64,
    next_outbound_seq: u64,
    expected_inbound_seq: u64,
    registered: bool,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

/// Run one session to completion. Consumes the socket.
pub async fn run_session(
    ctx: SessionContext,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let default_hb = ctx.settings.default_heartbeat_s;
    let mut session = Session {
        ctx,
        peer,
        state: SessionState::Connected,
        sender_comp_id: None,
        heartbeat_s: default_hb,
        next_outbound_seq: 1,
        expected_inbound_seq: 1,
        registered: false,
        outbound_tx: tx,
    };

    let mut decoder = FixDecoder::new();
    let mut read_buf = [0u8; 4096];
    let mut last_inbound = Instant::now();
    let mut last_send = Instant::now();
    let mut hb_deadline = Instant::now() + session.heartbeat_period();

    let close = 'session: loop {
        let idle_deadline = last_inbound + session.idle_window();
        tokio::select! {
            read = reader.read(&mut read_buf) => {
                match read {
                    Ok(0) => break Close::Disconnected,
                    Ok(n) => {
                        last_inbound = Instant::now();
                        decoder.extend(&read_buf[..n]);
                        loop {
                            match decoder.decode_next() {
                                Ok(Some(msg)) => {
                                    debug!(peer = %session.peer, "RECV {msg}");
                                    match session.handle(msg).await {
                                        Ok(true) => {}
                                        Ok(false) => {
                                            // Inbound Logout: flush pending
                                            // reports, echo the Logout, close.
                                            session.drain(&mut writer, &mut rx).await;
                                            let _ = session
                                                .write_out(&mut writer, Outbound::Logout {
                                                    text: None,
                                                })
                                                .await;
                                            break 'session Close::LoggedOut;
                                        }
                                        Err(err) => {
                                            let _ = session
                                                .write_out(&mut writer, Outbound::Logout {
                                                    text: Some(err.to_string()),
                                                })
                                                .await;
                                            break 'session Close::Session(err);
                                        }
                                    }
                                }
                                Ok(None) => break,
                                Err(err) => {
                                    error!(
                                        peer = %session.peer,
                                        raw = %String::from_utf8_lossy(decoder.buffered())
                                            .replace('\x01', "|"),
                                        "framing error: {err}"
                                    );
                                    break 'session Close::Framing;
                                }
                            }
                        }
                    }
                    Err(err) => break Close::Io(err),
                }
            }

            Some(out) = rx.recv() => {
                let closes = out.closes_session();
                if let Err(err) = session.write_out(&mut writer, out).await {
                    break Close::Io(err);
                }
                last_send = Instant::now();
                // Logon may have changed the heartbeat interval.
                hb_deadline = last_send + session.heartbeat_period();
                if closes {
                    break Close::LoggedOut;
                }
            }

            _ = tokio::time::sleep_until(hb_deadline) => {
                if session.state == SessionState::LoggedIn
                    && last_send.elapsed() >= session.heartbeat_period()
                {
                    if let Err(err) = session
                        .write_out(&mut writer, Outbound::Heartbeat { test_req_id: None })
                        .await
                    {
                        break Close::Io(err);
                    }
                    last_send = Instant::now();
                }
                let next = last_send + session.heartbeat_period();
                hb_deadline = if next > Instant::now() {
                    next
                } else {
                    Instant::now() + session.heartbeat_period()
                };
            }

            _ = tokio::time::sleep_until(idle_deadline) => {
                let err = SessionError::IdleTimeout;
                let _ = session
                    .write_out(&mut writer, Outbound::Logout { text: Some(err.to_string()) })
                    .await;
                break Close::Session(err);
            }

            _ = shutdown.recv() => {
                session.state = SessionState::LoggingOut;
                session.drain(&mut writer, &mut rx).await;
                let _ = session
                    .write_out(&mut writer, Outbound::Logout {
                        text: Some("Server shutting down".to_string()),
                    })
                    .await;
                break Close::Shutdown;
            }
        }
    };

    session.teardown();
    let _ = writer.shutdown().await;
    match close {
        Close::Io(err) => warn!(peer = %session.peer, "session ended on I/O error: {err}"),
        reason => info!(peer = %session.peer, "session closed: {reason:?}"),
    }
}

impl Session {
    fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_s.max(1))
    }

    fn idle_window(&self) -> Duration {
        self.ctx.settings.idle_timeout(self.heartbeat_s)
    }

    /// Process one inbound message. `Ok(true)` keeps the session running,
    /// `Ok(false)` means a Logout was received, and `Err` tears the session
    /// down with a Logout carrying the diagnostic.
    async fn handle(&mut self, msg: FixMessage) -> Result<bool, SessionError> {
        if !self.check_sequence(&msg)? {
            // PossDup replay of an old sequence number; drop it.
            return Ok(true);
        }

        match msg.msg_type.as_str() {
            "A" => self.on_logon(&msg)?,
            "0" => {} // heartbeat: liveness only
            "1" => {
                let test_req_id = msg.get(tag::TEST_REQ_ID).map(str::to_string);
                self.enqueue(Outbound::Heartbeat { test_req_id });
            }
            "5" => {
                info!(peer = %self.peer, "logout received");
                self.state = SessionState::LoggingOut;
                return Ok(false);
            }
            "D" => self.on_new_order(&msg).await?,
            "F" => self.on_cancel_request(&msg).await?,
            "G" => self.on_replace_request(&msg).await?,
            other => {
                warn!(peer = %self.peer, "unsupported MsgType {other:?} ignored");
            }
        }
        Ok(true)
    }

    /// Enforce inbound MsgSeqNum discipline. Returns `Ok(false)` for a
    /// tolerated PossDup replay.
    fn check_sequence(&mut self, msg: &FixMessage) -> Result<bool, SessionError> {
        let seq = msg
            .get_u64(tag::MSG_SEQ_NUM)
            .ok_or(SessionError::MissingSeqNum)?;
        if seq == self.expected_inbound_seq {
            self.expected_inbound_seq += 1;
            Ok(true)
        } else if seq > self.expected_inbound_seq {
            // Bare gap detection only; resynchronize and carry on.
            warn!(
                peer = %self.peer,
                expected = self.expected_inbound_seq,
                received = seq,
                "inbound sequence gap"
            );
            self.expected_inbound_seq = seq + 1;
            Ok(true)
        } else if msg.is_poss_dup() {
            debug!(peer = %self.peer, seq, "PossDup below expected, dropped");
            Ok(false)
        } else {
            Err(SessionError::SeqNumTooLow)
        }
    }

    fn on_logon(&mut self, msg: &FixMessage) -> Result<(), SessionError> {
        if self.state != SessionState::Connected {
            warn!(peer = %self.peer, "duplicate logon on live session ignored");
            return Ok(());
        }

        let sender = msg
            .get(tag::SENDER_COMP_ID)
            .filter(|s| !s.is_empty())
            .map(SenderCompId::from)
            .ok_or_else(|| SessionError::LogonRejected("SenderCompID required".to_string()))?;
        // Remember the claimed identity so the rejection Logout is addressed.
        self.sender_comp_id = Some(sender.clone());

        let target = msg.get(tag::TARGET_COMP_ID).unwrap_or_default();
        if target != self.ctx.settings.server_comp_id {
            return Err(SessionError::LogonRejected(format!(
                "TargetCompID must be {}",
                self.ctx.settings.server_comp_id
            )));
        }
        if msg.get_u64(tag::ENCRYPT_METHOD) != Some(0) {
            return Err(SessionError::LogonRejected(
                "EncryptMethod must be 0".to_string(),
            ));
        }
        let heartbeat_s = msg
            .get_u64(tag::HEART_BT_INT)
            .unwrap_or(self.ctx.settings.default_heartbeat_s);

        if !self
            .ctx
            .registry
            .register(sender.clone(), self.outbound_tx.clone())
        {
            return Err(SessionError::LogonRejected(
                "Session already active".to_string(),
            ));
        }

        self.registered = true;
        self.heartbeat_s = heartbeat_s;
        self.state = SessionState::LoggedIn;
        info!(peer = %self.peer, sender = %sender, heartbeat_s, "logon accepted");
        self.enqueue(Outbound::Logon { heartbeat_s });
        Ok(())
    }

    async fn on_new_order(&mut self, msg: &FixMessage) -> Result<(), SessionError> {
        let sender = self.require_logon()?;
        let req = NewOrderRequest {
            cl_ord_id: msg.get(tag::CL_ORD_ID).unwrap_or_default().to_string(),
            symbol: msg.get(tag::SYMBOL).unwrap_or_default().to_string(),
            side: msg.get_char(tag::SIDE),
            ord_type: msg.get_char(tag::ORD_TYPE),
            quantity: msg.get_u64(tag::ORDER_QTY),
            price: msg.get_decimal(tag::PRICE),
            time_in_force: msg.get_char(tag::TIME_IN_FORCE),
        };

        let mut guard = self.ctx.store.update().await;
        let report = engine::submit_order(&mut guard, req, &sender, &self.ctx.exec_ids, Utc::now());
        // Enqueued before the guard drops: queue order is commit order.
        self.enqueue(Outbound::Exec(report));
        Ok(())
    }

    async fn on_cancel_request(&mut self, msg: &FixMessage) -> Result<(), SessionError> {
        self.require_logon()?;
        let req = CancelRequest {
            cl_ord_id: msg.get(tag::CL_ORD_ID).unwrap_or_default().to_string(),
            orig_cl_ord_id: msg.get(tag::ORIG_CL_ORD_ID).unwrap_or_default().to_string(),
        };

        let mut guard = self.ctx.store.update().await;
        match engine::cancel_request(&mut guard, req, &self.ctx.exec_ids, Utc::now()) {
            Ok(report) => self.enqueue(Outbound::Exec(report)),
            Err(reject) => self.enqueue(Outbound::CancelReject(reject)),
        }
        Ok(())
    }

    async fn on_replace_request(&mut self, msg: &FixMessage) -> Result<(), SessionError> {
        self.require_logon()?;
        let req = ReplaceRequest {
            cl_ord_id: msg.get(tag::CL_ORD_ID).unwrap_or_default().to_string(),
            orig_cl_ord_id: msg.get(tag::ORIG_CL_ORD_ID).unwrap_or_default().to_string(),
            quantity: msg.get_u64(tag::ORDER_QTY),
            price: msg.get_decimal(tag::PRICE),
        };

        let mut guard = self.ctx.store.update().await;
        match engine::replace_request(&mut guard, req, &self.ctx.exec_ids, Utc::now()) {
            Ok(report) => self.enqueue(Outbound::Exec(report)),
            Err(reject) => self.enqueue(Outbound::CancelReject(reject)),
        }
        Ok(())
    }

    fn require_logon(&self) -> Result<SenderCompId, SessionError> {
        if self.state != SessionState::LoggedIn {
            return Err(SessionError::NotLoggedOn);
        }
        self.sender_comp_id
            .clone()
            .ok_or(SessionError::NotLoggedOn)
    }

    fn enqueue(&self, out: Outbound) {
        // Send only fails when the session loop is gone, in which case the
        // message has nowhere to go anyway.
        let _ = self.outbound_tx.send(out);
    }

    /// Serialize one message: prepend the header, assign the next sequence
    /// number, stamp SendingTime, and write the frame.
    async fn write_out(
        &mut self,
        writer: &mut OwnedWriteHalf,
        out: Outbound,
    ) -> std::io::Result<()> {
        let body = out.into_message();
        let mut msg = FixMessage::new(body.msg_type.clone());
        msg.push(tag::SENDER_COMP_ID, self.ctx.settings.server_comp_id.clone());
        if let Some(sender) = &self.sender_comp_id {
            msg.push(tag::TARGET_COMP_ID, sender.as_str());
        }
        msg.push(tag::MSG_SEQ_NUM, self.next_outbound_seq.to_string())
            .push(tag::SENDING_TIME, fix_timestamp(Utc::now()));
        msg.fields.extend(body.fields);

        let bytes = codec::encode(&msg);
        writer.write_all(&bytes).await?;
        self.next_outbound_seq += 1;
        debug!(peer = %self.peer, "SEND {msg}");
        Ok(())
    }

    /// Write out everything already queued, stopping on the first Logout or
    /// socket error. Used when the session is about to close in an orderly
    /// way so committed reports are not silently dropped.
    async fn drain(
        &mut self,
        writer: &mut OwnedWriteHalf,
        rx: &mut mpsc::UnboundedReceiver<Outbound>,
    ) {
        while let Ok(out) = rx.try_recv() {
            let closes = out.closes_session();
            if self.write_out(writer, out).await.is_err() || closes {
                break;
            }
        }
    }

    fn teardown(&mut self) {
        if self.registered {
            if let Some(sender) = &self.sender_comp_id {
                self.ctx.registry.deregister(sender, &self.outbound_tx);
            }
            self.registered = false;
        }
        self.state = SessionState::Closed;
    }
}
