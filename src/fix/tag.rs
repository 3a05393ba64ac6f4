//! FIX 4.2 tag number constants.
//!
//! Each constant is the integer tag number as defined in the FIX
//! specification. Only the tags the acceptor reads or writes are listed.

// Standard header / trailer

/// Tag 8 - BeginString: identifies the FIX version ("FIX.4.2").
pub const BEGIN_STRING: u32 = 8;

/// Tag 9 - BodyLength: byte count from the first byte after tag 9's
/// delimiter up to and including the delimiter preceding tag 10.
pub const BODY_LENGTH: u32 = 9;

/// Tag 10 - CheckSum: three-digit modulo-256 checksum, zero-padded.
pub const CHECKSUM: u32 = 10;

/// Tag 35 - MsgType: message type ("D" = NewOrderSingle, "8" = ExecutionReport).
pub const MSG_TYPE: u32 = 35;

/// Tag 49 - SenderCompID: identity of the sending firm.
pub const SENDER_COMP_ID: u32 = 49;

/// Tag 56 - TargetCompID: identity of the receiving firm.
pub const TARGET_COMP_ID: u32 = 56;

/// Tag 34 - MsgSeqNum: per-session monotonic message sequence number.
pub const MSG_SEQ_NUM: u32 = 34;

/// Tag 43 - PossDupFlag: "Y" when the message may be a duplicate.
pub const POSS_DUP_FLAG: u32 = 43;

/// Tag 52 - SendingTime: UTC transmission timestamp (YYYYMMDD-HH:MM:SS.sss).
pub const SENDING_TIME: u32 = 52;

// Session administration

/// Tag 98 - EncryptMethod: 0 = none; the only value the acceptor admits.
pub const ENCRYPT_METHOD: u32 = 98;

/// Tag 108 - HeartBtInt: heartbeat interval in seconds, proposed at logon.
pub const HEART_BT_INT: u32 = 108;

/// Tag 112 - TestReqID: correlation id echoed in the heartbeat reply.
pub const TEST_REQ_ID: u32 = 112;

// Order identification

/// Tag 11 - ClOrdID: client-assigned unique order identifier.
pub const CL_ORD_ID: u32 = 11;

/// Tag 41 - OrigClOrdID: the ClOrdID being canceled or replaced.
pub const ORIG_CL_ORD_ID: u32 = 41;

/// Tag 17 - ExecID: server-assigned unique execution identifier.
pub const EXEC_ID: u32 = 17;

// Instrument and order attributes

/// Tag 55 - Symbol: ticker symbol of the traded instrument.
pub const SYMBOL: u32 = 55;

/// Tag 54 - Side: "1" = Buy, "2" = Sell.
pub const SIDE: u32 = 54;

/// Tag 21 - HandlInst: order handling instruction; "1" is accepted.
pub const HANDL_INST: u32 = 21;

/// Tag 40 - OrdType: "1" = Market, "2" = Limit.
pub const ORD_TYPE: u32 = 40;

/// Tag 44 - Price: limit price.
pub const PRICE: u32 = 44;

/// Tag 38 - OrderQty: units to buy or sell.
pub const ORDER_QTY: u32 = 38;

/// Tag 59 - TimeInForce: "0" = Day, "1" = GTC, "3" = IOC, "4" = FOK.
pub const TIME_IN_FORCE: u32 = 59;

/// Tag 60 - TransactTime: UTC timestamp of the transaction.
pub const TRANSACT_TIME: u32 = 60;

// Execution report fields

/// Tag 150 - ExecType: execution event kind.
pub const EXEC_TYPE: u32 = 150;

/// Tag 39 - OrdStatus: current status of the order.
pub const ORD_STATUS: u32 = 39;

/// Tag 32 - LastQty: quantity of the most recent fill.
pub const LAST_QTY: u32 = 32;

/// Tag 31 - LastPx: price of the most recent fill.
pub const LAST_PX: u32 = 31;

/// Tag 14 - CumQty: total quantity filled so far.
pub const CUM_QTY: u32 = 14;

/// Tag 6 - AvgPx: volume-weighted average fill price.
pub const AVG_PX: u32 = 6;

/// Tag 151 - LeavesQty: quantity still open for execution.
pub const LEAVES_QTY: u32 = 151;

// Cancel reject

/// Tag 434 - CxlRejReason: "0" = TooLate, "1" = UnknownOrder.
pub const CXL_REJ_REASON: u32 = 434;

/// Tag 58 - Text: free-form human-readable diagnostic.
pub const TEXT: u32 = 58;
