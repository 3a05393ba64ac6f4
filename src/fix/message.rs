//! FIX message representation.
//!
//! A [`FixMessage`] holds the contents of a single FIX frame. Fields are
//! stored in wire order (the audit trail cares about ordering) while lookup
//! is by tag number. The structural tags 8 (BeginString), 9 (BodyLength),
//! and 10 (CheckSum) are never stored; they are validated by the decoder
//! and reconstructed by the encoder in [`crate::fix::codec`].

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use super::tag;

/// A FIX message: a type code plus an ordered list of tag/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixMessage {
    /// Message type from tag 35 (e.g., "D", "8", "A").
    pub msg_type: String,
    /// Non-structural tag/value pairs in wire order.
    pub fields: Vec<(u32, String)>,
}

impl FixMessage {
    /// Create an empty message of the given type.
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            fields: Vec::new(),
        }
    }

    /// Append a tag/value pair, preserving insertion order.
    pub fn push(&mut self, tag: u32, value: impl Into<String>) -> &mut Self {
        self.fields.push((tag, value.into()));
        self
    }

    /// First value for a tag, or `None` if the tag is absent.
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a tag parsed as `u64`.
    pub fn get_u64(&self, tag: u32) -> Option<u64> {
        self.get(tag)?.parse().ok()
    }

    /// Value of a tag parsed as a [`Decimal`].
    pub fn get_decimal(&self, tag: u32) -> Option<Decimal> {
        Decimal::from_str(self.get(tag)?).ok()
    }

    /// Single-character value of a tag.
    pub fn get_char(&self, tag: u32) -> Option<char> {
        let v = self.get(tag)?;
        let mut chars = v.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }

    /// True when the message carries `43=Y`.
    pub fn is_poss_dup(&self) -> bool {
        self.get(tag::POSS_DUP_FLAG) == Some("Y")
    }
}

/// Renders the message with `|` in place of SOH, the conventional form for
/// log lines.
impl fmt::Display for FixMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "35={}", self.msg_type)?;
        for (t, v) in &self.fields {
            write!(f, "|{t}={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_push_and_get() {
        let mut msg = FixMessage::new("D");
        msg.push(tag::SENDER_COMP_ID, "CLIENT1")
            .push(tag::SYMBOL, "AAPL");

        assert_eq!(msg.msg_type, "D");
        assert_eq!(msg.get(tag::SENDER_COMP_ID), Some("CLIENT1"));
        assert_eq!(msg.get(tag::SYMBOL), Some("AAPL"));
        assert_eq!(msg.get(tag::PRICE), None);
    }

    #[test]
    fn test_get_returns_first_occurrence() {
        let mut msg = FixMessage::new("8");
        msg.push(tag::TEXT, "first").push(tag::TEXT, "second");
        assert_eq!(msg.get(tag::TEXT), Some("first"));
        assert_eq!(msg.fields.len(), 2);
    }

    #[test]
    fn test_get_u64() {
        let mut msg = FixMessage::new("D");
        msg.push(tag::ORDER_QTY, "100");
        assert_eq!(msg.get_u64(tag::ORDER_QTY), Some(100));

        msg.push(tag::MSG_SEQ_NUM, "not-a-number");
        assert_eq!(msg.get_u64(tag::MSG_SEQ_NUM), None);
    }

    #[test]
    fn test_get_decimal() {
        let mut msg = FixMessage::new("D");
        msg.push(tag::PRICE, "230.10");
        assert_eq!(msg.get_decimal(tag::PRICE), Some(dec!(230.10)));
    }

    #[test]
    fn test_get_char() {
        let mut msg = FixMessage::new("D");
        msg.push(tag::SIDE, "1").push(tag::TEXT, "too long");
        assert_eq!(msg.get_char(tag::SIDE), Some('1'));
        assert_eq!(msg.get_char(tag::TEXT), None);
    }

    #[test]
    fn test_poss_dup_flag() {
        let mut msg = FixMessage::new("0");
        assert!(!msg.is_poss_dup());
        msg.push(tag::POSS_DUP_FLAG, "Y");
        assert!(msg.is_poss_dup());
    }

    #[test]
    fn test_display_uses_pipes() {
        let mut msg = FixMessage::new("A");
        msg.push(tag::SENDER_COMP_ID, "X").push(tag::HEART_BT_INT, "30");
        assert_eq!(msg.to_string(), "35=A|49=X|108=30");
    }
}
