//! Record codecs for saga messages.
//!
//! [`FramedCodec`] is the default: every field is length-prefixed, so the
//! JSON payload may contain any byte sequence. [`DelimitedCodec`] speaks the
//! older `name_sagaId_json` record format for participants that still use it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use common::SagaId;

use crate::error::{MessagingError, Result};
use crate::message::{OrderPayload, SagaMessage};

/// Turns saga messages into transport records and back.
pub trait MessageCodec: Send + Sync + std::fmt::Debug {
    fn encode(&self, message: &SagaMessage) -> Result<Bytes>;

    fn decode(&self, record: &[u8]) -> Result<SagaMessage>;
}

const FRAME_MAGIC: u8 = 0x53;
const FRAME_VERSION: u8 = 1;

/// Length-prefixed envelope:
///
/// ```text
/// magic:u8 | version:u8 | name_len:u16 | name | saga_id:i64 | payload_len:u32 | payload
/// ```
///
/// All integers are big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedCodec;

impl FramedCodec {
    fn take<'a>(buf: &mut &'a [u8], len: usize, field: &str) -> Result<&'a [u8]> {
        if buf.remaining() < len {
            return Err(MessagingError::Malformed(format!("truncated {field}")));
        }
        let (head, tail) = buf.split_at(len);
        *buf = tail;
        Ok(head)
    }
}

impl MessageCodec for FramedCodec {
    fn encode(&self, message: &SagaMessage) -> Result<Bytes> {
        let name = message.name.to_string();
        let payload = message.payload.to_json()?;
        let name_len = u16::try_from(name.len())
            .map_err(|_| MessagingError::Malformed("message name too long".into()))?;
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| MessagingError::Malformed("payload too large".into()))?;

        let mut buf = BytesMut::with_capacity(2 + 2 + name.len() + 8 + 4 + payload.len());
        buf.put_u8(FRAME_MAGIC);
        buf.put_u8(FRAME_VERSION);
        buf.put_u16(name_len);
        buf.put_slice(name.as_bytes());
        buf.put_i64(message.saga_id.as_i64());
        buf.put_u32(payload_len);
        buf.put_slice(payload.as_bytes());
        Ok(buf.freeze())
    }

    fn decode(&self, record: &[u8]) -> Result<SagaMessage> {
        let mut buf = record;

        let header = Self::take(&mut buf, 2, "header")?;
        if header[0] != FRAME_MAGIC {
            return Err(MessagingError::Malformed("bad frame magic".into()));
        }
        if header[1] != FRAME_VERSION {
            return Err(MessagingError::Malformed(format!(
                "unsupported frame version {}",
                header[1]
            )));
        }

        let name_len = usize::from(Self::take(&mut buf, 2, "name length")?.get_u16());
        let name = std::str::from_utf8(Self::take(&mut buf, name_len, "name")?)
            .map_err(|e| MessagingError::Malformed(format!("name is not utf-8: {e}")))?
            .parse()?;

        let saga_id = SagaId::new(Self::take(&mut buf, 8, "saga id")?.get_i64());

        let payload_len = Self::take(&mut buf, 4, "payload length")?.get_u32() as usize;
        let payload = std::str::from_utf8(Self::take(&mut buf, payload_len, "payload")?)
            .map_err(|e| MessagingError::Malformed(format!("payload is not utf-8: {e}")))?;
        let payload = OrderPayload::from_json(payload)?;

        if buf.has_remaining() {
            return Err(MessagingError::Malformed(format!(
                "{} trailing bytes",
                buf.remaining()
            )));
        }

        Ok(SagaMessage::new(name, saga_id, payload))
    }
}

/// The legacy `name_sagaId_json` record format.
///
/// Decoding splits on the first two `_` only, so underscores inside the JSON
/// payload survive. Names and saga ids never contain `_`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedCodec;

impl MessageCodec for DelimitedCodec {
    fn encode(&self, message: &SagaMessage) -> Result<Bytes> {
        let record = format!(
            "{}_{}_{}",
            message.name,
            message.saga_id,
            message.payload.to_json()?
        );
        Ok(Bytes::from(record))
    }

    fn decode(&self, record: &[u8]) -> Result<SagaMessage> {
        let record = std::str::from_utf8(record)
            .map_err(|e| MessagingError::Malformed(format!("record is not utf-8: {e}")))?;

        let mut parts = record.splitn(3, '_');
        let (Some(name), Some(saga_id), Some(payload)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(MessagingError::Malformed("not enough parts".into()));
        };

        let saga_id = saga_id
            .parse()
            .map_err(|e| MessagingError::Malformed(format!("saga id '{saga_id}': {e}")))?;

        Ok(SagaMessage::new(
            name.parse()?,
            saga_id,
            OrderPayload::from_json(payload)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageName;

    fn sample() -> SagaMessage {
        SagaMessage::new(
            MessageName::START_MAKE_PAYMENT,
            SagaId::new(42),
            OrderPayload {
                order_id: "o_1".into(),
                user_id: "user_with_underscores".into(),
                items: vec!["i_1".into(), "i_2".into()],
                total_cost: 25,
                paid: false,
            },
        )
    }

    #[test]
    fn test_framed_roundtrip_with_underscores_in_payload() {
        let msg = sample();
        let record = FramedCodec.encode(&msg).unwrap();
        assert_eq!(FramedCodec.decode(&record).unwrap(), msg);
    }

    #[test]
    fn test_framed_keeps_sentinel_saga_id() {
        let msg = SagaMessage::start_checkout(OrderPayload::default());
        let decoded = FramedCodec.decode(&FramedCodec.encode(&msg).unwrap()).unwrap();
        assert!(decoded.saga_id.is_unassigned());
    }

    #[test]
    fn test_framed_rejects_truncated_and_trailing() {
        let record = FramedCodec.encode(&sample()).unwrap();

        let truncated = &record[..record.len() - 3];
        assert!(matches!(
            FramedCodec.decode(truncated),
            Err(MessagingError::Malformed(_))
        ));

        let mut extended = record.to_vec();
        extended.push(0);
        assert!(matches!(
            FramedCodec.decode(&extended),
            Err(MessagingError::Malformed(_))
        ));

        assert!(FramedCodec.decode(&[]).is_err());
    }

    #[test]
    fn test_framed_rejects_bad_magic_and_version() {
        let mut record = FramedCodec.encode(&sample()).unwrap().to_vec();
        record[0] = b'X';
        assert!(FramedCodec.decode(&record).is_err());

        let mut record = FramedCodec.encode(&sample()).unwrap().to_vec();
        record[1] = 9;
        assert!(FramedCodec.decode(&record).is_err());
    }

    #[test]
    fn test_delimited_wire_format() {
        let record = DelimitedCodec.encode(&sample()).unwrap();
        let text = std::str::from_utf8(&record).unwrap();
        assert!(text.starts_with("START-MAKE-PAYMENT_42_{"));
    }

    #[test]
    fn test_delimited_splits_on_first_two_underscores_only() {
        let msg = sample();
        let decoded = DelimitedCodec
            .decode(&DelimitedCodec.encode(&msg).unwrap())
            .unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_delimited_parses_sentinel_and_rejects_garbage() {
        let record = br#"START-CHECKOUT-SAGA_-1_{"order_id":"o1","user_id":"u1","items":[],"total_cost":0,"paid":false}"#;
        let msg = DelimitedCodec.decode(record).unwrap();
        assert!(msg.saga_id.is_unassigned());
        assert_eq!(msg.payload.order_id, "o1");

        assert!(DelimitedCodec.decode(b"START-CHECKOUT-SAGA_1").is_err());
        assert!(DelimitedCodec.decode(b"START-CHECKOUT-SAGA_x_{}").is_err());
        assert!(DelimitedCodec.decode(b"START-CHECKOUT-SAGA_1_not json").is_err());
    }
}
