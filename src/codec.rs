//! User event record codec for tokio.
//!
//! Serializes [`UserEvent`] snapshots so an external event manager can
//! persist or forward a queue. Each record is a little-endian length prefix
//! followed by the record body:
//!
//! ```text
//! +--------+-------+-------+-------+-----+-------+------+--------+-----+---------+
//! | len:u16| group | index | class | var | flags | sent | time:6 | tag | value...|
//! +--------+-------+-------+-------+-----+-------+------+--------+-----+---------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::events::UserEvent;
use crate::types::{ClassMask, DoubleBit, EventValue, ObjectGroup, PointFlags, Timestamp};

/// Fixed part of a record body.
pub const RECORD_HEADER_LEN: usize = 14;

/// Largest accepted record body.
pub const MAX_RECORD_LEN: usize = 1024;

const TAG_BINARY: u8 = 1;
const TAG_DOUBLE_BIT: u8 = 2;
const TAG_COUNTER: u8 = 3;
const TAG_ANALOG: u8 = 4;
const TAG_OCTET_STRING: u8 = 5;
const TAG_AUTH_ERROR: u8 = 6;

/// User event record codec.
///
/// # Example
///
/// ```rust,ignore
/// use futures::SinkExt;
/// use tokio_util::codec::FramedWrite;
/// use voltage_dnp3::codec::EventRecordCodec;
///
/// let file = tokio::fs::File::create("events.bin").await?;
/// let mut sink = FramedWrite::new(file, EventRecordCodec::new());
/// for event in queues.events(ObjectGroup::CounterEvent) {
///     sink.send(event.clone()).await?;
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventRecordCodec {
    state: DecodeState,
}

#[derive(Debug, Clone, Copy, Default)]
enum DecodeState {
    #[default]
    WaitingForLength,
    WaitingForBody {
        length: usize,
    },
}

impl EventRecordCodec {
    /// Create a new event record codec.
    pub fn new() -> Self {
        Self::default()
    }
}

fn value_len(value: &EventValue) -> usize {
    match value {
        EventValue::Binary(_) | EventValue::DoubleBit(_) => 1,
        EventValue::Counter(_) => 4,
        EventValue::Analog(_) => 8,
        EventValue::OctetString(bytes) => bytes.len(),
        EventValue::AuthError { .. } => 5,
    }
}

fn parse_body(mut body: Bytes) -> Result<UserEvent, CodecError> {
    let len = body.len();
    if len < RECORD_HEADER_LEN {
        return Err(CodecError::Truncated(len));
    }

    let group = ObjectGroup::from_u8(body.get_u8())?;
    let index = body.get_u16_le();
    let class_mask = ClassMask::from_raw(body.get_u8());
    let variation = body.get_u8();
    let flags = PointFlags::from_raw(body.get_u8());
    let sent = body.get_u8() != 0;
    let mut time = [0u8; 6];
    body.copy_to_slice(&mut time);
    let tag = body.get_u8();

    let need = |n: usize, body: &Bytes| {
        if body.remaining() < n {
            Err(CodecError::Truncated(len))
        } else {
            Ok(())
        }
    };
    let value = match tag {
        TAG_BINARY => {
            need(1, &body)?;
            EventValue::Binary(body.get_u8() != 0)
        }
        TAG_DOUBLE_BIT => {
            need(1, &body)?;
            EventValue::DoubleBit(DoubleBit::from_bits(body.get_u8()))
        }
        TAG_COUNTER => {
            need(4, &body)?;
            EventValue::Counter(body.get_u32_le())
        }
        TAG_ANALOG => {
            need(8, &body)?;
            EventValue::Analog(body.get_f64_le())
        }
        TAG_OCTET_STRING => EventValue::OctetString(body.split_off(0)),
        TAG_AUTH_ERROR => {
            need(5, &body)?;
            EventValue::AuthError {
                user: body.get_u16_le(),
                association: body.get_u16_le(),
                error_code: body.get_u8(),
            }
        }
        other => return Err(CodecError::UnknownValueTag(other)),
    };

    Ok(UserEvent {
        group,
        index,
        class_mask,
        variation,
        flags,
        value,
        timestamp: Timestamp::from_bytes(time),
        sent,
    })
}

impl Decoder for EventRecordCodec {
    type Item = UserEvent;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::WaitingForLength => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    let length = u16::from_le_bytes([src[0], src[1]]) as usize;
                    if !(RECORD_HEADER_LEN..=MAX_RECORD_LEN).contains(&length) {
                        return Err(CodecError::InvalidLength {
                            len: length,
                            max: MAX_RECORD_LEN,
                        });
                    }
                    src.advance(2);
                    src.reserve(length);
                    self.state = DecodeState::WaitingForBody { length };
                }

                DecodeState::WaitingForBody { length } => {
                    if src.len() < length {
                        return Ok(None);
                    }
                    let body = src.split_to(length).freeze();
                    self.state = DecodeState::WaitingForLength;
                    return parse_body(body).map(Some);
                }
            }
        }
    }
}

impl Encoder<UserEvent> for EventRecordCodec {
    type Error = CodecError;

    fn encode(&mut self, item: UserEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = RECORD_HEADER_LEN + value_len(&item.value);
        if length > MAX_RECORD_LEN {
            return Err(CodecError::InvalidLength {
                len: length,
                max: MAX_RECORD_LEN,
            });
        }

        dst.reserve(2 + length);
        dst.put_u16_le(length as u16);
        dst.put_u8(item.group.as_u8());
        dst.put_u16_le(item.index);
        dst.put_u8(item.class_mask.as_raw());
        dst.put_u8(item.variation);
        dst.put_u8(item.flags.as_raw());
        dst.put_u8(item.sent as u8);
        dst.put_slice(&item.timestamp.to_bytes());

        match item.value {
            EventValue::Binary(v) => {
                dst.put_u8(TAG_BINARY);
                dst.put_u8(v as u8);
            }
            EventValue::DoubleBit(v) => {
                dst.put_u8(TAG_DOUBLE_BIT);
                dst.put_u8(v.as_bits());
            }
            EventValue::Counter(v) => {
                dst.put_u8(TAG_COUNTER);
                dst.put_u32_le(v);
            }
            EventValue::Analog(v) => {
                dst.put_u8(TAG_ANALOG);
                dst.put_f64_le(v);
            }
            EventValue::OctetString(bytes) => {
                dst.put_u8(TAG_OCTET_STRING);
                dst.put_slice(&bytes);
            }
            EventValue::AuthError {
                user,
                association,
                error_code,
            } => {
                dst.put_u8(TAG_AUTH_ERROR);
                dst.put_u16_le(user);
                dst.put_u16_le(association);
                dst.put_u8(error_code);
            }
        }
        Ok(())
    }
}
