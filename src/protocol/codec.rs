//! Packet framing codec and primitive read/write helpers.
//!
//! Frames are `[VarInt frame length][VarInt packet id][payload]`. The codec
//! is stateless; packet ids are interpreted by the session layer, which
//! knows the protocol generation.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::common::error::{ProtocolError, ProtocolResult};

/// Upper bound on a single frame. Anything larger is a broken peer.
pub const MAX_FRAME_LEN: usize = 2 * 1024 * 1024;

/// Longest string accepted in any packet field.
pub const MAX_STRING_LEN: usize = 64 * 1024;

/// A framed protocol packet.
#[derive(Debug, Clone)]
pub struct Packet {
    pub id: i32,
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet with the given id and payload.
    pub fn new(id: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Create an empty packet with just an id.
    pub fn empty(id: i32) -> Self {
        Self {
            id,
            payload: Bytes::new(),
        }
    }
}

/// Trait for types that can be encoded into a packet payload.
pub trait PacketEncode {
    fn encode(&self, buf: &mut BytesMut);
}

/// Trait for types that can be decoded from a packet payload.
pub trait PacketDecode: Sized {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self>;
}

/// Read a VarInt, consuming its bytes.
pub fn read_varint(buf: &mut Bytes) -> ProtocolResult<i32> {
    let mut value: u32 = 0;
    for shift in 0..5 {
        if buf.remaining() < 1 {
            return Err(ProtocolError::PacketTooShort {
                needed: 1,
                got: 0,
            });
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u32) << (shift * 7);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProtocolError::MalformedVarInt)
}

/// Write a VarInt.
pub fn write_varint(buf: &mut BytesMut, value: i32) {
    let mut value = value as u32;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Decode a VarInt from the start of a buffer without consuming it.
///
/// Returns `Ok(None)` when more bytes are needed.
fn peek_varint(src: &[u8]) -> ProtocolResult<Option<(i32, usize)>> {
    let mut value: u32 = 0;
    for (i, &byte) in src.iter().take(5).enumerate() {
        value |= ((byte & 0x7F) as u32) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok(Some((value as i32, i + 1)));
        }
    }
    if src.len() >= 5 {
        return Err(ProtocolError::MalformedVarInt);
    }
    Ok(None)
}

/// Read a length-prefixed UTF-8 string.
pub fn read_string(buf: &mut Bytes, max_len: usize) -> ProtocolResult<String> {
    let len = read_varint(buf)?;
    if len < 0 || len as usize > max_len {
        return Err(ProtocolError::InvalidString {
            message: format!("string length {} out of bounds (max {})", len, max_len),
        });
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::PacketTooShort {
            needed: len,
            got: buf.remaining(),
        });
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|e| ProtocolError::InvalidString {
        message: e.to_string(),
    })
}

/// Write a length-prefixed UTF-8 string.
pub fn write_string(buf: &mut BytesMut, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Codec for VarInt-framed packets.
#[derive(Debug, Default)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (frame_len, header_len) = match peek_varint(src)? {
            Some(v) => v,
            None => return Ok(None),
        };

        if frame_len < 0 {
            return Err(ProtocolError::InvalidPacket {
                message: format!("negative frame length {}", frame_len),
            });
        }
        let frame_len = frame_len as usize;
        if frame_len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                size: frame_len,
                max: MAX_FRAME_LEN,
            });
        }

        if src.len() < header_len + frame_len {
            src.reserve(header_len + frame_len - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let mut frame = src.split_to(frame_len).freeze();
        let id = read_varint(&mut frame)?;

        Ok(Some(Packet { id, payload: frame }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = BytesMut::with_capacity(5 + item.payload.len());
        write_varint(&mut body, item.id);
        body.put_slice(&item.payload);

        write_varint(dst, body.len() as i32);
        dst.put_slice(&body);
        Ok(())
    }
}

/// A framed game server connection.
pub type Connection<S> = Framed<S, PacketCodec>;

/// Create a new framed connection from a stream.
pub fn new_connection<S: AsyncRead + AsyncWrite>(stream: S) -> Connection<S> {
    Framed::new(stream, PacketCodec)
}
