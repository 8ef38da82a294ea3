//! Typed packets for the login and play states.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::error::{ProtocolError, ProtocolResult};
use crate::protocol::codec::{
    read_string, write_string, write_varint, Packet, PacketDecode, PacketEncode, MAX_STRING_LEN,
};
use crate::protocol::text::flatten_reason;
use crate::protocol::ProtocolVersion;

/// Handshake next-state value for login.
pub const NEXT_STATE_LOGIN: i32 = 2;

/// Login-state packet ids. These are stable across protocol generations.
pub mod login_ids {
    /// Serverbound, handshaking state.
    pub const HANDSHAKE: i32 = 0x00;
    /// Serverbound.
    pub const LOGIN_START: i32 = 0x00;
    /// Clientbound.
    pub const LOGIN_DISCONNECT: i32 = 0x00;
    /// Clientbound.
    pub const LOGIN_SUCCESS: i32 = 0x02;
}

/// Play-state packet ids for one protocol generation.
#[derive(Debug, Clone, Copy)]
pub struct PacketIds {
    pub clientbound_keep_alive: i32,
    pub clientbound_chat: i32,
    pub clientbound_join_game: i32,
    pub clientbound_disconnect: i32,
    pub serverbound_chat: i32,
    pub serverbound_keep_alive: i32,
    pub serverbound_client_settings: i32,
}

impl PacketIds {
    pub fn for_version(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::Legacy => Self {
                clientbound_keep_alive: 0x00,
                clientbound_chat: 0x02,
                clientbound_join_game: 0x01,
                clientbound_disconnect: 0x40,
                serverbound_chat: 0x01,
                serverbound_keep_alive: 0x00,
                serverbound_client_settings: 0x15,
            },
            ProtocolVersion::Modern => Self {
                clientbound_keep_alive: 0x1F,
                clientbound_chat: 0x0F,
                clientbound_join_game: 0x23,
                clientbound_disconnect: 0x1A,
                serverbound_chat: 0x02,
                serverbound_keep_alive: 0x0B,
                serverbound_client_settings: 0x04,
            },
        }
    }
}

/// Serverbound handshake opening the connection.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub protocol_number: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: i32,
}

impl Handshake {
    pub fn login(version: ProtocolVersion, host: &str, port: u16) -> Self {
        Self {
            protocol_number: version.number(),
            server_address: host.to_string(),
            server_port: port,
            next_state: NEXT_STATE_LOGIN,
        }
    }
}

impl PacketEncode for Handshake {
    fn encode(&self, buf: &mut BytesMut) {
        write_varint(buf, self.protocol_number);
        write_string(buf, &self.server_address);
        buf.put_u16(self.server_port);
        write_varint(buf, self.next_state);
    }
}

impl From<Handshake> for Packet {
    fn from(handshake: Handshake) -> Self {
        let mut buf = BytesMut::new();
        handshake.encode(&mut buf);
        Packet::new(login_ids::HANDSHAKE, buf.freeze())
    }
}

/// Serverbound login request.
///
/// Carries the account name; guild servers that authenticate by session
/// token expect it as a trailing string field.
#[derive(Debug, Clone)]
pub struct LoginStart {
    pub username: String,
    pub token: Option<String>,
}

impl PacketEncode for LoginStart {
    fn encode(&self, buf: &mut BytesMut) {
        write_string(buf, &self.username);
        if let Some(ref token) = self.token {
            write_string(buf, token);
        }
    }
}

impl From<LoginStart> for Packet {
    fn from(login: LoginStart) -> Self {
        let mut buf = BytesMut::new();
        login.encode(&mut buf);
        Packet::new(login_ids::LOGIN_START, buf.freeze())
    }
}

/// Clientbound login confirmation.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub uuid: String,
    pub username: String,
}

impl PacketDecode for LoginSuccess {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        let uuid = read_string(buf, MAX_STRING_LEN)?;
        let username = read_string(buf, MAX_STRING_LEN)?;
        Ok(Self { uuid, username })
    }
}

/// Clientbound disconnect, in either state. The reason is a JSON text
/// component; plain-string reasons are tolerated.
#[derive(Debug, Clone)]
pub struct DisconnectPacket {
    pub reason: String,
}

impl PacketDecode for DisconnectPacket {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        let raw = read_string(buf, MAX_STRING_LEN)?;
        Ok(Self {
            reason: flatten_reason(&raw),
        })
    }
}

/// Serverbound client settings, sent once after login succeeds.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub locale: String,
    pub view_distance: i8,
    /// 0 = full chat, 1 = commands only, 2 = hidden.
    pub chat_mode: i32,
    pub chat_colors: bool,
    pub skin_parts: u8,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            locale: "en_US".to_string(),
            view_distance: 2,
            chat_mode: 0,
            chat_colors: true,
            skin_parts: 0,
        }
    }
}

impl PacketEncode for ClientSettings {
    fn encode(&self, buf: &mut BytesMut) {
        write_string(buf, &self.locale);
        buf.put_i8(self.view_distance);
        write_varint(buf, self.chat_mode);
        buf.put_u8(self.chat_colors as u8);
        buf.put_u8(self.skin_parts);
    }
}

impl ClientSettings {
    pub fn into_packet(self, ids: &PacketIds) -> Packet {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        Packet::new(ids.serverbound_client_settings, buf.freeze())
    }
}

/// Keep-alive, both directions.
///
/// The id payload differs between generations (VarInt vs. long), so it is
/// carried opaquely and echoed back verbatim.
#[derive(Debug, Clone)]
pub struct KeepAlive {
    pub payload: Bytes,
}

impl PacketDecode for KeepAlive {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        Ok(Self {
            payload: buf.copy_to_bytes(buf.remaining()),
        })
    }
}

impl KeepAlive {
    pub fn into_packet(self, ids: &PacketIds) -> Packet {
        Packet::new(ids.serverbound_keep_alive, self.payload)
    }
}

/// Clientbound chat line. The body is a JSON text component.
#[derive(Debug, Clone)]
pub struct ClientboundChat {
    pub body: String,
    /// 0 = chat, 1 = system, 2 = action bar (ignored by the bridge).
    pub position: i8,
}

impl ClientboundChat {
    pub const POSITION_ACTION_BAR: i8 = 2;
}

impl PacketDecode for ClientboundChat {
    fn decode(buf: &mut Bytes) -> ProtocolResult<Self> {
        let body = read_string(buf, MAX_STRING_LEN)?;
        if buf.remaining() < 1 {
            return Err(ProtocolError::PacketTooShort {
                needed: 1,
                got: 0,
            });
        }
        let position = buf.get_i8();
        Ok(Self { body, position })
    }
}

/// Serverbound chat line: plain text, one per queued chunk.
#[derive(Debug, Clone)]
pub struct ServerboundChat {
    pub text: String,
}

impl PacketEncode for ServerboundChat {
    fn encode(&self, buf: &mut BytesMut) {
        write_string(buf, &self.text);
    }
}

impl ServerboundChat {
    pub fn into_packet(self, ids: &PacketIds) -> Packet {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        Packet::new(ids.serverbound_chat, buf.freeze())
    }
}
