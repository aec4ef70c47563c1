//! Frame codec for sync channel messages
//!
//! Text frames carry JSON, binary frames carry MessagePack. Control frames
//! (ping/pong/close) decode to `None`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tungstenite::Message;

use crate::messages::{ClientMessage, ServerEvent};

/// Protocol-level failures
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed json frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed msgpack frame: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
    #[error("failed to encode msgpack frame: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),
}

/// Wire encoding of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Json,
    MsgPack,
}

impl Codec {
    pub fn encode<T: Serialize>(self, value: &T) -> Result<Message, ProtocolError> {
        match self {
            Self::Json => Ok(Message::Text(serde_json::to_string(value)?)),
            Self::MsgPack => Ok(Message::Binary(rmp_serde::to_vec_named(value)?)),
        }
    }
}

/// Decode a data frame, reporting which codec it used
pub fn decode<T: DeserializeOwned>(msg: &Message) -> Result<Option<(Codec, T)>, ProtocolError> {
    match msg {
        Message::Text(text) => Ok(Some((Codec::Json, serde_json::from_str(text)?))),
        Message::Binary(bytes) => Ok(Some((Codec::MsgPack, rmp_serde::from_slice(bytes)?))),
        _ => Ok(None),
    }
}

pub fn decode_client(msg: &Message) -> Result<Option<(Codec, ClientMessage)>, ProtocolError> {
    decode(msg)
}

pub fn decode_server(msg: &Message) -> Result<Option<(Codec, ServerEvent)>, ProtocolError> {
    decode(msg)
}
