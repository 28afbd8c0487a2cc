// src/logger/preamble.rs
//
// Fixed-layout framing header prefixed to every outbound batch:
//
//   byte 0      preamble layout version
//   byte 1      channel tag
//   bytes 2-3   codec id (big-endian)
//   bytes 4-7   payload length (big-endian)

use crate::status::{ApiError, ApiResult};

pub const PREAMBLE_LENGTH: usize = 8;
pub const PREAMBLE_VERSION: u8 = 0;

/// Log channel carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Interaction,
    Observation,
    Episode,
}

impl Channel {
    pub fn tag(&self) -> u8 {
        match self {
            Channel::Interaction => 1,
            Channel::Observation => 2,
            Channel::Episode => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Channel> {
        match tag {
            1 => Some(Channel::Interaction),
            2 => Some(Channel::Observation),
            3 => Some(Channel::Episode),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Interaction => "interaction",
            Channel::Observation => "observation",
            Channel::Episode => "episode",
        }
    }
}

/// Payload codec carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Identity,
    Zstd,
}

impl Codec {
    pub fn id(&self) -> u16 {
        match self {
            Codec::Identity => 0,
            Codec::Zstd => 1,
        }
    }

    pub fn from_id(id: u16) -> Option<Codec> {
        match id {
            0 => Some(Codec::Identity),
            1 => Some(Codec::Zstd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    pub version: u8,
    pub channel: Channel,
    pub codec: Codec,
    pub payload_length: u32,
}

impl Preamble {
    pub fn encode(&self) -> [u8; PREAMBLE_LENGTH] {
        let mut out = [0u8; PREAMBLE_LENGTH];
        out[0] = self.version;
        out[1] = self.channel.tag();
        out[2..4].copy_from_slice(&self.codec.id().to_be_bytes());
        out[4..8].copy_from_slice(&self.payload_length.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> ApiResult<Preamble> {
        if bytes.len() < PREAMBLE_LENGTH {
            return Err(ApiError::content_encoding(format!(
                "frame too short for preamble: {} bytes",
                bytes.len()
            )));
        }
        let channel = Channel::from_tag(bytes[1]).ok_or_else(|| {
            ApiError::content_encoding(format!("unknown channel tag {}", bytes[1]))
        })?;
        let codec_id = u16::from_be_bytes([bytes[2], bytes[3]]);
        let codec = Codec::from_id(codec_id)
            .ok_or_else(|| ApiError::content_encoding(format!("unknown codec id {codec_id}")))?;
        Ok(Preamble {
            version: bytes[0],
            channel,
            codec,
            payload_length: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// Frame a payload: preamble followed by the payload bytes.
pub fn frame_payload(channel: Channel, codec: Codec, payload: &[u8]) -> Vec<u8> {
    let preamble = Preamble {
        version: PREAMBLE_VERSION,
        channel,
        codec,
        payload_length: payload.len() as u32,
    };
    let mut out = Vec::with_capacity(PREAMBLE_LENGTH + payload.len());
    out.extend_from_slice(&preamble.encode());
    out.extend_from_slice(payload);
    out
}
