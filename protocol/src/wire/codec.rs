//! # Message Codec
//!
//! Typed request/response envelopes and their byte encoding.
//!
//! ## Envelope Layout
//!
//! ```text
//! request  = version: u16 | action: u32 | shard: Location | hash: ContentHash
//! response = version: u16 | action: u32 | payload: Option<Payload>
//! ```
//!
//! Envelopes are bincode-encoded with a size limit. Trailing bytes are
//! ignored, so a newer peer may append fields and older readers still
//! decode the prefix they understand. The `version` field is checked
//! against [`MIN_CODEC_VERSION`] before anything else is trusted.
//!
//! Action tags travel as raw integers and are mapped onto the typed enums
//! after decoding. An unknown tag is an [`CodecError::UnsupportedAction`];
//! a payload variant that disagrees with the action is a
//! [`CodecError::MalformedPayload`].

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{CODEC_VERSION, MAX_FRAME_SIZE, MIN_CODEC_VERSION};
use crate::types::{Block, ContentHash, Header, Location, Transaction};
use crate::wire::error::CodecError;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// What a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestAction {
    Block,
    Header,
    Transaction,
}

impl RequestAction {
    pub fn tag(self) -> u32 {
        match self {
            RequestAction::Block => 1,
            RequestAction::Header => 2,
            RequestAction::Transaction => 3,
        }
    }

    pub fn from_tag(tag: u32) -> Result<Self, CodecError> {
        match tag {
            1 => Ok(RequestAction::Block),
            2 => Ok(RequestAction::Header),
            3 => Ok(RequestAction::Transaction),
            other => Err(CodecError::UnsupportedAction(other)),
        }
    }

    /// The response action that answers this request.
    pub fn response(self) -> ResponseAction {
        match self {
            RequestAction::Block => ResponseAction::Block,
            RequestAction::Header => ResponseAction::Header,
            RequestAction::Transaction => ResponseAction::Transaction,
        }
    }
}

/// What a response carries. `Unknown` signals a decode or dispatch failure
/// on the serving side and never has a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseAction {
    Unknown,
    Block,
    Header,
    Transaction,
}

impl ResponseAction {
    pub fn tag(self) -> u32 {
        match self {
            ResponseAction::Unknown => 0,
            ResponseAction::Block => 1,
            ResponseAction::Header => 2,
            ResponseAction::Transaction => 3,
        }
    }

    pub fn from_tag(tag: u32) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(ResponseAction::Unknown),
            1 => Ok(ResponseAction::Block),
            2 => Ok(ResponseAction::Header),
            3 => Ok(ResponseAction::Transaction),
            other => Err(CodecError::UnsupportedAction(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// A resolved object carried by a response or a gossip message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Block(Block),
    Header(Header),
    Transaction(Transaction),
}

impl Payload {
    /// The response action this payload belongs under.
    pub fn action(&self) -> ResponseAction {
        match self {
            Payload::Block(_) => ResponseAction::Block,
            Payload::Header(_) => ResponseAction::Header,
            Payload::Transaction(_) => ResponseAction::Transaction,
        }
    }

    /// Identity of the carried object.
    pub fn hash(&self) -> ContentHash {
        match self {
            Payload::Block(block) => block.hash(),
            Payload::Header(header) => header.hash(),
            Payload::Transaction(tx) => tx.hash(),
        }
    }
}

/// Decoded request envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub action: RequestAction,
    pub shard: Location,
    pub hash: ContentHash,
}

impl Request {
    pub fn new(action: RequestAction, shard: Location, hash: ContentHash) -> Self {
        Self {
            action,
            shard,
            hash,
        }
    }
}

/// Decoded response envelope.
///
/// A response with a typed action and no payload is a valid "not found"
/// answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub action: ResponseAction,
    pub payload: Option<Payload>,
}

impl Response {
    pub fn found(payload: Payload) -> Self {
        Self {
            action: payload.action(),
            payload: Some(payload),
        }
    }

    pub fn not_found(action: RequestAction) -> Self {
        Self {
            action: action.response(),
            payload: None,
        }
    }

    pub fn unknown() -> Self {
        Self {
            action: ResponseAction::Unknown,
            payload: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.payload.is_some()
    }
}

#[derive(Serialize, Deserialize)]
struct WireRequest {
    version: u16,
    action: u32,
    shard: Location,
    hash: ContentHash,
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    version: u16,
    action: u32,
    payload: Option<Payload>,
}

#[derive(Serialize, Deserialize)]
struct WireData<T> {
    version: u16,
    data: T,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_FRAME_SIZE as u64)
        .allow_trailing_bytes()
}

fn check_version(version: u16) -> Result<(), CodecError> {
    if version < MIN_CODEC_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn encode_request(request: &Request) -> Result<Vec<u8>, CodecError> {
    let wire = WireRequest {
        version: CODEC_VERSION,
        action: request.action.tag(),
        shard: request.shard,
        hash: request.hash,
    };
    Ok(options().serialize(&wire)?)
}

pub fn decode_request(bytes: &[u8]) -> Result<Request, CodecError> {
    let wire: WireRequest = options().deserialize(bytes)?;
    check_version(wire.version)?;
    Ok(Request {
        action: RequestAction::from_tag(wire.action)?,
        shard: wire.shard,
        hash: wire.hash,
    })
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Encodes a response as given. Consistency between action and payload is
/// enforced on decode.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, CodecError> {
    let wire = WireResponse {
        version: CODEC_VERSION,
        action: response.action.tag(),
        payload: response.payload.clone(),
    };
    Ok(options().serialize(&wire)?)
}

pub fn decode_response(bytes: &[u8]) -> Result<Response, CodecError> {
    let wire: WireResponse = options().deserialize(bytes)?;
    check_version(wire.version)?;
    let action = ResponseAction::from_tag(wire.action)?;

    if let Some(payload) = &wire.payload {
        if action == ResponseAction::Unknown {
            return Err(CodecError::MalformedPayload(
                "unknown response carries a payload".to_string(),
            ));
        }
        if payload.action() != action {
            return Err(CodecError::MalformedPayload(format!(
                "{:?} response carries a {:?} payload",
                action,
                payload.action()
            )));
        }
    }

    Ok(Response {
        action,
        payload: wire.payload,
    })
}

// ---------------------------------------------------------------------------
// Gossip Data
// ---------------------------------------------------------------------------

/// Encodes a single block, header or transaction for publication on a
/// gossip topic. The topic, not the bytes, says which type it is.
pub fn encode_data<T: Serialize>(data: &T) -> Result<Vec<u8>, CodecError> {
    Ok(options().serialize(&WireData {
        version: CODEC_VERSION,
        data,
    })?)
}

pub fn decode_data<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let wire: WireData<T> = options().deserialize(bytes)?;
    check_version(wire.version)?;
    Ok(wire.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header() -> Header {
        Header {
            parent_hash: ContentHash::digest(b"parent"),
            number: 42,
            location: Location::Zone(0, 0),
            state_root: ContentHash::ZERO,
            tx_root: ContentHash::ZERO,
            gas_limit: 10_000_000,
            gas_used: 21_000,
            timestamp: 1_700_000_000_000,
        }
    }

    fn make_block() -> Block {
        Block::new(
            make_header(),
            vec![Transaction {
                nonce: 1,
                to: None,
                value: 0,
                gas: 53_000,
                gas_price: 2,
                input: vec![0x60, 0x80],
            }],
        )
    }

    fn raw_response(version: u16, action: u32, payload: Option<Payload>) -> Vec<u8> {
        options()
            .serialize(&WireResponse {
                version,
                action,
                payload,
            })
            .unwrap()
    }

    #[test]
    fn requests_decode_to_what_was_encoded() {
        let hash = ContentHash::digest(b"block");
        for action in [
            RequestAction::Block,
            RequestAction::Header,
            RequestAction::Transaction,
        ] {
            for shard in [Location::Prime, Location::Region(1), Location::Zone(1, 2)] {
                let request = Request::new(action, shard, hash);
                let bytes = encode_request(&request).unwrap();
                assert_eq!(decode_request(&bytes).unwrap(), request);
            }
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let request = Request::new(RequestAction::Header, Location::Region(3), ContentHash::ZERO);
        assert_eq!(
            encode_request(&request).unwrap(),
            encode_request(&request).unwrap()
        );
    }

    #[test]
    fn found_and_not_found_responses_decode() {
        let found = Response::found(Payload::Block(make_block()));
        let decoded = decode_response(&encode_response(&found).unwrap()).unwrap();
        assert_eq!(decoded, found);
        assert!(decoded.is_found());

        let missing = Response::not_found(RequestAction::Header);
        let decoded = decode_response(&encode_response(&missing).unwrap()).unwrap();
        assert_eq!(decoded.action, ResponseAction::Header);
        assert!(!decoded.is_found());
    }

    #[test]
    fn unknown_action_tag_is_rejected() {
        let bytes = options()
            .serialize(&WireRequest {
                version: CODEC_VERSION,
                action: 9,
                shard: Location::Prime,
                hash: ContentHash::ZERO,
            })
            .unwrap();
        assert_eq!(decode_request(&bytes), Err(CodecError::UnsupportedAction(9)));
        assert_eq!(
            decode_response(&raw_response(CODEC_VERSION, 7, None)),
            Err(CodecError::UnsupportedAction(7))
        );
    }

    #[test]
    fn block_action_with_header_payload_is_malformed() {
        let bytes = raw_response(
            CODEC_VERSION,
            ResponseAction::Block.tag(),
            Some(Payload::Header(make_header())),
        );
        assert!(matches!(
            decode_response(&bytes),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[test]
    fn unknown_response_must_be_empty() {
        let bytes = raw_response(
            CODEC_VERSION,
            ResponseAction::Unknown.tag(),
            Some(Payload::Header(make_header())),
        );
        assert!(matches!(
            decode_response(&bytes),
            Err(CodecError::MalformedPayload(_))
        ));
        let bytes = encode_response(&Response::unknown()).unwrap();
        assert_eq!(decode_response(&bytes).unwrap(), Response::unknown());
    }

    #[test]
    fn stale_version_is_rejected() {
        let bytes = raw_response(0, ResponseAction::Block.tag(), None);
        assert_eq!(
            decode_response(&bytes),
            Err(CodecError::UnsupportedVersion(0))
        );
    }

    #[test]
    fn trailing_fields_from_newer_peers_are_ignored() {
        let request = Request::new(RequestAction::Block, Location::Zone(0, 0), ContentHash::ZERO);
        let mut bytes = encode_request(&request).unwrap();
        bytes.extend_from_slice(&[0xFF, 0x01, 0x02]);
        assert_eq!(decode_request(&bytes).unwrap(), request);
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        assert!(matches!(
            decode_request(&[0xFF]),
            Err(CodecError::Serialization(_))
        ));
        assert!(matches!(
            decode_response(&[]),
            Err(CodecError::Serialization(_))
        ));
    }

    #[test]
    fn gossip_data_roundtrips_per_type() {
        let block = make_block();
        let bytes = encode_data(&block).unwrap();
        assert_eq!(decode_data::<Block>(&bytes).unwrap(), block);
        assert!(decode_data::<Block>(&[1, 2, 3]).is_err());
    }
}
