//! gRPC codec for messages described only at runtime.
//!
//! Generated clients rely on `prost`'s compile-time message types. The engine
//! schema is discovered through reflection instead, so requests and replies
//! are [`DynamicMessage`] values and the decoder needs the reply descriptor to
//! know what it is reading.

use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// Codec pairing a dynamic encoder with a decoder for one incoming type.
///
/// Clients pass the reply descriptor; servers pass the request descriptor.
#[derive(Clone, Debug)]
pub struct DynamicCodec {
    incoming: MessageDescriptor,
}

impl DynamicCodec {
    /// Create a codec decoding messages described by `incoming`.
    #[must_use]
    pub const fn new(incoming: MessageDescriptor) -> Self { Self { incoming } }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder { DynamicEncoder }

    fn decoder(&mut self) -> Self::Decoder { DynamicDecoder(self.incoming.clone()) }
}

/// Encodes any [`DynamicMessage`] using its own descriptor.
#[derive(Clone, Copy, Debug, Default)]
pub struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(dst)
            .map_err(|err| Status::internal(format!("failed to encode message: {err}")))
    }
}

/// Decodes bytes into a [`DynamicMessage`] of a fixed type.
#[derive(Clone, Debug)]
pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        DynamicMessage::decode(self.0.clone(), src)
            .map(Some)
            .map_err(|err| Status::internal(format!("failed to decode message: {err}")))
    }
}
