//! C1: wire codec — request serialization, response parsing, chunked
//! framing, and content decoders (§4.1).

pub mod chunked;
pub mod decode;
pub mod request;
pub mod response;

pub use chunked::ChunkedReader;
pub use decode::DecoderChain;
pub use request::{BodyFraming, RequestLine};
pub use response::{BodyLength, ResponseHead};
