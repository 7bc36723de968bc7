// Delta codec: encoding, decoding and verification of patches.
//
// - `codec`    pluggable frame compression (stored, zlib, LZMA, custom)
// - `pipeline` operation coalescing and invariant checks
// - `encoder`  in-memory and streaming patch writers
// - `decoder`  header parsing, scratch sizing, operation replay
// - `verify`   decode-and-compare check run after every encode

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod pipeline;
pub mod verify;

pub use codec::{Codec, CodecConfig, CodecKind};
pub use decoder::{DecodeSummary, PatchOptions, Scratch};
pub use encoder::{DiffOptions, EncodeSummary};
