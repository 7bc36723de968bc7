// Pluggable compression for control and literal frames.
//
// A `Codec` compresses one frame at a time. The patch header stores the
// codec's one-byte tag; the decoder resolves it back with `codec_for_tag`.
//
// Built-in codecs:
//   - Stored (tag 0), no compression
//   - Zlib/Deflate (tag 1, via flate2, feature-gated `zlib-codec`)
//   - LZMA2 (tag 2, via xz2/liblzma, feature-gated `lzma-codec`)
//
// Custom codecs implement the trait and must pick a tag outside 0..=2.

use std::io::{self, Write};
use std::sync::Arc;

use crate::error::{Error, Result};

pub const TAG_STORED: u8 = 0;
pub const TAG_ZLIB: u8 = 1;
pub const TAG_LZMA: u8 = 2;

/// Fixed codec configuration, shared read-only by every frame of a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Compression level (0-9).
    pub level: u32,
    /// Dictionary size in bytes. Frames never exceed it, so every frame is
    /// compressed against a dictionary that covers all of it.
    pub dictionary_size: usize,
    /// Compression threads. Only single-threaded compression is implemented.
    pub thread_hint: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            level: 9,
            dictionary_size: 8 << 20,
            thread_hint: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Codec trait
// ---------------------------------------------------------------------------

/// A compressor/decompressor pair identified by a header tag.
///
/// # Implementing a custom codec
///
/// ```no_run
/// use hdelta::delta::codec::Codec;
///
/// struct Reverse;
///
/// impl Codec for Reverse {
///     fn tag(&self) -> u8 { 42 }
///     fn compress(&self, raw: &[u8]) -> hdelta::Result<Vec<u8>> {
///         Ok(raw.iter().rev().copied().collect())
///     }
///     fn decompress(&self, packed: &[u8], raw_len: usize, out: &mut Vec<u8>) -> hdelta::Result<()> {
///         out.extend(packed.iter().rev());
///         Ok(())
///     }
/// }
/// ```
pub trait Codec: Send + Sync {
    /// The tag stored in the patch header.
    fn tag(&self) -> u8;

    /// Compress one frame.
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>>;

    /// Decompress one frame, appending exactly `raw_len` bytes to `out`.
    ///
    /// Implementations must not write more than `raw_len` bytes; the caller
    /// checks the final length.
    fn decompress(&self, packed: &[u8], raw_len: usize, out: &mut Vec<u8>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Stored
// ---------------------------------------------------------------------------

/// Passthrough codec. Frames are written as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stored;

impl Codec for Stored {
    fn tag(&self) -> u8 {
        TAG_STORED
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, packed: &[u8], raw_len: usize, out: &mut Vec<u8>) -> Result<()> {
        if packed.len() != raw_len {
            return Err(Error::malformed("stored frame length disagrees with its header"));
        }
        out.extend_from_slice(packed);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Zlib
// ---------------------------------------------------------------------------

/// Zlib/Deflate codec (tag 1).
#[cfg(feature = "zlib-codec")]
#[derive(Debug, Clone, Copy)]
pub struct ZlibCodec {
    level: flate2::Compression,
}

#[cfg(feature = "zlib-codec")]
impl ZlibCodec {
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            level: flate2::Compression::new(config.level.min(9)),
        }
    }
}

#[cfg(feature = "zlib-codec")]
impl Codec for ZlibCodec {
    fn tag(&self) -> u8 {
        TAG_ZLIB
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        use flate2::write::ZlibEncoder;

        let fail = |e: io::Error| Error::Encoding(format!("zlib compression failed: {e}"));
        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(raw).map_err(fail)?;
        encoder.finish().map_err(fail)
    }

    fn decompress(&self, packed: &[u8], raw_len: usize, out: &mut Vec<u8>) -> Result<()> {
        use flate2::read::ZlibDecoder;
        use io::Read;

        // One byte of headroom so an oversized frame is detected, not truncated.
        let mut decoder = ZlibDecoder::new(packed).take(raw_len as u64 + 1);
        decoder
            .read_to_end(out)
            .map_err(|e| Error::malformed(format!("zlib decompression failed: {e}")))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LZMA
// ---------------------------------------------------------------------------

/// LZMA2 codec (tag 2), the default.
///
/// Each frame is an independent `.xz` stream with a single LZMA2 filter, so
/// the dictionary size travels with the frame and the decoder needs no
/// configuration.
#[cfg(feature = "lzma-codec")]
#[derive(Debug, Clone, Copy)]
pub struct LzmaCodec {
    preset: u32,
    dictionary_size: usize,
}

/// Smallest dictionary liblzma accepts.
#[cfg(feature = "lzma-codec")]
const LZMA_DICT_MIN: usize = 4096;

#[cfg(feature = "lzma-codec")]
impl LzmaCodec {
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            preset: config.level.min(9),
            dictionary_size: config.dictionary_size.max(LZMA_DICT_MIN),
        }
    }

    /// Dictionary for one frame: the configured size, shrunk to the frame
    /// when the frame is smaller.
    fn frame_dictionary(&self, raw_len: usize) -> u32 {
        let fit = raw_len.max(LZMA_DICT_MIN).checked_next_power_of_two().unwrap_or(usize::MAX);
        fit.min(self.dictionary_size).min(u32::MAX as usize) as u32
    }
}

#[cfg(feature = "lzma-codec")]
impl Codec for LzmaCodec {
    fn tag(&self) -> u8 {
        TAG_LZMA
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
        use xz2::stream::{Check, Filters, LzmaOptions, Stream};
        use xz2::write::XzEncoder;

        let fail = |e: &dyn std::fmt::Display| Error::Encoding(format!("LZMA compression failed: {e}"));
        let mut options = LzmaOptions::new_preset(self.preset).map_err(|e| fail(&e))?;
        options.dict_size(self.frame_dictionary(raw.len()));
        let mut filters = Filters::new();
        filters.lzma2(&options);
        let stream = Stream::new_stream_encoder(&filters, Check::None).map_err(|e| fail(&e))?;

        let mut encoder = XzEncoder::new_stream(Vec::new(), stream);
        encoder.write_all(raw).map_err(|e| fail(&e))?;
        encoder.finish().map_err(|e| fail(&e))
    }

    fn decompress(&self, packed: &[u8], raw_len: usize, out: &mut Vec<u8>) -> Result<()> {
        use io::Read;
        use xz2::read::XzDecoder;
        use xz2::stream::Stream;

        // A frame written by `compress` never needs a dictionary larger than
        // twice its raw length.
        let memlimit = 2 * raw_len.max(LZMA_DICT_MIN) as u64 + (1 << 20);
        let stream = Stream::new_stream_decoder(memlimit, 0)
            .map_err(|e| Error::Encoding(format!("LZMA decoder setup failed: {e}")))?;

        let start = out.len();
        let mut decoder = XzDecoder::new_stream(packed, stream).take(raw_len as u64 + 1);
        decoder
            .read_to_end(out)
            .map_err(|e| Error::malformed(format!("LZMA decompression failed: {e}")))?;
        if out.len() - start > raw_len {
            out.truncate(start + raw_len);
            return Err(Error::malformed("frame decompresses past its declared length"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Which codec an encoder uses.
#[derive(Clone)]
pub enum CodecKind {
    /// No compression.
    Stored,
    /// Zlib/Deflate.
    #[cfg(feature = "zlib-codec")]
    Zlib,
    /// LZMA.
    #[cfg(feature = "lzma-codec")]
    Lzma,
    /// A caller-provided codec.
    Custom(Arc<dyn Codec>),
}

impl Default for CodecKind {
    fn default() -> Self {
        #[cfg(feature = "lzma-codec")]
        {
            Self::Lzma
        }
        #[cfg(not(feature = "lzma-codec"))]
        {
            Self::Stored
        }
    }
}

impl std::fmt::Debug for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stored => write!(f, "Stored"),
            #[cfg(feature = "zlib-codec")]
            Self::Zlib => write!(f, "Zlib"),
            #[cfg(feature = "lzma-codec")]
            Self::Lzma => write!(f, "Lzma"),
            Self::Custom(c) => write!(f, "Custom(tag={})", c.tag()),
        }
    }
}

impl CodecKind {
    /// Build the codec implementation for this kind.
    pub fn build(&self, config: &CodecConfig) -> Arc<dyn Codec> {
        match self {
            Self::Stored => Arc::new(Stored),
            #[cfg(feature = "zlib-codec")]
            Self::Zlib => Arc::new(ZlibCodec::new(config)),
            #[cfg(feature = "lzma-codec")]
            Self::Lzma => Arc::new(LzmaCodec::new(config)),
            Self::Custom(c) => {
                let _ = config;
                c.clone()
            }
        }
    }

    /// Parse a codec name as used on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "stored" | "none" => Some(Self::Stored),
            #[cfg(feature = "zlib-codec")]
            "zlib" => Some(Self::Zlib),
            #[cfg(feature = "lzma-codec")]
            "lzma" => Some(Self::Lzma),
            _ => None,
        }
    }
}

/// Look up a decompressor by header tag, trying caller-registered codecs
/// before the built-in ones.
pub fn resolve(tag: u8, extra: &[Arc<dyn Codec>], config: &CodecConfig) -> Result<Arc<dyn Codec>> {
    if let Some(codec) = extra.iter().find(|c| c.tag() == tag) {
        return Ok(codec.clone());
    }
    codec_for_tag(tag, config)
}

/// Look up a built-in decompressor by header tag.
pub fn codec_for_tag(tag: u8, config: &CodecConfig) -> Result<Arc<dyn Codec>> {
    match tag {
        TAG_STORED => Ok(Arc::new(Stored)),
        #[cfg(feature = "zlib-codec")]
        TAG_ZLIB => Ok(Arc::new(ZlibCodec::new(config))),
        #[cfg(feature = "lzma-codec")]
        TAG_LZMA => Ok(Arc::new(LzmaCodec::new(config))),
        other => {
            let _ = config;
            Err(Error::UnsupportedCodec(other))
        }
    }
}

/// Whether `codec_for_tag` would accept `tag`.
pub fn is_supported(tag: u8) -> bool {
    codec_for_tag(tag, &CodecConfig::default()).is_ok()
}

/// Human-readable codec name for a tag.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_STORED => "stored",
        TAG_ZLIB => "zlib",
        TAG_LZMA => "lzma",
        _ => "unknown",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn repetitive(total: usize) -> Vec<u8> {
        b"Hello, world! This is test data. "
            .iter()
            .copied()
            .cycle()
            .take(total)
            .collect()
    }

    fn roundtrip(codec: &dyn Codec, data: &[u8]) {
        let packed = codec.compress(data).unwrap();
        let mut out = Vec::new();
        codec.decompress(&packed, data.len(), &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn stored_passthrough() {
        roundtrip(&Stored, b"test data");
        let mut out = Vec::new();
        assert!(Stored.decompress(b"abc", 4, &mut out).is_err());
    }

    #[cfg(feature = "lzma-codec")]
    #[test]
    fn lzma_roundtrip_and_shrinks() {
        let codec = LzmaCodec::new(&CodecConfig::default());
        let data = repetitive(4096);
        let packed = codec.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        roundtrip(&codec, &data);
        roundtrip(&codec, b"");
    }

    #[cfg(feature = "lzma-codec")]
    #[test]
    fn lzma_refuses_to_exceed_declared_length() {
        let codec = LzmaCodec::new(&CodecConfig::default());
        let data = repetitive(1024);
        let packed = codec.compress(&data).unwrap();
        let mut out = Vec::new();
        let err = codec.decompress(&packed, 100, &mut out).unwrap_err();
        assert!(matches!(err, Error::MalformedPatch(_)));
        assert!(out.len() <= 100);
    }

    #[cfg(feature = "lzma-codec")]
    #[test]
    fn lzma_garbage_rejected() {
        let codec = LzmaCodec::new(&CodecConfig::default());
        let mut out = Vec::new();
        let err = codec.decompress(b"definitely not xz", 10, &mut out).unwrap_err();
        assert!(matches!(err, Error::MalformedPatch(_)));
    }

    #[cfg(feature = "lzma-codec")]
    #[test]
    fn lzma_frame_dictionary_follows_config() {
        let codec = LzmaCodec::new(&CodecConfig::default());
        assert_eq!(codec.frame_dictionary(0), 4096);
        assert_eq!(codec.frame_dictionary(5000), 8192);
        assert_eq!(codec.frame_dictionary(64 << 20), 8 << 20);

        let small = LzmaCodec::new(&CodecConfig {
            dictionary_size: 1 << 16,
            ..Default::default()
        });
        assert_eq!(small.frame_dictionary(1 << 20), 1 << 16);
        roundtrip(&small, &repetitive(1 << 18));
    }

    #[cfg(all(feature = "lzma-codec", feature = "zlib-codec"))]
    #[test]
    fn lzma_at_least_as_small_as_zlib() {
        let config = CodecConfig::default();
        let lzma = LzmaCodec::new(&config);
        let zlib = ZlibCodec::new(&config);

        let digits: Vec<u8> = b"0123456789abcdef".iter().copied().cycle().take(256 << 10).collect();
        let mut s = 11u64;
        let words = ["delta", "patch", "frame", "window", "literal", "copy", "stream", "header"];
        let mut text = Vec::new();
        while text.len() < 256 << 10 {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            text.extend_from_slice(words[(s >> 61) as usize].as_bytes());
            text.push(b' ');
        }

        for data in [digits, text] {
            let by_lzma = lzma.compress(&data).unwrap().len();
            let by_zlib = zlib.compress(&data).unwrap().len();
            assert!(by_lzma <= by_zlib, "lzma={by_lzma} zlib={by_zlib}");
            roundtrip(&lzma, &data);
        }
    }

    #[cfg(feature = "zlib-codec")]
    #[test]
    fn zlib_roundtrip_and_shrinks() {
        let codec = ZlibCodec::new(&CodecConfig::default());
        let data = repetitive(4096);
        let packed = codec.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        roundtrip(&codec, &data);
    }

    #[cfg(feature = "zlib-codec")]
    #[test]
    fn zlib_garbage_rejected() {
        let codec = ZlibCodec::new(&CodecConfig::default());
        let mut out = Vec::new();
        assert!(codec.decompress(b"not zlib at all", 10, &mut out).is_err());
    }

    #[test]
    fn tag_dispatch() {
        let config = CodecConfig::default();
        assert_eq!(codec_for_tag(TAG_STORED, &config).unwrap().tag(), TAG_STORED);
        #[cfg(feature = "zlib-codec")]
        assert_eq!(codec_for_tag(TAG_ZLIB, &config).unwrap().tag(), TAG_ZLIB);
        #[cfg(feature = "lzma-codec")]
        assert_eq!(codec_for_tag(TAG_LZMA, &config).unwrap().tag(), TAG_LZMA);
        assert!(matches!(
            codec_for_tag(99, &config),
            Err(Error::UnsupportedCodec(99))
        ));
        assert!(!is_supported(99));
    }

    #[test]
    fn kind_names() {
        assert!(matches!(CodecKind::from_name("none"), Some(CodecKind::Stored)));
        #[cfg(feature = "lzma-codec")]
        assert!(matches!(CodecKind::from_name("LZMA"), Some(CodecKind::Lzma)));
        assert!(CodecKind::from_name("brotli").is_none());
    }

    #[test]
    fn custom_codec_keeps_its_tag() {
        struct Reverse;
        impl Codec for Reverse {
            fn tag(&self) -> u8 {
                42
            }
            fn compress(&self, raw: &[u8]) -> Result<Vec<u8>> {
                Ok(raw.iter().rev().copied().collect())
            }
            fn decompress(&self, packed: &[u8], _raw_len: usize, out: &mut Vec<u8>) -> Result<()> {
                out.extend(packed.iter().rev());
                Ok(())
            }
        }
        let kind = CodecKind::Custom(Arc::new(Reverse));
        let codec = kind.build(&CodecConfig::default());
        assert_eq!(codec.tag(), 42);
        roundtrip(codec.as_ref(), b"hello world");

        let config = CodecConfig::default();
        assert!(codec_for_tag(42, &config).is_err());
        assert_eq!(resolve(42, &[codec], &config).unwrap().tag(), 42);
    }
}
