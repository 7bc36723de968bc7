use std::sync::Arc;

use hdelta::delta::codec::Codec;
use hdelta::{CodecKind, DiffOptions, PatchOptions};

struct XorCodec {
    key: u8,
}

impl Codec for XorCodec {
    fn tag(&self) -> u8 {
        200
    }

    fn compress(&self, raw: &[u8]) -> hdelta::Result<Vec<u8>> {
        Ok(raw.iter().map(|b| b ^ self.key).collect())
    }

    fn decompress(&self, packed: &[u8], _raw_len: usize, out: &mut Vec<u8>) -> hdelta::Result<()> {
        out.extend(packed.iter().map(|b| b ^ self.key));
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let old = b"same old contents";
    let new = b"same old contents with edits";

    let codec: Arc<dyn Codec> = Arc::new(XorCodec { key: 0x5A });
    let delta = hdelta::diff_with_options(
        old,
        new,
        &DiffOptions {
            codec: CodecKind::Custom(codec.clone()),
            ..Default::default()
        },
    )?;
    println!("custom codec produced a {}-byte delta", delta.len());

    // Without the codec registered the patch is rejected by tag.
    match hdelta::patch(old, &delta) {
        Err(err) => println!("plain patch: {err}"),
        Ok(_) => println!("plain patch unexpectedly succeeded"),
    }

    let restored = hdelta::patch_with_options(
        old,
        &delta,
        &PatchOptions {
            codecs: vec![codec],
            ..Default::default()
        },
    )?;
    assert_eq!(restored, new);
    println!("registered codec restored {} bytes", restored.len());
    Ok(())
}
