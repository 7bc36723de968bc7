#![no_main]
use hdelta::{CodecKind, DiffOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let match_score = u32::from(data[0] % 16);
    let codec = match data[1] % 3 {
        0 => CodecKind::Stored,
        1 => CodecKind::from_name("zlib").unwrap_or_default(),
        _ => CodecKind::default(),
    };
    let payload = &data[2..];
    let split = payload.len() / 2;
    let (old, new) = payload.split_at(split);

    let options = DiffOptions {
        match_score,
        codec,
        ..Default::default()
    };
    let delta = hdelta::diff_with_options(old, new, &options).expect("diff failed");
    let restored = hdelta::patch(old, &delta).expect("patch failed");
    assert_eq!(restored, new);
});
