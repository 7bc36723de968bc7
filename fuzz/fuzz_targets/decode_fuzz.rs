#![no_main]
use libfuzzer_sys::fuzz_target;

// Large declared outputs only exercise the allocator.
const MAX_NEW_SIZE: u64 = 16 << 20;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    // First byte picks where old ends and the patch begins.
    let split = 1 + (data[0] as usize % data.len());
    let (old, diff) = data[1..].split_at(split - 1);

    let Ok(header) = hdelta::inspect(diff) else {
        return;
    };
    if header.new_size > MAX_NEW_SIZE {
        return;
    }
    let _ = hdelta::patch(old, diff);
    let _ = hdelta::patch(&vec![0u8; header.old_size.min(MAX_NEW_SIZE) as usize], diff);
});
