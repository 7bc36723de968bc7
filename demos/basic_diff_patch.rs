fn main() -> Result<(), Box<dyn std::error::Error>> {
    let old = b"Hello from the old build of this file".repeat(8);
    let mut new = old.clone();
    new.splice(40..45, b"patched".iter().copied());
    new.extend_from_slice(b" plus a trailer");

    let delta = hdelta::diff(&old, &new)?;
    let restored = hdelta::patch(&old, &delta)?;
    assert_eq!(restored, new);

    let header = hdelta::inspect(&delta)?;
    println!(
        "old {} bytes + delta {} bytes -> new {} bytes (codec tag {})",
        header.old_size,
        delta.len(),
        restored.len(),
        header.compress_type_tag
    );

    Ok(())
}
