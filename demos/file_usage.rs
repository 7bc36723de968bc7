use hdelta::{Dispatcher, Task};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("hdelta-demo-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let old_path = dir.join("old.bin");
    let new_path = dir.join("new.bin");
    let diff_path = dir.join("delta.hdp");
    let out_path = dir.join("restored.bin");

    let old: Vec<u8> = (0..200_000u32).map(|i| (i * 7 % 251) as u8).collect();
    let mut new = old[50_000..].to_vec();
    new.extend_from_slice(&old[..50_000]);
    std::fs::write(&old_path, &old)?;
    std::fs::write(&new_path, &new)?;

    let stats = hdelta::diff_file_with_stats(&old_path, &new_path, &diff_path, &Default::default())?;
    println!(
        "diff: {} + {} bytes -> {} bytes ({} ops)",
        stats.old_size, stats.new_size, stats.diff_size, stats.operations
    );

    // The same work through the worker pool.
    let dispatcher = Dispatcher::new(2)?;
    let handle = dispatcher.submit(Task::patch_file(&old_path, &diff_path, &out_path));
    let written = handle.wait()?;
    println!("patched into {:?}", written.into_path());
    assert_eq!(std::fs::read(&out_path)?, new);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
