fn main() {
    #[cfg(feature = "cli")]
    hdelta::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("hdp: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
