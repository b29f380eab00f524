fn main() {
    #[cfg(feature = "cli")]
    blazer::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("blazer: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
