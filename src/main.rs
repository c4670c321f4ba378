fn main() {
    #[cfg(feature = "cli")]
    oxipbf::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("oxipbf: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
