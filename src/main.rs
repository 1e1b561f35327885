fn main() {
    #[cfg(feature = "cli")]
    unrepeat::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("unrepeat: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
