//! Walkthrough entry point.

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting TableState walkthrough");

    if let Err(e) = tablestate_demo::run() {
        log::error!("Walkthrough failed: {}", e);
        std::process::exit(1);
    }
}
