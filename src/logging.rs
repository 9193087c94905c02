//! Subscriber setup for binaries, benches and tests.

use tracing::Level;

/// Install a fmt subscriber at INFO. Later calls are no-ops.
pub fn init_logging() {
    init_logging_at(Level::INFO);
}

pub fn init_logging_at(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}
