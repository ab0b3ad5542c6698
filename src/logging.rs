use std::io::Write;
use std::sync::Once;

use log::LevelFilter;

static LOG_ONCE: Once = Once::new();

fn env_level() -> LevelFilter {
    std::env::var("PICO_SCOPE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .as_deref()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info)
}

fn effective_level(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug.max(env_level())
    } else {
        env_level()
    }
}

/// Install the stderr logger. Diagnostics go here; stdout is reserved for CSV.
pub fn init_logging(debug: bool) {
    let level = effective_level(debug);
    LOG_ONCE.call_once(|| {
        env_logger::Builder::new()
            .filter_level(level)
            .format(|buf, record| writeln!(buf, "{:<5} {}", record.level(), record.args()))
            .init();
    });
}
