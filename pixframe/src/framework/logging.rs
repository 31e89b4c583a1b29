use std::io::Write;
use std::thread;

use env_logger::{Builder, Env};
use log::{Level, LevelFilter};
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

pub use log::{debug, error, info, trace, warn};

pub const DEFAULT_FILTER: &str = "pixframe=info,pixframed=info";
pub const VERBOSE_FILTER: &str = "pixframe=debug,pixframed=debug";

pub fn init_logger() {
    init_logger_with(DEFAULT_FILTER);
}

/// Installs the global logger. `RUST_LOG` still wins over `default_filter`.
/// Calling this more than once is a no-op.
pub fn init_logger_with(default_filter: &str) {
    let mut builder =
        Builder::from_env(Env::default().default_filter_or(default_filter));
    builder.filter_module("notify", LevelFilter::Warn);
    builder.filter_module("mio", LevelFilter::Warn);

    builder.format(|_buf, record| {
        let writer = BufferWriter::stdout(ColorChoice::Auto);
        let mut buffer = writer.buffer();

        let mut level_spec = ColorSpec::new();
        level_spec.set_fg(Some(level_color(record.level())));
        buffer.set_color(&level_spec)?;
        write!(buffer, "[{}]", record.level())?;

        let mut thread_spec = ColorSpec::new();
        thread_spec.set_fg(Some(Color::Magenta)).set_dimmed(true);
        buffer.set_color(&thread_spec)?;
        write!(buffer, "[{}]", thread_label(thread::current().name()))?;
        buffer.reset()?;

        writeln!(
            buffer,
            "[{}] {}",
            short_module(record.module_path().unwrap_or("<unknown>")),
            record.args()
        )?;
        writer.print(&buffer)?;
        Ok(())
    });

    let _ = builder.try_init();
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Trace => Color::Cyan,
        Level::Debug => Color::Blue,
        Level::Info => Color::Green,
        Level::Warn => Color::Yellow,
        Level::Error => Color::Red,
    }
}

fn thread_label(name: Option<&str>) -> &str {
    match name {
        Some(name) => name.strip_prefix("pixframe-").unwrap_or(name),
        None => "?",
    }
}

fn short_module(path: &str) -> &str {
    path.strip_prefix("pixframe::").unwrap_or(path)
}
