use chrono::Local;
use log::LevelFilter;
use std::io::{self, Write};

use env_logger::{Builder, Target};

/// Environment variable naming a file that mirrors the log output
pub const LOG_FILE_ENV: &str = "HEATSTAKE_LOG_FILE";

/// Multi-writer for logging to both file and stderr
struct DualWriter {
    file: std::fs::File,
    stderr: io::Stderr,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        self.stderr.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.stderr.flush()?;
        Ok(())
    }
}

/// Install the global logger. Level comes from `RUST_LOG` (default `info`);
/// output also goes to the file in `HEATSTAKE_LOG_FILE` when set.
pub fn init_logger() {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env();

    let log_file = std::env::var(LOG_FILE_ENV).ok();
    if let Some(path) = &log_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(DualWriter {
                    file,
                    stderr: io::stderr(),
                })));
            }
            Err(err) => eprintln!("Failed to open log file '{path}': {err}"),
        }
    }

    builder.init();
    if let Some(path) = log_file {
        log::info!("Logging mirrored to {path}");
    }
}
