use tracing::info;
use tracing_subscriber::fmt::time::uptime;
use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber. `RUST_LOG` wins over `quiet`.
pub fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(uptime())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub struct ConsoleProgress {
    enabled: bool,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.enabled {
            return;
        }
        info!("{}", msg.as_ref());
    }

    pub fn banner(&self, title: &str) {
        if !self.enabled {
            return;
        }
        info!("==== {title} ====");
    }

    pub fn progress(&self, label: &str, current: usize, total: usize) {
        if !self.enabled {
            return;
        }
        info!("{}", progress_line(label, current, total));
    }
}

fn progress_line(label: &str, current: usize, total: usize) -> String {
    let total = total.max(1);
    let current = current.min(total);
    let pct = (current as f64 / total as f64) * 100.0;
    format!("{label} {current}/{total} ({pct:5.1}%)")
}
