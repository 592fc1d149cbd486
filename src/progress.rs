//! Live per-slot status display.
//!
//! Every transfer owns one slot (row) in a shared table. Each report redraws
//! the whole table synchronously, which is fine for tables bounded by the
//! parallelism limit.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

/// Moves the cursor home and clears the screen.
const CLEAR_SCREEN: &str = "\x1B[H\x1B[2J";

struct Table {
    statuses: Vec<String>,
    surface: Box<dyn Write + Send>,
    clear: bool,
}

pub struct ProgressTable {
    inner: Mutex<Table>,
}

impl ProgressTable {
    /// A table drawn on stdout, clearing the terminal before each redraw.
    pub fn stdout() -> Self {
        Self::with_surface(Box::new(io::stdout()), true)
    }

    /// A table that keeps statuses but draws nowhere.
    pub fn hidden() -> Self {
        Self::with_surface(Box::new(io::sink()), false)
    }

    pub fn with_surface(surface: Box<dyn Write + Send>, clear: bool) -> Self {
        Self {
            inner: Mutex::new(Table {
                statuses: Vec::new(),
                surface,
                clear,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // A panic while drawing leaves the table usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn report(&self, slot: usize, status: impl Into<String>) {
        let mut table = self.lock();
        if table.statuses.len() <= slot {
            table.statuses.resize(slot + 1, String::new());
        }
        table.statuses[slot] = status.into();

        if let Err(err) = table.render() {
            tracing::trace!("progress redraw failed: {}", err);
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lock().statuses.clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().statuses.len()
    }
}

impl Table {
    fn render(&mut self) -> io::Result<()> {
        let mut frame = String::new();
        if self.clear {
            frame.push_str(CLEAR_SCREEN);
        }
        for status in self.statuses.iter().filter(|s| !s.is_empty()) {
            frame.push_str(status);
            frame.push('\n');
        }
        self.surface.write_all(frame.as_bytes())?;
        self.surface.flush()
    }
}
