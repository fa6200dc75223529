//! Diagnostic log sinks passed into the render pipeline.

use std::sync::Mutex;

/// Receives diagnostic lines emitted while a map is rendered.
///
/// Components take the sink by reference instead of writing to shared global
/// state, so tests can hand in a [`LogBuffer`] and inspect exactly what a run
/// reported.
pub trait LogSink: Send + Sync {
    fn log(&self, msg: String);
}

/// Append-only, ordered buffer of log lines.
///
/// Every entry is also forwarded to the `log` facade at info level.
#[derive(Debug, Default)]
pub struct LogBuffer {
    entries: Mutex<Vec<String>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the entries recorded so far
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries containing `needle`
    pub fn count_matching(&self, needle: &str) -> usize {
        self.entries
            .lock()
            .map(|e| e.iter().filter(|m| m.contains(needle)).count())
            .unwrap_or(0)
    }
}

impl LogSink for LogBuffer {
    fn log(&self, msg: String) {
        log::info!("{}", msg);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_buffer_preserves_order() {
        let buf = LogBuffer::new();
        assert!(buf.is_empty());
        buf.log("first".to_string());
        buf.log("second".to_string());
        buf.log("second again".to_string());
        assert_eq!(buf.entries(), vec!["first", "second", "second again"]);
        assert_eq!(buf.count_matching("second"), 2);
        assert_eq!(buf.len(), 3);
    }
}
