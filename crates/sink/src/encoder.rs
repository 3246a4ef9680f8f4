use serde::Serialize;
use tickertape_core::Result;

/// Serializes values into newline-terminated JSON records.
///
/// The output buffer is reused across calls. JSON string escaping guarantees
/// a record never contains a raw newline, so one record is exactly one line.
#[derive(Debug, Default)]
pub struct RecordEncoder {
    buf: Vec<u8>,
}

impl RecordEncoder {
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Encode one value. The returned slice is valid until the next call.
    ///
    /// On error nothing is returned and the buffer is left empty, so a
    /// half-serialized value can never reach the sink.
    pub fn encode<T: Serialize>(&mut self, value: &T) -> Result<&[u8]> {
        self.buf.clear();
        if let Err(e) = serde_json::to_writer(&mut self.buf, value) {
            self.buf.clear();
            return Err(e.into());
        }
        self.buf.push(b'\n');
        Ok(&self.buf)
    }
}
