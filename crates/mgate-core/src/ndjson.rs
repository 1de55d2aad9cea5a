use serde::de::DeserializeOwned;

/// Incremental newline-delimited JSON decoder.
///
/// Bytes are pushed as they arrive; complete lines are decoded one record at a
/// time and blank lines are skipped. A malformed line is reported as-is and the
/// reader makes no attempt to resynchronise.
#[derive(Debug, Default)]
pub struct NdjsonReader {
    buffer: Vec<u8>,
}

impl NdjsonReader {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete record, or `None` until more bytes arrive.
    pub fn next_record<T: DeserializeOwned>(&mut self) -> Option<Result<T, serde_json::Error>> {
        loop {
            let newline_pos = self.buffer.iter().position(|&b| b == b'\n')?;
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            return Some(serde_json::from_slice(line));
        }
    }

    /// Decode whatever is left once the body has ended (a final record without
    /// a trailing newline).
    pub fn finish<T: DeserializeOwned>(&mut self) -> Option<Result<T, serde_json::Error>> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim_ascii();
        if rest.is_empty() {
            return None;
        }
        Some(serde_json::from_slice(rest))
    }
}
