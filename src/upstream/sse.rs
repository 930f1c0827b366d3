//! Incremental decoder for the provider's server-sent-event stream
//!
//! Network reads split events arbitrarily, so bytes are buffered until a
//! blank line (`\n\n` or `\r\n\r\n`) closes an event. Only `data:` fields are
//! kept; comments (`: keep-alive`) and `event:`/`id:` lines are dropped.

use bytes::BytesMut;

use super::UpstreamError;

/// Largest event accepted before a delimiter arrives
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    /// Prefix of `buffer` already searched for a boundary
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning the `data` payload of every completed event
    ///
    /// Fails once a pending event grows past [`MAX_EVENT_BYTES`].
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, UpstreamError> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        // a delimiter may straddle the previous read, so back up by its length - 1
        while let Some((pos, delimiter_len)) =
            find_event_boundary(&self.buffer, self.scanned.saturating_sub(3))
        {
            let event = self.buffer.split_to(pos);
            let _ = self.buffer.split_to(delimiter_len);
            self.scanned = 0;
            if let Some(data) = event_data(&event) {
                events.push(data);
            }
        }
        self.scanned = self.buffer.len();

        if self.buffer.len() > MAX_EVENT_BYTES {
            return Err(UpstreamError::Decode(format!(
                "event exceeds {} bytes without a delimiter",
                MAX_EVENT_BYTES
            )));
        }
        Ok(events)
    }

    /// Flush a trailing event that was not followed by a blank line
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buffer.is_empty() {
            return None;
        }
        let event = self.buffer.split();
        event_data(&event)
    }
}

/// Earliest blank-line boundary at or after `from`: (start index, delimiter length)
fn find_event_boundary(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut idx = from;
    while idx + 1 < buf.len() {
        if buf[idx] == b'\n' && buf[idx + 1] == b'\n' {
            return Some((idx, 2));
        }
        if idx + 3 < buf.len() && &buf[idx..idx + 4] == b"\r\n\r\n" {
            return Some((idx, 4));
        }
        idx += 1;
    }
    None
}

/// Joined `data:` lines of one event, `None` when the event carries no data
fn event_data(event: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(event);
    let mut data: Option<String> = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    data
}
