//! Line framing over an arbitrarily chunked byte stream.

/// Longest line kept by default; longer lines are dropped.
pub const DEFAULT_MAX_LINE_LEN: usize = 4 * 1024 * 1024;

/// Reassembles newline-terminated lines from chunks whose boundaries are
/// unrelated to line boundaries.
///
/// Incomplete trailing fragments are carried over until the rest arrives,
/// and flushed by [`LineFramer::finish`] when the stream closes. Lines are
/// decoded only once complete, so a multi-byte character split across two
/// chunks is never mangled. Blank and whitespace-only lines are skipped.
///
/// A line longer than the configured limit is discarded up to its
/// terminator and counted; see [`LineFramer::take_dropped`].
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to contain no terminator.
    scanned: usize,
    max_line_len: usize,
    /// Skipping the rest of an oversized line.
    discarding: bool,
    dropped: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_line_len,
            discarding: false,
            dropped: 0,
        }
    }

    /// Append a chunk and iterate over every line it completed.
    ///
    /// Lines are pulled from the buffer lazily. Anything the iterator does
    /// not consume stays buffered and is yielded by the next call.
    pub fn push(&mut self, chunk: &[u8]) -> CompleteLines<'_> {
        self.buf.extend_from_slice(chunk);
        CompleteLines { framer: self }
    }

    /// Flush the carry-over fragment as a final, terminator-less line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        decode_line(&rest)
    }

    /// Bytes currently held back waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Number of oversized lines dropped since the last call.
    pub fn take_dropped(&mut self) -> usize {
        std::mem::take(&mut self.dropped)
    }

    fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buf.len();
                if self.discarding || self.buf.len() > self.max_line_len {
                    self.start_discarding();
                    self.buf.clear();
                    self.scanned = 0;
                }
                return None;
            };
            let end = self.scanned + offset;
            let raw: Vec<u8> = self.buf.drain(..=end).collect();
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if end > self.max_line_len {
                self.dropped += 1;
                continue;
            }
            if let Some(line) = decode_line(&raw[..end]) {
                return Some(line);
            }
        }
    }

    fn start_discarding(&mut self) {
        if !self.discarding {
            self.discarding = true;
            self.dropped += 1;
        }
    }
}

/// Iterator over the complete lines buffered in a [`LineFramer`].
#[derive(Debug)]
pub struct CompleteLines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for CompleteLines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.framer.next_line()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let text = String::from_utf8_lossy(raw);
    if text.trim().is_empty() {
        return None;
    }
    Some(text.into_owned())
}
