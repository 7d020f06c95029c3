// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Virtual terminal fed with raw PTY output.
pub struct Screen {
    vt: avt::Vt,
    /// Trailing bytes of a UTF-8 sequence split across reads.
    pending: Vec<u8>,
}

impl std::fmt::Debug for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screen").field("pending", &self.pending.len()).finish()
    }
}

impl Screen {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { vt: avt::Vt::new(cols as usize, rows as usize), pending: Vec::new() }
    }

    /// Feed a chunk of output. Invalid bytes render as U+FFFD; an
    /// incomplete sequence at the end waits for the next chunk.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let mut text = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    text.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(n) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[n..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let carry = rest.to_vec();
        self.pending = carry;
        let _ = self.vt.feed_str(&text);
    }

    /// Visible lines with trailing blanks trimmed.
    pub fn lines(&self) -> Vec<String> {
        self.vt.view().map(|line| line.text().trim_end().to_owned()).collect()
    }
}

#[cfg(test)]
#[path = "screen_tests.rs"]
mod tests;
