//! Reframing of the engine's line-delimited JSON token protocol into plain
//! text fragments.
//!
//! The engine emits one JSON object per line while streaming. Chunk
//! boundaries are arbitrary and may split a line, so the decoder keeps the
//! incomplete trailing line buffered between `feed` calls. The concatenation
//! of emitted fragments is independent of where the chunk boundaries fall.

use serde::Deserialize;

/// One wire frame from the engine's streaming endpoint.
#[derive(Debug, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

/// A unit of decoder output. Lines that fail to parse surface as `Raw` so
/// the relay can choose to forward the undecoded bytes instead of dropping
/// the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Raw(Vec<u8>),
}

impl Fragment {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Fragment::Text(text) => text.into_bytes(),
            Fragment::Raw(bytes) => bytes,
        }
    }
}

/// Stateful line-buffering decoder for the NDJSON token stream.
#[derive(Debug, Default)]
pub struct NdjsonReframer {
    pending: Vec<u8>,
}

impl NdjsonReframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the fragments decoded from every line the
    /// chunk completed. The trailing partial line stays buffered.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Fragment> {
        self.pending.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            decode_line(&line[..line.len() - 1], &mut out);
        }
        out
    }

    /// Flushes the pending buffer, attempting one last parse of whatever is
    /// left. Call once, after the input is exhausted.
    pub fn finish(&mut self) -> Option<Fragment> {
        let pending = std::mem::take(&mut self.pending);
        let mut out = Vec::new();
        decode_line(&pending, &mut out);
        out.pop()
    }
}

fn decode_line(line: &[u8], out: &mut Vec<Fragment>) {
    let trimmed = trim_ascii(line);
    if trimmed.is_empty() {
        return;
    }
    match serde_json::from_slice::<StreamFrame>(trimmed) {
        Ok(frame) => {
            if !frame.response.is_empty() {
                out.push(Fragment::Text(frame.response));
            }
        }
        Err(err) => {
            tracing::debug!("skipping undecodable stream frame: {}", err);
            out.push(Fragment::Raw(trimmed.to_vec()));
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &bytes[start..end]
}
