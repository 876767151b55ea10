use base64::Engine;

use super::backend::ClipFormat;

/// Fragments collected during one recording cycle
#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    fragments: Vec<Vec<u8>>,
    byte_len: usize,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment; empty fragments carry nothing and are skipped
    pub fn push(&mut self, fragment: Vec<u8>) {
        if fragment.is_empty() {
            return;
        }
        self.byte_len += fragment.len();
        self.fragments.push(fragment);
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Concatenate everything in arrival order; consumes the buffer
    pub fn finish(self, format: ClipFormat) -> Clip {
        let fragment_count = self.fragments.len();
        let mut bytes = Vec::with_capacity(self.byte_len);
        for fragment in self.fragments {
            bytes.extend_from_slice(&fragment);
        }

        Clip {
            bytes,
            format,
            fragment_count,
        }
    }
}

/// One finalized recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    pub bytes: Vec<u8>,
    pub format: ClipFormat,
    /// Number of fragments that were concatenated
    pub fragment_count: usize,
}

impl Clip {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}
