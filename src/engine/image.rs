//! Fill-on-demand byte image backing one decode attempt.

/// Fixed byte window the decode engine reads instruction bytes from.
///
/// The engine probes forward for immediates without a pre-known consumption
/// length, so the image serves an exact window: a span of bytes registered at
/// an offset immediately before decode. Probes before the offset or at/after
/// `offset + len` read as zero, never as an error.
#[derive(Debug, Default)]
pub struct InstructionImage {
    offset: u64,
    bytes: Vec<u8>,
}

impl InstructionImage {
    /// Creates an empty image; every probe reads zero until a window is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the byte window for the next decode attempt, replacing any
    /// previous window.
    pub fn set_instruction(&mut self, offset: u64, bytes: &[u8]) {
        self.offset = offset;
        self.bytes = bytes.to_vec();
    }

    /// Fills `buf` with the bytes at `address`, zero-padding every position
    /// outside the registered window.
    pub fn fill(&self, address: u64, buf: &mut [u8]) {
        for (i, slot) in buf.iter_mut().enumerate() {
            let probe = address.wrapping_add(i as u64);
            *slot = if probe < self.offset {
                0
            } else {
                let index = probe - self.offset;
                usize::try_from(index)
                    .ok()
                    .and_then(|index| self.bytes.get(index))
                    .copied()
                    .unwrap_or(0)
            };
        }
    }

    /// Length of the currently registered window in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether no window is currently registered.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
