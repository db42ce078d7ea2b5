#![deny(unsafe_code)]
//! Bounded receive buffer
//!
//! Holds inbound bytes for a consumer that drains them on its own schedule.
//! The storage always keeps a trailing NUL after the content, so the buffer
//! can be handed to code expecting a C string without copying. Whatever does
//! not fit is dropped and counted; the buffer never grows past `N`.

use heapless::Vec;

/// Append-only byte buffer with `N - 1` bytes of content capacity
///
/// # Example
///
/// ```
/// use connectivity_core::RxBuffer;
///
/// let mut rx: RxBuffer<8> = RxBuffer::new();
/// assert_eq!(rx.append(b"hello world"), 7);
/// assert_eq!(rx.as_bytes(), b"hello w");
/// assert_eq!(rx.as_bytes_with_nul(), b"hello w\0");
/// assert_eq!(rx.dropped(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct RxBuffer<const N: usize> {
    /// Content followed by exactly one NUL
    data: Vec<u8, N>,
    dropped: usize,
}

impl<const N: usize> RxBuffer<N> {
    const HAS_ROOM_FOR_TERMINATOR: () = assert!(N > 0, "RxBuffer needs at least one byte");

    pub fn new() -> Self {
        let () = Self::HAS_ROOM_FOR_TERMINATOR;
        let mut data = Vec::new();
        // N > 0, checked above
        let _ = data.push(0);
        Self { data, dropped: 0 }
    }

    /// Maximum number of content bytes
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Number of content bytes held
    pub fn len(&self) -> usize {
        self.data.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content bytes that can still be appended
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Total bytes dropped because the buffer was full
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Append as much of `chunk` as fits and return how many bytes were taken
    ///
    /// The rest of `chunk` is discarded and added to [`dropped`](Self::dropped).
    pub fn append(&mut self, chunk: &[u8]) -> usize {
        let take = chunk.len().min(self.remaining());
        if take > 0 {
            self.data.pop();
            // Fits: `take` <= remaining and the terminator slot was just freed.
            let _ = self.data.extend_from_slice(&chunk[..take]);
            let _ = self.data.push(0);
        }
        self.dropped += chunk.len() - take;
        take
    }

    /// Content without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Content including the trailing NUL
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.data
    }

    /// Content as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }

    /// Move up to `out.len()` bytes from the front of the buffer into `out`
    ///
    /// Returns the number of bytes moved. Remaining content shifts to the
    /// front and stays NUL-terminated.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len());
        out[..n].copy_from_slice(&self.data[..n]);
        let total = self.data.len();
        self.data.copy_within(n..total, 0);
        self.data.truncate(total - n);
        n
    }

    /// Discard all content and reset the drop counter
    pub fn clear(&mut self) {
        self.data.clear();
        let _ = self.data.push(0);
        self.dropped = 0;
    }
}

impl<const N: usize> Default for RxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
