//! Dynamic byte buffer with separate read/write cursors.
//!
//! Ported from the three-pointer design in the original `buffer.c`: a single
//! allocation with `start <= end <= capacity`, compacted in place when there
//! is enough total free space, doubled when there is not.

use anyhow::{Context, Result, bail};
use nix::errno::Errno;
use nix::unistd::write;
use std::os::fd::AsFd;

/// A growable byte buffer with a read cursor (`start`) and a write cursor
/// (`end`). Readable bytes are always `data[start..end]`.
#[derive(Default)]
pub struct Buffer {
    data: Vec<u8>,
    start: usize,
    end: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Append `bytes` to the buffer, compacting or growing as needed.
    ///
    /// Mirrors `buffer_append`: if the tail doesn't have room but the total
    /// free space (head + tail) does, shift the readable region down to
    /// offset 0. Otherwise grow by doubling (starting from 1) until the new
    /// capacity fits everything.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let n = bytes.len();
        let tail_space = self.data.len() - self.end;
        if n > tail_space {
            let len = self.end - self.start;
            let total_free = tail_space + self.start;
            if n <= total_free {
                self.data.copy_within(self.start..self.end, 0);
                self.start = 0;
                self.end = len;
            } else {
                let mut capacity = self.data.len().max(1);
                loop {
                    let doubled = capacity
                        .checked_mul(2)
                        .context("buffer capacity overflow")?;
                    capacity = doubled;
                    if capacity >= n + len {
                        break;
                    }
                }
                let mut grown = vec![0u8; capacity];
                grown[..len].copy_from_slice(&self.data[self.start..self.end]);
                self.data = grown;
                self.start = 0;
                self.end = len;
            }
        }
        if self.end + n > self.data.len() {
            self.data.resize(self.end + n, 0);
        }
        self.data[self.end..self.end + n].copy_from_slice(bytes);
        self.end += n;
        Ok(())
    }

    /// Reset both cursors to the origin, discarding all readable bytes.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Write the readable region to `fd` with a single `write(2)`, advancing
    /// `start` by however much was actually written. Resets to the origin
    /// once fully drained, to preserve head space for future appends.
    pub fn drain_to_fd<F: AsFd>(&mut self, fd: &F) -> Result<()> {
        loop {
            match write(fd, &self.data[self.start..self.end]) {
                Ok(n) => {
                    self.start += n;
                    if self.start == self.end {
                        self.start = 0;
                        self.end = 0;
                    }
                    return Ok(());
                }
                Err(Errno::EINTR) => continue,
                Err(e) => bail!("error writing buffer: {}", e),
            }
        }
    }

    /// Consume and return the readable bytes as an owned vector, clearing
    /// the buffer.
    pub fn take(&mut self) -> Vec<u8> {
        let out = self.data[self.start..self.end].to_vec();
        self.clear();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_accumulates_in_order() {
        let mut b = Buffer::new();
        b.append(b"abc").unwrap();
        b.append(b"def").unwrap();
        assert_eq!(b.as_slice(), b"abcdef");
    }

    #[test]
    fn clear_resets_to_origin() {
        let mut b = Buffer::new();
        b.append(b"hello").unwrap();
        b.clear();
        assert!(b.is_empty());
        b.append(b"x").unwrap();
        assert_eq!(b.as_slice(), b"x");
    }

    #[test]
    fn take_drains_and_clears() {
        let mut b = Buffer::new();
        b.append(b"line").unwrap();
        let out = b.take();
        assert_eq!(out, b"line");
        assert!(b.is_empty());
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut b = Buffer::new();
        let chunk = vec![b'x'; 100];
        for _ in 0..50 {
            b.append(&chunk).unwrap();
        }
        assert_eq!(b.as_slice().len(), 5000);
        assert!(b.as_slice().iter().all(|&c| c == b'x'));
    }

    #[test]
    fn compacts_in_place_when_total_free_suffices() {
        let mut b = Buffer::new();
        b.append(&vec![b'a'; 10]).unwrap();
        let _ = b.take();
        b.append(&vec![b'b'; 10]).unwrap();
        let _ = b.take();
        // After two take()s the cursors are back at the origin; a third
        // append that fits in existing capacity must not reallocate growth
        // beyond what's needed.
        b.append(&vec![b'c'; 10]).unwrap();
        assert_eq!(b.as_slice(), vec![b'c'; 10].as_slice());
    }
}
