//! Bounded, blocking, single-pass byte channel connecting two pipeline stages.
//!
//! A conduit stands in for an OS pipe: one [`ConduitWriter`], one
//! [`ConduitReader`], and a fixed-capacity FIFO buffer between them.
//!
//! - `write` blocks while the buffer is full.
//! - `read` blocks while the buffer is empty and the writer is open; once
//!   the writer has closed and the buffer is drained it returns `0`.
//! - Closing (or dropping) the reader makes every pending and future write
//!   fail with [`ConduitError::ReaderGone`]. This is how a failed consumer
//!   unwinds its producer.
//! - Dropping a writer without `close` aborts the stream: the reader gets
//!   [`ConduitError::WriterAborted`] instead of a clean end-of-stream, so a
//!   truncated stream is never mistaken for a complete one.
//! - A [`ConduitHandle`] can cancel both ends at once.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::core::errors::ConduitError;

/// Default buffer capacity (16 KiB).
pub const DEFAULT_CAPACITY: usize = 16 * 1024;

struct State {
    buf: VecDeque<u8>,
    writer_open: bool,
    writer_aborted: bool,
    reader_open: bool,
    cancelled: bool,
    transferred: u64,
}

struct Shared {
    capacity: usize,
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
}

impl Shared {
    fn wake_all(&self) {
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

/// Create a conduit with room for `capacity` bytes (at least one).
pub fn conduit(capacity: usize) -> (ConduitWriter, ConduitReader) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        capacity,
        state: Mutex::new(State {
            buf: VecDeque::with_capacity(capacity),
            writer_open: true,
            writer_aborted: false,
            reader_open: true,
            cancelled: false,
            transferred: 0,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });

    (
        ConduitWriter {
            shared: Arc::clone(&shared),
        },
        ConduitReader { shared },
    )
}

/// Producer end of a conduit.
pub struct ConduitWriter {
    shared: Arc<Shared>,
}

impl ConduitWriter {
    /// Write as much of `data` as fits, blocking until at least one byte
    /// can be accepted. Returns the number of bytes taken.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, ConduitError> {
        let mut state = self.shared.state.lock();
        loop {
            if state.cancelled {
                return Err(ConduitError::Cancelled);
            }
            if !state.writer_open {
                return Err(ConduitError::ConduitClosed);
            }
            if !state.reader_open {
                return Err(ConduitError::ReaderGone);
            }
            if data.is_empty() {
                return Ok(0);
            }

            let space = self.shared.capacity - state.buf.len();
            if space > 0 {
                let n = space.min(data.len());
                state.buf.extend(&data[..n]);
                self.shared.readable.notify_one();
                return Ok(n);
            }
            self.shared.writable.wait(&mut state);
        }
    }

    /// Write all of `data`, blocking as often as needed.
    pub fn send_all(&mut self, mut data: &[u8]) -> Result<(), ConduitError> {
        while !data.is_empty() {
            let n = self.send(data)?;
            data = &data[n..];
        }
        Ok(())
    }

    /// Signal end-of-stream. Fails with `ReaderGone` if nobody is left to
    /// read what was written.
    pub fn close(&mut self) -> Result<(), ConduitError> {
        let mut state = self.shared.state.lock();
        if state.cancelled {
            return Err(ConduitError::Cancelled);
        }
        let reader_open = state.reader_open;
        state.writer_open = false;
        drop(state);
        self.shared.wake_all();

        if reader_open {
            Ok(())
        } else {
            Err(ConduitError::ReaderGone)
        }
    }

    /// Terminate the stream without a clean end; the reader sees `WriterAborted`.
    pub fn abort(&mut self) {
        let mut state = self.shared.state.lock();
        if state.writer_open {
            state.writer_open = false;
            state.writer_aborted = true;
        }
        drop(state);
        self.shared.wake_all();
    }

    /// True once the reader closed or the conduit was cancelled.
    pub fn is_reader_gone(&self) -> bool {
        let state = self.shared.state.lock();
        !state.reader_open || state.cancelled
    }

    pub fn handle(&self) -> ConduitHandle {
        ConduitHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for ConduitWriter {
    fn drop(&mut self) {
        self.abort();
    }
}

impl io::Write for ConduitWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf).map_err(ConduitError::into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.is_reader_gone() {
            return Err(ConduitError::ReaderGone.into_io());
        }
        Ok(())
    }
}

/// Consumer end of a conduit.
pub struct ConduitReader {
    shared: Arc<Shared>,
}

impl ConduitReader {
    /// Read up to `out.len()` bytes. Returns `Ok(0)` only at a clean
    /// end-of-stream (or when `out` is empty).
    pub fn recv(&mut self, out: &mut [u8]) -> Result<usize, ConduitError> {
        let mut state = self.shared.state.lock();
        loop {
            if state.cancelled {
                return Err(ConduitError::Cancelled);
            }
            if !state.reader_open {
                return Err(ConduitError::ConduitClosed);
            }
            if state.writer_aborted {
                return Err(ConduitError::WriterAborted);
            }
            if out.is_empty() {
                return Ok(0);
            }

            if !state.buf.is_empty() {
                let n = out.len().min(state.buf.len());
                for (dst, src) in out.iter_mut().zip(state.buf.drain(..n)) {
                    *dst = src;
                }
                state.transferred += n as u64;
                self.shared.writable.notify_one();
                return Ok(n);
            }
            if !state.writer_open {
                return Ok(0);
            }
            self.shared.readable.wait(&mut state);
        }
    }

    /// Give up on the stream. Blocked and future writes fail with `ReaderGone`.
    pub fn close(&mut self) {
        let mut state = self.shared.state.lock();
        state.reader_open = false;
        state.buf.clear();
        drop(state);
        self.shared.wake_all();
    }

    pub fn handle(&self) -> ConduitHandle {
        ConduitHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for ConduitReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl io::Read for ConduitReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf).map_err(ConduitError::into_io)
    }
}

/// Observer and kill switch for a conduit, independent of its two ends.
#[derive(Clone)]
pub struct ConduitHandle {
    shared: Arc<Shared>,
}

impl ConduitHandle {
    /// Close both ends; every blocked or future call fails with `Cancelled`.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        state.cancelled = true;
        state.writer_open = false;
        state.reader_open = false;
        state.buf.clear();
        drop(state);
        self.shared.wake_all();
    }

    /// Bytes handed to the reader so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.shared.state.lock().transferred
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.shared.state.lock().buf.len()
    }
}

impl std::fmt::Debug for ConduitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConduitHandle")
            .field("capacity", &self.shared.capacity)
            .field("transferred", &self.bytes_transferred())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    const PATIENCE: Duration = Duration::from_millis(100);
    const DEADLINE: Duration = Duration::from_secs(5);

    #[test]
    fn accepts_capacity_without_blocking_then_blocks() {
        let (mut writer, mut reader) = conduit(8);
        writer.send_all(&[7u8; 8]).unwrap();
        assert_eq!(writer.handle().buffered(), 8);

        let (done_tx, done_rx) = mpsc::channel();
        let producer = thread::spawn(move || {
            let result = writer.send_all(b"x");
            done_tx.send(()).unwrap();
            result.map(|_| writer)
        });

        assert!(done_rx.recv_timeout(PATIENCE).is_err(), "write should block");

        let mut buf = [0u8; 4];
        assert_eq!(reader.recv(&mut buf).unwrap(), 4);
        done_rx.recv_timeout(DEADLINE).expect("write should resume");
        let mut writer = producer.join().unwrap().unwrap();
        writer.close().unwrap();

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, vec![7, 7, 7, 7, b'x']);
    }

    #[test]
    fn drains_exactly_what_was_written_then_eof() {
        let (mut writer, mut reader) = conduit(64);
        writer.send_all(b"hello").unwrap();
        writer.close().unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");

        let mut buf = [0u8; 8];
        assert_eq!(reader.recv(&mut buf).unwrap(), 0);
        assert_eq!(reader.recv(&mut buf).unwrap(), 0);
        assert_eq!(reader.handle().bytes_transferred(), 5);
    }

    #[test]
    fn write_after_close_fails() {
        let (mut writer, _reader) = conduit(16);
        writer.close().unwrap();
        assert_eq!(writer.send(b"late"), Err(ConduitError::ConduitClosed));
    }

    #[test]
    fn closing_reader_unblocks_writer_with_reader_gone() {
        let (mut writer, mut reader) = conduit(4);
        let producer = thread::spawn(move || writer.send_all(&[0u8; 64]));

        thread::sleep(PATIENCE);
        reader.close();

        let result = producer.join().unwrap();
        assert_eq!(result, Err(ConduitError::ReaderGone));
    }

    #[test]
    fn dropped_writer_is_an_abort_not_eof() {
        let (mut writer, mut reader) = conduit(16);
        writer.send_all(b"partial").unwrap();
        drop(writer);

        let mut buf = [0u8; 16];
        assert_eq!(reader.recv(&mut buf), Err(ConduitError::WriterAborted));
    }

    #[test]
    fn cancel_unblocks_both_ends() {
        let (mut a_writer, a_reader) = conduit(2);
        let (b_writer, mut b_reader) = conduit(2);
        let a = a_writer.handle();
        let b = b_reader.handle();

        let blocked_writer = thread::spawn(move || {
            let _keep = a_reader;
            a_writer.send_all(&[1u8; 32])
        });
        let blocked_reader = thread::spawn(move || {
            let _keep = b_writer;
            let mut buf = [0u8; 4];
            b_reader.recv(&mut buf)
        });

        thread::sleep(PATIENCE);
        a.cancel();
        b.cancel();

        assert_eq!(blocked_writer.join().unwrap(), Err(ConduitError::Cancelled));
        assert_eq!(blocked_reader.join().unwrap(), Err(ConduitError::Cancelled));
    }

    #[test]
    fn io_traits_carry_conduit_errors() {
        let (mut writer, reader) = conduit(4);
        drop(reader);

        let err = writer.write_all(b"data").unwrap_err();
        assert_eq!(ConduitError::from_io(&err), Some(ConduitError::ReaderGone));
        assert!(writer.flush().is_err());
        assert_eq!(writer.close(), Err(ConduitError::ReaderGone));
    }

    #[test]
    fn preserves_order_across_many_small_writes() {
        let (mut writer, mut reader) = conduit(3);
        let producer = thread::spawn(move || {
            for i in 0..=255u8 {
                writer.send_all(&[i]).unwrap();
            }
            writer.close().unwrap();
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        producer.join().unwrap();
        assert_eq!(out, (0..=255u8).collect::<Vec<_>>());
    }
}
