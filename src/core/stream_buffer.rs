//! Single-producer/single-consumer byte stream and message buffer
//!
//! A `StreamBuffer<LEN>` is a byte ring shared by exactly one sending
//! task and one receiving task (ISRs may stand in for either side via
//! the `_from_isr` entry points, but never both at once). Unlike
//! [`Queue`](crate::queue::Queue), which wakes waiters through its own
//! priority-ordered wait lists, a stream buffer has at most one waiter
//! per direction, so it rides the existing direct task-notification
//! channel (spec §4.3 `notify_give`/`notify_wait`) instead of growing a
//! second wait-list mechanism.
//!
//! `LEN` is the physical storage size; one byte is always kept
//! unwritable to distinguish empty from full, so the usable capacity is
//! `LEN - 1` and `bytes_available() + spaces_available() + 1 == LEN`
//! holds at all times.

use core::ptr::NonNull;

use crate::config::CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::task::OsTcb;
use crate::types::OsTick;

/// Index into a task's notification array used for stream-buffer wakeups
/// when the buffer is constructed with [`StreamBuffer::new`]. Override
/// with [`StreamBuffer::set_notify_index`] if a task multiplexes more
/// than one wake source and `CFG_TASK_NOTIFICATION_ARRAY_ENTRIES` has
/// been raised to allow it.
const DEFAULT_NOTIFY_INDEX: usize = 0;

/// Byte ring shared by one sender and one receiver (spec §4.5
/// `StreamBuffer`). Set `is_message` at construction to get message-buffer
/// framing (length-prefixed, all-or-nothing) instead of raw stream
/// semantics (any-size partial transfers).
pub struct StreamBuffer<const LEN: usize> {
    buffer: [u8; LEN],
    head: usize,
    tail: usize,
    trigger_level: usize,
    is_message: bool,
    notify_index: usize,
    waiting_sender: Option<NonNull<OsTcb>>,
    waiting_receiver: Option<NonNull<OsTcb>>,
}

unsafe impl<const LEN: usize> Send for StreamBuffer<LEN> {}
unsafe impl<const LEN: usize> Sync for StreamBuffer<LEN> {}

impl<const LEN: usize> StreamBuffer<LEN> {
    /// Build an empty stream-flavor buffer. `create()` still needs to run
    /// once the buffer has reached its final `'static` address.
    pub const fn new() -> Self {
        StreamBuffer {
            buffer: [0; LEN],
            head: 0,
            tail: 0,
            trigger_level: 1,
            is_message: false,
            notify_index: DEFAULT_NOTIFY_INDEX,
            waiting_sender: None,
            waiting_receiver: None,
        }
    }

    /// Build an empty message-flavor buffer (length-prefixed framing,
    /// all-or-nothing delivery).
    pub const fn new_message_buffer() -> Self {
        StreamBuffer {
            buffer: [0; LEN],
            head: 0,
            tail: 0,
            trigger_level: 1,
            is_message: true,
            notify_index: DEFAULT_NOTIFY_INDEX,
            waiting_sender: None,
            waiting_receiver: None,
        }
    }

    pub fn create(&mut self) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }
        critical_section(|_cs| {
            self.head = 0;
            self.tail = 0;
            self.waiting_sender = None;
            self.waiting_receiver = None;
            Ok(())
        })
    }

    /// Override the notification channel used for wakeups. Must be
    /// strictly less than `CFG_TASK_NOTIFICATION_ARRAY_ENTRIES`.
    pub fn set_notify_index(&mut self, index: usize) -> OsResult<()> {
        if index >= crate::config::CFG_TASK_NOTIFICATION_ARRAY_ENTRIES {
            return Err(OsError::OptInvalid);
        }
        self.notify_index = index;
        Ok(())
    }

    /// Minimum number of buffered bytes before a blocked receiver wakes
    /// (spec §4.5 trigger level). Ignored by the message flavor, where a
    /// whole message always wakes its receiver.
    pub fn set_trigger_level(&mut self, level: usize) -> OsResult<()> {
        if level == 0 || level > LEN.saturating_sub(1) {
            return Err(OsError::OptInvalid);
        }
        critical_section(|_cs| {
            self.trigger_level = level;
            Ok(())
        })
    }

    #[inline]
    pub fn bytes_available(&self) -> usize {
        (self.head + LEN - self.tail) % LEN
    }

    #[inline]
    pub fn spaces_available(&self) -> usize {
        LEN - 1 - self.bytes_available()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.spaces_available() == 0
    }

    /// Length of the next framed message without consuming it, or `None`
    /// if fewer than a full length prefix is buffered. Only meaningful
    /// for a message-flavor buffer.
    pub fn next_message_length(&self) -> Option<usize> {
        if !self.is_message || self.bytes_available() < CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES {
            return None;
        }
        Some(self.peek_length_prefix() as usize)
    }

    fn write_bytes(&mut self, data: &[u8]) {
        for &b in data {
            self.buffer[self.head] = b;
            self.head = (self.head + 1) % LEN;
        }
    }

    fn read_bytes(&mut self, out: &mut [u8]) {
        for slot in out.iter_mut() {
            *slot = self.buffer[self.tail];
            self.tail = (self.tail + 1) % LEN;
        }
    }

    fn skip_bytes(&mut self, n: usize) {
        self.tail = (self.tail + n) % LEN;
    }

    fn write_length_prefix(&mut self, len: u32) {
        self.write_bytes(&len.to_le_bytes());
    }

    fn peek_length_prefix(&self) -> u32 {
        let mut bytes = [0u8; 4];
        let mut idx = self.tail;
        for b in bytes.iter_mut() {
            *b = self.buffer[idx];
            idx = (idx + 1) % LEN;
        }
        u32::from_le_bytes(bytes)
    }

    fn register_sender(&mut self) -> OsResult<()> {
        let cur = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
        critical_section(|_cs| {
            debug_assert!(
                self.waiting_sender.is_none(),
                "stream buffer: a second task tried to block as sender"
            );
            self.waiting_sender = Some(cur);
            Ok(())
        })
    }

    fn register_receiver(&mut self) -> OsResult<()> {
        let cur = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
        critical_section(|_cs| {
            debug_assert!(
                self.waiting_receiver.is_none(),
                "stream buffer: a second task tried to block as receiver"
            );
            self.waiting_receiver = Some(cur);
            Ok(())
        })
    }

    fn wake_receiver(&mut self) {
        if let Some(rx) = critical_section(|_cs| self.waiting_receiver.take()) {
            let _ = crate::task::os_task_notify_give(rx, self.notify_index);
        }
    }

    fn wake_sender(&mut self) {
        if let Some(tx) = critical_section(|_cs| self.waiting_sender.take()) {
            let _ = crate::task::os_task_notify_give(tx, self.notify_index);
        }
    }

    fn wake_receiver_from_isr(&mut self) {
        if let Some(rx) = critical_section(|_cs| self.waiting_receiver.take()) {
            let _ = crate::task::os_task_notify_give_from_isr(rx, self.notify_index);
        }
    }

    fn wake_sender_from_isr(&mut self) {
        if let Some(tx) = critical_section(|_cs| self.waiting_sender.take()) {
            let _ = crate::task::os_task_notify_give_from_isr(tx, self.notify_index);
        }
    }

    /// Send up to `data.len()` bytes, blocking up to `ticks_to_wait` for
    /// room if the buffer is full (spec §4.5 `send`). Returns the number
    /// of bytes actually written, which may be fewer than requested for
    /// the stream flavor — the message flavor is always all-or-nothing
    /// via [`Self::send`] dispatching to its own framing path.
    pub fn send(&mut self, data: &[u8], ticks_to_wait: OsTick) -> OsResult<usize> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }
        if self.is_message {
            return self.send_message(data, ticks_to_wait);
        }
        if data.is_empty() {
            return Ok(0);
        }

        loop {
            let sent = critical_section(|_cs| {
                let n = core::cmp::min(self.spaces_available(), data.len());
                if n > 0 {
                    self.write_bytes(&data[..n]);
                }
                n
            });

            if sent > 0 {
                if self.bytes_available() >= self.trigger_level {
                    self.wake_receiver();
                }
                return Ok(sent);
            }

            if ticks_to_wait == 0 {
                return Ok(0);
            }

            self.register_sender()?;
            match crate::task::os_task_notify_wait(self.notify_index, true, true, ticks_to_wait) {
                Ok(_) => continue,
                Err(OsError::Timeout) => return Ok(0),
                Err(e) => return Err(e),
            }
        }
    }

    /// Send one whole framed message (spec §4.5 message flavor). Returns
    /// `data.len()` on success, `0` if the message plus its length
    /// prefix can never fit (even in an empty buffer) or the wait timed
    /// out — delivery is always all-or-nothing, never partial.
    pub fn send_message(&mut self, data: &[u8], ticks_to_wait: OsTick) -> OsResult<usize> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        let framed_len = CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES + data.len();
        if framed_len > LEN - 1 {
            return Ok(0);
        }

        loop {
            let sent = critical_section(|_cs| {
                if self.spaces_available() < framed_len {
                    return false;
                }
                self.write_length_prefix(data.len() as u32);
                self.write_bytes(data);
                true
            });

            if sent {
                self.wake_receiver();
                return Ok(data.len());
            }

            if ticks_to_wait == 0 {
                return Ok(0);
            }

            self.register_sender()?;
            match crate::task::os_task_notify_wait(self.notify_index, true, true, ticks_to_wait) {
                Ok(_) => continue,
                Err(OsError::Timeout) => return Ok(0),
                Err(e) => return Err(e),
            }
        }
    }

    /// Receive up to `out.len()` bytes, blocking up to `ticks_to_wait`
    /// for at least `trigger_level` bytes to arrive (spec §4.5
    /// `receive`). Returns the number of bytes actually read.
    pub fn receive(&mut self, out: &mut [u8], ticks_to_wait: OsTick) -> OsResult<usize> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }
        if self.is_message {
            return self.receive_message(out, ticks_to_wait);
        }
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            let received = critical_section(|_cs| {
                let avail = self.bytes_available();
                if avail == 0 {
                    return 0;
                }
                let n = core::cmp::min(avail, out.len());
                self.read_bytes(&mut out[..n]);
                n
            });

            if received > 0 {
                self.wake_sender();
                return Ok(received);
            }

            if ticks_to_wait == 0 {
                return Ok(0);
            }

            self.register_receiver()?;
            match crate::task::os_task_notify_wait(self.notify_index, true, true, ticks_to_wait) {
                Ok(_) => continue,
                Err(OsError::Timeout) => return Ok(0),
                Err(e) => return Err(e),
            }
        }
    }

    /// Receive one whole framed message (spec §4.5 message flavor). If
    /// `out` is shorter than the message, it is filled and the remaining
    /// bytes of that message are discarded — framing is never
    /// reinterpreted as a partial stream read.
    pub fn receive_message(&mut self, out: &mut [u8], ticks_to_wait: OsTick) -> OsResult<usize> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        loop {
            let received = critical_section(|_cs| {
                if self.bytes_available() < CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES {
                    return None;
                }
                let msg_len = self.peek_length_prefix() as usize;
                if self.bytes_available() < CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES + msg_len {
                    // A framed message is always written atomically, so
                    // this can't happen in practice; treat it as "not
                    // ready yet" rather than corrupting the stream.
                    return None;
                }
                self.skip_bytes(CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES);
                let n = core::cmp::min(msg_len, out.len());
                self.read_bytes(&mut out[..n]);
                if msg_len > n {
                    self.skip_bytes(msg_len - n);
                }
                Some(n)
            });

            if let Some(n) = received {
                self.wake_sender();
                return Ok(n);
            }

            if ticks_to_wait == 0 {
                return Ok(0);
            }

            self.register_receiver()?;
            match crate::task::os_task_notify_wait(self.notify_index, true, true, ticks_to_wait) {
                Ok(_) => continue,
                Err(OsError::Timeout) => return Ok(0),
                Err(e) => return Err(e),
            }
        }
    }

    /// ISR-side send. Never blocks; returns bytes actually written
    /// (always `data.len()` or `0` for the message flavor).
    pub fn send_from_isr(&mut self, data: &[u8]) -> usize {
        if self.is_message {
            let framed_len = CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES + data.len();
            let sent = critical_section(|_cs| {
                if framed_len > LEN - 1 || self.spaces_available() < framed_len {
                    return false;
                }
                self.write_length_prefix(data.len() as u32);
                self.write_bytes(data);
                true
            });
            if sent {
                self.wake_receiver_from_isr();
                return data.len();
            }
            return 0;
        }

        let n = critical_section(|_cs| {
            let n = core::cmp::min(self.spaces_available(), data.len());
            if n > 0 {
                self.write_bytes(&data[..n]);
            }
            n
        });
        if n > 0 && self.bytes_available() >= self.trigger_level {
            self.wake_receiver_from_isr();
        }
        n
    }

    /// ISR-side receive. Never blocks; returns bytes actually read.
    pub fn receive_from_isr(&mut self, out: &mut [u8]) -> usize {
        if self.is_message {
            let received = critical_section(|_cs| {
                if self.bytes_available() < CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES {
                    return None;
                }
                let msg_len = self.peek_length_prefix() as usize;
                if self.bytes_available() < CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES + msg_len {
                    return None;
                }
                self.skip_bytes(CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES);
                let n = core::cmp::min(msg_len, out.len());
                self.read_bytes(&mut out[..n]);
                if msg_len > n {
                    self.skip_bytes(msg_len - n);
                }
                Some(n)
            });
            return match received {
                Some(n) => {
                    self.wake_sender_from_isr();
                    n
                }
                None => 0,
            };
        }

        let n = critical_section(|_cs| {
            let avail = self.bytes_available();
            let n = core::cmp::min(avail, out.len());
            if n > 0 {
                self.read_bytes(&mut out[..n]);
            }
            n
        });
        if n > 0 {
            self.wake_sender_from_isr();
        }
        n
    }

    /// Drop all buffered bytes and rewind. Only legal with no blocked
    /// task on either side (spec §4.5 `reset`).
    pub fn reset(&mut self) -> OsResult<()> {
        critical_section(|_cs| {
            if self.waiting_sender.is_some() || self.waiting_receiver.is_some() {
                return Err(OsError::StateInvalid);
            }
            self.head = 0;
            self.tail = 0;
            Ok(())
        })
    }
}

impl<const LEN: usize> Default for StreamBuffer<LEN> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_accounting_invariant_holds_across_wraparound() {
        let mut sb: StreamBuffer<8> = StreamBuffer::new();
        for _ in 0..3 {
            sb.write_bytes(&[1, 2, 3]);
            assert_eq!(sb.bytes_available() + sb.spaces_available() + 1, 8);
            let mut out = [0u8; 3];
            sb.read_bytes(&mut out);
            assert_eq!(out, [1, 2, 3]);
            assert_eq!(sb.bytes_available() + sb.spaces_available() + 1, 8);
        }
    }

    #[test]
    fn message_framing_round_trips() {
        let mut sb: StreamBuffer<32> = StreamBuffer::new_message_buffer();
        sb.write_length_prefix(5);
        sb.write_bytes(b"hello");
        assert_eq!(sb.next_message_length(), Some(5));
        let mut out = [0u8; 5];
        sb.skip_bytes(CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES);
        sb.read_bytes(&mut out);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn message_too_large_to_ever_fit_is_rejected_up_front() {
        // LEN - 1 usable bytes; a 10-byte message plus a 4-byte prefix
        // can never fit in an 8-byte buffer (7 usable).
        let framed_len = CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES + 10;
        assert!(framed_len > 8 - 1);
    }

    #[test]
    fn oversized_read_buffer_drops_remainder_of_message() {
        let mut sb: StreamBuffer<32> = StreamBuffer::new_message_buffer();
        sb.write_length_prefix(5);
        sb.write_bytes(b"hello");
        sb.write_length_prefix(3);
        sb.write_bytes(b"bye");

        sb.skip_bytes(CFG_MESSAGE_BUFFER_LENGTH_PREFIX_BYTES);
        let mut out = [0u8; 2];
        sb.read_bytes(&mut out);
        assert_eq!(&out, b"he");
        sb.skip_bytes(5 - out.len());

        assert_eq!(sb.next_message_length(), Some(3));
    }
}
