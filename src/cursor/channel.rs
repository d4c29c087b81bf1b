//! # Channel Cursor
//!
//! Bridges a producing search onto a dedicated thread and streams its
//! results through a bounded ring into the consuming caller. The
//! original design point stands: searches can emit unbounded result
//! streams while callers want bounded buffers, so neither side ever
//! materializes the full result set.
//!
//! ```text
//! producer thread                        consumer (caller)
//! ──────────────                         ─────────────────
//! put(r)  ── full? park on space ──┐     read(buf) ── empty? park on data
//!                                  ▼
//!                           Mutex<Ring> + 2 Condvars
//! ```
//!
//! `close()` flips the closed flag and wakes the producer; its next
//! `put` returns false, so a cancelled producer terminates within one
//! record. The producer thread is joined when the consumer side is
//! dropped, never leaking a thread past its cursor.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use super::{CursorResult, ExternalCursor, InternalCursor};
use crate::error::SearchError;

/// Default ring capacity; enough to amortize wakeups without letting an
/// abandoned producer run far ahead of its consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

struct Ring {
    buf: std::collections::VecDeque<CursorResult>,
    capacity: usize,
    completed: bool,
    closed: bool,
    error: Option<SearchError>,
}

struct Shared {
    ring: Mutex<Ring>,
    data_ready: Condvar,
    space_ready: Condvar,
}

/// Producer half; handed to the search running on the spawned thread.
pub struct ChannelWriter {
    shared: Arc<Shared>,
}

/// Consumer half; owned by the caller.
pub struct ChannelCursor {
    shared: Arc<Shared>,
    producer: Option<JoinHandle<()>>,
}

impl ChannelCursor {
    /// Spawns `produce` on its own thread with the producer half of a
    /// ring of `capacity` results and returns the consumer half.
    pub fn spawn<F>(capacity: usize, produce: F) -> ChannelCursor
    where
        F: FnOnce(&mut ChannelWriter) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            ring: Mutex::new(Ring {
                buf: std::collections::VecDeque::with_capacity(capacity.max(1)),
                capacity: capacity.max(1),
                completed: false,
                closed: false,
                error: None,
            }),
            data_ready: Condvar::new(),
            space_ready: Condvar::new(),
        });

        let mut writer = ChannelWriter {
            shared: Arc::clone(&shared),
        };
        let producer = thread::spawn(move || {
            produce(&mut writer);
            // A producer that returns without completing still ends the
            // stream; the consumer must not park forever.
            writer.complete();
        });

        ChannelCursor {
            shared,
            producer: Some(producer),
        }
    }
}

impl InternalCursor for ChannelWriter {
    fn put(&mut self, result: CursorResult) -> bool {
        let mut ring = self.shared.ring.lock();
        while ring.buf.len() == ring.capacity && !ring.closed {
            self.shared.space_ready.wait(&mut ring);
        }
        if ring.closed {
            return false;
        }
        ring.buf.push_back(result);
        drop(ring);
        self.shared.data_ready.notify_one();
        true
    }

    fn complete(&mut self) {
        let mut ring = self.shared.ring.lock();
        ring.completed = true;
        drop(ring);
        self.shared.data_ready.notify_one();
    }

    fn set_error(&mut self, error: SearchError) {
        let mut ring = self.shared.ring.lock();
        if ring.error.is_none() {
            ring.error = Some(error);
        }
        ring.completed = true;
        drop(ring);
        self.shared.data_ready.notify_one();
    }
}

impl ExternalCursor for ChannelCursor {
    fn read(&mut self, buf: &mut [CursorResult]) -> usize {
        if buf.is_empty() {
            return 0;
        }

        let mut ring = self.shared.ring.lock();
        loop {
            if !ring.buf.is_empty() {
                let n = ring.buf.len().min(buf.len());
                for slot in buf[..n].iter_mut() {
                    *slot = ring.buf.pop_front().unwrap_or_else(|| unreachable!());
                }
                drop(ring);
                self.shared.space_ready.notify_one();
                return n;
            }
            if ring.completed || ring.closed {
                return 0;
            }
            self.shared.data_ready.wait(&mut ring);
        }
    }

    fn is_done(&self) -> bool {
        let ring = self.shared.ring.lock();
        (ring.completed && ring.buf.is_empty()) || ring.closed || ring.error.is_some()
    }

    fn error(&self) -> Option<SearchError> {
        self.shared.ring.lock().error
    }

    fn close(&mut self) {
        {
            let mut ring = self.shared.ring.lock();
            ring.closed = true;
            ring.buf.clear();
        }
        self.shared.space_ready.notify_all();
        self.shared.data_ready.notify_all();

        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ChannelCursor {
    fn drop(&mut self) {
        self.close();
    }
}
