//! Fixed-capacity sample ring shared between the capture callback (single
//! producer) and the decode tick (snapshot consumer).
//!
//! One mutex guards the backing buffer and the two cursors. Snapshots copy
//! out of the ring; the internal array is never exposed. Overflow discards
//! the oldest samples.

use parking_lot::Mutex;

struct RingState {
    buffer: Vec<f32>,
    size: usize,
    write_pos: usize,
}

pub struct AudioRingBuffer {
    capacity: usize,
    state: Mutex<RingState>,
}

impl AudioRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(RingState {
                buffer: vec![0.0; capacity],
                size: 0,
                write_pos: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append samples, overwriting the oldest on overflow.
    /// Called from the audio callback; does nothing blocking beyond the lock.
    pub fn push(&self, data: &[f32]) {
        if data.is_empty() {
            return;
        }
        let mut st = self.state.lock();

        if data.len() >= self.capacity {
            // Only the newest `capacity` samples survive.
            let tail = &data[data.len() - self.capacity..];
            st.buffer.copy_from_slice(tail);
            st.size = self.capacity;
            st.write_pos = 0;
            return;
        }

        let first = (self.capacity - st.write_pos).min(data.len());
        let write_pos = st.write_pos;
        st.buffer[write_pos..write_pos + first].copy_from_slice(&data[..first]);
        let remaining = data.len() - first;
        if remaining > 0 {
            st.buffer[..remaining].copy_from_slice(&data[first..]);
        }
        st.write_pos = (st.write_pos + data.len()) % self.capacity;
        st.size = (st.size + data.len()).min(self.capacity);
    }

    /// Copy out the most recent `min(len, limit)` samples in temporal order.
    pub fn snapshot(&self, limit: usize) -> Vec<f32> {
        let st = self.state.lock();
        let n = st.size.min(limit);
        if n == 0 {
            return Vec::new();
        }
        let start = (st.write_pos + self.capacity - n) % self.capacity;
        let mut out = Vec::with_capacity(n);
        if start + n <= self.capacity {
            out.extend_from_slice(&st.buffer[start..start + n]);
        } else {
            out.extend_from_slice(&st.buffer[start..]);
            out.extend_from_slice(&st.buffer[..n - (self.capacity - start)]);
        }
        out
    }

    pub fn clear(&self) {
        let mut st = self.state.lock();
        st.size = 0;
        st.write_pos = 0;
    }
}
