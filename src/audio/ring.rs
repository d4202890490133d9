use log::debug;
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Fixed-capacity circular queue of synthesized audio frames bridging the
/// processing pipeline to the real-time render callback.
///
/// Exactly two actors touch it: the producer pushes one frame per processed
/// video frame and drops the frame when the ring is full (back-pressure, not
/// an error); the consumer fills an externally requested sample count,
/// crossing frame boundaries as needed and emitting silence on underrun.
/// The mutex is held only for index bookkeeping plus one bounded slot copy,
/// and the render side uses `try_lock`, so the audio callback never waits on
/// a contended lock.
pub struct FrameRing {
    state: Mutex<RingState>,
    capacity: usize,
    frame_len: usize,
}

struct RingState {
    slots: Vec<Vec<f32>>,
    write_index: usize,
    read_index: usize,
    /// Frames written but not yet fully consumed. Invariant:
    /// `0 <= available <= capacity`.
    available: usize,
    /// Read position inside the frame at `read_index`.
    read_cursor: usize,
}

impl FrameRing {
    /// Allocate `capacity` zero-filled slots of `frame_len` samples.
    pub fn new(capacity: usize, frame_len: usize) -> Self {
        assert!(capacity > 0 && frame_len > 0);
        Self {
            state: Mutex::new(RingState {
                slots: vec![vec![0.0; frame_len]; capacity],
                write_index: 0,
                read_index: 0,
                available: 0,
                read_cursor: 0,
            }),
            capacity,
            frame_len,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Frames currently queued.
    pub fn available(&self) -> usize {
        self.lock().available
    }

    /// Push one synthesized frame. Returns false and drops the frame when
    /// the consumer has fallen behind; the producer never blocks.
    pub fn push(&self, samples: &[f32]) -> bool {
        let mut state = self.lock();
        if state.available == self.capacity {
            debug!("audio ring full, dropping frame");
            return false;
        }

        let index = state.write_index;
        let copy = samples.len().min(self.frame_len);
        let slot = &mut state.slots[index];
        slot[..copy].copy_from_slice(&samples[..copy]);
        slot[copy..].fill(0.0);

        state.write_index = (index + 1) % self.capacity;
        state.available += 1;
        true
    }

    /// Fill `out` completely from queued frames, writing silence for any
    /// unmet remainder. Real-time safe: no allocation, and a contended lock
    /// degrades to a silent block instead of waiting.
    pub fn fill(&self, out: &mut [f32]) {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                out.fill(0.0);
                return;
            }
        };

        let mut filled = 0;
        while filled < out.len() {
            if state.available == 0 {
                out[filled..].fill(0.0);
                break;
            }

            let index = state.read_index;
            let cursor = state.read_cursor;
            let take = (self.frame_len - cursor).min(out.len() - filled);
            out[filled..filled + take]
                .copy_from_slice(&state.slots[index][cursor..cursor + take]);
            filled += take;

            if cursor + take == self.frame_len {
                state.read_cursor = 0;
                state.read_index = (index + 1) % self.capacity;
                state.available -= 1;
            } else {
                state.read_cursor = cursor + take;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
