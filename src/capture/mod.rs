use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One captured video frame: interleaved BGRA bytes, 4 bytes per pixel,
/// rows packed without padding.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Panics when `data` is not exactly `width * height * 4` bytes; a
    /// malformed buffer must fail at the construction seam, not at a slice
    /// index deep in feature extraction.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width * height * 4,
            "frame buffer is {} bytes, {}x{} BGRA needs {}",
            data.len(),
            width,
            height,
            width * height * 4
        );
        Self {
            width,
            height,
            data,
        }
    }

    pub fn bytes_per_row(&self) -> usize {
        self.width * 4
    }
}

/// Seam for the video-capture collaborator: anything that produces BGRA
/// frames at a fixed rate. Returning `None` ends the stream.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Option<VideoFrame>;

    fn frame_rate(&self) -> f32;
}

/// Synthetic capture source: an animated color gradient that sweeps hue and
/// brightness over time, giving the pipeline moving input without a camera.
pub struct TestPatternSource {
    width: usize,
    height: usize,
    frame_rate: f32,
    tick: u64,
}

impl TestPatternSource {
    pub fn new(width: usize, height: usize, frame_rate: f32) -> Self {
        Self {
            width,
            height,
            frame_rate,
            tick: 0,
        }
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> Option<VideoFrame> {
        let t = self.tick as f32 / self.frame_rate.max(1.0);
        let mut data = Vec::with_capacity(self.width * self.height * 4);

        for y in 0..self.height {
            let fy = y as f32 / self.height.max(1) as f32;
            for x in 0..self.width {
                let fx = x as f32 / self.width.max(1) as f32;
                let r = (0.5 + 0.5 * (2.0 * std::f32::consts::PI * (fx + 0.10 * t)).sin())
                    * 255.0;
                let g = (0.5 + 0.5 * (2.0 * std::f32::consts::PI * (fy + 0.07 * t)).cos())
                    * 255.0;
                let b = (0.5 + 0.5 * (2.0 * std::f32::consts::PI * (fx + fy - 0.05 * t)).sin())
                    * 255.0;
                data.extend_from_slice(&[b as u8, g as u8, r as u8, 255]);
            }
        }

        self.tick += 1;
        Some(VideoFrame::new(self.width, self.height, data))
    }

    fn frame_rate(&self) -> f32 {
        self.frame_rate
    }
}

/// Run a frame source on its own delivery thread, pushing into a bounded
/// channel. A full channel drops the newest frame; capture never blocks on
/// the processing worker.
pub fn spawn_capture(
    mut source: Box<dyn FrameSource>,
    frames: Sender<VideoFrame>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let interval = Duration::from_secs_f32(1.0 / source.frame_rate().max(1.0));

        while !stop.load(Ordering::Relaxed) {
            let Some(frame) = source.next_frame() else {
                break;
            };
            match frames.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("frame queue full, dropping captured frame");
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
            thread::sleep(interval);
        }
        info!("capture stream stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_produces_well_formed_bgra_frames() {
        let mut source = TestPatternSource::new(16, 9, 30.0);
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.width, 16);
        assert_eq!(frame.height, 9);
        assert_eq!(frame.data.len(), 16 * 9 * 4);
        assert_eq!(frame.bytes_per_row(), 64);
        // alpha channel is opaque
        assert!(frame.data.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    #[should_panic(expected = "frame buffer")]
    fn short_frame_buffer_is_rejected_at_construction() {
        VideoFrame::new(4, 4, vec![0u8; 4 * 4 * 4 - 1]);
    }

    #[test]
    fn test_pattern_animates_over_time() {
        let mut source = TestPatternSource::new(8, 8, 30.0);
        let first = source.next_frame().unwrap();
        let second = source.next_frame().unwrap();
        assert_ne!(first.data, second.data);
    }
}
