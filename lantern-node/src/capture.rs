//! Synthetic screen source for headless nodes.

use async_trait::async_trait;

use lantern_core::error::LanternError;
use lantern_core::protocol::screen::{ALL_MONITORS, CaptureRect};
use lantern_core::screen::{CaptureSelector, CapturedFrame, FrameSource};

/// A frame source that draws a moving gradient instead of reading a
/// real display. Viewers see the pattern scroll, which makes frame
/// delivery and rate changes visible without any capture hardware.
#[derive(Debug)]
pub struct PatternSource {
    width: u32,
    height: u32,
    tick: u64,
}

impl PatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }

    /// Render one RGB8 frame of the given region.
    fn render(&self, rect: CaptureRect) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(rect.width as usize * rect.height as usize * 3);
        for y in 0..rect.height {
            for x in 0..rect.width {
                let gx = (rect.x + x as i32) as i64;
                let gy = (rect.y + y as i32) as i64;
                rgb.push((gx + gy + 8 * self.tick as i64) as u8);
                rgb.push(gy as u8);
                rgb.push(gx as u8);
            }
        }
        rgb
    }
}

impl Default for PatternSource {
    fn default() -> Self {
        Self::new(1280, 800)
    }
}

#[async_trait]
impl FrameSource for PatternSource {
    fn monitor_count(&self) -> u32 {
        1
    }

    async fn capture(&mut self, selector: CaptureSelector) -> Result<CapturedFrame, LanternError> {
        let full = CaptureRect::new(0, 0, self.width, self.height);
        let (rect, monitor_index) = match selector {
            CaptureSelector::Monitor(index) => (full, index as i32),
            CaptureSelector::AllMonitors => (full, ALL_MONITORS),
            CaptureSelector::Region(rect) => (rect, 0),
        };

        let rgb = self.render(rect);
        self.tick += 1;

        Ok(CapturedFrame {
            rgb,
            width: rect.width,
            height: rect.height,
            rect,
            monitor_index,
            monitor_count: self.monitor_count(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_frame_covers_the_virtual_screen() {
        let mut source = PatternSource::new(64, 32);
        let frame = source.capture(CaptureSelector::Monitor(0)).await.unwrap();
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 32);
        assert_eq!(frame.rgb.len(), 64 * 32 * 3);
        assert_eq!(frame.monitor_index, 0);
        assert_eq!(frame.monitor_count, 1);
    }

    #[tokio::test]
    async fn region_sizes_the_frame() {
        let mut source = PatternSource::new(64, 32);
        let rect = CaptureRect::new(10, 4, 16, 8);
        let frame = source
            .capture(CaptureSelector::Region(rect))
            .await
            .unwrap();
        assert_eq!(frame.width, 16);
        assert_eq!(frame.height, 8);
        assert_eq!(frame.rect, rect);
        assert_eq!(frame.rgb.len(), 16 * 8 * 3);
    }

    #[tokio::test]
    async fn pattern_advances_between_frames() {
        let mut source = PatternSource::new(16, 16);
        let first = source.capture(CaptureSelector::Monitor(0)).await.unwrap();
        let second = source.capture(CaptureSelector::Monitor(0)).await.unwrap();
        assert_ne!(first.rgb, second.rgb);
    }

    #[tokio::test]
    async fn all_monitors_reports_the_sentinel_index() {
        let mut source = PatternSource::new(16, 16);
        let frame = source.capture(CaptureSelector::AllMonitors).await.unwrap();
        assert_eq!(frame.monitor_index, ALL_MONITORS);
    }
}
