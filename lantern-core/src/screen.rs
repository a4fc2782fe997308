//! The screen-stream pipeline.
//!
//! Controlled side: a timer-paced loop captures the selected region
//! through a [`FrameSource`], encodes it as JPEG, and sends it down
//! the link as a `ScreenFrame` with the image bytes as attachment.
//! The viewer retunes the loop (`ControlFps`, `ControlCaptureRegion`,
//! `ControlSelectMonitor`) via [`StreamerCommand`]s.
//!
//! Viewing side: each arriving frame goes to a [`FrameSink`], while a
//! [`ViewportTracker`] keeps a rolling FPS figure and flags the
//! viewport stale when frames stop. Staleness is a display signal
//! only; it never tears the link down.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::error::LanternError;
use crate::frame::Frame;
use crate::message::Message;
use crate::protocol::screen::{
    ALL_MONITORS, CaptureRect, KeyboardEvent, MouseButton, MouseEvent, ScreenFrameMeta,
};

/// Default capture cadence (~25 frames per second).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(40);

/// Fixed JPEG quality for outgoing frames.
pub const JPEG_QUALITY: u8 = 50;

/// No frame for this long marks the viewport stale.
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(3);

// ── Capture selector ──────────────────────────────────────────────

/// What part of the desktop the stream shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSelector {
    /// One monitor's full surface.
    Monitor(u32),

    /// Every monitor, as one wide surface.
    AllMonitors,

    /// A viewer-chosen rectangle.
    Region(CaptureRect),
}

impl Default for CaptureSelector {
    fn default() -> Self {
        CaptureSelector::Monitor(0)
    }
}

/// Selector plus the memory needed to leave a region again.
///
/// Picking a rectangle does not forget which monitor was active:
/// clearing the rectangle (an empty rect) restores that selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorState {
    current: CaptureSelector,
    prior: CaptureSelector,
}

impl SelectorState {
    pub fn current(&self) -> CaptureSelector {
        self.current
    }

    /// Apply a monitor selection: [`ALL_MONITORS`] or an index below
    /// `monitor_count`. Out-of-range indexes leave the selector
    /// unchanged.
    pub fn select_monitor(&mut self, index: i32, monitor_count: u32) -> Result<(), LanternError> {
        let selection = match index {
            ALL_MONITORS => CaptureSelector::AllMonitors,
            i if i >= 0 && (i as u32) < monitor_count => CaptureSelector::Monitor(i as u32),
            _ => {
                return Err(LanternError::ProtocolViolation("monitor index out of range"));
            }
        };
        self.current = selection;
        self.prior = selection;
        Ok(())
    }

    /// Apply a region selection. An empty rect restores the monitor
    /// selection that was active before the region.
    pub fn set_region(&mut self, rect: CaptureRect) {
        if rect.is_empty() {
            self.current = self.prior;
        } else {
            self.current = CaptureSelector::Region(rect);
        }
    }
}

// ── Collaborator seams ────────────────────────────────────────────

/// One grabbed frame, tightly packed RGB8.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub rect: CaptureRect,
    pub monitor_index: i32,
    pub monitor_count: u32,
}

/// Where frames come from on the controlled side.
#[async_trait]
pub trait FrameSource: Send {
    /// Number of monitors currently attached.
    fn monitor_count(&self) -> u32;

    /// Grab one frame of the selected region.
    async fn capture(&mut self, selector: CaptureSelector) -> Result<CapturedFrame, LanternError>;
}

/// Where decoded frames go on the viewing side.
#[async_trait]
pub trait FrameSink: Send {
    /// Present one frame. `jpeg` is the raw image as received.
    async fn render_frame(&mut self, jpeg: &[u8], meta: ScreenFrameMeta)
    -> Result<(), LanternError>;
}

/// Synthetic input primitives on the controlled side.
#[async_trait]
pub trait InputInjector: Send {
    async fn move_cursor(&mut self, x: i32, y: i32) -> Result<(), LanternError>;
    async fn button_down(&mut self, button: MouseButton) -> Result<(), LanternError>;
    async fn button_up(&mut self, button: MouseButton) -> Result<(), LanternError>;
    async fn scroll(&mut self, delta: i32) -> Result<(), LanternError>;
    async fn key_down(&mut self, key: &str) -> Result<(), LanternError>;
    async fn key_up(&mut self, key: &str) -> Result<(), LanternError>;
    async fn hotkey(&mut self, keys: &[String]) -> Result<(), LanternError>;
}

/// Route one wire mouse event to the injector's primitives.
pub async fn inject_mouse(
    injector: &mut dyn InputInjector,
    event: MouseEvent,
) -> Result<(), LanternError> {
    match event {
        MouseEvent::Move { x, y } => injector.move_cursor(x, y).await,
        MouseEvent::Down { button } => injector.button_down(button).await,
        MouseEvent::Up { button } => injector.button_up(button).await,
        MouseEvent::Scroll { delta } => injector.scroll(delta).await,
    }
}

/// Route one wire keyboard event to the injector's primitives.
pub async fn inject_keyboard(
    injector: &mut dyn InputInjector,
    event: KeyboardEvent,
) -> Result<(), LanternError> {
    match event {
        KeyboardEvent::Down { key } => injector.key_down(&key).await,
        KeyboardEvent::Up { key } => injector.key_up(&key).await,
        KeyboardEvent::Chord { keys } => injector.hotkey(&keys).await,
    }
}

// ── JPEG encoding ─────────────────────────────────────────────────

/// Encode tightly packed RGB8 pixels as JPEG.
pub fn encode_jpeg(
    rgb: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, LanternError> {
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
        .write_image(rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| LanternError::Encoding(e.to_string()))?;
    Ok(jpeg)
}

/// Capture interval for a requested frame rate: `1000 / fps` ms,
/// floored at 1 ms so the timer stays valid for any rate.
pub fn interval_for_fps(fps: u32) -> Duration {
    Duration::from_millis(u64::from(1000 / fps.max(1)).max(1))
}

// ── Streamer (controlled side) ────────────────────────────────────

/// Retuning instructions for a running streamer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerCommand {
    /// Retime the capture loop; takes effect on the next tick.
    SetFps(u32),

    /// Restrict capture to a rectangle (empty rect clears it).
    SetRegion(CaptureRect),

    /// Switch monitors, [`ALL_MONITORS`] for the whole desktop.
    SelectMonitor(i32),
}

/// Handle to the capture-encode-send loop.
///
/// Dropping the handle stops the loop; so does the link closing.
pub struct ScreenStreamer {
    commands: mpsc::Sender<StreamerCommand>,
}

impl ScreenStreamer {
    /// Start streaming frames from `source` into `link`.
    pub fn spawn(
        mut source: Box<dyn FrameSource>,
        link: mpsc::Sender<Frame>,
        interval: Duration,
    ) -> Self {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<StreamerCommand>(16);

        tokio::spawn(async move {
            let mut selector = SelectorState::default();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut written = FpsCounter::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let captured = match source.capture(selector.current()).await {
                            Ok(c) => c,
                            Err(e) => {
                                warn!("capture failed: {e}");
                                continue;
                            }
                        };
                        let jpeg = match encode_jpeg(
                            &captured.rgb,
                            captured.width,
                            captured.height,
                            JPEG_QUALITY,
                        ) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("frame encode failed: {e}");
                                continue;
                            }
                        };
                        let meta = ScreenFrameMeta {
                            rect: captured.rect,
                            monitor_index: captured.monitor_index,
                            monitor_count: captured.monitor_count,
                        };
                        let frame = match Message::ScreenFrame(meta)
                            .into_frame_with_attachment(Bytes::from(jpeg))
                        {
                            Ok(f) => f,
                            Err(e) => {
                                warn!("frame build failed: {e}");
                                continue;
                            }
                        };
                        if link.send(frame).await.is_err() {
                            debug!("link closed, streaming ends");
                            break;
                        }
                        let rate = written.record(Instant::now().into_std());
                        trace!("writing at {rate:.1} fps");
                    }
                    cmd = cmd_rx.recv() => match cmd {
                        None => break,
                        Some(StreamerCommand::SetFps(fps)) => {
                            let mut next = tokio::time::interval(interval_for_fps(fps));
                            next.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            ticker = next;
                            debug!(fps, "capture loop retimed");
                        }
                        Some(StreamerCommand::SetRegion(rect)) => selector.set_region(rect),
                        Some(StreamerCommand::SelectMonitor(index)) => {
                            if let Err(e) = selector.select_monitor(index, source.monitor_count()) {
                                warn!(index, "monitor selection rejected: {e}");
                            }
                        }
                    }
                }
            }
            debug!("streamer task ended");
        });

        Self { commands: cmd_tx }
    }

    /// Send a retuning command; a finished streamer swallows it.
    pub async fn command(&self, command: StreamerCommand) {
        let _ = self.commands.send(command).await;
    }
}

// ── Viewer accounting ─────────────────────────────────────────────

/// Rolling frames-per-second over a one-second sliding window.
#[derive(Debug, Default)]
pub struct FpsCounter {
    arrivals: VecDeque<std::time::Instant>,
}

impl FpsCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arrival and return the rate over the last second.
    pub fn record(&mut self, at: std::time::Instant) -> f64 {
        self.arrivals.push_back(at);
        while let Some(front) = self.arrivals.front() {
            if at.duration_since(*front) > Self::WINDOW {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
        self.arrivals.len() as f64
    }
}

/// Receiver-side frame accounting: rolling FPS plus staleness.
#[derive(Debug)]
pub struct ViewportTracker {
    last_frame: Option<std::time::Instant>,
    reading: FpsCounter,
    window: Duration,
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::with_window(LIVENESS_WINDOW)
    }
}

impl ViewportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            last_frame: None,
            reading: FpsCounter::new(),
            window,
        }
    }

    /// Start the liveness clock without counting a frame, for the
    /// moment a stream is granted but nothing has arrived yet.
    pub fn arm(&mut self, at: std::time::Instant) {
        self.last_frame = Some(at);
    }

    /// Record a frame arrival; returns the rolling reading FPS.
    pub fn record_frame(&mut self, at: std::time::Instant) -> f64 {
        self.last_frame = Some(at);
        self.reading.record(at)
    }

    /// Stale when no frame has arrived within the window. An unarmed
    /// tracker is not stale, only empty.
    pub fn is_stale(&self, now: std::time::Instant) -> bool {
        match self.last_frame {
            Some(last) => now.duration_since(last) > self.window,
            None => false,
        }
    }
}
