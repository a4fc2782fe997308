//! Logging stand-ins for the desktop-facing collaborators.
//!
//! A headless node has no cursor to move and no window to paint, so
//! remote input and received frames are traced instead. Either struct
//! is a template for a real backend: implement the same trait against
//! the platform API and hand it to the service.

use async_trait::async_trait;
use tracing::{debug, info};

use lantern_core::error::LanternError;
use lantern_core::protocol::screen::{MouseButton, ScreenFrameMeta};
use lantern_core::screen::{FrameSink, InputInjector};

/// Injector that logs every primitive it is asked to perform.
#[derive(Debug, Default)]
pub struct TraceInjector;

#[async_trait]
impl InputInjector for TraceInjector {
    async fn move_cursor(&mut self, x: i32, y: i32) -> Result<(), LanternError> {
        debug!("remote cursor move to ({x}, {y})");
        Ok(())
    }

    async fn button_down(&mut self, button: MouseButton) -> Result<(), LanternError> {
        info!("remote {button:?} button down");
        Ok(())
    }

    async fn button_up(&mut self, button: MouseButton) -> Result<(), LanternError> {
        info!("remote {button:?} button up");
        Ok(())
    }

    async fn scroll(&mut self, delta: i32) -> Result<(), LanternError> {
        debug!("remote scroll by {delta}");
        Ok(())
    }

    async fn key_down(&mut self, key: &str) -> Result<(), LanternError> {
        info!("remote key down: {key}");
        Ok(())
    }

    async fn key_up(&mut self, key: &str) -> Result<(), LanternError> {
        info!("remote key up: {key}");
        Ok(())
    }

    async fn hotkey(&mut self, keys: &[String]) -> Result<(), LanternError> {
        info!("remote hotkey: {}", keys.join("+"));
        Ok(())
    }
}

/// Sink that decodes incoming frames just far enough to log them.
///
/// Decoding the dimensions keeps the JPEG path honest: a corrupt
/// stream shows up here rather than silently counting as viewed.
#[derive(Debug, Default)]
pub struct TraceSink;

#[async_trait]
impl FrameSink for TraceSink {
    async fn render_frame(
        &mut self,
        jpeg: &[u8],
        meta: ScreenFrameMeta,
    ) -> Result<(), LanternError> {
        let image = image::load_from_memory(jpeg)
            .map_err(|e| LanternError::Encoding(e.to_string()))?;
        debug!(
            "frame {}x{} ({} bytes) from monitor {}",
            image.width(),
            image.height(),
            jpeg.len(),
            meta.monitor_index,
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::protocol::screen::CaptureRect;
    use lantern_core::screen::encode_jpeg;

    fn meta() -> ScreenFrameMeta {
        ScreenFrameMeta {
            rect: CaptureRect::new(0, 0, 8, 8),
            monitor_index: 0,
            monitor_count: 1,
        }
    }

    #[tokio::test]
    async fn sink_accepts_a_real_jpeg() {
        let rgb = vec![0x40u8; 8 * 8 * 3];
        let jpeg = encode_jpeg(&rgb, 8, 8, 50).unwrap();
        let mut sink = TraceSink;
        assert!(sink.render_frame(&jpeg, meta()).await.is_ok());
    }

    #[tokio::test]
    async fn sink_rejects_garbage() {
        let mut sink = TraceSink;
        let result = sink.render_frame(&[0x00, 0x01, 0x02], meta()).await;
        assert!(matches!(result, Err(LanternError::Encoding(_))));
    }

    #[tokio::test]
    async fn injector_absorbs_every_primitive() {
        let mut injector = TraceInjector;
        injector.move_cursor(10, 20).await.unwrap();
        injector.button_down(MouseButton::Left).await.unwrap();
        injector.button_up(MouseButton::Left).await.unwrap();
        injector.scroll(-1).await.unwrap();
        injector.key_down("a").await.unwrap();
        injector.key_up("a").await.unwrap();
        injector.hotkey(&["ctrl".into(), "c".into()]).await.unwrap();
    }
}
