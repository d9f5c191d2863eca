//! Frame hand-off and the render loop
//!
//! The state machine task pushes finished frames into a bounded channel; the
//! render loop is the only code that touches a [`Surface`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::domain::DisplayStage;
use crate::error::{ServiceError, ServiceResult};

/// Default capacity of the internal frame channel
pub const DEFAULT_FRAME_BUFFER: usize = 4;

/// One rendered image, copied out of the state machine
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbImage>,
    pub stage: DisplayStage,
    pub level: f64,
    pub sequence: u64,
}

/// Somewhere frames end up
pub trait Surface {
    fn present(&mut self, frame: &Frame) -> ServiceResult<()>;
}

/// Surface that only counts frames
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    presented: u64,
    last: Option<(DisplayStage, f64)>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn last(&self) -> Option<(DisplayStage, f64)> {
        self.last
    }
}

impl Surface for HeadlessSurface {
    fn present(&mut self, frame: &Frame) -> ServiceResult<()> {
        trace!(sequence = frame.sequence, stage = %frame.stage, level = frame.level, "HeadlessSurface::present");
        if self.last.map(|(stage, _)| stage) != Some(frame.stage) {
            info!(stage = %frame.stage, sequence = frame.sequence, "Display entered stage");
        }
        self.presented += 1;
        self.last = Some((frame.stage, frame.level));
        Ok(())
    }
}

/// Surface that writes every Nth frame to a PNG file
#[derive(Debug)]
pub struct SnapshotSurface {
    dir: PathBuf,
    every: u64,
    written: u64,
}

impl SnapshotSurface {
    pub fn new(dir: impl AsRef<Path>, every: u64) -> ServiceResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        debug!(dir = %dir.display(), every, "SnapshotSurface::new: called");
        fs::create_dir_all(&dir)
            .map_err(|e| ServiceError::Device(format!("cannot create snapshot dir {}: {}", dir.display(), e)))?;
        Ok(Self {
            dir,
            every: every.max(1),
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Surface for SnapshotSurface {
    fn present(&mut self, frame: &Frame) -> ServiceResult<()> {
        if frame.sequence % self.every != 0 {
            return Ok(());
        }
        let path = self.dir.join(format!(
            "frame-{:06}-{}.png",
            frame.sequence,
            frame.stage.as_str().to_lowercase()
        ));
        debug!(path = %path.display(), "SnapshotSurface::present: writing");
        frame.image.save(&path)?;
        self.written += 1;
        Ok(())
    }
}

/// Counters returned when the render loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub presented: u64,
    pub failed: u64,
}

/// Drains the frame channel onto a surface
pub struct RenderLoop {
    frames: mpsc::Receiver<Frame>,
}

impl RenderLoop {
    pub fn new(frames: mpsc::Receiver<Frame>) -> Self {
        Self { frames }
    }

    /// Present frames until `stop` fires or the producer goes away
    pub async fn run(&mut self, surface: &mut dyn Surface, stop: &CancellationToken) -> RenderStats {
        info!("Render loop started");
        let mut stats = RenderStats::default();

        loop {
            let frame = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                frame = self.frames.recv() => frame,
            };
            let Some(frame) = frame else {
                debug!("RenderLoop::run: frame channel closed");
                break;
            };

            match surface.present(&frame) {
                Ok(()) => stats.presented += 1,
                Err(e) => {
                    stats.failed += 1;
                    error!(sequence = frame.sequence, error = %e, "Failed to present frame");
                }
            }
        }

        info!(presented = stats.presented, failed = stats.failed, "Render loop stopped");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::filters::test_pattern;

    fn frame(sequence: u64, stage: DisplayStage) -> Frame {
        Frame {
            image: Arc::new(test_pattern(4, 4)),
            stage,
            level: 10.0,
            sequence,
        }
    }

    #[tokio::test]
    async fn test_render_loop_drains_until_closed() {
        let (tx, rx) = mpsc::channel(8);
        for n in 0..3 {
            tx.send(frame(n, DisplayStage::BlackWhite)).await.unwrap();
        }
        drop(tx);

        let mut surface = HeadlessSurface::new();
        let stats = RenderLoop::new(rx).run(&mut surface, &CancellationToken::new()).await;

        assert_eq!(stats.presented, 3);
        assert_eq!(surface.presented(), 3);
        assert_eq!(surface.last(), Some((DisplayStage::BlackWhite, 10.0)));
    }

    #[tokio::test]
    async fn test_render_loop_stops_on_cancel() {
        let (_tx, rx) = mpsc::channel::<Frame>(1);
        let stop = CancellationToken::new();
        stop.cancel();

        let stats = RenderLoop::new(rx).run(&mut HeadlessSurface::new(), &stop).await;
        assert_eq!(stats, RenderStats::default());
    }

    #[test]
    fn test_snapshot_surface_writes_every_nth() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = SnapshotSurface::new(dir.path().join("snaps"), 2).unwrap();

        for n in 0..5 {
            surface.present(&frame(n, DisplayStage::Blurry)).unwrap();
        }

        assert_eq!(surface.written(), 3);
        assert!(dir.path().join("snaps/frame-000004-blurry.png").exists());
        assert!(!dir.path().join("snaps/frame-000001-blurry.png").exists());
    }
}
