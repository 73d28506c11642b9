//! Frame sources: the boundary to the depth-camera SDK.

use std::collections::VecDeque;
use std::time::Duration;

use physio_core::{Error, Result};
use physio_pose::SdkFrame;

/// Anything that produces depth-SDK frames
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    ///
    /// [`Error::Device`] is fatal to the capture loop; any other error is
    /// treated as a dropped frame.
    fn next_frame(&mut self) -> Result<SdkFrame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<SdkFrame> {
        (**self).next_frame()
    }
}

/// Plays back a fixed list of frames at a steady rate.
///
/// Once the script is exhausted the source reports empty frames (tracking
/// lost), or a device failure if configured to.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    frames: VecDeque<SdkFrame>,
    interval: Duration,
    fail_when_exhausted: bool,
}

impl ScriptedSource {
    /// Frame spacing of a 30 fps camera
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(33);

    pub fn new(frames: impl IntoIterator<Item = SdkFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            interval: Self::DEFAULT_INTERVAL,
            fail_when_exhausted: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn fail_when_exhausted(mut self) -> Self {
        self.fail_when_exhausted = true;
        self
    }

    pub fn push(&mut self, frame: SdkFrame) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<SdkFrame> {
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
        match self.frames.pop_front() {
            Some(frame) => Ok(frame),
            None if self.fail_when_exhausted => {
                Err(Error::Device("frame stream ended".into()))
            }
            None => Ok(SdkFrame::empty()),
        }
    }
}
