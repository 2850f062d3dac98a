//! Playback engine: plays one synthesized clip at a time and reports
//! completion into the controller loop.
//!
//! At most one playback resource is alive at any instant: `play` releases
//! the previous clip before the new one owns the sink, and `cancel` is safe
//! whenever, including when nothing is playing. `RodioPlayback` holds the
//! output stream, which is not `Send` on some platforms, so keep the engine
//! (and the controller that owns it) on a single task.

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use rodio::Source;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::PlaybackError;
use crate::synthesis::AudioClip;

/// Token for the single live playback resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackHandle {
    id: u64,
}

impl PlaybackHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Signals delivered into the controller loop.
#[derive(Debug, Clone)]
pub enum PlaybackSignal {
    /// The clip behind this handle drained naturally. Emitted exactly once
    /// per clip; never emitted after a cancel.
    Finished(PlaybackHandle),

    /// The output device or decoder failed mid-clip. Carries the failed
    /// clip's handle so reports from a superseded clip can be ignored; the
    /// controller treats a live one the same as completion.
    Error(PlaybackHandle, String),
}

/// Plays one clip at a time.
pub trait PlaybackEngine {
    /// Start playing `clip`, releasing any prior resource first.
    fn play(&mut self, clip: AudioClip) -> Result<PlaybackHandle, PlaybackError>;

    /// Stop and discard the current clip immediately. Safe to call when
    /// playback already completed or never started.
    fn cancel(&mut self);

    fn is_playing(&self) -> bool;
}

/// Production engine on a `rodio::Sink`.
pub struct RodioPlayback {
    _stream: rodio::OutputStream,
    _stream_handle: rodio::OutputStreamHandle,
    sink: Arc<rodio::Sink>,
    epoch: Arc<AtomicU64>,
    signal_tx: mpsc::UnboundedSender<PlaybackSignal>,
}

impl RodioPlayback {
    /// Open the default output device. Completion signals go to `signal_tx`.
    pub fn new(signal_tx: mpsc::UnboundedSender<PlaybackSignal>) -> Result<Self, PlaybackError> {
        let (stream, stream_handle) = rodio::OutputStream::try_default()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        let sink = rodio::Sink::try_new(&stream_handle)
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        info!("playback sink ready");
        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink: Arc::new(sink),
            epoch: Arc::new(AtomicU64::new(0)),
            signal_tx,
        })
    }
}

impl PlaybackEngine for RodioPlayback {
    fn play(&mut self, clip: AudioClip) -> Result<PlaybackHandle, PlaybackError> {
        // Release whatever was playing before the new clip owns the sink.
        self.sink.stop();
        let id = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let source = rodio::Decoder::new(Cursor::new(clip.bytes))
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;
        self.sink.append(source.convert_samples::<f32>());

        let handle = PlaybackHandle::new(id);

        // Completion watcher: fires Finished once the sink drains, unless a
        // newer clip or a cancel has bumped the epoch in the meantime.
        let sink = Arc::clone(&self.sink);
        let epoch = Arc::clone(&self.epoch);
        let tx = self.signal_tx.clone();
        thread::spawn(move || {
            sink.sleep_until_end();
            if epoch.load(Ordering::SeqCst) == id {
                let _ = tx.send(PlaybackSignal::Finished(handle));
            }
        });

        Ok(handle)
    }

    fn cancel(&mut self) {
        // Bumping the epoch first invalidates any pending watcher.
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.sink.stop();
        debug!("playback cancelled");
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty()
    }
}
