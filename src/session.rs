use std::{fmt, fmt::Display};

use tracing::{debug, info, warn};

use crate::contract::{BackendError, Codec, DecodeBackend, Dimensions, OutputSurface, PictureInfo};
use crate::parameter_sets::{HEADER_SCRATCH_LEN, write_sps_pps};
use crate::resilience::{ContextAction, ResilienceState, ResilienceTuning};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Decoded,
    Dropped,
}

impl FrameOutcome {
    #[must_use]
    pub fn is_decoded(self) -> bool {
        matches!(self, Self::Decoded)
    }
}

/// Monotonic per-session counters. `resolution_changes` counts context
/// configurations, including the initial one on the first frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub decoded_frames: u64,
    pub dropped_frames: u64,
    pub soft_resets: u64,
    pub hard_resets: u64,
    pub resolution_changes: u64,
}

impl Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionStats(decoded={}, dropped={}, soft_resets={}, hard_resets={}, resolution_changes={})",
            self.decoded_frames,
            self.dropped_frames,
            self.soft_resets,
            self.hard_resets,
            self.resolution_changes
        )
    }
}

/// Owner of one backend decode context for an H.264 elementary stream.
///
/// Each [`decode`](Self::decode) call stitches synthesized SPS/PPS onto
/// the caller's headerless payload, hands the result to the backend, and
/// runs the health feedback loop: resolution changes and sustained
/// failure streaks recycle the context, a long healthy streak walks the
/// bitrate estimate back down.
///
/// The call is synchronous and `&mut self`, which serializes context
/// recreation against decoding; the scratch and assembly buffers are
/// single-slot and never escape the call.
pub struct DecodeSession<S, B>
where
    S: OutputSurface,
    B: DecodeBackend<S>,
{
    backend: B,
    codec: Codec,
    context: Option<B::Context>,
    output_dims: Option<Dimensions>,
    resilience: ResilienceState,
    tuning: ResilienceTuning,
    header_scratch: [u8; HEADER_SCRATCH_LEN],
    frame: Vec<u8>,
    stats: SessionStats,
}

impl<S, B> DecodeSession<S, B>
where
    S: OutputSurface,
    B: DecodeBackend<S>,
{
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::with_tuning(backend, ResilienceTuning::default())
    }

    #[must_use]
    pub fn with_tuning(backend: B, tuning: ResilienceTuning) -> Self {
        Self {
            backend,
            codec: Codec::H264,
            context: None,
            output_dims: None,
            resilience: ResilienceState::new(&tuning),
            tuning,
            header_scratch: [0; HEADER_SCRATCH_LEN],
            frame: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    /// Decodes one frame into `surface`. `payload` is the headerless
    /// slice data for the picture described by `picture`.
    ///
    /// A frame the backend rejects is reported as
    /// [`FrameOutcome::Dropped`], never as an error; the caller simply
    /// submits the next frame. The only fatal condition is the backend
    /// failing to produce a context.
    pub fn decode(
        &mut self,
        picture: &PictureInfo,
        surface: &mut S,
        payload: &[u8],
    ) -> Result<FrameOutcome, BackendError> {
        let dims = surface.requested_dims();
        if self.output_dims != Some(dims) {
            self.reconfigure(dims)?;
        } else if self.context.is_none() {
            // A previous recycle lost its context; bring one back before
            // this frame proceeds.
            self.context = Some(self.backend.create_context(self.codec)?);
        }

        let header_len = write_sps_pps(picture, &mut self.header_scratch);
        self.frame.clear();
        self.frame.extend_from_slice(&self.header_scratch[..header_len]);
        self.frame.extend_from_slice(payload);

        let Some(context) = self.context.as_mut() else {
            return Err(BackendError::ContextLost);
        };
        let status = self.backend.decode_frame(context, surface, &self.frame);

        if status.is_ok() {
            self.resilience.on_success(&self.tuning);
            self.stats.decoded_frames += 1;
            return Ok(FrameOutcome::Decoded);
        }

        debug!(%status, failures = self.resilience.consecutive_failures + 1, "frame decode failed");
        self.stats.dropped_frames += 1;
        match self.resilience.on_failure(&self.tuning) {
            ContextAction::Retain => {}
            ContextAction::SoftReset => {
                info!(
                    target_bitrate = self.resilience.target_bitrate,
                    "sustained decode failures, recycling context with raised bitrate estimate"
                );
                self.stats.soft_resets += 1;
                self.recycle_context()?;
            }
            ContextAction::HardReset => {
                warn!("decode failures persist at the bitrate ceiling, recycling context");
                self.stats.hard_resets += 1;
                self.recycle_context()?;
            }
        }
        Ok(FrameOutcome::Dropped)
    }

    #[must_use]
    pub fn target_bitrate(&self) -> u32 {
        self.resilience.target_bitrate
    }

    #[must_use]
    pub fn resilience(&self) -> &ResilienceState {
        &self.resilience
    }

    #[must_use]
    pub fn tuning(&self) -> &ResilienceTuning {
        &self.tuning
    }

    #[must_use]
    pub fn output_dims(&self) -> Option<Dimensions> {
        self.output_dims
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Output resolution changed (or was seen for the first time): swap
    /// the context and re-derive the health state before the frame runs.
    fn reconfigure(&mut self, dims: Dimensions) -> Result<(), BackendError> {
        self.recycle_context()?;
        self.resilience.rebase(dims, &self.tuning);
        self.output_dims = Some(dims);
        self.stats.resolution_changes += 1;
        info!(
            %dims,
            target_bitrate = self.resilience.target_bitrate,
            "decode context configured for output resolution"
        );
        Ok(())
    }

    fn recycle_context(&mut self) -> Result<(), BackendError> {
        if let Some(old) = self.context.take() {
            self.backend.destroy_context(old);
        }
        self.context = Some(self.backend.create_context(self.codec)?);
        Ok(())
    }
}

impl<S, B> Drop for DecodeSession<S, B>
where
    S: OutputSurface,
    B: DecodeBackend<S>,
{
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.backend.destroy_context(context);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::contract::DecodeStatus;

    struct CountingBackend {
        created: Rc<Cell<usize>>,
        destroyed: Rc<Cell<usize>>,
    }

    impl CountingBackend {
        fn new() -> (Self, Rc<Cell<usize>>, Rc<Cell<usize>>) {
            let created = Rc::new(Cell::new(0));
            let destroyed = Rc::new(Cell::new(0));
            (
                Self {
                    created: Rc::clone(&created),
                    destroyed: Rc::clone(&destroyed),
                },
                created,
                destroyed,
            )
        }
    }

    impl<S: OutputSurface> DecodeBackend<S> for CountingBackend {
        type Context = ();

        fn create_context(&mut self, _codec: Codec) -> Result<(), BackendError> {
            self.created.set(self.created.get() + 1);
            Ok(())
        }

        fn destroy_context(&mut self, _context: ()) {
            self.destroyed.set(self.destroyed.get() + 1);
        }

        fn decode_frame(&mut self, _context: &mut (), _surface: &mut S, _bitstream: &[u8]) -> DecodeStatus {
            DecodeStatus::OK
        }
    }

    struct FixedSurface(Dimensions);

    impl OutputSurface for FixedSurface {
        fn requested_dims(&self) -> Dimensions {
            self.0
        }

        fn present(&mut self, _dims: Dimensions, _rgba: &[u8]) {}
    }

    #[test]
    fn construction_does_not_touch_the_backend() {
        let (backend, created, destroyed) = CountingBackend::new();
        let session: DecodeSession<FixedSurface, _> = DecodeSession::new(backend);
        assert_eq!(created.get(), 0);
        drop(session);
        assert_eq!(destroyed.get(), 0);
    }

    #[test]
    fn first_frame_creates_the_context_once() {
        let (backend, created, _) = CountingBackend::new();
        let mut session = DecodeSession::new(backend);
        let mut surface = FixedSurface(Dimensions::new(1280, 720).unwrap());
        let picture = PictureInfo::progressive(1280, 720);

        for _ in 0..3 {
            let outcome = session.decode(&picture, &mut surface, &[0x41]).unwrap();
            assert!(outcome.is_decoded());
        }
        assert_eq!(created.get(), 1);
        assert_eq!(session.stats().decoded_frames, 3);
    }

    #[test]
    fn dropping_a_live_session_destroys_its_context() {
        let (backend, created, destroyed) = CountingBackend::new();
        let mut session = DecodeSession::new(backend);
        let mut surface = FixedSurface(Dimensions::new(1280, 720).unwrap());
        let picture = PictureInfo::progressive(1280, 720);
        session.decode(&picture, &mut surface, &[0x41]).unwrap();

        drop(session);
        assert_eq!(created.get(), 1);
        assert_eq!(destroyed.get(), 1);
    }
}
