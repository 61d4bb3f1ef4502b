mod contract;
mod nal_writer;
#[cfg(feature = "backend-openh264")]
mod openh264_backend;
mod parameter_sets;
mod resilience;
mod session;

pub use contract::{
    BackendError, Codec, DecodeBackend, DecodeStatus, Dimensions, OutputSurface, PictureInfo,
};
#[cfg(feature = "backend-openh264")]
pub use openh264_backend::OpenH264Backend;
pub use parameter_sets::{HEADER_SCRATCH_LEN, write_sps_pps};
pub use resilience::{ContextAction, ResilienceState, ResilienceTuning};
pub use session::{DecodeSession, FrameOutcome, SessionStats};
