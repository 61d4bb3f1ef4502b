use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use tracing::debug;

use crate::contract::{BackendError, Codec, DecodeBackend, DecodeStatus, Dimensions, OutputSurface};

const DECODE_FAILED: DecodeStatus = DecodeStatus(-1);

/// Software decoding backend over Cisco's openh264. One context is one
/// decoder instance, so recycling a context really does discard all
/// decoder-internal state.
#[derive(Debug, Default)]
pub struct OpenH264Backend;

impl OpenH264Backend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

pub struct OpenH264Context {
    decoder: Decoder,
    rgba: Vec<u8>,
}

impl<S: OutputSurface> DecodeBackend<S> for OpenH264Backend {
    type Context = OpenH264Context;

    fn create_context(&mut self, codec: Codec) -> Result<OpenH264Context, BackendError> {
        match codec {
            Codec::H264 => {}
        }
        let decoder = Decoder::new()
            .map_err(|err| BackendError::ContextCreation(format!("openh264: {err}")))?;
        Ok(OpenH264Context {
            decoder,
            rgba: Vec::new(),
        })
    }

    fn destroy_context(&mut self, context: OpenH264Context) {
        drop(context);
    }

    fn decode_frame(
        &mut self,
        context: &mut OpenH264Context,
        surface: &mut S,
        bitstream: &[u8],
    ) -> DecodeStatus {
        match context.decoder.decode(bitstream) {
            Ok(Some(yuv)) => {
                let (width, height) = yuv.dimensions();
                let Some(dims) = Dimensions::new(width as u32, height as u32) else {
                    return DECODE_FAILED;
                };
                context.rgba.resize(width * height * 4, 0);
                yuv.write_rgba8(&mut context.rgba);
                surface.present(dims, &context.rgba);
                DecodeStatus::OK
            }
            // The decoder accepted the input but has no picture ready yet.
            Ok(None) => DecodeStatus::OK,
            Err(err) => {
                debug!(%err, "openh264 rejected bitstream");
                DECODE_FAILED
            }
        }
    }
}
