use std::num::NonZeroU32;
use std::{fmt, fmt::Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
}

impl Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => f.write_str("h264"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: NonZeroU32,
    pub height: NonZeroU32,
}

impl Dimensions {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            width: NonZeroU32::new(width)?,
            height: NonZeroU32::new(height)?,
        })
    }

    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width.get()) * u64::from(self.height.get())
    }
}

impl Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Raw status word returned by a backend decode call. Zero is the only
/// success value; every other bit pattern is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStatus(pub i32);

impl DecodeStatus {
    pub const OK: Self = Self(0);

    #[must_use]
    pub fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl Display for DecodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status({})", self.0)
    }
}

/// Per-frame picture parameters handed in by the bitstream front-end.
/// Carries exactly what SPS/PPS reconstruction needs; read-only here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureInfo {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub qpprime_y_zero_transform_bypass: bool,
    pub log2_max_frame_num_minus4: u8,
    pub pic_order_cnt_type: u8,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    pub delta_pic_order_always_zero: bool,
    pub max_num_ref_frames: u8,
    pub pic_width_in_mbs: u16,
    pub pic_height_in_map_units: u16,
    pub frame_mbs_only: bool,
    pub mb_adaptive_frame_field: bool,
    pub direct_8x8_inference: bool,
    pub frame_crop_right_offset: u16,
    pub frame_crop_bottom_offset: u16,
    pub entropy_coding_mode: bool,
    pub pic_order_present: bool,
    pub num_ref_idx_l0_default_active_minus1: u8,
    pub num_ref_idx_l1_default_active_minus1: u8,
    pub weighted_pred: bool,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp_minus26: i8,
    pub pic_init_qs_minus26: i8,
    pub chroma_qp_index_offset: i8,
    pub second_chroma_qp_index_offset: i8,
    pub deblocking_filter_control_present: bool,
    pub constrained_intra_pred: bool,
    pub redundant_pic_cnt_present: bool,
    pub transform_8x8_mode: bool,
}

impl PictureInfo {
    /// Progressive 4:2:0 picture parameters for the given pixel dimensions,
    /// with High-profile defaults. Non-macroblock-aligned dimensions are
    /// expressed through frame cropping.
    #[must_use]
    pub fn progressive(width: u32, height: u32) -> Self {
        let width_mbs = width.div_ceil(16).max(1);
        let height_mbs = height.div_ceil(16).max(1);
        Self {
            profile_idc: 100,
            level_idc: 40,
            chroma_format_idc: 1,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            qpprime_y_zero_transform_bypass: false,
            log2_max_frame_num_minus4: 4,
            pic_order_cnt_type: 0,
            log2_max_pic_order_cnt_lsb_minus4: 4,
            delta_pic_order_always_zero: false,
            max_num_ref_frames: 4,
            pic_width_in_mbs: width_mbs as u16,
            pic_height_in_map_units: height_mbs as u16,
            frame_mbs_only: true,
            mb_adaptive_frame_field: false,
            direct_8x8_inference: true,
            frame_crop_right_offset: ((width_mbs * 16 - width) / 2) as u16,
            frame_crop_bottom_offset: ((height_mbs * 16 - height) / 2) as u16,
            entropy_coding_mode: true,
            pic_order_present: false,
            num_ref_idx_l0_default_active_minus1: 0,
            num_ref_idx_l1_default_active_minus1: 0,
            weighted_pred: false,
            weighted_bipred_idc: 0,
            pic_init_qp_minus26: 0,
            pic_init_qs_minus26: 0,
            chroma_qp_index_offset: 0,
            second_chroma_qp_index_offset: 0,
            deblocking_filter_control_present: true,
            constrained_intra_pred: false,
            redundant_pic_cnt_present: false,
            transform_8x8_mode: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(Codec),
    #[error("decode context creation failed: {0}")]
    ContextCreation(String),
    #[error("no live decode context")]
    ContextLost,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Destination for decoded pictures. The session layer only reads the
/// requested output resolution; pixel delivery happens between a backend
/// and the surface and is opaque above that boundary.
pub trait OutputSurface {
    fn requested_dims(&self) -> Dimensions;

    fn present(&mut self, dims: Dimensions, rgba: &[u8]);
}

/// Capability handle for a decoding library. A `Context` is one live
/// decode session; contexts are created, recycled, and destroyed by
/// [`crate::DecodeSession`], never shared.
pub trait DecodeBackend<S: OutputSurface> {
    type Context;

    fn create_context(&mut self, codec: Codec) -> Result<Self::Context, BackendError>;

    fn destroy_context(&mut self, context: Self::Context);

    fn decode_frame(
        &mut self,
        context: &mut Self::Context,
        surface: &mut S,
        bitstream: &[u8],
    ) -> DecodeStatus;
}
