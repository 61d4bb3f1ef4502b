//! SPS/PPS reconstruction for headerless elementary streams.
//!
//! Console-style decoder front-ends strip parameter sets from the slice
//! data they submit and describe the picture out-of-band instead. This
//! module turns that out-of-band description back into the two NAL units
//! a conformant Annex-B decoder needs in front of the slices.

use crate::contract::PictureInfo;
use crate::nal_writer::NalWriter;

/// Scratch size every caller must provide to [`write_sps_pps`]. Large
/// enough for any parameter-set pair this module can synthesize.
pub const HEADER_SCRATCH_LEN: usize = 512;

const NAL_REF_IDC_HIGHEST: u8 = 3;
const NAL_TYPE_SPS: u8 = 7;
const NAL_TYPE_PPS: u8 = 8;

/// Profiles whose SPS carries the chroma format / bit depth block.
const PROFILES_WITH_CHROMA_INFO: [u8; 9] = [100, 110, 122, 244, 44, 83, 86, 118, 128];

/// Writes one SPS and one PPS NAL unit (4-byte start codes, emulation
/// prevention applied) from offset 0 of `scratch` and returns the number
/// of bytes written. Identical `info` produces identical bytes, and no
/// allocation happens on this path.
///
/// # Panics
///
/// Panics if `scratch` is too small; callers hand in at least
/// [`HEADER_SCRATCH_LEN`] bytes.
pub fn write_sps_pps(info: &PictureInfo, scratch: &mut [u8]) -> usize {
    let mut writer = NalWriter::new(scratch);
    write_sps(&mut writer, info);
    write_pps(&mut writer, info);
    writer.finish()
}

fn write_sps(w: &mut NalWriter<'_>, info: &PictureInfo) {
    w.begin_nal(NAL_REF_IDC_HIGHEST, NAL_TYPE_SPS);
    w.write_bits(u32::from(info.profile_idc), 8);
    w.write_bits(0, 8); // constraint_set flags + reserved_zero_2bits
    w.write_bits(u32::from(info.level_idc), 8);
    w.write_ue(0); // seq_parameter_set_id

    if PROFILES_WITH_CHROMA_INFO.contains(&info.profile_idc) {
        w.write_ue(u32::from(info.chroma_format_idc));
        if info.chroma_format_idc == 3 {
            w.write_flag(false); // separate_colour_plane_flag
        }
        w.write_ue(u32::from(info.bit_depth_luma_minus8));
        w.write_ue(u32::from(info.bit_depth_chroma_minus8));
        w.write_flag(info.qpprime_y_zero_transform_bypass);
        w.write_flag(false); // seq_scaling_matrix_present_flag
    }

    w.write_ue(u32::from(info.log2_max_frame_num_minus4));
    w.write_ue(u32::from(info.pic_order_cnt_type));
    if info.pic_order_cnt_type == 0 {
        w.write_ue(u32::from(info.log2_max_pic_order_cnt_lsb_minus4));
    } else if info.pic_order_cnt_type == 1 {
        w.write_flag(info.delta_pic_order_always_zero);
        w.write_se(0); // offset_for_non_ref_pic
        w.write_se(0); // offset_for_top_to_bottom_field
        w.write_ue(0); // num_ref_frames_in_pic_order_cnt_cycle
    }

    w.write_ue(u32::from(info.max_num_ref_frames));
    w.write_flag(false); // gaps_in_frame_num_value_allowed_flag
    w.write_ue(u32::from(info.pic_width_in_mbs) - 1);
    w.write_ue(u32::from(info.pic_height_in_map_units) - 1);
    w.write_flag(info.frame_mbs_only);
    if !info.frame_mbs_only {
        w.write_flag(info.mb_adaptive_frame_field);
    }
    w.write_flag(info.direct_8x8_inference);

    let cropped = info.frame_crop_right_offset != 0 || info.frame_crop_bottom_offset != 0;
    w.write_flag(cropped);
    if cropped {
        w.write_ue(0); // frame_crop_left_offset
        w.write_ue(u32::from(info.frame_crop_right_offset));
        w.write_ue(0); // frame_crop_top_offset
        w.write_ue(u32::from(info.frame_crop_bottom_offset));
    }

    w.write_flag(false); // vui_parameters_present_flag
    w.end_nal();
}

fn write_pps(w: &mut NalWriter<'_>, info: &PictureInfo) {
    w.begin_nal(NAL_REF_IDC_HIGHEST, NAL_TYPE_PPS);
    w.write_ue(0); // pic_parameter_set_id
    w.write_ue(0); // seq_parameter_set_id
    w.write_flag(info.entropy_coding_mode);
    w.write_flag(info.pic_order_present);
    w.write_ue(0); // num_slice_groups_minus1
    w.write_ue(u32::from(info.num_ref_idx_l0_default_active_minus1));
    w.write_ue(u32::from(info.num_ref_idx_l1_default_active_minus1));
    w.write_flag(info.weighted_pred);
    w.write_bits(u32::from(info.weighted_bipred_idc), 2);
    w.write_se(i32::from(info.pic_init_qp_minus26));
    w.write_se(i32::from(info.pic_init_qs_minus26));
    w.write_se(i32::from(info.chroma_qp_index_offset));
    w.write_flag(info.deblocking_filter_control_present);
    w.write_flag(info.constrained_intra_pred);
    w.write_flag(info.redundant_pic_cnt_present);

    if info.transform_8x8_mode
        || info.second_chroma_qp_index_offset != info.chroma_qp_index_offset
    {
        w.write_flag(info.transform_8x8_mode);
        w.write_flag(false); // pic_scaling_matrix_present_flag
        w.write_se(i32::from(info.second_chroma_qp_index_offset));
    }

    w.end_nal();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_code_offsets(data: &[u8]) -> Vec<usize> {
        (0..data.len().saturating_sub(3))
            .filter(|&i| data[i..i + 4] == [0, 0, 0, 1])
            .collect()
    }

    fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        let mut zero_run = 0;
        for &byte in data {
            if zero_run >= 2 && byte == 3 {
                zero_run = 0;
                continue;
            }
            out.push(byte);
            if byte == 0 {
                zero_run += 1;
            } else {
                zero_run = 0;
            }
        }
        out
    }

    struct BitReader {
        data: Vec<u8>,
        pos: usize,
    }

    impl BitReader {
        fn new(data: Vec<u8>) -> Self {
            Self { data, pos: 0 }
        }

        fn read_bit(&mut self) -> u32 {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            self.pos += 1;
            u32::from(bit)
        }

        fn read_bits(&mut self, count: u32) -> u32 {
            (0..count).fold(0, |acc, _| (acc << 1) | self.read_bit())
        }

        fn read_ue(&mut self) -> u32 {
            let mut zeros = 0;
            while self.read_bit() == 0 {
                zeros += 1;
            }
            (1 << zeros) - 1 + self.read_bits(zeros)
        }

        fn read_se(&mut self) -> i32 {
            let coded = self.read_ue();
            if coded % 2 == 1 {
                (coded / 2 + 1) as i32
            } else {
                -((coded / 2) as i32)
            }
        }
    }

    fn synthesize(info: &PictureInfo) -> Vec<u8> {
        let mut scratch = [0u8; HEADER_SCRATCH_LEN];
        let len = write_sps_pps(info, &mut scratch);
        scratch[..len].to_vec()
    }

    #[test]
    fn identical_input_yields_identical_bytes() {
        let info = PictureInfo::progressive(1280, 720);
        assert_eq!(synthesize(&info), synthesize(&info));
    }

    #[test]
    fn output_is_sps_then_pps_with_start_codes() {
        let data = synthesize(&PictureInfo::progressive(1280, 720));
        let starts = start_code_offsets(&data);
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0], 0);
        assert_eq!(data[4] & 0x1f, NAL_TYPE_SPS);
        assert_eq!(data[starts[1] + 4] & 0x1f, NAL_TYPE_PPS);
    }

    #[test]
    fn payloads_contain_no_unescaped_zero_triples() {
        let data = synthesize(&PictureInfo::progressive(640, 368));
        let starts = start_code_offsets(&data);
        let payloads = [&data[4..starts[1]], &data[starts[1] + 4..]];
        for payload in payloads {
            for window in payload.windows(3) {
                // 00 00 03 is the escape itself; 00 00 00..02 must not appear.
                assert!(
                    !(window[0] == 0 && window[1] == 0 && window[2] < 3),
                    "unescaped sequence {window:?}"
                );
            }
        }
    }

    #[test]
    fn sps_fields_survive_a_parse_round_trip() {
        let info = PictureInfo::progressive(1920, 1080);
        let data = synthesize(&info);
        let starts = start_code_offsets(&data);
        let mut r = BitReader::new(unescape_rbsp(&data[5..starts[1]]));

        assert_eq!(r.read_bits(8) as u8, info.profile_idc);
        assert_eq!(r.read_bits(8), 0);
        assert_eq!(r.read_bits(8) as u8, info.level_idc);
        assert_eq!(r.read_ue(), 0); // seq_parameter_set_id
        assert_eq!(r.read_ue() as u8, info.chroma_format_idc);
        assert_eq!(r.read_ue(), 0); // bit_depth_luma_minus8
        assert_eq!(r.read_ue(), 0); // bit_depth_chroma_minus8
        assert_eq!(r.read_bit(), 0); // qpprime_y_zero_transform_bypass
        assert_eq!(r.read_bit(), 0); // seq_scaling_matrix_present
        assert_eq!(r.read_ue() as u8, info.log2_max_frame_num_minus4);
        assert_eq!(r.read_ue() as u8, info.pic_order_cnt_type);
        assert_eq!(r.read_ue() as u8, info.log2_max_pic_order_cnt_lsb_minus4);
        assert_eq!(r.read_ue() as u8, info.max_num_ref_frames);
        assert_eq!(r.read_bit(), 0); // gaps_in_frame_num_value_allowed
        assert_eq!(r.read_ue() as u16 + 1, info.pic_width_in_mbs);
        assert_eq!(r.read_ue() as u16 + 1, info.pic_height_in_map_units);
        assert_eq!(r.read_bit(), 1); // frame_mbs_only
        assert_eq!(r.read_bit(), 1); // direct_8x8_inference
        assert_eq!(r.read_bit(), 1); // frame_cropping_flag (1088 -> 1080)
        assert_eq!(r.read_ue(), 0);
        assert_eq!(r.read_ue() as u16, info.frame_crop_right_offset);
        assert_eq!(r.read_ue(), 0);
        assert_eq!(r.read_ue() as u16, info.frame_crop_bottom_offset);
        assert_eq!(r.read_bit(), 0); // vui_parameters_present
    }

    #[test]
    fn pps_fields_survive_a_parse_round_trip() {
        let mut info = PictureInfo::progressive(1280, 720);
        info.pic_init_qp_minus26 = -3;
        info.chroma_qp_index_offset = 2;
        info.second_chroma_qp_index_offset = 2;
        let data = synthesize(&info);
        let starts = start_code_offsets(&data);
        let mut r = BitReader::new(unescape_rbsp(&data[starts[1] + 5..]));

        assert_eq!(r.read_ue(), 0); // pic_parameter_set_id
        assert_eq!(r.read_ue(), 0); // seq_parameter_set_id
        assert_eq!(r.read_bit(), 1); // entropy_coding_mode (cabac)
        assert_eq!(r.read_bit(), 0); // pic_order_present
        assert_eq!(r.read_ue(), 0); // num_slice_groups_minus1
        assert_eq!(r.read_ue(), 0); // num_ref_idx_l0_default_active_minus1
        assert_eq!(r.read_ue(), 0); // num_ref_idx_l1_default_active_minus1
        assert_eq!(r.read_bit(), 0); // weighted_pred
        assert_eq!(r.read_bits(2), 0); // weighted_bipred_idc
        assert_eq!(r.read_se(), -3); // pic_init_qp_minus26
        assert_eq!(r.read_se(), 0); // pic_init_qs_minus26
        assert_eq!(r.read_se(), 2); // chroma_qp_index_offset
        assert_eq!(r.read_bit(), 1); // deblocking_filter_control_present
    }

    #[test]
    fn baseline_profile_sps_skips_the_chroma_block() {
        let mut info = PictureInfo::progressive(1280, 720);
        info.profile_idc = 66;
        info.entropy_coding_mode = false;
        let data = synthesize(&info);
        let starts = start_code_offsets(&data);
        let mut r = BitReader::new(unescape_rbsp(&data[5..starts[1]]));

        assert_eq!(r.read_bits(8), 66);
        r.read_bits(8);
        r.read_bits(8);
        assert_eq!(r.read_ue(), 0); // seq_parameter_set_id
        // Next field must already be log2_max_frame_num_minus4.
        assert_eq!(r.read_ue() as u8, info.log2_max_frame_num_minus4);
    }

    #[test]
    fn synthesized_pair_fits_the_scratch_contract() {
        for (width, height) in [(16, 16), (640, 480), (1280, 720), (1920, 1080), (3840, 2160)] {
            let info = PictureInfo::progressive(width, height);
            let mut scratch = [0u8; HEADER_SCRATCH_LEN];
            let len = write_sps_pps(&info, &mut scratch);
            assert!(len > 8 && len <= HEADER_SCRATCH_LEN);
        }
    }
}
