use std::fs;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use h264_session::{HEADER_SCRATCH_LEN, PictureInfo, write_sps_pps};

/// Prefix a headerless H.264 elementary stream with synthesized SPS/PPS
/// so stock Annex-B decoders accept it.
#[derive(Debug, Parser)]
#[command(name = "annexb-stitch")]
struct Args {
    /// Headerless elementary-stream payload (slice NAL units only).
    input: PathBuf,
    /// Stitched Annex-B output file.
    output: PathBuf,
    /// Coded picture width in pixels.
    #[arg(long)]
    width: u32,
    /// Coded picture height in pixels.
    #[arg(long)]
    height: u32,
    /// profile_idc for the synthesized SPS.
    #[arg(long, default_value_t = 100)]
    profile: u8,
    /// level_idc for the synthesized SPS.
    #[arg(long, default_value_t = 40)]
    level: u8,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        args.width > 0 && args.height > 0,
        "width and height must be non-zero"
    );

    let payload = fs::read(&args.input)
        .with_context(|| format!("reading payload {}", args.input.display()))?;

    let mut info = PictureInfo::progressive(args.width, args.height);
    info.profile_idc = args.profile;
    info.level_idc = args.level;

    let mut scratch = [0u8; HEADER_SCRATCH_LEN];
    let header_len = write_sps_pps(&info, &mut scratch);

    let mut stitched = Vec::with_capacity(header_len + payload.len());
    stitched.extend_from_slice(&scratch[..header_len]);
    stitched.extend_from_slice(&payload);

    fs::write(&args.output, &stitched)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!(
        "{} -> {} ({} header bytes + {} payload bytes)",
        args.input.display(),
        args.output.display(),
        header_len,
        payload.len()
    );
    Ok(())
}
