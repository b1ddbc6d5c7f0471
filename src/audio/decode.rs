use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::features::SampleBuffer;

/// An opened container positioned on its first audio track.
struct OpenTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

/// Decodes an audio file to a mono buffer at its native sample rate.
pub fn decode_file(path: &Path) -> Result<SampleBuffer> {
    let mut track = open(path)?;
    let mut mono = Vec::new();
    let mut scratch: Option<AudioBuffer<f32>> = None;

    loop {
        let packet = match track.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read packet"),
        };
        if packet.track_id() != track.track_id {
            continue;
        }

        match track.decoder.decode(&packet) {
            Ok(decoded) => downmix(&decoded, &mut scratch, &mut mono),
            Err(SymphoniaError::DecodeError(err)) => {
                log::debug!("Skipping undecodable packet: {}", err);
            }
            Err(e) => return Err(e).context("Failed to decode packet"),
        }
    }

    let audio = SampleBuffer::new(mono, track.sample_rate);
    log::info!(
        "Decoded {}: {} samples @ {}Hz, {:.1}s",
        path.display(),
        audio.len(),
        audio.sample_rate,
        audio.duration()
    );
    Ok(audio)
}

fn open(path: &Path) -> Result<OpenTrack> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let format = symphonia::default::get_probe()
        .format(
            &hint,
            MediaSourceStream::new(Box::new(file), Default::default()),
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Failed to probe audio format")?
        .format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio tracks found")?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    Ok(OpenTrack {
        format,
        decoder,
        track_id,
        sample_rate,
    })
}

/// Averages every channel plane of `decoded` into `out`, reusing `scratch` between packets.
fn downmix(
    decoded: &AudioBufferRef<'_>,
    scratch: &mut Option<AudioBuffer<f32>>,
    out: &mut Vec<f32>,
) {
    let spec = *decoded.spec();
    let frames = decoded.frames();
    let reusable = scratch
        .as_ref()
        .is_some_and(|buf| *buf.spec() == spec && buf.capacity() >= frames);
    if !reusable {
        *scratch = Some(AudioBuffer::new(frames as u64, spec));
    }
    let Some(buf) = scratch.as_mut() else {
        return;
    };
    decoded.convert(buf);

    let planes = buf.planes();
    let planes = planes.planes();
    if planes.is_empty() {
        return;
    }
    let scale = 1.0 / planes.len() as f32;
    out.extend((0..buf.frames()).map(|i| {
        (planes.iter().map(|plane| plane[i]).sum::<f32>() * scale).clamp(-1.0, 1.0)
    }));
}
