//! WAV encode/decode helpers.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::debug;

/// Decoded PCM audio, interleaved, normalized to -1.0..=1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmAudio {
    /// Average interleaved channels into one.
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }

    /// Mono 16-bit samples at `target_rate`, linearly resampled.
    pub fn to_mono_i16(&self, target_rate: u32) -> Vec<i16> {
        let mono = self.to_mono();
        if mono.is_empty() || self.sample_rate == 0 {
            return Vec::new();
        }
        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = (mono.len() as f64 / ratio).floor() as usize;
        (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = pos.floor() as usize;
                let frac = (pos - idx as f64) as f32;
                let a = mono[idx.min(mono.len() - 1)];
                let b = mono[(idx + 1).min(mono.len() - 1)];
                let s = a + (b - a) * frac;
                (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
            })
            .collect()
    }

    pub fn duration_secs(&self) -> f64 {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        if self.sample_rate == 0 {
            0.0
        } else {
            frames as f64 / self.sample_rate as f64
        }
    }
}

fn read<R: std::io::Read>(mut reader: WavReader<R>) -> anyhow::Result<PcmAudio> {
    let spec = reader.spec();
    debug!(
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        bits = spec.bits_per_sample,
        "Reading WAV"
    );

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits) => anyhow::bail!("Unsupported bit depth: {bits}"),
    };

    Ok(PcmAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Decode an in-memory WAV file.
pub fn decode_wav(bytes: &[u8]) -> anyhow::Result<PcmAudio> {
    read(WavReader::new(Cursor::new(bytes))?)
}

/// Read a WAV file from disk.
pub fn read_wav_file(path: &Path) -> anyhow::Result<PcmAudio> {
    read(WavReader::open(path)?)
}

/// Whether the payload carries a RIFF/WAVE header.
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Wrap 16-bit PCM in a WAV container.
pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32, channels: u16) -> anyhow::Result<Vec<u8>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in pcm {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_generation() {
        let pcm = vec![0i16; 16000];
        let wav = pcm_to_wav(&pcm, 16000, 1).unwrap();

        assert_eq!(wav.len(), 44 + 16000 * 2);
        assert!(is_wav(&wav));
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 16000);
    }

    #[test]
    fn test_decode_encoded_pcm() {
        let pcm: Vec<i16> = (0..800).map(|i| ((i % 40) * 500) as i16).collect();
        let wav = pcm_to_wav(&pcm, 8000, 1).unwrap();
        let audio = decode_wav(&wav).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples.len(), 800);
        assert!((audio.duration_secs() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_stereo_to_mono() {
        let audio = PcmAudio {
            samples: vec![1.0, 0.0, 0.5, 0.5],
            sample_rate: 16000,
            channels: 2,
        };
        assert_eq!(audio.to_mono(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_resample_halves_length() {
        let audio = PcmAudio {
            samples: vec![0.0; 32000],
            sample_rate: 32000,
            channels: 1,
        };
        assert_eq!(audio.to_mono_i16(16000).len(), 16000);
    }

    #[test]
    fn test_not_wav() {
        assert!(!is_wav(b"ID3\x04\x00"));
        assert!(decode_wav(b"definitely not a wav file").is_err());
    }

    #[test]
    fn test_read_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.wav");
        std::fs::write(&path, pcm_to_wav(&[100, -100, 200], 16000, 1).unwrap()).unwrap();
        let audio = read_wav_file(&path).unwrap();
        assert_eq!(audio.samples.len(), 3);
    }
}
