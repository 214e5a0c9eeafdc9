//! Amplitude tap: frequency and level data for visualizers.
//!
//! Mirrors an analyser node with a 256-point transform: 128 frequency bins,
//! each scaled to 0..=255 over a -100..-30 dB range, plus an RMS level.

use std::f32::consts::PI;
use std::sync::Mutex;

pub const FFT_SIZE: usize = 256;
pub const BIN_COUNT: usize = FFT_SIZE / 2;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapFrame {
    pub bins: [u8; BIN_COUNT],
    /// RMS of the last window, 0.0..=1.0.
    pub level: f32,
}

impl Default for TapFrame {
    fn default() -> Self {
        Self {
            bins: [0; BIN_COUNT],
            level: 0.0,
        }
    }
}

/// Created fresh for each playback and fed by the audio backend.
#[derive(Debug, Default)]
pub struct AmplitudeTap {
    frame: Mutex<TapFrame>,
}

impl AmplitudeTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyse the most recent `FFT_SIZE` mono samples.
    pub fn feed(&self, samples: &[f32]) {
        let start = samples.len().saturating_sub(FFT_SIZE);
        let frame = analyse(&samples[start..]);
        if let Ok(mut guard) = self.frame.lock() {
            *guard = frame;
        }
    }

    /// Zero the tap (end of playback).
    pub fn clear(&self) {
        if let Ok(mut guard) = self.frame.lock() {
            *guard = TapFrame::default();
        }
    }

    pub fn frame(&self) -> TapFrame {
        self.frame.lock().map(|g| *g).unwrap_or_default()
    }

    pub fn frequency_data(&self) -> [u8; BIN_COUNT] {
        self.frame().bins
    }

    pub fn level(&self) -> f32 {
        self.frame().level
    }
}

fn analyse(window: &[f32]) -> TapFrame {
    if window.is_empty() {
        return TapFrame::default();
    }

    let level = (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt();

    // Blackman window, zero-padded to FFT_SIZE.
    let mut buf = [0f32; FFT_SIZE];
    for (i, s) in window.iter().enumerate() {
        let x = i as f32 / (FFT_SIZE - 1) as f32;
        let w = 0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos();
        buf[i] = s * w;
    }

    let mut bins = [0u8; BIN_COUNT];
    for (k, bin) in bins.iter_mut().enumerate() {
        let (mut re, mut im) = (0f32, 0f32);
        for (n, x) in buf.iter().enumerate() {
            let angle = 2.0 * PI * ((k * n) % FFT_SIZE) as f32 / FFT_SIZE as f32;
            re += x * angle.cos();
            im -= x * angle.sin();
        }
        let magnitude = (re * re + im * im).sqrt() / FFT_SIZE as f32;
        let db = if magnitude > 0.0 {
            20.0 * magnitude.log10()
        } else {
            MIN_DECIBELS
        };
        let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
        *bin = scaled.clamp(0.0, 255.0) as u8;
    }

    TapFrame {
        bins,
        level: level.min(1.0),
    }
}
