// Spectral level analyser
//
// The render side keeps the most recent `fft_size` samples in a ring shared
// with the control thread. The control side computes byte frequency data the
// way a Web Audio AnalyserNode does: Blackman window, |X|/N magnitudes with
// time smoothing, dB mapped from [-100, -30] onto [0, 255].

use std::f32::consts::PI;
use std::sync::{Arc, Mutex, PoisonError};

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::backend::RenderNode;

pub const DEFAULT_FFT_SIZE: usize = 2048;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
const SMOOTHING_TIME_CONSTANT: f32 = 0.8;

struct TimeDomainRing {
    samples: Vec<f32>,
    write_pos: usize,
}

impl TimeDomainRing {
    fn push(&mut self, input: &[f32]) {
        let len = self.samples.len();
        for &sample in input {
            self.samples[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % len;
        }
    }

    /// Oldest sample first
    fn copy_ordered(&self, out: &mut [Complex<f32>]) {
        let len = self.samples.len();
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = Complex::new(self.samples[(self.write_pos + i) % len], 0.0);
        }
    }
}

/// Render-side half; connect it to the source
pub struct AnalyserNode {
    ring: Arc<Mutex<TimeDomainRing>>,
}

impl RenderNode for AnalyserNode {
    fn process(&mut self, inputs: &[&[f32]]) {
        if let Some(channel) = inputs.first() {
            self.ring
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(channel);
        }
    }
}

/// Control-side half; reads the spectrum
pub struct Analyser {
    ring: Arc<Mutex<TimeDomainRing>>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl Analyser {
    /// Create both halves. `fft_size` is rounded up to a power of two (min 32).
    pub fn new(fft_size: usize) -> (AnalyserNode, Analyser) {
        let fft_size = fft_size.max(32).next_power_of_two();
        let ring = Arc::new(Mutex::new(TimeDomainRing {
            samples: vec![0.0; fft_size],
            write_pos: 0,
        }));

        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let window = blackman_window(fft_size);

        (
            AnalyserNode { ring: ring.clone() },
            Analyser {
                ring,
                fft,
                window,
                scratch: vec![Complex::new(0.0, 0.0); fft_size],
                smoothed: vec![0.0; fft_size / 2],
            },
        )
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// Current spectrum, one byte per frequency bin
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let n = self.fft_size();
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .copy_ordered(&mut self.scratch);

        for (sample, w) in self.scratch.iter_mut().zip(&self.window) {
            sample.re *= w;
        }
        self.fft.process(&mut self.scratch);

        let range = MAX_DECIBELS - MIN_DECIBELS;
        self.smoothed
            .iter_mut()
            .zip(&self.scratch)
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() / n as f32;
                *smoothed = SMOOTHING_TIME_CONSTANT * *smoothed
                    + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
                if *smoothed <= 0.0 {
                    return 0;
                }
                let db = 20.0 * smoothed.log10();
                (255.0 / range * (db - MIN_DECIBELS)).clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Mean of [`Analyser::byte_frequency_data`]
    pub fn average_level(&mut self) -> f32 {
        let data = self.byte_frequency_data();
        if data.is_empty() {
            return 0.0;
        }
        data.iter().map(|&b| b as f32).sum::<f32>() / data.len() as f32
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    let (a0, a1, a2) = (0.42f32, 0.5f32, 0.08f32);
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
