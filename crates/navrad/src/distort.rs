/**
* Receiver audio conditioning: everything between the clean synthesized
* tones and the speaker. Input buffers are appended to an internal queue and
* processed in fixed chunks (1/32 s at 48 kHz, 1/30 s at 44.1 kHz, so the
* chunk always divides the rate evenly):
*
* 1. A dynamics compressor rides the level: a fast peak detector with a slow
*    decay feeds an energy envelope (fast attack, slow release, floored at
*    0.2) that divides the signal.
* 2. A chunked FFT EQ band-passes the audio through a radio-speaker shaped
*    curve, mixing in uniform noise whose level is re-randomized every other
*    chunk (0.5x-1.5x of requested) so the overlapped halves don't develop
*    phase artifacts. Consecutive chunks overlap by 600 samples and are
*    linearly crossfaded.
* 3. The output queue pads the leading portion with silence whenever the
*    pipeline hasn't accumulated enough processed data for the read.
*/
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::filters::{curve, filter_in, wavg};

const TIME_QUANTUM_48K: u32 = 32;
const TIME_QUANTUM_44K: u32 = 30;

const EDGE_BLEND: usize = 600; /* samples */

/// Compressor target level; weaker signals get amplified, stronger ones
/// suppressed.
const COMPR_TGT: f64 = 0.7;
/// Energy floor, bounding how far the compressor will amplify quiet input.
const COMPR_MIN_ENERGY: f64 = 0.2;

/// How quickly the noise level randomizer moves, as a fraction of a chunk.
const NOISE_RAND_RATE: f64 = 2.0;

const LOW_AMPLIFY: f64 = 1.4;
const CENTER_AMPLIFY: f64 = 1.6;

pub struct Distort {
    srate: u32,
    chunksz: usize,
    compr_energy: f64,
    rms: f64,
    noise_level: f64,
    noise_level_cur: f64,
    amplify: f64,
    chunk_a_b: bool,

    inbuf: Vec<i16>,
    outbuf: Vec<i16>,
    outbuf_fill: usize,
    outbuf_fill_act: usize,
    tmpbuf: Vec<i16>,

    fft_buf: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    fft: Arc<dyn Fft<f64>>,
    fft_inv: Arc<dyn Fft<f64>>,
    eq_gain: Vec<f64>,

    rng: SmallRng,
}

impl std::fmt::Debug for Distort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distort")
            .field("srate", &self.srate)
            .field("chunksz", &self.chunksz)
            .finish()
    }
}

/// Supported sample rates and their chunk divisors.
pub fn time_quantum(srate: u32) -> Option<u32> {
    match srate {
        48_000 => Some(TIME_QUANTUM_48K),
        44_100 => Some(TIME_QUANTUM_44K),
        _ => None,
    }
}

/// The band-filter correction curve, evaluated per FFT bin. Zero below
/// 240 Hz, ramping to 1.4x at 300 Hz, peaking at 1.6x around 1700 Hz, unity
/// by 3000 Hz and cut off above 3500 Hz; mirrored above Nyquist for the
/// conjugate half of the spectrum.
fn eq_gain_table(srate: u32, chunksz: usize) -> Vec<f64> {
    let sr = srate as f64;
    let pts = [
        (0.0, 0.0),
        (240.0, 0.0),
        (300.0, LOW_AMPLIFY),
        (1700.0, CENTER_AMPLIFY),
        (3000.0, 1.0),
        (3500.0, 0.0),
        (sr - 3500.0, 0.0),
        (sr - 3000.0, 1.0),
        (sr - 1700.0, CENTER_AMPLIFY),
        (sr - 300.0, LOW_AMPLIFY),
        (sr - 240.0, 0.0),
        (sr, 0.0),
    ];
    (0..chunksz)
        .map(|i| curve(i as f64 / chunksz as f64 * sr, &pts).max(0.0))
        .collect()
}

impl Distort {
    /// `srate` must be 44100 or 48000.
    pub fn new(srate: u32) -> Distort {
        let tq = time_quantum(srate).expect("unsupported sample rate");
        let chunksz = (srate / tq) as usize;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(chunksz);
        let fft_inv = planner.plan_fft_inverse(chunksz);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(fft_inv.get_inplace_scratch_len());
        Distort {
            srate,
            chunksz,
            compr_energy: 1.0,
            rms: 0.0,
            noise_level: 0.0,
            noise_level_cur: 0.0,
            amplify: 1.0,
            chunk_a_b: false,
            inbuf: Vec::new(),
            outbuf: Vec::new(),
            outbuf_fill: 0,
            outbuf_fill_act: 0,
            tmpbuf: vec![0; chunksz],
            fft_buf: vec![Complex::default(); chunksz],
            scratch: vec![Complex::default(); scratch_len],
            eq_gain: eq_gain_table(srate, chunksz),
            fft,
            fft_inv,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn srate(&self) -> u32 {
        self.srate
    }

    /// Runs `samples` through the pipeline in place. `amplify` scales the
    /// signal, `noise_level` the additive noise, both linear factors.
    pub fn process(&mut self, samples: &mut [i16], amplify: f64, noise_level: f64) {
        self.amplify = amplify;
        self.noise_level = noise_level;

        // Append to the input queue, compressing the new data on the way in.
        let start = self.inbuf.len();
        self.inbuf.extend_from_slice(samples);
        self.compressor_run(start);

        self.process_chunks();

        // Populate the output. If the pipeline hasn't produced enough yet
        // (it retains one blend overlap plus any unconsumed input), pad the
        // leading portion with silence.
        let n = samples.len();
        let pending = self.chunksz as i64 - self.inbuf.len() as i64;
        let avail = (self.outbuf_fill as i64 - pending.max(0))
            .clamp(0, self.outbuf_fill as i64) as usize;

        let silence = n.saturating_sub(avail);
        samples[..silence].fill(0);
        let to_copy = (n - silence).min(avail);
        samples[silence..silence + to_copy].copy_from_slice(&self.outbuf[..to_copy]);

        if to_copy > 0 {
            self.outbuf.copy_within(to_copy..self.outbuf_fill_act, 0);
            self.outbuf_fill -= to_copy;
            self.outbuf_fill_act -= to_copy;
            self.outbuf.truncate(self.outbuf_fill_act);
        }
    }

    /// Resets fill pointers and level detectors. Call between unrelated
    /// transmissions so one station's tail doesn't color the next.
    pub fn clear_buffers(&mut self) {
        self.inbuf.clear();
        self.outbuf.clear();
        self.outbuf_fill = 0;
        self.outbuf_fill_act = 0;
        self.compr_energy = 1.0;
        self.rms = 0.0;
    }

    fn compressor_run(&mut self, start: usize) {
        for i in start..self.inbuf.len() {
            let e = (self.inbuf[i] as f64).abs() / (i16::MAX as f64 * COMPR_TGT);

            // Fast peak detector with a slow decay.
            if e > self.rms {
                self.rms = e;
            }
            filter_in(&mut self.rms, 0.0, 1.0, 2000.0);

            // Delayed energy envelope: 20-sample attack, 2000-sample release.
            if self.rms >= self.compr_energy {
                filter_in(&mut self.compr_energy, self.rms, 1.0, 20.0);
            } else {
                filter_in(&mut self.compr_energy, self.rms, 1.0, 2000.0);
            }
            if self.compr_energy < COMPR_MIN_ENERGY {
                self.compr_energy = COMPR_MIN_ENERGY;
            }

            self.inbuf[i] = ((self.inbuf[i] as f64 / self.compr_energy)
                .clamp(i16::MIN as f64, i16::MAX as f64)) as i16;
        }
    }

    fn process_chunks(&mut self) {
        let chunksz = self.chunksz;
        let mut consumed = 0;

        while consumed + chunksz <= self.inbuf.len() {
            // The randomizer only steps on every other chunk so the level
            // doesn't differ between the two EQ passes over one overlap.
            if !self.chunk_a_b {
                self.noise_randomize(chunksz);
            }

            self.eq_chunk(consumed);

            // Crossfade the head of this chunk over the tail of the
            // previous one.
            if self.outbuf_fill_act != 0 {
                for i in 0..EDGE_BLEND {
                    let oldval = self.outbuf[self.outbuf_fill + i] as f64;
                    let newval = self.tmpbuf[i] as f64;
                    self.tmpbuf[i] =
                        wavg(oldval, newval, i as f64 / EDGE_BLEND as f64) as i16;
                }
            }

            if self.outbuf.len() < self.outbuf_fill + chunksz {
                self.outbuf.resize(self.outbuf_fill + chunksz, 0);
            }
            self.outbuf[self.outbuf_fill..self.outbuf_fill + chunksz]
                .copy_from_slice(&self.tmpbuf);
            self.outbuf_fill += chunksz - EDGE_BLEND;
            self.outbuf_fill_act = self.outbuf_fill + EDGE_BLEND;

            self.chunk_a_b = !self.chunk_a_b;
            consumed += chunksz - EDGE_BLEND;
        }

        if consumed > 0 {
            self.inbuf.drain(..consumed);
        }
    }

    fn noise_randomize(&mut self, num_samples: usize) {
        // Oscillates between 0.5x and 1.5x of the requested level.
        let tgt = self.noise_level * (1.0 + (self.rng.gen::<f64>() - 0.5));
        filter_in(
            &mut self.noise_level_cur,
            tgt,
            num_samples as f64,
            num_samples as f64 * NOISE_RAND_RATE,
        );
    }

    fn eq_chunk(&mut self, offset: usize) {
        let n = self.chunksz;
        for i in 0..n {
            let rand_sample = self.rng.gen::<i16>() as f64;
            self.fft_buf[i] = Complex::new(
                self.amplify * self.inbuf[offset + i] as f64
                    + rand_sample * self.noise_level_cur,
                0.0,
            );
        }
        self.fft
            .process_with_scratch(&mut self.fft_buf, &mut self.scratch);
        for i in 0..n {
            self.fft_buf[i] *= self.eq_gain[i];
        }
        self.fft_inv
            .process_with_scratch(&mut self.fft_buf, &mut self.scratch);
        // The inverse transform is unnormalized; scale by 1/N and clamp so
        // spectral peaks can't wrap the 16-bit output.
        let scale = 1.0 / n as f64;
        for i in 0..n {
            self.tmpbuf[i] = (self.fft_buf[i].re * scale)
                .clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_rates_divide_evenly() {
        for srate in [44_100u32, 48_000u32] {
            let tq = time_quantum(srate).unwrap();
            assert_eq!(srate % tq, 0);
        }
        assert!(time_quantum(22_050).is_none());
    }

    #[test]
    fn output_length_matches_input() {
        let mut dis = Distort::new(48_000);
        for _ in 0..8 {
            let mut buf = vec![0i16; 4800];
            for (i, s) in buf.iter_mut().enumerate() {
                *s = ((i % 48) as i16 - 24) * 800;
            }
            let before = buf.len();
            dis.process(&mut buf, 1.0, 0.01);
            assert_eq!(buf.len(), before);
        }
    }

    #[test]
    fn first_read_is_padded_with_silence() {
        let mut dis = Distort::new(48_000);
        let mut buf = vec![1000i16; 1200];
        dis.process(&mut buf, 1.0, 0.0);
        // Less than one chunk in: nothing can have been processed yet.
        assert!(buf.iter().all(|&s| s == 0));
    }

    #[test]
    fn signal_flows_through_passband() {
        let mut dis = Distort::new(48_000);
        let mut energy = 0i64;
        for _ in 0..10 {
            // 1 kHz tone, squarely inside the passband.
            let mut buf: Vec<i16> = (0..4800)
                .map(|i| {
                    (libm::sin(i as f64 / 48.0 * 2.0 * std::f64::consts::PI)
                        * 8000.0) as i16
                })
                .collect();
            dis.process(&mut buf, 1.0, 0.0);
            energy += buf.iter().map(|&s| (s as i64).abs()).sum::<i64>();
        }
        assert!(energy > 0);
    }

    #[test]
    fn dc_is_rejected() {
        let mut dis = Distort::new(48_000);
        let mut tail = 0i64;
        for round in 0..10 {
            let mut buf = vec![12000i16; 4800];
            dis.process(&mut buf, 1.0, 0.0);
            if round >= 5 {
                tail += buf.iter().map(|&s| (s as i64).abs()).sum::<i64>();
            }
        }
        // A constant input sits entirely below the 240 Hz cutoff; the
        // settled output must be near-silent relative to full scale.
        assert!(tail / (5 * 4800) < 500);
    }

    #[test]
    fn clear_buffers_resets_state() {
        let mut dis = Distort::new(48_000);
        let mut buf = vec![500i16; 4800];
        dis.process(&mut buf, 1.0, 0.5);
        dis.clear_buffers();
        assert_eq!(dis.inbuf.len(), 0);
        assert_eq!(dis.outbuf_fill, 0);
        assert_eq!(dis.compr_energy, 1.0);
        assert_eq!(dis.rms, 0.0);
    }

    #[test]
    fn compressor_limits_boost() {
        let mut dis = Distort::new(48_000);
        // Very quiet input: the energy floor caps amplification at 1/0.2.
        let start = dis.inbuf.len();
        dis.inbuf.extend_from_slice(&vec![100i16; 2000]);
        dis.compressor_run(start);
        assert!(dis.inbuf.iter().all(|&s| s <= 500));
    }
}
