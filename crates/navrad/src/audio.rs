/**
* Tone synthesis primitives for the station-identifier audio path.
*
* VORs, localizers and NDBs key a (nominally) 1 kHz sine; DMEs key a square
* wave at 1350 Hz nominal. Neither divides every supported sample rate, so
* the tables are generated per rate with an integer number of samples per
* period and the buffer lengths are chosen as whole periods:
*
* - 48 kHz: 48-sample sine (1000 Hz), 36-sample square (1333 Hz), buffers
*   of 4800 and 4788 samples.
* - 44.1 kHz: 44-sample sine (1002 Hz), 33-sample square (1336 Hz), buffers
*   of 4400 and 4389 samples.
*
* Close enough to the nominal tones to be aurally indistinguishable, and the
* integer periods keep the loop-free mixing free of phase jumps.
*/
use libm::{round, sin};

/// Periods per identifier buffer: 100 one-kHz periods ~ 100 ms of audio.
const VOR_BUF_PERIODS: usize = 100;
const DME_BUF_PERIODS: usize = 133;

#[derive(Debug)]
pub struct ToneSet {
    pub srate: u32,
    /// One period of the identifier sine.
    pub vor: Vec<i16>,
    /// One period of the DME square wave.
    pub dme: Vec<i16>,
}

impl ToneSet {
    pub fn new(srate: u32) -> ToneSet {
        let vor_period = (srate / 1000) as usize;
        let dme_period = (round(srate as f64 / 1333.0)) as usize;

        let vor = (0..vor_period)
            .map(|i| {
                let ph = i as f64 / vor_period as f64 * 2.0 * std::f64::consts::PI;
                (sin(ph) * i16::MAX as f64) as i16
            })
            .collect();
        let dme = (0..dme_period)
            .map(|i| {
                if i < dme_period / 2 {
                    i16::MAX
                } else {
                    -i16::MAX
                }
            })
            .collect();
        ToneSet { srate, vor, dme }
    }

    pub fn vor_buf_samples(&self) -> usize {
        self.vor.len() * VOR_BUF_PERIODS
    }

    pub fn dme_buf_samples(&self) -> usize {
        self.dme.len() * DME_BUF_PERIODS
    }
}

/// Adds an amplitude-keyed tone: the signal level maps to loudness through a
/// cubic, which makes weak co-channel stations fade under the dominant one
/// much faster than their raw level difference suggests.
pub fn am_mix(buf: &mut [i16], tone: &[i16], level: f64) {
    let gain = level * level * level;
    mix(buf, tone, gain);
}

/// Adds the BFO heterodyne: a constant carrier whose level rides the sixth
/// power, yielding a faint steady tone that swells to full during keying.
pub fn bfo_mix(buf: &mut [i16], tone: &[i16], level: f64) {
    let gain = level.powi(6);
    mix(buf, tone, gain);
}

fn mix(buf: &mut [i16], tone: &[i16], gain: f64) {
    if tone.is_empty() || gain <= 0.0 {
        return;
    }
    for (i, s) in buf.iter_mut().enumerate() {
        let add = tone[i % tone.len()] as f64 * gain;
        *s = (*s as f64 + add).clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods_divide_buffers() {
        for srate in [48_000u32, 44_100u32] {
            let t = ToneSet::new(srate);
            assert_eq!(t.vor_buf_samples() % t.vor.len(), 0);
            assert_eq!(t.dme_buf_samples() % t.dme.len(), 0);
        }
        // The canonical 48 kHz sizes.
        let t = ToneSet::new(48_000);
        assert_eq!(t.vor.len(), 48);
        assert_eq!(t.dme.len(), 36);
        assert_eq!(t.vor_buf_samples(), 4800);
        assert_eq!(t.dme_buf_samples(), 4788);
    }

    #[test]
    fn sine_is_balanced() {
        let t = ToneSet::new(48_000);
        let sum: i64 = t.vor.iter().map(|&s| s as i64).sum();
        assert!(sum.abs() < 100);
        assert_eq!(t.vor[0], 0);
    }

    #[test]
    fn square_is_symmetric() {
        let t = ToneSet::new(48_000);
        assert!(t.dme[..18].iter().all(|&s| s == i16::MAX));
        assert!(t.dme[18..].iter().all(|&s| s == -i16::MAX));
    }

    #[test]
    fn am_mix_scales_cubically() {
        let tone = vec![10_000i16; 4];
        let mut full = vec![0i16; 4];
        am_mix(&mut full, &tone, 1.0);
        assert_eq!(full[0], 10_000);

        let mut half = vec![0i16; 4];
        am_mix(&mut half, &tone, 0.5);
        assert_eq!(half[0], 1250);
    }

    #[test]
    fn mix_saturates() {
        let tone = vec![i16::MAX; 4];
        let mut buf = vec![i16::MAX - 10; 4];
        am_mix(&mut buf, &tone, 1.0);
        assert!(buf.iter().all(|&s| s == i16::MAX));
    }
}
