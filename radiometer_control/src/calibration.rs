//! Hot/cold-load calibration of backend spectra.
//!
//! Every backend keeps the last raw spectrum seen at each chopper view.
//! With `Pc`, `Ph`, `Pt` the cold, hot and antenna powers and `Tc`, `Th` the
//! load temperatures:
//!
//! ```text
//! noise = (Th·Pc − Tc·Ph) / (Ph − Pc)
//! calib = Tc + (Th − Tc)·(Pt − Pc) / (Ph − Pc)
//! ```
//!
//! The noise temperature is refreshed whenever both loads are known. The
//! calibrated spectrum is refreshed after each load view once all three views
//! exist, and folded into a running average of at most `num_to_avg` spectra.

use radiometer_common::device::types::ChopperPos;

type Spectra = Vec<Vec<f64>>;

/// Calibration state of one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    frequencies: Spectra,
    target: Option<ChopperPos>,
    tcold: f64,
    thot: f64,
    last_cold: Option<Spectra>,
    last_hot: Option<Spectra>,
    last_target: Option<Spectra>,
    noise: Option<Spectra>,
    calib: Option<Spectra>,
    avg_calib: Option<Spectra>,
    num_measurements: usize,
    num_to_avg: usize,
    avg_count: usize,
}

impl Calibration {
    /// Empty state for a backend with the given frequency grid (one vector per board).
    pub fn new(frequencies: Vec<Vec<f64>>, num_to_avg: usize) -> Self {
        Self {
            frequencies,
            target: None,
            tcold: f64::NAN,
            thot: f64::NAN,
            last_cold: None,
            last_hot: None,
            last_target: None,
            noise: None,
            calib: None,
            avg_calib: None,
            num_measurements: 0,
            num_to_avg: num_to_avg.max(1),
            avg_count: 0,
        }
    }

    /// Fold one measurement taken at chopper view `target`.
    ///
    /// `tc`/`th` are the current load temperatures [K]. A spectrum whose
    /// board layout differs from the stored views discards them first.
    pub fn update(&mut self, target: ChopperPos, tc: f64, th: f64, data: &[Vec<f32>]) {
        let raw: Spectra = data
            .iter()
            .map(|board| board.iter().map(|&v| f64::from(v)).collect())
            .collect();
        if !self.matches_layout(&raw) {
            self.clear_views();
        }

        self.target = Some(target);
        self.num_measurements += 1;

        match target {
            ChopperPos::Cold => {
                self.tcold = tc;
                self.last_cold = Some(raw);
            }
            ChopperPos::Hot => {
                self.thot = th;
                self.last_hot = Some(raw);
            }
            ChopperPos::Antenna => self.last_target = Some(raw),
            ChopperPos::Reference => {}
        }

        let (Some(cold), Some(hot)) = (&self.last_cold, &self.last_hot) else {
            return;
        };
        let (tcold, thot) = (self.tcold, self.thot);
        self.noise = Some(combine(cold, hot, |c, h| (thot * c - tcold * h) / (h - c)));

        let Some(tgt) = &self.last_target else {
            return;
        };
        if !target.is_load() {
            return;
        }
        let calib: Spectra = cold
            .iter()
            .zip(hot)
            .zip(tgt)
            .map(|((c, h), t)| {
                c.iter()
                    .zip(h)
                    .zip(t)
                    .map(|((&c, &h), &t)| tcold + (thot - tcold) * (t - c) / (h - c))
                    .collect()
            })
            .collect();

        self.avg_calib = Some(match self.avg_calib.take() {
            Some(avg) if self.avg_count > 0 => {
                let n = self.avg_count as f64;
                let (oldw, neww) = (n / (n + 1.0), 1.0 / (n + 1.0));
                combine(&avg, &calib, |a, c| oldw * a + neww * c)
            }
            _ => calib.clone(),
        });
        if self.avg_count != self.num_to_avg {
            self.avg_count += 1;
        }
        self.calib = Some(calib);
    }

    fn matches_layout(&self, raw: &Spectra) -> bool {
        let shape = |s: &Spectra| s.iter().map(Vec::len).collect::<Vec<_>>();
        let want = shape(raw);
        [&self.last_cold, &self.last_hot, &self.last_target]
            .into_iter()
            .flatten()
            .all(|view| shape(view) == want)
    }

    fn clear_views(&mut self) {
        self.last_cold = None;
        self.last_hot = None;
        self.last_target = None;
        self.noise = None;
        self.calib = None;
        self.avg_calib = None;
        self.avg_count = 0;
    }

    /// Restart the running average.
    pub fn reset_average(&mut self) {
        self.avg_count = 0;
    }

    /// Change the maximum averaging count (at least 1).
    pub fn set_average_max_count(&mut self, num: usize) {
        self.num_to_avg = num.max(1);
        self.avg_count = self.avg_count.min(self.num_to_avg);
    }

    /// Channel-centre frequencies per board [MHz].
    pub fn frequencies(&self) -> &[Vec<f64>] {
        &self.frequencies
    }

    /// View of the last update.
    pub fn target(&self) -> Option<ChopperPos> {
        self.target
    }

    /// Last cold-load spectrum.
    pub fn last_cold(&self) -> Option<&[Vec<f64>]> {
        self.last_cold.as_deref()
    }

    /// Last hot-load spectrum.
    pub fn last_hot(&self) -> Option<&[Vec<f64>]> {
        self.last_hot.as_deref()
    }

    /// Last antenna spectrum.
    pub fn last_target(&self) -> Option<&[Vec<f64>]> {
        self.last_target.as_deref()
    }

    /// Noise temperature spectrum [K].
    pub fn noise(&self) -> Option<&[Vec<f64>]> {
        self.noise.as_deref()
    }

    /// Last calibrated spectrum [K].
    pub fn calibrated(&self) -> Option<&[Vec<f64>]> {
        self.calib.as_deref()
    }

    /// Running average of calibrated spectra [K].
    pub fn average(&self) -> Option<&[Vec<f64>]> {
        self.avg_calib.as_deref()
    }

    /// Spectra currently in the average.
    pub fn average_count(&self) -> usize {
        self.avg_count
    }

    /// Raw measurements seen.
    pub fn measurements(&self) -> usize {
        self.num_measurements
    }
}

fn combine(a: &Spectra, b: &Spectra, f: impl Fn(f64, f64) -> f64) -> Spectra {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.iter().zip(y).map(|(&x, &y)| f(x, y)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectra(v: f32) -> Vec<Vec<f32>> {
        vec![vec![v; 4], vec![v; 2]]
    }

    fn cal() -> Calibration {
        Calibration::new(vec![vec![0.0; 4], vec![0.0; 2]], 3)
    }

    #[test]
    fn noise_needs_both_loads() {
        let mut c = cal();
        c.update(ChopperPos::Cold, 20.0, 300.0, &spectra(1.0));
        assert!(c.noise().is_none());
        c.update(ChopperPos::Hot, 20.0, 300.0, &spectra(2.0));
        // (300·1 − 20·2) / (2 − 1)
        let noise = c.noise().unwrap();
        assert_eq!(noise[0][0], 260.0);
        assert_eq!(noise[1].len(), 2);
        assert!(c.calibrated().is_none());
    }

    #[test]
    fn calibration_after_load_view() {
        let mut c = cal();
        c.update(ChopperPos::Cold, 20.0, 300.0, &spectra(1.0));
        c.update(ChopperPos::Antenna, 0.0, 0.0, &spectra(1.5));
        c.update(ChopperPos::Hot, 20.0, 300.0, &spectra(2.0));
        // 20 + 280·0.5/1
        assert_eq!(c.calibrated().unwrap()[0][3], 160.0);
        assert_eq!(c.average().unwrap()[1][0], 160.0);
        assert_eq!(c.average_count(), 1);

        // antenna view alone never recalibrates
        c.update(ChopperPos::Antenna, 0.0, 0.0, &spectra(1.75));
        assert_eq!(c.average_count(), 1);
        assert_eq!(c.target(), Some(ChopperPos::Antenna));
    }

    #[test]
    fn running_average_weights_and_cap() {
        let mut c = cal();
        c.update(ChopperPos::Cold, 0.0, 100.0, &spectra(0.0));
        c.update(ChopperPos::Hot, 0.0, 100.0, &spectra(1.0));
        c.update(ChopperPos::Antenna, 0.0, 0.0, &spectra(0.5));
        c.update(ChopperPos::Cold, 0.0, 100.0, &spectra(0.0));
        assert_eq!(c.average().unwrap()[0][0], 50.0);

        c.update(ChopperPos::Antenna, 0.0, 0.0, &spectra(1.0));
        c.update(ChopperPos::Hot, 0.0, 100.0, &spectra(1.0));
        // (1·50 + 100) / 2
        assert_eq!(c.average().unwrap()[0][0], 75.0);
        assert_eq!(c.average_count(), 2);

        for _ in 0..5 {
            c.update(ChopperPos::Hot, 0.0, 100.0, &spectra(1.0));
        }
        assert_eq!(c.average_count(), 3);
        assert_eq!(c.measurements(), 11);
    }

    #[test]
    fn reset_average_restarts_from_next_spectrum() {
        let mut c = cal();
        c.update(ChopperPos::Cold, 0.0, 100.0, &spectra(0.0));
        c.update(ChopperPos::Antenna, 0.0, 0.0, &spectra(0.5));
        c.update(ChopperPos::Hot, 0.0, 100.0, &spectra(1.0));
        c.reset_average();
        c.update(ChopperPos::Antenna, 0.0, 0.0, &spectra(0.25));
        c.update(ChopperPos::Hot, 0.0, 100.0, &spectra(1.0));
        assert_eq!(c.average().unwrap()[0][0], 25.0);
    }

    #[test]
    fn equal_loads_give_non_finite_not_panic() {
        let mut c = cal();
        c.update(ChopperPos::Cold, 20.0, 300.0, &spectra(1.0));
        c.update(ChopperPos::Hot, 20.0, 300.0, &spectra(1.0));
        assert!(!c.noise().unwrap()[0][0].is_finite());
    }

    #[test]
    fn layout_change_discards_views() {
        let mut c = cal();
        c.update(ChopperPos::Cold, 20.0, 300.0, &spectra(1.0));
        c.update(ChopperPos::Hot, 20.0, 300.0, &[vec![2.0; 3]]);
        assert!(c.last_cold().is_none());
        assert!(c.last_hot().is_some());
        assert!(c.noise().is_none());
    }

    #[test]
    fn average_max_count_is_at_least_one() {
        let mut c = cal();
        c.set_average_max_count(0);
        c.update(ChopperPos::Cold, 0.0, 100.0, &spectra(0.0));
        c.update(ChopperPos::Antenna, 0.0, 0.0, &spectra(0.5));
        c.update(ChopperPos::Hot, 0.0, 100.0, &spectra(1.0));
        c.update(ChopperPos::Hot, 0.0, 100.0, &spectra(1.0));
        assert_eq!(c.average_count(), 1);
        assert_eq!(c.frequencies().len(), 2);
    }
}
