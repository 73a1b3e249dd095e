//! Running observation normalization

use serde::{Deserialize, Serialize};

const STD_EPS: f64 = 1e-8;

/// Running count, mean and sum of squared deviations (Welford)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunningStat {
    pub n: u64,
    pub mean: Vec<f64>,
    pub sum_square: Vec<f64>,
}

impl RunningStat {
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: vec![0.0; dim],
            sum_square: vec![0.0; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn push(&mut self, x: &[f32]) {
        debug_assert_eq!(x.len(), self.dim());
        self.n += 1;
        if self.n == 1 {
            for (m, &v) in self.mean.iter_mut().zip(x) {
                *m = v as f64;
            }
            return;
        }

        let n = self.n as f64;
        for ((m, s), &v) in self.mean.iter_mut().zip(self.sum_square.iter_mut()).zip(x) {
            let v = v as f64;
            let old_mean = *m;
            *m = old_mean + (v - old_mean) / n;
            *s += (v - old_mean) * (v - *m);
        }
    }

    /// Sample variance; before two samples are seen this is `mean²`
    pub fn variance(&self) -> Vec<f64> {
        if self.n > 1 {
            let denom = (self.n - 1) as f64;
            self.sum_square.iter().map(|s| s / denom).collect()
        } else {
            self.mean.iter().map(|m| m * m).collect()
        }
    }

    pub fn std(&self) -> Vec<f64> {
        self.variance().into_iter().map(f64::sqrt).collect()
    }
}

/// `y = clip((x − mean) / (std + ε), −clip, clip)` with running statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZFilter {
    stat: RunningStat,
    demean: bool,
    destd: bool,
    clip: Option<f32>,
}

impl ZFilter {
    pub fn new(dim: usize, clip: Option<f32>) -> Self {
        Self {
            stat: RunningStat::new(dim),
            demean: true,
            destd: true,
            clip,
        }
    }

    /// Restore from checkpointed statistics
    pub fn from_stat(stat: RunningStat, clip: Option<f32>) -> Self {
        Self {
            stat,
            demean: true,
            destd: true,
            clip,
        }
    }

    pub fn stat(&self) -> &RunningStat {
        &self.stat
    }

    /// Normalize `x`, first folding it into the statistics when `update` is set
    pub fn apply(&mut self, x: &[f32], update: bool) -> Vec<f32> {
        if update {
            self.stat.push(x);
        }

        let std = self.stat.std();
        x.iter()
            .enumerate()
            .map(|(i, &v)| {
                let mut y = v as f64;
                if self.demean {
                    y -= self.stat.mean[i];
                }
                if self.destd {
                    y /= std[i] + STD_EPS;
                }
                let y = y as f32;
                match self.clip {
                    Some(c) => y.clamp(-c, c),
                    None => y,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_stat_matches_batch_moments() {
        let samples = [[1.0_f32, -2.0], [3.0, 0.0], [5.0, 2.0], [7.0, 4.0]];
        let mut stat = RunningStat::new(2);
        for s in &samples {
            stat.push(s);
        }

        assert_eq!(stat.n, 4);
        assert!((stat.mean[0] - 4.0).abs() < 1e-12);
        assert!((stat.mean[1] - 1.0).abs() < 1e-12);
        // Sample variance of [1, 3, 5, 7] is 20 / 3
        assert!((stat.variance()[0] - 20.0 / 3.0).abs() < 1e-9);
        assert!((stat.variance()[1] - 20.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn zfilter_clips_outliers() {
        let mut filter = ZFilter::new(1, Some(5.0));
        for v in [0.0_f32, 0.1, -0.1, 0.05, -0.05] {
            filter.apply(&[v], true);
        }
        let y = filter.apply(&[1000.0], false);
        assert_eq!(y, vec![5.0]);
    }

    #[test]
    fn frozen_filter_does_not_move() {
        let mut filter = ZFilter::new(2, None);
        filter.apply(&[1.0, 2.0], true);
        filter.apply(&[3.0, 4.0], true);
        let before = filter.stat().clone();
        filter.apply(&[100.0, 100.0], false);
        assert_eq!(filter.stat(), &before);
    }
}
