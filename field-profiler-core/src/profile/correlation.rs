use serde::{Deserialize, Serialize};

use super::metric::Metric;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub fields: Vec<String>,
    /// Row-major, `fields.len()` squared. Undefined where fewer than two
    /// records carry both values or either side has zero spread.
    pub coefficients: Vec<Vec<Metric<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<Metric<f64>> {
        let i = self.fields.iter().position(|f| f == a)?;
        let j = self.fields.iter().position(|f| f == b)?;
        Some(self.coefficients[i][j])
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CoMoments {
    n: u64,
    mean_x: f64,
    mean_y: f64,
    m2_x: f64,
    m2_y: f64,
    c_xy: f64,
}

impl CoMoments {
    fn add(&mut self, x: f64, y: f64) {
        self.n += 1;
        let n = self.n as f64;
        let dx = x - self.mean_x;
        let dy = y - self.mean_y;
        self.mean_x += dx / n;
        self.mean_y += dy / n;
        self.m2_x += dx * (x - self.mean_x);
        self.m2_y += dy * (y - self.mean_y);
        self.c_xy += dx * (y - self.mean_y);
    }

    fn pearson(&self) -> Metric<f64> {
        if self.n < 2 || self.m2_x <= 0.0 || self.m2_y <= 0.0 {
            return Metric::Undefined;
        }
        Metric::Value((self.c_xy / (self.m2_x * self.m2_y).sqrt()).clamp(-1.0, 1.0))
    }
}

/// Pairwise-complete Pearson correlation over the numeric fields, updated
/// once per record from that record's valid values.
#[derive(Debug, Clone)]
pub struct CorrelationAccumulator {
    fields: Vec<String>,
    /// Upper triangle including the diagonal, row-major.
    pairs: Vec<CoMoments>,
}

impl CorrelationAccumulator {
    pub fn new(fields: Vec<String>) -> Self {
        let k = fields.len();
        Self {
            fields,
            pairs: vec![CoMoments::default(); k * (k + 1) / 2],
        }
    }

    fn index(&self, i: usize, j: usize) -> usize {
        let k = self.fields.len();
        i * k - i * (i + 1) / 2 + j
    }

    /// `values[i]` is the i-th numeric field's value in this record, if valid.
    pub fn add_row(&mut self, values: &[Option<f64>]) {
        let k = self.fields.len();
        for i in 0..k {
            let Some(x) = values.get(i).copied().flatten() else { continue };
            for j in i..k {
                if let Some(y) = values.get(j).copied().flatten() {
                    let idx = self.index(i, j);
                    self.pairs[idx].add(x, y);
                }
            }
        }
    }

    pub fn finalize(&self) -> CorrelationMatrix {
        let k = self.fields.len();
        let mut coefficients = vec![vec![Metric::Undefined; k]; k];
        for i in 0..k {
            for j in i..k {
                let r = self.pairs[self.index(i, j)].pearson();
                coefficients[i][j] = r;
                coefficients[j][i] = r;
            }
        }
        CorrelationMatrix {
            fields: self.fields.clone(),
            coefficients,
        }
    }
}
