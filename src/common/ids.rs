//! Deterministic fingerprints for prepared matrices.
//!
//! The trainer stores the fingerprint of its held-out split in the artifact
//! metadata; the evaluator recomputes it to detect that a split drifted
//! (different data files, sample size or seed) before comparing metrics.

/// 64-bit FNV-1a hash over the IEEE-754 bits of a matrix and its target.
#[derive(Copy, Clone, Debug)]
pub struct Fingerprint(u64);

impl Fingerprint {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    pub fn new() -> Self {
        Self(Self::OFFSET)
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 = (self.0 ^ u64::from(*b)).wrapping_mul(Self::PRIME);
        }
    }

    pub fn update_f64(&mut self, value: f64) {
        self.update(&value.to_bits().to_le_bytes());
    }

    /// Fingerprint of a row-major matrix plus target vector.
    pub fn of_split(rows: &[Vec<f64>], target: &[f64]) -> Self {
        let mut fp = Self::new();
        fp.update(&(rows.len() as u64).to_le_bytes());
        for row in rows {
            for v in row {
                fp.update_f64(*v);
            }
        }
        for v in target {
            fp.update_f64(*v);
        }
        fp
    }

    pub fn finish(&self) -> u64 {
        self.0
    }

    /// 16-character lowercase hex form written to metadata files.
    pub fn finish_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}
