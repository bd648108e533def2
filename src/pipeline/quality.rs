//! Quality search for target size or target PSNR.
//!
//! Both measures grow with quality, so one secant iteration serves both:
//! overshooting the target lowers quality, undershooting raises it.

/// Steps smaller than this end the search.
const DQ_LIMIT: f32 = 0.4;
const INITIAL_DQ: f32 = 10.0;
const MAX_DQ: f32 = 30.0;

/// What the search steers towards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Target {
    /// Encoded size in bytes.
    Size(u32),
    /// PSNR of the reconstruction in dB.
    Psnr(f32),
}

impl Target {
    fn value(self) -> f64 {
        match self {
            Target::Size(bytes) => f64::from(bytes),
            Target::Psnr(db) => f64::from(db),
        }
    }
}

/// Secant iteration over quality, bounded by `[qmin, qmax]`.
#[derive(Debug, Clone)]
pub(crate) struct QualitySearch {
    target: Target,
    first: bool,
    dq: f32,
    q: f32,
    last_q: f32,
    qmin: f32,
    qmax: f32,
    value: f64,
    last_value: f64,
    best: Option<(f64, f32)>,
}

impl QualitySearch {
    pub(crate) fn new(target: Target, quality: f32, qmin: u8, qmax: u8) -> Self {
        let (qmin, qmax) = (f32::from(qmin), f32::from(qmax));
        let q = quality.clamp(qmin, qmax);
        Self {
            target,
            first: true,
            dq: INITIAL_DQ,
            q,
            last_q: q,
            qmin,
            qmax,
            value: 0.0,
            last_value: 0.0,
            best: None,
        }
    }

    /// Quality for the next encode.
    pub(crate) fn quality(&self) -> f32 {
        self.q
    }

    /// Record the measured value of an encode at [`Self::quality`].
    ///
    /// Returns `true` when this result is the closest to the target so far.
    pub(crate) fn record(&mut self, value: f64) -> bool {
        self.value = value;
        let distance = (value - self.target.value()).abs();
        let better = self.best.is_none_or(|(d, _)| distance < d);
        if better {
            self.best = Some((distance, self.q));
        }
        better
    }

    /// Move to the next quality. Returns `false` once converged.
    pub(crate) fn advance(&mut self) -> bool {
        let target = self.target.value();
        let dq = if self.first {
            self.first = false;
            if self.value > target { -self.dq } else { self.dq }
        } else if (self.value - self.last_value).abs() > f64::EPSILON {
            let slope = (target - self.value) / (self.last_value - self.value);
            (slope * f64::from(self.last_q - self.q)) as f32
        } else {
            0.0
        };
        self.dq = dq.clamp(-MAX_DQ, MAX_DQ);
        self.last_q = self.q;
        self.last_value = self.value;
        self.q = (self.q + self.dq).clamp(self.qmin, self.qmax);
        log::trace!(
            "quality search: value {:.2} target {:.2}, next q {:.2}",
            self.value,
            target,
            self.q
        );
        self.dq.abs() > DQ_LIMIT && self.q != self.last_q
    }
}
