//! Runtime capability set for encode families.

/// Encode families represented as bitflags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FeatureSet(u8);

impl FeatureSet {
    const EMPTY: Self = FeatureSet(0);
    const LOSSY: u8 = 1 << 0;
    const LOSSLESS: u8 = 1 << 1;
    const NEAR_LOSSLESS: u8 = 1 << 2;
    const ALPHA: u8 = 1 << 3;
    const THREADS: u8 = 1 << 4;

    #[allow(unused_mut)]
    fn all_compiled() -> Self {
        let mut bits = Self::LOSSY | Self::LOSSLESS | Self::NEAR_LOSSLESS | Self::ALPHA;

        #[cfg(feature = "threads")]
        {
            bits |= Self::THREADS;
        }

        FeatureSet(bits)
    }

    fn bit(feature: Feature) -> u8 {
        match feature {
            Feature::Lossy => Self::LOSSY,
            Feature::Lossless => Self::LOSSLESS,
            Feature::NearLossless => Self::NEAR_LOSSLESS,
            Feature::Alpha => Self::ALPHA,
            Feature::Threads => Self::THREADS,
        }
    }

    fn contains(self, feature: Feature) -> bool {
        (self.0 & Self::bit(feature)) != 0
    }

    fn insert(&mut self, feature: Feature) {
        self.0 |= Self::bit(feature);
    }

    fn remove(&mut self, feature: Feature) {
        self.0 &= !Self::bit(feature);
    }
}

/// One encode family or runtime facility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Feature {
    /// `VP8 ` payloads.
    Lossy,
    /// `VP8L` payloads.
    Lossless,
    /// Near-lossless preprocessing for `VP8L`.
    NearLossless,
    /// `ALPH` chunks next to lossy payloads.
    Alpha,
    /// Worker threads for row-parallel coding.
    Threads,
}

impl Feature {
    const ALL: [Feature; 5] = [
        Feature::Lossy,
        Feature::Lossless,
        Feature::NearLossless,
        Feature::Alpha,
        Feature::Threads,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            Feature::Lossy => "lossy encoding",
            Feature::Lossless => "lossless encoding",
            Feature::NearLossless => "near-lossless encoding",
            Feature::Alpha => "lossy alpha encoding",
            Feature::Threads => "worker threads",
        }
    }
}

/// What this build can do, plus the crate version.
///
/// Compile-time features decide what is *available*; a `Capabilities`
/// value decides what is *enabled* for the requests it is passed to.
/// There is no process-wide instance: build one with
/// [`Capabilities::detect`] and hand it to
/// [`EncodeRequest::with_capabilities`](crate::EncodeRequest::with_capabilities).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    enabled: FeatureSet,
    version: (u32, u32, u32),
}

impl Capabilities {
    /// Everything compiled into this build, enabled.
    pub fn detect() -> Self {
        Self {
            enabled: FeatureSet::all_compiled(),
            version: crate::version(),
        }
    }

    /// Nothing enabled; caller must opt in.
    pub fn none() -> Self {
        Self {
            enabled: FeatureSet::EMPTY,
            version: crate::version(),
        }
    }

    /// Enable or disable a feature. Enabling a feature that is not compiled
    /// in has no effect.
    pub fn with(mut self, feature: Feature, enabled: bool) -> Self {
        if enabled && FeatureSet::all_compiled().contains(feature) {
            self.enabled.insert(feature);
        } else {
            self.enabled.remove(feature);
        }
        self
    }

    /// Disable a feature.
    pub fn without(self, feature: Feature) -> Self {
        self.with(feature, false)
    }

    /// Is this feature compiled in AND enabled?
    pub fn supports(&self, feature: Feature) -> bool {
        self.enabled.contains(feature)
    }

    /// Enabled features.
    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        Feature::ALL.into_iter().filter(|&f| self.supports(f))
    }

    /// `(major, minor, patch)` of this crate.
    pub fn version(&self) -> (u32, u32, u32) {
        self.version
    }

    /// Fail with [`CodecError::UnsupportedFeature`](crate::CodecError::UnsupportedFeature)
    /// when `feature` is disabled.
    pub(crate) fn require(&self, feature: Feature) -> Result<(), crate::CodecError> {
        if self.supports(feature) {
            Ok(())
        } else {
            Err(crate::CodecError::UnsupportedFeature(feature.name()))
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}
