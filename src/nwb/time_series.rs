use derive_more::Display;

use crate::dataset::Compression;

/// The neurodata type of a time series, with its type specific fields.
#[derive(Clone, Debug, PartialEq, Display)]
pub enum SeriesType {
    /// A generic time series.
    #[display("TimeSeries")]
    TimeSeries,
    /// Extracellular voltage traces, `(frames, channels)`.
    #[display("ElectricalSeries")]
    ElectricalSeries {
        /// The electrode table index of each channel.
        electrodes: Vec<u64>,
    },
    /// A behavioural movie, `(frames, height, width[, channels])`.
    #[display("ImageSeries")]
    ImageSeries,
    /// A two-photon imaging stack, `(frames, width, height[, channels])`.
    #[display("TwoPhotonSeries")]
    TwoPhotonSeries {
        /// The name of the imaging plane.
        imaging_plane: String,
    },
}

impl SeriesType {
    /// The default unit of the data.
    #[must_use]
    pub fn default_unit(&self) -> &'static str {
        match self {
            Self::ElectricalSeries { .. } => "volts",
            Self::TimeSeries | Self::ImageSeries | Self::TwoPhotonSeries { .. } => "n.a.",
        }
    }
}

/// The timing of a time series.
#[derive(Clone, Debug, PartialEq)]
pub enum SeriesTiming {
    /// Regularly sampled at `rate` Hz from `starting_time` seconds.
    Rate {
        /// The sampling rate in Hz.
        rate: f64,
        /// The time of the first sample in seconds.
        starting_time: f64,
    },
    /// One timestamp in seconds per sample.
    Timestamps(Vec<f64>),
}

impl SeriesTiming {
    /// Return [`SeriesTiming::Rate`] if `timestamps` are regular and increasing, otherwise [`SeriesTiming::Timestamps`].
    ///
    /// See [`check_regular_timestamps`].
    #[must_use]
    pub fn from_timestamps(timestamps: Vec<f64>) -> Self {
        let regular = check_regular_timestamps(&timestamps);
        match timestamps[..] {
            [first, second, ..] if regular && nanoseconds(second - first) > 0 => Self::Rate {
                rate: 1.0 / (second - first),
                starting_time: first,
            },
            _ => Self::Timestamps(timestamps),
        }
    }
}

/// Returns true if `timestamps` are regularly sampled.
///
/// Timestamps are regular if every difference between consecutive timestamps, rounded to 9 decimal places, is the same.
/// Fewer than two timestamps are not regular.
#[must_use]
pub fn check_regular_timestamps(timestamps: &[f64]) -> bool {
    let mut differences = timestamps
        .windows(2)
        .map(|pair| nanoseconds(pair[1] - pair[0]));
    match differences.next() {
        Some(first) => differences.all(|difference| difference == first),
        None => false,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn nanoseconds(seconds: f64) -> i64 {
    (seconds * 1e9).round() as i64
}

/// A time series to write to an [`NwbFile`](super::NwbFile).
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    name: String,
    series_type: SeriesType,
    timing: SeriesTiming,
    description: String,
    unit: String,
    conversion: f64,
    comments: String,
    compression: Option<Compression>,
}

impl TimeSeries {
    /// Create a new time series.
    ///
    /// The description defaults to `no description`, the comments to `no comments`, the conversion to 1 and the unit to the [default unit](SeriesType::default_unit) of `series_type`.
    #[must_use]
    pub fn new(name: impl Into<String>, series_type: SeriesType, timing: SeriesTiming) -> Self {
        let unit = series_type.default_unit().to_string();
        Self {
            name: name.into(),
            series_type,
            timing,
            description: "no description".to_string(),
            unit,
            conversion: 1.0,
            comments: "no comments".to_string(),
            compression: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the unit of the data after conversion.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set the scalar converting stored values to the unit.
    #[must_use]
    pub fn with_conversion(mut self, conversion: f64) -> Self {
        self.conversion = conversion;
        self
    }

    /// Set the comments.
    #[must_use]
    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = comments.into();
        self
    }

    /// Set the compression of the data, overriding the [global compression](crate::config::Config#default-compression).
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Return the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the series type.
    #[must_use]
    pub fn series_type(&self) -> &SeriesType {
        &self.series_type
    }

    /// Return the timing.
    #[must_use]
    pub fn timing(&self) -> &SeriesTiming {
        &self.timing
    }

    /// Return the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Return the unit.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Return the conversion.
    #[must_use]
    pub fn conversion(&self) -> f64 {
        self.conversion
    }

    /// Return the comments.
    #[must_use]
    pub fn comments(&self) -> &str {
        &self.comments
    }

    /// Return the compression override.
    #[must_use]
    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }
}
