//! Typed creation helpers and the option sets they accept

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::codec::{CommandOptions, Value};
use crate::error::{Error, Result};
use crate::handle::{Handle, ObjectKind};
use crate::session::Session;

fn pair(p: (f64, f64)) -> Value {
    Value::List(vec![Value::Float(p.0), Value::Float(p.1)])
}

/// Options for a new plot
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotOptions {
    /// Centre, as fractions of the tab
    pub position: Option<(f64, f64)>,
    /// Width and height, as fractions of the tab
    pub size: Option<(f64, f64)>,
    pub font_size: Option<f64>,
}

impl CommandOptions for PlotOptions {
    fn to_options(&self) -> Vec<(&'static str, Value)> {
        let mut options = Vec::new();
        if let Some(position) = self.position {
            options.push(("position", pair(position)));
        }
        if let Some(size) = self.size {
            options.push(("size", pair(size)));
        }
        if let Some(font_size) = self.font_size {
            options.push(("font_size", Value::Float(font_size)));
        }
        options
    }
}

/// Options for a vector read from a data source
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataVectorOptions {
    pub field: String,
    pub start: i64,
    /// Number of frames to read; -1 reads to the end
    pub num_frames: i64,
    pub skip: i64,
    pub boxcar_first: bool,
}

impl Default for DataVectorOptions {
    fn default() -> Self {
        Self {
            field: "INDEX".to_string(),
            start: 0,
            num_frames: -1,
            skip: 0,
            boxcar_first: false,
        }
    }
}

impl DataVectorOptions {
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }
}

impl CommandOptions for DataVectorOptions {
    fn to_options(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("field", Value::from(self.field.as_str())),
            ("start", Value::Int(self.start)),
            ("num_frames", Value::Int(self.num_frames)),
            ("skip", Value::Int(self.skip)),
            ("boxcar_first", Value::Bool(self.boxcar_first)),
        ]
    }
}

/// Options for a power spectrum
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpectrumOptions {
    pub sample_rate: f64,
    pub interleaved_average: bool,
    /// FFT length as a power of two
    pub fft_length: u32,
    pub apodize: bool,
    pub remove_mean: bool,
    pub vector_units: String,
    pub rate_units: String,
    pub apodize_function: u32,
    pub sigma: f64,
    pub output_type: u32,
}

impl Default for SpectrumOptions {
    fn default() -> Self {
        Self {
            sample_rate: 1.0,
            interleaved_average: false,
            fft_length: 10,
            apodize: true,
            remove_mean: true,
            vector_units: String::new(),
            rate_units: "Hz".to_string(),
            apodize_function: 0,
            sigma: 1.0,
            output_type: 0,
        }
    }
}

impl SpectrumOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::InvalidOption {
                name: "sample_rate".to_string(),
                reason: format!("must be positive, got {}", self.sample_rate),
            });
        }
        if !(2..=30).contains(&self.fft_length) {
            return Err(Error::InvalidOption {
                name: "fft_length".to_string(),
                reason: format!("power of two must be in 2..=30, got {}", self.fft_length),
            });
        }
        Ok(())
    }
}

impl CommandOptions for SpectrumOptions {
    fn to_options(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("sample_rate", Value::Float(self.sample_rate)),
            ("interleaved_average", Value::Bool(self.interleaved_average)),
            ("fft_length", Value::from(self.fft_length)),
            ("apodize", Value::Bool(self.apodize)),
            ("remove_mean", Value::Bool(self.remove_mean)),
            ("vector_units", Value::from(self.vector_units.as_str())),
            ("rate_units", Value::from(self.rate_units.as_str())),
            ("apodize_function", Value::from(self.apodize_function)),
            ("sigma", Value::Float(self.sigma)),
            ("output_type", Value::from(self.output_type)),
        ]
    }
}

/// Options for a histogram
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistogramOptions {
    pub bin_min: f64,
    pub bin_max: f64,
    pub num_bins: u32,
    pub normalization: u32,
    pub bar_type: u32,
    pub auto_bin: bool,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        Self {
            bin_min: 0.0,
            bin_max: 1.0,
            num_bins: 60,
            normalization: 0,
            bar_type: 0,
            auto_bin: true,
        }
    }
}

impl CommandOptions for HistogramOptions {
    fn to_options(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("bin_min", Value::Float(self.bin_min)),
            ("bin_max", Value::Float(self.bin_max)),
            ("num_bins", Value::from(self.num_bins)),
            ("normalization", Value::from(self.normalization)),
            ("bar_type", Value::from(self.bar_type)),
            ("auto_bin", Value::Bool(self.auto_bin)),
        ]
    }
}

/// Placement of a widget, as fractions of the tab
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Geometry {
    pub position: (f64, f64),
    pub size: (f64, f64),
    pub rotation: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            position: (0.5, 0.5),
            size: (0.1, 0.05),
            rotation: 0.0,
        }
    }
}

impl Geometry {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            position: (x, y),
            size: (width, height),
            rotation: 0.0,
        }
    }
}

impl CommandOptions for Geometry {
    fn to_options(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("position", pair(self.position)),
            ("size", pair(self.size)),
            ("rotation", Value::Float(self.rotation)),
        ]
    }
}

/// Options for `export_graphics_file`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportOptions {
    /// Export every tab instead of the active one
    pub all_tabs: bool,
    /// Re-export periodically, in whole seconds
    #[serde(deserialize_with = "seconds")]
    pub autosave_period: Option<Duration>,
    /// Image format; guessed from the file extension when unset
    pub format: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            all_tabs: false,
            autosave_period: None,
            format: None,
            width: 1280,
            height: 1024,
        }
    }
}

fn seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
}

impl ExportOptions {
    pub const NAMES: [&'static str; 5] =
        ["all_tabs", "autosave_period", "format", "width", "height"];

    /// Build from `name=value` style pairs, rejecting unknown names
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        Self::default().with_pairs(pairs)
    }

    /// Override fields from `name=value` style pairs
    pub fn with_pairs<'a>(
        mut self,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self> {
        fn invalid(name: &str, reason: impl std::fmt::Display) -> Error {
            Error::InvalidOption {
                name: name.to_string(),
                reason: reason.to_string(),
            }
        }

        for (name, value) in pairs {
            match name {
                "all_tabs" => {
                    self.all_tabs = value.parse().map_err(|e| invalid(name, e))?;
                }
                "autosave_period" => {
                    let secs: u64 = value.parse().map_err(|e| invalid(name, e))?;
                    self.autosave_period = Some(Duration::from_secs(secs));
                }
                "format" => self.format = Some(value.to_string()),
                "width" => self.width = value.parse().map_err(|e| invalid(name, e))?,
                "height" => self.height = value.parse().map_err(|e| invalid(name, e))?,
                other => return Err(Error::UnknownOption(other.to_string())),
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(period) = self.autosave_period {
            if period.as_secs() == 0 || period.subsec_nanos() != 0 {
                return Err(Error::InvalidOption {
                    name: "autosave_period".to_string(),
                    reason: format!("must be a whole number of seconds >= 1, got {period:?}"),
                });
            }
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidOption {
                name: if self.width == 0 { "width" } else { "height" }.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl CommandOptions for ExportOptions {
    fn to_options(&self) -> Vec<(&'static str, Value)> {
        let mut options = vec![("all_tabs", Value::Bool(self.all_tabs))];
        if let Some(period) = self.autosave_period {
            options.push(("autosave_period", Value::Int(period.as_secs() as i64)));
        }
        if let Some(format) = &self.format {
            options.push(("format", Value::from(format.as_str())));
        }
        options.push(("width", Value::from(self.width)));
        options.push(("height", Value::from(self.height)));
        options
    }
}

impl Session {
    /// Id of `handle` as an argument, checking it belongs to this session
    pub(crate) fn owned_arg(&self, handle: &Handle<'_>) -> Result<Value> {
        if !std::ptr::eq(handle.session(), self) {
            return Err(Error::StaleHandle {
                id: handle.id().to_string(),
            });
        }
        Ok(Value::from(handle))
    }

    /// As [`Session::owned_arg`], also checking the kind
    fn arg_of(&self, handle: &Handle<'_>, expected: ObjectKind) -> Result<Value> {
        let value = self.owned_arg(handle)?;
        if handle.kind() != expected {
            return Err(Error::WrongKind {
                id: handle.id().to_string(),
                expected,
                found: handle.kind(),
            });
        }
        Ok(value)
    }

    pub fn new_plot(&self, options: &PlotOptions) -> Result<Handle<'_>> {
        self.create_with(ObjectKind::Plot, [], options)
    }

    /// Open a new tab and make it current; returns the tab count
    pub fn new_tab(&self) -> Result<i64> {
        let value = self.call("new_tab", [])?;
        value.as_i64().ok_or(Error::UnexpectedResult {
            command: "new_tab".to_string(),
            expected: "int",
            found: value.type_name(),
        })
    }

    /// Rearrange the plots of the current tab into `columns` columns
    pub fn cleanup_layout(&self, columns: u32) -> Result<()> {
        self.call("cleanup_layout", [Value::from(columns)]).map(drop)
    }

    /// `count` evenly spaced samples from `from` to `to`, both included
    pub fn new_generated_vector(&self, from: f64, to: f64, count: u32) -> Result<Handle<'_>> {
        self.create(
            ObjectKind::Vector,
            [Value::Float(from), Value::Float(to), Value::from(count)],
        )
    }

    /// A vector holding a copy of `values`
    pub fn new_editable_vector(&self, values: &[f64]) -> Result<Handle<'_>> {
        self.create(ObjectKind::Vector, [Value::from(values)])
    }

    /// A vector read by the plotting process from a data source
    pub fn new_data_vector(
        &self,
        source: impl AsRef<Path>,
        options: &DataVectorOptions,
    ) -> Result<Handle<'_>> {
        let source = source.as_ref().to_string_lossy().into_owned();
        self.create_with(ObjectKind::Vector, [Value::Str(source)], options)
    }

    pub fn new_generated_scalar(&self, value: f64) -> Result<Handle<'_>> {
        self.create(ObjectKind::Scalar, [Value::Float(value)])
    }

    /// Equation over the x vector, e.g. `"x^2"`
    pub fn new_equation(&self, x: &Handle<'_>, expression: &str) -> Result<Handle<'_>> {
        let x = self.arg_of(x, ObjectKind::Vector)?;
        self.create(ObjectKind::Equation, [x, Value::from(expression)])
    }

    pub fn new_curve(&self, x: &Handle<'_>, y: &Handle<'_>) -> Result<Handle<'_>> {
        let x = self.arg_of(x, ObjectKind::Vector)?;
        let y = self.arg_of(y, ObjectKind::Vector)?;
        self.create(ObjectKind::Curve, [x, y])
    }

    pub fn new_spectrum(
        &self,
        vector: &Handle<'_>,
        options: &SpectrumOptions,
    ) -> Result<Handle<'_>> {
        options.validate()?;
        let vector = self.arg_of(vector, ObjectKind::Vector)?;
        self.create_with(ObjectKind::Spectrum, [vector], options)
    }

    /// Cross spectrum of two vectors; FFT length and sample rate are scalars
    pub fn new_cross_spectrum(
        &self,
        first: &Handle<'_>,
        second: &Handle<'_>,
        fft_length: &Handle<'_>,
        sample_rate: &Handle<'_>,
    ) -> Result<Handle<'_>> {
        let args = [
            self.arg_of(first, ObjectKind::Vector)?,
            self.arg_of(second, ObjectKind::Vector)?,
            self.arg_of(fft_length, ObjectKind::Scalar)?,
            self.arg_of(sample_rate, ObjectKind::Scalar)?,
        ];
        self.create(ObjectKind::CrossSpectrum, args)
    }

    pub fn new_histogram(
        &self,
        vector: &Handle<'_>,
        options: &HistogramOptions,
    ) -> Result<Handle<'_>> {
        let vector = self.arg_of(vector, ObjectKind::Vector)?;
        self.create_with(ObjectKind::Histogram, [vector], options)
    }

    /// Cumulative sum of `vector` with step `step`
    pub fn new_sum_filter(&self, vector: &Handle<'_>, step: &Handle<'_>) -> Result<Handle<'_>> {
        let args = [
            self.arg_of(vector, ObjectKind::Vector)?,
            self.arg_of(step, ObjectKind::Scalar)?,
        ];
        self.create(ObjectKind::SumFilter, args)
    }

    pub fn new_circle(&self, center: (f64, f64), radius: f64, color: &str) -> Result<Handle<'_>> {
        self.create(
            ObjectKind::Circle,
            [pair(center), Value::Float(radius), Value::from(color)],
        )
    }

    pub fn new_button(&self, label: &str, geometry: &Geometry) -> Result<Handle<'_>> {
        self.create_with(ObjectKind::Button, [Value::from(label)], geometry)
    }

    pub fn new_line_edit(&self, text: &str, geometry: &Geometry) -> Result<Handle<'_>> {
        self.create_with(ObjectKind::LineEdit, [Value::from(text)], geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_options_reject_unknown_names() {
        let result = ExportOptions::from_pairs([("all_tabs", "true"), ("bogus", "1")]);
        assert!(matches!(result, Err(Error::UnknownOption(name)) if name == "bogus"));
    }

    #[test]
    fn test_export_options_from_pairs() {
        let options =
            ExportOptions::from_pairs([("all_tabs", "true"), ("autosave_period", "5")]).unwrap();
        assert!(options.all_tabs);
        assert_eq!(options.autosave_period, Some(Duration::from_secs(5)));
        assert_eq!(options.width, 1280);

        let options = options.with_pairs([("width", "640")]).unwrap();
        assert!(options.all_tabs);
        assert_eq!(options.width, 640);
    }

    #[test]
    fn test_export_options_reject_bad_values() {
        assert!(matches!(
            ExportOptions::from_pairs([("width", "wide")]),
            Err(Error::InvalidOption { .. })
        ));
        assert!(matches!(
            ExportOptions::from_pairs([("autosave_period", "0")]),
            Err(Error::InvalidOption { .. })
        ));

        let options = ExportOptions {
            autosave_period: Some(Duration::from_millis(1500)),
            ..ExportOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_export_options_encoding() {
        let options = ExportOptions {
            all_tabs: true,
            autosave_period: Some(Duration::from_secs(5)),
            ..ExportOptions::default()
        };
        let encoded = options.to_options();
        assert_eq!(encoded[0], ("all_tabs", Value::Bool(true)));
        assert_eq!(encoded[1], ("autosave_period", Value::Int(5)));
        assert!(!encoded.iter().any(|(name, _)| *name == "format"));
    }

    #[test]
    fn test_plot_options_only_send_what_is_set() {
        let options = PlotOptions {
            font_size: Some(12.0),
            ..PlotOptions::default()
        };
        assert_eq!(options.to_options(), vec![("font_size", Value::Float(12.0))]);
    }

    #[test]
    fn test_spectrum_validation() {
        let options = SpectrumOptions {
            fft_length: 1,
            ..SpectrumOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(Error::InvalidOption { name, .. }) if name == "fft_length"
        ));
        assert!(SpectrumOptions::default().validate().is_ok());
    }

    #[test]
    fn test_option_structs_reject_unknown_fields() {
        let result: std::result::Result<ExportOptions, _> =
            serde_json::from_str(r#"{"all_tabs": true, "dpi": 300}"#);
        assert!(result.is_err());

        let options: ExportOptions =
            serde_json::from_str(r#"{"all_tabs": true, "autosave_period": 5}"#).unwrap();
        assert_eq!(options.autosave_period, Some(Duration::from_secs(5)));
    }
}
