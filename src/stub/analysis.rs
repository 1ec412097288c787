//! Numeric helpers behind the stub's data objects

/// Largest vector `linspace` may generate
pub(crate) const MAX_GENERATED_SAMPLES: usize = 1 << 24;

/// Longest periodogram window, as a power of two
pub(crate) const MAX_FFT_LOG2: u32 = 14;

pub(crate) const MAX_HISTOGRAM_BINS: usize = 1 << 20;

/// `count` evenly spaced samples from `from` to `to`, both ends included
pub(crate) fn linspace(from: f64, to: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![from],
        n => {
            let step = (to - from) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { to } else { from + i as f64 * step })
                .collect()
        }
    }
}

/// Running sum scaled by `step`
pub(crate) fn cumulative_sum(values: &[f64], step: f64) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v * step;
            Some(*acc)
        })
        .collect()
}

/// Bin centres and bin heights
pub(crate) struct Histogram {
    pub centres: Vec<f64>,
    pub heights: Vec<f64>,
}

/// `normalization`: 0 counts, 1 fraction of samples, 2 percent, 3 peak scaled to 1
pub(crate) fn histogram(
    values: &[f64],
    mut min: f64,
    mut max: f64,
    bins: usize,
    normalization: u32,
    auto_bin: bool,
) -> Histogram {
    let bins = bins.max(1);
    if auto_bin && !values.is_empty() {
        min = values.iter().copied().fold(f64::INFINITY, f64::min);
        max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    }
    if max <= min {
        max = min + 1.0;
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0.0; bins];
    for &v in values {
        if v < min || v > max || !v.is_finite() {
            continue;
        }
        let bin = (((v - min) / width) as usize).min(bins - 1);
        counts[bin] += 1.0;
    }

    let total = values.len().max(1) as f64;
    let peak = counts.iter().copied().fold(0.0, f64::max).max(1.0);
    let heights = counts
        .into_iter()
        .map(|c| match normalization {
            1 => c / total,
            2 => 100.0 * c / total,
            3 => c / peak,
            _ => c,
        })
        .collect();
    let centres = (0..bins).map(|i| min + (i as f64 + 0.5) * width).collect();
    Histogram { centres, heights }
}

/// Frequencies and power of a periodogram
pub(crate) struct Spectrum {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
}

/// Periodogram over the first `2^log2_len` samples (fewer if the input is short)
///
/// With `second`, the real part of the cross spectrum of the two inputs.
pub(crate) fn periodogram(
    first: &[f64],
    second: Option<&[f64]>,
    log2_len: u32,
    sample_rate: f64,
    remove_mean: bool,
) -> Spectrum {
    let n = window_len(
        first.len().min(second.map_or(usize::MAX, <[f64]>::len)),
        log2_len,
    );
    if n == 0 {
        return Spectrum {
            frequencies: Vec::new(),
            power: Vec::new(),
        };
    }

    let prepare = |data: &[f64]| {
        let data = &data[..n];
        let mean = if remove_mean {
            data.iter().sum::<f64>() / n as f64
        } else {
            0.0
        };
        data.iter().map(|v| v - mean).collect::<Vec<_>>()
    };
    let a = prepare(first);
    let b = second.map(prepare);

    let bins = n / 2 + 1;
    let mut frequencies = Vec::with_capacity(bins);
    let mut power = Vec::with_capacity(bins);
    for k in 0..bins {
        let (ar, ai) = dft_bin(&a, k);
        let value = match &b {
            Some(b) => {
                let (br, bi) = dft_bin(b, k);
                ar * br + ai * bi
            }
            None => ar * ar + ai * ai,
        };
        frequencies.push(k as f64 * sample_rate / n as f64);
        power.push(value / (n as f64 * sample_rate));
    }
    Spectrum { frequencies, power }
}

/// Samples a periodogram reads from `available` inputs
pub(crate) fn window_len(available: usize, log2_len: u32) -> usize {
    available.min(1usize << log2_len.min(MAX_FFT_LOG2))
}

fn dft_bin(data: &[f64], k: usize) -> (f64, f64) {
    let n = data.len() as f64;
    data.iter().enumerate().fold((0.0, 0.0), |(re, im), (t, v)| {
        let angle = -2.0 * std::f64::consts::PI * k as f64 * t as f64 / n;
        (re + v * angle.cos(), im + v * angle.sin())
    })
}

/// Column-oriented ASCII data: whitespace separated numbers, `#` comments and
/// an optional header line naming the columns
pub(crate) struct AsciiTable {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl AsciiTable {
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut names = Vec::new();
        let mut rows = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let parsed: Result<Vec<f64>, _> = fields.iter().map(|f| f.parse::<f64>()).collect();
            match parsed {
                Ok(row) => rows.push(row),
                Err(_) if rows.is_empty() && names.is_empty() => {
                    names = fields.iter().map(|f| f.to_string()).collect();
                }
                Err(_) => return Err(format!("line {}: not a number row", line_no + 1)),
            }
        }
        Ok(Self { names, rows })
    }

    /// Values of `field`: `INDEX`, a header name, or a 1-based column number
    /// written either bare or as `Column N`
    pub fn field(&self, field: &str) -> Result<Vec<f64>, String> {
        if field == "INDEX" {
            return Ok((0..self.rows.len()).map(|i| i as f64).collect());
        }
        let column = match self.names.iter().position(|name| name == field) {
            Some(column) => column,
            None => match field.trim_start_matches("Column ").parse::<usize>() {
                Ok(n) if n >= 1 => n - 1,
                _ => return Err(format!("no field '{field}'")),
            },
        };
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(column).copied().unwrap_or(f64::NAN))
            .collect())
    }
}

/// Frame selection of a data vector
pub(crate) fn select_frames(values: Vec<f64>, start: i64, count: i64, skip: i64) -> Vec<f64> {
    let start = usize::try_from(start.max(0)).unwrap_or(0).min(values.len());
    let mut selected: Vec<f64> = values.into_iter().skip(start).collect();
    if count >= 0 {
        selected.truncate(usize::try_from(count).unwrap_or(usize::MAX));
    }
    if skip > 1 {
        let skip = usize::try_from(skip).unwrap_or(1);
        selected = selected.into_iter().step_by(skip).collect();
    }
    selected
}
