//! Technical-indicator features computed per ticker.
//!
//! The built-in candlestick patterns are simplified single- and two-bar
//! rules, not TA-Lib's definitions (which compare bodies and shadows against
//! averages of preceding bars). They only share TA-Lib's output convention:
//! `100` for a bullish signal, `-100` for a bearish one, `0` otherwise.
//!
//! EMA and OBV come from the `ta` crate.

use blocks_core::config::DEFAULT_TICKER_COL;
use blocks_core::dataset::{gather, scatter};
use blocks_core::{Dataset, Error, Processor, Result};
use serde::{Deserialize, Serialize};
use ta::indicators::{ExponentialMovingAverage, OnBalanceVolume};
use ta::{Close, Next, Volume};

/// Price columns consumed by the indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OhlcvColumns {
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

impl Default for OhlcvColumns {
    fn default() -> Self {
        Self {
            open: "Open".to_string(),
            high: "High".to_string(),
            low: "Low".to_string(),
            close: "Close".to_string(),
            volume: "Volume".to_string(),
        }
    }
}

/// A candlestick pattern: `f(open, high, low, close) -> signal`.
pub trait CandlePattern: Send + Sync {
    /// TA-Lib style name, e.g. `CDLDOJI`.
    fn name(&self) -> &str;

    /// Signal per bar; all slices have equal length.
    fn compute(&self, open: &[f64], high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64>;
}

/// Body no larger than a tenth of the bar's range.
#[derive(Debug, Clone, Copy, Default)]
pub struct Doji;

impl CandlePattern for Doji {
    fn name(&self) -> &str {
        "CDLDOJI"
    }

    fn compute(&self, open: &[f64], high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
        (0..open.len())
            .map(|i| {
                let range = high[i] - low[i];
                if range > 0.0 && (close[i] - open[i]).abs() <= 0.1 * range {
                    100.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Small body near the top with a long lower shadow.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hammer;

impl CandlePattern for Hammer {
    fn name(&self) -> &str {
        "CDLHAMMER"
    }

    fn compute(&self, open: &[f64], high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
        (0..open.len())
            .map(|i| {
                let range = high[i] - low[i];
                let body = (close[i] - open[i]).abs();
                let lower_shadow = open[i].min(close[i]) - low[i];
                let upper_shadow = high[i] - open[i].max(close[i]);
                let is_hammer = range > 0.0
                    && body > 0.0
                    && body <= 0.3 * range
                    && lower_shadow >= 2.0 * body
                    && upper_shadow <= 0.1 * range;
                if is_hammer {
                    100.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Body that engulfs the previous bar's opposite-colored body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Engulfing;

impl CandlePattern for Engulfing {
    fn name(&self) -> &str {
        "CDLENGULFING"
    }

    fn compute(&self, open: &[f64], _high: &[f64], _low: &[f64], close: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; open.len()];
        for i in 1..open.len() {
            let prev_bearish = close[i - 1] < open[i - 1];
            let prev_bullish = close[i - 1] > open[i - 1];
            if prev_bearish
                && close[i] > open[i]
                && open[i] <= close[i - 1]
                && close[i] >= open[i - 1]
            {
                out[i] = 100.0;
            } else if prev_bullish
                && close[i] < open[i]
                && open[i] >= close[i - 1]
                && close[i] <= open[i - 1]
            {
                out[i] = -100.0;
            }
        }
        out
    }
}

/// Body covering nearly the full range, signed by direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Marubozu;

impl CandlePattern for Marubozu {
    fn name(&self) -> &str {
        "CDLMARUBOZU"
    }

    fn compute(&self, open: &[f64], high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
        (0..open.len())
            .map(|i| {
                let range = high[i] - low[i];
                let body = close[i] - open[i];
                if range > 0.0 && body.abs() >= 0.95 * range {
                    100.0 * body.signum()
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Built-in candlestick patterns.
pub fn default_patterns() -> Vec<Box<dyn CandlePattern>> {
    vec![
        Box::new(Doji),
        Box::new(Hammer),
        Box::new(Engulfing),
        Box::new(Marubozu),
    ]
}

/// Adds one `feature_{PATTERN}` column per candlestick pattern.
pub struct PatternFeatures {
    ticker_col: String,
    columns: OhlcvColumns,
    patterns: Vec<Box<dyn CandlePattern>>,
}

impl PatternFeatures {
    /// All built-in patterns with default column names.
    pub fn new() -> Self {
        Self::with_patterns(DEFAULT_TICKER_COL, OhlcvColumns::default(), default_patterns())
    }

    /// Custom pattern set over the given columns.
    pub fn with_patterns(
        ticker_col: impl Into<String>,
        columns: OhlcvColumns,
        patterns: Vec<Box<dyn CandlePattern>>,
    ) -> Self {
        Self {
            ticker_col: ticker_col.into(),
            columns,
            patterns,
        }
    }
}

impl Default for PatternFeatures {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for PatternFeatures {
    fn name(&self) -> &str {
        "PatternFeatures"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let open = dataset.float_column(&self.columns.open)?;
        let high = dataset.float_column(&self.columns.high)?;
        let low = dataset.float_column(&self.columns.low)?;
        let close = dataset.float_column(&self.columns.close)?;
        let tickers = dataset.groups(&self.ticker_col)?;

        let mut output = dataset.clone();
        for pattern in &self.patterns {
            let mut column = vec![0.0; dataset.n_rows()];
            for ticker in &tickers {
                let signal = pattern.compute(
                    &gather(open, &ticker.rows),
                    &gather(high, &ticker.rows),
                    &gather(low, &ticker.rows),
                    &gather(close, &ticker.rows),
                );
                scatter(&mut column, &ticker.rows, &signal);
            }
            output.insert_column(format!("feature_{}", pattern.name()), column)?;
        }
        Ok(output)
    }
}

/// Close and volume of one bar, as consumed by `ta` indicators.
struct VolumeBar {
    close: f64,
    volume: f64,
}

impl Close for VolumeBar {
    fn close(&self) -> f64 {
        self.close
    }
}

impl Volume for VolumeBar {
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Exponential moving average seeded with the first value.
fn ema(values: &[f64], period: usize) -> Result<Vec<f64>> {
    let mut indicator = ExponentialMovingAverage::new(period)
        .map_err(|e| Error::configuration(format!("EMA period {period}: {e:?}")))?;
    Ok(values.iter().map(|&v| indicator.next(v)).collect())
}

/// Chaikin accumulation/distribution line.
pub fn accumulation_distribution(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut ad = 0.0;
    (0..high.len())
        .map(|i| {
            let range = high[i] - low[i];
            if range > 0.0 {
                ad += ((close[i] - low[i]) - (high[i] - close[i])) / range * volume[i];
            }
            ad
        })
        .collect()
}

/// Chaikin A/D oscillator: `EMA_fast(AD) - EMA_slow(AD)`.
///
/// The first `slow_period - 1` values are warm-up and reported as 0.
pub fn chaikin_oscillator(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    volume: &[f64],
    fast_period: usize,
    slow_period: usize,
) -> Result<Vec<f64>> {
    let ad = accumulation_distribution(high, low, close, volume);
    let fast = ema(&ad, fast_period)?;
    let slow = ema(&ad, slow_period)?;
    let warmup = slow_period.max(fast_period).saturating_sub(1);
    Ok(fast
        .iter()
        .zip(&slow)
        .enumerate()
        .map(|(i, (f, s))| if i < warmup { 0.0 } else { f - s })
        .collect())
}

/// On-balance volume. For positive prices it starts at the first bar's volume.
pub fn on_balance_volume(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut indicator = OnBalanceVolume::new();
    close
        .iter()
        .zip(volume)
        .map(|(&close, &volume)| indicator.next(&VolumeBar { close, volume }))
        .collect()
}

/// Volume indicator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeFeaturesConfig {
    pub ticker_col: String,
    pub columns: OhlcvColumns,
    /// Fast EMA period of the A/D oscillator.
    pub fast_period: usize,
    /// Slow EMA period of the A/D oscillator.
    pub slow_period: usize,
}

impl Default for VolumeFeaturesConfig {
    fn default() -> Self {
        Self {
            ticker_col: DEFAULT_TICKER_COL.to_string(),
            columns: OhlcvColumns::default(),
            fast_period: 3,
            slow_period: 10,
        }
    }
}

/// Adds `feature_AD`, `feature_ADOSC` and `feature_OBV`.
#[derive(Debug, Clone)]
pub struct VolumeFeatures {
    config: VolumeFeaturesConfig,
}

impl VolumeFeatures {
    pub fn new(config: VolumeFeaturesConfig) -> Result<Self> {
        if config.fast_period == 0 || config.slow_period == 0 {
            return Err(Error::configuration("oscillator periods should be positive"));
        }
        Ok(Self { config })
    }
}

impl Processor for VolumeFeatures {
    fn name(&self) -> &str {
        "VolumeFeatures"
    }

    fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let cols = &self.config.columns;
        let high = dataset.float_column(&cols.high)?;
        let low = dataset.float_column(&cols.low)?;
        let close = dataset.float_column(&cols.close)?;
        let volume = dataset.float_column(&cols.volume)?;
        let tickers = dataset.groups(&self.config.ticker_col)?;

        let n = dataset.n_rows();
        let (mut ad, mut adosc, mut obv) = (vec![0.0; n], vec![0.0; n], vec![0.0; n]);
        for ticker in &tickers {
            let h = gather(high, &ticker.rows);
            let l = gather(low, &ticker.rows);
            let c = gather(close, &ticker.rows);
            let v = gather(volume, &ticker.rows);

            scatter(&mut ad, &ticker.rows, &accumulation_distribution(&h, &l, &c, &v));
            scatter(
                &mut adosc,
                &ticker.rows,
                &chaikin_oscillator(&h, &l, &c, &v, self.config.fast_period, self.config.slow_period)?,
            );
            scatter(&mut obv, &ticker.rows, &on_balance_volume(&c, &v));
        }

        dataset
            .clone()
            .with_column("feature_AD", ad)?
            .with_column("feature_ADOSC", adosc)?
            .with_column("feature_OBV", obv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use blocks_core::Metadata;

    fn make_dataset() -> Dataset {
        Dataset::new(Metadata::default())
            .with_column("ticker", vec!["AAA", "BBB", "AAA", "BBB", "AAA"])
            .unwrap()
            .with_column("Open", vec![10.0, 50.0, 9.0, 50.0, 10.0])
            .unwrap()
            .with_column("High", vec![11.0, 51.0, 12.0, 52.0, 10.5])
            .unwrap()
            .with_column("Low", vec![9.0, 49.0, 8.5, 48.0, 7.0])
            .unwrap()
            .with_column("Close", vec![9.5, 50.05, 11.5, 51.9, 10.3])
            .unwrap()
            .with_column("Volume", vec![100.0, 10.0, 200.0, 20.0, 150.0])
            .unwrap()
    }

    #[test]
    fn test_doji() {
        let out = Doji.compute(&[10.0, 10.0], &[11.0, 11.0], &[9.0, 9.0], &[10.1, 11.0]);
        assert_eq!(out, vec![100.0, 0.0]);
    }

    #[test]
    fn test_hammer() {
        // Body 0.2 at the top, lower shadow 2.0
        let out = Hammer.compute(&[10.0], &[10.2], &[8.0], &[10.2]);
        assert_eq!(out, vec![100.0]);
    }

    #[test]
    fn test_engulfing() {
        let open = [10.0, 9.0, 12.0];
        let close = [9.5, 10.5, 8.5];
        let out = Engulfing.compute(&open, &[0.0; 3], &[0.0; 3], &close);
        assert_eq!(out, vec![0.0, 100.0, -100.0]);
    }

    #[test]
    fn test_marubozu() {
        let out = Marubozu.compute(&[10.0, 12.0], &[12.0, 12.0], &[10.0, 10.0], &[12.0, 10.0]);
        assert_eq!(out, vec![100.0, -100.0]);
    }

    #[test]
    fn test_pattern_features_per_ticker() {
        let ds = make_dataset();
        let out = PatternFeatures::new().transform(&ds).unwrap();
        for name in ["feature_CDLDOJI", "feature_CDLHAMMER", "feature_CDLENGULFING", "feature_CDLMARUBOZU"] {
            assert!(out.has_column(name), "missing {name}");
        }
        // AAA: bar 0 bearish (10 -> 9.5), bar 2 bullish engulfing (9 -> 11.5)
        let engulfing = out.float_column("feature_CDLENGULFING").unwrap();
        assert_eq!(engulfing[2], 100.0);
        // BBB rows never see AAA's bars
        assert_eq!(engulfing[1], 0.0);
    }

    #[test]
    fn test_on_balance_volume() {
        let obv = on_balance_volume(&[10.0, 11.0, 10.5, 10.5], &[100.0, 50.0, 30.0, 20.0]);
        assert_eq!(obv, vec![100.0, 150.0, 120.0, 120.0]);
    }

    #[test]
    fn test_accumulation_distribution() {
        // CLV = ((9.5-9) - (11-9.5)) / 2 = -0.5
        let ad = accumulation_distribution(&[11.0, 10.0], &[9.0, 10.0], &[9.5, 10.0], &[100.0, 50.0]);
        assert_abs_diff_eq!(ad[0], -50.0);
        // Zero range adds nothing
        assert_abs_diff_eq!(ad[1], -50.0);
    }

    #[test]
    fn test_ema_seeded_with_first_value() {
        // k = 2 / (3 + 1) = 0.5
        let out = ema(&[10.0, 20.0, 20.0], 3).unwrap();
        assert_eq!(out, vec![10.0, 15.0, 17.5]);
        assert!(ema(&[1.0], 0).is_err());
    }

    #[test]
    fn test_chaikin_oscillator_rejects_zero_period() {
        let err = chaikin_oscillator(&[2.0], &[1.0], &[1.5], &[10.0], 0, 10).unwrap_err();
        assert_eq!(err.kind(), blocks_core::ErrorKind::Configuration);
    }

    #[test]
    fn test_chaikin_oscillator_warmup() {
        let n = 12;
        let high = vec![11.0; n];
        let low = vec![9.0; n];
        let close: Vec<f64> = (0..n).map(|i| 9.0 + (i % 3) as f64).collect();
        let volume = vec![100.0; n];
        let osc = chaikin_oscillator(&high, &low, &close, &volume, 3, 10).unwrap();
        assert!(osc[..9].iter().all(|v| *v == 0.0));
        assert!(osc[9..].iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_volume_features() {
        let ds = make_dataset();
        let out = VolumeFeatures::new(VolumeFeaturesConfig::default())
            .unwrap()
            .transform(&ds)
            .unwrap();
        let obv = out.float_column("feature_OBV").unwrap();
        // AAA closes 9.5, 11.5, 10.3 with volumes 100, 200, 150
        assert_eq!(obv[0], 100.0);
        assert_eq!(obv[2], 300.0);
        assert_eq!(obv[4], 150.0);
        // BBB closes 50.05, 51.9
        assert_eq!(obv[3], 30.0);
        assert!(out.has_column("feature_ADOSC"));
        assert!(VolumeFeatures::new(VolumeFeaturesConfig {
            slow_period: 0,
            ..VolumeFeaturesConfig::default()
        })
        .is_err());
    }
}
