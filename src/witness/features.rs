// =============================================================================
// Bar features — the numeric inputs event definitions predicate over
// =============================================================================
//
// One pass over the bar slice produces every feature an event definition can
// reference.  EMA is seeded with the SMA of the first `period` closes; RSI
// and ATR use Wilder's smoothing.
// =============================================================================

use crate::market::Bar;

/// Features computed from a bar slice, evaluated at the newest bar.
#[derive(Debug, Clone)]
pub struct BarFeatures {
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    /// ATR of the most recent bar window divided by the ATR of the window
    /// preceding it.  Above 1.0 means volatility is expanding.
    pub atr_ratio: Option<f64>,
    /// Highest high over the lookback window, excluding the newest bar.
    pub rolling_high: Option<f64>,
    /// Lowest low over the lookback window, excluding the newest bar.
    pub rolling_low: Option<f64>,
    /// Newest bar volume divided by the mean volume of the lookback window.
    pub volume_ratio: Option<f64>,
}

/// Periods used by the feature pass.
pub const EMA_FAST_PERIOD: usize = 9;
pub const EMA_SLOW_PERIOD: usize = 21;
pub const RSI_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;
pub const LOOKBACK: usize = 20;

impl BarFeatures {
    /// Compute all features from `bars` (oldest first).  Features whose
    /// look-back exceeds the slice length come back as `None`; the newest
    /// close is always present.
    pub fn compute(bars: &[Bar]) -> Option<Self> {
        let last = bars.last()?;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let atr_now = atr(bars, ATR_PERIOD);
        let atr_prev = if bars.len() > ATR_PERIOD + 1 {
            atr(&bars[..bars.len() - 1], ATR_PERIOD)
        } else {
            None
        };
        let atr_ratio = match (atr_now, atr_prev) {
            (Some(now), Some(prev)) if prev > 0.0 => Some(now / prev),
            _ => None,
        };

        let window = bars.len().saturating_sub(1).min(LOOKBACK);
        let (rolling_high, rolling_low, volume_ratio) = if window > 0 {
            let slice = &bars[bars.len() - 1 - window..bars.len() - 1];
            let high = slice.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let low = slice.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            let mean_vol = slice.iter().map(|b| b.volume).sum::<f64>() / window as f64;
            let vr = if mean_vol > 0.0 {
                Some(last.volume / mean_vol)
            } else {
                None
            };
            (Some(high), Some(low), vr)
        } else {
            (None, None, None)
        };

        Some(Self {
            close: last.close,
            high: last.high,
            low: last.low,
            ema_fast: ema_last(&closes, EMA_FAST_PERIOD),
            ema_slow: ema_last(&closes, EMA_SLOW_PERIOD),
            rsi: rsi_last(&closes, RSI_PERIOD),
            atr: atr_now,
            atr_ratio,
            rolling_high,
            rolling_low,
            volume_ratio,
        })
    }
}

// ---------------------------------------------------------------------------
// Indicator internals
// ---------------------------------------------------------------------------

/// Last EMA value for `closes` with the given period, seeded with the SMA of
/// the first `period` closes.
fn ema_last(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period + 1) as f64;
    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return None;
    }

    let mut ema = sma;
    for &close in &closes[period..] {
        ema = close * multiplier + ema * (1.0 - multiplier);
        if !ema.is_finite() {
            return None;
        }
    }
    Some(ema)
}

/// Last RSI value using Wilder's smoothing.  Clamped to 100 when there are no
/// down moves in the window.
fn rsi_last(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas[..period]
        .iter()
        .fold((0.0_f64, 0.0_f64), |(g, l), &d| {
            if d > 0.0 {
                (g + d, l)
            } else {
                (g, l + d.abs())
            }
        });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    for &d in &deltas[period..] {
        let (gain, loss) = if d > 0.0 { (d, 0.0) } else { (0.0, d.abs()) };
        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;
    }

    if !avg_gain.is_finite() || !avg_loss.is_finite() {
        return None;
    }
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Last ATR value using Wilder's smoothing, seeded with the SMA of the first
/// `period` true ranges.
fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    let mut tr_values: Vec<f64> = Vec::with_capacity(bars.len() - 1);
    for i in 1..bars.len() {
        let high = bars[i].high;
        let low = bars[i].low;
        let prev_close = bars[i - 1].close;
        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        tr_values.push(tr);
    }

    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return None;
    }

    let period_f = period as f64;
    let mut value = seed;
    for &tr in &tr_values[period..] {
        value = (value * (period_f - 1.0) + tr) / period_f;
        if !value.is_finite() {
            return None;
        }
    }
    Some(value)
}
