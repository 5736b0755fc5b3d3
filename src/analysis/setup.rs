// =============================================================================
// Setup text - ordered rules over the most recent annotated candle
// =============================================================================
//
// 1. Trend versus EMA 200 (always one line).
// 2. RSI extreme, if any.
// 3. MACD line versus signal (always one line).
// 4. Candle patterns, each independently.
//
// Missing indicator values never produce a bullish line: a missing EMA 200
// reads as bearish trend, a missing RSI adds nothing, and missing MACD values
// compare as zero.

use crate::indicators::rsi::{OVERBOUGHT, OVERSOLD};
use crate::market_data::AnnotatedCandle;

pub const NO_DATA: &str = "No data available";

pub fn generate_setup(candles: &[AnnotatedCandle]) -> String {
    let Some(last) = candles.last() else {
        return NO_DATA.to_string();
    };
    let ind = &last.indicators;
    let mut lines: Vec<&'static str> = Vec::with_capacity(5);

    if ind.ema_200.is_some_and(|ema| last.candle.close > ema) {
        lines.push("Bullish Trend (Price > EMA 200)");
    } else {
        lines.push("Bearish Trend (Price < EMA 200)");
    }

    match ind.rsi {
        Some(rsi) if rsi < OVERSOLD => lines.push("RSI Oversold (< 30) - Potential Long"),
        Some(rsi) if rsi > OVERBOUGHT => lines.push("RSI Overbought (> 70) - Potential Short"),
        _ => {}
    }

    if ind.macd.unwrap_or(0.0) > ind.macd_signal.unwrap_or(0.0) {
        lines.push("MACD Bullish Cross");
    } else {
        lines.push("MACD Bearish Cross");
    }

    if last.patterns.doji != 0 {
        lines.push("Candle Pattern: Doji (Indecision)");
    }
    match last.patterns.engulfing {
        e if e > 0 => lines.push("Candle Pattern: Bullish Engulfing"),
        e if e < 0 => lines.push("Candle Pattern: Bearish Engulfing"),
        _ => {}
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{Candle, IndicatorValues, PatternFlags};
    use crate::types::Timeframe;

    fn annotated(
        close: f64,
        indicators: IndicatorValues,
        patterns: PatternFlags,
    ) -> AnnotatedCandle {
        AnnotatedCandle {
            candle: Candle::new(
                "BTC/USDT",
                Timeframe::H4,
                0,
                close,
                close,
                close,
                close,
                1.0,
            ),
            indicators,
            patterns,
        }
    }

    #[test]
    fn empty_input() {
        assert_eq!(generate_setup(&[]), "No data available");
    }

    #[test]
    fn bullish_overbought_with_patterns() {
        let ind = IndicatorValues {
            rsi: Some(82.0),
            ema_200: Some(90.0),
            macd: Some(1.5),
            macd_signal: Some(1.0),
            ..IndicatorValues::default()
        };
        let flags = PatternFlags {
            doji: 1,
            engulfing: 1,
        };
        let text = generate_setup(&[annotated(100.0, ind, flags)]);
        assert_eq!(
            text,
            "Bullish Trend (Price > EMA 200)\n\
             RSI Overbought (> 70) - Potential Short\n\
             MACD Bullish Cross\n\
             Candle Pattern: Doji (Indecision)\n\
             Candle Pattern: Bullish Engulfing"
        );
    }

    #[test]
    fn bearish_oversold() {
        let ind = IndicatorValues {
            rsi: Some(21.0),
            ema_200: Some(120.0),
            macd: Some(-2.0),
            macd_signal: Some(-1.0),
            ..IndicatorValues::default()
        };
        let flags = PatternFlags {
            doji: 0,
            engulfing: -1,
        };
        let text = generate_setup(&[annotated(100.0, ind, flags)]);
        assert_eq!(
            text,
            "Bearish Trend (Price < EMA 200)\n\
             RSI Oversold (< 30) - Potential Long\n\
             MACD Bearish Cross\n\
             Candle Pattern: Bearish Engulfing"
        );
    }

    #[test]
    fn missing_values_read_as_bearish() {
        let bare = annotated(100.0, IndicatorValues::default(), PatternFlags::default());
        let text = generate_setup(&[bare]);
        assert_eq!(text, "Bearish Trend (Price < EMA 200)\nMACD Bearish Cross");
    }

    #[test]
    fn only_last_candle_matters() {
        let early = annotated(
            100.0,
            IndicatorValues {
                rsi: Some(10.0),
                ..IndicatorValues::default()
            },
            PatternFlags {
                doji: 1,
                engulfing: 0,
            },
        );
        let late = annotated(100.0, IndicatorValues::default(), PatternFlags::default());
        let text = generate_setup(&[early, late.clone()]);
        assert_eq!(text, generate_setup(&[late]));
    }

    #[test]
    fn deterministic() {
        let ind = IndicatorValues {
            rsi: Some(50.0),
            ema_200: Some(99.0),
            macd: Some(0.1),
            macd_signal: Some(0.2),
            ..IndicatorValues::default()
        };
        let seq = vec![annotated(100.0, ind, PatternFlags::default())];
        assert_eq!(generate_setup(&seq), generate_setup(&seq));
    }
}
