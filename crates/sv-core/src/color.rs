//! Scalar-to-colour interpolation over a fixed palette.
//!
//! A value inside `[min, max]` is mapped onto the palette's stop positions
//! `0..=len-1`, then each channel is linearly interpolated between the two
//! neighbouring stops and quantized to 8 bits.

use crate::{CoreError, CoreResult};

/// 8-bit RGB colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`, lower-case.
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hex())
    }
}

/// Ordered, immutable list of RGB stops with components in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    stops: Vec<[f64; 3]>,
}

impl Palette {
    /// Blue, green, lighter green, orange, red.
    pub const COLD_TO_HOT: [[f64; 3]; 5] = [
        [0.0, 0.0, 1.0],
        [0.0, 0.5, 0.0],
        [0.0, 1.0, 0.0],
        [1.0, 0.5, 0.0],
        [1.0, 0.0, 0.0],
    ];

    pub fn new(stops: Vec<[f64; 3]>) -> CoreResult<Self> {
        if stops.len() < 2 {
            return Err(CoreError::InvalidPalette {
                what: format!("need at least 2 stops, got {}", stops.len()),
            });
        }
        for (i, stop) in stops.iter().enumerate() {
            if stop.iter().any(|c| !c.is_finite() || *c < 0.0 || *c > 1.0) {
                return Err(CoreError::InvalidPalette {
                    what: format!("stop {i} has a component outside [0, 1]: {stop:?}"),
                });
            }
        }
        Ok(Self { stops })
    }

    pub fn cold_to_hot() -> Self {
        Self {
            stops: Self::COLD_TO_HOT.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// Always false; a palette has at least two stops.
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn stops(&self) -> &[[f64; 3]] {
        &self.stops
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::cold_to_hot()
    }
}

/// One legend entry of a colorbar.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ColorbarEntry {
    pub value: f64,
    pub color: Rgb,
}

/// Piecewise linear colour ramp over a [`Palette`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColorRamp {
    palette: Palette,
}

impl ColorRamp {
    /// Number of legend entries produced by [`ColorRamp::colorbar`].
    pub const COLORBAR_STEPS: usize = 10;

    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Fractional palette position of `value`, in stop units.
    ///
    /// Not clamped: values outside `[min, max]` land before stop 0 or past
    /// the last stop.
    pub fn position(&self, value: f64, min: f64, max: f64) -> CoreResult<f64> {
        for (what, v) in [("value", value), ("min", min), ("max", max)] {
            if !v.is_finite() {
                return Err(CoreError::NonFinite { what, value: v });
            }
        }
        if max <= min {
            return Err(CoreError::DegenerateRange { min, max });
        }
        let max_index = (self.palette.len() - 1) as f64;
        let span = max - min;
        let fraction = if span.is_finite() {
            (value - min) / span
        } else {
            // span exceeds f64::MAX; halving is exact for normal values
            (value / 2.0 - min / 2.0) / (max / 2.0 - min / 2.0)
        };
        let position = fraction * max_index;
        if !position.is_finite() {
            return Err(CoreError::NonFinite {
                what: "palette position",
                value: position,
            });
        }
        Ok(position)
    }

    /// Colour for `value` within `[min, max]`.
    ///
    /// The stop index is clamped to the palette, the interpolation weight is
    /// taken from the unclamped position.
    pub fn color(&self, value: f64, min: f64, max: f64) -> CoreResult<Rgb> {
        let fraction = self.position(value, min, max)?;
        let stops = self.palette.stops();
        let last = stops.len() - 1;

        let whole = fraction.floor();
        let weight = fraction - whole;
        let index = (whole.max(0.0) as usize).min(last);

        let lo = stops[index];
        let hi = stops[(index + 1).min(last)];
        let channel = |k: usize| quantize(lo[k] + weight * (hi[k] - lo[k]));

        Ok(Rgb::new(channel(0), channel(1), channel(2)))
    }

    /// First stop, quantized.
    pub fn bottom(&self) -> Rgb {
        stop_rgb(self.palette.stops()[0])
    }

    /// Last stop, quantized.
    pub fn top(&self) -> Rgb {
        let stops = self.palette.stops();
        stop_rgb(stops[stops.len() - 1])
    }

    /// Legend from highest to lowest: nine even steps from `min`, then `max`.
    pub fn colorbar(&self, min: f64, max: f64) -> CoreResult<Vec<ColorbarEntry>> {
        let intervals = (Self::COLORBAR_STEPS - 1) as f64;
        let mut values: Vec<f64> = (0..Self::COLORBAR_STEPS - 1)
            .map(|i| {
                let t = i as f64 / intervals;
                // finite for any finite min and max
                min * (1.0 - t) + max * t
            })
            .collect();
        values.push(max);
        values.reverse();

        values
            .into_iter()
            .map(|value| {
                Ok(ColorbarEntry {
                    value,
                    color: self.color(value, min, max)?,
                })
            })
            .collect()
    }
}

fn quantize(channel: f64) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).floor() as u8
}

fn stop_rgb(stop: [f64; 3]) -> Rgb {
    Rgb::new(quantize(stop[0]), quantize(stop[1]), quantize(stop[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn endpoints_match_first_and_last_stop() {
        let ramp = ColorRamp::default();
        assert_eq!(ramp.color(10.0, 10.0, 50.0).unwrap().hex(), "#0000ff");
        assert_eq!(ramp.color(50.0, 10.0, 50.0).unwrap().hex(), "#ff0000");
        assert_eq!(ramp.bottom(), ramp.color(10.0, 10.0, 50.0).unwrap());
        assert_eq!(ramp.top(), ramp.color(50.0, 10.0, 50.0).unwrap());
    }

    #[test]
    fn interior_stops_are_hit_exactly() {
        let ramp = ColorRamp::default();
        // 0.5 * 255 truncates to 127
        assert_eq!(ramp.color(1.0, 0.0, 4.0).unwrap().hex(), "#007f00");
        assert_eq!(ramp.color(2.0, 0.0, 4.0).unwrap().hex(), "#00ff00");
        assert_eq!(ramp.color(3.0, 0.0, 4.0).unwrap().hex(), "#ff7f00");
    }

    #[test]
    fn interpolates_between_neighbouring_stops() {
        let ramp = ColorRamp::default();
        // halfway between blue and dark green: (0, 0.25, 0.5)
        let c = ramp.color(0.5, 0.0, 4.0).unwrap();
        assert_eq!(c, Rgb::new(0, 63, 127));
    }

    #[test]
    fn degenerate_range_is_rejected() {
        let ramp = ColorRamp::default();
        let err = ramp.color(3.0, 3.0, 3.0).unwrap_err();
        assert!(matches!(err, CoreError::DegenerateRange { .. }));
        assert!(ramp.color(1.0, 5.0, 2.0).is_err());
    }

    #[test]
    fn non_finite_inputs_are_rejected() {
        let ramp = ColorRamp::default();
        let err = ramp.color(f64::NAN, 0.0, 1.0).unwrap_err();
        assert!(format!("{err}").contains("Non-finite"));
    }

    #[test]
    fn out_of_range_values_never_index_past_the_palette() {
        let ramp = ColorRamp::default();
        assert_eq!(ramp.color(100.0, 0.0, 1.0).unwrap(), ramp.top());
        assert!(ramp.color(-100.0, 0.0, 1.0).is_ok());
    }

    #[test]
    fn palette_validation() {
        assert!(Palette::new(vec![[0.0, 0.0, 0.0]]).is_err());
        assert!(Palette::new(vec![[0.0, 0.0, 0.0], [1.2, 0.0, 0.0]]).is_err());
        let two = Palette::new(vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]).unwrap();
        let ramp = ColorRamp::new(two);
        assert_eq!(ramp.color(0.5, 0.0, 1.0).unwrap(), Rgb::new(127, 127, 127));
    }

    #[test]
    fn colorbar_runs_from_highest_to_lowest() {
        let ramp = ColorRamp::default();
        let bar = ramp.colorbar(0.0, 9.0).unwrap();
        assert_eq!(bar.len(), ColorRamp::COLORBAR_STEPS);
        assert_eq!(bar[0].value, 9.0);
        assert_eq!(bar[0].color, ramp.top());
        assert_eq!(bar[9].value, 0.0);
        assert_eq!(bar[9].color, ramp.bottom());
        assert!(bar.windows(2).all(|w| w[0].value >= w[1].value));
    }

    #[test]
    fn spans_beyond_f64_max_stay_on_the_palette() {
        let ramp = ColorRamp::default();
        let (min, max) = (-1.0e308, 1.0e308);
        assert_eq!(ramp.position(0.0, min, max).unwrap(), 2.0);
        assert_eq!(ramp.color(max, min, max).unwrap(), ramp.top());
        assert_eq!(ramp.color(min, min, max).unwrap(), ramp.bottom());
        assert_eq!(ramp.color(0.0, min, max).unwrap(), Rgb::new(0, 255, 0));

        let bar = ramp.colorbar(-f64::MAX, f64::MAX).unwrap();
        assert_eq!(bar.len(), ColorRamp::COLORBAR_STEPS);
        assert_eq!(bar[0].color, ramp.top());
        assert_eq!(bar[9].color, ramp.bottom());
        assert!(bar.iter().all(|entry| entry.value.is_finite()));
    }

    #[test]
    fn overflowing_position_is_non_finite() {
        let ramp = ColorRamp::default();
        let err = ramp.position(f64::MAX, -f64::MAX, -f64::MAX / 2.0).unwrap_err();
        assert!(matches!(err, CoreError::NonFinite { .. }));
    }

    proptest! {
        #[test]
        fn position_is_monotonic(
            min in -1.0e6_f64..1.0e6,
            span in 1.0e-3_f64..1.0e6,
            a in 0.0_f64..1.0,
            b in 0.0_f64..1.0,
        ) {
            let ramp = ColorRamp::default();
            let max = min + span;
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let v_lo = min + lo * span;
            let v_hi = min + hi * span;
            let p_lo = ramp.position(v_lo, min, max).unwrap();
            let p_hi = ramp.position(v_hi, min, max).unwrap();
            prop_assert!(p_lo <= p_hi);
        }

        #[test]
        fn color_is_deterministic(value in 0.0_f64..1.0) {
            let ramp = ColorRamp::default();
            prop_assert_eq!(ramp.color(value, 0.0, 1.0).unwrap(), ramp.color(value, 0.0, 1.0).unwrap());
        }

        #[test]
        fn range_endpoints_map_to_end_stops(min in -1.0e6_f64..1.0e6, span in 1.0e-3_f64..1.0e6) {
            let ramp = ColorRamp::default();
            let max = min + span;
            prop_assert_eq!(ramp.color(min, min, max).unwrap(), ramp.bottom());
            prop_assert_eq!(ramp.color(max, min, max).unwrap(), ramp.top());
        }
    }
}
