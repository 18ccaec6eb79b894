//! Easing functions for interpolation
//!
//! Every curve has the signature `(initial, distance, duration, elapsed)` and
//! satisfies `f(0) = initial` and `f(duration) = initial + distance`.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Easing direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    #[default]
    EaseOut,
    EaseIn,
    EaseInOut,
}

impl Transition {
    pub const ALL: [Transition; 3] = [Transition::EaseOut, Transition::EaseIn, Transition::EaseInOut];
}

/// Easing curve shape
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    /// Same curve for every transition
    Linear,
    #[default]
    Quadratic,
    Sine,
}

impl Style {
    pub const ALL: [Style; 3] = [Style::Linear, Style::Quadratic, Style::Sine];
}

/// `(initial, distance, duration, elapsed) -> value`
pub type EasingFn = fn(f64, f64, f64, f64) -> f64;

/// A (transition, style) pair, ease-out quadratic by default
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Easing {
    #[serde(default)]
    pub transition: Transition,
    #[serde(default)]
    pub style: Style,
}

impl Easing {
    pub const fn new(transition: Transition, style: Style) -> Self {
        Self { transition, style }
    }

    /// The curve for this pair
    pub fn function(self) -> EasingFn {
        match (self.style, self.transition) {
            (Style::Linear, _) => linear,
            (Style::Quadratic, Transition::EaseOut) => quad_ease_out,
            (Style::Quadratic, Transition::EaseIn) => quad_ease_in,
            (Style::Quadratic, Transition::EaseInOut) => quad_ease_in_out,
            (Style::Sine, Transition::EaseOut) => sine_ease_out,
            (Style::Sine, Transition::EaseIn) => sine_ease_in,
            (Style::Sine, Transition::EaseInOut) => sine_ease_in_out,
        }
    }

    /// Evaluate the curve
    pub fn apply(self, initial: f64, distance: f64, duration: f64, elapsed: f64) -> f64 {
        (self.function())(initial, distance, duration, elapsed)
    }
}

pub fn linear(b: f64, c: f64, d: f64, t: f64) -> f64 {
    c * t / d + b
}

pub fn quad_ease_out(b: f64, c: f64, d: f64, t: f64) -> f64 {
    let t = t / d;
    -c * t * (t - 2.0) + b
}

pub fn quad_ease_in(b: f64, c: f64, d: f64, t: f64) -> f64 {
    let t = t / d;
    c * t * t + b
}

pub fn quad_ease_in_out(b: f64, c: f64, d: f64, t: f64) -> f64 {
    let t = t / (d / 2.0);
    if t < 1.0 {
        return c / 2.0 * t * t + b;
    }

    let t = t - 1.0;
    -c / 2.0 * (t * (t - 2.0) - 1.0) + b
}

pub fn sine_ease_out(b: f64, c: f64, d: f64, t: f64) -> f64 {
    c * (t / d * FRAC_PI_2).sin() + b
}

pub fn sine_ease_in(b: f64, c: f64, d: f64, t: f64) -> f64 {
    -c * (t / d * FRAC_PI_2).cos() + c + b
}

pub fn sine_ease_in_out(b: f64, c: f64, d: f64, t: f64) -> f64 {
    -c / 2.0 * ((PI * t / d).cos() - 1.0) + b
}
