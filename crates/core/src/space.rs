//! Tunable parameter spaces and configurations.
//!
//! A [`ParameterSpace`] declares typed, bounded parameters. Every
//! [`Configuration`] produced through a space (sampling, clamping,
//! interpolation, denormalization) satisfies it.

use crate::{AgentuneError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value
    Int(i64),
    /// Continuous value
    Float(f64),
    /// Categorical choice
    Choice(String),
}

impl ParamValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Choice(_) => None,
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Choice(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Choice(v)
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{:.4}", v),
            ParamValue::Choice(v) => f.write_str(v),
        }
    }
}

/// Type and domain of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Integer in `[min, max]`
    Integer {
        /// Lower bound
        min: i64,
        /// Upper bound
        max: i64,
    },
    /// Real number in `[min, max]`
    Continuous {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },
    /// One of a fixed set of choices
    Categorical {
        /// Allowed values
        choices: Vec<String>,
    },
}

/// A named, typed, bounded parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name
    pub name: String,
    /// Domain
    #[serde(flatten)]
    pub kind: ParameterKind,
}

impl ParameterSpec {
    /// Integer parameter.
    pub fn integer(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Integer { min, max },
        }
    }

    /// Continuous parameter.
    pub fn continuous(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Continuous { min, max },
        }
    }

    /// Categorical parameter.
    pub fn categorical<S: Into<String>>(name: impl Into<String>, choices: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Categorical {
                choices: choices.into_iter().map(Into::into).collect(),
            },
        }
    }

    /// Check that the declared domain is well formed.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| AgentuneError::InvalidBounds {
            param: self.name.clone(),
            reason: reason.to_string(),
        };

        match &self.kind {
            ParameterKind::Integer { min, max } => {
                if min > max {
                    return Err(invalid("min is greater than max"));
                }
            }
            ParameterKind::Continuous { min, max } => {
                if !min.is_finite() || !max.is_finite() {
                    return Err(invalid("bounds must be finite"));
                }
                if min > max {
                    return Err(invalid("min is greater than max"));
                }
            }
            ParameterKind::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(invalid("no choices declared"));
                }
            }
        }
        Ok(())
    }

    /// Draw a uniformly random value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match &self.kind {
            ParameterKind::Integer { min, max } => ParamValue::Int(rng.gen_range(*min..=*max)),
            ParameterKind::Continuous { min, max } => ParamValue::Float(rng.gen_range(*min..=*max)),
            ParameterKind::Categorical { choices } => {
                ParamValue::Choice(choices[rng.gen_range(0..choices.len())].clone())
            }
        }
    }

    /// Whether `value` lies in the domain.
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (&self.kind, value) {
            (ParameterKind::Integer { min, max }, ParamValue::Int(v)) => v >= min && v <= max,
            (ParameterKind::Continuous { min, max }, ParamValue::Float(v)) => {
                v.is_finite() && v >= min && v <= max
            }
            (ParameterKind::Categorical { choices }, ParamValue::Choice(v)) => choices.contains(v),
            _ => false,
        }
    }

    /// Coerce `value` into the domain.
    ///
    /// Numbers are rounded/converted to the declared type and clamped; an
    /// unknown or non-categorical value maps to the first choice.
    pub fn clamp(&self, value: &ParamValue) -> ParamValue {
        match &self.kind {
            ParameterKind::Integer { min, max } => {
                let v = value
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .map(|v| v.round() as i64)
                    .unwrap_or(*min);
                ParamValue::Int(v.clamp(*min, *max))
            }
            ParameterKind::Continuous { min, max } => {
                let v = value.as_f64().filter(|v| v.is_finite()).unwrap_or(*min);
                ParamValue::Float(v.clamp(*min, *max))
            }
            ParameterKind::Categorical { choices } => match value {
                ParamValue::Choice(c) if choices.contains(c) => value.clone(),
                _ => ParamValue::Choice(choices[0].clone()),
            },
        }
    }

    /// Map a value to `[0, 1]`.
    pub fn normalize(&self, value: &ParamValue) -> f64 {
        let value = self.clamp(value);
        match (&self.kind, &value) {
            (ParameterKind::Integer { min, max }, ParamValue::Int(v)) => {
                if max == min {
                    0.0
                } else {
                    (*v as i128 - *min as i128) as f64 / (*max as i128 - *min as i128) as f64
                }
            }
            (ParameterKind::Continuous { min, max }, ParamValue::Float(v)) => {
                if max == min {
                    0.0
                } else {
                    (v - min) / (max - min)
                }
            }
            (ParameterKind::Categorical { choices }, ParamValue::Choice(c)) => {
                if choices.len() < 2 {
                    0.0
                } else {
                    let idx = choices.iter().position(|x| x == c).unwrap_or(0);
                    idx as f64 / (choices.len() - 1) as f64
                }
            }
            _ => 0.0,
        }
    }

    /// Map a `[0, 1]` coordinate back into the domain.
    pub fn denormalize(&self, x: f64) -> ParamValue {
        let x = if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 };
        match &self.kind {
            ParameterKind::Integer { min, max } => {
                let (lo, hi) = (*min as i128, *max as i128);
                let v = (lo + (x * (hi - lo) as f64).round() as i128).clamp(lo, hi);
                ParamValue::Int(v as i64)
            }
            ParameterKind::Continuous { min, max } => {
                ParamValue::Float((min * (1.0 - x) + max * x).clamp(*min, *max))
            }
            ParameterKind::Categorical { choices } => {
                let idx = (x * (choices.len() - 1) as f64).round() as usize;
                ParamValue::Choice(choices[idx.min(choices.len() - 1)].clone())
            }
        }
    }
}

/// Named parameter→value map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(BTreeMap<String, ParamValue>);

impl Configuration {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Set a value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Get a value.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Numeric value of a parameter.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(ParamValue::as_f64)
    }

    /// Integer value of a parameter.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Categorical value of a parameter.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ParamValue::Choice(v)) => Some(v),
            _ => None,
        }
    }

    /// Iterate over (name, value) pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the configuration is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// A declared set of tunable parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    params: Vec<ParameterSpec>,
}

impl ParameterSpace {
    /// Create a space, validating every spec and rejecting duplicate names.
    pub fn new(params: Vec<ParameterSpec>) -> Result<Self> {
        let mut seen = HashSet::new();
        for spec in &params {
            spec.validate()?;
            if !seen.insert(spec.name.clone()) {
                return Err(AgentuneError::InvalidBounds {
                    param: spec.name.clone(),
                    reason: "declared twice".to_string(),
                });
            }
        }
        Ok(Self { params })
    }

    /// Declared parameters, in declaration order.
    pub fn params(&self) -> &[ParameterSpec] {
        &self.params
    }

    /// Look up a parameter.
    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the space declares no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Draw a uniformly random configuration.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Configuration {
        let mut config = Configuration::new();
        for spec in &self.params {
            config.set(spec.name.clone(), spec.sample(rng));
        }
        config
    }

    /// Configuration at the middle of every domain.
    pub fn center(&self) -> Configuration {
        self.denormalize(&vec![0.5; self.params.len()])
    }

    /// Check that `config` assigns an in-domain value to every parameter.
    pub fn validate(&self, config: &Configuration) -> Result<()> {
        for spec in &self.params {
            match config.get(&spec.name) {
                None => {
                    return Err(AgentuneError::InvalidBounds {
                        param: spec.name.clone(),
                        reason: "missing value".to_string(),
                    })
                }
                Some(v) if !spec.contains(v) => {
                    return Err(AgentuneError::InvalidBounds {
                        param: spec.name.clone(),
                        reason: format!("value {} out of domain", v),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Coerce `config` into the space; missing parameters take the center.
    pub fn clamp(&self, config: &Configuration) -> Configuration {
        let mut out = Configuration::new();
        for spec in &self.params {
            let value = match config.get(&spec.name) {
                Some(v) => spec.clamp(v),
                None => spec.denormalize(0.5),
            };
            out.set(spec.name.clone(), value);
        }
        out
    }

    /// Unit-cube coordinates of `config`; missing parameters map to 0.5.
    pub fn normalize(&self, config: &Configuration) -> Vec<f64> {
        self.params
            .iter()
            .map(|spec| config.get(&spec.name).map(|v| spec.normalize(v)).unwrap_or(0.5))
            .collect()
    }

    /// Configuration at unit-cube coordinates `x`.
    pub fn denormalize(&self, x: &[f64]) -> Configuration {
        let mut config = Configuration::new();
        for (i, spec) in self.params.iter().enumerate() {
            config.set(spec.name.clone(), spec.denormalize(x.get(i).copied().unwrap_or(0.5)));
        }
        config
    }
}

/// Normalized distance between two configurations, in `[0, 1]`.
///
/// Root-mean-square of per-parameter differences on the unit cube; a
/// categorical parameter contributes 0 when equal and 1 otherwise.
pub fn config_distance(a: &Configuration, b: &Configuration, space: &ParameterSpace) -> f64 {
    if space.is_empty() {
        return 0.0;
    }

    let sum: f64 = space
        .params()
        .iter()
        .map(|spec| {
            let va = a.get(&spec.name).map(|v| spec.clamp(v));
            let vb = b.get(&spec.name).map(|v| spec.clamp(v));
            match (&spec.kind, va, vb) {
                (_, None, None) => 0.0,
                (_, None, Some(_)) | (_, Some(_), None) => 1.0,
                (ParameterKind::Categorical { .. }, Some(x), Some(y)) => {
                    if x == y {
                        0.0
                    } else {
                        1.0
                    }
                }
                (_, Some(x), Some(y)) => {
                    let d = spec.normalize(&x) - spec.normalize(&y);
                    d * d
                }
            }
        })
        .sum();

    (sum / space.len() as f64).sqrt()
}

/// Blend two configurations: `t = 0` gives `a`, `t = 1` gives `b`.
///
/// Numeric parameters are interpolated linearly (integers rounded);
/// categorical parameters take `a`'s value for `t < 0.5` and `b`'s otherwise.
pub fn interpolate_configs(
    a: &Configuration,
    b: &Configuration,
    t: f64,
    space: &ParameterSpace,
) -> Configuration {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let xa = space.normalize(a);
    let xb = space.normalize(b);

    let mut out = Configuration::new();
    for (i, spec) in space.params().iter().enumerate() {
        let value = match spec.kind {
            ParameterKind::Categorical { .. } => {
                let source = if t < 0.5 { a } else { b };
                source
                    .get(&spec.name)
                    .map(|v| spec.clamp(v))
                    .unwrap_or_else(|| spec.denormalize(0.5))
            }
            _ => spec.denormalize(xa[i] + (xb[i] - xa[i]) * t),
        };
        out.set(spec.name.clone(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParameterSpec::integer("worker_pool", 4, 32),
            ParameterSpec::continuous("memory_threshold", 0.6, 0.9),
            ParameterSpec::categorical("queue_strategy", ["fifo", "priority", "fair"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_invalid_specs_are_rejected() {
        assert!(ParameterSpace::new(vec![ParameterSpec::integer("a", 5, 1)]).is_err());
        assert!(ParameterSpace::new(vec![ParameterSpec::continuous("a", 0.0, f64::INFINITY)]).is_err());
        assert!(ParameterSpace::new(vec![ParameterSpec::categorical::<&str>("a", [])]).is_err());
        let dup = ParameterSpace::new(vec![
            ParameterSpec::integer("a", 0, 1),
            ParameterSpec::integer("a", 0, 2),
        ]);
        assert!(matches!(dup, Err(AgentuneError::InvalidBounds { .. })));
    }

    #[test]
    fn test_full_range_integer_spec() {
        let spec = ParameterSpec::integer("offset", i64::MIN, i64::MAX);
        spec.validate().unwrap();
        assert_eq!(spec.normalize(&ParamValue::Int(i64::MIN)), 0.0);
        assert_eq!(spec.normalize(&ParamValue::Int(i64::MAX)), 1.0);
        assert_eq!(spec.denormalize(0.0), ParamValue::Int(i64::MIN));
        assert_eq!(spec.denormalize(1.0), ParamValue::Int(i64::MAX));
    }

    #[test]
    fn test_sample_is_valid() {
        let space = space();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let config = space.sample(&mut rng);
            space.validate(&config).unwrap();
        }
    }

    #[test]
    fn test_validate_reports_missing_and_out_of_range() {
        let space = space();
        let config = Configuration::new().with("worker_pool", 8);
        assert!(space.validate(&config).is_err());

        let config = space.center().with("worker_pool", 64);
        assert!(space.validate(&config).is_err());
    }

    #[test]
    fn test_clamp_coerces_types() {
        let space = space();
        let config = Configuration::new()
            .with("worker_pool", 7.6)
            .with("memory_threshold", 2.0)
            .with("queue_strategy", "lifo");
        let clamped = space.clamp(&config);
        assert_eq!(clamped.get_i64("worker_pool"), Some(8));
        assert_eq!(clamped.get_f64("memory_threshold"), Some(0.9));
        assert_eq!(clamped.get_str("queue_strategy"), Some("fifo"));
    }

    #[test]
    fn test_distance_and_interpolation() {
        let space = space();
        let a = Configuration::new()
            .with("worker_pool", 4)
            .with("memory_threshold", 0.6)
            .with("queue_strategy", "fifo");
        let b = Configuration::new()
            .with("worker_pool", 32)
            .with("memory_threshold", 0.9)
            .with("queue_strategy", "fair");

        assert_eq!(config_distance(&a, &a, &space), 0.0);
        assert!((config_distance(&a, &b, &space) - 1.0).abs() < 1e-9);

        let mid = interpolate_configs(&a, &b, 0.5, &space);
        assert_eq!(mid.get_i64("worker_pool"), Some(18));
        assert!((mid.get_f64("memory_threshold").unwrap() - 0.75).abs() < 1e-9);
        assert_eq!(mid.get_str("queue_strategy"), Some("fair"));

        assert_eq!(interpolate_configs(&a, &b, 0.0, &space), a);
        assert_eq!(interpolate_configs(&a, &b, 1.0, &space), b);
    }

    proptest! {
        #[test]
        fn prop_interpolation_stays_in_bounds(seed in any::<u64>(), t in -1.0f64..2.0) {
            let space = space();
            let mut rng = StdRng::seed_from_u64(seed);
            let a = space.sample(&mut rng);
            let b = space.sample(&mut rng);
            let c = interpolate_configs(&a, &b, t, &space);
            prop_assert!(space.validate(&c).is_ok());
            let d = config_distance(&a, &c, &space);
            prop_assert!((0.0..=1.0).contains(&d));
        }

        #[test]
        fn prop_denormalize_is_valid(xs in proptest::collection::vec(-0.5f64..1.5, 3)) {
            let space = space();
            prop_assert!(space.validate(&space.denormalize(&xs)).is_ok());
        }
    }
}
