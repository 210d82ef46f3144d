use crate::core::metrics::{MetricError, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt::Formatter;
use std::str::FromStr;

const COUNTER_TYPE: &str = "counter";
const GAUGE_TYPE: &str = "gauge";

/// The kind of a metric, which is fixed once the metric has been created.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    /// An integer metric which accumulates the received deltas.
    #[display("counter")]
    Counter,
    /// A floating point metric of which the last received value wins.
    #[display("gauge")]
    Gauge,
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            COUNTER_TYPE => Ok(MetricKind::Counter),
            GAUGE_TYPE => Ok(MetricKind::Gauge),
            _ => Err(MetricError::UnknownKind(s.to_string())),
        }
    }
}

/// The typed value of a metric.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MetricValue {
    /// The delta or accumulated total of a counter.
    Counter(i64),
    /// The value of a gauge.
    Gauge(f64),
}

impl MetricValue {
    /// Returns the kind of metric this value belongs to.
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// Returns the counter value, or [None] when this is a gauge value.
    pub fn as_counter(&self) -> Option<i64> {
        match self {
            MetricValue::Counter(e) => Some(*e),
            MetricValue::Gauge(_) => None,
        }
    }

    /// Returns the gauge value, or [None] when this is a counter value.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Counter(_) => None,
            MetricValue::Gauge(e) => Some(*e),
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Counter(e) => write!(f, "{}", e),
            MetricValue::Gauge(e) => write!(f, "{}", e),
        }
    }
}

/// The unique identity of a metric within the store.
/// A metric id is only unique within its kind, a counter and gauge may share the same id.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("{}:{}", kind, id)]
pub struct MetricKey {
    pub kind: MetricKind,
    pub id: String,
}

impl MetricKey {
    pub fn new<S: Into<String>>(kind: MetricKind, id: S) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// A single named metric reading.
///
/// The metric is always valid, an invalid wire representation is rejected while converting
/// from its [MetricDto].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricDto", into = "MetricDto")]
pub struct Metric {
    id: String,
    value: MetricValue,
}

impl Metric {
    /// Create a new metric with the given id and value.
    pub fn new<S: Into<String>>(id: S, value: MetricValue) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    /// Create a new counter metric.
    pub fn counter<S: Into<String>>(id: S, delta: i64) -> Self {
        Self::new(id, MetricValue::Counter(delta))
    }

    /// Create a new gauge metric.
    pub fn gauge<S: Into<String>>(id: S, value: f64) -> Self {
        Self::new(id, MetricValue::Gauge(value))
    }

    /// Returns the id of the metric.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the kind of the metric.
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Returns the value of the metric.
    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    /// Returns the store key of the metric.
    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.kind(), self.id.clone())
    }

    /// Verify that the metric can be stored and serialized.
    /// A gauge needs a finite value, as JSON can't represent NaN or infinity.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(MetricError::MissingId);
        }
        if let MetricValue::Gauge(value) = self.value {
            if !value.is_finite() {
                return Err(MetricError::NonFinite(self.id.clone()));
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})={}", self.id, self.kind(), self.value)
    }
}

/// The wire representation of a metric, `{id, type, delta?, value?}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDto {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl TryFrom<MetricDto> for Metric {
    type Error = MetricError;

    fn try_from(dto: MetricDto) -> Result<Self> {
        if dto.id.trim().is_empty() {
            return Err(MetricError::MissingId);
        }
        if dto.kind.trim().is_empty() {
            return Err(MetricError::MissingKind(dto.id));
        }

        let kind = MetricKind::from_str(dto.kind.as_str())?;
        let value = match (kind, dto.delta, dto.value) {
            (MetricKind::Counter, Some(delta), _) => MetricValue::Counter(delta),
            (MetricKind::Gauge, _, Some(value)) => MetricValue::Gauge(value),
            (MetricKind::Counter, None, Some(_)) => {
                return Err(MetricError::KindMismatch {
                    id: dto.id,
                    expected: MetricKind::Counter,
                    actual: MetricKind::Gauge,
                })
            }
            (MetricKind::Gauge, Some(_), None) => {
                return Err(MetricError::KindMismatch {
                    id: dto.id,
                    expected: MetricKind::Gauge,
                    actual: MetricKind::Counter,
                })
            }
            (kind, None, None) => return Err(MetricError::MissingValue(dto.id, kind)),
        };

        let metric = Metric::new(dto.id, value);
        metric.validate()?;
        Ok(metric)
    }
}

impl From<Metric> for MetricDto {
    fn from(metric: Metric) -> Self {
        let kind = metric.kind().to_string();
        let (delta, value) = match metric.value {
            MetricValue::Counter(e) => (Some(e), None),
            MetricValue::Gauge(e) => (None, Some(e)),
        };

        Self {
            id: metric.id,
            kind,
            delta,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_from_str() {
        assert_eq!(MetricKind::Counter, MetricKind::from_str("counter").unwrap());
        assert_eq!(MetricKind::Gauge, MetricKind::from_str("gauge").unwrap());
        assert_eq!(
            MetricError::UnknownKind("histogram".to_string()),
            MetricKind::from_str("histogram").unwrap_err()
        );
    }

    #[test]
    fn test_metric_try_from_non_finite_gauge() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = Metric::try_from(MetricDto {
                id: "CPU".to_string(),
                kind: "gauge".to_string(),
                delta: None,
                value: Some(value),
            });

            assert_eq!(Err(MetricError::NonFinite("CPU".to_string())), result);
        }
    }

    #[test]
    fn test_metric_validate() {
        assert_eq!(Ok(()), Metric::gauge("Alloc", 2.5).validate());
        assert_eq!(Ok(()), Metric::counter("PollCount", -1).validate());
        assert_eq!(
            Err(MetricError::NonFinite("CPU".to_string())),
            Metric::gauge("CPU", f64::NAN).validate()
        );
        assert_eq!(Err(MetricError::MissingId), Metric::gauge(" ", 1.0).validate());
    }

    #[test]
    fn test_metric_value_display() {
        assert_eq!("42", MetricValue::Counter(42).to_string());
        assert_eq!("1.5", MetricValue::Gauge(1.5).to_string());
    }

    #[test]
    fn test_metric_serialize() {
        let metric = Metric::counter("PollCount", 5);

        let result = serde_json::to_string(&metric).unwrap();

        assert_eq!(r#"{"id":"PollCount","type":"counter","delta":5}"#, result);
    }

    #[test]
    fn test_metric_deserialize_gauge() {
        let result: Metric =
            serde_json::from_str(r#"{"id":"Alloc","type":"gauge","value":12.25}"#).unwrap();

        assert_eq!(Metric::gauge("Alloc", 12.25), result);
    }

    #[test]
    fn test_metric_try_from_missing_id() {
        let dto = MetricDto {
            id: "".to_string(),
            kind: "counter".to_string(),
            delta: Some(1),
            value: None,
        };

        let result = Metric::try_from(dto);

        assert_eq!(Err(MetricError::MissingId), result);
    }

    #[test]
    fn test_metric_try_from_missing_kind() {
        let dto = MetricDto {
            id: "lorem".to_string(),
            kind: "".to_string(),
            delta: Some(1),
            value: None,
        };

        let result = Metric::try_from(dto);

        assert_eq!(Err(MetricError::MissingKind("lorem".to_string())), result);
    }

    #[test]
    fn test_metric_try_from_kind_mismatch() {
        let dto = MetricDto {
            id: "ipsum".to_string(),
            kind: "counter".to_string(),
            delta: None,
            value: Some(2.0),
        };

        let result = Metric::try_from(dto);

        assert_eq!(
            Err(MetricError::KindMismatch {
                id: "ipsum".to_string(),
                expected: MetricKind::Counter,
                actual: MetricKind::Gauge,
            }),
            result
        );
    }

    #[test]
    fn test_metric_try_from_missing_value() {
        let dto = MetricDto {
            id: "dolor".to_string(),
            kind: "gauge".to_string(),
            delta: None,
            value: None,
        };

        let result = Metric::try_from(dto);

        assert_eq!(
            Err(MetricError::MissingValue(
                "dolor".to_string(),
                MetricKind::Gauge
            )),
            result
        );
    }

    #[test]
    fn test_metric_deserialize_invalid() {
        let result = serde_json::from_str::<Metric>(r#"{"id":"Alloc","type":"gauge"}"#);

        assert!(result.is_err(), "expected the metric to be rejected");
    }
}
