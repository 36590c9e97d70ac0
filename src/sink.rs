//! Publish sink used by collectors to emit samples.
//!
//! Collectors publish bare metric names (`web`, `node0.numa_hit`); the host
//! decides how names are qualified and where samples end up.

/// Receiver of `(metric name, value)` pairs.
pub trait MetricSink {
    fn publish(&mut self, name: &str, value: f64);
}

/// One published sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: f64,
}

/// In-memory sink keeping samples in publish order.
#[derive(Debug, Clone, Default)]
pub struct Samples {
    samples: Vec<Sample>,
}

impl Samples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Last value published under `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.samples
            .iter()
            .rev()
            .find(|s| s.name == name)
            .map(|s| s.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

impl MetricSink for Samples {
    fn publish(&mut self, name: &str, value: f64) {
        self.samples.push(Sample {
            name: name.to_string(),
            value,
        });
    }
}

impl IntoIterator for Samples {
    type Item = Sample;
    type IntoIter = std::vec::IntoIter<Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

impl<F> MetricSink for F
where
    F: FnMut(&str, f64),
{
    fn publish(&mut self, name: &str, value: f64) {
        self(name, value)
    }
}
