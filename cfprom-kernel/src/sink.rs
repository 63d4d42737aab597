//! Metric sink: labeled gauges scraped through `/metrics`
//!
//! The sink owns its own registry; clones share it. Writes come from the
//! monitoring task, reads from request handlers.

use crate::models::MetricSample;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

pub const LABELS: [&str; 4] = ["org", "space", "app", "instance_index"];
pub const CPU_METRIC: &str = "cpu_usage";
pub const MEM_METRIC: &str = "mem_usage";

#[derive(Clone)]
pub struct MetricSink {
    registry: Registry,
    cpu: GaugeVec,
    mem: GaugeVec,
}

impl MetricSink {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cpu = GaugeVec::new(Opts::new(CPU_METRIC, "CPU usage"), &LABELS)?;
        let mem = GaugeVec::new(Opts::new(MEM_METRIC, "Memory usage"), &LABELS)?;
        registry.register(Box::new(cpu.clone()))?;
        registry.register(Box::new(mem.clone()))?;

        Ok(Self { registry, cpu, mem })
    }

    /// Replace the values of one label set
    pub fn upsert(&self, sample: &MetricSample) {
        let labels = [
            sample.org.as_str(),
            sample.space.as_str(),
            sample.app.as_str(),
            sample.instance_index.as_str(),
        ];
        self.cpu.with_label_values(&labels).set(sample.cpu_percent);
        self.mem.with_label_values(&labels).set(sample.mem_bytes);
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        into_text(buffer)
    }

    /// Number of label sets currently exported
    #[cfg(test)]
    pub fn sample_count(&self) -> usize {
        self.registry
            .gather()
            .iter()
            .find(|family| family.get_name() == CPU_METRIC)
            .map(|family| family.get_metric().len())
            .unwrap_or(0)
    }

    /// Current value of a gauge for one label set, without creating it
    #[cfg(test)]
    pub fn value(&self, metric: &str, labels: [&str; 4]) -> Option<f64> {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == metric)
            .flat_map(|family| family.get_metric().iter())
            .find(|m| {
                LABELS.iter().zip(labels.iter()).all(|(name, value)| {
                    m.get_label()
                        .iter()
                        .any(|pair| pair.get_name() == *name && pair.get_value() == *value)
                })
            })
            .map(|m| m.get_gauge().get_value())
    }

    /// Label values of every exported series, as (org, space, app, instance_index)
    #[cfg(test)]
    pub fn label_sets(&self) -> Vec<[String; 4]> {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == CPU_METRIC)
            .flat_map(|family| family.get_metric().iter())
            .map(|m| {
                LABELS.map(|name| {
                    m.get_label()
                        .iter()
                        .find(|pair| pair.get_name() == name)
                        .map(|pair| pair.get_value().to_string())
                        .unwrap_or_default()
                })
            })
            .collect()
    }
}

fn into_text(buffer: Vec<u8>) -> Result<String, prometheus::Error> {
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("exposition is not UTF-8: {e}")))
}
