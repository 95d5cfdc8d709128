//! Negligence report forwarding
//!
//! The service hands every report to a [`NegligenceReporter`]. Two sinks exist:
//! - [`BusReporter`] publishes to `negligenceReports/{courier}` (QoS 1)
//! - [`JournalReporter`] appends one JSON object per line to a local file
//!
//! [`ReporterSet`] fans a report out to every configured sink.

use crate::domain::NegligenceReport;
use crate::io::bus::BusSender;
use crate::io::messages::negligence_topic;
use rumqttc::QoS;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("bus rejected negligence report")]
    BusUnavailable,
    #[error("failed to write report journal {path}: {source}")]
    Journal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait NegligenceReporter: Send {
    fn report(&mut self, report: &NegligenceReport) -> Result<(), ReportError>;
}

pub struct BusReporter {
    bus: BusSender,
}

impl BusReporter {
    pub fn new(bus: BusSender) -> Self {
        Self { bus }
    }
}

impl NegligenceReporter for BusReporter {
    fn report(&mut self, report: &NegligenceReport) -> Result<(), ReportError> {
        let topic = negligence_topic(report.negligent());
        if self.bus.publish_json(topic, report, QoS::AtLeastOnce) {
            Ok(())
        } else {
            Err(ReportError::BusUnavailable)
        }
    }
}

/// Append-only JSONL journal of negligence reports
pub struct JournalReporter {
    path: PathBuf,
}

impl JournalReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!(file_path = %path.display(), "report_journal_initialized");
        Self { path }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        debug!(file = %self.path.display(), bytes = %line.len(), "report_journal_written");
        Ok(())
    }
}

impl NegligenceReporter for JournalReporter {
    fn report(&mut self, report: &NegligenceReport) -> Result<(), ReportError> {
        self.append_line(&report.to_json())
            .map_err(|source| ReportError::Journal { path: self.path.clone(), source })
    }
}

/// Fan-out over every configured sink; one failing sink does not stop the others
#[derive(Default)]
pub struct ReporterSet {
    sinks: Vec<Box<dyn NegligenceReporter>>,
}

impl ReporterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl NegligenceReporter + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NegligenceReporter for ReporterSet {
    fn report(&mut self, report: &NegligenceReport) -> Result<(), ReportError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.report(report) {
                error!(report_id = %report.id(), error = %e, "negligence_report_sink_failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{CourierId, OrderId, SensorSnapshot};
    use crate::infra::metrics::Metrics;
    use crate::io::bus::{create_bus_channel, BusMessage};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn report() -> NegligenceReport {
        NegligenceReport::new(
            CourierId::new("mario"),
            OrderId::new("1017"),
            SensorSnapshot { proximity: 12.0, angles: None, camera_bytes: 64 },
        )
    }

    #[test]
    fn test_bus_reporter_topic() {
        let (bus, mut rx) = create_bus_channel(4, Arc::new(Metrics::new()));
        let mut reporter = BusReporter::new(bus);
        let report = report();
        reporter.report(&report).unwrap();

        match rx.try_recv().unwrap() {
            BusMessage::Publish { topic, payload, qos } => {
                assert_eq!(topic, "negligenceReports/mario");
                assert_eq!(qos, QoS::AtLeastOnce);
                let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
                assert_eq!(json["id"], report.id());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_journal_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("reports.jsonl");
        let mut journal = JournalReporter::new(&path);

        journal.report(&report()).unwrap();
        journal.report(&report()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["negligent"], "mario");
        assert_eq!(parsed["orderId"], "1017");
    }

    #[test]
    fn test_set_continues_after_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports.jsonl");
        let metrics = Arc::new(Metrics::new());
        let (bus, rx) = create_bus_channel(4, metrics);
        drop(rx);

        let mut set = ReporterSet::new().with(BusReporter::new(bus)).with(JournalReporter::new(&path));
        assert!(matches!(set.report(&report()), Err(ReportError::BusUnavailable)));
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
