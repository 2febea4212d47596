//! Per-test results, their collection across contexts, and rollups.
//!
//! A [`QcResult`] covers the samples of one stream that fell inside one
//! context. The [`ResultCollector`] merges results sharing stream and test
//! into full-length [`CollectedResult`]s; where contexts overlap the later
//! context wins.

use crate::config::TestKind;
use crate::constants::{ROLLUP_TEST_NAME, modules};
use crate::error::{QcError, Result};
use crate::models::{Flag, Samples};
use crate::qartod::aggregate_series;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Flags produced by one test for one stream within one context
#[derive(Debug, Clone, PartialEq)]
pub struct QcResult {
    pub stream_id: String,
    pub test: TestKind,
    /// Position of the producing context in the configuration
    pub context_index: usize,
    /// Indexes of `samples` within the stream's full series
    pub subset_indexes: Vec<usize>,
    pub samples: Samples,
    pub flags: Vec<Flag>,
    /// Length of the stream's full series
    pub total_len: usize,
}

/// Full-length flags for one stream and test
///
/// Points no context covered are NOT_EVALUATED and carry no sample data.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedResult {
    pub stream_id: String,
    pub module: String,
    pub test: String,
    pub flags: Vec<Flag>,
    pub time: Vec<Option<DateTime<Utc>>>,
    pub values: Vec<Option<f64>>,
    pub depth: Option<Vec<Option<f64>>>,
    pub lat: Option<Vec<Option<f64>>>,
    pub lon: Option<Vec<Option<f64>>>,
}

impl CollectedResult {
    fn empty(stream_id: &str, module: &str, test: &str, len: usize) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            module: module.to_string(),
            test: test.to_string(),
            flags: vec![Flag::NotEvaluated; len],
            time: vec![None; len],
            values: vec![None; len],
            depth: None,
            lat: None,
            lon: None,
        }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// `stream.module.test`
    pub fn name(&self) -> String {
        format!("{}.{}.{}", self.stream_id, self.module, self.test)
    }

    fn write(&mut self, result: &QcResult) {
        let samples = &result.samples;
        for (k, &i) in result.subset_indexes.iter().enumerate() {
            self.flags[i] = result.flags[k];
            self.time[i] = Some(samples.time[k]);
            self.values[i] = samples.values[k];
        }
        let (indexes, len) = (&result.subset_indexes, result.total_len);
        write_axis(&mut self.depth, samples.depth.as_deref(), indexes, len);
        write_axis(&mut self.lat, samples.lat.as_deref(), indexes, len);
        write_axis(&mut self.lon, samples.lon.as_deref(), indexes, len);
    }
}

fn write_axis(
    target: &mut Option<Vec<Option<f64>>>,
    source: Option<&[Option<f64>]>,
    indexes: &[usize],
    len: usize,
) {
    let Some(source) = source else {
        return;
    };
    let target = target.get_or_insert_with(|| vec![None; len]);
    for (k, &i) in indexes.iter().enumerate() {
        target[i] = source[k];
    }
}

/// Merges cursor output into one result per (stream, test)
#[derive(Debug, Default)]
pub struct ResultCollector {
    collected: Vec<CollectedResult>,
    positions: HashMap<(String, TestKind), usize>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: QcResult) -> Result<()> {
        let n = result.subset_indexes.len();
        if result.flags.len() != n {
            return Err(QcError::length_mismatch("result flags", n, result.flags.len()));
        }
        if result.samples.len() != n {
            return Err(QcError::length_mismatch("result samples", n, result.samples.len()));
        }
        if let Some(&bad) = result.subset_indexes.iter().find(|&&i| i >= result.total_len) {
            return Err(QcError::length_mismatch("result subset index", result.total_len, bad + 1));
        }

        let key = (result.stream_id.clone(), result.test);
        let position = match self.positions.get(&key) {
            Some(&position) => position,
            None => {
                self.collected.push(CollectedResult::empty(
                    &result.stream_id,
                    result.test.module(),
                    result.test.name(),
                    result.total_len,
                ));
                self.positions.insert(key, self.collected.len() - 1);
                self.collected.len() - 1
            }
        };

        let target = &mut self.collected[position];
        if target.len() != result.total_len {
            return Err(QcError::length_mismatch(target.name(), target.len(), result.total_len));
        }
        debug!(
            "Collecting {} points of {} from context {}",
            n,
            target.name(),
            result.context_index
        );
        target.write(&result);
        Ok(())
    }

    /// Push every result, stopping at the first error
    ///
    /// Results pushed before the error stay collected.
    pub fn extend<I>(&mut self, results: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<QcResult>>,
    {
        for result in results {
            self.push(result?)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.collected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }

    pub fn finish(self) -> Vec<CollectedResult> {
        self.collected
    }
}

/// Collect a cursor (or any result iterator) in one call
pub fn collect_results<I>(results: I) -> Result<Vec<CollectedResult>>
where
    I: IntoIterator<Item = Result<QcResult>>,
{
    let mut collector = ResultCollector::new();
    collector.extend(results)?;
    Ok(collector.finish())
}

/// Roll up every collected test of `stream_id` into one series
///
/// Existing `aggregate` and rollup results are not counted again. Returns
/// `None` when the stream has no collected tests.
pub fn rollup(collected: &[CollectedResult], stream_id: &str) -> Result<Option<CollectedResult>> {
    let members: Vec<&CollectedResult> = collected
        .iter()
        .filter(|c| c.stream_id == stream_id)
        .filter(|c| c.test != TestKind::Aggregate.name() && c.test != ROLLUP_TEST_NAME)
        .collect();
    let Some(first) = members.first() else {
        warn!("No collected results for stream '{}' to roll up", stream_id);
        return Ok(None);
    };

    let series: Vec<&[Flag]> = members.iter().map(|c| c.flags.as_slice()).collect();
    let flags = aggregate_series(&series)?;
    Ok(Some(CollectedResult {
        module: modules::QARTOD.to_string(),
        test: ROLLUP_TEST_NAME.to_string(),
        flags,
        ..(*first).clone()
    }))
}

/// Counts of each flag value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagCounts {
    pub pass: usize,
    pub not_evaluated: usize,
    pub suspect: usize,
    pub fail: usize,
    pub missing: usize,
}

impl FlagCounts {
    pub fn add(&mut self, flag: Flag) {
        match flag {
            Flag::Pass => self.pass += 1,
            Flag::NotEvaluated => self.not_evaluated += 1,
            Flag::Suspect => self.suspect += 1,
            Flag::Fail => self.fail += 1,
            Flag::Missing => self.missing += 1,
        }
    }

    pub fn get(&self, flag: Flag) -> usize {
        match flag {
            Flag::Pass => self.pass,
            Flag::NotEvaluated => self.not_evaluated,
            Flag::Suspect => self.suspect,
            Flag::Fail => self.fail,
            Flag::Missing => self.missing,
        }
    }

    pub fn total(&self) -> usize {
        self.pass + self.not_evaluated + self.suspect + self.fail + self.missing
    }
}

impl fmt::Display for FlagCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pass={} not_evaluated={} suspect={} fail={} missing={}",
            self.pass, self.not_evaluated, self.suspect, self.fail, self.missing
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub stream_id: String,
    /// Number of collected tests counted
    pub tests: usize,
    pub counts: FlagCounts,
}

/// Per-stream flag counts over all collected tests, in first-seen order
pub fn summarize_flags(collected: &[CollectedResult]) -> Vec<StreamSummary> {
    let mut summaries: Vec<StreamSummary> = Vec::new();
    for result in collected {
        let position = match summaries.iter().position(|s| s.stream_id == result.stream_id) {
            Some(position) => position,
            None => {
                summaries.push(StreamSummary {
                    stream_id: result.stream_id.clone(),
                    tests: 0,
                    counts: FlagCounts::default(),
                });
                summaries.len() - 1
            }
        };
        let summary = &mut summaries[position];
        summary.tests += 1;
        for flag in &result.flags {
            summary.counts.add(*flag);
        }
    }
    summaries
}
