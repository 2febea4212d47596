//! Lazy, single-pass evaluation of a configuration against a source.

use super::StreamSource;
use crate::config::{Config, ContextConfig, StreamConfig, TestParams};
use crate::error::Result;
use crate::models::{Flag, Samples};
use crate::qartod::{aggregate_series, check_timestamps};
use crate::results::QcResult;
use tracing::{debug, warn};

/// Work left for one stream inside one context
struct StreamWork<'a> {
    stream_id: &'a str,
    context_index: usize,
    subset_indexes: Vec<usize>,
    samples: Samples,
    total_len: usize,
    /// Non-aggregate tests first, then aggregates
    queue: Vec<&'a TestParams>,
    next: usize,
    evaluated: Vec<Vec<Flag>>,
}

/// Forward-only iterator over [`QcResult`]s
///
/// Contexts are visited in configuration order, then streams, then tests.
/// Each result is computed only when requested. After yielding an error the
/// cursor is exhausted.
pub struct ResultCursor<'a> {
    source: &'a dyn StreamSource,
    config: &'a Config,
    timestamp_checks: bool,
    context: usize,
    stream: usize,
    work: Option<StreamWork<'a>>,
    done: bool,
}

impl<'a> ResultCursor<'a> {
    pub fn new(source: &'a dyn StreamSource, config: &'a Config) -> Self {
        Self {
            source,
            config,
            timestamp_checks: true,
            context: 0,
            stream: 0,
            work: None,
            done: false,
        }
    }

    pub fn with_timestamp_checks(mut self, enabled: bool) -> Self {
        self.timestamp_checks = enabled;
        self
    }

    /// Next (context, stream) pair in configuration order
    fn advance(&mut self) -> Option<(usize, &'a ContextConfig, &'a StreamConfig)> {
        let config: &'a Config = self.config;
        let contexts = config.contexts();
        while let Some(context) = contexts.get(self.context) {
            if let Some(stream) = context.streams().get(self.stream) {
                self.stream += 1;
                return Some((self.context, context, stream));
            }
            self.context += 1;
            self.stream = 0;
        }
        None
    }

    /// Prepare the next stream that has data and tests in scope
    fn load_next(&mut self) -> Result<Option<StreamWork<'a>>> {
        let source: &'a dyn StreamSource = self.source;
        while let Some((context_index, context, stream)) = self.advance() {
            let stream_id = stream.stream_id();
            let Some(samples) = source.samples(stream_id)? else {
                warn!("Stream '{}' is not present in the source, skipping", stream_id);
                continue;
            };

            if self.timestamp_checks {
                let report = check_timestamps(&samples.time, None);
                if !report.is_monotonic() {
                    warn!(
                        "Stream '{}' has {} decreasing and {} duplicate timestamps",
                        stream_id,
                        report.decreasing.len(),
                        report.duplicates.len()
                    );
                }
            }

            let subset_indexes = in_scope(context, &samples);
            if subset_indexes.is_empty() {
                debug!("No samples of '{}' fall inside context {}", stream_id, context_index);
                continue;
            }
            if stream.tests().is_empty() {
                continue;
            }

            let queue: Vec<&'a TestParams> = stream
                .evaluated_tests()
                .chain(stream.tests().iter().filter(|p| p.kind().is_aggregate()))
                .collect();
            debug!(
                "Evaluating {} tests on {} of {} samples of '{}' in context {}",
                queue.len(),
                subset_indexes.len(),
                samples.len(),
                stream_id,
                context_index
            );

            return Ok(Some(StreamWork {
                stream_id,
                context_index,
                samples: samples.subset(&subset_indexes),
                subset_indexes,
                total_len: samples.len(),
                queue,
                next: 0,
                evaluated: Vec::new(),
            }));
        }
        Ok(None)
    }
}

fn in_scope(context: &ContextConfig, samples: &Samples) -> Vec<usize> {
    if context.is_unconstrained() {
        return (0..samples.len()).collect();
    }
    (0..samples.len())
        .filter(|&i| {
            let lat = samples.lat.as_ref().and_then(|lat| lat[i]);
            let lon = samples.lon.as_ref().and_then(|lon| lon[i]);
            context.covers(&samples.time[i], lat, lon)
        })
        .collect()
}

impl StreamWork<'_> {
    fn evaluate(&mut self, params: &TestParams) -> Result<QcResult> {
        let flags = if params.kind().is_aggregate() {
            if self.evaluated.is_empty() {
                vec![Flag::NotEvaluated; self.samples.len()]
            } else {
                let series: Vec<&[Flag]> = self.evaluated.iter().map(Vec::as_slice).collect();
                aggregate_series(&series)?
            }
        } else {
            let flags = params.run(&self.samples.as_input())?;
            self.evaluated.push(flags.clone());
            flags
        };

        Ok(QcResult {
            stream_id: self.stream_id.to_string(),
            test: params.kind(),
            context_index: self.context_index,
            subset_indexes: self.subset_indexes.clone(),
            samples: self.samples.clone(),
            flags,
            total_len: self.total_len,
        })
    }
}

impl Iterator for ResultCursor<'_> {
    type Item = Result<QcResult>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(work) = self.work.as_mut() {
                if let Some(params) = work.queue.get(work.next).copied() {
                    work.next += 1;
                    let result = work.evaluate(params);
                    if result.is_err() {
                        self.done = true;
                    }
                    return Some(result);
                }
                self.work = None;
            }

            match self.load_next() {
                Ok(Some(work)) => self.work = Some(work),
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
