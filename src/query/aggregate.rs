//! Term, histogram and percentile aggregations
//!
//! Aggregations consume their whole input before emitting, one traveler per
//! bucket, in the order the aggregations were listed.

use super::path::FieldPath;
use super::stages::{Inbox, Outbox, Stage, StageContext};
use super::statement::{Aggregation, AggregationKind};
use super::traveler::{AggregationBucket, Payload, Traveler};
use super::ExecutionResult;
use crate::graph::PropertyValue;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

#[derive(Debug)]
enum Accumulator {
    Term {
        size: Option<usize>,
        counts: FxHashMap<String, (serde_json::Value, u64)>,
    },
    Histogram {
        interval: f64,
        buckets: BTreeMap<i64, u64>,
    },
    Percentile {
        percents: Vec<f64>,
        values: Vec<f64>,
    },
}

impl Accumulator {
    fn new(kind: &AggregationKind) -> Self {
        match kind {
            AggregationKind::Term { size } => Accumulator::Term {
                size: *size,
                counts: FxHashMap::default(),
            },
            AggregationKind::Histogram { interval } => Accumulator::Histogram {
                interval: *interval,
                buckets: BTreeMap::new(),
            },
            AggregationKind::Percentile { percents } => Accumulator::Percentile {
                percents: percents.clone(),
                values: Vec::new(),
            },
        }
    }

    fn add(&mut self, value: &PropertyValue) {
        match self {
            Accumulator::Term { counts, .. } => {
                let entry = counts
                    .entry(value.group_key())
                    .or_insert_with(|| (value.to_json(), 0));
                entry.1 += 1;
            }
            Accumulator::Histogram { interval, buckets } => {
                if let Some(n) = value.as_number() {
                    *buckets.entry((n / *interval).floor() as i64).or_insert(0) += 1;
                }
            }
            Accumulator::Percentile { values, .. } => {
                if let Some(n) = value.as_number().filter(|n| n.is_finite()) {
                    values.push(n);
                }
            }
        }
    }

    fn finish(self) -> Vec<(serde_json::Value, f64)> {
        match self {
            Accumulator::Term { size, counts } => {
                let mut terms: Vec<(String, (serde_json::Value, u64))> = counts.into_iter().collect();
                terms.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then_with(|| a.0.cmp(&b.0)));
                if let Some(size) = size {
                    terms.truncate(size);
                }
                terms
                    .into_iter()
                    .map(|(_, (key, count))| (key, count as f64))
                    .collect()
            }
            Accumulator::Histogram { interval, buckets } => buckets
                .into_iter()
                .map(|(bucket, count)| (serde_json::json!(bucket as f64 * interval), count as f64))
                .collect(),
            Accumulator::Percentile { percents, mut values } => {
                if values.is_empty() {
                    return Vec::new();
                }
                values.sort_by(f64::total_cmp);
                percents
                    .into_iter()
                    .map(|p| (serde_json::json!(p), percentile(&values, p)))
                    .collect()
            }
        }
    }
}

/// Linear interpolation between closest ranks; `sorted` is non-empty
pub fn percentile(sorted: &[f64], percent: f64) -> f64 {
    let rank = percent / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[derive(Debug)]
pub struct AggregateStage {
    aggregations: Vec<(Aggregation, FieldPath)>,
}

impl AggregateStage {
    pub fn new(aggregations: &[Aggregation]) -> Self {
        Self {
            aggregations: aggregations
                .iter()
                .map(|a| (a.clone(), FieldPath::parse(&a.field)))
                .collect(),
        }
    }
}

impl Stage for AggregateStage {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        let mut accumulators: Vec<Accumulator> = self
            .aggregations
            .iter()
            .map(|(a, _)| Accumulator::new(&a.kind))
            .collect();

        while let Some(traveler) = input.recv() {
            for ((_, path), acc) in self.aggregations.iter().zip(accumulators.iter_mut()) {
                match path.resolve(&traveler) {
                    Some(PropertyValue::Array(items)) => items.iter().for_each(|v| acc.add(v)),
                    Some(PropertyValue::Null) | None => {}
                    Some(value) => acc.add(&value),
                }
            }
        }

        for ((aggregation, _), acc) in self.aggregations.iter().zip(accumulators) {
            for (key, value) in acc.finish() {
                let bucket = AggregationBucket {
                    name: aggregation.name.clone(),
                    key,
                    value,
                };
                if !output.send(Traveler::new().with_payload(Payload::Aggregation(bucket))) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
