//! Pipeline stages
//!
//! Every stage reads travelers from an `Inbox` and writes to an `Outbox`.
//! Both ends are owned by the worker that runs the stage; dropping the
//! outbox when `process` returns is what closes the stage's output queue.

use super::path::{render, Field, FieldPath};
use super::predicate::HasFilter;
use super::runtime::ResourceManager;
use super::traveler::{ElementRef, Payload, Traveler};
use super::ExecutionResult;
use crate::cancel::Cancellation;
use crate::graph::{Direction, PropertyMap, PropertyValue, Vertex};
use crate::storage::GraphInterface;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Shared, read-only state handed to a stage
pub struct StageContext {
    pub graph: Arc<dyn GraphInterface>,
    pub cancel: Cancellation,
    pub resources: Arc<ResourceManager>,
    /// Elements produced by this stage must carry their payload
    pub load_data: bool,
    /// Travelers gathered per adjacency lookup
    pub batch_size: usize,
}

/// Receiving end of a stage's input queue
pub struct Inbox {
    rx: mpsc::Receiver<Traveler>,
    cancel: Cancellation,
}

impl Inbox {
    pub fn new(rx: mpsc::Receiver<Traveler>, cancel: Cancellation) -> Self {
        Self { rx, cancel }
    }

    /// Next traveler; `None` once the queue is drained or the pipeline is
    /// cancelled
    pub fn recv(&mut self) -> Option<Traveler> {
        recv_or_cancel(&mut self.rx, &self.cancel)
    }

    /// Block for one traveler, then take whatever else is already queued,
    /// up to `max`
    pub fn recv_batch(&mut self, max: usize) -> Vec<Traveler> {
        let mut batch = Vec::new();
        match self.recv() {
            Some(first) => batch.push(first),
            None => return batch,
        }
        while batch.len() < max {
            match self.rx.try_recv() {
                Ok(traveler) => batch.push(traveler),
                Err(_) => break,
            }
        }
        batch
    }

    /// Stop accepting input; blocked and future upstream sends fail
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Sending end of a stage's output queue
pub struct Outbox {
    tx: mpsc::Sender<Traveler>,
    cancel: Cancellation,
    emitted: u64,
}

impl Outbox {
    pub fn new(tx: mpsc::Sender<Traveler>, cancel: Cancellation) -> Self {
        Self {
            tx,
            cancel,
            emitted: 0,
        }
    }

    /// Returns `false` when the stage should stop: the pipeline was
    /// cancelled or downstream went away
    pub fn send(&mut self, traveler: Traveler) -> bool {
        let sent = send_or_cancel(&self.tx, traveler, &self.cancel);
        if sent {
            self.emitted += 1;
        }
        sent
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

/// Blocking send that gives up as soon as `cancel` fires, even while the
/// queue stays full. Returns `false` if the item was not delivered.
pub(crate) fn send_or_cancel<T>(tx: &mpsc::Sender<T>, item: T, cancel: &Cancellation) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    let item = match tx.try_send(item) {
        Ok(()) => return true,
        Err(TrySendError::Closed(_)) => return false,
        Err(TrySendError::Full(item)) => item,
    };
    match Handle::try_current() {
        Ok(handle) => handle.block_on(async {
            tokio::select! {
                sent = tx.send(item) => sent.is_ok(),
                _ = cancel.cancelled() => false,
            }
        }),
        // outside a runtime nobody can cancel us asynchronously
        Err(_) => tx.blocking_send(item).is_ok(),
    }
}

/// Blocking receive that returns `None` once `cancel` fires
pub(crate) fn recv_or_cancel<T>(rx: &mut mpsc::Receiver<T>, cancel: &Cancellation) -> Option<T> {
    if cancel.is_cancelled() {
        return None;
    }
    match rx.try_recv() {
        Ok(item) => return Some(item),
        Err(TryRecvError::Disconnected) => return None,
        Err(TryRecvError::Empty) => {}
    }
    match Handle::try_current() {
        Ok(handle) => handle.block_on(async {
            tokio::select! {
                item = rx.recv() => item,
                _ = cancel.cancelled() => None,
            }
        }),
        Err(_) => rx.blocking_recv(),
    }
}

pub trait Stage: Send + Sync + fmt::Debug {
    /// Read `input` until it is drained or cancellation is observed.
    ///
    /// An `Err` return ends the stage early; the runtime records it and
    /// closes the output either way.
    fn process(&self, ctx: &StageContext, input: &mut Inbox, output: &mut Outbox)
        -> ExecutionResult<()>;
}

/// `V(ids)`; `all` scans every vertex
#[derive(Debug)]
pub struct LookupVertices {
    pub ids: Vec<String>,
    pub all: bool,
}

impl Stage for LookupVertices {
    fn process(&self, ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        while let Some(traveler) = input.recv() {
            if self.all {
                for vertex in ctx.graph.scan_vertices(ctx.load_data, &ctx.cancel) {
                    if !output.send(traveler.with_current(ElementRef::vertex(vertex?, ctx.load_data))) {
                        return Ok(());
                    }
                }
                continue;
            }
            for id in &self.ids {
                if ctx.cancel.is_cancelled() {
                    return Ok(());
                }
                if let Some(vertex) = ctx.graph.get_vertex(id, ctx.load_data)? {
                    if !output.send(traveler.with_current(ElementRef::vertex(vertex, ctx.load_data))) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

/// `E(ids)`; `all` scans every edge
#[derive(Debug)]
pub struct LookupEdges {
    pub ids: Vec<String>,
    pub all: bool,
}

impl Stage for LookupEdges {
    fn process(&self, ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        while let Some(traveler) = input.recv() {
            if self.all {
                for edge in ctx.graph.scan_edges(ctx.load_data, &ctx.cancel) {
                    if !output.send(traveler.with_current(ElementRef::edge(edge?, ctx.load_data))) {
                        return Ok(());
                    }
                }
                continue;
            }
            for id in &self.ids {
                if ctx.cancel.is_cancelled() {
                    return Ok(());
                }
                if let Some(edge) = ctx.graph.get_edge(id, ctx.load_data)? {
                    if !output.send(traveler.with_current(ElementRef::edge(edge, ctx.load_data))) {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

/// `V().hasLabel(..)` / `E().hasLabel(..)` answered from the label index
#[derive(Debug)]
pub struct LabelScan {
    pub labels: Vec<String>,
    pub edges: bool,
}

impl LabelScan {
    fn element(&self, ctx: &StageContext, id: String, label: &str) -> ExecutionResult<Option<ElementRef>> {
        if self.edges {
            // endpoints live in the edge row, so edges are always read
            return Ok(ctx
                .graph
                .get_edge(&id, ctx.load_data)?
                .map(|edge| ElementRef::edge(edge, ctx.load_data)));
        }
        if ctx.load_data {
            return Ok(ctx
                .graph
                .get_vertex(&id, true)?
                .map(|vertex| ElementRef::vertex(vertex, true)));
        }
        Ok(Some(ElementRef::vertex(Vertex::new(id, label), false)))
    }
}

impl Stage for LabelScan {
    fn process(&self, ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        while let Some(traveler) = input.recv() {
            for label in &self.labels {
                let ids = if self.edges {
                    ctx.graph.scan_edge_ids_by_label(label, &ctx.cancel)
                } else {
                    ctx.graph.scan_vertex_ids_by_label(label, &ctx.cancel)
                };
                for id in ids {
                    if let Some(element) = self.element(ctx, id?, label)? {
                        if !output.send(traveler.with_current(element)) {
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Requested vertex ids of a batch, each mapped to the travelers asking
fn group_by_current(batch: &[Traveler]) -> (Vec<String>, FxHashMap<String, Vec<usize>>) {
    let mut ids = Vec::new();
    let mut owners: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    for (index, traveler) in batch.iter().enumerate() {
        if let Some(current) = traveler.current() {
            let entry = owners.entry(current.id().to_string()).or_default();
            if entry.is_empty() {
                ids.push(current.id().to_string());
            }
            entry.push(index);
        }
    }
    (ids, owners)
}

/// Send `element` once per traveler that requested `request`
fn fan_out(
    batch: &[Traveler],
    owners: &FxHashMap<String, Vec<usize>>,
    request: &str,
    element: ElementRef,
    output: &mut Outbox,
) -> bool {
    let element = Arc::new(element);
    for &index in owners.get(request).map(Vec::as_slice).unwrap_or_default() {
        if !output.send(batch[index].with_current_handle(Arc::clone(&element))) {
            return false;
        }
    }
    true
}

/// Forward, with no current element, every traveler of the batch whose
/// lookup matched nothing
fn send_unmatched(batch: &[Traveler], matched: &FxHashSet<String>, output: &mut Outbox) -> bool {
    for traveler in batch {
        let unmatched = traveler.current().map_or(true, |el| !matched.contains(el.id()));
        if unmatched && !output.send(traveler.without_current()) {
            return false;
        }
    }
    true
}

/// `in`, `out` and `both`; also `inNull` and `outNull` when
/// `keep_unmatched` is set
#[derive(Debug)]
pub struct Neighbors {
    pub direction: Direction,
    pub labels: Vec<String>,
    pub keep_unmatched: bool,
}

impl Neighbors {
    pub fn new(direction: Direction, labels: &[String]) -> Self {
        Self {
            direction,
            labels: labels.to_vec(),
            keep_unmatched: false,
        }
    }

    pub fn keeping_unmatched(mut self) -> Self {
        self.keep_unmatched = true;
        self
    }
}

impl Stage for Neighbors {
    fn process(&self, ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        loop {
            let batch = input.recv_batch(ctx.batch_size);
            if batch.is_empty() {
                return Ok(());
            }
            let (ids, owners) = group_by_current(&batch);
            let found = ctx.graph.lookup_neighbors(
                self.direction,
                &ids,
                &self.labels,
                ctx.load_data,
                &ctx.cancel,
            );
            let mut matched = FxHashSet::default();
            for neighbor in found {
                let neighbor = neighbor?;
                let element = ElementRef::vertex(neighbor.element, ctx.load_data);
                if !fan_out(&batch, &owners, &neighbor.request, element, output) {
                    return Ok(());
                }
                if self.keep_unmatched {
                    matched.insert(neighbor.request);
                }
            }
            if self.keep_unmatched && !send_unmatched(&batch, &matched, output) {
                return Ok(());
            }
        }
    }
}

/// `inE`, `outE` and `bothE`, plus their `Null` forms
#[derive(Debug)]
pub struct IncidentEdges {
    pub direction: Direction,
    pub labels: Vec<String>,
    pub keep_unmatched: bool,
}

impl IncidentEdges {
    pub fn new(direction: Direction, labels: &[String]) -> Self {
        Self {
            direction,
            labels: labels.to_vec(),
            keep_unmatched: false,
        }
    }

    pub fn keeping_unmatched(mut self) -> Self {
        self.keep_unmatched = true;
        self
    }
}

impl Stage for IncidentEdges {
    fn process(&self, ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        loop {
            let batch = input.recv_batch(ctx.batch_size);
            if batch.is_empty() {
                return Ok(());
            }
            let (ids, owners) = group_by_current(&batch);
            let found = ctx.graph.lookup_incident_edges(
                self.direction,
                &ids,
                &self.labels,
                ctx.load_data,
                &ctx.cancel,
            );
            let mut matched = FxHashSet::default();
            for incident in found {
                let incident = incident?;
                let element = ElementRef::edge(incident.element, ctx.load_data);
                if !fan_out(&batch, &owners, &incident.request, element, output) {
                    return Ok(());
                }
                if self.keep_unmatched {
                    matched.insert(incident.request);
                }
            }
            if self.keep_unmatched && !send_unmatched(&batch, &matched, output) {
                return Ok(());
            }
        }
    }
}

/// Forward travelers whose current element satisfies `keep`
fn filter(input: &mut Inbox, output: &mut Outbox, keep: impl Fn(&Traveler) -> bool) -> ExecutionResult<()> {
    while let Some(traveler) = input.recv() {
        if keep(&traveler) && !output.send(traveler) {
            break;
        }
    }
    Ok(())
}

#[derive(Debug)]
pub struct HasStage {
    pub filter: HasFilter,
}

impl Stage for HasStage {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        filter(input, output, |t| t.current().is_some() && self.filter.matches(t))
    }
}

#[derive(Debug)]
pub struct HasLabel {
    labels: FxHashSet<String>,
}

impl HasLabel {
    pub fn new(labels: &[String]) -> Self {
        Self {
            labels: labels.iter().cloned().collect(),
        }
    }
}

impl Stage for HasLabel {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        filter(input, output, |t| {
            t.current().map_or(false, |el| self.labels.contains(el.label()))
        })
    }
}

#[derive(Debug)]
pub struct HasId {
    ids: FxHashSet<String>,
}

impl HasId {
    pub fn new(ids: &[String]) -> Self {
        Self {
            ids: ids.iter().cloned().collect(),
        }
    }
}

impl Stage for HasId {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        filter(input, output, |t| t.current().map_or(false, |el| self.ids.contains(el.id())))
    }
}

/// Keeps elements carrying any of `keys`
#[derive(Debug)]
pub struct HasKey {
    pub keys: Vec<String>,
}

impl Stage for HasKey {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        filter(input, output, |t| {
            t.current()
                .map_or(false, |el| self.keys.iter().any(|k| el.data().contains_key(k)))
        })
    }
}

/// `limit`, `skip` and `range`: forwards positions `start..stop`.
///
/// Once `stop` is reached the input is closed so upstream producers blocked
/// on a full queue are released.
#[derive(Debug)]
pub struct Range {
    pub start: u64,
    pub stop: Option<u64>,
}

impl Stage for Range {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        if self.stop == Some(0) {
            input.close();
            return Ok(());
        }
        let mut position = 0u64;
        while let Some(traveler) = input.recv() {
            if position >= self.start && !output.send(traveler) {
                break;
            }
            position += 1;
            if Some(position) == self.stop {
                break;
            }
        }
        input.close();
        Ok(())
    }
}

#[derive(Debug)]
pub struct Count;

impl Stage for Count {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        let mut count = 0u64;
        while input.recv().is_some() {
            count += 1;
        }
        output.send(Traveler::new().with_payload(Payload::Count(count)));
        Ok(())
    }
}

/// Counts per value of `key`, or per label
#[derive(Debug)]
pub struct GroupCount {
    pub key: Option<FieldPath>,
}

impl Stage for GroupCount {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        let mut groups: BTreeMap<String, u64> = BTreeMap::new();
        while let Some(traveler) = input.recv() {
            let group = match &self.key {
                Some(path) => path.resolve(&traveler).map(|v| v.group_key()),
                None => traveler.current().map(|el| el.label().to_string()),
            };
            if let Some(group) = group {
                *groups.entry(group).or_insert(0) += 1;
            }
        }
        output.send(Traveler::new().with_payload(Payload::GroupCount(groups)));
        Ok(())
    }
}

/// Identity of a traveler for de-duplication
fn identity(traveler: &Traveler) -> String {
    match traveler.payload() {
        Payload::Row(row) => row
            .values()
            .map(|el| el.id())
            .collect::<Vec<_>>()
            .join("\u{1f}"),
        Payload::Value(value) => value.to_string(),
        _ => traveler
            .current()
            .map(|el| format!("{}:{}", if el.is_vertex() { 'v' } else { 'e' }, el.id()))
            .unwrap_or_default(),
    }
}

/// Drops repeats, keyed by `fields` or by element identity. Seen keys are
/// kept in a scratch store under the pipeline's work directory.
#[derive(Debug)]
pub struct Distinct {
    pub fields: Vec<FieldPath>,
}

impl Stage for Distinct {
    fn process(&self, ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        let seen = ctx.resources.scratch_kv()?;
        while let Some(traveler) = input.recv() {
            let key = if self.fields.is_empty() {
                identity(&traveler)
            } else {
                let parts: Vec<String> = self
                    .fields
                    .iter()
                    .map(|f| f.resolve(&traveler).map(|v| v.to_json().to_string()).unwrap_or_default())
                    .collect();
                parts.join("\u{1f}")
            };
            if seen.contains(key.as_bytes())? {
                continue;
            }
            seen.put(key.as_bytes(), &[])?;
            if !output.send(traveler) {
                break;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Marker {
    pub name: String,
}

impl Stage for Marker {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        while let Some(traveler) = input.recv() {
            if !output.send(traveler.add_mark(&self.name)) {
                break;
            }
        }
        Ok(())
    }
}

/// Moves the traveler back to a marked element
#[derive(Debug)]
pub struct SelectOne {
    pub name: String,
}

impl Stage for SelectOne {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        while let Some(traveler) = input.recv() {
            let marked = match traveler.get_mark(&self.name) {
                Some(marked) => Arc::clone(marked),
                None => continue,
            };
            if !output.send(traveler.with_current_handle(marked)) {
                break;
            }
        }
        Ok(())
    }
}

/// Builds a row of marked elements. Marks that were never set (an
/// optional step found nothing) are left out of the row; a traveler with
/// none of them set is dropped.
#[derive(Debug)]
pub struct SelectMany {
    pub names: Vec<String>,
}

impl Stage for SelectMany {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        while let Some(traveler) = input.recv() {
            let row: IndexMap<String, Arc<ElementRef>> = self
                .names
                .iter()
                .filter_map(|name| traveler.get_mark(name).map(|el| (name.clone(), Arc::clone(el))))
                .collect();
            if row.is_empty() {
                continue;
            }
            if !output.send(traveler.with_payload(Payload::Row(row))) {
                break;
            }
        }
        Ok(())
    }
}

/// One traveler per present field; every payload field, sorted by key, when
/// no keys are given
#[derive(Debug)]
pub struct Values {
    pub keys: Vec<FieldPath>,
}

impl Values {
    fn values(&self, traveler: &Traveler) -> Vec<PropertyValue> {
        if !self.keys.is_empty() {
            return self.keys.iter().filter_map(|k| k.resolve(traveler)).collect();
        }
        let Some(current) = traveler.current() else {
            return Vec::new();
        };
        let mut fields: Vec<(&String, &PropertyValue)> = current.data().iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        fields.into_iter().map(|(_, v)| v.clone()).collect()
    }
}

impl Stage for Values {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        while let Some(traveler) = input.recv() {
            for value in self.values(&traveler) {
                if !output.send(traveler.with_payload(Payload::Value(value.to_json()))) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// Payload key split on dots; `$.` prefix allowed
fn payload_key(key: &str) -> Option<Vec<String>> {
    match FieldPath::parse(key) {
        FieldPath { mark: None, field: Field::Data(parts) } if !parts.is_empty() => Some(parts),
        _ => None,
    }
}

fn lookup<'a>(data: &'a PropertyMap, path: &[String]) -> Option<&'a PropertyValue> {
    let (head, rest) = path.split_first()?;
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    data.get(head)?.get_path(&rest)
}

fn insert_path(data: &mut PropertyMap, path: &[String], value: PropertyValue) {
    match path {
        [] => {}
        [last] => {
            data.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let entry = data
                .entry(head.clone())
                .or_insert_with(|| PropertyValue::Map(PropertyMap::new()));
            if let PropertyValue::Map(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

fn remove_path(data: &mut PropertyMap, path: &[String]) {
    match path {
        [] => {}
        [last] => {
            data.remove(last);
        }
        [head, rest @ ..] => {
            if let Some(PropertyValue::Map(inner)) = data.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Projects the current element's payload. `include` keeps only the listed
/// paths (everything when empty), then `exclude` removes paths.
#[derive(Debug)]
pub struct Fields {
    pub include: Vec<Vec<String>>,
    pub exclude: Vec<Vec<String>>,
}

impl Fields {
    pub fn new(keys: &[String]) -> Self {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for key in keys {
            match key.strip_prefix('-') {
                Some(rest) => exclude.extend(payload_key(rest)),
                None => include.extend(payload_key(key)),
            }
        }
        Self { include, exclude }
    }

    fn project(&self, data: &PropertyMap) -> PropertyMap {
        let mut out = if self.include.is_empty() {
            data.clone()
        } else {
            let mut out = PropertyMap::new();
            for path in &self.include {
                if let Some(value) = lookup(data, path) {
                    insert_path(&mut out, path, value.clone());
                }
            }
            out
        };
        for path in &self.exclude {
            remove_path(&mut out, path);
        }
        out
    }
}

impl Stage for Fields {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        let noop = self.include.is_empty() && self.exclude.is_empty();
        while let Some(traveler) = input.recv() {
            let projected = traveler
                .current()
                .filter(|_| !noop)
                .map(|current| traveler.replace_current(current.with_data(self.project(current.data()))));
            let projected = projected.unwrap_or(traveler);
            if !output.send(projected) {
                break;
            }
        }
        Ok(())
    }
}

/// One traveler per item of an array field, each carrying a copy of the
/// element with the field set to that item. An empty array drops the
/// traveler; a missing or scalar field passes it through.
#[derive(Debug)]
pub struct Unwind {
    pub path: Vec<String>,
}

impl Unwind {
    pub fn new(field: &str) -> Self {
        Self {
            path: payload_key(field).unwrap_or_default(),
        }
    }
}

impl Stage for Unwind {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        while let Some(traveler) = input.recv() {
            let items = match traveler.current().and_then(|el| lookup(el.data(), &self.path)) {
                Some(PropertyValue::Array(items)) => Some(items.clone()),
                _ => None,
            };
            let Some(items) = items else {
                if !output.send(traveler) {
                    break;
                }
                continue;
            };
            let Some(current) = traveler.current() else { continue };
            for item in items {
                let mut data = current.data().clone();
                insert_path(&mut data, &self.path, item);
                if !output.send(traveler.replace_current(current.with_data(data))) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// Renders the elements a traveler visited as `[{"vertex": id}, {"edge": id}, ..]`
#[derive(Debug)]
pub struct PathStage;

impl Stage for PathStage {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        while let Some(traveler) = input.recv() {
            let steps: Vec<serde_json::Value> = traveler
                .path()
                .iter()
                .map(|el| {
                    let kind = if el.is_vertex() { "vertex" } else { "edge" };
                    serde_json::json!({ kind: el.id() })
                })
                .collect();
            if !output.send(traveler.with_payload(Payload::Value(serde_json::Value::Array(steps)))) {
                break;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Render {
    pub template: serde_json::Value,
}

impl Stage for Render {
    fn process(&self, _ctx: &StageContext, input: &mut Inbox, output: &mut Outbox) -> ExecutionResult<()> {
        while let Some(traveler) = input.recv() {
            let rendered = render(&self.template, &traveler);
            if !output.send(traveler.with_payload(Payload::Value(rendered))) {
                break;
            }
        }
        Ok(())
    }
}
