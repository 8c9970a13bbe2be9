//! Replay command implementation.

use crate::error::{CliError, CliResult};
use crate::events::{key_parts, parse_events, Event};
use crate::schema_file::SchemaFile;
use livegraph_core::{
    Changes, CoreError, CyclePolicy, RecordId, Schema, StatsSnapshot, Store, StoreConfig,
};
use livegraph_value::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Replay result.
#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    /// Number of events applied.
    pub events: usize,
    /// Records inserted or merged by ingest events.
    pub inserted: usize,
    /// Events or ingest items that failed.
    pub failures: Vec<ReplayFailure>,
    /// Change events the store emitted.
    pub change_events: usize,
    /// Live records per model.
    pub records: BTreeMap<String, usize>,
    /// Store counters at the end of the replay.
    pub stats: StatsView,
    /// Every live record, per model (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump: Option<BTreeMap<String, Vec<Value>>>,
}

/// A failed event or ingest item.
#[derive(Debug, Serialize)]
pub struct ReplayFailure {
    /// Line of the event.
    pub line: usize,
    /// Error message.
    pub message: String,
}

/// Serializable store counters.
#[derive(Debug, Serialize)]
pub struct StatsView {
    /// Top-level insert items processed.
    pub inserts: u64,
    /// Records created.
    pub creates: u64,
    /// Merges into existing records.
    pub updates: u64,
    /// Records deleted.
    pub deletes: u64,
    /// Relation sides attached.
    pub links: u64,
    /// Relation sides detached.
    pub unlinks: u64,
    /// Computed field recomputations.
    pub recomputes: u64,
    /// Flushes.
    pub flushes: u64,
    /// Compute cycles.
    pub cycles: u64,
    /// Failed operations.
    pub errors: u64,
}

impl From<StatsSnapshot> for StatsView {
    fn from(s: StatsSnapshot) -> Self {
        Self {
            inserts: s.inserts,
            creates: s.creates,
            updates: s.updates,
            deletes: s.deletes,
            links: s.links,
            unlinks: s.unlinks,
            recomputes: s.recomputes,
            flushes: s.flushes,
            cycles: s.cycles,
            errors: s.errors,
        }
    }
}

/// A replayed store together with its summary.
pub struct Replay {
    /// The store after the last event.
    pub store: Store,
    /// What happened.
    pub summary: ReplaySummary,
}

/// Replays events against a fresh store.
///
/// Failing events are recorded and skipped. With `deferred`, the store only
/// flushes on `flush` events and once at the end.
pub fn replay(schema: Schema, events: &[(usize, Event)], deferred: bool) -> CliResult<Replay> {
    let config = StoreConfig::new()
        .auto_flush(!deferred)
        .cycle_policy(CyclePolicy::Degrade);
    let mut store = Store::with_config(schema, config);
    let receiver = store.subscribe();

    let mut inserted = 0;
    let mut failures = Vec::new();
    for (line, event) in events {
        debug!(line, event = event.name(), "Applying event");
        match apply(&mut store, event) {
            Ok(applied) => {
                inserted += applied.inserted;
                failures.extend(applied.failures.into_iter().map(|message| ReplayFailure {
                    line: *line,
                    message,
                }));
            }
            Err(err) => {
                warn!(line, error = %err, "Event failed");
                failures.push(ReplayFailure {
                    line: *line,
                    message: err.to_string(),
                });
            }
        }
    }
    store.flush()?;

    let records: BTreeMap<String, usize> = store
        .schema()
        .models()
        .iter()
        .map(|m| Ok((m.name().to_string(), store.len(m.name())?)))
        .collect::<Result<_, CoreError>>()?;
    let summary = ReplaySummary {
        events: events.len(),
        inserted,
        failures,
        change_events: receiver.try_iter().count(),
        records,
        stats: store.stats().snapshot().into(),
        dump: None,
    };
    info!(
        events = summary.events,
        failures = summary.failures.len(),
        "Replay finished"
    );
    Ok(Replay { store, summary })
}

#[derive(Default)]
struct Applied {
    inserted: usize,
    failures: Vec<String>,
}

fn apply(store: &mut Store, event: &Event) -> Result<Applied, CoreError> {
    let mut applied = Applied::default();
    match event {
        Event::Ingest(payload) => {
            let report = store.ingest(payload)?;
            applied.inserted = report.records.len();
            applied.failures = report
                .failures
                .iter()
                .map(|f| format!("{}[{}]: {}", f.model, f.index, f.error))
                .collect();
        }
        Event::Update {
            model,
            key,
            changes,
        } => {
            let id = lookup(store, model, key)?;
            store.update(id, Changes::from_value(changes)?)?;
        }
        Event::Delete { model, key } => {
            let id = lookup(store, model, key)?;
            store.delete(id)?;
        }
        Event::Flush => {
            store.flush()?;
        }
    }
    Ok(applied)
}

fn lookup(store: &Store, model: &str, key: &Value) -> Result<RecordId, CoreError> {
    store.model_id(model)?;
    store
        .get(model, &key_parts(key))
        .map(|r| r.id())
        .ok_or_else(|| CoreError::invalid_payload(format!("no {model} record with key {key}")))
}

/// Collects every live record as a payload value.
pub fn dump(store: &Store) -> CliResult<BTreeMap<String, Vec<Value>>> {
    let mut out = BTreeMap::new();
    for model in store.schema().models() {
        let records = store.records(model.name())?;
        out.insert(
            model.name().to_string(),
            records.iter().map(|r| r.to_value()).collect(),
        );
    }
    Ok(out)
}

/// Loads the schema and events from disk and replays them.
pub fn load_and_replay(schema_path: &Path, events_path: &Path, deferred: bool) -> CliResult<Replay> {
    let schema = SchemaFile::load(schema_path)?.to_schema()?;
    let text = std::fs::read_to_string(events_path).map_err(|source| CliError::Io {
        path: events_path.to_path_buf(),
        source,
    })?;
    let events = parse_events(&text)?;
    replay(schema, &events, deferred)
}

/// Runs the replay command.
pub fn run(
    schema_path: &Path,
    events_path: &Path,
    format: &str,
    show_dump: bool,
    deferred: bool,
) -> CliResult<()> {
    let Replay { store, mut summary } = load_and_replay(schema_path, events_path, deferred)?;
    if show_dump {
        summary.dump = Some(dump(&store)?);
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => {
            print_text_output(&summary);
        }
    }
    Ok(())
}

fn print_text_output(summary: &ReplaySummary) {
    println!("LiveGraph Replay");
    println!("================");
    println!();
    println!("Events:         {}", summary.events);
    println!("Inserted:       {}", summary.inserted);
    println!("Change events:  {}", summary.change_events);
    println!("Failures:       {}", summary.failures.len());
    for failure in &summary.failures {
        println!("  line {}: {}", failure.line, failure.message);
    }

    println!();
    println!("Records:");
    for (model, count) in &summary.records {
        println!("  {model}: {count}");
    }

    let s = &summary.stats;
    println!();
    println!("Statistics:");
    println!("  Creates:     {}", s.creates);
    println!("  Merges:      {}", s.updates);
    println!("  Deletes:     {}", s.deletes);
    println!("  Links:       {} (unlinked {})", s.links, s.unlinks);
    println!("  Recomputes:  {}", s.recomputes);
    println!("  Flushes:     {}", s.flushes);
    if s.cycles > 0 {
        println!("  Cycles:      {}", s.cycles);
    }

    if let Some(dump) = &summary.dump {
        println!();
        println!("Dump:");
        for (model, records) in dump {
            for record in records {
                println!("  {model} {record}");
            }
        }
    }
}
