use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::backup_context::BackupContext;
use super::encryption_stage::EncryptionStage;
use crate::core::conduit::{self, ConduitHandle, ConduitReader, ConduitWriter};
use crate::core::errors::{BackupError, ConduitError, Result};
use crate::core::models::object_ref::ObjectRef;
use crate::core::models::recipient::RecipientSet;
use crate::core::traits::keyring::KeyRing;
use crate::core::traits::object_store::{ObjectSink, ObjectSource};

/// Default size of a single read from the source (4 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Tuning knobs for a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Capacity of each of the two conduits, in bytes.
    pub conduit_capacity: usize,
    /// Largest single read taken from the source.
    pub chunk_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            conduit_capacity: conduit::DEFAULT_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Cancels an in-flight run by closing both of its conduits.
///
/// Cancelling before the run starts makes it fail immediately; cancelling
/// after it finished has no effect.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Mutex<CancelState>>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: bool,
    conduits: Vec<ConduitHandle>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        state.cancelled = true;
        for handle in &state.conduits {
            handle.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    fn attach(&self, conduits: Vec<ConduitHandle>) {
        let mut state = self.inner.lock();
        if state.cancelled {
            for handle in &conduits {
                handle.cancel();
            }
        }
        state.conduits = conduits;
    }

    fn detach(&self) {
        self.inner.lock().conduits.clear();
    }
}

/// One backup of one source object to one destination object.
#[derive(Debug)]
pub struct PipelineRun {
    source: ObjectRef,
    destination: ObjectRef,
    state: RunState,
    cancel: CancelToken,
}

impl PipelineRun {
    pub fn new(source: ObjectRef, destination: ObjectRef) -> Self {
        Self {
            source,
            destination,
            state: RunState::Pending,
            cancel: CancelToken::new(),
        }
    }

    pub fn source(&self) -> &ObjectRef {
        &self.source
    }

    pub fn destination(&self) -> &ObjectRef {
        &self.destination
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// A token that can cancel this run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

/// What a successful run moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub source: ObjectRef,
    pub destination: ObjectRef,
    /// Plaintext bytes read from the source.
    pub plaintext_bytes: u64,
    /// Ciphertext bytes that passed into the destination.
    pub ciphertext_bytes: u64,
    pub elapsed: Duration,
}

/// Streams one object through encryption into a destination store.
///
/// ```text
/// source --fetch--> conduit A --encrypt--> conduit B --store--> destination
/// ```
///
/// Fetch and encrypt run on scoped worker threads; store runs on the
/// calling thread. Every stage finishes before `run` returns. When a stage
/// fails it aborts or closes its conduit ends, which unwinds the stages on
/// either side of it, and the destination never commits a partial object.
pub struct Pipeline<'a> {
    keyring: &'a dyn KeyRing,
    recipients: &'a RecipientSet,
    source: &'a dyn ObjectSource,
    sink: &'a dyn ObjectSink,
    options: PipelineOptions,
}

struct StageOutcome {
    stage: &'static str,
    result: Result<u64>,
    finished: Instant,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        keyring: &'a dyn KeyRing,
        recipients: &'a RecipientSet,
        source: &'a dyn ObjectSource,
        sink: &'a dyn ObjectSink,
    ) -> Self {
        Self {
            keyring,
            recipients,
            source,
            sink,
            options: PipelineOptions::default(),
        }
    }

    /// Pipeline using the keyring and recipients of `context`.
    pub fn for_context(
        context: &'a BackupContext,
        source: &'a dyn ObjectSource,
        sink: &'a dyn ObjectSink,
    ) -> Self {
        Self::new(context.keyring(), context.recipients(), source, sink)
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Back up `source` to `destination`.
    pub fn run(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<RunReport> {
        let mut run = PipelineRun::new(source.clone(), destination.clone());
        self.execute(&mut run)
    }

    /// Drive a prepared run to completion. A run executes at most once.
    pub fn execute(&self, run: &mut PipelineRun) -> Result<RunReport> {
        if run.state != RunState::Pending {
            return Err(BackupError::InvalidConfig {
                detail: format!("run {} -> {} was already executed", run.source, run.destination),
            });
        }

        run.state = RunState::Running;
        tracing::info!(source = %run.source, destination = %run.destination, "backup run started");
        let outcome = self.drive(run);
        run.cancel.detach();

        match outcome {
            Ok(report) => {
                run.state = RunState::Succeeded;
                tracing::info!(
                    source = %report.source,
                    destination = %report.destination,
                    plaintext_bytes = report.plaintext_bytes,
                    ciphertext_bytes = report.ciphertext_bytes,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "backup run succeeded"
                );
                Ok(report)
            }
            Err(cause) => {
                run.state = RunState::Failed;
                tracing::error!(
                    source = %run.source,
                    destination = %run.destination,
                    error = %cause,
                    "backup run failed"
                );
                Err(BackupError::RunFailed {
                    source_ref: run.source.to_string(),
                    destination: run.destination.to_string(),
                    cause: Box::new(cause),
                })
            }
        }
    }

    fn drive(&self, run: &PipelineRun) -> Result<RunReport> {
        let started = Instant::now();
        let capacity = self.options.conduit_capacity;
        let chunk_size = self.options.chunk_size.max(1);

        let (plain_w, plain_r) = conduit::conduit(capacity);
        let (cipher_w, cipher_r) = conduit::conduit(capacity);
        let plain = plain_w.handle();
        let cipher = cipher_w.handle();
        run.cancel.attach(vec![plain.clone(), cipher.clone()]);

        let stage = EncryptionStage::new(self.keyring, self.recipients);
        let stage = &stage;
        let (source, destination) = (&run.source, &run.destination);
        let (object_source, object_sink) = (self.source, self.sink);
        tracing::debug!(capacity, chunk_size, "starting fetch, encrypt and store stages");

        let outcomes = thread::scope(|scope| {
            let fetch = scope.spawn(move || {
                finish("fetch", fetch_into(object_source, source, plain_w, chunk_size))
            });
            let encrypt = scope.spawn(move || {
                let result = stage.run(plain_r, cipher_w).map(|()| plain.bytes_transferred());
                finish("encrypt", result)
            });
            let store = finish("store", store_from(object_sink, destination, cipher_r));
            vec![join(fetch, "fetch"), join(encrypt, "encrypt"), store]
        });

        let counts = settle(outcomes)?;
        let plaintext_bytes = counts.first().copied().unwrap_or_default();
        if plaintext_bytes == 0 {
            return Err(BackupError::EmptySource {
                object: run.source.to_string(),
            });
        }

        Ok(RunReport {
            source: run.source.clone(),
            destination: run.destination.clone(),
            plaintext_bytes,
            ciphertext_bytes: cipher.bytes_transferred(),
            elapsed: started.elapsed(),
        })
    }
}

fn finish(stage: &'static str, result: Result<u64>) -> StageOutcome {
    match &result {
        Ok(bytes) => tracing::debug!(stage, bytes, "stage finished"),
        Err(e) => tracing::debug!(stage, error = %e, "stage failed"),
    }
    StageOutcome {
        stage,
        result,
        finished: Instant::now(),
    }
}

fn join(handle: ScopedJoinHandle<'_, StageOutcome>, stage: &'static str) -> StageOutcome {
    handle.join().unwrap_or_else(|_| {
        finish(
            stage,
            Err(BackupError::Io(io::Error::other(format!("{stage} stage panicked")))),
        )
    })
}

/// Pick the failure to report for a run.
///
/// Conduit signals and `SinkClosed` only echo a failure elsewhere, so a
/// genuine error always wins over them. Among equals the earliest failure
/// wins, then the stage that started first.
fn settle(outcomes: Vec<StageOutcome>) -> Result<Vec<u64>> {
    let mut counts = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(count) => counts.push(count),
            Err(e) => failures.push((outcome.stage, outcome.finished, e)),
        }
    }

    let primary = failures
        .iter()
        .enumerate()
        .min_by_key(|(index, (_, finished, e))| (e.is_secondary(), *finished, *index))
        .map(|(index, _)| index);
    let Some(primary) = primary else {
        return Ok(counts);
    };

    let (_, _, cause) = failures.remove(primary);
    for (stage, _, e) in &failures {
        tracing::debug!(stage, error = %e, "suppressed follow-on failure");
    }
    Err(cause)
}

/// Copy the source object into the plaintext conduit in `chunk_size` reads.
///
/// The conduit is closed only after a non-empty body reached its end;
/// otherwise it is aborted.
fn fetch_into(
    source: &dyn ObjectSource,
    object: &ObjectRef,
    mut sink: ConduitWriter,
    chunk_size: usize,
) -> Result<u64> {
    let pumped = source
        .open(object)
        .and_then(|mut body| pump(&mut body, &mut sink, chunk_size));

    match pumped {
        Ok(0) => {
            sink.abort();
            Err(BackupError::EmptySource {
                object: object.to_string(),
            })
        }
        Ok(total) => {
            sink.close()?;
            Ok(total)
        }
        Err(e) => {
            sink.abort();
            Err(e)
        }
    }
}

fn pump(body: &mut dyn Read, sink: &mut ConduitWriter, chunk_size: usize) -> Result<u64> {
    let mut buf = vec![0u8; chunk_size];
    let mut total = 0u64;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(BackupError::SourceReadFailed {
                    reason: e.to_string(),
                });
            }
        };
        sink.send_all(&buf[..n])?;
        total += n as u64;
        tracing::trace!(total, "fetched chunk");
    }
}

/// Hand the ciphertext conduit to the destination store.
///
/// The reader is closed as soon as `put` returns so an encrypt stage still
/// writing is released. A store that failed because the conduit failed
/// reports the conduit signal rather than its own error.
fn store_from(sink: &dyn ObjectSink, object: &ObjectRef, body: ConduitReader) -> Result<u64> {
    let mut body = SignalledReader {
        inner: body,
        signal: None,
    };
    let stored = sink.put(object, &mut body);
    body.inner.close();

    match (stored, body.signal) {
        (Ok(size), _) => Ok(size),
        (Err(_), Some(signal)) => Err(BackupError::Conduit(signal)),
        (Err(e), None) => Err(e),
    }
}

/// Remembers the conduit signal behind a failed read, whatever the store
/// later turns it into.
struct SignalledReader {
    inner: ConduitReader,
    signal: Option<ConduitError>,
}

impl Read for SignalledReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                if let Some(signal) = ConduitError::from_io(&e) {
                    self.signal = Some(signal);
                }
                Err(e)
            }
        }
    }
}
