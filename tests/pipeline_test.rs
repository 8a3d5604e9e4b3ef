use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use rand::RngCore;

use backup_cloud::adapters::keyrings::age_keyring::AgeKeyRing;
use backup_cloud::adapters::object_stores::local_store::LocalObjectStore;
use backup_cloud::adapters::object_stores::memory_store::MemoryObjectStore;
use backup_cloud::adapters::parameters::memory_parameters::MemoryParameterStore;
use backup_cloud::core::errors::{BackupError, ErrorKind, Result};
use backup_cloud::core::models::object_ref::ObjectRef;
use backup_cloud::core::services::backup_context::{BackupContext, ContextOptions};
use backup_cloud::core::services::backup_service::BackupService;
use backup_cloud::core::services::pipeline::{Pipeline, PipelineOptions, PipelineRun, RunState};
use backup_cloud::core::traits::keyring::KeyRing;
use backup_cloud::core::traits::object_store::{ObjectBody, ObjectSink, ObjectSource};

const CONFIG_PATH: &str = "/testing/backup_context";
const BUCKET: &str = "backups";
const S3_PATH: &str = "unit/test/fake/s3/path/";
const DEADLINE: Duration = Duration::from_secs(30);

/// Parameters and a memory store with one uploaded public key per uid.
/// The matching secret blocks are kept for decrypting afterwards.
struct Fixture {
    params: MemoryParameterStore,
    store: MemoryObjectStore,
    secrets: Vec<String>,
}

impl Fixture {
    fn new(uids: &[&str]) -> Self {
        let params = MemoryParameterStore::new();
        params.set_backup_location(CONFIG_PATH, BUCKET, S3_PATH);

        let store = MemoryObjectStore::new();
        store.create_bucket(BUCKET);
        store.put_object(BUCKET, "unit/test/fake/s3/path/config/public-keys/", "");

        let mut secrets = Vec::new();
        for uid in uids {
            let (public, secret) = AgeKeyRing::generate_keypair(uid);
            store.put_object(
                BUCKET,
                &format!("unit/test/fake/s3/path/config/public-keys/{uid}.pub"),
                public,
            );
            secrets.push(secret);
        }
        Self {
            params,
            store,
            secrets,
        }
    }

    fn context(&self) -> BackupContext {
        self.context_with(None).unwrap()
    }

    fn context_with(&self, recipients: Option<Vec<String>>) -> Result<BackupContext> {
        let options = ContextOptions {
            config_path: CONFIG_PATH.to_string(),
            recipients,
        };
        BackupContext::new(
            options,
            Box::new(AgeKeyRing::create(false)?),
            &self.params,
            &self.store,
        )
    }

    fn put_source(&self, key: &str, data: &[u8]) -> ObjectRef {
        self.store.create_bucket("source");
        self.store.put_object("source", key, data.to_vec());
        ObjectRef::new("source", key)
    }
}

/// Decrypt with a keyring holding only `secret`.
fn decrypt_with(secret: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let ring = AgeKeyRing::create(false)?;
    ring.import_key(secret.as_bytes())?;
    let mut plaintext = Vec::new();
    ring.decrypt(&mut &ciphertext[..], &mut plaintext)?;
    Ok(plaintext)
}

/// Run `work` on a detached thread and fail if it has not returned by
/// `DEADLINE`, so a stalled pipeline fails the test instead of hanging it.
fn within_deadline<T: Send + 'static>(work: impl FnOnce() -> T + Send + 'static) -> T {
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = done_tx.send(work());
    });
    match done_rx.recv_timeout(DEADLINE) {
        Ok(value) => value,
        Err(RecvTimeoutError::Timeout) => panic!("pipeline did not terminate within {DEADLINE:?}"),
        Err(RecvTimeoutError::Disconnected) => panic!("pipeline thread panicked"),
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// Accepts `limit` bytes of ciphertext, then fails like a dropped upload.
struct FailingSink {
    limit: u64,
    received: AtomicU64,
}

impl ObjectSink for FailingSink {
    fn put(&self, object: &ObjectRef, body: &mut dyn Read) -> Result<u64> {
        let mut buf = [0u8; 256];
        loop {
            let n = body.read(&mut buf)?;
            let total = self.received.fetch_add(n as u64, Ordering::SeqCst) + n as u64;
            if n == 0 || total > self.limit {
                return Err(BackupError::TransientStore {
                    bucket: object.bucket.clone(),
                    key: object.key.clone(),
                    reason: "connection reset".into(),
                });
            }
        }
    }
}

/// Produces `good` bytes, then fails.
struct BrokenSource {
    good: usize,
}

struct BrokenBody {
    remaining: usize,
}

impl Read for BrokenBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::other("source connection reset"));
        }
        let n = buf.len().min(self.remaining);
        buf[..n].fill(b'a');
        self.remaining -= n;
        Ok(n)
    }
}

impl ObjectSource for BrokenSource {
    fn open(&self, _object: &ObjectRef) -> Result<ObjectBody> {
        Ok(Box::new(BrokenBody {
            remaining: self.good,
        }))
    }
}

/// Never ends.
struct EndlessSource;

impl ObjectSource for EndlessSource {
    fn open(&self, _object: &ObjectRef) -> Result<ObjectBody> {
        Ok(Box::new(io::repeat(b'z')))
    }
}

#[test]
fn sixteen_random_bytes_round_trip() {
    let fixture = Fixture::new(&["backup-one"]);
    let context = fixture.context();
    let plaintext = random_bytes(16);
    let source = fixture.put_source("random.bin", &plaintext);
    let destination = context.destination_for("random.bin.asc");

    let report = Pipeline::for_context(&context, &fixture.store, &fixture.store)
        .run(&source, &destination)
        .unwrap();

    let ciphertext = fixture
        .store
        .get_object(BUCKET, "unit/test/fake/s3/path/backup/random.bin.asc")
        .unwrap();
    assert!(ciphertext.len() >= 64);
    assert_ne!(ciphertext, plaintext);
    assert_eq!(report.plaintext_bytes, 16);
    assert_eq!(report.ciphertext_bytes, ciphertext.len() as u64);
    assert!(String::from_utf8_lossy(&ciphertext).contains("BEGIN AGE ENCRYPTED FILE"));

    assert_eq!(decrypt_with(&fixture.secrets[0], &ciphertext).unwrap(), plaintext);
}

#[test]
fn every_recipient_can_decrypt() {
    let fixture = Fixture::new(&["backup-one", "backup-two", "backup-three"]);
    let context = fixture.context();
    assert_eq!(context.recipients().len(), 3);

    let plaintext = random_bytes(4096);
    let source = fixture.put_source("db.dump", &plaintext);
    let destination = context.destination_for("db.dump.asc");
    Pipeline::for_context(&context, &fixture.store, &fixture.store)
        .run(&source, &destination)
        .unwrap();

    let ciphertext = fixture
        .store
        .get_object(&destination.bucket, &destination.key)
        .unwrap();
    for secret in &fixture.secrets {
        assert_eq!(decrypt_with(secret, &ciphertext).unwrap(), plaintext);
    }
}

#[test]
fn keys_sharing_an_identity_can_all_decrypt() {
    let fixture = Fixture::new(&["backup-ops"]);
    let (public, second_secret) = AgeKeyRing::generate_keypair("backup-ops");
    fixture.store.put_object(
        BUCKET,
        "unit/test/fake/s3/path/config/public-keys/backup-ops-laptop.pub",
        public,
    );
    let context = fixture.context();
    assert_eq!(context.recipients().len(), 1);
    assert_eq!(context.keyring().keys().unwrap().len(), 2);

    let source = fixture.put_source("shared.bin", b"for both holders");
    let destination = context.destination_for("shared.bin.asc");
    Pipeline::for_context(&context, &fixture.store, &fixture.store)
        .run(&source, &destination)
        .unwrap();

    let ciphertext = fixture
        .store
        .get_object(&destination.bucket, &destination.key)
        .unwrap();
    for secret in [&fixture.secrets[0], &second_secret] {
        assert_eq!(decrypt_with(secret, &ciphertext).unwrap(), b"for both holders");
    }
}

#[test]
fn explicit_recipients_exclude_the_others() {
    let fixture = Fixture::new(&["backup-one", "backup-two"]);
    let context = fixture
        .context_with(Some(vec!["backup-two".to_string()]))
        .unwrap();

    let source = fixture.put_source("only-two.bin", b"for two only");
    let destination = context.destination_for("only-two.bin.asc");
    Pipeline::for_context(&context, &fixture.store, &fixture.store)
        .run(&source, &destination)
        .unwrap();

    let ciphertext = fixture
        .store
        .get_object(&destination.bucket, &destination.key)
        .unwrap();
    assert!(decrypt_with(&fixture.secrets[0], &ciphertext).is_err());
    assert_eq!(
        decrypt_with(&fixture.secrets[1], &ciphertext).unwrap(),
        b"for two only"
    );
}

#[test]
fn unknown_explicit_recipient_fails_the_run() {
    let fixture = Fixture::new(&["backup-one"]);
    let context = fixture
        .context_with(Some(vec!["nobody-here".to_string()]))
        .unwrap();
    let source = fixture.put_source("a.bin", b"data");
    let destination = context.destination_for("a.bin.asc");

    let err = Pipeline::for_context(&context, &fixture.store, &fixture.store)
        .run(&source, &destination)
        .unwrap_err();
    assert!(matches!(err.root(), BackupError::UnknownRecipient { .. }));
    assert!(!fixture.store.contains(&destination.bucket, &destination.key));
}

#[test]
fn output_does_not_depend_on_chunk_size() {
    let fixture = Fixture::new(&["backup-one"]);
    let context = fixture.context();
    let plaintext = random_bytes(100_000);
    let source = fixture.put_source("chunks.bin", &plaintext);

    for (chunk_size, name) in [(1, "tiny.asc"), (65536, "large.asc")] {
        let destination = context.destination_for(name);
        let options = PipelineOptions {
            conduit_capacity: 1024,
            chunk_size,
        };
        Pipeline::for_context(&context, &fixture.store, &fixture.store)
            .with_options(options)
            .run(&source, &destination)
            .unwrap();

        let ciphertext = fixture
            .store
            .get_object(&destination.bucket, &destination.key)
            .unwrap();
        assert_eq!(decrypt_with(&fixture.secrets[0], &ciphertext).unwrap(), plaintext);
    }
}

#[test]
fn empty_source_is_never_stored() {
    let fixture = Fixture::new(&["backup-one"]);
    let context = fixture.context();
    let source = fixture.put_source("empty.bin", b"");
    let destination = context.destination_for("empty.bin.asc");

    let err = Pipeline::for_context(&context, &fixture.store, &fixture.store)
        .run(&source, &destination)
        .unwrap_err();
    assert!(matches!(err.root(), BackupError::EmptySource { .. }));
    assert_eq!(err.kind(), ErrorKind::Source);
    assert!(!fixture.store.contains(&destination.bucket, &destination.key));
}

#[test]
fn missing_source_is_reported() {
    let fixture = Fixture::new(&["backup-one"]);
    let context = fixture.context();
    fixture.store.create_bucket("source");
    let destination = context.destination_for("ghost.asc");

    let err = Pipeline::for_context(&context, &fixture.store, &fixture.store)
        .run(&ObjectRef::new("source", "ghost"), &destination)
        .unwrap_err();
    assert!(matches!(err.root(), BackupError::ObjectNotFound { .. }));
    assert!(!fixture.store.contains(&destination.bucket, &destination.key));
}

#[test]
fn source_failing_mid_stream_stores_nothing() {
    let fixture = Fixture::new(&["backup-one"]);
    let context = fixture.context();
    let destination = context.destination_for("broken.asc");
    let source = BrokenSource { good: 50_000 };

    let err = Pipeline::for_context(&context, &source, &fixture.store)
        .with_options(PipelineOptions {
            conduit_capacity: 512,
            chunk_size: 128,
        })
        .run(&ObjectRef::new("source", "broken"), &destination)
        .unwrap_err();
    assert!(matches!(err.root(), BackupError::SourceReadFailed { .. }));
    assert!(!fixture.store.contains(&destination.bucket, &destination.key));
}

#[test]
fn failing_sink_unwinds_every_stage() {
    for limit in [0, 1, 5000] {
        let err = within_deadline(move || {
            let fixture = Fixture::new(&["backup-one"]);
            let context = fixture.context();
            let source = fixture.put_source("big.bin", &random_bytes(1024 * 1024));
            let sink = FailingSink {
                limit,
                received: AtomicU64::new(0),
            };
            Pipeline::for_context(&context, &fixture.store, &sink)
                .with_options(PipelineOptions {
                    conduit_capacity: 1024,
                    chunk_size: 4096,
                })
                .run(&source, &ObjectRef::new(BUCKET, "never"))
                .unwrap_err()
        });

        assert!(matches!(err.root(), BackupError::TransientStore { .. }));
        assert!(err.is_retryable());
    }
}

#[test]
fn cancelling_a_run_stops_all_stages() {
    let fixture = Fixture::new(&["backup-one"]);
    let context = fixture.context();
    let destination = context.destination_for("endless.asc");
    let pipeline = Pipeline::for_context(&context, &EndlessSource, &fixture.store);

    let mut run = PipelineRun::new(ObjectRef::new("source", "endless"), destination.clone());
    let token = run.cancel_token();

    let result = thread::scope(|scope| {
        scope.spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        });
        pipeline.execute(&mut run)
    });

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conduit);
    assert_eq!(run.state(), RunState::Failed);
    assert!(!fixture.store.contains(&destination.bucket, &destination.key));
}

#[test]
fn concurrent_runs_share_one_context() {
    let fixture = Fixture::new(&["backup-one"]);
    let context = fixture.context();
    let inputs: Vec<(ObjectRef, Vec<u8>)> = (0..4)
        .map(|i| {
            let data = random_bytes(10_000 + i);
            (fixture.put_source(&format!("file-{i}"), &data), data)
        })
        .collect();

    thread::scope(|scope| {
        for (i, (source, _)) in inputs.iter().enumerate() {
            let context = &context;
            let store = &fixture.store;
            scope.spawn(move || {
                let destination = context.destination_for(&format!("file-{i}.asc"));
                Pipeline::for_context(context, store, store)
                    .run(source, &destination)
                    .unwrap();
            });
        }
    });

    for (i, (_, data)) in inputs.iter().enumerate() {
        let destination = context.destination_for(&format!("file-{i}.asc"));
        let ciphertext = fixture
            .store
            .get_object(&destination.bucket, &destination.key)
            .unwrap();
        assert_eq!(&decrypt_with(&fixture.secrets[0], &ciphertext).unwrap(), data);
    }
}

#[test]
fn corrupt_and_valid_keys_bootstrap_together() {
    let fixture = Fixture::new(&["backup-one"]);
    let folder = "unit/test/fake/s3/path/config/public-keys/";
    fixture
        .store
        .put_object(BUCKET, &format!("{folder}short.pub"), "too short");
    fixture
        .store
        .put_object(BUCKET, &format!("{folder}junk.pub"), vec![b'#'; 300]);

    let context = fixture.context();
    assert_eq!(context.recipients().len(), 1);
    assert!(context.recipients().contains("backup-one"));
}

#[test]
fn no_keys_means_no_recipients() {
    let fixture = Fixture::new(&[]);
    let err = fixture.context_with(None).unwrap_err();
    assert!(matches!(err, BackupError::NoRecipients));
}

#[test]
fn service_backs_up_files_and_directories() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join(BUCKET)).unwrap();
    let store = LocalObjectStore::new(root.path().to_path_buf());

    let params = MemoryParameterStore::new();
    params.set_backup_location(CONFIG_PATH, BUCKET, "team");
    let (public, secret) = AgeKeyRing::generate_keypair("backup-local");
    let key_dir = root.path().join(BUCKET).join("team/config/public-keys");
    std::fs::create_dir_all(&key_dir).unwrap();
    std::fs::write(key_dir.join("backup-local.pub"), public).unwrap();

    let context = BackupContext::new(
        ContextOptions {
            config_path: CONFIG_PATH.to_string(),
            recipients: None,
        },
        Box::new(AgeKeyRing::create(false).unwrap()),
        &params,
        &store,
    )
    .unwrap();
    let service = BackupService::new(&context, &store);

    let work = tempfile::tempdir().unwrap();
    let single = work.path().join("single.txt");
    std::fs::write(&single, "one file").unwrap();
    service.backup_file(&single, "single.txt.asc").unwrap();
    let stored = std::fs::read(root.path().join(BUCKET).join("team/backup/single.txt.asc")).unwrap();
    assert_eq!(decrypt_with(&secret, &stored).unwrap(), b"one file");

    let photos = work.path().join("photos");
    std::fs::create_dir_all(photos.join("2026")).unwrap();
    std::fs::write(photos.join("2026/a.jpg"), "jpeg a").unwrap();
    std::fs::write(photos.join("b.jpg"), "jpeg b").unwrap();
    let summary = service.upload_path(&photos, "media").unwrap();
    assert_eq!(summary.files(), 2);

    let stored =
        std::fs::read(root.path().join(BUCKET).join("team/backup/media/photos/2026/a.jpg")).unwrap();
    assert_eq!(decrypt_with(&secret, &stored).unwrap(), b"jpeg a");

    let err = service
        .backup_file(&work.path().join("absent.txt"), "absent.asc")
        .unwrap_err();
    assert!(matches!(err.root(), BackupError::FileNotFound { .. }));
}
