//! Fallback, retry and ordering behaviour of the transcription dispatcher,
//! exercised against scripted in-memory providers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use livescribe_audio::transcription::{
    Dispatcher, ProviderOutput, TranscriptionError, TranscriptionProvider,
};
use livescribe_audio::{AudioBatch, BatchQueue};
use livescribe_core::config::TranscriptionConfig;

/// Provider that replays a scripted sequence of outcomes.
struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Result<String, TranscriptionError>>>,
    calls: Mutex<u64>,
}

impl ScriptedProvider {
    fn new(name: &str, script: Vec<Result<String, TranscriptionError>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> u64 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TranscriptionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(
        &self,
        _wav: Vec<u8>,
        _batch: &AudioBatch,
    ) -> Result<ProviderOutput, TranscriptionError> {
        *self.calls.lock().unwrap() += 1;
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(ProviderOutput {
                text,
                spans: None,
                language: Some("en".to_string()),
            }),
            Some(Err(e)) => Err(e),
            None => Ok(ProviderOutput {
                text: "default".to_string(),
                spans: None,
                language: None,
            }),
        }
    }
}

fn config() -> TranscriptionConfig {
    TranscriptionConfig {
        primary_model: "primary".to_string(),
        fallback_models: vec!["fallback".to_string()],
        language: None,
        api_timeout: 5.0,
        max_retries: 3,
        retry_base_delay: 0.01,
    }
}

fn batch(sequence: u64, seconds: f64) -> AudioBatch {
    let samples = vec![100i16; (seconds * 16_000.0) as usize];
    AudioBatch {
        samples,
        timestamp: Utc::now(),
        duration: seconds,
        sequence,
        is_final: false,
    }
}

fn transient(msg: &str) -> TranscriptionError {
    TranscriptionError::Transient(msg.to_string())
}

#[tokio::test]
async fn test_primary_recovers_on_retry() {
    // Transient error on call 1, success on call 2: the segment is
    // attributed to the primary and the fallback is never consulted.
    let primary = ScriptedProvider::new(
        "primary",
        vec![Err(transient("timeout")), Ok("recovered text".to_string())],
    );
    let fallback = ScriptedProvider::new("fallback", vec![]);
    let dispatcher = Dispatcher::new(
        vec![primary.clone(), fallback.clone()],
        config(),
        16_000,
    );

    let segment = dispatcher
        .transcribe_batch(&batch(0, 4.0))
        .await
        .expect("retry should recover");

    assert_eq!(segment.text, "recovered text");
    assert_eq!(segment.model, "primary");
    assert_eq!(segment.batch_sequence, 0);
    assert_eq!(fallback.calls(), 0);

    let stats = dispatcher.stats();
    let primary_stats = &stats["primary"];
    assert_eq!(primary_stats.total_requests, 2);
    assert_eq!(primary_stats.successful_requests, 1);
    assert_eq!(primary_stats.failed_requests, 1);
    assert!((primary_stats.total_audio_duration - 4.0).abs() < 1e-9);
    assert!(stats.get("fallback").map_or(0, |s| s.total_requests) == 0);
}

#[tokio::test]
async fn test_fallback_after_primary_exhausts_retries() {
    let primary = ScriptedProvider::new(
        "primary",
        vec![
            Err(transient("boom")),
            Err(transient("boom")),
            Err(transient("boom")),
        ],
    );
    let fallback = ScriptedProvider::new("fallback", vec![Ok("rescued".to_string())]);
    let dispatcher = Dispatcher::new(vec![primary.clone(), fallback.clone()], config(), 16_000);

    let segment = dispatcher.transcribe_batch(&batch(3, 2.0)).await.unwrap();
    assert_eq!(segment.text, "rescued");
    assert_eq!(segment.model, "fallback");
    assert_eq!(primary.calls(), 3, "primary retried up to max_retries");
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn test_fatal_error_skips_remaining_retries() {
    let primary = ScriptedProvider::new(
        "primary",
        vec![Err(TranscriptionError::Fatal("bad key".to_string()))],
    );
    let fallback = ScriptedProvider::new("fallback", vec![Ok("rescued".to_string())]);
    let dispatcher = Dispatcher::new(vec![primary.clone(), fallback], config(), 16_000);

    let segment = dispatcher.transcribe_batch(&batch(0, 1.0)).await.unwrap();
    assert_eq!(segment.model, "fallback");
    assert_eq!(primary.calls(), 1, "fatal errors are not retried");
}

#[tokio::test]
async fn test_all_models_fail_drops_batch() {
    let primary = ScriptedProvider::new(
        "primary",
        (0..3).map(|_| Err(transient("down"))).collect(),
    );
    let fallback = ScriptedProvider::new(
        "fallback",
        (0..3).map(|_| Err(transient("down"))).collect(),
    );
    let dispatcher = Dispatcher::new(vec![primary, fallback.clone()], config(), 16_000);

    assert!(dispatcher.transcribe_batch(&batch(0, 1.0)).await.is_none());
    assert_eq!(fallback.calls(), 3);

    let stats = dispatcher.stats();
    assert_eq!(stats["primary"].successful_requests, 0);
    assert_eq!(stats["primary"].failed_requests, 3);
    assert_eq!(stats["fallback"].failed_requests, 3);
}

#[tokio::test]
async fn test_single_provider_behaves_like_chain_of_one() {
    let only = ScriptedProvider::new("primary", vec![Ok("solo".to_string())]);
    let dispatcher = Dispatcher::new(
        vec![only],
        TranscriptionConfig {
            fallback_models: vec![],
            ..config()
        },
        16_000,
    );
    let segment = dispatcher.transcribe_batch(&batch(0, 1.0)).await.unwrap();
    assert_eq!(segment.text, "solo");
}

#[tokio::test]
async fn test_run_delivers_in_sequence_order() {
    let provider = ScriptedProvider::new("primary", vec![]);
    let dispatcher = Arc::new(Dispatcher::new(vec![provider], config(), 16_000));
    let queue = Arc::new(BatchQueue::new("batch", 10));
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    for seq in 0..5 {
        queue.push(batch(seq, 1.0));
    }

    let handle = tokio::spawn(dispatcher.run(queue.clone(), tx, cancel.clone()));

    let mut sequences = Vec::new();
    for _ in 0..5 {
        let segment = rx.recv().await.expect("segment delivered");
        sequences.push(segment.batch_sequence);
    }
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_drains_queue_on_cancel() {
    let provider = ScriptedProvider::new("primary", vec![]);
    let dispatcher = Arc::new(Dispatcher::new(vec![provider], config(), 16_000));
    let queue = Arc::new(BatchQueue::new("batch", 10));
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    queue.push(batch(0, 1.0));
    queue.push(batch(1, 1.0));
    cancel.cancel();

    let handle = tokio::spawn(dispatcher.run(queue, tx, cancel));
    handle.await.unwrap().unwrap();

    assert_eq!(rx.recv().await.unwrap().batch_sequence, 0);
    assert_eq!(rx.recv().await.unwrap().batch_sequence, 1);
    assert!(rx.recv().await.is_none(), "sender dropped after drain");
}

#[tokio::test]
async fn test_failed_batches_leave_gaps_but_keep_order() {
    // Batch 1 fails on every model and is dropped; 0 and 2 still arrive in
    // increasing order.
    let script = vec![
        Ok("first".to_string()),
        Err(transient("down")),
        Err(transient("down")),
        Err(transient("down")),
        Ok("third".to_string()),
    ];
    let provider = ScriptedProvider::new("primary", script);
    let dispatcher = Arc::new(Dispatcher::new(
        vec![provider],
        TranscriptionConfig {
            fallback_models: vec![],
            ..config()
        },
        16_000,
    ));
    let queue = Arc::new(BatchQueue::new("batch", 10));
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    for seq in 0..3 {
        queue.push(batch(seq, 1.0));
    }
    cancel.cancel();
    tokio::spawn(dispatcher.run(queue, tx, cancel));

    assert_eq!(rx.recv().await.unwrap().batch_sequence, 0);
    assert_eq!(rx.recv().await.unwrap().batch_sequence, 2);
    assert!(rx.recv().await.is_none());
}
