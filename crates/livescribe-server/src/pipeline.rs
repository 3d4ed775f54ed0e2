//! Wiring of the audio path: capture source → recording gate → segmenter →
//! batch queue → dispatcher → context store → broadcast.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use livescribe_audio::transcription::Dispatcher;
use livescribe_audio::{
    AudioFrame, BatchQueue, FrameQueue, SampleSource, TranscriptSegment, VadSegmenter,
};

use crate::protocol::{Outbound, TranscriptPayload};
use crate::state::AppState;

/// Capacity of the capture → segmenter queue, in frames.
const FRAME_QUEUE_CAPACITY: usize = 256;
/// Depth of the dispatcher → delivery channel.
const SEGMENT_CHANNEL_CAPACITY: usize = 64;

pub struct Pipeline {
    pub tasks: Vec<JoinHandle<()>>,
}

/// Spawns the four pipeline tasks. Shutdown order on cancellation: the
/// source stops, the segmenter force-flushes its pending audio, and only
/// then is the dispatcher released to drain the batch queue.
pub fn spawn_pipeline(
    state: Arc<AppState>,
    mut source: Box<dyn SampleSource>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Pipeline {
    let frame_queue = Arc::new(FrameQueue::for_frames(FRAME_QUEUE_CAPACITY));
    let batch_queue = Arc::new(BatchQueue::for_batches());
    let (segment_tx, segment_rx) = mpsc::channel(SEGMENT_CHANNEL_CAPACITY);
    let dispatcher_cancel = CancellationToken::new();

    // Capture: pull frames from the source into the bounded frame queue.
    let source_task = {
        let frame_queue = frame_queue.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = source.start().await {
                error!("audio source failed to start: {e:#}");
                return;
            }
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    frame = source.next_frame() => match frame {
                        Ok(Some(frame)) => frame_queue.push(frame),
                        Ok(None) => {}
                        Err(e) => {
                            warn!("audio source read failed: {e:#}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
            if let Err(e) = source.stop().await {
                warn!("audio source failed to stop cleanly: {e:#}");
            }
            debug!("audio source task stopped");
        })
    };

    // Segmentation: the recording gate sits in front of the segmenter, so
    // frames consumed while recording is disabled never advance its state.
    let segment_task = {
        let state = state.clone();
        let batch_queue = batch_queue.clone();
        let shutdown = shutdown.clone();
        let dispatcher_cancel = dispatcher_cancel.clone();
        let config = state.config.segmenter.clone();
        tokio::spawn(async move {
            let mut segmenter = VadSegmenter::new(config);
            loop {
                let frame: AudioFrame = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    frame = frame_queue.pop() => frame,
                };
                if !state.recording_enabled() {
                    continue;
                }
                if let Some(batch) = segmenter.push_frame(&frame) {
                    batch_queue.push(batch);
                }
            }
            if let Some(batch) = segmenter.force_flush() {
                batch_queue.push(batch);
            }
            // Release the dispatcher only after the final batch is queued
            dispatcher_cancel.cancel();
            debug!("segmenter task stopped");
        })
    };

    let dispatcher_task = {
        let batch_queue = batch_queue.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.run(batch_queue, segment_tx, dispatcher_cancel).await {
                error!("transcription dispatcher aborted: {e:#}");
            }
        })
    };

    // Delivery: context store first, then fan-out, so Q&A prompts issued
    // after a broadcast always see the segment.
    let delivery_task = {
        let state = state.clone();
        tokio::spawn(async move {
            let mut segment_rx = segment_rx;
            while let Some(segment) = segment_rx.recv().await {
                deliver_segment(&state, segment).await;
            }
            debug!("transcript delivery task stopped");
        })
    };

    info!("audio pipeline started");
    Pipeline {
        tasks: vec![source_task, segment_task, dispatcher_task, delivery_task],
    }
}

async fn deliver_segment(state: &Arc<AppState>, segment: TranscriptSegment) {
    info!(
        "[{}] {}",
        segment.timestamp.format("%H:%M:%S"),
        segment.text
    );
    state.context.append(segment.clone()).await;
    state
        .sessions
        .broadcast(&Outbound::Transcript {
            content: TranscriptPayload {
                text: segment.text,
                timestamp: segment.timestamp,
                batch_id: segment.batch_sequence,
            },
        })
        .await;
}

/// Reads signed 16-bit little-endian PCM from standard input, one chunk per
/// frame. Pairs with any loopback capture tool that can pipe raw PCM
/// (`parec --format=s16le --rate=16000 --channels=1 | livescribe`).
pub struct StdinPcmSource {
    sample_rate: u32,
    channels: u16,
    chunk_samples: usize,
    stdin: Option<tokio::io::Stdin>,
    eof: bool,
}

impl StdinPcmSource {
    pub fn new(sample_rate: u32, channels: u16, chunk_samples: usize) -> Self {
        Self {
            sample_rate,
            channels,
            chunk_samples,
            stdin: None,
            eof: false,
        }
    }
}

#[async_trait::async_trait]
impl SampleSource for StdinPcmSource {
    async fn start(&mut self) -> anyhow::Result<()> {
        self.stdin = Some(tokio::io::stdin());
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.stdin = None;
        Ok(())
    }

    async fn next_frame(&mut self) -> anyhow::Result<Option<AudioFrame>> {
        use tokio::io::AsyncReadExt;

        if self.eof {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(None);
        }
        let Some(stdin) = self.stdin.as_mut() else {
            anyhow::bail!("source not started");
        };

        let mut buf = vec![0u8; self.chunk_samples * 2];
        let mut filled = 0;
        while filled < buf.len() {
            match stdin.read(&mut buf[filled..]).await {
                Ok(0) => {
                    info!("audio input reached end of stream");
                    self.eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }

        let samples: Vec<i16> = buf[..filled - filled % 2]
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Some(AudioFrame::new(
            samples,
            Utc::now(),
            self.sample_rate,
            self.channels,
        )))
    }
}

/// Produces no audio. Used when the process runs without a capture feed,
/// serving Q&A and knowledge-base traffic only.
pub struct SilentSource;

#[async_trait::async_trait]
impl SampleSource for SilentSource {
    async fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn next_frame(&mut self) -> anyhow::Result<Option<AudioFrame>> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(None)
    }
}
