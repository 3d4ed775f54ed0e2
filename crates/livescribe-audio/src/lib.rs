pub mod frame;
pub mod queue;
pub mod segmenter;
pub mod transcription;
pub mod wav;

pub use frame::{AudioBatch, AudioFrame, SampleSource};
pub use queue::{BatchQueue, DropOldestQueue, FrameQueue};
pub use segmenter::{SegmenterStats, SilenceDetector, VadSegmenter};
pub use transcription::{
    Dispatcher, ModelStats, TranscriptSegment, TranscriptSpan, TranscriptionEngine,
    TranscriptionError, TranscriptionProvider,
};
