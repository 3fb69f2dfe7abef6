//! Segmentation: pairs upstream transcript text with silence-delimited PCM
//! audio into client-ready segments and turns.

pub mod audio_extract;
pub mod engine;
pub mod transcript;

pub use audio_extract::{extract_audio, AudioChunk, ExtractResult};
pub use engine::{EngineEvent, SegmentCommit, SegmentDiagnostics, SegmentationEngine, TurnCommit};
pub use transcript::{extract_transcript, is_generation_complete, split_sentences, SplitTranscript};
