//! ClipForge - Group Discussion Highlight Pipeline
//!
//! Library for organizing multi-microphone discussion recordings into
//! status folders, transcribing them through an external diarization
//! service, running an LLM highlight analysis over the aggregated
//! transcript, and cutting shareable audio clips of the winning moments.

pub mod aggregate;
pub mod analyze;
pub mod classify;
pub mod cli;
pub mod clips;
pub mod clock;
pub mod config;
pub mod error;
pub mod folders;
pub mod media;
pub mod pipeline;
pub mod session;
pub mod speakers;
pub mod stats;
pub mod storage;
pub mod transcribe;
