// src/resize.rs
//
// Resize pipeline: requests flow
//
//   Image::resize -> ResizeQueue (dedup, flush tick)
//                 -> ResizeService (worker pool, dispatch tick)
//                 -> ProcessBuilder -> ProcessRunner
//
// and results flow back through the observers registered on the way in.
//
// This file is a facade over the modules in resize/

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod builder;
mod common;
mod pool;
mod process;
mod queue;

pub use builder::{ProcessBuilder, ResizeCommand, ResizeOptions, DEFAULT_BATCH_LIMIT};
pub use common::{
    ResizeNotice, ResizeOutcome, ResizeQueue, ResizeQueueObserver, ResizeService,
    ResizeServiceObserver, ResizeTicket, Variation,
};
pub use pool::{WorkerPool, DEFAULT_CONCURRENCY, PROCESS_TIMEOUT};
pub use process::{ProcessExit, ProcessRunner, SystemProcessRunner, TERMINATE_GRACE};
pub use queue::BackgroundResizeQueue;
