//! Token workloads for exercising the allocators
//!
//! Mimics what a tokenizer front end does: every token gets a pooled
//! record holding its bytes and is pushed onto a string stack. Half of the
//! records are then released, as short-lived phrase entries would be, and
//! the stack is unwound.

use crate::config::MemConfig;
use crate::error::{Error, Result};
use crate::pool::local::{release_thread_storage, with_thread_storage};
use crate::pool::{Handle, StackStats, StorageStats, StringStack, TieredStorage};
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of one workload run
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    pub tokens: usize,
    pub bytes: usize,
    /// Tokens too long for a string block
    pub skipped_strings: usize,
    /// Storage after every second record was released
    pub storage: StorageStats,
    /// String stack with every token pushed
    pub strings: StackStats,
    pub elapsed_micros: u128,
}

/// Generate `count` tokens of varying length
///
/// Lengths cycle through 1..=97 bytes plus a numeric suffix, so a default
/// storage sees both pooled and direct sizes.
pub fn synthetic_tokens(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("{}{}", "w".repeat(i % 97 + 1), i).into_bytes())
        .collect()
}

/// Split text into whitespace-separated tokens
pub fn tokenize(text: &str) -> Vec<&[u8]> {
    text.split_whitespace().map(str::as_bytes).collect()
}

fn drive<T: AsRef<[u8]>>(
    storage: &mut TieredStorage,
    stack: &mut StringStack,
    tokens: &[T],
) -> Result<(usize, usize)> {
    let mut live: Vec<(Handle, usize)> = Vec::with_capacity(tokens.len());
    let mut bytes = 0;
    let mut skipped = 0;

    for token in tokens {
        let token = token.as_ref();
        if token.is_empty() {
            continue;
        }
        let handle = storage.allocate(token.len())?;
        storage.get_mut(handle, token.len())?.copy_from_slice(token);
        live.push((handle, token.len()));
        bytes += token.len();

        match stack.push(token) {
            Ok(_) => {}
            Err(Error::StringTooLong { len, .. }) => {
                debug!(len, "Token skipped by string stack");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    for &(handle, size) in live.iter().skip(1).step_by(2) {
        storage.free(handle, size)?;
    }

    Ok((bytes, skipped))
}

fn unwind(stack: &mut StringStack) -> Result<()> {
    while !stack.is_empty() {
        stack.pop()?;
    }
    Ok(())
}

/// Run the workload on a storage and stack built from `config`
pub fn run<T: AsRef<[u8]>>(tokens: &[T], config: &MemConfig) -> Result<WorkloadReport> {
    let start = Instant::now();
    let mut storage = config.storage.build()?;
    let mut stack = config.strings.build()?;

    let (bytes, skipped_strings) = drive(&mut storage, &mut stack, tokens)?;
    let report = WorkloadReport {
        tokens: tokens.len(),
        bytes,
        skipped_strings,
        storage: storage.stats(),
        strings: stack.stats(),
        elapsed_micros: 0,
    };
    unwind(&mut stack)?;

    let elapsed_micros = start.elapsed().as_micros();
    info!(tokens = report.tokens, elapsed_micros, "Workload finished");
    Ok(WorkloadReport {
        elapsed_micros,
        ..report
    })
}

/// Run `f` on this thread's storage, then release it
///
/// The storage is dropped whether or not `f` succeeds, so the next chunk a
/// worker picks up starts from an empty storage.
fn with_chunk_storage<R>(
    config: &MemConfig,
    f: impl FnOnce(&mut TieredStorage) -> Result<R>,
) -> Result<(R, StorageStats)> {
    let outcome = with_thread_storage(&config.storage, f)?;
    let stats = release_thread_storage().unwrap_or_default();
    Ok((outcome?, stats))
}

/// Run the workload split across `workers` threads
///
/// Each worker uses its own thread-local storage, so no allocator is ever
/// shared between threads. Returns one report per chunk of tokens.
pub fn run_parallel<T: AsRef<[u8]> + Sync>(
    tokens: &[T],
    config: &MemConfig,
    workers: usize,
) -> Result<Vec<WorkloadReport>> {
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| Error::InvalidArgument(format!("Failed to start workers: {}", e)))?;
    let chunk = tokens.len().div_ceil(workers).max(1);

    info!(workers, chunk, "Starting parallel workload");
    pool.install(|| {
        tokens
            .par_chunks(chunk)
            .map(|chunk| -> Result<WorkloadReport> {
                let start = Instant::now();
                let mut stack = config.strings.build()?;
                let ((bytes, skipped_strings), storage) =
                    with_chunk_storage(config, |storage| drive(storage, &mut stack, chunk))?;
                let strings = stack.stats();
                unwind(&mut stack)?;

                Ok(WorkloadReport {
                    tokens: chunk.len(),
                    bytes,
                    skipped_strings,
                    storage,
                    strings,
                    elapsed_micros: start.elapsed().as_micros(),
                })
            })
            .collect()
    })
}
