use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::entity::Entity;
use crate::error::Error;
use crate::eval::Context;
use crate::reader;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parses and evaluates a batch synchronously, with no deadline.
pub fn eval_source(source: &str) -> Result<Vec<Entity>, Error> {
    eval_with_flag(source, Arc::new(AtomicBool::new(false)))
}

fn eval_with_flag(source: &str, kill: Arc<AtomicBool>) -> Result<Vec<Entity>, Error> {
    let nodes = reader::parse(source.as_bytes())?;
    let mut context = Context::new(source, kill);
    Ok(context.evaluate_program(&nodes)?)
}

pub fn run(source: &str) -> Result<Vec<String>, Error> {
    run_with_timeout(source, DEFAULT_TIMEOUT)
}

/// Runs a batch on a worker thread under a wall-clock deadline, yielding the
/// rendering of every top-level result in order. On expiry the worker is told
/// to stop through the shared flag and abandoned; whatever it produces
/// afterwards is discarded, and nothing is retried.
pub fn run_with_timeout(source: &str, timeout: Duration) -> Result<Vec<String>, Error> {
    let kill = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&kill);
    let (sender, receiver) = mpsc::channel();
    let source = source.to_string();

    debug!(?timeout, "starting evaluation worker");
    thread::spawn(move || {
        let result = eval_with_flag(&source, flag)
            .map(|values| values.iter().map(ToString::to_string).collect::<Vec<_>>());
        let _ = sender.send(result);
    });

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            kill.store(true, Ordering::Relaxed);
            warn!(?timeout, "evaluation timed out, abandoning the worker");
            Err(Error::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => {
            panic!("eval bug: worker exited without reporting a result")
        }
    }
}
