//! Generators which run on their own thread.

use crate::error::{Error, Result};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
    },
    thread::JoinHandle,
    time::Duration,
};

/// The default queue depth.
pub const DEFAULT_QUEUE_SIZE: usize = 65536;

/// How long either side waits before looking at the stop flag again.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A flag which stops a [`ThreadedGenerator`] from any thread.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Asks the generator to stop. The consumer sees the end of the sequence
    /// within one poll interval and the producer exits at its next push.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// An iterator whose items are produced by another iterator running on a
/// dedicated thread, through a bounded queue.
///
/// The first error from the source is logged and ends the sequence. Dropping
/// the generator stops the producer without waiting for it.
pub struct ThreadedGenerator<T> {
    receiver: Receiver<T>,
    stop: StopHandle,
    producer: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> ThreadedGenerator<T> {
    /// Starts a producer thread which pulls from `source` until it is
    /// exhausted, fails, or is stopped. At most `queue_size` items are
    /// produced ahead of the consumer.
    pub fn new<I>(source: I, queue_size: usize) -> Result<Self>
    where
        I: Iterator<Item = Result<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(queue_size.max(1));
        let stop = StopHandle::default();
        let producer = {
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("generator".into())
                .spawn(move || produce(source, &tx, &stop))
                .map_err(Error::from)?
        };

        Ok(Self {
            receiver: rx,
            stop,
            producer: Some(producer),
        })
    }

    /// A handle which stops this generator.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stops the generator.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Stops the generator and waits for the producer to exit.
    pub fn join(mut self) {
        self.stop.stop();
        if let Some(producer) = self.producer.take()
            && producer.join().is_err()
        {
            log::error!("Generator thread panicked");
        }
    }
}

impl<T> Iterator for ThreadedGenerator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.stop.is_stopped() {
                return None;
            }
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(item) => return Some(item),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl<T> Drop for ThreadedGenerator<T> {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/// The producer thread main loop.
fn produce<T, I>(source: I, tx: &SyncSender<T>, stop: &StopHandle)
where
    I: Iterator<Item = Result<T>>,
{
    let mut count = 0_usize;
    // Runs on panic too, so a dead producer is never silent.
    let mut count = scopeguard::guard(&mut count, |count| {
        log::debug!("Generator thread exiting after {count} item(s)");
    });

    for item in source {
        let mut item = match item {
            Ok(item) => item,
            Err(err) => {
                log::error!("Generator failed: {err}");
                return;
            }
        };

        loop {
            if stop.is_stopped() {
                return;
            }
            match tx.try_send(item) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    item = back;
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
        **count += 1;
    }
}
