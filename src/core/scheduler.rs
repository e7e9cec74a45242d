//! Outbound audio pacing
//!
//! Synthesized audio arrives in bursts. The scheduler cuts it into fixed-size
//! frames and hands them to the transport one at a time, never sooner than one
//! frame duration after the previous frame, so at most one frame of reply
//! audio is ever ahead of playback. `flush` discards everything queued and
//! suppresses a frame that was already dequeued, which bounds barge-in latency
//! to about one frame.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::audio::{FrameFormat, PcmFramer};
use super::events::{EventSender, SessionEvent};

struct OutboundQueue {
    frames: VecDeque<Bytes>,
    framer: PcmFramer,
}

/// Single-producer, single-consumer paced frame queue
pub struct OutboundScheduler {
    format: FrameFormat,
    queue: Mutex<OutboundQueue>,
    /// Bumped by every flush; frames dequeued under an older value are dropped
    generation: AtomicU64,
    in_flight: AtomicBool,
    wake: Notify,
    idle: Notify,
    /// Wakes a send that is waiting on a full sink when its frame goes stale
    flushed: Notify,
    transmitted: AtomicU64,
    suppressed: AtomicU64,
}

impl std::fmt::Debug for OutboundScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundScheduler")
            .field("format", &self.format)
            .field("queued", &self.queued_frames())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

impl OutboundScheduler {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            queue: Mutex::new(OutboundQueue {
                frames: VecDeque::new(),
                framer: PcmFramer::new(format),
            }),
            generation: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
            wake: Notify::new(),
            idle: Notify::new(),
            flushed: Notify::new(),
            transmitted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Queue synthesized audio; a partial trailing frame waits for more bytes
    pub fn enqueue(&self, audio: &[u8]) -> usize {
        let added = {
            let mut queue = self.queue.lock();
            let frames = queue.framer.push(audio);
            let added = frames.len();
            queue.frames.extend(frames.into_iter().map(|f| f.data));
            added
        };
        if added > 0 {
            self.wake.notify_one();
        }
        added
    }

    /// Zero-pad and queue whatever partial frame is carried over
    pub fn finish(&self) -> bool {
        let tail = {
            let mut queue = self.queue.lock();
            match queue.framer.finish() {
                Some(frame) => {
                    queue.frames.push_back(frame.data);
                    true
                }
                None => false,
            }
        };
        if tail {
            self.wake.notify_one();
        }
        tail
    }

    /// Queue a complete reply in one call
    pub fn enqueue_complete(&self, audio: &[u8]) -> usize {
        self.enqueue(audio) + usize::from(self.finish())
    }

    /// Current flush generation
    pub fn epoch(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Like [`enqueue`](Self::enqueue), but refuses once a flush has happened
    /// since `epoch` was read. Returns `None` when refused.
    pub fn try_enqueue(&self, epoch: u64, audio: &[u8]) -> Option<usize> {
        let added = {
            let mut queue = self.queue.lock();
            if self.generation.load(Ordering::Acquire) != epoch {
                return None;
            }
            let frames = queue.framer.push(audio);
            let added = frames.len();
            queue.frames.extend(frames.into_iter().map(|f| f.data));
            added
        };
        if added > 0 {
            self.wake.notify_one();
        }
        Some(added)
    }

    /// Like [`finish`](Self::finish), but refuses once a flush has happened
    /// since `epoch` was read.
    pub fn try_finish(&self, epoch: u64) -> Option<bool> {
        let tail = {
            let mut queue = self.queue.lock();
            if self.generation.load(Ordering::Acquire) != epoch {
                return None;
            }
            match queue.framer.finish() {
                Some(frame) => {
                    queue.frames.push_back(frame.data);
                    true
                }
                None => false,
            }
        };
        if tail {
            self.wake.notify_one();
        }
        Some(tail)
    }

    /// Drop all queued audio and suppress any frame already dequeued.
    ///
    /// Returns the number of frames discarded from the queue.
    pub fn flush(&self) -> usize {
        let dropped = {
            let mut queue = self.queue.lock();
            let dropped = queue.frames.len();
            queue.frames.clear();
            queue.framer.clear();
            self.generation.fetch_add(1, Ordering::AcqRel);
            dropped
        };
        debug!(dropped, "Outbound queue flushed");
        self.flushed.notify_waiters();
        self.idle.notify_waiters();
        dropped
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.lock().frames.len()
    }

    /// No frames queued and none being transmitted
    pub fn is_idle(&self) -> bool {
        let queue = self.queue.lock();
        queue.frames.is_empty() && !self.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once everything queued so far has been transmitted or flushed
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn transmitted_frames(&self) -> u64 {
        self.transmitted.load(Ordering::Relaxed)
    }

    pub fn suppressed_frames(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    fn pop(&self) -> Option<(Bytes, u64)> {
        let mut queue = self.queue.lock();
        let frame = queue.frames.pop_front()?;
        self.in_flight.store(true, Ordering::Release);
        Some((frame, self.generation.load(Ordering::Acquire)))
    }

    fn complete_in_flight(&self) {
        let drained = {
            let queue = self.queue.lock();
            self.in_flight.store(false, Ordering::Release);
            queue.frames.is_empty()
        };
        if drained {
            self.idle.notify_waiters();
        }
    }

    /// Start the pacing loop on its own task
    pub fn spawn(self: &Arc<Self>, sink: EventSender, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run(sink, cancel).await })
    }

    /// Pacing loop: one frame per frame duration until cancelled or the sink closes
    pub async fn run(&self, sink: EventSender, cancel: CancellationToken) {
        let frame_duration = self.format.frame_duration();
        let mut next_send: Option<Instant> = None;

        loop {
            let (frame, generation) = loop {
                if let Some(item) = self.pop() {
                    break item;
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Pacing loop cancelled");
                        return;
                    }
                    _ = self.wake.notified() => {}
                }
            };

            if let Some(at) = next_send {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.complete_in_flight();
                        debug!("Pacing loop cancelled");
                        return;
                    }
                    _ = sleep_until(at) => {}
                }
            }

            let flushed = self.flushed.notified();
            tokio::pin!(flushed);
            flushed.as_mut().enable();
            if self.generation.load(Ordering::Acquire) != generation {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                trace!("Suppressed stale outbound frame");
                self.complete_in_flight();
                continue;
            }

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.complete_in_flight();
                    debug!("Pacing loop cancelled");
                    return;
                }
                _ = &mut flushed => {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    trace!("Suppressed outbound frame waiting on a full sink");
                    self.complete_in_flight();
                    continue;
                }
                sent = sink.send(SessionEvent::Audio(frame)) => sent,
            };
            if sent.is_err() {
                self.complete_in_flight();
                debug!("Outbound sink closed, stopping pacing loop");
                return;
            }
            next_send = Some(Instant::now() + frame_duration);
            self.transmitted.fetch_add(1, Ordering::Relaxed);
            self.complete_in_flight();
        }
    }
}
