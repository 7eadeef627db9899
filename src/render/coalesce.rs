//! Order-preserving merge of independently progressing text streams.
//!
//! Every source is drained eagerly by its own task into a private buffer, while the
//! consumer walks a `(source, value)` cursor: it emits source 0 in order, then source 1,
//! and so on. A fast source never waits on a slow one ahead of it; its buffer simply
//! grows until the cursor reaches it. The consumer parks on "value pushed" and "source
//! completed" notifications for exactly the position it is waiting on.
//!
//! Dropping the merged stream aborts every producer task still running.

use crate::element::ChunkStream;
use crate::error::{RenderError, Result};
use crate::events::{EventEmitter, Unsubscribe};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MergeEventKind {
    Data,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MergeEvent {
    stream_ind: usize,
    val_ind: Option<usize>,
}

/// Buffers and completion flags for one merge operation.
#[derive(Debug)]
struct ParallelStreamState {
    values: Vec<Vec<Option<Result<String>>>>,
    completed: Vec<bool>,
}

impl ParallelStreamState {
    fn new(size: usize) -> Self {
        Self {
            values: (0..size).map(|_| Vec::new()).collect(),
            completed: vec![false; size],
        }
    }
}

struct MergeShared {
    state: Mutex<ParallelStreamState>,
    events: EventEmitter<MergeEventKind, MergeEvent>,
}

impl MergeShared {
    fn push(&self, stream_ind: usize, value: Result<String>) {
        let val_ind = {
            let mut state = self.state.lock();
            let buffer = &mut state.values[stream_ind];
            buffer.push(Some(value));
            buffer.len() - 1
        };
        self.events.publish(
            &MergeEventKind::Data,
            &MergeEvent {
                stream_ind,
                val_ind: Some(val_ind),
            },
        );
    }

    fn complete(&self, stream_ind: usize) {
        self.state.lock().completed[stream_ind] = true;
        self.events.publish(
            &MergeEventKind::Complete,
            &MergeEvent {
                stream_ind,
                val_ind: None,
            },
        );
    }
}

enum Step {
    Emit(Result<String>),
    Advance,
    Done,
    Wait(Arc<Notify>, Vec<Unsubscribe>),
}

/// Consumer half of a merge: the cursor plus the producer tasks it owns.
struct ParallelStreams {
    shared: Arc<MergeShared>,
    size: usize,
    cursor: (usize, usize),
    finished: bool,
    // Held only so that dropping the merge aborts the producers.
    _producers: JoinSet<()>,
}

impl ParallelStreams {
    fn spawn(streams: Vec<ChunkStream>) -> Self {
        let size = streams.len();
        let shared = Arc::new(MergeShared {
            state: Mutex::new(ParallelStreamState::new(size)),
            events: EventEmitter::new(),
        });

        let mut producers = JoinSet::new();
        for (stream_ind, mut source) in streams.into_iter().enumerate() {
            let shared = Arc::clone(&shared);
            producers.spawn(async move {
                let drained = AssertUnwindSafe(async {
                    while let Some(item) = source.next().await {
                        let failed = item.is_err();
                        shared.push(stream_ind, item);
                        if failed {
                            break;
                        }
                    }
                })
                .catch_unwind()
                .await;

                // A panicking source still has to complete, or the consumer waits forever.
                if let Err(payload) = drained {
                    shared.push(stream_ind, Err(panic_error(stream_ind, payload.as_ref())));
                }
                shared.complete(stream_ind);
            });
        }

        Self {
            shared,
            size,
            cursor: (0, 0),
            finished: size == 0,
            _producers: producers,
        }
    }

    /// Next value in declared order, or `None` once the last source is drained.
    async fn next_value(&mut self) -> Option<Result<String>> {
        loop {
            if self.finished {
                return None;
            }

            match self.step() {
                Step::Emit(value) => {
                    self.cursor.1 += 1;
                    if value.is_err() {
                        self.finished = true;
                    }
                    return Some(value);
                }
                Step::Advance => {
                    self.cursor = (self.cursor.0 + 1, 0);
                }
                Step::Done => {
                    self.finished = true;
                    return None;
                }
                Step::Wait(wake, subscriptions) => {
                    wake.notified().await;
                    for subscription in subscriptions {
                        subscription.unsubscribe();
                    }
                }
            }
        }
    }

    fn step(&self) -> Step {
        let (stream_ind, val_ind) = self.cursor;
        let mut state = self.shared.state.lock();

        if let Some(slot) = state.values[stream_ind].get_mut(val_ind) {
            if let Some(value) = slot.take() {
                return Step::Emit(value);
            }
        }

        if state.completed[stream_ind] {
            return if stream_ind + 1 == self.size {
                Step::Done
            } else {
                Step::Advance
            };
        }

        // Subscribing while the state lock is held means any push or completion after
        // this check publishes to us; `Notify` keeps the permit if we have not parked yet.
        // Each wait gets its own `Notify` so a permit left by this wait cannot leak into the next.
        let wake = Arc::new(Notify::new());
        let on_data = {
            let wake = Arc::clone(&wake);
            self.shared
                .events
                .subscribe(MergeEventKind::Data, move |event: &MergeEvent| {
                    if event.stream_ind == stream_ind && event.val_ind == Some(val_ind) {
                        wake.notify_one();
                    }
                })
        };
        let on_complete = {
            let wake = Arc::clone(&wake);
            self.shared
                .events
                .subscribe(MergeEventKind::Complete, move |event: &MergeEvent| {
                    if event.stream_ind == stream_ind {
                        wake.notify_one();
                    }
                })
        };
        drop(state);

        Step::Wait(wake, vec![on_data, on_complete])
    }
}

fn panic_error(stream_ind: usize, payload: &(dyn Any + Send)) -> RenderError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    RenderError::other(format!("source {stream_ind} panicked: {message}"))
}

/// Merge `streams` into one stream that emits each source fully, in declared order,
/// while all sources are computed concurrently.
///
/// Must be polled from within a tokio runtime. A source that fails ends the merge once
/// the cursor reaches its error.
pub fn coalesce_parallel_streams(streams: Vec<ChunkStream>) -> ChunkStream {
    if streams.is_empty() {
        return stream::empty().boxed();
    }

    stream::once(async move { ParallelStreams::spawn(streams) })
        .flat_map(|merge| {
            stream::unfold(merge, |mut merge| async move {
                merge.next_value().await.map(|value| (value, merge))
            })
        })
        .boxed()
}
