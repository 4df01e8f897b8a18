// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Two-way fan-out of a single stream
//!
//! [`tee`] splits one upstream into two readers. Each reader keeps its own
//! cursor into a shared buffer; an item stays buffered only until the slower
//! live reader has seen it. The faster reader may run at most `capacity`
//! items ahead, so a stalled reader stalls upstream too. Dropping one reader
//! never stalls the other.

use futures::task::{waker_ref, ArcWake};
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

/// Lookahead used by [`tee`].
pub const DEFAULT_TEE_CAPACITY: usize = 64;

/// Split `upstream` into two independent readers.
pub fn tee<S>(upstream: S) -> (TeeStream<S>, TeeStream<S>)
where
    S: Stream + Unpin,
    S::Item: Clone,
{
    tee_with_capacity(upstream, DEFAULT_TEE_CAPACITY)
}

/// Like [`tee`], with the faster reader held to `capacity` items ahead.
pub fn tee_with_capacity<S>(upstream: S, capacity: usize) -> (TeeStream<S>, TeeStream<S>)
where
    S: Stream + Unpin,
    S::Item: Clone,
{
    let shared = Arc::new(Mutex::new(Shared {
        upstream,
        capacity: capacity.max(1),
        finished: false,
        buffer: VecDeque::new(),
        base: 0,
        cursors: [Some(0), Some(0)],
        waker: Arc::new(SideWakers::default()),
    }));
    (
        TeeStream {
            shared: Arc::clone(&shared),
            side: 0,
        },
        TeeStream { shared, side: 1 },
    )
}

/// One reader of a [`tee`].
pub struct TeeStream<S: Stream> {
    shared: Arc<Mutex<Shared<S>>>,
    side: usize,
}

struct Shared<S: Stream> {
    upstream: S,
    capacity: usize,
    finished: bool,
    buffer: VecDeque<S::Item>,
    /// Sequence number of `buffer[0]`.
    base: u64,
    /// Next sequence number per reader; `None` once that reader is dropped.
    cursors: [Option<u64>; 2],
    waker: Arc<SideWakers>,
}

/// Wakes whichever readers are waiting on upstream.
#[derive(Default)]
struct SideWakers {
    wakers: Mutex<[Option<Waker>; 2]>,
}

impl SideWakers {
    fn register(&self, side: usize, waker: &Waker) {
        let mut wakers = lock(&self.wakers);
        match &wakers[side] {
            Some(existing) if existing.will_wake(waker) => {}
            _ => wakers[side] = Some(waker.clone()),
        }
    }

    fn wake_side(&self, side: usize) {
        let waker = lock(&self.wakers)[side].take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl ArcWake for SideWakers {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let taken: Vec<Waker> = lock(&arc_self.wakers)
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        for waker in taken {
            waker.wake();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<S> Shared<S>
where
    S: Stream + Unpin,
    S::Item: Clone,
{
    fn poll_side(&mut self, side: usize, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        let Some(cursor) = self.cursors[side] else {
            return Poll::Ready(None);
        };

        let offset = (cursor - self.base) as usize;
        if let Some(item) = self.buffer.get(offset).cloned() {
            self.cursors[side] = Some(cursor + 1);
            self.trim();
            // The other reader may be waiting for buffer room.
            self.waker.wake_side(1 - side);
            return Poll::Ready(Some(item));
        }

        if self.finished {
            return Poll::Ready(None);
        }

        if self.cursors[1 - side].is_some() && self.buffer.len() >= self.capacity {
            self.waker.register(side, cx.waker());
            return Poll::Pending;
        }

        self.waker.register(side, cx.waker());
        let polled = {
            let waker = waker_ref(&self.waker);
            let mut upstream_cx = Context::from_waker(&waker);
            Pin::new(&mut self.upstream).poll_next(&mut upstream_cx)
        };
        match polled {
            Poll::Ready(Some(item)) => {
                self.buffer.push_back(item.clone());
                self.cursors[side] = Some(cursor + 1);
                self.trim();
                self.waker.wake_side(1 - side);
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                self.finished = true;
                self.waker.wake_side(1 - side);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    /// Drop items every live reader has already seen.
    fn trim(&mut self) {
        let slowest = self.cursors.iter().flatten().min().copied();
        let keep_from = slowest.unwrap_or(self.base + self.buffer.len() as u64);
        while self.base < keep_from && self.buffer.pop_front().is_some() {
            self.base += 1;
        }
    }
}

impl<S: Stream> TeeStream<S> {
    /// Items buffered for the slower reader.
    pub fn buffered(&self) -> usize {
        lock(&self.shared).buffer.len()
    }
}

impl<S> Stream for TeeStream<S>
where
    S: Stream + Unpin,
    S::Item: Clone,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut shared = lock(&this.shared);
        shared.poll_side(this.side, cx)
    }
}

impl<S: Stream> Drop for TeeStream<S> {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        shared.cursors[self.side] = None;
        let other = shared.cursors[1 - self.side];
        let keep_from = other.unwrap_or(shared.base + shared.buffer.len() as u64);
        while shared.base < keep_from && shared.buffer.pop_front().is_some() {
            shared.base += 1;
        }
        shared.waker.wake_side(1 - self.side);
    }
}
