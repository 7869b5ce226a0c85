//! Two-lane work queue shared by the scan workers.
//!
//! Top-level files are served first-in first-out. Archive members go on a
//! stack so a container's subtree drains before new files start, and at most
//! `member_limit` workers handle members at any one time. A job counts as
//! outstanding from `push` until `done`, which is what lets idle workers tell
//! "nothing queued right now" apart from "nothing left at all".

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    File,
    Member,
}

struct QueueState<T> {
    files: VecDeque<T>,
    members: Vec<T>,
    outstanding: usize,
    members_running: usize,
    closed: bool,
}

pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
    member_limit: usize,
}

impl<T> WorkQueue<T> {
    pub fn new(member_limit: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                files: VecDeque::new(),
                members: Vec::new(),
                outstanding: 0,
                members_running: 0,
                closed: false,
            }),
            ready: Condvar::new(),
            member_limit: member_limit.max(1),
        }
    }

    /// Queue a job. Returns `false` once the queue is closed.
    pub fn push(&self, item: T, lane: Lane) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        match lane {
            Lane::File => state.files.push_back(item),
            Lane::Member => state.members.push(item),
        }
        state.outstanding += 1;
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Block until a job is available. `None` means the queue is closed or
    /// every job has completed.
    pub fn next(&self) -> Option<(T, Lane)> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if state.members_running < self.member_limit {
                if let Some(item) = state.members.pop() {
                    state.members_running += 1;
                    return Some((item, Lane::Member));
                }
            }
            if let Some(item) = state.files.pop_front() {
                return Some((item, Lane::File));
            }
            if state.outstanding == 0 {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Mark a job from [`next`](Self::next) as finished. Jobs it queued must
    /// already be pushed.
    pub fn done(&self, lane: Lane) {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        if lane == Lane::Member {
            state.members_running = state.members_running.saturating_sub(1);
        }
        drop(state);
        self.ready.notify_all();
    }

    /// Stop handing out work and drop everything still queued. Returns the
    /// number of dropped jobs.
    pub fn close(&self) -> usize {
        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }
        state.closed = true;
        let dropped = state.files.len() + state.members.len();
        state.files.clear();
        state.members.clear();
        state.outstanding = state.outstanding.saturating_sub(dropped);
        drop(state);
        self.ready.notify_all();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
