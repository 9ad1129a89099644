use crate::Communicator;
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::trace;
use num::complex::Complex64;
use parking_lot::Mutex;
use std::fmt;
use std::panic;

#[derive(Debug)]
struct Message {
    sequence: u64,
    source: usize,
    payload: Vec<Complex64>,
}

#[derive(Debug, Default)]
struct ExchangeState {
    // Number of completed collective calls on this rank
    sequence: u64,
    // Messages that belong to a later collective call than the one in progress
    pending: Vec<Message>,
}

/// One rank of an in-process group whose ranks run on separate threads.
///
/// Ranks are connected pairwise by unbounded channels, so sends never block and the only
/// blocking point is waiting for the messages of the current collective call.
pub struct ThreadComm {
    rank: usize,
    senders: Vec<Sender<Message>>,
    receiver: Receiver<Message>,
    state: Mutex<ExchangeState>,
}

impl fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.senders.len())
            .finish()
    }
}

impl ThreadComm {
    /// Creates the communicators of a group with `size` ranks, ordered by rank.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a process group must have at least one rank");
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ThreadComm {
                rank,
                senders: senders.clone(),
                receiver,
                state: Mutex::new(ExchangeState::default()),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn all_to_all(&self, send: Vec<Vec<Complex64>>) -> Vec<Vec<Complex64>> {
        let size = self.size();
        assert_eq!(send.len(), size, "all_to_all requires exactly one buffer per rank");

        let mut state = self.state.lock();
        let sequence = state.sequence;
        trace!("rank {} entering collective #{}", self.rank, sequence);

        for (target, payload) in send.into_iter().enumerate() {
            let message = Message {
                sequence,
                source: self.rank,
                payload,
            };
            self.senders[target]
                .send(message)
                .expect("Peer rank hung up during a collective call");
        }

        let mut received: Vec<Option<Vec<Complex64>>> = vec![None; size];
        let mut remaining = size;

        // A peer can be at most one collective call ahead of us, so anything that arrived early
        // is parked in the pending list until the matching call is made
        let pending = std::mem::take(&mut state.pending);
        for message in pending {
            if message.sequence == sequence {
                received[message.source] = Some(message.payload);
                remaining -= 1;
            } else {
                state.pending.push(message);
            }
        }

        while remaining > 0 {
            let message = self
                .receiver
                .recv()
                .expect("Process group disconnected during a collective call");
            if message.sequence == sequence {
                debug_assert!(received[message.source].is_none());
                received[message.source] = Some(message.payload);
                remaining -= 1;
            } else {
                state.pending.push(message);
            }
        }

        state.sequence += 1;
        received
            .into_iter()
            .map(|buffer| buffer.expect("Internal error: every rank must have delivered a buffer"))
            .collect()
    }
}

/// Runs `f` once per rank of a fresh group of `size` ranks, each on its own thread.
///
/// Returns the results ordered by rank. A panic on any rank is propagated to the caller.
pub fn run_group<F, R>(size: usize, f: F) -> Vec<R>
where
    F: Fn(ThreadComm) -> R + Sync,
    R: Send,
{
    let comms = ThreadComm::group(size);
    let f = &f;
    let outcome = crossbeam::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| scope.spawn(move |_| f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| panic::resume_unwind(payload))
            })
            .collect::<Vec<_>>()
    });
    outcome.unwrap_or_else(|payload| panic::resume_unwind(payload))
}
