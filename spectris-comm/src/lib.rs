//! spectris-comm
//! =============
//!
//! Collective communication across a fixed group of processes.
//!
//! The [`Communicator`] trait is the only point at which the ranks of a group interact. Every
//! collective call must be made by *all* ranks of the group, in the same order, otherwise the
//! group stalls. There is no timeout or cancellation: a stalled collective is a deployment
//! failure and not something a caller can recover from.
use num::complex::Complex64;
use std::fmt::Debug;

mod thread;

pub use thread::{run_group, ThreadComm};

/// A fixed group of ranks that can exchange buffers of complex numbers.
pub trait Communicator: Send + Sync + Debug {
    /// The index of the calling rank in `0 .. size()`.
    fn rank(&self) -> usize;

    /// The number of ranks in the group.
    fn size(&self) -> usize;

    /// Personalized all-to-all exchange.
    ///
    /// `send[q]` is delivered to rank `q`. The returned vector holds, at position `q`, the
    /// buffer that rank `q` addressed to the calling rank.
    ///
    /// # Panics
    ///
    /// Panics if `send.len() != self.size()`.
    fn all_to_all(&self, send: Vec<Vec<Complex64>>) -> Vec<Vec<Complex64>>;

    /// Gathers one buffer from every rank on every rank, indexed by source rank.
    fn all_gather(&self, data: Vec<Complex64>) -> Vec<Vec<Complex64>> {
        let send = vec![data; self.size()];
        self.all_to_all(send)
    }

    /// Blocks until every rank in the group has entered the barrier.
    fn barrier(&self) {
        self.all_to_all(vec![Vec::new(); self.size()]);
    }
}

/// The trivial group consisting only of the calling process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_to_all(&self, send: Vec<Vec<Complex64>>) -> Vec<Vec<Complex64>> {
        assert_eq!(send.len(), 1, "all_to_all requires exactly one buffer per rank");
        send
    }
}
