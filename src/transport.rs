//! Message passing between ranks
//!
//! The search only relies on [`Transport`]: blocking point-to-point messages
//! that keep their order per sender and tag, and a collective barrier.
//! [`local_group`] provides an in-process implementation where every rank
//! runs on its own thread.

use anyhow::{anyhow, Result};
use static_assertions::assert_impl_all;

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier};

/// Rank of the coordinator
pub const COORDINATOR: usize = 0;

/// Message kinds used by the protocol
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Tag {
    /// Number of tasks a rank is about to receive
    TaskCount = 0,
    /// One task
    Task = 1,
    /// All results of one rank
    Results = 2,
    /// Start of a round or shutdown
    Control = 3,
}

/// A fixed group of cooperating ranks
pub trait Transport {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<()>;

    /// Blocks until a message from `source` with `tag` arrives
    fn receive(&mut self, source: usize, tag: Tag) -> Result<Vec<u8>>;

    /// Blocks until every rank has reached the barrier
    fn barrier(&self);
}

struct Envelope {
    source: usize,
    tag: Tag,
    payload: Vec<u8>,
}

/// One rank of an in-process group
pub struct LocalTransport {
    rank: usize,
    // no sender to ourselves, so a receive fails once every peer is gone
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    // messages that arrived before anyone asked for them
    pending: VecDeque<Envelope>,
    barrier: Arc<Barrier>,
}

assert_impl_all!(LocalTransport: Send);

/// Creates `size` connected endpoints, the endpoint at index `i` has rank `i`
pub fn local_group(size: usize) -> Vec<LocalTransport> {
    let barrier = Arc::new(Barrier::new(size.max(1)));
    let (senders, inboxes): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
        (0..size).map(|_| channel()).unzip();

    inboxes
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| LocalTransport {
            rank,
            peers: senders
                .iter()
                .enumerate()
                .map(|(dest, sender)| if dest == rank { None } else { Some(sender.clone()) })
                .collect(),
            inbox,
            pending: VecDeque::new(),
            barrier: barrier.clone(),
        })
        .collect()
}

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<()> {
        let peer = self
            .peers
            .get(dest)
            .ok_or_else(|| anyhow!("rank {} is not part of a group of {}", dest, self.size()))?
            .as_ref()
            .ok_or_else(|| anyhow!("rank {} cannot send to itself", self.rank))?;
        peer.send(Envelope {
            source: self.rank,
            tag,
            payload,
        })
        .map_err(|_| anyhow!("rank {} has disconnected", dest))
    }

    fn receive(&mut self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        if let Some(pos) = self
            .pending
            .iter()
            .position(|envelope| envelope.source == source && envelope.tag == tag)
        {
            if let Some(envelope) = self.pending.remove(pos) {
                return Ok(envelope.payload);
            }
        }

        loop {
            let envelope = self
                .inbox
                .recv()
                .map_err(|_| anyhow!("rank {} lost every peer while waiting for rank {}", self.rank, source))?;
            if envelope.source == source && envelope.tag == tag {
                return Ok(envelope.payload);
            }
            self.pending.push_back(envelope);
        }
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}
