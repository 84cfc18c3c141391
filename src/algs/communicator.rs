//! Point-to-point transports for boundary payloads.
//!
//! The exchange engines never talk to a message-passing library directly;
//! they go through [`Transport`], whose handles are non-blocking and
//! [`Wait`]able. Three implementations are provided:
//!
//! - [`NoTransport`]: a single rank with no peers (serial runs and tests).
//! - [`LocalCopyTransport`]: ranks that share one OS process (one thread per
//!   rank) exchange payloads by copying through a shared [`LocalWorld`]
//!   mailbox.
//! - `AsyncMessageTransport` (feature `mpi-support`): MPI non-blocking
//!   point-to-point messages.
//!
//! Messages are matched on `(context, source, destination, tag)` and are
//! non-overtaking for equal keys. A context is obtained with
//! [`Transport::duplicate`], which every rank must call in the same order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::algs::wire::{CommTag, check_tag_range, decode_payload, encode_payload, expect_exact_len};
use crate::data::Real;
use crate::mesh_error::MeshHaloError;

/// Outcome of a completed transfer.
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// A send finished; its buffer may be reused.
    Sent,
    /// A receive finished with this payload.
    Received(Vec<Real>),
}

/// Anything that can be tested or waited on.
pub trait Wait {
    /// Non-blocking completion check; `Ok(None)` while still in flight.
    fn test(&mut self) -> Result<Option<Delivery>, MeshHaloError>;
    /// Block until the transfer completes.
    fn wait(self) -> Result<Delivery, MeshHaloError>;
}

/// Non-blocking point-to-point interface.
pub trait Transport {
    /// Handle returned by `isend` and `irecv`.
    type Request: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// A fresh communication context over the same ranks.
    ///
    /// Collective: every rank calls it in the same order.
    fn duplicate(&self) -> Self
    where
        Self: Sized;

    /// Largest tag value the transport can carry.
    fn max_tag(&self) -> i32 {
        i32::MAX
    }

    fn isend(
        &self,
        peer: usize,
        tag: CommTag,
        payload: &[Real],
    ) -> Result<Self::Request, MeshHaloError>;
    fn irecv(
        &self,
        peer: usize,
        tag: CommTag,
        len: usize,
    ) -> Result<Self::Request, MeshHaloError>;
}

/// This process' identity and its transport handle.
///
/// Passed explicitly to every engine; nothing in the crate reads the rank
/// from global state.
#[derive(Debug)]
pub struct ProcessContext<T> {
    transport: T,
}

impl<T: Transport> ProcessContext<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn rank(&self) -> usize {
        self.transport.rank()
    }

    pub fn size(&self) -> usize {
        self.transport.size()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fail unless every buffer tag of a pack with at most `max_local_blocks`
    /// blocks per rank fits the transport's tag range.
    pub fn check_tag_range(&self, max_local_blocks: usize) -> Result<(), MeshHaloError> {
        check_tag_range(max_local_blocks, self.transport.max_tag())
    }

    /// A private context for one engine lane.
    pub fn channel(&self) -> T {
        self.transport.duplicate()
    }
}

// --- NoTransport: one rank, nobody to talk to ---

/// Serial transport; any attempt to reach another rank is an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTransport;

/// Uninhabited request type of [`NoTransport`].
#[derive(Debug)]
pub enum NoRequest {}

impl Wait for NoRequest {
    fn test(&mut self) -> Result<Option<Delivery>, MeshHaloError> {
        match *self {}
    }
    fn wait(self) -> Result<Delivery, MeshHaloError> {
        match self {}
    }
}

impl Transport for NoTransport {
    type Request = NoRequest;

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn duplicate(&self) -> Self {
        NoTransport
    }

    fn isend(
        &self,
        peer: usize,
        tag: CommTag,
        _payload: &[Real],
    ) -> Result<NoRequest, MeshHaloError> {
        Err(MeshHaloError::Transport {
            op: "isend",
            peer,
            tag,
            reason: "serial transport has no peers".into(),
        })
    }

    fn irecv(&self, peer: usize, tag: CommTag, _len: usize) -> Result<NoRequest, MeshHaloError> {
        Err(MeshHaloError::Transport {
            op: "irecv",
            peer,
            tag,
            reason: "serial transport has no peers".into(),
        })
    }
}

// --- LocalCopyTransport: ranks as threads of one process ---

type MailKey = (u32, usize, usize, CommTag); // (context, src, dst, tag)

/// Shared mailbox for a set of in-process ranks.
#[derive(Debug)]
pub struct LocalWorld {
    size: usize,
    mailbox: DashMap<MailKey, VecDeque<Bytes>>,
    posted: Mutex<u64>,
    arrival: Condvar,
}

impl LocalWorld {
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            size,
            mailbox: DashMap::new(),
            posted: Mutex::new(0),
            arrival: Condvar::new(),
        })
    }

    /// Transport handle for `rank`, on the base context.
    pub fn transport(self: &Arc<Self>, rank: usize) -> Result<LocalCopyTransport, MeshHaloError> {
        if rank >= self.size {
            return Err(MeshHaloError::InvalidConfig(format!(
                "rank {rank} outside a world of {}",
                self.size
            )));
        }
        Ok(LocalCopyTransport {
            world: Arc::clone(self),
            rank,
            context: 0,
            contexts: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Messages delivered but not yet received, over all contexts.
    pub fn in_flight(&self) -> usize {
        self.mailbox.iter().map(|e| e.value().len()).sum()
    }

    fn post(&self, key: MailKey, bytes: Bytes) {
        self.mailbox.entry(key).or_default().push_back(bytes);
        let mut n = self.posted.lock();
        *n += 1;
        self.arrival.notify_all();
    }

    fn take(&self, key: &MailKey) -> Option<Bytes> {
        self.mailbox.get_mut(key).and_then(|mut q| q.pop_front())
    }
}

/// In-process transport: payloads are copied through a [`LocalWorld`].
#[derive(Clone, Debug)]
pub struct LocalCopyTransport {
    world: Arc<LocalWorld>,
    rank: usize,
    context: u32,
    /// Shared by every handle of this rank so duplicates number alike on all ranks.
    contexts: Arc<AtomicU32>,
}

/// Request handle of [`LocalCopyTransport`].
#[derive(Debug)]
pub enum LocalRequest {
    /// Sends complete at post time: the payload is already in the mailbox.
    Sent,
    Recv {
        world: Arc<LocalWorld>,
        key: MailKey,
        len: usize,
    },
}

impl Wait for LocalRequest {
    fn test(&mut self) -> Result<Option<Delivery>, MeshHaloError> {
        match self {
            LocalRequest::Sent => Ok(Some(Delivery::Sent)),
            LocalRequest::Recv { world, key, len } => {
                let Some(bytes) = world.take(key) else {
                    return Ok(None);
                };
                let (_, src, _, tag) = *key;
                let values = decode_payload(&bytes).map_err(|reason| MeshHaloError::Transport {
                    op: "irecv",
                    peer: src,
                    tag,
                    reason,
                })?;
                expect_exact_len(src, values.len(), *len)?;
                Ok(Some(Delivery::Received(values)))
            }
        }
    }

    fn wait(mut self) -> Result<Delivery, MeshHaloError> {
        loop {
            if let Some(done) = self.test()? {
                return Ok(done);
            }
            if let LocalRequest::Recv { world, key, .. } = &self {
                let mut posted = world.posted.lock();
                // re-check under the lock so a post between test() and here is not missed
                if world.mailbox.get(key).is_none_or(|q| q.is_empty()) {
                    world.arrival.wait_for(&mut posted, Duration::from_millis(5));
                }
            }
        }
    }
}

impl Transport for LocalCopyTransport {
    type Request = LocalRequest;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.world.size
    }

    fn duplicate(&self) -> Self {
        let context = self.contexts.fetch_add(1, Ordering::Relaxed) + 1;
        Self {
            world: Arc::clone(&self.world),
            rank: self.rank,
            context,
            contexts: Arc::clone(&self.contexts),
        }
    }

    fn isend(
        &self,
        peer: usize,
        tag: CommTag,
        payload: &[Real],
    ) -> Result<LocalRequest, MeshHaloError> {
        if peer >= self.world.size {
            return Err(MeshHaloError::Transport {
                op: "isend",
                peer,
                tag,
                reason: format!("world has {} ranks", self.world.size),
            });
        }
        log::trace!(
            "local isend {} -> {peer} ctx {} tag {tag}: {} values",
            self.rank,
            self.context,
            payload.len()
        );
        self.world
            .post((self.context, self.rank, peer, tag), encode_payload(payload));
        Ok(LocalRequest::Sent)
    }

    fn irecv(
        &self,
        peer: usize,
        tag: CommTag,
        len: usize,
    ) -> Result<LocalRequest, MeshHaloError> {
        if peer >= self.world.size {
            return Err(MeshHaloError::Transport {
                op: "irecv",
                peer,
                tag,
                reason: format!("world has {} ranks", self.world.size),
            });
        }
        log::trace!(
            "local irecv {} <- {peer} ctx {} tag {tag}: {len} values",
            self.rank,
            self.context
        );
        Ok(LocalRequest::Recv {
            world: Arc::clone(&self.world),
            key: (self.context, peer, self.rank, tag),
            len,
        })
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::request::{Request, StaticScope};
    use mpi::topology::{Communicator, SimpleCommunicator};
    use std::rc::Rc;

    /// Smallest `MPI_TAG_UB` an implementation may report.
    const MPI_MIN_TAG_UB: i32 = 32767;

    /// MPI transport over a duplicated communicator.
    pub struct AsyncMessageTransport {
        comm: Rc<SimpleCommunicator>,
    }

    impl AsyncMessageTransport {
        pub fn new(universe: &Universe) -> Self {
            Self::from_communicator(universe.world().duplicate())
        }

        pub fn from_communicator(comm: SimpleCommunicator) -> Self {
            Self { comm: Rc::new(comm) }
        }
    }

    /// Request handle of [`AsyncMessageTransport`].
    pub enum MpiRequest {
        /// `buf` is a leaked box kept alive until MPI reports completion.
        Send {
            request: Option<Request<'static, [Real]>>,
            buf: *mut [Real],
        },
        /// Receives are matched by probe, so no buffer is pinned while pending.
        Recv {
            comm: Rc<SimpleCommunicator>,
            peer: usize,
            tag: CommTag,
            len: usize,
        },
    }

    impl MpiRequest {
        fn release(&mut self) {
            if let MpiRequest::Send { request, buf } = self {
                if let Some(r) = request.take() {
                    r.wait();
                }
                if !buf.is_null() {
                    // SAFETY: `buf` came from Box::leak in `isend` and the request
                    // referencing it has completed.
                    unsafe { drop(Box::from_raw(*buf)) };
                    *buf = std::ptr::slice_from_raw_parts_mut(std::ptr::null_mut(), 0);
                }
            }
        }
    }

    impl Drop for MpiRequest {
        fn drop(&mut self) {
            self.release();
        }
    }

    impl Wait for MpiRequest {
        fn test(&mut self) -> Result<Option<Delivery>, MeshHaloError> {
            match self {
                MpiRequest::Send { request, .. } => {
                    let Some(r) = request.take() else {
                        return Ok(Some(Delivery::Sent));
                    };
                    match r.test() {
                        Ok(_) => {
                            self.release();
                            Ok(Some(Delivery::Sent))
                        }
                        Err(r) => {
                            *request = Some(r);
                            Ok(None)
                        }
                    }
                }
                MpiRequest::Recv {
                    comm,
                    peer,
                    tag,
                    len,
                } => {
                    let process = comm.process_at_rank(*peer as i32);
                    match process.immediate_matched_probe_with_tag(tag.as_i32()) {
                        Some((msg, _)) => {
                            let (values, _) = msg.matched_receive_vec::<Real>();
                            expect_exact_len(*peer, values.len(), *len)?;
                            Ok(Some(Delivery::Received(values)))
                        }
                        None => Ok(None),
                    }
                }
            }
        }

        fn wait(mut self) -> Result<Delivery, MeshHaloError> {
            match &self {
                MpiRequest::Send { .. } => {
                    self.release();
                    Ok(Delivery::Sent)
                }
                MpiRequest::Recv {
                    comm,
                    peer,
                    tag,
                    len,
                } => {
                    let process = comm.process_at_rank(*peer as i32);
                    let (msg, _) = process.matched_probe_with_tag(tag.as_i32());
                    let (values, _) = msg.matched_receive_vec::<Real>();
                    expect_exact_len(*peer, values.len(), *len)?;
                    Ok(Delivery::Received(values))
                }
            }
        }
    }

    impl Transport for AsyncMessageTransport {
        type Request = MpiRequest;

        fn rank(&self) -> usize {
            self.comm.rank() as usize
        }

        fn size(&self) -> usize {
            self.comm.size() as usize
        }

        fn duplicate(&self) -> Self {
            Self::from_communicator(self.comm.duplicate())
        }

        fn max_tag(&self) -> i32 {
            MPI_MIN_TAG_UB
        }

        fn isend(
            &self,
            peer: usize,
            tag: CommTag,
            payload: &[Real],
        ) -> Result<MpiRequest, MeshHaloError> {
            let leaked: &'static mut [Real] = Box::leak(payload.to_vec().into_boxed_slice());
            let buf: *mut [Real] = leaked;
            // SAFETY: the leaked slice is only freed in `release`, after the
            // request has completed.
            let shared: &'static [Real] = unsafe { &*buf };
            let request = self
                .comm
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, shared, tag.as_i32());
            Ok(MpiRequest::Send {
                request: Some(request),
                buf,
            })
        }

        fn irecv(
            &self,
            peer: usize,
            tag: CommTag,
            len: usize,
        ) -> Result<MpiRequest, MeshHaloError> {
            Ok(MpiRequest::Recv {
                comm: Rc::clone(&self.comm),
                peer,
                tag,
                len,
            })
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::{AsyncMessageTransport, MpiRequest};
