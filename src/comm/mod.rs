//! Thin façade over in-process or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte slices. All handles are waitable but
//! non-blocking — the distribution map calls `.wait()` before it trusts
//! that a buffer is ready. One worker process per partition; nothing in
//! this crate shares mutable state across workers, so the façade is the
//! only place concurrency appears.

pub mod wire;

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering::Relaxed};
use std::thread::JoinHandle;

/// Non-blocking communication interface (minimal by design).
///
/// `alloc_tags` reserves a run of message tags for one collective
/// operation. Every rank performs the same sequence of collective calls,
/// so per-instance counters stay aligned across the world without any
/// extra traffic.
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle;

    /// Reserve `n` consecutive tags; returns the first.
    fn alloc_tags(&self, n: u16) -> u16;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Block until completion; receives yield the delivered bytes.
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for single-partition runs and serial unit tests.
///
/// Rank-local transfers never reach the communicator (the distribution map
/// copies them directly), so a world of size one needs no mailbox at all.
#[derive(Debug, Default)]
pub struct NoComm {
    seq: AtomicU16,
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _len: usize) {}

    fn alloc_tags(&self, n: u16) -> u16 {
        self.seq.fetch_add(n, Relaxed)
    }
}

// --- ThreadComm: an in-process world, one "rank" per thread ---
//
// The test suite runs real multi-rank exchanges by spawning one thread per
// rank, each holding its own ThreadComm. Messages park in a global mailbox
// keyed by (world, src, dst, tag); worlds get distinct ids so concurrent
// tests never observe each other's traffic.

type Key = (u64, usize, usize, u16);

static MAILBOX: Lazy<DashMap<Key, Bytes>> = Lazy::new(DashMap::new);
static NEXT_WORLD: AtomicU64 = AtomicU64::new(1);

pub struct ThreadComm {
    world: u64,
    rank: usize,
    size: usize,
    seq: AtomicU16,
}

impl ThreadComm {
    /// Create a fresh world of `size` ranks; element `r` is rank `r`'s comm.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a world needs at least one rank");
        let world = NEXT_WORLD.fetch_add(1, Relaxed);
        (0..size)
            .map(|rank| ThreadComm {
                world,
                rank,
                size,
                seq: AtomicU16::new(0),
            })
            .collect()
    }
}

/// Receive handle backed by a polling thread.
pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.buf.lock().take()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.world, self.rank, peer, tag);
        let prev = MAILBOX.insert(key, Bytes::copy_from_slice(buf));
        debug_assert!(prev.is_none(), "tag reuse while a message is in flight");
    }

    fn irecv(&self, peer: usize, tag: u16, len: usize) -> LocalHandle {
        let key = (self.world, peer, self.rank, tag);
        let slot = Arc::new(Mutex::new(None));
        let slot_in_thread = slot.clone();
        let handle = std::thread::spawn(move || {
            loop {
                if let Some((_, bytes)) = MAILBOX.remove(&key) {
                    assert_eq!(bytes.len(), len, "message length disagrees with posted receive");
                    *slot_in_thread.lock() = Some(bytes.to_vec());
                    break;
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            buf: slot,
            handle: Some(handle),
        }
    }

    fn alloc_tags(&self, n: u16) -> u16 {
        self.seq.fetch_add(n, Relaxed)
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::sync::atomic::{AtomicU16, Ordering::Relaxed};

    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        seq: AtomicU16,
    }

    impl MpiComm {
        pub fn new() -> Self {
            let universe = mpi::initialize().expect("MPI_Init failed");
            let world = universe.world();
            let rank = world.rank() as usize;
            std::mem::forget(universe);
            Self {
                world,
                rank,
                seq: AtomicU16::new(0),
            }
        }
    }

    pub struct MpiSendHandle {
        req: mpi::request::Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
    }
    unsafe impl Send for MpiSendHandle {}

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.req.wait();
            // Reclaim the buffer leaked for the 'static request scope.
            drop(unsafe { Box::from_raw(self.buf) });
            None
        }
    }

    pub struct MpiRecvHandle {
        req: mpi::request::Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
    }
    unsafe impl Send for MpiRecvHandle {}

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.req.wait();
            let buf = unsafe { Box::from_raw(self.buf) };
            Some(buf.into_vec())
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let leaked: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr = leaked as *mut [u8];
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, &*leaked, tag as i32);
            MpiSendHandle { req, buf: ptr }
        }

        fn irecv(&self, peer: usize, tag: u16, len: usize) -> MpiRecvHandle {
            let leaked: &'static mut [u8] = Box::leak(vec![0u8; len].into_boxed_slice());
            let ptr = leaked as *mut [u8];
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, leaked, tag as i32);
            MpiRecvHandle { req, buf: ptr }
        }

        fn alloc_tags(&self, n: u16) -> u16 {
            self.seq.fetch_add(n, Relaxed)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_world_roundtrip() {
        let mut world = ThreadComm::world(2);
        let c1 = world.pop().unwrap();
        let c0 = world.pop().unwrap();

        let recv = c1.irecv(0, 7, 4);
        c0.isend(1, 7, &[1, 2, 3, 4]);
        let data = recv.wait().expect("expected data from rank 0");
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn worlds_are_isolated() {
        let a = ThreadComm::world(2);
        let b = ThreadComm::world(2);

        a[0].isend(1, 3, &[9]);
        b[0].isend(1, 3, &[5]);

        let got_b = b[1].irecv(0, 3, 1).wait().unwrap();
        let got_a = a[1].irecv(0, 3, 1).wait().unwrap();
        assert_eq!(got_a, vec![9]);
        assert_eq!(got_b, vec![5]);
    }

    #[test]
    fn tag_allocation_is_monotone() {
        let world = ThreadComm::world(1);
        let t0 = world[0].alloc_tags(2);
        let t1 = world[0].alloc_tags(1);
        assert_eq!(t1, t0 + 2);
    }
}
