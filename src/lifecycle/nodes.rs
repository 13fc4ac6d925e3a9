//! Test-bed node pool
//!
//! The pool is the only resource shared between concurrently running cases.
//! Nodes are handed out all-or-nothing: a lease for `n` nodes is either
//! granted whole or not at all, and waiters block until enough nodes are
//! returned or their deadline passes.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::error::ProvisionError;

/// One executable node of the test-bed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub id: usize,
    pub host: String,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.host, self.id)
    }
}

/// Allocation state, guarded by a single lock
#[derive(Debug)]
struct PoolState {
    free: BTreeSet<usize>,
    in_use: usize,
    peak_in_use: usize,
}

/// Finite pool of test-bed nodes
pub struct NodePool {
    nodes: Vec<Node>,
    state: Mutex<PoolState>,
    /// Woken whenever nodes are returned
    released: Notify,
}

impl NodePool {
    /// Create a pool with one node per host entry
    pub fn new<I, H>(hosts: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        let nodes: Vec<Node> = hosts
            .into_iter()
            .enumerate()
            .map(|(id, host)| Node {
                id,
                host: host.into(),
            })
            .collect();
        let free = (0..nodes.len()).collect();
        Self {
            nodes,
            state: Mutex::new(PoolState {
                free,
                in_use: 0,
                peak_in_use: 0,
            }),
            released: Notify::new(),
        }
    }

    /// Total number of nodes
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes currently free
    pub fn available(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Nodes currently leased
    pub fn in_use(&self) -> usize {
        self.state.lock().in_use
    }

    /// Highest number of nodes leased at once
    pub fn peak_in_use(&self) -> usize {
        self.state.lock().peak_in_use
    }

    /// Lease `count` nodes if they are free right now
    pub fn try_acquire(self: &Arc<Self>, count: usize) -> Option<NodeLease> {
        let mut state = self.state.lock();
        if state.free.len() < count {
            return None;
        }
        let ids: Vec<usize> = state.free.iter().take(count).copied().collect();
        for id in &ids {
            state.free.remove(id);
        }
        state.in_use += count;
        state.peak_in_use = state.peak_in_use.max(state.in_use);
        drop(state);

        Some(NodeLease {
            pool: Arc::clone(self),
            nodes: ids.into_iter().map(|id| self.nodes[id].clone()).collect(),
        })
    }

    /// Lease `count` nodes, waiting up to `timeout` for them to free up
    pub async fn acquire(
        self: &Arc<Self>,
        count: usize,
        timeout: Duration,
    ) -> Result<NodeLease, ProvisionError> {
        if count > self.capacity() {
            return Err(ProvisionError::InsufficientCapacity {
                requested: count,
                total: self.capacity(),
            });
        }

        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a release between the
            // check and the await is not missed
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(lease) = self.try_acquire(count) {
                return Ok(lease);
            }

            tracing::debug!(requested = count, available = self.available(), "Waiting for test-bed nodes");
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(ProvisionError::CapacityTimeout {
                    requested: count,
                    waited: timeout,
                });
            }
        }
    }

    fn release(&self, nodes: &[Node]) {
        {
            let mut state = self.state.lock();
            for node in nodes {
                state.free.insert(node.id);
            }
            state.in_use -= nodes.len();
        }
        self.released.notify_waiters();
    }
}

impl fmt::Debug for NodePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// Nodes held by one case or service; returned to the pool on drop
pub struct NodeLease {
    pool: Arc<NodePool>,
    nodes: Vec<Node>,
}

impl NodeLease {
    /// Leased nodes in allocation order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Take over the nodes of another lease from the same pool
    pub fn absorb(&mut self, mut other: NodeLease) {
        debug_assert!(Arc::ptr_eq(&self.pool, &other.pool));
        self.nodes.append(&mut other.nodes);
    }

    /// Move the first `count` nodes into a lease of their own
    ///
    /// The nodes never pass through the pool, so no other case can take
    /// them in between. Returns `None` if this lease holds fewer nodes.
    pub fn split_off(&mut self, count: usize) -> Option<NodeLease> {
        if count > self.nodes.len() {
            return None;
        }
        let rest = self.nodes.split_off(count);
        let taken = std::mem::replace(&mut self.nodes, rest);
        Some(NodeLease {
            pool: Arc::clone(&self.pool),
            nodes: taken,
        })
    }
}

impl fmt::Debug for NodeLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeLease").field("nodes", &self.nodes).finish()
    }
}

impl Drop for NodeLease {
    fn drop(&mut self) {
        if !self.nodes.is_empty() {
            self.pool.release(&self.nodes);
        }
    }
}
