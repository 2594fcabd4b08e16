use rand::Rng;

use crate::core::backoff::Backoff;
use crate::core::repr::{
    EthernetAddress,
    Ipv4Address,
};
use crate::core::storage::{
    PacketBuffer,
    PacketPool,
    Ring,
};
use crate::core::time::{
    elapsed,
    Ticks,
};

/// Number of entries in an ARP cache.
pub const ARP_CACHE_ENTRIES: usize = 16;

/// Number of packets an unresolved entry holds while waiting on a reply.
pub const ARP_QUEUE_LEN: usize = 2;

/// Number of requests resent for an unresolved entry before giving up.
pub const ARP_MAX_RETRIES: u32 = 10;

pub const ARP_BACKOFF_START: Ticks = 400;

pub const ARP_BACKOFF_MAX: Ticks = 6400;

pub const ARP_BACKOFF_JITTER_FRACTION: u32 = 4;

/// Milliseconds a resolved mapping stays in the cache.
pub const ARP_ENTRY_EXPIRATION: Ticks = 3_600_000;

#[derive(Debug)]
struct Entry {
    ipv4_addr: Ipv4Address,
    /// Only set once the address is resolved.
    eth_addr: Option<EthernetAddress>,
    pending: Ring<PacketBuffer>,
    retries: u32,
    backoff: Backoff,
    updated_at: Ticks,
}

impl Entry {
    fn new() -> Entry {
        Entry {
            ipv4_addr: Ipv4Address::UNSPECIFIED,
            eth_addr: None,
            pending: Ring::with_capacity(ARP_QUEUE_LEN),
            retries: 0,
            backoff: Backoff::new(
                ARP_BACKOFF_START,
                ARP_BACKOFF_MAX,
                ARP_BACKOFF_JITTER_FRACTION,
            ),
            updated_at: 0,
        }
    }

    fn free_pending(&mut self, pool: &mut PacketPool) {
        while let Ok(buffer) = self.pending.dequeue() {
            pool.free(buffer);
        }
    }
}

/// A fixed size set of IPv4 -> Ethernet address mappings, plus the packets
/// waiting on mappings which are not yet resolved.
///
/// Entries in use are kept in insertion order, which doubles as age order: the
/// oldest entry is evicted when a new address needs room. Every entry is
/// allocated up front and recycled through a free list.
#[derive(Debug)]
pub struct ArpCache {
    used: Vec<Entry>,
    free: Vec<Entry>,
}

impl ArpCache {
    pub fn new(capacity: usize) -> ArpCache {
        let mut free = Vec::with_capacity(capacity);
        for _ in 0 .. capacity {
            free.push(Entry::new());
        }

        ArpCache {
            used: Vec::with_capacity(capacity),
            free,
        }
    }

    /// Returns the number of entries in use, resolved or not.
    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.used.len() + self.free.len()
    }

    /// Checks if there's an entry, resolved or not, for an IPv4 address.
    pub fn contains(&self, ipv4_addr: Ipv4Address) -> bool {
        self.position(ipv4_addr).is_some()
    }

    /// Lookup the Ethernet address for an IPv4 address.
    pub fn eth_addr_for_ip(&self, ipv4_addr: Ipv4Address) -> Option<EthernetAddress> {
        self.position(ipv4_addr)
            .and_then(|i| self.used[i].eth_addr)
    }

    /// Returns the number of packets waiting on an IPv4 address to resolve.
    pub fn pending_len(&self, ipv4_addr: Ipv4Address) -> usize {
        self.position(ipv4_addr)
            .map_or(0, |i| self.used[i].pending.len())
    }

    /// Queues a packet on the entry for an IPv4 address, creating the entry if
    /// needed.
    ///
    /// A full queue drops its oldest packet. A full cache drops its oldest
    /// entry along with the packets queued on it.
    ///
    /// # Returns
    ///
    /// True if a new entry was created and a request should be sent.
    pub fn enqueue<R: Rng>(
        &mut self,
        ipv4_addr: Ipv4Address,
        buffer: PacketBuffer,
        now: Ticks,
        rng: &mut R,
        pool: &mut PacketPool,
    ) -> bool {
        let (i, created) = match self.position(ipv4_addr) {
            Some(i) => (i, false),
            None => (self.insert(ipv4_addr, now, rng, pool), true),
        };

        if let Some(evicted) = self.used[i].pending.enqueue_evicting(buffer) {
            debug!("Dropping oldest packet queued for {}.", ipv4_addr);
            pool.free(evicted);
        }

        created
    }

    /// Resolves an unresolved entry for an IPv4 address.
    ///
    /// Packets queued on the entry should be taken with `dequeue_pending(...)`
    /// and sent.
    ///
    /// # Returns
    ///
    /// False if there's no unresolved entry for the address.
    pub fn resolve(&mut self, ipv4_addr: Ipv4Address, eth_addr: EthernetAddress, now: Ticks) -> bool {
        match self.position(ipv4_addr) {
            Some(i) if self.used[i].eth_addr.is_none() => {
                let entry = &mut self.used[i];
                entry.eth_addr = Some(eth_addr);
                entry.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Updates the Ethernet address of a resolved entry.
    ///
    /// # Returns
    ///
    /// False if there's no resolved entry for the address.
    pub fn refresh(&mut self, ipv4_addr: Ipv4Address, eth_addr: EthernetAddress) -> bool {
        match self.position(ipv4_addr) {
            Some(i) if self.used[i].eth_addr.is_some() => {
                self.used[i].eth_addr = Some(eth_addr);
                true
            }
            _ => false,
        }
    }

    /// Takes the oldest packet queued on a resolved entry, along with the
    /// Ethernet address to send it to.
    pub fn dequeue_pending(
        &mut self,
        ipv4_addr: Ipv4Address,
    ) -> Option<(PacketBuffer, EthernetAddress)> {
        let i = self.position(ipv4_addr)?;
        let entry = &mut self.used[i];
        let eth_addr = entry.eth_addr?;
        entry.pending.dequeue().ok().map(|buffer| (buffer, eth_addr))
    }

    /// Removes the entry for an IPv4 address, freeing any queued packets.
    pub fn remove(&mut self, ipv4_addr: Ipv4Address, pool: &mut PacketPool) -> bool {
        match self.position(ipv4_addr) {
            Some(i) => {
                self.remove_at(i, pool);
                true
            }
            None => false,
        }
    }

    /// Ages out entries and finds the next unresolved entry due for another
    /// request.
    ///
    /// Resolved entries expire `ARP_ENTRY_EXPIRATION` ticks after resolving.
    /// Unresolved entries are dropped once their retry timer elapses with no
    /// retries left.
    ///
    /// # Returns
    ///
    /// An IPv4 address to send a request for. Keep calling until None is
    /// returned; the entry's retry timer is armed before returning.
    pub fn poll_retry<R: Rng>(
        &mut self,
        now: Ticks,
        rng: &mut R,
        pool: &mut PacketPool,
    ) -> Option<Ipv4Address> {
        let mut i = 0;

        while i < self.used.len() {
            let entry = &mut self.used[i];
            let resolved = entry.eth_addr.is_some();

            if resolved && elapsed(entry.updated_at, now) > ARP_ENTRY_EXPIRATION {
                debug!("ARP mapping for {} expired.", entry.ipv4_addr);
                self.remove_at(i, pool);
                continue;
            }

            if !resolved && entry.backoff.timeout(now) {
                if entry.retries >= ARP_MAX_RETRIES {
                    debug!("Giving up on resolving {}.", entry.ipv4_addr);
                    self.remove_at(i, pool);
                    continue;
                }

                entry.retries += 1;
                entry.updated_at = now;
                entry.backoff.fire(now, rng);
                return Some(entry.ipv4_addr);
            }

            i += 1;
        }

        None
    }

    fn position(&self, ipv4_addr: Ipv4Address) -> Option<usize> {
        self.used
            .iter()
            .position(|entry| entry.ipv4_addr == ipv4_addr)
    }

    fn insert<R: Rng>(
        &mut self,
        ipv4_addr: Ipv4Address,
        now: Ticks,
        rng: &mut R,
        pool: &mut PacketPool,
    ) -> usize {
        if self.free.is_empty() && !self.used.is_empty() {
            debug!(
                "ARP cache full, evicting entry for {}.",
                self.used[0].ipv4_addr
            );
            self.remove_at(0, pool);
        }

        let mut entry = self.free.pop().unwrap_or_else(Entry::new);
        entry.ipv4_addr = ipv4_addr;
        entry.eth_addr = None;
        entry.retries = 0;
        entry.updated_at = now;
        entry.backoff.reset();
        // The initial request goes out right away.
        entry.backoff.fire(now, rng);

        self.used.push(entry);
        self.used.len() - 1
    }

    fn remove_at(&mut self, i: usize, pool: &mut PacketPool) {
        let mut entry = self.used.remove(i);
        entry.free_pending(pool);
        self.free.push(entry);
    }
}
