// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::IpNet;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{instrument, trace};

use crate::error::AllocError;

/// Hands out client addresses from the server's tunnel network.
///
/// Allocation always walks upward from the network address, so the result is
/// the lowest free address and an address freed by a delete is handed out
/// again before anything above it. The network address itself and the
/// server's own address are never returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAllocator {
	pool: IpNet,
	server_ip: IpAddr,
}

impl IpAllocator {
	/// `server` is the server's tunnel address in CIDR form, e.g. `10.0.0.1/8`.
	pub fn new(server: IpNet) -> Self {
		Self {
			pool: server.trunc(),
			server_ip: server.addr(),
		}
	}

	pub fn pool(&self) -> IpNet {
		self.pool
	}

	pub fn server_ip(&self) -> IpAddr {
		self.server_ip
	}

	#[instrument(skip(self, allocated), fields(pool = %self.pool, allocated = allocated.len()))]
	pub fn allocate(&self, allocated: &HashSet<IpAddr>) -> Result<IpAddr, AllocError> {
		let mut candidate = self.pool.network();

		loop {
			candidate = next_addr(candidate)
				.filter(|ip| self.pool.contains(ip))
				.ok_or(AllocError::Exhausted { pool: self.pool })?;

			if candidate != self.server_ip && !allocated.contains(&candidate) {
				trace!(ip = %candidate, "allocated");
				return Ok(candidate);
			}
		}
	}
}

/// Adds one to a big-endian octet array. Returns `false` on wrap-around.
fn increment(octets: &mut [u8]) -> bool {
	for octet in octets.iter_mut().rev() {
		let (next, carry) = octet.overflowing_add(1);
		*octet = next;
		if !carry {
			return true;
		}
	}
	false
}

fn next_addr(ip: IpAddr) -> Option<IpAddr> {
	match ip {
		IpAddr::V4(v4) => {
			let mut octets = v4.octets();
			increment(&mut octets).then(|| IpAddr::V4(Ipv4Addr::from(octets)))
		}
		IpAddr::V6(v6) => {
			let mut octets = v6.octets();
			increment(&mut octets).then(|| IpAddr::V6(Ipv6Addr::from(octets)))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn ip(s: &str) -> IpAddr {
		s.parse().unwrap()
	}

	fn allocator(cidr: &str) -> IpAllocator {
		IpAllocator::new(cidr.parse().unwrap())
	}

	#[test]
	fn increment_carries_left() {
		let mut octets = [10, 0, 0, 255];
		assert!(increment(&mut octets));
		assert_eq!(octets, [10, 0, 1, 0]);

		let mut octets = [10, 255, 255, 255];
		assert!(increment(&mut octets));
		assert_eq!(octets, [11, 0, 0, 0]);

		let mut octets = [255, 255, 255, 255];
		assert!(!increment(&mut octets));
	}

	#[test]
	fn first_allocations_follow_server() {
		let allocator = allocator("10.0.0.1/8");
		let mut taken = HashSet::new();

		for expected in ["10.0.0.2", "10.0.0.3", "10.0.0.4"] {
			let got = allocator.allocate(&taken).unwrap();
			assert_eq!(got, ip(expected));
			taken.insert(got);
		}
	}

	#[test]
	fn freed_address_is_reused_first() {
		let allocator = allocator("10.0.0.1/8");
		let mut taken: HashSet<_> = [ip("10.0.0.2"), ip("10.0.0.3"), ip("10.0.0.4")].into();

		taken.remove(&ip("10.0.0.3"));

		assert_eq!(allocator.allocate(&taken).unwrap(), ip("10.0.0.3"));
	}

	#[test]
	fn never_returns_network_or_server_address() {
		let allocator = allocator("192.168.7.5/24");
		assert_eq!(allocator.pool().to_string(), "192.168.7.0/24");

		let mut taken = HashSet::new();
		while let Ok(next) = allocator.allocate(&taken) {
			assert_ne!(next, ip("192.168.7.0"));
			assert_ne!(next, ip("192.168.7.5"));
			taken.insert(next);
		}
		assert_eq!(taken.len(), 254);
	}

	#[test]
	fn small_pool_exhausts() {
		let allocator = allocator("10.0.0.1/30");
		let mut taken = HashSet::new();

		taken.insert(allocator.allocate(&taken).unwrap());
		taken.insert(allocator.allocate(&taken).unwrap());

		assert_eq!(taken, [ip("10.0.0.2"), ip("10.0.0.3")].into());
		assert_eq!(
			allocator.allocate(&taken),
			Err(AllocError::Exhausted {
				pool: "10.0.0.0/30".parse().unwrap()
			})
		);
	}

	#[test]
	fn pool_at_top_of_address_space_exhausts_without_wrapping() {
		let allocator = allocator("255.255.255.253/30");
		let mut taken = HashSet::new();
		while let Ok(next) = allocator.allocate(&taken) {
			taken.insert(next);
		}
		assert_eq!(taken, [ip("255.255.255.254"), ip("255.255.255.255")].into());
	}

	#[test]
	fn ipv6_pool() {
		let allocator = allocator("fd00::1/120");
		assert_eq!(allocator.allocate(&HashSet::new()).unwrap(), ip("fd00::2"));
	}

	#[test]
	fn addresses_outside_pool_do_not_block() {
		let allocator = allocator("10.0.0.1/8");
		let taken: HashSet<_> = [ip("192.168.0.2")].into();
		assert_eq!(allocator.allocate(&taken).unwrap(), ip("10.0.0.2"));
	}

	proptest! {
		#[test]
		fn allocation_is_lowest_free_and_deterministic(
			taken_hosts in proptest::collection::hash_set(2u8..=254, 0..200)
		) {
			let allocator = allocator("10.1.2.1/24");
			let taken: HashSet<IpAddr> = taken_hosts
				.iter()
				.map(|h| IpAddr::V4(Ipv4Addr::new(10, 1, 2, *h)))
				.collect();

			let first = allocator.allocate(&taken).unwrap();
			prop_assert_eq!(allocator.allocate(&taken).unwrap(), first);

			let expected = (2u8..=255).find(|h| !taken_hosts.contains(h)).unwrap();
			prop_assert_eq!(first, IpAddr::V4(Ipv4Addr::new(10, 1, 2, expected)));
		}
	}
}
