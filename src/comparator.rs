//! Content comparison strategies
//!
//! Files are streamed through a digest and compared by digest. A missing file
//! is never equal to anything.

use crate::error::SyncError;
use crate::logging::*;
use crate::strategies::ComparatorKind;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

const BUFFER_SIZE: usize = 64 * 1024;

/// Decides whether two files have identical content
pub trait FileComparator: Send + Sync {
	fn name(&self) -> &'static str;

	/// `Ok(false)` when either file is absent
	fn equal(&self, a: &Path, b: &Path) -> Result<bool, SyncError>;
}

/// Incremental digest over a byte stream
trait StreamDigest: Default {
	fn update(&mut self, data: &[u8]);
	fn finish(self) -> Vec<u8>;
}

struct Xxh3Digest(Xxh3);

impl Default for Xxh3Digest {
	fn default() -> Self {
		Xxh3Digest(Xxh3::new())
	}
}

impl StreamDigest for Xxh3Digest {
	fn update(&mut self, data: &[u8]) {
		self.0.update(data);
	}

	fn finish(self) -> Vec<u8> {
		self.0.digest128().to_be_bytes().to_vec()
	}
}

#[derive(Default)]
struct Md5Digest(Md5);

impl StreamDigest for Md5Digest {
	fn update(&mut self, data: &[u8]) {
		Digest::update(&mut self.0, data);
	}

	fn finish(self) -> Vec<u8> {
		self.0.finalize().to_vec()
	}
}

#[derive(Default)]
struct Sha256Digest(Sha256);

impl StreamDigest for Sha256Digest {
	fn update(&mut self, data: &[u8]) {
		Digest::update(&mut self.0, data);
	}

	fn finish(self) -> Vec<u8> {
		self.0.finalize().to_vec()
	}
}

struct Blake3Digest(blake3::Hasher);

impl Default for Blake3Digest {
	fn default() -> Self {
		Blake3Digest(blake3::Hasher::new())
	}
}

impl StreamDigest for Blake3Digest {
	fn update(&mut self, data: &[u8]) {
		self.0.update(data);
	}

	fn finish(self) -> Vec<u8> {
		self.0.finalize().as_bytes().to_vec()
	}
}

/// Digest a file, `None` if it does not exist
fn digest_file<D: StreamDigest>(path: &Path) -> Result<Option<Vec<u8>>, SyncError> {
	let mut file = match File::open(path) {
		Ok(f) => f,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
		Err(e) => return Err(SyncError::io(path, e)),
	};

	let meta = file.metadata().map_err(|e| SyncError::io(path, e))?;
	if meta.is_dir() {
		return Err(SyncError::IsDirectory { path: path.to_path_buf() });
	}

	let mut digest = D::default();
	let mut buffer = vec![0u8; BUFFER_SIZE];
	loop {
		let n = match file.read(&mut buffer) {
			Ok(0) => break,
			Ok(n) => n,
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(SyncError::io(path, e)),
		};
		digest.update(&buffer[..n]);
	}

	Ok(Some(digest.finish()))
}

/// Comparator backed by one digest algorithm
struct DigestComparator<D> {
	name: &'static str,
	_digest: std::marker::PhantomData<fn() -> D>,
}

impl<D> DigestComparator<D> {
	fn new(name: &'static str) -> Self {
		Self { name, _digest: std::marker::PhantomData }
	}
}

impl<D: StreamDigest> FileComparator for DigestComparator<D> {
	fn name(&self) -> &'static str {
		self.name
	}

	fn equal(&self, a: &Path, b: &Path) -> Result<bool, SyncError> {
		let digest_a = match digest_file::<D>(a)? {
			Some(d) => d,
			None => return Ok(false),
		};
		let digest_b = match digest_file::<D>(b)? {
			Some(d) => d,
			None => return Ok(false),
		};

		let equal = digest_a == digest_b;
		if !equal {
			debug!(
				"[{}] {} ({}) differs from {} ({})",
				self.name,
				a.display(),
				hex::encode(&digest_a),
				b.display(),
				hex::encode(&digest_b)
			);
		}
		Ok(equal)
	}
}

/// Build the comparator selected by configuration
pub fn comparator_for(kind: ComparatorKind) -> Arc<dyn FileComparator> {
	match kind {
		ComparatorKind::Xxh3 => Arc::new(DigestComparator::<Xxh3Digest>::new("xxh3")),
		ComparatorKind::Md5 => Arc::new(DigestComparator::<Md5Digest>::new("md5")),
		ComparatorKind::Sha256 => Arc::new(DigestComparator::<Sha256Digest>::new("sha256")),
		ComparatorKind::Blake3 => Arc::new(DigestComparator::<Blake3Digest>::new("blake3")),
	}
}


// vim: ts=4
