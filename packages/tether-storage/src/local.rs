//! On-disk vector store, one JSON file per namespace.
//!
//! Mutations stay in memory until [`LocalStore::commit`] writes the whole store through a
//! temporary file and renames it into place, so a crash mid-sync leaves the previous commit
//! intact.

use std::{
	cmp::Ordering,
	collections::{BTreeMap, BTreeSet},
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{Error, Result, ScoredEntry};

pub const FORMAT_VERSION: u32 = 1;
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
	pub id: u64,
	pub vector: Vec<f32>,
	pub text: String,
	pub metadata: EntryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
	pub id: u64,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
	version: u32,
	embedding_version: String,
	dimensions: u32,
	persisted_at: String,
	entries: Vec<StoredEntry>,
}

#[derive(Debug)]
pub struct LocalStore {
	path: PathBuf,
	embedding_version: String,
	dimensions: u32,
	entries: BTreeMap<u64, StoredEntry>,
	dirty: bool,
}
impl LocalStore {
	/// Opens `{data_dir}/{namespace}/index.json`. A missing file yields an empty store; nothing is
	/// written until the first commit.
	pub fn open(
		data_dir: &Path,
		namespace: &str,
		embedding_version: &str,
		dimensions: u32,
	) -> Result<Self> {
		if namespace.is_empty() || namespace.contains(['/', '\\']) || namespace.starts_with('.') {
			return Err(Error::InvalidArgument(format!("Invalid namespace {namespace:?}.")));
		}
		if dimensions == 0 {
			return Err(Error::InvalidArgument("dimensions must be greater than zero.".to_string()));
		}

		let path = data_dir.join(namespace).join(INDEX_FILE);
		let mut store = Self {
			path,
			embedding_version: embedding_version.to_string(),
			dimensions,
			entries: BTreeMap::new(),
			dirty: false,
		};

		if !store.path.exists() {
			tracing::debug!(path = %store.path.display(), "Index store not found; starting empty.");

			return Ok(store);
		}

		let raw = fs::read_to_string(&store.path)
			.map_err(|source| Error::Io { path: store.path.clone(), source })?;
		let file: IndexFile = serde_json::from_str(&raw)
			.map_err(|err| Error::Corrupt { path: store.path.clone(), message: err.to_string() })?;

		if file.version != FORMAT_VERSION {
			return Err(Error::Corrupt {
				path: store.path.clone(),
				message: format!("unsupported format version {}", file.version),
			});
		}
		if file.embedding_version != store.embedding_version || file.dimensions != dimensions {
			return Err(Error::VersionMismatch {
				path: store.path.clone(),
				stored: format!("{} ({} dims)", file.embedding_version, file.dimensions),
				expected: format!("{} ({dimensions} dims)", store.embedding_version),
			});
		}

		for entry in file.entries {
			if entry.vector.len() != dimensions as usize || entry.metadata.id != entry.id {
				return Err(Error::Corrupt {
					path: store.path.clone(),
					message: format!("entry {} is malformed", entry.id),
				});
			}

			store.entries.insert(entry.id, entry);
		}

		tracing::debug!(
			path = %store.path.display(),
			entries = store.entries.len(),
			"Loaded index store."
		);

		Ok(store)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// True when there are uncommitted changes.
	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	pub fn ids(&self) -> BTreeSet<u64> {
		self.entries.keys().copied().collect()
	}

	pub fn get(&self, id: u64) -> Option<&StoredEntry> {
		self.entries.get(&id)
	}

	/// Inserts or replaces the entry for `id`.
	pub fn put(&mut self, id: u64, vector: Vec<f32>, text: String) -> Result<()> {
		self.check_vector(&vector)?;
		self.entries.insert(id, StoredEntry { id, vector, text, metadata: EntryMetadata { id } });

		self.dirty = true;

		Ok(())
	}

	/// Returns how many of `ids` were present. Absent ids are ignored.
	pub fn remove<I>(&mut self, ids: I) -> usize
	where
		I: IntoIterator<Item = u64>,
	{
		let removed = ids.into_iter().filter(|id| self.entries.remove(id).is_some()).count();

		if removed > 0 {
			self.dirty = true;
		}

		removed
	}

	/// Up to `k` entries by cosine similarity, best first. Ties go to the lower id.
	pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
		self.check_vector(query)?;

		let mut scored: Vec<ScoredEntry> = self
			.entries
			.values()
			.map(|entry| ScoredEntry {
				id: entry.id,
				text: entry.text.clone(),
				score: cosine(query, &entry.vector),
			})
			.collect();

		scored.sort_by(|a, b| {
			b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then(a.id.cmp(&b.id))
		});
		scored.truncate(k);

		Ok(scored)
	}

	/// Writes the full store durably. Always writes, so an empty store still leaves a file behind.
	pub fn commit(&mut self) -> Result<()> {
		let dir = self.path.parent().unwrap_or_else(|| Path::new("."));

		fs::create_dir_all(dir).map_err(|source| Error::Io { path: dir.to_path_buf(), source })?;

		let file = IndexFile {
			version: FORMAT_VERSION,
			embedding_version: self.embedding_version.clone(),
			dimensions: self.dimensions,
			persisted_at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
			entries: self.entries.values().cloned().collect(),
		};
		let payload = serde_json::to_vec(&file)?;
		let tmp_path = self.path.with_extension("json.tmp");
		let io_err = |source| Error::Io { path: tmp_path.clone(), source };
		let mut out = File::create(&tmp_path).map_err(io_err)?;

		out.write_all(&payload).map_err(io_err)?;
		out.sync_all().map_err(io_err)?;

		drop(out);

		fs::rename(&tmp_path, &self.path)
			.map_err(|source| Error::Io { path: self.path.clone(), source })?;

		self.dirty = false;

		tracing::debug!(
			path = %self.path.display(),
			entries = self.entries.len(),
			"Committed index store."
		);

		Ok(())
	}

	fn check_vector(&self, vector: &[f32]) -> Result<()> {
		if vector.len() != self.dimensions as usize {
			return Err(Error::InvalidArgument(format!(
				"Vector has {} dimensions, store expects {}.",
				vector.len(),
				self.dimensions
			)));
		}
		if vector.iter().any(|value| !value.is_finite()) {
			return Err(Error::InvalidArgument("Vector contains non-finite values.".to_string()));
		}

		Ok(())
	}
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let mut dot = 0.0_f32;
	let mut norm_a = 0.0_f32;
	let mut norm_b = 0.0_f32;

	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	dot / (norm_a.sqrt() * norm_b.sqrt())
}
