use std::{
	collections::VecDeque,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Value;
use tokio::time;

use tether_config::LlmProviderConfig;
use tether_service::{BoxFuture, ExtractorProvider};

/// Replies with canned message contents in order; the last one repeats once the script runs
/// out.
pub struct ScriptedExtractor {
	replies: Mutex<VecDeque<String>>,
	delay: Option<Duration>,
	calls: AtomicUsize,
	last_messages: Mutex<Vec<Value>>,
}
impl ScriptedExtractor {
	pub fn new<I, S>(replies: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
			delay: None,
			calls: AtomicUsize::new(0),
			last_messages: Mutex::new(Vec::new()),
		}
	}

	/// Replies with `{"matches": matches}`.
	pub fn matching(matches: Value) -> Self {
		Self::new([serde_json::json!({ "matches": matches }).to_string()])
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn last_messages(&self) -> Vec<Value> {
		self.last_messages.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn next_reply(&self) -> String {
		let mut replies = self.replies.lock().unwrap_or_else(|err| err.into_inner());

		if replies.len() > 1 {
			return replies.pop_front().unwrap_or_default();
		}

		replies.front().cloned().unwrap_or_default()
	}
}
impl ExtractorProvider for ScriptedExtractor {
	fn extract<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			*self.last_messages.lock().unwrap_or_else(|err| err.into_inner()) = messages.to_vec();

			if let Some(delay) = self.delay {
				time::sleep(delay).await;
			}

			Ok(self.next_reply())
		})
	}
}
