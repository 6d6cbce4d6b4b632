#![forbid(unsafe_code)]

use emotesync_domain::{ChatroomId, ChatroomRegistration};

/// Chatrooms sharing the connection, in registration order.
#[derive(Debug, Default, Clone)]
pub struct ChatroomRegistry {
	entries: Vec<ChatroomRegistration>,
}

impl ChatroomRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert or overwrite. An overwrite keeps the original position.
	pub fn insert(&mut self, reg: ChatroomRegistration) -> Option<ChatroomRegistration> {
		match self.entries.iter_mut().find(|e| e.chatroom_id == reg.chatroom_id) {
			Some(existing) => Some(std::mem::replace(existing, reg)),
			None => {
				self.entries.push(reg);
				None
			}
		}
	}

	pub fn remove(&mut self, chatroom_id: &ChatroomId) -> Option<ChatroomRegistration> {
		let idx = self.entries.iter().position(|e| &e.chatroom_id == chatroom_id)?;
		Some(self.entries.remove(idx))
	}

	pub fn get(&self, chatroom_id: &ChatroomId) -> Option<&ChatroomRegistration> {
		self.entries.iter().find(|e| &e.chatroom_id == chatroom_id)
	}

	pub fn count(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn list(&self) -> &[ChatroomRegistration] {
		&self.entries
	}

	pub fn ids(&self) -> Vec<ChatroomId> {
		self.entries.iter().map(|e| e.chatroom_id.clone()).collect()
	}

	/// First chatroom backed by `emote_set_id`.
	pub fn find_by_emote_set(&self, emote_set_id: &str) -> Option<&ChatroomRegistration> {
		self.entries
			.iter()
			.find(|e| e.has_emote_set() && e.provider_emote_set_id.trim() == emote_set_id)
	}

	pub fn any_provider_user(&self) -> bool {
		self.entries.iter().any(ChatroomRegistration::has_provider_user)
	}

	pub fn any_provider_identity(&self) -> bool {
		self.entries.iter().any(ChatroomRegistration::has_provider_identity)
	}
}
