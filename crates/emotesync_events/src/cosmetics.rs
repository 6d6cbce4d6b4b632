#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::sync::Arc;

use emotesync_domain::NULL_OBJECT_ID;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{GradientStop, PaintShadow, gradient_string, image_string, shadow_filter};

/// Id used when the provider sends the null id without a `ref_id`.
pub const FALLBACK_COSMETIC_ID: &str = "default_id";

/// Emote set flag the provider sets on personal sets.
const PERSONAL_EMOTE_SET_FLAG: i64 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
	pub id: String,
	pub title: String,
	pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaintKind {
	Animated,
	NonAnimated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paint {
	pub id: String,
	pub name: String,
	pub style: Option<String>,
	pub shape: Option<String>,
	pub background_image: String,
	pub shadows: Option<String>,
	pub kind: PaintKind,
}

/// Full catalog as delivered to consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CosmeticsSnapshot {
	pub badges: Vec<Badge>,
	pub paints: Vec<Paint>,
}

/// What `ingest` did with a creation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
	BadgeAdded(String),
	PaintAdded(String),
	/// Resolved id was already cached.
	Duplicate(String),
	/// Personal emote set; id normalized, nothing cached.
	PersonalEmoteSet(String),
	/// Grant to a specific user rather than a catalog entry.
	UserScoped,
	Unprocessed,
}

#[derive(Debug, Deserialize)]
struct CosmeticCreateBody {
	object: Option<CosmeticObject>,
}

#[derive(Debug, Deserialize)]
struct CosmeticObject {
	#[serde(default)]
	kind: String,
	#[serde(default)]
	user: Option<serde_json::Value>,
	#[serde(default)]
	data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectIds {
	#[serde(default)]
	id: Option<String>,
	#[serde(default)]
	ref_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BadgeData {
	#[serde(flatten)]
	ids: ObjectIds,
	#[serde(default)]
	tooltip: String,
	host: ImageHost,
}

#[derive(Debug, Deserialize)]
struct ImageHost {
	url: String,
	#[serde(default)]
	files: Vec<ImageFile>,
}

#[derive(Debug, Deserialize)]
struct ImageFile {
	name: String,
}

#[derive(Debug, Deserialize)]
struct PaintData {
	#[serde(flatten)]
	ids: ObjectIds,
	#[serde(default)]
	name: String,
	#[serde(default)]
	function: Option<String>,
	#[serde(default)]
	repeat: bool,
	#[serde(default)]
	angle: f64,
	#[serde(default)]
	shape: Option<String>,
	#[serde(default)]
	image_url: Option<String>,
	#[serde(default)]
	stops: Vec<GradientStop>,
	#[serde(default)]
	shadows: Vec<PaintShadow>,
}

#[derive(Debug, Default, Deserialize)]
struct EmoteSetData {
	#[serde(flatten)]
	ids: ObjectIds,
	#[serde(default)]
	name: String,
	#[serde(default)]
	flags: i64,
}

impl ObjectIds {
	/// Null ids resolve to `ref_id`, else the fallback literal.
	fn resolve(&self) -> String {
		match self.id.as_deref() {
			Some(id) if id != NULL_OBJECT_ID => id.to_string(),
			_ => self
				.ref_id
				.as_deref()
				.filter(|r| !r.trim().is_empty())
				.unwrap_or(FALLBACK_COSMETIC_ID)
				.to_string(),
		}
	}
}

/// Append-only badge/paint catalog built from `cosmetic.create` events.
#[derive(Debug, Default)]
pub struct CosmeticsCache {
	badges: Vec<Badge>,
	paints: Vec<Paint>,
	badge_ids: HashSet<String>,
	paint_ids: HashSet<String>,
}

impl CosmeticsCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Merge one `cosmetic.create` body into the catalog.
	pub fn ingest(&mut self, body: &serde_json::Value) -> IngestOutcome {
		let Ok(CosmeticCreateBody { object: Some(object) }) = CosmeticCreateBody::deserialize(body) else {
			debug!("cosmetic event without object; unprocessed");
			return IngestOutcome::Unprocessed;
		};

		match object.kind.as_str() {
			"BADGE" | "PAINT" if object.user.is_some() => {
				debug!(kind = %object.kind, "user-scoped cosmetic grant; not a catalog entry");
				IngestOutcome::UserScoped
			}
			"BADGE" => self.ingest_badge(&object.data),
			"PAINT" => self.ingest_paint(&object.data),
			"EMOTE_SET" => ingest_emote_set(&object.data),
			other => {
				debug!(kind = %other, "unprocessed cosmetic kind");
				IngestOutcome::Unprocessed
			}
		}
	}

	fn ingest_badge(&mut self, data: &serde_json::Value) -> IngestOutcome {
		let data = match BadgeData::deserialize(data) {
			Ok(data) => data,
			Err(err) => {
				debug!(error = %err, "malformed badge data");
				return IngestOutcome::Unprocessed;
			}
		};

		let id = data.ids.resolve();
		if self.badge_ids.contains(&id) {
			return IngestOutcome::Duplicate(id);
		}

		let Some(last_file) = data.host.files.last() else {
			debug!(badge_id = %id, "badge without image files");
			return IngestOutcome::Unprocessed;
		};

		self.badge_ids.insert(id.clone());
		self.badges.push(Badge {
			id: id.clone(),
			title: data.tooltip,
			url: format!("https:{}/{}", data.host.url, last_file.name),
		});
		IngestOutcome::BadgeAdded(id)
	}

	fn ingest_paint(&mut self, data: &serde_json::Value) -> IngestOutcome {
		let data = match PaintData::deserialize(data) {
			Ok(data) => data,
			Err(err) => {
				debug!(error = %err, "malformed paint data");
				return IngestOutcome::Unprocessed;
			}
		};

		let id = data.ids.resolve();
		if self.paint_ids.contains(&id) {
			return IngestOutcome::Duplicate(id);
		}

		let (background_image, kind) = if !data.stops.is_empty() {
			let function = data.function.as_deref().unwrap_or("LINEAR_GRADIENT");
			(
				gradient_string(function, data.repeat, data.angle, data.shape.as_deref(), &data.stops),
				PaintKind::NonAnimated,
			)
		} else {
			(image_string(data.image_url.as_deref().unwrap_or_default()), PaintKind::Animated)
		};

		self.paint_ids.insert(id.clone());
		self.paints.push(Paint {
			id: id.clone(),
			name: data.name,
			style: data.function,
			shape: data.shape,
			background_image,
			shadows: shadow_filter(&data.shadows),
			kind,
		});
		IngestOutcome::PaintAdded(id)
	}

	pub fn badges(&self) -> &[Badge] {
		&self.badges
	}

	pub fn paints(&self) -> &[Paint] {
		&self.paints
	}

	pub fn snapshot(&self) -> CosmeticsSnapshot {
		CosmeticsSnapshot {
			badges: self.badges.clone(),
			paints: self.paints.clone(),
		}
	}
}

fn ingest_emote_set(data: &serde_json::Value) -> IngestOutcome {
	let data = EmoteSetData::deserialize(data).unwrap_or_default();
	let personal = data.flags & PERSONAL_EMOTE_SET_FLAG != 0 || data.name.to_ascii_lowercase().contains("personal");
	if !personal {
		debug!(name = %data.name, "non-personal emote set cosmetic; unprocessed");
		return IngestOutcome::Unprocessed;
	}

	let id = data.ids.resolve();
	debug!(emote_set_id = %id, "personal emote set cosmetic; not cached");
	IngestOutcome::PersonalEmoteSet(id)
}

/// Reference-counted catalog handle shared between the client and the app.
#[derive(Debug, Clone, Default)]
pub struct SharedCosmetics {
	inner: Arc<Mutex<CosmeticsCache>>,
}

impl SharedCosmetics {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn ingest(&self, body: &serde_json::Value) -> IngestOutcome {
		self.inner.lock().ingest(body)
	}

	pub fn snapshot(&self) -> CosmeticsSnapshot {
		self.inner.lock().snapshot()
	}

	pub fn badge_count(&self) -> usize {
		self.inner.lock().badges().len()
	}

	pub fn paint_count(&self) -> usize {
		self.inner.lock().paints().len()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn badge_event(id: &str, ref_id: Option<&str>) -> serde_json::Value {
		json!({
			"id": "evt",
			"kind": 10,
			"object": {
				"kind": "BADGE",
				"data": {
					"id": id,
					"ref_id": ref_id,
					"tooltip": "Subscriber",
					"host": {
						"url": "//cdn.7tv.app/badge/abc",
						"files": [{ "name": "1x.webp" }, { "name": "2x.webp" }, { "name": "3x.webp" }]
					}
				}
			}
		})
	}

	fn gradient_paint(id: &str) -> serde_json::Value {
		json!({
			"object": {
				"kind": "PAINT",
				"data": {
					"id": id,
					"name": "Sunset",
					"function": "LINEAR_GRADIENT",
					"repeat": false,
					"angle": 45,
					"shape": "circle",
					"stops": [{ "at": 0.0, "color": -16776961 }, { "at": 1.0, "color": 65535 }],
					"shadows": [{ "x_offset": 0, "y_offset": 0, "radius": 1, "color": 255 }]
				}
			}
		})
	}

	#[test]
	fn badge_is_built_from_last_file() {
		let mut cache = CosmeticsCache::new();
		assert_eq!(
			cache.ingest(&badge_event("01HBADGE", None)),
			IngestOutcome::BadgeAdded("01HBADGE".to_string())
		);

		let badge = &cache.badges()[0];
		assert_eq!(badge.title, "Subscriber");
		assert_eq!(badge.url, "https://cdn.7tv.app/badge/abc/3x.webp");
	}

	#[test]
	fn duplicate_badges_are_ignored() {
		let mut cache = CosmeticsCache::new();
		cache.ingest(&badge_event("01HBADGE", None));
		assert_eq!(
			cache.ingest(&badge_event("01HBADGE", None)),
			IngestOutcome::Duplicate("01HBADGE".to_string())
		);
		assert_eq!(cache.badges().len(), 1);
	}

	#[test]
	fn null_id_resolves_to_ref_id_then_fallback() {
		let mut cache = CosmeticsCache::new();
		assert_eq!(
			cache.ingest(&badge_event(NULL_OBJECT_ID, Some("01HREF"))),
			IngestOutcome::BadgeAdded("01HREF".to_string())
		);
		assert_eq!(
			cache.ingest(&badge_event(NULL_OBJECT_ID, Some("01HREF"))),
			IngestOutcome::Duplicate("01HREF".to_string())
		);
		assert_eq!(
			cache.ingest(&badge_event(NULL_OBJECT_ID, None)),
			IngestOutcome::BadgeAdded(FALLBACK_COSMETIC_ID.to_string())
		);
		assert_eq!(cache.badges().len(), 2);
	}

	#[test]
	fn user_scoped_grants_are_not_cached() {
		let mut cache = CosmeticsCache::new();
		let mut event = badge_event("01HBADGE", None);
		event["object"]["user"] = json!({ "id": "01HUSER" });
		assert_eq!(cache.ingest(&event), IngestOutcome::UserScoped);
		assert!(cache.badges().is_empty());
	}

	#[test]
	fn gradient_paint_is_non_animated() {
		let mut cache = CosmeticsCache::new();
		assert_eq!(
			cache.ingest(&gradient_paint("01HPAINT")),
			IngestOutcome::PaintAdded("01HPAINT".to_string())
		);
		assert_eq!(cache.ingest(&gradient_paint("01HPAINT")), IngestOutcome::Duplicate("01HPAINT".to_string()));

		let paint = &cache.paints()[0];
		assert_eq!(paint.kind, PaintKind::NonAnimated);
		assert_eq!(paint.style.as_deref(), Some("LINEAR_GRADIENT"));
		assert_eq!(
			paint.background_image,
			"linear-gradient(45deg, rgba(255, 0, 0, 1) 0%, rgba(0, 0, 255, 1) 100%)"
		);
		assert_eq!(paint.shadows.as_deref(), Some("drop-shadow(rgb(0, 0, 0) 0px 0px 1px)"));
	}

	#[test]
	fn image_paint_is_animated_without_shadows() {
		let mut cache = CosmeticsCache::new();
		let event = json!({
			"object": {
				"kind": "PAINT",
				"data": {
					"id": NULL_OBJECT_ID,
					"ref_id": "01HANIM",
					"name": "Sparkle",
					"function": "URL",
					"image_url": "https://cdn.7tv.app/paint/sparkle.webp",
					"stops": [],
					"shadows": []
				}
			}
		});
		assert_eq!(cache.ingest(&event), IngestOutcome::PaintAdded("01HANIM".to_string()));

		let paint = &cache.paints()[0];
		assert_eq!(paint.kind, PaintKind::Animated);
		assert_eq!(paint.background_image, "url('https://cdn.7tv.app/paint/sparkle.webp')");
		assert_eq!(paint.shadows, None);
	}

	#[test]
	fn personal_emote_sets_normalize_without_caching() {
		let mut cache = CosmeticsCache::new();
		let event = json!({
			"object": {
				"kind": "EMOTE_SET",
				"data": { "id": NULL_OBJECT_ID, "ref_id": "01HSET", "name": "Personal Emotes", "flags": 4 }
			}
		});
		assert_eq!(cache.ingest(&event), IngestOutcome::PersonalEmoteSet("01HSET".to_string()));
		assert!(cache.snapshot().badges.is_empty());
		assert!(cache.snapshot().paints.is_empty());
	}

	#[test]
	fn unknown_shapes_are_unprocessed() {
		let mut cache = CosmeticsCache::new();
		assert_eq!(cache.ingest(&json!({ "object": { "kind": "AVATAR" } })), IngestOutcome::Unprocessed);
		assert_eq!(cache.ingest(&json!({ "nothing": true })), IngestOutcome::Unprocessed);
		assert_eq!(cache.ingest(&json!("not an object")), IngestOutcome::Unprocessed);
	}

	#[test]
	fn snapshot_serializes_camel_case_paints() {
		let cache = SharedCosmetics::new();
		cache.ingest(&gradient_paint("01HPAINT"));
		let value = serde_json::to_value(cache.snapshot()).unwrap();
		assert_eq!(value["paints"][0]["kind"], "non-animated");
		assert!(value["paints"][0]["backgroundImage"].is_string());
		assert_eq!(value["badges"], json!([]));
		assert_eq!(cache.paint_count(), 1);
		assert_eq!(cache.badge_count(), 0);
	}
}
