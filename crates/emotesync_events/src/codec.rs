#![forbid(unsafe_code)]

//! Paint color and gradient helpers.
//!
//! The provider packs colors as a 32-bit `0xRRGGBBAA` value and serializes it
//! as a signed integer, so anything with the red channel above `0x7F` arrives
//! negative. Only the low 32 bits are meaningful.
//!
//! Alpha is the low byte, not the high one: `0xFF0000FF` is opaque red. Do not
//! read these values as `0xAARRGGBB` even where they are called ARGB.

use serde::Deserialize;

/// A single gradient stop (`at` is a 0..=1 fraction).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GradientStop {
	#[serde(default)]
	pub at: f64,
	#[serde(default)]
	pub color: i64,
}

/// A drop shadow entry.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PaintShadow {
	#[serde(default)]
	pub x_offset: f64,
	#[serde(default)]
	pub y_offset: f64,
	#[serde(default)]
	pub radius: f64,
	#[serde(default)]
	pub color: i64,
}

/// Unpacked color channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedColor {
	pub red: u8,
	pub green: u8,
	pub blue: u8,
	pub alpha: u8,
}

impl PackedColor {
	pub fn from_packed(color: i64) -> Self {
		let bits = color as u32;
		Self {
			red: (bits >> 24) as u8,
			green: (bits >> 16) as u8,
			blue: (bits >> 8) as u8,
			alpha: bits as u8,
		}
	}

	/// `rgba(r, g, b, a)` with alpha as a 0..=1 fraction.
	pub fn to_rgba(self) -> String {
		format!(
			"rgba({}, {}, {}, {})",
			self.red,
			self.green,
			self.blue,
			format_number(f64::from(self.alpha) / 255.0)
		)
	}

	/// `rgb(r, g, b)`; alpha is dropped.
	pub fn to_rgb(self) -> String {
		format!("rgb({}, {}, {})", self.red, self.green, self.blue)
	}
}

pub fn rgba_string(color: i64) -> String {
	PackedColor::from_packed(color).to_rgba()
}

/// Format without trailing zeros, rounded to three decimals.
pub fn format_number(value: f64) -> String {
	let rounded = (value * 1000.0).round() / 1000.0;
	if rounded == 0.0 {
		return "0".to_string();
	}
	format!("{rounded}")
}

/// `LINEAR_GRADIENT` -> `linear-gradient`, with a `repeating-` prefix when asked.
pub fn gradient_function_name(function: &str, repeat: bool) -> String {
	let normalized = function.trim().to_ascii_lowercase().replace('_', "-");
	if repeat {
		format!("repeating-{normalized}")
	} else {
		normalized
	}
}

pub fn is_linear_function(function: &str) -> bool {
	function.trim().eq_ignore_ascii_case("LINEAR_GRADIENT")
}

/// Compose a CSS gradient function from provider paint data.
///
/// Linear functions are directed by `angle` in degrees; every other function
/// uses `shape` (omitted when blank).
pub fn gradient_string(function: &str, repeat: bool, angle: f64, shape: Option<&str>, stops: &[GradientStop]) -> String {
	let name = gradient_function_name(function, repeat);
	let stops = stops
		.iter()
		.map(|stop| format!("{} {}%", rgba_string(stop.color), format_number(stop.at * 100.0)))
		.collect::<Vec<_>>()
		.join(", ");

	let direction = if is_linear_function(function) {
		Some(format!("{}deg", format_number(angle)))
	} else {
		shape.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
	};

	match direction {
		Some(direction) => format!("{name}({direction}, {stops})"),
		None => format!("{name}({stops})"),
	}
}

pub fn image_string(image_url: &str) -> String {
	format!("url('{image_url}')")
}

/// Space-separated `drop-shadow(..)` filters, `None` when there are no shadows.
pub fn shadow_filter(shadows: &[PaintShadow]) -> Option<String> {
	if shadows.is_empty() {
		return None;
	}

	let filter = shadows
		.iter()
		.map(|shadow| {
			format!(
				"drop-shadow({} {}px {}px {}px)",
				PackedColor::from_packed(shadow.color).to_rgb(),
				format_number(shadow.x_offset),
				format_number(shadow.y_offset),
				format_number(shadow.radius)
			)
		})
		.collect::<Vec<_>>()
		.join(" ");
	Some(filter)
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn unpacks_positive_and_negative_forms() {
		assert_eq!(rgba_string(0x00FF00FF), "rgba(0, 255, 0, 1)");
		// 0xFF0000FF as a signed 32-bit value
		assert_eq!(rgba_string(-16776961), "rgba(255, 0, 0, 1)");
		assert_eq!(rgba_string(0xFF0000FF), "rgba(255, 0, 0, 1)");
		assert_eq!(rgba_string(0x10203000), "rgba(16, 32, 48, 0)");
		assert_eq!(rgba_string(0x10203080), "rgba(16, 32, 48, 0.502)");
	}

	#[test]
	fn alpha_is_the_low_byte() {
		let color = PackedColor::from_packed(0x80FF0040);
		assert_eq!((color.red, color.green, color.blue, color.alpha), (0x80, 0xFF, 0x00, 0x40));
		assert_ne!(color.alpha, 0x80, "high byte is red, not alpha");
	}

	#[test]
	fn function_names_are_normalized() {
		assert_eq!(gradient_function_name("LINEAR_GRADIENT", false), "linear-gradient");
		assert_eq!(gradient_function_name("RADIAL_GRADIENT", true), "repeating-radial-gradient");
	}

	#[test]
	fn linear_gradient_uses_angle() {
		let stops = [
			GradientStop { at: 0.0, color: 0xFF0000FF },
			GradientStop { at: 0.5, color: 0x0000FFFF },
		];
		assert_eq!(
			gradient_string("LINEAR_GRADIENT", false, 90.0, Some("circle"), &stops),
			"linear-gradient(90deg, rgba(255, 0, 0, 1) 0%, rgba(0, 0, 255, 1) 50%)"
		);
	}

	#[test]
	fn radial_gradient_uses_shape() {
		let stops = [GradientStop { at: 1.0, color: 0x000000FF }];
		assert_eq!(
			gradient_string("RADIAL_GRADIENT", true, 45.0, Some("circle"), &stops),
			"repeating-radial-gradient(circle, rgba(0, 0, 0, 1) 100%)"
		);
		assert_eq!(
			gradient_string("RADIAL_GRADIENT", false, 0.0, None, &stops),
			"radial-gradient(rgba(0, 0, 0, 1) 100%)"
		);
	}

	#[test]
	fn fractional_stop_positions_are_trimmed() {
		let stops = [GradientStop { at: 0.333, color: 0x000000FF }];
		let s = gradient_string("LINEAR_GRADIENT", false, 0.0, None, &stops);
		assert!(s.ends_with("rgba(0, 0, 0, 1) 33.3%)"), "{s}");
	}

	#[test]
	fn shadows_strip_alpha() {
		assert_eq!(shadow_filter(&[]), None);
		let shadows = [
			PaintShadow {
				x_offset: 0.0,
				y_offset: 1.5,
				radius: 2.0,
				color: 0x11223344,
			},
			PaintShadow {
				x_offset: -1.0,
				y_offset: 0.0,
				radius: 0.0,
				color: -1,
			},
		];
		assert_eq!(
			shadow_filter(&shadows).as_deref(),
			Some("drop-shadow(rgb(17, 34, 51) 0px 1.5px 2px) drop-shadow(rgb(255, 255, 255) -1px 0px 0px)")
		);
	}

	proptest! {
		#[test]
		fn signed_and_unsigned_encodings_agree(bits in any::<u32>()) {
			prop_assert_eq!(rgba_string(i64::from(bits)), rgba_string(i64::from(bits as i32)));
		}

		#[test]
		fn rgb_is_rgba_without_alpha(bits in any::<u32>()) {
			let color = PackedColor::from_packed(i64::from(bits));
			let rgba = color.to_rgba();
			let rgb = color.to_rgb();
			prop_assert!(rgba.starts_with(&rgb.replace("rgb(", "rgba(").trim_end_matches(')').to_string()));
		}
	}
}
