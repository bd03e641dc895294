//! `before:browser:launch` customization.

use std::borrow::Cow;

use cuke_protocol::{BrowserDescriptor, BrowserKind, LaunchOptions};
use serde_json::Value;
use tracing::debug;

/// Content settings granted up front so permission prompts never block a run.
pub const CHROME_PERMISSIONS: [&str; 4] = [
	"profile.default_content_setting_values.media_stream_camera",
	"profile.default_content_setting_values.media_stream_mic",
	"profile.default_content_setting_values.geolocation",
	"profile.default_content_setting_values.notifications",
];

/// Flags appended for Chrome, in this order.
pub const CHROME_ARGS: [&str; 5] = [
	"--window-size=1920,1080",
	"--use-fake-device-for-media-stream",
	"--no-sandbox",
	"--disable-dev-shm-usage",
	"--js-flags=--expose-gc",
];

/// Returns the launch options to start `browser` with.
///
/// Chrome gets its permissions and flags added to a copy of `options`;
/// every other browser gets `options` back untouched.
pub fn customize<'a>(browser: &BrowserDescriptor, options: &'a LaunchOptions) -> Cow<'a, LaunchOptions> {
	match &browser.name {
		BrowserKind::Chrome => {
			let mut customized = options.clone();
			for key in CHROME_PERMISSIONS {
				customized.preferences.insert(key.to_string(), Value::Bool(true));
			}
			let mut added = 0;
			for flag in CHROME_ARGS {
				if !customized.args.iter().any(|arg| arg == flag) {
					customized.args.push(flag.to_string());
					added += 1;
				}
			}
			debug!(target = "cuke.launch", browser = %browser.name, args_added = added, "customized launch options");
			Cow::Owned(customized)
		}
		BrowserKind::Chromium
		| BrowserKind::Edge
		| BrowserKind::Electron
		| BrowserKind::Firefox
		| BrowserKind::Webkit
		| BrowserKind::Other(_) => {
			debug!(target = "cuke.launch", browser = %browser.name, "launch options unchanged");
			Cow::Borrowed(options)
		}
	}
}
