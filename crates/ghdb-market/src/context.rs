use serde::{Deserialize, Serialize};

use crate::records::GeoLocation;

const UNKNOWN: &str = "Unknown";

/// Request metadata supplied by the caller for login and registration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientContext {
    pub ip_address: String,
    pub user_agent: String,
    pub location: Option<GeoLocation>,
}

impl ClientContext {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn device_type(&self) -> DeviceType {
        DeviceType::classify(&self.user_agent)
    }

    pub fn browser(&self) -> BrowserInfo {
        BrowserInfo::detect(&self.user_agent)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Tv,
}

const TV_MARKERS: &[&str] = &[
    "tv", "smart-tv", "googletv", "appletv", "hbbtv", "philipstv", "roku", "crkey",
];
const MOBILE_MARKERS: &[&str] = &[
    "mobile", "android", "iphone", "ipad", "ipod", "blackberry", "iemobile", "opera mini",
];

impl DeviceType {
    /// Classify a user agent. TV wins over tablet, tablet over mobile.
    pub fn classify(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| ua.contains(m));

        if has(TV_MARKERS) {
            return Self::Tv;
        }
        // Android without "mobile" after it is a tablet.
        let android_tablet = ua
            .find("android")
            .is_some_and(|i| !ua[i..].contains("mobile"));
        if ua.contains("tablet") || ua.contains("ipad") || android_tablet {
            return Self::Tablet;
        }
        if has(MOBILE_MARKERS) {
            return Self::Mobile;
        }
        Self::Desktop
    }
}

/// Browser family, version and platform parsed from a user agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowserInfo {
    pub browser: String,
    pub version: String,
    pub platform: String,
}

impl BrowserInfo {
    pub fn detect(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();

        let (browser, marker) = if ua.contains("edg") {
            ("Edge", Some(if ua.contains("edg/") { "edg/" } else { "edge/" }))
        } else if ua.contains("opr/") || ua.contains("opera") {
            ("Opera", Some(if ua.contains("opr/") { "opr/" } else { "opera/" }))
        } else if ua.contains("chrome") {
            ("Chrome", Some("chrome/"))
        } else if ua.contains("firefox") {
            ("Firefox", Some("firefox/"))
        } else if ua.contains("safari") {
            ("Safari", Some("version/"))
        } else {
            (UNKNOWN, None)
        };
        let version = marker
            .and_then(|m| version_after(&ua, m))
            .unwrap_or_else(|| UNKNOWN.to_string());

        let platform = if ua.contains("windows") {
            "Windows"
        } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
            "iOS"
        } else if ua.contains("android") {
            "Android"
        } else if ua.contains("mac") {
            "macOS"
        } else if ua.contains("linux") {
            "Linux"
        } else {
            UNKNOWN
        };

        Self {
            browser: browser.to_string(),
            version,
            platform: platform.to_string(),
        }
    }
}

fn version_after(ua: &str, marker: &str) -> Option<String> {
    let start = ua.find(marker)? + marker.len();
    let version: String = ua[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    (!version.is_empty()).then_some(version)
}
